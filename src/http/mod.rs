//! HTTP admission service.
//!
//! Gateways call `POST /v1/ratelimit/check` with the client's rate limit
//! headers before forwarding a request upstream, and relay a 429 when the
//! request is rejected.

pub mod headers;
mod server;
mod service;

pub use server::HttpServer;
pub use service::{AppState, CheckRequest, CheckResponse};
