//! Turnstile - Rate Limit Policy Engine
//!
//! This crate implements the rate limiting policies LLM gateways accept as a
//! compact header string (`quota;w=window;u=unit;s=segment`). Policies are
//! parsed, scoped to a global, per-user or per-property budget, and enforced
//! over fixed windows counted in requests or in cents. An HTTP admission
//! service exposes the engine to gateways.

pub mod config;
pub mod error;
pub mod http;
pub mod ratelimit;
