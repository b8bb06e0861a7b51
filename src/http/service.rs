//! Admission check endpoint.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::headers;
use crate::config::{MissingContextAction, RateLimitingConfig};
use crate::error::Result;
use crate::ratelimit::{CostModel, Policy, RateLimiter, TokenUsage};

/// Shared state behind the HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    limiter: Arc<RateLimiter>,
    costs: Arc<CostModel>,
    default_policy: Option<Policy>,
    on_missing_context: MissingContextAction,
}

impl AppState {
    pub fn new(limiter: Arc<RateLimiter>, costs: CostModel) -> Self {
        Self {
            limiter,
            costs: Arc::new(costs),
            default_policy: None,
            on_missing_context: MissingContextAction::default(),
        }
    }

    /// Build state from the rate limiting section of the configuration.
    pub fn from_config(limiter: Arc<RateLimiter>, config: &RateLimitingConfig) -> Result<Self> {
        Ok(Self::new(limiter, config.cost_model())
            .with_default_policy(config.default_policy()?)
            .with_missing_context(config.on_missing_context))
    }

    pub fn with_default_policy(mut self, policy: Option<Policy>) -> Self {
        self.default_policy = policy;
        self
    }

    pub fn with_missing_context(mut self, action: MissingContextAction) -> Self {
        self.on_missing_context = action;
        self
    }
}

/// Optional body describing what the request costs.
#[derive(Debug, Default, Deserialize)]
pub struct CheckRequest {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub usage: Option<TokenUsage>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct CheckResponse {
    pub admitted: bool,
    /// False when no policy applied to the request
    pub evaluated: bool,
    pub remaining: Option<f64>,
    pub limit: Option<u64>,
    pub retry_after_seconds: Option<u64>,
    pub policy: Option<String>,
}

impl CheckResponse {
    fn pass_through() -> Self {
        Self {
            admitted: true,
            evaluated: false,
            remaining: None,
            limit: None,
            retry_after_seconds: None,
            policy: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn bad_request(message: String) -> Response {
    (StatusCode::BAD_REQUEST, Json(ErrorResponse { error: message })).into_response()
}

/// Handler for `POST /v1/ratelimit/check`.
#[instrument(skip_all, fields(request_id = %Uuid::new_v4()))]
pub async fn check(
    State(state): State<AppState>,
    request_headers: HeaderMap,
    body: Option<Json<CheckRequest>>,
) -> Response {
    let body = body.map(|Json(b)| b).unwrap_or_default();

    let policy = match headers::policy(&request_headers) {
        Some(raw) => match raw.parse::<Policy>() {
            Ok(policy) => policy,
            Err(e) => {
                warn!(policy = raw, error = %e, "Rejecting malformed rate limit policy");
                return bad_request(e.to_string());
            }
        },
        None => match &state.default_policy {
            Some(policy) => policy.clone(),
            None => {
                debug!("No rate limit policy for request");
                return (StatusCode::OK, Json(CheckResponse::pass_through())).into_response();
            }
        },
    };

    let cost = match state
        .costs
        .request_cost(policy.unit(), body.model.as_deref(), body.usage.as_ref())
    {
        Ok(cost) => cost,
        Err(e) => {
            warn!(policy = %policy, error = %e, "Cannot price request");
            return bad_request(e.to_string());
        }
    };

    let context = headers::request_context(&request_headers);
    let decision = match state.limiter.evaluate(&policy, &context, cost) {
        Ok(decision) => decision,
        Err(e) => match state.on_missing_context {
            MissingContextAction::Deny => {
                warn!(policy = %policy, error = %e, "Request lacks rate limit context");
                return bad_request(e.to_string());
            }
            MissingContextAction::Allow => {
                debug!(policy = %policy, error = %e, "Passing request through without context");
                return (StatusCode::OK, Json(CheckResponse::pass_through())).into_response();
            }
        },
    };

    info!(
        policy = %policy,
        admitted = decision.admitted,
        remaining = decision.remaining,
        "Rate limit decision made"
    );

    let status = if decision.admitted {
        StatusCode::OK
    } else {
        StatusCode::TOO_MANY_REQUESTS
    };
    let response_headers = headers::decision_headers(&policy, &decision, state.costs.precision());
    let body = CheckResponse {
        admitted: decision.admitted,
        evaluated: true,
        remaining: Some(decision.remaining),
        limit: Some(decision.limit),
        retry_after_seconds: decision.retry_after_secs(),
        policy: Some(policy.to_string()),
    };

    (status, response_headers, Json(body)).into_response()
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub buckets: usize,
}

/// Handler for `GET /health`.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        buckets: state.limiter.store().len(),
    })
}
