//! Core rate limiter implementation.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace};

use super::clock::{Clock, SystemClock};
use super::counter::{from_units, to_units};
use super::key::{LimitKey, MissingContextError, RequestContext};
use super::policy::Policy;
use super::store::{BucketId, QuotaStore};
use crate::error::Result;

/// Outcome of evaluating one request against a policy.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    /// Whether the request may proceed
    pub admitted: bool,
    /// Budget left in the current window after this request
    pub remaining: f64,
    /// The policy quota
    pub limit: u64,
    /// Time until the window resets; only set on rejection
    pub retry_after: Option<Duration>,
}

impl Decision {
    /// `retry_after` in whole seconds, rounded up.
    pub fn retry_after_secs(&self) -> Option<u64> {
        self.retry_after
            .map(|d| d.as_secs() + u64::from(d.subsec_nanos() > 0))
    }
}

/// Decides admission for requests under rate limit policies.
///
/// This struct is thread-safe and can be shared across multiple tasks.
pub struct RateLimiter {
    store: Arc<QuotaStore>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    /// Create a rate limiter over `store` using the system clock.
    pub fn new(store: Arc<QuotaStore>) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    pub fn with_clock(store: Arc<QuotaStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Evaluate a request costing `cost` under `policy`.
    ///
    /// Admitted requests are charged immediately. Rejections are reported
    /// through [`Decision::admitted`], not as errors. Negative or NaN costs
    /// charge nothing.
    pub fn evaluate(
        &self,
        policy: &Policy,
        context: &RequestContext,
        cost: f64,
    ) -> std::result::Result<Decision, MissingContextError> {
        let key = LimitKey::resolve(policy.segment(), context)?;
        let cost_units = to_units(cost);
        let quota = policy.quota();
        let now = self.clock.now();

        trace!(key = %key, policy = %policy, cost = cost, "Checking rate limit");

        let id = BucketId::new(policy.clone(), key);
        let decision = self
            .store
            .transact(&id, policy.window_seconds(), now, |state| {
                let remaining = state.remaining_units(quota);
                if remaining >= cost_units {
                    state.record_units(cost_units);
                    Decision {
                        admitted: true,
                        remaining: from_units(remaining - cost_units),
                        limit: quota,
                        retry_after: None,
                    }
                } else {
                    Decision {
                        admitted: false,
                        remaining: from_units(remaining),
                        limit: quota,
                        retry_after: Some(state.duration_until_reset(now)),
                    }
                }
            });

        if !decision.admitted {
            debug!(
                key = %id.key,
                policy = %policy,
                retry_after = ?decision.retry_after,
                "Rate limit exceeded"
            );
        }

        Ok(decision)
    }

    /// Parse `policy` and evaluate the request against it.
    pub fn evaluate_str(&self, policy: &str, context: &RequestContext, cost: f64) -> Result<Decision> {
        let policy: Policy = policy.parse()?;
        Ok(self.evaluate(&policy, context, cost)?)
    }

    pub fn store(&self) -> &Arc<QuotaStore> {
        &self.store
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(Arc::new(QuotaStore::new()))
    }
}
