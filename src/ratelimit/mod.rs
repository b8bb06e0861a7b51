//! Rate limiting logic and state management.

mod clock;
mod cost;
mod counter;
mod key;
mod limiter;
mod policy;
mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use cost::{
    default_prices, CostError, CostModel, PriceTable, TokenUsage,
    DEFAULT_CENTS_PRECISION, MAX_CENTS_PRECISION,
};
pub use counter::{from_units, to_units, WindowState, UNIT_SCALE};
pub use key::{LimitKey, MissingContextError, RequestContext};
pub use limiter::{Decision, RateLimiter};
pub use policy::{Policy, PolicyParseError, Segment, Unit};
pub use store::{BucketId, QuotaStore};
