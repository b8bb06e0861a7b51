//! Gateway header contract.

use axum::http::header::RETRY_AFTER;
use axum::http::{HeaderMap, HeaderName, HeaderValue};

use crate::ratelimit::{Decision, Policy, RequestContext, Unit};

pub const POLICY: &str = "helicone-ratelimit-policy";
pub const USER_ID: &str = "helicone-user-id";
pub const PROPERTY_PREFIX: &str = "helicone-property-";

pub const LIMIT: &str = "helicone-ratelimit-limit";
pub const REMAINING: &str = "helicone-ratelimit-remaining";

/// The raw policy header, if present and valid UTF-8.
pub fn policy(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(POLICY)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Build the request context from user id and `Helicone-Property-*` headers.
pub fn request_context(headers: &HeaderMap) -> RequestContext {
    let mut context = RequestContext::new();

    if let Some(user) = headers.get(USER_ID).and_then(|v| v.to_str().ok()) {
        context.set_user(user.trim());
    }

    for (name, value) in headers {
        let Some(property) = name.as_str().strip_prefix(PROPERTY_PREFIX) else {
            continue;
        };
        if property.is_empty() {
            continue;
        }
        if let Ok(value) = value.to_str() {
            context.set_property(property, value.trim());
        }
    }

    context
}

/// Render remaining budget: whole numbers for request quotas, cents keep
/// up to `precision` decimal places.
pub fn format_remaining(unit: Unit, remaining: f64, precision: u32) -> String {
    match unit {
        Unit::Requests => format!("{}", remaining.floor() as u64),
        Unit::Cents => {
            let s = format!("{:.*}", precision as usize, remaining);
            if s.contains('.') {
                s.trim_end_matches('0').trim_end_matches('.').to_string()
            } else {
                s
            }
        }
    }
}

/// Headers reported back to the client for a decision.
pub fn decision_headers(policy: &Policy, decision: &Decision, precision: u32) -> HeaderMap {
    let mut headers = HeaderMap::new();

    let values = [
        (LIMIT, decision.limit.to_string()),
        (REMAINING, format_remaining(policy.unit(), decision.remaining, precision)),
        (POLICY, policy.to_string()),
    ];
    for (name, value) in values {
        if let Ok(value) = HeaderValue::from_str(&value) {
            headers.insert(HeaderName::from_static(name), value);
        }
    }

    if let Some(secs) = decision.retry_after_secs() {
        headers.insert(RETRY_AFTER, HeaderValue::from(secs));
    }

    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn header_map(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for &(k, v) in pairs {
            headers.insert(HeaderName::from_static(k), HeaderValue::from_static(v));
        }
        headers
    }

    #[test]
    fn test_request_context_from_headers() {
        let headers = header_map(&[
            ("helicone-user-id", "user-456"),
            ("helicone-property-department", "cardiology"),
            ("helicone-property-", "ignored"),
            ("x-other", "ignored"),
        ]);

        let context = request_context(&headers);
        assert_eq!(context.user_id(), Some("user-456"));
        assert_eq!(context.property("Department"), Some("cardiology"));
        assert_eq!(context.properties().count(), 1);
    }

    #[test]
    fn test_policy_header() {
        let headers = header_map(&[("helicone-ratelimit-policy", " 1000;w=3600 ")]);
        assert_eq!(policy(&headers), Some("1000;w=3600"));
        assert_eq!(policy(&HeaderMap::new()), None);
    }

    #[test]
    fn test_format_remaining() {
        assert_eq!(format_remaining(Unit::Requests, 99.0, 4), "99");
        assert_eq!(format_remaining(Unit::Cents, 499.25, 4), "499.25");
        assert_eq!(format_remaining(Unit::Cents, 500.0, 4), "500");
        assert_eq!(format_remaining(Unit::Cents, 0.0, 4), "0");
        assert_eq!(format_remaining(Unit::Cents, 500.0, 0), "500");
    }

    #[test]
    fn test_format_remaining_honours_precision() {
        assert_eq!(format_remaining(Unit::Cents, 0.123456, 6), "0.123456");
        assert_eq!(format_remaining(Unit::Cents, 0.123456, 4), "0.1235");
        assert_eq!(format_remaining(Unit::Cents, 2.4, 0), "2");
    }

    #[test]
    fn test_decision_headers() {
        let policy: Policy = "2;w=60".parse().unwrap();
        let decision = Decision {
            admitted: false,
            remaining: 0.0,
            limit: 2,
            retry_after: Some(Duration::from_millis(12_300)),
        };

        let headers = decision_headers(&policy, &decision, 4);
        assert_eq!(headers[LIMIT], "2");
        assert_eq!(headers[REMAINING], "0");
        assert_eq!(headers[POLICY], "2;w=60;u=requests");
        assert_eq!(headers[RETRY_AFTER], "13");
    }
}
