//! Limit key resolution from request context.

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

use super::policy::Segment;

/// The request lacks the data its policy is segmented by.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MissingContextError {
    #[error("policy is segmented by user but the request carries no user id")]
    UserId,
    #[error("policy is segmented by property '{0}' but the request does not set it")]
    Property(String),
    #[error("policy is segmented by property but the request sets no property")]
    NoProperty,
    #[error("policy is segmented by property but the request sets {0} properties")]
    AmbiguousProperty(usize),
}

/// Per-request data used to pick a budget.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    user_id: Option<String>,
    /// Custom properties, keyed by lowercase name
    properties: BTreeMap<String, String>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.set_user(user_id);
        self
    }

    pub fn with_property(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.set_property(name, value);
        self
    }

    /// Empty ids are ignored.
    pub fn set_user(&mut self, user_id: impl Into<String>) {
        let user_id = user_id.into();
        if !user_id.is_empty() {
            self.user_id = Some(user_id);
        }
    }

    /// Property names are case-insensitive. Empty values are ignored.
    pub fn set_property(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        let value = value.into();
        if !value.is_empty() {
            self.properties
                .insert(name.as_ref().to_ascii_lowercase(), value);
        }
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn properties(&self) -> impl Iterator<Item = (&str, &str)> {
        self.properties.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// The concrete bucket identity a request is charged against.
///
/// Rendered as `*` for global policies, `user:<id>` per user and
/// `property:<name>:<value>` per property value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LimitKey(String);

impl LimitKey {
    pub const GLOBAL: &'static str = "*";

    pub fn global() -> Self {
        LimitKey(Self::GLOBAL.to_string())
    }

    pub fn user(user_id: &str) -> Self {
        LimitKey(format!("user:{}", user_id))
    }

    pub fn property(name: &str, value: &str) -> Self {
        LimitKey(format!("property:{}:{}", name, value))
    }

    /// Derive the key for `segment` from the request context.
    pub fn resolve(segment: &Segment, context: &RequestContext) -> Result<Self, MissingContextError> {
        match segment {
            Segment::Global => Ok(Self::global()),
            Segment::User => context
                .user_id()
                .map(Self::user)
                .ok_or(MissingContextError::UserId),
            Segment::Property(Some(name)) => context
                .property(name)
                .map(|value| Self::property(&name.to_ascii_lowercase(), value))
                .ok_or_else(|| MissingContextError::Property(name.clone())),
            Segment::Property(None) => {
                let mut props = context.properties();
                match (props.next(), props.next()) {
                    (Some((name, value)), None) => Ok(Self::property(name, value)),
                    (None, _) => Err(MissingContextError::NoProperty),
                    (Some(_), Some(_)) => Err(MissingContextError::AmbiguousProperty(
                        context.properties.len(),
                    )),
                }
            }
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LimitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_key() {
        let key = LimitKey::resolve(&Segment::Global, &RequestContext::new()).unwrap();
        assert_eq!(key.as_str(), "*");
    }

    #[test]
    fn test_user_key() {
        let context = RequestContext::new().with_user("user-456");
        let key = LimitKey::resolve(&Segment::User, &context).unwrap();
        assert_eq!(key.as_str(), "user:user-456");
    }

    #[test]
    fn test_user_key_missing() {
        let context = RequestContext::new().with_user("");
        assert_eq!(
            LimitKey::resolve(&Segment::User, &context),
            Err(MissingContextError::UserId)
        );
    }

    #[test]
    fn test_named_property_key() {
        let context = RequestContext::new()
            .with_property("Department", "cardiology")
            .with_property("environment", "production");
        let segment = Segment::Property(Some("department".to_string()));

        let key = LimitKey::resolve(&segment, &context).unwrap();
        assert_eq!(key.as_str(), "property:department:cardiology");

        let segment = Segment::Property(Some("team".to_string()));
        assert_eq!(
            LimitKey::resolve(&segment, &context),
            Err(MissingContextError::Property("team".to_string()))
        );
    }

    #[test]
    fn test_unnamed_property_key() {
        let segment = Segment::Property(None);

        let context = RequestContext::new().with_property("Department", "cardiology");
        let key = LimitKey::resolve(&segment, &context).unwrap();
        assert_eq!(key.to_string(), "property:department:cardiology");

        assert_eq!(
            LimitKey::resolve(&segment, &RequestContext::new()),
            Err(MissingContextError::NoProperty)
        );

        let context = context.with_property("environment", "production");
        assert_eq!(
            LimitKey::resolve(&segment, &context),
            Err(MissingContextError::AmbiguousProperty(2))
        );
    }

    #[test]
    fn test_key_equality() {
        let context = RequestContext::new().with_user("a");
        let key1 = LimitKey::resolve(&Segment::User, &context).unwrap();
        let key2 = LimitKey::user("a");
        assert_eq!(key1, key2);
        assert_ne!(key1, LimitKey::user("b"));
    }
}
