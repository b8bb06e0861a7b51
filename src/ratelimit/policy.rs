//! Rate limit policy parsing.
//!
//! A policy is written as `quota;w=window;u=unit;s=segment`, for example
//! `1000;w=3600` (1000 requests per hour for everyone) or
//! `500;w=86400;u=cents;s=user` (five dollars per user per day).

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

/// Errors produced while parsing a policy string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyParseError {
    #[error("policy string is empty")]
    Empty,
    #[error("invalid quota '{0}': expected a positive integer")]
    InvalidQuota(String),
    #[error("invalid window '{0}': expected a positive number of seconds")]
    InvalidWindow(String),
    #[error("missing required window parameter 'w='")]
    MissingWindow,
    #[error("unknown unit '{0}': expected 'requests' or 'cents'")]
    UnknownUnit(String),
    #[error("unknown segment '{0}': expected 'user' or 'property'")]
    UnknownSegment(String),
    #[error("unrecognized policy parameter '{0}'")]
    UnknownParameter(String),
    #[error("duplicate policy parameter '{0}'")]
    DuplicateParameter(String),
}

/// What a policy quota is measured in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Unit {
    /// Every admitted request costs one unit.
    #[default]
    Requests,
    /// Requests cost their computed price in cents.
    Cents,
}

impl Unit {
    pub fn as_str(&self) -> &'static str {
        match self {
            Unit::Requests => "requests",
            Unit::Cents => "cents",
        }
    }
}

impl FromStr for Unit {
    type Err = PolicyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "requests" => Ok(Unit::Requests),
            "cents" => Ok(Unit::Cents),
            other => Err(PolicyParseError::UnknownUnit(other.to_string())),
        }
    }
}

/// The dimension a quota is scoped to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub enum Segment {
    /// One budget shared by every request.
    #[default]
    Global,
    /// One budget per user id.
    User,
    /// One budget per property value. When no name is given the request's
    /// single custom property is used.
    Property(Option<String>),
}

impl FromStr for Segment {
    type Err = PolicyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Segment::User),
            "property" => Ok(Segment::Property(None)),
            other => Err(PolicyParseError::UnknownSegment(other.to_string())),
        }
    }
}

/// A parsed rate limit rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Policy {
    quota: u64,
    window_seconds: u64,
    unit: Unit,
    segment: Segment,
}

impl Policy {
    /// Build a policy directly. Returns `None` when `quota` or
    /// `window_seconds` is zero.
    pub fn new(quota: u64, window_seconds: u64) -> Option<Self> {
        if quota == 0 || window_seconds == 0 {
            return None;
        }
        Some(Self {
            quota,
            window_seconds,
            unit: Unit::Requests,
            segment: Segment::Global,
        })
    }

    pub fn with_unit(mut self, unit: Unit) -> Self {
        self.unit = unit;
        self
    }

    pub fn with_segment(mut self, segment: Segment) -> Self {
        self.segment = segment;
        self
    }

    /// Maximum consumption allowed within one window.
    pub fn quota(&self) -> u64 {
        self.quota
    }

    pub fn window_seconds(&self) -> u64 {
        self.window_seconds
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_seconds)
    }

    pub fn unit(&self) -> Unit {
        self.unit
    }

    pub fn segment(&self) -> &Segment {
        &self.segment
    }
}

impl FromStr for Policy {
    type Err = PolicyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(';').map(str::trim);

        let quota_str = match parts.next() {
            Some(q) if !q.is_empty() => q,
            _ => return Err(PolicyParseError::Empty),
        };
        let quota = parse_positive(quota_str)
            .ok_or_else(|| PolicyParseError::InvalidQuota(quota_str.to_string()))?;

        let mut window = None;
        let mut unit = None;
        let mut segment = None;

        for part in parts {
            let (name, value) = part
                .split_once('=')
                .map(|(n, v)| (n.trim(), v.trim()))
                .ok_or_else(|| PolicyParseError::UnknownParameter(part.to_string()))?;

            match name {
                "w" => {
                    if window.is_some() {
                        return Err(PolicyParseError::DuplicateParameter(name.to_string()));
                    }
                    let secs = parse_positive(value)
                        .ok_or_else(|| PolicyParseError::InvalidWindow(value.to_string()))?;
                    window = Some(secs);
                }
                "u" => {
                    if unit.is_some() {
                        return Err(PolicyParseError::DuplicateParameter(name.to_string()));
                    }
                    unit = Some(value.parse::<Unit>()?);
                }
                "s" => {
                    if segment.is_some() {
                        return Err(PolicyParseError::DuplicateParameter(name.to_string()));
                    }
                    segment = Some(value.parse::<Segment>()?);
                }
                _ => return Err(PolicyParseError::UnknownParameter(part.to_string())),
            }
        }

        Ok(Policy {
            quota,
            window_seconds: window.ok_or(PolicyParseError::MissingWindow)?,
            unit: unit.unwrap_or_default(),
            segment: segment.unwrap_or_default(),
        })
    }
}

fn parse_positive(s: &str) -> Option<u64> {
    // u64::from_str accepts a leading '+', the policy grammar does not.
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse::<u64>().ok().filter(|n| *n > 0)
}

/// Canonical textual form. Named property segments have no textual syntax
/// and are written as plain `s=property`.
impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{};w={};u={}",
            self.quota,
            self.window_seconds,
            self.unit.as_str()
        )?;
        match &self.segment {
            Segment::Global => Ok(()),
            Segment::User => write!(f, ";s=user"),
            Segment::Property(_) => write!(f, ";s=property"),
        }
    }
}
