use std::collections::BTreeSet;
use std::fmt;

use platform_windows::PolicyData;
use serde::{Deserialize, Serialize};

/// Expected state of one control, tested against the value a probe read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expectation {
    AtLeast(i64),
    AtMost(i64),
    Between { min: i64, max: i64 },
    /// `1..=n`; zero means "disabled" for this policy and fails.
    NonZeroAtMost(i64),
    Equals(i64),
    /// Required audit flags. Extra flags are allowed.
    Audit { success: bool, failure: bool },
    TextEquals(String),
    /// Order-insensitive SID list; leading `*` markers are ignored.
    SidSet(Vec<String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ValueKind {
    Integer,
    Audit,
    Text,
}

impl ValueKind {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::Audit => "audit setting",
            Self::Text => "text",
        }
    }
}

impl Expectation {
    pub(crate) fn kind(&self) -> ValueKind {
        match self {
            Self::AtLeast(_)
            | Self::AtMost(_)
            | Self::Between { .. }
            | Self::NonZeroAtMost(_)
            | Self::Equals(_) => ValueKind::Integer,
            Self::Audit { .. } => ValueKind::Audit,
            Self::TextEquals(_) | Self::SidSet(_) => ValueKind::Text,
        }
    }

    /// Check internal consistency of the bounds.
    pub(crate) fn validate(&self) -> std::result::Result<(), String> {
        match self {
            Self::Between { min, max } if min > max => {
                Err(format!("between bounds reversed ({} > {})", min, max))
            }
            Self::NonZeroAtMost(max) if *max < 1 => {
                Err(format!("non_zero_at_most bound must be positive, got {}", max))
            }
            Self::SidSet(sids) if sids.iter().any(|sid| sid.trim().is_empty()) => {
                Err("sid_set contains an empty entry".to_string())
            }
            _ => Ok(()),
        }
    }

    /// A value of the wrong shape never satisfies the expectation.
    pub fn is_satisfied_by(&self, value: &PolicyData) -> bool {
        match (self, value) {
            (Self::AtLeast(min), PolicyData::Integer(v)) => v >= min,
            (Self::AtMost(max), PolicyData::Integer(v)) => v <= max,
            (Self::Between { min, max }, PolicyData::Integer(v)) => (*min..=*max).contains(v),
            (Self::NonZeroAtMost(max), PolicyData::Integer(v)) => (1..=*max).contains(v),
            (Self::Equals(expected), PolicyData::Integer(v)) => v == expected,
            (Self::Audit { success, failure }, PolicyData::Audit(actual)) => {
                (!success || actual.success) && (!failure || actual.failure)
            }
            (Self::TextEquals(expected), PolicyData::Text(actual)) => {
                expected.trim().eq_ignore_ascii_case(actual.trim())
            }
            (Self::SidSet(expected), PolicyData::Text(actual)) => {
                normalize_sids(expected.iter().map(String::as_str)) == normalize_sids(actual.split(','))
            }
            _ => false,
        }
    }
}

fn normalize_sids<'a>(sids: impl Iterator<Item = &'a str>) -> BTreeSet<String> {
    sids.map(|sid| sid.trim().trim_start_matches('*').to_ascii_uppercase())
        .filter(|sid| !sid.is_empty())
        .collect()
}

impl fmt::Display for Expectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AtLeast(min) => write!(f, ">= {}", min),
            Self::AtMost(max) => write!(f, "<= {}", max),
            Self::Between { min, max } => write!(f, "{}..={}", min, max),
            Self::NonZeroAtMost(max) => write!(f, "1..={} (0 not allowed)", max),
            Self::Equals(expected) => write!(f, "= {}", expected),
            Self::Audit { success, failure } => match (success, failure) {
                (true, true) => f.write_str("Success and Failure"),
                (true, false) => f.write_str("Success"),
                (false, true) => f.write_str("Failure"),
                (false, false) => f.write_str("No Auditing"),
            },
            Self::TextEquals(expected) => write!(f, "\"{}\"", expected),
            Self::SidSet(sids) if sids.is_empty() => f.write_str("No One"),
            Self::SidSet(sids) => f.write_str(&sids.join(",")),
        }
    }
}
