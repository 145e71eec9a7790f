//! `net accounts` output parsing.
//!
//! Output is a list of `Label:   value` lines. Some values are words rather
//! than numbers (`Unlimited`, `Never`, `None`); those are policy sentinels and
//! normalise to `0` instead of failing the parse.

use regex::Regex;

use super::{PolicyData, ReadError};

/// Extract one labelled integer. Returns the value and the matched line.
pub fn parse_value(
    output: &str,
    label: &str,
    sentinels: &[&str],
) -> Result<(PolicyData, String), ReadError> {
    let pattern = format!(r"(?mi)^[ \t]*{}[ \t]*:[ \t]*(\S[^\r\n]*?)[ \t]*\r?$", regex::escape(label));
    // The label is escaped, so the pattern is always valid.
    let re = Regex::new(&pattern).map_err(|err| ReadError::ParseMiss(err.to_string()))?;

    let captures = re
        .captures(output)
        .ok_or_else(|| ReadError::ParseMiss(format!("'{}' not present in net accounts output", label)))?;
    let line = captures
        .get(0)
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default();
    let value = captures.get(1).map(|m| m.as_str().trim()).unwrap_or_default();

    if sentinels.iter().any(|s| s.eq_ignore_ascii_case(value)) {
        return Ok((PolicyData::Integer(0), line));
    }

    value
        .parse::<i64>()
        .map(|v| (PolicyData::Integer(v), line))
        .map_err(|_| ReadError::ParseMiss(format!("'{}' has non-numeric value '{}'", label, value)))
}
