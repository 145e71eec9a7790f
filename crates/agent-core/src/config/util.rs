use std::path::PathBuf;

pub(super) fn non_empty(v: Option<String>) -> Option<String> {
    v.filter(|s| !s.trim().is_empty())
}

pub(super) fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|v| non_empty(Some(v)))
}

pub(super) fn env_parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
    env_non_empty(name).and_then(|v| v.trim().parse::<T>().ok())
}

pub(super) fn env_bool(name: &str) -> Option<bool> {
    env_non_empty(name).and_then(|v| parse_bool(&v))
}

pub(super) fn env_path(name: &str) -> Option<PathBuf> {
    env_non_empty(name).map(|v| PathBuf::from(v.trim()))
}

pub(super) fn split_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(|v| v.to_string())
        .collect()
}

/// Trimmed, non-empty ids; `None` when nothing is left.
pub(super) fn clean_ids(ids: Vec<String>) -> Option<Vec<String>> {
    let ids: Vec<String> = ids
        .into_iter()
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .collect();
    if ids.is_empty() {
        None
    } else {
        Some(ids)
    }
}

/// `None` for anything that is not a recognised boolean word.
pub(super) fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "enabled" | "on" => Some(true),
        "0" | "false" | "no" | "disabled" | "off" => Some(false),
        _ => None,
    }
}

pub(super) fn mb_to_bytes(mb: u64) -> u64 {
    mb.saturating_mul(1024 * 1024)
}
