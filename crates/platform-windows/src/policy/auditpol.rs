//! `auditpol /get` output parsing.
//!
//! Rows are column-aligned with runs of spaces, e.g.
//!
//! ```text
//! System audit policy
//! Category/Subcategory                      Setting
//! Logon/Logoff
//!   Logon                                   Success and Failure
//!   Special Logon                           Success
//! ```
//!
//! Subcategory names are matched against the whole name column, never as a
//! substring, so `Logon` does not match the `Special Logon` row.

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::{AuditSetting, ReadError};

/// One subcategory row of a bulk enumeration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRow {
    /// Most recent category header seen above this row.
    pub category: Option<String>,
    pub subcategory: String,
    pub setting: AuditSetting,
    pub raw: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditInventory {
    pub rows: Vec<AuditRow>,
    pub error: Option<ReadError>,
}

impl AuditInventory {
    pub fn failed(error: ReadError) -> Self {
        Self {
            rows: Vec::new(),
            error: Some(error),
        }
    }

    pub fn get(&self, subcategory: &str) -> Option<&AuditRow> {
        self.rows
            .iter()
            .find(|row| row.subcategory.eq_ignore_ascii_case(subcategory.trim()))
    }

    pub fn in_category<'a>(&'a self, category: &'a str) -> impl Iterator<Item = &'a AuditRow> + 'a {
        self.rows.iter().filter(move |row| {
            row.category
                .as_deref()
                .is_some_and(|c| c.eq_ignore_ascii_case(category))
        })
    }
}

fn column_splitter() -> Regex {
    // Constant pattern.
    Regex::new(r"\s{2,}|\t+").expect("column splitter pattern is valid")
}

fn is_banner(line: &str) -> bool {
    let lower = line.to_ascii_lowercase();
    lower.starts_with("system audit policy") || lower.starts_with("category/subcategory")
}

/// Split a row into (name, setting) columns. Rows with a single column are
/// headers or banners.
fn split_row<'a>(splitter: &Regex, line: &'a str) -> Option<(&'a str, &'a str)> {
    let fields: Vec<&str> = splitter
        .split(line.trim())
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .collect();
    match fields.as_slice() {
        [name, .., setting] => Some((*name, *setting)),
        _ => None,
    }
}

/// Find the first row whose name column equals `subcategory` and classify it.
/// Scanning stops at the first matching row.
pub fn parse_subcategory(output: &str, subcategory: &str) -> Result<(AuditSetting, String), ReadError> {
    let wanted = subcategory.trim();
    let splitter = column_splitter();

    for line in output.lines() {
        let Some((name, setting)) = split_row(&splitter, line) else {
            continue;
        };
        if !name.eq_ignore_ascii_case(wanted) {
            continue;
        }
        let raw = line.trim().to_string();
        return AuditSetting::from_setting_text(setting)
            .map(|parsed| (parsed, raw))
            .ok_or_else(|| {
                ReadError::ParseMiss(format!(
                    "unrecognised audit setting '{}' for '{}'",
                    setting, wanted
                ))
            });
    }

    Err(ReadError::ParseMiss(format!(
        "subcategory '{}' not present in auditpol output",
        wanted
    )))
}

/// Parse a `/category:*` listing. Single-column lines are category headers;
/// multi-column rows with an unrecognised setting are skipped.
pub fn parse_inventory(output: &str) -> AuditInventory {
    let splitter = column_splitter();
    let mut category: Option<String> = None;
    let mut rows = Vec::new();

    for line in output.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || is_banner(trimmed) {
            continue;
        }

        let Some((name, setting_text)) = split_row(&splitter, line) else {
            category = Some(trimmed.to_string());
            continue;
        };
        match AuditSetting::from_setting_text(setting_text) {
            Some(setting) => rows.push(AuditRow {
                category: category.clone(),
                subcategory: name.to_string(),
                setting,
                raw: trimmed.to_string(),
            }),
            None => tracing::warn!(row = trimmed, "skipping audit row with unrecognised setting"),
        }
    }

    if rows.is_empty() {
        return AuditInventory::failed(ReadError::ParseMiss(
            "no audit subcategory rows in auditpol output".to_string(),
        ));
    }
    AuditInventory { rows, error: None }
}
