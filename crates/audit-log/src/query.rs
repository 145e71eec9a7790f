//! Reading the audit trail back.

use std::fs;
use std::io;
use std::path::Path;

use crate::{AuditLogEntry, AuditLogError, LogLevel, Operation};

#[derive(Debug, Clone, Default)]
pub struct EntryFilter {
    pub min_level: Option<LogLevel>,
    pub operation: Option<Operation>,
    /// Matches the `controlId` context key.
    pub control_id: Option<String>,
}

impl EntryFilter {
    pub fn matches(&self, entry: &AuditLogEntry) -> bool {
        if self.min_level.is_some_and(|min| entry.level < min) {
            return false;
        }
        if self.operation.is_some_and(|op| entry.operation != op) {
            return false;
        }
        if let Some(control_id) = self.control_id.as_deref() {
            let found = entry
                .context
                .get("controlId")
                .and_then(|v| v.as_str())
                .is_some_and(|id| id == control_id);
            if !found {
                return false;
            }
        }
        true
    }
}

/// Parse the live sink at `path`. A missing file yields no entries; corrupt
/// lines are skipped with a warning.
pub fn read_entries(path: &Path, filter: &EntryFilter) -> Result<Vec<AuditLogEntry>, AuditLogError> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err.into()),
    };

    let mut entries = Vec::new();
    for (index, line) in raw.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<AuditLogEntry>(line) {
            Ok(entry) if filter.matches(&entry) => entries.push(entry),
            Ok(_) => {}
            Err(err) => {
                tracing::warn!(path = %path.display(), line = index + 1, error = %err, "skipping corrupt audit entry")
            }
        }
    }
    Ok(entries)
}
