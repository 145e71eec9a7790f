//! Security policy snapshot via `secedit /export`.
//!
//! The export is written to a uniquely named temporary file that is removed
//! when the [`tempfile::TempPath`] guard drops, so the snapshot never
//! outlives the read regardless of how it ends.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use tempfile::TempPath;

use super::{invoke_tool_status, ExportKind, PolicyData, ReadError};
use crate::runner::CommandRunner;
use crate::windows_cmd::SECEDIT_EXE;

/// Allocate a scoped temp path with the given suffix, in `dir` when provided.
pub fn scoped_temp_path(prefix: &str, suffix: &str, dir: Option<&Path>) -> std::io::Result<TempPath> {
    let mut builder = tempfile::Builder::new();
    builder.prefix(prefix).suffix(suffix);
    let file = match dir {
        Some(dir) => builder.tempfile_in(dir)?,
        None => builder.tempfile()?,
    };
    // Close our handle so secedit can replace the file; the path guard keeps
    // delete-on-drop.
    Ok(file.into_temp_path())
}

/// Export the local security policy and parse it into a case-insensitive
/// key map (keys lowercased).
pub fn export_security_policy(
    runner: &dyn CommandRunner,
    timeout: Duration,
    temp_dir: Option<&Path>,
) -> Result<HashMap<String, String>, ReadError> {
    let snapshot = scoped_temp_path("cisguard-secpol-", ".inf", temp_dir)
        .map_err(|err| ReadError::ToolInvocation(format!("failed creating export file: {}", err)))?;

    let args = vec![
        "/export".to_string(),
        "/cfg".to_string(),
        snapshot.to_string_lossy().into_owned(),
        "/areas".to_string(),
        "SECURITYPOLICY".to_string(),
        "USER_RIGHTS".to_string(),
        "/quiet".to_string(),
    ];
    invoke_tool_status(runner, SECEDIT_EXE, &args, timeout)?;

    let bytes = fs::read(&snapshot)
        .map_err(|err| ReadError::ToolInvocation(format!("failed reading export: {}", err)))?;
    let entries = parse_export(&decode_export(&bytes));
    if entries.is_empty() {
        return Err(ReadError::ParseMiss("security export contained no settings".to_string()));
    }
    Ok(entries)
}

/// secedit writes UTF-16LE with a BOM; tolerate UTF-8 as well.
pub fn decode_export(bytes: &[u8]) -> String {
    if let Some(body) = bytes.strip_prefix(&[0xFF, 0xFE]) {
        let units: Vec<u16> = body
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    let body = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes);
    String::from_utf8_lossy(body).into_owned()
}

/// Parse INI-style `Key = Value` lines; sections and comments are skipped.
pub fn parse_export(text: &str) -> HashMap<String, String> {
    let mut entries = HashMap::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with(';') || line.starts_with('[') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        entries
            .entry(key.to_ascii_lowercase())
            .or_insert_with(|| value.trim().trim_matches('"').to_string());
    }
    entries
}

pub fn lookup(
    entries: &HashMap<String, String>,
    key: &str,
    kind: ExportKind,
) -> Result<(PolicyData, String), ReadError> {
    let found = entries.get(&key.to_ascii_lowercase());
    match (kind, found) {
        (ExportKind::Integer, Some(value)) => value
            .parse::<i64>()
            .map(|v| (PolicyData::Integer(v), format!("{} = {}", key, value)))
            .map_err(|_| ReadError::ParseMiss(format!("'{}' has non-numeric value '{}'", key, value))),
        (ExportKind::Integer, None) => Err(ReadError::ParseMiss(format!(
            "'{}' not present in security export",
            key
        ))),
        (ExportKind::SidList, Some(value)) => {
            Ok((PolicyData::Text(value.clone()), format!("{} = {}", key, value)))
        }
        (ExportKind::SidList, None) => Ok((PolicyData::Text(String::new()), String::new())),
    }
}
