//! Audit-log crate: durable, leveled, structured audit trail.
//!
//! Entries are appended as one JSON object per line. Writes below the
//! configured level are dropped before any I/O, sink failures are reported on
//! `tracing` and never returned, and the sink is archived to
//! `<file>.<yyyyMMdd-HHmmss>.old` once it grows past the size threshold.

mod console;
mod query;
mod sink;

use std::collections::BTreeMap;
use std::fmt;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use query::{read_entries, EntryFilter};

const DEFAULT_MAX_SIZE_BYTES: u64 = 10 * 1024 * 1024;

// ── Entry model ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LogLevel {
    Verbose,
    Information,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Verbose => "Verbose",
            Self::Information => "Information",
            Self::Warning => "Warning",
            Self::Error => "Error",
            Self::Critical => "Critical",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "verbose" | "debug" | "trace" => Some(Self::Verbose),
            "information" | "info" => Some(Self::Information),
            "warning" | "warn" => Some(Self::Warning),
            "error" => Some(Self::Error),
            "critical" | "fatal" => Some(Self::Critical),
            _ => None,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operation {
    Check,
    Remediation,
    Report,
    Export,
    General,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Check => "Check",
            Self::Remediation => "Remediation",
            Self::Report => "Report",
            Self::Export => "Export",
            Self::General => "General",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal outcome of one remediation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RemediationStatus {
    Success,
    Failed,
    Skipped,
    WhatIf,
}

impl RemediationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "Success",
            Self::Failed => "Failed",
            Self::Skipped => "Skipped",
            Self::WhatIf => "WhatIf",
        }
    }

    pub fn log_level(self) -> LogLevel {
        match self {
            Self::Success | Self::WhatIf => LogLevel::Information,
            Self::Failed => LogLevel::Error,
            Self::Skipped => LogLevel::Warning,
        }
    }
}

impl fmt::Display for RemediationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who produced an entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    pub user: String,
    pub host: String,
    pub process_id: u32,
    pub process_name: String,
}

impl Actor {
    pub fn current() -> Self {
        let user = env_first(&["USERNAME", "USER"]).unwrap_or_else(|| "unknown".to_string());
        let host = env_first(&["COMPUTERNAME", "HOSTNAME"]).unwrap_or_else(|| "localhost".to_string());
        let process_name = std::env::current_exe()
            .ok()
            .and_then(|p| p.file_stem().map(|s| s.to_string_lossy().into_owned()))
            .unwrap_or_else(|| "unknown".to_string());
        Self {
            user,
            host,
            process_id: std::process::id(),
            process_name,
        }
    }
}

fn env_first(names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|name| std::env::var(name).ok())
        .find(|v| !v.trim().is_empty())
}

/// Ordered key/value context attached to an entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogContext(BTreeMap<String, Value>);

impl LogContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogEntry {
    pub timestamp: DateTime<Utc>,
    /// Per-process, strictly increasing.
    pub sequence: u64,
    pub level: LogLevel,
    pub operation: Operation,
    pub message: String,
    pub module: String,
    #[serde(default)]
    pub context: LogContext,
    pub actor: Actor,
}

#[derive(Debug)]
pub enum AuditLogError {
    Io(io::Error),
}

impl fmt::Display for AuditLogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "io error: {}", err),
        }
    }
}

impl std::error::Error for AuditLogError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
        }
    }
}

impl From<io::Error> for AuditLogError {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

// ── Logger ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct AuditLogConfig {
    pub path: PathBuf,
    pub min_level: LogLevel,
    /// Default console mirroring for [`AuditLog::write`].
    pub console: bool,
    pub max_size_bytes: u64,
    pub module: String,
}

impl Default for AuditLogConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("cisguard-audit.log"),
            min_level: LogLevel::Information,
            console: true,
            max_size_bytes: DEFAULT_MAX_SIZE_BYTES,
            module: "cisguard".to_string(),
        }
    }
}

struct LogState {
    sequence: u64,
    last_timestamp: Option<DateTime<Utc>>,
    console: Box<dyn Write + Send>,
}

/// Append-only audit sink. Appends and rotation happen under one lock, so a
/// shared `AuditLog` can be written from several threads without interleaving
/// partial records.
pub struct AuditLog {
    config: AuditLogConfig,
    actor: Actor,
    state: Mutex<LogState>,
}

impl AuditLog {
    pub fn new(config: AuditLogConfig) -> Self {
        Self {
            config,
            actor: Actor::current(),
            state: Mutex::new(LogState {
                sequence: 0,
                last_timestamp: None,
                console: Box::new(io::stderr()),
            }),
        }
    }

    /// Replace the console mirror target (stderr by default).
    pub fn with_console(mut self, console: Box<dyn Write + Send>) -> Self {
        let state = self.state.get_mut().unwrap_or_else(|p| p.into_inner());
        state.console = console;
        self
    }

    pub fn with_actor(mut self, actor: Actor) -> Self {
        self.actor = actor;
        self
    }

    pub fn config(&self) -> &AuditLogConfig {
        &self.config
    }

    pub fn enabled(&self, level: LogLevel) -> bool {
        level >= self.config.min_level
    }

    /// Write an entry, mirroring to the console per configuration.
    pub fn write(&self, level: LogLevel, operation: Operation, message: impl Into<String>, context: LogContext) {
        self.write_with(level, operation, message, context, self.config.console);
    }

    /// Write an entry with explicit console mirroring.
    pub fn write_with(
        &self,
        level: LogLevel,
        operation: Operation,
        message: impl Into<String>,
        context: LogContext,
        mirror_to_console: bool,
    ) {
        if !self.enabled(level) {
            return;
        }

        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let now = Utc::now();
        let timestamp = match state.last_timestamp {
            Some(last) if last > now => last,
            _ => now,
        };
        state.last_timestamp = Some(timestamp);
        state.sequence += 1;

        let entry = AuditLogEntry {
            timestamp,
            sequence: state.sequence,
            level,
            operation,
            message: message.into(),
            module: self.config.module.clone(),
            context,
            actor: self.actor.clone(),
        };

        match serde_json::to_string(&entry) {
            Ok(line) => sink::append_and_rotate(&self.config.path, &line, self.config.max_size_bytes),
            Err(err) => tracing::warn!(error = %err, "audit entry could not be serialized"),
        }

        if mirror_to_console {
            let rendered = console::render(&entry);
            if let Err(err) = writeln!(state.console, "{}", rendered) {
                tracing::warn!(error = %err, "audit console mirror write failed");
            }
        }
    }

    pub fn verbose(&self, operation: Operation, message: impl Into<String>, context: LogContext) {
        self.write(LogLevel::Verbose, operation, message, context);
    }

    pub fn info(&self, operation: Operation, message: impl Into<String>, context: LogContext) {
        self.write(LogLevel::Information, operation, message, context);
    }

    pub fn warning(&self, operation: Operation, message: impl Into<String>, context: LogContext) {
        self.write(LogLevel::Warning, operation, message, context);
    }

    pub fn error(&self, operation: Operation, message: impl Into<String>, context: LogContext) {
        self.write(LogLevel::Error, operation, message, context);
    }

    /// Record a remediation outcome. The level follows the status: success and
    /// simulation are informational, skips are warnings, failures are errors.
    pub fn log_remediation(
        &self,
        control_id: &str,
        status: RemediationStatus,
        what_if: bool,
        message: impl Into<String>,
        extra: LogContext,
    ) {
        let mut context = extra;
        context.insert("controlId", control_id);
        context.insert("action", "remediate");
        context.insert("result", status.as_str());
        context.insert("whatIf", what_if);
        self.write(status.log_level(), Operation::Remediation, message, context);
    }
}
