//! Security policy readers.
//!
//! Each reader turns one named policy query into a [`PolicyValue`] by running
//! a native inspection tool and parsing its text output. Readers never fail
//! outward: tool errors, timeouts, parse misses and unsupported hosts all
//! surface as [`PolicyValue::error`].

pub mod auditpol;
pub mod net_accounts;
pub mod privilege;
pub mod secedit;

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::runner::{CommandOutput, CommandRunner};
use crate::windows_cmd::{AUDITPOL_EXE, NET_EXE};

pub use auditpol::{AuditInventory, AuditRow};

const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(5);

// ── Value model ────────────────────────────────────────────────────────

/// Success/failure auditing flags of one audit subcategory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AuditSetting {
    pub success: bool,
    pub failure: bool,
}

impl AuditSetting {
    pub const NONE: Self = Self {
        success: false,
        failure: false,
    };

    pub fn new(success: bool, failure: bool) -> Self {
        Self { success, failure }
    }

    /// Classify an `auditpol` setting column. Unknown text yields `None`.
    pub fn from_setting_text(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "success and failure" => Some(Self::new(true, true)),
            "success" => Some(Self::new(true, false)),
            "failure" => Some(Self::new(false, true)),
            "no auditing" => Some(Self::NONE),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match (self.success, self.failure) {
            (true, true) => "Success and Failure",
            (true, false) => "Success",
            (false, true) => "Failure",
            (false, false) => "No Auditing",
        }
    }
}

/// Typed payload of a successful read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PolicyData {
    Integer(i64),
    Audit(AuditSetting),
    Text(String),
}

impl fmt::Display for PolicyData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(v) => write!(f, "{}", v),
            Self::Audit(setting) => f.write_str(setting.label()),
            Self::Text(text) => f.write_str(text),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadError {
    UnsupportedPlatform,
    ToolInvocation(String),
    Timeout { program: String, after: Duration },
    ParseMiss(String),
}

impl fmt::Display for ReadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedPlatform => f.write_str("unsupported platform"),
            Self::ToolInvocation(msg) => write!(f, "tool invocation failed: {}", msg),
            Self::Timeout { program, after } => {
                write!(f, "{} timed out after {}s", program, after.as_secs_f32())
            }
            Self::ParseMiss(msg) => write!(f, "expected value not found: {}", msg),
        }
    }
}

impl std::error::Error for ReadError {}

/// Result of one raw inspection. Exactly one of `value` / `error` is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyValue {
    pub name: String,
    pub value: Option<PolicyData>,
    pub raw: Option<String>,
    pub error: Option<ReadError>,
}

impl PolicyValue {
    pub fn ok(name: impl Into<String>, value: PolicyData, raw: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: Some(value),
            raw: Some(raw.into()),
            error: None,
        }
    }

    pub fn failed(name: impl Into<String>, error: ReadError) -> Self {
        Self {
            name: name.into(),
            value: None,
            raw: None,
            error: Some(error),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none() && self.value.is_some()
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self.value {
            Some(PolicyData::Integer(v)) => Some(v),
            _ => None,
        }
    }
}

// ── Policy catalogue ───────────────────────────────────────────────────

/// Closed set of policies the readers know how to extract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PolicyName {
    PasswordHistory,
    MaxPasswordAge,
    MinPasswordAge,
    MinPasswordLength,
    PasswordComplexity,
    ReversibleEncryption,
    LockoutDuration,
    LockoutThreshold,
    LockoutWindow,
    ForceLogoff,
    GuestAccountStatus,
    AnonymousSidLookup,
    NetworkAccessRight,
}

/// Where a policy value comes from and how it is shaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueOrigin {
    /// A labelled line of `net accounts` output. Sentinel words normalise to 0.
    NetAccounts {
        label: &'static str,
        sentinels: &'static [&'static str],
    },
    /// A key of the `secedit /export` snapshot.
    SecurityExport { key: &'static str, kind: ExportKind },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportKind {
    Integer,
    /// User-right assignment; an absent key means nobody holds the right.
    SidList,
}

impl PolicyName {
    pub const ALL: [PolicyName; 13] = [
        Self::PasswordHistory,
        Self::MaxPasswordAge,
        Self::MinPasswordAge,
        Self::MinPasswordLength,
        Self::PasswordComplexity,
        Self::ReversibleEncryption,
        Self::LockoutDuration,
        Self::LockoutThreshold,
        Self::LockoutWindow,
        Self::ForceLogoff,
        Self::GuestAccountStatus,
        Self::AnonymousSidLookup,
        Self::NetworkAccessRight,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::PasswordHistory => "PasswordHistory",
            Self::MaxPasswordAge => "MaxPasswordAge",
            Self::MinPasswordAge => "MinPasswordAge",
            Self::MinPasswordLength => "MinPasswordLength",
            Self::PasswordComplexity => "PasswordComplexity",
            Self::ReversibleEncryption => "ReversibleEncryption",
            Self::LockoutDuration => "LockoutDuration",
            Self::LockoutThreshold => "LockoutThreshold",
            Self::LockoutWindow => "LockoutWindow",
            Self::ForceLogoff => "ForceLogoff",
            Self::GuestAccountStatus => "GuestAccountStatus",
            Self::AnonymousSidLookup => "AnonymousSidLookup",
            Self::NetworkAccessRight => "NetworkAccessRight",
        }
    }

    pub fn origin(self) -> ValueOrigin {
        use ValueOrigin::{NetAccounts, SecurityExport};
        match self {
            Self::PasswordHistory => NetAccounts {
                label: "Length of password history maintained",
                sentinels: &["None"],
            },
            Self::MaxPasswordAge => NetAccounts {
                label: "Maximum password age (days)",
                sentinels: &["Unlimited"],
            },
            Self::MinPasswordAge => NetAccounts {
                label: "Minimum password age (days)",
                sentinels: &[],
            },
            Self::MinPasswordLength => NetAccounts {
                label: "Minimum password length",
                sentinels: &[],
            },
            Self::LockoutDuration => NetAccounts {
                label: "Lockout duration (minutes)",
                sentinels: &["Never"],
            },
            Self::LockoutThreshold => NetAccounts {
                label: "Lockout threshold",
                sentinels: &["Never"],
            },
            Self::LockoutWindow => NetAccounts {
                label: "Lockout observation window (minutes)",
                sentinels: &[],
            },
            Self::ForceLogoff => NetAccounts {
                label: "Force user logoff how long after time expires?",
                sentinels: &["Never"],
            },
            Self::PasswordComplexity => SecurityExport {
                key: "PasswordComplexity",
                kind: ExportKind::Integer,
            },
            Self::ReversibleEncryption => SecurityExport {
                key: "ClearTextPassword",
                kind: ExportKind::Integer,
            },
            Self::GuestAccountStatus => SecurityExport {
                key: "EnableGuestAccount",
                kind: ExportKind::Integer,
            },
            Self::AnonymousSidLookup => SecurityExport {
                key: "LSAAnonymousNameLookup",
                kind: ExportKind::Integer,
            },
            Self::NetworkAccessRight => SecurityExport {
                key: "SeNetworkLogonRight",
                kind: ExportKind::SidList,
            },
        }
    }
}

impl fmt::Display for PolicyName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Reader ─────────────────────────────────────────────────────────────

/// Host classification used by the platform gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostPlatform {
    Windows,
    Unsupported(&'static str),
}

impl HostPlatform {
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Self::Windows
        } else {
            Self::Unsupported(std::env::consts::OS)
        }
    }

    pub fn is_windows(self) -> bool {
        matches!(self, Self::Windows)
    }
}

#[derive(Debug, Clone)]
pub struct ReaderSettings {
    pub query_timeout: Duration,
    /// Directory for exported snapshots; the system temp dir when unset.
    pub temp_dir: Option<PathBuf>,
}

impl Default for ReaderSettings {
    fn default() -> Self {
        Self {
            query_timeout: DEFAULT_QUERY_TIMEOUT,
            temp_dir: None,
        }
    }
}

/// Read access to live policy state. Implemented by [`PolicyReader`]; the
/// evaluation engine depends only on this trait.
pub trait PolicyInspector: Send + Sync {
    fn read_policy(&self, name: PolicyName) -> PolicyValue;
    fn read_audit_subcategory(&self, subcategory: &str) -> PolicyValue;
    fn is_elevated(&self) -> bool;
}

pub struct PolicyReader {
    runner: Arc<dyn CommandRunner>,
    platform: HostPlatform,
    settings: ReaderSettings,
}

impl PolicyReader {
    pub fn new(runner: Arc<dyn CommandRunner>, settings: ReaderSettings) -> Self {
        Self {
            runner,
            platform: HostPlatform::current(),
            settings,
        }
    }

    /// Override host detection, e.g. to exercise parsers off-Windows.
    pub fn with_platform(mut self, platform: HostPlatform) -> Self {
        self.platform = platform;
        self
    }

    pub fn platform(&self) -> HostPlatform {
        self.platform
    }

    pub fn settings(&self) -> &ReaderSettings {
        &self.settings
    }

    pub fn read(&self, name: PolicyName) -> PolicyValue {
        self.read_many(&[name]).pop().unwrap_or_else(|| {
            PolicyValue::failed(name.as_str(), ReadError::ParseMiss("no value".to_string()))
        })
    }

    /// Read several policies, sharing one `net accounts` call and one export
    /// between them. Output order matches `names`.
    pub fn read_many(&self, names: &[PolicyName]) -> Vec<PolicyValue> {
        if !self.platform.is_windows() {
            return names
                .iter()
                .map(|name| PolicyValue::failed(name.as_str(), ReadError::UnsupportedPlatform))
                .collect();
        }

        let mut net_accounts: Option<Result<String, ReadError>> = None;
        let mut export: Option<Result<HashMap<String, String>, ReadError>> = None;

        names
            .iter()
            .map(|&name| {
                let parsed = match name.origin() {
                    ValueOrigin::NetAccounts { label, sentinels } => {
                        let output = net_accounts
                            .get_or_insert_with(|| self.invoke(NET_EXE, &["accounts".to_string()]));
                        output
                            .as_ref()
                            .map_err(ReadError::clone)
                            .and_then(|text| net_accounts::parse_value(text, label, sentinels))
                    }
                    ValueOrigin::SecurityExport { key, kind } => {
                        let snapshot = export.get_or_insert_with(|| self.export_snapshot());
                        snapshot
                            .as_ref()
                            .map_err(ReadError::clone)
                            .and_then(|entries| secedit::lookup(entries, key, kind))
                    }
                };
                finish(name.as_str(), parsed)
            })
            .collect()
    }

    pub fn read_audit_subcategory(&self, subcategory: &str) -> PolicyValue {
        if !self.platform.is_windows() {
            return PolicyValue::failed(subcategory, ReadError::UnsupportedPlatform);
        }
        let args = vec!["/get".to_string(), format!("/subcategory:{}", subcategory)];
        let parsed = self
            .invoke(AUDITPOL_EXE, &args)
            .and_then(|text| auditpol::parse_subcategory(&text, subcategory))
            .map(|(setting, raw)| (PolicyData::Audit(setting), raw));
        finish(subcategory, parsed)
    }

    /// Enumerate every audit subcategory with one `auditpol` call.
    pub fn read_audit_inventory(&self) -> AuditInventory {
        if !self.platform.is_windows() {
            return AuditInventory::failed(ReadError::UnsupportedPlatform);
        }
        let args = vec!["/get".to_string(), "/category:*".to_string()];
        match self.invoke(AUDITPOL_EXE, &args) {
            Ok(text) => auditpol::parse_inventory(&text),
            Err(err) => {
                tracing::warn!(error = %err, "audit policy inventory unavailable");
                AuditInventory::failed(err)
            }
        }
    }

    pub fn is_elevated(&self) -> bool {
        if !self.platform.is_windows() {
            return false;
        }
        privilege::is_elevated(self.runner.as_ref(), self.settings.query_timeout)
    }

    fn export_snapshot(&self) -> Result<HashMap<String, String>, ReadError> {
        secedit::export_security_policy(
            self.runner.as_ref(),
            self.settings.query_timeout,
            self.settings.temp_dir.as_deref(),
        )
    }

    fn invoke(&self, program: &str, args: &[String]) -> Result<String, ReadError> {
        invoke_tool(self.runner.as_ref(), program, args, self.settings.query_timeout)
    }
}

impl PolicyInspector for PolicyReader {
    fn read_policy(&self, name: PolicyName) -> PolicyValue {
        self.read(name)
    }

    fn read_audit_subcategory(&self, subcategory: &str) -> PolicyValue {
        PolicyReader::read_audit_subcategory(self, subcategory)
    }

    fn is_elevated(&self) -> bool {
        PolicyReader::is_elevated(self)
    }
}

/// Run a tool and require a zero exit code, mapping every failure mode to a
/// [`ReadError`].
pub(crate) fn invoke_tool_status(
    runner: &dyn CommandRunner,
    program: &str,
    args: &[String],
    timeout: Duration,
) -> Result<CommandOutput, ReadError> {
    let output = runner
        .run(program, args, timeout)
        .map_err(|err| map_io_error(program, timeout, err))?;
    if !output.success() {
        return Err(ReadError::ToolInvocation(format!(
            "{} {}",
            program,
            output.failure_detail()
        )));
    }
    Ok(output)
}

/// As [`invoke_tool_status`], additionally requiring non-empty stdout.
pub(crate) fn invoke_tool(
    runner: &dyn CommandRunner,
    program: &str,
    args: &[String],
    timeout: Duration,
) -> Result<String, ReadError> {
    let output = invoke_tool_status(runner, program, args, timeout)?;
    if output.stdout.trim().is_empty() {
        return Err(ReadError::ToolInvocation(format!("{} produced no output", program)));
    }
    Ok(output.stdout)
}

pub(crate) fn map_io_error(program: &str, timeout: Duration, err: io::Error) -> ReadError {
    match err.kind() {
        io::ErrorKind::TimedOut => ReadError::Timeout {
            program: program.to_string(),
            after: timeout,
        },
        io::ErrorKind::NotFound => ReadError::ToolInvocation(format!("{} not found", program)),
        _ => ReadError::ToolInvocation(format!("{}: {}", program, err)),
    }
}

fn finish(name: &str, parsed: Result<(PolicyData, String), ReadError>) -> PolicyValue {
    match parsed {
        Ok((value, raw)) => PolicyValue::ok(name, value, raw),
        Err(err) => {
            tracing::warn!(policy = name, error = %err, "policy read failed");
            PolicyValue::failed(name, err)
        }
    }
}
