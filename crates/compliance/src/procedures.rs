//! Built-in remediation procedures.
//!
//! Every procedure accepts an [`ExecutionMode`]. `Simulate` only describes the
//! change and never touches the runner; `Apply` runs the native tool through
//! the injected [`CommandRunner`].

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use platform_windows::policy::secedit::scoped_temp_path;
use platform_windows::windows_cmd::{AUDITPOL_EXE, NET_EXE, SECEDIT_EXE};
use platform_windows::{CommandOutput, CommandRunner};
use serde::{Deserialize, Serialize};

use crate::catalog::FixDefinition;
use crate::RemediationError;

const DEFAULT_REMEDIATION_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExecutionMode {
    Simulate,
    Apply,
}

impl ExecutionMode {
    pub fn is_simulate(self) -> bool {
        matches!(self, Self::Simulate)
    }
}

/// A per-control fix. Returns free text describing what happened (or, when
/// simulating, what would happen).
pub trait RemediationProcedure: Send + Sync {
    fn execute(&self, mode: ExecutionMode) -> Result<String, RemediationError>;

    fn describe(&self) -> String;
}

/// Scalar written by a fix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Integer(i64),
    Text(String),
}

impl fmt::Display for SettingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(v) => write!(f, "{}", v),
            Self::Text(text) => f.write_str(text),
        }
    }
}

/// Shared wiring for the built-in procedures.
#[derive(Clone)]
pub struct ProcedureContext {
    pub runner: Arc<dyn CommandRunner>,
    pub timeout: Duration,
    /// Scratch directory for security templates; system temp dir when unset.
    pub temp_dir: Option<PathBuf>,
}

impl ProcedureContext {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            timeout: DEFAULT_REMEDIATION_TIMEOUT,
            temp_dir: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_temp_dir(mut self, temp_dir: Option<PathBuf>) -> Self {
        self.temp_dir = temp_dir;
        self
    }

    pub(crate) fn build(&self, fix: &FixDefinition) -> Arc<dyn RemediationProcedure> {
        match fix {
            FixDefinition::NetAccounts { flag, value } => Arc::new(NetAccountsProcedure {
                runner: Arc::clone(&self.runner),
                timeout: self.timeout,
                flag: flag.clone(),
                value: value.clone(),
            }),
            FixDefinition::AuditPolicy {
                subcategory,
                success,
                failure,
            } => Arc::new(AuditPolicyProcedure {
                runner: Arc::clone(&self.runner),
                timeout: self.timeout,
                subcategory: subcategory.clone(),
                success: *success,
                failure: *failure,
            }),
            FixDefinition::SecurityTemplate { section, key, value } => {
                Arc::new(SecurityTemplateProcedure {
                    runner: Arc::clone(&self.runner),
                    timeout: self.timeout,
                    temp_dir: self.temp_dir.clone(),
                    section: section.clone(),
                    key: key.clone(),
                    value: value.clone(),
                })
            }
        }
    }
}

/// `net accounts /<flag>:<value>`.
pub struct NetAccountsProcedure {
    pub runner: Arc<dyn CommandRunner>,
    pub timeout: Duration,
    pub flag: String,
    pub value: SettingValue,
}

impl NetAccountsProcedure {
    fn switch(&self) -> String {
        format!("/{}:{}", self.flag, self.value)
    }
}

impl RemediationProcedure for NetAccountsProcedure {
    fn execute(&self, mode: ExecutionMode) -> Result<String, RemediationError> {
        if mode.is_simulate() {
            return Ok(format!("would run net accounts {}", self.switch()));
        }
        let args = vec!["accounts".to_string(), self.switch()];
        run_checked(self.runner.as_ref(), NET_EXE, &args, self.timeout)?;
        Ok(format!("net accounts {} applied", self.switch()))
    }

    fn describe(&self) -> String {
        format!("net accounts {}", self.switch())
    }
}

/// `auditpol /set /subcategory:<name>` enabling the required flags. Flags
/// not required are left as they are, unless neither is required, in which
/// case auditing is switched off.
pub struct AuditPolicyProcedure {
    pub runner: Arc<dyn CommandRunner>,
    pub timeout: Duration,
    pub subcategory: String,
    pub success: bool,
    pub failure: bool,
}

impl AuditPolicyProcedure {
    fn switches(&self) -> Vec<String> {
        if !self.success && !self.failure {
            return vec!["/success:disable".to_string(), "/failure:disable".to_string()];
        }
        let mut switches = Vec::new();
        if self.success {
            switches.push("/success:enable".to_string());
        }
        if self.failure {
            switches.push("/failure:enable".to_string());
        }
        switches
    }

    fn args(&self) -> Vec<String> {
        let mut args = vec!["/set".to_string(), format!("/subcategory:{}", self.subcategory)];
        args.extend(self.switches());
        args
    }
}

impl RemediationProcedure for AuditPolicyProcedure {
    fn execute(&self, mode: ExecutionMode) -> Result<String, RemediationError> {
        if mode.is_simulate() {
            return Ok(format!("would run {}", self.describe()));
        }
        run_checked(self.runner.as_ref(), AUDITPOL_EXE, &self.args(), self.timeout)?;
        Ok(format!(
            "audit policy for \"{}\" updated ({})",
            self.subcategory,
            self.switches().join(" ")
        ))
    }

    fn describe(&self) -> String {
        format!(
            "auditpol /set /subcategory:\"{}\" {}",
            self.subcategory,
            self.switches().join(" ")
        )
    }
}

/// Applies one security template setting with `secedit /configure`.
///
/// The template and the scratch database live in scoped temp locations that
/// are removed on every exit path.
pub struct SecurityTemplateProcedure {
    pub runner: Arc<dyn CommandRunner>,
    pub timeout: Duration,
    pub temp_dir: Option<PathBuf>,
    pub section: String,
    pub key: String,
    pub value: SettingValue,
}

impl SecurityTemplateProcedure {
    fn area(&self) -> &'static str {
        if self.section.eq_ignore_ascii_case("Privilege Rights") {
            "USER_RIGHTS"
        } else {
            "SECURITYPOLICY"
        }
    }

    fn configure(&self) -> Result<(), RemediationError> {
        let temp_dir = self.temp_dir.as_deref();
        let template = scoped_temp_path("cisguard-template-", ".inf", temp_dir)?;
        fs::write(&template, encode_template(&render_template(&self.section, &self.key, &self.value)))?;

        let database_dir = scratch_dir(temp_dir)?;
        let database = database_dir.path().join("cisguard.sdb");

        let args = vec![
            "/configure".to_string(),
            "/db".to_string(),
            database.to_string_lossy().into_owned(),
            "/cfg".to_string(),
            template.to_string_lossy().into_owned(),
            "/areas".to_string(),
            self.area().to_string(),
            "/quiet".to_string(),
        ];
        run_checked(self.runner.as_ref(), SECEDIT_EXE, &args, self.timeout)?;
        Ok(())
    }
}

impl RemediationProcedure for SecurityTemplateProcedure {
    fn execute(&self, mode: ExecutionMode) -> Result<String, RemediationError> {
        if mode.is_simulate() {
            return Ok(format!("would run {}", self.describe()));
        }
        self.configure()?;
        Ok(format!("[{}] {} set to {}", self.section, self.key, self.value))
    }

    fn describe(&self) -> String {
        format!(
            "secedit /configure /areas {} with [{}] {} = {}",
            self.area(),
            self.section,
            self.key,
            self.value
        )
    }
}

fn scratch_dir(dir: Option<&Path>) -> io::Result<tempfile::TempDir> {
    let mut builder = tempfile::Builder::new();
    builder.prefix("cisguard-db-");
    match dir {
        Some(dir) => builder.tempdir_in(dir),
        None => builder.tempdir(),
    }
}

pub(crate) fn render_template(section: &str, key: &str, value: &SettingValue) -> String {
    format!(
        "[Unicode]\r\nUnicode=yes\r\n[Version]\r\nsignature=\"$CHICAGO$\"\r\nRevision=1\r\n[{}]\r\n{} = {}\r\n",
        section, key, value
    )
}

/// UTF-16LE with BOM, the encoding `secedit` itself exports.
pub(crate) fn encode_template(text: &str) -> Vec<u8> {
    let mut bytes = vec![0xFF, 0xFE];
    for unit in text.encode_utf16() {
        bytes.extend_from_slice(&unit.to_le_bytes());
    }
    bytes
}

type ProcedureFn = dyn Fn(ExecutionMode) -> Result<String, RemediationError> + Send + Sync;

/// Closure-backed procedure for callers registering their own fixes.
pub struct FnProcedure {
    description: String,
    func: Box<ProcedureFn>,
}

impl FnProcedure {
    pub fn new<F>(description: impl Into<String>, func: F) -> Self
    where
        F: Fn(ExecutionMode) -> Result<String, RemediationError> + Send + Sync + 'static,
    {
        Self {
            description: description.into(),
            func: Box::new(func),
        }
    }
}

impl RemediationProcedure for FnProcedure {
    fn execute(&self, mode: ExecutionMode) -> Result<String, RemediationError> {
        (self.func)(mode)
    }

    fn describe(&self) -> String {
        self.description.clone()
    }
}

fn run_checked(
    runner: &dyn CommandRunner,
    program: &str,
    args: &[String],
    timeout: Duration,
) -> Result<CommandOutput, RemediationError> {
    let output = runner.run(program, args, timeout).map_err(|err| match err.kind() {
        io::ErrorKind::TimedOut => {
            RemediationError::Timeout(format!("{} after {}s", program, timeout.as_secs()))
        }
        io::ErrorKind::NotFound => RemediationError::Command(format!("{} not found", program)),
        _ => RemediationError::Io(err),
    })?;
    if !output.success() {
        return Err(RemediationError::Command(format!(
            "{} {}",
            program,
            output.failure_detail()
        )));
    }
    Ok(output)
}
