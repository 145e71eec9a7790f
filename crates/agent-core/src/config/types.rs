use std::path::PathBuf;
use std::time::Duration;

use audit_log::{AuditLogConfig, LogLevel};
use compliance::{Authorizer, ExecutionMode, RemediationOptions, Selection};
use platform_windows::ReaderSettings;

/// Runtime configuration, built once in `main` and passed down.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentConfig {
    pub log: LogSettings,
    pub reader: ReaderConfig,
    pub selection: Selection,
    pub remediation: RemediationConfig,
    /// Replacement benchmark definition; the packaged one is used when unset.
    pub catalog_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogSettings {
    pub path: PathBuf,
    pub level: LogLevel,
    pub console: bool,
    pub max_size_bytes: u64,
    pub module: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaderConfig {
    pub query_timeout_secs: u64,
    pub temp_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemediationConfig {
    /// Run remediation after `check` evaluates.
    pub enabled: bool,
    pub simulate: bool,
    pub exclude_high_impact: bool,
    pub auto_approve: bool,
    pub control_ids: Option<Vec<String>>,
    pub timeout_secs: u64,
}

impl AgentConfig {
    pub fn audit_log_config(&self) -> AuditLogConfig {
        AuditLogConfig {
            path: self.log.path.clone(),
            min_level: self.log.level,
            console: self.log.console,
            max_size_bytes: self.log.max_size_bytes,
            module: self.log.module.clone(),
        }
    }

    pub fn reader_settings(&self) -> ReaderSettings {
        ReaderSettings {
            query_timeout: Duration::from_secs(self.reader.query_timeout_secs),
            temp_dir: self.reader.temp_dir.clone(),
        }
    }

    pub fn remediation_timeout(&self) -> Duration {
        Duration::from_secs(self.remediation.timeout_secs)
    }

    pub fn execution_mode(&self) -> ExecutionMode {
        if self.remediation.simulate {
            ExecutionMode::Simulate
        } else {
            ExecutionMode::Apply
        }
    }

    /// Operator consent is only asked for when changes are applied and
    /// `auto_approve` is off.
    pub fn needs_confirmation(&self) -> bool {
        self.execution_mode() == ExecutionMode::Apply && !self.remediation.auto_approve
    }

    pub fn remediation_options(&self, authorizer: Option<Authorizer>) -> RemediationOptions {
        RemediationOptions {
            control_ids: self.remediation.control_ids.clone(),
            exclude_high_impact: self.remediation.exclude_high_impact,
            mode: self.execution_mode(),
            authorizer,
        }
    }
}
