use std::path::PathBuf;

use audit_log::LogLevel;
use compliance::Selection;

use super::constants::{
    DEFAULT_LOG_MAX_SIZE_MB, DEFAULT_LOG_MODULE, DEFAULT_LOG_PATH, DEFAULT_QUERY_TIMEOUT_SECS,
    DEFAULT_REMEDIATION_TIMEOUT_SECS,
};
use super::types::{AgentConfig, LogSettings, ReaderConfig, RemediationConfig};
use super::util::mb_to_bytes;

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            log: LogSettings::default(),
            reader: ReaderConfig::default(),
            selection: Selection::all(),
            remediation: RemediationConfig::default(),
            catalog_path: None,
        }
    }
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_LOG_PATH),
            level: LogLevel::Information,
            console: true,
            max_size_bytes: mb_to_bytes(DEFAULT_LOG_MAX_SIZE_MB),
            module: DEFAULT_LOG_MODULE.to_string(),
        }
    }
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            query_timeout_secs: DEFAULT_QUERY_TIMEOUT_SECS,
            temp_dir: None,
        }
    }
}

impl Default for RemediationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            simulate: true,
            exclude_high_impact: true,
            auto_approve: false,
            control_ids: None,
            timeout_secs: DEFAULT_REMEDIATION_TIMEOUT_SECS,
        }
    }
}
