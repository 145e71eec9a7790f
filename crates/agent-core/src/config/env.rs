use audit_log::LogLevel;
use compliance::ControlCategory;

use super::types::AgentConfig;
use super::util::{
    clean_ids, env_bool, env_non_empty, env_parsed, env_path, mb_to_bytes, split_csv,
};

impl AgentConfig {
    pub(super) fn apply_env_overrides(&mut self) {
        self.apply_env_log();
        self.apply_env_reader();
        self.apply_env_selection();
        self.apply_env_remediation();
        if let Some(v) = env_path("CISGUARD_CATALOG") {
            self.catalog_path = Some(v);
        }
    }

    fn apply_env_log(&mut self) {
        if let Some(v) = env_path("CISGUARD_LOG_PATH") {
            self.log.path = v;
        }
        if let Some(level) = env_non_empty("CISGUARD_LOG_LEVEL").and_then(|v| LogLevel::parse(&v)) {
            self.log.level = level;
        }
        if let Some(v) = env_bool("CISGUARD_LOG_CONSOLE") {
            self.log.console = v;
        }
        if let Some(v) = env_parsed::<u64>("CISGUARD_LOG_MAX_SIZE_MB") {
            self.log.max_size_bytes = mb_to_bytes(v);
        }
    }

    fn apply_env_reader(&mut self) {
        if let Some(v) = env_parsed::<u64>("CISGUARD_QUERY_TIMEOUT_SECS") {
            self.reader.query_timeout_secs = v;
        }
        if let Some(v) = env_path("CISGUARD_TEMP_DIR") {
            self.reader.temp_dir = Some(v);
        }
    }

    fn apply_env_selection(&mut self) {
        if let Some(v) = env_parsed::<u8>("CISGUARD_LEVEL") {
            self.selection.level = Some(v);
        }
        if let Some(category) =
            env_non_empty("CISGUARD_CATEGORY").and_then(|v| ControlCategory::parse(&v))
        {
            self.selection.category = Some(category);
        }
        if let Some(ids) = env_non_empty("CISGUARD_CONTROL_IDS").and_then(|v| clean_ids(split_csv(&v))) {
            self.selection.control_ids = ids;
        }
    }

    fn apply_env_remediation(&mut self) {
        if let Some(v) = env_bool("CISGUARD_REMEDIATE") {
            self.remediation.enabled = v;
        }
        if let Some(v) = env_bool("CISGUARD_SIMULATE") {
            self.remediation.simulate = v;
        }
        if let Some(v) = env_bool("CISGUARD_EXCLUDE_HIGH_IMPACT") {
            self.remediation.exclude_high_impact = v;
        }
        if let Some(v) = env_bool("CISGUARD_AUTO_APPROVE") {
            self.remediation.auto_approve = v;
        }
        if let Some(v) = env_parsed::<u64>("CISGUARD_REMEDIATION_TIMEOUT_SECS") {
            self.remediation.timeout_secs = v;
        }
    }
}
