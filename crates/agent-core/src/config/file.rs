use std::path::PathBuf;

use anyhow::{Context, Result};
use audit_log::LogLevel;
use compliance::ControlCategory;
use serde::Deserialize;

use super::paths::resolve_config_path;
use super::types::AgentConfig;
use super::util::{clean_ids, mb_to_bytes, non_empty};

impl AgentConfig {
    pub(super) fn apply_file_config(&mut self) -> Result<bool> {
        let path = resolve_config_path()?;
        let Some(path) = path else {
            return Ok(false);
        };

        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("failed reading config file {}", path.display()))?;
        let file_cfg: FileConfig = toml::from_str(&raw)
            .with_context(|| format!("failed parsing TOML config {}", path.display()))?;

        self.apply_file_log(file_cfg.log);
        self.apply_file_reader(file_cfg.reader);
        self.apply_file_selection(file_cfg.selection);
        self.apply_file_remediation(file_cfg.remediation);
        self.apply_file_catalog(file_cfg.catalog);

        tracing::debug!(path = %path.display(), "configuration file applied");
        Ok(true)
    }

    fn apply_file_log(&mut self, log: Option<FileLogConfig>) {
        let Some(log) = log else {
            return;
        };

        if let Some(v) = non_empty(log.path) {
            self.log.path = PathBuf::from(v);
        }
        if let Some(v) = non_empty(log.level) {
            match LogLevel::parse(&v) {
                Some(level) => self.log.level = level,
                None => tracing::warn!(level = %v, "ignoring unknown [log] level"),
            }
        }
        if let Some(v) = log.console {
            self.log.console = v;
        }
        if let Some(v) = log.max_size_mb {
            self.log.max_size_bytes = mb_to_bytes(v);
        }
        if let Some(v) = non_empty(log.module) {
            self.log.module = v;
        }
    }

    fn apply_file_reader(&mut self, reader: Option<FileReaderConfig>) {
        let Some(reader) = reader else {
            return;
        };
        if let Some(v) = reader.query_timeout_secs {
            self.reader.query_timeout_secs = v;
        }
        if let Some(v) = non_empty(reader.temp_dir) {
            self.reader.temp_dir = Some(PathBuf::from(v));
        }
    }

    fn apply_file_selection(&mut self, selection: Option<FileSelectionConfig>) {
        let Some(selection) = selection else {
            return;
        };

        if let Some(v) = selection.level {
            self.selection.level = Some(v);
        }
        if let Some(v) = non_empty(selection.category) {
            match ControlCategory::parse(&v) {
                Some(category) => self.selection.category = Some(category),
                None => tracing::warn!(category = %v, "ignoring unknown [selection] category"),
            }
        }
        if let Some(ids) = selection.control_ids.and_then(clean_ids) {
            self.selection.control_ids = ids;
        }
    }

    fn apply_file_remediation(&mut self, remediation: Option<FileRemediationConfig>) {
        let Some(remediation) = remediation else {
            return;
        };

        if let Some(v) = remediation.enabled {
            self.remediation.enabled = v;
        }
        if let Some(v) = remediation.simulate {
            self.remediation.simulate = v;
        }
        if let Some(v) = remediation.exclude_high_impact {
            self.remediation.exclude_high_impact = v;
        }
        if let Some(v) = remediation.auto_approve {
            self.remediation.auto_approve = v;
        }
        if let Some(ids) = remediation.control_ids.and_then(clean_ids) {
            self.remediation.control_ids = Some(ids);
        }
        if let Some(v) = remediation.timeout_secs {
            self.remediation.timeout_secs = v;
        }
    }

    fn apply_file_catalog(&mut self, catalog: Option<FileCatalogConfig>) {
        let Some(catalog) = catalog else {
            return;
        };
        if let Some(v) = non_empty(catalog.path) {
            self.catalog_path = Some(PathBuf::from(v));
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
struct FileConfig {
    #[serde(default)]
    log: Option<FileLogConfig>,
    #[serde(default)]
    reader: Option<FileReaderConfig>,
    #[serde(default)]
    selection: Option<FileSelectionConfig>,
    #[serde(default)]
    remediation: Option<FileRemediationConfig>,
    #[serde(default)]
    catalog: Option<FileCatalogConfig>,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct FileLogConfig {
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    level: Option<String>,
    #[serde(default)]
    console: Option<bool>,
    #[serde(default)]
    max_size_mb: Option<u64>,
    #[serde(default)]
    module: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct FileReaderConfig {
    #[serde(default)]
    query_timeout_secs: Option<u64>,
    #[serde(default)]
    temp_dir: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct FileSelectionConfig {
    #[serde(default)]
    level: Option<u8>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    control_ids: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct FileRemediationConfig {
    #[serde(default)]
    enabled: Option<bool>,
    #[serde(default)]
    simulate: Option<bool>,
    #[serde(default)]
    exclude_high_impact: Option<bool>,
    #[serde(default)]
    auto_approve: Option<bool>,
    #[serde(default)]
    control_ids: Option<Vec<String>>,
    #[serde(default)]
    timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct FileCatalogConfig {
    #[serde(default)]
    path: Option<String>,
}
