use std::fs;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{info, warn};

use audit_log::{AuditLog, LogContext, Operation};
use compliance::{
    summarize, Authorizer, BenchmarkCatalog, BenchmarkInfo, CheckResult, ComplianceEvaluator,
    ComplianceSummary, ProcedureContext, RemediationInput, RemediationOrchestrator, RemediationRun,
};
use platform_windows::{AuditRow, CommandRunner, HostPlatform, PolicyReader, SystemCommandRunner};

use crate::config::AgentConfig;

mod confirm;

pub use confirm::stdin_authorizer;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckReport {
    pub benchmark: BenchmarkInfo,
    pub results: Vec<CheckResult>,
    pub summary: ComplianceSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediation: Option<RemediationRun>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InventoryReport {
    pub rows: Vec<AuditRow>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Everything one invocation needs: the reader, the loaded catalog and the
/// audit sink, all built from one [`AgentConfig`].
pub struct AgentRuntime {
    config: AgentConfig,
    reader: PolicyReader,
    catalog: BenchmarkCatalog,
    audit: AuditLog,
}

impl AgentRuntime {
    pub fn new(config: AgentConfig) -> Result<Self> {
        Self::with_runner(config, Arc::new(SystemCommandRunner), HostPlatform::current())
    }

    pub fn with_runner(
        config: AgentConfig,
        runner: Arc<dyn CommandRunner>,
        platform: HostPlatform,
    ) -> Result<Self> {
        if let Some(parent) = config.log.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed creating log directory {}", parent.display()))?;
        }

        let reader = PolicyReader::new(Arc::clone(&runner), config.reader_settings()).with_platform(platform);
        let procedures = ProcedureContext::new(runner)
            .with_timeout(config.remediation_timeout())
            .with_temp_dir(config.reader.temp_dir.clone());

        let catalog = match config.catalog_path.as_deref() {
            Some(path) => BenchmarkCatalog::load_file(path, &procedures)
                .with_context(|| format!("failed loading benchmark {}", path.display()))?,
            None => BenchmarkCatalog::builtin(&procedures).context("packaged benchmark is invalid")?,
        };
        let selected = catalog
            .filter(&config.selection)
            .context("invalid control selection")?
            .len();

        if !platform.is_windows() {
            warn!(?platform, "host is not Windows; every check will report Unknown");
        }
        info!(
            benchmark = %catalog.info().name,
            version = %catalog.info().version,
            controls = catalog.len(),
            selected,
            mode = ?config.execution_mode(),
            "cisguard agent initialised"
        );

        let audit = AuditLog::new(config.audit_log_config());
        Ok(Self {
            config,
            reader,
            catalog,
            audit,
        })
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn catalog(&self) -> &BenchmarkCatalog {
        &self.catalog
    }

    /// Evaluate the configured selection, then remediate when
    /// `[remediation] enabled` asks for it.
    pub fn check(&self, authorizer: Option<Authorizer>) -> Result<CheckReport> {
        let results = self.evaluate()?;
        let summary = summarize(&results);
        let remediation = if self.config.remediation.enabled {
            Some(self.remediate(results.clone(), authorizer)?)
        } else {
            None
        };
        Ok(CheckReport {
            benchmark: self.catalog.info().clone(),
            results,
            summary,
            remediation,
        })
    }

    pub fn evaluate(&self) -> Result<Vec<CheckResult>> {
        let results = ComplianceEvaluator::new(&self.catalog, &self.reader, &self.audit)
            .evaluate(&self.config.selection)
            .context("invalid control selection")?;

        let summary = summarize(&results);
        info!(
            total = summary.total,
            passed = summary.passed,
            failed = summary.failed,
            unknown = summary.unknown,
            compliance_percent = summary.compliance_percent,
            "compliance evaluation complete"
        );
        self.audit.info(
            Operation::Report,
            format!("compliance {:.2}%", summary.compliance_percent),
            LogContext::new()
                .with("benchmark", self.catalog.info().name.as_str())
                .with("total", summary.total)
                .with("passed", summary.passed)
                .with("failed", summary.failed)
                .with("unknown", summary.unknown)
                .with("compliancePercent", summary.compliance_percent),
        );
        Ok(results)
    }

    pub fn remediate(&self, results: Vec<CheckResult>, authorizer: Option<Authorizer>) -> Result<RemediationRun> {
        let options = self.config.remediation_options(authorizer);
        let run = RemediationOrchestrator::new(&self.catalog, &self.reader, &self.audit)
            .remediate(RemediationInput::Results(results), &options)?;
        info!(
            total = run.summary.total,
            success = run.summary.success,
            failed = run.summary.failed,
            skipped = run.summary.skipped,
            what_if = run.summary.what_if,
            "remediation complete"
        );
        Ok(run)
    }

    pub fn audit_inventory(&self) -> InventoryReport {
        let inventory = self.reader.read_audit_inventory();
        let error = inventory.error.map(|err| err.to_string());
        let mut context = LogContext::new().with("rows", inventory.rows.len());
        if let Some(err) = error.as_deref() {
            context.insert("error", err);
        }
        self.audit.info(Operation::Export, "audit policy inventory read", context);
        InventoryReport {
            rows: inventory.rows,
            error,
        }
    }
}
