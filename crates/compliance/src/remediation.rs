//! Remediation orchestration.
//!
//! Failing checks are filtered (explicit ids, impact), then each remaining
//! control runs its procedure in simulate or apply mode. Every outcome is a
//! [`RemediationResult`] and an audit entry; nothing a procedure does can
//! abort the batch.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use audit_log::{AuditLog, LogContext, Operation, RemediationStatus};
use chrono::{DateTime, Utc};
use platform_windows::{PolicyData, PolicyInspector};
use serde::{Deserialize, Serialize};

use crate::catalog::{BenchmarkCatalog, Control, ControlCategory, Impact, Selection};
use crate::evaluator::{CheckResult, CheckStatus, ComplianceEvaluator};
use crate::procedures::ExecutionMode;
use crate::Result;

const MSG_NOT_FOUND: &str = "control definition not found";
const MSG_MANUAL: &str = "no remediation available — manual intervention required";
const MSG_DECLINED: &str = "declined by operator";

/// Per-control consent hook. Returning `false` skips the control.
pub type Authorizer = Arc<dyn Fn(&str) -> bool + Send + Sync>;

pub enum RemediationInput {
    /// Previously produced check results.
    Results(Vec<CheckResult>),
    /// Evaluate this selection first.
    Evaluate(Selection),
}

#[derive(Clone)]
pub struct RemediationOptions {
    /// Allow-list intersected with the failing set.
    pub control_ids: Option<Vec<String>>,
    pub exclude_high_impact: bool,
    pub mode: ExecutionMode,
    /// Everything is authorized when unset.
    pub authorizer: Option<Authorizer>,
}

impl Default for RemediationOptions {
    fn default() -> Self {
        Self {
            control_ids: None,
            exclude_high_impact: true,
            mode: ExecutionMode::Simulate,
            authorizer: None,
        }
    }
}

impl fmt::Debug for RemediationOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemediationOptions")
            .field("control_ids", &self.control_ids)
            .field("exclude_high_impact", &self.exclude_high_impact)
            .field("mode", &self.mode)
            .field("authorizer", &self.authorizer.is_some())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemediationResult {
    pub control_id: String,
    pub title: String,
    pub impact: Impact,
    pub category: ControlCategory,
    pub status: RemediationStatus,
    pub message: String,
    pub previous_value: Option<PolicyData>,
    /// Set only for `Success` when the post-apply re-check could read the value.
    pub new_value: Option<PolicyData>,
    /// Post-apply re-check verdict; `None` when no re-check ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification: Option<CheckStatus>,
    pub applied_at: Option<DateTime<Utc>>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemediationSummary {
    pub total: usize,
    pub success: usize,
    pub failed: usize,
    pub skipped: usize,
    pub what_if: usize,
    pub duration_ms: u64,
}

impl RemediationSummary {
    fn from_results(results: &[RemediationResult], duration_ms: u64) -> Self {
        let count = |status: RemediationStatus| results.iter().filter(|r| r.status == status).count();
        Self {
            total: results.len(),
            success: count(RemediationStatus::Success),
            failed: count(RemediationStatus::Failed),
            skipped: count(RemediationStatus::Skipped),
            what_if: count(RemediationStatus::WhatIf),
            duration_ms,
        }
    }

    /// Nothing was selected for remediation.
    pub fn is_empty(&self) -> bool {
        self.total == 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemediationRun {
    pub results: Vec<RemediationResult>,
    pub summary: RemediationSummary,
}

pub struct RemediationOrchestrator<'a> {
    catalog: &'a BenchmarkCatalog,
    inspector: &'a dyn PolicyInspector,
    audit: &'a AuditLog,
}

impl<'a> RemediationOrchestrator<'a> {
    pub fn new(
        catalog: &'a BenchmarkCatalog,
        inspector: &'a dyn PolicyInspector,
        audit: &'a AuditLog,
    ) -> Self {
        Self {
            catalog,
            inspector,
            audit,
        }
    }

    fn evaluator(&self) -> ComplianceEvaluator<'a> {
        ComplianceEvaluator::new(self.catalog, self.inspector, self.audit)
    }

    /// Run remediation. Errors only when an `Evaluate` selection is invalid.
    pub fn remediate(&self, input: RemediationInput, options: &RemediationOptions) -> Result<RemediationRun> {
        let started = Instant::now();
        let checks = match input {
            RemediationInput::Results(results) => results,
            RemediationInput::Evaluate(selection) => self.evaluator().evaluate(&selection)?,
        };
        let candidates = select_candidates(checks, options);

        self.audit.info(
            Operation::Remediation,
            format!("remediation started for {} control(s)", candidates.len()),
            LogContext::new()
                .with("mode", format!("{:?}", options.mode))
                .with("excludeHighImpact", options.exclude_high_impact)
                .with("controlCount", candidates.len()),
        );

        if options.mode == ExecutionMode::Apply && !candidates.is_empty() && !self.inspector.is_elevated() {
            tracing::warn!("remediation is running without administrative privileges");
            self.audit.warning(
                Operation::Remediation,
                "not running elevated; remediation steps are likely to fail",
                LogContext::new(),
            );
        }

        let results: Vec<RemediationResult> = candidates
            .into_iter()
            .map(|check| self.remediate_one(check, options))
            .collect();

        let summary = RemediationSummary::from_results(&results, elapsed_ms(started));
        self.audit.info(
            Operation::Remediation,
            "remediation finished",
            LogContext::new()
                .with("total", summary.total)
                .with("success", summary.success)
                .with("failed", summary.failed)
                .with("skipped", summary.skipped)
                .with("whatIf", summary.what_if)
                .with("durationMs", summary.duration_ms),
        );
        Ok(RemediationRun { results, summary })
    }

    fn remediate_one(&self, check: CheckResult, options: &RemediationOptions) -> RemediationResult {
        let started = Instant::now();
        let mut result = RemediationResult {
            control_id: check.control_id,
            title: check.title,
            impact: check.impact,
            category: check.category,
            status: RemediationStatus::Failed,
            message: String::new(),
            previous_value: check.actual_value,
            new_value: None,
            verification: None,
            applied_at: None,
            duration_ms: 0,
        };

        match self.catalog.lookup(&result.control_id) {
            None => {
                result.message = MSG_NOT_FOUND.to_string();
            }
            Some(control) => self.run_procedure(control, options, &mut result),
        }

        result.duration_ms = elapsed_ms(started);
        self.record(&result, options.mode);
        result
    }

    fn run_procedure(&self, control: &Control, options: &RemediationOptions, result: &mut RemediationResult) {
        let Some(procedure) = control.remediation.as_ref() else {
            result.status = RemediationStatus::Skipped;
            result.message = MSG_MANUAL.to_string();
            return;
        };

        let authorized = options
            .authorizer
            .as_ref()
            .map_or(true, |authorize| authorize(&control.id));
        if !authorized {
            result.status = RemediationStatus::Skipped;
            result.message = MSG_DECLINED.to_string();
            return;
        }

        let output = match procedure.execute(options.mode) {
            Ok(output) => output,
            Err(err) => {
                tracing::warn!(control_id = %control.id, error = %err, "remediation procedure failed");
                result.status = RemediationStatus::Failed;
                result.message = err.to_string();
                return;
            }
        };

        if options.mode.is_simulate() {
            result.status = RemediationStatus::WhatIf;
            result.message = output;
            return;
        }

        result.status = RemediationStatus::Success;
        result.message = output;
        result.applied_at = Some(Utc::now());

        let recheck = self.evaluator().evaluate_control(control);
        result.verification = Some(recheck.status);
        match recheck.status {
            CheckStatus::Unknown => {
                self.audit.warning(
                    Operation::Remediation,
                    format!("{} applied but the re-check could not read the value", control.id),
                    LogContext::new()
                        .with("controlId", control.id.as_str())
                        .with("detail", recheck.detail.unwrap_or_default()),
                );
            }
            CheckStatus::Fail => {
                result.new_value = recheck.actual_value;
                self.audit.warning(
                    Operation::Remediation,
                    format!("{} applied but the control still fails", control.id),
                    LogContext::new().with("controlId", control.id.as_str()),
                );
            }
            CheckStatus::Pass => {
                result.new_value = recheck.actual_value;
            }
        }
    }

    fn record(&self, result: &RemediationResult, mode: ExecutionMode) {
        let mut context = LogContext::new()
            .with("title", result.title.as_str())
            .with("impact", result.impact.as_str())
            .with("category", result.category.as_str())
            .with("durationMs", result.duration_ms);
        if let Some(previous) = result.previous_value.as_ref() {
            context.insert("previousValue", previous.to_string());
        }
        if let Some(new_value) = result.new_value.as_ref() {
            context.insert("newValue", new_value.to_string());
        }
        self.audit.log_remediation(
            &result.control_id,
            result.status,
            mode.is_simulate(),
            result.message.as_str(),
            context,
        );
    }
}

/// Failing checks, narrowed by the allow-list and the impact exclusion, in
/// input order. A control appearing twice is remediated once.
fn select_candidates(checks: Vec<CheckResult>, options: &RemediationOptions) -> Vec<CheckResult> {
    let mut seen = HashSet::new();
    checks
        .into_iter()
        .filter(|check| check.status == CheckStatus::Fail)
        .filter(|check| {
            options
                .control_ids
                .as_ref()
                .map_or(true, |ids| ids.iter().any(|id| id.trim() == check.control_id))
        })
        .filter(|check| !(options.exclude_high_impact && check.impact == Impact::High))
        .filter(|check| seen.insert(check.control_id.clone()))
        .collect()
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
