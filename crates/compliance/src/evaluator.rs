use std::fmt;

use audit_log::{AuditLog, LogContext, Operation};
use chrono::{DateTime, Utc};
use platform_windows::{PolicyData, PolicyInspector, PolicyValue};
use serde::{Deserialize, Serialize};

use crate::catalog::{BenchmarkCatalog, Control, ControlCategory, Impact, Probe, Selection};
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CheckStatus {
    Pass,
    Fail,
    Unknown,
}

impl CheckStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pass => "Pass",
            Self::Fail => "Fail",
            Self::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One evaluation of one control. `actual_value` is `None` exactly when the
/// status is `Unknown`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckResult {
    pub control_id: String,
    pub title: String,
    pub category: ControlCategory,
    pub impact: Impact,
    pub status: CheckStatus,
    pub expected_value: String,
    pub actual_value: Option<PolicyData>,
    /// Raw tool text the value was parsed from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_value: Option<String>,
    /// Read failure reason for `Unknown` results.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub unknown: usize,
    /// Pass share of the evaluable (pass + fail) results, two decimals.
    pub compliance_percent: f64,
}

pub fn summarize(results: &[CheckResult]) -> ComplianceSummary {
    let count = |status: CheckStatus| results.iter().filter(|r| r.status == status).count();
    let (passed, failed, unknown) = (
        count(CheckStatus::Pass),
        count(CheckStatus::Fail),
        count(CheckStatus::Unknown),
    );
    let evaluable = passed + failed;
    let compliance_percent = if evaluable == 0 {
        100.0
    } else {
        (passed as f64 / evaluable as f64 * 10_000.0).round() / 100.0
    };
    ComplianceSummary {
        total: results.len(),
        passed,
        failed,
        unknown,
        compliance_percent,
    }
}

/// Produces [`CheckResult`]s for catalog selections. Evaluation is
/// sequential and has no side effects beyond audit entries.
pub struct ComplianceEvaluator<'a> {
    catalog: &'a BenchmarkCatalog,
    inspector: &'a dyn PolicyInspector,
    audit: &'a AuditLog,
}

impl<'a> ComplianceEvaluator<'a> {
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

    pub fn catalog(&self) -> &'a BenchmarkCatalog {
        self.catalog
    }

    /// Evaluate a selection in catalog (or requested-id) order. Fails only
    /// when the selection itself is invalid.
    pub fn evaluate(&self, selection: &Selection) -> Result<Vec<CheckResult>> {
        let controls = self.catalog.filter(selection)?;
        tracing::debug!(selected = controls.len(), "evaluating controls");
        Ok(controls
            .into_iter()
            .map(|control| self.evaluate_control(control))
            .collect())
    }

    pub fn evaluate_control(&self, control: &Control) -> CheckResult {
        self.audit.verbose(
            Operation::Check,
            format!("evaluating {}", control.id),
            LogContext::new()
                .with("controlId", control.id.as_str())
                .with("title", control.title.as_str())
                .with("probe", control.probe.to_string()),
        );

        let read = self.read_probe(&control.probe);
        let expected_value = control.expectation.to_string();
        let (status, actual_value, detail) = match (read.value, read.error) {
            (Some(value), None) => {
                let status = if control.expectation.is_satisfied_by(&value) {
                    CheckStatus::Pass
                } else {
                    CheckStatus::Fail
                };
                (status, Some(value), None)
            }
            (_, Some(err)) => (CheckStatus::Unknown, None, Some(err.to_string())),
            (None, None) => (
                CheckStatus::Unknown,
                None,
                Some("reader returned no value".to_string()),
            ),
        };

        let result = CheckResult {
            control_id: control.id.clone(),
            title: control.title.clone(),
            category: control.category,
            impact: control.impact,
            status,
            expected_value,
            actual_value,
            raw_value: read.raw,
            detail,
            timestamp: Utc::now(),
        };

        let mut context = LogContext::new()
            .with("controlId", result.control_id.as_str())
            .with("status", result.status.as_str())
            .with("expected", result.expected_value.as_str());
        if let Some(actual) = result.actual_value.as_ref() {
            context.insert("actual", actual.to_string());
        }
        if let Some(detail) = result.detail.as_deref() {
            context.insert("detail", detail);
        }
        self.audit.verbose(
            Operation::Check,
            format!("{} evaluated: {}", control.id, result.status),
            context,
        );
        result
    }

    fn read_probe(&self, probe: &Probe) -> PolicyValue {
        match probe {
            Probe::Policy(name) => self.inspector.read_policy(*name),
            Probe::AuditSubcategory(subcategory) => self.inspector.read_audit_subcategory(subcategory),
        }
    }
}
