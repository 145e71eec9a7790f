//! Benchmark catalog, compliance evaluation and remediation orchestration.
//!
//! A [`BenchmarkCatalog`] is loaded once at startup and shared read-only.
//! [`ComplianceEvaluator`] turns catalog selections into [`CheckResult`]s
//! through a [`PolicyInspector`], and [`RemediationOrchestrator`] applies or
//! simulates fixes for failing controls. Both record their progress in the
//! [`AuditLog`].

mod catalog;
mod evaluator;
mod expectation;
mod procedures;
mod remediation;

use std::fmt;
use std::io;

pub use audit_log::{AuditLog, RemediationStatus};
pub use platform_windows::{PolicyData, PolicyInspector, PolicyName};

pub use catalog::{
    BenchmarkCatalog, BenchmarkInfo, Control, ControlCategory, FixDefinition, Impact, Probe,
    Selection, BUILTIN_BENCHMARK,
};
pub use evaluator::{summarize, CheckResult, CheckStatus, ComplianceEvaluator, ComplianceSummary};
pub use expectation::Expectation;
pub use procedures::{
    AuditPolicyProcedure, ExecutionMode, FnProcedure, NetAccountsProcedure, ProcedureContext,
    RemediationProcedure, SecurityTemplateProcedure, SettingValue,
};
pub use remediation::{
    Authorizer, RemediationInput, RemediationOptions, RemediationOrchestrator, RemediationResult,
    RemediationRun, RemediationSummary,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    Parse(String),
    DuplicateControl(String),
    UnknownControl(String),
    Invalid(String),
}

impl fmt::Display for CatalogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse(msg) => write!(f, "failed parsing benchmark definition: {}", msg),
            Self::DuplicateControl(id) => write!(f, "duplicate control id {}", id),
            Self::UnknownControl(id) => write!(f, "unknown control id {}", id),
            Self::Invalid(msg) => write!(f, "invalid control definition: {}", msg),
        }
    }
}

impl std::error::Error for CatalogError {}

pub type Result<T> = std::result::Result<T, CatalogError>;

/// Error raised by a remediation procedure. The orchestrator turns it into a
/// `Failed` result; it never aborts a batch.
#[derive(Debug)]
pub enum RemediationError {
    Command(String),
    Timeout(String),
    Io(io::Error),
}

impl fmt::Display for RemediationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Command(msg) => write!(f, "remediation command failed: {}", msg),
            Self::Timeout(msg) => write!(f, "remediation timed out: {}", msg),
            Self::Io(err) => write!(f, "remediation io error: {}", err),
        }
    }
}

impl std::error::Error for RemediationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for RemediationError {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

#[cfg(test)]
mod tests;
