//! Benchmark catalog: the immutable controlId → [`Control`] table.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use platform_windows::{ExportKind, PolicyName, ValueOrigin};
use serde::{Deserialize, Serialize};

use crate::expectation::{Expectation, ValueKind};
use crate::procedures::{ProcedureContext, RemediationProcedure, SettingValue};
use crate::{CatalogError, Result};

/// Packaged benchmark definition.
pub const BUILTIN_BENCHMARK: &str = include_str!("../benchmark/cis_windows.toml");

const NET_ACCOUNTS_FLAGS: &[&str] = &[
    "uniquepw",
    "maxpwage",
    "minpwage",
    "minpwlen",
    "forcelogoff",
    "lockoutthreshold",
    "lockoutduration",
    "lockoutwindow",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ControlCategory {
    AccountPolicies,
    LocalPolicies,
    AdministrativeTemplates,
    AdvancedAuditPolicy,
}

impl ControlCategory {
    pub const ALL: [ControlCategory; 4] = [
        Self::AccountPolicies,
        Self::LocalPolicies,
        Self::AdministrativeTemplates,
        Self::AdvancedAuditPolicy,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::AccountPolicies => "AccountPolicies",
            Self::LocalPolicies => "LocalPolicies",
            Self::AdministrativeTemplates => "AdministrativeTemplates",
            Self::AdvancedAuditPolicy => "AdvancedAuditPolicy",
        }
    }

    /// Accepts `AccountPolicies`, `account_policies`, `Account Policies`, ...
    pub fn parse(raw: &str) -> Option<Self> {
        let folded: String = raw
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect();
        Self::ALL
            .into_iter()
            .find(|category| category.as_str().to_ascii_lowercase() == folded)
    }
}

impl fmt::Display for ControlCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Impact {
    Low,
    Medium,
    High,
}

impl Impact {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
        }
    }
}

impl fmt::Display for Impact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a control reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Probe {
    Policy(PolicyName),
    AuditSubcategory(String),
}

impl Probe {
    pub(crate) fn value_kind(&self) -> ValueKind {
        match self {
            Self::Policy(name) => match name.origin() {
                ValueOrigin::NetAccounts { .. } => ValueKind::Integer,
                ValueOrigin::SecurityExport {
                    kind: ExportKind::Integer,
                    ..
                } => ValueKind::Integer,
                ValueOrigin::SecurityExport {
                    kind: ExportKind::SidList,
                    ..
                } => ValueKind::Text,
            },
            Self::AuditSubcategory(_) => ValueKind::Audit,
        }
    }
}

impl fmt::Display for Probe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Policy(name) => write!(f, "{}", name),
            Self::AuditSubcategory(name) => write!(f, "audit subcategory \"{}\"", name),
        }
    }
}

/// Declarative fix attached to a control in a benchmark file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FixDefinition {
    NetAccounts {
        flag: String,
        value: SettingValue,
    },
    AuditPolicy {
        subcategory: String,
        success: bool,
        failure: bool,
    },
    SecurityTemplate {
        section: String,
        key: String,
        value: SettingValue,
    },
}

/// One benchmark rule. A control without a remediation procedure is a
/// manual-only finding.
#[derive(Clone)]
pub struct Control {
    pub id: String,
    pub title: String,
    pub category: ControlCategory,
    pub impact: Impact,
    pub level: u8,
    pub probe: Probe,
    pub expectation: Expectation,
    pub remediation: Option<Arc<dyn RemediationProcedure>>,
}

impl Control {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        category: ControlCategory,
        impact: Impact,
        level: u8,
        probe: Probe,
        expectation: Expectation,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            category,
            impact,
            level,
            probe,
            expectation,
            remediation: None,
        }
    }

    pub fn with_remediation(mut self, procedure: Arc<dyn RemediationProcedure>) -> Self {
        self.remediation = Some(procedure);
        self
    }

    pub fn has_remediation(&self) -> bool {
        self.remediation.is_some()
    }

    fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(CatalogError::Invalid("control id must not be empty".to_string()));
        }
        if self.title.trim().is_empty() {
            return Err(CatalogError::Invalid(format!("{}: title must not be empty", self.id)));
        }
        if !(1..=2).contains(&self.level) {
            return Err(CatalogError::Invalid(format!(
                "{}: level must be 1 or 2, got {}",
                self.id, self.level
            )));
        }
        if let Probe::AuditSubcategory(name) = &self.probe {
            if name.trim().is_empty() {
                return Err(CatalogError::Invalid(format!("{}: empty audit subcategory", self.id)));
            }
        }
        let (probed, expected) = (self.probe.value_kind(), self.expectation.kind());
        if probed != expected {
            return Err(CatalogError::Invalid(format!(
                "{}: {} yields {} values but the expectation compares {} values",
                self.id,
                self.probe,
                probed.as_str(),
                expected.as_str()
            )));
        }
        self.expectation
            .validate()
            .map_err(|msg| CatalogError::Invalid(format!("{}: {}", self.id, msg)))
    }
}

impl fmt::Debug for Control {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Control")
            .field("id", &self.id)
            .field("title", &self.title)
            .field("category", &self.category)
            .field("impact", &self.impact)
            .field("level", &self.level)
            .field("probe", &self.probe)
            .field("expectation", &self.expectation)
            .field(
                "remediation",
                &self.remediation.as_ref().map(|procedure| procedure.describe()),
            )
            .finish()
    }
}

/// Which controls to evaluate. Empty fields select everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    /// Inclusive: level 2 also selects level 1 controls.
    pub level: Option<u8>,
    pub category: Option<ControlCategory>,
    /// When set, results follow this order. Duplicates are ignored.
    #[serde(default)]
    pub control_ids: Vec<String>,
}

impl Selection {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            control_ids: ids.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn with_level(mut self, level: u8) -> Self {
        self.level = Some(level);
        self
    }

    pub fn with_category(mut self, category: ControlCategory) -> Self {
        self.category = Some(category);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BenchmarkInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct BenchmarkFile {
    #[serde(default)]
    benchmark: BenchmarkInfo,
    #[serde(default)]
    control: Vec<ControlDefinition>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ControlDefinition {
    id: String,
    title: String,
    category: ControlCategory,
    impact: Impact,
    level: u8,
    probe: Probe,
    expect: Expectation,
    #[serde(default)]
    fix: Option<FixDefinition>,
}

/// Immutable controlId → Control table, in definition order.
#[derive(Debug)]
pub struct BenchmarkCatalog {
    info: BenchmarkInfo,
    controls: Vec<Control>,
    index: HashMap<String, usize>,
}

impl BenchmarkCatalog {
    /// Validate and index `controls`, keeping their order.
    pub fn from_controls(info: BenchmarkInfo, controls: Vec<Control>) -> Result<Self> {
        let mut index = HashMap::with_capacity(controls.len());
        for (position, control) in controls.iter().enumerate() {
            control.validate()?;
            if index.insert(control.id.clone(), position).is_some() {
                return Err(CatalogError::DuplicateControl(control.id.clone()));
            }
        }
        Ok(Self { info, controls, index })
    }

    pub fn from_toml_str(raw: &str, procedures: &ProcedureContext) -> Result<Self> {
        let file: BenchmarkFile =
            toml::from_str(raw).map_err(|err| CatalogError::Parse(err.to_string()))?;

        let mut controls = Vec::with_capacity(file.control.len());
        for definition in file.control {
            if let Some(fix) = definition.fix.as_ref() {
                validate_fix(&definition.id, &definition.probe, fix)?;
            }
            let remediation = definition.fix.as_ref().map(|fix| procedures.build(fix));
            controls.push(Control {
                id: definition.id.trim().to_string(),
                title: definition.title,
                category: definition.category,
                impact: definition.impact,
                level: definition.level,
                probe: definition.probe,
                expectation: definition.expect,
                remediation,
            });
        }
        Self::from_controls(file.benchmark, controls)
    }

    /// The packaged benchmark.
    pub fn builtin(procedures: &ProcedureContext) -> Result<Self> {
        Self::from_toml_str(BUILTIN_BENCHMARK, procedures)
    }

    pub fn load_file(path: &Path, procedures: &ProcedureContext) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| CatalogError::Parse(format!("{}: {}", path.display(), err)))?;
        Self::from_toml_str(&raw, procedures)
    }

    /// Attach (or replace) the procedure of an existing control.
    pub fn with_procedure(
        mut self,
        control_id: &str,
        procedure: Arc<dyn RemediationProcedure>,
    ) -> Result<Self> {
        let position = *self
            .index
            .get(control_id)
            .ok_or_else(|| CatalogError::UnknownControl(control_id.to_string()))?;
        self.controls[position].remediation = Some(procedure);
        Ok(self)
    }

    pub fn info(&self) -> &BenchmarkInfo {
        &self.info
    }

    pub fn controls(&self) -> &[Control] {
        &self.controls
    }

    pub fn len(&self) -> usize {
        self.controls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controls.is_empty()
    }

    pub fn lookup(&self, control_id: &str) -> Option<&Control> {
        self.index
            .get(control_id.trim())
            .map(|&position| &self.controls[position])
    }

    /// Resolve a selection. Unknown explicit ids are rejected rather than
    /// skipped; level and category narrow explicit ids as well.
    pub fn filter(&self, selection: &Selection) -> Result<Vec<&Control>> {
        if let Some(level) = selection.level {
            if !(1..=2).contains(&level) {
                return Err(CatalogError::Invalid(format!(
                    "selection level must be 1 or 2, got {}",
                    level
                )));
            }
        }

        let selected = |control: &Control| {
            selection.level.map_or(true, |level| control.level <= level)
                && selection.category.map_or(true, |category| control.category == category)
        };

        if selection.control_ids.is_empty() {
            return Ok(self.controls.iter().filter(|&control| selected(control)).collect());
        }

        let mut seen = HashSet::new();
        let mut controls = Vec::new();
        for id in &selection.control_ids {
            let id = id.trim();
            if !seen.insert(id) {
                continue;
            }
            let control = self
                .lookup(id)
                .ok_or_else(|| CatalogError::UnknownControl(id.to_string()))?;
            if selected(control) {
                controls.push(control);
            }
        }
        Ok(controls)
    }
}

fn validate_fix(id: &str, probe: &Probe, fix: &FixDefinition) -> Result<()> {
    match fix {
        FixDefinition::NetAccounts { flag, .. } => {
            if !NET_ACCOUNTS_FLAGS.contains(&flag.as_str()) {
                return Err(CatalogError::Invalid(format!(
                    "{}: unsupported net accounts flag {}",
                    id, flag
                )));
            }
        }
        FixDefinition::AuditPolicy { subcategory, .. } => match probe {
            Probe::AuditSubcategory(probed) if probed.eq_ignore_ascii_case(subcategory.trim()) => {}
            _ => {
                return Err(CatalogError::Invalid(format!(
                    "{}: audit fix for \"{}\" does not match the probe {}",
                    id, subcategory, probe
                )))
            }
        },
        FixDefinition::SecurityTemplate { section, key, .. } => {
            if section.trim().is_empty() || key.trim().is_empty() {
                return Err(CatalogError::Invalid(format!(
                    "{}: security template fix needs a section and a key",
                    id
                )));
            }
        }
    }
    Ok(())
}
