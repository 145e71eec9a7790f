use super::*;

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use audit_log::{read_entries, AuditLogConfig, EntryFilter, LogLevel, Operation};
use platform_windows::{AuditSetting, CommandOutput, CommandRunner, PolicyValue, ReadError};

// ── Fakes ──────────────────────────────────────────────────────────────

/// In-memory host whose state procedures can change.
#[derive(Default)]
struct FakeHost {
    policies: Mutex<HashMap<PolicyName, PolicyValue>>,
    audits: Mutex<HashMap<String, PolicyValue>>,
    elevated: bool,
    reads: AtomicUsize,
    elevation_checks: AtomicUsize,
}

impl FakeHost {
    fn elevated() -> Self {
        Self {
            elevated: true,
            ..Self::default()
        }
    }

    fn set_integer(&self, name: PolicyName, value: i64) {
        self.policies.lock().expect("policies").insert(
            name,
            PolicyValue::ok(name.as_str(), PolicyData::Integer(value), value.to_string()),
        );
    }

    fn set_audit(&self, subcategory: &str, success: bool, failure: bool) {
        let setting = AuditSetting::new(success, failure);
        self.audits.lock().expect("audits").insert(
            subcategory.to_string(),
            PolicyValue::ok(subcategory, PolicyData::Audit(setting), setting.label()),
        );
    }

    fn break_policy(&self, name: PolicyName) {
        self.policies.lock().expect("policies").insert(
            name,
            PolicyValue::failed(name.as_str(), ReadError::ToolInvocation("net.exe exit code 2".to_string())),
        );
    }

    fn integer(&self, name: PolicyName) -> Option<i64> {
        self.policies.lock().expect("policies").get(&name).and_then(|v| v.as_integer())
    }
}

impl PolicyInspector for FakeHost {
    fn read_policy(&self, name: PolicyName) -> PolicyValue {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.policies
            .lock()
            .expect("policies")
            .get(&name)
            .cloned()
            .unwrap_or_else(|| PolicyValue::failed(name.as_str(), ReadError::ParseMiss(name.to_string())))
    }

    fn read_audit_subcategory(&self, subcategory: &str) -> PolicyValue {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.audits
            .lock()
            .expect("audits")
            .get(subcategory)
            .cloned()
            .unwrap_or_else(|| PolicyValue::failed(subcategory, ReadError::ParseMiss(subcategory.to_string())))
    }

    fn is_elevated(&self) -> bool {
        self.elevation_checks.fetch_add(1, Ordering::SeqCst);
        self.elevated
    }
}

/// Procedure that writes `value` into the fake host on apply.
fn setter(host: &Arc<FakeHost>, name: PolicyName, value: i64) -> Arc<dyn RemediationProcedure> {
    let host = Arc::clone(host);
    Arc::new(FnProcedure::new(format!("set {} to {}", name, value), move |mode| {
        if mode == ExecutionMode::Apply {
            host.set_integer(name, value);
            Ok(format!("{} set to {}", name, value))
        } else {
            Ok(format!("would set {} to {}", name, value))
        }
    }))
}

fn failing_procedure() -> Arc<dyn RemediationProcedure> {
    Arc::new(FnProcedure::new("always fails", |_| {
        Err(RemediationError::Command("net.exe exit code 5: access denied".to_string()))
    }))
}

fn integer_control(id: &str, impact: Impact, name: PolicyName, expect: Expectation) -> Control {
    Control::new(
        id,
        format!("Ensure {} is hardened", name),
        ControlCategory::AccountPolicies,
        impact,
        1,
        Probe::Policy(name),
        expect,
    )
}

struct Harness {
    _dir: tempfile::TempDir,
    log_path: std::path::PathBuf,
    audit: AuditLog,
}

impl Harness {
    fn new() -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let log_path = dir.path().join("audit.log");
        let audit = AuditLog::new(AuditLogConfig {
            path: log_path.clone(),
            min_level: LogLevel::Verbose,
            console: false,
            ..AuditLogConfig::default()
        });
        Self {
            _dir: dir,
            log_path,
            audit,
        }
    }

    fn entries(&self, filter: EntryFilter) -> Vec<audit_log::AuditLogEntry> {
        read_entries(&self.log_path, &filter).expect("read audit entries")
    }
}

struct NoRunner;

impl CommandRunner for NoRunner {
    fn run(&self, program: &str, _args: &[String], _timeout: Duration) -> std::io::Result<CommandOutput> {
        panic!("unexpected command {}", program)
    }
}

fn procedure_context() -> ProcedureContext {
    ProcedureContext::new(Arc::new(NoRunner))
}

// ── Catalog ────────────────────────────────────────────────────────────

#[test]
fn builtin_catalog_loads_in_definition_order() {
    let catalog = BenchmarkCatalog::builtin(&procedure_context()).expect("builtin catalog");
    assert_eq!(catalog.info().name, "CIS Microsoft Windows 11 Enterprise");
    assert_eq!(catalog.controls()[0].id, "1.1.1");
    assert_eq!(catalog.controls()[1].id, "1.1.2");
    assert!(catalog.len() >= 20);

    let manual = catalog.lookup("2.2.2").expect("user rights control");
    assert!(!manual.has_remediation());
    assert_eq!(manual.impact, Impact::High);

    let fixed = catalog.lookup("1.1.4").expect("password length control");
    assert_eq!(
        fixed.remediation.as_ref().map(|p| p.describe()).as_deref(),
        Some("net accounts /minpwlen:14")
    );
    assert!(catalog.lookup("9.9.9").is_none());
}

#[test]
fn duplicate_control_ids_are_rejected() {
    let controls = vec![
        integer_control("1.1.1", Impact::Low, PolicyName::PasswordHistory, Expectation::AtLeast(24)),
        integer_control("1.1.1", Impact::Low, PolicyName::MinPasswordLength, Expectation::AtLeast(14)),
    ];
    let err = BenchmarkCatalog::from_controls(BenchmarkInfo::default(), controls).expect_err("duplicate");
    assert_eq!(err, CatalogError::DuplicateControl("1.1.1".to_string()));
}

#[test]
fn probe_and_expectation_shapes_must_agree() {
    let raw = r#"
        [[control]]
        id = "X.1"
        title = "Mismatched"
        category = "AccountPolicies"
        impact = "Low"
        level = 1
        probe = { policy = "MinPasswordLength" }
        expect = { audit = { success = true, failure = false } }
    "#;
    let err = BenchmarkCatalog::from_toml_str(raw, &procedure_context()).expect_err("mismatch");
    assert!(matches!(err, CatalogError::Invalid(ref msg) if msg.contains("X.1")));
}

#[test]
fn invalid_definitions_are_fatal() {
    let bad_flag = r#"
        [[control]]
        id = "X.2"
        title = "Bad flag"
        category = "AccountPolicies"
        impact = "Low"
        level = 1
        probe = { policy = "MinPasswordLength" }
        expect = { at_least = 14 }
        fix = { kind = "net_accounts", flag = "format-c", value = 1 }
    "#;
    assert!(matches!(
        BenchmarkCatalog::from_toml_str(bad_flag, &procedure_context()),
        Err(CatalogError::Invalid(_))
    ));

    let bad_level = bad_flag
        .replace("level = 1", "level = 3")
        .replace("flag = \"format-c\"", "flag = \"minpwlen\"");
    assert!(matches!(
        BenchmarkCatalog::from_toml_str(&bad_level, &procedure_context()),
        Err(CatalogError::Invalid(_))
    ));

    assert!(matches!(
        BenchmarkCatalog::from_toml_str("[[control]]\nid = 7", &procedure_context()),
        Err(CatalogError::Parse(_))
    ));
}

#[test]
fn custom_procedures_attach_to_existing_controls_only() {
    let host = Arc::new(FakeHost::default());
    let catalog = BenchmarkCatalog::builtin(&procedure_context())
        .expect("builtin catalog")
        .with_procedure("2.2.2", setter(&host, PolicyName::MinPasswordLength, 14))
        .expect("known control");
    assert!(catalog.lookup("2.2.2").expect("control").has_remediation());

    let err = catalog
        .with_procedure("nope", failing_procedure())
        .expect_err("unknown control");
    assert_eq!(err, CatalogError::UnknownControl("nope".to_string()));
}

#[test]
fn selection_levels_are_inclusive_and_categories_narrow() {
    let catalog = BenchmarkCatalog::builtin(&procedure_context()).expect("builtin catalog");

    let level1 = catalog.filter(&Selection::all().with_level(1)).expect("level 1");
    assert!(level1.iter().all(|c| c.level == 1));
    assert!(level1.iter().all(|c| c.id != "17.3.2"));

    let level2 = catalog.filter(&Selection::all().with_level(2)).expect("level 2");
    assert_eq!(level2.len(), catalog.len());

    let audit = catalog
        .filter(&Selection::all().with_category(ControlCategory::AdvancedAuditPolicy))
        .expect("audit category");
    assert!(!audit.is_empty());
    assert!(audit.iter().all(|c| c.category == ControlCategory::AdvancedAuditPolicy));

    assert!(matches!(
        catalog.filter(&Selection::all().with_level(3)),
        Err(CatalogError::Invalid(_))
    ));
}

#[test]
fn explicit_ids_keep_requested_order_without_duplicates() {
    let catalog = BenchmarkCatalog::builtin(&procedure_context()).expect("builtin catalog");
    let controls = catalog
        .filter(&Selection::ids(["17.1.1", "1.1.4", "17.1.1", " 1.1.1 "]))
        .expect("explicit ids");
    let ids: Vec<&str> = controls.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["17.1.1", "1.1.4", "1.1.1"]);

    let err = catalog.filter(&Selection::ids(["1.1.4", "42"])).expect_err("unknown id");
    assert_eq!(err, CatalogError::UnknownControl("42".to_string()));
}

#[test]
fn category_names_parse_loosely() {
    assert_eq!(ControlCategory::parse("account_policies"), Some(ControlCategory::AccountPolicies));
    assert_eq!(
        ControlCategory::parse("Advanced Audit Policy"),
        Some(ControlCategory::AdvancedAuditPolicy)
    );
    assert_eq!(ControlCategory::parse("firewall"), None);
}

// ── Evaluation ─────────────────────────────────────────────────────────

fn small_catalog(host: &Arc<FakeHost>) -> BenchmarkCatalog {
    let controls = vec![
        integer_control("A", Impact::Medium, PolicyName::MinPasswordLength, Expectation::AtLeast(14))
            .with_remediation(setter(host, PolicyName::MinPasswordLength, 14)),
        integer_control("B", Impact::Medium, PolicyName::PasswordHistory, Expectation::AtLeast(24)),
        integer_control("C", Impact::Low, PolicyName::LockoutThreshold, Expectation::NonZeroAtMost(5)),
        Control::new(
            "D",
            "Audit logon",
            ControlCategory::AdvancedAuditPolicy,
            Impact::Low,
            2,
            Probe::AuditSubcategory("Logon".to_string()),
            Expectation::Audit {
                success: true,
                failure: true,
            },
        ),
    ];
    BenchmarkCatalog::from_controls(BenchmarkInfo::default(), controls).expect("catalog")
}

#[test]
fn evaluation_classifies_pass_fail_and_unknown() {
    let host = Arc::new(FakeHost::default());
    host.set_integer(PolicyName::MinPasswordLength, 10);
    host.set_integer(PolicyName::PasswordHistory, 24);
    host.break_policy(PolicyName::LockoutThreshold);
    host.set_audit("Logon", true, false);
    let catalog = small_catalog(&host);
    let harness = Harness::new();

    let results = ComplianceEvaluator::new(&catalog, host.as_ref(), &harness.audit)
        .evaluate(&Selection::all())
        .expect("evaluate");

    let statuses: Vec<(&str, CheckStatus)> =
        results.iter().map(|r| (r.control_id.as_str(), r.status)).collect();
    assert_eq!(
        statuses,
        vec![
            ("A", CheckStatus::Fail),
            ("B", CheckStatus::Pass),
            ("C", CheckStatus::Unknown),
            ("D", CheckStatus::Fail),
        ]
    );
    assert_eq!(results[0].actual_value, Some(PolicyData::Integer(10)));
    assert_eq!(results[0].expected_value, ">= 14");
    assert_eq!(results[2].actual_value, None);
    assert!(results[2].detail.as_deref().is_some_and(|d| d.contains("exit code 2")));
    assert_eq!(results[3].expected_value, "Success and Failure");
}

#[test]
fn evaluation_logs_start_and_completion_per_control() {
    let host = Arc::new(FakeHost::default());
    host.set_integer(PolicyName::MinPasswordLength, 14);
    let catalog = small_catalog(&host);
    let harness = Harness::new();

    ComplianceEvaluator::new(&catalog, host.as_ref(), &harness.audit)
        .evaluate(&Selection::ids(["A"]))
        .expect("evaluate");

    let entries = harness.entries(EntryFilter {
        operation: Some(Operation::Check),
        control_id: Some("A".to_string()),
        ..EntryFilter::default()
    });
    assert_eq!(entries.len(), 2);
    assert!(entries.iter().all(|e| e.level == LogLevel::Verbose));
    assert_eq!(entries[1].context.get("status").and_then(|v| v.as_str()), Some("Pass"));
}

#[test]
fn duplicate_ids_are_evaluated_once() {
    let host = Arc::new(FakeHost::default());
    host.set_integer(PolicyName::PasswordHistory, 24);
    let catalog = small_catalog(&host);
    let harness = Harness::new();

    let results = ComplianceEvaluator::new(&catalog, host.as_ref(), &harness.audit)
        .evaluate(&Selection::ids(["B", "B"]))
        .expect("evaluate");
    assert_eq!(results.len(), 1);
    assert_eq!(host.reads.load(Ordering::SeqCst), 1);
}

#[test]
fn repeated_evaluation_is_idempotent() {
    let host = Arc::new(FakeHost::default());
    host.set_integer(PolicyName::MinPasswordLength, 8);
    host.set_integer(PolicyName::PasswordHistory, 30);
    let catalog = small_catalog(&host);
    let harness = Harness::new();
    let evaluator = ComplianceEvaluator::new(&catalog, host.as_ref(), &harness.audit);

    let first = evaluator.evaluate(&Selection::all()).expect("first");
    let second = evaluator.evaluate(&Selection::all()).expect("second");
    assert_eq!(first.len(), second.len());
    for (a, b) in first.iter().zip(&second) {
        assert_eq!(a.control_id, b.control_id);
        assert_eq!(a.status, b.status);
        assert_eq!(a.expected_value, b.expected_value);
        assert_eq!(a.actual_value, b.actual_value);
    }
}

#[test]
fn summary_counts_and_percentages() {
    let host = Arc::new(FakeHost::default());
    host.set_integer(PolicyName::MinPasswordLength, 14);
    host.set_integer(PolicyName::PasswordHistory, 24);
    host.set_audit("Logon", false, false);
    let catalog = small_catalog(&host);
    let harness = Harness::new();

    let results = ComplianceEvaluator::new(&catalog, host.as_ref(), &harness.audit)
        .evaluate(&Selection::all())
        .expect("evaluate");
    let summary = summarize(&results);
    assert_eq!((summary.total, summary.passed, summary.failed, summary.unknown), (4, 2, 1, 1));
    assert_eq!(summary.compliance_percent, 66.67);

    let empty = summarize(&[]);
    assert_eq!(empty.total, 0);
    assert_eq!(empty.compliance_percent, 100.0);
}

// ── Remediation ────────────────────────────────────────────────────────

fn apply() -> RemediationOptions {
    RemediationOptions {
        mode: ExecutionMode::Apply,
        exclude_high_impact: false,
        ..RemediationOptions::default()
    }
}

fn failing_batch(host: &Arc<FakeHost>) -> BenchmarkCatalog {
    // Five failing controls, two of them High impact.
    host.set_integer(PolicyName::PasswordHistory, 0);
    host.set_integer(PolicyName::MaxPasswordAge, 0);
    host.set_integer(PolicyName::MinPasswordAge, 0);
    host.set_integer(PolicyName::MinPasswordLength, 0);
    host.set_integer(PolicyName::LockoutThreshold, 0);
    let controls = vec![
        integer_control("F1", Impact::Low, PolicyName::PasswordHistory, Expectation::AtLeast(24))
            .with_remediation(setter(host, PolicyName::PasswordHistory, 24)),
        integer_control("F2", Impact::High, PolicyName::MaxPasswordAge, Expectation::NonZeroAtMost(365))
            .with_remediation(setter(host, PolicyName::MaxPasswordAge, 365)),
        integer_control("F3", Impact::Medium, PolicyName::MinPasswordAge, Expectation::AtLeast(1))
            .with_remediation(setter(host, PolicyName::MinPasswordAge, 1)),
        integer_control("F4", Impact::High, PolicyName::MinPasswordLength, Expectation::AtLeast(14))
            .with_remediation(setter(host, PolicyName::MinPasswordLength, 14)),
        integer_control("F5", Impact::Medium, PolicyName::LockoutThreshold, Expectation::NonZeroAtMost(5))
            .with_remediation(setter(host, PolicyName::LockoutThreshold, 5)),
    ];
    BenchmarkCatalog::from_controls(BenchmarkInfo::default(), controls).expect("catalog")
}

#[test]
fn high_impact_exclusion_composes_with_the_failing_filter() {
    let host = Arc::new(FakeHost::elevated());
    let catalog = failing_batch(&host);
    let harness = Harness::new();

    let run = RemediationOrchestrator::new(&catalog, host.as_ref(), &harness.audit)
        .remediate(
            RemediationInput::Evaluate(Selection::all()),
            &RemediationOptions {
                exclude_high_impact: true,
                ..apply()
            },
        )
        .expect("remediate");

    assert_eq!(run.results.len(), 3);
    assert!(run.results.iter().all(|r| r.impact != Impact::High));
    let ids: Vec<&str> = run.results.iter().map(|r| r.control_id.as_str()).collect();
    assert_eq!(ids, vec!["F1", "F3", "F5"]);
    assert_eq!(run.summary.success, 3);
}

#[test]
fn allow_list_intersects_with_failing_controls() {
    let host = Arc::new(FakeHost::elevated());
    let catalog = failing_batch(&host);
    let harness = Harness::new();
    host.set_integer(PolicyName::MinPasswordAge, 2);

    let run = RemediationOrchestrator::new(&catalog, host.as_ref(), &harness.audit)
        .remediate(
            RemediationInput::Evaluate(Selection::all()),
            &RemediationOptions {
                control_ids: Some(vec!["F3".to_string(), "F5".to_string(), "ZZ".to_string()]),
                ..apply()
            },
        )
        .expect("remediate");

    let ids: Vec<&str> = run.results.iter().map(|r| r.control_id.as_str()).collect();
    assert_eq!(ids, vec!["F5"]);
}

#[test]
fn simulation_never_mutates_state() {
    let host = Arc::new(FakeHost::elevated());
    let catalog = failing_batch(&host);
    let harness = Harness::new();
    let evaluator = ComplianceEvaluator::new(&catalog, host.as_ref(), &harness.audit);
    let before = evaluator.evaluate(&Selection::all()).expect("before");

    let run = RemediationOrchestrator::new(&catalog, host.as_ref(), &harness.audit)
        .remediate(
            RemediationInput::Results(before.clone()),
            &RemediationOptions {
                mode: ExecutionMode::Simulate,
                exclude_high_impact: false,
                ..RemediationOptions::default()
            },
        )
        .expect("simulate");

    assert_eq!(run.results.len(), 5);
    for result in &run.results {
        assert_eq!(result.status, RemediationStatus::WhatIf);
        assert!(result.applied_at.is_none());
        assert!(result.new_value.is_none());
        assert!(result.message.starts_with("would set"));
    }
    assert_eq!(run.summary.what_if, 5);

    let after = evaluator.evaluate(&Selection::all()).expect("after");
    let statuses = |results: &[CheckResult]| results.iter().map(|r| r.status).collect::<Vec<_>>();
    assert_eq!(statuses(&before), statuses(&after));

    let entries = harness.entries(EntryFilter {
        control_id: Some("F1".to_string()),
        operation: Some(Operation::Remediation),
        ..EntryFilter::default()
    });
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].context.get("whatIf").and_then(|v| v.as_bool()), Some(true));
}

#[test]
fn one_failing_procedure_does_not_abort_the_batch() {
    let host = Arc::new(FakeHost::elevated());
    host.set_integer(PolicyName::PasswordHistory, 0);
    host.set_integer(PolicyName::MinPasswordAge, 0);
    host.set_integer(PolicyName::MinPasswordLength, 0);
    let controls = vec![
        integer_control("A", Impact::Low, PolicyName::PasswordHistory, Expectation::AtLeast(24))
            .with_remediation(setter(&host, PolicyName::PasswordHistory, 24)),
        integer_control("B", Impact::Low, PolicyName::MinPasswordAge, Expectation::AtLeast(1))
            .with_remediation(failing_procedure()),
        integer_control("C", Impact::Low, PolicyName::MinPasswordLength, Expectation::AtLeast(14))
            .with_remediation(setter(&host, PolicyName::MinPasswordLength, 14)),
    ];
    let catalog = BenchmarkCatalog::from_controls(BenchmarkInfo::default(), controls).expect("catalog");
    let harness = Harness::new();

    let run = RemediationOrchestrator::new(&catalog, host.as_ref(), &harness.audit)
        .remediate(RemediationInput::Evaluate(Selection::all()), &apply())
        .expect("remediate");

    let statuses: Vec<RemediationStatus> = run.results.iter().map(|r| r.status).collect();
    assert_eq!(
        statuses,
        vec![RemediationStatus::Success, RemediationStatus::Failed, RemediationStatus::Success]
    );
    assert!(run.results[1].message.contains("access denied"));
    assert!(run.results[1].applied_at.is_none());
    assert_eq!(run.results[2].new_value, Some(PolicyData::Integer(14)));
    assert_eq!(host.integer(PolicyName::MinPasswordLength), Some(14));

    let errors = harness.entries(EntryFilter {
        min_level: Some(LogLevel::Error),
        ..EntryFilter::default()
    });
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].context.get("controlId").and_then(|v| v.as_str()), Some("B"));
}

#[test]
fn manual_controls_are_skipped_never_failed() {
    let host = Arc::new(FakeHost::elevated());
    host.set_integer(PolicyName::PasswordHistory, 3);
    host.set_integer(PolicyName::MinPasswordLength, 3);
    let controls = vec![
        integer_control("M1", Impact::High, PolicyName::PasswordHistory, Expectation::AtLeast(24)),
        Control::new(
            "M2",
            "Manual length",
            ControlCategory::LocalPolicies,
            Impact::Low,
            2,
            Probe::Policy(PolicyName::MinPasswordLength),
            Expectation::AtLeast(14),
        ),
    ];
    let catalog = BenchmarkCatalog::from_controls(BenchmarkInfo::default(), controls).expect("catalog");
    let harness = Harness::new();

    for mode in [ExecutionMode::Simulate, ExecutionMode::Apply] {
        let run = RemediationOrchestrator::new(&catalog, host.as_ref(), &harness.audit)
            .remediate(
                RemediationInput::Evaluate(Selection::all()),
                &RemediationOptions {
                    mode,
                    ..apply()
                },
            )
            .expect("remediate");
        assert_eq!(run.results.len(), 2);
        for result in &run.results {
            assert_eq!(result.status, RemediationStatus::Skipped);
            assert_eq!(result.message, "no remediation available — manual intervention required");
        }
    }

    let warnings = harness.entries(EntryFilter {
        control_id: Some("M1".to_string()),
        ..EntryFilter::default()
    });
    assert!(warnings
        .iter()
        .any(|e| e.operation == Operation::Remediation && e.level == LogLevel::Warning));
}

#[test]
fn declined_and_unknown_controls_are_reported() {
    let host = Arc::new(FakeHost::elevated());
    let catalog = failing_batch(&host);
    let harness = Harness::new();
    let evaluator = ComplianceEvaluator::new(&catalog, host.as_ref(), &harness.audit);
    let mut checks = evaluator.evaluate(&Selection::ids(["F1", "F3"])).expect("evaluate");

    let mut stale = checks[0].clone();
    stale.control_id = "RETIRED".to_string();
    checks.push(stale);

    let options = RemediationOptions {
        authorizer: Some(Arc::new(|id: &str| id != "F3")),
        ..apply()
    };
    let run = RemediationOrchestrator::new(&catalog, host.as_ref(), &harness.audit)
        .remediate(RemediationInput::Results(checks), &options)
        .expect("remediate");

    let outcomes: Vec<(&str, RemediationStatus, &str)> = run
        .results
        .iter()
        .map(|r| (r.control_id.as_str(), r.status, r.message.as_str()))
        .collect();
    assert_eq!(outcomes[1], ("F3", RemediationStatus::Skipped, "declined by operator"));
    assert_eq!(outcomes[2], ("RETIRED", RemediationStatus::Failed, "control definition not found"));
    assert_eq!(outcomes[0].1, RemediationStatus::Success);
    assert_eq!(host.integer(PolicyName::MinPasswordAge), Some(0));
}

#[test]
fn unreadable_recheck_keeps_success_without_new_value() {
    let host = Arc::new(FakeHost::elevated());
    host.set_integer(PolicyName::PasswordHistory, 1);
    let breaker = {
        let host = Arc::clone(&host);
        Arc::new(FnProcedure::new("applies then breaks the reader", move |_| {
            host.break_policy(PolicyName::PasswordHistory);
            Ok("applied".to_string())
        }))
    };
    let controls = vec![
        integer_control("R", Impact::Low, PolicyName::PasswordHistory, Expectation::AtLeast(24))
            .with_remediation(breaker),
    ];
    let catalog = BenchmarkCatalog::from_controls(BenchmarkInfo::default(), controls).expect("catalog");
    let harness = Harness::new();

    let run = RemediationOrchestrator::new(&catalog, host.as_ref(), &harness.audit)
        .remediate(RemediationInput::Evaluate(Selection::all()), &apply())
        .expect("remediate");

    let result = &run.results[0];
    assert_eq!(result.status, RemediationStatus::Success);
    assert!(result.applied_at.is_some());
    assert_eq!(result.new_value, None);
    assert_eq!(result.verification, Some(CheckStatus::Unknown));
    assert_eq!(result.previous_value, Some(PolicyData::Integer(1)));

    let warnings = harness.entries(EntryFilter {
        min_level: Some(LogLevel::Warning),
        control_id: Some("R".to_string()),
        ..EntryFilter::default()
    });
    assert!(warnings.iter().any(|e| e.message.contains("re-check")));
}

#[test]
fn unelevated_apply_warns_but_proceeds() {
    let host = Arc::new(FakeHost::default());
    let catalog = failing_batch(&host);
    let harness = Harness::new();

    let run = RemediationOrchestrator::new(&catalog, host.as_ref(), &harness.audit)
        .remediate(RemediationInput::Evaluate(Selection::ids(["F1"])), &apply())
        .expect("remediate");
    assert_eq!(run.results[0].status, RemediationStatus::Success);

    let warnings = harness.entries(EntryFilter {
        min_level: Some(LogLevel::Warning),
        operation: Some(Operation::Remediation),
        ..EntryFilter::default()
    });
    assert!(warnings.iter().any(|e| e.message.contains("not running elevated")));
}

#[test]
fn empty_selection_is_distinguishable_from_all_skipped() {
    let host = Arc::new(FakeHost::elevated());
    host.set_integer(PolicyName::PasswordHistory, 24);
    let catalog = small_catalog(&host);
    let harness = Harness::new();

    let run = RemediationOrchestrator::new(&catalog, host.as_ref(), &harness.audit)
        .remediate(RemediationInput::Evaluate(Selection::ids(["B"])), &apply())
        .expect("remediate");
    assert!(run.results.is_empty());
    assert!(run.summary.is_empty());
}

#[test]
fn apply_with_nothing_to_fix_skips_the_elevation_check() {
    let host = Arc::new(FakeHost::default());
    host.set_integer(PolicyName::PasswordHistory, 24);
    let catalog = small_catalog(&host);
    let harness = Harness::new();

    let run = RemediationOrchestrator::new(&catalog, host.as_ref(), &harness.audit)
        .remediate(RemediationInput::Evaluate(Selection::ids(["B"])), &apply())
        .expect("remediate");
    assert!(run.summary.is_empty());
    assert_eq!(host.elevation_checks.load(Ordering::SeqCst), 0);

    let warnings = harness.entries(EntryFilter {
        min_level: Some(LogLevel::Warning),
        ..EntryFilter::default()
    });
    assert!(warnings.iter().all(|e| !e.message.contains("not running elevated")));
}

#[test]
fn duplicate_failing_results_are_remediated_once() {
    let host = Arc::new(FakeHost::elevated());
    let catalog = failing_batch(&host);
    let harness = Harness::new();
    let checks = ComplianceEvaluator::new(&catalog, host.as_ref(), &harness.audit)
        .evaluate(&Selection::ids(["F1"]))
        .expect("evaluate");
    let doubled = vec![checks[0].clone(), checks[0].clone()];

    let run = RemediationOrchestrator::new(&catalog, host.as_ref(), &harness.audit)
        .remediate(RemediationInput::Results(doubled), &apply())
        .expect("remediate");
    assert_eq!(run.results.len(), 1);
}
