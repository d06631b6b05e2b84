//! Structured results of mutations and verification.
//!
//! Installs and uninstalls attempt every step regardless of earlier failures;
//! the report is how those failures become visible to the caller.

use serde::Serialize;
use std::fmt;
use verv_runtime::{ExecStatus, RuntimeError};
use verv_schema::PackageName;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum Outcome {
    Succeeded,
    Failed(String),
    Skipped(String),
}

impl Outcome {
    /// Map the result of one external invocation.
    pub fn from_exec(result: Result<ExecStatus, RuntimeError>) -> Self {
        match result {
            Ok(ExecStatus::Succeeded) => Self::Succeeded,
            Ok(status) => Self::Failed(status.to_string()),
            Err(e) => Self::Failed(e.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
            Self::Skipped(reason) => write!(f, "skipped: {reason}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Step {
    CreateEnvironment,
    BootstrapInstaller,
    UpgradeInstaller,
    Install { force: bool },
    Uninstall { package: PackageName },
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CreateEnvironment => write!(f, "create environment"),
            Self::BootstrapInstaller => write!(f, "bootstrap installer"),
            Self::UpgradeInstaller => write!(f, "upgrade installer"),
            Self::Install { force: true } => write!(f, "install manifest (forced)"),
            Self::Install { force: false } => write!(f, "install manifest"),
            Self::Uninstall { package } => write!(f, "uninstall {package}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepRecord {
    pub step: Step,
    pub outcome: Outcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageOutcome {
    pub package: PackageName,
    pub outcome: Outcome,
}

/// Ordered log of the steps a mutation attempted.
#[derive(Debug, Clone, Serialize)]
pub struct MutationReport {
    pub started_at: String,
    pub finished_at: Option<String>,
    pub steps: Vec<StepRecord>,
}

impl Default for MutationReport {
    fn default() -> Self {
        Self::new()
    }
}

impl MutationReport {
    pub fn new() -> Self {
        Self {
            started_at: chrono::Utc::now().to_rfc3339(),
            finished_at: None,
            steps: Vec::new(),
        }
    }

    pub fn record(&mut self, step: Step, outcome: Outcome) {
        self.steps.push(StepRecord { step, outcome });
    }

    #[must_use]
    pub fn finish(mut self) -> Self {
        self.finished_at = Some(chrono::Utc::now().to_rfc3339());
        self
    }

    /// True when no step failed. Skipped steps do not count as failures.
    pub fn is_clean(&self) -> bool {
        !self.steps.iter().any(|s| s.outcome.is_failure())
    }

    pub fn failures(&self) -> impl Iterator<Item = &StepRecord> {
        self.steps.iter().filter(|s| s.outcome.is_failure())
    }

    pub fn outcome_of(&self, step: &Step) -> Option<&Outcome> {
        self.steps
            .iter()
            .rev()
            .find(|s| s.step == *step)
            .map(|s| &s.outcome)
    }

    /// Per-package outcomes of uninstall steps, in manifest order.
    pub fn package_outcomes(&self) -> Vec<PackageOutcome> {
        self.steps
            .iter()
            .filter_map(|s| match &s.step {
                Step::Uninstall { package } => Some(PackageOutcome {
                    package: package.clone(),
                    outcome: s.outcome.clone(),
                }),
                _ => None,
            })
            .collect()
    }
}

/// Result of checking every manifest entry against a resolution context.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Verification {
    pub manifest_found: bool,
    pub checked: Vec<PackageName>,
    pub missing: Vec<PackageName>,
}

impl Verification {
    pub fn manifest_missing() -> Self {
        Self::default()
    }

    pub fn manifest_found() -> Self {
        Self {
            manifest_found: true,
            ..Self::default()
        }
    }

    pub fn record(&mut self, package: &PackageName, importable: bool) {
        self.checked.push(package.clone());
        if !importable && !self.missing.contains(package) {
            self.missing.push(package.clone());
        }
    }

    /// A missing manifest is never satisfied; an empty one always is.
    pub fn is_satisfied(&self) -> bool {
        self.manifest_found && self.missing.is_empty()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct InstallOutcome {
    pub report: MutationReport,
    pub verification: Verification,
}

impl InstallOutcome {
    pub fn is_satisfied(&self) -> bool {
        self.verification.is_satisfied()
    }

    /// Per-package view combining the install step with verification.
    pub fn package_outcomes(&self) -> Vec<PackageOutcome> {
        let install = self
            .report
            .steps
            .iter()
            .rev()
            .find(|s| matches!(s.step, Step::Install { .. }))
            .map(|s| &s.outcome);

        self.verification
            .checked
            .iter()
            .map(|package| {
                let outcome = if !self.verification.missing.contains(package) {
                    Outcome::Succeeded
                } else {
                    match install {
                        Some(o @ (Outcome::Failed(_) | Outcome::Skipped(_))) => o.clone(),
                        _ => Outcome::Failed("not importable after install".to_owned()),
                    }
                };
                PackageOutcome {
                    package: package.clone(),
                    outcome,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pkg(name: &str) -> PackageName {
        PackageName::new(name)
    }

    #[test]
    fn exec_status_maps_to_outcome() {
        assert_eq!(Outcome::from_exec(Ok(ExecStatus::Succeeded)), Outcome::Succeeded);
        assert!(Outcome::from_exec(Ok(ExecStatus::Cancelled)).is_failure());
        assert_eq!(
            Outcome::from_exec(Ok(ExecStatus::TimedOut { after_ms: 9000 })),
            Outcome::Failed("timed out after 9s".to_owned())
        );
        assert!(Outcome::from_exec(Err(RuntimeError::ExecFailed("x".to_owned()))).is_failure());
    }

    #[test]
    fn skipped_steps_keep_report_clean() {
        let mut report = MutationReport::new();
        report.record(Step::BootstrapInstaller, Outcome::Succeeded);
        report.record(
            Step::Uninstall { package: pkg("six") },
            Outcome::Skipped("cancelled".to_owned()),
        );
        assert!(report.is_clean());

        report.record(
            Step::Uninstall { package: pkg("attrs") },
            Outcome::Failed("exit 1".to_owned()),
        );
        assert!(!report.is_clean());
        assert_eq!(report.failures().count(), 1);
    }

    #[test]
    fn package_outcomes_follow_uninstall_order() {
        let mut report = MutationReport::new();
        report.record(Step::BootstrapInstaller, Outcome::Succeeded);
        report.record(Step::Uninstall { package: pkg("a") }, Outcome::Failed("boom".to_owned()));
        report.record(Step::Uninstall { package: pkg("b") }, Outcome::Succeeded);
        let outcomes = report.package_outcomes();
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].package, "a");
        assert!(outcomes[0].outcome.is_failure());
        assert_eq!(outcomes[1].outcome, Outcome::Succeeded);
    }

    #[test]
    fn verification_semantics() {
        assert!(!Verification::manifest_missing().is_satisfied());
        assert!(Verification::manifest_found().is_satisfied());

        let mut v = Verification::manifest_found();
        v.record(&pkg("six"), true);
        v.record(&pkg("numpy"), false);
        v.record(&pkg("numpy"), false);
        assert!(!v.is_satisfied());
        assert_eq!(v.checked.len(), 3);
        assert_eq!(v.missing, vec![pkg("numpy")]);
    }

    #[test]
    fn install_package_outcomes_blame_failed_step() {
        let mut report = MutationReport::new();
        report.record(Step::Install { force: false }, Outcome::Failed("exit 1".to_owned()));
        let mut verification = Verification::manifest_found();
        verification.record(&pkg("six"), true);
        verification.record(&pkg("ghost"), false);

        let outcome = InstallOutcome {
            report: report.finish(),
            verification,
        };
        let per_pkg = outcome.package_outcomes();
        assert_eq!(per_pkg[0].outcome, Outcome::Succeeded);
        assert_eq!(per_pkg[1].outcome, Outcome::Failed("exit 1".to_owned()));
    }

    #[test]
    fn report_serializes_tagged_steps() {
        let mut report = MutationReport::new();
        report.record(Step::Install { force: true }, Outcome::Succeeded);
        report.record(
            Step::Uninstall { package: pkg("six") },
            Outcome::Skipped("cancelled".to_owned()),
        );
        let json = serde_json::to_value(report.finish()).unwrap();
        assert_eq!(json["steps"][0]["step"]["kind"], "install");
        assert_eq!(json["steps"][0]["step"]["force"], true);
        assert_eq!(json["steps"][0]["outcome"]["status"], "succeeded");
        assert_eq!(json["steps"][1]["step"]["package"], "six");
        assert_eq!(json["steps"][1]["outcome"]["reason"], "cancelled");
        assert!(json["finished_at"].is_string());
    }

    #[test]
    fn step_display() {
        assert_eq!(Step::Install { force: true }.to_string(), "install manifest (forced)");
        assert_eq!(
            Step::Uninstall { package: pkg("six") }.to_string(),
            "uninstall six"
        );
    }
}
