//! Well-formedness verification (§4.2): a fixed battery of checks run over a
//! built [`Cfg`], aggregated into a [`VerificationReport`].
//!
//! Checks are grouped by priority: P0 failures make the CFG unprojectable,
//! P1 failures mean the protocol can deadlock or starve, P2 findings are
//! either hard errors (self-communication, empty branches) or warnings
//! (multicast), and P3 is advisory. `verify` always runs every check; it
//! never short-circuits on the first failure, so a caller gets the full
//! picture in one pass.

mod checks;

use crate::cfg::Cfg;
use crate::error::VerificationError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Priority {
    P0,
    P1,
    P2,
    P3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckResult {
    pub name: &'static str,
    pub priority: Priority,
    pub severity: Severity,
    pub pass: bool,
    pub violations: Vec<VerificationError>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
pub struct VerificationReport {
    pub checks: Vec<CheckResult>,
}

impl VerificationReport {
    /// True if any `Severity::Error` check failed (P0-P2 correctness checks
    /// and the hard-error P2 findings; multicast is a warning, not an
    /// error).
    pub fn has_errors(&self) -> bool {
        self.checks
            .iter()
            .any(|c| !c.pass && c.severity == Severity::Error)
    }

    pub fn has_warnings(&self) -> bool {
        self.checks
            .iter()
            .any(|c| !c.pass && c.severity == Severity::Warning)
    }

    pub fn is_well_formed(&self) -> bool {
        !self.has_errors()
    }

    pub fn errors(&self) -> impl Iterator<Item = &VerificationError> {
        self.checks
            .iter()
            .filter(|c| !c.pass && c.severity == Severity::Error)
            .flat_map(|c| c.violations.iter())
    }

    pub fn warnings(&self) -> impl Iterator<Item = &VerificationError> {
        self.checks
            .iter()
            .filter(|c| !c.pass && c.severity == Severity::Warning)
            .flat_map(|c| c.violations.iter())
    }
}

fn result(
    name: &'static str,
    priority: Priority,
    severity: Severity,
    violations: Vec<VerificationError>,
) -> CheckResult {
    CheckResult {
        name,
        priority,
        severity,
        pass: violations.is_empty(),
        violations,
    }
}

/// Run every §4.2 check over `cfg` and return the aggregated report.
#[tracing::instrument(skip(cfg), fields(protocol = %cfg.protocol_name))]
pub fn verify(cfg: &Cfg) -> VerificationReport {
    let mut report = VerificationReport::default();

    report.checks.push(result(
        "connectedness",
        Priority::P0,
        Severity::Error,
        checks::check_connectedness(cfg),
    ));
    report.checks.push(result(
        "choice_determinism",
        Priority::P0,
        Severity::Error,
        checks::check_choice_determinism(cfg),
    ));
    report.checks.push(result(
        "choice_mergeability",
        Priority::P0,
        Severity::Error,
        checks::check_choice_mergeability(cfg),
    ));

    report.checks.push(result(
        "deadlock_freedom",
        Priority::P1,
        Severity::Error,
        checks::check_deadlock_freedom(cfg),
    ));
    report.checks.push(result(
        "liveness",
        Priority::P1,
        Severity::Error,
        checks::check_liveness(cfg),
    ));
    report.checks.push(result(
        "parallel_deadlock_freedom",
        Priority::P1,
        Severity::Error,
        checks::check_parallel_deadlock(cfg),
    ));
    report.checks.push(result(
        "race_freedom",
        Priority::P1,
        Severity::Error,
        checks::check_race_conditions(cfg),
    ));
    report.checks.push(result(
        "continue_validity",
        Priority::P1,
        Severity::Error,
        checks::check_continue_validity(cfg),
    ));
    report.checks.push(result(
        "recursion_not_in_parallel",
        Priority::P1,
        Severity::Error,
        checks::check_recursion_in_parallel(cfg),
    ));
    report.checks.push(result(
        "fork_join_structure",
        Priority::P1,
        Severity::Error,
        checks::check_fork_join_structure(cfg),
    ));

    report.checks.push(result(
        "no_self_communication",
        Priority::P2,
        Severity::Error,
        checks::check_self_communication(cfg),
    ));
    report.checks.push(result(
        "no_empty_branches",
        Priority::P2,
        Severity::Error,
        checks::check_empty_branches(cfg),
    ));
    report.checks.push(result(
        "no_unnecessary_multicast",
        Priority::P2,
        Severity::Warning,
        checks::check_multicast(cfg),
    ));

    report.checks.push(result(
        "merge_reachability",
        Priority::P3,
        Severity::Warning,
        checks::check_merge_reachability(cfg),
    ));

    report
}
