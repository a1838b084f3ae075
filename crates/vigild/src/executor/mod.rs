//! Executors - perform or simulate remediation actions
//!
//! Two variants share one contract: `DryRunExecutor` reports what would
//! happen, `LiveExecutor` does it through a `CommandRunner`. Both consult the
//! same `SafetyGate`. Which one runs is decided once at start by the policy
//! module and injected into the engine.

mod dry_run;
mod live;
pub mod runner;

pub use dry_run::DryRunExecutor;
pub use live::LiveExecutor;
pub use runner::{CommandOutput, CommandRunner, RunError, ScriptedRunner, TokioCommandRunner};

use async_trait::async_trait;
use vigil_common::{
    is_valid_name, ActionKind, Event, ExecutionResult, RollbackOutcome, RollbackTarget, Severity,
    Whitelist,
};

/// Executor input built from one event
#[derive(Debug, Clone, PartialEq)]
pub struct Issue {
    pub description: String,
    pub metric_value: f64,
    pub threshold: f64,
    pub severity: Severity,
    /// Process or service named by the analyzer
    pub target: Option<String>,
    /// Cycle whitelist snapshot
    pub whitelist: Whitelist,
}

impl Issue {
    pub fn from_event(event: &Event, whitelist: &Whitelist) -> Self {
        Self {
            description: event.description.clone(),
            metric_value: event.metric_value,
            threshold: event.threshold,
            severity: event.severity,
            target: event.target.clone(),
            whitelist: whitelist.clone(),
        }
    }
}

#[async_trait]
pub trait Executor: Send + Sync {
    fn name(&self) -> &'static str;

    /// True when the executor never mutates host state
    fn is_dry_run(&self) -> bool;

    /// Never panics and never errors: failures come back as `success=false`
    async fn execute(&self, kind: ActionKind, issue: &Issue) -> ExecutionResult;

    async fn rollback(&self, kind: ActionKind, target: &RollbackTarget) -> RollbackOutcome;
}

/// Priority marker left on a throttled process
pub(crate) const PRIORITY_BELOW_NORMAL: &str = "below_normal";
/// Priority marker restored by rollback
pub(crate) const PRIORITY_NORMAL: &str = "normal";

/// Resolve the process a rollback applies to, or the failure to report.
/// Only a throttle is reversible; kills and deletions report failure.
pub(crate) fn reversible_target(
    kind: ActionKind,
    target: &RollbackTarget,
) -> Result<&str, RollbackOutcome> {
    if kind.is_informational() {
        return Err(RollbackOutcome::failed(format!(
            "{} only reported, nothing to roll back",
            kind
        )));
    }
    if !kind.is_reversible() {
        return Err(RollbackOutcome::failed(format!(
            "{} is irreversible and cannot be rolled back",
            kind
        )));
    }
    match target.target_process.as_deref() {
        Some(name) if is_valid_name(name) => Ok(name.trim()),
        Some(name) => Err(RollbackOutcome::failed(format!(
            "Recorded target {:?} is not a valid process name",
            name
        ))),
        None => Err(RollbackOutcome::failed(
            "No recorded target process for rollback",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reversible_target_requires_throttle() {
        let target = RollbackTarget {
            target_process: Some("chrome".to_string()),
            target_service: None,
        };
        assert_eq!(
            reversible_target(ActionKind::ThrottleHighCpuProcess, &target),
            Ok("chrome")
        );
        for kind in [ActionKind::KillHighCpuProcess, ActionKind::FreeDiskSpace] {
            let outcome = reversible_target(kind, &target).unwrap_err();
            assert!(!outcome.success);
            assert!(outcome.output.contains("irreversible"));
        }
    }

    #[test]
    fn test_informational_rollback_has_nothing_to_undo() {
        let target = RollbackTarget {
            target_process: Some("firefox".to_string()),
            target_service: None,
        };
        for kind in [ActionKind::LogMemoryHog, ActionKind::LogServiceFailure] {
            let outcome = reversible_target(kind, &target).unwrap_err();
            assert!(!outcome.success);
            assert!(outcome.output.contains("nothing to roll back"), "{}", outcome.output);
        }
    }

    #[test]
    fn test_reversible_target_requires_valid_name() {
        let missing = RollbackTarget::default();
        assert!(reversible_target(ActionKind::ThrottleHighCpuProcess, &missing).is_err());
        let bogus = RollbackTarget {
            target_process: Some("-1".to_string()),
            target_service: None,
        };
        assert!(reversible_target(ActionKind::ThrottleHighCpuProcess, &bogus).is_err());
    }
}
