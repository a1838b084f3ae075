//! Dry-run executor: reports what the live executor would do.
//!
//! Holds no mutable state and runs no commands. `success` says whether the
//! live executor would have been allowed to act.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;
use vigil_common::{
    ActionExtra, ActionKind, ExecutionResult, Operation, RecommendationKind, RollbackOutcome,
    RollbackTarget, SafetyGate, Whitelist,
};

use super::{reversible_target, Executor, Issue, PRIORITY_BELOW_NORMAL, PRIORITY_NORMAL};

pub struct DryRunExecutor {
    gate: Arc<SafetyGate>,
    update_service: String,
}

impl DryRunExecutor {
    pub fn new(gate: Arc<SafetyGate>, update_service: &str) -> Self {
        Self {
            gate,
            update_service: update_service.to_string(),
        }
    }

    fn throttle(&self, issue: &Issue) -> ExecutionResult {
        let Some(target) = issue.target.as_deref() else {
            return ExecutionResult::failed(
                "Could not identify target process from issue.",
                ActionExtra::default(),
            );
        };
        let extra = ActionExtra::process(target);
        match self.gate.check(Operation::Throttle, target, &issue.whitelist) {
            Ok(()) => ExecutionResult::ok(
                format!("Would throttle ({}) to below-normal priority.", target),
                ActionExtra {
                    priority: Some(PRIORITY_BELOW_NORMAL.to_string()),
                    ..extra.detail("throttled")
                },
            ),
            Err(veto) => ExecutionResult::failed(
                format!("Would SKIP throttling ({}): {}.", target, veto),
                extra,
            ),
        }
    }

    fn kill(&self, issue: &Issue) -> ExecutionResult {
        let Some(target) = issue.target.as_deref() else {
            return ExecutionResult::failed(
                "Could not identify target process from issue.",
                ActionExtra::default(),
            );
        };
        match self.gate.check(Operation::Kill, target, &issue.whitelist) {
            Ok(()) => ExecutionResult::ok(
                format!("Would kill top CPU process: {} (Allowed).", target),
                ActionExtra::process(target).detail("killed"),
            ),
            Err(veto) => ExecutionResult::failed(
                format!("Would SKIP killing process: {} ({}).", target, veto),
                ActionExtra::process(target).recommend(RecommendationKind::CloseApp),
            ),
        }
    }

    fn restart(&self, service: Option<&str>, whitelist: &Whitelist) -> ExecutionResult {
        let Some(service) = service else {
            return ExecutionResult::failed(
                "Could not identify target service from issue.",
                ActionExtra::default(),
            );
        };
        match self.gate.check(Operation::RestartService, service, whitelist) {
            Ok(()) => ExecutionResult::ok(
                format!("Would restart service: {}.", service),
                ActionExtra::service(service).detail("restarted"),
            ),
            Err(veto) => ExecutionResult::failed(
                format!("Would SKIP restarting service {}: {}.", service, veto),
                ActionExtra::service(service).recommend(RecommendationKind::RestartService),
            ),
        }
    }
}

#[async_trait]
impl Executor for DryRunExecutor {
    fn name(&self) -> &'static str {
        "dry-run"
    }

    fn is_dry_run(&self) -> bool {
        true
    }

    async fn execute(&self, kind: ActionKind, issue: &Issue) -> ExecutionResult {
        let result = match kind {
            ActionKind::ThrottleHighCpuProcess => self.throttle(issue),
            ActionKind::KillHighCpuProcess => self.kill(issue),
            ActionKind::FreeDiskSpace => ExecutionResult::ok(
                "Would vacuum the journal, trim the package cache and clean temp directories.",
                ActionExtra {
                    files_deleted: Some("journal, package_cache, temp".to_string()),
                    ..Default::default()
                },
            ),
            ActionKind::ClearMemoryHog | ActionKind::LogMemoryHog => ExecutionResult::ok(
                "Would identify the largest memory consumer and recommend closing it.",
                ActionExtra::default().detail("identified"),
            ),
            ActionKind::RestartService => {
                self.restart(issue.target.as_deref(), &issue.whitelist)
            }
            ActionKind::LogServiceFailure => match issue.target.as_deref() {
                Some(service) => ExecutionResult::ok(
                    format!("Service stopped: {} - Recommend manual restart", service),
                    ActionExtra::service(service).recommend(RecommendationKind::RestartService),
                ),
                None => ExecutionResult::ok(
                    "Would list failed automatic services.",
                    ActionExtra::default(),
                ),
            },
            ActionKind::HandleUpdatesPending => {
                let mut result = self.restart(Some(self.update_service.as_str()), &issue.whitelist);
                result.output = format!(
                    "{} Update service restart finalizes pending updates.",
                    result.output
                );
                result
            }
            ActionKind::LogUpdatesPending => ExecutionResult::ok(
                format!(
                    "{} updates pending - Recommend installing updates manually",
                    issue.metric_value
                ),
                ActionExtra::default().recommend(RecommendationKind::InstallUpdates),
            ),
        };

        info!("[DRY RUN] {}: {}", kind, result.output);
        result
    }

    async fn rollback(&self, kind: ActionKind, target: &RollbackTarget) -> RollbackOutcome {
        match reversible_target(kind, target) {
            Ok(process) => RollbackOutcome::restored(
                format!("Would restore normal priority for ({}).", process),
                PRIORITY_NORMAL,
            ),
            Err(outcome) => outcome,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_common::Severity;

    fn executor() -> DryRunExecutor {
        DryRunExecutor::new(Arc::new(SafetyGate::new()), "packagekit")
    }

    fn issue(target: Option<&str>, whitelist: &[&str]) -> Issue {
        Issue {
            description: "test".to_string(),
            metric_value: 97.0,
            threshold: 80.0,
            severity: Severity::Critical,
            target: target.map(str::to_string),
            whitelist: whitelist.iter().map(|s| s.to_string()).collect::<Whitelist>(),
        }
    }

    #[tokio::test]
    async fn test_dry_run_is_idempotent() {
        let exec = executor();
        let input = issue(Some("chrome"), &["chrome"]);
        for kind in ActionKind::ALL {
            let first = exec.execute(kind, &input).await;
            let second = exec.execute(kind, &input).await;
            assert_eq!(first, second, "{} not idempotent", kind);
        }
    }

    #[tokio::test]
    async fn test_kill_outside_whitelist_fails_and_recommends() {
        let result = executor()
            .execute(ActionKind::KillHighCpuProcess, &issue(Some("blender"), &[]))
            .await;
        assert!(!result.success);
        assert!(result.output.contains("Would SKIP"));
        assert_eq!(result.extra.recommendation, Some(RecommendationKind::CloseApp));
        assert_eq!(result.extra.target_process.as_deref(), Some("blender"));
    }

    #[tokio::test]
    async fn test_kill_whitelisted_would_succeed() {
        let result = executor()
            .execute(ActionKind::KillHighCpuProcess, &issue(Some("chrome"), &["chrome"]))
            .await;
        assert!(result.success);
        assert!(result.output.contains("chrome"));
        assert_eq!(result.extra.recommendation, None);
    }

    #[tokio::test]
    async fn test_throttle_denied_process() {
        let result = executor()
            .execute(ActionKind::ThrottleHighCpuProcess, &issue(Some("systemd"), &["systemd"]))
            .await;
        assert!(!result.success);
        assert!(result.output.contains("protected"));
    }

    #[tokio::test]
    async fn test_missing_target_fails() {
        let result = executor()
            .execute(ActionKind::ThrottleHighCpuProcess, &issue(None, &[]))
            .await;
        assert!(!result.success);
        assert!(result.output.contains("Could not identify"));
    }

    #[tokio::test]
    async fn test_restart_unknown_service_is_vetoed() {
        let result = executor()
            .execute(ActionKind::RestartService, &issue(Some("postgresql"), &[]))
            .await;
        assert!(!result.success);
        let result = executor()
            .execute(ActionKind::RestartService, &issue(Some("bluetooth"), &[]))
            .await;
        assert!(result.success);
    }

    #[tokio::test]
    async fn test_rollback_semantics() {
        let exec = executor();
        let target = RollbackTarget {
            target_process: Some("chrome".to_string()),
            target_service: None,
        };
        let undo = exec.rollback(ActionKind::ThrottleHighCpuProcess, &target).await;
        assert!(undo.success);
        assert_eq!(undo.restored.as_deref(), Some("normal"));

        let undo = exec.rollback(ActionKind::KillHighCpuProcess, &target).await;
        assert!(!undo.success);
        assert_eq!(undo.restored, None);
    }
}
