//! Live executor for systemd hosts.
//!
//! Every action targets one named resource and goes through the safety gate
//! before any command runs. Commands are bounded by the runner's timeout; a
//! timeout or spawn failure becomes a failed result, never an error.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use vigil_common::{
    ActionExtra, ActionKind, ExecutionResult, Operation, RecommendationKind, RollbackOutcome,
    RollbackTarget, SafetyGate, TargetKind, Whitelist,
};

use super::runner::{CommandOutput, CommandRunner, RunError};
use super::{reversible_target, Executor, Issue, PRIORITY_BELOW_NORMAL, PRIORITY_NORMAL};
use crate::config::RemediationConfig;

/// Niceness applied by a throttle
const THROTTLE_NICENESS: &str = "10";
/// Niceness restored by rollback
const NORMAL_NICENESS: &str = "0";

pub struct LiveExecutor {
    runner: Arc<dyn CommandRunner>,
    gate: Arc<SafetyGate>,
    temp_dirs: Vec<PathBuf>,
    journal_vacuum_size: String,
    update_service: String,
}

impl LiveExecutor {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        gate: Arc<SafetyGate>,
        config: &RemediationConfig,
    ) -> Self {
        Self {
            runner,
            gate,
            temp_dirs: config.temp_dirs.clone(),
            journal_vacuum_size: config.journal_vacuum_size.clone(),
            update_service: config.update_service.clone(),
        }
    }

    async fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, RunError> {
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        self.runner.run(program, &args).await
    }

    /// PIDs of processes whose name matches exactly
    async fn find_pids(&self, name: &str) -> Result<Vec<String>, String> {
        match self.run("pgrep", &["-x", name]).await {
            Ok(out) if out.success() => Ok(out
                .stdout
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty() && l.chars().all(|c| c.is_ascii_digit()))
                .map(String::from)
                .collect()),
            // pgrep exits 1 when nothing matched
            Ok(out) if out.exit_code == 1 => Ok(Vec::new()),
            Ok(out) => Err(format!("pgrep failed: {}", out.combined())),
            Err(e) => Err(e.to_string()),
        }
    }

    async fn renice(&self, niceness: &str, pids: &[String]) -> Result<CommandOutput, RunError> {
        let mut args = vec!["-n".to_string(), niceness.to_string(), "-p".to_string()];
        args.extend(pids.iter().cloned());
        self.runner.run("renice", &args).await
    }

    async fn throttle(&self, issue: &Issue) -> ExecutionResult {
        let Some(target) = issue.target.as_deref() else {
            return ExecutionResult::failed(
                "Could not identify target process from issue.",
                ActionExtra::default(),
            );
        };
        let extra = ActionExtra::process(target);

        if let Err(veto) = self.gate.check(Operation::Throttle, target, &issue.whitelist) {
            return ExecutionResult::failed(format!("Skipped ({}) - {}", target, veto), extra);
        }

        let pids = match self.find_pids(target).await {
            Ok(pids) if pids.is_empty() => {
                return ExecutionResult::failed(format!("Process ({}) not found", target), extra)
            }
            Ok(pids) => pids,
            Err(e) => return ExecutionResult::failed(e, extra),
        };

        match self.renice(THROTTLE_NICENESS, &pids).await {
            Ok(out) if out.success() => ExecutionResult::ok(
                format!(
                    "Throttled ({}) to below-normal priority (pid {})",
                    target,
                    pids.join(", ")
                ),
                ActionExtra {
                    priority: Some(PRIORITY_BELOW_NORMAL.to_string()),
                    ..extra.detail("throttled")
                },
            ),
            Ok(out) => ExecutionResult::failed(format!("renice failed: {}", out.combined()), extra),
            Err(e) => ExecutionResult::failed(e.to_string(), extra),
        }
    }

    async fn kill(&self, issue: &Issue) -> ExecutionResult {
        let Some(target) = issue.target.as_deref() else {
            return ExecutionResult::failed(
                "Could not identify target process from issue.",
                ActionExtra::default(),
            );
        };

        if let Err(veto) = self.gate.check(Operation::Kill, target, &issue.whitelist) {
            return ExecutionResult::failed(
                format!("Skipped killing ({}) - {}", target, veto),
                ActionExtra::process(target).recommend(RecommendationKind::CloseApp),
            );
        }

        let extra = ActionExtra::process(target);
        match self.run("pkill", &["-TERM", "-x", target]).await {
            Ok(out) if out.success() => {
                ExecutionResult::ok(format!("Killed: {}", target), extra.detail("killed"))
            }
            Ok(out) if out.exit_code == 1 => {
                ExecutionResult::failed(format!("Process ({}) not found", target), extra)
            }
            Ok(out) => ExecutionResult::failed(format!("pkill failed: {}", out.combined()), extra),
            Err(e) => ExecutionResult::failed(e.to_string(), extra),
        }
    }

    /// Largest resident process as (name, rss in KiB)
    async fn largest_memory_process(&self) -> Result<(String, u64), String> {
        let out = self
            .run("ps", &["-eo", "comm=,rss=", "--sort=-rss"])
            .await
            .map_err(|e| e.to_string())?;
        if !out.success() {
            return Err(format!("ps failed: {}", out.combined()));
        }
        out.stdout
            .lines()
            .find_map(|line| {
                let (name, rss) = line.trim().rsplit_once(char::is_whitespace)?;
                Some((name.trim().to_string(), rss.parse().ok()?))
            })
            .ok_or_else(|| "No processes reported by ps".to_string())
    }

    async fn memory_hog(&self) -> ExecutionResult {
        match self.largest_memory_process().await {
            Ok((name, rss_kib)) => {
                let mb = rss_kib / 1024;
                let extra = ActionExtra::process(&name).detail("identified");
                if self.gate.is_denied(TargetKind::Process, &name) {
                    ExecutionResult::ok(
                        format!("Memory high due to system process ({}) using {}MB", name, mb),
                        extra,
                    )
                } else {
                    ExecutionResult::ok(
                        format!(
                            "Memory hog: ({}) using {}MB - Recommend closing manually",
                            name, mb
                        ),
                        extra.recommend(RecommendationKind::CloseApp),
                    )
                }
            }
            Err(e) => ExecutionResult::failed(e, ActionExtra::default()),
        }
    }

    async fn free_disk_space(&self) -> ExecutionResult {
        let vacuum = format!("--vacuum-size={}", self.journal_vacuum_size);
        let mut steps: Vec<(String, String, Vec<String>)> = vec![
            ("journal".to_string(), "journalctl".to_string(), vec![vacuum]),
            (
                "package_cache".to_string(),
                "paccache".to_string(),
                vec!["-rk1".to_string()],
            ),
        ];
        for dir in self.temp_dirs.iter().filter(|d| d.is_dir()) {
            let dir = dir.display().to_string();
            steps.push((
                dir.clone(),
                "find".to_string(),
                vec![
                    dir,
                    "-xdev".to_string(),
                    "-mindepth".to_string(),
                    "1".to_string(),
                    "-type".to_string(),
                    "f".to_string(),
                    "-mtime".to_string(),
                    "+1".to_string(),
                    "-delete".to_string(),
                ],
            ));
        }

        let mut all_success = true;
        let mut details = Vec::new();
        let mut cleaned = Vec::new();

        for (label, program, args) in steps {
            match self.runner.run(&program, &args).await {
                Ok(out) if out.success() => {
                    details.push(format!("{}: cleaned", label));
                    cleaned.push(label);
                }
                Ok(out) => {
                    all_success = false;
                    warn!("{} cleanup failed: {}", label, out.combined());
                    details.push(format!("{}: failed ({})", label, out.combined()));
                }
                // A missing tool is not a failure of the cleanup as a whole
                Err(RunError::Spawn(e)) => {
                    details.push(format!("{}: skipped ({})", label, e));
                }
                Err(e) => {
                    all_success = false;
                    details.push(format!("{}: {}", label, e));
                }
            }
        }

        let extra = ActionExtra {
            files_deleted: Some(cleaned.join(", ")),
            ..Default::default()
        };
        let output = format!("Disk cleanup: {}", details.join("; "));
        if all_success {
            ExecutionResult::ok(output, extra)
        } else {
            ExecutionResult::failed(output, extra)
        }
    }

    async fn restart_service(&self, service: Option<&str>, whitelist: &Whitelist) -> ExecutionResult {
        let Some(service) = service else {
            return ExecutionResult::failed(
                "Could not identify target service from issue.",
                ActionExtra::default(),
            );
        };
        let advisory = ActionExtra::service(service).recommend(RecommendationKind::RestartService);

        if let Err(veto) = self.gate.check(Operation::RestartService, service, whitelist) {
            return ExecutionResult::failed(
                format!("Skipped restarting {} - {}", service, veto),
                advisory,
            );
        }

        match self.run("systemctl", &["restart", service]).await {
            Ok(out) if out.success() => ExecutionResult::ok(
                format!("Restarted service: {}", service),
                ActionExtra::service(service).detail("restarted"),
            ),
            Ok(out) => ExecutionResult::failed(
                format!("Failed to restart {}: {}", service, out.combined()),
                advisory,
            ),
            Err(e) => ExecutionResult::failed(e.to_string(), advisory),
        }
    }

    async fn log_service_failure(&self, issue: &Issue) -> ExecutionResult {
        if let Some(service) = issue.target.as_deref() {
            return match self.run("systemctl", &["is-active", service]).await {
                Ok(out) if out.stdout.trim() == "active" => ExecutionResult::ok(
                    format!("Service {} recovered on its own", service),
                    ActionExtra::service(service),
                ),
                Ok(_) => ExecutionResult::ok(
                    format!("Service stopped: {} - Recommend manual restart", service),
                    ActionExtra::service(service).recommend(RecommendationKind::RestartService),
                ),
                Err(e) => ExecutionResult::failed(e.to_string(), ActionExtra::service(service)),
            };
        }

        let out = match self
            .run(
                "systemctl",
                &["--failed", "--type=service", "--no-legend", "--no-pager", "--plain"],
            )
            .await
        {
            Ok(out) => out,
            Err(e) => return ExecutionResult::failed(e.to_string(), ActionExtra::default()),
        };

        let failed: Vec<String> = out
            .stdout
            .lines()
            .filter_map(|line| line.split_whitespace().next())
            .map(|unit| unit.trim_end_matches(".service").to_string())
            .collect();

        if failed.is_empty() {
            return ExecutionResult::ok("No crashed automatic services found.", ActionExtra::default());
        }

        let lines: Vec<String> = failed
            .iter()
            .map(|s| format!("Service stopped: {} - Recommend manual restart", s))
            .collect();
        ExecutionResult::ok(
            lines.join("\n"),
            ActionExtra::service(&failed.join(", ")).recommend(RecommendationKind::RestartService),
        )
    }

    async fn log_updates_pending(&self, issue: &Issue) -> ExecutionResult {
        // checkupdates exits 2 when there is nothing to update
        let count = match self.run("checkupdates", &[]).await {
            Ok(out) if out.success() => out.stdout.lines().filter(|l| !l.trim().is_empty()).count(),
            Ok(out) if out.exit_code == 2 => 0,
            _ => issue.metric_value.max(0.0) as usize,
        };

        if count == 0 {
            return ExecutionResult::ok("No pending updates found.", ActionExtra::default());
        }
        ExecutionResult::ok(
            format!("{} updates pending - Recommend installing updates manually", count),
            ActionExtra::default().recommend(RecommendationKind::InstallUpdates),
        )
    }
}

#[async_trait]
impl Executor for LiveExecutor {
    fn name(&self) -> &'static str {
        "live"
    }

    fn is_dry_run(&self) -> bool {
        false
    }

    async fn execute(&self, kind: ActionKind, issue: &Issue) -> ExecutionResult {
        info!("Executing {}", kind);
        let result = match kind {
            ActionKind::ThrottleHighCpuProcess => self.throttle(issue).await,
            ActionKind::KillHighCpuProcess => self.kill(issue).await,
            ActionKind::FreeDiskSpace => self.free_disk_space().await,
            ActionKind::ClearMemoryHog | ActionKind::LogMemoryHog => self.memory_hog().await,
            ActionKind::RestartService => {
                self.restart_service(issue.target.as_deref(), &issue.whitelist).await
            }
            ActionKind::LogServiceFailure => self.log_service_failure(issue).await,
            ActionKind::HandleUpdatesPending => {
                self.restart_service(Some(self.update_service.as_str()), &issue.whitelist)
                    .await
            }
            ActionKind::LogUpdatesPending => self.log_updates_pending(issue).await,
        };

        if result.success {
            info!("{} succeeded: {}", kind, result.output);
        } else {
            warn!("{} failed: {}", kind, result.output);
        }
        result
    }

    async fn rollback(&self, kind: ActionKind, target: &RollbackTarget) -> RollbackOutcome {
        let process = match reversible_target(kind, target) {
            Ok(process) => process,
            Err(outcome) => return outcome,
        };

        let pids = match self.find_pids(process).await {
            Ok(pids) if pids.is_empty() => {
                return RollbackOutcome::failed(format!("Process ({}) not found", process))
            }
            Ok(pids) => pids,
            Err(e) => return RollbackOutcome::failed(e),
        };

        match self.renice(NORMAL_NICENESS, &pids).await {
            Ok(out) if out.success() => RollbackOutcome::restored(
                format!("Restored normal priority for ({})", process),
                PRIORITY_NORMAL,
            ),
            Ok(out) => RollbackOutcome::failed(format!("renice failed: {}", out.combined())),
            Err(e) => RollbackOutcome::failed(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ScriptedRunner;
    use vigil_common::Severity;

    fn live(runner: Arc<ScriptedRunner>) -> LiveExecutor {
        let config = RemediationConfig {
            temp_dirs: vec![],
            ..Default::default()
        };
        LiveExecutor::new(runner, Arc::new(SafetyGate::new()), &config)
    }

    fn issue(target: Option<&str>, whitelist: &[&str]) -> Issue {
        Issue {
            description: "test".to_string(),
            metric_value: 7.0,
            threshold: 5.0,
            severity: Severity::Warning,
            target: target.map(str::to_string),
            whitelist: whitelist.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn test_throttle_renices_found_pids() {
        let runner = Arc::new(
            ScriptedRunner::new().respond("pgrep", Ok(CommandOutput::ok("101\n102\n"))),
        );
        let exec = live(runner.clone());
        let result = exec
            .execute(ActionKind::ThrottleHighCpuProcess, &issue(Some("chrome"), &[]))
            .await;
        assert!(result.success, "{}", result.output);
        assert!(result.output.contains("chrome"));
        assert_eq!(result.extra.priority.as_deref(), Some("below_normal"));
        assert!(runner.calls().contains(&"renice -n 10 -p 101 102".to_string()));
    }

    #[tokio::test]
    async fn test_throttle_missing_process() {
        let runner = Arc::new(ScriptedRunner::new().respond("pgrep", Ok(CommandOutput::exit(1, ""))));
        let result = live(runner.clone())
            .execute(ActionKind::ThrottleHighCpuProcess, &issue(Some("chrome"), &[]))
            .await;
        assert!(!result.success);
        assert!(result.output.contains("not found"));
        assert!(!runner.was_called("renice"));
    }

    #[tokio::test]
    async fn test_kill_denied_process_runs_nothing() {
        let runner = Arc::new(ScriptedRunner::new());
        let result = live(runner.clone())
            .execute(ActionKind::KillHighCpuProcess, &issue(Some("sshd"), &["sshd"]))
            .await;
        assert!(!result.success);
        assert!(result.output.contains("protected"));
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_kill_whitelisted_process() {
        let runner = Arc::new(ScriptedRunner::new());
        let result = live(runner.clone())
            .execute(ActionKind::KillHighCpuProcess, &issue(Some("chrome"), &["chrome"]))
            .await;
        assert!(result.success);
        assert_eq!(result.output, "Killed: chrome");
        assert_eq!(runner.calls(), vec!["pkill -TERM -x chrome".to_string()]);
    }

    #[tokio::test]
    async fn test_timeout_becomes_failed_result() {
        let runner = Arc::new(ScriptedRunner::new().respond("systemctl", Err(RunError::Timeout(30))));
        let result = live(runner)
            .execute(ActionKind::RestartService, &issue(Some("bluetooth"), &[]))
            .await;
        assert!(!result.success);
        assert!(result.output.contains("timed out after 30s"));
        assert_eq!(result.extra.recommendation, Some(RecommendationKind::RestartService));
    }

    #[tokio::test]
    async fn test_memory_hog_recommends_closing() {
        let runner = Arc::new(ScriptedRunner::new().respond(
            "ps",
            Ok(CommandOutput::ok("Web Content 2097152\nsystemd 10240\n")),
        ));
        let result = live(runner).execute(ActionKind::LogMemoryHog, &issue(None, &[])).await;
        assert!(result.success);
        assert_eq!(result.extra.target_process.as_deref(), Some("Web Content"));
        assert_eq!(result.extra.recommendation, Some(RecommendationKind::CloseApp));
        assert!(result.output.contains("2048MB"));
    }

    #[tokio::test]
    async fn test_disk_cleanup_tolerates_missing_tool() {
        let runner = Arc::new(ScriptedRunner::new().respond(
            "paccache",
            Err(RunError::Spawn("paccache: not found".to_string())),
        ));
        let result = live(runner).execute(ActionKind::FreeDiskSpace, &issue(None, &[])).await;
        assert!(result.success, "{}", result.output);
        assert_eq!(result.extra.files_deleted.as_deref(), Some("journal"));
    }

    #[tokio::test]
    async fn test_log_service_failure_lists_failed_units() {
        let runner = Arc::new(ScriptedRunner::new().respond(
            "systemctl",
            Ok(CommandOutput::ok("cups.service loaded failed failed CUPS\n")),
        ));
        let result = live(runner).execute(ActionKind::LogServiceFailure, &issue(None, &[])).await;
        assert!(result.success);
        assert_eq!(result.extra.target_service.as_deref(), Some("cups"));
        assert_eq!(result.extra.recommendation, Some(RecommendationKind::RestartService));
    }

    #[tokio::test]
    async fn test_updates_pending_counts_checkupdates() {
        let runner = Arc::new(ScriptedRunner::new().respond(
            "checkupdates",
            Ok(CommandOutput::ok("linux 6.1 -> 6.2\nmesa 23 -> 24\n")),
        ));
        let result = live(runner).execute(ActionKind::LogUpdatesPending, &issue(None, &[])).await;
        assert!(result.output.starts_with("2 updates pending"));
        assert_eq!(result.extra.recommendation, Some(RecommendationKind::InstallUpdates));
    }

    #[tokio::test]
    async fn test_rollback_restores_normal_priority() {
        let runner = Arc::new(ScriptedRunner::new().respond("pgrep", Ok(CommandOutput::ok("77\n"))));
        let exec = live(runner.clone());
        let target = RollbackTarget {
            target_process: Some("chrome".to_string()),
            target_service: None,
        };
        let undo = exec.rollback(ActionKind::ThrottleHighCpuProcess, &target).await;
        assert!(undo.success);
        assert_eq!(undo.restored.as_deref(), Some("normal"));
        assert!(runner.calls().contains(&"renice -n 0 -p 77".to_string()));

        let undo = exec.rollback(ActionKind::KillHighCpuProcess, &target).await;
        assert!(!undo.success);
    }
}
