//! Remediation policy gate and executor selection.
//!
//! Non-prod environments can only ever get the dry-run executor.

use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use vigil_common::SafetyGate;

use crate::config::{Config, Environment, ExecutorKind};
use crate::executor::{CommandRunner, DryRunExecutor, Executor, LiveExecutor, TokioCommandRunner};

/// Policy outcome for one cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct PolicyDecision {
    /// Dispatch happens at all
    pub permitted: bool,
    /// Only simulated actions are possible
    pub dry_run_only: bool,
}

impl PolicyDecision {
    pub fn decide(environment: Environment, global_auto: bool, settings_auto: bool) -> Self {
        Self {
            permitted: should_remediate(environment, global_auto, settings_auto),
            dry_run_only: !environment.is_prod(),
        }
    }
}

/// Prod needs both the config switch and the stored setting; elsewhere the
/// stored setting alone decides, since nothing real can run there.
pub fn should_remediate(environment: Environment, global_auto: bool, settings_auto: bool) -> bool {
    match environment {
        Environment::Prod => global_auto && settings_auto,
        Environment::Dev => settings_auto,
    }
}

/// Build the shared safety gate from config
pub fn safety_gate(config: &Config) -> Arc<SafetyGate> {
    Arc::new(SafetyGate::with_config(
        config.remediation.whitelist.iter().cloned(),
        config.remediation.deny_extra.iter().cloned(),
    ))
}

/// Pick the executor once at start
pub fn select_executor(
    config: &Config,
    gate: Arc<SafetyGate>,
    runner: Option<Arc<dyn CommandRunner>>,
) -> Arc<dyn Executor> {
    let environment = config.daemon.environment;
    let update_service = &config.remediation.update_service;

    if !environment.is_prod() {
        if config.remediation.executor == ExecutorKind::Live {
            warn!(
                "Live executor requested in {} environment; using dry-run",
                environment.as_str()
            );
        }
        return Arc::new(DryRunExecutor::new(gate, update_service));
    }

    match config.remediation.executor {
        ExecutorKind::DryRun => {
            info!("Executor: dry-run (prod)");
            Arc::new(DryRunExecutor::new(gate, update_service))
        }
        ExecutorKind::Live => {
            let runner = runner.unwrap_or_else(|| {
                Arc::new(TokioCommandRunner::new(Duration::from_secs(
                    config.effective_command_timeout(),
                )))
            });
            info!("Executor: live (prod)");
            Arc::new(LiveExecutor::new(runner, gate, &config.remediation))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dev_ignores_global_switch() {
        for global in [true, false] {
            assert!(should_remediate(Environment::Dev, global, true));
            assert!(!should_remediate(Environment::Dev, global, false));
        }
    }

    #[test]
    fn test_prod_needs_both_switches() {
        assert!(should_remediate(Environment::Prod, true, true));
        assert!(!should_remediate(Environment::Prod, true, false));
        assert!(!should_remediate(Environment::Prod, false, true));
        assert!(!should_remediate(Environment::Prod, false, false));
    }

    #[test]
    fn test_decision_marks_dry_run_only() {
        let dev = PolicyDecision::decide(Environment::Dev, false, true);
        assert!(dev.permitted && dev.dry_run_only);
        let prod = PolicyDecision::decide(Environment::Prod, true, true);
        assert!(prod.permitted && !prod.dry_run_only);
    }

    #[test]
    fn test_non_prod_always_gets_dry_run() {
        let mut config = Config::default();
        config.remediation.executor = ExecutorKind::Live;
        config.daemon.environment = Environment::from("staging");
        let executor = select_executor(&config, safety_gate(&config), None);
        assert!(executor.is_dry_run());
        assert_eq!(executor.name(), "dry-run");
    }

    #[test]
    fn test_prod_live_is_selectable() {
        let mut config = Config::default();
        config.daemon.environment = Environment::Prod;
        assert!(select_executor(&config, safety_gate(&config), None).is_dry_run());

        config.remediation.executor = ExecutorKind::Live;
        let executor = select_executor(&config, safety_gate(&config), None);
        assert!(!executor.is_dry_run());
        assert_eq!(executor.name(), "live");
    }
}
