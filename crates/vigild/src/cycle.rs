//! Check cycle orchestration.
//!
//! One cycle: snapshot settings, collect metrics, analyze, log events,
//! decide, dispatch. At most one cycle runs at a time; a tick that finds a
//! cycle in flight is skipped. Outside prod nothing is dispatched unless the
//! executor is a dry-run one, whatever executor was injected.

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn};
use vigil_common::{
    ActionStatus, AuditEntry, RollbackOutcome, RollbackTarget, SettingsSnapshot,
    ROLLBACK_RESOURCE,
};

use crate::action_map::ActionMap;
use crate::analyzer::analyze;
use crate::config::Config;
use crate::dispatcher::{CycleReport, Dispatcher};
use crate::executor::Executor;
use crate::monitor::MetricsProvider;
use crate::policy::PolicyDecision;
use crate::store::{AuditSink, SettingsProvider, Store};

#[derive(Debug)]
pub enum CycleOutcome {
    /// Another cycle was still running
    Skipped,
    /// Metrics collection came back empty
    NoMetrics,
    /// Orchestration error, already logged
    Failed(String),
    Completed(CycleReport),
}

impl CycleOutcome {
    pub fn report(&self) -> Option<&CycleReport> {
        match self {
            CycleOutcome::Completed(report) => Some(report),
            _ => None,
        }
    }
}

/// Everything a cycle needs, built once at start
pub struct Engine {
    config: Config,
    monitor: Arc<dyn MetricsProvider>,
    store: Arc<dyn Store>,
    dispatcher: Dispatcher,
    guard: Mutex<()>,
}

impl Engine {
    pub fn new(
        config: Config,
        monitor: Arc<dyn MetricsProvider>,
        store: Arc<dyn Store>,
        executor: Arc<dyn Executor>,
    ) -> Self {
        let action_map = ActionMap::for_profile(config.remediation.action_profile);
        Self::with_action_map(config, monitor, store, executor, action_map)
    }

    pub fn with_action_map(
        config: Config,
        monitor: Arc<dyn MetricsProvider>,
        store: Arc<dyn Store>,
        executor: Arc<dyn Executor>,
        action_map: ActionMap,
    ) -> Self {
        Self {
            config,
            monitor,
            store,
            dispatcher: Dispatcher::new(executor, action_map),
            guard: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn settings_snapshot(&self) -> Result<SettingsSnapshot> {
        let settings = self.store.get_settings().context("Failed to read settings")?;
        let whitelist = self.store.get_whitelist().context("Failed to read whitelist")?;
        Ok(SettingsSnapshot::from_map(&settings, whitelist))
    }

    pub async fn run_cycle(&self) -> CycleOutcome {
        let Ok(_running) = self.guard.try_lock() else {
            warn!("Previous check cycle still running, skipping this one");
            return CycleOutcome::Skipped;
        };

        match self.cycle().await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Check cycle failed: {:#}", e);
                CycleOutcome::Failed(format!("{:#}", e))
            }
        }
    }

    async fn cycle(&self) -> Result<CycleOutcome> {
        let settings = self.settings_snapshot()?;

        let metrics = self.monitor.collect().await;
        if metrics.is_empty() {
            warn!("No metrics collected, skipping analysis");
            return Ok(CycleOutcome::NoMetrics);
        }

        let mut events = analyze(&metrics, &settings);
        for event in &mut events {
            match self.store.log_event(event) {
                Ok(id) => event.assign_id(id),
                Err(e) => error!("Failed to log {} event: {}", event.event_type, e),
            }
        }

        let decision = PolicyDecision::decide(
            self.config.daemon.environment,
            self.config.remediation.auto_remediate_enabled,
            settings.auto_remediate,
        );
        let dry_run = self.dispatcher.executor().is_dry_run();

        if events.is_empty() {
            info!("All metrics within thresholds");
        }

        if !decision.permitted {
            info!(
                "{} event(s) logged; remediation not permitted ({})",
                events.len(),
                self.config.daemon.environment.as_str()
            );
            return Ok(CycleOutcome::Completed(CycleReport::observed(events, dry_run)));
        }

        if decision.dry_run_only && !dry_run {
            error!(
                "{} environment allows dry-run only, refusing to dispatch through the {} executor",
                self.config.daemon.environment.as_str(),
                self.dispatcher.executor().name()
            );
            return Ok(CycleOutcome::Completed(CycleReport::observed(events, dry_run)));
        }

        let report = self
            .dispatcher
            .dispatch(events, &settings, self.store.as_ref())
            .await;
        Ok(CycleOutcome::Completed(report))
    }

    /// Undo a stored action and audit the attempt
    pub async fn rollback_action(&self, action_id: i64) -> Result<RollbackOutcome> {
        let _running = self.guard.lock().await;

        let (action, extra) = self
            .store
            .get_action(action_id)?
            .ok_or_else(|| anyhow!("Action {} not found", action_id))?;

        let outcome = match action.kind() {
            Some(kind) => {
                self.dispatcher
                    .executor()
                    .rollback(kind, &RollbackTarget::from(&extra))
                    .await
            }
            None => RollbackOutcome::failed(format!(
                "Unknown action type {}, nothing to roll back",
                action.action_type
            )),
        };

        self.store
            .log_audit(&AuditEntry {
                timestamp: Utc::now(),
                action_id,
                affected_resources: ROLLBACK_RESOURCE.to_string(),
                status: ActionStatus::from_success(outcome.success),
            })
            .context("Failed to audit rollback")?;

        if outcome.success {
            info!("Rolled back action {}: {}", action_id, outcome.output);
        } else {
            warn!("Rollback of action {} failed: {}", action_id, outcome.output);
        }
        Ok(outcome)
    }
}

/// Run cycles every `period` until `shutdown` resolves. A running cycle is
/// always allowed to finish.
pub async fn run_scheduler(engine: Arc<Engine>, period: Duration, shutdown: impl Future<Output = ()>) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tokio::pin!(shutdown);

    info!("Scheduler started, interval {}s", period.as_secs());
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Shutdown requested, stopping scheduler");
                break;
            }
            _ = ticker.tick() => {
                match engine.run_cycle().await {
                    CycleOutcome::Completed(report) => info!(
                        "Cycle complete: {} event(s), {} action(s)",
                        report.events.len(),
                        report.actions.len()
                    ),
                    CycleOutcome::NoMetrics => warn!("Cycle ended without metrics"),
                    CycleOutcome::Skipped | CycleOutcome::Failed(_) => {}
                }
            }
        }
    }
}
