//! End-to-end remediation tests
//!
//! Full cycles through Engine with a fixed metrics provider, a real SQLite
//! store on disk, and a scripted command runner. Nothing touches the host.

use std::sync::Arc;
use tempfile::TempDir;
use vigil_common::{
    ActionKind, ActionStatus, EventType, MetricSnapshot, ProcessSample, SafetyGate, Severity,
    KEY_AUTO_REMEDIATE,
};
use vigild::executor::{CommandOutput, CommandRunner, DryRunExecutor, ScriptedRunner};
use vigild::monitor::StaticMonitor;
use vigild::policy::safety_gate;
use vigild::{
    select_executor, ActionMap, ActionProfile, Config, CycleReport, Engine,
    Environment, ExecutorKind, SettingsProvider, SqliteStore,
};

// ============================================================================
// Fixtures
// ============================================================================

fn chrome_at_97() -> MetricSnapshot {
    MetricSnapshot {
        cpu_percent: 97.0,
        memory_percent: 30.0,
        disk_percent: 30.0,
        top_processes: vec![ProcessSample {
            name: "chrome".to_string(),
            pid: 4242,
            cpu: 91.0,
        }],
        services: vec![],
        updates_pending: 0,
    }
}

fn prod_live_config(profile: ActionProfile) -> Config {
    let mut config = Config::default();
    config.daemon.environment = Environment::Prod;
    config.remediation.auto_remediate_enabled = true;
    config.remediation.executor = ExecutorKind::Live;
    config.remediation.action_profile = profile;
    config.remediation.temp_dirs = vec![];
    config
}

fn pgrep_finds_chrome() -> ScriptedRunner {
    ScriptedRunner::new().respond("pgrep", Ok(CommandOutput::ok("4242\n")))
}

struct Harness {
    _dir: TempDir,
    store: Arc<SqliteStore>,
    runner: Arc<ScriptedRunner>,
    engine: Engine,
}

fn harness(config: Config, snapshot: MetricSnapshot, runner: ScriptedRunner) -> Harness {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(SqliteStore::open(dir.path().join("vigil.db")).unwrap());
    let runner = Arc::new(runner);
    let dyn_runner: Arc<dyn CommandRunner> = runner.clone();
    let executor = select_executor(&config, safety_gate(&config), Some(dyn_runner));
    let engine = Engine::new(
        config,
        Arc::new(StaticMonitor::new(snapshot)),
        store.clone(),
        executor,
    );
    Harness {
        _dir: dir,
        store,
        runner,
        engine,
    }
}

async fn completed(engine: &Engine) -> CycleReport {
    engine
        .run_cycle()
        .await
        .report()
        .cloned()
        .expect("cycle should complete")
}

// ============================================================================
// End-to-end scenario
// ============================================================================

/// Whitelisted chrome at 97% cpu: one critical event, one direct action, no advice
#[tokio::test]
async fn test_whitelisted_chrome_is_remediated_directly() {
    for profile in [ActionProfile::Advisory, ActionProfile::Active] {
        let h = harness(prod_live_config(profile), chrome_at_97(), pgrep_finds_chrome());
        h.store.update_setting(KEY_AUTO_REMEDIATE, "true").unwrap();
        h.store.add_to_whitelist("chrome").unwrap();

        let report = completed(&h.engine).await;

        assert_eq!(report.events.len(), 1, "{:?}", profile);
        assert_eq!(report.events[0].event_type, EventType::CpuHigh);
        assert_eq!(report.events[0].severity, Severity::Critical);

        assert_eq!(report.actions.len(), 1);
        let action = &report.actions[0];
        assert!(matches!(
            action.kind(),
            Some(ActionKind::ThrottleHighCpuProcess) | Some(ActionKind::KillHighCpuProcess)
        ));
        assert_eq!(action.status, ActionStatus::Success, "{}", action.output);
        assert!(action.output.contains("chrome"));

        assert!(report.recommendations.is_empty());
        assert!(h.store.recommendations(10, false).unwrap().is_empty());
        assert!(!report.dry_run);
    }
}

/// Kill outside the whitelist is refused before any command runs
#[tokio::test]
async fn test_unwhitelisted_kill_becomes_recommendation() {
    let h = harness(
        prod_live_config(ActionProfile::Active),
        chrome_at_97(),
        ScriptedRunner::new(),
    );
    h.store.update_setting(KEY_AUTO_REMEDIATE, "true").unwrap();

    let report = completed(&h.engine).await;
    assert_eq!(report.actions.len(), 1);
    assert_eq!(report.actions[0].status, ActionStatus::Failed);
    assert!(h.runner.calls().is_empty());

    let recs = h.store.recommendations(10, true).unwrap();
    assert_eq!(recs.len(), 1);
    assert_eq!(recs[0].recommendation_text, "Close chrome to free memory");
}

// ============================================================================
// Policy gate
// ============================================================================

/// dev + global off + settings on: permitted, and only the dry-run executor runs
#[tokio::test]
async fn test_dev_is_permitted_but_dry_run_only() {
    let mut config = prod_live_config(ActionProfile::Active);
    config.daemon.environment = Environment::Dev;
    config.remediation.auto_remediate_enabled = false;

    let h = harness(config, chrome_at_97(), ScriptedRunner::new());
    h.store.update_setting(KEY_AUTO_REMEDIATE, "1").unwrap();
    h.store.add_to_whitelist("chrome").unwrap();

    let report = completed(&h.engine).await;
    assert!(report.permitted);
    assert!(report.dry_run);
    assert_eq!(report.actions.len(), 1);
    assert!(report.actions[0].output.starts_with("Would"));
    assert!(h.runner.calls().is_empty(), "live commands ran in dev");
}

/// prod + global on + settings off: events logged, nothing dispatched
#[tokio::test]
async fn test_prod_without_setting_only_logs_events() {
    let h = harness(
        prod_live_config(ActionProfile::Advisory),
        chrome_at_97(),
        ScriptedRunner::new(),
    );
    let report = completed(&h.engine).await;
    assert!(!report.permitted);
    assert!(report.actions.is_empty());
    assert_eq!(h.store.recent_events(10).unwrap().len(), 1);
    assert!(h.store.recent_actions(10).unwrap().is_empty());
    assert!(h.runner.calls().is_empty());
}

// ============================================================================
// Dispatch and rollback
// ============================================================================

/// Restrictive profile has no memory mapping: no action, no error
#[tokio::test]
async fn test_unmapped_event_type_produces_no_action() {
    let mut snapshot = chrome_at_97();
    snapshot.cpu_percent = 10.0;
    snapshot.memory_percent = 99.0;

    let h = harness(
        prod_live_config(ActionProfile::Restrictive),
        snapshot,
        ScriptedRunner::new(),
    );
    h.store.update_setting(KEY_AUTO_REMEDIATE, "true").unwrap();

    let report = completed(&h.engine).await;
    assert_eq!(report.events.len(), 1);
    assert_eq!(report.events[0].event_type, EventType::MemoryHigh);
    assert!(report.actions.is_empty());
    assert_eq!(report.skipped, 1);
}

/// Throttle from a cycle can be undone by its stored id
#[tokio::test]
async fn test_rollback_by_stored_action_id() {
    let h = harness(
        prod_live_config(ActionProfile::Advisory),
        chrome_at_97(),
        pgrep_finds_chrome(),
    );
    h.store.update_setting(KEY_AUTO_REMEDIATE, "true").unwrap();

    let report = completed(&h.engine).await;
    let action_id = report.actions[0].id.unwrap();

    let undo = h.engine.rollback_action(action_id).await.unwrap();
    assert!(undo.success, "{}", undo.output);
    assert_eq!(undo.restored.as_deref(), Some("normal"));
    assert!(h.runner.calls().contains(&"renice -n 0 -p 4242".to_string()));
}

#[tokio::test]
async fn test_kill_rollback_always_fails() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(SqliteStore::open(dir.path().join("vigil.db")).unwrap());
    store.add_to_whitelist("chrome").unwrap();
    store.update_setting(KEY_AUTO_REMEDIATE, "true").unwrap();

    let executor = Arc::new(DryRunExecutor::new(Arc::new(SafetyGate::new()), "packagekit"));
    let engine = Engine::with_action_map(
        Config::default(),
        Arc::new(StaticMonitor::new(chrome_at_97())),
        store.clone(),
        executor,
        ActionMap::for_profile(ActionProfile::Active),
    );

    let report = completed(&engine).await;
    let action_id = report.actions[0].id.unwrap();
    assert_eq!(report.actions[0].kind(), Some(ActionKind::KillHighCpuProcess));

    let undo = engine.rollback_action(action_id).await.unwrap();
    assert!(!undo.success);
    assert!(undo.output.contains("irreversible"));
}
