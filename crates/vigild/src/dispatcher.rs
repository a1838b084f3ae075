//! Action dispatcher - maps events to actions, executes, records.
//!
//! Events are handled one at a time in analyzer order. A storage failure
//! for one event is logged and the next event still runs. An event that was
//! never stored gets no action.

use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use vigil_common::{
    Action, ActionKind, AuditEntry, Event, ExecutionResult, Recommendation, SettingsSnapshot,
    VigilResult,
};

use crate::action_map::ActionMap;
use crate::executor::{Executor, Issue};
use crate::store::AuditSink;

/// What one cycle did, for logging and tests
#[derive(Debug, Clone, Default, Serialize)]
pub struct CycleReport {
    pub events: Vec<Event>,
    pub actions: Vec<Action>,
    pub recommendations: Vec<Recommendation>,
    /// Events with no mapped action, or never logged
    pub skipped: usize,
    pub permitted: bool,
    pub dry_run: bool,
}

impl CycleReport {
    /// Events recorded, nothing dispatched
    pub fn observed(events: Vec<Event>, dry_run: bool) -> Self {
        Self {
            events,
            dry_run,
            ..Default::default()
        }
    }
}

pub struct Dispatcher {
    executor: Arc<dyn Executor>,
    action_map: ActionMap,
}

impl Dispatcher {
    pub fn new(executor: Arc<dyn Executor>, action_map: ActionMap) -> Self {
        Self {
            executor,
            action_map,
        }
    }

    pub fn executor(&self) -> &Arc<dyn Executor> {
        &self.executor
    }

    pub async fn dispatch(
        &self,
        events: Vec<Event>,
        settings: &SettingsSnapshot,
        sink: &(impl AuditSink + ?Sized),
    ) -> CycleReport {
        let mut report = CycleReport {
            permitted: true,
            dry_run: self.executor.is_dry_run(),
            ..Default::default()
        };

        let mut unlogged = 0;
        for event in &events {
            let Some(event_id) = event.id else {
                unlogged += 1;
                report.skipped += 1;
                continue;
            };
            let Some(kind) = self.action_map.get(event.event_type) else {
                debug!("No action mapped for {}", event.event_type);
                report.skipped += 1;
                continue;
            };

            let issue = Issue::from_event(event, &settings.whitelist);
            let started = Instant::now();
            let result = self.executor.execute(kind, &issue).await;
            let duration_ms = started.elapsed().as_millis() as u64;

            let mut action = Action::from_result(kind, &result, duration_ms, Some(event_id));
            match self.record(event, kind, &mut action, &result, sink) {
                Ok(Some(recommendation)) => report.recommendations.push(recommendation),
                Ok(None) => {}
                Err(e) => error!("Failed to record {} for {}: {}", kind, event.event_type, e),
            }
            report.actions.push(action);
        }
        if unlogged > 0 {
            error!("{} event(s) were not stored, no action taken for them", unlogged);
        }

        info!(
            "Dispatched {} action(s), {} recommendation(s), {} skipped ({})",
            report.actions.len(),
            report.recommendations.len(),
            report.skipped,
            self.executor.name()
        );
        report.events = events;
        report
    }

    /// Action, then audit, then the optional recommendation
    fn record(
        &self,
        event: &Event,
        kind: ActionKind,
        action: &mut Action,
        result: &ExecutionResult,
        sink: &(impl AuditSink + ?Sized),
    ) -> VigilResult<Option<Recommendation>> {
        let action_id = sink.log_action(action, &result.extra)?;
        action.id = Some(action_id);
        sink.log_audit(&AuditEntry::for_action(
            action,
            action_id,
            event.event_type.as_str(),
        ))?;

        let Some(recommendation_kind) = result.extra.recommendation else {
            return Ok(None);
        };
        let mut recommendation = Recommendation::pending(
            event.id,
            event.event_type,
            event.severity,
            recommendation_kind,
            &result.extra,
        );
        match sink.create_recommendation(&recommendation) {
            Ok(id) => {
                recommendation.id = Some(id);
                Ok(Some(recommendation))
            }
            Err(e) => {
                warn!("Failed to store recommendation for {}: {}", kind, e);
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::DryRunExecutor;
    use crate::store::SqliteStore;
    use chrono::Utc;
    use vigil_common::{
        ActionExtra, ActionStatus, EventType, Priority, SafetyGate, Severity, VigilError,
        Whitelist,
    };

    fn dispatcher(map: ActionMap) -> Dispatcher {
        let gate = Arc::new(SafetyGate::new());
        Dispatcher::new(Arc::new(DryRunExecutor::new(gate, "packagekit")), map)
    }

    fn event(event_type: EventType, severity: Severity, target: Option<&str>) -> Event {
        let mut event = Event::new(Utc::now(), event_type, severity, "test".to_string(), 1.0, 0.0);
        event.target = target.map(str::to_string);
        event.assign_id(1);
        event
    }

    /// Sink whose every write fails
    struct BrokenSink;

    impl AuditSink for BrokenSink {
        fn log_event(&self, _: &Event) -> VigilResult<i64> {
            Err(VigilError::Store("disk full".to_string()))
        }
        fn log_action(&self, _: &Action, _: &ActionExtra) -> VigilResult<i64> {
            Err(VigilError::Store("disk full".to_string()))
        }
        fn log_audit(&self, _: &AuditEntry) -> VigilResult<()> {
            Err(VigilError::Store("disk full".to_string()))
        }
        fn create_recommendation(&self, _: &Recommendation) -> VigilResult<i64> {
            Err(VigilError::Store("disk full".to_string()))
        }
        fn get_whitelist(&self) -> VigilResult<Whitelist> {
            Ok(Whitelist::new())
        }
    }

    #[tokio::test]
    async fn test_unmapped_event_is_skipped() {
        let store = SqliteStore::open_in_memory().unwrap();
        let map = ActionMap::from_entries([(EventType::DiskLow, ActionKind::FreeDiskSpace)]);
        let events = vec![event(EventType::MemoryHigh, Severity::Warning, None)];
        let report = dispatcher(map)
            .dispatch(events, &SettingsSnapshot::default(), &store)
            .await;
        assert!(report.actions.is_empty());
        assert_eq!(report.skipped, 1);
        assert!(store.recent_actions(10).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_actions_audited_in_order() {
        let store = SqliteStore::open_in_memory().unwrap();
        let events = vec![
            event(EventType::CpuHigh, Severity::Critical, Some("chrome")),
            event(EventType::DiskLow, Severity::Critical, None),
        ];
        let report = dispatcher(ActionMap::default())
            .dispatch(events, &SettingsSnapshot::default(), &store)
            .await;
        assert_eq!(report.actions.len(), 2);
        assert_eq!(report.actions[0].kind(), Some(ActionKind::ThrottleHighCpuProcess));
        assert_eq!(report.actions[1].kind(), Some(ActionKind::FreeDiskSpace));
        assert!(report.dry_run);

        let audit = store.audit_for_action(report.actions[0].id.unwrap()).unwrap();
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].affected_resources, "cpu_high");
        assert_eq!(audit[0].status, ActionStatus::Success);
    }

    #[tokio::test]
    async fn test_recommendation_priority_follows_severity() {
        let store = SqliteStore::open_in_memory().unwrap();
        let events = vec![event(EventType::ServiceCrashed, Severity::Critical, Some("cups"))];
        let report = dispatcher(ActionMap::default())
            .dispatch(events, &SettingsSnapshot::default(), &store)
            .await;
        assert_eq!(report.recommendations.len(), 1);
        let rec = &report.recommendations[0];
        assert_eq!(rec.priority, Priority::High);
        assert_eq!(rec.recommendation_text, "Restart service: cups");
        assert_eq!(rec.category, EventType::ServiceCrashed);
        assert_eq!(store.recommendations(10, true).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_sink_failures_do_not_stop_dispatch() {
        let events = vec![
            event(EventType::CpuHigh, Severity::Warning, Some("chrome")),
            event(EventType::UpdatesPending, Severity::Warning, None),
        ];
        let report = dispatcher(ActionMap::default())
            .dispatch(events, &SettingsSnapshot::default(), &BrokenSink)
            .await;
        assert_eq!(report.actions.len(), 2);
        assert!(report.actions.iter().all(|a| a.id.is_none()));
        assert!(report.recommendations.is_empty());
    }

    #[tokio::test]
    async fn test_unstored_event_gets_no_action() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut unstored = event(EventType::CpuHigh, Severity::Critical, Some("chrome"));
        unstored.id = None;
        let events = vec![unstored, event(EventType::DiskLow, Severity::Critical, None)];

        let report = dispatcher(ActionMap::default())
            .dispatch(events, &SettingsSnapshot::default(), &store)
            .await;
        assert_eq!(report.skipped, 1);
        assert_eq!(report.actions.len(), 1);
        assert_eq!(report.actions[0].kind(), Some(ActionKind::FreeDiskSpace));
        assert_eq!(report.actions[0].event_id, Some(1));
        assert_eq!(report.events.len(), 2);
    }
}
