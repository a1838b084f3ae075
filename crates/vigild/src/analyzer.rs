//! Analyzer - turns one metric snapshot into typed health events
//!
//! Pure: no I/O and no state. Checks run in a fixed order (cpu, memory,
//! disk, services, updates) and the dispatcher handles events in that order.

use chrono::Utc;
use tracing::debug;
use vigil_common::{Event, EventType, MetricSnapshot, Severity, SettingsSnapshot};

/// CPU usage at or above this is critical regardless of the threshold
pub const CPU_CRITICAL_PERCENT: f64 = 95.0;

pub fn analyze(metrics: &MetricSnapshot, settings: &SettingsSnapshot) -> Vec<Event> {
    let timestamp = Utc::now();
    let mut events = Vec::new();

    // 1. CPU
    if metrics.cpu_percent > settings.cpu_threshold {
        let top = metrics.top_process().map(|p| p.name.as_str());
        let severity = if metrics.cpu_percent >= CPU_CRITICAL_PERCENT {
            Severity::Critical
        } else {
            Severity::Warning
        };
        let mut event = Event::new(
            timestamp,
            EventType::CpuHigh,
            severity,
            format!(
                "CPU usage is at {:.1}% (Top: {})",
                metrics.cpu_percent,
                top.unwrap_or("unknown")
            ),
            metrics.cpu_percent,
            settings.cpu_threshold,
        );
        if let Some(name) = top {
            event = event.with_target(name);
        }
        events.push(event);
    }

    // 2. Memory
    if metrics.memory_percent > settings.memory_threshold {
        events.push(Event::new(
            timestamp,
            EventType::MemoryHigh,
            Severity::Warning,
            format!("Memory usage is at {:.1}%", metrics.memory_percent),
            metrics.memory_percent,
            settings.memory_threshold,
        ));
    }

    // 3. Disk
    if metrics.disk_percent > settings.disk_threshold {
        events.push(Event::new(
            timestamp,
            EventType::DiskLow,
            Severity::Critical,
            format!("Disk usage is at {:.1}%", metrics.disk_percent),
            metrics.disk_percent,
            settings.disk_threshold,
        ));
    }

    // 4. Services: binary signal, value 0 against threshold 1
    for service in metrics.services.iter().filter(|s| s.is_crashed()) {
        events.push(
            Event::new(
                timestamp,
                EventType::ServiceCrashed,
                Severity::Critical,
                format!(
                    "Service {} is {} but set to {} start.",
                    service.name, service.status, service.start_type
                ),
                0.0,
                1.0,
            )
            .with_target(&service.name),
        );
    }

    // 5. Updates
    if metrics.updates_pending > settings.updates_pending_threshold {
        events.push(Event::new(
            timestamp,
            EventType::UpdatesPending,
            Severity::Warning,
            format!("{} updates are pending.", metrics.updates_pending),
            f64::from(metrics.updates_pending),
            f64::from(settings.updates_pending_threshold),
        ));
    }

    debug!("Analyzer produced {} event(s)", events.len());
    events
}
