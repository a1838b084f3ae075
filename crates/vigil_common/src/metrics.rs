//! Metric snapshot produced once per check cycle by the monitor.

use serde::{Deserialize, Serialize};

/// Start types that mean "the service manager starts this unit by itself".
const AUTO_START_TYPES: &[&str] = &["auto", "automatic", "enabled", "enabled-runtime"];
/// Service states that are on their way somewhere else
const TRANSITIONAL_STATES: &[&str] = &["starting", "stopping", "startpending", "stoppending"];

/// One sampled process, already ranked by CPU usage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessSample {
    pub name: String,
    pub pid: u32,
    pub cpu: f32,
}

/// One sampled service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSample {
    pub name: String,
    /// Free-form state as reported by the service manager (running, stopped, failed...)
    pub status: String,
    /// Free-form start mode (Auto, Manual, enabled, disabled...)
    pub start_type: String,
}

impl ServiceSample {
    pub fn new(name: &str, status: &str, start_type: &str) -> Self {
        Self {
            name: name.to_string(),
            status: status.to_string(),
            start_type: start_type.to_string(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.status.trim().eq_ignore_ascii_case("running")
    }

    pub fn is_auto_start(&self) -> bool {
        let start = self.start_type.trim().to_ascii_lowercase();
        AUTO_START_TYPES.contains(&start.as_str())
    }

    /// Mid start or stop; settles by the next cycle
    pub fn is_transitional(&self) -> bool {
        let status = self.status.trim().to_ascii_lowercase();
        TRANSITIONAL_STATES.contains(&status.as_str())
    }

    /// Stopped while configured to start automatically
    pub fn is_crashed(&self) -> bool {
        !self.is_running() && !self.is_transitional() && self.is_auto_start()
    }
}

/// Flat host health sample. Immutable once handed to the analyzer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricSnapshot {
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub disk_percent: f64,
    /// Descending by cpu, at most three entries
    #[serde(default)]
    pub top_processes: Vec<ProcessSample>,
    #[serde(default)]
    pub services: Vec<ServiceSample>,
    #[serde(default)]
    pub updates_pending: u32,
}

impl MetricSnapshot {
    /// Maximum number of processes kept in `top_processes`
    pub const TOP_PROCESS_LIMIT: usize = 3;

    /// Zeroed snapshot returned when collection fails
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Highest-CPU process, if any was sampled
    pub fn top_process(&self) -> Option<&ProcessSample> {
        self.top_processes.first()
    }

    /// Sort processes by CPU descending and keep the top three
    pub fn rank_processes(mut processes: Vec<ProcessSample>) -> Vec<ProcessSample> {
        processes.sort_by(|a, b| b.cpu.total_cmp(&a.cpu));
        processes.truncate(Self::TOP_PROCESS_LIMIT);
        processes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crashed_requires_auto_start() {
        assert!(ServiceSample::new("bits", "stopped", "Auto").is_crashed());
        assert!(ServiceSample::new("cups", "failed", "enabled").is_crashed());
        assert!(!ServiceSample::new("cups", "stopped", "Manual").is_crashed());
        assert!(!ServiceSample::new("bits", "Running", "Auto").is_crashed());
    }

    #[test]
    fn test_transitional_state_is_not_a_crash() {
        assert!(!ServiceSample::new("cups", "stopping", "enabled").is_crashed());
        assert!(!ServiceSample::new("bits", "StartPending", "Auto").is_crashed());
    }

    #[test]
    fn test_empty_snapshot() {
        assert!(MetricSnapshot::empty().is_empty());
        let snapshot = MetricSnapshot {
            cpu_percent: 1.0,
            ..Default::default()
        };
        assert!(!snapshot.is_empty());
    }

    #[test]
    fn test_rank_processes_keeps_top_three() {
        let ranked = MetricSnapshot::rank_processes(vec![
            ProcessSample { name: "a".into(), pid: 1, cpu: 5.0 },
            ProcessSample { name: "b".into(), pid: 2, cpu: 50.0 },
            ProcessSample { name: "c".into(), pid: 3, cpu: 20.0 },
            ProcessSample { name: "d".into(), pid: 4, cpu: 30.0 },
        ]);
        let names: Vec<&str> = ranked.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["b", "d", "c"]);
    }
}
