//! Metrics collection.
//!
//! `SystemMonitor` samples the host with sysinfo and asks systemd about the
//! watched services. Any collection failure yields an empty snapshot so the
//! cycle skips analysis instead of acting on partial data.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use sysinfo::{Disks, System};
use tracing::{debug, warn};
use vigil_common::{MetricSnapshot, ProcessSample, ServiceSample};

use crate::config::MonitorConfig;
use crate::executor::CommandRunner;

#[async_trait]
pub trait MetricsProvider: Send + Sync {
    /// Never fails: a broken collection is `MetricSnapshot::empty()`
    async fn collect(&self) -> MetricSnapshot;
}

// ============================================================================
// Host monitor
// ============================================================================

pub struct SystemMonitor {
    runner: Arc<dyn CommandRunner>,
    watched_services: Vec<String>,
    disk_mount: PathBuf,
}

/// sysinfo part of a snapshot
struct HostSample {
    cpu_percent: f64,
    memory_percent: f64,
    disk_percent: f64,
    processes: Vec<ProcessSample>,
}

impl SystemMonitor {
    pub fn new(runner: Arc<dyn CommandRunner>, config: &MonitorConfig) -> Self {
        Self {
            runner,
            watched_services: config.watched_services.clone(),
            disk_mount: config.disk_mount.clone(),
        }
    }

    async fn systemctl(&self, verb: &str, service: &str) -> Option<String> {
        let args = vec![verb.to_string(), service.to_string()];
        match self.runner.run("systemctl", &args).await {
            // is-active/is-enabled report state on stdout even with a nonzero exit
            Ok(out) => Some(out.stdout.trim().to_string()).filter(|s| !s.is_empty()),
            Err(e) => {
                debug!("systemctl {} {}: {}", verb, service, e);
                None
            }
        }
    }

    /// State of every watched service that exists on this host
    pub async fn probe_services(&self) -> Vec<ServiceSample> {
        let mut samples = Vec::new();
        for name in &self.watched_services {
            let Some(start_type) = self.systemctl("is-enabled", name).await else {
                continue;
            };
            if start_type == "not-found" {
                continue;
            }
            let state = self
                .systemctl("is-active", name)
                .await
                .unwrap_or_else(|| "unknown".to_string());
            samples.push(ServiceSample::new(name, service_status(&state), &start_type));
        }
        samples
    }

    /// Pending package updates; 0 when checkupdates is missing or fails
    pub async fn pending_updates(&self) -> u32 {
        match self.runner.run("checkupdates", &[]).await {
            Ok(out) if out.success() => out
                .stdout
                .lines()
                .filter(|l| !l.trim().is_empty())
                .count() as u32,
            Ok(_) => 0,
            Err(e) => {
                debug!("checkupdates unavailable: {}", e);
                0
            }
        }
    }
}

/// systemd active state in the monitor's service vocabulary
fn service_status(active_state: &str) -> &str {
    match active_state {
        "active" | "activating" | "reloading" => "running",
        "deactivating" => "stopping",
        "inactive" => "stopped",
        other => other,
    }
}

fn sample_host(disk_mount: &Path) -> Option<HostSample> {
    let mut system = System::new_all();
    // CPU usage needs two refreshes spaced by the minimum interval
    std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
    system.refresh_cpu();
    system.refresh_processes();

    let total_memory = system.total_memory();
    if total_memory == 0 {
        return None;
    }
    let memory_percent = system.used_memory() as f64 / total_memory as f64 * 100.0;
    let cpu_percent = f64::from(system.global_cpu_info().cpu_usage());

    let disks = Disks::new_with_refreshed_list();
    let disk_percent = disks
        .iter()
        .find(|d| d.mount_point() == disk_mount)
        .filter(|d| d.total_space() > 0)
        .map(|d| {
            let used = d.total_space().saturating_sub(d.available_space());
            used as f64 / d.total_space() as f64 * 100.0
        })
        .unwrap_or(0.0);

    let processes = system
        .processes()
        .iter()
        .map(|(pid, process)| ProcessSample {
            name: process.name().to_string(),
            pid: pid.as_u32(),
            cpu: process.cpu_usage(),
        })
        .collect();

    Some(HostSample {
        cpu_percent,
        memory_percent,
        disk_percent,
        processes: MetricSnapshot::rank_processes(processes),
    })
}

#[async_trait]
impl MetricsProvider for SystemMonitor {
    async fn collect(&self) -> MetricSnapshot {
        let mount = self.disk_mount.clone();
        let host = match tokio::task::spawn_blocking(move || sample_host(&mount)).await {
            Ok(Some(host)) => host,
            Ok(None) => {
                warn!("Host sampling returned no data");
                return MetricSnapshot::empty();
            }
            Err(e) => {
                warn!("Host sampling task failed: {}", e);
                return MetricSnapshot::empty();
            }
        };

        MetricSnapshot {
            cpu_percent: host.cpu_percent,
            memory_percent: host.memory_percent,
            disk_percent: host.disk_percent,
            top_processes: host.processes,
            services: self.probe_services().await,
            updates_pending: self.pending_updates().await,
        }
    }
}

// ============================================================================
// Fixed provider
// ============================================================================

/// Returns whatever snapshot it was last given
#[derive(Default)]
pub struct StaticMonitor {
    snapshot: Mutex<MetricSnapshot>,
}

impl StaticMonitor {
    pub fn new(snapshot: MetricSnapshot) -> Self {
        Self {
            snapshot: Mutex::new(snapshot),
        }
    }

    pub fn set(&self, snapshot: MetricSnapshot) {
        if let Ok(mut current) = self.snapshot.lock() {
            *current = snapshot;
        }
    }
}

#[async_trait]
impl MetricsProvider for StaticMonitor {
    async fn collect(&self) -> MetricSnapshot {
        self.snapshot
            .lock()
            .map(|s| s.clone())
            .unwrap_or_else(|_| MetricSnapshot::empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{CommandOutput, RunError, ScriptedRunner};

    fn monitor(runner: ScriptedRunner, services: &[&str]) -> SystemMonitor {
        let config = MonitorConfig {
            watched_services: services.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        };
        SystemMonitor::new(Arc::new(runner), &config)
    }

    #[tokio::test]
    async fn test_service_probe_maps_states() {
        let runner = ScriptedRunner::new().respond("systemctl", Ok(CommandOutput::ok("inactive\n")));
        let samples = monitor(runner, &["cups"]).probe_services().await;
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].status, "stopped");
        assert_eq!(samples[0].start_type, "inactive");
    }

    #[tokio::test]
    async fn test_missing_systemctl_yields_no_services() {
        let runner = ScriptedRunner::new()
            .respond("systemctl", Err(RunError::Spawn("systemctl: not found".to_string())));
        assert!(monitor(runner, &["cups", "bluetooth"]).probe_services().await.is_empty());
    }

    #[tokio::test]
    async fn test_pending_updates_fall_back_to_zero() {
        let runner = ScriptedRunner::new().respond("checkupdates", Ok(CommandOutput::exit(2, "")));
        assert_eq!(monitor(runner, &[]).pending_updates().await, 0);

        let runner = ScriptedRunner::new().respond("checkupdates", Ok(CommandOutput::ok("a 1 -> 2\nb 3 -> 4\n")));
        assert_eq!(monitor(runner, &[]).pending_updates().await, 2);

        let runner = ScriptedRunner::new().respond("checkupdates", Err(RunError::Timeout(30)));
        assert_eq!(monitor(runner, &[]).pending_updates().await, 0);
    }

    #[test]
    fn test_service_status_vocabulary() {
        assert_eq!(service_status("active"), "running");
        assert_eq!(service_status("inactive"), "stopped");
        assert_eq!(service_status("failed"), "failed");
        assert_eq!(service_status("activating"), "running");
        assert_eq!(service_status("deactivating"), "stopping");
        assert!(!ServiceSample::new("cups", service_status("activating"), "enabled").is_crashed());
        assert!(!ServiceSample::new("cups", service_status("deactivating"), "enabled").is_crashed());
    }

    #[tokio::test]
    async fn test_static_monitor_returns_snapshot() {
        let monitor = StaticMonitor::new(MetricSnapshot {
            cpu_percent: 50.0,
            ..Default::default()
        });
        assert_eq!(monitor.collect().await.cpu_percent, 50.0);
        monitor.set(MetricSnapshot::empty());
        assert!(monitor.collect().await.is_empty());
    }
}
