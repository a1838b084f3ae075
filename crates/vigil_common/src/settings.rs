//! Per-cycle settings snapshot.
//!
//! Settings are stored as plain key/value strings so the operator can edit
//! them between cycles. A cycle parses them once; a missing or garbled value
//! falls back to its default and the check still runs.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::str::FromStr;
use tracing::warn;

pub const KEY_CPU_THRESHOLD: &str = "cpu_threshold";
pub const KEY_MEMORY_THRESHOLD: &str = "memory_threshold";
pub const KEY_DISK_THRESHOLD: &str = "disk_threshold";
pub const KEY_UPDATES_THRESHOLD: &str = "updates_pending_threshold";
pub const KEY_AUTO_REMEDIATE: &str = "auto_remediate";

pub const DEFAULT_CPU_THRESHOLD: f64 = 80.0;
pub const DEFAULT_MEMORY_THRESHOLD: f64 = 85.0;
pub const DEFAULT_DISK_THRESHOLD: f64 = 90.0;
pub const DEFAULT_UPDATES_THRESHOLD: u32 = 5;

/// Names authorized for destructive remediation
pub type Whitelist = BTreeSet<String>;

/// Rows seeded into a fresh settings table
pub fn default_settings() -> Vec<(&'static str, String)> {
    vec![
        (KEY_CPU_THRESHOLD, DEFAULT_CPU_THRESHOLD.to_string()),
        (KEY_MEMORY_THRESHOLD, DEFAULT_MEMORY_THRESHOLD.to_string()),
        (KEY_DISK_THRESHOLD, DEFAULT_DISK_THRESHOLD.to_string()),
        (KEY_UPDATES_THRESHOLD, DEFAULT_UPDATES_THRESHOLD.to_string()),
        (KEY_AUTO_REMEDIATE, "false".to_string()),
    ]
}

/// Interpret an operator-supplied flag ("1", "true", "on", "yes")
pub fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "on" | "yes"
    )
}

/// Read-only view of the settings for one cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingsSnapshot {
    pub cpu_threshold: f64,
    pub memory_threshold: f64,
    pub disk_threshold: f64,
    pub updates_pending_threshold: u32,
    pub auto_remediate: bool,
    pub whitelist: Whitelist,
}

impl Default for SettingsSnapshot {
    fn default() -> Self {
        Self {
            cpu_threshold: DEFAULT_CPU_THRESHOLD,
            memory_threshold: DEFAULT_MEMORY_THRESHOLD,
            disk_threshold: DEFAULT_DISK_THRESHOLD,
            updates_pending_threshold: DEFAULT_UPDATES_THRESHOLD,
            auto_remediate: false,
            whitelist: Whitelist::new(),
        }
    }
}

impl SettingsSnapshot {
    pub fn from_map(map: &HashMap<String, String>, whitelist: Whitelist) -> Self {
        Self {
            cpu_threshold: threshold(map, KEY_CPU_THRESHOLD, DEFAULT_CPU_THRESHOLD),
            memory_threshold: threshold(map, KEY_MEMORY_THRESHOLD, DEFAULT_MEMORY_THRESHOLD),
            disk_threshold: threshold(map, KEY_DISK_THRESHOLD, DEFAULT_DISK_THRESHOLD),
            updates_pending_threshold: parsed_or(
                map,
                KEY_UPDATES_THRESHOLD,
                DEFAULT_UPDATES_THRESHOLD,
            ),
            auto_remediate: map
                .get(KEY_AUTO_REMEDIATE)
                .map(|v| parse_flag(v))
                .unwrap_or(false),
            whitelist,
        }
    }
}

fn threshold(map: &HashMap<String, String>, key: &str, default: f64) -> f64 {
    let value: f64 = parsed_or(map, key, default);
    if value.is_finite() {
        value
    } else {
        warn!("Setting {} is not a finite number, using default {}", key, default);
        default
    }
}

fn parsed_or<T>(map: &HashMap<String, String>, key: &str, default: T) -> T
where
    T: FromStr + std::fmt::Display + Copy,
{
    match map.get(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("Setting {}={:?} is unparseable, using default {}", key, raw, default);
            default
        }),
    }
}
