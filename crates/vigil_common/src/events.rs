//! Health events produced by the analyzer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Recognized event kinds, in the analyzer's check order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    CpuHigh,
    MemoryHigh,
    DiskLow,
    ServiceCrashed,
    UpdatesPending,
}

impl EventType {
    pub const ALL: [EventType; 5] = [
        EventType::CpuHigh,
        EventType::MemoryHigh,
        EventType::DiskLow,
        EventType::ServiceCrashed,
        EventType::UpdatesPending,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::CpuHigh => "cpu_high",
            EventType::MemoryHigh => "memory_high",
            EventType::DiskLow => "disk_low",
            EventType::ServiceCrashed => "service_crashed",
            EventType::UpdatesPending => "updates_pending",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown event type: {}", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }

    pub fn is_critical(&self) -> bool {
        matches!(self, Severity::Critical)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "warning" => Ok(Severity::Warning),
            "critical" => Ok(Severity::Critical),
            other => Err(format!("unknown severity: {}", other)),
        }
    }
}

/// A typed, timestamped deviation detected in one metric snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub severity: Severity,
    pub description: String,
    pub metric_value: f64,
    pub threshold: f64,
    /// Process or service the event is about, when the rule knows one
    #[serde(default)]
    pub target: Option<String>,
    /// Assigned by the store on persistence
    #[serde(default)]
    pub id: Option<i64>,
}

impl Event {
    pub fn new(
        timestamp: DateTime<Utc>,
        event_type: EventType,
        severity: Severity,
        description: impl Into<String>,
        metric_value: f64,
        threshold: f64,
    ) -> Self {
        Self {
            timestamp,
            event_type,
            severity,
            description: description.into(),
            metric_value,
            threshold,
            target: None,
            id: None,
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// The only mutation an event ever receives
    pub fn assign_id(&mut self, id: i64) {
        self.id = Some(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_round_trips_through_str() {
        for t in EventType::ALL {
            assert_eq!(t.as_str().parse::<EventType>().unwrap(), t);
        }
        assert!("gpu_hot".parse::<EventType>().is_err());
    }

    #[test]
    fn test_event_serializes_type_key() {
        let event = Event::new(Utc::now(), EventType::DiskLow, Severity::Critical, "x", 95.0, 90.0);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "disk_low");
        assert_eq!(json["severity"], "critical");
        assert!(json["id"].is_null());
    }
}
