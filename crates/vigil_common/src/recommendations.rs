//! Advisory recommendations raised when an action only reports.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::actions::ActionExtra;
use crate::events::{EventType, Severity};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationKind {
    CloseApp,
    RestartService,
    InstallUpdates,
}

impl RecommendationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecommendationKind::CloseApp => "close_app",
            RecommendationKind::RestartService => "restart_service",
            RecommendationKind::InstallUpdates => "install_updates",
        }
    }

    /// Operator-facing text, derived only from the kind and the extra targets
    pub fn text(&self, extra: &ActionExtra) -> String {
        match self {
            RecommendationKind::CloseApp => format!(
                "Close {} to free memory",
                extra.target_process.as_deref().unwrap_or("unknown")
            ),
            RecommendationKind::RestartService => format!(
                "Restart service: {}",
                extra.target_service.as_deref().unwrap_or("unknown")
            ),
            RecommendationKind::InstallUpdates => "Install pending updates".to_string(),
        }
    }
}

impl fmt::Display for RecommendationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecommendationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "close_app" => Ok(RecommendationKind::CloseApp),
            "restart_service" => Ok(RecommendationKind::RestartService),
            "install_updates" => Ok(RecommendationKind::InstallUpdates),
            other => Err(format!("unknown recommendation type: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Medium,
    High,
}

impl Priority {
    pub fn for_severity(severity: Severity) -> Self {
        if severity.is_critical() {
            Priority::High
        } else {
            Priority::Medium
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            other => Err(format!("unknown priority: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecommendationStatus {
    Pending,
    Applied,
    Dismissed,
}

impl RecommendationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecommendationStatus::Pending => "pending",
            RecommendationStatus::Applied => "applied",
            RecommendationStatus::Dismissed => "dismissed",
        }
    }
}

impl FromStr for RecommendationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RecommendationStatus::Pending),
            "applied" => Ok(RecommendationStatus::Applied),
            "dismissed" => Ok(RecommendationStatus::Dismissed),
            other => Err(format!("unknown recommendation status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub timestamp: DateTime<Utc>,
    pub event_id: Option<i64>,
    /// Event type that raised the recommendation
    pub category: EventType,
    pub recommendation_text: String,
    pub action_type: RecommendationKind,
    pub priority: Priority,
    pub status: RecommendationStatus,
    pub applied_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub id: Option<i64>,
}

impl Recommendation {
    pub fn pending(
        event_id: Option<i64>,
        category: EventType,
        severity: Severity,
        kind: RecommendationKind,
        extra: &ActionExtra,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            event_id,
            category,
            recommendation_text: kind.text(extra),
            action_type: kind,
            priority: Priority::for_severity(severity),
            status: RecommendationStatus::Pending,
            applied_at: None,
            id: None,
        }
    }
}
