//! Remediation action catalog and the records built from executor results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::VigilError;
use crate::recommendations::RecommendationKind;

/// Fixed set of actions the dispatcher may send to an executor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    ThrottleHighCpuProcess,
    KillHighCpuProcess,
    FreeDiskSpace,
    ClearMemoryHog,
    LogMemoryHog,
    RestartService,
    LogServiceFailure,
    HandleUpdatesPending,
    LogUpdatesPending,
}

impl ActionKind {
    pub const ALL: [ActionKind; 9] = [
        ActionKind::ThrottleHighCpuProcess,
        ActionKind::KillHighCpuProcess,
        ActionKind::FreeDiskSpace,
        ActionKind::ClearMemoryHog,
        ActionKind::LogMemoryHog,
        ActionKind::RestartService,
        ActionKind::LogServiceFailure,
        ActionKind::HandleUpdatesPending,
        ActionKind::LogUpdatesPending,
    ];

    /// Identifier stored on Action records
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::ThrottleHighCpuProcess => "action_throttle_high_cpu_process",
            ActionKind::KillHighCpuProcess => "action_kill_high_cpu_process",
            ActionKind::FreeDiskSpace => "action_free_disk_space",
            ActionKind::ClearMemoryHog => "action_clear_memory_hog",
            ActionKind::LogMemoryHog => "action_log_memory_hog",
            ActionKind::RestartService => "action_restart_service",
            ActionKind::LogServiceFailure => "action_log_service_failure",
            ActionKind::HandleUpdatesPending => "action_handle_updates_pending",
            ActionKind::LogUpdatesPending => "action_log_updates_pending",
        }
    }

    /// Informational actions only report and recommend; they change nothing
    pub fn is_informational(&self) -> bool {
        matches!(
            self,
            ActionKind::ClearMemoryHog
                | ActionKind::LogMemoryHog
                | ActionKind::LogServiceFailure
                | ActionKind::LogUpdatesPending
        )
    }

    /// Only a priority throttle can be undone
    pub fn is_reversible(&self) -> bool {
        matches!(self, ActionKind::ThrottleHighCpuProcess)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = VigilError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ActionKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| VigilError::UnknownAction(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionStatus {
    Success,
    Failed,
}

impl ActionStatus {
    pub fn from_success(success: bool) -> Self {
        if success {
            ActionStatus::Success
        } else {
            ActionStatus::Failed
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionStatus::Success => "success",
            ActionStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(ActionStatus::Success),
            "failed" => Ok(ActionStatus::Failed),
            other => Err(format!("unknown action status: {}", other)),
        }
    }
}

/// Structured metadata an executor attaches to its result
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionExtra {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_process: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_service: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files_deleted: Option<String>,
    /// What the executor actually did (throttled, killed, restarted...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_detail: Option<String>,
    /// Set when the result is advisory and the operator should follow up
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<RecommendationKind>,
    /// Priority state left on the target process (below_normal, normal)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
}

impl ActionExtra {
    pub fn process(name: &str) -> Self {
        Self {
            target_process: Some(name.to_string()),
            ..Default::default()
        }
    }

    pub fn service(name: &str) -> Self {
        Self {
            target_service: Some(name.to_string()),
            ..Default::default()
        }
    }

    pub fn recommend(mut self, kind: RecommendationKind) -> Self {
        self.recommendation = Some(kind);
        self
    }

    pub fn detail(mut self, detail: &str) -> Self {
        self.action_detail = Some(detail.to_string());
        self
    }
}

/// What an executor returns for one action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub output: String,
    pub extra: ActionExtra,
}

impl ExecutionResult {
    pub fn ok(output: impl Into<String>, extra: ActionExtra) -> Self {
        Self {
            success: true,
            output: output.into(),
            extra,
        }
    }

    pub fn failed(output: impl Into<String>, extra: ActionExtra) -> Self {
        Self {
            success: false,
            output: output.into(),
            extra,
        }
    }
}

/// Record of one attempted remediation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub timestamp: DateTime<Utc>,
    /// Action identifier, see [`ActionKind::as_str`]
    #[serde(rename = "type")]
    pub action_type: String,
    pub status: ActionStatus,
    pub output: String,
    pub duration_ms: u64,
    /// Lookup-only reference to the triggering event
    pub event_id: Option<i64>,
    #[serde(default)]
    pub id: Option<i64>,
}

impl Action {
    pub fn from_result(
        kind: ActionKind,
        result: &ExecutionResult,
        duration_ms: u64,
        event_id: Option<i64>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            action_type: kind.as_str().to_string(),
            status: ActionStatus::from_success(result.success),
            output: result.output.clone(),
            duration_ms,
            event_id,
            id: None,
        }
    }

    pub fn kind(&self) -> Option<ActionKind> {
        self.action_type.parse().ok()
    }
}

/// Target details recorded with an action, forwarded to rollback
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackTarget {
    pub target_process: Option<String>,
    pub target_service: Option<String>,
}

impl From<&ActionExtra> for RollbackTarget {
    fn from(extra: &ActionExtra) -> Self {
        Self {
            target_process: extra.target_process.clone(),
            target_service: extra.target_service.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackOutcome {
    pub success: bool,
    pub output: String,
    /// State marker left on the target after a successful undo
    pub restored: Option<String>,
}

impl RollbackOutcome {
    pub fn restored(output: impl Into<String>, marker: &str) -> Self {
        Self {
            success: true,
            output: output.into(),
            restored: Some(marker.to_string()),
        }
    }

    pub fn failed(output: impl Into<String>) -> Self {
        Self {
            success: false,
            output: output.into(),
            restored: None,
        }
    }
}
