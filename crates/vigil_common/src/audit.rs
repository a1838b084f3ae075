//! Audit entries linking an action to its outcome.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::actions::{Action, ActionStatus};

/// Resource label used for audit entries written by a rollback
pub const ROLLBACK_RESOURCE: &str = "rollback";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub action_id: i64,
    /// Event type the action responded to
    pub affected_resources: String,
    pub status: ActionStatus,
}

impl AuditEntry {
    pub fn for_action(action: &Action, action_id: i64, affected: &str) -> Self {
        Self {
            timestamp: action.timestamp,
            action_id,
            affected_resources: affected.to_string(),
            status: action.status,
        }
    }
}
