//! Event type to action mapping.
//!
//! A profile is a fixed table chosen once at start. Event types a profile
//! leaves out are simply not remediated.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use vigil_common::{ActionKind, EventType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ActionProfile {
    /// Throttle CPU hogs, clean disk, only report the rest
    #[default]
    Advisory,
    /// Act on every event type
    Active,
    /// Throttle and disk cleanup only; informational types are not dispatched
    Restrictive,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionMap {
    table: HashMap<EventType, ActionKind>,
}

impl ActionMap {
    pub fn for_profile(profile: ActionProfile) -> Self {
        use ActionKind::*;
        use EventType::*;

        let entries: &[(EventType, ActionKind)] = match profile {
            ActionProfile::Advisory => &[
                (CpuHigh, ThrottleHighCpuProcess),
                (MemoryHigh, LogMemoryHog),
                (DiskLow, FreeDiskSpace),
                (ServiceCrashed, LogServiceFailure),
                (UpdatesPending, LogUpdatesPending),
            ],
            ActionProfile::Active => &[
                (CpuHigh, KillHighCpuProcess),
                (MemoryHigh, ClearMemoryHog),
                (DiskLow, FreeDiskSpace),
                (ServiceCrashed, RestartService),
                (UpdatesPending, HandleUpdatesPending),
            ],
            ActionProfile::Restrictive => &[
                (CpuHigh, ThrottleHighCpuProcess),
                (DiskLow, FreeDiskSpace),
            ],
        };

        Self {
            table: entries.iter().copied().collect(),
        }
    }

    /// Custom table, mostly for tests
    pub fn from_entries(entries: impl IntoIterator<Item = (EventType, ActionKind)>) -> Self {
        Self {
            table: entries.into_iter().collect(),
        }
    }

    pub fn get(&self, event_type: EventType) -> Option<ActionKind> {
        self.table.get(&event_type).copied()
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

impl Default for ActionMap {
    fn default() -> Self {
        Self::for_profile(ActionProfile::default())
    }
}
