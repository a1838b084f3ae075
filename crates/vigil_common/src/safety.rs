//! Safety Gate
//!
//! The single choke point every executor consults before it renices, kills
//! or restarts anything. Lists are compiled into the binary and extended only
//! through config; no executor keeps its own copy.
//!
//! Rules, in order:
//! - names must be plain identifiers (they end up as command arguments)
//! - the deny-list always blocks, even when the name is whitelisted
//! - killing a process requires the name to be whitelisted
//! - throttling is allowed for any process that is not denied
//! - restarting a service requires a known-safe or whitelisted service

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;

use crate::settings::Whitelist;

/// Core OS processes that must never be touched
const DENIED_PROCESSES: &[&str] = &[
    // Linux
    "systemd",
    "init",
    "kthreadd",
    "systemd-journald",
    "systemd-logind",
    "systemd-udevd",
    "dbus-daemon",
    "dbus-broker",
    "sshd",
    "xorg",
    "xwayland",
    "polkitd",
    "vigild",
    // Windows
    "system",
    "registry",
    "smss",
    "csrss",
    "wininit",
    "winlogon",
    "services",
    "lsass",
    "svchost",
    "msmpeng",
    "explorer",
];

/// Services whose restart would take the host (or our access to it) down
const DENIED_SERVICES: &[&str] = &[
    "systemd-journald",
    "systemd-logind",
    "systemd-udevd",
    "dbus",
    "dbus-broker",
    "sshd",
    "polkit",
    "display-manager",
    "vigild",
    "rpcss",
    "lsm",
    "eventlog",
];

/// Services a restart cannot harm
const SAFE_SERVICES: &[&str] = &[
    "bluetooth",
    "cups",
    "networkmanager",
    "systemd-timesyncd",
    "avahi-daemon",
    "tlp",
    "packagekit",
    "wuauserv",
    "bits",
    "spooler",
    "dnscache",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Process,
    Service,
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetKind::Process => f.write_str("process"),
            TargetKind::Service => f.write_str("service"),
        }
    }
}

/// Host-mutating operation an executor wants to perform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Throttle,
    Kill,
    RestartService,
}

impl Operation {
    pub fn kind(&self) -> TargetKind {
        match self {
            Operation::Throttle | Operation::Kill => TargetKind::Process,
            Operation::RestartService => TargetKind::Service,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SafetyVeto {
    #[error("invalid {kind} name {name:?}")]
    InvalidName { kind: TargetKind, name: String },

    #[error("{kind} {name} is a protected system {kind}")]
    Denied { kind: TargetKind, name: String },

    #[error("process {0} is not in the whitelist")]
    NotWhitelisted(String),

    #[error("service {0} is neither known-safe nor whitelisted")]
    UnknownService(String),
}

/// Deny-list plus whitelist check shared by all executors
#[derive(Debug, Clone)]
pub struct SafetyGate {
    denied_processes: HashSet<String>,
    denied_services: HashSet<String>,
    safe_services: HashSet<String>,
    /// Whitelist from config, combined with the per-call whitelist
    whitelist: HashSet<String>,
}

impl Default for SafetyGate {
    fn default() -> Self {
        Self::new()
    }
}

impl SafetyGate {
    /// Built-in lists only
    pub fn new() -> Self {
        Self {
            denied_processes: DENIED_PROCESSES.iter().map(|s| normalize(s)).collect(),
            denied_services: DENIED_SERVICES.iter().map(|s| normalize(s)).collect(),
            safe_services: SAFE_SERVICES.iter().map(|s| normalize(s)).collect(),
            whitelist: HashSet::new(),
        }
    }

    /// Built-in lists extended by config. Extra deny entries apply to both kinds.
    pub fn with_config<I, J>(whitelist: I, deny_extra: J) -> Self
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
        J: IntoIterator,
        J::Item: AsRef<str>,
    {
        let mut gate = Self::new();
        gate.whitelist = whitelist.into_iter().map(|s| normalize(s.as_ref())).collect();
        for name in deny_extra {
            let name = normalize(name.as_ref());
            gate.denied_processes.insert(name.clone());
            gate.denied_services.insert(name);
        }
        gate
    }

    pub fn is_denied(&self, kind: TargetKind, name: &str) -> bool {
        let name = normalize(name);
        match kind {
            TargetKind::Process => self.denied_processes.contains(&name),
            TargetKind::Service => self.denied_services.contains(&name),
        }
    }

    fn is_whitelisted(&self, name: &str, whitelist: &Whitelist) -> bool {
        self.whitelist.contains(name) || whitelist.iter().any(|w| normalize(w) == name)
    }

    pub fn check(&self, op: Operation, name: &str, whitelist: &Whitelist) -> Result<(), SafetyVeto> {
        let kind = op.kind();
        if !is_valid_name(name) {
            return Err(SafetyVeto::InvalidName {
                kind,
                name: name.to_string(),
            });
        }
        if self.is_denied(kind, name) {
            return Err(SafetyVeto::Denied {
                kind,
                name: name.trim().to_string(),
            });
        }

        let normalized = normalize(name);
        match op {
            Operation::Throttle => Ok(()),
            Operation::Kill => {
                if self.is_whitelisted(&normalized, whitelist) {
                    Ok(())
                } else {
                    Err(SafetyVeto::NotWhitelisted(name.trim().to_string()))
                }
            }
            Operation::RestartService => {
                if self.safe_services.contains(&normalized)
                    || self.is_whitelisted(&normalized, whitelist)
                {
                    Ok(())
                } else {
                    Err(SafetyVeto::UnknownService(name.trim().to_string()))
                }
            }
        }
    }

    pub fn is_allowed_target(&self, op: Operation, name: &str, whitelist: &Whitelist) -> bool {
        self.check(op, name, whitelist).is_ok()
    }
}

/// Lowercase and drop platform suffixes so "Chrome.exe" matches "chrome"
pub fn normalize(name: &str) -> String {
    let lower = name.trim().to_ascii_lowercase();
    let stripped = lower
        .strip_suffix(".exe")
        .or_else(|| lower.strip_suffix(".service"))
        .unwrap_or(&lower);
    stripped.to_string()
}

/// Names are passed to system commands as arguments: no option lookalikes,
/// no shell metacharacters, no control characters.
pub fn is_valid_name(name: &str) -> bool {
    let name = name.trim();
    !name.is_empty()
        && name.len() <= 128
        && !name.starts_with('-')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_.-@:+() ".contains(c))
}
