//! Vigil Daemon - health-event analysis and remediation dispatch
//!
//! Samples the host, turns threshold violations into events, and hands
//! each event to an executor (dry-run or live) behind a policy gate and
//! a safety gate. Every event, action and recommendation is stored.

pub mod action_map;
pub mod analyzer;
pub mod config;
pub mod cycle;
pub mod dispatcher;
pub mod executor;
pub mod monitor;
pub mod policy;
pub mod store;

pub use action_map::{ActionMap, ActionProfile};
pub use config::{Config, Environment, ExecutorKind};
pub use cycle::{run_scheduler, CycleOutcome, Engine};
pub use dispatcher::{CycleReport, Dispatcher};
pub use policy::{select_executor, should_remediate, PolicyDecision};
pub use store::{AuditSink, SettingsProvider, SqliteStore, Store};
