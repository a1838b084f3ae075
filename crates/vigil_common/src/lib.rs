//! Vigil Common - Shared types for the health-event remediation engine
//!
//! Value objects handed between the monitor, analyzer, dispatcher,
//! executors and the audit store, plus the one safety gate every
//! executor consults before touching a process or service.

pub mod actions;
pub mod audit;
pub mod error;
pub mod events;
pub mod metrics;
pub mod recommendations;
pub mod safety;
pub mod settings;

pub use actions::*;
pub use audit::*;
pub use error::*;
pub use events::*;
pub use metrics::*;
pub use recommendations::*;
pub use safety::*;
pub use settings::*;
