//! The audit workflow.
//!
//! Four stages run strictly in order:
//!
//! ```text
//! fetch running-config ─┐
//!                       ├─► compliance check ─► syslog enforcement
//! load guidelines ──────┘
//! ```
//!
//! The compliance check only runs when both inputs were obtained; syslog
//! enforcement always runs. Every stage hands back a `Result` and nothing in
//! here aborts the run. [`Auditor`] wires them together.

pub mod compliance;
pub mod fetcher;
pub mod guidelines;
pub mod pipeline;
pub mod syslog;

pub use compliance::{ComplianceResult, check_compliance};
pub use fetcher::{ConfigurationText, SHOW_RUNNING_CONFIG, fetch_running_config};
pub use guidelines::{PolicyText, load_guidelines};
pub use pipeline::{AuditReport, Auditor};
pub use syslog::{
    CommandAck, CommandSequence, EnforcementFailure, EnforcementOutcome, EnforcerSettings,
    EnforcerState, SyslogEnforcer,
};
