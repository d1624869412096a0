//! # netharden
//!
//! Audit a network device against hardening guidelines and point its logging
//! at a syslog server, all over SSH.
//!
//! A run has four stages:
//!
//! - fetch the running configuration with `show running-config`
//! - load the hardening guidelines file
//! - report guideline lines missing from the configuration
//! - push `logging host`/`logging trap` to the device and save it
//!
//! A failing stage is reported and the run continues; see
//! [`workflow::AuditReport`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use netharden::{AuditConfig, Auditor, SshConnector};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AuditConfig {
//!         device_address: "10.0.0.1".into(),
//!         syslog_server: "10.0.0.50".into(),
//!         ..AuditConfig::default()
//!     };
//!
//!     let auditor = Auditor::new(config, SshConnector)?;
//!     let report = auditor.run(&mut std::io::stdout()).await?;
//!     println!("failures: {:?}", report.failures());
//!     Ok(())
//! }
//! ```

pub mod channel;
pub mod config;
pub mod error;
pub mod transport;
pub mod workflow;

// Re-export main types for convenience
pub use config::AuditConfig;
pub use error::{Error, ErrorKind};
pub use transport::{AuthMethod, Connector, HostKeyPolicy, SshConfig, SshConnector};
pub use workflow::{
    AuditReport, Auditor, ComplianceResult, ConfigurationText, PolicyText, check_compliance,
};
