//! Runs the whole audit against one device.

use std::io::{self, Write};

use log::info;

use super::compliance::{ComplianceResult, check_compliance};
use super::fetcher::{ConfigurationText, fetch_running_config};
use super::guidelines::{PolicyText, load_guidelines};
use super::syslog::{EnforcementFailure, EnforcementOutcome, EnforcerSettings, SyslogEnforcer};
use crate::config::AuditConfig;
use crate::error::{ConfigError, ErrorKind, Result};
use crate::transport::Connector;

/// What each stage of a run produced.
///
/// A failed stage does not stop later ones, so callers should look at every
/// field rather than only the last.
#[derive(Debug)]
pub struct AuditReport {
    /// Output of the config fetch.
    pub running_config: Result<ConfigurationText>,

    /// Output of the guidelines load.
    pub guidelines: Result<PolicyText>,

    /// Compliance result; `None` when either input was unavailable.
    pub compliance: Option<ComplianceResult>,

    /// Outcome of the syslog enforcement.
    pub syslog: std::result::Result<EnforcementOutcome, EnforcementFailure>,
}

impl AuditReport {
    /// Kinds of every stage failure, in stage order.
    pub fn failures(&self) -> Vec<ErrorKind> {
        let mut kinds = Vec::new();
        if let Err(e) = &self.running_config {
            kinds.push(e.kind());
        }
        if let Err(e) = &self.guidelines {
            kinds.push(e.kind());
        }
        if let Err(failure) = &self.syslog {
            kinds.push(failure.error.kind());
        }
        kinds
    }

    /// True when every stage succeeded and the device is compliant.
    pub fn is_clean(&self) -> bool {
        self.failures().is_empty()
            && self
                .compliance
                .as_ref()
                .is_some_and(ComplianceResult::is_compliant)
    }
}

/// Runs fetch, load, compare and enforce against a single device.
pub struct Auditor<C> {
    config: AuditConfig,
    settings: EnforcerSettings,
    connector: C,
}

impl<C: Connector> Auditor<C> {
    /// Validate `config` and prepare a run.
    pub fn new(config: AuditConfig, connector: C) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        let settings = EnforcerSettings::from_config(&config)?;
        Ok(Self {
            config,
            settings,
            connector,
        })
    }

    /// Run every stage, writing the human-readable report to `out`.
    ///
    /// Stage failures are printed and recorded in the returned report; only a
    /// failure to write to `out` is returned as an error.
    pub async fn run<W: Write>(&self, out: &mut W) -> io::Result<AuditReport> {
        let target = self.config.ssh_config();

        let running_config =
            fetch_running_config(&self.connector, &target, self.config.exec_timeout).await;
        if let Err(e) = &running_config {
            writeln!(out, "Error retrieving config: {e}")?;
        }

        let guidelines = load_guidelines(&self.config.guidelines_path);
        if let Err(e) = &guidelines {
            writeln!(
                out,
                "Error reading file '{}': {e}",
                self.config.guidelines_path.display()
            )?;
        }

        let compliance = match (&running_config, &guidelines) {
            (Ok(config), Ok(policy)) => {
                writeln!(out, "\nChecking compliance with hardening guidelines...")?;
                let result = check_compliance(config, policy);
                write!(out, "{result}")?;
                Some(result)
            }
            _ => {
                info!("skipping compliance check: missing configuration or guidelines");
                None
            }
        };

        writeln!(out, "\nConfiguring syslog on the device...")?;
        let enforcer = SyslogEnforcer::new(&self.connector, &target, &self.settings);
        let syslog = enforcer.enforce(&self.config.syslog_server).await;
        match &syslog {
            Ok(outcome) => writeln!(
                out,
                "Syslog server {} configured successfully.",
                outcome.server
            )?,
            Err(failure) => writeln!(out, "Error configuring syslog: {failure}")?,
        }

        Ok(AuditReport {
            running_config,
            guidelines,
            compliance,
            syslog,
        })
    }
}
