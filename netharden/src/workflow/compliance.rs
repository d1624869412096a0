//! Compares a device configuration against hardening guidelines.
//!
//! A guideline is satisfied when an identical line appears anywhere in the
//! configuration. Matching is whole-line and exact: whitespace, case and
//! command abbreviations must agree with what the device prints.

use std::collections::HashSet;
use std::fmt;

use super::fetcher::ConfigurationText;
use super::guidelines::PolicyText;

/// Guideline lines that the configuration does not contain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComplianceResult {
    missing: Vec<String>,
}

impl ComplianceResult {
    /// Missing lines, in guideline order.
    pub fn missing(&self) -> &[String] {
        &self.missing
    }

    /// True when every guideline line was found.
    pub fn is_compliant(&self) -> bool {
        self.missing.is_empty()
    }
}

impl fmt::Display for ComplianceResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_compliant() {
            return writeln!(f, "Configuration is compliant with hardening guidelines.");
        }

        writeln!(f, "Non-compliant configurations found:")?;
        for line in &self.missing {
            writeln!(f, "- {line}")?;
        }
        Ok(())
    }
}

/// Return every policy line with no exact match in `config`.
pub fn check_compliance(config: &ConfigurationText, policy: &PolicyText) -> ComplianceResult {
    let present: HashSet<&str> = config.lines().iter().map(String::as_str).collect();

    ComplianceResult {
        missing: policy
            .lines()
            .iter()
            .filter(|line| !present.contains(line.as_str()))
            .cloned()
            .collect(),
    }
}
