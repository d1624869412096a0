//! Loads the hardening guidelines file.

use std::fs;
use std::io;
use std::path::Path;

use log::debug;

use crate::error::{PolicyError, Result};

/// Hardening guidelines, one required configuration line per entry.
///
/// Blank lines are dropped when loading; every other line is kept verbatim.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicyText {
    lines: Vec<String>,
}

impl PolicyText {
    /// Split guideline text into policy lines.
    pub fn from_text(text: &str) -> Self {
        Self::from_lines(text.lines())
    }

    /// Build from already-split lines, dropping blank ones.
    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines
                .into_iter()
                .map(Into::into)
                .filter(|line: &String| !line.trim().is_empty())
                .collect(),
        }
    }

    /// The policy lines in file order.
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Number of policy lines.
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Whether the policy has no lines.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Read the guidelines file at `path`.
pub fn load_guidelines(path: &Path) -> Result<PolicyText> {
    let text = fs::read_to_string(path).map_err(|source| match source.kind() {
        io::ErrorKind::NotFound => PolicyError::NotFound {
            path: path.to_path_buf(),
        },
        _ => PolicyError::Read {
            path: path.to_path_buf(),
            source,
        },
    })?;

    let policy = PolicyText::from_text(&text);
    debug!("loaded {} guideline lines from {}", policy.len(), path.display());
    Ok(policy)
}
