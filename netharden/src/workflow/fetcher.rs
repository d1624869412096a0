//! Pulls the running configuration off a device.

use std::borrow::Cow;
use std::time::Duration;

use log::{info, warn};

use crate::error::Result;
use crate::transport::{Connector, RemoteSession, SshConfig};

/// Command that prints the full running configuration.
pub const SHOW_RUNNING_CONFIG: &str = "show running-config";

/// A device's configuration as captured, one entry per line.
///
/// No structure is imposed on the lines; comparisons are exact.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigurationText {
    lines: Vec<String>,
}

impl ConfigurationText {
    /// Decode raw command output and split it into lines.
    ///
    /// Invalid UTF-8 is replaced rather than rejected.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let text = String::from_utf8_lossy(bytes);
        if let Cow::Owned(_) = text {
            warn!("configuration output was not valid UTF-8; invalid bytes replaced");
        }
        Self::from_lines(text.lines())
    }

    /// Build from already-split lines.
    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
        }
    }

    /// The lines in device order.
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Number of lines.
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Whether no lines were captured.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Connect, run `show running-config` once and return its output as lines.
///
/// The session is closed whether or not the command succeeded. Nothing is
/// retried.
pub async fn fetch_running_config<C: Connector>(
    connector: &C,
    target: &SshConfig,
    timeout: Duration,
) -> Result<ConfigurationText> {
    let mut session = connector.connect(target).await?;

    let output = session.execute(SHOW_RUNNING_CONFIG, timeout).await;

    if let Err(e) = session.close().await {
        warn!("failed to close session to {}: {}", target.socket_addr(), e);
    }

    let config = ConfigurationText::from_bytes(&output?);
    info!(
        "fetched {} configuration lines from {}",
        config.len(),
        target.host
    );
    Ok(config)
}
