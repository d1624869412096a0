//! SSH transport layer.
//!
//! The workflow talks to devices through three small traits so the remote
//! side can be swapped out: [`Connector`] opens a [`RemoteSession`], which can
//! run a single command or open an [`InteractiveShell`]. [`SshConnector`] is
//! the russh-backed implementation.

pub mod config;
#[cfg(test)]
pub(crate) mod mock;
mod ssh;

pub use config::{AuthMethod, HostKeyPolicy, SshConfig};
pub use ssh::{SshConnector, SshShell, SshTransport};

use std::future::Future;
use std::time::Duration;

use crate::error::Result;

/// Opens authenticated sessions to a device.
pub trait Connector: Send + Sync {
    /// Session type produced by this connector.
    type Session: RemoteSession;

    /// Connect and authenticate.
    fn connect(&self, config: &SshConfig) -> impl Future<Output = Result<Self::Session>> + Send;
}

/// An authenticated session to a device.
pub trait RemoteSession: Send {
    /// Interactive shell type opened by this session.
    type Shell: InteractiveShell;

    /// Execute one command and return everything it wrote to stdout.
    fn execute(
        &mut self,
        command: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<Vec<u8>>> + Send;

    /// Open an interactive shell on a PTY.
    fn open_shell(&mut self) -> impl Future<Output = Result<Self::Shell>> + Send;

    /// Disconnect the session.
    fn close(self) -> impl Future<Output = Result<()>> + Send;
}

/// A persistent shell that accepts multiple commands.
pub trait InteractiveShell: Send {
    /// Write raw text to the shell.
    fn send(&mut self, text: &str) -> impl Future<Output = Result<()>> + Send;

    /// Wait for output and return at most `max_bytes` of it.
    ///
    /// Returns `Ok(None)` once the remote side has closed the shell.
    fn receive(&mut self, max_bytes: usize) -> impl Future<Output = Result<Option<Vec<u8>>>> + Send;

    /// Close the shell channel.
    fn close(self) -> impl Future<Output = Result<()>> + Send;
}
