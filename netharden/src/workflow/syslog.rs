//! Pushes the remote syslog configuration to a device.
//!
//! The enforcer opens its own session and an interactive shell, sends the
//! fixed [`CommandSequence`] one line at a time and treats the returning
//! prompt as the acknowledgement for each line. It does not inspect what the
//! device printed, and a failure part-way through leaves the commands already
//! sent in place.
//!
//! ```text
//! Disconnected → Connected → ShellActive → Sending(1..=5) → Draining → Closed
//! ```

use std::fmt;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use regex::bytes::Regex;
use thiserror::Error;

use crate::channel::PromptChannel;
use crate::config::AuditConfig;
use crate::error::{ConfigError, Error, Result};
use crate::transport::{Connector, RemoteSession, SshConfig};

/// An ordered list of literal commands for the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSequence {
    commands: Vec<String>,
}

impl CommandSequence {
    /// Commands that send informational-and-above syslog to `server` and save
    /// the result to startup config.
    pub fn syslog(server: &str) -> Self {
        Self {
            commands: vec![
                "configure terminal".to_string(),
                format!("logging host {server}"),
                "logging trap informational".to_string(),
                "end".to_string(),
                "write memory".to_string(),
            ],
        }
    }

    /// The commands in send order.
    pub fn commands(&self) -> &[String] {
        &self.commands
    }

    /// Number of commands.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Whether the sequence is empty.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

/// Where the enforcer is in its session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnforcerState {
    Disconnected,
    Connected,
    ShellActive,
    /// Sending the n-th command (1-based).
    Sending(usize),
    Draining,
    Closed,
}

impl fmt::Display for EnforcerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnforcerState::Disconnected => write!(f, "disconnected"),
            EnforcerState::Connected => write!(f, "connected"),
            EnforcerState::ShellActive => write!(f, "shell active"),
            EnforcerState::Sending(n) => write!(f, "sending command {n}"),
            EnforcerState::Draining => write!(f, "draining"),
            EnforcerState::Closed => write!(f, "closed"),
        }
    }
}

/// Timing and prompt settings for the enforcer.
#[derive(Debug, Clone)]
pub struct EnforcerSettings {
    /// Device prompt; its reappearance acknowledges a command.
    pub prompt: Regex,

    /// Longest wait for each acknowledgement.
    pub command_timeout: Duration,

    /// Most bytes discarded after the last command.
    pub drain_limit: usize,

    /// Drain gives up after this long without output.
    pub drain_idle: Duration,
}

impl EnforcerSettings {
    /// Take the enforcer settings from a run configuration.
    pub fn from_config(config: &AuditConfig) -> std::result::Result<Self, ConfigError> {
        Ok(Self {
            prompt: config.prompt_regex()?,
            command_timeout: config.command_timeout,
            drain_limit: config.drain_limit,
            drain_idle: config.drain_idle,
        })
    }
}

/// A command the device acknowledged with a prompt.
#[derive(Debug, Clone)]
pub struct CommandAck {
    /// The command that was sent.
    pub command: String,

    /// Everything the device printed up to and including the prompt.
    pub output: String,

    /// Time from send to prompt.
    pub elapsed: Duration,
}

/// Result of a completed enforcement.
#[derive(Debug, Clone)]
pub struct EnforcementOutcome {
    /// Syslog server the device was pointed at.
    pub server: String,

    /// One acknowledgement per command, in send order.
    pub acks: Vec<CommandAck>,

    /// Bytes discarded while draining.
    pub drained_bytes: usize,
}

/// Enforcement stopped early.
#[derive(Error, Debug)]
#[error("{error} (while {state}, {sent} command(s) sent, {acknowledged} acknowledged)")]
pub struct EnforcementFailure {
    /// State the enforcer was in when it failed.
    pub state: EnforcerState,

    /// Commands written to the shell, including an unacknowledged last one.
    /// None of them are rolled back.
    pub sent: usize,

    /// Commands the device acknowledged with a prompt.
    pub acknowledged: usize,

    /// What went wrong.
    #[source]
    pub error: Error,
}

/// Tracks state transitions and acknowledgements while enforcing.
struct Progress {
    state: EnforcerState,
    sent: usize,
    acks: Vec<CommandAck>,
}

impl Progress {
    fn enter(&mut self, state: EnforcerState) {
        debug!("syslog enforcer: {} -> {}", self.state, state);
        self.state = state;
    }

    fn fail(self, error: Error) -> EnforcementFailure {
        EnforcementFailure {
            state: self.state,
            sent: self.sent,
            acknowledged: self.acks.len(),
            error,
        }
    }
}

/// Sends the syslog [`CommandSequence`] to one device.
pub struct SyslogEnforcer<'a, C> {
    connector: &'a C,
    target: &'a SshConfig,
    settings: &'a EnforcerSettings,
}

impl<'a, C: Connector> SyslogEnforcer<'a, C> {
    pub fn new(connector: &'a C, target: &'a SshConfig, settings: &'a EnforcerSettings) -> Self {
        Self {
            connector,
            target,
            settings,
        }
    }

    /// Configure the device to log to `server`.
    ///
    /// The session and shell are closed on every path once connected.
    pub async fn enforce(
        &self,
        server: &str,
    ) -> std::result::Result<EnforcementOutcome, EnforcementFailure> {
        let sequence = CommandSequence::syslog(server);
        let mut progress = Progress {
            state: EnforcerState::Disconnected,
            sent: 0,
            acks: Vec::with_capacity(sequence.len()),
        };

        let mut session = match self.connector.connect(self.target).await {
            Ok(session) => session,
            Err(e) => return Err(progress.fail(e)),
        };
        progress.enter(EnforcerState::Connected);

        let result = self.run_shell(&mut session, &sequence, &mut progress).await;

        if let Err(e) = session.close().await {
            warn!(
                "failed to close session to {}: {}",
                self.target.socket_addr(),
                e
            );
        }

        match result {
            Ok(drained_bytes) => {
                progress.enter(EnforcerState::Closed);
                info!("syslog server {} configured on {}", server, self.target.host);
                Ok(EnforcementOutcome {
                    server: server.to_string(),
                    acks: progress.acks,
                    drained_bytes,
                })
            }
            Err(e) => Err(progress.fail(e)),
        }
    }

    async fn run_shell(
        &self,
        session: &mut C::Session,
        sequence: &CommandSequence,
        progress: &mut Progress,
    ) -> Result<usize> {
        let shell = session.open_shell().await?;
        progress.enter(EnforcerState::ShellActive);

        let mut channel = PromptChannel::new(shell, self.settings.prompt.clone());
        let result = self.send_sequence(&mut channel, sequence, progress).await;

        if let Err(e) = channel.close().await {
            debug!("shell close: {}", e);
        }
        result
    }

    async fn send_sequence(
        &self,
        channel: &mut PromptChannel<<C::Session as RemoteSession>::Shell>,
        sequence: &CommandSequence,
        progress: &mut Progress,
    ) -> Result<usize> {
        let timeout = self.settings.command_timeout;
        channel.wait_for_prompt(timeout).await?;

        for (i, command) in sequence.commands().iter().enumerate() {
            progress.enter(EnforcerState::Sending(i + 1));

            let start = Instant::now();
            channel.send_line(command).await?;
            progress.sent += 1;
            let output = channel.wait_for_ack(command, timeout).await?;
            let elapsed = start.elapsed();

            debug!("{:?} acknowledged in {:?}", command, elapsed);
            progress.acks.push(CommandAck {
                command: command.clone(),
                output: String::from_utf8_lossy(&output).into_owned(),
                elapsed,
            });
        }

        progress.enter(EnforcerState::Draining);
        channel
            .drain(self.settings.drain_limit, self.settings.drain_idle)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{IOS_PROMPT_PATTERN, compile_prompt_pattern};
    use crate::error::ErrorKind;
    use crate::transport::mock::MockDevice;

    fn settings() -> EnforcerSettings {
        EnforcerSettings {
            prompt: compile_prompt_pattern(IOS_PROMPT_PATTERN).unwrap(),
            command_timeout: Duration::from_millis(200),
            drain_limit: 1000,
            drain_idle: Duration::from_millis(20),
        }
    }

    fn target() -> SshConfig {
        SshConfig::new("192.168.56.101", "cisco", "cisco123!")
    }

    #[test]
    fn test_syslog_sequence() {
        let sequence = CommandSequence::syslog("192.168.1.100");
        assert_eq!(
            sequence.commands(),
            [
                "configure terminal",
                "logging host 192.168.1.100",
                "logging trap informational",
                "end",
                "write memory",
            ]
        );
    }

    #[tokio::test]
    async fn test_sends_sequence_in_order() {
        let device = MockDevice::default();
        let (target, settings) = (target(), settings());
        let enforcer = SyslogEnforcer::new(&device, &target, &settings);

        let outcome = enforcer.enforce("192.168.1.100").await.unwrap();

        assert_eq!(outcome.server, "192.168.1.100");
        assert_eq!(outcome.acks.len(), 5);
        assert!(outcome.acks[1].output.ends_with("router(config)#"));
        assert!(outcome.acks[4].output.contains("[OK]"));

        let log = device.log();
        assert_eq!(log.sent, CommandSequence::syslog("192.168.1.100").commands());
        assert_eq!(log.shells_closed, 1);
        assert_eq!(log.sessions_closed, 1);
    }

    #[tokio::test]
    async fn test_drain_is_bounded() {
        let device = MockDevice {
            trailing: vec![b'!'; 3000],
            ..MockDevice::default()
        };
        let (target, settings) = (target(), settings());
        let enforcer = SyslogEnforcer::new(&device, &target, &settings);

        let outcome = enforcer.enforce("10.0.0.5").await.unwrap();
        assert_eq!(outcome.drained_bytes, 1000);
    }

    #[tokio::test]
    async fn test_unacknowledged_command_times_out() {
        let device = MockDevice {
            answer_limit: Some(2),
            ..MockDevice::default()
        };
        let (target, settings) = (target(), settings());
        let enforcer = SyslogEnforcer::new(&device, &target, &settings);

        let failure = enforcer.enforce("10.0.0.5").await.unwrap_err();

        assert_eq!(failure.state, EnforcerState::Sending(3));
        assert_eq!(failure.sent, 3);
        assert_eq!(failure.acknowledged, 2);
        assert_eq!(failure.error.kind(), ErrorKind::TransmissionTimeout);
        assert!(failure.to_string().contains("logging trap informational"));

        // No more commands after the stall, and everything is still closed.
        let log = device.log();
        assert_eq!(log.sent.len(), 3);
        assert_eq!(log.shells_closed, 1);
        assert_eq!(log.sessions_closed, 1);
    }

    #[tokio::test]
    async fn test_missing_initial_prompt() {
        let device = MockDevice {
            banner: Vec::new(),
            ..MockDevice::default()
        };
        let (target, settings) = (target(), settings());
        let enforcer = SyslogEnforcer::new(&device, &target, &settings);

        let failure = enforcer.enforce("10.0.0.5").await.unwrap_err();
        assert_eq!(failure.state, EnforcerState::ShellActive);
        assert_eq!(failure.sent, 0);
        assert_eq!(failure.acknowledged, 0);
        assert!(device.log().sent.is_empty());
    }

    #[tokio::test]
    async fn test_connection_failure_before_shell() {
        let device = MockDevice::refusing();
        let (target, settings) = (target(), settings());
        let enforcer = SyslogEnforcer::new(&device, &target, &settings);

        let failure = enforcer.enforce("10.0.0.5").await.unwrap_err();
        assert_eq!(failure.state, EnforcerState::Disconnected);
        assert_eq!(failure.error.kind(), ErrorKind::Connection);
        assert_eq!(device.log().sessions_closed, 0);
    }
}
