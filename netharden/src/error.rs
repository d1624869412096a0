//! Error types for netharden.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Main error type for netharden operations.
#[derive(Error, Debug)]
pub enum Error {
    /// SSH transport-level errors
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Channel operation errors
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    /// Guidelines file errors
    #[error("Policy error: {0}")]
    Policy(#[from] PolicyError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Coarse classification of an [`Error`], used by callers that only need to
/// know which kind of stage failure occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The device could not be reached or the handshake failed.
    Connection,
    /// Credentials were rejected or a key could not be loaded.
    Authentication,
    /// The server's host key failed verification.
    HostKey,
    /// The guidelines file does not exist.
    NotFound,
    /// The guidelines file could not be read.
    Read,
    /// Sending to or receiving from the device failed.
    Transmission,
    /// The device did not acknowledge a command in time.
    TransmissionTimeout,
    /// The run configuration is invalid.
    Config,
}

impl Error {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Transport(e) => match e {
                TransportError::AuthenticationFailed { .. } | TransportError::Key(_) => {
                    ErrorKind::Authentication
                }
                TransportError::HostKeyUnknown { .. }
                | TransportError::HostKeyChanged { .. }
                | TransportError::HostKeyNotPinned { .. }
                | TransportError::KnownHosts(_) => ErrorKind::HostKey,
                TransportError::ConnectionFailed { .. }
                | TransportError::Ssh(_)
                | TransportError::Timeout(_) => ErrorKind::Connection,
            },
            Error::Channel(e) => match e {
                ChannelError::TransmissionTimeout { .. } | ChannelError::PromptTimeout(_) => {
                    ErrorKind::TransmissionTimeout
                }
                _ => ErrorKind::Transmission,
            },
            Error::Policy(PolicyError::NotFound { .. }) => ErrorKind::NotFound,
            Error::Policy(PolicyError::Read { .. }) => ErrorKind::Read,
            Error::Config(_) => ErrorKind::Config,
        }
    }
}

/// Transport layer errors (SSH connection, authentication, host keys).
#[derive(Error, Debug)]
pub enum TransportError {
    /// Failed to connect to host
    #[error("Connection failed to {host}:{port}: {source}")]
    ConnectionFailed {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    /// SSH handshake or protocol error
    #[error("SSH error: {0}")]
    Ssh(#[from] russh::Error),

    /// Authentication failed
    #[error("Authentication failed for user '{user}'")]
    AuthenticationFailed { user: String },

    /// SSH key error
    #[error("SSH key error: {0}")]
    Key(String),

    /// Host is not present in known_hosts and the policy rejects unknown hosts
    #[error("Host key for {host}:{port} is not in known_hosts")]
    HostKeyUnknown { host: String, port: u16 },

    /// Host key differs from the one recorded in known_hosts
    #[error("Host key for {host}:{port} changed (known_hosts line {line})")]
    HostKeyChanged { host: String, port: u16, line: usize },

    /// Presented key fingerprint is not in the pinned set
    #[error("Host key {fingerprint} for {host} is not pinned")]
    HostKeyNotPinned { host: String, fingerprint: String },

    /// known_hosts could not be read or written
    #[error("known_hosts error: {0}")]
    KnownHosts(String),

    /// Operation timed out
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),
}

/// Channel layer errors (exec, shell, prompt acknowledgement).
#[derive(Error, Debug)]
pub enum ChannelError {
    /// Failed to open PTY channel
    #[error("Failed to open PTY channel")]
    PtyOpenFailed,

    /// Failed to request shell
    #[error("Failed to request shell")]
    ShellRequestFailed,

    /// Remote command could not be started
    #[error("Failed to execute '{command}'")]
    ExecFailed { command: String },

    /// No prompt was seen within the timeout
    #[error("Prompt not found within {0:?}")]
    PromptTimeout(Duration),

    /// A sent command was not acknowledged by a prompt in time
    #[error("No acknowledgement for '{command}' within {timeout:?}")]
    TransmissionTimeout { command: String, timeout: Duration },

    /// Channel closed unexpectedly
    #[error("Channel closed")]
    Closed,

    /// SSH protocol error on the channel
    #[error("Channel SSH error: {0}")]
    Ssh(russh::Error),
}

/// Guidelines file errors.
#[derive(Error, Debug)]
pub enum PolicyError {
    /// The file does not exist
    #[error("No such file: {}", .path.display())]
    NotFound { path: PathBuf },

    /// The file exists but could not be read
    #[error("{}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Run configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A field failed validation
    #[error("Invalid {field}: {message}")]
    Invalid { field: &'static str, message: String },

    /// Configuration file could not be read
    #[error("Cannot read config file {}: {source}", .path.display())]
    File {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Configuration file is not valid JSON for the expected shape
    #[error("Cannot parse config file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field,
            message: message.into(),
        }
    }
}

/// Result type alias using netharden's Error.
pub type Result<T> = std::result::Result<T, Error>;
