//! SSH connection configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;
use ssh_key::Fingerprint;

use crate::error::ConfigError;

/// Host key verification policy.
///
/// The default rejects any host that is not already recorded in
/// known_hosts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum HostKeyPolicy {
    /// Only accept hosts already present in known_hosts. Changed keys are
    /// rejected.
    #[default]
    RejectUnknown,

    /// Trust on first use: learn unknown keys into known_hosts, still reject
    /// changed keys.
    AutoTrust,

    /// Accept only keys whose SHA256 fingerprint is in the set. known_hosts
    /// is not consulted.
    PinnedKey(Vec<Fingerprint>),
}

impl HostKeyPolicy {
    /// Whether `fingerprint` is accepted by a pinned policy.
    ///
    /// Always false for the known_hosts based policies.
    pub fn is_pinned(&self, fingerprint: &str) -> bool {
        match self {
            HostKeyPolicy::PinnedKey(pins) => pins.iter().any(|fp| fp.to_string() == fingerprint),
            _ => false,
        }
    }
}

impl FromStr for HostKeyPolicy {
    type Err = ConfigError;

    /// Parse `reject-unknown`, `auto-trust` or `pinned:<fp>[,<fp>...]`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s {
            "reject-unknown" => return Ok(HostKeyPolicy::RejectUnknown),
            "auto-trust" => return Ok(HostKeyPolicy::AutoTrust),
            _ => {}
        }

        let Some(list) = s.strip_prefix("pinned:") else {
            return Err(ConfigError::invalid(
                "host_key_policy",
                format!("unknown policy '{s}' (expected reject-unknown, auto-trust or pinned:<fp>)"),
            ));
        };

        let pins = list
            .split(',')
            .map(str::trim)
            .filter(|fp| !fp.is_empty())
            .map(|fp| {
                Fingerprint::from_str(fp).map_err(|e| {
                    ConfigError::invalid("host_key_policy", format!("bad fingerprint '{fp}': {e}"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        if pins.is_empty() {
            return Err(ConfigError::invalid(
                "host_key_policy",
                "pinned policy needs at least one fingerprint",
            ));
        }

        Ok(HostKeyPolicy::PinnedKey(pins))
    }
}

/// SSH connection configuration.
#[derive(Debug, Clone)]
pub struct SshConfig {
    /// Target host (hostname or IP address).
    pub host: String,

    /// SSH port (default: 22).
    pub port: u16,

    /// Username for authentication.
    pub username: String,

    /// Authentication method.
    pub auth: AuthMethod,

    /// Bound on handshake plus authentication.
    pub timeout: Duration,

    /// Drop the session after this long without traffic; `None` never does.
    ///
    /// Must be longer than any single exec or prompt wait run on the session.
    pub inactivity_timeout: Option<Duration>,

    /// Terminal width for PTY.
    pub terminal_width: u32,

    /// Terminal height for PTY.
    pub terminal_height: u32,

    /// Host key verification policy.
    pub host_key_policy: HostKeyPolicy,

    /// Path to known_hosts file.
    pub known_hosts_path: Option<PathBuf>,
}

impl SshConfig {
    /// Create a config with password authentication and default settings.
    pub fn new(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        let password: String = password.into();
        Self {
            host: host.into(),
            port: 22,
            username: username.into(),
            auth: AuthMethod::Password(SecretString::from(password)),
            timeout: Duration::from_secs(30),
            inactivity_timeout: None,
            terminal_width: 511,
            terminal_height: 24,
            host_key_policy: HostKeyPolicy::default(),
            known_hosts_path: None,
        }
    }

    /// Get the socket address for connection.
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Authentication method for SSH connections.
#[derive(Debug, Clone)]
pub enum AuthMethod {
    /// Password authentication.
    Password(SecretString),

    /// Private key authentication.
    PrivateKey {
        /// Path to the private key file.
        path: PathBuf,
        /// Optional passphrase for encrypted keys.
        passphrase: Option<SecretString>,
    },
}
