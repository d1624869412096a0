//! Run configuration.
//!
//! A run is configured in layers: built-in defaults, then an optional JSON
//! file named by `NETHARDEN_CONFIG`, then one environment variable per field.
//! The merged result is validated before anything touches the network.

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use log::debug;
use regex::bytes::Regex;
use secrecy::SecretString;
use serde::Deserialize;

use crate::channel::{IOS_PROMPT_PATTERN, compile_prompt_pattern};
use crate::error::ConfigError;
use crate::transport::{AuthMethod, HostKeyPolicy, SshConfig};

/// Environment variable naming an optional JSON config file.
pub const CONFIG_FILE_VAR: &str = "NETHARDEN_CONFIG";

const DEFAULT_DEVICE_ADDRESS: &str = "192.168.56.101";
const DEFAULT_USERNAME: &str = "cisco";
const DEFAULT_PASSWORD: &str = "cisco123!";
const DEFAULT_GUIDELINES_PATH: &str = "cisco_hardening_guidelines.txt";
const DEFAULT_SYSLOG_SERVER: &str = "192.168.1.100";

/// Everything one audit run needs.
#[derive(Debug, Clone)]
pub struct AuditConfig {
    /// Device hostname or IP address.
    pub device_address: String,

    /// SSH port on the device.
    pub port: u16,

    /// Login username.
    pub username: String,

    /// Login password. Unused when `private_key` is set.
    pub password: SecretString,

    /// Private key to authenticate with instead of the password.
    pub private_key: Option<PathBuf>,

    /// Hardening guidelines file.
    pub guidelines_path: PathBuf,

    /// Address the device should send syslog to.
    pub syslog_server: String,

    /// How to verify the device's host key.
    pub host_key_policy: HostKeyPolicy,

    /// known_hosts file; `~/.ssh/known_hosts` when unset.
    pub known_hosts_path: Option<PathBuf>,

    /// Regex matching the device prompt in the interactive shell.
    pub prompt_pattern: String,

    /// Bound on TCP connect plus SSH handshake.
    pub connect_timeout: Duration,

    /// Bound on collecting `show running-config`.
    pub exec_timeout: Duration,

    /// Bound on each command's prompt acknowledgement.
    pub command_timeout: Duration,

    /// Most bytes discarded after the command sequence.
    pub drain_limit: usize,

    /// Drain stops after this long without output.
    pub drain_idle: Duration,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            device_address: DEFAULT_DEVICE_ADDRESS.to_string(),
            port: 22,
            username: DEFAULT_USERNAME.to_string(),
            password: SecretString::from(DEFAULT_PASSWORD.to_string()),
            private_key: None,
            guidelines_path: PathBuf::from(DEFAULT_GUIDELINES_PATH),
            syslog_server: DEFAULT_SYSLOG_SERVER.to_string(),
            host_key_policy: HostKeyPolicy::default(),
            known_hosts_path: None,
            prompt_pattern: IOS_PROMPT_PATTERN.to_string(),
            connect_timeout: Duration::from_secs(30),
            exec_timeout: Duration::from_secs(60),
            command_timeout: Duration::from_secs(10),
            drain_limit: 1000,
            drain_idle: Duration::from_millis(500),
        }
    }
}

/// On-disk shape of the config file. Every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    device_address: Option<String>,
    port: Option<u16>,
    username: Option<String>,
    password: Option<String>,
    private_key: Option<PathBuf>,
    guidelines_path: Option<PathBuf>,
    syslog_server: Option<String>,
    host_key_policy: Option<String>,
    known_hosts_path: Option<PathBuf>,
    prompt_pattern: Option<String>,
    connect_timeout_secs: Option<u64>,
    exec_timeout_secs: Option<u64>,
    command_timeout_secs: Option<u64>,
    drain_limit: Option<usize>,
    drain_idle_ms: Option<u64>,
}

impl AuditConfig {
    /// Resolve defaults, the optional config file and environment overrides,
    /// then validate.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(path) = std::env::var(CONFIG_FILE_VAR) {
            config.merge_file(Path::new(&path))?;
        }

        config.apply_overrides(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay the fields present in a JSON config file.
    pub fn merge_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::File {
            path: path.to_path_buf(),
            source,
        })?;
        let file: ConfigFile =
            serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        debug!("loaded config file {}", path.display());
        self.merge(file)
    }

    fn merge(&mut self, file: ConfigFile) -> Result<(), ConfigError> {
        if let Some(v) = file.device_address {
            self.device_address = v;
        }
        if let Some(v) = file.port {
            self.port = v;
        }
        if let Some(v) = file.username {
            self.username = v;
        }
        if let Some(v) = file.password {
            self.password = SecretString::from(v);
        }
        if let Some(v) = file.private_key {
            self.private_key = Some(v);
        }
        if let Some(v) = file.guidelines_path {
            self.guidelines_path = v;
        }
        if let Some(v) = file.syslog_server {
            self.syslog_server = v;
        }
        if let Some(v) = file.host_key_policy {
            self.host_key_policy = v.parse()?;
        }
        if let Some(v) = file.known_hosts_path {
            self.known_hosts_path = Some(v);
        }
        if let Some(v) = file.prompt_pattern {
            self.prompt_pattern = v;
        }
        if let Some(v) = file.connect_timeout_secs {
            self.connect_timeout = Duration::from_secs(v);
        }
        if let Some(v) = file.exec_timeout_secs {
            self.exec_timeout = Duration::from_secs(v);
        }
        if let Some(v) = file.command_timeout_secs {
            self.command_timeout = Duration::from_secs(v);
        }
        if let Some(v) = file.drain_limit {
            self.drain_limit = v;
        }
        if let Some(v) = file.drain_idle_ms {
            self.drain_idle = Duration::from_millis(v);
        }
        Ok(())
    }

    /// Apply `NETHARDEN_*` overrides, looking each variable up with `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("NETHARDEN_DEVICE_ADDRESS") {
            self.device_address = v;
        }
        if let Some(v) = lookup("NETHARDEN_PORT") {
            self.port = parse_field("port", &v)?;
        }
        if let Some(v) = lookup("NETHARDEN_USERNAME") {
            self.username = v;
        }
        if let Some(v) = lookup("NETHARDEN_PASSWORD") {
            self.password = SecretString::from(v);
        }
        if let Some(v) = lookup("NETHARDEN_PRIVATE_KEY") {
            self.private_key = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("NETHARDEN_GUIDELINES_PATH") {
            self.guidelines_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("NETHARDEN_SYSLOG_SERVER") {
            self.syslog_server = v;
        }
        if let Some(v) = lookup("NETHARDEN_HOST_KEY_POLICY") {
            self.host_key_policy = v.parse()?;
        }
        if let Some(v) = lookup("NETHARDEN_KNOWN_HOSTS") {
            self.known_hosts_path = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("NETHARDEN_PROMPT_PATTERN") {
            self.prompt_pattern = v;
        }
        if let Some(v) = lookup("NETHARDEN_CONNECT_TIMEOUT_SECS") {
            self.connect_timeout = Duration::from_secs(parse_field("connect_timeout", &v)?);
        }
        if let Some(v) = lookup("NETHARDEN_EXEC_TIMEOUT_SECS") {
            self.exec_timeout = Duration::from_secs(parse_field("exec_timeout", &v)?);
        }
        if let Some(v) = lookup("NETHARDEN_COMMAND_TIMEOUT_SECS") {
            self.command_timeout = Duration::from_secs(parse_field("command_timeout", &v)?);
        }
        Ok(())
    }

    /// Check every field before use.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_token("device_address", &self.device_address)?;
        require_token("username", &self.username)?;
        require_token("syslog_server", &self.syslog_server)?;

        if self.guidelines_path.as_os_str().is_empty() {
            return Err(ConfigError::invalid("guidelines_path", "must not be empty"));
        }
        if self.port == 0 {
            return Err(ConfigError::invalid("port", "must not be 0"));
        }

        for (field, timeout) in [
            ("connect_timeout", self.connect_timeout),
            ("exec_timeout", self.exec_timeout),
            ("command_timeout", self.command_timeout),
            ("drain_idle", self.drain_idle),
        ] {
            if timeout.is_zero() {
                return Err(ConfigError::invalid(field, "must be greater than zero"));
            }
        }

        if let HostKeyPolicy::PinnedKey(pins) = &self.host_key_policy {
            if pins.is_empty() {
                return Err(ConfigError::invalid(
                    "host_key_policy",
                    "pinned policy needs at least one fingerprint",
                ));
            }
        }

        self.prompt_regex()?;
        Ok(())
    }

    /// Compile the configured prompt pattern.
    pub fn prompt_regex(&self) -> Result<Regex, ConfigError> {
        compile_prompt_pattern(&self.prompt_pattern)
            .map_err(|e| ConfigError::invalid("prompt_pattern", e.to_string()))
    }

    /// Idle limit for a session: the longest single wait plus the drain idle.
    fn inactivity_timeout(&self) -> Duration {
        self.exec_timeout.max(self.command_timeout) + self.drain_idle
    }

    /// Transport settings for connecting to the device.
    pub fn ssh_config(&self) -> SshConfig {
        let auth = match &self.private_key {
            Some(path) => AuthMethod::PrivateKey {
                path: path.clone(),
                passphrase: None,
            },
            None => AuthMethod::Password(self.password.clone()),
        };

        SshConfig {
            host: self.device_address.clone(),
            port: self.port,
            username: self.username.clone(),
            auth,
            timeout: self.connect_timeout,
            inactivity_timeout: Some(self.inactivity_timeout()),
            terminal_width: 511,
            terminal_height: 24,
            host_key_policy: self.host_key_policy.clone(),
            known_hosts_path: self.known_hosts_path.clone(),
        }
    }
}

fn parse_field<T: FromStr>(field: &'static str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::invalid(field, format!("cannot parse '{value}'")))
}

fn require_token(field: &'static str, value: &str) -> Result<(), ConfigError> {
    if value.is_empty() {
        return Err(ConfigError::invalid(field, "must not be empty"));
    }
    if value.chars().any(char::is_whitespace) {
        return Err(ConfigError::invalid(field, "must not contain whitespace"));
    }
    Ok(())
}
