//! SSH transport implementation using russh.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::BytesMut;
use log::{debug, info, trace, warn};
use russh::client::{self, Handle, Msg};
use russh::keys::{HashAlg, PrivateKeyWithHashAlg, PublicKey, load_secret_key};
use russh::{Channel, ChannelMsg, Disconnect};
use secrecy::ExposeSecret;

use super::config::{AuthMethod, HostKeyPolicy, SshConfig};
use super::{Connector, InteractiveShell, RemoteSession};
use crate::error::{ChannelError, Result, TransportError};

/// [`Connector`] that opens real SSH sessions.
#[derive(Debug, Clone, Copy, Default)]
pub struct SshConnector;

impl Connector for SshConnector {
    type Session = SshTransport;

    async fn connect(&self, config: &SshConfig) -> Result<SshTransport> {
        SshTransport::connect(config.clone()).await
    }
}

/// SSH transport wrapping russh client.
pub struct SshTransport {
    /// The russh session handle.
    session: Handle<SshHandler>,

    /// Configuration used for this connection.
    config: SshConfig,
}

impl SshTransport {
    /// Connect to the SSH server and authenticate.
    ///
    /// `config.timeout` bounds the handshake and authentication together.
    pub async fn connect(config: SshConfig) -> Result<Self> {
        info!("connecting to {}", config.socket_addr());

        let session = tokio::time::timeout(config.timeout, Self::establish(&config))
            .await
            .map_err(|_| TransportError::Timeout(config.timeout))??;

        info!("authenticated to {} as {}", config.socket_addr(), config.username);
        Ok(Self { session, config })
    }

    /// Handshake, verify the host key and authenticate.
    async fn establish(config: &SshConfig) -> Result<Handle<SshHandler>> {
        let ssh_config = Arc::new(client::Config {
            inactivity_timeout: config.inactivity_timeout,
            ..Default::default()
        });

        let host_key_error: Arc<Mutex<Option<TransportError>>> = Arc::new(Mutex::new(None));
        let handler = SshHandler::new(config, host_key_error.clone());

        let mut session =
            client::connect(ssh_config, (config.host.as_str(), config.port), handler)
                .await
                .map_err(|e| {
                    // Prefer the detailed host-key error over russh's generic one
                    let stored = host_key_error.lock().ok().and_then(|mut slot| slot.take());
                    match (stored, e) {
                        (Some(hk_err), _) => hk_err,
                        (None, russh::Error::IO(source)) => TransportError::ConnectionFailed {
                            host: config.host.clone(),
                            port: config.port,
                            source,
                        },
                        (None, e) => TransportError::Ssh(e),
                    }
                })?;

        Self::authenticate(&mut session, config).await?;
        Ok(session)
    }

    /// Run a single command on a fresh exec channel and collect its stdout.
    pub async fn exec(&self, command: &str, timeout: Duration) -> Result<Vec<u8>> {
        let mut channel = self
            .session
            .channel_open_session()
            .await
            .map_err(TransportError::Ssh)?;

        channel.exec(true, command).await.map_err(|e| {
            debug!("exec of {:?} failed: {}", command, e);
            ChannelError::ExecFailed {
                command: command.to_string(),
            }
        })?;

        let collected =
            tokio::time::timeout(timeout, collect_exec_output(&mut channel, command)).await;

        if let Err(e) = channel.close().await {
            debug!("exec channel close: {}", e);
        }

        collected.map_err(|_| ChannelError::TransmissionTimeout {
            command: command.to_string(),
            timeout,
        })?
    }

    /// Open a new PTY channel with a shell on this connection.
    pub async fn open_channel(&self) -> Result<Channel<Msg>> {
        let channel = self
            .session
            .channel_open_session()
            .await
            .map_err(TransportError::Ssh)?;

        channel
            .request_pty(
                true,
                "xterm",
                self.config.terminal_width,
                self.config.terminal_height,
                0,
                0,
                &[],
            )
            .await
            .map_err(|e| {
                debug!("pty request failed: {}", e);
                ChannelError::PtyOpenFailed
            })?;

        channel.request_shell(true).await.map_err(|e| {
            debug!("shell request failed: {}", e);
            ChannelError::ShellRequestFailed
        })?;

        Ok(channel)
    }

    /// Authenticate with the server.
    async fn authenticate(session: &mut Handle<SshHandler>, config: &SshConfig) -> Result<()> {
        let success = match &config.auth {
            AuthMethod::Password(password) => session
                .authenticate_password(&config.username, password.expose_secret())
                .await
                .map_err(TransportError::Ssh)?
                .success(),
            AuthMethod::PrivateKey { path, passphrase } => {
                let key = load_secret_key(path, passphrase.as_ref().map(|p| p.expose_secret()))
                    .map_err(|e| TransportError::Key(e.to_string()))?;

                // Get the best RSA hash algorithm supported by the server
                let hash_alg = session
                    .best_supported_rsa_hash()
                    .await
                    .map_err(TransportError::Ssh)?
                    .flatten();

                session
                    .authenticate_publickey(
                        &config.username,
                        PrivateKeyWithHashAlg::new(Arc::new(key), hash_alg),
                    )
                    .await
                    .map_err(TransportError::Ssh)?
                    .success()
            }
        };

        if !success {
            return Err(TransportError::AuthenticationFailed {
                user: config.username.clone(),
            }
            .into());
        }

        Ok(())
    }

    /// Close the connection.
    pub async fn close(self) -> Result<()> {
        self.session
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
            .map_err(TransportError::Ssh)?;
        info!("disconnected from {}", self.config.socket_addr());
        Ok(())
    }
}

impl RemoteSession for SshTransport {
    type Shell = SshShell;

    async fn execute(&mut self, command: &str, timeout: Duration) -> Result<Vec<u8>> {
        self.exec(command, timeout).await
    }

    async fn open_shell(&mut self) -> Result<SshShell> {
        let channel = self.open_channel().await?;
        Ok(SshShell {
            channel,
            pending: BytesMut::new(),
        })
    }

    async fn close(self) -> Result<()> {
        SshTransport::close(self).await
    }
}

/// Yields channel messages one at a time.
trait MessageSource {
    fn next_message(&mut self) -> impl Future<Output = Option<ChannelMsg>> + Send;
}

impl MessageSource for Channel<Msg> {
    async fn next_message(&mut self) -> Option<ChannelMsg> {
        self.wait().await
    }
}

/// Collect stdout of an exec request until the server sends EOF or closes
/// the channel.
///
/// Running out of messages before that means the session went away
/// mid-command, so the partial output is discarded.
async fn collect_exec_output<M: MessageSource>(source: &mut M, command: &str) -> Result<Vec<u8>> {
    let mut stdout = Vec::new();

    while let Some(msg) = source.next_message().await {
        match msg {
            ChannelMsg::Data { ref data } => {
                trace!("exec stdout: {} bytes", data.len());
                stdout.extend_from_slice(data);
            }
            ChannelMsg::ExtendedData { ref data, .. } => {
                debug!("exec stderr: {}", String::from_utf8_lossy(data));
            }
            ChannelMsg::ExitStatus { exit_status } => {
                debug!("{:?} exited with status {}", command, exit_status);
            }
            ChannelMsg::Eof | ChannelMsg::Close => return Ok(stdout),
            _ => {}
        }
    }

    warn!(
        "session ended before {:?} finished, discarding {} bytes",
        command,
        stdout.len()
    );
    Err(ChannelError::Closed.into())
}

/// Interactive shell over a russh PTY channel.
pub struct SshShell {
    channel: Channel<Msg>,

    /// Data received but not yet handed out because of `max_bytes`.
    pending: BytesMut,
}

impl InteractiveShell for SshShell {
    async fn send(&mut self, text: &str) -> Result<()> {
        self.channel
            .data(text.as_bytes())
            .await
            .map_err(ChannelError::Ssh)?;
        Ok(())
    }

    async fn receive(&mut self, max_bytes: usize) -> Result<Option<Vec<u8>>> {
        while self.pending.is_empty() {
            match self.channel.wait().await {
                Some(ChannelMsg::Data { ref data }) => self.pending.extend_from_slice(data),
                Some(ChannelMsg::ExtendedData { ref data, .. }) => {
                    self.pending.extend_from_slice(data)
                }
                Some(ChannelMsg::Eof) | Some(ChannelMsg::Close) | None => return Ok(None),
                Some(_) => {}
            }
        }

        let n = max_bytes.min(self.pending.len());
        Ok(Some(self.pending.split_to(n).to_vec()))
    }

    async fn close(self) -> Result<()> {
        self.channel.close().await.map_err(ChannelError::Ssh)?;
        Ok(())
    }
}

/// SSH client handler for russh.
struct SshHandler {
    host: String,
    port: u16,
    policy: HostKeyPolicy,
    known_hosts_path: Option<PathBuf>,
    /// Stores a detailed host-key error so connect() can surface it
    /// instead of the generic russh::Error::UnknownKey.
    host_key_error: Arc<Mutex<Option<TransportError>>>,
}

impl SshHandler {
    fn new(config: &SshConfig, host_key_error: Arc<Mutex<Option<TransportError>>>) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            policy: config.host_key_policy.clone(),
            known_hosts_path: config.known_hosts_path.clone(),
            host_key_error,
        }
    }

    /// Check the host key against known_hosts.
    ///
    /// Returns `Ok(true)` if matched, `Ok(false)` if host not found,
    /// `Err(TransportError::HostKeyChanged)` if key changed.
    fn check_known_hosts(&self, pubkey: &PublicKey) -> std::result::Result<bool, TransportError> {
        let result = if let Some(ref path) = self.known_hosts_path {
            russh::keys::check_known_hosts_path(&self.host, self.port, pubkey, path)
        } else {
            russh::keys::check_known_hosts(&self.host, self.port, pubkey)
        };

        match result {
            Ok(matched) => Ok(matched),
            Err(russh::keys::Error::KeyChanged { line }) => Err(TransportError::HostKeyChanged {
                host: self.host.clone(),
                port: self.port,
                line,
            }),
            Err(e) => Err(TransportError::KnownHosts(e.to_string())),
        }
    }

    /// Save a new host key to known_hosts.
    fn learn_host_key(&self, pubkey: &PublicKey) -> std::result::Result<(), TransportError> {
        let result = if let Some(ref path) = self.known_hosts_path {
            russh::keys::known_hosts::learn_known_hosts_path(&self.host, self.port, pubkey, path)
        } else {
            russh::keys::known_hosts::learn_known_hosts(&self.host, self.port, pubkey)
        };

        result.map_err(|e| TransportError::KnownHosts(e.to_string()))
    }

    /// Record why the key was rejected and reject it.
    fn reject(&self, error: TransportError) -> bool {
        warn!("rejecting host key: {}", error);
        if let Ok(mut slot) = self.host_key_error.lock() {
            *slot = Some(error);
        }
        false
    }

    fn verify(&self, pubkey: &PublicKey) -> bool {
        match &self.policy {
            HostKeyPolicy::PinnedKey(_) => {
                let fingerprint = pubkey.fingerprint(HashAlg::Sha256).to_string();
                if self.policy.is_pinned(&fingerprint) {
                    true
                } else {
                    self.reject(TransportError::HostKeyNotPinned {
                        host: self.host.clone(),
                        fingerprint,
                    })
                }
            }

            HostKeyPolicy::AutoTrust => match self.check_known_hosts(pubkey) {
                Ok(true) => true,
                Ok(false) => {
                    info!("learning new host key for {}:{}", self.host, self.port);
                    if let Err(e) = self.learn_host_key(pubkey) {
                        warn!("Failed to save host key: {}", e);
                    }
                    true
                }
                Err(e) => self.reject(e),
            },

            HostKeyPolicy::RejectUnknown => match self.check_known_hosts(pubkey) {
                Ok(true) => true,
                Ok(false) => self.reject(TransportError::HostKeyUnknown {
                    host: self.host.clone(),
                    port: self.port,
                }),
                Err(e) => self.reject(e),
            },
        }
    }
}

impl client::Handler for SshHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        Ok(self.verify(server_public_key))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use russh::CryptoVec;

    use super::*;
    use crate::error::{Error, ErrorKind};

    const ROUTER_KEY: &str =
        "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIE5oaXAnbihV6raCAYzbrElJJ8wyGB1rl1qDkMfrpdbn";
    const ROUTER_FP: &str = "SHA256:iq1u8J7mTfSr8tluRDMlS3iuFkdCh7WVulNlnuFny3Y";
    const OTHER_KEY: &str =
        "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIAvkHVhSL4ez/ZBZBTRBYEvDaGPedbi/YyFLfnnGDMYj";
    const OTHER_FP: &str = "SHA256:lfcg1ysohI23G5y9ppOXK2AglDK8iNa3ps4wknjdc5k";

    impl MessageSource for VecDeque<ChannelMsg> {
        async fn next_message(&mut self) -> Option<ChannelMsg> {
            self.pop_front()
        }
    }

    fn key(openssh: &str) -> PublicKey {
        PublicKey::from_openssh(openssh).unwrap()
    }

    fn handler(policy: HostKeyPolicy, known_hosts: PathBuf) -> SshHandler {
        let mut config = SshConfig::new("192.168.56.101", "cisco", "cisco123!");
        config.host_key_policy = policy;
        config.known_hosts_path = Some(known_hosts);
        SshHandler::new(&config, Arc::new(Mutex::new(None)))
    }

    fn rejection(handler: &SshHandler) -> Option<TransportError> {
        handler.host_key_error.lock().unwrap().take()
    }

    #[test]
    fn test_pinned_key_matches_presented_fingerprint() {
        let dir = tempfile::tempdir().unwrap();
        let policy: HostKeyPolicy = format!("pinned:{OTHER_FP}, {ROUTER_FP}").parse().unwrap();
        let handler = handler(policy, dir.path().join("known_hosts"));

        assert!(handler.verify(&key(ROUTER_KEY)));
        assert!(rejection(&handler).is_none());
        // Pinning never touches known_hosts
        assert!(!dir.path().join("known_hosts").exists());
    }

    #[test]
    fn test_pinned_key_rejects_other_key() {
        let dir = tempfile::tempdir().unwrap();
        let policy: HostKeyPolicy = format!("pinned:{OTHER_FP}").parse().unwrap();
        let handler = handler(policy, dir.path().join("known_hosts"));

        assert!(!handler.verify(&key(ROUTER_KEY)));
        match rejection(&handler) {
            Some(TransportError::HostKeyNotPinned { fingerprint, .. }) => {
                assert_eq!(fingerprint, ROUTER_FP)
            }
            other => panic!("unexpected rejection: {other:?}"),
        }
    }

    #[test]
    fn test_reject_unknown_host() {
        let dir = tempfile::tempdir().unwrap();
        let handler = handler(HostKeyPolicy::RejectUnknown, dir.path().join("known_hosts"));

        assert!(!handler.verify(&key(ROUTER_KEY)));
        assert!(matches!(
            rejection(&handler),
            Some(TransportError::HostKeyUnknown { port: 22, .. })
        ));
    }

    #[test]
    fn test_auto_trust_learns_key() {
        let dir = tempfile::tempdir().unwrap();
        let known_hosts = dir.path().join("known_hosts");

        let learner = handler(HostKeyPolicy::AutoTrust, known_hosts.clone());
        assert!(learner.verify(&key(ROUTER_KEY)));
        assert!(rejection(&learner).is_none());

        let contents = std::fs::read_to_string(&known_hosts).unwrap();
        assert!(contents.contains("192.168.56.101 ssh-ed25519 "));

        // A strict policy now accepts the learned key
        let strict = handler(HostKeyPolicy::RejectUnknown, known_hosts);
        assert!(strict.verify(&key(ROUTER_KEY)));
        assert!(rejection(&strict).is_none());
    }

    #[test]
    fn test_changed_key_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let known_hosts = dir.path().join("known_hosts");

        let learner = handler(HostKeyPolicy::AutoTrust, known_hosts.clone());
        assert!(learner.verify(&key(ROUTER_KEY)));

        for policy in [HostKeyPolicy::AutoTrust, HostKeyPolicy::RejectUnknown] {
            let handler = handler(policy, known_hosts.clone());
            assert!(!handler.verify(&key(OTHER_KEY)));
            assert!(matches!(
                rejection(&handler),
                Some(TransportError::HostKeyChanged { line: 2, .. })
            ));
        }
    }

    #[tokio::test]
    async fn test_exec_output_collected_until_eof() {
        let mut messages = VecDeque::from([
            ChannelMsg::Data {
                data: CryptoVec::from_slice(b"hostname R1\n"),
            },
            ChannelMsg::ExitStatus { exit_status: 0 },
            ChannelMsg::Eof,
            ChannelMsg::Data {
                data: CryptoVec::from_slice(b"late\n"),
            },
        ]);

        let stdout = collect_exec_output(&mut messages, "show running-config")
            .await
            .unwrap();
        assert_eq!(stdout, b"hostname R1\n");
    }

    #[tokio::test]
    async fn test_exec_output_cut_off_is_error() {
        let mut messages = VecDeque::from([ChannelMsg::Data {
            data: CryptoVec::from_slice(b"hostname R1\nservice pass"),
        }]);

        let err = collect_exec_output(&mut messages, "show running-config")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Channel(ChannelError::Closed)));
        assert_eq!(err.kind(), ErrorKind::Transmission);
    }

    #[tokio::test]
    async fn test_refused_port_is_connection_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let mut config = SshConfig::new("127.0.0.1", "cisco", "cisco123!");
        config.port = port;
        config.timeout = Duration::from_secs(5);

        let err = SshConnector.connect(&config).await.err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Connection);
    }

    #[tokio::test]
    async fn test_silent_server_hits_connect_timeout() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            std::future::pending::<()>().await;
        });

        let mut config = SshConfig::new("127.0.0.1", "cisco", "cisco123!");
        config.port = port;
        config.timeout = Duration::from_millis(200);

        let err = SshConnector.connect(&config).await.err().unwrap();
        assert!(matches!(err, Error::Transport(TransportError::Timeout(_))));
        server.abort();
    }
}
