//! Scripted in-memory device used by unit tests.
//!
//! The shell behaves like a small IOS box: it echoes each line, tracks
//! whether it is in configuration mode and answers with the matching prompt.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use super::config::SshConfig;
use super::{Connector, InteractiveShell, RemoteSession};
use crate::error::{ChannelError, Result, TransportError};

/// Everything the mock observed, shared between the test and the sessions.
#[derive(Debug, Default)]
pub(crate) struct MockLog {
    pub connects: usize,
    pub executed: Vec<String>,
    pub sent: Vec<String>,
    pub shells_closed: usize,
    pub sessions_closed: usize,
}

#[derive(Debug, Clone)]
pub(crate) struct MockDevice {
    /// Refuse every connection.
    pub refuse: bool,
    /// Output of `execute`; `None` makes exec fail.
    pub exec_output: Option<Vec<u8>>,
    /// Written as soon as the shell opens.
    pub banner: Vec<u8>,
    /// Stop answering after this many sent lines.
    pub answer_limit: Option<usize>,
    /// Extra output queued after the reply to `write memory`.
    pub trailing: Vec<u8>,
    pub log: Arc<Mutex<MockLog>>,
}

impl Default for MockDevice {
    fn default() -> Self {
        Self {
            refuse: false,
            exec_output: Some(Vec::new()),
            banner: b"\r\nrouter#".to_vec(),
            answer_limit: None,
            trailing: Vec::new(),
            log: Arc::default(),
        }
    }
}

impl MockDevice {
    pub fn with_running_config(config: &str) -> Self {
        Self {
            exec_output: Some(config.as_bytes().to_vec()),
            ..Self::default()
        }
    }

    pub fn refusing() -> Self {
        Self {
            refuse: true,
            ..Self::default()
        }
    }

    pub fn log(&self) -> MutexGuard<'_, MockLog> {
        self.log.lock().unwrap()
    }
}

impl Connector for MockDevice {
    type Session = MockSession;

    async fn connect(&self, config: &SshConfig) -> Result<MockSession> {
        if self.refuse {
            return Err(TransportError::ConnectionFailed {
                host: config.host.clone(),
                port: config.port,
                source: io::Error::from(io::ErrorKind::ConnectionRefused),
            }
            .into());
        }
        self.log().connects += 1;
        Ok(MockSession {
            device: self.clone(),
        })
    }
}

pub(crate) struct MockSession {
    device: MockDevice,
}

impl RemoteSession for MockSession {
    type Shell = MockShell;

    async fn execute(&mut self, command: &str, _timeout: Duration) -> Result<Vec<u8>> {
        self.device.log().executed.push(command.to_string());
        match &self.device.exec_output {
            Some(output) => Ok(output.clone()),
            None => Err(ChannelError::ExecFailed {
                command: command.to_string(),
            }
            .into()),
        }
    }

    async fn open_shell(&mut self) -> Result<MockShell> {
        let mut queue = VecDeque::new();
        if !self.device.banner.is_empty() {
            queue.push_back(self.device.banner.clone());
        }
        Ok(MockShell {
            device: self.device.clone(),
            queue,
            in_config: false,
        })
    }

    async fn close(self) -> Result<()> {
        self.device.log().sessions_closed += 1;
        Ok(())
    }
}

pub(crate) struct MockShell {
    device: MockDevice,
    queue: VecDeque<Vec<u8>>,
    in_config: bool,
}

impl MockShell {
    fn reply(&mut self, line: &str) -> String {
        let mut out = format!("{line}\r\n");
        match line {
            "configure terminal" => {
                self.in_config = true;
                out.push_str("Enter configuration commands, one per line.  End with CNTL/Z.\r\n");
            }
            "end" => self.in_config = false,
            "write memory" => out.push_str("Building configuration...\r\n[OK]\r\n"),
            _ => {}
        }
        out.push_str(if self.in_config {
            "router(config)#"
        } else {
            "router#"
        });
        out
    }
}

impl InteractiveShell for MockShell {
    async fn send(&mut self, text: &str) -> Result<()> {
        let line = text.trim_end_matches(['\r', '\n']).to_string();
        let answered = {
            let mut log = self.device.log();
            log.sent.push(line.clone());
            self.device
                .answer_limit
                .is_none_or(|limit| log.sent.len() <= limit)
        };

        if answered {
            let reply = self.reply(&line);
            self.queue.push_back(reply.into_bytes());
            if line == "write memory" && !self.device.trailing.is_empty() {
                self.queue.push_back(self.device.trailing.clone());
            }
        }
        Ok(())
    }

    async fn receive(&mut self, max_bytes: usize) -> Result<Option<Vec<u8>>> {
        let Some(front) = self.queue.front_mut() else {
            // A silent device: never produce anything.
            return std::future::pending().await;
        };

        let n = max_bytes.min(front.len());
        let chunk: Vec<u8> = front.drain(..n).collect();
        if front.is_empty() {
            self.queue.pop_front();
        }
        Ok(Some(chunk))
    }

    async fn close(self) -> Result<()> {
        self.device.log().shells_closed += 1;
        Ok(())
    }
}
