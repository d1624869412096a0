//! Prompt-driven reads over an interactive shell.

use std::time::Duration;

use log::{debug, trace};
use regex::bytes::Regex;
use tokio::time::Instant;

use super::buffer::PatternBuffer;
use crate::error::{ChannelError, Error, Result};
use crate::transport::InteractiveShell;

/// Largest chunk requested from the shell in one read.
const READ_CHUNK: usize = 4096;

/// An interactive shell that treats the reappearance of the device prompt as
/// the acknowledgement of whatever was sent last.
pub struct PromptChannel<S> {
    shell: S,
    buffer: PatternBuffer,
    prompt: Regex,
}

impl<S: InteractiveShell> PromptChannel<S> {
    /// Wrap `shell`, detecting readiness with `prompt`.
    pub fn new(shell: S, prompt: Regex) -> Self {
        Self {
            shell,
            buffer: PatternBuffer::default(),
            prompt,
        }
    }

    /// Read until the prompt shows up in the tail of the output.
    ///
    /// Returns everything read, ANSI-stripped, including the prompt.
    pub async fn wait_for_prompt(&mut self, timeout: Duration) -> Result<Vec<u8>> {
        let deadline = Instant::now() + timeout;

        while !self.buffer.tail_contains(&self.prompt) {
            match tokio::time::timeout_at(deadline, self.shell.receive(READ_CHUNK)).await {
                Err(_) => return Err(ChannelError::PromptTimeout(timeout).into()),
                Ok(Ok(Some(chunk))) => {
                    trace!("shell chunk: {} bytes", chunk.len());
                    self.buffer.extend(&chunk);
                }
                Ok(Ok(None)) => return Err(ChannelError::Closed.into()),
                Ok(Err(e)) => return Err(e),
            }
        }

        Ok(self.buffer.take())
    }

    /// Send one command line and wait for the prompt that acknowledges it.
    pub async fn send_command(&mut self, command: &str, timeout: Duration) -> Result<Vec<u8>> {
        self.send_line(command).await?;
        self.wait_for_ack(command, timeout).await
    }

    /// Write `command` and a newline, discarding anything read so far.
    pub async fn send_line(&mut self, command: &str) -> Result<()> {
        self.buffer.clear();
        self.shell.send(&format!("{command}\n")).await
    }

    /// Wait for the prompt following `command`.
    ///
    /// Running out of time is a [`ChannelError::TransmissionTimeout`] naming
    /// the command.
    pub async fn wait_for_ack(&mut self, command: &str, timeout: Duration) -> Result<Vec<u8>> {
        self.wait_for_prompt(timeout).await.map_err(|e| match e {
            Error::Channel(ChannelError::PromptTimeout(timeout)) => {
                ChannelError::TransmissionTimeout {
                    command: command.to_string(),
                    timeout,
                }
                .into()
            }
            other => other,
        })
    }

    /// Read and discard pending output.
    ///
    /// Stops after `limit` bytes, when the shell closes, or when nothing
    /// arrives for `idle`. Returns the number of bytes discarded.
    pub async fn drain(&mut self, limit: usize, idle: Duration) -> Result<usize> {
        let mut drained = self.buffer.take().len().min(limit);

        while drained < limit {
            match tokio::time::timeout(idle, self.shell.receive(limit - drained)).await {
                Err(_) | Ok(Ok(None)) => break,
                Ok(Ok(Some(chunk))) => drained += chunk.len(),
                Ok(Err(e)) => return Err(e),
            }
        }

        debug!("drained {} bytes", drained);
        Ok(drained)
    }

    /// Close the underlying shell.
    pub async fn close(self) -> Result<()> {
        self.shell.close().await
    }
}
