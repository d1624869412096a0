//! Channel layer for prompt detection over interactive shells.
//!
//! This module turns a raw [`InteractiveShell`](crate::transport::InteractiveShell)
//! into a command/acknowledgement exchange: output is ANSI-stripped into a
//! [`PatternBuffer`] and a command counts as accepted once the device prompt
//! reappears.

mod buffer;
pub mod patterns;
mod prompt;

pub use buffer::PatternBuffer;
pub use patterns::{IOS_PROMPT_PATTERN, compile_prompt_pattern};
pub use prompt::PromptChannel;
