//! Session tunables.

use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Default bound of the reader-to-dispatch hand-off channel.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Default ceiling on bytes buffered without completing a value (16 MiB).
pub const DEFAULT_MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

/// What the frame assembler does with a decode failure that is not end-of-input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecodePolicy {
    /// Keep waiting for more bytes on every failure.
    #[default]
    Lenient,
    /// Report syntax errors strictly inside the buffer.
    Strict,
}

/// Configuration for one protocol session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SessionConfig {
    /// Capacity of the hand-off channel between reader and dispatch loop.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Maximum bytes buffered while waiting for one value to complete.
    /// `None` disables the limit.
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: Option<usize>,

    /// Handling of malformed (as opposed to truncated) input.
    #[serde(default)]
    pub decode_policy: DecodePolicy,

    /// Back-to-back read errors tolerated before the session is ended.
    /// `None` tolerates any number.
    #[serde(default)]
    pub max_consecutive_read_errors: Option<usize>,
}

const fn default_channel_capacity() -> usize {
    DEFAULT_CHANNEL_CAPACITY
}

#[allow(clippy::unnecessary_wraps)]
const fn default_max_frame_bytes() -> Option<usize> {
    Some(DEFAULT_MAX_FRAME_BYTES)
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            max_frame_bytes: Some(DEFAULT_MAX_FRAME_BYTES),
            decode_policy: DecodePolicy::Lenient,
            max_consecutive_read_errors: None,
        }
    }
}

impl SessionConfig {
    /// Check the values for ones the runtime cannot honor.
    ///
    /// # Errors
    /// Returns the first invalid field found.
    pub const fn validate(&self) -> Result<(), ConfigError> {
        if self.channel_capacity == 0 {
            return Err(ConfigError::ZeroChannelCapacity);
        }
        if matches!(self.max_frame_bytes, Some(0)) {
            return Err(ConfigError::ZeroMaxFrameBytes);
        }
        if matches!(self.max_consecutive_read_errors, Some(0)) {
            return Err(ConfigError::ZeroReadErrorLimit);
        }
        Ok(())
    }
}
