//! Protocol error types.

use thiserror::Error;

/// Outbound payload could not be serialized.
#[derive(Debug, Error)]
pub enum EncodingError {
    #[error("Failed to encode {what}: {source}")]
    Json {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl EncodingError {
    pub(crate) const fn json(what: &'static str, source: serde_json::Error) -> Self {
        Self::Json { what, source }
    }
}

/// Inbound byte stream cannot yield a frame.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("Frame exceeds {limit} bytes ({buffered} buffered without a complete value)")]
    TooLarge { buffered: usize, limit: usize },
    #[error("Malformed JSON in inbound stream: {0}")]
    Syntax(#[source] serde_json::Error),
}

/// Session configuration holds a value the runtime cannot honor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("channel_capacity must be at least 1")]
    ZeroChannelCapacity,
    #[error("max_frame_bytes must be at least 1 when set")]
    ZeroMaxFrameBytes,
    #[error("max_consecutive_read_errors must be at least 1 when set")]
    ZeroReadErrorLimit,
}
