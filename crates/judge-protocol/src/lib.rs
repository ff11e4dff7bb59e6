//! Wire protocol between a judge and a bot-agent subprocess.
//!
//! This crate provides the pure building blocks:
//! - `Envelope` / `Action` - Outbound event wrapper and its action codes
//! - `Handshake` - First inbound value describing the connected agents
//! - `FrameAssembler` - Extracts one complete JSON value at a time from a byte stream
//! - `SessionConfig` - Tunables shared with the session runtime

pub mod config;
pub mod envelope;
pub mod error;
pub mod frame;
pub mod handshake;

pub use config::{DecodePolicy, SessionConfig};
pub use envelope::{Action, ChannelContent, Content, Envelope, UnknownAction};
pub use error::{ConfigError, EncodingError, FrameError};
pub use frame::{Decoded, FrameAssembler, try_consume_one};
pub use handshake::{AgentDescriptor, Handshake};

/// Raw, undecoded JSON value as it appeared on the wire.
pub type RawJson = Box<serde_json::value::RawValue>;
