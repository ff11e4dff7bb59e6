//! Handshake sent by the bot-agent host as its first value.

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

/// One connected agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentDescriptor {
    pub id: i64,
    pub version: i64,
    pub nickname: String,
}

/// First inbound value of a session: `{"agents": [...]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Handshake {
    pub agents: Vec<AgentDescriptor>,
}

impl Handshake {
    /// Decode a handshake from a raw frame.
    ///
    /// # Errors
    /// Returns error if the frame does not match the handshake schema.
    pub fn from_raw(raw: &RawValue) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw.get())
    }
}
