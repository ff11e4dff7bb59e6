//! Outbound event envelopes.
//!
//! Every message the judge writes to a bot agent is one `Envelope` serialized
//! as a single compact JSON line: `{"action":<code>,"param":<json>}`. The
//! `param` is held pre-serialized so it is embedded verbatim, never escaped a
//! second time.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::value::{RawValue, to_raw_value};

use crate::{EncodingError, RawJson};

/// Action tag of an envelope, encoded on the wire as an integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Action {
    None,
    Log,
    Error,
    AgentInput,
    AgentOutput,
    Info,
    Param,
    Finish,
}

impl From<Action> for u8 {
    fn from(action: Action) -> Self {
        match action {
            Action::None => 0,
            Action::Log => 1,
            Action::Error => 2,
            Action::AgentInput => 3,
            Action::AgentOutput => 4,
            Action::Info => 5,
            Action::Param => 6,
            Action::Finish => 7,
        }
    }
}

impl TryFrom<u8> for Action {
    type Error = UnknownAction;

    fn try_from(code: u8) -> Result<Self, UnknownAction> {
        Ok(match code {
            0 => Self::None,
            1 => Self::Log,
            2 => Self::Error,
            3 => Self::AgentInput,
            4 => Self::AgentOutput,
            5 => Self::Info,
            6 => Self::Param,
            7 => Self::Finish,
            other => return Err(UnknownAction(other)),
        })
    }
}

/// Action code outside the known table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Unknown action code: {0}")]
pub struct UnknownAction(pub u8);

/// Payload of `Log` and `Error` envelopes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Content {
    pub content: String,
}

/// Payload of `AgentInput` envelopes: `content` goes to agent slot `index`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelContent {
    pub index: i64,
    pub content: String,
}

/// Tagged outbound message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub action: Action,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub param: Option<RawJson>,
}

impl Envelope {
    /// Build an envelope from an action and an already-serialized payload.
    #[must_use]
    pub const fn new(action: Action, param: Option<RawJson>) -> Self {
        Self { action, param }
    }

    /// Build an envelope whose payload is serialized from `param`.
    ///
    /// # Errors
    /// Returns error if `param` cannot be serialized.
    pub fn with_param<T: Serialize + ?Sized>(
        action: Action,
        param: &T,
        what: &'static str,
    ) -> Result<Self, EncodingError> {
        let raw = to_raw_value(param).map_err(|e| EncodingError::json(what, e))?;
        Ok(Self::new(action, Some(raw)))
    }

    /// `{action: Log, param: {content}}`.
    ///
    /// # Errors
    /// Returns error if the payload cannot be serialized.
    pub fn log(text: impl Into<String>) -> Result<Self, EncodingError> {
        let content = Content {
            content: text.into(),
        };
        Self::with_param(Action::Log, &content, "log content")
    }

    /// `{action: Error, param: {content}}` carrying the error's description.
    ///
    /// # Errors
    /// Returns error if the payload cannot be serialized.
    pub fn error(err: &dyn fmt::Display) -> Result<Self, EncodingError> {
        let content = Content {
            content: err.to_string(),
        };
        Self::with_param(Action::Error, &content, "error content")
    }

    /// `{action: AgentInput, param: {index, content}}`.
    ///
    /// # Errors
    /// Returns error if the payload cannot be serialized.
    pub fn agent_input(index: i64, text: impl Into<String>) -> Result<Self, EncodingError> {
        let content = ChannelContent {
            index,
            content: text.into(),
        };
        Self::with_param(Action::AgentInput, &content, "agent input")
    }

    /// `{action: Info, param: <payload>}` with the payload serialized as-is.
    ///
    /// # Errors
    /// Returns error if `payload` is not serializable.
    pub fn info<T: Serialize + ?Sized>(payload: &T) -> Result<Self, EncodingError> {
        Self::with_param(Action::Info, payload, "info payload")
    }

    /// `{action: Finish}` without a payload.
    #[must_use]
    pub const fn finish() -> Self {
        Self::new(Action::Finish, None)
    }

    /// Payload as raw JSON text, if any.
    #[must_use]
    pub fn param_json(&self) -> Option<&str> {
        self.param.as_deref().map(RawValue::get)
    }

    /// Serialize to one compact JSON line, without the trailing newline.
    ///
    /// # Errors
    /// Returns error if serialization fails.
    pub fn to_line(&self) -> Result<String, EncodingError> {
        serde_json::to_string(self).map_err(|e| EncodingError::json("envelope", e))
    }

    /// Parse an envelope previously produced by [`Envelope::to_line`].
    ///
    /// # Errors
    /// Returns error if the line is not an envelope or names an unknown action.
    pub fn from_line(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line.trim_end())
    }
}
