//! Session runtime for a judge talking to one bot-agent subprocess.
//!
//! Provides:
//! - `SessionController` - Start/stop lifecycle, safe to drive from several tasks
//! - `SessionHandler` - Callbacks for the handshake and every later value
//! - `Outbound` / `LineSink` - Encoded envelopes written to the agent's input
//! - The stream reader and dispatch loop behind `SessionController::start`

pub mod controller;
pub mod dispatch;
pub mod handler;
pub mod outbound;
pub mod reader;

pub use controller::{SessionController, SessionError, SessionId};
pub use dispatch::{DispatchLoop, Phase, SessionOutcome};
pub use handler::{FnHandler, SessionHandler, handler_fn};
pub use outbound::{LineSink, LineWriter, Outbound, SinkError};
pub use reader::ReadChunk;

pub use judge_protocol::{AgentDescriptor, Handshake, RawJson, SessionConfig};
