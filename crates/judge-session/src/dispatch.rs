//! Dispatch loop: chunks in, handler calls out.
//!
//! The loop owns the frame buffer and the protocol phase. It waits on either
//! the session's cancellation token or the next chunk from the reader, feeds
//! each chunk to the [`FrameAssembler`], and routes every complete value:
//! the first to [`SessionHandler::on_handshake`], the rest to
//! [`SessionHandler::on_event`].

use judge_protocol::{FrameAssembler, Handshake, RawJson, SessionConfig};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{
    handler::SessionHandler,
    outbound::{LineSink, Outbound},
    reader::ReadChunk,
};

/// Protocol phase of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No value decoded yet; the next one is the handshake.
    AwaitingHandshake,
    /// Handshake consumed; values go to the generic handler.
    Streaming,
    /// The loop has exited.
    Terminated,
}

impl Phase {
    /// Phase after one value has been dispatched.
    ///
    /// The first value always moves the session to `Streaming`, whether or
    /// not it was a valid handshake.
    #[must_use]
    pub const fn after_frame(self) -> Self {
        match self {
            Self::AwaitingHandshake | Self::Streaming => Self::Streaming,
            Self::Terminated => Self::Terminated,
        }
    }
}

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// `stop` was called.
    Cancelled,
    /// The agent's output stream ended.
    EndOfStream,
    /// A handler returned an error; its description was sent to the agent.
    HandlerFailed(String),
    /// The inbound stream broke a configured limit; the description was sent to the agent.
    ProtocolViolation(String),
}

enum Step {
    Continue,
    Exit(SessionOutcome),
}

/// State machine driving one session's inbound side.
#[derive(Debug)]
pub struct DispatchLoop {
    phase: Phase,
    assembler: FrameAssembler,
    max_read_errors: Option<usize>,
    read_errors: usize,
}

impl DispatchLoop {
    /// Create a loop in the `AwaitingHandshake` phase.
    #[must_use]
    pub const fn new(config: &SessionConfig) -> Self {
        Self {
            phase: Phase::AwaitingHandshake,
            assembler: FrameAssembler::from_config(config),
            max_read_errors: config.max_consecutive_read_errors,
            read_errors: 0,
        }
    }

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// Run until cancellation, end-of-stream, or the first failure.
    ///
    /// A failure sends one `Error` envelope through `outbound` before
    /// returning.
    pub async fn run<H, S>(
        &mut self,
        chunks: &mut mpsc::Receiver<ReadChunk>,
        cancel: &CancellationToken,
        handler: &mut H,
        outbound: &Outbound<S>,
    ) -> SessionOutcome
    where
        H: SessionHandler + ?Sized,
        S: LineSink,
    {
        let outcome = loop {
            let chunk = tokio::select! {
                biased;
                () = cancel.cancelled() => break SessionOutcome::Cancelled,
                chunk = chunks.recv() => chunk,
            };

            let step = match chunk {
                Some(ReadChunk::Data(bytes)) => {
                    self.read_errors = 0;
                    self.assembler.push(&bytes);
                    self.drain(cancel, handler).await
                }
                Some(ReadChunk::Failed(e)) => self.on_read_error(&e),
                Some(ReadChunk::Eof) | None => Step::Exit(SessionOutcome::EndOfStream),
            };

            if let Step::Exit(outcome) = step {
                break outcome;
            }
        };

        self.phase = Phase::Terminated;
        match &outcome {
            SessionOutcome::HandlerFailed(message) | SessionOutcome::ProtocolViolation(message) => {
                if let Err(e) = outbound.emit_error(message).await {
                    tracing::error!("Failed to send error envelope: {e}");
                }
            }
            SessionOutcome::Cancelled | SessionOutcome::EndOfStream => {}
        }
        outcome
    }

    /// Dispatch every complete value currently buffered.
    async fn drain<H>(&mut self, cancel: &CancellationToken, handler: &mut H) -> Step
    where
        H: SessionHandler + ?Sized,
    {
        loop {
            if cancel.is_cancelled() {
                return Step::Exit(SessionOutcome::Cancelled);
            }
            match self.assembler.next_frame() {
                Ok(Some(value)) => {
                    if let Err(e) = self.dispatch(value, handler).await {
                        let message = format!("{e:#}");
                        tracing::warn!(phase = ?self.phase, "Handler failed: {message}");
                        return Step::Exit(SessionOutcome::HandlerFailed(message));
                    }
                }
                Ok(None) => return Step::Continue,
                Err(e) => {
                    tracing::warn!("Inbound framing failed: {e}");
                    return Step::Exit(SessionOutcome::ProtocolViolation(e.to_string()));
                }
            }
        }
    }

    async fn dispatch<H>(&mut self, value: RawJson, handler: &mut H) -> anyhow::Result<()>
    where
        H: SessionHandler + ?Sized,
    {
        let phase = self.phase;
        self.phase = phase.after_frame();

        match phase {
            Phase::AwaitingHandshake => {
                tracing::debug!("Handshake received");
                let handshake = Handshake::from_raw(&value)
                    .map_err(|e| anyhow::Error::new(e).context("Malformed handshake"))?;
                tracing::info!(agents = handshake.agents.len(), "Agents connected");
                handler.on_handshake(handshake).await
            }
            Phase::Streaming => handler.on_event(value).await,
            Phase::Terminated => Ok(()),
        }
    }

    fn on_read_error(&mut self, e: &std::io::Error) -> Step {
        self.read_errors += 1;
        tracing::warn!(consecutive = self.read_errors, "Skipping failed read: {e}");
        match self.max_read_errors {
            Some(limit) if self.read_errors >= limit => Step::Exit(SessionOutcome::ProtocolViolation(
                format!("{} consecutive read errors, last: {e}", self.read_errors),
            )),
            _ => Step::Continue,
        }
    }
}
