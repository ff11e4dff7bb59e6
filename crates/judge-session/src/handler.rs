//! Callbacks invoked by the dispatch loop.

use async_trait::async_trait;
use judge_protocol::{Handshake, RawJson};

/// Receives the decoded values of one session.
///
/// Implement this trait to plug judging logic into a session. The first
/// value of the stream goes to [`on_handshake`](Self::on_handshake) exactly
/// once; every later value goes to [`on_event`](Self::on_event) in stream
/// order. Returning an error from either ends the session after one `Error`
/// envelope carrying the error's description is sent to the agent.
#[async_trait]
pub trait SessionHandler: Send {
    /// Handle the handshake listing the connected agents.
    async fn on_handshake(&mut self, handshake: Handshake) -> anyhow::Result<()>;

    /// Handle one later value, exactly as it appeared on the wire.
    async fn on_event(&mut self, event: RawJson) -> anyhow::Result<()>;
}

/// Handler built from two synchronous closures. See [`handler_fn`].
pub struct FnHandler<H, E> {
    on_handshake: H,
    on_event: E,
}

/// Build a [`SessionHandler`] from a handshake closure and an event closure.
pub const fn handler_fn<H, E>(on_handshake: H, on_event: E) -> FnHandler<H, E>
where
    H: FnMut(Handshake) -> anyhow::Result<()> + Send,
    E: FnMut(RawJson) -> anyhow::Result<()> + Send,
{
    FnHandler {
        on_handshake,
        on_event,
    }
}

#[async_trait]
impl<H, E> SessionHandler for FnHandler<H, E>
where
    H: FnMut(Handshake) -> anyhow::Result<()> + Send,
    E: FnMut(RawJson) -> anyhow::Result<()> + Send,
{
    async fn on_handshake(&mut self, handshake: Handshake) -> anyhow::Result<()> {
        (self.on_handshake)(handshake)
    }

    async fn on_event(&mut self, event: RawJson) -> anyhow::Result<()> {
        (self.on_event)(event)
    }
}
