//! Session lifecycle.

use std::sync::{Mutex, MutexGuard, PoisonError};

use judge_protocol::SessionConfig;
use tokio::{io::AsyncRead, sync::mpsc};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::{
    dispatch::{DispatchLoop, SessionOutcome},
    handler::SessionHandler,
    outbound::{LineSink, Outbound},
    reader,
};

/// Session identifier, fresh for every `start`.
pub type SessionId = Uuid;

/// Session controller error.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Session already running: {0}")]
    AlreadyRunning(SessionId),
}

struct SessionState {
    running: bool,
    cancelled: bool,
    cancel: CancellationToken,
    session_id: Option<SessionId>,
}

/// Owns the lifecycle of protocol sessions over one agent stream at a time.
///
/// `start` runs a session to completion on the calling task while a reader
/// task pulls the agent's output. `stop` may be called from any other task
/// (share the controller through an `Arc`); it fires the session's
/// cancellation at most once. A controller can be started again once its
/// previous session has ended.
pub struct SessionController {
    config: SessionConfig,
    state: Mutex<SessionState>,
}

impl Default for SessionController {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

impl SessionController {
    /// Create an idle controller.
    #[must_use]
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            state: Mutex::new(SessionState {
                running: false,
                cancelled: false,
                cancel: CancellationToken::new(),
                session_id: None,
            }),
        }
    }

    /// Configuration applied to every session.
    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Run one session over `stream` until it terminates.
    ///
    /// The first decoded value goes to `handler.on_handshake`, every later
    /// one to `handler.on_event`. A handler failure is reported to the agent
    /// as one `Error` envelope through `outbound` and ends the session. The
    /// reader task is stopped and joined before this returns.
    ///
    /// # Errors
    /// Returns error if a session is already running on this controller.
    pub async fn start<R, H, S>(
        &self,
        stream: R,
        handler: &mut H,
        outbound: &Outbound<S>,
    ) -> Result<SessionOutcome, SessionError>
    where
        R: AsyncRead + Unpin + Send + 'static,
        H: SessionHandler + ?Sized,
        S: LineSink,
    {
        let (session_id, cancel) = self.begin()?;
        let _running = RunningGuard(self);

        let span = tracing::info_span!("session", %session_id);
        tracing::info!(parent: &span, "Session started");

        let reader_cancel = cancel.child_token();
        let _reader_guard = reader_cancel.clone().drop_guard();
        let (tx, mut rx) = mpsc::channel(self.config.channel_capacity.max(1));
        let reader = tokio::spawn(
            reader::run_reader(stream, tx, reader_cancel.clone()).instrument(span.clone()),
        );

        let outcome = DispatchLoop::new(&self.config)
            .run(&mut rx, &cancel, handler, outbound)
            .instrument(span.clone())
            .await;

        reader_cancel.cancel();
        drop(rx);
        if let Err(e) = reader.await {
            tracing::error!(parent: &span, "Reader task failed: {e}");
        }

        tracing::info!(parent: &span, ?outcome, "Session ended");
        Ok(outcome)
    }

    /// Cancel the running session.
    ///
    /// Returns `true` for the call that fired the cancellation and `false`
    /// for every later call until the next `start`.
    ///
    /// A stop issued while no session is running is cleared by the next
    /// `start`, so it does not cancel that session.
    pub fn stop(&self) -> bool {
        let mut state = self.lock();
        if state.cancelled {
            return false;
        }
        state.cancelled = true;
        state.cancel.cancel();
        tracing::debug!(session_id = ?state.session_id, "Session stop requested");
        true
    }

    /// Whether a session is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.lock().running
    }

    /// Whether `stop` has fired since the last `start`.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.lock().cancelled
    }

    /// Identifier of the current or most recent session.
    #[must_use]
    pub fn session_id(&self) -> Option<SessionId> {
        self.lock().session_id
    }

    fn begin(&self) -> Result<(SessionId, CancellationToken), SessionError> {
        let mut state = self.lock();
        if let (true, Some(id)) = (state.running, state.session_id) {
            return Err(SessionError::AlreadyRunning(id));
        }
        let session_id = Uuid::new_v4();
        state.running = true;
        state.cancelled = false;
        state.cancel = CancellationToken::new();
        state.session_id = Some(session_id);
        Ok((session_id, state.cancel.clone()))
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Clears the running flag however `start` exits.
struct RunningGuard<'a>(&'a SessionController);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.lock().running = false;
    }
}
