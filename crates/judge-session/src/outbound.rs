//! Outbound envelopes and the sinks that carry them to the agent.

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use judge_protocol::{EncodingError, Envelope};
use serde::Serialize;
use tokio::{
    io::{AsyncWrite, AsyncWriteExt, BufWriter},
    sync::{Mutex, mpsc},
};

/// Outbound send error.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Encoding(#[from] EncodingError),
    #[error("Outbound channel closed")]
    Closed,
}

/// Destination for serialized envelope lines.
///
/// Each call receives one complete line without its trailing newline.
#[async_trait]
pub trait LineSink: Send + Sync {
    /// Deliver one line.
    async fn send_line(&self, line: String) -> Result<(), SinkError>;
}

/// Newline-terminated writer over any async byte sink, e.g. a child's stdin.
#[derive(Clone)]
pub struct LineWriter {
    writer: Arc<Mutex<BufWriter<Box<dyn AsyncWrite + Send + Unpin>>>>,
}

impl LineWriter {
    /// Create a new line writer.
    #[must_use]
    pub fn new(writer: impl AsyncWrite + Send + Unpin + 'static) -> Self {
        Self {
            writer: Arc::new(Mutex::new(BufWriter::new(Box::new(writer)))),
        }
    }
}

#[async_trait]
impl LineSink for LineWriter {
    async fn send_line(&self, line: String) -> Result<(), SinkError> {
        let mut guard = self.writer.lock().await;
        guard.write_all(line.as_bytes()).await?;
        guard.write_all(b"\n").await?;
        guard.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl LineSink for mpsc::Sender<String> {
    async fn send_line(&self, line: String) -> Result<(), SinkError> {
        self.send(line).await.map_err(|_| SinkError::Closed)
    }
}

#[async_trait]
impl LineSink for mpsc::UnboundedSender<String> {
    async fn send_line(&self, line: String) -> Result<(), SinkError> {
        self.send(line).map_err(|_| SinkError::Closed)
    }
}

/// Encodes outbound events and hands each line to a sink.
///
/// Cloning shares the sink, so the caller and the dispatch loop can emit
/// concurrently.
pub struct Outbound<S> {
    sink: Arc<S>,
}

impl<S> Clone for Outbound<S> {
    fn clone(&self) -> Self {
        Self {
            sink: Arc::clone(&self.sink),
        }
    }
}

impl<S: LineSink> Outbound<S> {
    /// Wrap a sink.
    #[must_use]
    pub fn new(sink: S) -> Self {
        Self {
            sink: Arc::new(sink),
        }
    }

    /// The underlying sink.
    #[must_use]
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Serialize and send a prepared envelope.
    ///
    /// # Errors
    /// Returns error if encoding or delivery fails.
    pub async fn emit(&self, envelope: &Envelope) -> Result<(), SinkError> {
        let line = envelope.to_line()?;
        tracing::trace!(action = ?envelope.action, len = line.len(), "Emitting envelope");
        self.sink.send_line(line).await
    }

    /// Send a `Log` envelope.
    ///
    /// # Errors
    /// Returns error if encoding or delivery fails.
    pub async fn emit_log(&self, text: impl Into<String> + Send) -> Result<(), SinkError> {
        self.emit(&Envelope::log(text)?).await
    }

    /// Send an `Error` envelope carrying the error's description.
    ///
    /// # Errors
    /// Returns error if encoding or delivery fails.
    pub async fn emit_error(&self, err: &(dyn fmt::Display + Sync)) -> Result<(), SinkError> {
        let envelope = Envelope::error(err)?;
        self.emit(&envelope).await
    }

    /// Send an `AgentInput` envelope for agent slot `index`.
    ///
    /// # Errors
    /// Returns error if encoding or delivery fails.
    pub async fn emit_agent_input(
        &self,
        index: i64,
        text: impl Into<String> + Send,
    ) -> Result<(), SinkError> {
        self.emit(&Envelope::agent_input(index, text)?).await
    }

    /// Send an `Info` envelope with `payload` serialized as-is.
    ///
    /// # Errors
    /// Returns error if `payload` is not serializable or delivery fails.
    pub async fn emit_info<T: Serialize + Sync + ?Sized>(&self, payload: &T) -> Result<(), SinkError> {
        let envelope = Envelope::info(payload)?;
        self.emit(&envelope).await
    }

    /// Send a `Finish` envelope.
    ///
    /// # Errors
    /// Returns error if delivery fails.
    pub async fn emit_finish(&self) -> Result<(), SinkError> {
        self.emit(&Envelope::finish()).await
    }
}
