//! Background reader over the agent's output stream.

use tokio::{
    io::{AsyncRead, AsyncReadExt},
    sync::mpsc,
};
use tokio_util::sync::CancellationToken;

/// Most bytes taken from the stream by one read.
pub const READ_CHUNK_BYTES: usize = 8 * 1024;

/// One read attempt, forwarded from the reader to the dispatch loop.
#[derive(Debug)]
pub enum ReadChunk {
    /// Bytes read, at most [`READ_CHUNK_BYTES`]. Not aligned to values or lines.
    Data(Vec<u8>),
    /// A read failed; the reader keeps going.
    Failed(std::io::Error),
    /// The stream ended. Always the last chunk sent.
    Eof,
}

/// Read `stream` in bounded chunks and forward every attempt through `tx`.
///
/// Bytes are forwarded as soon as they arrive, so input without newlines
/// still reaches the frame assembler and its size ceiling.
///
/// Returns on end-of-stream (after forwarding [`ReadChunk::Eof`]), when
/// `cancel` fires, or when the receiving side is gone. Sends race against
/// `cancel`, so a full channel never pins the task after the dispatch loop
/// has stopped.
pub async fn run_reader<R>(mut stream: R, tx: mpsc::Sender<ReadChunk>, cancel: CancellationToken)
where
    R: AsyncRead + Unpin + Send,
{
    let mut buf = vec![0u8; READ_CHUNK_BYTES];

    loop {
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => None,
            result = stream.read(&mut buf) => Some(result),
        };
        let Some(result) = result else {
            tracing::debug!("Reader cancelled");
            return;
        };

        let chunk = match result {
            Ok(0) => {
                tracing::debug!("Agent output reached end of stream");
                forward(&tx, &cancel, ReadChunk::Eof).await;
                return;
            }
            Ok(n) => {
                tracing::trace!(bytes = n, "Read chunk");
                ReadChunk::Data(buf[..n].to_vec())
            }
            Err(e) => {
                tracing::warn!("Error reading agent output: {e}");
                ReadChunk::Failed(e)
            }
        };
        if !forward(&tx, &cancel, chunk).await {
            return;
        }
    }
}

/// Send one chunk unless cancelled first. Returns whether the reader should go on.
async fn forward(tx: &mpsc::Sender<ReadChunk>, cancel: &CancellationToken, chunk: ReadChunk) -> bool {
    tokio::select! {
        biased;
        () = cancel.cancelled() => false,
        sent = tx.send(chunk) => {
            if sent.is_err() {
                tracing::debug!("Dispatch loop gone, reader stopping");
            }
            sent.is_ok()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        pin::Pin,
        task::{Context, Poll},
        time::Duration,
    };

    use tokio::io::ReadBuf;

    use super::*;

    async fn collect(rx: &mut mpsc::Receiver<ReadChunk>) -> Vec<Vec<u8>> {
        let mut data = Vec::new();
        loop {
            match rx.recv().await.unwrap() {
                ReadChunk::Data(bytes) => data.push(bytes),
                ReadChunk::Eof => break,
                ReadChunk::Failed(e) => panic!("unexpected error: {e}"),
            }
        }
        data
    }

    #[tokio::test]
    async fn test_forwards_chunks_then_eof() {
        let stream = tokio_test::io::Builder::new()
            .read(b"{\"agents\":[]}\n{\"pi")
            .read(b"ng\":1}\n")
            .build();
        let (tx, mut rx) = mpsc::channel(8);
        run_reader(stream, tx, CancellationToken::new()).await;

        let data = collect(&mut rx).await.concat();
        assert_eq!(data, b"{\"agents\":[]}\n{\"ping\":1}\n");
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_input_without_newline_is_forwarded_in_bounded_chunks() {
        let blob = vec![b'x'; READ_CHUNK_BYTES * 3 + 5];
        let stream = tokio_test::io::Builder::new().read(&blob).build();
        let (tx, mut rx) = mpsc::channel(8);
        run_reader(stream, tx, CancellationToken::new()).await;

        let chunks = collect(&mut rx).await;
        assert!(chunks.len() >= 4);
        assert!(chunks.iter().all(|c| !c.is_empty() && c.len() <= READ_CHUNK_BYTES));
        assert_eq!(chunks.concat(), blob);
    }

    #[tokio::test]
    async fn test_read_error_is_forwarded_and_reading_continues() {
        let stream = tokio_test::io::Builder::new()
            .read(b"{\"a\"")
            .read_error(std::io::Error::other("hiccup"))
            .read(b":1}\n")
            .build();
        let (tx, mut rx) = mpsc::channel(8);
        run_reader(stream, tx, CancellationToken::new()).await;

        assert!(matches!(rx.recv().await, Some(ReadChunk::Data(b)) if b == b"{\"a\""));
        assert!(matches!(rx.recv().await, Some(ReadChunk::Failed(_))));
        assert!(matches!(rx.recv().await, Some(ReadChunk::Data(b)) if b == b":1}\n"));
        assert!(matches!(rx.recv().await, Some(ReadChunk::Eof)));
    }

    #[tokio::test]
    async fn test_cancel_interrupts_pending_read() {
        let (_writer, stream) = tokio::io::duplex(64);
        let (tx, _rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_reader(stream, tx, cancel.clone()));

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("reader did not stop")
            .unwrap();
    }

    /// Stream that yields the same line forever.
    struct Endless;

    impl AsyncRead for Endless {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<std::io::Result<()>> {
            buf.put_slice(b"{}\n");
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_full_channel_does_not_block_shutdown() {
        let (tx, _rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_reader(Endless, tx, cancel.clone()));

        // Nobody drains the channel; the reader parks on its send.
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("reader blocked on a full channel")
            .unwrap();
    }

    #[tokio::test]
    async fn test_dropped_receiver_stops_reader() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        tokio::time::timeout(
            Duration::from_secs(5),
            run_reader(Endless, tx, CancellationToken::new()),
        )
        .await
        .expect("reader kept running without a receiver");
    }
}
