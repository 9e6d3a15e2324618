//! Dedicated writer task for outgoing messages.
//!
//! Only this task touches the write half of the transport. Callers hand it
//! complete, already framed messages through an mpsc channel, so two
//! requests can never interleave on the wire.
//!
//! # Architecture
//!
//! ```text
//! create_set  ─┐
//! acquire_set ─┼─► mpsc::Sender<Bytes> ─► Writer Task ─► Socket
//! list_zones  ─┘
//! ```
//!
//! Messages already queued when the task wakes up are written together with
//! a single vectored write where the transport allows it.

use std::io::IoSlice;

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{ResmgrError, Result};

/// Default channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Maximum messages to batch in a single write operation.
const MAX_BATCH_SIZE: usize = 16;

/// Configuration for the writer task.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Channel capacity for the message queue.
    pub channel_capacity: usize,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// Handle for queueing messages on the writer task.
///
/// This is cheaply cloneable.
#[derive(Debug, Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<Bytes>,
}

impl WriterHandle {
    /// Queue one framed message.
    ///
    /// Waits while the queue is full. Fails with
    /// [`ResmgrError::ConnectionLost`] once the writer task has stopped.
    pub async fn send(&self, message: Bytes) -> Result<()> {
        self.tx
            .send(message)
            .await
            .map_err(|_| ResmgrError::ConnectionLost)
    }

    /// Check if the writer task has stopped accepting messages.
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Spawn the writer task and return a handle for sending messages.
///
/// The task ends cleanly when every handle has been dropped, or with an
/// error when the transport fails.
pub fn spawn_writer_task<W>(writer: W, config: WriterConfig) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
    let task = tokio::spawn(writer_loop(rx, writer));
    (WriterHandle { tx }, task)
}

/// Spawn the writer task with default configuration.
pub fn spawn_writer_task_default<W>(writer: W) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    spawn_writer_task(writer, WriterConfig::default())
}

async fn writer_loop<W>(mut rx: mpsc::Receiver<Bytes>, mut writer: W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut batch = Vec::with_capacity(MAX_BATCH_SIZE);

    while let Some(first) = rx.recv().await {
        batch.push(first);
        while batch.len() < MAX_BATCH_SIZE {
            match rx.try_recv() {
                Ok(message) => batch.push(message),
                Err(_) => break,
            }
        }

        if let Err(e) = write_batch(&mut writer, &batch).await {
            tracing::error!("Failed to write to manager: {}", e);
            return Err(e);
        }
        tracing::trace!(messages = batch.len(), "Wrote batch");
        batch.clear();
    }

    Ok(())
}

/// Write a batch of messages fully, continuing after partial writes.
async fn write_batch<W>(writer: &mut W, batch: &[Bytes]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let total_size: usize = batch.iter().map(Bytes::len).sum();
    let mut total_written = 0;

    while total_written < total_size {
        let slices = build_remaining_slices(batch, total_written);
        let written = writer.write_vectored(&slices).await?;
        if written == 0 {
            return Err(ResmgrError::Io(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "write_vectored returned 0",
            )));
        }
        total_written += written;
    }

    writer.flush().await?;
    Ok(())
}

/// Build IoSlice array for the data left after `skip_bytes` were written.
fn build_remaining_slices(batch: &[Bytes], skip_bytes: usize) -> Vec<IoSlice<'_>> {
    let mut slices = Vec::with_capacity(batch.len());
    let mut start = 0;

    for message in batch {
        let end = start + message.len();
        if skip_bytes < end && !message.is_empty() {
            slices.push(IoSlice::new(&message[skip_bytes.saturating_sub(start)..]));
        }
        start = end;
    }

    slices
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::{duplex, AsyncReadExt};

    /// Accepts at most `limit` bytes per write call.
    struct TrickleWriter {
        data: Vec<u8>,
        limit: usize,
    }

    impl AsyncWrite for TrickleWriter {
        fn poll_write(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<std::io::Result<usize>> {
            let n = buf.len().min(self.limit);
            self.data.extend_from_slice(&buf[..n]);
            Poll::Ready(Ok(n))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[test]
    fn test_writer_config_default() {
        assert_eq!(WriterConfig::default().channel_capacity, DEFAULT_CHANNEL_CAPACITY);
    }

    #[test]
    fn test_remaining_slices_skip_into_second_message() {
        let batch = [Bytes::from_static(b"abcd"), Bytes::from_static(b"efgh")];
        let slices = build_remaining_slices(&batch, 5);
        assert_eq!(slices.len(), 1);
        assert_eq!(&*slices[0], b"fgh");

        let slices = build_remaining_slices(&batch, 2);
        assert_eq!(slices.len(), 2);
        assert_eq!(&*slices[0], b"cd");
    }

    #[tokio::test]
    async fn test_partial_writes_are_continued() {
        let mut writer = TrickleWriter {
            data: Vec::new(),
            limit: 3,
        };
        let batch = [Bytes::from_static(b"hello "), Bytes::from_static(b"world")];
        write_batch(&mut writer, &batch).await.unwrap();
        assert_eq!(writer.data, b"hello world");
    }

    #[tokio::test]
    async fn test_messages_arrive_in_order() {
        let (client, mut server) = duplex(4096);
        let (handle, task) = spawn_writer_task_default(client);

        for i in 0..10u32 {
            handle.send(Bytes::copy_from_slice(&i.to_be_bytes())).await.unwrap();
        }
        drop(handle);
        task.await.unwrap().unwrap();

        let mut buf = Vec::new();
        server.read_to_end(&mut buf).await.unwrap();
        let expected: Vec<u8> = (0..10u32).flat_map(u32::to_be_bytes).collect();
        assert_eq!(buf, expected);
    }

    #[tokio::test]
    async fn test_send_after_writer_stopped() {
        let (client, server) = duplex(16);
        drop(server);
        let (handle, task) = spawn_writer_task_default(client);

        handle.send(Bytes::from_static(b"lost")).await.unwrap();
        assert!(task.await.unwrap().is_err());
        assert!(handle.is_closed());
        assert!(matches!(
            handle.send(Bytes::from_static(b"x")).await,
            Err(ResmgrError::ConnectionLost)
        ));
    }
}
