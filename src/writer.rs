//! Per-connection writer task.
//!
//! The write half of a connection is owned by a single task. Anything holding
//! a [`FrameSink`] queues complete frames without touching the socket: the
//! read task, worker threads, even another channel's handlers. The task
//! drains the queue in batches with vectored writes, so frames from
//! concurrent senders never interleave.
//!
//! ```text
//! read task ─┐
//! worker 1  ─┼─► FrameSink ─► mpsc queue ─► writer task ─► socket
//! worker N  ─┘
//! ```
//!
//! Closing the sink flushes whatever is already queued, then shuts the write
//! half down.

use std::io::IoSlice;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, SmartError};

/// Default limit of queued, unwritten frames per connection.
pub const DEFAULT_MAX_PENDING_FRAMES: usize = 1024;

/// Default capacity of the writer queue.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Most frames handed to one vectored write.
const MAX_BATCH: usize = 64;

/// Writer queue limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriterConfig {
    /// Frames a connection may have queued before sends fail with
    /// [`SmartError::Backpressure`].
    pub max_pending_frames: usize,
    pub channel_capacity: usize,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            max_pending_frames: DEFAULT_MAX_PENDING_FRAMES,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// Sending side of a connection's writer. Cheap to clone, usable from any
/// thread.
#[derive(Clone)]
pub struct FrameSink {
    queue: mpsc::Sender<Bytes>,
    pending: Arc<AtomicUsize>,
    max_pending: usize,
    stop: CancellationToken,
}

impl FrameSink {
    /// Queue one encoded frame without waiting.
    ///
    /// Fails with [`SmartError::ChannelClosed`] once the sink is closed and
    /// with [`SmartError::Backpressure`] while the pending limit is reached.
    pub fn push(&self, frame: Bytes) -> Result<()> {
        if self.stop.is_cancelled() {
            return Err(SmartError::ChannelClosed);
        }

        // Reserve a slot first so racing senders cannot overshoot the limit.
        if self.pending.fetch_add(1, Ordering::AcqRel) >= self.max_pending {
            self.pending.fetch_sub(1, Ordering::AcqRel);
            return Err(SmartError::Backpressure);
        }

        self.queue.try_send(frame).map_err(|e| {
            self.pending.fetch_sub(1, Ordering::AcqRel);
            match e {
                mpsc::error::TrySendError::Full(_) => SmartError::Backpressure,
                mpsc::error::TrySendError::Closed(_) => SmartError::ChannelClosed,
            }
        })
    }

    /// Frames queued but not yet written.
    #[inline]
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Stop accepting frames; the writer flushes the queue and shuts down.
    pub fn close(&self) {
        self.stop.cancel();
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.stop.is_cancelled() || self.queue.is_closed()
    }
}

/// Spawn the writer task for one connection.
///
/// Must be called inside a tokio runtime. The join handle resolves once the
/// sink is closed (or every clone dropped) and the queue is flushed, or on
/// the first write error.
pub fn spawn_writer<W>(
    connection_id: u64,
    half: W,
    config: WriterConfig,
) -> (FrameSink, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (queue, rx) = mpsc::channel(config.channel_capacity.max(1));
    let pending = Arc::new(AtomicUsize::new(0));
    let stop = CancellationToken::new();

    let sink = FrameSink {
        queue,
        pending: pending.clone(),
        max_pending: config.max_pending_frames,
        stop: stop.clone(),
    };
    let task = tokio::spawn(drain(connection_id, rx, half, pending, stop));
    (sink, task)
}

async fn drain<W>(
    connection_id: u64,
    mut rx: mpsc::Receiver<Bytes>,
    mut half: W,
    pending: Arc<AtomicUsize>,
    stop: CancellationToken,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut batch: Vec<Bytes> = Vec::with_capacity(MAX_BATCH);
    let mut stopping = false;

    loop {
        if !stopping {
            tokio::select! {
                biased;
                next = rx.recv() => match next {
                    Some(frame) => batch.push(frame),
                    None => break,
                },
                _ = stop.cancelled() => {
                    stopping = true;
                    rx.close();
                }
            }
        }

        while batch.len() < MAX_BATCH {
            match rx.try_recv() {
                Ok(frame) => batch.push(frame),
                Err(_) => break,
            }
        }
        if batch.is_empty() {
            break;
        }

        let written = write_batch(&mut half, &batch).await;
        pending.fetch_sub(batch.len(), Ordering::AcqRel);
        batch.clear();

        if let Err(e) = written {
            tracing::debug!(connection_id, "write failed: {}", e);
            stop.cancel();
            pending.store(0, Ordering::Release);
            return Err(e);
        }
    }

    let _ = half.shutdown().await;
    tracing::trace!(connection_id, "writer stopped");
    Ok(())
}

/// Write every byte of `batch`, resuming after partial vectored writes.
async fn write_batch<W>(half: &mut W, batch: &[Bytes]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let total: usize = batch.iter().map(Bytes::len).sum();
    let mut done = 0;

    while done < total {
        let slices = unwritten(batch, done);
        let n = half.write_vectored(&slices).await?;
        if n == 0 {
            return Err(std::io::Error::from(std::io::ErrorKind::WriteZero).into());
        }
        done += n;
    }

    half.flush().await?;
    Ok(())
}

/// Slices covering `batch` minus its first `skip` bytes.
fn unwritten(batch: &[Bytes], mut skip: usize) -> Vec<IoSlice<'_>> {
    batch
        .iter()
        .filter_map(|frame| {
            if skip >= frame.len() {
                skip -= frame.len();
                return None;
            }
            let slice = IoSlice::new(&frame[skip..]);
            skip = 0;
            Some(slice)
        })
        .collect()
}
