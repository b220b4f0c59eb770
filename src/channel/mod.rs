//! Channel module - the per-connection actor.
//!
//! A [`Channel`] owns one live connection: its writer task, frame codec,
//! default payload codec, ordered handler chains and exactly one [`Worker`].
//! The socket read task only cuts frames; every application-visible step
//! (open, each message, close) runs on the channel's worker, in order.
//!
//! ```text
//! socket ─► read task ─► FrameBuffer ─► pooled ProtocolMessage
//!                                           │ later_run
//!                                           ▼
//!           Worker: interceptors.before ─► message handlers ─► interceptors.after
//!                                           │ send
//!                                           ▼
//!                                writer task ─► socket
//! ```

mod gate;
mod initializer;

pub use gate::OriginStamp;
pub use initializer::{
    append_handler, append_interceptor, on_lifecycle, insert_handler_at, prepend_handler,
    with_byte_order, with_codec, with_framing, with_max_frame_size, ChannelInitializer,
    ChannelSetup,
};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;

use crate::codec::Codec;
use crate::error::{Result, SmartError};
use crate::pool::{Pool, Pooled};
use crate::protocol::{ByteOrder, FrameBuffer, FrameCodec, ProtocolMessage};
use crate::transport::{BoxedReader, Connection};
use crate::worker::Worker;
use crate::writer::{spawn_writer, FrameSink, WriterConfig};

/// Connection identity, unique while the connection is open.
pub type ConnectionId = u64;

/// Default size of the per-connection socket read buffer.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 64 * 1024;

/// Open/close observer. Both callbacks run on the channel's worker.
pub trait ChannelHandler: Send + Sync + 'static {
    fn on_open(&self, _channel: &Channel) {}
    fn on_close(&self, _channel: &Channel) {}
}

/// Link in the ordered message-handler chain.
///
/// Returning an error stops the chain for this message; the error is logged
/// and the channel stays open unless the handler closed it.
pub trait MessageHandler: Send + Sync + 'static {
    fn on_message(&self, channel: &Channel, msg: &mut ProtocolMessage) -> Result<()>;
}

/// Hook wrapped around the message-handler chain.
pub trait Interceptor: Send + Sync + 'static {
    /// Return `false` to drop the message before any handler sees it.
    fn before(&self, _channel: &Channel, _msg: &ProtocolMessage) -> bool {
        true
    }

    /// Runs after the handler chain, in reverse registration order.
    fn after(&self, _channel: &Channel, _msg: &ProtocolMessage) {}
}

/// Something [`Channel::send`] can put on the wire.
#[derive(Debug, Clone)]
pub enum Outbound {
    /// A complete frame, written as is.
    Encoded(Bytes),
    /// An envelope to frame-encode with the channel's layout.
    Message(ProtocolMessage),
}

impl From<Bytes> for Outbound {
    fn from(bytes: Bytes) -> Self {
        Outbound::Encoded(bytes)
    }
}

impl From<ProtocolMessage> for Outbound {
    fn from(msg: ProtocolMessage) -> Self {
        Outbound::Message(msg)
    }
}

/// Per-connection runtime settings supplied by the owner (server or client).
#[derive(Clone)]
pub struct ChannelOptions {
    pub writer: WriterConfig,
    pub read_buffer_size: usize,
    /// Envelope pool shared by every channel of the owner.
    pub messages: Pool<ProtocolMessage>,
    /// When it returns `true`, inbound frames are answered once with the
    /// closing envelope and dropped.
    pub refuse_inbound: Option<Arc<dyn Fn() -> bool + Send + Sync>>,
    /// Cancelling this token closes the channel. Owners pass a child of their
    /// own token.
    pub cancel: CancellationToken,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self {
            writer: WriterConfig::default(),
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            messages: Pool::new(),
            refuse_inbound: None,
            cancel: CancellationToken::new(),
        }
    }
}

type CloseHook = Box<dyn FnOnce(ConnectionId) + Send>;

struct ChannelInner {
    id: ConnectionId,
    peer: String,
    frame_codec: FrameCodec,
    codec: Codec,
    lifecycle: Vec<Arc<dyn ChannelHandler>>,
    handlers: Vec<Arc<dyn MessageHandler>>,
    interceptors: Vec<Arc<dyn Interceptor>>,
    worker: Arc<Worker>,
    writer: FrameSink,
    messages: Pool<ProtocolMessage>,
    read_buffer_size: usize,
    refuse_inbound: Option<Arc<dyn Fn() -> bool + Send + Sync>>,
    /// Stops the read task. Cancelled by `close` or by the owner.
    cancel: CancellationToken,
    opened: AtomicBool,
    closed: AtomicBool,
    closing_sent: AtomicBool,
    on_closed: Mutex<Option<CloseHook>>,
}

/// Handle to one live connection. Cheap to clone.
#[derive(Clone)]
pub struct Channel {
    inner: Arc<ChannelInner>,
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("id", &self.inner.id)
            .field("peer", &self.inner.peer)
            .field("worker", &self.inner.worker.index())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Channel {
    /// Build a channel around `conn` and spawn its writer task.
    ///
    /// Nothing is read and no handler runs until [`Channel::start`] is called
    /// with the returned reader. Must be called inside a tokio runtime.
    pub fn new(
        id: ConnectionId,
        conn: Connection,
        setup: ChannelSetup,
        worker: Arc<Worker>,
        options: ChannelOptions,
    ) -> (Channel, BoxedReader) {
        let (reader, write_half, peer) = conn.into_split();
        let (writer, writer_task) = spawn_writer(id, write_half, options.writer);
        let (frame_codec, codec) = setup.resolve_codecs();

        let channel = Channel {
            inner: Arc::new(ChannelInner {
                id,
                peer,
                frame_codec,
                codec,
                lifecycle: setup.lifecycle,
                handlers: setup.handlers,
                interceptors: setup.interceptors,
                worker,
                writer,
                messages: options.messages,
                read_buffer_size: options.read_buffer_size.max(1),
                refuse_inbound: options.refuse_inbound,
                cancel: options.cancel,
                opened: AtomicBool::new(false),
                closed: AtomicBool::new(false),
                closing_sent: AtomicBool::new(false),
                on_closed: Mutex::new(None),
            }),
        };

        // A failed write leaves the connection unusable.
        let weak = Arc::downgrade(&channel.inner);
        tokio::spawn(async move {
            if let Ok(Err(e)) = writer_task.await {
                if let Some(inner) = weak.upgrade() {
                    tracing::debug!(connection_id = inner.id, "writer failed, closing: {}", e);
                    Channel { inner }.close();
                }
            }
        });

        (channel, reader)
    }

    /// Fire the open event on the worker and start reading.
    ///
    /// `on_closed` runs once, synchronously, when the channel closes (used by
    /// the owner to deregister it).
    pub fn start<F>(&self, reader: BoxedReader, on_closed: F) -> Result<()>
    where
        F: FnOnce(ConnectionId) + Send + 'static,
    {
        *self.inner.on_closed.lock() = Some(Box::new(on_closed));

        if self.inner.opened.swap(true, Ordering::AcqRel) {
            return Err(SmartError::Protocol(format!(
                "channel {} already started",
                self.inner.id
            )));
        }

        let channel = self.clone();
        self.later_run(move || {
            for handler in &channel.inner.lifecycle {
                handler.on_open(&channel);
            }
        })?;

        tokio::spawn(read_loop(self.clone(), reader));
        Ok(())
    }

    #[inline]
    pub fn id(&self) -> ConnectionId {
        self.inner.id
    }

    /// Remote address (or socket path).
    pub fn peer(&self) -> &str {
        &self.inner.peer
    }

    /// Default payload codec.
    #[inline]
    pub fn codec(&self) -> Codec {
        self.inner.codec
    }

    #[inline]
    pub fn byte_order(&self) -> ByteOrder {
        self.inner.frame_codec.byte_order()
    }

    #[inline]
    pub fn frame_codec(&self) -> &FrameCodec {
        &self.inner.frame_codec
    }

    /// Index of the worker this channel is pinned to.
    #[inline]
    pub fn worker_index(&self) -> usize {
        self.inner.worker.index()
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Resolve once the channel is closed or its owner's token is cancelled.
    pub async fn closed(&self) {
        self.inner.cancel.cancelled().await
    }

    /// Number of outbound frames not yet written.
    pub fn pending_writes(&self) -> usize {
        self.inner.writer.pending()
    }

    /// Run `task` on this channel's worker after everything already scheduled.
    pub fn later_run<F>(&self, task: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.inner.worker.submit(task)
    }

    /// Queue a frame (or an envelope to frame) for writing.
    ///
    /// Safe from any thread, including other channels' workers.
    pub fn send(&self, out: impl Into<Outbound>) -> Result<()> {
        let bytes = match out.into() {
            Outbound::Encoded(bytes) => bytes,
            Outbound::Message(msg) => self.inner.frame_codec.encode(&msg)?,
        };
        self.inner.writer.push(bytes)
    }

    /// Frame-encode and queue an envelope.
    pub fn send_message(&self, msg: &ProtocolMessage) -> Result<()> {
        let bytes = self.inner.frame_codec.encode(msg)?;
        self.inner.writer.push(bytes)
    }

    /// Encode `value` with the channel codec and queue it under `route`.
    pub fn send_value<T: Serialize + ?Sized>(&self, route: i32, value: &T) -> Result<()> {
        let codec = self.inner.codec;
        let payload = codec.encode(value)?;
        self.send_message(&ProtocolMessage::new(route, codec.kind(), payload))
    }

    /// Close the connection. Idempotent.
    ///
    /// Frames already queued are flushed. The close event runs on the worker
    /// after every task scheduled before it.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        tracing::debug!(connection_id = self.inner.id, "closing channel");

        self.inner.cancel.cancel();
        self.inner.writer.close();

        if let Some(hook) = self.inner.on_closed.lock().take() {
            hook(self.inner.id);
        }

        if self.inner.opened.load(Ordering::Acquire) {
            let channel = self.clone();
            let scheduled = self.later_run(move || {
                for handler in &channel.inner.lifecycle {
                    handler.on_close(&channel);
                }
            });
            if let Err(e) = scheduled {
                tracing::warn!(connection_id = self.inner.id, "close event dropped: {}", e);
            }
        }
    }

    /// Feed raw socket bytes through the frame buffer.
    ///
    /// Every complete frame becomes a pooled envelope dispatched on the worker.
    /// Returns how many frames were extracted. An error means the peer broke
    /// the protocol and the connection must be closed; valid frames that
    /// arrived in the same read are dropped with it.
    pub fn on_read(&self, frames: &mut FrameBuffer, data: &[u8]) -> Result<usize> {
        let extracted = frames.push(data)?;
        let count = extracted.len();

        for frame in extracted {
            if self.refusing_inbound() {
                self.send_closing_once();
                continue;
            }

            let mut msg = self.inner.messages.acquire();
            self.inner.frame_codec.read_message(frame, &mut msg)?;

            let channel = self.clone();
            self.later_run(move || channel.dispatch(msg))?;
        }

        Ok(count)
    }

    fn refusing_inbound(&self) -> bool {
        self.inner
            .refuse_inbound
            .as_ref()
            .map(|refuse| refuse())
            .unwrap_or(false)
    }

    fn send_closing_once(&self) {
        if !self.inner.closing_sent.swap(true, Ordering::AcqRel) {
            if let Err(e) = self.send_message(&ProtocolMessage::closing()) {
                tracing::debug!(connection_id = self.inner.id, "closing envelope not sent: {}", e);
            }
        }
    }

    /// Run the interceptor and handler chains for one message.
    ///
    /// The pooled envelope returns to its pool when this returns.
    fn dispatch(&self, mut msg: Pooled<ProtocolMessage>) {
        if self.is_closed() {
            return;
        }

        for interceptor in &self.inner.interceptors {
            if !interceptor.before(self, &msg) {
                return;
            }
        }

        for handler in &self.inner.handlers {
            if self.is_closed() {
                break;
            }
            if let Err(e) = handler.on_message(self, &mut msg) {
                tracing::warn!(
                    connection_id = self.inner.id,
                    route = msg.route,
                    "message handler failed: {}",
                    e
                );
                break;
            }
        }

        for interceptor in self.inner.interceptors.iter().rev() {
            interceptor.after(self, &msg);
        }
    }
}

/// Per-connection read task: socket bytes to frames until EOF, error or close.
async fn read_loop(channel: Channel, mut reader: BoxedReader) {
    let mut frames = FrameBuffer::new(channel.inner.frame_codec);
    let mut buf = vec![0u8; channel.inner.read_buffer_size];
    let cancel = channel.inner.cancel.clone();

    loop {
        let n = tokio::select! {
            _ = cancel.cancelled() => {
                tracing::trace!(connection_id = channel.id(), "read loop cancelled");
                break;
            }
            read = reader.read(&mut buf) => match read {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    tracing::debug!(connection_id = channel.id(), "read error: {}", e);
                    break;
                }
            },
        };

        if let Err(e) = channel.on_read(&mut frames, &buf[..n]) {
            tracing::warn!(
                connection_id = channel.id(),
                peer = channel.peer(),
                "protocol violation, closing: {}",
                e
            );
            break;
        }
    }

    channel.close();
}
