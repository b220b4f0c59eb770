//! Channel initializers.
//!
//! An initializer is a closure run against a fresh [`ChannelSetup`] for every
//! new connection, before the channel exists. Handler-installing initializers
//! take a factory so each connection gets its own handler instance.
//!
//! ```ignore
//! let inits = vec![
//!     with_codec(Codec::Json),
//!     with_byte_order(ByteOrder::Big),
//!     append_handler(|| OriginStamp),
//!     append_handler(move || RouteDispatcher::new(registry.clone())),
//! ];
//! ```

use std::sync::Arc;

use super::{ChannelHandler, Interceptor, MessageHandler};
use crate::codec::Codec;
use crate::protocol::{ByteOrder, FrameCodec, Framing, DEFAULT_MAX_FRAME_SIZE};

/// Mutates a per-connection setup before the channel is built.
pub type ChannelInitializer = Arc<dyn Fn(&mut ChannelSetup) + Send + Sync>;

/// Everything a channel is built from.
pub struct ChannelSetup {
    /// Default payload codec. Unset falls back to [`Codec::Raw`].
    pub codec: Option<Codec>,
    /// Wire byte order. Unset falls back to little-endian.
    pub byte_order: Option<ByteOrder>,
    pub framing: Framing,
    pub max_frame_size: usize,
    pub lifecycle: Vec<Arc<dyn ChannelHandler>>,
    pub handlers: Vec<Arc<dyn MessageHandler>>,
    pub interceptors: Vec<Arc<dyn Interceptor>>,
}

impl Default for ChannelSetup {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_SIZE)
    }
}

impl ChannelSetup {
    pub fn new(max_frame_size: usize) -> Self {
        Self {
            codec: None,
            byte_order: None,
            framing: Framing::default(),
            max_frame_size,
            lifecycle: Vec::new(),
            handlers: Vec::new(),
            interceptors: Vec::new(),
        }
    }

    /// Run `initializers` in order against this setup.
    pub fn apply(&mut self, initializers: &[ChannelInitializer]) {
        for init in initializers {
            init(self);
        }
    }

    /// Frame codec and default payload codec, applying fallbacks.
    pub(crate) fn resolve_codecs(&self) -> (FrameCodec, Codec) {
        let order = self.byte_order.unwrap_or_else(|| {
            tracing::warn!("no byte order configured for channel, using little-endian");
            ByteOrder::default()
        });
        let codec = self.codec.unwrap_or_else(|| {
            tracing::warn!("no codec configured for channel, using raw");
            Codec::default()
        });
        let frame_codec =
            FrameCodec::new(self.framing, order).with_max_frame_size(self.max_frame_size);
        (frame_codec, codec)
    }
}

pub fn with_codec(codec: Codec) -> ChannelInitializer {
    Arc::new(move |setup| setup.codec = Some(codec))
}

pub fn with_byte_order(order: ByteOrder) -> ChannelInitializer {
    Arc::new(move |setup| setup.byte_order = Some(order))
}

pub fn with_framing(framing: Framing) -> ChannelInitializer {
    Arc::new(move |setup| setup.framing = framing)
}

pub fn with_max_frame_size(max: usize) -> ChannelInitializer {
    Arc::new(move |setup| setup.max_frame_size = max)
}

/// Append a message handler built by `factory`.
pub fn append_handler<H, F>(factory: F) -> ChannelInitializer
where
    H: MessageHandler,
    F: Fn() -> H + Send + Sync + 'static,
{
    Arc::new(move |setup| setup.handlers.push(Arc::new(factory())))
}

/// Put a message handler at the front of the chain.
pub fn prepend_handler<H, F>(factory: F) -> ChannelInitializer
where
    H: MessageHandler,
    F: Fn() -> H + Send + Sync + 'static,
{
    Arc::new(move |setup| setup.handlers.insert(0, Arc::new(factory())))
}

/// Insert a message handler at `pos`.
///
/// `pos <= 0` prepends, `pos >= len` appends.
pub fn insert_handler_at<H, F>(factory: F, pos: isize) -> ChannelInitializer
where
    H: MessageHandler,
    F: Fn() -> H + Send + Sync + 'static,
{
    Arc::new(move |setup| {
        let len = setup.handlers.len();
        let idx = if pos <= 0 {
            0
        } else {
            (pos as usize).min(len)
        };
        setup.handlers.insert(idx, Arc::new(factory()));
    })
}

pub fn append_interceptor<I, F>(factory: F) -> ChannelInitializer
where
    I: Interceptor,
    F: Fn() -> I + Send + Sync + 'static,
{
    Arc::new(move |setup| setup.interceptors.push(Arc::new(factory())))
}

/// Append an open/close observer.
pub fn on_lifecycle<L, F>(factory: F) -> ChannelInitializer
where
    L: ChannelHandler,
    F: Fn() -> L + Send + Sync + 'static,
{
    Arc::new(move |setup| setup.lifecycle.push(Arc::new(factory())))
}
