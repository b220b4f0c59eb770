//! Outbound connections.
//!
//! A [`Client`] dials a server and wraps the resulting [`Channel`]. It uses
//! the same initializers, frame codec and handler chains as server-side
//! channels, but runs them on its own single worker thread.
//!
//! # Example
//!
//! ```ignore
//! use smartnet::channel::{append_handler, with_codec};
//! use smartnet::{Client, ConnectOptions, Network};
//!
//! let client = Client::connect(
//!     Network::Tcp,
//!     "127.0.0.1:12345",
//!     &[with_codec(Codec::Json), append_handler(|| PongPrinter)],
//!     ConnectOptions::default(),
//! )
//! .await?;
//!
//! client.send_value(1001, &Ping { seq: 1 })?;
//! ```

use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::channel::{Channel, ChannelInitializer, ChannelOptions, ChannelSetup, ConnectionId};
use crate::error::Result;
use crate::protocol::DEFAULT_MAX_FRAME_SIZE;
use crate::transport::{self, Network};
use crate::worker::Worker;
use crate::writer::WriterConfig;

/// Default dial timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// Thread name prefix of client workers.
pub const CLIENT_THREAD_NAME: &str = "smart-client";

static NEXT_CLIENT_ID: AtomicU64 = AtomicU64::new(1);

/// Dial options.
#[derive(Clone)]
pub struct ConnectOptions {
    pub timeout: Duration,
    /// Close the connection when this token is cancelled.
    pub auto_close: Option<CancellationToken>,
    pub max_frame_size: usize,
    pub writer: WriterConfig,
    pub read_buffer_size: usize,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_CONNECT_TIMEOUT,
            auto_close: None,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            writer: WriterConfig::default(),
            read_buffer_size: crate::channel::DEFAULT_READ_BUFFER_SIZE,
        }
    }
}

impl ConnectOptions {
    /// Close the client once `token` is cancelled.
    pub fn auto_close(mut self, token: CancellationToken) -> Self {
        self.auto_close = Some(token);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// A dialed connection. Dereferences to its [`Channel`].
#[derive(Clone, Debug)]
pub struct Client {
    channel: Channel,
}

impl Client {
    /// Dial `address`, build the channel from `initializers` and start it.
    ///
    /// Fails with [`SmartError::ConnectTimeout`](crate::SmartError::ConnectTimeout)
    /// if the connection is not established within `options.timeout`.
    pub async fn connect(
        network: Network,
        address: &str,
        initializers: &[ChannelInitializer],
        options: ConnectOptions,
    ) -> Result<Client> {
        let conn = transport::connect(network, address, options.timeout).await?;

        let id: ConnectionId = NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed);
        let worker = Worker::spawn(CLIENT_THREAD_NAME, id as usize)?;

        let mut setup = ChannelSetup::new(options.max_frame_size);
        setup.apply(initializers);

        let cancel = match &options.auto_close {
            Some(token) => token.child_token(),
            None => CancellationToken::new(),
        };
        let channel_options = ChannelOptions {
            writer: options.writer,
            read_buffer_size: options.read_buffer_size,
            cancel,
            ..ChannelOptions::default()
        };
        let (channel, reader) = Channel::new(id, conn, setup, worker, channel_options);
        channel.start(reader, |id| tracing::debug!(client = id, "client closed"))?;
        tracing::debug!(client = id, peer = channel.peer(), "client connected");

        Ok(Client { channel })
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    pub fn into_channel(self) -> Channel {
        self.channel
    }
}

impl Deref for Client {
    type Target = Channel;

    fn deref(&self) -> &Channel {
        &self.channel
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SmartError;
    use crate::transport::Listener;

    #[tokio::test]
    async fn test_connect_and_auto_close() {
        let listener = Listener::bind(Network::Tcp, "127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accept = tokio::spawn(async move { listener.accept().await.unwrap() });

        let token = CancellationToken::new();
        let client = Client::connect(
            Network::Tcp,
            &addr,
            &[],
            ConnectOptions::default().auto_close(token.clone()),
        )
        .await
        .unwrap();
        let _server_side = accept.await.unwrap();

        assert!(!client.is_closed());
        assert_eq!(client.worker_index() as u64, client.id());

        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), client.closed())
            .await
            .unwrap();
        assert!(client.is_closed());
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = Listener::bind(Network::Tcp, "127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = Client::connect(Network::Tcp, &addr, &[], ConnectOptions::default()).await;
        assert!(matches!(
            result,
            Err(SmartError::Io(_)) | Err(SmartError::ConnectTimeout(_))
        ));
    }
}
