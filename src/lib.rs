//! # smartnet
//!
//! Connection-oriented service runtime for long-lived TCP or Unix-socket
//! clients exchanging length-prefixed binary frames.
//!
//! ## Architecture
//!
//! - **Transport**: tokio listeners and streams, split into boxed halves
//! - **Protocol**: length-prefixed frames carrying a routed envelope
//!   (sequence, route, header map, codec tag, payload)
//! - **Channel**: one actor per connection, pinned to one worker thread, with
//!   ordered lifecycle handlers, message handlers and interceptors
//! - **Worker pool**: fixed set of FIFO threads; channels are spread by a
//!   random, hash or round-robin strategy
//! - **Handlers**: typed route handlers with pooled inputs, grouped in modules
//! - **Server**: Prepared → Running → Stopping → Stopped with drain-before-stop
//!
//! ## Example
//!
//! ```ignore
//! use smartnet::channel::{append_handler, with_byte_order, with_codec, OriginStamp};
//! use smartnet::{ByteOrder, Codec, Server, ServerConfig, ValueLoader};
//!
//! #[tokio::main]
//! async fn main() -> smartnet::Result<()> {
//!     let server = Server::builder(ValueLoader::new(ServerConfig::default()))
//!         .initializer(with_codec(Codec::Json))
//!         .initializer(with_byte_order(ByteOrder::Big))
//!         .initializer(append_handler(|| OriginStamp))
//!         .route(1001, "ping", |_ctx, _ch, req: &mut Ping| Typed::new(1005, Pong::from(req)))
//!         .build()?;
//!
//!     let running = server.serve().await?;
//!     tokio::signal::ctrl_c().await?;
//!     server.shutdown().await?;
//!     running.cancelled().await;
//!     Ok(())
//! }
//! ```

pub mod channel;
pub mod codec;
pub mod config;
pub mod error;
pub mod handler;
pub mod pool;
pub mod protocol;
pub mod server;
pub mod transport;
pub mod worker;
pub mod writer;

mod client;

pub use channel::{
    Channel, ChannelHandler, ChannelInitializer, ConnectionId, Interceptor, MessageHandler,
    Outbound,
};
pub use client::{Client, ConnectOptions, DEFAULT_CONNECT_TIMEOUT};
pub use codec::{Codec, RawPayload};
pub use config::{ConfigLoader, FileLoader, ServerConfig, ValueLoader};
pub use error::{Result, SmartError};
pub use handler::{Module, RawReply, RegistryBuilder, RequestContext, Typed};
pub use pool::{Pool, Pooled, Resettable};
pub use protocol::{ByteOrder, CodecKind, Framing, ProtocolMessage};
pub use server::{Server, ServerBuilder, ServerState};
pub use tokio_util::sync::CancellationToken;
pub use transport::Network;
pub use worker::{LoadBalance, Worker};
pub use writer::WriterConfig;
