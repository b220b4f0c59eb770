//! Server module - listener, channel registry and lifecycle.
//!
//! ```text
//! Prepared ──serve()──► Running ──shutdown()──► Stopping ──drained──► Stopped
//! ```
//!
//! `serve` binds the listener and starts the accept loop, the optional tick
//! task and the configuration watch. `shutdown` waits for the worker pool to
//! drain (bounded by the configured deadline), then closes every channel. A
//! stopped server cannot be started again.
//!
//! While stopping, new connections get one closing envelope and are closed,
//! and frames on existing channels are answered with the closing envelope once
//! and dropped.

mod builder;
mod tick;

pub use builder::{ConfigChangeFn, ServerBuilder};
pub use tick::TickFn;

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;

use arc_swap::ArcSwap;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use crate::channel::{Channel, ChannelInitializer, ChannelOptions, ChannelSetup, ConnectionId};
use crate::config::{ConfigLoader, ConfigWatch, ServerConfig};
use crate::error::{Result, SmartError};
use crate::handler::HandlerRegistry;
use crate::pool::Pool;
use crate::protocol::ProtocolMessage;
use crate::transport::{Connection, Listener};
use crate::worker::WorkerManager;

/// Server lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Prepared,
    Running,
    Stopping,
    Stopped,
}

impl ServerState {
    pub fn as_str(self) -> &'static str {
        match self {
            ServerState::Prepared => "prepared",
            ServerState::Running => "running",
            ServerState::Stopping => "stopping",
            ServerState::Stopped => "stopped",
        }
    }
}

impl std::fmt::Display for ServerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

struct ServerInner {
    config: ArcSwap<ServerConfig>,
    loader: Box<dyn ConfigLoader>,
    initializers: Vec<ChannelInitializer>,
    workers: WorkerManager,
    registry: Arc<HandlerRegistry>,
    on_tick: Option<TickFn>,
    on_config_change: Option<ConfigChangeFn>,

    state: Mutex<ServerState>,
    /// Mirrors `state >= Stopping` for the read path.
    stopping: Arc<AtomicBool>,
    running: CancellationToken,

    channels: DashMap<ConnectionId, Channel>,
    channel_count: AtomicUsize,
    next_id: AtomicU64,
    messages: Pool<ProtocolMessage>,

    local_addr: Mutex<Option<String>>,
    watch: Mutex<Option<ConfigWatch>>,
}

/// A framed message server. Cheap to clone; clones share one server.
#[derive(Clone)]
pub struct Server {
    inner: Arc<ServerInner>,
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("state", &self.state())
            .field("address", &self.local_addr())
            .field("connections", &self.connection_count())
            .field("workers", &self.inner.workers.len())
            .finish()
    }
}

impl Server {
    /// Start composing a server whose configuration comes from `loader`.
    pub fn builder<L: ConfigLoader + 'static>(loader: L) -> ServerBuilder {
        ServerBuilder::new(loader)
    }

    pub fn state(&self) -> ServerState {
        *self.inner.state.lock()
    }

    /// Current configuration (reflects hot reloads).
    pub fn config(&self) -> Arc<ServerConfig> {
        self.inner.config.load_full()
    }

    /// Bound address once serving (`ip:port` or socket path).
    pub fn local_addr(&self) -> Option<String> {
        self.inner.local_addr.lock().clone()
    }

    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.inner.registry
    }

    pub fn workers(&self) -> &WorkerManager {
        &self.inner.workers
    }

    /// Open channel by connection id.
    pub fn get_channel(&self, id: ConnectionId) -> Option<Channel> {
        self.inner.channels.get(&id).map(|entry| entry.value().clone())
    }

    /// Number of open channels.
    pub fn connection_count(&self) -> usize {
        self.inner.channel_count.load(Ordering::Acquire)
    }

    /// Bind the listener and start serving.
    ///
    /// Returns the running token, cancelled when the server stops. Fails with
    /// [`SmartError::InvalidState`] unless the server is prepared; a bind
    /// failure leaves it prepared.
    pub async fn serve(&self) -> Result<CancellationToken> {
        self.expect_state(ServerState::Prepared)?;
        if self.inner.initializers.is_empty() {
            return Err(SmartError::Config(
                "no channel initializers configured".into(),
            ));
        }

        let config = self.inner.config.load_full();
        let listener = Listener::bind(config.network, &config.address).await?;
        let local_addr = listener.local_addr()?;

        {
            let mut state = self.inner.state.lock();
            if *state != ServerState::Prepared {
                return Err(SmartError::InvalidState {
                    expected: ServerState::Prepared.as_str(),
                    actual: state.as_str(),
                });
            }
            *state = ServerState::Running;
        }
        *self.inner.local_addr.lock() = Some(local_addr.clone());

        tracing::info!(
            service = %config.service_name,
            "serve run at {:?}://{}",
            config.network,
            local_addr
        );

        tokio::spawn(accept_loop(self.clone(), listener));

        if let Some(on_tick) = &self.inner.on_tick {
            tick::spawn_ticker(
                on_tick.clone(),
                self.inner.running.clone(),
                self.inner.stopping.clone(),
                tick::TICK_RESTART_DELAY,
            );
        }

        self.start_config_watch();

        Ok(self.inner.running.clone())
    }

    fn start_config_watch(&self) {
        let weak: Weak<ServerInner> = Arc::downgrade(&self.inner);
        let on_change = Arc::new(move |config: ServerConfig| {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            if let Err(e) = config.validate() {
                tracing::error!("reloaded config rejected: {}", e);
                return;
            }
            inner.config.store(Arc::new(config));
            tracing::debug!("server config changed");
            if let Some(callback) = &inner.on_config_change {
                callback(&inner.config.load());
            }
        });

        match self.inner.loader.watch(on_change) {
            Ok(watch) => {
                if watch.is_active() {
                    tracing::debug!("server config watcher started");
                }
                *self.inner.watch.lock() = Some(watch);
            }
            Err(e) => tracing::error!("server config watcher start error: {}", e),
        }
    }

    /// Drain the worker pool, close every channel and stop.
    ///
    /// Polls the pool every `drain_interval`; gives up waiting (with a
    /// warning) after `drain_deadline`. Fails with
    /// [`SmartError::InvalidState`] unless the server is running.
    pub async fn shutdown(&self) -> Result<()> {
        {
            let mut state = self.inner.state.lock();
            if *state != ServerState::Running {
                return Err(SmartError::InvalidState {
                    expected: ServerState::Running.as_str(),
                    actual: state.as_str(),
                });
            }
            *state = ServerState::Stopping;
        }
        self.inner.stopping.store(true, Ordering::Release);

        let started = Instant::now();
        let config = self.inner.config.load_full();
        let interval = config.drain_interval();
        let deadline = config.drain_deadline();

        loop {
            tokio::time::sleep(interval).await;
            let busy = self.inner.workers.running_worker_count();
            if busy == 0 {
                break;
            }
            if started.elapsed() >= deadline {
                tracing::warn!(
                    running_workers = busy,
                    "drain deadline {:?} exceeded, stopping anyway",
                    deadline
                );
                break;
            }
            tracing::info!(running_workers = busy, "waiting for tasks to finish");
        }

        self.inner.running.cancel();
        self.inner.watch.lock().take();

        let open: Vec<Channel> = self
            .inner
            .channels
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        for channel in open {
            channel.close();
        }

        *self.inner.state.lock() = ServerState::Stopped;
        tracing::info!("server stopped, cost: {:?}", started.elapsed());
        Ok(())
    }

    fn expect_state(&self, expected: ServerState) -> Result<()> {
        let actual = self.state();
        if actual != expected {
            return Err(SmartError::InvalidState {
                expected: expected.as_str(),
                actual: actual.as_str(),
            });
        }
        Ok(())
    }

    fn on_accept(&self, conn: Connection) {
        let inner = &self.inner;
        let config = inner.config.load_full();

        let mut setup = ChannelSetup::new(config.max_frame_size);
        setup.apply(&inner.initializers);

        if inner.stopping.load(Ordering::Acquire) {
            refuse(conn, &setup);
            return;
        }

        let id = inner.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let worker = inner.workers.assign(id);
        let stopping = inner.stopping.clone();
        let options = ChannelOptions {
            writer: config.writer_config(),
            read_buffer_size: config.read_buffer_size,
            messages: inner.messages.clone(),
            refuse_inbound: Some(Arc::new(move || stopping.load(Ordering::Acquire))),
            cancel: inner.running.child_token(),
        };

        let (channel, reader) = Channel::new(id, conn, setup, worker, options);
        inner.channels.insert(id, channel.clone());
        inner.channel_count.fetch_add(1, Ordering::AcqRel);
        tracing::debug!(
            connection_id = id,
            peer = channel.peer(),
            worker = channel.worker_index(),
            "channel opened"
        );

        let weak = Arc::downgrade(&self.inner);
        let started = channel.start(reader, move |id| {
            if let Some(inner) = weak.upgrade() {
                if inner.channels.remove(&id).is_some() {
                    inner.channel_count.fetch_sub(1, Ordering::AcqRel);
                }
            }
        });
        if let Err(e) = started {
            tracing::error!(connection_id = id, "channel start failed: {}", e);
            channel.close();
        }
    }
}

/// Send the closing envelope to a connection accepted while stopping, then
/// close it.
fn refuse(conn: Connection, setup: &ChannelSetup) {
    let (frame_codec, _) = setup.resolve_codecs();
    let closing = match frame_codec.encode(&ProtocolMessage::closing()) {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!("encode closing envelope: {}", e);
            return;
        }
    };

    tokio::spawn(async move {
        let (_reader, mut writer, peer) = conn.into_split();
        if let Err(e) = writer.write_all(&closing).await {
            tracing::debug!(peer = %peer, "closing envelope not delivered: {}", e);
        }
        let _ = writer.shutdown().await;
    });
}

fn is_transient_accept_error(err: &SmartError) -> bool {
    match err {
        SmartError::Io(e) => matches!(
            e.kind(),
            std::io::ErrorKind::ConnectionAborted
                | std::io::ErrorKind::ConnectionReset
                | std::io::ErrorKind::Interrupted
                | std::io::ErrorKind::WouldBlock
        ),
        _ => false,
    }
}

async fn accept_loop(server: Server, listener: Listener) {
    let running = server.inner.running.clone();
    loop {
        let accepted = tokio::select! {
            _ = running.cancelled() => break,
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok(conn) => server.on_accept(conn),
            Err(e) if is_transient_accept_error(&e) => {
                tracing::debug!("accept interrupted: {}", e);
            }
            Err(e) => {
                tracing::error!("serve listener error: {}", e);
                if server.state() == ServerState::Running {
                    if let Err(e) = server.shutdown().await {
                        tracing::error!("shutdown after listener failure: {}", e);
                    }
                }
                break;
            }
        }
    }
    tracing::debug!("accept loop stopped");
}
