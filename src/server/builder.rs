//! Server composition.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use super::{Server, ServerInner, ServerState, TickFn};
use crate::channel::{append_handler, Channel, ChannelInitializer};
use crate::config::{ConfigLoader, ServerConfig};
use crate::error::Result;
use crate::handler::{Module, RegistryBuilder, Reply, RequestContext, RouteDispatcher};
use crate::pool::{Pool, Resettable};
use crate::worker::WorkerManager;

/// Called with the new configuration after every successful reload.
pub type ConfigChangeFn = Arc<dyn Fn(&ServerConfig) + Send + Sync>;

/// Builder for [`Server`].
///
/// # Example
///
/// ```ignore
/// let server = Server::builder(FileLoader::new("server.yaml")?)
///     .initializer(with_codec(Codec::Json))
///     .initializer(append_handler(|| OriginStamp))
///     .module(GameModule)
///     .on_tick(|_| Duration::from_secs(5))
///     .build()?;
/// ```
pub struct ServerBuilder {
    loader: Box<dyn ConfigLoader>,
    initializers: Vec<ChannelInitializer>,
    registry: RegistryBuilder,
    on_tick: Option<TickFn>,
    on_config_change: Option<ConfigChangeFn>,
}

impl ServerBuilder {
    pub fn new<L: ConfigLoader + 'static>(loader: L) -> Self {
        Self {
            loader: Box::new(loader),
            initializers: Vec::new(),
            registry: RegistryBuilder::new(),
            on_tick: None,
            on_config_change: None,
        }
    }

    /// Add a channel initializer. Initializers run in the order added.
    pub fn initializer(mut self, init: ChannelInitializer) -> Self {
        self.initializers.push(init);
        self
    }

    pub fn initializers<I>(mut self, inits: I) -> Self
    where
        I: IntoIterator<Item = ChannelInitializer>,
    {
        self.initializers.extend(inits);
        self
    }

    /// Register a module's handlers.
    ///
    /// Rejected registrations are logged by the registry and otherwise ignored.
    pub fn module<M: Module>(mut self, module: M) -> Self {
        let _ = self.registry.module(&module);
        self
    }

    /// Register a single route handler. See [`RegistryBuilder::register`].
    pub fn route<F, In, Out>(mut self, route: i32, name: &str, handler: F) -> Self
    where
        F: Fn(&RequestContext<'_>, &Channel, &mut In) -> Out + Send + Sync + 'static,
        In: Resettable + DeserializeOwned + Send + 'static,
        Out: Reply + 'static,
    {
        let _ = self.registry.register(route, name, handler);
        self
    }

    pub fn on_tick<F>(mut self, on_tick: F) -> Self
    where
        F: Fn(&CancellationToken) -> Duration + Send + Sync + 'static,
    {
        self.on_tick = Some(Arc::new(on_tick));
        self
    }

    pub fn on_config_change<F>(mut self, callback: F) -> Self
    where
        F: Fn(&ServerConfig) + Send + Sync + 'static,
    {
        self.on_config_change = Some(Arc::new(callback));
        self
    }

    /// Load the configuration, start the worker pool and freeze the registry.
    ///
    /// When any route is registered, a [`RouteDispatcher`] is appended as the
    /// last message handler of every channel.
    pub fn build(self) -> Result<Server> {
        let config = self.loader.load()?;
        config.validate()?;

        let workers = WorkerManager::new(config.workers, config.load_balance)?;
        let registry = self.registry.build();

        let mut initializers = self.initializers;
        if !registry.is_empty() {
            let dispatch = registry.clone();
            initializers.push(append_handler(move || RouteDispatcher::new(dispatch.clone())));
        }

        tracing::debug!(
            routes = registry.len(),
            initializers = initializers.len(),
            "server prepared"
        );

        Ok(Server {
            inner: Arc::new(ServerInner {
                config: ArcSwap::from_pointee(config),
                loader: self.loader,
                initializers,
                workers,
                registry,
                on_tick: self.on_tick,
                on_config_change: self.on_config_change,
                state: Mutex::new(ServerState::Prepared),
                stopping: Arc::new(AtomicBool::new(false)),
                running: CancellationToken::new(),
                channels: DashMap::new(),
                channel_count: AtomicUsize::new(0),
                next_id: AtomicU64::new(0),
                messages: Pool::new(),
                local_addr: Mutex::new(None),
                watch: Mutex::new(None),
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::with_codec;
    use crate::codec::Codec;
    use crate::config::ValueLoader;
    use crate::error::SmartError;
    use crate::handler::Typed;

    #[derive(Default, serde::Deserialize)]
    struct Ping {
        n: u32,
    }
    impl Resettable for Ping {}

    fn loader(workers: usize) -> ValueLoader {
        ValueLoader::new(ServerConfig {
            address: "127.0.0.1:0".into(),
            workers,
            ..ServerConfig::default()
        })
    }

    #[test]
    fn test_build_adds_dispatcher_for_routes() {
        let server = Server::builder(loader(2))
            .initializer(with_codec(Codec::Json))
            .route(
                1001,
                "ping",
                |_: &RequestContext<'_>, _: &Channel, req: &mut Ping| Typed::new(1005, req.n),
            )
            .build()
            .unwrap();

        assert_eq!(server.state(), ServerState::Prepared);
        assert_eq!(server.workers().len(), 2);
        assert!(server.registry().contains(1001));
        assert_eq!(server.inner.initializers.len(), 2);
    }

    #[test]
    fn test_build_without_routes_keeps_initializers() {
        let server = Server::builder(loader(1))
            .initializer(with_codec(Codec::Json))
            .build()
            .unwrap();
        assert!(server.registry().is_empty());
        assert_eq!(server.inner.initializers.len(), 1);
    }

    #[test]
    fn test_build_rejects_invalid_config() {
        let bad = ValueLoader::new(ServerConfig {
            address: String::new(),
            ..ServerConfig::default()
        });
        assert!(matches!(
            Server::builder(bad).build(),
            Err(SmartError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_serve_requires_initializer() {
        let server = Server::builder(loader(1)).build().unwrap();
        assert!(matches!(server.serve().await, Err(SmartError::Config(_))));
        assert_eq!(server.state(), ServerState::Prepared);
    }
}
