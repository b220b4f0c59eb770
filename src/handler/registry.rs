//! Handler registry for dispatching envelopes by route code.
//!
//! Handlers are registered with their concrete input and output types. Each
//! route keeps its own pool of input values, so decoding a request reuses a
//! previously reset value instead of allocating.
//!
//! # Example
//!
//! ```ignore
//! use smartnet::handler::{RegistryBuilder, RequestContext, Typed};
//!
//! let mut registry = RegistryBuilder::new();
//! registry.register(1001, "ping", |ctx: &RequestContext, _ch: &Channel, req: &mut Ping| {
//!     Typed::new(1005, Pong { n: req.n })
//! })?;
//! let registry = registry.build();
//! ```

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;

use super::{OutputKind, Reply, RequestContext};
use crate::channel::{Channel, MessageHandler};
use crate::codec::Codec;
use crate::error::{Result, SmartError};
use crate::pool::{Pool, Resettable};
use crate::protocol::ProtocolMessage;

/// Failure while running one route.
enum Invocation {
    /// Payload did not decode; the peer is suspicious.
    Decode(SmartError),
    /// Reply could not be built.
    Reply(SmartError),
}

/// Type-erased route handler.
trait Route: Send + Sync + 'static {
    fn invoke(
        &self,
        ctx: &RequestContext<'_>,
        channel: &Channel,
        payload: &[u8],
    ) -> std::result::Result<Option<ProtocolMessage>, Invocation>;

    fn inputs_in_use(&self) -> usize;
}

/// Decodes into a pooled `In`, calls the handler, converts its `Out`.
struct TypedRoute<F, In, Out>
where
    In: Resettable,
{
    handler: F,
    inputs: Pool<In>,
    _phantom: PhantomData<fn() -> Out>,
}

impl<F, In, Out> Route for TypedRoute<F, In, Out>
where
    F: Fn(&RequestContext<'_>, &Channel, &mut In) -> Out + Send + Sync + 'static,
    In: Resettable + DeserializeOwned + Send + 'static,
    Out: Reply + 'static,
{
    fn invoke(
        &self,
        ctx: &RequestContext<'_>,
        channel: &Channel,
        payload: &[u8],
    ) -> std::result::Result<Option<ProtocolMessage>, Invocation> {
        let mut input = self.inputs.acquire();
        ctx.codec()
            .decode_into(payload, &mut *input)
            .map_err(Invocation::Decode)?;

        let out = (self.handler)(ctx, channel, &mut *input);
        // Release the input before the reply is encoded and queued
        drop(input);

        out.into_reply(ctx).map_err(Invocation::Reply)
    }

    fn inputs_in_use(&self) -> usize {
        self.inputs.in_use()
    }
}

/// A registered route.
pub struct HandlerDefinition {
    route: i32,
    name: String,
    output: OutputKind,
    handler: Box<dyn Route>,
}

impl HandlerDefinition {
    #[inline]
    pub fn route(&self) -> i32 {
        self.route
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn output_kind(&self) -> OutputKind {
        self.output
    }

    /// Pooled inputs currently checked out by in-flight requests.
    pub fn inputs_in_use(&self) -> usize {
        self.handler.inputs_in_use()
    }
}

impl std::fmt::Debug for HandlerDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerDefinition")
            .field("route", &self.route)
            .field("name", &self.name)
            .field("output", &self.output)
            .finish()
    }
}

/// A group of related handlers registered together.
pub trait Module: Send + Sync {
    fn name(&self) -> &str;

    fn register(&self, registry: &mut RegistryBuilder) -> Result<()>;
}

/// Mutable registry used while composing the server.
#[derive(Default)]
pub struct RegistryBuilder {
    routes: HashMap<i32, HandlerDefinition>,
    modules: Vec<String>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `route`.
    ///
    /// Route codes must be positive and unused. A rejected registration is
    /// logged and returned; the registry is left unchanged.
    pub fn register<F, In, Out>(&mut self, route: i32, name: &str, handler: F) -> Result<()>
    where
        F: Fn(&RequestContext<'_>, &Channel, &mut In) -> Out + Send + Sync + 'static,
        In: Resettable + DeserializeOwned + Send + 'static,
        Out: Reply + 'static,
    {
        if route <= 0 {
            return Err(self.reject(route, name, "route code must be positive"));
        }
        if let Some(existing) = self.routes.get(&route) {
            let reason = format!("route already handled by `{}`", existing.name);
            return Err(self.reject(route, name, &reason));
        }

        tracing::debug!(route, name, "register route handler");
        self.routes.insert(
            route,
            HandlerDefinition {
                route,
                name: name.to_string(),
                output: Out::KIND,
                handler: Box::new(TypedRoute {
                    handler,
                    inputs: Pool::<In>::new(),
                    _phantom: PhantomData,
                }),
            },
        );
        Ok(())
    }

    fn reject(&self, route: i32, name: &str, reason: &str) -> SmartError {
        tracing::warn!(route, name, "{}", reason);
        SmartError::Registration {
            name: name.to_string(),
            reason: format!("route {}: {}", route, reason),
        }
    }

    /// Let `module` register its handlers.
    ///
    /// Returns the first registration error; handlers registered before it
    /// stay registered.
    pub fn module<M: Module + ?Sized>(&mut self, module: &M) -> Result<()> {
        tracing::debug!(module = module.name(), "register module");
        self.modules.push(module.name().to_string());
        module.register(self)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Freeze into a shareable registry.
    pub fn build(self) -> Arc<HandlerRegistry> {
        Arc::new(HandlerRegistry {
            routes: self.routes,
            modules: self.modules,
        })
    }
}

/// Immutable route table shared by every channel.
pub struct HandlerRegistry {
    routes: HashMap<i32, HandlerDefinition>,
    modules: Vec<String>,
}

impl HandlerRegistry {
    pub fn definition(&self, route: i32) -> Option<&HandlerDefinition> {
        self.routes.get(&route)
    }

    /// Like [`HandlerRegistry::definition`], failing with
    /// [`SmartError::RouteNotFound`].
    pub fn require(&self, route: i32) -> Result<&HandlerDefinition> {
        self.routes
            .get(&route)
            .ok_or(SmartError::RouteNotFound(route))
    }

    pub fn contains(&self, route: i32) -> bool {
        self.routes.contains_key(&route)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Names of the modules that registered handlers, in registration order.
    pub fn modules(&self) -> &[String] {
        &self.modules
    }

    /// Run the handler for `msg` on `channel`.
    ///
    /// - Unknown route: logged and dropped.
    /// - Unresolvable codec or undecodable payload: the channel is closed and
    ///   the handler is not invoked.
    /// - Otherwise the reply, if any, is sent with the request's sequence.
    pub fn dispatch(&self, channel: &Channel, msg: &ProtocolMessage) -> Result<()> {
        let def = match self.require(msg.route) {
            Ok(def) => def,
            Err(e) => {
                tracing::info!(connection_id = channel.id(), "{}, dropped", e);
                return Ok(());
            }
        };

        let codec = match Codec::resolve(msg.codec, channel.codec()) {
            Ok(codec) => codec,
            Err(e) => {
                channel.close();
                return Err(e);
            }
        };

        let ctx = RequestContext::new(msg, codec, channel.id());
        match def.handler.invoke(&ctx, channel, &msg.payload) {
            Ok(Some(reply)) => channel.send_message(&reply),
            Ok(None) => Ok(()),
            Err(Invocation::Decode(e)) => {
                tracing::info!(
                    connection_id = channel.id(),
                    route = msg.route,
                    handler = %def.name,
                    "payload decode failed, closing suspicious channel"
                );
                channel.close();
                Err(e)
            }
            Err(Invocation::Reply(e)) => Err(e),
        }
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut routes: Vec<_> = self.routes.keys().collect();
        routes.sort();
        f.debug_struct("HandlerRegistry")
            .field("routes", &routes)
            .field("modules", &self.modules)
            .finish()
    }
}

/// Message handler that feeds every envelope to a [`HandlerRegistry`].
#[derive(Clone)]
pub struct RouteDispatcher {
    registry: Arc<HandlerRegistry>,
}

impl RouteDispatcher {
    pub fn new(registry: Arc<HandlerRegistry>) -> Self {
        Self { registry }
    }
}

impl MessageHandler for RouteDispatcher {
    fn on_message(&self, channel: &Channel, msg: &mut ProtocolMessage) -> Result<()> {
        self.registry.dispatch(channel, msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::test_support::detached_channel;
    use crate::codec::RawPayload;
    use crate::handler::{RawReply, Typed};
    use crate::protocol::CodecKind;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Default, Deserialize, Serialize, PartialEq)]
    struct Ping {
        n: u32,
    }

    impl Resettable for Ping {}

    fn ping_handler(_ctx: &RequestContext<'_>, _ch: &Channel, req: &mut Ping) -> Typed<Ping> {
        Typed::new(1005, Ping { n: req.n + 1 })
    }

    #[test]
    fn test_register_and_lookup() {
        let mut builder = RegistryBuilder::new();
        builder.register(1001, "ping", ping_handler).unwrap();
        builder
            .register(1002, "notify", |_: &RequestContext<'_>, _: &Channel, _: &mut Ping| ())
            .unwrap();
        let registry = builder.build();

        let def = registry.definition(1001).unwrap();
        assert_eq!(def.name(), "ping");
        assert_eq!(def.output_kind(), OutputKind::TypedMessage);
        assert_eq!(
            registry.definition(1002).unwrap().output_kind(),
            OutputKind::None
        );
        assert!(!registry.contains(9));
        assert!(matches!(registry.require(9), Err(SmartError::RouteNotFound(9))));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_duplicate_route_rejected() {
        let mut builder = RegistryBuilder::new();
        builder.register(1001, "ping", ping_handler).unwrap();
        let err = builder.register(1001, "ping-again", ping_handler).unwrap_err();
        match err {
            SmartError::Registration { name, reason } => {
                assert_eq!(name, "ping-again");
                assert!(reason.contains("`ping`"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(builder.build().definition(1001).unwrap().name(), "ping");
    }

    #[test]
    fn test_non_positive_route_rejected() {
        let mut builder = RegistryBuilder::new();
        assert!(builder.register(0, "zero", ping_handler).is_err());
        assert!(builder.register(-1, "negative", ping_handler).is_err());
        assert!(builder.is_empty());
    }

    #[test]
    fn test_module_registration() {
        struct Game;
        impl Module for Game {
            fn name(&self) -> &str {
                "game"
            }
            fn register(&self, registry: &mut RegistryBuilder) -> Result<()> {
                registry.register(1001, "ping", ping_handler)?;
                registry.register(
                    1003,
                    "raw",
                    |_: &RequestContext<'_>, _: &Channel, body: &mut RawPayload| {
                        RawReply::new(1004, body.0.clone())
                    },
                )
            }
        }

        let mut builder = RegistryBuilder::new();
        builder.module(&Game).unwrap();
        let registry = builder.build();
        assert_eq!(registry.modules(), &["game".to_string()]);
        assert_eq!(
            registry.definition(1003).unwrap().output_kind(),
            OutputKind::RawBytes
        );
    }

    #[tokio::test]
    async fn test_dispatch_unknown_route_is_dropped() {
        let channel = detached_channel();
        let registry = RegistryBuilder::new().build();
        let msg = ProtocolMessage::new(77, CodecKind::Json, &b"{}"[..]);
        registry.dispatch(&channel, &msg).unwrap();
        assert!(!channel.is_closed());
    }

    #[tokio::test]
    async fn test_dispatch_decode_failure_closes_and_releases() {
        let channel = detached_channel();
        let mut builder = RegistryBuilder::new();
        builder.register(1001, "ping", ping_handler).unwrap();
        let registry = builder.build();

        let msg = ProtocolMessage::new(1001, CodecKind::Json, &b"not json"[..]);
        assert!(registry.dispatch(&channel, &msg).is_err());
        assert!(channel.is_closed());
        assert_eq!(registry.definition(1001).unwrap().inputs_in_use(), 0);
    }

    #[tokio::test]
    async fn test_dispatch_unsupported_codec_closes() {
        let channel = detached_channel();
        let mut builder = RegistryBuilder::new();
        builder.register(1001, "ping", ping_handler).unwrap();
        let registry = builder.build();

        let msg = ProtocolMessage::new(1001, CodecKind::Proto, &b""[..]);
        assert!(registry.dispatch(&channel, &msg).is_err());
        assert!(channel.is_closed());
    }

    #[tokio::test]
    async fn test_dispatch_invokes_handler_and_releases_input() {
        use std::sync::atomic::{AtomicU32, Ordering};
        let seen = Arc::new(AtomicU32::new(0));
        let sink = seen.clone();

        let mut builder = RegistryBuilder::new();
        builder
            .register(
                1001,
                "ping",
                move |ctx: &RequestContext<'_>, _: &Channel, req: &mut Ping| {
                    assert_eq!(ctx.codec(), Codec::Json);
                    sink.store(req.n, Ordering::SeqCst);
                },
            )
            .unwrap();
        let registry = builder.build();

        let channel = detached_channel();
        let msg = ProtocolMessage::new(1001, CodecKind::Json, &br#"{"n":41}"#[..]);
        registry.dispatch(&channel, &msg).unwrap();

        assert_eq!(seen.load(Ordering::SeqCst), 41);
        assert_eq!(registry.definition(1001).unwrap().inputs_in_use(), 0);
        assert!(!channel.is_closed());
    }

    #[tokio::test]
    async fn test_pooled_input_survives_dispatches() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        static TALLY_DROPS: AtomicUsize = AtomicUsize::new(0);

        #[derive(Default, Deserialize)]
        struct Tally {
            label: String,
            items: Vec<u32>,
        }

        impl Resettable for Tally {
            fn reset(&mut self) {
                self.label.clear();
                self.items.clear();
            }
        }

        impl Drop for Tally {
            fn drop(&mut self) {
                TALLY_DROPS.fetch_add(1, Ordering::SeqCst);
            }
        }

        let buffers = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = buffers.clone();
        let mut builder = RegistryBuilder::new();
        builder
            .register(
                2001,
                "tally",
                move |_: &RequestContext<'_>, _: &Channel, req: &mut Tally| {
                    assert_eq!(req.items.len(), 3);
                    sink.lock().push(req.items.as_ptr() as usize);
                },
            )
            .unwrap();
        let registry = builder.build();
        let channel = detached_channel();

        for n in 0..5 {
            let body = format!(r#"{{"label":"round-{}","items":[{},{},{}]}}"#, n, n, n + 1, n + 2);
            let msg = ProtocolMessage::new(2001, CodecKind::Json, body.into_bytes());
            registry.dispatch(&channel, &msg).unwrap();
        }

        assert_eq!(TALLY_DROPS.load(Ordering::SeqCst), 0);
        let buffers = buffers.lock();
        assert_eq!(buffers.len(), 5);
        assert!(buffers.iter().all(|addr| *addr == buffers[0]));
        assert_eq!(registry.definition(2001).unwrap().inputs_in_use(), 0);
    }
}
