//! Handler module - typed route handlers and dispatch.
//!
//! Provides:
//! - [`RegistryBuilder`] / [`HandlerRegistry`] - route code to handler table
//! - [`Module`] - groups handlers registered together
//! - [`RequestContext`] - metadata of the request being handled
//! - [`Reply`] - what a handler's return value sends back
//! - [`RouteDispatcher`] - message handler that plugs a registry into a channel
//!
//! # Example
//!
//! ```ignore
//! use smartnet::channel::{append_handler, Channel};
//! use smartnet::handler::{RegistryBuilder, RequestContext, RouteDispatcher, Typed};
//!
//! let mut builder = RegistryBuilder::new();
//! builder.register(1001, "ping", |_ctx: &RequestContext, _ch: &Channel, req: &mut Ping| {
//!     Typed::new(1005, Pong { seq: req.seq })
//! })?;
//! let registry = builder.build();
//!
//! let init = append_handler(move || RouteDispatcher::new(registry.clone()));
//! ```

mod context;
mod registry;
mod reply;

pub use context::RequestContext;
pub use registry::{HandlerDefinition, HandlerRegistry, Module, RegistryBuilder, RouteDispatcher};
pub use reply::{OutputKind, RawReply, Reply, Typed};
