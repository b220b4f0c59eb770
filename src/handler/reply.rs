//! Handler return types.
//!
//! A route handler's return value decides what goes back to the client:
//!
//! | Return            | Output kind     | Sent                                      |
//! |-------------------|-----------------|-------------------------------------------|
//! | `()`              | `None`          | nothing (one-way)                         |
//! | `Option<R>`       | `R`'s kind      | `R` when `Some`                           |
//! | [`RawReply`]      | `RawBytes`      | body as is, codec `Raw`                   |
//! | [`Typed<T>`]      | `TypedMessage`  | value encoded with the request codec      |
//! | `ProtocolMessage` | `FullEnvelope`  | the envelope, sequence filled if unset    |

use bytes::Bytes;
use serde::Serialize;

use super::RequestContext;
use crate::error::Result;
use crate::protocol::{CodecKind, ProtocolMessage};

/// What a registered handler produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    None,
    RawBytes,
    TypedMessage,
    FullEnvelope,
}

/// Conversion of a handler's return value into an outbound envelope.
pub trait Reply {
    const KIND: OutputKind;

    /// `Ok(None)` means nothing is sent.
    fn into_reply(self, ctx: &RequestContext<'_>) -> Result<Option<ProtocolMessage>>;
}

impl Reply for () {
    const KIND: OutputKind = OutputKind::None;

    fn into_reply(self, _ctx: &RequestContext<'_>) -> Result<Option<ProtocolMessage>> {
        Ok(None)
    }
}

impl<R: Reply> Reply for Option<R> {
    const KIND: OutputKind = R::KIND;

    fn into_reply(self, ctx: &RequestContext<'_>) -> Result<Option<ProtocolMessage>> {
        match self {
            Some(reply) => reply.into_reply(ctx),
            None => Ok(None),
        }
    }
}

/// Already-encoded reply body.
#[derive(Debug, Clone)]
pub struct RawReply {
    pub route: i32,
    pub body: Bytes,
}

impl RawReply {
    pub fn new(route: i32, body: impl Into<Bytes>) -> Self {
        Self {
            route,
            body: body.into(),
        }
    }
}

impl Reply for RawReply {
    const KIND: OutputKind = OutputKind::RawBytes;

    fn into_reply(self, ctx: &RequestContext<'_>) -> Result<Option<ProtocolMessage>> {
        Ok(Some(
            ProtocolMessage::new(self.route, CodecKind::Raw, self.body)
                .with_sequence(ctx.sequence()),
        ))
    }
}

/// Typed reply, encoded with the codec the request arrived in.
#[derive(Debug, Clone)]
pub struct Typed<T> {
    pub route: i32,
    pub value: T,
}

impl<T> Typed<T> {
    pub fn new(route: i32, value: T) -> Self {
        Self { route, value }
    }
}

impl<T: Serialize> Reply for Typed<T> {
    const KIND: OutputKind = OutputKind::TypedMessage;

    fn into_reply(self, ctx: &RequestContext<'_>) -> Result<Option<ProtocolMessage>> {
        let codec = ctx.codec();
        let payload = codec.encode(&self.value)?;
        Ok(Some(
            ProtocolMessage::new(self.route, codec.kind(), payload).with_sequence(ctx.sequence()),
        ))
    }
}

impl Reply for ProtocolMessage {
    const KIND: OutputKind = OutputKind::FullEnvelope;

    fn into_reply(mut self, ctx: &RequestContext<'_>) -> Result<Option<ProtocolMessage>> {
        if self.sequence == 0 {
            self.sequence = ctx.sequence();
        }
        Ok(Some(self))
    }
}
