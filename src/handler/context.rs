//! Request context for route handlers.
//!
//! Borrowed view of the inbound envelope's metadata plus the codec the payload
//! was decoded with. Replies built from it inherit the request's sequence.

use std::collections::HashMap;

use crate::channel::ConnectionId;
use crate::codec::Codec;
use crate::protocol::{ProtocolMessage, HEADER_FROM};

/// Metadata of the request being handled.
#[derive(Debug, Clone, Copy)]
pub struct RequestContext<'a> {
    route: i32,
    sequence: i32,
    codec: Codec,
    header: &'a HashMap<String, String>,
    connection_id: ConnectionId,
}

impl<'a> RequestContext<'a> {
    /// Build a context for `msg`, decoded with `codec`, on `connection_id`.
    pub fn new(msg: &'a ProtocolMessage, codec: Codec, connection_id: ConnectionId) -> Self {
        Self {
            route: msg.route,
            sequence: msg.sequence,
            codec,
            header: &msg.header,
            connection_id,
        }
    }

    #[inline]
    pub fn route(&self) -> i32 {
        self.route
    }

    /// Client-chosen correlation number, echoed on replies.
    #[inline]
    pub fn sequence(&self) -> i32 {
        self.sequence
    }

    /// Codec the payload was decoded with. Typed replies use it too.
    #[inline]
    pub fn codec(&self) -> Codec {
        self.codec
    }

    #[inline]
    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    pub fn header(&self, key: &str) -> Option<&'a str> {
        self.header.get(key).map(String::as_str)
    }

    pub fn headers(&self) -> &'a HashMap<String, String> {
        self.header
    }

    /// Connection id stamped into the `from` header by
    /// [`OriginStamp`](crate::channel::OriginStamp), if present.
    pub fn origin(&self) -> Option<ConnectionId> {
        self.header(HEADER_FROM).and_then(|v| v.parse().ok())
    }
}
