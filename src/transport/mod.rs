//! Transport module - stream socket handling.
//!
//! Provides one listener/connection abstraction over:
//! - TCP sockets
//! - Unix domain sockets (Unix platforms)
//!
//! Channels only ever see the boxed read and write halves, so the same channel
//! and server logic runs on either socket family.

mod socket;

pub use socket::{connect, BoxedReader, BoxedWriter, Connection, Listener, Network};
