//! Read-side buffer contract used by the frame decoder.
//!
//! The decoder never pulls bytes off the socket itself. It inspects an
//! accumulated buffer through [`ReadBuffer`] and consumes bytes only once a
//! complete frame is present.

use bytes::{Buf, Bytes, BytesMut};

/// Minimal read-side view over buffered inbound bytes.
pub trait ReadBuffer {
    /// Number of buffered bytes.
    fn len(&self) -> usize;

    /// Whether no bytes are buffered.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Borrow the first `n` bytes without consuming them.
    ///
    /// Returns `None` if fewer than `n` bytes are buffered.
    fn peek(&self, n: usize) -> Option<&[u8]>;

    /// Discard the first `n` bytes.
    ///
    /// Returns `false` (and consumes nothing) if fewer than `n` bytes are buffered.
    fn skip(&mut self, n: usize) -> bool;

    /// Consume exactly `n` bytes.
    ///
    /// Returns `None` (and consumes nothing) if fewer than `n` bytes are buffered.
    fn read_exact(&mut self, n: usize) -> Option<Bytes>;
}

impl ReadBuffer for BytesMut {
    #[inline]
    fn len(&self) -> usize {
        BytesMut::len(self)
    }

    #[inline]
    fn peek(&self, n: usize) -> Option<&[u8]> {
        self.get(..n)
    }

    #[inline]
    fn skip(&mut self, n: usize) -> bool {
        if BytesMut::len(self) < n {
            return false;
        }
        self.advance(n);
        true
    }

    #[inline]
    fn read_exact(&mut self, n: usize) -> Option<Bytes> {
        if BytesMut::len(self) < n {
            return None;
        }
        // Zero-copy split
        Some(self.split_to(n).freeze())
    }
}
