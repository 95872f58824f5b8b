//! Segment reassembler for payloads split across notifications.
//!
//! Uses `bytes::BytesMut` for buffer management. A reassembler is created
//! for one logical packet with a known total length and accumulates
//! fragments in arrival order:
//! - `Collecting`: offset < expected length
//! - `Retired`: the full payload was handed out, further fragments are rejected
//!
//! # Example
//!
//! ```
//! use blegui_client::protocol::SegmentReassembler;
//!
//! let mut assembly = SegmentReassembler::new(5);
//! assert!(assembly.append(b"hel").unwrap().is_none());
//! let payload = assembly.append(b"lo").unwrap().unwrap();
//! assert_eq!(&payload[..], b"hello");
//! assert!(assembly.append(b"!").is_err());
//! ```

use bytes::{Bytes, BytesMut};

use crate::error::{GuiError, Result};

/// State machine for fragment accumulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Collecting,
    Retired,
}

/// Accumulates fragments until the declared length is reached.
///
/// Completion is reported exactly once; the offset never exceeds the
/// expected length because overflowing fragments are rejected before any
/// byte is copied.
#[derive(Debug)]
pub struct SegmentReassembler {
    buffer: BytesMut,
    expected: usize,
    state: State,
}

impl SegmentReassembler {
    /// Create a reassembler for a payload of `expected` bytes.
    pub fn new(expected: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(expected),
            expected,
            state: State::Collecting,
        }
    }

    /// Append the next fragment.
    ///
    /// Returns `Some(payload)` when this fragment completes the packet.
    ///
    /// # Errors
    ///
    /// `Framing` when the reassembler already completed or the fragment
    /// would overflow the expected length. State is left untouched.
    pub fn append(&mut self, fragment: &[u8]) -> Result<Option<Bytes>> {
        if self.state == State::Retired {
            return Err(GuiError::Framing(
                "fragment appended to a completed assembly".to_string(),
            ));
        }

        let offset = self.buffer.len();
        if offset + fragment.len() > self.expected {
            return Err(GuiError::Framing(format!(
                "fragment of {} bytes at offset {} overflows declared length {}",
                fragment.len(),
                offset,
                self.expected
            )));
        }

        self.buffer.extend_from_slice(fragment);

        if self.buffer.len() == self.expected {
            self.state = State::Retired;
            return Ok(Some(self.buffer.split().freeze()));
        }

        Ok(None)
    }

    /// Bytes accumulated so far.
    #[inline]
    pub fn offset(&self) -> usize {
        match self.state {
            State::Collecting => self.buffer.len(),
            State::Retired => self.expected,
        }
    }

    /// Declared total length.
    #[inline]
    pub fn expected(&self) -> usize {
        self.expected
    }

    /// Bytes still missing.
    #[inline]
    pub fn missing(&self) -> usize {
        self.expected - self.offset()
    }

    #[inline]
    pub fn is_complete(&self) -> bool {
        self.state == State::Retired
    }
}
