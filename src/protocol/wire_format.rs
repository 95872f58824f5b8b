//! Wire format encoding and decoding.
//!
//! Outbound (client → peer) header, 5 bytes:
//! ```text
//! ┌────────┬──────────┐
//! │ Kind   │ Req ID   │
//! │ 1 byte │ 4 bytes  │
//! │        │ uint32 BE│
//! └────────┴──────────┘
//! ```
//!
//! Inbound (peer → client) fragment-start header, 9 bytes, followed by the
//! first chunk of the payload:
//! ```text
//! ┌────────┬──────────┬──────────┬─────────────────┐
//! │ Kind   │ Req ID   │ Length   │ First chunk ... │
//! │ 1 byte │ 4 bytes  │ 4 bytes  │                 │
//! │        │ uint32 BE│ uint32 BE│                 │
//! └────────┴──────────┴──────────┴─────────────────┘
//! ```
//!
//! All multi-byte integers are Big Endian.

use crate::error::{GuiError, Result};

/// Outbound header size in bytes.
pub const OUTBOUND_HEADER_SIZE: usize = 5;

/// Inbound fragment-start header size in bytes.
pub const INBOUND_HEADER_SIZE: usize = 9;

/// Default maximum accepted declared payload length (1 MiB).
pub const DEFAULT_MAX_PAYLOAD: u32 = 1024 * 1024;

/// Packet kinds sent by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ClientKind {
    RequestDescriptor = 0x00,
    SetValue = 0x01,
}

impl TryFrom<u8> for ClientKind {
    type Error = GuiError;

    fn try_from(byte: u8) -> Result<Self> {
        match byte {
            0x00 => Ok(ClientKind::RequestDescriptor),
            0x01 => Ok(ClientKind::SetValue),
            other => Err(GuiError::Protocol(format!("Unknown client packet kind {other:#04x}"))),
        }
    }
}

/// Packet kinds sent by the peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PeerKind {
    DescriptorData = 0x00,
    ValueUpdate = 0x01,
}

impl TryFrom<u8> for PeerKind {
    type Error = GuiError;

    fn try_from(byte: u8) -> Result<Self> {
        match byte {
            0x00 => Ok(PeerKind::DescriptorData),
            0x01 => Ok(PeerKind::ValueUpdate),
            other => Err(GuiError::Protocol(format!("Unknown peer packet kind {other:#04x}"))),
        }
    }
}

/// Header of a client packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutboundHeader {
    pub kind: ClientKind,
    pub request_id: u32,
}

impl OutboundHeader {
    pub fn new(kind: ClientKind, request_id: u32) -> Self {
        Self { kind, request_id }
    }

    /// Encode header to bytes (Big Endian).
    ///
    /// # Example
    ///
    /// ```
    /// use blegui_client::protocol::{ClientKind, OutboundHeader};
    ///
    /// let bytes = OutboundHeader::new(ClientKind::SetValue, 42).encode();
    /// assert_eq!(bytes, [0x01, 0, 0, 0, 42]);
    /// ```
    pub fn encode(&self) -> [u8; OUTBOUND_HEADER_SIZE] {
        let mut buf = [0u8; OUTBOUND_HEADER_SIZE];
        buf[0] = self.kind as u8;
        buf[1..5].copy_from_slice(&self.request_id.to_be_bytes());
        buf
    }

    /// Decode a client header from an outbound packet.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < OUTBOUND_HEADER_SIZE {
            return Err(GuiError::Framing(format!(
                "client packet of {} bytes is shorter than its header",
                buf.len()
            )));
        }
        Ok(Self {
            kind: ClientKind::try_from(buf[0])?,
            request_id: u32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]),
        })
    }
}

/// Header announcing a (possibly fragmented) peer packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InboundHeader {
    pub kind: PeerKind,
    pub request_id: u32,
    /// Total payload length across all fragments.
    pub declared_length: u32,
}

impl InboundHeader {
    pub fn new(kind: PeerKind, request_id: u32, declared_length: u32) -> Self {
        Self {
            kind,
            request_id,
            declared_length,
        }
    }

    pub fn encode(&self) -> [u8; INBOUND_HEADER_SIZE] {
        let mut buf = [0u8; INBOUND_HEADER_SIZE];
        buf[0] = self.kind as u8;
        buf[1..5].copy_from_slice(&self.request_id.to_be_bytes());
        buf[5..9].copy_from_slice(&self.declared_length.to_be_bytes());
        buf
    }

    /// Decode the header at the start of a notification.
    ///
    /// Returns the header and the first payload chunk that follows it.
    ///
    /// # Example
    ///
    /// ```
    /// use blegui_client::protocol::{InboundHeader, PeerKind};
    ///
    /// let bytes = [0x01, 0, 0, 0, 7, 0, 0, 0, 3, b'a', b'b'];
    /// let (header, chunk) = InboundHeader::decode(&bytes).unwrap();
    /// assert_eq!(header.kind, PeerKind::ValueUpdate);
    /// assert_eq!(header.request_id, 7);
    /// assert_eq!(header.declared_length, 3);
    /// assert_eq!(chunk, b"ab");
    /// ```
    pub fn decode(buf: &[u8]) -> Result<(Self, &[u8])> {
        if buf.len() < INBOUND_HEADER_SIZE {
            return Err(GuiError::Framing(format!(
                "notification of {} bytes is shorter than the {} byte packet header",
                buf.len(),
                INBOUND_HEADER_SIZE
            )));
        }

        let header = Self {
            kind: PeerKind::try_from(buf[0])?,
            request_id: u32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]),
            declared_length: u32::from_be_bytes([buf[5], buf[6], buf[7], buf[8]]),
        };

        Ok((header, &buf[INBOUND_HEADER_SIZE..]))
    }

    /// Validate the declared length against the configured maximum.
    pub fn validate(&self, max_payload: u32) -> Result<()> {
        if self.declared_length > max_payload {
            return Err(GuiError::Framing(format!(
                "Payload size {} exceeds maximum {}",
                self.declared_length, max_payload
            )));
        }
        Ok(())
    }
}
