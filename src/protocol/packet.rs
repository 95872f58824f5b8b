//! Reassembled peer packets with typed payload accessors.
//!
//! Also provides the peer-side builders used to produce notifications
//! (simulated peers, tests).
//!
//! # Example
//!
//! ```
//! use blegui_client::protocol::{build_inbound_packet, InboundHeader, PeerKind, ValueUpdate};
//! use blegui_client::value::TaggedValue;
//!
//! let update = ValueUpdate::new(vec!["Brightness".into()], TaggedValue::Int32(42));
//! let payload = update.encode_payload().unwrap();
//! let bytes = build_inbound_packet(PeerKind::ValueUpdate, 7, &payload);
//!
//! let (header, chunk) = InboundHeader::decode(&bytes).unwrap();
//! assert_eq!(header.declared_length as usize, chunk.len());
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use super::descriptor::DescriptorNode;
use super::wire_format::{InboundHeader, PeerKind, INBOUND_HEADER_SIZE};
use crate::codec::{encode_length_prefixed_string, encode_value, path_key, BufferReader};
use crate::error::{GuiError, Result};
use crate::value::TaggedValue;

/// A complete peer packet.
#[derive(Debug, Clone)]
pub struct InboundPacket {
    pub header: InboundHeader,
    /// Reassembled payload (`declared_length` bytes).
    pub payload: Bytes,
}

impl InboundPacket {
    pub fn new(header: InboundHeader, payload: Bytes) -> Self {
        Self { header, payload }
    }

    #[inline]
    pub fn kind(&self) -> PeerKind {
        self.header.kind
    }

    #[inline]
    pub fn request_id(&self) -> u32 {
        self.header.request_id
    }

    /// Parse a DescriptorData payload (UTF-8 JSON document).
    pub fn decode_descriptor(&self) -> Result<DescriptorNode> {
        self.expect_kind(PeerKind::DescriptorData)?;
        DescriptorNode::from_json(&self.payload)
    }

    /// Parse a ValueUpdate payload (`[path string][tagged value]`).
    pub fn decode_value_update(&self) -> Result<ValueUpdate> {
        self.expect_kind(PeerKind::ValueUpdate)?;

        let mut reader = BufferReader::new(&self.payload);
        let key = reader.read_string()?;
        let value = reader.read_value()?;

        if reader.remaining() > 0 {
            tracing::debug!(
                "ValueUpdate for '{}' carries {} trailing bytes",
                key,
                reader.remaining()
            );
        }

        Ok(ValueUpdate {
            path: key.split(',').map(str::to_string).collect(),
            value,
        })
    }

    fn expect_kind(&self, kind: PeerKind) -> Result<()> {
        if self.header.kind != kind {
            return Err(GuiError::Protocol(format!(
                "expected {:?} packet, got {:?}",
                kind, self.header.kind
            )));
        }
        Ok(())
    }
}

/// Path-addressed value carried by a ValueUpdate.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueUpdate {
    /// Path relative to the session root.
    pub path: Vec<String>,
    pub value: TaggedValue,
}

impl ValueUpdate {
    pub fn new(path: Vec<String>, value: TaggedValue) -> Self {
        Self { path, value }
    }

    /// Encode the payload as a peer would send it.
    pub fn encode_payload(&self) -> Result<Bytes> {
        let mut buf = BytesMut::new();
        buf.put(encode_length_prefixed_string(&path_key(&self.path)));
        buf.put(encode_value(&self.value)?);
        Ok(buf.freeze())
    }
}

/// Build a complete peer packet (header + payload) as one contiguous buffer.
///
/// Split it with [`fragment`] to emulate MTU-bounded notifications.
pub fn build_inbound_packet(kind: PeerKind, request_id: u32, payload: &[u8]) -> Vec<u8> {
    let header = InboundHeader::new(kind, request_id, payload.len() as u32);
    let mut buf = Vec::with_capacity(INBOUND_HEADER_SIZE + payload.len());
    buf.extend_from_slice(&header.encode());
    buf.extend_from_slice(payload);
    buf
}

/// Split a buffer into notification-sized fragments of at most `mtu` bytes.
pub fn fragment(packet: &[u8], mtu: usize) -> Vec<Bytes> {
    let mtu = mtu.max(1);
    packet
        .chunks(mtu)
        .map(Bytes::copy_from_slice)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::DescriptorKind;
    use crate::value::RgbwColor;

    fn packet(kind: PeerKind, request_id: u32, payload: &[u8]) -> InboundPacket {
        InboundPacket::new(
            InboundHeader::new(kind, request_id, payload.len() as u32),
            Bytes::copy_from_slice(payload),
        )
    }

    #[test]
    fn test_decode_value_update() {
        let update = ValueUpdate::new(
            vec!["Lights".into(), "Color".into()],
            TaggedValue::Rgbw(RgbwColor::new(1, 2, 3, 4)),
        );
        let payload = update.encode_payload().unwrap();
        let decoded = packet(PeerKind::ValueUpdate, 3, &payload)
            .decode_value_update()
            .unwrap();
        assert_eq!(decoded, update);
    }

    #[test]
    fn test_truncated_value_update_is_out_of_range() {
        let update = ValueUpdate::new(vec!["x".into()], TaggedValue::Int32(5));
        let payload = update.encode_payload().unwrap();
        let truncated = &payload[..payload.len() - 2];

        let result = packet(PeerKind::ValueUpdate, 3, truncated).decode_value_update();
        assert!(matches!(result, Err(GuiError::OutOfRange { .. })));
    }

    #[test]
    fn test_decode_descriptor() {
        let json = br#"{"type":"button","name":"Reset"}"#;
        let node = packet(PeerKind::DescriptorData, 1, json)
            .decode_descriptor()
            .unwrap();
        assert_eq!(node.name, "Reset");
        assert!(matches!(node.kind, DescriptorKind::Button));
    }

    #[test]
    fn test_kind_mismatch() {
        let result = packet(PeerKind::DescriptorData, 1, b"{}").decode_value_update();
        assert!(matches!(result, Err(GuiError::Protocol(_))));
    }

    #[test]
    fn test_build_and_fragment() {
        let bytes = build_inbound_packet(PeerKind::DescriptorData, 9, b"0123456789");
        assert_eq!(bytes.len(), INBOUND_HEADER_SIZE + 10);

        let fragments = fragment(&bytes, 8);
        assert_eq!(fragments.len(), 3);
        assert_eq!(fragments[0].len(), 8);
        assert_eq!(fragments[2].len(), 3);

        let joined: Vec<u8> = fragments.iter().flat_map(|f| f.iter().copied()).collect();
        assert_eq!(joined, bytes);
    }
}
