//! Outbound packet encoding.
//!
//! Uses `bytes::BytesMut`/`BufMut`, whose `put_*` integer methods are
//! Big Endian.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{GuiError, Result};
use crate::protocol::{ClientKind, OutboundHeader, OUTBOUND_HEADER_SIZE};
use crate::value::TaggedValue;

/// Incremental builder for a single client packet.
///
/// The header is written on construction; body fields are appended in
/// call order.
pub struct PacketBuilder {
    buf: BytesMut,
}

impl PacketBuilder {
    /// Start a packet with the given kind and request id.
    pub fn new(kind: ClientKind, request_id: u32) -> Self {
        let mut buf = BytesMut::with_capacity(64);
        buf.put_slice(&OutboundHeader::new(kind, request_id).encode());
        Self { buf }
    }

    /// Append a `u32` length prefix followed by the UTF-8 bytes.
    pub fn put_string(&mut self, s: &str) -> &mut Self {
        put_length_prefixed_string(&mut self.buf, s);
        self
    }

    /// Append a tag byte and the type specific payload.
    pub fn put_value(&mut self, value: &TaggedValue) -> Result<&mut Self> {
        put_value(&mut self.buf, value)?;
        Ok(self)
    }

    /// Current encoded length.
    #[inline]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Freeze into an immutable packet.
    pub fn finish(self) -> Bytes {
        self.buf.freeze()
    }
}

/// Encode an outbound header (`[kind][request id]`).
#[inline]
pub fn encode_header(kind: ClientKind, request_id: u32) -> [u8; OUTBOUND_HEADER_SIZE] {
    OutboundHeader::new(kind, request_id).encode()
}

/// Encode a tagged value (`[tag][payload]`).
///
/// # Errors
///
/// Returns `InvalidValue` for a non-finite `Float32`.
pub fn encode_value(value: &TaggedValue) -> Result<Bytes> {
    let mut buf = BytesMut::with_capacity(8);
    put_value(&mut buf, value)?;
    Ok(buf.freeze())
}

/// Encode a `u32` length-prefixed UTF-8 string.
pub fn encode_length_prefixed_string(s: &str) -> Bytes {
    let mut buf = BytesMut::with_capacity(4 + s.len());
    put_length_prefixed_string(&mut buf, s);
    buf.freeze()
}

/// RequestDescriptor packet: header only.
pub fn encode_request_descriptor(request_id: u32) -> Bytes {
    PacketBuilder::new(ClientKind::RequestDescriptor, request_id).finish()
}

/// SetValue packet: header, comma-joined path, tagged value.
pub fn encode_set_value<S: AsRef<str>>(
    request_id: u32,
    path: &[S],
    value: &TaggedValue,
) -> Result<Bytes> {
    let mut builder = PacketBuilder::new(ClientKind::SetValue, request_id);
    builder.put_string(&path_key(path)).put_value(value)?;
    Ok(builder.finish())
}

/// String form of a path as used on the wire and as writer group key.
pub fn path_key<S: AsRef<str>>(path: &[S]) -> String {
    let mut key = String::new();
    for (i, segment) in path.iter().enumerate() {
        if i > 0 {
            key.push(',');
        }
        key.push_str(segment.as_ref());
    }
    key
}

fn put_length_prefixed_string(buf: &mut BytesMut, s: &str) {
    buf.put_u32(s.len() as u32);
    buf.put_slice(s.as_bytes());
}

fn put_value(buf: &mut BytesMut, value: &TaggedValue) -> Result<()> {
    buf.put_u8(value.value_type().tag());

    match value {
        TaggedValue::Int32(v) => buf.put_i32(*v),
        TaggedValue::Float32(v) => {
            if !v.is_finite() {
                return Err(GuiError::InvalidValue(format!(
                    "non-finite float {v} cannot be encoded"
                )));
            }
            buf.put_f32(*v);
        }
        TaggedValue::Boolean(v) => buf.put_u8(u8::from(*v)),
        TaggedValue::String(v) => put_length_prefixed_string(buf, v),
        TaggedValue::Rgbw(c) => buf.put_slice(&c.to_bytes()),
    }

    Ok(())
}
