//! Codec module - binary encoding of headers and tagged values.
//!
//! This module provides both directions of the value wire format:
//!
//! - [`PacketBuilder`] and the `encode_*` functions build outbound packets
//! - [`BufferReader`] is a cursor over a received buffer
//!
//! # Value layout
//!
//! ```text
//! ┌─────────┬──────────────────────────────────────────────┐
//! │ Tag (1) │ Payload                                      │
//! ├─────────┼──────────────────────────────────────────────┤
//! │ 0       │ int32 BE (4)                                 │
//! │ 1       │ uint32 BE length + UTF-8 bytes               │
//! │ 2       │ 0 / 1 (1)                                    │
//! │ 3       │ r, g, b, w (4)                               │
//! │ 4       │ IEEE-754 float32 BE (4)                      │
//! └─────────┴──────────────────────────────────────────────┘
//! ```
//!
//! All multi-byte integers and floats are Big Endian.
//!
//! # Example
//!
//! ```
//! use blegui_client::codec::{encode_value, BufferReader};
//! use blegui_client::value::TaggedValue;
//!
//! let bytes = encode_value(&TaggedValue::Int32(200)).unwrap();
//! assert_eq!(&bytes[..], &[0, 0, 0, 0, 200]);
//!
//! let mut reader = BufferReader::new(&bytes);
//! assert_eq!(reader.read_value().unwrap(), TaggedValue::Int32(200));
//! ```

mod builder;
mod reader;

pub use builder::{
    encode_header, encode_length_prefixed_string, encode_request_descriptor, encode_set_value,
    encode_value, path_key, PacketBuilder,
};
pub use reader::BufferReader;
