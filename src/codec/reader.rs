//! Cursor-based reader over a received buffer.
//!
//! Every read checks the remaining length first and fails with
//! `OutOfRange` instead of reading past the end; this is the guard
//! against truncated or malformed peer data.

use crate::error::{GuiError, Result};
use crate::value::{RgbwColor, TaggedValue, ValueType};

/// Big Endian cursor over a borrowed byte slice.
#[derive(Debug, Clone)]
pub struct BufferReader<'a> {
    buf: &'a [u8],
    offset: usize,
}

impl<'a> BufferReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, offset: 0 }
    }

    /// Bytes not yet consumed.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.offset
    }

    /// Current read position.
    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        let bytes = self.read_bytes(1)?;
        Ok(bytes[0])
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_be_bytes(self.read_array()?))
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(i32::from_be_bytes(self.read_array()?))
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        Ok(f32::from_be_bytes(self.read_array()?))
    }

    /// Read exactly `len` bytes.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        self.check_range(len)?;
        let bytes = &self.buf[self.offset..self.offset + len];
        self.offset += len;
        Ok(bytes)
    }

    /// Consume everything left in the buffer.
    pub fn read_remaining(&mut self) -> &'a [u8] {
        let bytes = &self.buf[self.offset..];
        self.offset = self.buf.len();
        bytes
    }

    /// Read a `u32` length-prefixed UTF-8 string.
    pub fn read_string(&mut self) -> Result<String> {
        let len = self.read_u32()? as usize;
        let bytes = self.read_bytes(len)?;
        Ok(String::from_utf8(bytes.to_vec())?)
    }

    /// Read a tag byte and the matching payload.
    ///
    /// # Errors
    ///
    /// `Protocol` for an unknown tag, `InvalidValue` for a non-finite float,
    /// `OutOfRange` for a truncated payload.
    pub fn read_value(&mut self) -> Result<TaggedValue> {
        let ty = ValueType::try_from(self.read_u8()?)?;

        match ty {
            ValueType::Int32 => Ok(TaggedValue::Int32(self.read_i32()?)),
            ValueType::Float32 => TaggedValue::float(self.read_f32()?),
            ValueType::Boolean => Ok(TaggedValue::Boolean(self.read_u8()? > 0)),
            ValueType::String => Ok(TaggedValue::String(self.read_string()?)),
            ValueType::RgbwColor => {
                let [r, g, b, w]: [u8; 4] = self.read_array()?;
                Ok(TaggedValue::Rgbw(RgbwColor::new(r, g, b, w)))
            }
        }
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let bytes = self.read_bytes(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    fn check_range(&self, requested: usize) -> Result<()> {
        let remaining = self.remaining();
        if requested > remaining {
            return Err(GuiError::OutOfRange {
                requested,
                remaining,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{encode_length_prefixed_string, encode_value};

    fn roundtrip(value: TaggedValue) {
        let bytes = encode_value(&value).unwrap();
        let mut reader = BufferReader::new(&bytes);
        assert_eq!(reader.read_value().unwrap(), value);
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn test_value_roundtrip_boundaries() {
        roundtrip(TaggedValue::Int32(i32::MIN));
        roundtrip(TaggedValue::Int32(i32::MAX));
        roundtrip(TaggedValue::Float32(-0.125));
        roundtrip(TaggedValue::Float32(f32::MAX));
        roundtrip(TaggedValue::Boolean(true));
        roundtrip(TaggedValue::Boolean(false));
        roundtrip(TaggedValue::from(""));
        roundtrip(TaggedValue::from("Grüße"));
        roundtrip(TaggedValue::Rgbw(RgbwColor::new(0, 0, 0, 0)));
        roundtrip(TaggedValue::Rgbw(RgbwColor::new(255, 255, 255, 255)));
    }

    #[test]
    fn test_sequential_reads_advance() {
        let data = [0x01, 0x00, 0x00, 0x01, 0x00, 0xFF, 0xFF, 0xFF, 0xFF];
        let mut reader = BufferReader::new(&data);

        assert_eq!(reader.read_u8().unwrap(), 1);
        assert_eq!(reader.read_u32().unwrap(), 256);
        assert_eq!(reader.offset(), 5);
        assert_eq!(reader.read_i32().unwrap(), -1);
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn test_read_past_end_is_out_of_range() {
        let data = [0x00, 0x01];
        let mut reader = BufferReader::new(&data);

        match reader.read_u32() {
            Err(GuiError::OutOfRange {
                requested,
                remaining,
            }) => {
                assert_eq!(requested, 4);
                assert_eq!(remaining, 2);
            }
            other => panic!("expected out of range, got {other:?}"),
        }

        // Failed read does not advance
        assert_eq!(reader.offset(), 0);
        assert_eq!(reader.read_bytes(2).unwrap(), &[0x00, 0x01]);
    }

    #[test]
    fn test_truncated_string_rejected() {
        let mut bytes = encode_length_prefixed_string("hello").to_vec();
        bytes.truncate(6);
        let mut reader = BufferReader::new(&bytes);
        assert!(matches!(
            reader.read_string(),
            Err(GuiError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_invalid_utf8_rejected() {
        let data = [0, 0, 0, 2, 0xC3, 0x28];
        let mut reader = BufferReader::new(&data);
        assert!(matches!(reader.read_string(), Err(GuiError::Utf8(_))));
    }

    #[test]
    fn test_unknown_tag_rejected() {
        let data = [9, 0, 0, 0, 0];
        let mut reader = BufferReader::new(&data);
        assert!(matches!(reader.read_value(), Err(GuiError::Protocol(_))));
    }

    #[test]
    fn test_nan_float_rejected() {
        let mut data = vec![4];
        data.extend_from_slice(&f32::NAN.to_be_bytes());
        let mut reader = BufferReader::new(&data);
        assert!(matches!(reader.read_value(), Err(GuiError::InvalidValue(_))));
    }

    #[test]
    fn test_read_remaining() {
        let data = [1, 2, 3, 4];
        let mut reader = BufferReader::new(&data);
        reader.read_u8().unwrap();
        assert_eq!(reader.read_remaining(), &[2, 3, 4]);
        assert_eq!(reader.remaining(), 0);
        assert!(reader.read_remaining().is_empty());
    }
}
