//! Tagged values - the only value representation crossing the codec,
//! tree and writer boundaries.
//!
//! A [`TaggedValue`] is a closed variant over the five wire types. The tag
//! is always derived from the payload: numbers built through
//! [`TaggedValue::from_number`] become `Int32` when they are finite integers
//! inside the signed 32-bit range, `Float32` otherwise, and non-finite
//! numbers are rejected.
//!
//! # Example
//!
//! ```
//! use blegui_client::value::{TaggedValue, ValueType};
//!
//! let v = TaggedValue::from_number(200.0).unwrap();
//! assert_eq!(v.value_type(), ValueType::Int32);
//! assert_eq!(v.as_int().unwrap(), 200);
//!
//! let f = TaggedValue::from_number(0.5).unwrap();
//! assert_eq!(f.value_type(), ValueType::Float32);
//! assert!(f.as_int().is_err());
//! ```

mod color;

use std::fmt;

pub use color::{ColorChannels, RgbwColor};

use crate::error::{GuiError, Result};

/// Wire tag of a tagged value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ValueType {
    Int32 = 0,
    String = 1,
    Boolean = 2,
    RgbwColor = 3,
    Float32 = 4,
}

impl ValueType {
    /// Tag byte as sent on the wire.
    #[inline]
    pub fn tag(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for ValueType {
    type Error = GuiError;

    fn try_from(tag: u8) -> Result<Self> {
        match tag {
            0 => Ok(ValueType::Int32),
            1 => Ok(ValueType::String),
            2 => Ok(ValueType::Boolean),
            3 => Ok(ValueType::RgbwColor),
            4 => Ok(ValueType::Float32),
            other => Err(GuiError::Protocol(format!("Unknown value tag {other}"))),
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueType::Int32 => "int32",
            ValueType::String => "string",
            ValueType::Boolean => "boolean",
            ValueType::RgbwColor => "rgbw",
            ValueType::Float32 => "float32",
        };
        f.write_str(name)
    }
}

/// A dynamically typed protocol value.
#[derive(Debug, Clone, PartialEq)]
pub enum TaggedValue {
    Int32(i32),
    Float32(f32),
    Boolean(bool),
    String(String),
    Rgbw(RgbwColor),
}

impl TaggedValue {
    /// Build a numeric value, inferring `Int32` or `Float32`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidValue` for NaN, infinities and magnitudes beyond
    /// the `f32` range.
    pub fn from_number(n: f64) -> Result<Self> {
        if !n.is_finite() {
            return Err(GuiError::InvalidValue(format!(
                "non-finite number {n} cannot be tagged"
            )));
        }

        if n.fract() == 0.0 && n >= f64::from(i32::MIN) && n <= f64::from(i32::MAX) {
            return Ok(TaggedValue::Int32(n as i32));
        }

        TaggedValue::float(n as f32).map_err(|_| {
            GuiError::InvalidValue(format!("number {n} overflows a 32-bit float"))
        })
    }

    /// Build a `Float32` value, rejecting non-finite input.
    pub fn float(n: f32) -> Result<Self> {
        if !n.is_finite() {
            return Err(GuiError::InvalidValue(format!(
                "non-finite number {n} cannot be tagged"
            )));
        }
        Ok(TaggedValue::Float32(n))
    }

    /// The wire tag matching the stored payload.
    pub fn value_type(&self) -> ValueType {
        match self {
            TaggedValue::Int32(_) => ValueType::Int32,
            TaggedValue::Float32(_) => ValueType::Float32,
            TaggedValue::Boolean(_) => ValueType::Boolean,
            TaggedValue::String(_) => ValueType::String,
            TaggedValue::Rgbw(_) => ValueType::RgbwColor,
        }
    }

    pub fn as_int(&self) -> Result<i32> {
        match self {
            TaggedValue::Int32(v) => Ok(*v),
            other => Err(other.mismatch(ValueType::Int32)),
        }
    }

    pub fn as_float(&self) -> Result<f32> {
        match self {
            TaggedValue::Float32(v) => Ok(*v),
            other => Err(other.mismatch(ValueType::Float32)),
        }
    }

    pub fn as_bool(&self) -> Result<bool> {
        match self {
            TaggedValue::Boolean(v) => Ok(*v),
            other => Err(other.mismatch(ValueType::Boolean)),
        }
    }

    pub fn as_str(&self) -> Result<&str> {
        match self {
            TaggedValue::String(v) => Ok(v),
            other => Err(other.mismatch(ValueType::String)),
        }
    }

    pub fn as_color(&self) -> Result<RgbwColor> {
        match self {
            TaggedValue::Rgbw(v) => Ok(*v),
            other => Err(other.mismatch(ValueType::RgbwColor)),
        }
    }

    /// Build the `TypeMismatch` error for a request of `expected`.
    pub(crate) fn mismatch(&self, expected: ValueType) -> GuiError {
        GuiError::TypeMismatch {
            expected,
            actual: self.value_type(),
        }
    }
}

impl From<i32> for TaggedValue {
    fn from(v: i32) -> Self {
        TaggedValue::Int32(v)
    }
}

impl From<bool> for TaggedValue {
    fn from(v: bool) -> Self {
        TaggedValue::Boolean(v)
    }
}

impl From<&str> for TaggedValue {
    fn from(v: &str) -> Self {
        TaggedValue::String(v.to_string())
    }
}

impl From<String> for TaggedValue {
    fn from(v: String) -> Self {
        TaggedValue::String(v)
    }
}

impl From<RgbwColor> for TaggedValue {
    fn from(v: RgbwColor) -> Self {
        TaggedValue::Rgbw(v)
    }
}

impl fmt::Display for TaggedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaggedValue::Int32(v) => write!(f, "{v}"),
            TaggedValue::Float32(v) => write!(f, "{v}"),
            TaggedValue::Boolean(v) => write!(f, "{v}"),
            TaggedValue::String(v) => write!(f, "{v:?}"),
            TaggedValue::Rgbw(c) => write!(f, "rgbw({}, {}, {}, {})", c.r, c.g, c.b, c.w),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_numbers_tag_as_int32() {
        assert_eq!(TaggedValue::from_number(0.0).unwrap(), TaggedValue::Int32(0));
        assert_eq!(TaggedValue::from_number(-17.0).unwrap(), TaggedValue::Int32(-17));
        assert_eq!(
            TaggedValue::from_number(f64::from(i32::MAX)).unwrap(),
            TaggedValue::Int32(i32::MAX)
        );
        assert_eq!(
            TaggedValue::from_number(f64::from(i32::MIN)).unwrap(),
            TaggedValue::Int32(i32::MIN)
        );
    }

    #[test]
    fn test_out_of_range_integers_tag_as_float32() {
        let above = TaggedValue::from_number(f64::from(i32::MAX) + 1.0).unwrap();
        assert_eq!(above.value_type(), ValueType::Float32);

        let below = TaggedValue::from_number(f64::from(i32::MIN) - 1.0).unwrap();
        assert_eq!(below.value_type(), ValueType::Float32);
    }

    #[test]
    fn test_fractional_numbers_tag_as_float32() {
        let v = TaggedValue::from_number(1.25).unwrap();
        assert_eq!(v, TaggedValue::Float32(1.25));
    }

    #[test]
    fn test_non_finite_numbers_rejected() {
        assert!(matches!(
            TaggedValue::from_number(f64::NAN),
            Err(GuiError::InvalidValue(_))
        ));
        assert!(TaggedValue::from_number(f64::INFINITY).is_err());
        assert!(TaggedValue::from_number(f64::NEG_INFINITY).is_err());
        assert!(TaggedValue::float(f32::NAN).is_err());

        // Finite in f64 but saturates to infinity as f32
        for n in [1e300, -1e300] {
            assert!(matches!(
                TaggedValue::from_number(n),
                Err(GuiError::InvalidValue(_))
            ));
        }
        assert_eq!(
            TaggedValue::from_number(f64::from(f32::MAX)).unwrap(),
            TaggedValue::Float32(f32::MAX)
        );
    }

    #[test]
    fn test_accessors_enforce_tag() {
        let v = TaggedValue::from("hello");
        assert_eq!(v.as_str().unwrap(), "hello");

        match v.as_int() {
            Err(GuiError::TypeMismatch { expected, actual }) => {
                assert_eq!(expected, ValueType::Int32);
                assert_eq!(actual, ValueType::String);
            }
            other => panic!("expected type mismatch, got {other:?}"),
        }

        assert!(v.as_bool().is_err());
        assert!(v.as_float().is_err());
        assert!(v.as_color().is_err());
    }

    #[test]
    fn test_int_is_not_a_float() {
        let v = TaggedValue::Int32(3);
        assert!(v.as_float().is_err());
        assert_eq!(v.as_int().unwrap(), 3);
    }

    #[test]
    fn test_value_type_tags() {
        for tag in 0u8..=4 {
            let ty = ValueType::try_from(tag).unwrap();
            assert_eq!(ty.tag(), tag);
        }
        assert!(ValueType::try_from(5).is_err());
    }
}
