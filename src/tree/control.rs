//! Leaf controls of the value tree.

use crate::error::{GuiError, Result};
use crate::protocol::DescriptorKind;
use crate::value::{ColorChannels, RgbwColor, TaggedValue, ValueType};

/// A leaf control and its current value.
#[derive(Debug, Clone, PartialEq)]
pub enum Control {
    Range { min: i32, max: i32, value: i32 },
    CheckBox { checked: bool },
    /// `selected == -1` means nothing is selected.
    Radio { items: Vec<String>, selected: i32 },
    DropDown { items: Vec<String>, selected: i32 },
    /// Momentary; has no stored value.
    Button,
    Int32Field { value: i32, read_only: bool },
    TextField { value: String, max_length: Option<usize> },
    Password { value: String, max_length: Option<usize> },
    Rgbw {
        value: RgbwColor,
        channels: ColorChannels,
        /// Set for controls announced on the legacy channel; their edits go
        /// to that characteristic instead of a SetValue packet.
        custom_uuid: Option<String>,
    },
    Compass { azimuth: f32 },
}

impl Control {
    /// Build the control for a leaf descriptor kind.
    ///
    /// Returns `None` for groups, roots and unknown kinds.
    pub fn from_descriptor(kind: &DescriptorKind) -> Option<Self> {
        let control = match kind {
            DescriptorKind::Range { min, max, value } => Control::Range {
                min: *min,
                max: *max,
                value: *value,
            },
            DescriptorKind::CheckBox { checked } => Control::CheckBox { checked: *checked },
            DescriptorKind::Radio { items, selected } => Control::Radio {
                items: items.clone(),
                selected: *selected,
            },
            DescriptorKind::DropDown { items, selected } => Control::DropDown {
                items: items.clone(),
                selected: *selected,
            },
            DescriptorKind::Button => Control::Button,
            DescriptorKind::Int32Field { value, read_only } => Control::Int32Field {
                value: *value,
                read_only: *read_only,
            },
            DescriptorKind::TextField { value, max_length } => Control::TextField {
                value: value.clone(),
                max_length: *max_length,
            },
            DescriptorKind::Password { value, max_length } => Control::Password {
                value: value.clone(),
                max_length: *max_length,
            },
            DescriptorKind::Rgbw { value, channels } => Control::Rgbw {
                value: *value,
                channels: *channels,
                custom_uuid: None,
            },
            DescriptorKind::Compass { azimuth } => Control::Compass { azimuth: *azimuth },
            DescriptorKind::Root { .. }
            | DescriptorKind::Group { .. }
            | DescriptorKind::Unknown { .. } => return None,
        };
        Some(control)
    }

    /// Shape of value this control accepts.
    pub fn value_type(&self) -> ValueType {
        match self {
            Control::Range { .. }
            | Control::Radio { .. }
            | Control::DropDown { .. }
            | Control::Int32Field { .. } => ValueType::Int32,
            Control::CheckBox { .. } | Control::Button => ValueType::Boolean,
            Control::TextField { .. } | Control::Password { .. } => ValueType::String,
            Control::Rgbw { .. } => ValueType::RgbwColor,
            Control::Compass { .. } => ValueType::Float32,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Control::Range { .. } => "range",
            Control::CheckBox { .. } => "checkbox",
            Control::Radio { .. } => "radio",
            Control::DropDown { .. } => "dropdown",
            Control::Button => "button",
            Control::Int32Field { .. } => "numberfield_int32",
            Control::TextField { .. } => "textfield",
            Control::Password { .. } => "password",
            Control::Rgbw { .. } => "rgbwrange",
            Control::Compass { .. } => "compass",
        }
    }

    /// Current value, `None` for buttons.
    pub fn current_value(&self) -> Option<TaggedValue> {
        let value = match self {
            Control::Range { value, .. } | Control::Int32Field { value, .. } => {
                TaggedValue::Int32(*value)
            }
            Control::Radio { selected, .. } | Control::DropDown { selected, .. } => {
                TaggedValue::Int32(*selected)
            }
            Control::CheckBox { checked } => TaggedValue::Boolean(*checked),
            Control::Button => return None,
            Control::TextField { value, .. } | Control::Password { value, .. } => {
                TaggedValue::String(value.clone())
            }
            Control::Rgbw { value, .. } => TaggedValue::Rgbw(*value),
            Control::Compass { azimuth } => TaggedValue::Float32(*azimuth),
        };
        Some(value)
    }

    /// Store `value`.
    ///
    /// Validates completely before mutating: on error the control is
    /// unchanged.
    pub fn apply_value(&mut self, value: &TaggedValue) -> Result<()> {
        match self {
            Control::Range {
                min,
                max,
                value: current,
            } => {
                let v = value.as_int()?;
                if v < *min || v > *max {
                    return Err(GuiError::InvalidValue(format!(
                        "{v} outside range [{min}, {max}]"
                    )));
                }
                *current = v;
            }
            Control::Radio { items, selected } | Control::DropDown { items, selected } => {
                let v = value.as_int()?;
                if v < -1 || v >= items.len() as i32 {
                    return Err(GuiError::InvalidValue(format!(
                        "index {v} outside {} options",
                        items.len()
                    )));
                }
                *selected = v;
            }
            Control::Int32Field { value: current, .. } => *current = value.as_int()?,
            Control::CheckBox { checked } => *checked = value.as_bool()?,
            Control::Button => {
                value.as_bool()?;
            }
            Control::TextField { value: current, .. } | Control::Password { value: current, .. } => {
                *current = value.as_str()?.to_string();
            }
            Control::Rgbw { value: current, .. } => *current = value.as_color()?,
            Control::Compass { azimuth } => {
                let v = match value {
                    TaggedValue::Int32(n) => *n as f32,
                    TaggedValue::Float32(f) => *f,
                    other => return Err(other.mismatch(ValueType::Float32)),
                };
                if !v.is_finite() {
                    return Err(GuiError::InvalidValue(format!("azimuth {v}")));
                }
                *azimuth = v;
            }
        }
        Ok(())
    }

    /// Apply a user edit and return the value to transmit, if any.
    ///
    /// Text is truncated to `max_length` characters, buttons always
    /// transmit `true`, and read-only fields update locally only.
    pub(crate) fn apply_local(&mut self, value: &TaggedValue) -> Result<Option<TaggedValue>> {
        let value = match (&*self, value) {
            (
                Control::TextField {
                    max_length: Some(limit),
                    ..
                }
                | Control::Password {
                    max_length: Some(limit),
                    ..
                },
                TaggedValue::String(s),
            ) if s.chars().count() > *limit => {
                TaggedValue::String(s.chars().take(*limit).collect())
            }
            _ => value.clone(),
        };

        self.apply_value(&value)?;

        Ok(match self {
            Control::Int32Field {
                read_only: true, ..
            } => None,
            Control::Button => Some(TaggedValue::Boolean(true)),
            _ => Some(value),
        })
    }

    /// One-line human readable summary.
    pub fn describe(&self) -> String {
        match self {
            Control::Range { min, max, value } => format!("range [{min}, {max}] = {value}"),
            Control::CheckBox { checked } => format!("checkbox = {checked}"),
            Control::Radio { items, selected } | Control::DropDown { items, selected } => {
                let label = usize::try_from(*selected)
                    .ok()
                    .and_then(|i| items.get(i))
                    .map(String::as_str)
                    .unwrap_or("-");
                format!("{} {:?} = {}", self.type_name(), items, label)
            }
            Control::Button => "button".to_string(),
            Control::Int32Field { value, read_only } => {
                if *read_only {
                    format!("int32 (read-only) = {value}")
                } else {
                    format!("int32 = {value}")
                }
            }
            Control::TextField { value, .. } => format!("text = {value:?}"),
            Control::Password { value, .. } => format!("password = {}", "*".repeat(value.chars().count())),
            Control::Rgbw { value, .. } => format!(
                "rgbw = ({}, {}, {}, {})",
                value.r, value.g, value.b, value.w
            ),
            Control::Compass { azimuth } => format!("compass = {azimuth}°"),
        }
    }
}
