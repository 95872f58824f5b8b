//! Descriptor document model.
//!
//! The peer describes its control panel as a nested JSON document:
//!
//! ```json
//! {"type": "root", "name": "Device1", "elements": [
//!     {"type": "group", "name": "Lights", "collapsed": false, "elements": [
//!         {"type": "range", "name": "Brightness", "min": 0, "max": 255, "value": 10},
//!         {"type": "rgbwrange", "name": "Color", "value": 4278190080, "channel": "RGBW"}
//!     ]},
//!     {"type": "textfield", "name": "Label", "value": "", "maxLength": 16, "advanced": true}
//! ]}
//! ```
//!
//! `type` is matched case-insensitively. Unrecognized types parse into
//! [`DescriptorKind::Unknown`] so that newer peers do not break older
//! clients; the tree builder skips them with a diagnostic.

use serde::Deserialize;
use serde_json::Value;

use crate::error::{GuiError, Result};
use crate::value::{ColorChannels, RgbwColor};

/// One node of a descriptor document.
#[derive(Debug, Clone, PartialEq)]
pub struct DescriptorNode {
    pub name: String,
    /// Shown only when the user opts into advanced controls.
    pub advanced: bool,
    pub kind: DescriptorKind,
}

/// Type specific content of a descriptor node.
#[derive(Debug, Clone, PartialEq)]
pub enum DescriptorKind {
    /// Top level document; its own name is ignored.
    Root { elements: Vec<DescriptorNode> },
    /// `collapsed` present means the group is collapsible.
    Group {
        elements: Vec<DescriptorNode>,
        collapsed: Option<bool>,
    },
    Range { min: i32, max: i32, value: i32 },
    CheckBox { checked: bool },
    Radio { items: Vec<String>, selected: i32 },
    DropDown { items: Vec<String>, selected: i32 },
    Button,
    Int32Field { value: i32, read_only: bool },
    TextField { value: String, max_length: Option<usize> },
    Password { value: String, max_length: Option<usize> },
    Rgbw { value: RgbwColor, channels: ColorChannels },
    Compass { azimuth: f32 },
    Unknown { type_name: String },
}

impl DescriptorKind {
    /// Lower-case `type` string of this node.
    pub fn type_name(&self) -> &str {
        match self {
            DescriptorKind::Root { .. } => "root",
            DescriptorKind::Group { .. } => "group",
            DescriptorKind::Range { .. } => "range",
            DescriptorKind::CheckBox { .. } => "checkbox",
            DescriptorKind::Radio { .. } => "radio",
            DescriptorKind::DropDown { .. } => "dropdown",
            DescriptorKind::Button => "button",
            DescriptorKind::Int32Field { .. } => "numberfield_int32",
            DescriptorKind::TextField { .. } => "textfield",
            DescriptorKind::Password { .. } => "password",
            DescriptorKind::Rgbw { .. } => "rgbwrange",
            DescriptorKind::Compass { .. } => "compass",
            DescriptorKind::Unknown { type_name } => type_name,
        }
    }
}

/// Wire shape of a node before validation.
#[derive(Debug, Deserialize)]
struct RawNode {
    #[serde(rename = "type")]
    type_name: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    advanced: Option<bool>,
    #[serde(default)]
    elements: Vec<RawNode>,
    #[serde(default)]
    collapsed: Option<bool>,
    #[serde(default)]
    min: Option<f64>,
    #[serde(default)]
    max: Option<f64>,
    #[serde(default)]
    value: Option<Value>,
    #[serde(default)]
    items: Vec<String>,
    #[serde(default, rename = "maxLength")]
    max_length: Option<i64>,
    #[serde(default, rename = "readOnly")]
    read_only: Option<bool>,
    #[serde(default)]
    channel: Option<String>,
}

impl DescriptorNode {
    /// Parse a UTF-8 JSON descriptor document.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let raw: RawNode = serde_json::from_slice(bytes)?;
        Self::from_raw(raw)
    }

    /// Child nodes for root and group nodes, empty otherwise.
    pub fn elements(&self) -> &[DescriptorNode] {
        match &self.kind {
            DescriptorKind::Root { elements } | DescriptorKind::Group { elements, .. } => elements,
            _ => &[],
        }
    }

    fn from_raw(raw: RawNode) -> Result<Self> {
        let type_name = raw.type_name.to_lowercase();
        let context = |field: &str| format!("{} '{}': {}", type_name, raw.name, field);

        let kind = match type_name.as_str() {
            "root" => DescriptorKind::Root {
                elements: Self::children(raw.elements)?,
            },
            "group" => DescriptorKind::Group {
                elements: Self::children(raw.elements)?,
                collapsed: raw.collapsed,
            },
            "range" => DescriptorKind::Range {
                min: int_field(raw.min, &context("min"))?,
                max: int_field(raw.max, &context("max"))?,
                value: int_value(raw.value.as_ref(), &context("value"))?,
            },
            "checkbox" => DescriptorKind::CheckBox {
                checked: match raw.value {
                    Some(Value::Bool(b)) => b,
                    Some(Value::Number(n)) => n.as_f64() == Some(1.0),
                    _ => false,
                },
            },
            "radio" => DescriptorKind::Radio {
                items: raw.items,
                selected: optional_int(raw.value.as_ref(), &context("value"))?,
            },
            "dropdown" => DescriptorKind::DropDown {
                items: raw.items,
                selected: optional_int(raw.value.as_ref(), &context("value"))?,
            },
            "button" => DescriptorKind::Button,
            "numberfield_int32" => DescriptorKind::Int32Field {
                value: optional_int(raw.value.as_ref(), &context("value"))?,
                read_only: raw.read_only.unwrap_or(false),
            },
            "textfield" | "password" => {
                let value = match raw.value {
                    Some(Value::String(s)) => s,
                    None | Some(Value::Null) => String::new(),
                    Some(other) => {
                        return Err(GuiError::InvalidValue(format!(
                            "{}: expected string, got {other}",
                            context("value")
                        )))
                    }
                };
                let max_length = raw
                    .max_length
                    .filter(|len| *len >= 0)
                    .map(|len| len as usize);

                if type_name == "password" {
                    DescriptorKind::Password { value, max_length }
                } else {
                    DescriptorKind::TextField { value, max_length }
                }
            }
            "rgbwrange" => {
                let packed = match raw.value.as_ref().and_then(Value::as_u64) {
                    Some(v) if v <= u64::from(u32::MAX) => v as u32,
                    None => 0,
                    Some(v) => {
                        return Err(GuiError::InvalidValue(format!(
                            "{}: packed color {v} exceeds 32 bits",
                            context("value")
                        )))
                    }
                };
                DescriptorKind::Rgbw {
                    value: RgbwColor::from_packed(packed),
                    channels: raw
                        .channel
                        .as_deref()
                        .map(ColorChannels::from_flags)
                        .unwrap_or_default(),
                }
            }
            "compass" => DescriptorKind::Compass {
                azimuth: raw.value.as_ref().and_then(Value::as_f64).unwrap_or(0.0) as f32,
            },
            _ => DescriptorKind::Unknown {
                type_name: type_name.clone(),
            },
        };

        Ok(Self {
            name: raw.name,
            advanced: raw.advanced.unwrap_or(false),
            kind,
        })
    }

    fn children(raw: Vec<RawNode>) -> Result<Vec<DescriptorNode>> {
        raw.into_iter().map(Self::from_raw).collect()
    }
}

fn int_field(v: Option<f64>, context: &str) -> Result<i32> {
    match v {
        Some(n) => to_i32(n, context),
        None => Err(GuiError::InvalidValue(format!("{context} is missing"))),
    }
}

fn int_value(v: Option<&Value>, context: &str) -> Result<i32> {
    int_field(v.and_then(Value::as_f64), context)
}

fn optional_int(v: Option<&Value>, context: &str) -> Result<i32> {
    match v.and_then(Value::as_f64) {
        Some(n) => to_i32(n, context),
        None => Ok(0),
    }
}

fn to_i32(n: f64, context: &str) -> Result<i32> {
    if n.is_finite() && n.fract() == 0.0 && n >= f64::from(i32::MIN) && n <= f64::from(i32::MAX) {
        Ok(n as i32)
    } else {
        Err(GuiError::InvalidValue(format!(
            "{context}: {n} is not a 32-bit integer"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_root_with_range() {
        let json = br#"{"type":"root","name":"Device1","elements":[{"type":"range","name":"Brightness","min":0,"max":255,"value":10}]}"#;
        let node = DescriptorNode::from_json(json).unwrap();

        assert_eq!(node.kind.type_name(), "root");
        assert_eq!(node.elements().len(), 1);

        let range = &node.elements()[0];
        assert_eq!(range.name, "Brightness");
        assert_eq!(
            range.kind,
            DescriptorKind::Range {
                min: 0,
                max: 255,
                value: 10
            }
        );
    }

    #[test]
    fn test_type_is_case_insensitive() {
        let node = DescriptorNode::from_json(br#"{"type":"CheckBox","name":"On","value":1}"#)
            .unwrap();
        assert_eq!(node.kind, DescriptorKind::CheckBox { checked: true });

        let node = DescriptorNode::from_json(br#"{"type":"checkbox","name":"On","value":0}"#)
            .unwrap();
        assert_eq!(node.kind, DescriptorKind::CheckBox { checked: false });
    }

    #[test]
    fn test_group_flags() {
        let json = br#"{"type":"group","name":"G","collapsed":true,"advanced":true,"elements":[]}"#;
        let node = DescriptorNode::from_json(json).unwrap();
        assert!(node.advanced);
        assert_eq!(
            node.kind,
            DescriptorKind::Group {
                elements: vec![],
                collapsed: Some(true)
            }
        );
    }

    #[test]
    fn test_text_fields() {
        let node = DescriptorNode::from_json(
            br#"{"type":"textfield","name":"T","value":"abc","maxLength":-1}"#,
        )
        .unwrap();
        assert_eq!(
            node.kind,
            DescriptorKind::TextField {
                value: "abc".into(),
                max_length: None
            }
        );

        let node = DescriptorNode::from_json(
            br#"{"type":"password","name":"P","value":"","maxLength":8}"#,
        )
        .unwrap();
        assert_eq!(
            node.kind,
            DescriptorKind::Password {
                value: String::new(),
                max_length: Some(8)
            }
        );
    }

    #[test]
    fn test_rgbw_packed_value_and_channels() {
        let json = br#"{"type":"rgbwrange","name":"C","value":4278255360,"channel":"RG"}"#;
        let node = DescriptorNode::from_json(json).unwrap();
        match node.kind {
            DescriptorKind::Rgbw { value, channels } => {
                // 0xFF00FF00: w=255, r=0, g=255, b=0
                assert_eq!(value, RgbwColor::new(0, 255, 0, 255));
                assert!(channels.r && channels.g);
                assert!(!channels.b && !channels.w);
            }
            other => panic!("unexpected kind {other:?}"),
        }
    }

    #[test]
    fn test_selectors_and_fields() {
        let json = br#"{"type":"root","name":"","elements":[
            {"type":"radio","name":"Mode","items":["a","b"],"value":1},
            {"type":"dropdown","name":"Preset","items":["x"]},
            {"type":"numberfield_int32","name":"Count","value":-5,"readOnly":true},
            {"type":"compass","name":"Heading","value":12.5},
            {"type":"button","name":"Go"}
        ]}"#;
        let node = DescriptorNode::from_json(json).unwrap();
        let kinds: Vec<_> = node.elements().iter().map(|n| n.kind.clone()).collect();

        assert_eq!(
            kinds[0],
            DescriptorKind::Radio {
                items: vec!["a".into(), "b".into()],
                selected: 1
            }
        );
        assert_eq!(
            kinds[1],
            DescriptorKind::DropDown {
                items: vec!["x".into()],
                selected: 0
            }
        );
        assert_eq!(
            kinds[2],
            DescriptorKind::Int32Field {
                value: -5,
                read_only: true
            }
        );
        assert_eq!(kinds[3], DescriptorKind::Compass { azimuth: 12.5 });
        assert_eq!(kinds[4], DescriptorKind::Button);
    }

    #[test]
    fn test_unknown_type_is_kept_for_skipping() {
        let node = DescriptorNode::from_json(br#"{"type":"Hologram","name":"H","value":3}"#)
            .unwrap();
        assert_eq!(
            node.kind,
            DescriptorKind::Unknown {
                type_name: "hologram".into()
            }
        );
    }

    #[test]
    fn test_malformed_documents() {
        assert!(matches!(
            DescriptorNode::from_json(b"{not json"),
            Err(GuiError::Json(_))
        ));
        assert!(matches!(
            DescriptorNode::from_json(br#"{"type":"range","name":"R","max":3,"value":1}"#),
            Err(GuiError::InvalidValue(_))
        ));
        assert!(DescriptorNode::from_json(
            br#"{"type":"range","name":"R","min":0,"max":3,"value":1.5}"#
        )
        .is_err());
    }
}
