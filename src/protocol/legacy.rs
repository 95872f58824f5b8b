//! Legacy single-byte command channel.
//!
//! Older peers announce additional color controls outside the descriptor
//! mechanism:
//!
//! ```text
//! ┌──────┬──────────────────────────────┐
//! │ 0x01 │ UTF-8 "uuid:name:channels"   │
//! └──────┴──────────────────────────────┘
//! ```
//!
//! `channels` enables a color channel for every `R`, `G`, `B`, `W` it contains.

use crate::error::{GuiError, Result};
use crate::value::ColorChannels;

/// Command byte announcing a custom color control.
pub const CUSTOM_CONTROL_ANNOUNCE: u8 = 0x01;

/// A color control bound to its own characteristic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomControlAnnounce {
    /// Characteristic that receives the raw color bytes.
    pub uuid: String,
    pub name: String,
    pub channels: ColorChannels,
}

/// Commands understood on the legacy channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LegacyCommand {
    CustomControlAnnounce(CustomControlAnnounce),
}

impl LegacyCommand {
    /// Parse one legacy notification.
    ///
    /// # Example
    ///
    /// ```
    /// use blegui_client::protocol::LegacyCommand;
    ///
    /// let cmd = LegacyCommand::parse(b"\x01abcd-1234:Warp:RGB").unwrap();
    /// let LegacyCommand::CustomControlAnnounce(announce) = cmd;
    /// assert_eq!(announce.name, "Warp");
    /// assert!(!announce.channels.w);
    /// ```
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let (&command, rest) = bytes
            .split_first()
            .ok_or_else(|| GuiError::Protocol("empty legacy command".to_string()))?;

        match command {
            CUSTOM_CONTROL_ANNOUNCE => {
                let text = String::from_utf8(rest.to_vec())?;
                let mut params = text.split(':');

                match (params.next(), params.next(), params.next()) {
                    (Some(uuid), Some(name), Some(channels)) if !uuid.is_empty() => {
                        Ok(LegacyCommand::CustomControlAnnounce(CustomControlAnnounce {
                            uuid: uuid.to_string(),
                            name: name.to_string(),
                            channels: ColorChannels::from_flags(channels),
                        }))
                    }
                    _ => Err(GuiError::Protocol(format!(
                        "malformed custom control announce '{text}'"
                    ))),
                }
            }
            other => Err(GuiError::Protocol(format!(
                "unknown legacy command {other:#04x}"
            ))),
        }
    }
}

impl CustomControlAnnounce {
    /// Encode as the peer sends it.
    pub fn encode(&self) -> Vec<u8> {
        let mut flags = String::new();
        for (enabled, flag) in [
            (self.channels.r, 'R'),
            (self.channels.g, 'G'),
            (self.channels.b, 'B'),
            (self.channels.w, 'W'),
        ] {
            if enabled {
                flags.push(flag);
            }
        }

        let mut out = vec![CUSTOM_CONTROL_ANNOUNCE];
        out.extend_from_slice(format!("{}:{}:{}", self.uuid, self.name, flags).as_bytes());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_announce() {
        let cmd = LegacyCommand::parse(b"\x01cd7ce55d:Warp Core:RGBW").unwrap();
        let LegacyCommand::CustomControlAnnounce(announce) = cmd;
        assert_eq!(announce.uuid, "cd7ce55d");
        assert_eq!(announce.name, "Warp Core");
        assert_eq!(announce.channels, ColorChannels::ALL);
    }

    #[test]
    fn test_encode_matches_parse() {
        let announce = CustomControlAnnounce {
            uuid: "u1".into(),
            name: "Stone".into(),
            channels: ColorChannels::from_flags("GW"),
        };
        let bytes = announce.encode();
        assert_eq!(&bytes[..], b"\x01u1:Stone:GW");
        assert_eq!(
            LegacyCommand::parse(&bytes).unwrap(),
            LegacyCommand::CustomControlAnnounce(announce)
        );
    }

    #[test]
    fn test_malformed_commands() {
        assert!(LegacyCommand::parse(b"").is_err());
        assert!(LegacyCommand::parse(b"\x02whatever").is_err());
        assert!(LegacyCommand::parse(b"\x01only-uuid").is_err());
        assert!(LegacyCommand::parse(b"\x01:name:RGB").is_err());
        assert!(matches!(
            LegacyCommand::parse(b"\x01\xFF\xFE:a:b"),
            Err(GuiError::Utf8(_))
        ));
    }
}
