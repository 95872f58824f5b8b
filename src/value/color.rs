//! RGBW color payload and channel selection.

/// Four 8-bit color channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RgbwColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub w: u8,
}

impl RgbwColor {
    pub const fn new(r: u8, g: u8, b: u8, w: u8) -> Self {
        Self { r, g, b, w }
    }

    /// Build a color from unbounded channel values, clamping each to `[0, 255]`.
    ///
    /// Fractional values are rounded; NaN maps to 0.
    pub fn clamped(r: f32, g: f32, b: f32, w: f32) -> Self {
        Self {
            r: clamp_channel(r),
            g: clamp_channel(g),
            b: clamp_channel(b),
            w: clamp_channel(w),
        }
    }

    /// Decode the packed descriptor form `W<<24 | R<<16 | G<<8 | B`.
    pub fn from_packed(packed: u32) -> Self {
        let [w, r, g, b] = packed.to_be_bytes();
        Self { r, g, b, w }
    }

    /// Encode into the packed descriptor form.
    pub fn to_packed(self) -> u32 {
        u32::from_be_bytes([self.w, self.r, self.g, self.b])
    }

    /// Channel bytes in wire order.
    #[inline]
    pub fn to_bytes(self) -> [u8; 4] {
        [self.r, self.g, self.b, self.w]
    }
}

fn clamp_channel(v: f32) -> u8 {
    if v.is_nan() {
        return 0;
    }
    v.round().clamp(0.0, 255.0) as u8
}

/// Which color channels a color control exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorChannels {
    pub r: bool,
    pub g: bool,
    pub b: bool,
    pub w: bool,
}

impl ColorChannels {
    pub const ALL: ColorChannels = ColorChannels {
        r: true,
        g: true,
        b: true,
        w: true,
    };

    /// Parse a flag string: the presence of `R`, `G`, `B`, `W` enables a channel.
    pub fn from_flags(flags: &str) -> Self {
        Self {
            r: flags.contains('R'),
            g: flags.contains('G'),
            b: flags.contains('B'),
            w: flags.contains('W'),
        }
    }
}

impl Default for ColorChannels {
    fn default() -> Self {
        Self::ALL
    }
}
