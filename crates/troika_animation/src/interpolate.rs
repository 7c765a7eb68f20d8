//! Interpolatable value types
//!
//! Numbers interpolate linearly; colors interpolate per RGB channel.

use serde::{Deserialize, Serialize};

/// Trait for values a [`Tween`](crate::Tween) can animate
pub trait Interpolate: Clone {
    /// Interpolate between self and `to` by `progress`
    ///
    /// `progress` may leave `[0, 1]` for overshooting easings.
    fn interpolate(&self, to: &Self, progress: f64) -> Self;
}

// ============================================================================
// Numbers
// ============================================================================

impl Interpolate for f64 {
    fn interpolate(&self, to: &Self, progress: f64) -> Self {
        self + (to - self) * progress
    }
}

impl Interpolate for f32 {
    fn interpolate(&self, to: &Self, progress: f64) -> Self {
        self + (to - self) * progress as f32
    }
}

impl<const N: usize> Interpolate for [f64; N] {
    fn interpolate(&self, to: &Self, progress: f64) -> Self {
        let mut out = *self;
        for (value, target) in out.iter_mut().zip(to) {
            *value = value.interpolate(target, progress);
        }
        out
    }
}

// ============================================================================
// Color
// ============================================================================

/// Packed `0xRRGGBB` color
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Color(pub u32);

impl Color {
    pub const BLACK: Color = Color(0x000000);
    pub const WHITE: Color = Color(0xffffff);

    pub fn from_rgb(r: u8, g: u8, b: u8) -> Self {
        Color(((r as u32) << 16) | ((g as u32) << 8) | b as u32)
    }

    pub fn r(self) -> u8 {
        (self.0 >> 16) as u8
    }

    pub fn g(self) -> u8 {
        (self.0 >> 8) as u8
    }

    pub fn b(self) -> u8 {
        self.0 as u8
    }

    /// Parse `#rrggbb`, `#rgb` or a bare hex string
    pub fn parse(text: &str) -> Option<Self> {
        let hex = text.trim().trim_start_matches('#');
        match hex.len() {
            6 => u32::from_str_radix(hex, 16).ok().map(Color),
            3 => {
                let packed = u32::from_str_radix(hex, 16).ok()?;
                let expand = |nibble: u32| ((nibble << 4) | nibble) as u8;
                Some(Color::from_rgb(
                    expand((packed >> 8) & 0xf),
                    expand((packed >> 4) & 0xf),
                    expand(packed & 0xf),
                ))
            }
            _ => None,
        }
    }
}

impl Interpolate for Color {
    fn interpolate(&self, to: &Self, progress: f64) -> Self {
        let channel = |from: u8, to: u8| {
            let value = (from as f64).interpolate(&(to as f64), progress);
            value.round().clamp(0.0, 255.0) as u8
        };
        Color::from_rgb(
            channel(self.r(), to.r()),
            channel(self.g(), to.g()),
            channel(self.b(), to.b()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_interpolation() {
        assert_eq!(10.0f64.interpolate(&20.0, 0.25), 12.5);
        assert_eq!([0.0, 10.0].interpolate(&[10.0, 0.0], 0.5), [5.0, 5.0]);
    }

    #[test]
    fn test_color_channels_interpolate_independently() {
        let from = Color(0xff0000);
        let to = Color(0x0000ff);
        assert_eq!(from.interpolate(&to, 0.5), Color::from_rgb(128, 0, 128));
        assert_eq!(from.interpolate(&to, 1.0), to);
    }

    #[test]
    fn test_color_clamps_overshoot() {
        let mid = Color::BLACK.interpolate(&Color::WHITE, 1.2);
        assert_eq!(mid, Color::WHITE);
    }

    #[test]
    fn test_color_parse() {
        assert_eq!(Color::parse("#336699"), Some(Color(0x336699)));
        assert_eq!(Color::parse("#fff"), Some(Color::WHITE));
        assert_eq!(Color::parse("nope"), None);
    }
}
