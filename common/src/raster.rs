use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Default canvas width in pixels.
pub const CANVAS_WIDTH: u32 = 300;

/// Default canvas height in pixels.
pub const CANVAS_HEIGHT: u32 = 300;

/// Line width of the regular brush.
pub const BRUSH_WIDTH: f64 = 8.5;

/// Line width used while erasing.
pub const ERASER_WIDTH: f64 = 10.0;

/// Smallest selectable brush width.
pub const MIN_BRUSH_WIDTH: f64 = 5.0;

/// Largest selectable brush width.
pub const MAX_BRUSH_WIDTH: f64 = 50.0;

/// An opaque RGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const WHITE: Color = Color::rgb(255, 255, 255);
    pub const RED: Color = Color::rgb(255, 0, 0);
    pub const GREEN: Color = Color::rgb(0, 128, 0);
    pub const BLUE: Color = Color::rgb(0, 0, 255);
    pub const YELLOW: Color = Color::rgb(255, 255, 0);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// RGBA bytes with full opacity.
    pub fn to_rgba(self) -> [u8; 4] {
        [self.r, self.g, self.b, 255]
    }

    fn from_hex(hex: &str) -> Option<Self> {
        // from_str_radix alone would accept a leading '+'.
        if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        match hex.len() {
            6 => {
                let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
                let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
                let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
                Some(Self::rgb(r, g, b))
            }
            3 => {
                // Each nibble is doubled, "f80" -> "ff8800".
                let nibble = |i: usize| u8::from_str_radix(&hex[i..i + 1], 16).ok().map(|n| n * 17);
                Some(Self::rgb(nibble(0)?, nibble(1)?, nibble(2)?))
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognized color: {0}")]
pub struct ParseColorError(pub String);

impl FromStr for Color {
    type Err = ParseColorError;

    /// Accepts the palette names and `#rgb` / `#rrggbb` hex.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let named = match trimmed.to_ascii_lowercase().as_str() {
            "black" => Some(Color::BLACK),
            "white" => Some(Color::WHITE),
            "red" => Some(Color::RED),
            "green" => Some(Color::GREEN),
            "blue" => Some(Color::BLUE),
            "yellow" => Some(Color::YELLOW),
            _ => None,
        };
        named
            .or_else(|| trimmed.strip_prefix('#').and_then(Color::from_hex))
            .ok_or_else(|| ParseColorError(s.to_string()))
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl Serialize for Color {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Color {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// The brush settings read each time a segment is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrokeStyle {
    pub color: Color,
    pub width: f64,
}

impl Default for StrokeStyle {
    fn default() -> Self {
        Self {
            color: Color::BLACK,
            width: BRUSH_WIDTH,
        }
    }
}

/// Whether `width` is a selectable brush width.
pub fn is_valid_brush_width(width: f64) -> bool {
    (MIN_BRUSH_WIDTH..=MAX_BRUSH_WIDTH).contains(&width)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_palette_names() {
        assert_eq!("black".parse::<Color>().unwrap(), Color::BLACK);
        assert_eq!("Yellow".parse::<Color>().unwrap(), Color::YELLOW);
        assert_eq!("green".parse::<Color>().unwrap(), Color::rgb(0, 128, 0));
    }

    #[test]
    fn test_hex_colors() {
        assert_eq!("#FF5733".parse::<Color>().unwrap(), Color::rgb(0xff, 0x57, 0x33));
        assert_eq!("#f80".parse::<Color>().unwrap(), Color::rgb(0xff, 0x88, 0x00));
        assert!("#12345".parse::<Color>().is_err());
        assert!("magenta-ish".parse::<Color>().is_err());
        assert!("#+f+f+f".parse::<Color>().is_err());
        assert!("#+ff+ff".parse::<Color>().is_err());
    }

    #[test]
    fn test_color_serde_uses_hex_text() {
        let json = serde_json::to_string(&Color::RED).unwrap();
        assert_eq!(json, "\"#ff0000\"");
        let back: Color = serde_json::from_str("\"blue\"").unwrap();
        assert_eq!(back, Color::BLUE);
    }

    #[test]
    fn test_brush_width_range() {
        assert!(is_valid_brush_width(5.0));
        assert!(is_valid_brush_width(50.0));
        assert!(!is_valid_brush_width(4.9));
        assert!(!is_valid_brush_width(51.0));
    }
}
