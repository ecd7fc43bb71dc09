//! Marker kinds, the armed-marker selector and marker colors.

use peniko::Color;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Glyph the first web client armed by default. Decoded as [`MarkerKind::Hand`].
const RAISED_HAND_GLYPH: &str = "✋🏻";

/// The closed set of feedback markers a participant can drop on the overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkerKind {
    /// Use this hold with a hand.
    #[default]
    Hand,
    /// Use this hold with a foot.
    Foot,
    /// Missed move / wrong hold.
    Miss,
    /// Point of interest.
    Pin,
}

impl MarkerKind {
    /// All marker kinds, in selector order.
    pub const ALL: [MarkerKind; 4] = [
        MarkerKind::Hand,
        MarkerKind::Foot,
        MarkerKind::Miss,
        MarkerKind::Pin,
    ];

    /// Glyph carried on the wire and drawn on the overlay.
    pub fn glyph(self) -> &'static str {
        match self {
            MarkerKind::Hand => "🤚🏻",
            MarkerKind::Foot => "🦶🏻",
            MarkerKind::Miss => "❌",
            MarkerKind::Pin => "📌",
        }
    }

    /// Map a wire glyph back to its kind.
    pub fn from_glyph(glyph: &str) -> Option<Self> {
        if glyph == RAISED_HAND_GLYPH {
            return Some(MarkerKind::Hand);
        }
        Self::ALL.into_iter().find(|kind| kind.glyph() == glyph)
    }

    /// Get display name for this marker kind.
    pub fn name(self) -> &'static str {
        match self {
            MarkerKind::Hand => "hand",
            MarkerKind::Foot => "foot",
            MarkerKind::Miss => "miss",
            MarkerKind::Pin => "pin",
        }
    }

    /// Cycle to the next marker kind.
    pub fn next(self) -> Self {
        match self {
            MarkerKind::Hand => MarkerKind::Foot,
            MarkerKind::Foot => MarkerKind::Miss,
            MarkerKind::Miss => MarkerKind::Pin,
            MarkerKind::Pin => MarkerKind::Hand,
        }
    }
}

impl fmt::Display for MarkerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for MarkerKind {
    type Err = String;

    /// Accepts either a name (`hand`, `Foot`, ...) or a glyph.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Some(kind) = Self::from_glyph(trimmed) {
            return Ok(kind);
        }
        Self::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| format!("Unknown marker kind: {}", trimmed))
    }
}

/// Tracks which marker the local user has armed for the next placement.
///
/// Written only by the local user, read by the broadcaster.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkerSelector {
    armed: MarkerKind,
}

impl MarkerSelector {
    /// Create a selector with the given kind armed.
    pub fn new(initial: MarkerKind) -> Self {
        Self { armed: initial }
    }

    /// Arm a kind for the next placement.
    pub fn arm(&mut self, kind: MarkerKind) {
        if self.armed != kind {
            log::debug!("Armed marker: {}", kind);
        }
        self.armed = kind;
    }

    /// The currently armed kind.
    pub fn current(&self) -> MarkerKind {
        self.armed
    }
}

/// Highlight color of a marker (RGBA8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkerColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl MarkerColor {
    pub fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Light sky blue, the default highlight.
    pub fn sky() -> Self {
        Self::new(0x8E, 0xD6, 0xFF, 255)
    }

    /// Parse `#RRGGBB` or `#RRGGBBAA` (the leading `#` is optional).
    pub fn parse_hex(input: &str) -> Option<Self> {
        let hex = input.trim().trim_start_matches('#');
        if !hex.is_ascii() {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok();
        match hex.len() {
            6 => Some(Self::new(channel(0)?, channel(2)?, channel(4)?, 255)),
            8 => Some(Self::new(channel(0)?, channel(2)?, channel(4)?, channel(6)?)),
            _ => None,
        }
    }

    /// Format as `#RRGGBB`, or `#RRGGBBAA` when not fully opaque.
    pub fn to_hex(&self) -> String {
        if self.a == 255 {
            format!("#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
        } else {
            format!("#{:02X}{:02X}{:02X}{:02X}", self.r, self.g, self.b, self.a)
        }
    }
}

impl Default for MarkerColor {
    fn default() -> Self {
        Self::sky()
    }
}

impl From<Color> for MarkerColor {
    fn from(color: Color) -> Self {
        let rgba = color.to_rgba8();
        Self {
            r: rgba.r,
            g: rgba.g,
            b: rgba.b,
            a: rgba.a,
        }
    }
}

impl From<MarkerColor> for Color {
    fn from(color: MarkerColor) -> Self {
        Color::from_rgba8(color.r, color.g, color.b, color.a)
    }
}
