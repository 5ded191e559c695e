//! Colour values, colour codes and the system palette.
//!
//! A colour code is either a palette index (`0..0x2000000`) or a packed
//! direct colour (`0x2RRGGBB` opaque, `0x3RRGGBB` transparent,
//! `0x4RGBRGB` dithered).

use crate::error::{DomError, Result};
use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Palette index replaced by the caller's colour at render time.
pub const MAIN_COLOUR: u32 = 16;
/// Palette index replaced by the edge colour of the caller's colour.
pub const EDGE_COLOUR: u32 = 24;

const DIRECT_COLOUR_MIN: u32 = 0x200_0000;
const DIRECT_COLOUR_MAX: u32 = 0x4FF_FFFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub const fn with_alpha(self, a: u8) -> Self {
        Self { a, ..self }
    }

    pub fn is_opaque(&self) -> bool {
        self.a == 255
    }

    /// Parse `#RRGGBB` (the `#` is optional).
    pub fn from_hex(text: &str) -> Result<Self> {
        let hex = text.strip_prefix('#').unwrap_or(text);
        if hex.len() != 6 {
            return Err(DomError::Format(format!("expected #RRGGBB, got '{}'", text)));
        }
        let packed = u32::from_str_radix(hex, 16)
            .map_err(|_| DomError::Format(format!("invalid hex colour '{}'", text)))?;
        Ok(Self::rgb(
            (packed >> 16) as u8,
            (packed >> 8) as u8,
            packed as u8,
        ))
    }

    /// `#RRGGBB`, alpha not included.
    pub fn to_hex(&self) -> String {
        format!("#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }

    /// Opaque direct colour code with the same RGB.
    pub fn to_direct_code(&self) -> u32 {
        DIRECT_COLOUR_MIN | (self.r as u32) << 16 | (self.g as u32) << 8 | self.b as u32
    }
}

impl fmt::Display for Rgba {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

pub fn is_direct_colour(code: u32) -> bool {
    (DIRECT_COLOUR_MIN..=DIRECT_COLOUR_MAX).contains(&code)
}

/// Any value a colourable element may carry.
pub fn is_valid_colour_value(code: u32) -> bool {
    code < DIRECT_COLOUR_MIN || is_direct_colour(code)
}

/// RGBA of a direct colour code.
pub fn direct_colour_rgba(code: u32) -> Option<Rgba> {
    if !is_direct_colour(code) {
        return None;
    }
    let payload = code & 0xFF_FFFF;
    match code >> 24 {
        2 => Some(Rgba::rgb((payload >> 16) as u8, (payload >> 8) as u8, payload as u8)),
        3 => Some(
            Rgba::rgb((payload >> 16) as u8, (payload >> 8) as u8, payload as u8).with_alpha(128),
        ),
        _ => {
            // two 12-bit colours, averaged
            let expand = |nibble: u32| (nibble * 17) as u8;
            let first = payload >> 12;
            let second = payload & 0xFFF;
            let channel = |shift: u32| {
                let a = expand((first >> shift) & 0xF) as u16;
                let b = expand((second >> shift) & 0xF) as u16;
                ((a + b) / 2) as u8
            };
            Some(Rgba::rgb(channel(8), channel(4), channel(0)))
        }
    }
}

/// Text form used by the code generator: decimal index or `#` + hex.
pub fn format_colour_code(code: u32) -> String {
    if is_direct_colour(code) {
        format!("#{:X}", code)
    } else {
        code.to_string()
    }
}

/// Parse a decimal index, or a direct colour written `#hex`, `0xhex` or `0Xhex`.
pub fn parse_colour_code(text: &str) -> Result<u32> {
    let hex = text
        .strip_prefix('#')
        .or_else(|| text.strip_prefix("0x"))
        .or_else(|| text.strip_prefix("0X"));

    let code = match hex {
        Some(digits) => u32::from_str_radix(digits, 16),
        None => text.parse::<u32>(),
    }
    .map_err(|_| DomError::Format(format!("invalid colour code '{}'", text)))?;

    if !is_valid_colour_value(code) {
        return Err(DomError::Format(format!("colour code '{}' out of range", text)));
    }
    Ok(code)
}

#[derive(Debug, Clone, PartialEq)]
pub struct PaletteEntry {
    pub name: String,
    pub value: Rgba,
    pub edge: Rgba,
}

/// The system colour palette.
///
/// Built once, then shared read-only (`Arc<Palette>`) by every document
/// that uses it.
#[derive(Debug, Clone, Default)]
pub struct Palette {
    entries: AHashMap<u32, PaletteEntry>,
}

impl Palette {
    pub fn empty() -> Self {
        Self::default()
    }

    /// The standard LDraw colours the DOM relies on.
    pub fn system() -> Self {
        let dark_edge = Rgba::rgb(0x33, 0x33, 0x33);
        let mut palette = Self::empty();
        palette.insert(0, "Black", Rgba::rgb(0x1B, 0x2A, 0x34), Rgba::rgb(0x80, 0x80, 0x80));
        palette.insert(1, "Blue", Rgba::rgb(0x1E, 0x5A, 0xA8), dark_edge);
        palette.insert(2, "Green", Rgba::rgb(0x00, 0x85, 0x2B), dark_edge);
        palette.insert(4, "Red", Rgba::rgb(0xB4, 0x00, 0x00), dark_edge);
        palette.insert(7, "Light_Grey", Rgba::rgb(0x9B, 0xA1, 0x9D), dark_edge);
        palette.insert(14, "Yellow", Rgba::rgb(0xFA, 0xC8, 0x0A), dark_edge);
        palette.insert(15, "White", Rgba::rgb(0xF4, 0xF4, 0xF4), dark_edge);
        palette.insert(MAIN_COLOUR, "Main_Colour", Rgba::rgb(0x7F, 0x7F, 0x7F), dark_edge);
        palette.insert(EDGE_COLOUR, "Edge_Colour", Rgba::rgb(0x7F, 0x7F, 0x7F), dark_edge);
        palette.insert(
            47,
            "Trans_Clear",
            Rgba::rgb(0xFC, 0xFC, 0xFC).with_alpha(128),
            Rgba::rgb(0xC3, 0xC3, 0xC3),
        );
        palette
    }

    pub fn insert(&mut self, code: u32, name: &str, value: Rgba, edge: Rgba) {
        self.entries.insert(
            code,
            PaletteEntry {
                name: name.to_string(),
                value,
                edge,
            },
        );
    }

    pub fn get(&self, code: u32) -> Option<&PaletteEntry> {
        self.entries.get(&code)
    }

    pub fn contains(&self, code: u32) -> bool {
        self.entries.contains_key(&code)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
