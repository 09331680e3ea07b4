//! Per-category stroke styles

use std::collections::BTreeMap;

use image::Rgb;
use log::warn;
use serde::{Deserialize, Serialize};

use crate::alto::ElementCategory;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Stroke {
    pub color: Rgb<u8>,
    pub width: u32,
}

impl Stroke {
    #[must_use]
    pub const fn new(rgb: u32, width: u32) -> Self {
        Self {
            color: Rgb([(rgb >> 16) as u8, (rgb >> 8) as u8, rgb as u8]),
            width,
        }
    }
}

/// Stroke style for every category, indexed by category
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StyleTable {
    strokes: [Stroke; 4],
}

impl StyleTable {
    /// Page overlay: orange articles, magenta illustrations, green lines, blue words
    pub const PAGE: Self = Self {
        strokes: [
            Stroke::new(0xFFA500, 2),
            Stroke::new(0xFF00FF, 3),
            Stroke::new(0x008000, 2),
            Stroke::new(0x0000FF, 2),
        ],
    };

    /// Block close-up: blue lines, thin red words
    pub const BLOCK: Self = Self {
        strokes: [
            Stroke::new(0xFFA500, 2),
            Stroke::new(0xFF00FF, 3),
            Stroke::new(0x0000FF, 2),
            Stroke::new(0xFF0000, 1),
        ],
    };

    #[must_use]
    pub fn stroke(&self, category: ElementCategory) -> Stroke {
        self.strokes[category as usize]
    }

    pub fn set(&mut self, category: ElementCategory, stroke: Stroke) {
        self.strokes[category as usize] = stroke;
    }

    /// Apply configured overrides keyed by category name.
    ///
    /// Unknown categories and unreadable colors are skipped with a warning.
    #[must_use]
    pub fn with_overrides(mut self, overrides: &BTreeMap<String, StyleOverride>) -> Self {
        for (key, style) in overrides {
            let Some(category) = ElementCategory::from_key(key) else {
                warn!("Ignoring style for unknown category {key:?}");
                continue;
            };
            let mut stroke = self.stroke(category);
            if let Some(color) = &style.color {
                match parse_hex_color(color) {
                    Some(rgb) => stroke.color = rgb,
                    None => warn!("Ignoring unreadable color {color:?} for {key}"),
                }
            }
            if let Some(width) = style.width {
                stroke.width = width;
            }
            self.set(category, stroke);
        }
        self
    }
}

impl Default for StyleTable {
    fn default() -> Self {
        Self::PAGE
    }
}

/// A configured style; unset fields keep the default
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyleOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
}

/// Parse `#rrggbb` or `rrggbb`
#[must_use]
pub fn parse_hex_color(s: &str) -> Option<Rgb<u8>> {
    let hex = s.trim().trim_start_matches('#');
    if hex.len() != 6 {
        return None;
    }
    let value = u32::from_str_radix(hex, 16).ok()?;
    Some(Stroke::new(value, 0).color)
}
