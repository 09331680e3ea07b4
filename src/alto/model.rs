//! Normalized geometric model of a described page

use serde::{Deserialize, Serialize};

/// Axis-aligned box in native document units (origin top-left).
///
/// Native boxes may extend past the page edge; OCR engines are noisy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
pub struct BoundingBox {
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
}

impl BoundingBox {
    #[must_use]
    pub const fn new(x: i64, y: i64, width: i64, height: i64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Saturates, since coordinates come straight from untrusted files
    #[must_use]
    pub const fn right(&self) -> i64 {
        self.x.saturating_add(self.width)
    }

    #[must_use]
    pub const fn bottom(&self) -> i64 {
        self.y.saturating_add(self.height)
    }
}

/// Width/height pair, used for native page extents and raster pixel sizes
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Extent {
    pub width: i64,
    pub height: i64,
}

impl Extent {
    #[must_use]
    pub const fn new(width: i64, height: i64) -> Self {
        Self { width, height }
    }

    #[must_use]
    pub const fn is_positive(&self) -> bool {
        self.width > 0 && self.height > 0
    }
}

/// Element categories, declared in back-to-front draw order.
///
/// The derived `Ord` is the draw order: regions first, words last.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ElementCategory {
    #[serde(rename = "composedBlock")]
    Block,
    #[serde(rename = "illustration")]
    Illustration,
    #[serde(rename = "textLine")]
    Line,
    #[serde(rename = "string")]
    Word,
}

impl ElementCategory {
    pub const ALL: [ElementCategory; 4] = [
        ElementCategory::Block,
        ElementCategory::Illustration,
        ElementCategory::Line,
        ElementCategory::Word,
    ];

    /// Local name of the ALTO element carrying this category
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::Block => "ComposedBlock",
            Self::Illustration => "Illustration",
            Self::Line => "TextLine",
            Self::Word => "String",
        }
    }

    /// Name used in overlays, configuration and on the command line
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::Block => "composedBlock",
            Self::Illustration => "illustration",
            Self::Line => "textLine",
            Self::Word => "string",
        }
    }

    #[must_use]
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.key().eq_ignore_ascii_case(key))
    }

    pub(crate) const fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

/// One parsed layout element. Immutable once parsed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GeometricElement {
    /// `String`: a recognised word and its text
    Word { content: String, bbox: BoundingBox },
    /// `TextLine`
    Line { bbox: BoundingBox },
    /// `Illustration` with its `TYPE` label
    Illustration { kind: String, bbox: BoundingBox },
    /// `ComposedBlock` (an article region) with its `ID`
    Block { id: String, bbox: BoundingBox },
}

impl GeometricElement {
    #[must_use]
    pub const fn category(&self) -> ElementCategory {
        match self {
            Self::Word { .. } => ElementCategory::Word,
            Self::Line { .. } => ElementCategory::Line,
            Self::Illustration { .. } => ElementCategory::Illustration,
            Self::Block { .. } => ElementCategory::Block,
        }
    }

    #[must_use]
    pub const fn bbox(&self) -> &BoundingBox {
        match self {
            Self::Word { bbox, .. }
            | Self::Line { bbox }
            | Self::Illustration { bbox, .. }
            | Self::Block { bbox, .. } => bbox,
        }
    }

    /// Text carried alongside the box, if the category has one
    #[must_use]
    pub fn label(&self) -> Option<&str> {
        match self {
            Self::Word { content, .. } => Some(content),
            Self::Illustration { kind, .. } => Some(kind),
            Self::Block { id, .. } => Some(id),
            Self::Line { .. } => None,
        }
    }
}

/// A parsed page: elements in document order plus the native extents.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedPage {
    pub native_width: i64,
    pub native_height: i64,
    pub elements: Vec<GeometricElement>,
}

impl ParsedPage {
    #[must_use]
    pub const fn native_extent(&self) -> Extent {
        Extent::new(self.native_width, self.native_height)
    }

    /// Elements of one category, in document order
    pub fn elements_of(
        &self,
        category: ElementCategory,
    ) -> impl Iterator<Item = &GeometricElement> + '_ {
        self.elements
            .iter()
            .filter(move |e| e.category() == category)
    }

    #[must_use]
    pub fn count(&self, category: ElementCategory) -> usize {
        self.elements_of(category).count()
    }
}
