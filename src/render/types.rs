//! Display-space types shared by the raster and overlay renderers

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use super::scale::PageScale;
use crate::alto::{ElementCategory, ParsedPage};

/// A set of element categories, used as the visibility filter and as part of the cache key
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct CategorySet(u8);

impl CategorySet {
    pub const NONE: Self = Self(0);
    pub const ALL: Self = Self(0b1111);

    #[must_use]
    pub const fn only(category: ElementCategory) -> Self {
        Self(category.bit())
    }

    #[must_use]
    pub const fn with(self, category: ElementCategory) -> Self {
        Self(self.0 | category.bit())
    }

    #[must_use]
    pub const fn without(self, category: ElementCategory) -> Self {
        Self(self.0 & !category.bit())
    }

    #[must_use]
    pub const fn contains(self, category: ElementCategory) -> bool {
        self.0 & category.bit() != 0
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Members in back-to-front draw order
    pub fn iter(self) -> impl Iterator<Item = ElementCategory> {
        ElementCategory::ALL
            .into_iter()
            .filter(move |c| self.contains(*c))
    }
}

impl FromIterator<ElementCategory> for CategorySet {
    fn from_iter<I: IntoIterator<Item = ElementCategory>>(iter: I) -> Self {
        iter.into_iter().fold(Self::NONE, Self::with)
    }
}

impl fmt::Debug for CategorySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set()
            .entries(self.iter().map(ElementCategory::key))
            .finish()
    }
}

impl fmt::Display for CategorySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::ALL {
            return f.write_str("all");
        }
        if self.is_empty() {
            return f.write_str("none");
        }
        let keys: Vec<&str> = self.iter().map(ElementCategory::key).collect();
        f.write_str(&keys.join(","))
    }
}

/// Parses `all`, `none`, or a comma separated list of category keys
impl FromStr for CategorySet {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "all" => return Ok(Self::ALL),
            "none" | "" => return Ok(Self::NONE),
            _ => {}
        }
        s.split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(|part| {
                ElementCategory::from_key(part).ok_or_else(|| format!("unknown category: {part}"))
            })
            .collect()
    }
}

/// Box in output pixels, always inside the display canvas
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
pub struct DisplayBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl DisplayBox {
    #[must_use]
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DisplayElement {
    pub category: ElementCategory,
    pub rect: DisplayBox,
    pub label: Option<String>,
}

/// All elements of a page mapped to display space, in document order
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PageLayout {
    pub display_width: u32,
    pub display_height: u32,
    pub elements: Vec<DisplayElement>,
}

impl PageLayout {
    #[must_use]
    pub fn build(page: &ParsedPage, scale: &PageScale) -> Self {
        let elements = page
            .elements
            .iter()
            .map(|element| DisplayElement {
                category: element.category(),
                rect: scale.map_box(element.bbox()),
                label: element.label().map(str::to_string),
            })
            .collect();

        Self {
            display_width: scale.output_width,
            display_height: scale.output_height,
            elements,
        }
    }

    pub fn elements_of(&self, category: ElementCategory) -> impl Iterator<Item = &DisplayElement> {
        self.elements
            .iter()
            .filter(move |e| e.category == category)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_membership() {
        let set = CategorySet::only(ElementCategory::Line).with(ElementCategory::Block);
        assert!(set.contains(ElementCategory::Line));
        assert!(set.contains(ElementCategory::Block));
        assert!(!set.contains(ElementCategory::Word));
        assert!(!set.without(ElementCategory::Line).contains(ElementCategory::Line));
        assert!(CategorySet::NONE.is_empty());
    }

    #[test]
    fn iterates_in_draw_order() {
        let set: CategorySet = [ElementCategory::Word, ElementCategory::Block]
            .into_iter()
            .collect();
        let order: Vec<_> = set.iter().collect();
        assert_eq!(order, vec![ElementCategory::Block, ElementCategory::Word]);
    }

    #[test]
    fn parses_command_line_lists() {
        assert_eq!("all".parse::<CategorySet>().unwrap(), CategorySet::ALL);
        assert_eq!("none".parse::<CategorySet>().unwrap(), CategorySet::NONE);
        let set: CategorySet = "string, textLine".parse().unwrap();
        assert_eq!(
            set,
            CategorySet::only(ElementCategory::Word).with(ElementCategory::Line)
        );
        assert!("string,headline".parse::<CategorySet>().is_err());
    }

    #[test]
    fn displays_compactly() {
        assert_eq!(CategorySet::ALL.to_string(), "all");
        assert_eq!(CategorySet::NONE.to_string(), "none");
        let set = CategorySet::only(ElementCategory::Illustration).with(ElementCategory::Word);
        assert_eq!(set.to_string(), "illustration,string");
    }
}
