//! Overlay mode: display-space boxes as structured data for a client to draw

use std::collections::BTreeMap;

use serde::Serialize;

use super::types::{CategorySet, PageLayout};
use crate::alto::ElementCategory;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct OverlayBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageOverlay {
    pub native_page_id: String,
    pub display_width: u32,
    pub display_height: u32,
    /// Every visible category is present, possibly with no boxes; boxes keep document order
    pub boxes_by_category: BTreeMap<ElementCategory, Vec<OverlayBox>>,
}

impl PageOverlay {
    #[must_use]
    pub fn from_layout(
        native_page_id: impl Into<String>,
        layout: &PageLayout,
        visibility: CategorySet,
    ) -> Self {
        let mut boxes_by_category: BTreeMap<ElementCategory, Vec<OverlayBox>> =
            visibility.iter().map(|c| (c, Vec::new())).collect();

        for element in &layout.elements {
            if let Some(boxes) = boxes_by_category.get_mut(&element.category) {
                boxes.push(OverlayBox {
                    x: element.rect.x,
                    y: element.rect.y,
                    width: element.rect.width,
                    height: element.rect.height,
                    label: element.label.clone(),
                });
            }
        }

        Self {
            native_page_id: native_page_id.into(),
            display_width: layout.display_width,
            display_height: layout.display_height,
            boxes_by_category,
        }
    }

    pub fn boxes(&self, category: ElementCategory) -> &[OverlayBox] {
        self.boxes_by_category
            .get(&category)
            .map_or(&[], Vec::as_slice)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::types::{DisplayBox, DisplayElement};

    fn layout() -> PageLayout {
        let element = |category, x, label: Option<&str>| DisplayElement {
            category,
            rect: DisplayBox::new(x, 5, 10, 4),
            label: label.map(str::to_string),
        };
        PageLayout {
            display_width: 320,
            display_height: 448,
            elements: vec![
                element(ElementCategory::Block, 0, Some("ART1")),
                element(ElementCategory::Word, 30, Some("Valdres")),
                element(ElementCategory::Word, 10, Some("Avis")),
                element(ElementCategory::Line, 1, None),
            ],
        }
    }

    #[test]
    fn groups_by_category_in_document_order() {
        let overlay = PageOverlay::from_layout("p1", &layout(), CategorySet::ALL);
        let words = overlay.boxes(ElementCategory::Word);
        assert_eq!(words.len(), 2);
        assert_eq!(words[0].label.as_deref(), Some("Valdres"));
        assert_eq!(words[1].x, 10);
        assert!(overlay.boxes(ElementCategory::Illustration).is_empty());
        assert!(
            overlay
                .boxes_by_category
                .contains_key(&ElementCategory::Illustration)
        );
    }

    #[test]
    fn hidden_categories_are_absent() {
        let visible = CategorySet::only(ElementCategory::Line);
        let overlay = PageOverlay::from_layout("p1", &layout(), visible);
        assert_eq!(overlay.boxes_by_category.len(), 1);
        assert!(overlay.boxes(ElementCategory::Word).is_empty());
    }

    #[test]
    fn serializes_with_category_keys() {
        let overlay = PageOverlay::from_layout(
            "page_001_null",
            &layout(),
            CategorySet::only(ElementCategory::Line).with(ElementCategory::Block),
        );
        let json: serde_json::Value = serde_json::from_str(&overlay.to_json().unwrap()).unwrap();
        assert_eq!(json["nativePageId"], "page_001_null");
        assert_eq!(json["displayWidth"], 320);
        assert_eq!(json["boxesByCategory"]["composedBlock"][0]["label"], "ART1");
        let line = &json["boxesByCategory"]["textLine"][0];
        assert_eq!(line["x"], 1);
        assert!(line.get("label").is_none());
    }
}
