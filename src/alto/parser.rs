//! ALTO layout parser
//!
//! Walks the document once and extracts the four element categories. Matching is
//! namespace-qualified against [`ALTO_NS`] exactly, so same-named elements from
//! foreign markup embedded in the file are ignored.

use log::debug;
use roxmltree::{Document, Node};

use super::model::{BoundingBox, ElementCategory, Extent, GeometricElement, ParsedPage};
use crate::error::{Error, Result};

/// Namespace of ALTO v2 documents
pub const ALTO_NS: &str = "http://www.loc.gov/standards/alto/ns-v2#";

/// Parse raw document bytes into a [`ParsedPage`].
///
/// Fails with [`Error::Format`] when the bytes are not well-formed markup or the
/// document has no `Page` element. Missing per-element coordinates default to zero.
pub fn parse(document: &[u8]) -> Result<ParsedPage> {
    let text = decode_text(document)?;
    parse_str(text)
}

pub fn parse_str(text: &str) -> Result<ParsedPage> {
    let doc = Document::parse(text)?;
    let extent = page_extent(&doc)?;

    let elements: Vec<GeometricElement> = doc
        .descendants()
        .filter(Node::is_element)
        .filter_map(|node| element_from_node(&node))
        .collect();

    debug!(
        "Parsed ALTO page {}x{}: {} blocks, {} illustrations, {} lines, {} words",
        extent.width,
        extent.height,
        count(&elements, ElementCategory::Block),
        count(&elements, ElementCategory::Illustration),
        count(&elements, ElementCategory::Line),
        count(&elements, ElementCategory::Word),
    );

    Ok(ParsedPage {
        native_width: extent.width,
        native_height: extent.height,
        elements,
    })
}

pub(crate) fn decode_text(document: &[u8]) -> Result<&str> {
    let text = std::str::from_utf8(document)
        .map_err(|e| Error::format(format!("document is not UTF-8: {e}")))?;
    Ok(text.strip_prefix('\u{feff}').unwrap_or(text))
}

/// Native extents declared on the first `Page` element
pub(crate) fn page_extent(doc: &Document) -> Result<Extent> {
    let page = doc
        .descendants()
        .find(|n| n.has_tag_name((ALTO_NS, "Page")))
        .ok_or_else(|| Error::format("no alto:Page element"))?;

    Ok(Extent::new(
        read_coord(&page, "WIDTH"),
        read_coord(&page, "HEIGHT"),
    ))
}

pub(crate) fn is_alto(node: &Node, category: ElementCategory) -> bool {
    node.has_tag_name((ALTO_NS, category.tag()))
}

fn element_from_node(node: &Node) -> Option<GeometricElement> {
    let category = ElementCategory::ALL
        .into_iter()
        .find(|c| is_alto(node, *c))?;
    let bbox = read_box(node);

    Some(match category {
        ElementCategory::Word => GeometricElement::Word {
            content: read_label(node, "CONTENT"),
            bbox,
        },
        ElementCategory::Line => GeometricElement::Line { bbox },
        ElementCategory::Illustration => GeometricElement::Illustration {
            kind: read_label(node, "TYPE"),
            bbox,
        },
        ElementCategory::Block => GeometricElement::Block {
            id: read_label(node, "ID"),
            bbox,
        },
    })
}

pub(crate) fn read_box(node: &Node) -> BoundingBox {
    BoundingBox::new(
        read_coord(node, "HPOS"),
        read_coord(node, "VPOS"),
        read_coord(node, "WIDTH"),
        read_coord(node, "HEIGHT"),
    )
}

pub(crate) fn read_label(node: &Node, name: &str) -> String {
    node.attribute(name).unwrap_or_default().to_string()
}

/// Read a numeric attribute; absent or unreadable values degrade to zero.
///
/// ALTO producers occasionally write fractional coordinates, which are rounded.
pub(crate) fn read_coord(node: &Node, name: &str) -> i64 {
    let Some(raw) = node.attribute(name) else {
        debug!(
            "{} at byte {} has no {name}, defaulting to 0",
            node.tag_name().name(),
            node.range().start
        );
        return 0;
    };

    let raw = raw.trim();
    if let Ok(value) = raw.parse::<i64>() {
        return value;
    }
    match raw.parse::<f64>() {
        Ok(value) if value.is_finite() => value.round() as i64,
        _ => {
            debug!(
                "{} at byte {} has unreadable {name}={raw:?}, defaulting to 0",
                node.tag_name().name(),
                node.range().start
            );
            0
        }
    }
}

fn count(elements: &[GeometricElement], category: ElementCategory) -> usize {
    elements.iter().filter(|e| e.category() == category).count()
}
