//! Text block hierarchy (`TextBlock` → `TextLine` → `String`) for the block inspector

use roxmltree::{Document, Node};

use super::model::{BoundingBox, ElementCategory};
use super::parser::{ALTO_NS, decode_text, is_alto, page_extent, read_box, read_label};
use crate::error::Result;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WordBox {
    pub content: String,
    pub bbox: BoundingBox,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LineBox {
    pub bbox: BoundingBox,
    pub words: Vec<WordBox>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextBlock {
    pub id: String,
    pub bbox: BoundingBox,
    pub lines: Vec<LineBox>,
}

impl TextBlock {
    /// Block text: words joined by spaces, lines by newlines
    #[must_use]
    pub fn text(&self) -> String {
        self.lines
            .iter()
            .map(|line| {
                line.words
                    .iter()
                    .map(|w| w.content.as_str())
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockPage {
    pub native_width: i64,
    pub native_height: i64,
    pub blocks: Vec<TextBlock>,
}

/// Parse the text block hierarchy. Lines and words are taken from direct children only.
pub fn parse_blocks(document: &[u8]) -> Result<BlockPage> {
    let doc = Document::parse(decode_text(document)?)?;
    let extent = page_extent(&doc)?;

    let blocks = doc
        .descendants()
        .filter(|n| n.has_tag_name((ALTO_NS, "TextBlock")))
        .map(|block| TextBlock {
            id: read_label(&block, "ID"),
            bbox: read_box(&block),
            lines: alto_children(block, ElementCategory::Line)
                .map(|line| LineBox {
                    bbox: read_box(&line),
                    words: alto_children(line, ElementCategory::Word)
                        .map(|word| WordBox {
                            content: read_label(&word, "CONTENT"),
                            bbox: read_box(&word),
                        })
                        .collect(),
                })
                .collect(),
        })
        .collect();

    Ok(BlockPage {
        native_width: extent.width,
        native_height: extent.height,
        blocks,
    })
}

fn alto_children<'a, 'input>(
    node: Node<'a, 'input>,
    category: ElementCategory,
) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children().filter(move |n| is_alto(n, category))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    const SAMPLE: &str = r#"<alto xmlns="http://www.loc.gov/standards/alto/ns-v2#">
  <Layout><Page WIDTH="1000" HEIGHT="2000"><PrintSpace>
    <TextBlock ID="TB1" HPOS="10" VPOS="10" WIDTH="500" HEIGHT="100">
      <TextLine HPOS="10" VPOS="10" WIDTH="500" HEIGHT="40">
        <String CONTENT="Valdres" HPOS="10" VPOS="10" WIDTH="200" HEIGHT="40"/>
        <SP/>
        <String CONTENT="Avis" HPOS="220" VPOS="10" WIDTH="100" HEIGHT="40"/>
      </TextLine>
      <TextLine HPOS="10" VPOS="60" WIDTH="300" HEIGHT="40">
        <String CONTENT="1977" HPOS="10" VPOS="60" WIDTH="120" HEIGHT="40"/>
      </TextLine>
    </TextBlock>
    <TextBlock ID="TB2" HPOS="10" VPOS="300" WIDTH="500" HEIGHT="40"/>
  </PrintSpace></Page></Layout>
</alto>"#;

    #[test]
    fn builds_block_hierarchy() {
        let page = parse_blocks(SAMPLE.as_bytes()).unwrap();
        assert_eq!(page.native_width, 1000);
        assert_eq!(page.blocks.len(), 2);

        let first = &page.blocks[0];
        assert_eq!(first.id, "TB1");
        assert_eq!(first.lines.len(), 2);
        assert_eq!(first.lines[0].words.len(), 2);
        assert_eq!(first.lines[1].words[0].bbox, BoundingBox::new(10, 60, 120, 40));
    }

    #[test]
    fn joins_block_text() {
        let page = parse_blocks(SAMPLE.as_bytes()).unwrap();
        assert_eq!(page.blocks[0].text(), "Valdres Avis\n1977");
        assert_eq!(page.blocks[1].text(), "");
    }

    #[test]
    fn requires_page_declaration() {
        let xml = r#"<alto xmlns="http://www.loc.gov/standards/alto/ns-v2#"/>"#;
        assert!(matches!(
            parse_blocks(xml.as_bytes()),
            Err(Error::Format { .. })
        ));
    }
}
