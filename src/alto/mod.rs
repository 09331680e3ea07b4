//! ALTO page-description parsing

mod blocks;
mod model;
mod parser;

pub use blocks::{BlockPage, LineBox, TextBlock, WordBox, parse_blocks};
pub use model::{BoundingBox, ElementCategory, Extent, GeometricElement, ParsedPage};
pub use parser::{ALTO_NS, parse, parse_str};
