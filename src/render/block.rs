//! Block inspector: a padded close-up of one text block with its lines and words outlined

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::DynamicImage;
use serde::Serialize;

use super::raster::{encode, resize_rgb, stroke_rect};
use super::request::OutputFormat;
use super::scale::{ScaleLimits, compute_scale};
use super::style::StyleTable;
use crate::alto::{BlockPage, BoundingBox, ElementCategory, Extent, TextBlock};
use crate::error::{Error, Result};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BlockRenderOptions {
    pub limits: ScaleLimits,
    /// Raster pixels kept around the block on every side
    pub padding: u32,
    pub styles: StyleTable,
}

impl Default for BlockRenderOptions {
    fn default() -> Self {
        Self {
            limits: ScaleLimits::BLOCK,
            padding: 20,
            styles: StyleTable::BLOCK,
        }
    }
}

/// What a client receives for one block
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BlockView {
    pub id: String,
    pub text: String,
    /// Base64 encoded PNG
    pub image: String,
}

impl BlockView {
    #[must_use]
    pub fn new(block: &TextBlock, png: &[u8]) -> Self {
        Self {
            id: block.id.clone(),
            text: block.text(),
            image: STANDARD.encode(png),
        }
    }
}

/// Render block `index` of `page` as PNG
pub fn render_block(
    raster: &DynamicImage,
    page: &BlockPage,
    index: usize,
    options: &BlockRenderOptions,
) -> Result<Vec<u8>> {
    let block = page.blocks.get(index).ok_or(Error::BlockNotFound(index))?;

    let raster_extent = Extent::new(i64::from(raster.width()), i64::from(raster.height()));
    let native = Extent::new(page.native_width, page.native_height);
    let page_scale = compute_scale(native, raster_extent, 100, &options.limits)?;

    let block_px = page_scale.to_raster(&block.bbox);
    let pad = i64::from(options.padding);
    let x0 = block_px.x.saturating_sub(pad).clamp(0, raster_extent.width);
    let y0 = block_px.y.saturating_sub(pad).clamp(0, raster_extent.height);
    let x1 = block_px.right().saturating_add(pad).clamp(0, raster_extent.width);
    let y1 = block_px.bottom().saturating_add(pad).clamp(0, raster_extent.height);
    if x1 <= x0 || y1 <= y0 {
        return Err(Error::geometry(format!(
            "block {} lies outside the raster",
            block.id
        )));
    }

    let crop_extent = Extent::new(x1 - x0, y1 - y0);
    let crop = image::imageops::crop_imm(
        raster,
        x0 as u32,
        y0 as u32,
        crop_extent.width as u32,
        crop_extent.height as u32,
    )
    .to_image();
    // crop pixels are the native space of the close-up, so only the image scale applies
    let crop_scale = compute_scale(crop_extent, crop_extent, 100, &options.limits)?;

    let mut canvas = resize_rgb(
        &DynamicImage::ImageRgba8(crop).to_rgb8(),
        crop_scale.output_width,
        crop_scale.output_height,
    );

    let in_crop = |bbox: &BoundingBox| {
        let px = page_scale.to_raster(bbox);
        crop_scale.map_box(&BoundingBox::new(
            px.x.saturating_sub(x0),
            px.y.saturating_sub(y0),
            px.width,
            px.height,
        ))
    };

    let line_stroke = options.styles.stroke(ElementCategory::Line);
    for line in &block.lines {
        stroke_rect(&mut canvas, in_crop(&line.bbox), line_stroke);
    }
    let word_stroke = options.styles.stroke(ElementCategory::Word);
    for word in block.lines.iter().flat_map(|l| &l.words) {
        stroke_rect(&mut canvas, in_crop(&word.bbox), word_stroke);
    }

    encode(&canvas, OutputFormat::Png)
}
