//! Raster-mode rendering: scale the page image and burn category outlines into it

use std::num::NonZeroU32;

use fast_image_resize as fr;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{DynamicImage, ExtendedColorType, ImageEncoder, RgbImage};
use log::{debug, warn};

use super::request::{CancelToken, OutputFormat};
use super::style::{Stroke, StyleTable};
use super::types::{CategorySet, DisplayBox, PageLayout};
use crate::alto::Extent;
use crate::error::{Error, Result};

/// Read raster dimensions from the header without decoding pixels
pub fn probe_extent(bytes: &[u8]) -> Result<Extent> {
    let size = imagesize::blob_size(bytes).map_err(|e| Error::raster(e.to_string()))?;
    Ok(Extent::new(size.width as i64, size.height as i64))
}

pub fn decode_raster(bytes: &[u8]) -> Result<DynamicImage> {
    image::load_from_memory(bytes).map_err(|e| Error::raster(e.to_string()))
}

/// Render the page at display size with the visible categories outlined.
///
/// The raster is resized first and the outlines are drawn afterwards, so stroke
/// widths are display pixels: they stay the same at every zoom instead of
/// scaling with the image. `raster` is read only; the canvas is a scaled copy.
pub fn render_annotated(
    raster: &DynamicImage,
    layout: &PageLayout,
    visibility: CategorySet,
    styles: &StyleTable,
    format: OutputFormat,
    cancel: &CancelToken,
) -> Result<Vec<u8>> {
    let mut canvas = resize_rgb(
        &raster.to_rgb8(),
        layout.display_width,
        layout.display_height,
    );
    cancel.check()?;

    for category in visibility.iter() {
        let stroke = styles.stroke(category);
        for element in layout.elements_of(category) {
            stroke_rect(&mut canvas, element.rect, stroke);
        }
    }
    cancel.check()?;

    encode(&canvas, format)
}

/// Resize to exactly `width` x `height`, returning a copy when already that size
pub(crate) fn resize_rgb(src: &RgbImage, width: u32, height: u32) -> RgbImage {
    if src.dimensions() == (width, height) {
        return src.clone();
    }
    match fast_resize(src, width, height) {
        Ok(resized) => resized,
        Err(e) => {
            warn!("Fast resize failed, falling back to image::imageops: {e}");
            image::imageops::resize(src, width, height, image::imageops::FilterType::Lanczos3)
        }
    }
}

fn fast_resize(
    src: &RgbImage,
    width: u32,
    height: u32,
) -> std::result::Result<RgbImage, Box<dyn std::error::Error>> {
    let (src_width, src_height) = src.dimensions();
    let src_view = fr::Image::from_vec_u8(
        NonZeroU32::new(src_width).ok_or("Invalid width")?,
        NonZeroU32::new(src_height).ok_or("Invalid height")?,
        src.as_raw().clone(),
        fr::PixelType::U8x3,
    )?;

    let dst_width = NonZeroU32::new(width).ok_or("Invalid target width")?;
    let dst_height = NonZeroU32::new(height).ok_or("Invalid target height")?;
    let mut dst = fr::Image::new(dst_width, dst_height, fr::PixelType::U8x3);

    let mut resizer = fr::Resizer::new(fr::ResizeAlg::Convolution(fr::FilterType::Lanczos3));
    resizer.resize(&src_view.view(), &mut dst.view_mut())?;

    debug!("Resized {src_width}x{src_height} -> {width}x{height}");
    RgbImage::from_raw(width, height, dst.into_vec())
        .ok_or_else(|| "Fast resize produced invalid buffer".into())
}

/// Outline `rect` with strokes drawn inward, clipped to the canvas.
///
/// Zero-sized boxes still get a one pixel mark.
pub(crate) fn stroke_rect(canvas: &mut RgbImage, rect: DisplayBox, stroke: Stroke) {
    let (canvas_width, canvas_height) = canvas.dimensions();
    if stroke.width == 0 || rect.x >= canvas_width || rect.y >= canvas_height {
        return;
    }

    let x0 = rect.x;
    let y0 = rect.y;
    let x1 = rect.x.saturating_add(rect.width.max(1)).min(canvas_width);
    let y1 = rect.y.saturating_add(rect.height.max(1)).min(canvas_height);
    let t = stroke.width;

    let mut fill = |fx0: u32, fy0: u32, fx1: u32, fy1: u32| {
        for y in fy0..fy1 {
            for x in fx0..fx1 {
                canvas.put_pixel(x, y, stroke.color);
            }
        }
    };

    fill(x0, y0, x1, y0.saturating_add(t).min(y1));
    fill(x0, y1.saturating_sub(t).max(y0), x1, y1);
    fill(x0, y0, x0.saturating_add(t).min(x1), y1);
    fill(x1.saturating_sub(t).max(x0), y0, x1, y1);
}

pub fn encode(canvas: &RgbImage, format: OutputFormat) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    let (width, height) = canvas.dimensions();
    let written = match format {
        OutputFormat::Png => PngEncoder::new(&mut bytes).write_image(
            canvas.as_raw(),
            width,
            height,
            ExtendedColorType::Rgb8,
        ),
        OutputFormat::Jpeg { quality } => JpegEncoder::new_with_quality(&mut bytes, quality)
            .write_image(canvas.as_raw(), width, height, ExtendedColorType::Rgb8),
    };
    written.map_err(|e| Error::encode(e.to_string()))?;
    Ok(bytes)
}
