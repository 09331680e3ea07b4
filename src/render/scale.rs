//! Coordinate transform from native document space to display pixels
//!
//! Two independent scales are composed:
//!
//! * the *box scale* maps native document units onto the raster's pixel grid
//!   (`raster / native`, per axis), and
//! * the *image scale* maps raster pixels onto the display: a base scale that fits
//!   the raster into a maximum span without magnifying past a cap, times the zoom.
//!
//! Boxes are mapped by applying both stages in sequence. Pre-multiplying the two
//! factors rounds differently at fractional scales, so the order is kept.

use serde::{Deserialize, Serialize};

use super::types::DisplayBox;
use crate::alto::{BoundingBox, Extent};
use crate::error::{Error, Result};

/// Which raster dimension the base scale fits into the maximum span
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanFit {
    /// The larger of width and height fits the span
    #[default]
    Larger,
    /// Only the width fits the span; tall pages may exceed it vertically
    Width,
}

/// Bounds on the base display scale
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScaleLimits {
    /// Maximum display span in pixels at 100% zoom
    pub max_span: f64,
    /// Upper bound on the base scale relative to the raster's own pixels
    pub max_magnification: f64,
    pub fit: SpanFit,
}

impl ScaleLimits {
    /// Full page view
    pub const PAGE: Self = Self {
        max_span: 3200.0,
        max_magnification: 4.0,
        fit: SpanFit::Larger,
    };

    /// Single text block close-up
    pub const BLOCK: Self = Self {
        max_span: 800.0,
        max_magnification: 2.0,
        fit: SpanFit::Larger,
    };

    fn validate(&self) -> Result<()> {
        let valid = |v: f64| v.is_finite() && v > 0.0;
        if valid(self.max_span) && valid(self.max_magnification) {
            Ok(())
        } else {
            Err(Error::geometry(format!(
                "scale limits must be positive (span {}, magnification {})",
                self.max_span, self.max_magnification
            )))
        }
    }

    /// Base scale for a raster before zoom is applied
    #[must_use]
    pub fn base_scale(&self, raster: Extent) -> f64 {
        let width = raster.width as f64;
        let height = raster.height as f64;
        let fit = match self.fit {
            SpanFit::Larger => (self.max_span / width).min(self.max_span / height),
            SpanFit::Width => self.max_span / width,
        };
        fit.min(self.max_magnification)
    }
}

impl Default for ScaleLimits {
    fn default() -> Self {
        Self::PAGE
    }
}

/// Composite scale for one (page, raster, zoom) combination
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PageScale {
    pub box_scale_x: f64,
    pub box_scale_y: f64,
    pub image_scale: f64,
    pub output_width: u32,
    pub output_height: u32,
}

/// Compute the composite scale factors and the output canvas size.
///
/// Pure: identical inputs always give identical results.
pub fn compute_scale(
    native: Extent,
    raster: Extent,
    zoom_percent: u32,
    limits: &ScaleLimits,
) -> Result<PageScale> {
    if !native.is_positive() {
        return Err(Error::geometry(format!(
            "native page extent {}x{} must be positive",
            native.width, native.height
        )));
    }
    if !raster.is_positive() {
        return Err(Error::geometry(format!(
            "raster extent {}x{} must be positive",
            raster.width, raster.height
        )));
    }
    if zoom_percent == 0 {
        return Err(Error::InvalidZoom(zoom_percent));
    }
    limits.validate()?;

    let image_scale = limits.base_scale(raster) * f64::from(zoom_percent) / 100.0;

    Ok(PageScale {
        box_scale_x: raster.width as f64 / native.width as f64,
        box_scale_y: raster.height as f64 / native.height as f64,
        image_scale,
        output_width: scaled_len(raster.width, image_scale),
        output_height: scaled_len(raster.height, image_scale),
    })
}

fn scaled_len(len: i64, scale: f64) -> u32 {
    (len as f64 * scale).round().max(1.0) as u32
}

impl PageScale {
    /// Map a native box into display space, clamped to the output canvas
    #[must_use]
    pub fn map_box(&self, bbox: &BoundingBox) -> DisplayBox {
        let x = self.to_display(bbox.x, self.box_scale_x);
        let y = self.to_display(bbox.y, self.box_scale_y);
        let width = self.to_display(bbox.width, self.box_scale_x);
        let height = self.to_display(bbox.height, self.box_scale_y);

        let (x, width) = clamp_span(x, width, self.output_width);
        let (y, height) = clamp_span(y, height, self.output_height);
        DisplayBox::new(x, y, width, height)
    }

    /// Map a native box onto the raster's own pixel grid (first stage only).
    ///
    /// Not clamped; callers cropping the raster clamp against its extent.
    #[must_use]
    pub fn to_raster(&self, bbox: &BoundingBox) -> BoundingBox {
        BoundingBox::new(
            (bbox.x as f64 * self.box_scale_x).round() as i64,
            (bbox.y as f64 * self.box_scale_y).round() as i64,
            (bbox.width as f64 * self.box_scale_x).round() as i64,
            (bbox.height as f64 * self.box_scale_y).round() as i64,
        )
    }

    fn to_display(&self, native: i64, box_scale: f64) -> f64 {
        let raster_px = native as f64 * box_scale;
        (raster_px * self.image_scale).round()
    }
}

/// Clip `[start, start + len)` to `[0, limit]`
fn clamp_span(start: f64, len: f64, limit: u32) -> (u32, u32) {
    let limit = f64::from(limit);
    let end = (start + len.max(0.0)).clamp(0.0, limit);
    let start = start.clamp(0.0, limit);
    let len = (end - start).max(0.0);
    (start as u32, len as u32)
}
