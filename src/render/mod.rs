//! Page rendering: coordinate transform, annotation renderers and the render cache

mod block;
mod cache;
mod overlay;
mod raster;
mod request;
mod scale;
mod service;
mod style;
mod types;

pub use block::{BlockRenderOptions, BlockView, render_block};
pub use cache::{CachePolicy, CacheStats, Clock, RenderCache, SystemClock};
pub use overlay::{OverlayBox, PageOverlay};
pub use raster::{decode_raster, encode, probe_extent, render_annotated};
pub use request::{CancelToken, OutputFormat, PagePair, RenderRequest, SourceRevision};
pub use scale::{PageScale, ScaleLimits, SpanFit, compute_scale};
pub use service::{DEFAULT_MEMO_SIZE, PageService, ServiceConfig};
pub use style::{Stroke, StyleOverride, StyleTable, parse_hex_color};
pub use types::{CategorySet, DisplayBox, DisplayElement, PageLayout};
