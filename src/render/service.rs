//! Page service - parsed-page memo, render cache and the rendering entry points

use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use log::{debug, info};
use lru::LruCache;

use super::block::{BlockRenderOptions, BlockView, render_block};
use super::cache::{CachePolicy, CacheStats, RenderCache};
use super::overlay::PageOverlay;
use super::raster::{decode_raster, render_annotated};
use super::request::{CancelToken, FileStamp, PagePair, RenderRequest};
use super::scale::{PageScale, ScaleLimits, compute_scale};
use super::style::StyleTable;
use super::types::{CategorySet, PageLayout};
use crate::alto::{self, BlockPage, Extent, ParsedPage, TextBlock};
use crate::error::{Error, Result};

/// Parsed pages and raster extents kept by default
pub const DEFAULT_MEMO_SIZE: usize = 64;

#[derive(Clone, Debug, PartialEq)]
pub struct ServiceConfig {
    pub page_limits: ScaleLimits,
    pub page_styles: StyleTable,
    pub block: BlockRenderOptions,
    pub cache: CachePolicy,
    pub memo_size: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            page_limits: ScaleLimits::PAGE,
            page_styles: StyleTable::PAGE,
            block: BlockRenderOptions::default(),
            cache: CachePolicy::default(),
            memo_size: DEFAULT_MEMO_SIZE,
        }
    }
}

/// Serves overlays, annotated renders and block views for page pairs.
///
/// Safe to share between threads; renders of distinct pages run in parallel.
pub struct PageService {
    config: ServiceConfig,
    renders: RenderCache,
    /// Memo entries remember the stamp of the file they were built from and
    /// are rebuilt when it no longer matches
    pages: Mutex<LruCache<PathBuf, (FileStamp, Arc<ParsedPage>)>>,
    extents: Mutex<LruCache<PathBuf, (FileStamp, Extent)>>,
}

impl PageService {
    #[must_use]
    pub fn new(config: ServiceConfig) -> Self {
        let renders = RenderCache::new(config.cache);
        Self::with_cache(config, renders)
    }

    /// Use a preconfigured render cache, e.g. one with its own clock
    #[must_use]
    pub fn with_cache(config: ServiceConfig, renders: RenderCache) -> Self {
        let memo = NonZeroUsize::new(config.memo_size).unwrap_or(NonZeroUsize::MIN);
        Self {
            config,
            renders,
            pages: Mutex::new(LruCache::new(memo)),
            extents: Mutex::new(LruCache::new(memo)),
        }
    }

    #[must_use]
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Parse the page description, reusing an earlier parse of the unchanged file
    pub fn load_page(&self, pair: &PagePair) -> Result<Arc<ParsedPage>> {
        let stamp = FileStamp::of(&pair.alto)?;
        if let Some((seen, page)) = lock(&self.pages).get(&pair.alto) {
            if *seen == stamp {
                return Ok(Arc::clone(page));
            }
            debug!("{:?} changed on disk, parsing again", pair.alto);
        }
        let page = Arc::new(alto::parse(&read(&pair.alto)?)?);
        lock(&self.pages).put(pair.alto.clone(), (stamp, Arc::clone(&page)));
        Ok(page)
    }

    /// Raster dimensions from the file header
    pub fn raster_extent(&self, path: &Path) -> Result<Extent> {
        let stamp = FileStamp::of(path)?;
        let memo = lock(&self.extents)
            .get(path)
            .filter(|(seen, _)| *seen == stamp)
            .map(|(_, extent)| *extent);
        if let Some(extent) = memo {
            return Ok(extent);
        }
        let size = imagesize::size(path).map_err(|e| match e {
            imagesize::ImageError::IoError(source) => Error::io(path, source),
            other => Error::raster(format!("{}: {other}", path.display())),
        })?;
        let extent = Extent::new(size.width as i64, size.height as i64);
        lock(&self.extents).put(path.to_path_buf(), (stamp, extent));
        Ok(extent)
    }

    pub fn page_scale(
        &self,
        pair: &PagePair,
        zoom_percent: u32,
    ) -> Result<(Arc<ParsedPage>, PageScale)> {
        let page = self.load_page(pair)?;
        let raster = self.raster_extent(&pair.raster)?;
        let scale = compute_scale(
            page.native_extent(),
            raster,
            zoom_percent,
            &self.config.page_limits,
        )?;
        Ok((page, scale))
    }

    /// Display-space boxes for a client to draw. Needs only the raster header.
    pub fn overlay(
        &self,
        pair: &PagePair,
        zoom_percent: u32,
        visibility: CategorySet,
    ) -> Result<PageOverlay> {
        let (page, scale) = self.page_scale(pair, zoom_percent)?;
        let layout = PageLayout::build(&page, &scale);
        Ok(PageOverlay::from_layout(pair.page_id(), &layout, visibility))
    }

    pub fn render(&self, request: &RenderRequest) -> Result<Arc<Vec<u8>>> {
        self.render_with(request, &CancelToken::new())
    }

    /// Annotated raster for `request`, from the cache when possible
    pub fn render_with(
        &self,
        request: &RenderRequest,
        cancel: &CancelToken,
    ) -> Result<Arc<Vec<u8>>> {
        self.renders.get_or_render_with(request, cancel, |cancel| {
            let (page, scale) = self.page_scale(&request.pair, request.zoom_percent)?;
            let layout = PageLayout::build(&page, &scale);
            cancel.check()?;

            let raster = decode_raster(&read(&request.pair.raster)?)?;
            cancel.check()?;

            let bytes = render_annotated(
                &raster,
                &layout,
                request.visibility,
                &self.config.page_styles,
                request.format,
                cancel,
            )?;
            info!(
                "Rendered {} at {}% ({}x{}, {}, {} bytes)",
                request.pair.page_id(),
                request.zoom_percent,
                layout.display_width,
                layout.display_height,
                request.format,
                bytes.len()
            );
            Ok(bytes)
        })
    }

    pub fn load_blocks(&self, pair: &PagePair) -> Result<BlockPage> {
        alto::parse_blocks(&read(&pair.alto)?)
    }

    /// Text block `index` and its close-up as PNG
    pub fn block_image(&self, pair: &PagePair, index: usize) -> Result<(TextBlock, Vec<u8>)> {
        let mut blocks = self.load_blocks(pair)?;
        if index >= blocks.blocks.len() {
            return Err(Error::BlockNotFound(index));
        }
        let raster = decode_raster(&read(&pair.raster)?)?;
        let png = render_block(&raster, &blocks, index, &self.config.block)?;
        Ok((blocks.blocks.swap_remove(index), png))
    }

    /// Close-up of text block `index` with its text
    pub fn block_view(&self, pair: &PagePair, index: usize) -> Result<BlockView> {
        let (block, png) = self.block_image(pair, index)?;
        Ok(BlockView::new(&block, &png))
    }

    /// Forget everything derived from `pair`'s files
    pub fn invalidate(&self, pair: &PagePair) {
        lock(&self.pages).pop(&pair.alto);
        lock(&self.extents).pop(&pair.raster);
        let dropped = self.renders.invalidate(pair);
        debug!("Invalidated {} ({dropped} renders)", pair.page_id());
    }

    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        self.renders.stats()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn read(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| Error::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alto::{BoundingBox, ElementCategory};
    use crate::render::request::{OutputFormat, SourceRevision};
    use crate::test_utils::test_helpers::{AltoBuilder, gray_png, write_page};
    use tempfile::TempDir;

    fn fixture(dir: &TempDir) -> PagePair {
        let words: &[(&str, BoundingBox)] = &[("Avis", BoundingBox::new(120, 100, 40, 20))];
        let xml = AltoBuilder::new(400, 400)
            .block("ART1", BoundingBox::new(40, 40, 300, 300))
            .line(BoundingBox::new(100, 100, 100, 20))
            .word("Valdres", BoundingBox::new(100, 100, 60, 20))
            .text_block(
                "TB1",
                BoundingBox::new(100, 100, 100, 40),
                &[(BoundingBox::new(100, 100, 100, 20), words)],
            )
            .build();
        write_page(dir.path(), "page_001", &xml, &gray_png(200, 200, 220))
    }

    fn small_pages() -> ServiceConfig {
        ServiceConfig {
            page_limits: ScaleLimits {
                max_span: 400.0,
                ..ScaleLimits::PAGE
            },
            ..ServiceConfig::default()
        }
    }

    #[test]
    fn overlay_maps_boxes_to_display_space() {
        let dir = TempDir::new().unwrap();
        let pair = fixture(&dir);
        let service = PageService::new(small_pages());

        let overlay = service.overlay(&pair, 100, CategorySet::ALL).unwrap();
        assert_eq!(overlay.native_page_id, "page_001_null");
        assert_eq!((overlay.display_width, overlay.display_height), (400, 400));
        let blocks = overlay.boxes(ElementCategory::Block);
        assert_eq!(blocks[0].x, 40);
        assert_eq!(blocks[0].label.as_deref(), Some("ART1"));
        // flat parse sees the standalone word and the one inside the text block
        assert_eq!(overlay.boxes(ElementCategory::Word).len(), 2);
    }

    #[test]
    fn render_is_cached_per_request() {
        let dir = TempDir::new().unwrap();
        let pair = fixture(&dir);
        let service = PageService::new(small_pages());
        let request = RenderRequest::new(pair.clone(), 50);

        let first = service.render(&request).unwrap();
        let second = service.render(&request).unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        let img = image::load_from_memory(&first).unwrap();
        assert_eq!((img.width(), img.height()), (200, 200));

        let jpeg = service
            .render(&request.clone().with_format(OutputFormat::Jpeg { quality: 80 }))
            .unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        let stats = service.cache_stats();
        assert_eq!((stats.hits, stats.misses, stats.entries), (1, 2, 2));
    }

    #[test]
    fn plain_image_has_no_outlines() {
        let dir = TempDir::new().unwrap();
        let pair = fixture(&dir);
        let service = PageService::new(small_pages());
        let request = RenderRequest::new(pair, 100).with_visibility(CategorySet::NONE);
        let img = image::load_from_memory(&service.render(&request).unwrap())
            .unwrap()
            .to_rgb8();
        assert!(img.pixels().all(|p| p.0[0] == p.0[1] && p.0[1] == p.0[2]));
    }

    #[test]
    fn missing_files_are_io_errors() {
        let service = PageService::new(ServiceConfig::default());
        let pair = PagePair::new("/nonexistent/p_null.xml", "/nonexistent/p_null.png");
        assert!(matches!(
            service.overlay(&pair, 100, CategorySet::ALL),
            Err(Error::Io { .. })
        ));
    }

    #[test]
    fn corrupt_raster_fails_render_but_not_overlay() {
        let dir = TempDir::new().unwrap();
        let pair = fixture(&dir);
        let png = gray_png(200, 200, 220);
        fs::write(&pair.raster, &png[..40]).unwrap();
        let service = PageService::new(small_pages());

        assert!(service.overlay(&pair, 100, CategorySet::ALL).is_ok());
        let err = service.render(&RenderRequest::new(pair, 100));
        assert!(matches!(err, Err(Error::RasterDecode { .. })));
        assert_eq!(service.cache_stats().entries, 0);
    }

    #[test]
    fn invalidate_picks_up_replaced_files() {
        let dir = TempDir::new().unwrap();
        let pair = fixture(&dir);
        let service = PageService::new(small_pages());
        assert_eq!(
            service.overlay(&pair, 100, CategorySet::ALL).unwrap().display_width,
            400
        );

        fs::write(&pair.raster, gray_png(100, 100, 220)).unwrap();
        service.invalidate(&pair);
        let overlay = service.overlay(&pair, 100, CategorySet::ALL).unwrap();
        assert_eq!(overlay.display_width, 400);
        assert_eq!(overlay.boxes(ElementCategory::Block)[0].x, 40);

        let revised = RenderRequest::new(pair.clone(), 100)
            .with_revision(SourceRevision::probe(&pair).unwrap());
        let img = image::load_from_memory(&service.render(&revised).unwrap()).unwrap();
        assert_eq!(img.width(), 400);
    }

    #[test]
    fn stroke_width_does_not_scale_with_zoom() {
        let dir = TempDir::new().unwrap();
        let pair = fixture(&dir);
        let service = PageService::new(small_pages());
        let orange = image::Rgb([0xFF, 0xA5, 0x00]);

        for (zoom, edge, row) in [(100, 40, 200), (200, 80, 400)] {
            let request = RenderRequest::new(pair.clone(), zoom)
                .with_visibility(CategorySet::only(ElementCategory::Block));
            let img = image::load_from_memory(&service.render(&request).unwrap())
                .unwrap()
                .to_rgb8();
            assert_eq!(*img.get_pixel(edge, row), orange, "zoom {zoom}");
            assert_eq!(*img.get_pixel(edge + 1, row), orange, "zoom {zoom}");
            assert_ne!(*img.get_pixel(edge + 2, row), orange, "zoom {zoom}");
        }
    }

    #[test]
    fn replaced_description_is_parsed_again_without_invalidate() {
        let dir = TempDir::new().unwrap();
        let pair = fixture(&dir);
        let service = PageService::new(small_pages());
        let before = RenderRequest::new(pair.clone(), 100)
            .with_revision(SourceRevision::probe(&pair).unwrap());
        service.render(&before).unwrap();

        let moved = AltoBuilder::new(400, 400)
            .block("ART1", BoundingBox::new(240, 40, 100, 100))
            .build();
        fs::write(&pair.alto, moved).unwrap();

        let overlay = service.overlay(&pair, 100, CategorySet::ALL).unwrap();
        assert_eq!(overlay.boxes(ElementCategory::Block)[0].x, 240);

        let after = RenderRequest::new(pair.clone(), 100)
            .with_revision(SourceRevision::probe(&pair).unwrap());
        assert_ne!(before, after);
        let shared = service.render(&after).unwrap();
        let fresh = PageService::new(small_pages()).render(&after).unwrap();
        assert_eq!(shared, fresh);
    }

    #[test]
    fn block_view_returns_text_and_png() {
        let dir = TempDir::new().unwrap();
        let pair = fixture(&dir);
        let service = PageService::new(ServiceConfig::default());

        let view = service.block_view(&pair, 0).unwrap();
        assert_eq!(view.id, "TB1");
        assert_eq!(view.text, "Avis");
        assert!(view.image.starts_with("iVBORw0KGgo"));

        assert!(matches!(
            service.block_view(&pair, 5),
            Err(Error::BlockNotFound(5))
        ));
    }
}
