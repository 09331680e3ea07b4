use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, bail};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};

use crate::library::IndexOptions;
use crate::render::{
    BlockRenderOptions, CachePolicy, DEFAULT_MEMO_SIZE, OutputFormat, ScaleLimits,
    ServiceConfig, SpanFit, StyleOverride, StyleTable,
};

pub const CURRENT_VERSION: u32 = 1;
const SETTINGS_FILENAME: &str = "config.yaml";
const APP_NAME: &str = "altoview";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub version: u32,

    /// Directory holding one unpacked directory per newspaper issue
    pub library_root: PathBuf,
    pub ocr_subdir: String,
    pub alto_suffix: String,
    pub raster_extensions: Vec<String>,

    pub max_display_span: f64,
    pub max_magnification: f64,
    pub span_fit: SpanFit,

    pub block_max_display_span: f64,
    pub block_max_magnification: f64,
    pub block_padding: u32,

    pub min_zoom: u32,
    pub max_zoom: u32,
    pub default_zoom: u32,

    pub cache_max_entries: usize,
    pub cache_max_bytes: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_ttl_secs: Option<u64>,

    pub jpeg_quality: u8,

    /// Page overlay colors keyed by category (`composedBlock`, `textLine`, ...)
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub styles: BTreeMap<String, StyleOverride>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub block_styles: BTreeMap<String, StyleOverride>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            library_root: PathBuf::from("unpacked"),
            ocr_subdir: "ocr".to_string(),
            alto_suffix: "_null.xml".to_string(),
            raster_extensions: ["jp2", "tif", "tiff", "png", "jpg", "jpeg"]
                .map(String::from)
                .to_vec(),
            max_display_span: ScaleLimits::PAGE.max_span,
            max_magnification: ScaleLimits::PAGE.max_magnification,
            span_fit: SpanFit::default(),
            block_max_display_span: ScaleLimits::BLOCK.max_span,
            block_max_magnification: ScaleLimits::BLOCK.max_magnification,
            block_padding: 20,
            min_zoom: 25,
            max_zoom: 400,
            default_zoom: 100,
            cache_max_entries: CachePolicy::default().max_entries,
            cache_max_bytes: CachePolicy::default().max_bytes,
            cache_ttl_secs: None,
            jpeg_quality: OutputFormat::DEFAULT_JPEG_QUALITY,
            styles: BTreeMap::new(),
            block_styles: BTreeMap::new(),
        }
    }
}

impl Settings {
    #[must_use]
    pub fn scale_limits(&self) -> ScaleLimits {
        ScaleLimits {
            max_span: self.max_display_span,
            max_magnification: self.max_magnification,
            fit: self.span_fit,
        }
    }

    #[must_use]
    pub fn block_options(&self) -> BlockRenderOptions {
        BlockRenderOptions {
            limits: ScaleLimits {
                max_span: self.block_max_display_span,
                max_magnification: self.block_max_magnification,
                fit: self.span_fit,
            },
            padding: self.block_padding,
            styles: StyleTable::BLOCK.with_overrides(&self.block_styles),
        }
    }

    #[must_use]
    pub fn cache_policy(&self) -> CachePolicy {
        CachePolicy {
            max_entries: self.cache_max_entries,
            max_bytes: self.cache_max_bytes,
            ttl: self.cache_ttl_secs.map(Duration::from_secs),
        }
    }

    #[must_use]
    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            page_limits: self.scale_limits(),
            page_styles: StyleTable::PAGE.with_overrides(&self.styles),
            block: self.block_options(),
            cache: self.cache_policy(),
            memo_size: DEFAULT_MEMO_SIZE,
        }
    }

    #[must_use]
    pub fn index_options(&self) -> IndexOptions {
        IndexOptions {
            ocr_subdir: self.ocr_subdir.clone(),
            alto_suffix: self.alto_suffix.clone(),
            raster_extensions: self.raster_extensions.clone(),
        }
    }

    /// Apply the configured JPEG quality to a parsed format
    #[must_use]
    pub fn output_format(&self, format: OutputFormat) -> OutputFormat {
        match format {
            OutputFormat::Jpeg { .. } => OutputFormat::Jpeg {
                quality: self.jpeg_quality,
            },
            png => png,
        }
    }

    /// Zoom requested by a user, or the default; must lie within the configured bounds
    pub fn check_zoom(&self, zoom: Option<u32>) -> anyhow::Result<u32> {
        let zoom = zoom.unwrap_or(self.default_zoom);
        if zoom < self.min_zoom || zoom > self.max_zoom {
            bail!(
                "zoom {zoom}% outside the allowed range {}%..={}%",
                self.min_zoom,
                self.max_zoom
            );
        }
        Ok(zoom)
    }
}

#[must_use]
pub fn preferred_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|config| config.join(APP_NAME).join(SETTINGS_FILENAME))
}

/// Load settings from `explicit` or the platform config path.
///
/// A missing file is created with defaults; an unreadable one is reported and
/// defaults are used.
pub fn load_settings(explicit: Option<&Path>) -> Settings {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => match preferred_config_path() {
            Some(path) => path,
            None => {
                warn!("Could not determine config directory, using default settings");
                return Settings::default();
            }
        },
    };

    if !path.exists() {
        info!("Settings file not found, creating with defaults at {path:?}");
        let settings = Settings::default();
        if let Err(e) = save_settings_to_file(&settings, &path) {
            error!("{e:#}");
        }
        return settings;
    }

    match load_settings_from_path(&path) {
        Ok(settings) => settings,
        Err(e) => {
            error!("{e:#}");
            Settings::default()
        }
    }
}

pub fn load_settings_from_path(path: &Path) -> anyhow::Result<Settings> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read settings file {path:?}"))?;
    let mut settings: Settings = serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse settings file {path:?}"))?;
    debug!("Loaded settings from {path:?}");

    if settings.version < CURRENT_VERSION {
        migrate_settings(&mut settings);
        save_settings_to_file(&settings, path)?;
    }
    Ok(settings)
}

fn migrate_settings(settings: &mut Settings) {
    info!(
        "Migrating settings from v{} to v{}",
        settings.version, CURRENT_VERSION
    );
    settings.version = CURRENT_VERSION;
}

pub fn save_settings_to_file(settings: &Settings, path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory {parent:?}"))?;
        }
    }

    let mut content = String::from(SETTINGS_HEADER);
    content.push_str(&serde_yaml::to_string(settings).context("Failed to serialize settings")?);
    content.push_str(STYLES_TEMPLATE);

    fs::write(path, content).with_context(|| format!("Failed to save settings to {path:?}"))?;
    debug!("Saved settings to {path:?}");
    Ok(())
}

const SETTINGS_HEADER: &str = "# altoview settings\n\n";

const STYLES_TEMPLATE: &str = r##"
# ============================================================================
# Overlay styles
# ============================================================================
# Override the outline color and width per category. Keys: composedBlock,
# illustration, textLine, string. block_styles applies to the block inspector.
#
# Example:
# styles:
#   composedBlock: { color: "#ffa500", width: 2 }
#   illustration:  { color: "#ff00ff", width: 3 }
#   textLine:      { color: "#008000", width: 2 }
#   string:        { color: "#0000ff", width: 2 }
# block_styles:
#   textLine:      { color: "#0000ff", width: 2 }
#   string:        { color: "#ff0000", width: 1 }
"##;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alto::ElementCategory;
    use image::Rgb;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn defaults_survive_a_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        save_settings_to_file(&Settings::default(), &path).unwrap();
        assert_eq!(load_settings_from_path(&path).unwrap(), Settings::default());
    }

    #[test]
    fn partial_files_fill_in_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(
            &path,
            "version: 1\nspan_fit: width\ncache_ttl_secs: 30\nstyles:\n  textLine: { color: \"#112233\" }\n",
        )
        .unwrap();

        let settings = load_settings_from_path(&path).unwrap();
        assert_eq!(settings.span_fit, SpanFit::Width);
        assert_eq!(settings.max_display_span, 3200.0);
        assert_eq!(settings.alto_suffix, "_null.xml");

        let config = settings.service_config();
        assert_eq!(config.cache.ttl, Some(Duration::from_secs(30)));
        assert_eq!(config.page_limits.fit, SpanFit::Width);
        assert_eq!(
            config.page_styles.stroke(ElementCategory::Line).color,
            Rgb([0x11, 0x22, 0x33])
        );
        assert_eq!(config.block.limits.max_span, 800.0);
        assert_eq!(config.block.padding, 20);
    }

    #[test]
    fn unversioned_files_are_migrated() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "version: 0\nmax_zoom: 300\n").unwrap();

        let settings = load_settings_from_path(&path).unwrap();
        assert_eq!(settings.version, CURRENT_VERSION);
        assert_eq!(settings.max_zoom, 300);
        let rewritten = fs::read_to_string(&path).unwrap();
        assert!(rewritten.contains("version: 1"));
    }

    #[test]
    fn missing_file_is_created_with_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.yaml");
        let settings = load_settings(Some(&path));
        assert_eq!(settings, Settings::default());
        assert!(path.exists());
    }

    #[test]
    fn unparseable_file_falls_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "max_zoom: [oops").unwrap();
        assert!(load_settings_from_path(&path).is_err());
        assert_eq!(load_settings(Some(&path)), Settings::default());
    }

    #[test]
    fn zoom_is_bounded() {
        let settings = Settings::default();
        assert_eq!(settings.check_zoom(None).unwrap(), 100);
        assert_eq!(settings.check_zoom(Some(25)).unwrap(), 25);
        assert!(settings.check_zoom(Some(24)).is_err());
        assert!(settings.check_zoom(Some(401)).is_err());
    }

    #[test]
    fn jpeg_quality_comes_from_settings() {
        let settings = Settings {
            jpeg_quality: 70,
            ..Settings::default()
        };
        assert_eq!(
            settings.output_format(OutputFormat::Jpeg { quality: 85 }),
            OutputFormat::Jpeg { quality: 70 }
        );
        assert_eq!(settings.output_format(OutputFormat::Png), OutputFormat::Png);
    }

    #[cfg(target_os = "linux")]
    #[test]
    #[serial]
    fn default_location_follows_xdg_config_home() {
        let dir = TempDir::new().unwrap();
        let previous = std::env::var_os("XDG_CONFIG_HOME");
        // SAFETY: serialized with other tests that touch the environment
        unsafe { std::env::set_var("XDG_CONFIG_HOME", dir.path()) };

        let settings = load_settings(None);
        let expected = dir.path().join("altoview").join("config.yaml");

        match previous {
            Some(value) => unsafe { std::env::set_var("XDG_CONFIG_HOME", value) },
            None => unsafe { std::env::remove_var("XDG_CONFIG_HOME") },
        }
        assert_eq!(settings, Settings::default());
        assert!(expected.exists());
    }
}
