use anyhow::{Context, Result, bail};
use log::{debug, warn};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::render::PagePair;

/// Where page pairs live inside a newspaper directory and how they are named
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexOptions {
    pub ocr_subdir: String,
    pub alto_suffix: String,
    /// Raster extensions in order of preference
    pub raster_extensions: Vec<String>,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            ocr_subdir: "ocr".to_string(),
            alto_suffix: "_null.xml".to_string(),
            raster_extensions: ["jp2", "tif", "tiff", "png", "jpg", "jpeg"]
                .map(String::from)
                .to_vec(),
        }
    }
}

/// Sorted sub-directories of the unpacked library root; empty if the root is missing
pub fn find_newspaper_dirs(root: &Path) -> Vec<PathBuf> {
    if !root.is_dir() {
        return Vec::new();
    }
    let mut dirs: Vec<PathBuf> = WalkDir::new(root)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Skipping unreadable entry under {root:?}: {e}");
                None
            }
        })
        .filter(|e| e.file_type().is_dir())
        .map(walkdir::DirEntry::into_path)
        .collect();
    dirs.sort();
    dirs
}

/// The newspaper directory called `name`, or the first one when no name is given
pub fn select_newspaper_dir(root: &Path, name: Option<&str>) -> Result<PathBuf> {
    let dirs = find_newspaper_dirs(root);
    let selected = match name {
        Some(name) => dirs
            .into_iter()
            .find(|d| d.file_name().is_some_and(|f| f == name)),
        None => dirs.into_iter().next(),
    };
    match (selected, name) {
        (Some(dir), _) => Ok(dir),
        (None, Some(name)) => bail!("No newspaper directory {name:?} under {root:?}"),
        (None, None) => bail!("No unpacked newspaper directories found under {root:?}"),
    }
}

/// Ordered page pairs of one newspaper directory
#[derive(Clone, Debug, Default)]
pub struct PageIndex {
    base_dir: PathBuf,
    pairs: Vec<PagePair>,
}

impl PageIndex {
    /// Pair every layout description with the first sibling raster sharing its stem.
    ///
    /// Descriptions without a raster are skipped. A missing OCR directory yields an
    /// empty index.
    pub fn discover(base_dir: &Path, options: &IndexOptions) -> Result<Self> {
        let ocr_dir = base_dir.join(&options.ocr_subdir);
        if !ocr_dir.is_dir() {
            debug!("No OCR directory at {ocr_dir:?}");
            return Ok(Self::from_pairs(base_dir, Vec::new()));
        }

        let mut descriptions = Vec::new();
        for entry in WalkDir::new(&ocr_dir).min_depth(1).max_depth(1) {
            let entry =
                entry.with_context(|| format!("Failed to list OCR directory {ocr_dir:?}"))?;
            let is_description = entry.file_type().is_file()
                && entry
                    .file_name()
                    .to_str()
                    .is_some_and(|n| n.ends_with(&options.alto_suffix));
            if is_description {
                descriptions.push(entry.into_path());
            }
        }
        descriptions.sort();

        let pairs = descriptions
            .into_iter()
            .filter_map(|alto| match find_raster(&alto, &options.raster_extensions) {
                Some(raster) => Some(PagePair::new(alto, raster)),
                None => {
                    debug!("No raster next to {alto:?}, skipping");
                    None
                }
            })
            .collect();

        Ok(Self::from_pairs(base_dir, pairs))
    }

    #[must_use]
    pub fn from_pairs(base_dir: &Path, pairs: Vec<PagePair>) -> Self {
        Self {
            base_dir: base_dir.to_path_buf(),
            pairs,
        }
    }

    #[must_use]
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&PagePair> {
        self.pairs.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PagePair> {
        self.pairs.iter()
    }

    #[must_use]
    pub fn page_id(&self, index: usize) -> Option<String> {
        self.get(index).map(PagePair::page_id)
    }
}

fn find_raster(alto: &Path, extensions: &[String]) -> Option<PathBuf> {
    extensions
        .iter()
        .map(|ext| alto.with_extension(ext))
        .find(|candidate| candidate.is_file())
}

/// Compute the XDG-compliant log file path.
/// Uses `state_dir` on platforms that have it, falls back to `cache_dir`.
pub fn resolve_log_path() -> Result<PathBuf> {
    let base = dirs::state_dir()
        .or_else(dirs::cache_dir)
        .context("Could not determine state or cache directory")?;

    let log_dir = base.join("altoview");
    fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create log directory: {log_dir:?}"))?;

    Ok(log_dir.join("altoview.log"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"").unwrap();
    }

    #[test]
    fn newspaper_dirs_are_sorted_directories() {
        let root = TempDir::new().unwrap();
        fs::create_dir(root.path().join("valdres_1977")).unwrap();
        fs::create_dir(root.path().join("aftenposten_1905")).unwrap();
        touch(&root.path().join("README.txt"));

        let dirs = find_newspaper_dirs(root.path());
        let names: Vec<_> = dirs
            .iter()
            .map(|d| d.file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(names, vec!["aftenposten_1905", "valdres_1977"]);
        assert!(find_newspaper_dirs(&root.path().join("missing")).is_empty());
    }

    #[test]
    fn selects_named_or_first_directory() {
        let root = TempDir::new().unwrap();
        fs::create_dir(root.path().join("b")).unwrap();
        fs::create_dir(root.path().join("a")).unwrap();

        assert!(select_newspaper_dir(root.path(), None).unwrap().ends_with("a"));
        assert!(
            select_newspaper_dir(root.path(), Some("b"))
                .unwrap()
                .ends_with("b")
        );
        assert!(select_newspaper_dir(root.path(), Some("c")).is_err());
        assert!(select_newspaper_dir(&root.path().join("none"), None).is_err());
    }

    #[test]
    fn pairs_descriptions_with_rasters() {
        let base = TempDir::new().unwrap();
        let ocr = base.path().join("ocr");
        touch(&ocr.join("p002_null.xml"));
        touch(&ocr.join("p002_null.png"));
        touch(&ocr.join("p001_null.xml"));
        touch(&ocr.join("p001_null.jp2"));
        touch(&ocr.join("p001_null.png"));
        touch(&ocr.join("p003_null.xml"));
        touch(&ocr.join("p003_other.xml"));
        touch(&ocr.join("p003_other.jp2"));

        let index = PageIndex::discover(base.path(), &IndexOptions::default()).unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index.page_id(0).as_deref(), Some("p001_null"));
        assert!(index.get(0).unwrap().raster.ends_with("p001_null.jp2"));
        assert!(index.get(1).unwrap().raster.ends_with("p002_null.png"));
        assert!(index.get(2).is_none());
        assert_eq!(index.base_dir(), base.path());
    }

    #[test]
    fn missing_ocr_directory_is_empty() {
        let base = TempDir::new().unwrap();
        let index = PageIndex::discover(base.path(), &IndexOptions::default()).unwrap();
        assert!(index.is_empty());
    }
}
