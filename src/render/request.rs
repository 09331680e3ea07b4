//! Page identity, render requests and cancellation

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant, UNIX_EPOCH};

use super::types::CategorySet;
use crate::error::{Error, Result};

/// One (layout description, raster) pair. Equal iff both paths are equal.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PagePair {
    pub alto: PathBuf,
    pub raster: PathBuf,
}

impl PagePair {
    pub fn new(alto: impl Into<PathBuf>, raster: impl Into<PathBuf>) -> Self {
        Self {
            alto: alto.into(),
            raster: raster.into(),
        }
    }

    /// Page identifier exposed to clients: the description file stem
    #[must_use]
    pub fn page_id(&self) -> String {
        self.alto
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Fingerprint of both source files, folded into the cache key so a file
/// replaced on disk produces a new key instead of a stale hit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct SourceRevision(u64);

impl SourceRevision {
    /// For callers that do not track source changes
    pub const UNTRACKED: Self = Self(0);

    /// Fingerprint file length and modification time of both sources
    pub fn probe(pair: &PagePair) -> Result<Self> {
        let stamp = format!(
            "{}|{}",
            FileStamp::of(&pair.alto)?,
            FileStamp::of(&pair.raster)?
        );
        Ok(Self::digest(stamp.as_bytes()))
    }

    /// Fingerprint source contents directly
    #[must_use]
    pub fn of_contents(alto: &[u8], raster: &[u8]) -> Self {
        let mut buf = Vec::with_capacity(alto.len() + raster.len() + 8);
        buf.extend_from_slice(&(alto.len() as u64).to_le_bytes());
        buf.extend_from_slice(alto);
        buf.extend_from_slice(raster);
        Self::digest(&buf)
    }

    fn digest(bytes: &[u8]) -> Self {
        let digest = md5::compute(bytes);
        let mut head = [0u8; 8];
        head.copy_from_slice(&digest.0[..8]);
        Self(u64::from_le_bytes(head).max(1))
    }
}

/// Length and modification time of a file, as seen by one `stat`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct FileStamp {
    len: u64,
    modified_nanos: u128,
}

impl FileStamp {
    pub(crate) fn of(path: &Path) -> Result<Self> {
        let meta = fs::metadata(path).map_err(|e| Error::io(path, e))?;
        let modified_nanos = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map_or(0, |d| d.as_nanos());
        Ok(Self {
            len: meta.len(),
            modified_nanos,
        })
    }
}

impl fmt::Display for FileStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.len, self.modified_nanos)
    }
}

/// Encoding of rendered output
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum OutputFormat {
    #[default]
    Png,
    Jpeg { quality: u8 },
}

impl OutputFormat {
    pub const DEFAULT_JPEG_QUALITY: u8 = 85;

    #[must_use]
    pub const fn mime_type(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg { .. } => "image/jpeg",
        }
    }

    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg { .. } => "jpg",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Png => f.write_str("png"),
            Self::Jpeg { quality } => write!(f, "jpeg@{quality}"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "png" => Ok(Self::Png),
            "jpeg" | "jpg" => Ok(Self::Jpeg {
                quality: Self::DEFAULT_JPEG_QUALITY,
            }),
            other => Err(format!("unsupported output format: {other}")),
        }
    }
}

/// Everything that determines the rendered bytes; used as the cache key
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RenderRequest {
    pub pair: PagePair,
    pub zoom_percent: u32,
    pub visibility: CategorySet,
    pub format: OutputFormat,
    pub revision: SourceRevision,
}

impl RenderRequest {
    #[must_use]
    pub fn new(pair: PagePair, zoom_percent: u32) -> Self {
        Self {
            pair,
            zoom_percent,
            visibility: CategorySet::ALL,
            format: OutputFormat::default(),
            revision: SourceRevision::UNTRACKED,
        }
    }

    #[must_use]
    pub fn with_visibility(mut self, visibility: CategorySet) -> Self {
        self.visibility = visibility;
        self
    }

    #[must_use]
    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    #[must_use]
    pub fn with_revision(mut self, revision: SourceRevision) -> Self {
        self.revision = revision;
        self
    }
}

/// Cancellation flag plus optional deadline, shared between a caller and its render
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            cancelled: Arc::default(),
            deadline: Some(deadline),
        }
    }

    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
            || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Time left before the deadline, if one is set
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use tempfile::TempDir;

    fn pair() -> PagePair {
        PagePair::new("ocr/page_001_null.xml", "ocr/page_001_null.jp2")
    }

    #[test]
    fn page_id_is_description_stem() {
        assert_eq!(pair().page_id(), "page_001_null");
    }

    #[test]
    fn pairs_compare_by_both_paths() {
        assert_eq!(pair(), pair());
        let other = PagePair::new("ocr/page_001_null.xml", "ocr/page_001_null.png");
        assert_ne!(pair(), other);
    }

    #[test]
    fn key_distinguishes_zoom_visibility_and_format() {
        let base = RenderRequest::new(pair(), 100);
        let keys: HashSet<RenderRequest> = [
            base.clone(),
            base.clone(),
            RenderRequest::new(pair(), 200),
            base.clone().with_visibility(CategorySet::NONE),
            base.clone().with_format(OutputFormat::Jpeg { quality: 85 }),
            base.clone().with_revision(SourceRevision::of_contents(b"a", b"b")),
        ]
        .into_iter()
        .collect();
        assert_eq!(keys.len(), 5);
    }

    #[test]
    fn parses_output_formats() {
        assert_eq!("PNG".parse::<OutputFormat>().unwrap(), OutputFormat::Png);
        assert_eq!(
            "jpg".parse::<OutputFormat>().unwrap(),
            OutputFormat::Jpeg { quality: 85 }
        );
        assert!("jp2".parse::<OutputFormat>().is_err());
        assert_eq!(OutputFormat::Png.mime_type(), "image/png");
    }

    #[test]
    fn revision_changes_with_file_contents() {
        let dir = TempDir::new().unwrap();
        let alto = dir.path().join("p_null.xml");
        let raster = dir.path().join("p_null.png");
        fs::write(&alto, b"<alto/>").unwrap();
        fs::write(&raster, b"raster").unwrap();
        let pair = PagePair::new(&alto, &raster);

        let first = SourceRevision::probe(&pair).unwrap();
        assert_eq!(first, SourceRevision::probe(&pair).unwrap());
        assert_ne!(first, SourceRevision::UNTRACKED);

        fs::write(&raster, b"a longer raster").unwrap();
        assert_ne!(first, SourceRevision::probe(&pair).unwrap());
    }

    #[test]
    fn revision_of_missing_file_is_io_error() {
        let missing = PagePair::new("/nonexistent/a.xml", "/nonexistent/a.png");
        assert!(matches!(
            SourceRevision::probe(&missing),
            Err(Error::Io { .. })
        ));
    }

    #[test]
    fn content_revisions_separate_fields() {
        assert_ne!(
            SourceRevision::of_contents(b"ab", b"c"),
            SourceRevision::of_contents(b"a", b"bc")
        );
    }

    #[test]
    fn cancel_token_flags_and_deadlines() {
        let token = CancelToken::new();
        assert!(token.check().is_ok());
        let shared = token.clone();
        shared.cancel();
        assert!(matches!(token.check(), Err(Error::Cancelled)));

        let expired = CancelToken::with_deadline(Instant::now());
        assert!(expired.is_cancelled());
        assert_eq!(expired.remaining(), Some(Duration::ZERO));

        let later = CancelToken::with_timeout(Duration::from_secs(60));
        assert!(!later.is_cancelled());
    }
}
