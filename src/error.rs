//! Error taxonomy for the annotate-scale-cache pipeline
//!
//! Every failure is scoped to a single page or request. Nothing here is fatal to
//! the process, and a failed request never leaves anything behind in the cache.

use std::path::PathBuf;

/// Errors produced while parsing, transforming, rendering or caching a page
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The layout document is not well-formed or has no page declaration
    #[error("layout document: {detail}")]
    Format { detail: String },

    /// Page or raster extents that cannot be scaled (zero or negative)
    #[error("invalid geometry: {detail}")]
    InvalidGeometry { detail: String },

    /// Zoom must be a positive percentage
    #[error("invalid zoom: {0}%")]
    InvalidZoom(u32),

    /// The raster is unreadable, truncated or in an unsupported format
    #[error("raster decode: {detail}")]
    RasterDecode { detail: String },

    #[error("encode: {detail}")]
    Encode { detail: String },

    #[error("{path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The caller's deadline passed or it cancelled the request
    #[error("render cancelled")]
    Cancelled,

    /// Another caller was rendering the same key and its render failed
    #[error("coalesced render failed: {detail}")]
    PeerRenderFailed { detail: String },

    #[error("page {0} not found")]
    PageNotFound(usize),

    #[error("block {0} not found")]
    BlockNotFound(usize),
}

impl Error {
    pub fn format(msg: impl Into<String>) -> Self {
        Self::Format { detail: msg.into() }
    }

    pub fn geometry(msg: impl Into<String>) -> Self {
        Self::InvalidGeometry { detail: msg.into() }
    }

    pub fn raster(msg: impl Into<String>) -> Self {
        Self::RasterDecode { detail: msg.into() }
    }

    pub fn encode(msg: impl Into<String>) -> Self {
        Self::Encode { detail: msg.into() }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<roxmltree::Error> for Error {
    fn from(err: roxmltree::Error) -> Self {
        Self::format(err.to_string())
    }
}

impl From<image::ImageError> for Error {
    fn from(err: image::ImageError) -> Self {
        match err {
            image::ImageError::Encoding(e) => Self::encode(e.to_string()),
            other => Self::raster(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
