//! Shared types for the framekeep pipeline.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::cache::{Cache, UnboundedCache};
use crate::lru::LruCache;

/// Item dimensions in pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Create new dimensions.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Anything with a pixel extent that regions can be clipped against.
pub trait Bounds {
    /// Current width and height of the item.
    fn bounds(&self) -> Dimensions;
}

/// An axis-aligned rectangle in item coordinates.
///
/// The origin may be negative and the extent may reach past the item;
/// detectors are free to report such rectangles and consumers clip them
/// with [`Rect::intersect`] before use. A rectangle with a non-positive
/// width or height is empty.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    /// Left edge.
    pub x: i32,
    /// Top edge.
    pub y: i32,
    /// Horizontal extent.
    pub width: i32,
    /// Vertical extent.
    pub height: i32,
}

impl Rect {
    /// Create a new rectangle.
    #[must_use]
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// The rectangle covering a whole item of the given dimensions.
    #[must_use]
    pub fn full_frame(dimensions: Dimensions) -> Self {
        Self::new(
            0,
            0,
            i32::try_from(dimensions.width).unwrap_or(i32::MAX),
            i32::try_from(dimensions.height).unwrap_or(i32::MAX),
        )
    }

    /// Returns `true` if the rectangle covers no pixels.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    /// Number of pixels covered (zero for empty rectangles).
    #[must_use]
    pub fn area(&self) -> u64 {
        if self.is_empty() {
            return 0;
        }
        u64::from(self.width.unsigned_abs()) * u64::from(self.height.unsigned_abs())
    }

    /// Intersection of two rectangles.
    ///
    /// Disjoint or empty inputs yield `Rect::default()`, the zero-area
    /// rectangle at the origin.
    #[must_use]
    pub fn intersect(self, other: Self) -> Self {
        if self.is_empty() || other.is_empty() {
            return Self::default();
        }

        let left = i64::from(self.x).max(i64::from(other.x));
        let top = i64::from(self.y).max(i64::from(other.y));
        let right = (i64::from(self.x) + i64::from(self.width))
            .min(i64::from(other.x) + i64::from(other.width));
        let bottom = (i64::from(self.y) + i64::from(self.height))
            .min(i64::from(other.y) + i64::from(other.height));

        if right <= left || bottom <= top {
            return Self::default();
        }

        Self::new(
            saturate(left),
            saturate(top),
            saturate(right - left),
            saturate(bottom - top),
        )
    }
}

fn saturate(value: i64) -> i32 {
    i32::try_from(value).unwrap_or(if value < 0 { i32::MIN } else { i32::MAX })
}

/// Which cache tier a [`Pipeline`](crate::Pipeline) keeps behind its
/// working set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CacheKind {
    /// Keep every loaded item until it is explicitly removed.
    #[default]
    Unbounded,
    /// Keep at most `capacity` items, evicting the least recently used.
    Lru {
        /// Maximum number of cached items.
        capacity: usize,
    },
}

impl CacheKind {
    /// Build an empty cache of this kind.
    #[must_use]
    pub fn build<T: Clone + 'static>(self) -> Box<dyn Cache<T>> {
        match self {
            Self::Unbounded => Box::new(UnboundedCache::new()),
            Self::Lru { capacity } => Box::new(LruCache::new(capacity)),
        }
    }
}

/// Configuration for a [`Pipeline`](crate::Pipeline).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Directory that relative load paths and directory keys resolve
    /// against.
    pub input_root: PathBuf,

    /// Directory that every save writes under. Created on pipeline
    /// construction.
    pub output_root: PathBuf,

    /// Cache tier selection.
    pub cache: CacheKind,

    /// Extensions accepted by directory loads when the caller has no
    /// more specific list. Matching ignores case and a leading dot.
    pub extensions: Vec<String>,
}

impl PipelineConfig {
    /// Default input root.
    pub const DEFAULT_INPUT_ROOT: &str = "images";

    /// Default output root.
    pub const DEFAULT_OUTPUT_ROOT: &str = "output_images";

    /// Default directory-load extension filter.
    pub const DEFAULT_EXTENSIONS: &[&str] = &[".jpg"];

    /// Check the configuration for values the pipeline cannot work with.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] if `output_root` is empty.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.output_root.as_os_str().is_empty() {
            return Err(PipelineError::InvalidConfig(
                "output_root must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            input_root: PathBuf::from(Self::DEFAULT_INPUT_ROOT),
            output_root: PathBuf::from(Self::DEFAULT_OUTPUT_ROOT),
            cache: CacheKind::default(),
            extensions: Self::DEFAULT_EXTENSIONS
                .iter()
                .map(|ext| (*ext).to_string())
                .collect(),
        }
    }
}

/// Coarse classification of [`PipelineError`] variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A key was missing from the structure queried.
    NotFound,
    /// A file was missing or could not be read, decoded, encoded, or
    /// written.
    Io,
    /// A key, path, or configuration value was malformed.
    InvalidArgument,
}

/// Errors produced by caches, collaborators, and the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The key has no entry in the working set.
    #[error("image not found in working set: {0}")]
    NotInWorkingSet(String),

    /// The key has no entry in the cache tier.
    #[error("key not found in cache: {0}")]
    NotCached(String),

    /// A source file does not exist.
    #[error("file does not exist: {}", .0.display())]
    MissingFile(PathBuf),

    /// A filesystem operation failed.
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        /// Path the operation was acting on.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A codec failed to decode or encode an item.
    #[error("codec failed for {}: {source}", path.display())]
    Codec {
        /// Path being decoded from or encoded to.
        path: PathBuf,
        /// Underlying codec error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A key or path argument was malformed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Pipeline configuration is invalid.
    #[error("invalid pipeline configuration: {0}")]
    InvalidConfig(String),
}

impl PipelineError {
    /// Classify this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotInWorkingSet(_) | Self::NotCached(_) => ErrorKind::NotFound,
            Self::MissingFile(_) | Self::Io { .. } | Self::Codec { .. } => ErrorKind::Io,
            Self::InvalidArgument(_) | Self::InvalidConfig(_) => ErrorKind::InvalidArgument,
        }
    }

    /// Wrap a codec error for `path`.
    pub fn codec(
        path: impl Into<PathBuf>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Codec {
            path: path.into(),
            source: source.into(),
        }
    }

    /// Wrap an I/O error for `path`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
