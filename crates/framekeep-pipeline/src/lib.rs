//! framekeep-pipeline: keyed item working sets over a pluggable cache
//! tier.
//!
//! Items move through two tiers:
//!
//! - a [`Cache`] ([`UnboundedCache`] or the bounded [`LruCache`]) that
//!   remembers what was loaded so it need not be decoded again, and
//! - a [`WorkingSet`] of active copies that [`Pipeline`] operations edit,
//!   save, and drop.
//!
//! Editing a working copy never touches the cached one; the tiers are
//! resynchronized only by [`Pipeline::reset`]. A [`RegionOverlay`] layers
//! lazily detected rectangles on top of the working set and edits those
//! rectangles in place.
//!
//! File I/O goes through an injected [`Codec`]. The [`raster`] module
//! provides one for `image::RgbaImage`, along with region filters.
//!
//! Everything here is single-threaded; share a pipeline across threads
//! only behind external locking.

pub mod cache;
pub mod codec;
pub mod keys;
pub mod lru;
pub mod pipeline;
pub mod raster;
pub mod region;
pub mod types;

pub use cache::{Cache, UnboundedCache};
pub use codec::{Codec, Loader, Saver};
pub use lru::LruCache;
pub use pipeline::{Pipeline, WorkingSet};
pub use raster::{RasterCodec, RegionFilter, RegionFilterKind};
pub use region::{Detector, RegionMeta, RegionOverlay};
pub use types::{
    Bounds, CacheKind, Dimensions, ErrorKind, PipelineConfig, PipelineError, Rect,
};
