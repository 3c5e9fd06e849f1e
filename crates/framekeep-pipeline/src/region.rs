//! Region overlay: lazily detected sub-rectangles per key, edited in
//! place on the pipeline's working set.
//!
//! A [`RegionOverlay`] owns a [`Detector`] and a per-key cache of its
//! results. It never owns items. Each call to
//! [`process_region`](RegionOverlay::process_region) borrows the
//! pipeline's [`WorkingSet`] mutably for the duration of that call, so
//! the borrow checker rules out the overlay touching an item the
//! pipeline has since released or replaced.
//!
//! # Stale regions
//!
//! Region metadata is keyed by string, not by item identity. After
//! [`Pipeline::reset`](crate::Pipeline::reset) swaps a fresh copy in
//! under the same key, the overlay still holds the rectangles detected on
//! the old copy and will apply them to the new one. Call
//! [`reset_region`](RegionOverlay::reset_region) alongside every
//! pipeline reset when that matters.

use std::collections::HashMap;
use std::marker::PhantomData;

use crate::pipeline::WorkingSet;
use crate::types::{Bounds, PipelineError, Rect};

/// Finds rectangles of interest in an item.
///
/// Rectangles may extend past the item's bounds; the overlay clips them.
/// Any `FnMut(&T) -> Vec<Rect>` is a detector.
pub trait Detector<T> {
    /// Rectangles of interest in `item`, in the order they should be
    /// processed.
    fn detect(&mut self, item: &T) -> Vec<Rect>;
}

impl<T, F> Detector<T> for F
where
    F: FnMut(&T) -> Vec<Rect>,
{
    fn detect(&mut self, item: &T) -> Vec<Rect> {
        self(item)
    }
}

/// Cached detection result for one key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegionMeta {
    /// Rectangles as reported by the detector, unclipped.
    pub regions: Vec<Rect>,
    /// Whether the detector has run for this key since the last reset.
    pub detected: bool,
}

/// Applies in-place edits to detected regions of working-set items.
pub struct RegionOverlay<T, D> {
    detector: D,
    meta: HashMap<String, RegionMeta>,
    _item: PhantomData<fn(&T)>,
}

impl<T, D: std::fmt::Debug> std::fmt::Debug for RegionOverlay<T, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegionOverlay")
            .field("detector", &self.detector)
            .field("meta", &self.meta)
            .finish()
    }
}

impl<T, D> RegionOverlay<T, D>
where
    T: Bounds,
    D: Detector<T>,
{
    /// Create an overlay with no cached regions.
    #[must_use]
    pub fn new(detector: D) -> Self {
        Self {
            detector,
            meta: HashMap::new(),
            _item: PhantomData,
        }
    }

    /// The wrapped detector.
    #[must_use]
    pub const fn detector(&self) -> &D {
        &self.detector
    }

    /// Run `op` on the item for `key` once per region, in detection
    /// order, with each region clipped to the item's current bounds.
    ///
    /// The detector runs on the first call for `key` and its result is
    /// reused until [`reset_region`](Self::reset_region). A region that
    /// clips to nothing is still passed to `op` as an empty [`Rect`];
    /// `op` must treat it as a no-op.
    ///
    /// # Errors
    ///
    /// [`PipelineError::NotInWorkingSet`] if `key` is not in `working`.
    /// The detector does not run in that case.
    pub fn process_region<F>(
        &mut self,
        working: &mut WorkingSet<T>,
        key: &str,
        mut op: F,
    ) -> Result<&mut Self, PipelineError>
    where
        F: FnMut(&mut T, Rect),
    {
        let item = working
            .get_mut(key)
            .ok_or_else(|| PipelineError::NotInWorkingSet(key.to_string()))?;

        let meta = self.meta.entry(key.to_string()).or_default();
        if !meta.detected {
            meta.regions = self.detector.detect(item);
            meta.detected = true;
            tracing::debug!(key, regions = meta.regions.len(), "detected regions");
        }

        let frame = Rect::full_frame(item.bounds());
        for region in &meta.regions {
            op(&mut *item, region.intersect(frame));
        }
        tracing::trace!(key, regions = meta.regions.len(), "processed regions");
        Ok(self)
    }

    /// Forget the regions cached for `key` so the next
    /// [`process_region`](Self::process_region) detects again.
    pub fn reset_region(&mut self, key: &str) -> &mut Self {
        self.meta.remove(key);
        self
    }

    /// Regions cached for `key`, unclipped, if detection has run.
    #[must_use]
    pub fn regions(&self, key: &str) -> Option<&[Rect]> {
        self.meta
            .get(key)
            .filter(|meta| meta.detected)
            .map(|meta| meta.regions.as_slice())
    }

    /// Returns `true` if detection has run for `key` since its last reset.
    #[must_use]
    pub fn is_detected(&self, key: &str) -> bool {
        self.meta.get(key).is_some_and(|meta| meta.detected)
    }
}
