//! Cache tier: a keyed item store with a pluggable eviction policy.
//!
//! This module defines the [`Cache`] trait that every cache tier
//! implements, plus [`UnboundedCache`], which never evicts. The bounded
//! least-recently-used tier lives in [`crate::lru`].
//!
//! # Strategy pattern
//!
//! A [`Pipeline`](crate::Pipeline) owns exactly one `Box<dyn Cache<T>>`
//! and never looks past the trait, so the eviction policy can be chosen
//! at runtime through [`CacheKind`](crate::CacheKind) or by injecting a
//! custom implementation.
//!
//! Caches are single-threaded. Sharing one across threads requires
//! external locking around every call.

use std::collections::HashMap;

use crate::types::PipelineError;

/// A keyed store of items.
///
/// Items are returned by value: the caller receives its own clone and
/// mutating it never touches the cached copy.
pub trait Cache<T> {
    /// Insert or overwrite the item stored under `key`, marking it most
    /// recently used where recency applies.
    fn put(&mut self, key: &str, item: T);

    /// Returns `true` if `key` is cached. Never affects recency.
    fn contains(&self, key: &str) -> bool;

    /// Return a copy of the item stored under `key`, promoting it where
    /// recency applies.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::NotCached`] if `key` is absent.
    fn get(&mut self, key: &str) -> Result<T, PipelineError>;

    /// Same contract as [`get`](Self::get). Reserved for tiers that can
    /// hand out a lighter-weight handle; the provided tiers clone.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::NotCached`] if `key` is absent.
    fn get_shallow(&mut self, key: &str) -> Result<T, PipelineError> {
        self.get(key)
    }

    /// Remove `key` and any bookkeeping for it. No-op if absent.
    fn remove(&mut self, key: &str);

    /// Remove every entry.
    fn clear(&mut self);

    /// All cached keys. Ordering is defined by the implementation.
    fn keys(&self) -> Vec<String>;

    /// Number of cached items.
    fn len(&self) -> usize;

    /// Returns `true` if nothing is cached.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Cache tier with no size limit and no recency tracking.
///
/// [`keys`](Cache::keys) returns keys in unspecified order.
#[derive(Debug, Clone)]
pub struct UnboundedCache<T> {
    items: HashMap<String, T>,
}

impl<T> UnboundedCache<T> {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self {
            items: HashMap::new(),
        }
    }
}

impl<T> Default for UnboundedCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> Cache<T> for UnboundedCache<T> {
    fn put(&mut self, key: &str, item: T) {
        self.items.insert(key.to_string(), item);
    }

    fn contains(&self, key: &str) -> bool {
        self.items.contains_key(key)
    }

    fn get(&mut self, key: &str) -> Result<T, PipelineError> {
        self.items
            .get(key)
            .cloned()
            .ok_or_else(|| PipelineError::NotCached(key.to_string()))
    }

    fn remove(&mut self, key: &str) {
        self.items.remove(key);
    }

    fn clear(&mut self) {
        self.items.clear();
    }

    fn keys(&self) -> Vec<String> {
        self.items.keys().cloned().collect()
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}
