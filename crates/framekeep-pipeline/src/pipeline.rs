//! The pipeline orchestrator: a working set of active copies in front of
//! a cache tier.
//!
//! Every item lives in up to two places. The [`Cache`] holds the copy
//! that was last loaded or stored; the [`WorkingSet`] holds the copy
//! being edited. Mutations only ever touch the working copy, so the two
//! diverge after [`Pipeline::process`] until a [`Pipeline::reset`]
//! re-copies from the cache (or from disk if the cache has since dropped
//! the key).
//!
//! Mutating operations return `Result<&mut Self, _>` so calls chain with
//! `?`:
//!
//! ```ignore
//! pipeline
//!     .load("people/a.jpg")?
//!     .process("people/a.jpg", |img| grayscale(img))?
//!     .save_as("people/a.jpg", "gray")?;
//! ```
//!
//! A failure aborts the rest of the chain; earlier steps stay committed.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::cache::Cache;
use crate::codec::{self, Codec, Loader, Saver};
use crate::keys;
use crate::types::{PipelineConfig, PipelineError};

/// The pipeline's active item copies, keyed like the cache.
///
/// Only the owning [`Pipeline`] adds or removes entries. Borrowers such
/// as [`RegionOverlay`](crate::RegionOverlay) can edit items in place
/// through [`get_mut`](Self::get_mut) but cannot change the key set.
#[derive(Debug, Clone)]
pub struct WorkingSet<T> {
    items: HashMap<String, T>,
}

impl<T> WorkingSet<T> {
    pub(crate) fn new() -> Self {
        Self {
            items: HashMap::new(),
        }
    }

    /// Number of active items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if no items are active.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns `true` if `key` is active.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.items.contains_key(key)
    }

    /// The active item for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&T> {
        self.items.get(key)
    }

    /// Mutable access to the active item for `key`.
    pub fn get_mut(&mut self, key: &str) -> Option<&mut T> {
        self.items.get_mut(key)
    }

    /// Active keys, in unspecified order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.items.keys().map(String::as_str)
    }

    /// Active `(key, item)` pairs, in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
        self.items.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub(crate) fn insert(&mut self, key: &str, item: T) {
        self.items.insert(key.to_string(), item);
    }

    fn remove(&mut self, key: &str) -> Option<T> {
        self.items.remove(key)
    }

    fn lookup(&self, key: &str) -> Result<&T, PipelineError> {
        self.items
            .get(key)
            .ok_or_else(|| PipelineError::NotInWorkingSet(key.to_string()))
    }
}

/// Orchestrates loading, editing, saving, and evicting keyed items.
///
/// `T` is the item type and `C` the [`Codec`] used to read and write it.
/// The cache tier is chosen at construction through
/// [`PipelineConfig::cache`] or injected with [`with_cache`](Self::with_cache).
pub struct Pipeline<T, C> {
    input_root: PathBuf,
    output_root: PathBuf,
    default_extensions: Vec<String>,
    working: WorkingSet<T>,
    cache: Box<dyn Cache<T>>,
    loader: Loader<C>,
    saver: Saver<C>,
}

impl<T, C> std::fmt::Debug for Pipeline<T, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("input_root", &self.input_root)
            .field("output_root", &self.output_root)
            .field("working", &self.working.len())
            .field("cached", &self.cache.len())
            .finish_non_exhaustive()
    }
}

impl<T, C> Pipeline<T, C>
where
    T: Clone + 'static,
    C: Codec<T> + Clone,
{
    /// Build a pipeline with the cache tier named in `config`, sharing
    /// `codec` between its loader and saver.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] if `config` fails
    /// validation, or [`PipelineError::Io`] if the output root cannot be
    /// created.
    pub fn new(config: &PipelineConfig, codec: C) -> Result<Self, PipelineError> {
        Self::with_cache(config, codec, config.cache.build())
    }

    /// Build a pipeline around a caller-supplied cache tier.
    /// [`PipelineConfig::cache`] is ignored.
    ///
    /// # Errors
    ///
    /// Same as [`new`](Self::new).
    pub fn with_cache(
        config: &PipelineConfig,
        codec: C,
        cache: Box<dyn Cache<T>>,
    ) -> Result<Self, PipelineError> {
        Self::from_parts(config, cache, Loader::new(codec.clone()), Saver::new(codec))
    }
}

impl<T, C> Pipeline<T, C>
where
    T: Clone,
    C: Codec<T>,
{
    /// Build a pipeline from explicit collaborators.
    ///
    /// # Errors
    ///
    /// Same as [`new`](Self::new).
    pub fn from_parts(
        config: &PipelineConfig,
        cache: Box<dyn Cache<T>>,
        loader: Loader<C>,
        saver: Saver<C>,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        fs::create_dir_all(&config.output_root)
            .map_err(|e| PipelineError::io(&config.output_root, e))?;
        Ok(Self {
            input_root: config.input_root.clone(),
            output_root: config.output_root.clone(),
            default_extensions: config.extensions.clone(),
            working: WorkingSet::new(),
            cache,
            loader,
            saver,
        })
    }

    // --- loading ---

    /// Activate the file at `input_root/path` under the key `path`.
    ///
    /// Does nothing if the key is already active. Otherwise the item is
    /// copied from the cache, decoding the file first on a cache miss.
    ///
    /// # Errors
    ///
    /// [`PipelineError::MissingFile`] if the file does not exist (checked
    /// even when the key is active), or the loader's error on a failed
    /// decode.
    pub fn load(&mut self, path: &str) -> Result<&mut Self, PipelineError> {
        check_key(path)?;
        let full = self.input_root.join(path);
        if !full.exists() {
            return Err(PipelineError::MissingFile(full));
        }
        if self.working.contains(path) {
            tracing::trace!(key = path, "already active");
            return Ok(self);
        }
        self.activate(&full, path)?;
        Ok(self)
    }

    /// Store `item` in the cache under `key` and activate a copy,
    /// replacing any active entry for `key`.
    ///
    /// # Errors
    ///
    /// [`PipelineError::InvalidArgument`] if `key` is empty.
    pub fn load_item(&mut self, item: T, key: &str) -> Result<&mut Self, PipelineError> {
        check_key(key)?;
        self.loader.cache_item(self.cache.as_mut(), item.clone(), key);
        self.working.insert(key, item);
        Ok(self)
    }

    /// Activate every file under `input_root/dir` whose extension is in
    /// `extensions`, keyed by its path relative to `input_root`.
    ///
    /// Files already cached are copied without decoding. Files that fail
    /// to decode are logged and skipped. Keys that were already active
    /// are replaced with the cached copy.
    ///
    /// # Errors
    ///
    /// [`PipelineError::MissingFile`] if the directory does not exist.
    pub fn load_directory<S: AsRef<str>>(
        &mut self,
        dir: &str,
        extensions: &[S],
    ) -> Result<&mut Self, PipelineError> {
        let base = self.input_root.join(dir);
        let entries = codec::scan_directory(&base, &self.input_root, extensions)?;

        let mut loaded = 0_usize;
        let mut skipped = 0_usize;
        for (path, key) in entries {
            match self.activate(&path, &key) {
                Ok(()) => loaded += 1,
                Err(e) => {
                    skipped += 1;
                    tracing::warn!(path = %path.display(), error = %e, "skipping file that failed to load");
                }
            }
        }
        tracing::info!(dir = %base.display(), loaded, skipped, "loaded directory");
        Ok(self)
    }

    /// [`load_directory`](Self::load_directory) with the configured
    /// extension list.
    ///
    /// # Errors
    ///
    /// Same as [`load_directory`](Self::load_directory).
    pub fn load_directory_default(&mut self, dir: &str) -> Result<&mut Self, PipelineError> {
        let extensions = self.default_extensions.clone();
        self.load_directory(dir, &extensions)
    }

    /// Copy `key` from the cache into the working set, decoding `path`
    /// into the cache first if the key is not cached.
    fn activate(&mut self, path: &Path, key: &str) -> Result<(), PipelineError> {
        let item = if self.cache.contains(key) {
            tracing::debug!(key, "cache hit");
            self.cache.get(key)?
        } else {
            tracing::debug!(key, "cache miss");
            let item: T = self.loader.load_from_file(path)?;
            // The working set gets the item even if the tier drops it (zero-capacity LRU).
            self.cache.put(key, item.clone());
            item
        };
        self.working.insert(key, item);
        Ok(())
    }

    // --- queries ---

    /// Active keys starting with `dir/`, or every active key if `dir` is
    /// empty. Order is unspecified.
    #[must_use]
    pub fn image_keys(&self, dir: &str) -> Vec<String> {
        let prefix = keys::directory_prefix(dir);
        self.working
            .keys()
            .filter(|key| key.starts_with(&prefix))
            .map(str::to_string)
            .collect()
    }

    /// Returns `true` if no items are active.
    #[must_use]
    pub fn is_working_set_empty(&self) -> bool {
        self.working.is_empty()
    }

    /// Returns `true` if the cache tier enumerates no keys.
    #[must_use]
    pub fn is_cache_empty(&self) -> bool {
        self.cache.keys().is_empty()
    }

    /// The active item for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&T> {
        self.working.get(key)
    }

    /// The working set.
    #[must_use]
    pub const fn working_set(&self) -> &WorkingSet<T> {
        &self.working
    }

    /// The working set, for in-place edits such as
    /// [`RegionOverlay::process_region`](crate::RegionOverlay::process_region).
    pub const fn working_set_mut(&mut self) -> &mut WorkingSet<T> {
        &mut self.working
    }

    /// The cache tier.
    #[must_use]
    pub fn cache(&self) -> &dyn Cache<T> {
        self.cache.as_ref()
    }

    /// The cache tier, mutably. Writes here are not reflected in the
    /// working set.
    pub fn cache_mut(&mut self) -> &mut dyn Cache<T> {
        self.cache.as_mut()
    }

    /// Directory that load paths resolve against.
    #[must_use]
    pub fn input_root(&self) -> &Path {
        &self.input_root
    }

    /// Directory that saves write under.
    #[must_use]
    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    // --- editing ---

    /// Replace the active item for `key` with `op(item)`. The cached
    /// copy is untouched.
    ///
    /// # Errors
    ///
    /// [`PipelineError::NotInWorkingSet`] if `key` is not active.
    pub fn process<F>(&mut self, key: &str, op: F) -> Result<&mut Self, PipelineError>
    where
        F: FnOnce(&T) -> T,
    {
        let item = self
            .working
            .get_mut(key)
            .ok_or_else(|| PipelineError::NotInWorkingSet(key.to_string()))?;
        *item = op(item);
        tracing::trace!(key, "processed");
        Ok(self)
    }

    /// Drop every active entry for which `predicate(key, item)` is false.
    /// The cache is untouched.
    pub fn filter<F>(&mut self, mut predicate: F) -> &mut Self
    where
        F: FnMut(&str, &T) -> bool,
    {
        let before = self.working.len();
        self.working.items.retain(|key, item| predicate(key.as_str(), item));
        tracing::debug!(
            kept = self.working.len(),
            dropped = before - self.working.len(),
            "filtered working set"
        );
        self
    }

    // --- saving ---

    /// Write the active item for `key` to `output_root/key`, with `.jpg`
    /// appended if the key has no extension.
    ///
    /// # Errors
    ///
    /// [`PipelineError::NotInWorkingSet`] if `key` is not active, or the
    /// saver's error.
    pub fn save(&mut self, key: &str) -> Result<&mut Self, PipelineError> {
        let item = self.working.lookup(key)?;
        self.saver
            .save(&self.output_root.join(keys::output_filename(key)), item)?;
        Ok(self)
    }

    /// Write the active item for `key` to `output_root/relative_path`
    /// verbatim.
    ///
    /// # Errors
    ///
    /// Same as [`save`](Self::save).
    pub fn save_to(&mut self, key: &str, relative_path: &str) -> Result<&mut Self, PipelineError> {
        let item = self.working.lookup(key)?;
        self.saver.save(&self.output_root.join(relative_path), item)?;
        Ok(self)
    }

    /// Write the active item for `key` to
    /// `output_root/subdir/<basename of key>`.
    ///
    /// # Errors
    ///
    /// Same as [`save`](Self::save).
    pub fn save_as(&mut self, key: &str, subdir: &str) -> Result<&mut Self, PipelineError> {
        let item = self.working.lookup(key)?;
        self.saver.save_as(item, &self.output_root, subdir, key)?;
        Ok(self)
    }

    /// Like [`save_as`](Self::save_as), with `suffix` inserted before the
    /// key's extension: `"a/b.jpg"` with `"_x"` becomes `subdir/b_x.jpg`.
    ///
    /// # Errors
    ///
    /// Same as [`save`](Self::save).
    pub fn save_as_with_suffix(
        &mut self,
        key: &str,
        subdir: &str,
        suffix: &str,
    ) -> Result<&mut Self, PipelineError> {
        let item = self.working.lookup(key)?;
        let renamed = keys::append_suffix(key, suffix);
        self.saver.save_as(item, &self.output_root, subdir, &renamed)?;
        Ok(self)
    }

    /// Write every active item with the [`save`](Self::save) naming rule.
    ///
    /// # Errors
    ///
    /// The first saver error; items written before it stay written.
    pub fn save_all(&mut self) -> Result<&mut Self, PipelineError> {
        self.saver.save_all(self.working.iter(), &self.output_root)?;
        Ok(self)
    }

    // --- eviction ---

    /// Drop `key` from both the working set and the cache.
    ///
    /// # Errors
    ///
    /// [`PipelineError::NotInWorkingSet`] if `key` is not active.
    pub fn unload(&mut self, key: &str) -> Result<&mut Self, PipelineError> {
        self.working
            .remove(key)
            .ok_or_else(|| PipelineError::NotInWorkingSet(key.to_string()))?;
        self.cache.remove(key);
        tracing::debug!(key, "unloaded");
        Ok(self)
    }

    /// Empty the working set and the cache.
    pub fn unload_all(&mut self) -> &mut Self {
        self.working.items.clear();
        self.cache.clear();
        tracing::debug!("unloaded everything");
        self
    }

    /// Drop the active copy of `key`, leaving any cached copy in place.
    ///
    /// # Errors
    ///
    /// [`PipelineError::NotInWorkingSet`] if `key` is not active.
    pub fn release(&mut self, key: &str) -> Result<&mut Self, PipelineError> {
        self.working
            .remove(key)
            .ok_or_else(|| PipelineError::NotInWorkingSet(key.to_string()))?;
        tracing::trace!(key, "released");
        Ok(self)
    }

    /// Discard edits to `key` by releasing it and loading it again: from
    /// the cache if it is still there, from `input_root/key` otherwise.
    ///
    /// Any region metadata a [`RegionOverlay`](crate::RegionOverlay)
    /// holds for `key` is not touched; pair this with
    /// [`reset_region`](crate::RegionOverlay::reset_region).
    ///
    /// # Errors
    ///
    /// [`PipelineError::NotInWorkingSet`] if `key` is not active.
    /// [`PipelineError::MissingFile`] if no file backs `key`, which
    /// includes keys that only ever came from
    /// [`load_item`](Self::load_item); the key is left released.
    pub fn reset(&mut self, key: &str) -> Result<&mut Self, PipelineError> {
        self.release(key)?.load(key)
    }

    /// Empty the cache tier. The working set is untouched.
    pub fn clear_cache(&mut self) -> &mut Self {
        self.cache.clear();
        tracing::debug!("cleared cache");
        self
    }
}

fn check_key(key: &str) -> Result<(), PipelineError> {
    if key.is_empty() {
        return Err(PipelineError::InvalidArgument(
            "key must not be empty".to_string(),
        ));
    }
    Ok(())
}
