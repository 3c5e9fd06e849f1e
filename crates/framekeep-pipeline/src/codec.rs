//! File collaborators: the [`Codec`] capability and the [`Loader`] /
//! [`Saver`] built on it.
//!
//! The pipeline never decodes or encodes anything itself. It is handed a
//! codec at construction and reaches the filesystem only through a
//! `Loader` (file → item → cache) and a `Saver` (item → file). Tests
//! swap in an in-memory codec; [`crate::raster::RasterCodec`] is the
//! `image`-backed one.

use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::cache::Cache;
use crate::keys;
use crate::types::PipelineError;

/// Decode an item from a file and encode one back.
pub trait Codec<T> {
    /// Read and decode the item stored at `path`.
    ///
    /// # Errors
    ///
    /// Returns an I/O-kind [`PipelineError`] if the file cannot be read
    /// or decoded.
    fn decode(&self, path: &Path) -> Result<T, PipelineError>;

    /// Encode `item` and write it to `path`. The parent directory
    /// already exists when a [`Saver`] calls this.
    ///
    /// # Errors
    ///
    /// Returns an I/O-kind [`PipelineError`] if encoding or writing
    /// fails.
    fn encode(&self, path: &Path, item: &T) -> Result<(), PipelineError>;
}

/// Regular files under `dir` whose extension matches `extensions`,
/// paired with their keys relative to `input_root`.
///
/// Symlinks are followed. Entries that cannot be read or cannot be
/// turned into a key are logged and skipped. Order follows the
/// filesystem and is not stable.
///
/// # Errors
///
/// Returns [`PipelineError::MissingFile`] if `dir` is not a directory.
pub fn scan_directory<S: AsRef<str>>(
    dir: &Path,
    input_root: &Path,
    extensions: &[S],
) -> Result<Vec<(PathBuf, String)>, PipelineError> {
    if !dir.is_dir() {
        return Err(PipelineError::MissingFile(dir.to_path_buf()));
    }

    let mut found = Vec::new();
    for entry in WalkDir::new(dir).follow_links(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(dir = %dir.display(), error = %e, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() || !keys::matches_extension(entry.path(), extensions) {
            continue;
        }
        match keys::relative_key(entry.path(), input_root) {
            Ok(key) => found.push((entry.into_path(), key)),
            Err(e) => {
                tracing::warn!(path = %entry.path().display(), error = %e, "skipping file");
            }
        }
    }
    Ok(found)
}

/// Moves items from files into a cache tier.
#[derive(Debug, Clone, Default)]
pub struct Loader<C> {
    codec: C,
}

impl<C> Loader<C> {
    /// Create a loader around `codec`.
    #[must_use]
    pub const fn new(codec: C) -> Self {
        Self { codec }
    }

    /// The codec used for decoding.
    #[must_use]
    pub const fn codec(&self) -> &C {
        &self.codec
    }

    /// Decode the item at `path`.
    ///
    /// # Errors
    ///
    /// Propagates the codec's decode error.
    pub fn load_from_file<T>(&self, path: &Path) -> Result<T, PipelineError>
    where
        C: Codec<T>,
    {
        self.codec.decode(path)
    }

    /// Decode the item at `path` and cache it under `key`.
    ///
    /// # Errors
    ///
    /// Propagates the codec's decode error; the cache is untouched on
    /// failure.
    pub fn load_into_cache<T, K>(
        &self,
        cache: &mut K,
        path: &Path,
        key: &str,
    ) -> Result<(), PipelineError>
    where
        C: Codec<T>,
        K: Cache<T> + ?Sized,
    {
        let item = self.load_from_file(path)?;
        cache.put(key, item);
        Ok(())
    }

    /// Cache an in-memory item under `key`.
    pub fn cache_item<T, K>(&self, cache: &mut K, item: T, key: &str)
    where
        K: Cache<T> + ?Sized,
    {
        cache.put(key, item);
    }

    /// Load every matching file under `dir` into `cache`, keyed relative
    /// to `input_root`.
    ///
    /// Files that fail to decode are logged and left out of the result;
    /// the keys of every file that was cached are returned.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::MissingFile`] if `dir` is not a directory.
    pub fn load_directory<T, K, S>(
        &self,
        cache: &mut K,
        dir: &Path,
        input_root: &Path,
        extensions: &[S],
    ) -> Result<Vec<String>, PipelineError>
    where
        C: Codec<T>,
        K: Cache<T> + ?Sized,
        S: AsRef<str>,
    {
        let mut loaded = Vec::new();
        for (path, key) in scan_directory(dir, input_root, extensions)? {
            match self.load_into_cache(cache, &path, &key) {
                Ok(()) => loaded.push(key),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping file that failed to load");
                }
            }
        }
        Ok(loaded)
    }
}

/// Writes items to files, creating parent directories as needed.
#[derive(Debug, Clone, Default)]
pub struct Saver<C> {
    codec: C,
}

impl<C> Saver<C> {
    /// Create a saver around `codec`.
    #[must_use]
    pub const fn new(codec: C) -> Self {
        Self { codec }
    }

    /// The codec used for encoding.
    #[must_use]
    pub const fn codec(&self) -> &C {
        &self.codec
    }

    /// Write `item` to `output_path`, creating missing parent
    /// directories first.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Io`] if a directory cannot be created,
    /// or the codec's encode error.
    pub fn save<T>(&self, output_path: &Path, item: &T) -> Result<(), PipelineError>
    where
        C: Codec<T>,
    {
        if let Some(parent) = output_path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| PipelineError::io(parent, e))?;
        }
        self.codec.encode(output_path, item)?;
        tracing::debug!(path = %output_path.display(), "saved");
        Ok(())
    }

    /// Write every `(key, item)` pair under `output_dir`, naming each
    /// file after its key with the default extension rule applied.
    ///
    /// Stops at the first failure; files already written stay written.
    ///
    /// # Errors
    ///
    /// Returns the first error from [`save`](Self::save).
    pub fn save_all<'a, T, I>(&self, items: I, output_dir: &Path) -> Result<(), PipelineError>
    where
        C: Codec<T>,
        T: 'a,
        I: IntoIterator<Item = (&'a str, &'a T)>,
    {
        for (key, item) in items {
            self.save(&output_dir.join(keys::output_filename(key)), item)?;
        }
        Ok(())
    }

    /// Write `item` to `output_dir/subdir/<basename of key>` with the
    /// default extension rule applied, returning the written path.
    ///
    /// # Errors
    ///
    /// Returns the error from [`save`](Self::save).
    pub fn save_as<T>(
        &self,
        item: &T,
        output_dir: &Path,
        subdir: &str,
        key: &str,
    ) -> Result<PathBuf, PipelineError>
    where
        C: Codec<T>,
    {
        let path = output_dir.join(subdir).join(keys::output_basename(key));
        self.save(&path, item)?;
        Ok(path)
    }
}
