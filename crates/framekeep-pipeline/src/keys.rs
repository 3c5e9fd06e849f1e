//! Key and output-path conventions.
//!
//! A key is a relative path written with forward slashes on every host.
//! It identifies an item in the cache and the working set, and it is also
//! the template for the item's output filename.

use std::ffi::OsStr;
use std::path::{Component, Path};

use crate::types::PipelineError;

/// Extension appended to output filenames whose key has none.
pub const DEFAULT_OUTPUT_EXTENSION: &str = "jpg";

/// Lowercase an extension and strip any leading dots, so `".JPG"`,
/// `"jpg"`, and `"Jpg"` compare equal.
#[must_use]
pub fn normalize_extension(extension: &str) -> String {
    extension.trim_start_matches('.').to_lowercase()
}

/// Returns `true` if `path`'s extension is one of `extensions`.
///
/// Comparison ignores case and leading dots. An empty `extensions` list
/// matches every path. A path without an extension only matches an
/// explicit `""` or `"."` entry.
pub fn matches_extension<S: AsRef<str>>(path: &Path, extensions: &[S]) -> bool {
    if extensions.is_empty() {
        return true;
    }
    let ext = path
        .extension()
        .and_then(OsStr::to_str)
        .map(normalize_extension)
        .unwrap_or_default();
    extensions
        .iter()
        .any(|allowed| normalize_extension(allowed.as_ref()) == ext)
}

/// Derive the key for `path` relative to `root`, joined with `/`.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidArgument`] if `path` is not under
/// `root` or contains a component that is not valid UTF-8.
pub fn relative_key(path: &Path, root: &Path) -> Result<String, PipelineError> {
    let relative = path.strip_prefix(root).map_err(|_| {
        PipelineError::InvalidArgument(format!(
            "{} is not under {}",
            path.display(),
            root.display()
        ))
    })?;

    let mut segments = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(segment) => {
                let segment = segment.to_str().ok_or_else(|| {
                    PipelineError::InvalidArgument(format!(
                        "non UTF-8 path component in {}",
                        path.display()
                    ))
                })?;
                segments.push(segment);
            }
            Component::CurDir => {}
            Component::ParentDir => segments.push(".."),
            Component::RootDir | Component::Prefix(_) => {
                return Err(PipelineError::InvalidArgument(format!(
                    "{} is not relative to {}",
                    path.display(),
                    root.display()
                )));
            }
        }
    }
    Ok(segments.join("/"))
}

/// Split a key into its parent portion (if any) and its final segment.
fn split_key(key: &str) -> (Option<&str>, &str) {
    match key.rsplit_once('/') {
        Some((parent, name)) => (Some(parent), name),
        None => (None, key),
    }
}

/// The final path segment of a key.
#[must_use]
pub fn basename(key: &str) -> &str {
    split_key(key).1
}

fn has_extension(name: &str) -> bool {
    Path::new(name).extension().is_some()
}

/// The output filename for a key: the key itself, with
/// [`DEFAULT_OUTPUT_EXTENSION`] appended if it has no extension.
#[must_use]
pub fn output_filename(key: &str) -> String {
    if has_extension(basename(key)) {
        key.to_string()
    } else {
        format!("{key}.{DEFAULT_OUTPUT_EXTENSION}")
    }
}

/// The basename of a key with the default extension rule applied.
#[must_use]
pub fn output_basename(key: &str) -> String {
    output_filename(basename(key))
}

/// Insert `suffix` between the key's file stem and its extension,
/// leaving the parent portion unchanged.
///
/// `append_suffix("a/b.jpg", "_x")` is `"a/b_x.jpg"`.
#[must_use]
pub fn append_suffix(key: &str, suffix: &str) -> String {
    let (parent, name) = split_key(key);
    let path = Path::new(name);
    let stem = path.file_stem().and_then(OsStr::to_str).unwrap_or(name);
    let renamed = match path.extension().and_then(OsStr::to_str) {
        Some(ext) => format!("{stem}{suffix}.{ext}"),
        None => format!("{stem}{suffix}"),
    };
    match parent {
        Some(parent) => format!("{parent}/{renamed}"),
        None => renamed,
    }
}

/// Turn a directory filter into a key prefix by ensuring a trailing `/`.
/// An empty filter stays empty and matches every key.
#[must_use]
pub fn directory_prefix(dir: &str) -> String {
    if dir.is_empty() || dir.ends_with('/') {
        dir.to_string()
    } else {
        format!("{dir}/")
    }
}
