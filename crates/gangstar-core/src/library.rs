//! Local library presence checks.
//!
//! A track is present when any regular file in the playlist directory has a
//! stem equal to the track's sanitized title. The extension is ignored because
//! the delegated and direct strategies produce different containers.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use crate::error::{FileSystemError, Result};

/// Suffixes of in-progress downloads that must not count as present.
const PARTIAL_SUFFIXES: [&str; 3] = ["part", "ytdl", "tmp"];

/// Set of file stems found in one directory, read once per pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LibrarySnapshot {
    directory: PathBuf,
    stems: BTreeSet<String>,
}

impl LibrarySnapshot {
    /// Build a snapshot from known stems.
    pub fn new(directory: impl Into<PathBuf>, stems: impl IntoIterator<Item = String>) -> Self {
        Self {
            directory: directory.into(),
            stems: stems.into_iter().collect(),
        }
    }

    /// Directory the snapshot was taken from.
    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Whether a file with this stem exists.
    #[must_use]
    pub fn contains(&self, stem: &str) -> bool {
        self.stems.contains(stem)
    }

    /// All stems in sorted order.
    #[must_use]
    pub const fn stems(&self) -> &BTreeSet<String> {
        &self.stems
    }

    /// Number of distinct stems.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stems.len()
    }

    /// Whether the directory holds no tracks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stems.is_empty()
    }
}

/// Lists existing file stems in a playlist directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalLibraryIndex;

impl LocalLibraryIndex {
    /// Create a new index.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Snapshot the stems in `directory`.
    ///
    /// A missing directory is an empty library (first run).
    ///
    /// # Errors
    ///
    /// Returns [`FileSystemError::ReadFailed`] if the path is not a directory
    /// or cannot be listed.
    pub fn list(&self, directory: &Path) -> Result<LibrarySnapshot> {
        if !directory.exists() {
            debug!("Library directory {} does not exist yet", directory.display());
            return Ok(LibrarySnapshot::new(directory, Vec::new()));
        }
        if !directory.is_dir() {
            return Err(FileSystemError::ReadFailed {
                path: directory.to_path_buf(),
                reason: "not a directory".to_string(),
            }
            .into());
        }

        let mut stems = BTreeSet::new();
        for entry in WalkDir::new(directory).min_depth(1).max_depth(1) {
            let entry = entry.map_err(|e| FileSystemError::ReadFailed {
                path: directory.to_path_buf(),
                reason: e.to_string(),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            if let Some(stem) = library_stem(entry.path()) {
                stems.insert(stem);
            }
        }

        debug!(
            "Indexed {} track(s) in {}",
            stems.len(),
            directory.display()
        );
        Ok(LibrarySnapshot {
            directory: directory.to_path_buf(),
            stems,
        })
    }
}

/// First finished file in `directory` whose stem is `stem`.
#[must_use]
pub fn find_by_stem(directory: &Path, stem: &str) -> Option<PathBuf> {
    WalkDir::new(directory)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(std::result::Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .find(|entry| library_stem(entry.path()).as_deref() == Some(stem))
        .map(walkdir::DirEntry::into_path)
}

/// Stem of a finished track file, or `None` for hidden and partial files.
fn library_stem(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    if name.starts_with('.') {
        return None;
    }
    let is_partial = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| PARTIAL_SUFFIXES.contains(&ext.to_lowercase().as_str()));
    if is_partial {
        return None;
    }
    path.file_stem()?.to_str().map(str::to_string)
}
