//! Sync orchestrator for mirroring remote playlists into the local library.
//!
//! One pass walks a playlist oldest first:
//! - resolve each track's metadata,
//! - derive the target stem from its title,
//! - skip (full mode) or stop (refresh mode) when the stem is already present,
//! - otherwise hand the descriptor to the configured [`MediaFetcher`].
//!
//! Per-track failures are collected in the [`SyncResult`] and never abort the
//! pass. Only an unresolvable playlist index short-circuits it.
//!
//! # Example
//!
//! ```rust,ignore
//! use gangstar_core::sync::{PlaylistTarget, SyncMode, SyncOrchestrator};
//!
//! let orchestrator = SyncOrchestrator::new(index, metadata).with_fetcher(fetcher);
//! let target = PlaylistTarget::new("DnB", url, library.join("DnB"));
//! let result = orchestrator.sync_playlist(&target, SyncMode::Refresh)?;
//! println!("{}", result.summary());
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Error, PlaylistError, Result};
use crate::fetcher::{FetchOutcome, MediaFetcher};
use crate::filename::FilenameCodec;
use crate::index::TrackIndexSource;
use crate::library::LocalLibraryIndex;
use crate::metadata::MetadataResolver;
use crate::track::{PlaylistIndex, TrackRef};

// =============================================================================
// Pass Definitions
// =============================================================================

/// How a pass treats tracks that are already present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    /// Stop the pass at the first track already in the library.
    #[default]
    Refresh,
    /// Visit every track, skipping those already present.
    Full,
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Refresh => write!(f, "refresh"),
            Self::Full => write!(f, "full"),
        }
    }
}

/// A named playlist and the directory it mirrors into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistTarget {
    /// Playlist label, also the directory name.
    pub label: String,
    /// Playlist page URL.
    pub url: String,
    /// Local directory holding the playlist's tracks.
    pub directory: PathBuf,
}

impl PlaylistTarget {
    /// Create a target.
    pub fn new(
        label: impl Into<String>,
        url: impl Into<String>,
        directory: impl Into<PathBuf>,
    ) -> Self {
        Self {
            label: label.into(),
            url: url.into(),
            directory: directory.into(),
        }
    }
}

/// A track that could not be mirrored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedTrack {
    /// Track that failed.
    pub track: TrackRef,
    /// Title, if metadata resolution got that far.
    pub title: Option<String>,
    /// Why it failed.
    pub error: Error,
}

impl fmt::Display for FailedTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.title {
            Some(title) => write!(f, "{} \"{}\": {}", self.track, title, self.error),
            None => write!(f, "{}: {}", self.track, self.error),
        }
    }
}

// =============================================================================
// Sync Result
// =============================================================================

/// Outcome of one playlist pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncResult {
    /// Playlist label.
    pub playlist: String,
    /// Mode the pass ran in.
    pub mode: SyncMode,
    /// Number of tracks in the playlist index.
    pub total_tracks: usize,
    /// Tracks written during this pass.
    pub downloaded: Vec<PathBuf>,
    /// Tracks found already present.
    pub skipped_existing: usize,
    /// Tracks that failed, in the order they were attempted.
    pub failed: Vec<FailedTrack>,
    /// Track at which a refresh pass stopped early.
    pub stopped_at: Option<TrackRef>,
    /// Wall-clock duration of the pass in milliseconds.
    pub duration_ms: u128,
}

impl SyncResult {
    fn new(playlist: &str, mode: SyncMode, total_tracks: usize) -> Self {
        Self {
            playlist: playlist.to_string(),
            mode,
            total_tracks,
            downloaded: Vec::new(),
            skipped_existing: 0,
            failed: Vec::new(),
            stopped_at: None,
            duration_ms: 0,
        }
    }

    /// Number of tracks downloaded.
    #[must_use]
    pub fn downloaded_count(&self) -> usize {
        self.downloaded.len()
    }

    /// Number of tracks the pass looked at.
    #[must_use]
    pub fn processed(&self) -> usize {
        self.downloaded.len() + self.skipped_existing + self.failed.len()
    }

    /// Whether every visited track ended up present.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    /// One-line human summary.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut line = format!(
            "{} ({}): {} downloaded, {} already present, {} failed of {} track(s)",
            self.playlist,
            self.mode,
            self.downloaded.len(),
            self.skipped_existing,
            self.failed.len(),
            self.total_tracks
        );
        if let Some(track) = self.stopped_at {
            line.push_str(&format!(", stopped at {track}"));
        }
        line
    }
}

/// Remote-versus-local difference for one playlist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComparisonReport {
    /// Playlist label.
    pub playlist: String,
    /// Sanitized stems of every resolvable remote track, oldest first.
    pub remote_stems: Vec<String>,
    /// Remote stems with no local file, oldest first.
    pub missing: Vec<String>,
    /// Tracks whose metadata could not be resolved.
    pub unresolved: Vec<FailedTrack>,
}

impl ComparisonReport {
    /// Whether the local directory holds every resolvable remote track.
    #[must_use]
    pub fn is_in_sync(&self) -> bool {
        self.missing.is_empty()
    }
}

// =============================================================================
// Sync Orchestrator
// =============================================================================

/// Drives playlist passes over the resolver and fetcher seams.
pub struct SyncOrchestrator {
    index: Arc<dyn TrackIndexSource>,
    metadata: Arc<dyn MetadataResolver>,
    fetcher: Option<Arc<dyn MediaFetcher>>,
    library: LocalLibraryIndex,
}

impl SyncOrchestrator {
    /// Create an orchestrator that can compare but not fetch.
    #[must_use]
    pub fn new(index: Arc<dyn TrackIndexSource>, metadata: Arc<dyn MetadataResolver>) -> Self {
        Self {
            index,
            metadata,
            fetcher: None,
            library: LocalLibraryIndex::new(),
        }
    }

    /// Attach the fetcher used by sync passes and single downloads.
    #[must_use]
    pub fn with_fetcher(mut self, fetcher: Arc<dyn MediaFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    fn fetcher(&self) -> Result<&dyn MediaFetcher> {
        self.fetcher
            .as_deref()
            .ok_or_else(|| Error::Configuration("no media fetcher configured".to_string()))
    }

    fn resolve_index(&self, target: &PlaylistTarget) -> Result<PlaylistIndex> {
        let index = self.index.resolve(&target.url);
        if index.is_empty() {
            return Err(PlaylistError::NoTracks {
                url: target.url.clone(),
            }
            .into());
        }
        Ok(index)
    }

    /// Run one pass over `target`.
    ///
    /// # Errors
    ///
    /// Returns [`PlaylistError::NoTracks`] if the index is empty, a
    /// configuration error if no fetcher is attached, or a filesystem error if
    /// the library directory cannot be read. Per-track failures are recorded
    /// in the result instead.
    pub fn sync_playlist(&self, target: &PlaylistTarget, mode: SyncMode) -> Result<SyncResult> {
        let start = Instant::now();
        let fetcher = self.fetcher()?;

        info!(playlist = %target.label, %mode, "Starting pass");
        let index = self.resolve_index(target)?;
        let snapshot = self.library.list(&target.directory)?;
        debug!(
            playlist = %target.label,
            directory = %snapshot.directory().display(),
            local = snapshot.len(),
            remote = index.len(),
            "Library snapshot taken"
        );

        let mut result = SyncResult::new(&target.label, mode, index.len());

        for &track in &index.tracks {
            let descriptor = match self.metadata.resolve(track) {
                Ok(descriptor) => descriptor,
                Err(error) => {
                    warn!(playlist = %target.label, track = track.id, "Metadata failed: {}", error);
                    result.failed.push(FailedTrack {
                        track,
                        title: None,
                        error,
                    });
                    continue;
                }
            };

            let stem = FilenameCodec::sanitize(&descriptor.title);
            let destination = FilenameCodec::target_path(&target.directory, &descriptor.title);

            let present = if snapshot.contains(&stem) {
                true
            } else {
                match fetcher.fetch(&descriptor, &destination) {
                    Ok(FetchOutcome::Downloaded(path)) => {
                        info!(playlist = %target.label, track = track.id, "Downloaded {}", path.display());
                        result.downloaded.push(path);
                        false
                    }
                    Ok(FetchOutcome::AlreadyExists) => true,
                    Err(error) => {
                        warn!(playlist = %target.label, track = track.id, "Fetch failed: {}", error);
                        result.failed.push(FailedTrack {
                            track,
                            title: Some(descriptor.title),
                            error,
                        });
                        false
                    }
                }
            };

            if present {
                result.skipped_existing += 1;
                if mode == SyncMode::Refresh {
                    info!(
                        playlist = %target.label,
                        track = track.id,
                        "\"{}\" already present, stopping refresh",
                        stem
                    );
                    result.stopped_at = Some(track);
                    break;
                }
                debug!(playlist = %target.label, track = track.id, "Skipping existing \"{}\"", stem);
            }
        }

        result.duration_ms = start.elapsed().as_millis();
        info!(playlist = %target.label, "{}", result.summary());
        Ok(result)
    }

    /// Run one pass per target, in the order given.
    ///
    /// A failing playlist is reported in its slot and the batch continues.
    pub fn sync_all(
        &self,
        targets: &[PlaylistTarget],
        mode: SyncMode,
    ) -> Vec<(String, Result<SyncResult>)> {
        targets
            .iter()
            .map(|target| {
                let outcome = self.sync_playlist(target, mode);
                if let Err(e) = &outcome {
                    warn!(playlist = %target.label, "Pass failed: {}", e);
                }
                (target.label.clone(), outcome)
            })
            .collect()
    }

    /// List remote tracks missing from the local directory.
    ///
    /// Never fetches and never writes.
    ///
    /// # Errors
    ///
    /// Returns [`PlaylistError::NoTracks`] if the index is empty, or a
    /// filesystem error if the library directory cannot be read.
    pub fn compare(&self, target: &PlaylistTarget) -> Result<ComparisonReport> {
        let index = self.resolve_index(target)?;
        let snapshot = self.library.list(&target.directory)?;

        let mut report = ComparisonReport {
            playlist: target.label.clone(),
            remote_stems: Vec::with_capacity(index.len()),
            missing: Vec::new(),
            unresolved: Vec::new(),
        };

        for &track in &index.tracks {
            match self.metadata.resolve(track) {
                Ok(descriptor) => {
                    let stem = FilenameCodec::sanitize(&descriptor.title);
                    if !snapshot.contains(&stem) {
                        report.missing.push(stem.clone());
                    }
                    report.remote_stems.push(stem);
                }
                Err(error) => report.unresolved.push(FailedTrack {
                    track,
                    title: None,
                    error,
                }),
            }
        }

        info!(
            playlist = %target.label,
            missing = report.missing.len(),
            unresolved = report.unresolved.len(),
            "Comparison finished"
        );
        Ok(report)
    }

    /// Download one track by its page URL into `directory`.
    ///
    /// # Errors
    ///
    /// Returns a metadata, fetch, agent or filesystem error for the single
    /// track, or a configuration error if no fetcher is attached.
    pub fn download_track(&self, track_url: &str, directory: &Path) -> Result<FetchOutcome> {
        let fetcher = self.fetcher()?;
        let descriptor = self.metadata.resolve_page(track_url)?;
        let stem = FilenameCodec::sanitize(&descriptor.title);

        if self.library.list(directory)?.contains(&stem) {
            info!(track = descriptor.id, "\"{}\" already present", stem);
            return Ok(FetchOutcome::AlreadyExists);
        }

        fetcher.fetch(&descriptor, &FilenameCodec::target_path(directory, &descriptor.title))
    }
}
