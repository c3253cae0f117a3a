//! Playlist page → chronologically ordered track ids.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{ParseError, Result};
use crate::http::HttpClient;
use crate::hydration::{PLAYLIST_KIND, PageHydrationParser};
use crate::track::{PlaylistIndex, TrackRef};

/// Source of playlist indexes, mockable for orchestrator tests.
#[cfg_attr(test, mockall::automock)]
pub trait TrackIndexSource: Send + Sync {
    /// Track ids of the playlist, oldest first.
    ///
    /// Any failure yields an empty index; partial results are never returned.
    fn resolve(&self, playlist_url: &str) -> PlaylistIndex;
}

/// Resolves playlist pages through the hydration payload.
pub struct TrackIndexResolver {
    http: Arc<dyn HttpClient>,
    parser: PageHydrationParser,
}

impl TrackIndexResolver {
    /// Create a resolver over the given transport.
    #[must_use]
    pub fn new(http: Arc<dyn HttpClient>) -> Self {
        Self {
            http,
            parser: PageHydrationParser::new(),
        }
    }

    /// Fetch the playlist page and enumerate its tracks, oldest first.
    ///
    /// # Errors
    ///
    /// Returns a fetch error if the page cannot be retrieved, or a parse error
    /// if the hydration payload or its `playlist` entry is missing.
    pub fn try_resolve(&self, playlist_url: &str) -> Result<PlaylistIndex> {
        info!("Fetching track ids from: {}", playlist_url);

        let body = self.http.get_authenticated(playlist_url)?;
        let html = String::from_utf8_lossy(&body);
        let payload = self.parser.extract(&html)?;
        let playlist = payload.require(PLAYLIST_KIND)?;

        let mut ids = track_ids(playlist)?;
        // The page lists newest first; early-stop needs oldest first.
        ids.reverse();

        let index = PlaylistIndex::new(playlist_url, ids);
        info!("Found {} tracks in playlist", index.len());
        Ok(index)
    }
}

impl TrackIndexSource for TrackIndexResolver {
    fn resolve(&self, playlist_url: &str) -> PlaylistIndex {
        match self.try_resolve(playlist_url) {
            Ok(index) => index,
            Err(e) => {
                warn!("Could not resolve playlist {}: {}", playlist_url, e);
                PlaylistIndex::empty(playlist_url)
            }
        }
    }
}

/// Track ids in page order from a playlist `data` object.
fn track_ids(playlist: &Value) -> Result<Vec<TrackRef>> {
    let tracks = playlist
        .get("tracks")
        .and_then(Value::as_array)
        .ok_or_else(|| ParseError::missing("tracks"))?;

    let ids = tracks
        .iter()
        .enumerate()
        .filter_map(|(position, entry)| {
            let id = entry.get("id").and_then(Value::as_u64);
            if id.is_none() {
                warn!(position, "Skipping playlist entry without a track id");
            }
            id.map(TrackRef::new)
        })
        .collect::<Vec<_>>();

    debug!("Playlist payload lists {} track entries", tracks.len());
    Ok(ids)
}
