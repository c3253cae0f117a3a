//! Track and playlist data model.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque playlist entry identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackRef {
    /// SoundCloud track id.
    pub id: u64,
}

impl TrackRef {
    /// Create a reference to a track id.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self { id }
    }
}

impl fmt::Display for TrackRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.id)
    }
}

impl From<u64> for TrackRef {
    fn from(id: u64) -> Self {
        Self::new(id)
    }
}

/// How tracks are acquired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchStrategy {
    /// Hand the canonical URL to an external download agent.
    #[default]
    Delegated,
    /// Resolve the stream locator and write the manifest bytes ourselves.
    Direct,
}

impl fmt::Display for FetchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Delegated => write!(f, "delegated"),
            Self::Direct => write!(f, "direct"),
        }
    }
}

impl std::str::FromStr for FetchStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "delegated" | "agent" => Ok(Self::Delegated),
            "direct" | "http" => Ok(Self::Direct),
            other => Err(format!("unknown fetch strategy '{other}'")),
        }
    }
}

/// Fully resolved track.
///
/// Which optional fields are populated depends on the [`FetchStrategy`] used
/// during resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackDescriptor {
    /// Track id.
    pub id: u64,
    /// Display title; source of the file stem.
    pub title: String,
    /// Public permalink of the track.
    pub canonical_url: Option<String>,
    /// URL of the selected transcoding's stream locator.
    pub stream_locator: Option<String>,
    /// Short-lived signed token for the stream locator.
    pub authorization_token: Option<String>,
    /// Quality tier of the selected transcoding.
    pub quality_tier: Option<String>,
    /// MIME type of the selected transcoding.
    pub mime_type: Option<String>,
    /// Delivery protocol of the selected transcoding (`progressive`, `hls`).
    pub stream_protocol: Option<String>,
}

impl TrackDescriptor {
    /// Descriptor carrying only id and title.
    pub fn new(id: u64, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            canonical_url: None,
            stream_locator: None,
            authorization_token: None,
            quality_tier: None,
            mime_type: None,
            stream_protocol: None,
        }
    }

    /// Reference to this track.
    #[must_use]
    pub const fn track_ref(&self) -> TrackRef {
        TrackRef::new(self.id)
    }

    /// Set the canonical URL.
    #[must_use]
    pub fn with_canonical_url(mut self, url: impl Into<String>) -> Self {
        self.canonical_url = Some(url.into());
        self
    }

    /// Set the stream locator fields.
    #[must_use]
    pub fn with_stream(
        mut self,
        locator: impl Into<String>,
        authorization: impl Into<String>,
        quality_tier: impl Into<String>,
        mime_type: Option<String>,
    ) -> Self {
        self.stream_locator = Some(locator.into());
        self.authorization_token = Some(authorization.into());
        self.quality_tier = Some(quality_tier.into());
        self.mime_type = mime_type;
        self
    }

    /// Set the delivery protocol of the selected transcoding.
    #[must_use]
    pub fn with_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.stream_protocol = Some(protocol.into());
        self
    }

    /// Whether the stream locator resolves to a segmented HLS playlist.
    #[must_use]
    pub fn is_hls(&self) -> bool {
        self.stream_protocol
            .as_deref()
            .is_some_and(|p| p.eq_ignore_ascii_case("hls"))
    }
}

/// Track ids of one playlist in chronological (oldest-first) order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PlaylistIndex {
    /// Playlist page URL.
    pub source_url: String,
    /// Oldest first. No duplicates.
    pub tracks: Vec<TrackRef>,
}

impl PlaylistIndex {
    /// Build an index, dropping repeated ids after their first occurrence.
    pub fn new(source_url: impl Into<String>, tracks: impl IntoIterator<Item = TrackRef>) -> Self {
        let mut seen = std::collections::HashSet::new();
        let tracks = tracks.into_iter().filter(|t| seen.insert(*t)).collect();
        Self {
            source_url: source_url.into(),
            tracks,
        }
    }

    /// An index with no tracks.
    pub fn empty(source_url: impl Into<String>) -> Self {
        Self::new(source_url, Vec::new())
    }

    /// Number of tracks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    /// Whether no tracks were discovered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Track ids in order.
    #[must_use]
    pub fn ids(&self) -> Vec<u64> {
        self.tracks.iter().map(|t| t.id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_playlist_index_dedups_keeping_first() {
        let index = PlaylistIndex::new("u", [1, 2, 1, 3, 2].map(TrackRef::new));
        assert_eq!(index.ids(), vec![1, 2, 3]);
    }

    #[test]
    fn test_fetch_strategy_parse() {
        assert_eq!("direct".parse::<FetchStrategy>(), Ok(FetchStrategy::Direct));
        assert_eq!(
            "Delegated".parse::<FetchStrategy>(),
            Ok(FetchStrategy::Delegated)
        );
        assert!("torrent".parse::<FetchStrategy>().is_err());
    }

    #[test]
    fn test_fetch_strategy_serialization() {
        let json = serde_json::to_string(&FetchStrategy::Direct).unwrap();
        assert_eq!(json, "\"direct\"");
    }

    #[test]
    fn test_track_ref_display() {
        assert_eq!(TrackRef::new(42).to_string(), "#42");
    }
}
