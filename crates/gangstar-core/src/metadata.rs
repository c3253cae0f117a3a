//! Track id → [`TrackDescriptor`] resolution.
//!
//! Descriptors come from the `api-v2` tracks endpoint (one authenticated round
//! trip per track) or, for single tracks given by URL, from the `sound` entry
//! of the track page's hydration payload. Both carry the same object shape.
//!
//! Failures are field-specific so callers can tell permanent content gaps
//! (`MissingField`, `UnsupportedQuality`) from transport failures.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info};

use crate::error::{ParseError, QualityError, Result};
use crate::http::{HttpClient, url_with_params};
use crate::hydration::{PageHydrationParser, SOUND_KIND};
use crate::track::{FetchStrategy, TrackDescriptor, TrackRef};

/// Tracks endpoint of the public API.
pub const API_TRACKS_URL: &str = "https://api-v2.soundcloud.com/tracks";

/// Highest quality tier label.
pub const DEFAULT_QUALITY_TIER: &str = "hq";

/// Resolves track metadata, mockable for orchestrator tests.
#[cfg_attr(test, mockall::automock)]
pub trait MetadataResolver: Send + Sync {
    /// Resolve a playlist entry.
    ///
    /// # Errors
    ///
    /// Returns a fetch error on transport failure, or a parse/quality error
    /// when the response lacks what the configured strategy needs.
    fn resolve(&self, track: TrackRef) -> Result<TrackDescriptor>;

    /// Resolve a track from its page URL.
    ///
    /// # Errors
    ///
    /// As for [`resolve`](Self::resolve), plus a parse error when the page has
    /// no `sound` hydration entry.
    fn resolve_page(&self, track_url: &str) -> Result<TrackDescriptor>;
}

/// [`MetadataResolver`] backed by the SoundCloud API.
pub struct SoundCloudMetadataResolver {
    http: Arc<dyn HttpClient>,
    client_id: String,
    strategy: FetchStrategy,
    quality_tier: String,
    parser: PageHydrationParser,
}

impl SoundCloudMetadataResolver {
    /// Create a resolver for the given strategy and quality policy.
    pub fn new(
        http: Arc<dyn HttpClient>,
        client_id: impl Into<String>,
        strategy: FetchStrategy,
        quality_tier: impl Into<String>,
    ) -> Self {
        Self {
            http,
            client_id: client_id.into(),
            strategy,
            quality_tier: quality_tier.into(),
            parser: PageHydrationParser::new(),
        }
    }

    fn tracks_url(&self, id: u64) -> Result<String> {
        url_with_params(
            API_TRACKS_URL,
            &[("ids", &id.to_string()), ("client_id", &self.client_id)],
        )
    }
}

impl MetadataResolver for SoundCloudMetadataResolver {
    fn resolve(&self, track: TrackRef) -> Result<TrackDescriptor> {
        debug!(track_id = track.id, "Fetching track information");

        let body = self.http.get_authenticated(&self.tracks_url(track.id)?)?;
        let response: Value = serde_json::from_slice(&body)?;
        let first = response
            .as_array()
            .and_then(|tracks| tracks.first())
            .ok_or(ParseError::TrackNotFound { id: track.id })?;

        describe(first, track.id, self.strategy, &self.quality_tier)
    }

    fn resolve_page(&self, track_url: &str) -> Result<TrackDescriptor> {
        info!("Resolving track page: {}", track_url);

        let body = self.http.get_authenticated(track_url)?;
        let payload = self.parser.extract(&String::from_utf8_lossy(&body))?;
        let sound = payload.require(SOUND_KIND)?;
        let id = sound
            .get("id")
            .and_then(Value::as_u64)
            .ok_or_else(|| ParseError::missing("id"))?;

        describe(sound, id, self.strategy, &self.quality_tier)
    }
}

/// Build a descriptor from an API track object.
///
/// The title is checked first; the remaining requirements depend on `strategy`.
pub fn describe(
    track: &Value,
    id: u64,
    strategy: FetchStrategy,
    quality_tier: &str,
) -> Result<TrackDescriptor> {
    let title = non_empty_str(track, "title").ok_or_else(|| ParseError::missing("title"))?;
    let permalink = non_empty_str(track, "permalink_url");

    let mut descriptor = TrackDescriptor::new(id, title);

    match strategy {
        FetchStrategy::Delegated => {
            let url = permalink.ok_or_else(|| ParseError::missing("permalink_url"))?;
            descriptor = descriptor.with_canonical_url(url);
        }
        FetchStrategy::Direct => {
            if let Some(url) = permalink {
                descriptor = descriptor.with_canonical_url(url);
            }
            let transcoding = select_transcoding(track, quality_tier)?;
            let locator = non_empty_str(transcoding, "url")
                .ok_or_else(|| ParseError::missing("media.transcodings.url"))?;
            let authorization = non_empty_str(track, "track_authorization")
                .ok_or_else(|| ParseError::missing("track_authorization"))?;
            let mime_type = transcoding
                .pointer("/format/mime_type")
                .and_then(Value::as_str)
                .map(str::to_string);
            descriptor = descriptor.with_stream(locator, authorization, quality_tier, mime_type);
            if let Some(protocol) = transcoding.pointer("/format/protocol").and_then(Value::as_str)
            {
                descriptor = descriptor.with_protocol(protocol);
            }
        }
    }

    debug!(track_id = id, title = %descriptor.title, %strategy, "Resolved track");
    Ok(descriptor)
}

/// Pick the transcoding whose `quality` equals `tier`.
///
/// Among matches a progressive stream wins over segmented ones. No fallback to
/// a lower tier.
fn select_transcoding<'a>(track: &'a Value, tier: &str) -> Result<&'a Value> {
    let transcodings = track
        .pointer("/media/transcodings")
        .and_then(Value::as_array)
        .ok_or_else(|| ParseError::missing("media.transcodings"))?;

    let matching: Vec<&Value> = transcodings
        .iter()
        .filter(|t| t.get("quality").and_then(Value::as_str) == Some(tier))
        .collect();

    let is_progressive =
        |t: &Value| t.pointer("/format/protocol").and_then(Value::as_str) == Some("progressive");

    matching
        .iter()
        .copied()
        .find(|t| is_progressive(t))
        .or_else(|| matching.first().copied())
        .ok_or_else(|| {
            QualityError::Unsupported {
                required: tier.to_string(),
                available: transcodings
                    .iter()
                    .filter_map(|t| t.get("quality").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect(),
            }
            .into()
        })
}

fn non_empty_str<'a>(value: &'a Value, field: &str) -> Option<&'a str> {
    value
        .get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::error::Error;
    use crate::http::MockHttpClient;

    fn track_json() -> Value {
        json!({
            "id": 42,
            "title": "Artist - Tune",
            "permalink_url": "https://soundcloud.com/artist/tune",
            "track_authorization": "signed-token",
            "media": {
                "transcodings": [
                    {
                        "url": "https://api-v2.soundcloud.com/media/soundcloud:tracks:42/aaa/stream/hls",
                        "preset": "aac_160k",
                        "quality": "hq",
                        "format": {"protocol": "hls", "mime_type": "audio/mp4; codecs=\"mp4a.40.2\""}
                    },
                    {
                        "url": "https://api-v2.soundcloud.com/media/soundcloud:tracks:42/bbb/stream/progressive",
                        "preset": "aac_160k",
                        "quality": "hq",
                        "format": {"protocol": "progressive", "mime_type": "audio/mp4"}
                    },
                    {
                        "url": "https://api-v2.soundcloud.com/media/soundcloud:tracks:42/ccc/stream/hls",
                        "preset": "mp3_0_0",
                        "quality": "sq",
                        "format": {"protocol": "hls", "mime_type": "audio/mpeg"}
                    }
                ]
            }
        })
    }

    #[test]
    fn test_describe_delegated() {
        let d = describe(&track_json(), 42, FetchStrategy::Delegated, "hq").unwrap();
        assert_eq!(d.title, "Artist - Tune");
        assert_eq!(
            d.canonical_url.as_deref(),
            Some("https://soundcloud.com/artist/tune")
        );
        assert!(d.stream_locator.is_none());
        assert!(d.authorization_token.is_none());
    }

    #[test]
    fn test_describe_direct_prefers_progressive() {
        let d = describe(&track_json(), 42, FetchStrategy::Direct, "hq").unwrap();
        assert!(d.stream_locator.as_deref().unwrap().ends_with("/progressive"));
        assert_eq!(d.authorization_token.as_deref(), Some("signed-token"));
        assert_eq!(d.quality_tier.as_deref(), Some("hq"));
        assert_eq!(d.mime_type.as_deref(), Some("audio/mp4"));
        assert_eq!(d.stream_protocol.as_deref(), Some("progressive"));
        assert!(!d.is_hls());
    }

    #[test]
    fn test_describe_direct_hls_only_tier() {
        let mut track = track_json();
        track["media"]["transcodings"] = json!([
            {
                "url": "https://api-v2.soundcloud.com/media/soundcloud:tracks:42/aaa/stream/hls",
                "quality": "hq",
                "format": {"protocol": "hls", "mime_type": "audio/mpeg"}
            }
        ]);
        let d = describe(&track, 42, FetchStrategy::Direct, "hq").unwrap();
        assert!(d.stream_locator.as_deref().unwrap().ends_with("/hls"));
        assert_eq!(d.mime_type.as_deref(), Some("audio/mpeg"));
        assert!(d.is_hls());
    }

    #[test]
    fn test_describe_missing_title() {
        let mut track = track_json();
        track.as_object_mut().unwrap().remove("title");
        let err = describe(&track, 42, FetchStrategy::Delegated, "hq").unwrap_err();
        assert_eq!(err.missing_field(), Some("title"));
    }

    #[test]
    fn test_describe_blank_title_is_missing() {
        let mut track = track_json();
        track["title"] = json!("   ");
        let err = describe(&track, 42, FetchStrategy::Direct, "hq").unwrap_err();
        assert_eq!(err.missing_field(), Some("title"));
    }

    #[test]
    fn test_describe_delegated_missing_permalink() {
        let mut track = track_json();
        track.as_object_mut().unwrap().remove("permalink_url");
        let err = describe(&track, 42, FetchStrategy::Delegated, "hq").unwrap_err();
        assert_eq!(err.missing_field(), Some("permalink_url"));
    }

    #[test]
    fn test_describe_direct_missing_authorization() {
        let mut track = track_json();
        track.as_object_mut().unwrap().remove("track_authorization");
        let err = describe(&track, 42, FetchStrategy::Direct, "hq").unwrap_err();
        assert_eq!(err.missing_field(), Some("track_authorization"));
    }

    #[test]
    fn test_describe_direct_no_matching_tier() {
        let mut track = track_json();
        track["media"]["transcodings"] = json!([
            {"url": "https://x/1", "quality": "sq", "format": {"protocol": "hls"}},
            {"url": "https://x/2", "quality": "sq", "format": {"protocol": "progressive"}}
        ]);
        let err = describe(&track, 42, FetchStrategy::Direct, "hq").unwrap_err();
        assert_eq!(
            err,
            Error::Quality(QualityError::Unsupported {
                required: "hq".to_string(),
                available: vec!["sq".to_string(), "sq".to_string()],
            })
        );
    }

    #[test]
    fn test_describe_direct_missing_transcodings() {
        let mut track = track_json();
        track.as_object_mut().unwrap().remove("media");
        let err = describe(&track, 42, FetchStrategy::Direct, "hq").unwrap_err();
        assert_eq!(err.missing_field(), Some("media.transcodings"));
    }

    #[test]
    fn test_resolve_uses_first_array_element() {
        let body = serde_json::to_vec(&json!([track_json()])).unwrap();
        let mut http = MockHttpClient::new();
        http.expect_get_authenticated()
            .withf(|url| url == "https://api-v2.soundcloud.com/tracks?ids=42&client_id=cid")
            .times(1)
            .return_once(move |_| Ok(body));

        let resolver = SoundCloudMetadataResolver::new(
            Arc::new(http),
            "cid",
            FetchStrategy::Delegated,
            "hq",
        );
        let d = resolver.resolve(TrackRef::new(42)).unwrap();
        assert_eq!(d.id, 42);
        assert_eq!(d.title, "Artist - Tune");
    }

    #[test]
    fn test_resolve_empty_array() {
        let mut http = MockHttpClient::new();
        http.expect_get_authenticated()
            .return_once(|_| Ok(b"[]".to_vec()));
        let resolver =
            SoundCloudMetadataResolver::new(Arc::new(http), "cid", FetchStrategy::Delegated, "hq");
        let err = resolver.resolve(TrackRef::new(7)).unwrap_err();
        assert_eq!(err, Error::Parse(ParseError::TrackNotFound { id: 7 }));
    }

    #[test]
    fn test_resolve_invalid_json() {
        let mut http = MockHttpClient::new();
        http.expect_get_authenticated()
            .return_once(|_| Ok(b"<html>".to_vec()));
        let resolver =
            SoundCloudMetadataResolver::new(Arc::new(http), "cid", FetchStrategy::Delegated, "hq");
        let err = resolver.resolve(TrackRef::new(7)).unwrap_err();
        assert!(matches!(err, Error::Parse(ParseError::InvalidJson { .. })));
    }

    #[test]
    fn test_resolve_page_reads_sound_entry() {
        let html = format!(
            "<script>window.__sc_hydration = [{{\"hydratable\":\"sound\",\"data\":{}}}];</script>",
            track_json()
        );
        let mut http = MockHttpClient::new();
        http.expect_get_authenticated()
            .return_once(move |_| Ok(html.into_bytes()));
        let resolver =
            SoundCloudMetadataResolver::new(Arc::new(http), "cid", FetchStrategy::Direct, "hq");
        let d = resolver
            .resolve_page("https://soundcloud.com/artist/tune")
            .unwrap();
        assert_eq!(d.id, 42);
        assert!(d.stream_locator.is_some());
    }
}
