//! `Gangstar` Core Library
//!
//! This crate provides the core functionality for mirroring SoundCloud
//! playlists into a local music library:
//! - Session credential resolution from a browser cookie
//! - Playlist enumeration through the page hydration payload
//! - Track metadata and stream resolution against the `api-v2` endpoints
//! - Extension-agnostic presence checks against the local library
//! - Delegated (`yt-dlp`) and direct media acquisition
//! - Refresh and full sync passes, comparison, and single-track downloads
//!
//! # Error Handling
//!
//! This crate uses typed errors per domain, see the [`error`] module. Per-track
//! failures are collected into [`SyncResult`] instead of aborting a pass.
//!
//! ```rust,ignore
//! use gangstar_core::{AuthProvider, Result, Settings};
//!
//! fn start() -> Result<()> {
//!     let settings = Settings::load(None)?;
//!     let credentials = AuthProvider::new(settings.cookie.clone()).resolve()?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod filename;
pub mod http;
pub mod hydration;
pub mod index;
pub mod library;
pub mod metadata;
pub mod sync;
pub mod track;

pub use auth::{AuthCredentials, AuthProvider, TOKEN_MARKER};
pub use config::{
    AppConfig, ENV_CLIENT_ID, ENV_COOKIE, ENV_LIBRARY, SINGLES_DIRECTORY, Settings,
    default_library_directory, default_log_directory, validate_label,
};
pub use error::{
    AgentError, AuthError, Error, ErrorKind, FetchError, FileSystemError, ParseError,
    PlaylistError, QualityError, Result,
};
pub use fetcher::{
    AgentConfig, DelegatedFetcher, DirectFetcher, FetchOutcome, MediaFetcher, build_fetcher,
    extension_for_mime, extension_for_stream,
};
pub use filename::{FALLBACK_STEM, FilenameCodec, MAX_STEM_CHARS, RESERVED_CHARS};
pub use http::{ApiClient, DEFAULT_USER_AGENT, HttpClient, HttpConfig, url_with_params, with_retry};
pub use hydration::{HYDRATION_MARKER, HydrationPayload, PageHydrationParser};
pub use index::{TrackIndexResolver, TrackIndexSource};
pub use library::{LibrarySnapshot, LocalLibraryIndex, find_by_stem};
pub use metadata::{API_TRACKS_URL, DEFAULT_QUALITY_TIER, MetadataResolver, SoundCloudMetadataResolver};
pub use sync::{
    ComparisonReport, FailedTrack, PlaylistTarget, SyncMode, SyncOrchestrator, SyncResult,
};
pub use track::{FetchStrategy, PlaylistIndex, TrackDescriptor, TrackRef};
