//! Error types for Gangstar core operations.
//!
//! Errors are grouped per domain and wrapped by the top-level [`Error`].
//! Every error is `Clone` so per-track failures can be stored in a
//! [`SyncResult`](crate::sync::SyncResult) and reported once at the end of a pass.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using the crate's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in Gangstar core operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Error {
    /// Credential resolution failed.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// A network request failed.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// A page or API payload could not be interpreted.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// No transcoding matches the configured quality policy.
    #[error(transparent)]
    Quality(#[from] QualityError),

    /// A local file system operation failed.
    #[error(transparent)]
    FileSystem(#[from] FileSystemError),

    /// The external download agent failed.
    #[error(transparent)]
    Agent(#[from] AgentError),

    /// A playlist could not be processed.
    #[error(transparent)]
    Playlist(#[from] PlaylistError),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Credential errors. Always fatal for the run.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    /// No session cookie was configured.
    #[error("Missing credential: no session cookie configured")]
    MissingCookie,

    /// The cookie does not carry a usable token segment.
    #[error("Missing credential: cookie has no `{marker}` segment")]
    MissingToken {
        /// Marker that was searched for.
        marker: String,
    },
}

/// Transport-level failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// The request could not be sent or the body could not be read.
    #[error("Request to {url} failed: {reason}")]
    Transport {
        /// Requested URL.
        url: String,
        /// Underlying reason.
        reason: String,
    },

    /// The request timed out.
    #[error("Request to {url} timed out")]
    Timeout {
        /// Requested URL.
        url: String,
    },

    /// The server answered with a non-success status.
    #[error("Request to {url} returned HTTP {status}")]
    Status {
        /// Requested URL.
        url: String,
        /// HTTP status code.
        status: u16,
    },
}

impl FetchError {
    /// Whether another attempt could plausibly succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { .. } | Self::Timeout { .. } => true,
            Self::Status { status, .. } => *status >= 500 || *status == 429,
        }
    }
}

/// Content errors. Never retried.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    /// No script element carries the hydration marker.
    #[error("Hydration data not found in page")]
    HydrationNotFound,

    /// The hydration payload has no entry tagged with the expected kind.
    #[error("Hydration payload has no `{kind}` entry")]
    EntryNotFound {
        /// Discriminator value that was searched for.
        kind: String,
    },

    /// A required field is absent or has the wrong type.
    #[error("Missing field `{field}`")]
    MissingField {
        /// Field name.
        field: String,
    },

    /// The metadata endpoint returned no track for the id.
    #[error("Track {id} not found")]
    TrackNotFound {
        /// Track id.
        id: u64,
    },

    /// A body was not valid JSON.
    #[error("Invalid JSON: {reason}")]
    InvalidJson {
        /// Parser message.
        reason: String,
    },
}

impl ParseError {
    /// Shorthand for [`ParseError::MissingField`].
    pub fn missing(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }
}

/// Quality policy errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QualityError {
    /// No transcoding carries the required tier.
    #[error("No `{required}` transcoding available (found: {})", .available.join(", "))]
    Unsupported {
        /// Configured tier.
        required: String,
        /// Tiers the track offers.
        available: Vec<String>,
    },
}

/// File system errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FileSystemError {
    /// Reading a file or directory failed.
    #[error("Failed to read {path}: {reason}")]
    ReadFailed {
        /// Path that failed.
        path: PathBuf,
        /// Underlying reason.
        reason: String,
    },

    /// Writing a file failed.
    #[error("Failed to write {path}: {reason}")]
    WriteFailed {
        /// Path that failed.
        path: PathBuf,
        /// Underlying reason.
        reason: String,
    },

    /// Creating a directory failed.
    #[error("Failed to create directory {path}: {reason}")]
    CreateDirFailed {
        /// Path that failed.
        path: PathBuf,
        /// Underlying reason.
        reason: String,
    },
}

/// External download agent errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AgentError {
    /// The agent program is not installed.
    #[error("Download agent `{program}` not found on PATH")]
    NotFound {
        /// Program name.
        program: String,
    },

    /// The agent could not be started or waited on.
    #[error("Failed to run `{program}`: {reason}")]
    SpawnFailed {
        /// Program name.
        program: String,
        /// Underlying reason.
        reason: String,
    },

    /// The agent exited unsuccessfully.
    #[error("`{program}` exited with {status}: {stderr}")]
    Failed {
        /// Program name.
        program: String,
        /// Exit status description.
        status: String,
        /// Last lines of the agent's stderr.
        stderr: String,
    },

    /// The agent exceeded its time budget and was killed.
    #[error("`{program}` timed out after {secs}s")]
    TimedOut {
        /// Program name.
        program: String,
        /// Budget in seconds.
        secs: u64,
    },
}

/// Playlist-level errors. These short-circuit a single pass.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlaylistError {
    /// No tracks could be discovered for the playlist.
    #[error("No tracks found in playlist {url}")]
    NoTracks {
        /// Playlist URL.
        url: String,
    },

    /// Playlist label is not usable as a directory name.
    #[error("Invalid playlist label '{label}': {reason}")]
    InvalidLabel {
        /// The rejected label.
        label: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Playlist label is not configured.
    #[error("Unknown playlist: {0}")]
    Unknown(String),
}

/// Coarse error taxonomy used for reporting and retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// No credential could be resolved.
    AuthResolution,
    /// Transport or non-2xx failure.
    Fetch,
    /// Missing marker or field.
    Parse,
    /// Quality policy skip.
    UnsupportedQuality,
    /// Local write failure.
    Write,
    /// External agent failure.
    Agent,
    /// Playlist-level failure.
    Playlist,
    /// Invalid configuration.
    Config,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AuthResolution => write!(f, "auth"),
            Self::Fetch => write!(f, "fetch"),
            Self::Parse => write!(f, "parse"),
            Self::UnsupportedQuality => write!(f, "quality"),
            Self::Write => write!(f, "write"),
            Self::Agent => write!(f, "agent"),
            Self::Playlist => write!(f, "playlist"),
            Self::Config => write!(f, "config"),
        }
    }
}

impl Error {
    /// Classify this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Auth(_) => ErrorKind::AuthResolution,
            Self::Fetch(_) => ErrorKind::Fetch,
            Self::Parse(_) => ErrorKind::Parse,
            Self::Quality(_) => ErrorKind::UnsupportedQuality,
            Self::FileSystem(_) => ErrorKind::Write,
            Self::Agent(_) => ErrorKind::Agent,
            Self::Playlist(_) => ErrorKind::Playlist,
            Self::Configuration(_) => ErrorKind::Config,
        }
    }

    /// Whether the error is a transient transport failure.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Fetch(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Whether the error must abort the whole run.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Auth(_) | Self::Configuration(_))
    }

    /// The missing field name, if this is a [`ParseError::MissingField`].
    #[must_use]
    pub fn missing_field(&self) -> Option<&str> {
        match self {
            Self::Parse(ParseError::MissingField { field }) => Some(field),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Parse(ParseError::InvalidJson {
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_field_display() {
        let err = Error::from(ParseError::missing("title"));
        assert_eq!(err.to_string(), "Missing field `title`");
        assert_eq!(err.missing_field(), Some("title"));
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            Error::from(AuthError::MissingCookie).kind(),
            ErrorKind::AuthResolution
        );
        assert_eq!(
            Error::from(QualityError::Unsupported {
                required: "hq".to_string(),
                available: vec!["sq".to_string()],
            })
            .kind(),
            ErrorKind::UnsupportedQuality
        );
        assert_eq!(
            Error::from(FileSystemError::WriteFailed {
                path: PathBuf::from("/x"),
                reason: "denied".to_string(),
            })
            .kind(),
            ErrorKind::Write
        );
    }

    #[test]
    fn test_retryable_statuses() {
        let status = |status| {
            Error::from(FetchError::Status {
                url: "https://example.com".to_string(),
                status,
            })
        };
        assert!(status(503).is_retryable());
        assert!(status(429).is_retryable());
        assert!(!status(404).is_retryable());
        assert!(!status(401).is_retryable());
        assert!(
            Error::from(FetchError::Timeout {
                url: "https://example.com".to_string()
            })
            .is_retryable()
        );
        assert!(!Error::from(ParseError::HydrationNotFound).is_retryable());
    }

    #[test]
    fn test_fatal_errors() {
        assert!(Error::from(AuthError::MissingCookie).is_fatal());
        assert!(Error::Configuration("bad".to_string()).is_fatal());
        assert!(!Error::from(ParseError::missing("title")).is_fatal());
    }

    #[test]
    fn test_unsupported_quality_display() {
        let err = QualityError::Unsupported {
            required: "hq".to_string(),
            available: vec!["sq".to_string(), "sq".to_string()],
        };
        assert_eq!(err.to_string(), "No `hq` transcoding available (found: sq, sq)");
    }

    #[test]
    fn test_serde_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Parse(ParseError::InvalidJson { .. })));
    }
}
