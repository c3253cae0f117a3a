//! Application configuration management.
//!
//! Handles loading, saving, and validating the settings file, and layering
//! environment overrides (`CLIENT_ID`, `COOKIE`, `GANGSTAR_LIBRARY`) on top.
//! The session cookie is only ever read from the environment and is never
//! written back to disk.

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Error, FileSystemError, PlaylistError, Result};
use crate::fetcher::AgentConfig;
use crate::filename::RESERVED_CHARS;
use crate::http::HttpConfig;
use crate::metadata::DEFAULT_QUALITY_TIER;
use crate::sync::PlaylistTarget;
use crate::track::FetchStrategy;

/// Environment variable holding the API client identifier.
pub const ENV_CLIENT_ID: &str = "CLIENT_ID";
/// Environment variable holding the raw session cookie.
pub const ENV_COOKIE: &str = "COOKIE";
/// Environment variable overriding the library directory.
pub const ENV_LIBRARY: &str = "GANGSTAR_LIBRARY";

/// Subdirectory of the library used for single-track downloads.
pub const SINGLES_DIRECTORY: &str = "Singles";

const APP_DIR: &str = "gangstar";

/// Names Windows refuses as file or directory names.
const RESERVED_DEVICE_NAMES: [&str; 22] = [
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppConfig {
    /// Root directory; each playlist mirrors into `<library>/<label>`.
    pub library_directory: PathBuf,
    /// API client identifier for metadata and stream requests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// Playlist label → playlist URL.
    #[serde(default)]
    pub playlists: BTreeMap<String, String>,
    /// How tracks are acquired.
    #[serde(default)]
    pub strategy: FetchStrategy,
    /// Transcoding quality required by the direct strategy.
    #[serde(default = "default_quality_tier")]
    pub quality_tier: String,
    /// External download agent.
    #[serde(default)]
    pub agent: AgentConfig,
    /// HTTP timeouts and retry budget.
    #[serde(default)]
    pub http: HttpConfig,
}

fn default_quality_tier() -> String {
    DEFAULT_QUALITY_TIER.to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            library_directory: default_library_directory(),
            client_id: None,
            playlists: BTreeMap::new(),
            strategy: FetchStrategy::default(),
            quality_tier: default_quality_tier(),
            agent: AgentConfig::default(),
            http: HttpConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default location, or create it.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        Self::load_from(&config_file_path())
    }

    /// Load configuration from `path`, writing defaults there if it is missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("Config file not found, using defaults");
            let config = Self::default();
            if let Err(e) = config.save_to(path) {
                warn!("Failed to save default config: {}", e);
            }
            return Ok(config);
        }

        let content = fs::read_to_string(path).map_err(|e| FileSystemError::ReadFailed {
            path: path.to_path_buf(),
            reason: format!("Failed to read config file: {e}"),
        })?;

        let config: Self = serde_json::from_str(&content)
            .map_err(|e| Error::Configuration(format!("Failed to parse config file: {e}")))?;

        info!("Loaded config from {}", path.display());
        debug!(
            "Library directory: {}, {} playlist(s)",
            config.library_directory.display(),
            config.playlists.len()
        );
        Ok(config)
    }

    /// Save configuration to `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file or its directory cannot be written.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent).map_err(|e| FileSystemError::CreateDirFailed {
                path: parent.to_path_buf(),
                reason: format!("Failed to create config directory: {e}"),
            })?;
        }

        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).map_err(|e| FileSystemError::WriteFailed {
            path: path.to_path_buf(),
            reason: format!("Failed to write config file: {e}"),
        })?;

        info!("Saved config to {}", path.display());
        Ok(())
    }

    /// Apply `CLIENT_ID` and `GANGSTAR_LIBRARY` from `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_blank = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(client_id) = non_blank(ENV_CLIENT_ID) {
            debug!("Using client id from {}", ENV_CLIENT_ID);
            self.client_id = Some(client_id.trim().to_string());
        }
        if let Some(library) = non_blank(ENV_LIBRARY) {
            debug!("Using library directory from {}", ENV_LIBRARY);
            self.library_directory = PathBuf::from(library);
        }
    }

    /// Check labels, URLs and the quality tier.
    ///
    /// # Errors
    ///
    /// Returns [`PlaylistError::InvalidLabel`] for a label that cannot be a
    /// directory name, or a configuration error for a bad URL or setting.
    pub fn validate(&self) -> Result<()> {
        for (label, url) in &self.playlists {
            validate_label(label)?;
            validate_url(url)
                .map_err(|reason| Error::Configuration(format!("playlist '{label}': {reason}")))?;
        }
        if self.quality_tier.trim().is_empty() {
            return Err(Error::Configuration(
                "quality_tier must not be empty".to_string(),
            ));
        }
        if self.agent.program.trim().is_empty() {
            return Err(Error::Configuration(
                "agent.program must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// The client id, required for any metadata request.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if neither the file nor the environment
    /// provided one.
    pub fn require_client_id(&self) -> Result<&str> {
        self.client_id
            .as_deref()
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| {
                Error::Configuration(format!(
                    "client_id is not set (config file or {ENV_CLIENT_ID} environment variable)"
                ))
            })
    }

    /// Directory a playlist mirrors into.
    #[must_use]
    pub fn playlist_directory(&self, label: &str) -> PathBuf {
        self.library_directory.join(label)
    }

    /// Default directory for single-track downloads.
    #[must_use]
    pub fn singles_directory(&self) -> PathBuf {
        self.library_directory.join(SINGLES_DIRECTORY)
    }

    /// Targets for `labels`, or every configured playlist in label order.
    ///
    /// # Errors
    ///
    /// Returns [`PlaylistError::Unknown`] for a label that is not configured.
    pub fn targets(&self, labels: &[String]) -> Result<Vec<PlaylistTarget>> {
        if labels.is_empty() {
            return Ok(self
                .playlists
                .iter()
                .map(|(label, url)| PlaylistTarget::new(label, url, self.playlist_directory(label)))
                .collect());
        }

        labels
            .iter()
            .map(|label| {
                self.playlists
                    .get(label)
                    .map(|url| PlaylistTarget::new(label, url, self.playlist_directory(label)))
                    .ok_or_else(|| PlaylistError::Unknown(label.clone()).into())
            })
            .collect()
    }

    /// Get the path to the config file.
    #[must_use]
    pub fn config_file_path() -> PathBuf {
        config_file_path()
    }
}

/// Configuration plus the secrets that only come from the environment.
#[derive(Clone)]
pub struct Settings {
    /// Effective configuration after overrides.
    pub config: AppConfig,
    /// Raw session cookie, if provided.
    pub cookie: Option<String>,
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("config", &self.config)
            .field("cookie", &self.cookie.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Settings {
    /// Load `.env`, the config file (default location unless `path` is given),
    /// and environment overrides, then validate.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read, parsed, or fails
    /// validation.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match dotenvy::dotenv() {
            Ok(env_file) => debug!("Loaded environment from {}", env_file.display()),
            Err(e) if e.not_found() => debug!("No .env file found"),
            Err(e) => warn!("Ignoring unreadable .env file: {}", e),
        }

        let mut config = match path {
            Some(path) => AppConfig::load_from(path)?,
            None => AppConfig::load()?,
        };
        config.apply_overrides(|key| env::var(key).ok());
        config.validate()?;

        Ok(Self {
            config,
            cookie: env::var(ENV_COOKIE).ok(),
        })
    }
}

/// Get the default library directory.
#[must_use]
pub fn default_library_directory() -> PathBuf {
    dirs::audio_dir()
        .or_else(dirs::data_local_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

/// Directory for log files.
#[must_use]
pub fn default_log_directory() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join("logs")
}

/// Get the path to the config file.
fn config_file_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| dirs::data_local_dir().unwrap_or_else(|| PathBuf::from(".")))
        .join(APP_DIR)
        .join("config.json")
}

/// Check that a playlist label can be used as a directory name.
///
/// # Errors
///
/// Returns [`PlaylistError::InvalidLabel`] describing the first problem found.
pub fn validate_label(label: &str) -> Result<()> {
    let invalid = |reason: &str| -> Result<()> {
        Err(PlaylistError::InvalidLabel {
            label: label.to_string(),
            reason: reason.to_string(),
        }
        .into())
    };

    if label.trim().is_empty() {
        return invalid("label is empty");
    }
    if label != label.trim() {
        return invalid("label has leading or trailing whitespace");
    }
    if label == "." || label == ".." {
        return invalid("label is a relative path component");
    }
    if let Some(c) = label
        .chars()
        .find(|c| RESERVED_CHARS.contains(c) || c.is_control())
    {
        return invalid(&format!("label contains reserved character {c:?}"));
    }
    let base = label.split('.').next().unwrap_or_default();
    if RESERVED_DEVICE_NAMES
        .iter()
        .any(|name| name.eq_ignore_ascii_case(base))
    {
        return invalid("label is a reserved device name");
    }
    Ok(())
}

fn validate_url(url: &str) -> std::result::Result<(), String> {
    let parsed = reqwest::Url::parse(url).map_err(|e| format!("invalid URL '{url}': {e}"))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(format!("unsupported URL scheme '{other}' in '{url}'")),
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn sample() -> AppConfig {
        let mut config = AppConfig {
            library_directory: PathBuf::from("/music"),
            ..AppConfig::default()
        };
        config.playlists.insert(
            "DnB".to_string(),
            "https://soundcloud.com/jonasgrubbauer/sets/drum-and-bass".to_string(),
        );
        config.playlists.insert(
            "ColorBass".to_string(),
            "https://soundcloud.com/jonasgrubbauer/sets/color-bass".to_string(),
        );
        config
    }

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert!(config.client_id.is_none());
        assert!(config.playlists.is_empty());
        assert_eq!(config.strategy, FetchStrategy::Delegated);
        assert_eq!(config.quality_tier, "hq");
        assert_eq!(config.agent.program, "yt-dlp");
        assert!(config.library_directory.ends_with("gangstar"));
    }

    #[test]
    fn test_load_missing_writes_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("config.json");
        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config, AppConfig::default());
        assert!(path.exists());
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.json");
        let mut config = sample();
        config.strategy = FetchStrategy::Direct;
        config.client_id = Some("abc".to_string());
        config.save_to(&path).unwrap();

        assert_eq!(AppConfig::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_file_uses_field_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.json");
        fs::write(&path, r#"{"library_directory":"/srv/music"}"#).unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.library_directory, PathBuf::from("/srv/music"));
        assert_eq!(config.quality_tier, "hq");
        assert_eq!(config.http, HttpConfig::default());
    }

    #[test]
    fn test_malformed_file_is_configuration_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.json");
        fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            AppConfig::load_from(&path),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_overrides() {
        let mut config = sample();
        config.apply_overrides(|key| match key {
            ENV_CLIENT_ID => Some(" cid ".to_string()),
            ENV_LIBRARY => Some("/elsewhere".to_string()),
            _ => None,
        });
        assert_eq!(config.client_id.as_deref(), Some("cid"));
        assert_eq!(config.library_directory, PathBuf::from("/elsewhere"));

        config.apply_overrides(|_| Some("   ".to_string()));
        assert_eq!(config.client_id.as_deref(), Some("cid"));
    }

    #[test]
    fn test_require_client_id() {
        let mut config = sample();
        assert!(config.require_client_id().is_err());
        config.client_id = Some("cid".to_string());
        assert_eq!(config.require_client_id().unwrap(), "cid");
    }

    #[test]
    fn test_validate_label() {
        assert!(validate_label("DnB").is_ok());
        assert!(validate_label("Bass House 2").is_ok());
        assert!(validate_label("").is_err());
        assert!(validate_label("a/b").is_err());
        assert!(validate_label("..").is_err());
        assert!(validate_label("con").is_err());
        assert!(validate_label("NUL.txt").is_err());
        assert!(validate_label(" padded").is_err());
    }

    #[test]
    fn test_validate_rejects_bad_url() {
        let mut config = sample();
        assert!(config.validate().is_ok());
        config
            .playlists
            .insert("Bad".to_string(), "ftp://example.com/x".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_targets_in_label_order() {
        let config = sample();
        let targets = config.targets(&[]).unwrap();
        let labels: Vec<&str> = targets.iter().map(|t| t.label.as_str()).collect();
        assert_eq!(labels, vec!["ColorBass", "DnB"]);
        assert_eq!(targets[1].directory, PathBuf::from("/music/DnB"));
    }

    #[test]
    fn test_targets_unknown_label() {
        let config = sample();
        let err = config.targets(&["Garage".to_string()]).unwrap_err();
        assert!(matches!(err, Error::Playlist(PlaylistError::Unknown(_))));
    }

    #[test]
    fn test_cookie_is_redacted_in_debug() {
        let settings = Settings {
            config: sample(),
            cookie: Some("oauth_token=secret".to_string()),
        };
        assert!(!format!("{settings:?}").contains("secret"));
    }
}
