//! Media acquisition.
//!
//! The orchestrator only sees the [`MediaFetcher`] trait. Two implementations
//! exist, selected by [`FetchStrategy`]:
//!
//! - [`DelegatedFetcher`] hands the canonical URL to an external download
//!   agent (`yt-dlp`) and lets it pick the container.
//! - [`DirectFetcher`] resolves the stream locator to a short-lived manifest
//!   URL and writes the manifest response verbatim. No transcoding happens,
//!   so an HLS transcoding lands on disk as an `.m3u8` playlist.

use std::ffi::OsString;
use std::fmt;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::auth::AuthCredentials;
use crate::error::{AgentError, FileSystemError, ParseError, Result};
use crate::http::{HttpClient, url_with_params};
use crate::library::find_by_stem;
use crate::track::{FetchStrategy, TrackDescriptor};

/// Outcome of a successful fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The track was written to this path.
    Downloaded(PathBuf),
    /// A file with the destination stem already exists; nothing was written.
    AlreadyExists,
}

/// Turns a resolved descriptor into a file on disk.
#[cfg_attr(test, mockall::automock)]
pub trait MediaFetcher: Send + Sync {
    /// Strategy this fetcher implements.
    fn strategy(&self) -> FetchStrategy;

    /// Fetch the track to `destination_stem` plus an extension of the
    /// fetcher's choosing.
    ///
    /// # Errors
    ///
    /// Returns a parse error if the descriptor lacks a field this strategy
    /// needs, or a fetch/agent/write error if acquisition fails.
    fn fetch(&self, descriptor: &TrackDescriptor, destination_stem: &Path)
    -> Result<FetchOutcome>;
}

/// Build the fetcher for `strategy`.
///
/// # Errors
///
/// Returns [`AgentError::NotFound`] if the delegated agent is not installed.
pub fn build_fetcher(
    strategy: FetchStrategy,
    http: Arc<dyn HttpClient>,
    client_id: &str,
    credentials: &AuthCredentials,
    agent: &AgentConfig,
) -> Result<Box<dyn MediaFetcher>> {
    let fetcher: Box<dyn MediaFetcher> = match strategy {
        FetchStrategy::Delegated => Box::new(DelegatedFetcher::new(agent, credentials)?),
        FetchStrategy::Direct => Box::new(DirectFetcher::new(http, client_id)),
    };
    Ok(fetcher)
}

// ============================================================================
// Delegated (external agent)
// ============================================================================

/// External agent settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Program name or path.
    pub program: String,
    /// Time budget per track in seconds.
    pub timeout_secs: u64,
    /// Extra arguments inserted before the URL.
    pub extra_args: Vec<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            program: "yt-dlp".to_string(),
            timeout_secs: 600,
            extra_args: Vec::new(),
        }
    }
}

/// Line the agent prints when its output file is already present.
const AGENT_ALREADY_DOWNLOADED: &str = "has already been downloaded";

/// Fetcher that shells out to `yt-dlp` (or a compatible agent).
#[derive(Clone)]
pub struct DelegatedFetcher {
    program: PathBuf,
    display_name: String,
    timeout: Duration,
    extra_args: Vec<String>,
    token: String,
}

impl fmt::Debug for DelegatedFetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelegatedFetcher")
            .field("program", &self.program)
            .field("timeout", &self.timeout)
            .field("extra_args", &self.extra_args)
            .field("token", &"<redacted>")
            .finish_non_exhaustive()
    }
}

impl DelegatedFetcher {
    /// Locate the agent on `PATH` and capture the session token.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::NotFound`] if the program cannot be found.
    pub fn new(config: &AgentConfig, credentials: &AuthCredentials) -> Result<Self> {
        let program = which::which(&config.program).map_err(|_| AgentError::NotFound {
            program: config.program.clone(),
        })?;
        debug!("Using download agent at {}", program.display());

        Ok(Self {
            program,
            display_name: config.program.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            extra_args: config.extra_args.clone(),
            token: credentials.token().to_string(),
        })
    }

    /// Arguments for one invocation.
    fn args(&self, canonical_url: &str, token: &str, destination_stem: &Path) -> Vec<OsString> {
        let mut template = destination_stem.as_os_str().to_owned();
        template.push(".%(ext)s");

        let mut args: Vec<OsString> = vec![
            "--no-progress".into(),
            "--no-overwrites".into(),
            "--add-header".into(),
            format!("Authorization:OAuth {token}").into(),
            "-o".into(),
            template,
        ];
        args.extend(self.extra_args.iter().map(OsString::from));
        args.push(canonical_url.into());
        args
    }

    /// Run the agent for one track.
    ///
    /// # Errors
    ///
    /// Returns an [`AgentError`] if the agent cannot start, fails, or exceeds
    /// its time budget.
    pub fn delegated_fetch(
        &self,
        canonical_url: &str,
        token: &str,
        destination_stem: &Path,
    ) -> Result<FetchOutcome> {
        ensure_parent(destination_stem)?;

        info!("Handing {} to {}", canonical_url, self.display_name);
        let child = Command::new(&self.program)
            .args(self.args(canonical_url, token, destination_stem))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| AgentError::SpawnFailed {
                program: self.display_name.clone(),
                reason: e.to_string(),
            })?;

        let output = self.wait_with_timeout(child)?;

        if !output.success {
            return Err(AgentError::Failed {
                program: self.display_name.clone(),
                status: output.status,
                stderr: tail(&output.stderr, 5),
            }
            .into());
        }

        if output.stdout.contains(AGENT_ALREADY_DOWNLOADED) {
            return Ok(FetchOutcome::AlreadyExists);
        }

        let directory = destination_stem.parent().unwrap_or_else(|| Path::new("."));
        let stem = destination_stem
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let path = find_by_stem(directory, &stem).unwrap_or_else(|| destination_stem.to_path_buf());
        Ok(FetchOutcome::Downloaded(path))
    }

    /// Wait for the agent, draining its pipes, and kill it past the deadline.
    fn wait_with_timeout(&self, mut child: Child) -> Result<AgentOutput> {
        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);
        let deadline = Instant::now() + self.timeout;

        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if Instant::now() >= deadline => {
                    warn!(
                        "{} timed out after {}s, killing",
                        self.display_name,
                        self.timeout.as_secs()
                    );
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(AgentError::TimedOut {
                        program: self.display_name.clone(),
                        secs: self.timeout.as_secs(),
                    }
                    .into());
                }
                Ok(None) => thread::sleep(Duration::from_millis(200)),
                Err(e) => {
                    return Err(AgentError::SpawnFailed {
                        program: self.display_name.clone(),
                        reason: e.to_string(),
                    }
                    .into());
                }
            }
        };

        let join = |handle: Option<thread::JoinHandle<String>>| {
            handle.and_then(|h| h.join().ok()).unwrap_or_default()
        };

        Ok(AgentOutput {
            success: status.success(),
            status: status.to_string(),
            stdout: join(stdout),
            stderr: join(stderr),
        })
    }
}

impl MediaFetcher for DelegatedFetcher {
    fn strategy(&self) -> FetchStrategy {
        FetchStrategy::Delegated
    }

    fn fetch(
        &self,
        descriptor: &TrackDescriptor,
        destination_stem: &Path,
    ) -> Result<FetchOutcome> {
        let url = descriptor
            .canonical_url
            .as_deref()
            .ok_or_else(|| ParseError::missing("permalink_url"))?;
        self.delegated_fetch(url, &self.token, destination_stem)
    }
}

struct AgentOutput {
    success: bool,
    status: String,
    stdout: String,
    stderr: String,
}

fn drain<R: Read + Send + 'static>(mut reader: R) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = reader.read_to_end(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    })
}

fn tail(text: &str, lines: usize) -> String {
    let all: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    all[all.len().saturating_sub(lines)..].join("\n")
}

// ============================================================================
// Direct (two-hop HTTP)
// ============================================================================

/// Fetcher that resolves stream locators itself and writes raw bytes.
pub struct DirectFetcher {
    http: Arc<dyn HttpClient>,
    client_id: String,
}

impl DirectFetcher {
    /// Create a direct fetcher over the given transport.
    pub fn new(http: Arc<dyn HttpClient>, client_id: impl Into<String>) -> Self {
        Self {
            http,
            client_id: client_id.into(),
        }
    }

    /// Resolve `stream_locator` to its manifest URL, then fetch it without auth.
    ///
    /// # Errors
    ///
    /// Returns a fetch error for either hop, or a parse error if the locator
    /// response has no `url`.
    pub fn direct_fetch(&self, stream_locator: &str, authorization: &str) -> Result<Vec<u8>> {
        let locator_url = url_with_params(
            stream_locator,
            &[
                ("client_id", &self.client_id),
                ("track_authorization", authorization),
            ],
        )?;

        let body = self.http.get_authenticated(&locator_url)?;
        let response: Value = serde_json::from_slice(&body)?;
        let manifest_url = response
            .get("url")
            .and_then(Value::as_str)
            .ok_or_else(|| ParseError::missing("url"))?;

        debug!("Fetching manifest {}", manifest_url);
        self.http.get_public(manifest_url)
    }
}

impl MediaFetcher for DirectFetcher {
    fn strategy(&self) -> FetchStrategy {
        FetchStrategy::Direct
    }

    fn fetch(
        &self,
        descriptor: &TrackDescriptor,
        destination_stem: &Path,
    ) -> Result<FetchOutcome> {
        let locator = descriptor
            .stream_locator
            .as_deref()
            .ok_or_else(|| ParseError::missing("media.transcodings.url"))?;
        let authorization = descriptor
            .authorization_token
            .as_deref()
            .ok_or_else(|| ParseError::missing("track_authorization"))?;

        let directory = destination_stem.parent().unwrap_or_else(|| Path::new("."));
        let stem = destination_stem
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        if find_by_stem(directory, &stem).is_some() {
            return Ok(FetchOutcome::AlreadyExists);
        }

        let bytes = self.direct_fetch(locator, authorization)?;

        let extension = extension_for_stream(
            descriptor.stream_protocol.as_deref(),
            descriptor.mime_type.as_deref(),
        );
        let target = with_appended_extension(destination_stem, extension);
        write_atomically(&target, &bytes)?;

        info!("Wrote {} bytes to {}", bytes.len(), target.display());
        Ok(FetchOutcome::Downloaded(target))
    }
}

/// File extension for the body a transcoding resolves to.
///
/// HLS transcodings resolve to a playlist whatever their codec MIME type says.
#[must_use]
pub fn extension_for_stream(protocol: Option<&str>, mime_type: Option<&str>) -> &'static str {
    if protocol.is_some_and(|p| p.eq_ignore_ascii_case("hls")) {
        "m3u8"
    } else {
        extension_for_mime(mime_type)
    }
}

/// File extension for a transcoding MIME type.
#[must_use]
pub fn extension_for_mime(mime_type: Option<&str>) -> &'static str {
    let Some(mime) = mime_type else {
        return "bin";
    };
    let essence = mime
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    match essence.as_str() {
        "audio/mpeg" | "audio/mp3" => "mp3",
        "audio/mp4" | "audio/aac" | "audio/x-m4a" => "m4a",
        "audio/ogg" | "audio/opus" => "opus",
        "audio/wav" | "audio/x-wav" | "audio/wave" => "wav",
        "application/vnd.apple.mpegurl" | "application/x-mpegurl" | "audio/mpegurl" => "m3u8",
        _ => "bin",
    }
}

/// `stem` + `.ext`, without treating dots inside the stem as an extension.
fn with_appended_extension(stem: &Path, extension: &str) -> PathBuf {
    let mut name = stem.as_os_str().to_owned();
    name.push(".");
    name.push(extension);
    PathBuf::from(name)
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        fs::create_dir_all(parent).map_err(|e| FileSystemError::CreateDirFailed {
            path: parent.to_path_buf(),
            reason: e.to_string(),
        })?;
    }
    Ok(())
}

/// Write to a `.part` sibling and rename, so a crash never leaves a file whose
/// stem counts as present.
fn write_atomically(target: &Path, bytes: &[u8]) -> Result<()> {
    ensure_parent(target)?;
    let partial = with_appended_extension(target, "part");

    let write_failed = |path: &Path, e: std::io::Error| FileSystemError::WriteFailed {
        path: path.to_path_buf(),
        reason: e.to_string(),
    };

    fs::write(&partial, bytes).map_err(|e| write_failed(&partial, e))?;
    if let Err(e) = fs::rename(&partial, target) {
        let _ = fs::remove_file(&partial);
        return Err(write_failed(target, e).into());
    }
    Ok(())
}
