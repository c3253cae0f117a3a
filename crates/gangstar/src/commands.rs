//! Subcommand handlers.
//!
//! Each handler builds the pieces it needs from [`Settings`], runs the
//! orchestrator, and prints a plain-text report. Failures are listed once per
//! pass, after the pass completes.

use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;

use gangstar_core::{
    ApiClient, AppConfig, AuthProvider, ComparisonReport, FetchOutcome, HttpClient, MediaFetcher,
    Result, Settings, SoundCloudMetadataResolver, SyncMode, SyncOrchestrator, SyncResult,
    TrackIndexResolver, build_fetcher,
};
use tracing::info;

/// Whether a command finished with anything left undone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Everything requested succeeded.
    Clean,
    /// The command ran but some playlist or track failed.
    WithFailures,
}

impl Outcome {
    const fn from_clean(clean: bool) -> Self {
        if clean { Self::Clean } else { Self::WithFailures }
    }
}

/// Shared wiring for commands that talk to the API.
struct Session {
    orchestrator: SyncOrchestrator,
}

impl Session {
    /// Resolve credentials and build the resolvers; attach a fetcher if asked.
    fn open(settings: &Settings, with_fetcher: bool) -> Result<Self> {
        let config = &settings.config;
        let credentials = AuthProvider::new(settings.cookie.clone()).resolve()?;
        let client_id = config.require_client_id()?.to_string();

        let http: Arc<dyn HttpClient> =
            Arc::new(ApiClient::new(credentials.clone(), config.http.clone())?);
        let index = Arc::new(TrackIndexResolver::new(http.clone()));
        let metadata = Arc::new(SoundCloudMetadataResolver::new(
            http.clone(),
            client_id.clone(),
            config.strategy,
            config.quality_tier.clone(),
        ));

        let mut orchestrator = SyncOrchestrator::new(index, metadata);
        if with_fetcher {
            let fetcher = build_fetcher(
                config.strategy,
                http,
                &client_id,
                &credentials,
                &config.agent,
            )?;
            info!(strategy = %fetcher.strategy(), "Fetcher ready");
            orchestrator = orchestrator.with_fetcher(Arc::from(fetcher));
        } else {
            info!("Session ready (read-only)");
        }

        Ok(Self { orchestrator })
    }
}

/// `playlists`
pub fn list_playlists(config: &AppConfig, json: bool) -> Result<Outcome> {
    if json {
        println!("{}", serde_json::to_string_pretty(&config.playlists)?);
    } else if config.playlists.is_empty() {
        println!(
            "No playlists configured. Add them to {}",
            AppConfig::config_file_path().display()
        );
    } else {
        for (label, url) in &config.playlists {
            println!("{label:<16} {url}");
        }
    }
    Ok(Outcome::Clean)
}

/// `refresh` and `sync`
pub fn sync(settings: &Settings, labels: &[String], mode: SyncMode) -> Result<Outcome> {
    let targets = settings.config.targets(labels)?;
    let session = Session::open(settings, true)?;

    let mut clean = true;
    for (label, outcome) in session.orchestrator.sync_all(&targets, mode) {
        match outcome {
            Ok(result) => {
                clean &= result.is_clean();
                print!("{}", render_sync(&result));
            }
            Err(e) => {
                clean = false;
                println!("{label}: {e}");
            }
        }
    }
    Ok(Outcome::from_clean(clean))
}

/// `compare`
pub fn compare(settings: &Settings, labels: &[String]) -> Result<Outcome> {
    let targets = settings.config.targets(labels)?;
    let session = Session::open(settings, false)?;

    let mut clean = true;
    for target in &targets {
        match session.orchestrator.compare(target) {
            Ok(report) => {
                clean &= report.unresolved.is_empty();
                print!("{}", render_comparison(&report));
            }
            Err(e) => {
                clean = false;
                println!("{}: {e}", target.label);
            }
        }
    }
    Ok(Outcome::from_clean(clean))
}

/// `download`
pub fn download(settings: &Settings, url: &str, dir: Option<&Path>) -> Result<Outcome> {
    let directory = dir.map_or_else(|| settings.config.singles_directory(), Path::to_path_buf);
    let session = Session::open(settings, true)?;

    match session.orchestrator.download_track(url, &directory)? {
        FetchOutcome::Downloaded(path) => println!("Downloaded {}", path.display()),
        FetchOutcome::AlreadyExists => {
            println!("Already present in {}", directory.display());
        }
    }
    Ok(Outcome::Clean)
}

/// Summary line plus one line per failed track.
fn render_sync(result: &SyncResult) -> String {
    let mut out = format!("{}\n", result.summary());
    for failed in &result.failed {
        let _ = writeln!(out, "  failed {failed}");
    }
    out
}

fn render_comparison(report: &ComparisonReport) -> String {
    let mut out = if report.is_in_sync() {
        format!(
            "{}: up to date ({} track(s))\n",
            report.playlist,
            report.remote_stems.len()
        )
    } else {
        format!(
            "{}: {} of {} track(s) missing\n",
            report.playlist,
            report.missing.len(),
            report.remote_stems.len()
        )
    };
    for stem in &report.missing {
        let _ = writeln!(out, "  missing {stem}");
    }
    for failed in &report.unresolved {
        let _ = writeln!(out, "  unresolved {failed}");
    }
    out
}

#[cfg(test)]
mod tests {
    use gangstar_core::{FailedTrack, ParseError, TrackRef};

    use super::*;

    #[test]
    fn test_render_sync_lists_failures() {
        let result = SyncResult {
            playlist: "DnB".to_string(),
            mode: SyncMode::Full,
            total_tracks: 3,
            downloaded: vec!["/m/DnB/One.mp3".into(), "/m/DnB/Three.mp3".into()],
            skipped_existing: 0,
            failed: vec![FailedTrack {
                track: TrackRef::new(2),
                title: None,
                error: ParseError::missing("title").into(),
            }],
            stopped_at: None,
            duration_ms: 12,
        };
        let text = render_sync(&result);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines[0],
            "DnB (full): 2 downloaded, 0 already present, 1 failed of 3 track(s)"
        );
        assert!(lines[1].starts_with("  failed #2: "));
        assert!(lines[1].contains("title"));
    }

    #[test]
    fn test_render_comparison() {
        let report = ComparisonReport {
            playlist: "Garage".to_string(),
            remote_stems: vec!["A".to_string(), "B".to_string()],
            missing: vec!["B".to_string()],
            unresolved: Vec::new(),
        };
        assert_eq!(
            render_comparison(&report),
            "Garage: 1 of 2 track(s) missing\n  missing B\n"
        );
    }

    #[test]
    fn test_render_comparison_in_sync() {
        let report = ComparisonReport {
            playlist: "Garage".to_string(),
            remote_stems: vec!["A".to_string()],
            missing: Vec::new(),
            unresolved: Vec::new(),
        };
        assert_eq!(
            render_comparison(&report),
            "Garage: up to date (1 track(s))\n"
        );
    }

    #[test]
    fn test_sync_without_cookie_is_auth_error() {
        let mut config = AppConfig::default();
        config.playlists.insert(
            "DnB".to_string(),
            "https://soundcloud.com/x/sets/dnb".to_string(),
        );
        let settings = Settings {
            config,
            cookie: None,
        };
        let err = sync(&settings, &[], SyncMode::Refresh).unwrap_err();
        assert_eq!(err.kind(), gangstar_core::ErrorKind::AuthResolution);
    }
}
