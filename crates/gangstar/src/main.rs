//! Gangstar - keeps a local music library in sync with SoundCloud playlists.
//!
//! This is the entry point for the command-line front end.

mod commands;
mod logging;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use gangstar_core::{ErrorKind, FetchStrategy, Settings, SyncMode};
use tracing::{debug, error};

use crate::logging::LoggingConfig;

/// Exit status when credentials cannot be resolved.
const EXIT_CREDENTIALS: u8 = 2;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file to use instead of the default location
    #[arg(short, long, global = true, env = "GANGSTAR_CONFIG")]
    config: Option<PathBuf>,

    /// Override the configured fetch strategy (delegated or direct)
    #[arg(long, global = true)]
    strategy: Option<FetchStrategy>,

    /// More console output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only print warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Do not write the JSON log file
    #[arg(long, global = true)]
    no_log_file: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Download new tracks, stopping at the first one already present
    Refresh {
        /// Playlist labels (default: all configured playlists)
        labels: Vec<String>,
    },
    /// Run a sync pass over one or more playlists
    Sync {
        /// Visit every track instead of stopping at the first present one
        #[arg(long)]
        full: bool,

        /// Playlist labels (default: all configured playlists)
        labels: Vec<String>,
    },
    /// List remote tracks that are missing locally, without downloading
    Compare {
        /// Playlist labels (default: all configured playlists)
        labels: Vec<String>,
    },
    /// Download a single track by its page URL
    Download {
        /// Track page URL
        url: String,

        /// Target directory (default: <library>/Singles)
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },
    /// List configured playlists
    Playlists {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    let args = Args::parse();

    let logging_config =
        LoggingConfig::from_verbosity(args.verbose, args.quiet).with_file_logging(!args.no_log_file);
    let _guard = match logging::init(&logging_config) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("warning: {e}");
            None
        }
    };
    debug!(
        "Logging to {}",
        logging::current_log_path(&logging_config).display()
    );

    let mut settings = match Settings::load(args.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            error!("{}", e);
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };
    if let Some(strategy) = args.strategy {
        settings.config.strategy = strategy;
    }

    let outcome = match &args.command {
        Commands::Playlists { json } => commands::list_playlists(&settings.config, *json),
        Commands::Refresh { labels } => commands::sync(&settings, labels, SyncMode::Refresh),
        Commands::Sync { full, labels } => {
            let mode = if *full { SyncMode::Full } else { SyncMode::Refresh };
            commands::sync(&settings, labels, mode)
        }
        Commands::Compare { labels } => commands::compare(&settings, labels),
        Commands::Download { url, dir } => commands::download(&settings, url, dir.as_deref()),
    };

    match outcome {
        Ok(commands::Outcome::Clean) => ExitCode::SUCCESS,
        Ok(commands::Outcome::WithFailures) => ExitCode::FAILURE,
        Err(e) => {
            error!("{}", e);
            eprintln!("error: {e}");
            if e.kind() == ErrorKind::AuthResolution {
                ExitCode::from(EXIT_CREDENTIALS)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}
