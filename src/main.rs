mod api;
mod config;
mod downloader;
mod errors;
mod search;
mod utils;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use clap::{Parser, Subcommand};
use log::{error, info, warn};
use crate::api::spotify::SpotifyClient;
use crate::config::{DownloadConfig, SettingsUpdate};
use crate::downloader::manager::DownloadManager;
use crate::downloader::DownloadOutcome;
use crate::downloader::ytdlp::{self, YtDlp};
use crate::errors::{AppError, Result};

#[derive(Parser, Debug)]
#[command(name = "tunefetch", version, about = "Download music with official catalog metadata")]
struct Cli {
    /// Configuration file to use instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Netscape cookie file passed to yt-dlp
    #[arg(long, global = true)]
    cookies: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    #[command(flatten)]
    Download(DownloadCommand),
    /// Inspect or change stored settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
}

#[derive(Subcommand, Debug)]
enum DownloadCommand {
    /// Look up one track in the catalog and download it
    Track {
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,
    },
    /// Download a Spotify playlist track by track, or a YouTube playlist whole
    Playlist { url: String },
    /// Download every line of a text file (queries or URLs)
    Batch { file: PathBuf },
    /// Download a single URL
    Url { url: String },
}

#[derive(Subcommand, Debug)]
enum SettingsAction {
    Show,
    Set { key: String, value: String },
    Reset,
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        match &e {
            AppError::ToolMissing(_) => error!("❌ {}. Install yt-dlp and make sure it is on PATH.", e),
            AppError::PartialBatch { .. } | AppError::Cancelled => warn!("⚠️ {}", e),
            _ => error!("❌ {}", e),
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => DownloadConfig::get_config_path()?,
    };
    let mut config = DownloadConfig::load_from(&config_path)?;

    let command = match cli.command {
        Command::Settings { action } => return settings(action, &config, &config_path),
        Command::Download(command) => command,
    };

    if let Some(cookies) = cli.cookies {
        config.cookies = Some(cookies);
    }

    let tool = YtDlp::new(config.ytdlp_path.clone());
    tool.check_available().await?;
    if !ytdlp::ffmpeg_available().await {
        warn!("⚠️ [STARTUP] ffmpeg not found; audio extraction and tagging may fail");
    }

    let catalog = SpotifyClient::from_config(&config)?;
    let manager = DownloadManager::new(config, catalog, Arc::new(tool));
    let cancel = manager.cancel_flag();
    watch_interrupts(cancel.clone());

    let result = download(&manager, command).await;
    if cancel.load(Ordering::SeqCst) {
        return Err(AppError::Cancelled);
    }
    result
}

async fn download(manager: &DownloadManager, command: DownloadCommand) -> Result<()> {
    match command {
        DownloadCommand::Track { query } => {
            let outcome = manager.download_single(&query.join(" ")).await?;
            report(&outcome)?;
        }
        DownloadCommand::Playlist { url } => {
            manager.download_catalog_playlist(&url).await?.into_result()?;
        }
        DownloadCommand::Batch { file } => {
            manager.download_batch_file(&file).await?.into_result()?;
        }
        DownloadCommand::Url { url } => {
            let outcome = manager.download_url_to_default(&url).await?;
            report(&outcome)?;
        }
    }
    Ok(())
}

fn report(outcome: &DownloadOutcome) -> Result<()> {
    match &outcome.attempt {
        Some(attempt) => {
            info!("📁 [DONE] {} ({:?})", outcome.output.display(), attempt);
            Ok(())
        }
        None => Err(AppError::Process(format!(
            "nothing downloaded for {}",
            outcome.output.display()
        ))),
    }
}

/// First Ctrl-C lets the current item finish and skips the rest; a second
/// one exits immediately.
fn watch_interrupts(cancel: Arc<AtomicBool>) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        warn!("🛑 Interrupt received, finishing the current item. Press Ctrl-C again to abort.");
        cancel.store(true, Ordering::SeqCst);

        if tokio::signal::ctrl_c().await.is_ok() {
            std::process::exit(130);
        }
    });
}

fn settings(action: SettingsAction, config: &DownloadConfig, path: &Path) -> Result<()> {
    match action {
        SettingsAction::Show => {
            let mut shown = serde_json::to_value(config)?;
            if let Some(secret) = shown.get_mut("client_secret").filter(|v| !v.is_null()) {
                *secret = serde_json::Value::String("********".to_string());
            }
            println!("{}", serde_json::to_string_pretty(&shown)?);
            println!("# {}", path.display());
        }
        SettingsAction::Set { key, value } => {
            let updated = config.apply(SettingsUpdate::from_key_value(&key, &value)?)?;
            updated.save_to(path)?;
            info!("✅ [SETTINGS] {} updated", key);
        }
        SettingsAction::Reset => {
            config.reset_defaults().save_to(path)?;
            info!("✅ [SETTINGS] Download settings restored to defaults");
        }
    }
    Ok(())
}
