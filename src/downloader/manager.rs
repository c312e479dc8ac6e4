use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use crate::api::spotify::SpotifyClient;
use crate::config::DownloadConfig;
use crate::errors::{AppError, Result};
use crate::search::batch::{read_batch_file, BatchEntry};
use crate::search::{extract_list_param, extract_playlist_id, PlaylistKind};
use crate::utils::{ensure_dir_exists, sanitize_filename, url_tail_name};
use super::fetcher::MediaFetcher;
use super::progress::ProgressReporter;
use super::{ytdlp, Attempt, BatchResult, DownloadOutcome, ItemState, MediaTool, ToolInvocation};

const SINGLES_FOLDER: &str = "Singles";
const URLS_FOLDER: &str = "URLs";

/// Drives the user-facing flows: single track, catalog playlist, batch file
/// and direct URL. Items always run one after another.
pub struct DownloadManager {
    config: Arc<DownloadConfig>,
    catalog: SpotifyClient,
    tool: Arc<dyn MediaTool>,
    fetcher: MediaFetcher,
    cancel: Arc<AtomicBool>,
}

impl DownloadManager {
    pub fn new(config: DownloadConfig, catalog: SpotifyClient, tool: Arc<dyn MediaTool>) -> Self {
        let config = Arc::new(config);
        let cancel = Arc::new(AtomicBool::new(false));
        let fetcher = MediaFetcher::new(tool.clone(), config.clone(), cancel.clone());

        Self {
            config,
            catalog,
            tool,
            fetcher,
            cancel,
        }
    }

    /// Setting this flag skips every item not yet started.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    async fn folder(&self, name: &str) -> Result<PathBuf> {
        let folder = self.config.download_dir.join(name);
        ensure_dir_exists(&folder).await?;
        Ok(folder)
    }

    fn cookies(&self) -> Option<PathBuf> {
        self.config.cookie_file()
    }

    async fn rate_limit(&self) {
        tokio::time::sleep(self.config.tick_duration()).await;
    }

    pub async fn download_single(&self, query: &str) -> Result<DownloadOutcome> {
        let folder = self.folder(SINGLES_FOLDER).await?;
        let cookies = self.cookies();

        ItemState::Resolving.log(query);
        let metadata = self.catalog.search_track(query).await.map_err(|e| {
            log::error!("❌ [SINGLE] Lookup failed for '{}': {}", query, e);
            e
        })?;

        let outcome = self.fetcher.fetch(&metadata, &folder, cookies.as_deref()).await;
        if outcome.success {
            log::info!("🎉 [SINGLE] Download complete: {}", metadata.search());
        } else {
            log::error!("❌ [SINGLE] Download failed: {}", metadata.search());
        }
        Ok(outcome)
    }

    pub async fn download_catalog_playlist(&self, url: &str) -> Result<BatchResult> {
        let id = extract_playlist_id(url)
            .ok_or_else(|| AppError::InvalidInput(format!("no playlist id in {}", url)))?;

        match id.kind() {
            PlaylistKind::Catalog => {}
            PlaylistKind::VideoSite => {
                log::info!("📺 [PLAYLIST] {} is a video-site playlist, handing it to yt-dlp", id);
                let folder = self.folder(URLS_FOLDER).await?;
                let outcome = self.download_video_playlist(url, &folder).await;
                let mut result = BatchResult::new(1);
                result.record(outcome.success);
                return Ok(result);
            }
            PlaylistKind::Unrecognized => {
                return Err(AppError::InvalidInput(format!(
                    "'{}' is not a downloadable playlist",
                    id
                )));
            }
        }

        let fetched = self.catalog.fetch_playlist_tracks(id.as_str()).await?;
        if fetched.tracks.is_empty() {
            if fetched.truncated {
                return Err(AppError::Process(format!("listing playlist {} failed", id)));
            }
            return Err(AppError::NotFound(format!("playlist {} has no tracks", id)));
        }
        if fetched.truncated {
            log::warn!(
                "⚠️ [PLAYLIST] Listing stopped early, continuing with {} tracks",
                fetched.tracks.len()
            );
        }

        let folder = self.folder(&format!("Spotify_{}", id)).await?;
        let cookies = self.cookies();
        let total = fetched.tracks.len();
        let mut result = BatchResult::new(total);

        log::info!("📋 [PLAYLIST] {} tracks to download", total);
        for (i, metadata) in fetched.tracks.iter().enumerate() {
            if self.is_cancelled() {
                log::warn!("🛑 [PLAYLIST] Interrupted, skipping {} remaining tracks", total - i);
                break;
            }
            log::info!("🎵 [PLAYLIST] {}/{}: {}", i + 1, total, metadata.search());
            let outcome = self.fetcher.fetch(metadata, &folder, cookies.as_deref()).await;
            result.record(outcome.success);
        }

        log::info!(
            "📊 [PLAYLIST] Finished {}{}",
            result,
            if fetched.truncated { " (listing truncated)" } else { "" }
        );
        Ok(result)
    }

    pub async fn download_batch_file(&self, path: &Path) -> Result<BatchResult> {
        let entries = read_batch_file(path).await?;
        if entries.is_empty() {
            log::warn!("⚠️ [BATCH] {:?} has no entries", path);
            return Ok(BatchResult::default());
        }

        let stem = path
            .file_stem()
            .map(|s| sanitize_filename(&s.to_string_lossy()))
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "batch".to_string());
        let folder = self.folder(&stem).await?;
        let cookies = self.cookies();

        let catalog_enabled = match self.catalog.get_token().await {
            Ok(_) => true,
            Err(e) => {
                log::warn!("⚠️ [BATCH] Catalog unavailable, searching yt-dlp directly: {}", e);
                false
            }
        };

        let total = entries.len();
        let mut result = BatchResult::new(total);
        log::info!("📦 [BATCH] Processing {} items", total);

        for (i, entry) in entries.iter().enumerate() {
            if self.is_cancelled() {
                log::warn!("🛑 [BATCH] Interrupted, skipping {} remaining items", total - i);
                break;
            }
            log::info!("📦 [BATCH] Item {}/{}: {}", i + 1, total, entry.as_str());
            ItemState::Pending.log(entry.as_str());

            let success = match entry {
                BatchEntry::Url(url) => self.direct_item(url, &folder).await,
                BatchEntry::Query(query) => {
                    match self.catalog_item(query, catalog_enabled, &folder, cookies.as_deref()).await {
                        Some(outcome) => outcome.success,
                        None => self.direct_item(&format!("ytsearch1:{}", query), &folder).await,
                    }
                }
            };
            result.record(success);
        }

        log::info!("📊 [BATCH] Finished {}", result);
        Ok(result)
    }

    /// `None` when the query could not be resolved in the catalog and
    /// should be searched directly instead.
    async fn catalog_item(
        &self,
        query: &str,
        catalog_enabled: bool,
        folder: &Path,
        cookies: Option<&Path>,
    ) -> Option<DownloadOutcome> {
        if !catalog_enabled {
            return None;
        }

        ItemState::Resolving.log(query);
        match self.catalog.search_track(query).await {
            Ok(metadata) => Some(self.fetcher.fetch(&metadata, folder, cookies).await),
            Err(e) => {
                log::warn!("⚠️ [BATCH] No catalog match for '{}' ({}), searching directly", query, e);
                None
            }
        }
    }

    async fn direct_item(&self, target: &str, folder: &Path) -> bool {
        let outcome = self.download_url(target, folder).await;
        if !self.is_cancelled() {
            self.rate_limit().await;
        }
        outcome.success
    }

    /// `url` subcommand: download into `{download_dir}/URLs`.
    pub async fn download_url_to_default(&self, url: &str) -> Result<DownloadOutcome> {
        let folder = self.folder(URLS_FOLDER).await?;
        Ok(self.download_url(url, &folder).await)
    }

    pub async fn download_url(&self, url: &str, folder: &Path) -> DownloadOutcome {
        if let Some(list) = extract_list_param(url) {
            if list.kind() == PlaylistKind::VideoSite {
                log::info!("📺 [URL] Playlist {} detected, downloading every entry", list);
                return self.download_video_playlist(url, folder).await;
            }
        }

        ItemState::Resolving.log(url);
        let title = match self.tool.print_title(url).await {
            Some(title) => title,
            None => {
                log::debug!("no title for {}, naming from the URL", url);
                url_tail_name(url)
            }
        };
        let stem = sanitize_filename(&title);
        let cookies = self.cookies();
        let invocation = ytdlp::url_invocation(url, &self.config, folder, &stem, cookies.as_deref());

        ItemState::Downloading.log(&title);
        let output = folder.join(&stem);
        let limit = self.config.attempt_timeout_duration();
        let success = self.run_with_progress(&title, &invocation, Some(limit)).await;
        if success {
            log::info!("✅ [URL] {}", title);
            ItemState::Succeeded.log(&title);
            DownloadOutcome::succeeded(Attempt::Direct, output)
        } else {
            ItemState::Failed.log(&title);
            DownloadOutcome::failed(output)
        }
    }

    pub async fn download_video_playlist(&self, url: &str, folder: &Path) -> DownloadOutcome {
        let cookies = self.cookies();
        let invocation = ytdlp::video_playlist_invocation(url, &self.config, folder, cookies.as_deref());

        // a whole playlist can legitimately outlast the per-attempt timeout
        if self.run_with_progress("video playlist", &invocation, None).await {
            log::info!("✅ [URL] Playlist downloaded into {:?}", folder);
            DownloadOutcome::succeeded(Attempt::Direct, folder.to_path_buf())
        } else {
            DownloadOutcome::failed(folder.to_path_buf())
        }
    }

    async fn run_with_progress(
        &self,
        label: &str,
        invocation: &ToolInvocation,
        limit: Option<Duration>,
    ) -> bool {
        let reporter = ProgressReporter::start(label);
        let run = self.tool.run(invocation, Some(reporter.feed()));
        let result = match limit {
            Some(limit) => tokio::time::timeout(limit, run).await,
            None => Ok(run.await),
        };
        reporter.stop().await;

        match result {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                log::error!("❌ [URL] {} failed: {}", label, e);
                false
            }
            Err(_) => {
                log::error!("⏱️ [URL] {} timed out after {}s", label, self.config.attempt_timeout);
                false
            }
        }
    }
}
