use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use crate::api::TrackMetadata;
use crate::config::DownloadConfig;
use crate::utils::sanitize_filename;
use super::fallback::FallbackEngine;
use super::progress::ProgressReporter;
use super::{ytdlp, Attempt, DownloadOutcome, ItemState, MediaTool};

/// Downloads one catalog track: primary attempt with live progress, then
/// the fallback chain, then the rate-limit pause. A cancelled run stops
/// after the primary attempt and skips the pause.
pub struct MediaFetcher {
    tool: Arc<dyn MediaTool>,
    config: Arc<DownloadConfig>,
    fallback: FallbackEngine,
    cancel: Arc<AtomicBool>,
}

impl MediaFetcher {
    pub fn new(tool: Arc<dyn MediaTool>, config: Arc<DownloadConfig>, cancel: Arc<AtomicBool>) -> Self {
        let fallback = FallbackEngine::new(tool.clone(), config.clone(), cancel.clone());
        Self { tool, config, fallback, cancel }
    }

    pub async fn fetch(
        &self,
        metadata: &TrackMetadata,
        folder: &Path,
        cookies: Option<&Path>,
    ) -> DownloadOutcome {
        let output_stem = folder.join(sanitize_filename(metadata.search()));
        let invocation = ytdlp::primary_invocation(metadata, &self.config, &output_stem, cookies);

        log::info!("⬇️ [DOWNLOAD] {}", metadata.search());
        if let Some(cover) = &metadata.cover_url {
            log::debug!("🖼️ [DOWNLOAD] Catalog artwork: {}", cover);
        }
        ItemState::Downloading.log(metadata.search());

        let reporter = ProgressReporter::start(metadata.search());
        let primary = tokio::time::timeout(
            self.config.attempt_timeout_duration(),
            self.tool.run(&invocation, Some(reporter.feed())),
        )
        .await;
        reporter.stop().await;

        let primary_ok = match primary {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                log::warn!("⚠️ [DOWNLOAD] Primary attempt failed for '{}': {}", metadata.search(), e);
                false
            }
            Err(_) => {
                log::warn!(
                    "⏱️ [DOWNLOAD] Primary attempt timed out after {}s for '{}'",
                    self.config.attempt_timeout,
                    metadata.search()
                );
                false
            }
        };

        let attempt = if primary_ok {
            Some(Attempt::Primary)
        } else {
            self.fallback
                .try_fallback(metadata, &output_stem, cookies)
                .await
                .map(Attempt::Fallback)
        };

        let outcome = match attempt {
            Some(attempt) => {
                log::info!("✅ [DOWNLOAD] {}", metadata.search());
                ItemState::Succeeded.log(metadata.search());
                DownloadOutcome::succeeded(attempt, output_stem)
            }
            None => {
                log::error!("❌ [DOWNLOAD] Giving up on '{}'", metadata.search());
                ItemState::Failed.log(metadata.search());
                DownloadOutcome::failed(output_stem)
            }
        };

        // applies on failure too
        if !self.cancel.load(Ordering::SeqCst) {
            tokio::time::sleep(self.config.tick_duration()).await;
        }
        outcome
    }
}
