use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use crate::api::TrackMetadata;
use crate::config::DownloadConfig;
use super::{ytdlp, ItemState, MediaTool};

/// Alternative search terms, most specific first.
pub fn fallback_terms(metadata: &TrackMetadata) -> [String; 3] {
    [
        format!("{} official audio", metadata.search()),
        format!("{} lyrics", metadata.search()),
        format!("{} {}", metadata.artist, metadata.title),
    ]
}

/// Retries a failed track under alternative search terms until one works.
pub struct FallbackEngine {
    tool: Arc<dyn MediaTool>,
    config: Arc<DownloadConfig>,
    cancel: Arc<AtomicBool>,
}

impl FallbackEngine {
    pub fn new(tool: Arc<dyn MediaTool>, config: Arc<DownloadConfig>, cancel: Arc<AtomicBool>) -> Self {
        Self { tool, config, cancel }
    }

    /// Returns the term that succeeded, or `None` once all are exhausted.
    /// Each attempt gets the full per-attempt timeout; a timed-out attempt
    /// is killed and counts as a failure. No new term is started once the
    /// run has been cancelled.
    pub async fn try_fallback(
        &self,
        metadata: &TrackMetadata,
        output_stem: &Path,
        cookies: Option<&Path>,
    ) -> Option<String> {
        ItemState::FallbackAttempting.log(metadata.search());

        for term in fallback_terms(metadata) {
            if self.cancel.load(Ordering::SeqCst) {
                log::info!("🛑 [FALLBACK] Cancelled before '{}'", term);
                return None;
            }
            log::info!("🔄 [FALLBACK] Trying '{}'", term);
            let invocation = ytdlp::fallback_invocation(&term, &self.config, output_stem, cookies);

            match tokio::time::timeout(
                self.config.attempt_timeout_duration(),
                self.tool.run(&invocation, None),
            )
            .await
            {
                Ok(Ok(())) => {
                    log::info!("✅ [FALLBACK] Downloaded with '{}'", term);
                    return Some(term);
                }
                Ok(Err(e)) => log::warn!("⚠️ [FALLBACK] '{}' failed: {}", term, e),
                Err(_) => log::warn!(
                    "⏱️ [FALLBACK] '{}' timed out after {}s",
                    term,
                    self.config.attempt_timeout
                ),
            }
        }

        log::error!("❌ [FALLBACK] All alternatives exhausted for '{}'", metadata.search());
        None
    }
}
