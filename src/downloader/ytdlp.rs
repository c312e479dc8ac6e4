use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use crate::api::TrackMetadata;
use crate::config::{DownloadConfig, MediaType};
use crate::errors::{AppError, Result};
use super::progress::ProgressFeed;
use super::{MediaTool, ToolInvocation};

const TITLE_LOOKUP_TIMEOUT: Duration = Duration::from_secs(15);
const VERSION_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

/// yt-dlp driven as a child process.
pub struct YtDlp {
    binary: String,
}

impl YtDlp {
    pub fn new(binary: impl Into<String>) -> Self {
        Self { binary: binary.into() }
    }

    /// `yt-dlp --version`; the program cannot do anything without it.
    pub async fn check_available(&self) -> Result<String> {
        let missing = |detail: String| AppError::ToolMissing(format!("{} ({})", self.binary, detail));

        let output = tokio::time::timeout(
            VERSION_CHECK_TIMEOUT,
            Command::new(&self.binary)
                .arg("--version")
                .stdin(Stdio::null())
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| missing("version check timed out".to_string()))?
        .map_err(|e| missing(e.to_string()))?;

        if !output.status.success() {
            return Err(missing(format!("exited with {}", output.status)));
        }

        let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
        log::info!("✅ [YTDLP] Found yt-dlp {}", version);
        Ok(version)
    }
}

/// ffmpeg is needed for extraction and tagging but a missing binary only
/// degrades output, so callers warn instead of failing.
pub async fn ffmpeg_available() -> bool {
    let check = tokio::time::timeout(
        VERSION_CHECK_TIMEOUT,
        Command::new("ffmpeg")
            .arg("-version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status(),
    )
    .await;

    matches!(check, Ok(Ok(status)) if status.success())
}

#[async_trait]
impl MediaTool for YtDlp {
    async fn run(&self, invocation: &ToolInvocation, progress: Option<&ProgressFeed>) -> Result<()> {
        log::debug!("🚀 [YTDLP] {} {}", self.binary, invocation.command_line().join(" "));

        let mut child = Command::new(&self.binary)
            .args(invocation.command_line())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AppError::Process(format!("failed to start {}: {}", self.binary, e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AppError::Process("yt-dlp stdout not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| AppError::Process("yt-dlp stderr not captured".to_string()))?;

        let mut out_lines = BufReader::new(stdout).split(b'\n');
        let mut err_lines = BufReader::new(stderr).split(b'\n');
        let (mut out_open, mut err_open) = (true, true);
        let mut last_error: Option<String> = None;

        while out_open || err_open {
            tokio::select! {
                segment = out_lines.next_segment(), if out_open => match segment? {
                    Some(bytes) => {
                        let line = String::from_utf8_lossy(&bytes);
                        if let Some(feed) = progress {
                            feed.observe(&line);
                        }
                    }
                    None => out_open = false,
                },
                segment = err_lines.next_segment(), if err_open => match segment? {
                    Some(bytes) => {
                        let line = String::from_utf8_lossy(&bytes).trim_end().to_string();
                        if let Some(feed) = progress {
                            feed.observe(&line);
                        }
                        if line.starts_with("ERROR") {
                            log::debug!("❌ [YTDLP] {}", line);
                            last_error = Some(line);
                        }
                    }
                    None => err_open = false,
                },
            }
        }

        let status = child.wait().await?;
        if status.success() {
            Ok(())
        } else {
            Err(AppError::Process(format!(
                "yt-dlp exited with {}{}",
                status,
                last_error.map(|e| format!(": {}", e)).unwrap_or_default()
            )))
        }
    }

    async fn print_title(&self, target: &str) -> Option<String> {
        let lookup = Command::new(&self.binary)
            .args(["--print", "title", "--no-warnings", target])
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        match tokio::time::timeout(TITLE_LOOKUP_TIMEOUT, lookup).await {
            Ok(Ok(output)) if output.status.success() => String::from_utf8_lossy(&output.stdout)
                .lines()
                .map(str::trim)
                .find(|l| !l.is_empty())
                .map(str::to_string),
            Ok(Ok(output)) => {
                log::debug!("title lookup for {} exited with {}", target, output.status);
                None
            }
            Ok(Err(e)) => {
                log::debug!("title lookup for {} failed to start: {}", target, e);
                None
            }
            Err(_) => {
                log::warn!("⏱️ [YTDLP] Title lookup timed out for {}", target);
                None
            }
        }
    }
}

/// `{folder}/{stem}.%(ext)s`
pub fn output_template(folder: &Path, stem: &str) -> String {
    folder.join(format!("{}.%(ext)s", stem)).to_string_lossy().into_owned()
}

fn with_cookies(invocation: ToolInvocation, cookies: Option<&Path>) -> ToolInvocation {
    match cookies {
        Some(path) => invocation.flag("--cookies", path.to_string_lossy()),
        None => invocation,
    }
}

fn with_audio_extraction(invocation: ToolInvocation, config: &DownloadConfig) -> ToolInvocation {
    invocation
        .arg("--extract-audio")
        .flag("--audio-format", &config.format)
        .flag("--audio-quality", &config.audio_quality)
}

/// Full primary download for a catalog track: best search hit, extracted
/// audio, catalog tags and track position.
pub fn primary_invocation(
    metadata: &TrackMetadata,
    config: &DownloadConfig,
    output_stem: &Path,
    cookies: Option<&Path>,
) -> ToolInvocation {
    let output = format!("{}.%(ext)s", output_stem.to_string_lossy());

    let mut invocation = with_audio_extraction(
        ToolInvocation::new(format!("ytsearch1:{}", metadata.search())),
        config,
    )
    .arg("--embed-metadata")
    .arg("--embed-thumbnail")
    .flag("--output", output)
    .arg("--ignore-errors")
    .arg("--no-overwrites")
    .arg("--newline")
    .flag("--concurrent-fragments", "3")
    .flag("--socket-timeout", "15")
    .flag("--retries", "5")
    .flag("--fragment-retries", "5")
    .flag("--throttled-rate", "100K");

    invocation = with_cookies(invocation, cookies);
    with_catalog_tags(invocation, metadata)
}

/// Catalog tags are written by ffmpeg directly, so the values are never
/// interpreted as yt-dlp field names or output templates.
fn with_catalog_tags(invocation: ToolInvocation, metadata: &TrackMetadata) -> ToolInvocation {
    let mut tags = vec![
        ("title", metadata.title.clone()),
        ("artist", metadata.artist.clone()),
        ("album", metadata.album.clone()),
        ("date", metadata.release_date.clone()),
    ];
    if !metadata.genre.is_empty() {
        tags.push(("genre", metadata.genre.clone()));
    }
    tags.push((
        "track",
        format!("{}/{}", metadata.track_number, metadata.track_count),
    ));

    let ffmpeg_args: Vec<String> = tags
        .iter()
        .map(|(key, value)| format!("-metadata {}", shell_quote(&format!("{}={}", key, value))))
        .collect();

    invocation
        .arg("--add-metadata")
        .flag("--postprocessor-args", format!("ffmpeg:{}", ffmpeg_args.join(" ")))
}

/// yt-dlp splits postprocessor arguments with POSIX shell rules.
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\"'\"'"))
}

/// Lean retry for one alternative search term. Writes to the same output
/// path as the primary attempt.
pub fn fallback_invocation(
    term: &str,
    config: &DownloadConfig,
    output_stem: &Path,
    cookies: Option<&Path>,
) -> ToolInvocation {
    let invocation = with_audio_extraction(ToolInvocation::new(format!("ytsearch1:{}", term)), config)
        .arg("--embed-metadata")
        .arg("--embed-thumbnail")
        .flag("--output", format!("{}.%(ext)s", output_stem.to_string_lossy()))
        .arg("--ignore-errors");

    with_cookies(invocation, cookies)
}

fn with_media_flags(invocation: ToolInvocation, config: &DownloadConfig) -> ToolInvocation {
    match config.media_type {
        MediaType::Audio => with_audio_extraction(invocation, config)
            .arg("--embed-metadata")
            .arg("--embed-thumbnail"),
        MediaType::Video => invocation.flag("--format", &config.video_quality),
    }
}

/// Single URL or `ytsearch1:` target, honouring the configured media type.
pub fn url_invocation(
    target: &str,
    config: &DownloadConfig,
    folder: &Path,
    stem: &str,
    cookies: Option<&Path>,
) -> ToolInvocation {
    let invocation = ToolInvocation::new(target)
        .flag("--output", output_template(folder, stem))
        .arg("--ignore-errors")
        .arg("--no-overwrites")
        .arg("--newline");

    with_cookies(with_media_flags(invocation, config), cookies)
}

/// Whole video-site playlist; yt-dlp names the subfolder after the playlist.
pub fn video_playlist_invocation(
    url: &str,
    config: &DownloadConfig,
    folder: &Path,
    cookies: Option<&Path>,
) -> ToolInvocation {
    let template = folder
        .join("%(playlist_title)s")
        .join("%(title)s.%(ext)s")
        .to_string_lossy()
        .into_owned();

    let invocation = ToolInvocation::new(url)
        .arg("--yes-playlist")
        .flag("--output", template)
        .arg("--ignore-errors")
        .arg("--no-overwrites")
        .arg("--newline");

    with_cookies(with_media_flags(invocation, config), cookies)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn believer() -> TrackMetadata {
        TrackMetadata::new(
            "Believer",
            &["Imagine Dragons"],
            "Evolve",
            3,
            12,
            "2017-06-23",
            &["pop".to_string(), "rock".to_string()],
            None,
        )
    }

    fn ffmpeg_tags(inv: &ToolInvocation) -> &str {
        inv.value_of("--postprocessor-args").unwrap()
    }

    #[test]
    fn primary_targets_best_search_hit_with_tags() {
        let config = DownloadConfig::default();
        let stem = PathBuf::from("/music/Singles/Imagine Dragons - Believer");
        let inv = primary_invocation(&believer(), &config, &stem, None);

        assert_eq!(inv.target, "ytsearch1:Imagine Dragons - Believer");
        assert!(inv.has_arg("--extract-audio"));
        assert_eq!(inv.value_of("--audio-format"), Some("mp3"));
        assert_eq!(inv.value_of("--audio-quality"), Some("0"));
        assert_eq!(
            inv.value_of("--output"),
            Some("/music/Singles/Imagine Dragons - Believer.%(ext)s")
        );
        assert_eq!(inv.value_of("--throttled-rate"), Some("100K"));
        assert_eq!(inv.value_of("--concurrent-fragments"), Some("3"));
        assert_eq!(
            ffmpeg_tags(&inv),
            "ffmpeg:-metadata 'title=Believer' -metadata 'artist=Imagine Dragons' \
             -metadata 'album=Evolve' -metadata 'date=2017-06-23' \
             -metadata 'genre=pop;rock' -metadata 'track=3/12'"
        );
        assert!(inv.has_arg("--add-metadata"));
        assert!(!inv.has_arg("--parse-metadata"));
        assert!(!inv.has_arg("--cookies"));
    }

    #[test]
    fn empty_genre_is_not_tagged() {
        let metadata = TrackMetadata::new("Song", &["Artist"], "Album", 1, 1, "2020", &[], None);
        let inv = primary_invocation(&metadata, &DownloadConfig::default(), Path::new("out"), None);
        assert!(!ffmpeg_tags(&inv).contains("genre="));
    }

    #[test]
    fn single_words_and_percent_signs_are_passed_literally() {
        let metadata = TrackMetadata::new("100% Pure Love", &["Queen"], "Evolve", 1, 1, "2020", &[], None);
        let inv = primary_invocation(&metadata, &DownloadConfig::default(), Path::new("out"), None);
        let tags = ffmpeg_tags(&inv);

        assert!(tags.contains("-metadata 'title=100% Pure Love'"));
        assert!(tags.contains("-metadata 'artist=Queen'"));
        assert!(tags.contains("-metadata 'album=Evolve'"));
    }

    #[test]
    fn quotes_and_colons_survive_quoting() {
        let metadata = TrackMetadata::new("Don't Stop: Live", &["Artist"], "Album", 1, 1, "2020", &[], None);
        let inv = primary_invocation(&metadata, &DownloadConfig::default(), Path::new("out"), None);
        assert!(ffmpeg_tags(&inv).contains("-metadata 'title=Don'\"'\"'t Stop: Live'"));
    }

    #[test]
    fn cookies_are_passed_when_given() {
        let cookies = PathBuf::from("/tmp/cookies.txt");
        let inv = fallback_invocation("x lyrics", &DownloadConfig::default(), Path::new("out"), Some(&cookies));
        assert_eq!(inv.value_of("--cookies"), Some("/tmp/cookies.txt"));
        assert_eq!(inv.target, "ytsearch1:x lyrics");
        assert!(!inv.has_arg("--newline"));
    }

    #[test]
    fn url_invocation_follows_media_type() {
        let mut config = DownloadConfig::default();
        let folder = Path::new("/music/URLs");

        let audio = url_invocation("https://example.com/v", &config, folder, "Clip", None);
        assert!(audio.has_arg("--extract-audio"));
        assert!(audio.has_arg("--embed-thumbnail"));
        assert_eq!(audio.value_of("--output"), Some("/music/URLs/Clip.%(ext)s"));

        config.media_type = MediaType::Video;
        config.video_quality = "bestvideo+bestaudio".to_string();
        let video = url_invocation("https://example.com/v", &config, folder, "Clip", None);
        assert!(!video.has_arg("--extract-audio"));
        assert_eq!(video.value_of("--format"), Some("bestvideo+bestaudio"));
    }

    #[test]
    fn video_playlist_uses_playlist_title_folder() {
        let inv = video_playlist_invocation(
            "https://www.youtube.com/playlist?list=PL123",
            &DownloadConfig::default(),
            Path::new("/music/URLs"),
            None,
        );
        assert!(inv.has_arg("--yes-playlist"));
        assert_eq!(
            inv.value_of("--output"),
            Some("/music/URLs/%(playlist_title)s/%(title)s.%(ext)s")
        );
    }

    #[tokio::test]
    async fn missing_binary_is_reported() {
        let tool = YtDlp::new("/nonexistent/yt-dlp-binary");
        assert!(matches!(tool.check_available().await, Err(AppError::ToolMissing(_))));
        assert_eq!(tool.print_title("https://example.com").await, None);
    }
}
