use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use crate::errors::{AppError, Result};

/// Runtime settings for the download pipeline.
///
/// The value is immutable while a run is in progress. The settings flow
/// produces a new value through [`DownloadConfig::apply`] and persists it
/// with [`DownloadConfig::save_to`].
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct DownloadConfig {
    pub format: String,
    pub tick: u64,
    pub download_dir: PathBuf,
    pub media_type: MediaType,
    pub video_quality: String,
    pub audio_quality: String,
    pub attempt_timeout: u64,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub market: String,
    pub proxy: Option<String>,
    pub ytdlp_path: String,
    pub cookies: Option<PathBuf>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Audio,
    Video,
}

impl std::fmt::Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaType::Audio => write!(f, "audio"),
            MediaType::Video => write!(f, "video"),
        }
    }
}

impl std::str::FromStr for MediaType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "audio" => Ok(MediaType::Audio),
            "video" => Ok(MediaType::Video),
            other => Err(AppError::InvalidInput(format!(
                "Unknown media type '{}'. Use audio or video",
                other
            ))),
        }
    }
}

const SUPPORTED_FORMATS: [&str; 3] = ["mp3", "m4a", "opus"];

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            format: "mp3".to_string(),
            tick: 30,
            download_dir: default_download_dir(),
            media_type: MediaType::Audio,
            video_quality: "best".to_string(),
            audio_quality: "0".to_string(),
            attempt_timeout: 300,
            client_id: None,
            client_secret: None,
            market: "US".to_string(),
            proxy: None,
            ytdlp_path: "yt-dlp".to_string(),
            cookies: None,
        }
    }
}

fn default_download_dir() -> PathBuf {
    dirs::download_dir()
        .map(|dir| dir.join("tunefetch"))
        .unwrap_or_else(|| PathBuf::from("./downloads"))
}

impl DownloadConfig {
    /// Layers built-in defaults, the JSON file at `path` (if any) and
    /// `TUNEFETCH_*` environment variables.
    pub fn load_from(path: &Path) -> Result<Self> {
        let defaults = config::Config::try_from(&DownloadConfig::default())?;

        let settings = config::Config::builder()
            .add_source(defaults)
            .add_source(
                config::File::from(path)
                    .format(config::FileFormat::Json)
                    .required(false),
            )
            .add_source(config::Environment::with_prefix("TUNEFETCH"))
            .build()?;

        let config: DownloadConfig = settings.try_deserialize()?;
        log::info!("⚙️ [CONFIG] Loaded configuration (file: {:?})", path);
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(config_dir) = path.parent() {
            if !config_dir.as_os_str().is_empty() && !config_dir.exists() {
                std::fs::create_dir_all(config_dir)?;
            }
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        log::info!("💾 [CONFIG] Configuration saved to {:?}", path);
        Ok(())
    }

    pub fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().ok_or_else(|| {
            AppError::Config(config::ConfigError::Message(
                "Could not find config directory".to_string(),
            ))
        })?;

        Ok(config_dir.join("tunefetch").join("config.json"))
    }

    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs(self.tick)
    }

    pub fn attempt_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout)
    }

    /// Cookie jar handed to yt-dlp. Only a present, non-empty file counts.
    pub fn cookie_file(&self) -> Option<PathBuf> {
        let path = self.cookies.as_ref()?;
        match std::fs::metadata(path) {
            Ok(meta) if meta.is_file() && meta.len() > 0 => Some(path.clone()),
            _ => None,
        }
    }

    /// Returns a new configuration with `update` applied, or an error if any
    /// field is out of range. `self` is left untouched either way.
    pub fn apply(&self, update: SettingsUpdate) -> Result<DownloadConfig> {
        let mut config = self.clone();

        if let Some(media_type) = update.media_type {
            config.media_type = media_type;
        }

        if let Some(format) = update.format {
            let format = format.trim().to_lowercase();
            if !SUPPORTED_FORMATS.contains(&format.as_str()) {
                return Err(AppError::InvalidInput(format!(
                    "Unsupported audio format '{}'. Use one of: {}",
                    format,
                    SUPPORTED_FORMATS.join(", ")
                )));
            }
            config.format = format;
        }

        if let Some(quality) = update.audio_quality {
            let quality = quality.trim().to_string();
            match quality.parse::<u8>() {
                Ok(q) if q <= 9 => config.audio_quality = quality,
                _ => {
                    return Err(AppError::InvalidInput(
                        "Audio quality must be a number from 0 (best) to 9".to_string(),
                    ))
                }
            }
        }

        if let Some(quality) = update.video_quality {
            if quality.trim().is_empty() {
                return Err(AppError::InvalidInput("Video quality cannot be empty".to_string()));
            }
            config.video_quality = quality.trim().to_string();
        }

        if let Some(tick) = update.tick {
            if !(1..=999).contains(&tick) {
                return Err(AppError::InvalidInput(
                    "Tick must be between 1 and 999 seconds".to_string(),
                ));
            }
            config.tick = tick;
        }

        if let Some(timeout) = update.attempt_timeout {
            if timeout == 0 {
                return Err(AppError::InvalidInput("Attempt timeout must be positive".to_string()));
            }
            config.attempt_timeout = timeout;
        }

        if let Some(dir) = update.download_dir {
            if dir.as_os_str().is_empty() {
                return Err(AppError::InvalidInput("Download directory cannot be empty".to_string()));
            }
            config.download_dir = dir;
        }

        if let Some(client_id) = update.client_id {
            config.client_id = Some(client_id);
        }

        if let Some(client_secret) = update.client_secret {
            config.client_secret = Some(client_secret);
        }

        if let Some(market) = update.market {
            config.market = market.trim().to_uppercase();
        }

        if let Some(proxy) = update.proxy {
            config.proxy = if proxy.trim().is_empty() { None } else { Some(proxy) };
        }

        if let Some(cookies) = update.cookies {
            config.cookies = if cookies.as_os_str().is_empty() { None } else { Some(cookies) };
        }

        Ok(config)
    }

    /// Restores the download settings to their defaults while keeping
    /// credentials, network and tool settings.
    pub fn reset_defaults(&self) -> DownloadConfig {
        let defaults = DownloadConfig::default();
        DownloadConfig {
            format: defaults.format,
            tick: defaults.tick,
            download_dir: defaults.download_dir,
            media_type: defaults.media_type,
            video_quality: defaults.video_quality,
            audio_quality: defaults.audio_quality,
            ..self.clone()
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct SettingsUpdate {
    pub format: Option<String>,
    pub tick: Option<u64>,
    pub download_dir: Option<PathBuf>,
    pub media_type: Option<MediaType>,
    pub video_quality: Option<String>,
    pub audio_quality: Option<String>,
    pub attempt_timeout: Option<u64>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub market: Option<String>,
    pub proxy: Option<String>,
    pub cookies: Option<PathBuf>,
}

impl SettingsUpdate {
    /// Builds a single-field update from a `key value` pair given on the
    /// command line.
    pub fn from_key_value(key: &str, value: &str) -> Result<Self> {
        let mut update = SettingsUpdate::default();
        let parse_secs = |v: &str| {
            v.trim()
                .parse::<u64>()
                .map_err(|_| AppError::InvalidInput(format!("'{}' is not a number of seconds", v)))
        };

        match key {
            "format" => update.format = Some(value.to_string()),
            "tick" => update.tick = Some(parse_secs(value)?),
            "download_dir" => update.download_dir = Some(PathBuf::from(value)),
            "media_type" => update.media_type = Some(value.parse()?),
            "video_quality" => update.video_quality = Some(value.to_string()),
            "audio_quality" => update.audio_quality = Some(value.to_string()),
            "attempt_timeout" => update.attempt_timeout = Some(parse_secs(value)?),
            "client_id" => update.client_id = Some(value.to_string()),
            "client_secret" => update.client_secret = Some(value.to_string()),
            "market" => update.market = Some(value.to_string()),
            "proxy" => update.proxy = Some(value.to_string()),
            "cookies" => update.cookies = Some(PathBuf::from(value)),
            other => {
                return Err(AppError::InvalidInput(format!("Unknown setting '{}'", other)));
            }
        }

        Ok(update)
    }
}
