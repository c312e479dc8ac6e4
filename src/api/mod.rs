pub mod http_pool;
pub mod spotify;

use serde::{Deserialize, Serialize};

/// Canonical track description resolved from the catalog.
///
/// `search` is derived once from the artists and title when the record is
/// built and is used verbatim as the query handed to yt-dlp.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TrackMetadata {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub track_number: u32,
    pub track_count: u32,
    pub release_date: String,
    pub genre: String,
    pub cover_url: Option<String>,
    search: String,
}

impl TrackMetadata {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        title: &str,
        artists: &[&str],
        album: &str,
        track_number: u32,
        track_count: u32,
        release_date: &str,
        genres: &[String],
        cover_url: Option<String>,
    ) -> Self {
        let artist = artists.join(", ");
        let search = format!("{} - {}", artist, title);

        let track_count = if track_number > track_count {
            log::warn!(
                "⚠️ [CATALOG] Track number {} exceeds album total {} for '{}', raising total",
                track_number, track_count, search
            );
            track_number
        } else {
            track_count
        };

        Self {
            title: title.to_string(),
            artist,
            album: album.to_string(),
            track_number,
            track_count,
            release_date: release_date.to_string(),
            genre: genres.join(";"),
            cover_url,
            search,
        }
    }

    /// `"{artists} - {title}"`, fixed at construction.
    pub fn search(&self) -> &str {
        &self.search
    }
}

/// Tracks enumerated from a playlist. `truncated` is set when pagination
/// stopped on an error before the server reported the last page.
#[derive(Debug, Clone, Default)]
pub struct PlaylistFetch {
    pub tracks: Vec<TrackMetadata>,
    pub truncated: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchResponse {
    pub tracks: Paging<TrackObject>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Paging<T> {
    pub items: Vec<T>,
    #[serde(default)]
    pub next: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PlaylistItem {
    #[serde(default)]
    pub track: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TrackObject {
    pub name: String,
    pub artists: Vec<ArtistObject>,
    pub album: AlbumObject,
    pub track_number: u32,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ArtistObject {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AlbumObject {
    pub name: String,
    pub total_tracks: u32,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub images: Vec<ImageObject>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ImageObject {
    pub url: String,
}

impl From<TrackObject> for TrackMetadata {
    fn from(track: TrackObject) -> Self {
        let artists: Vec<&str> = track.artists.iter().map(|a| a.name.as_str()).collect();
        TrackMetadata::new(
            &track.name,
            &artists,
            &track.album.name,
            track.track_number,
            track.album.total_tracks,
            track.album.release_date.as_deref().unwrap_or(""),
            &track.album.genres,
            track.album.images.first().map(|image| image.url.clone()),
        )
    }
}
