pub mod batch;

use lazy_static::lazy_static;
use regex::Regex;

/// Prefixes of `list=` ids that yt-dlp can download as a playlist.
const VIDEO_PLAYLIST_PREFIXES: [&str; 2] = ["PL", "OLAK5uy_"];

lazy_static! {
    static ref CATALOG_PLAYLIST_PATTERNS: Vec<Regex> = vec![
        Regex::new(r"playlist/([a-zA-Z0-9]+)").unwrap(),
        Regex::new(r"spotify:playlist:([a-zA-Z0-9]+)").unwrap(),
    ];
    static ref LIST_PARAM: Regex = Regex::new(r"[?&]list=([a-zA-Z0-9_-]+)").unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IdSource {
    CatalogPath,
    ListParam,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaylistKind {
    /// Spotify playlist, enumerated track by track.
    Catalog,
    /// YouTube / YouTube Music playlist, handed to yt-dlp as a whole.
    VideoSite,
    Unrecognized,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistId {
    id: String,
    source: IdSource,
}

impl PlaylistId {
    pub fn as_str(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> PlaylistKind {
        match self.source {
            IdSource::CatalogPath => PlaylistKind::Catalog,
            IdSource::ListParam => {
                if VIDEO_PLAYLIST_PREFIXES.iter().any(|p| self.id.starts_with(p)) {
                    PlaylistKind::VideoSite
                } else {
                    PlaylistKind::Unrecognized
                }
            }
        }
    }
}

impl std::fmt::Display for PlaylistId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.id)
    }
}

/// Extracts a playlist id from an arbitrary URL. Catalog forms are tried
/// before the `list=` query parameter; the first capture wins.
pub fn extract_playlist_id(url: &str) -> Option<PlaylistId> {
    CATALOG_PLAYLIST_PATTERNS
        .iter()
        .find_map(|pattern| pattern.captures(url))
        .map(|caps| PlaylistId {
            id: caps[1].to_string(),
            source: IdSource::CatalogPath,
        })
        .or_else(|| extract_list_param(url))
}

/// Extracts only the `list=` query parameter.
pub fn extract_list_param(url: &str) -> Option<PlaylistId> {
    LIST_PARAM.captures(url).map(|caps| PlaylistId {
        id: caps[1].to_string(),
        source: IdSource::ListParam,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_param_with_pl_prefix_is_video_playlist() {
        let id = extract_playlist_id("https://www.youtube.com/playlist?list=PL123").unwrap();
        assert_eq!(id.as_str(), "PL123");
        assert_eq!(id.kind(), PlaylistKind::VideoSite);
    }

    #[test]
    fn album_playlist_prefix_is_video_playlist() {
        let id = extract_list_param(
            "https://music.youtube.com/watch?v=abc&list=OLAK5uy_kXyz-123_Q",
        )
        .unwrap();
        assert_eq!(id.as_str(), "OLAK5uy_kXyz-123_Q");
        assert_eq!(id.kind(), PlaylistKind::VideoSite);
    }

    #[test]
    fn unknown_list_prefix_is_not_a_playlist() {
        let id = extract_playlist_id("https://example.com/watch?v=1&list=abc").unwrap();
        assert_eq!(id.as_str(), "abc");
        assert_eq!(id.kind(), PlaylistKind::Unrecognized);

        // mixes are not downloadable playlists
        let mix = extract_list_param("https://www.youtube.com/watch?v=x&list=RDx").unwrap();
        assert_eq!(mix.kind(), PlaylistKind::Unrecognized);
    }

    #[test]
    fn catalog_urls_and_uris_are_recognised() {
        let id = extract_playlist_id(
            "https://open.spotify.com/playlist/37i9dQZF1DXcBWIGoYBM5M?si=4f2a",
        )
        .unwrap();
        assert_eq!(id.as_str(), "37i9dQZF1DXcBWIGoYBM5M");
        assert_eq!(id.kind(), PlaylistKind::Catalog);

        let uri = extract_playlist_id("spotify:playlist:37i9dQZF1DXcBWIGoYBM5M").unwrap();
        assert_eq!(uri.as_str(), "37i9dQZF1DXcBWIGoYBM5M");
        assert_eq!(uri.kind(), PlaylistKind::Catalog);
    }

    #[test]
    fn urls_without_playlist_markers_yield_nothing() {
        assert!(extract_playlist_id("https://www.youtube.com/watch?v=dQw4w9WgXcQ").is_none());
        assert!(extract_list_param("https://open.spotify.com/playlist/abc").is_none());
        assert!(extract_playlist_id("").is_none());
    }
}
