use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::api::http_pool::HttpPool;
use crate::api::{PlaylistFetch, PlaylistItem, SearchResponse, TokenResponse, TrackMetadata, TrackObject, Paging};
use crate::config::DownloadConfig;
use crate::errors::{AppError, Result};

const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const API_BASE: &str = "https://api.spotify.com/v1";
const PLAYLIST_PAGE_SIZE: u32 = 50;
const DEFAULT_TOKEN_LIFETIME: u64 = 3600;
const TOKEN_EXPIRY_MARGIN: u64 = 60;

/// Raw HTTP access to the catalog.
#[async_trait]
pub trait CatalogTransport: Send + Sync {
    async fn request_token(&self, client_id: &str, client_secret: &str) -> Result<TokenResponse>;
    async fn get_json(&self, url: &str, token: &str, query: &[(&str, String)]) -> Result<Value>;
}

pub struct HttpTransport {
    pool: HttpPool,
}

impl HttpTransport {
    pub fn new(pool: HttpPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CatalogTransport for HttpTransport {
    async fn request_token(&self, client_id: &str, client_secret: &str) -> Result<TokenResponse> {
        let response = self.pool
            .get_client()
            .post(TOKEN_URL)
            .basic_auth(client_id, Some(client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AppError::Auth(format!("token endpoint returned {}", response.status())));
        }

        Ok(response.json().await?)
    }

    async fn get_json(&self, url: &str, token: &str, query: &[(&str, String)]) -> Result<Value> {
        let response = self.pool
            .get_client()
            .get(url)
            .bearer_auth(token)
            .query(query)
            .send()
            .await?;

        match response.status() {
            reqwest::StatusCode::UNAUTHORIZED => {
                Err(AppError::Auth("catalog rejected the access token".to_string()))
            }
            reqwest::StatusCode::NOT_FOUND => Err(AppError::NotFound(url.to_string())),
            _ => Ok(response.error_for_status()?.json().await?),
        }
    }
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// Spotify Web API client: client-credentials auth, track search and
/// playlist enumeration.
pub struct SpotifyClient {
    transport: Arc<dyn CatalogTransport>,
    credentials: Option<(String, String)>,
    market: String,
    token: Mutex<Option<CachedToken>>,
}

impl SpotifyClient {
    pub fn new(transport: Arc<dyn CatalogTransport>, config: &DownloadConfig) -> Self {
        let credentials = match (&config.client_id, &config.client_secret) {
            (Some(id), Some(secret)) if !id.is_empty() && !secret.is_empty() => {
                Some((id.clone(), secret.clone()))
            }
            _ => None,
        };

        Self {
            transport,
            credentials,
            market: config.market.clone(),
            token: Mutex::new(None),
        }
    }

    /// Builds a client backed by a real HTTP connection pool.
    pub fn from_config(config: &DownloadConfig) -> Result<Self> {
        let mut pool = HttpPool::new(4, 15)?;
        if let Some(proxy) = &config.proxy {
            pool = pool.with_proxy(proxy)?;
        }
        Ok(Self::new(Arc::new(HttpTransport::new(pool)), config))
    }

    /// Returns a bearer token, reusing the cached one until shortly before
    /// it expires.
    pub async fn get_token(&self) -> Result<String> {
        let mut cached = self.token.lock().await;

        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.expires_at {
                return Ok(token.value.clone());
            }
            log::debug!("🔑 [CATALOG] Cached token expired, refreshing");
        }

        let (client_id, client_secret) = self.credentials.as_ref().ok_or_else(|| {
            AppError::Auth("Spotify client_id/client_secret are not configured".to_string())
        })?;

        let response = self.transport
            .request_token(client_id, client_secret)
            .await
            .map_err(|e| match e {
                AppError::Auth(_) => e,
                other => AppError::Auth(other.to_string()),
            })?;

        let lifetime = response.expires_in.unwrap_or(DEFAULT_TOKEN_LIFETIME);
        let valid_for = Duration::from_secs(lifetime.saturating_sub(TOKEN_EXPIRY_MARGIN));
        *cached = Some(CachedToken {
            value: response.access_token.clone(),
            expires_at: Instant::now() + valid_for,
        });

        log::info!("🔑 [CATALOG] Obtained access token (valid for {}s)", lifetime);
        Ok(response.access_token)
    }

    /// Looks up the best catalog match for `query`.
    pub async fn search_track(&self, query: &str) -> Result<TrackMetadata> {
        let token = self.get_token().await?;
        let url = format!("{}/search", API_BASE);
        let params = [
            ("q", query.to_string()),
            ("type", "track".to_string()),
            ("limit", "1".to_string()),
            ("market", self.market.clone()),
        ];

        log::info!("🔍 [CATALOG] Searching track: '{}'", query);
        let json = self.authorized_get(&url, &token, &params).await?;
        let response: SearchResponse = serde_json::from_value(json)?;

        match response.tracks.items.into_iter().next() {
            Some(track) => {
                let metadata = TrackMetadata::from(track);
                log::info!("✅ [CATALOG] Matched: {}", metadata.search());
                Ok(metadata)
            }
            None => Err(AppError::NotFound(format!("no catalog match for '{}'", query))),
        }
    }

    /// Enumerates every track of a playlist, following the server's `next`
    /// cursor. Episodes, removed tracks and undecodable items are skipped.
    pub async fn fetch_playlist_tracks(&self, playlist_id: &str) -> Result<PlaylistFetch> {
        self.get_token().await?;

        let mut fetch = PlaylistFetch::default();
        let mut url = format!("{}/playlists/{}/tracks", API_BASE, playlist_id);
        let mut params = vec![
            ("limit", PLAYLIST_PAGE_SIZE.to_string()),
            ("market", self.market.clone()),
        ];
        let mut page_number = 1;

        loop {
            let page = match self.fetch_page(&url, &params).await {
                Ok(page) => page,
                Err(e) => {
                    log::error!(
                        "❌ [CATALOG] Playlist {} page {} failed, keeping {} tracks: {}",
                        playlist_id, page_number, fetch.tracks.len(), e
                    );
                    fetch.truncated = true;
                    break;
                }
            };

            let before = fetch.tracks.len();
            fetch.tracks.extend(page.items.into_iter().filter_map(track_from_item));
            log::debug!(
                "📄 [CATALOG] Page {}: {} tracks",
                page_number,
                fetch.tracks.len() - before
            );

            match page.next {
                Some(next) => {
                    url = next;
                    params.clear();
                    page_number += 1;
                }
                None => break,
            }
        }

        log::info!(
            "📋 [CATALOG] Playlist {}: {} tracks over {} page(s){}",
            playlist_id,
            fetch.tracks.len(),
            page_number,
            if fetch.truncated { " (truncated)" } else { "" }
        );
        Ok(fetch)
    }

    async fn fetch_page(&self, url: &str, params: &[(&str, String)]) -> Result<Paging<PlaylistItem>> {
        let token = self.get_token().await?;
        let json = self.authorized_get(url, &token, params).await?;
        Ok(serde_json::from_value(json)?)
    }

    /// A rejected token is dropped so the next request fetches a fresh one.
    async fn authorized_get(&self, url: &str, token: &str, params: &[(&str, String)]) -> Result<Value> {
        let result = self.transport.get_json(url, token, params).await;
        if let Err(AppError::Auth(_)) = &result {
            log::warn!("🔑 [CATALOG] Access token rejected, discarding it");
            *self.token.lock().await = None;
        }
        result
    }
}

fn track_from_item(item: PlaylistItem) -> Option<TrackMetadata> {
    let track = item.track?;
    if track.get("type").and_then(Value::as_str) != Some("track") {
        return None;
    }

    match serde_json::from_value::<TrackObject>(track) {
        Ok(track) => Some(TrackMetadata::from(track)),
        Err(e) => {
            log::debug!("⚠️ [CATALOG] Skipping undecodable playlist item: {}", e);
            None
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scripted catalog: serves queued responses in order and records calls.
    pub(crate) struct FakeTransport {
        pub token_requests: AtomicUsize,
        pub token_lifetime: u64,
        pub fail_auth: bool,
        pub responses: std::sync::Mutex<VecDeque<Result<Value>>>,
        pub calls: std::sync::Mutex<Vec<(String, Vec<(String, String)>)>>,
    }

    impl FakeTransport {
        pub(crate) fn new(responses: Vec<Result<Value>>) -> Self {
            Self {
                token_requests: AtomicUsize::new(0),
                token_lifetime: 3600,
                fail_auth: false,
                responses: std::sync::Mutex::new(responses.into()),
                calls: std::sync::Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl CatalogTransport for FakeTransport {
        async fn request_token(&self, _client_id: &str, _client_secret: &str) -> Result<TokenResponse> {
            self.token_requests.fetch_add(1, Ordering::SeqCst);
            if self.fail_auth {
                return Err(AppError::Auth("invalid_client".to_string()));
            }
            Ok(TokenResponse {
                access_token: "token".to_string(),
                expires_in: Some(self.token_lifetime),
            })
        }

        async fn get_json(&self, url: &str, _token: &str, query: &[(&str, String)]) -> Result<Value> {
            self.calls.lock().unwrap().push((
                url.to_string(),
                query.iter().map(|(k, v)| (k.to_string(), v.clone())).collect(),
            ));
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(AppError::Process("no scripted response".to_string())))
        }
    }

    pub(crate) fn test_config() -> DownloadConfig {
        DownloadConfig {
            client_id: Some("id".to_string()),
            client_secret: Some("secret".to_string()),
            ..DownloadConfig::default()
        }
    }

    pub(crate) fn wire_track(name: &str, artists: &[&str]) -> Value {
        json!({
            "type": "track",
            "name": name,
            "track_number": 1,
            "artists": artists.iter().map(|a| json!({ "name": a })).collect::<Vec<_>>(),
            "album": { "name": "Album", "total_tracks": 10, "release_date": "2020-01-01", "images": [] }
        })
    }

    pub(crate) fn search_page(tracks: Vec<Value>) -> Value {
        json!({ "tracks": { "items": tracks, "next": null } })
    }

    fn playlist_page(items: Vec<Value>, next: Option<&str>) -> Value {
        json!({ "items": items, "next": next })
    }

    #[tokio::test]
    async fn search_returns_first_hit_with_joined_artists() {
        let transport = Arc::new(FakeTransport::new(vec![Ok(search_page(vec![
            wire_track("Believer", &["Imagine Dragons"]),
            wire_track("Other", &["Someone"]),
        ]))]));
        let client = SpotifyClient::new(transport.clone(), &test_config());

        let track = client.search_track("believer").await.unwrap();
        assert_eq!(track.search(), "Imagine Dragons - Believer");

        let calls = transport.calls.lock().unwrap();
        let (url, query) = &calls[0];
        assert!(url.ends_with("/search"));
        assert!(query.contains(&("limit".to_string(), "1".to_string())));
        assert!(query.contains(&("type".to_string(), "track".to_string())));
        assert!(query.contains(&("market".to_string(), "US".to_string())));
    }

    #[tokio::test]
    async fn search_joins_multiple_artists() {
        let transport = Arc::new(FakeTransport::new(vec![Ok(search_page(vec![wire_track(
            "Stay",
            &["The Kid LAROI", "Justin Bieber"],
        )]))]));
        let client = SpotifyClient::new(transport, &test_config());

        let track = client.search_track("stay").await.unwrap();
        assert_eq!(track.artist, "The Kid LAROI, Justin Bieber");
        assert_eq!(track.search(), "The Kid LAROI, Justin Bieber - Stay");
    }

    #[tokio::test]
    async fn empty_search_is_not_found() {
        let transport = Arc::new(FakeTransport::new(vec![Ok(search_page(vec![]))]));
        let client = SpotifyClient::new(transport, &test_config());

        assert!(matches!(client.search_track("nothing").await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn missing_credentials_is_auth_error() {
        let transport = Arc::new(FakeTransport::new(vec![]));
        let client = SpotifyClient::new(transport.clone(), &DownloadConfig::default());

        assert!(matches!(client.get_token().await, Err(AppError::Auth(_))));
        assert_eq!(transport.token_requests.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn rejected_credentials_are_auth_error() {
        let mut transport = FakeTransport::new(vec![]);
        transport.fail_auth = true;
        let client = SpotifyClient::new(Arc::new(transport), &test_config());

        assert!(matches!(client.search_track("x").await, Err(AppError::Auth(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn token_is_cached_until_expiry() {
        let mut transport = FakeTransport::new(vec![
            Ok(search_page(vec![wire_track("A", &["X"])])),
            Ok(search_page(vec![wire_track("B", &["X"])])),
            Ok(search_page(vec![wire_track("C", &["X"])])),
        ]);
        transport.token_lifetime = 120;
        let transport = Arc::new(transport);
        let client = SpotifyClient::new(transport.clone(), &test_config());

        client.search_track("a").await.unwrap();
        client.search_track("b").await.unwrap();
        assert_eq!(transport.token_requests.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(61)).await;
        client.search_track("c").await.unwrap();
        assert_eq!(transport.token_requests.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn rejected_access_token_is_refreshed_on_next_lookup() {
        let transport = Arc::new(FakeTransport::new(vec![
            Err(AppError::Auth("catalog rejected the access token".to_string())),
            Ok(search_page(vec![wire_track("Believer", &["Imagine Dragons"])])),
        ]));
        let client = SpotifyClient::new(transport.clone(), &test_config());

        assert!(matches!(client.search_track("believer").await, Err(AppError::Auth(_))));
        assert_eq!(transport.token_requests.load(Ordering::SeqCst), 1);

        client.search_track("believer").await.unwrap();
        assert_eq!(transport.token_requests.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn playlist_pagination_follows_next_and_filters_non_tracks() {
        let episode = json!({ "type": "episode", "name": "Podcast" });
        let transport = Arc::new(FakeTransport::new(vec![
            Ok(playlist_page(
                vec![
                    json!({ "track": wire_track("One", &["A"]) }),
                    json!({ "track": null }),
                    json!({ "track": wire_track("Two", &["B"]) }),
                ],
                Some("https://api.spotify.com/v1/playlists/abc/tracks?offset=50&limit=50"),
            )),
            Ok(playlist_page(
                vec![json!({ "track": episode }), json!({ "track": wire_track("Three", &["C"]) })],
                Some("https://api.spotify.com/v1/playlists/abc/tracks?offset=100&limit=50"),
            )),
            Ok(playlist_page(vec![json!({ "track": wire_track("Four", &["D"]) })], None)),
        ]));
        let client = SpotifyClient::new(transport.clone(), &test_config());

        let fetch = client.fetch_playlist_tracks("abc").await.unwrap();
        let titles: Vec<&str> = fetch.tracks.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["One", "Two", "Three", "Four"]);
        assert!(!fetch.truncated);

        let calls = transport.calls.lock().unwrap();
        assert_eq!(calls.len(), 3);
        assert!(calls[0].0.ends_with("/playlists/abc/tracks"));
        assert!(calls[0].1.contains(&("limit".to_string(), "50".to_string())));
        assert!(calls[1].0.contains("offset=50"));
        assert!(calls[1].1.is_empty());
        assert!(calls[2].1.is_empty());
    }

    #[tokio::test]
    async fn failing_page_truncates_and_keeps_earlier_tracks() {
        let transport = Arc::new(FakeTransport::new(vec![
            Ok(playlist_page(
                vec![json!({ "track": wire_track("One", &["A"]) })],
                Some("https://api.spotify.com/v1/playlists/abc/tracks?offset=50"),
            )),
            Err(AppError::Process("connection reset".to_string())),
        ]));
        let client = SpotifyClient::new(transport, &test_config());

        let fetch = client.fetch_playlist_tracks("abc").await.unwrap();
        assert_eq!(fetch.tracks.len(), 1);
        assert!(fetch.truncated);
    }

    #[tokio::test]
    async fn playlist_without_credentials_fails_before_paging() {
        let transport = Arc::new(FakeTransport::new(vec![]));
        let client = SpotifyClient::new(transport.clone(), &DownloadConfig::default());

        assert!(matches!(client.fetch_playlist_tracks("abc").await, Err(AppError::Auth(_))));
        assert!(transport.calls.lock().unwrap().is_empty());
    }
}
