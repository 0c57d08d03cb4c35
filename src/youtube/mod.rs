use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::Config;
use crate::duration;
use crate::model::LikedVideo;
use crate::youtube::model::{TokenResponse, VideoItem, VideoListResponse};

pub mod model;

const YOUTUBE_API_BASE: &str = "https://www.googleapis.com/youtube/v3/";
const OAUTH_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

const TOKEN_TIMEOUT: Duration = Duration::from_secs(10);
const SNAPSHOT_TIMEOUT: Duration = Duration::from_secs(15);

/// Hard API cap for `videos.list` id batches.
const MAX_IDS_PER_REQUEST: usize = 50;

#[derive(Debug, Error)]
pub enum FetchError {
    /// The delegated-access credential was rejected. Terminal for this
    /// user until an out-of-band re-authorization stores a fresh token.
    #[error("refresh token rejected: {0}")]
    Credential(String),
    #[error("youtube api error {status}: {body}")]
    Api { status: StatusCode, body: String },
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
}

impl FetchError {
    pub fn is_credential(&self) -> bool {
        matches!(self, FetchError::Credential(_))
    }
}

/// Source of a user's current liked-videos snapshot. The poller only
/// depends on this trait; tests substitute a scripted fake.
#[async_trait]
pub trait LikesFeed: Send + Sync {
    async fn fetch_liked(&self, refresh_token: &str) -> Result<Vec<LikedVideo>, FetchError>;
}

#[derive(Clone)]
pub struct YouTubeClient {
    http: Client,
    videos_url: Url,
    token_url: Url,
    api_key: String,
    client_id: String,
    client_secret: String,
    page_size: u32,
}

impl fmt::Debug for YouTubeClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("YouTubeClient")
            .field("videos_url", &self.videos_url)
            .finish_non_exhaustive()
    }
}

impl YouTubeClient {
    pub fn from_config(cfg: &Config) -> Self {
        let api_base = Url::parse(YOUTUBE_API_BASE).expect("valid default YouTube URL");
        let token_url = Url::parse(OAUTH_TOKEN_URL).expect("valid default token URL");
        Self::with_base_urls(cfg, api_base, token_url)
    }

    pub fn with_base_urls(cfg: &Config, api_base: Url, token_url: Url) -> Self {
        let http = Client::builder()
            .user_agent("yt-likesbot/0.1")
            .build()
            .expect("reqwest client");
        let videos_url = api_base.join("videos").expect("valid videos endpoint");
        Self {
            http,
            videos_url,
            token_url,
            api_key: cfg.youtube.api_key.clone(),
            client_id: cfg.youtube.client_id.clone(),
            client_secret: cfg.youtube.client_secret.clone(),
            page_size: cfg.youtube.page_size,
        }
    }

    /// Exchange the stored refresh token for a short-lived access token.
    /// A 4xx from the token endpoint is the canonical "token expired or
    /// revoked" signal and maps to [`FetchError::Credential`].
    async fn refresh_access_token(&self, refresh_token: &str) -> Result<String, FetchError> {
        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];
        let res = self
            .http
            .post(self.token_url.clone())
            .timeout(TOKEN_TIMEOUT)
            .form(&params)
            .send()
            .await?;

        let status = res.status();
        let body = res.text().await.unwrap_or_default();
        if status.is_client_error() {
            warn!(%status, "token refresh rejected");
            return Err(FetchError::Credential(body));
        }
        if !status.is_success() {
            return Err(FetchError::Api { status, body });
        }

        let payload: TokenResponse = serde_json::from_str(&body)
            .map_err(|_| FetchError::Api { status, body })?;
        payload
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| FetchError::Credential("token response had no access_token".into()))
    }

    async fn list_videos(&self, url: Url, bearer: Option<&str>) -> Result<Vec<VideoItem>, FetchError> {
        let mut req = self.http.get(url).timeout(SNAPSHOT_TIMEOUT);
        if let Some(token) = bearer {
            req = req.bearer_auth(token);
        }
        let res = req.send().await?;
        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(FetchError::Api { status, body });
        }
        let payload: VideoListResponse = res.json().await?;
        Ok(payload.items)
    }

    /// Fetch details for a list of video ids, chunked to the API cap.
    /// Uses the application API key, no delegated credential required.
    pub async fn video_details(&self, video_ids: &[String]) -> Result<Vec<LikedVideo>, FetchError> {
        if video_ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut videos = Vec::with_capacity(video_ids.len());
        for chunk in video_ids.chunks(MAX_IDS_PER_REQUEST) {
            let mut url = self.videos_url.clone();
            url.query_pairs_mut()
                .append_pair("part", "snippet,contentDetails")
                .append_pair("id", &chunk.join(","))
                .append_pair("key", &self.api_key);
            let items = self.list_videos(url, None).await?;
            videos.extend(items.into_iter().map(liked_video_from_item));
        }
        Ok(videos)
    }
}

#[async_trait]
impl LikesFeed for YouTubeClient {
    /// One page of the user's liked videos, newest first. Pagination is
    /// intentionally not followed: more than one page of fresh likes
    /// between two polls falls outside the window until the next cycle.
    async fn fetch_liked(&self, refresh_token: &str) -> Result<Vec<LikedVideo>, FetchError> {
        let access_token = self.refresh_access_token(refresh_token).await?;

        let mut url = self.videos_url.clone();
        url.query_pairs_mut()
            .append_pair("part", "snippet,contentDetails")
            .append_pair("myRating", "like")
            .append_pair("maxResults", &self.page_size.to_string());

        let items = self.list_videos(url, Some(&access_token)).await?;
        debug!(count = items.len(), "fetched liked snapshot");
        Ok(items.into_iter().map(liked_video_from_item).collect())
    }
}

fn liked_video_from_item(item: VideoItem) -> LikedVideo {
    let snippet = item.snippet;
    let duration_raw = item.content_details.and_then(|d| d.duration);
    let (title, published_at, channel_title, thumbnail_url) = match snippet {
        Some(s) => {
            let thumb = s.thumbnails.and_then(|t| {
                t.medium.map(|m| m.url).or_else(|| t.default.map(|d| d.url))
            });
            (s.title, s.published_at, s.channel_title, thumb)
        }
        None => (None, None, None, None),
    };
    // A missing duration counts as "not a Short"; the length filters in
    // the ledger make the same call.
    let is_short = duration_raw
        .as_deref()
        .map(duration::is_short)
        .unwrap_or(false);
    LikedVideo {
        video_id: item.id,
        title: title.unwrap_or_else(|| "Unknown title".to_string()),
        duration: duration_raw,
        published_at,
        channel_title,
        thumbnail_url,
        is_short,
    }
}
