use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::Config;
use crate::model::LikedVideo;

const FCM_SEND_URL: &str = "https://fcm.googleapis.com/fcm/send";

const SEND_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum PushError {
    /// The device token is permanently invalid; the holder must register
    /// a fresh one. Callers deactivate the user instead of retrying.
    #[error("device token is no longer registered")]
    Unregistered,
    #[error("fcm send timed out")]
    Timeout,
    #[error("fcm error {status}: {body}")]
    Api { status: StatusCode, body: String },
    #[error("network error: {0}")]
    Network(reqwest::Error),
}

impl PushError {
    pub fn is_permanent(&self) -> bool {
        matches!(self, PushError::Unregistered)
    }
}

impl From<reqwest::Error> for PushError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            PushError::Timeout
        } else {
            PushError::Network(err)
        }
    }
}

/// Data-only message so the Android client wakes its own handler instead
/// of relying on system notification rendering.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PushMessage {
    pub to: String,
    pub data: PushData,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PushData {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "videoIds")]
    pub video_ids: String,
    pub count: String,
    pub title: String,
    pub body: String,
}

/// Push-delivery seam. The real client talks to FCM; tests record calls.
#[async_trait]
pub trait PushTransport: Send + Sync {
    async fn send(&self, message: &PushMessage) -> Result<String, PushError>;
}

#[derive(Clone)]
pub struct FcmClient {
    http: Client,
    endpoint: Url,
    server_key: String,
}

impl fmt::Debug for FcmClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FcmClient")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    #[serde(default)]
    results: Vec<SendResult>,
}

#[derive(Debug, Deserialize)]
struct SendResult {
    message_id: Option<String>,
    error: Option<String>,
}

impl FcmClient {
    pub fn from_config(cfg: &Config) -> Self {
        let endpoint = Url::parse(FCM_SEND_URL).expect("valid default FCM URL");
        Self::with_endpoint(cfg, endpoint)
    }

    pub fn with_endpoint(cfg: &Config, endpoint: Url) -> Self {
        let http = Client::builder()
            .user_agent("yt-likesbot/0.1")
            .build()
            .expect("reqwest client");
        Self {
            http,
            endpoint,
            server_key: cfg.fcm.server_key.clone(),
        }
    }
}

#[async_trait]
impl PushTransport for FcmClient {
    async fn send(&self, message: &PushMessage) -> Result<String, PushError> {
        let res = self
            .http
            .post(self.endpoint.clone())
            .timeout(SEND_TIMEOUT)
            .header("Authorization", format!("key={}", self.server_key))
            .json(message)
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            warn!(%status, "fcm send failed");
            return Err(PushError::Api { status, body });
        }

        let body = res.text().await.unwrap_or_default();
        let payload: SendResponse = serde_json::from_str(&body)
            .map_err(|_| PushError::Api { status, body })?;
        let result = payload
            .results
            .into_iter()
            .next()
            .ok_or(PushError::Api {
                status,
                body: "empty results".into(),
            })?;

        if let Some(err) = result.error {
            // These two classes mean the token itself is dead.
            if err == "NotRegistered" || err == "InvalidRegistration" {
                return Err(PushError::Unregistered);
            }
            return Err(PushError::Api { status, body: err });
        }
        result.message_id.ok_or(PushError::Api {
            status,
            body: "missing message_id".into(),
        })
    }
}

/// Retry a send with linear backoff (`delay * attempt`). Permanent token
/// failures are not retried; the last error is re-raised when the budget
/// is exhausted.
pub async fn send_with_retry(
    transport: &dyn PushTransport,
    message: &PushMessage,
    max_attempts: u32,
    retry_delay: Duration,
) -> Result<String, PushError> {
    let mut last_err = None;
    for attempt in 1..=max_attempts.max(1) {
        match transport.send(message).await {
            Ok(message_id) => {
                info!(attempt, "fcm send succeeded");
                return Ok(message_id);
            }
            Err(err) if err.is_permanent() => return Err(err),
            Err(err) => {
                warn!(attempt, max_attempts, %err, "fcm send attempt failed");
                last_err = Some(err);
                if attempt < max_attempts {
                    tokio::time::sleep(retry_delay * attempt).await;
                }
            }
        }
    }
    Err(last_err.unwrap_or(PushError::Timeout))
}

/// One payload summarizes the whole batch: count plus a human-readable
/// body, never one message per video.
pub fn build_message(fcm_token: &str, videos: &[LikedVideo]) -> PushMessage {
    let video_ids: Vec<&str> = videos.iter().map(|v| v.video_id.as_str()).collect();
    let body = match videos {
        [only] => format!("\"{}\" is ready to download", only.title),
        _ => format!("{} new songs to download", videos.len()),
    };
    PushMessage {
        to: fcm_token.to_string(),
        data: PushData {
            kind: "new_likes".to_string(),
            video_ids: serde_json::to_string(&video_ids).unwrap_or_else(|_| "[]".to_string()),
            count: videos.len().to_string(),
            title: "New songs available!".to_string(),
            body,
        },
    }
}

/// Connectivity probe sent on demand from ops tooling.
pub fn build_test_message(fcm_token: &str) -> PushMessage {
    PushMessage {
        to: fcm_token.to_string(),
        data: PushData {
            kind: "test".to_string(),
            video_ids: "[]".to_string(),
            count: "0".to_string(),
            title: "yt-likesbot test".to_string(),
            body: "The backend is up and running".to_string(),
        },
    }
}
