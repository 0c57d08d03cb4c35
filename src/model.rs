use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Lifecycle of a download work record. `Pending` is the only state this
/// service creates; the remaining transitions are owned by the download
/// worker that consumes the ledger.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DownloadStatus {
    Pending,
    Downloading,
    Completed,
    Error,
}

impl DownloadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DownloadStatus::Pending => "pending",
            DownloadStatus::Downloading => "downloading",
            DownloadStatus::Completed => "completed",
            DownloadStatus::Error => "error",
        }
    }

    pub fn parse_status(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(DownloadStatus::Pending),
            "downloading" => Some(DownloadStatus::Downloading),
            "completed" => Some(DownloadStatus::Completed),
            "error" => Some(DownloadStatus::Error),
            _ => None,
        }
    }
}

/// A registered user. `refresh_token` and `fcm_token` are `None` until the
/// client app completes authorization / token registration; `None` is
/// distinct from an empty string and both mean "cannot act for this user".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub user_id: String,
    pub email: String,
    pub display_name: String,
    pub fcm_token: Option<String>,
    pub refresh_token: Option<String>,
    pub is_active: bool,
    pub is_initialized: bool,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// One entry of a user's liked-videos snapshot, as returned by the
/// YouTube Data API. Transient: only `video_id` and `title` survive into
/// a download record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LikedVideo {
    pub video_id: String,
    pub title: String,
    pub duration: Option<String>,
    pub published_at: Option<String>,
    pub channel_title: Option<String>,
    pub thumbnail_url: Option<String>,
    pub is_short: bool,
}

/// Durable work record from the `downloads` ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadRecord {
    pub user_id: String,
    pub video_id: String,
    pub title: String,
    pub status: DownloadStatus,
    pub path: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Aggregate of one poll cycle, before notification dispatch.
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub users_checked: usize,
    pub total_new_likes: usize,
    pub new_likes_by_user: HashMap<String, Vec<LikedVideo>>,
}

/// Per-user outcome of one notification attempt.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchResult {
    pub user_id: String,
    pub video_ids: Vec<String>,
    pub success: bool,
    pub message_id: Option<String>,
    pub error: Option<String>,
}

impl DispatchResult {
    pub fn failure(user_id: &str, video_ids: Vec<String>, error: impl Into<String>) -> Self {
        Self {
            user_id: user_id.to_string(),
            video_ids,
            success: false,
            message_id: None,
            error: Some(error.into()),
        }
    }
}

/// What one scheduler trigger reports back.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct CycleSummary {
    pub users_checked: usize,
    pub total_new_likes: usize,
    pub notifications_sent: usize,
}
