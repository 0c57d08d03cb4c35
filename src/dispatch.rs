//! Notification dispatcher: one FCM payload per user batch, with the
//! permanent-failure handling that keeps dead tokens from being retried
//! every cycle.

use crate::db::{self, Pool};
use crate::fcm::{self, PushTransport};
use crate::model::{DispatchResult, LikedVideo};
use anyhow::Result;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

/// Pause between per-user sends to stay under FCM rate limits.
const INTER_SEND_DELAY: Duration = Duration::from_millis(100);

/// Send one batched notification to a single user. Inactive users and
/// users without a device token fail fast without touching the transport.
/// A permanently invalid token deactivates the user as a side effect.
#[instrument(skip_all, fields(user_id = %user_id))]
pub async fn send_batch(
    pool: &Pool,
    transport: &dyn PushTransport,
    user_id: &str,
    videos: &[LikedVideo],
) -> Result<DispatchResult> {
    let video_ids: Vec<String> = videos.iter().map(|v| v.video_id.clone()).collect();

    let Some(user) = db::get_user(pool, user_id).await? else {
        return Ok(DispatchResult::failure(user_id, video_ids, "user not found"));
    };
    if !user.is_active {
        return Ok(DispatchResult::failure(user_id, video_ids, "user is inactive"));
    }
    let Some(token) = user.fcm_token.as_deref() else {
        return Ok(DispatchResult::failure(user_id, video_ids, "missing fcm token"));
    };

    let message = fcm::build_message(token, videos);
    match transport.send(&message).await {
        Ok(message_id) => {
            info!(count = videos.len(), message_id, "notification sent");
            Ok(DispatchResult {
                user_id: user_id.to_string(),
                video_ids,
                success: true,
                message_id: Some(message_id),
                error: None,
            })
        }
        Err(err) => {
            if err.is_permanent() {
                warn!("device token no longer valid, deactivating user");
                db::set_user_active(pool, user_id, false).await?;
            }
            Ok(DispatchResult::failure(user_id, video_ids, err.to_string()))
        }
    }
}

/// Fan a cycle's detections out to every affected user, sequentially with
/// a small delay between sends. One user's failure is converted into a
/// failure result; it never aborts the remaining users.
#[instrument(skip_all)]
pub async fn send_all(
    pool: &Pool,
    transport: &dyn PushTransport,
    new_likes_by_user: &HashMap<String, Vec<LikedVideo>>,
) -> Vec<DispatchResult> {
    let mut results = Vec::with_capacity(new_likes_by_user.len());
    for (user_id, videos) in new_likes_by_user {
        match send_batch(pool, transport, user_id, videos).await {
            Ok(result) => results.push(result),
            Err(err) => {
                error!(user_id, ?err, "dispatch failed");
                let video_ids = videos.iter().map(|v| v.video_id.clone()).collect();
                results.push(DispatchResult::failure(user_id, video_ids, err.to_string()));
            }
        }
        tokio::time::sleep(INTER_SEND_DELAY).await;
    }
    results
}

/// On-demand probe used by ops tooling to confirm a user's token works.
/// Unlike the cycle path there is no "next poll" to fall back on, so
/// transient failures are retried here with the configured budget.
#[instrument(skip_all, fields(user_id = %user_id))]
pub async fn send_test(
    pool: &Pool,
    transport: &dyn PushTransport,
    user_id: &str,
    max_attempts: u32,
    retry_delay: Duration,
) -> Result<DispatchResult> {
    let Some(user) = db::get_user(pool, user_id).await? else {
        return Ok(DispatchResult::failure(user_id, Vec::new(), "user not found"));
    };
    let Some(token) = user.fcm_token.as_deref() else {
        return Ok(DispatchResult::failure(user_id, Vec::new(), "missing fcm token"));
    };

    let message = fcm::build_test_message(token);
    match fcm::send_with_retry(transport, &message, max_attempts, retry_delay).await {
        Ok(message_id) => Ok(DispatchResult {
            user_id: user_id.to_string(),
            video_ids: Vec::new(),
            success: true,
            message_id: Some(message_id),
            error: None,
        }),
        Err(err) => Ok(DispatchResult::failure(user_id, Vec::new(), err.to_string())),
    }
}
