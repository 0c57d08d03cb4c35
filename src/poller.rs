//! Polling orchestrator: one pass over all active users per external
//! trigger. Detection and dispatch are deliberately decoupled so a user
//! whose snapshot fetch always fails never blocks notifications for the
//! healthy ones.

use crate::db::{self, Pool};
use crate::detector;
use crate::fcm::PushTransport;
use crate::ledger;
use crate::model::{CycleReport, CycleSummary, LikedVideo, User};
use crate::youtube::LikesFeed;
use anyhow::Result;
use chrono::Utc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// Run one detection cycle across all active users. Only a store failure
/// before any user could be processed propagates; every per-user error is
/// caught, logged, and counted as zero new items for that user.
#[instrument(skip_all)]
pub async fn run_cycle(pool: &Pool, feed: &dyn LikesFeed) -> Result<CycleReport> {
    let cycle_id = Uuid::new_v4();
    let users = db::all_active_users(pool).await?;
    info!(%cycle_id, users = users.len(), "starting poll cycle");

    let mut report = CycleReport {
        users_checked: users.len(),
        ..CycleReport::default()
    };

    for user in &users {
        match check_user(pool, feed, user).await {
            Ok(recorded) if !recorded.is_empty() => {
                report.total_new_likes += recorded.len();
                report.new_likes_by_user.insert(user.user_id.clone(), recorded);
            }
            Ok(_) => {}
            Err(err) => {
                error!(user_id = %user.user_id, ?err, "user poll failed");
            }
        }
    }

    info!(
        %cycle_id,
        users_checked = report.users_checked,
        total_new_likes = report.total_new_likes,
        "poll cycle finished"
    );
    Ok(report)
}

/// Detection pipeline for a single user: snapshot → baseline diff →
/// ledger. Fetch failures yield an empty delta; a rejected credential
/// additionally deactivates the user so later cycles skip it until
/// re-authorization.
async fn check_user(pool: &Pool, feed: &dyn LikesFeed, user: &User) -> Result<Vec<LikedVideo>> {
    let Some(refresh_token) = user.refresh_token.as_deref() else {
        info!(user_id = %user.user_id, "no refresh token, skipping");
        return Ok(Vec::new());
    };

    let snapshot = match feed.fetch_liked(refresh_token).await {
        Ok(snapshot) => snapshot,
        Err(err) if err.is_credential() => {
            warn!(user_id = %user.user_id, %err, "credential rejected, deactivating user");
            db::set_user_active(pool, &user.user_id, false).await?;
            return Ok(Vec::new());
        }
        Err(err) => {
            warn!(user_id = %user.user_id, %err, "snapshot fetch failed");
            return Ok(Vec::new());
        }
    };

    let delta = detector::detect_new_likes(pool, user, &snapshot).await?;
    if delta.is_empty() {
        return Ok(Vec::new());
    }

    let recorded = ledger::record_new(pool, &user.user_id, &delta).await?;
    // Work was done for this user; stamp the sync time even if every item
    // was filtered or already recorded.
    db::update_sync_timestamp(pool, &user.user_id, Utc::now()).await?;
    Ok(recorded)
}

/// The scheduler entry point: detect, then dispatch, then summarize.
#[instrument(skip_all)]
pub async fn run_once(
    pool: &Pool,
    feed: &dyn LikesFeed,
    transport: &dyn PushTransport,
) -> Result<CycleSummary> {
    let report = run_cycle(pool, feed).await?;
    let results = crate::dispatch::send_all(pool, transport, &report.new_likes_by_user).await;
    let notifications_sent = results.iter().filter(|r| r.success).count();
    Ok(CycleSummary {
        users_checked: report.users_checked,
        total_new_likes: report.total_new_likes,
        notifications_sent,
    })
}
