//! Work-record ledger: the final idempotency gate between detection and
//! notification.
//!
//! The baseline diff already absorbs most repeats, but a manually edited
//! baseline or a replayed cycle can still push a known item through. The
//! (user, video) existence check here — backed by the UNIQUE key on the
//! `downloads` table — is the authoritative boundary, and must stay even
//! though it looks redundant next to the detector.

use crate::db::{self, Pool};
use crate::duration;
use crate::model::LikedVideo;
use anyhow::Result;
use tracing::{debug, instrument};

/// Record the filtered subset of `items` that has no download record yet.
/// Returns only the items actually recorded this call, i.e. the ones worth
/// notifying about.
#[instrument(skip_all, fields(user_id = %user_id))]
pub async fn record_new(
    pool: &Pool,
    user_id: &str,
    items: &[LikedVideo],
) -> Result<Vec<LikedVideo>> {
    let mut recorded = Vec::new();
    for item in items {
        // Business filters come first and are independent of dedup: Shorts
        // and over-length videos are never downloaded. A video without a
        // reported duration passes both.
        if let Some(raw) = item.duration.as_deref() {
            if duration::is_short(raw) {
                debug!(video_id = %item.video_id, "skipping short");
                continue;
            }
            if duration::is_over_length(raw) {
                debug!(video_id = %item.video_id, "skipping over-length video");
                continue;
            }
        }

        if db::get_download(pool, user_id, &item.video_id).await?.is_some() {
            debug!(video_id = %item.video_id, "already recorded, skipping");
            continue;
        }

        db::create_download(pool, user_id, &item.video_id, &item.title).await?;
        recorded.push(item.clone());
    }
    Ok(recorded)
}
