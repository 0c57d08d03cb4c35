//! Baseline tracker: turns a full liked-videos snapshot into the delta of
//! genuinely new items for one user.
//!
//! The baseline is the persisted set of ids already seen. The first
//! successful snapshot for a user seeds it wholesale and reports nothing —
//! otherwise every historical like would surface as a burst of "new"
//! items. After that, new = snapshot minus baseline, and the baseline only
//! ever grows.

use crate::db::{self, Pool};
use crate::model::{LikedVideo, User};
use anyhow::Result;
use tracing::{debug, info, instrument};

#[instrument(skip_all, fields(user_id = %user.user_id))]
pub async fn detect_new_likes(
    pool: &Pool,
    user: &User,
    snapshot: &[LikedVideo],
) -> Result<Vec<LikedVideo>> {
    let baseline = db::baseline_ids(pool, &user.user_id).await?;

    if !user.is_initialized || baseline.is_empty() {
        let ids: Vec<String> = snapshot.iter().map(|v| v.video_id.clone()).collect();
        db::seed_baseline(pool, &user.user_id, &ids).await?;
        info!(count = ids.len(), "seeded baseline, no delta emitted");
        return Ok(Vec::new());
    }

    let new_likes: Vec<LikedVideo> = snapshot
        .iter()
        .filter(|v| !baseline.contains(&v.video_id))
        .cloned()
        .collect();

    // Persist before returning: if we crash after this write the items are
    // absorbed and will not be re-detected; if we crash before it, the next
    // cycle recomputes the identical delta. Unliked items simply drop out
    // of the snapshot and never produce a negative delta.
    if !new_likes.is_empty() {
        let ids: Vec<String> = new_likes.iter().map(|v| v.video_id.clone()).collect();
        db::extend_baseline(pool, &user.user_id, &ids).await?;
        info!(count = new_likes.len(), "detected new likes");
    } else {
        debug!("no new likes");
    }

    Ok(new_likes)
}
