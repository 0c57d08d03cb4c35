use anyhow::Result;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;

use yt_likesbot::db;
use yt_likesbot::fcm::{PushError, PushMessage, PushTransport};
use yt_likesbot::model::LikedVideo;
use yt_likesbot::poller;
use yt_likesbot::youtube::{FetchError, LikesFeed};

async fn setup_pool() -> sqlx::SqlitePool {
    let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    pool
}

fn video(id: &str, duration: Option<&str>) -> LikedVideo {
    LikedVideo {
        video_id: id.into(),
        title: format!("Video {id}"),
        duration: duration.map(str::to_string),
        published_at: Some("2024-05-01T10:00:00Z".into()),
        channel_title: Some("Channel".into()),
        thumbnail_url: None,
        is_short: duration.map(yt_likesbot::duration::is_short).unwrap_or(false),
    }
}

/// Feed fake: scripted responses per refresh token, recorded calls.
#[derive(Clone, Default)]
struct ScriptedFeed {
    responses: Arc<Mutex<HashMap<String, VecDeque<Result<Vec<LikedVideo>, FetchError>>>>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl ScriptedFeed {
    async fn script(&self, token: &str, response: Result<Vec<LikedVideo>, FetchError>) {
        self.responses
            .lock()
            .await
            .entry(token.to_string())
            .or_default()
            .push_back(response);
    }

    async fn calls(&self) -> Vec<String> {
        self.calls.lock().await.clone()
    }
}

#[async_trait::async_trait]
impl LikesFeed for ScriptedFeed {
    async fn fetch_liked(&self, refresh_token: &str) -> Result<Vec<LikedVideo>, FetchError> {
        self.calls.lock().await.push(refresh_token.to_string());
        self.responses
            .lock()
            .await
            .get_mut(refresh_token)
            .and_then(|queue| queue.pop_front())
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}

/// Transport fake used by the end-to-end test.
#[derive(Clone, Default)]
struct RecordingTransport {
    messages: Arc<Mutex<Vec<PushMessage>>>,
}

#[async_trait::async_trait]
impl PushTransport for RecordingTransport {
    async fn send(&self, message: &PushMessage) -> Result<String, PushError> {
        self.messages.lock().await.push(message.clone());
        Ok("msg-1".into())
    }
}

async fn register_user(pool: &sqlx::SqlitePool, user_id: &str, refresh_token: &str) {
    db::upsert_user(pool, user_id, &format!("{user_id}@example.com"), user_id)
        .await
        .unwrap();
    db::set_refresh_token(pool, user_id, Some(refresh_token))
        .await
        .unwrap();
    db::set_fcm_token(pool, user_id, Some(&format!("fcm-{user_id}")))
        .await
        .unwrap();
}

#[tokio::test]
async fn first_poll_seeds_baseline_without_delta() {
    let pool = setup_pool().await;
    let feed = ScriptedFeed::default();
    register_user(&pool, "u1", "rt-1").await;

    let snapshot = vec![video("A", Some("PT3M")), video("B", Some("PT3M")), video("C", Some("PT3M"))];
    feed.script("rt-1", Ok(snapshot.clone())).await;
    feed.script("rt-1", Ok(snapshot)).await;

    let report = poller::run_cycle(&pool, &feed).await.unwrap();
    assert_eq!(report.users_checked, 1);
    assert_eq!(report.total_new_likes, 0);

    let user = db::get_user(&pool, "u1").await.unwrap().unwrap();
    assert!(user.is_initialized);
    let baseline = db::baseline_ids(&pool, "u1").await.unwrap();
    assert_eq!(baseline.len(), 3);

    // Running again with the identical snapshot stays quiet.
    let report = poller::run_cycle(&pool, &feed).await.unwrap();
    assert_eq!(report.total_new_likes, 0);
    assert_eq!(db::baseline_ids(&pool, "u1").await.unwrap().len(), 3);
}

#[tokio::test]
async fn detects_delta_and_extends_baseline() {
    let pool = setup_pool().await;
    let feed = ScriptedFeed::default();
    register_user(&pool, "u1", "rt-1").await;
    db::seed_baseline(&pool, "u1", &["A".into(), "B".into(), "C".into()])
        .await
        .unwrap();

    feed.script(
        "rt-1",
        Ok(vec![
            video("A", Some("PT3M")),
            video("B", Some("PT3M")),
            video("C", Some("PT3M")),
            video("D", Some("PT3M20S")),
            video("E", Some("PT2M")),
        ]),
    )
    .await;

    let report = poller::run_cycle(&pool, &feed).await.unwrap();
    assert_eq!(report.total_new_likes, 2);
    let ids: Vec<String> = report.new_likes_by_user["u1"]
        .iter()
        .map(|v| v.video_id.clone())
        .collect();
    assert_eq!(ids, vec!["D", "E"]);

    let baseline = db::baseline_ids(&pool, "u1").await.unwrap();
    assert_eq!(baseline.len(), 5);
    assert!(baseline.contains("D") && baseline.contains("E"));

    // Work was done, so the sync timestamp moved.
    let user = db::get_user(&pool, "u1").await.unwrap().unwrap();
    assert!(user.last_sync_at.is_some());
}

#[tokio::test]
async fn unliked_items_never_produce_a_negative_delta() {
    let pool = setup_pool().await;
    let feed = ScriptedFeed::default();
    register_user(&pool, "u1", "rt-1").await;
    db::seed_baseline(&pool, "u1", &["A".into(), "B".into(), "C".into()])
        .await
        .unwrap();

    feed.script("rt-1", Ok(vec![video("A", Some("PT3M")), video("B", Some("PT3M"))]))
        .await;

    let report = poller::run_cycle(&pool, &feed).await.unwrap();
    assert_eq!(report.total_new_likes, 0);
    // Removed items stay in the baseline; the set never shrinks.
    assert_eq!(db::baseline_ids(&pool, "u1").await.unwrap().len(), 3);
}

#[tokio::test]
async fn ledger_blocks_redetected_items() {
    let pool = setup_pool().await;
    let feed = ScriptedFeed::default();
    register_user(&pool, "u1", "rt-1").await;
    // D already has a work record from an earlier cycle, but the baseline
    // lost it (manual edit). The ledger must still refuse a second record.
    db::seed_baseline(&pool, "u1", &["A".into()]).await.unwrap();
    db::create_download(&pool, "u1", "D", "Video D").await.unwrap();

    feed.script("rt-1", Ok(vec![video("A", Some("PT3M")), video("D", Some("PT3M"))]))
        .await;

    let report = poller::run_cycle(&pool, &feed).await.unwrap();
    assert_eq!(report.total_new_likes, 0);
    assert!(report.new_likes_by_user.is_empty());

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM downloads WHERE user_id = 'u1'")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn length_filters_drop_shorts_and_long_videos() {
    let pool = setup_pool().await;
    let feed = ScriptedFeed::default();
    register_user(&pool, "u1", "rt-1").await;
    db::seed_baseline(&pool, "u1", &["A".into()]).await.unwrap();

    feed.script(
        "rt-1",
        Ok(vec![
            video("A", Some("PT3M")),
            video("short", Some("PT45S")),
            video("long", Some("PT6M40S")),
            video("keeper", Some("PT3M20S")),
        ]),
    )
    .await;

    let report = poller::run_cycle(&pool, &feed).await.unwrap();
    assert_eq!(report.total_new_likes, 1);
    assert_eq!(report.new_likes_by_user["u1"][0].video_id, "keeper");

    // Filtered items still land in the baseline so they are not
    // re-examined every cycle.
    let baseline = db::baseline_ids(&pool, "u1").await.unwrap();
    assert!(baseline.contains("short") && baseline.contains("long"));

    assert!(db::get_download(&pool, "u1", "keeper").await.unwrap().is_some());
    assert!(db::get_download(&pool, "u1", "short").await.unwrap().is_none());
    assert!(db::get_download(&pool, "u1", "long").await.unwrap().is_none());
}

#[tokio::test]
async fn one_failing_user_does_not_abort_the_cycle() {
    let pool = setup_pool().await;
    let feed = ScriptedFeed::default();
    register_user(&pool, "ux", "rt-x").await;
    register_user(&pool, "uy", "rt-y").await;
    register_user(&pool, "uz", "rt-z").await;
    db::seed_baseline(&pool, "uy", &["A".into()]).await.unwrap();
    db::seed_baseline(&pool, "uz", &["A".into()]).await.unwrap();

    feed.script(
        "rt-x",
        Err(FetchError::Api {
            status: reqwest::StatusCode::INTERNAL_SERVER_ERROR,
            body: "boom".into(),
        }),
    )
    .await;
    feed.script("rt-y", Ok(vec![video("A", Some("PT3M")), video("B", Some("PT3M"))]))
        .await;
    feed.script("rt-z", Ok(vec![video("A", Some("PT3M"))])).await;

    let report = poller::run_cycle(&pool, &feed).await.unwrap();
    assert_eq!(report.users_checked, 3);
    assert_eq!(report.total_new_likes, 1);
    assert!(report.new_likes_by_user.contains_key("uy"));

    // All three users were attempted.
    assert_eq!(feed.calls().await.len(), 3);
    // A transient failure does not deactivate the user.
    assert!(db::get_user(&pool, "ux").await.unwrap().unwrap().is_active);
}

#[tokio::test]
async fn rejected_credential_deactivates_the_user() {
    let pool = setup_pool().await;
    let feed = ScriptedFeed::default();
    register_user(&pool, "u1", "rt-1").await;

    feed.script("rt-1", Err(FetchError::Credential("invalid_grant".into())))
        .await;

    let report = poller::run_cycle(&pool, &feed).await.unwrap();
    assert_eq!(report.users_checked, 1);
    assert_eq!(report.total_new_likes, 0);

    let user = db::get_user(&pool, "u1").await.unwrap().unwrap();
    assert!(!user.is_active);

    // The next cycle's active scan no longer includes the user.
    let report = poller::run_cycle(&pool, &feed).await.unwrap();
    assert_eq!(report.users_checked, 0);
    assert_eq!(feed.calls().await.len(), 1);
}

#[tokio::test]
async fn users_without_a_refresh_token_are_skipped_quietly() {
    let pool = setup_pool().await;
    let feed = ScriptedFeed::default();
    db::upsert_user(&pool, "u1", "a@example.com", "A")
        .await
        .unwrap();

    let report = poller::run_cycle(&pool, &feed).await.unwrap();
    assert_eq!(report.users_checked, 1);
    assert_eq!(report.total_new_likes, 0);
    assert!(feed.calls().await.is_empty());
}

#[tokio::test]
async fn full_cycle_detects_records_and_notifies() {
    let pool = setup_pool().await;
    let feed = ScriptedFeed::default();
    let transport = RecordingTransport::default();

    // user1: uninitialized, seeds silently.
    register_user(&pool, "user1", "rt-1").await;
    feed.script("rt-1", Ok(vec![video("H1", Some("PT3M")), video("H2", Some("PT3M"))]))
        .await;

    // user2: baseline {V1}, V2 is 120s and passes the filters.
    register_user(&pool, "user2", "rt-2").await;
    db::seed_baseline(&pool, "user2", &["V1".into()]).await.unwrap();
    feed.script("rt-2", Ok(vec![video("V1", Some("PT3M")), video("V2", Some("PT2M"))]))
        .await;

    // user3: snapshot fetch blows up.
    register_user(&pool, "user3", "rt-3").await;
    feed.script(
        "rt-3",
        Err(FetchError::Api {
            status: reqwest::StatusCode::SERVICE_UNAVAILABLE,
            body: "unavailable".into(),
        }),
    )
    .await;

    let summary = poller::run_once(&pool, &feed, &transport).await.unwrap();
    assert_eq!(summary.users_checked, 3);
    assert_eq!(summary.total_new_likes, 1);
    assert_eq!(summary.notifications_sent, 1);

    let record = db::get_download(&pool, "user2", "V2").await.unwrap().unwrap();
    assert_eq!(record.status, yt_likesbot::model::DownloadStatus::Pending);

    let messages = transport.messages.lock().await;
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].to, "fcm-user2");
    assert_eq!(messages[0].data.count, "1");
    assert!(messages[0].data.video_ids.contains("V2"));
}
