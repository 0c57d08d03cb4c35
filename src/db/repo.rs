use super::model::StoreStats;
use crate::model::{DownloadRecord, DownloadStatus, User};
use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::collections::HashSet;
use tracing::instrument;

pub type Pool = SqlitePool;

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    let pool = SqlitePool::connect(&normalized).await?;
    // Enable WAL and stricter durability.
    sqlx::query("PRAGMA journal_mode=WAL;")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous=FULL;")
        .execute(&pool)
        .await?;
    Ok(pool)
}

/// If using a file-backed SQLite URL, expand a leading `~/` and ensure the
/// parent directory exists. Leaves in-memory URLs untouched.
fn prepare_sqlite_url(url: &str) -> String {
    if !url.starts_with("sqlite:") || url.starts_with("sqlite::memory") {
        return url.to_string();
    }

    let rest = &url["sqlite:".len()..];
    let path_with_query = rest.strip_prefix("//").unwrap_or(rest);
    let (path_part, query_part) = match path_with_query.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path_with_query, None),
    };
    if path_part.is_empty() {
        return url.to_string();
    }

    let expanded_path = match path_part.strip_prefix("~/") {
        Some(tail) => match std::env::var("HOME") {
            Ok(home) => format!("{}/{}", home.trim_end_matches('/'), tail),
            Err(_) => path_part.to_string(),
        },
        None => path_part.to_string(),
    };

    if let Some(parent) = std::path::Path::new(&expanded_path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    let mut rebuilt = format!("sqlite://{}", expanded_path);
    if let Some(q) = query_part {
        rebuilt.push('?');
        rebuilt.push_str(q);
    }
    rebuilt
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

fn user_from_row(row: &SqliteRow) -> Result<User> {
    Ok(User {
        user_id: row.get("user_id"),
        email: row.get("email"),
        display_name: row.get("display_name"),
        fcm_token: row
            .get::<Option<String>, _>("fcm_token")
            .filter(|t| !t.is_empty()),
        refresh_token: row
            .get::<Option<String>, _>("refresh_token")
            .filter(|t| !t.is_empty()),
        is_active: row.get("is_active"),
        is_initialized: row.get("is_initialized"),
        last_sync_at: row.get("last_sync_at"),
        created_at: row.get("created_at"),
    })
}

const USER_COLUMNS: &str =
    "user_id, email, display_name, fcm_token, refresh_token, is_active, is_initialized, \
     last_sync_at, created_at";

#[instrument(skip_all)]
pub async fn upsert_user(
    pool: &Pool,
    user_id: &str,
    email: &str,
    display_name: &str,
) -> Result<()> {
    // Registration is a merge: profile fields refresh, flags and tokens
    // survive re-registration untouched.
    sqlx::query(
        "INSERT INTO users (user_id, email, display_name) VALUES (?, ?, ?) \
         ON CONFLICT (user_id) DO UPDATE SET email = excluded.email, \
         display_name = excluded.display_name",
    )
    .bind(user_id)
    .bind(email)
    .bind(display_name)
    .execute(pool)
    .await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn get_user(pool: &Pool, user_id: &str) -> Result<Option<User>> {
    let row = sqlx::query(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE user_id = ?"
    ))
    .bind(user_id)
    .fetch_optional(pool)
    .await?;
    row.as_ref().map(user_from_row).transpose()
}

/// All users not explicitly deactivated. The schema defaults `is_active`
/// to 1, giving the default-active semantics the poller relies on.
#[instrument(skip_all)]
pub async fn all_active_users(pool: &Pool) -> Result<Vec<User>> {
    let rows = sqlx::query(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE is_active != 0 ORDER BY user_id"
    ))
    .fetch_all(pool)
    .await?;
    rows.iter().map(user_from_row).collect()
}

#[instrument(skip_all)]
pub async fn set_user_active(pool: &Pool, user_id: &str, active: bool) -> Result<()> {
    sqlx::query("UPDATE users SET is_active = ? WHERE user_id = ?")
        .bind(active)
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn set_refresh_token(pool: &Pool, user_id: &str, token: Option<&str>) -> Result<()> {
    sqlx::query("UPDATE users SET refresh_token = ? WHERE user_id = ?")
        .bind(token)
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn set_fcm_token(pool: &Pool, user_id: &str, token: Option<&str>) -> Result<()> {
    sqlx::query("UPDATE users SET fcm_token = ? WHERE user_id = ?")
        .bind(token)
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn update_sync_timestamp(
    pool: &Pool,
    user_id: &str,
    timestamp: DateTime<Utc>,
) -> Result<()> {
    sqlx::query("UPDATE users SET last_sync_at = ? WHERE user_id = ?")
        .bind(timestamp)
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn baseline_ids(pool: &Pool, user_id: &str) -> Result<HashSet<String>> {
    let ids: Vec<String> =
        sqlx::query_scalar("SELECT video_id FROM baseline_videos WHERE user_id = ?")
            .bind(user_id)
            .fetch_all(pool)
            .await?;
    Ok(ids.into_iter().collect())
}

/// First-snapshot transition: absorb the whole snapshot into the baseline
/// and flip `is_initialized` in one transaction. Safe to re-run.
#[instrument(skip_all)]
pub async fn seed_baseline(pool: &Pool, user_id: &str, video_ids: &[String]) -> Result<()> {
    let mut tx = pool.begin().await?;
    for video_id in video_ids {
        sqlx::query("INSERT OR IGNORE INTO baseline_videos (user_id, video_id) VALUES (?, ?)")
            .bind(user_id)
            .bind(video_id)
            .execute(&mut *tx)
            .await?;
    }
    sqlx::query("UPDATE users SET is_initialized = 1 WHERE user_id = ?")
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(())
}

/// Append newly detected ids to the baseline. OR IGNORE keeps the set
/// monotonic even if a cycle replays.
#[instrument(skip_all)]
pub async fn extend_baseline(pool: &Pool, user_id: &str, video_ids: &[String]) -> Result<()> {
    let mut tx = pool.begin().await?;
    for video_id in video_ids {
        sqlx::query("INSERT OR IGNORE INTO baseline_videos (user_id, video_id) VALUES (?, ?)")
            .bind(user_id)
            .bind(video_id)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;
    Ok(())
}

fn download_from_row(row: &SqliteRow) -> Result<DownloadRecord> {
    let status_str: String = row.get("status");
    let status = DownloadStatus::parse_status(&status_str)
        .ok_or_else(|| anyhow!("download row has unknown status {}", status_str))?;
    Ok(DownloadRecord {
        user_id: row.get("user_id"),
        video_id: row.get("video_id"),
        title: row.get("title"),
        status,
        path: row.get("path"),
        created_at: row.get("created_at"),
    })
}

#[instrument(skip_all)]
pub async fn get_download(
    pool: &Pool,
    user_id: &str,
    video_id: &str,
) -> Result<Option<DownloadRecord>> {
    let row = sqlx::query(
        "SELECT user_id, video_id, title, status, path, created_at FROM downloads \
         WHERE user_id = ? AND video_id = ?",
    )
    .bind(user_id)
    .bind(video_id)
    .fetch_optional(pool)
    .await?;
    row.as_ref().map(download_from_row).transpose()
}

#[instrument(skip_all)]
pub async fn create_download(pool: &Pool, user_id: &str, video_id: &str, title: &str) -> Result<()> {
    // OR IGNORE backs up the caller's existence check: the UNIQUE key on
    // (user_id, video_id) is the final dedup gate.
    sqlx::query(
        "INSERT OR IGNORE INTO downloads (user_id, video_id, title, status, created_at) \
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(user_id)
    .bind(video_id)
    .bind(title)
    .bind(DownloadStatus::Pending.as_str())
    .bind(Utc::now())
    .execute(pool)
    .await?;
    Ok(())
}

/// Status transition owned by the download worker. No-op when the record
/// is absent; `path` is only written when provided.
#[instrument(skip_all)]
pub async fn update_download_status(
    pool: &Pool,
    user_id: &str,
    video_id: &str,
    status: DownloadStatus,
    path: Option<&str>,
) -> Result<()> {
    sqlx::query(
        "UPDATE downloads SET status = ?, path = COALESCE(?, path) \
         WHERE user_id = ? AND video_id = ?",
    )
    .bind(status.as_str())
    .bind(path)
    .bind(user_id)
    .bind(video_id)
    .execute(pool)
    .await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn downloads_by_status(pool: &Pool, status: DownloadStatus) -> Result<Vec<DownloadRecord>> {
    let rows = sqlx::query(
        "SELECT user_id, video_id, title, status, path, created_at FROM downloads \
         WHERE status = ? ORDER BY created_at ASC",
    )
    .bind(status.as_str())
    .fetch_all(pool)
    .await?;
    rows.iter().map(download_from_row).collect()
}

#[instrument(skip_all)]
pub async fn stats(pool: &Pool) -> Result<StoreStats> {
    let total_users: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(pool)
        .await?;
    let active_users: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE is_active != 0")
        .fetch_one(pool)
        .await?;
    let total_downloads: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM downloads")
        .fetch_one(pool)
        .await?;
    Ok(StoreStats {
        total_users,
        active_users,
        total_downloads,
    })
}
