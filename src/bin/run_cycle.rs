use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use yt_likesbot::config;
use yt_likesbot::db;
use yt_likesbot::fcm::FcmClient;
use yt_likesbot::poller;
use yt_likesbot::youtube::YouTubeClient;

/// One-shot entry point for an external scheduler: run a single poll
/// cycle, dispatch notifications, print the summary and exit. Exits
/// non-zero only on systemic failure (store or config unavailable).
#[derive(Debug, Parser)]
#[command(author, version, about = "Run one likes poll cycle and exit")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Print store-wide counters after the cycle
    #[arg(long)]
    stats: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| format!("sqlite://{}/likesbot.db", cfg.app.data_dir));

    let pool = db::init_pool(&database_url).await?;
    db::run_migrations(&pool).await?;

    let feed = YouTubeClient::from_config(&cfg);
    let transport = FcmClient::from_config(&cfg);

    let summary = poller::run_once(&pool, &feed, &transport).await?;
    info!(
        users_checked = summary.users_checked,
        total_new_likes = summary.total_new_likes,
        notifications_sent = summary.notifications_sent,
        "cycle complete"
    );

    if args.stats {
        let stats = db::stats(&pool).await?;
        info!(
            total_users = stats.total_users,
            active_users = stats.active_users,
            total_downloads = stats.total_downloads,
            "store stats"
        );
    }

    Ok(())
}
