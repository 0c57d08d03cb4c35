use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info};

use yt_likesbot::config;
use yt_likesbot::db;
use yt_likesbot::fcm::FcmClient;
use yt_likesbot::poller;
use yt_likesbot::youtube::YouTubeClient;

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
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

    info!(
        interval_secs = cfg.app.poll_interval_secs,
        "starting likes listener"
    );
    let mut ticker = tokio::time::interval(Duration::from_secs(cfg.app.poll_interval_secs));
    loop {
        ticker.tick().await;
        match poller::run_once(&pool, &feed, &transport).await {
            Ok(summary) => {
                info!(
                    users_checked = summary.users_checked,
                    total_new_likes = summary.total_new_likes,
                    notifications_sent = summary.notifications_sent,
                    "cycle complete"
                );
            }
            Err(err) => {
                error!(?err, "poll cycle failed");
            }
        }
    }
}
