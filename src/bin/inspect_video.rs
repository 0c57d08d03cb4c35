use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use yt_likesbot::config;
use yt_likesbot::youtube::YouTubeClient;

/// Fetch details for one or more video ids and print them as JSON.
/// Handy for checking what the length filters will do with a video.
#[derive(Debug, Parser)]
#[command(author, version, about = "Inspect YouTube video details")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Video ids to look up
    #[arg(required = true)]
    video_ids: Vec<String>,
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

    let client = YouTubeClient::from_config(&cfg);
    let videos = client.video_details(&args.video_ids).await?;
    println!("{}", serde_json::to_string_pretty(&videos)?);
    Ok(())
}
