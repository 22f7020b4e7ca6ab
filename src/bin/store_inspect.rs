use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;

use content_admin::config::Config;
use content_admin::model::{PostStatus, PENDING_LIMIT};
use content_admin::store;

#[derive(Parser, Debug)]
#[command(about = "Print rows from the configured store as JSON")]
struct Args {
    /// Path to YAML config (reads only `store`; env overrides apply)
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    what: What,
}

#[derive(Subcommand, Debug)]
enum What {
    /// Total and published post counts
    Stats,
    /// Posts awaiting moderation, newest first
    Pending {
        #[arg(long, default_value_t = PENDING_LIMIT)]
        limit: usize,
    },
    /// All registered sources
    Sources,
    /// Publishing queue, soonest first
    Queue,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();

    let mut cfg: Config = match fs::read_to_string(&args.config) {
        Ok(raw) => serde_yaml::from_str(&raw)
            .with_context(|| format!("invalid config {}", args.config.display()))?,
        Err(_) => Config::default(),
    };
    cfg.apply_env(|key| std::env::var(key).ok());

    let store = store::connect(&cfg.store).await?;
    match args.what {
        What::Stats => {
            let total = store.count_posts(None).await?;
            let published = store.count_posts(Some(PostStatus::Published)).await?;
            print_json(&serde_json::json!({ "total": total, "published": published }))
        }
        What::Pending { limit } => print_json(&store.list_posts(PostStatus::Pending, limit).await?),
        What::Sources => print_json(&store.list_sources().await?),
        What::Queue => print_json(&store.list_queue().await?),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
