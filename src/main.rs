use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use teloxide::prelude::*;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use content_admin::commands::{self, CommandContext};
use content_admin::queue::{QueueTrigger, UnimplementedDrainer};
use content_admin::relay::TelegramRelay;
use content_admin::service::{AdminService, CategoryPolicy};
use content_admin::{api, config, store};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to YAML config file (defaults to ./config.yaml when present)
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(args.config.as_deref())?;

    let store = store::connect(&cfg.store)
        .await
        .context("failed to open store")?;
    let service = AdminService::new(store.clone(), CategoryPolicy::from(&cfg.sources));

    let shutdown = CancellationToken::new();

    let trigger = QueueTrigger::new(
        Duration::from_secs(cfg.queue.interval_seconds),
        Arc::new(UnimplementedDrainer),
    )
    .spawn(shutdown.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.server.port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    let app = api::router(service, &cfg.server.public_dir);
    let server_shutdown = shutdown.clone();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { server_shutdown.cancelled().await })
            .await
    });
    info!(%addr, "http server listening");

    let bot = Bot::new(cfg.telegram.bot_token.clone());
    let ctx = CommandContext {
        store,
        notifier: Arc::new(TelegramRelay::new(bot.clone())),
        bot_username: cfg.bot_handle().to_string(),
    };
    commands::run(bot, ctx).await;

    info!("bot stopped; shutting down");
    shutdown.cancel();
    server.await?.context("http server failed")?;
    trigger.await?;
    Ok(())
}
