use std::path::PathBuf;
use std::sync::Arc;

mod ai;
mod api;
mod bot;
mod config;
mod db;
mod error;
mod essay;
mod models;
mod services;
mod storage;
mod tasks;
#[cfg(test)]
mod testing;

use api::AppState;
use bot::BotService;
use config::Config;
use db::{Repository, SecretRepository};
use error::{AppError, Result};
use essay::{EssayService, Providers};
use models::NewSecret;
use storage::FileStore;
use tasks::TaskPool;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging (info by default, RUST_LOG overrides)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    // Parse command line arguments
    let args: Vec<String> = std::env::args().collect();
    let config_path = match args.iter().position(|a| a == "--config") {
        Some(i) => Some(PathBuf::from(args.get(i + 1).ok_or_else(|| -> AppError {
            anyhow::anyhow!("--config requires a path").into()
        })?)),
        None => None,
    };

    let config = Config::load(config_path.as_deref())?;

    let repo = Repository::new(&config.db_path).await?;

    // Check for --set-secret flag: store a provider credential and exit
    if let Some(i) = args.iter().position(|a| a == "--set-secret") {
        let (Some(name), Some(api_key)) = (args.get(i + 1), args.get(i + 2)) else {
            return Err(anyhow::anyhow!("usage: --set-secret <name> <api_key> [uri]").into());
        };
        repo.upsert_secret(NewSecret {
            name: name.clone(),
            api_key: api_key.clone(),
            uri: args.get(i + 3).cloned().unwrap_or_default(),
            ..Default::default()
        })
        .await?;
        println!("Stored secret {}", name);
        return Ok(());
    }

    let secrets = SecretRepository::new(repo.clone());
    let providers = Providers::resolve(&config, &secrets).await?;
    let files = FileStore::new(&config.files_dir, &config.app_url)?;
    let tasks = TaskPool::spawn(config.task_concurrency);
    let essays = EssayService::new(repo, files, providers, tasks.clone());

    let bot = Arc::new(BotService::resolve(&config.bot, &secrets, essays.clone()).await?);
    bot.start().await;

    let app = api::router(AppState {
        essays,
        bot: bot.clone(),
    });

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Listening on {}", config.bind_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    bot.stop().await;
    tasks.shutdown().await;
    tracing::info!("Shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}
