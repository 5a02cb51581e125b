mod campaign;
mod config;
mod discord;
mod error;
mod server;
mod store;
mod tools;
mod utils;

#[cfg(test)]
mod testing;

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::discord::{DiscordApi, SerenityApi};
use crate::store::Store;
use crate::tools::{Context, ToolRegistry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let config = Config::from_env()?;

    // stdout carries the protocol; everything observable goes to stderr.
    // RUST_LOG overrides the LOG_LEVEL environment variable.
    let default_filter = format!(
        "{},serenity=warn,sqlx=warn",
        config.log_level.to_lowercase()
    );
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    if config.dry_run {
        tracing::info!("DRY_RUN enabled: outbound Discord writes are suppressed");
    }

    let store = Arc::new(Store::open(&config.db_path).await?);
    let discord: Arc<dyn DiscordApi> = Arc::new(SerenityApi::new(config.clone()));

    let registry = ToolRegistry::new(Context {
        store,
        discord,
        config,
    });

    server::run(registry).await
}
