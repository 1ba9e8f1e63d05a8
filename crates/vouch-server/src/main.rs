//! # vouch-server
//!
//! Admin HTTP service for curating tweet testimonials.
//!
//! This binary provides:
//! - **CRUD API** (axum) over the testimonials table, including the global
//!   reorder operations
//! - **Avatar storage** with two-phase staging for images fetched before
//!   their record exists
//! - **Tweet metadata fetching** via the public oEmbed endpoint, best-effort
//! - **Export bundling**: the public JSON projection plus avatar files as a
//!   downloadable zip
//! - **Identity gate**: editors are authenticated by a fronting proxy and
//!   restricted to a corporate email domain

mod api;
mod auth;
mod avatar_store;
mod config;
mod error;
mod export;
mod fetcher;

use std::sync::{Arc, Mutex};

use tracing::info;
use tracing_subscriber::EnvFilter;

use vouch_store::Database;

use crate::api::AppState;
use crate::avatar_store::AvatarStore;
use crate::config::ServerConfig;
use crate::fetcher::TweetFetcher;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,vouch_server=debug")),
        )
        .init();

    info!(
        "Starting testimonial admin server v{}",
        env!("CARGO_PKG_VERSION")
    );

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Initialize subsystems
    // -----------------------------------------------------------------------

    let database = match &config.database_path {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            Database::open_at(path)?
        }
        None => Database::new()?,
    };
    let db = Arc::new(Mutex::new(database));

    // Avatar store (creates the directory if missing)
    let avatars = Arc::new(AvatarStore::new(config.avatars_dir()).await?);

    let fetcher = Arc::new(TweetFetcher::new());

    let http_addr = config.http_addr;
    let temp_avatar_ttl = std::time::Duration::from_secs(config.temp_avatar_ttl_secs);

    // Application state for the HTTP API
    let app_state = AppState {
        db,
        avatars: avatars.clone(),
        fetcher,
        config: Arc::new(config),
    };

    // -----------------------------------------------------------------------
    // 4. Spawn background tasks
    // -----------------------------------------------------------------------

    // Periodic sweep of staged avatars that were fetched but never claimed
    // by a created record.
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(temp_avatar_ttl);
        loop {
            interval.tick().await;
            if let Err(e) = avatars.sweep_stale(temp_avatar_ttl).await {
                tracing::warn!(error = %e, "stale avatar sweep failed");
            }
        }
    });

    // -----------------------------------------------------------------------
    // 5. Run the HTTP API server (blocks until shutdown)
    // -----------------------------------------------------------------------
    // tokio::select! ensures that if either the HTTP server or a shutdown
    // signal arrives, we exit cleanly.
    tokio::select! {
        result = api::serve(app_state, http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
