use anyhow::Result;
use axum::Router;
use std::{io::ErrorKind, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

mod config;
mod errors;
mod handlers;
mod models;
mod routes;
mod services;
mod state;

use config::{AppConfig, Backend};
use services::{
    listing::ListingOptions,
    memory_store::MemoryStore,
    object_store::ObjectStore,
    ratings_repository::RatingsOptions,
    s3_store::{S3Config, S3Store},
};
use state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Parse config (loads .env first) ---
    let cfg = AppConfig::from_env_and_args()?;

    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Starting image-rater with config: {:?}", cfg);

    // --- Initialize object store ---
    let store = build_store(&cfg).await;
    tracing::info!(backend = store.name(), "object store ready");
    if cfg.unconditional_writes {
        tracing::warn!("conditional writes disabled; concurrent ratings may be lost");
    }

    // --- Initialize core services ---
    let listing = ListingOptions {
        prefix: cfg.prefix.clone(),
        page_size: cfg.page_size,
        max_pages: cfg.max_pages,
        excluded_keys: Vec::new(),
    };
    let ratings = RatingsOptions {
        key: cfg.ratings_key.clone(),
        write_attempts: cfg.write_attempts,
        conditional_writes: !cfg.unconditional_writes,
    };
    let state = AppState::new(store, listing, ratings, cfg.public_base_url.as_str());

    // --- Build router ---
    let app: Router = routes::routes::app(state, &cfg.cors_origins);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn build_store(cfg: &AppConfig) -> Arc<dyn ObjectStore> {
    match cfg.backend {
        Backend::S3 => {
            let store = S3Store::new(S3Config {
                bucket: cfg.bucket.clone().unwrap_or_default(),
                region: cfg.region.clone(),
                endpoint: cfg.endpoint.clone(),
            })
            .await;
            Arc::new(store)
        }
        Backend::Memory => {
            let store = MemoryStore::new();
            for key in &cfg.seed_keys {
                store.insert(key.clone(), Vec::new()).await;
            }
            tracing::info!(images = cfg.seed_keys.len(), "seeded memory bucket");
            Arc::new(store)
        }
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", err);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
