//! Affinity Service - triggers the user × category matrix factorization stage
//!
//! Port: 7860 (default)

use actix_web::{web, App, HttpServer};
use anyhow::Context;
use poppy_affinity::server::{configure_routes, AppState};
use poppy_affinity::{load_dotenv, ServiceConfig};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let config = ServiceConfig::load()
        .context("Failed to load affinity configuration")?;
    let config = Arc::new(config);
    let bind_addr = config.bind_addr();

    info!(
        category_type = %config.stage.category_type,
        reducer = %config.stage.reducer,
        rank = config.stage.sgd.rank,
        epochs = config.stage.sgd.epochs,
        "Starting Affinity Service on {}",
        bind_addr
    );

    let state = web::Data::new(AppState { config });

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .configure(configure_routes)
    })
    .bind(&bind_addr)
    .with_context(|| format!("Failed to bind {}", bind_addr))?
    .run()
    .await?;

    Ok(())
}
