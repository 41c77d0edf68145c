//! Quote Recommender — Binary Entrypoint
//! Boots the Axum HTTP server on Shuttle: config, tracing, engine, routes.

use shuttle_axum::ShuttleAxum;
use tracing::info;

use quote_recommender::{app, logging, AppConfig};

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();

    logging::init_tracing();

    let cfg = AppConfig::load()?;
    info!(
        threshold = cfg.engine.turn_threshold,
        max_input_chars = cfg.engine.max_input_chars,
        preload = cfg.retriever.preload,
        "configuration loaded"
    );

    let router = app(&cfg);
    Ok(router.into())
}
