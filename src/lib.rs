// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod analyze;
pub mod api;
pub mod catalog;
pub mod config;
pub mod conversation;
pub mod engine;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod quote;
pub mod retriever;
pub mod session;

// ---- Re-exports for stable public API ----
pub use crate::api::{router, AppState};
pub use crate::config::AppConfig;
pub use crate::engine::{QuoteEngine, SessionStatus, TurnEvent, TurnReply};
pub use crate::error::{EngineError, ValidationError};

use axum::Router;
use tracing::info;

/// Build the full application from configuration: engine, router and, when
/// configured, the background load of the retrieval resources.
pub fn app(cfg: &AppConfig) -> Router {
    let state = AppState::from_config(cfg);
    if cfg.retriever.preload {
        state.engine.retriever().resources().ensure_loaded();
        info!(
            index = %cfg.retriever.index_path.display(),
            dataset = %cfg.retriever.dataset_path.display(),
            "retrieval resources loading in background"
        );
    }
    router(state)
}
