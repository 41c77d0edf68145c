//! Embed the quote dataset with the configured embedder and write the vector
//! index the retriever loads at runtime.
//!
//! Paths and the embedding model come from the same config/env as the service
//! (`QUOTE_DATASET_PATH`, `VECTOR_INDEX_PATH`, `EMBEDDING_MODEL`, ...).

use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use quote_recommender::retriever::{build_embedder, build_index, index::load_dataset, Embedder};
use quote_recommender::{logging, AppConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    logging::init_tracing();

    let cfg = AppConfig::load()?;
    let rc = &cfg.retriever;

    let quotes = load_dataset(&rc.dataset_path)?;
    info!(rows = quotes.len(), dataset = %rc.dataset_path.display(), "dataset loaded");

    let embedder: Arc<dyn Embedder> = Arc::from(build_embedder(rc));
    embedder.warm_up().await?;
    let index = build_index(embedder.as_ref(), &quotes).await?;

    if let Some(dir) = rc.index_path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating {}", dir.display()))?;
    }
    index
        .save(&rc.index_path)
        .with_context(|| format!("writing {}", rc.index_path.display()))?;

    println!(
        "wrote {} vectors ({} dims, model {}) to {}",
        index.len(),
        index.dim(),
        embedder.name(),
        rc.index_path.display()
    );
    Ok(())
}
