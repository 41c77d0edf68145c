//! # Vector Retriever
//! Ranks quotes by cosine similarity between an embedded query and the
//! pre-computed corpus vectors. Never fails: while resources are not ready, or
//! when anything goes wrong, it answers from the static catalog instead.

pub mod embedding;
pub mod index;
pub mod resource;

use std::sync::Arc;

use metrics::counter;
use tracing::{debug, warn};

use crate::catalog;
use crate::config::RetrieverConfig;
use crate::error::ResourceError;
use crate::quote::{CandidateSet, Origin, ScoredQuote};

pub use embedding::{build_embedder, Embedder, HashingEmbedder, HttpEmbedder};
pub use index::{l2_normalize, FlatIndex};
pub use resource::{ReadinessState, ResourceManager};

#[derive(Clone)]
pub struct VectorRetriever {
    resources: Arc<ResourceManager>,
}

impl VectorRetriever {
    pub fn new(resources: Arc<ResourceManager>) -> Self {
        Self { resources }
    }

    pub fn from_config(cfg: &RetrieverConfig) -> Self {
        let embedder: Arc<dyn Embedder> = Arc::from(build_embedder(cfg));
        Self::new(Arc::new(ResourceManager::new(
            cfg.index_path.clone(),
            cfg.dataset_path.clone(),
            embedder,
        )))
    }

    pub fn resources(&self) -> &Arc<ResourceManager> {
        &self.resources
    }

    pub fn readiness(&self) -> ReadinessState {
        self.resources.state()
    }

    /// Up to `k` candidates ordered by descending similarity.
    pub async fn retrieve(&self, query_text: &str, k: usize) -> CandidateSet {
        let k = k.max(1);
        if query_text.trim().is_empty() {
            return fallback(query_text, k, "empty query");
        }

        let Some(corpus) = self.resources.corpus() else {
            // Kick the background load if nobody has yet; never wait for it.
            self.resources.ensure_loaded();
            return fallback(query_text, k, "resources not ready");
        };

        let mut query = match self.resources.embedder().embed(query_text).await {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "query embedding failed");
                return fallback(query_text, k, "embedding failed");
            }
        };
        if query.len() != corpus.index.dim() {
            warn!(
                query_dim = query.len(),
                index_dim = corpus.index.dim(),
                "embedding dimension does not match index"
            );
            return fallback(query_text, k, "dimension mismatch");
        }
        if !l2_normalize(&mut query) {
            return fallback(query_text, k, "degenerate query vector");
        }

        let quotes: Vec<ScoredQuote> = corpus
            .index
            .search(&query, k)
            .into_iter()
            .filter_map(|(pos, similarity)| {
                corpus.quotes.get(pos).map(|q| ScoredQuote {
                    quote: q.clone(),
                    similarity,
                })
            })
            .collect();
        counter!("retrieval_embedding_total").increment(1);
        debug!(hits = quotes.len(), k, "embedding retrieval");
        CandidateSet::new(quotes, Origin::Embedding)
    }
}

/// Embed every quote text and build an index aligned with `quotes`.
pub async fn build_index(
    embedder: &dyn Embedder,
    quotes: &[crate::quote::Quote],
) -> Result<FlatIndex, ResourceError> {
    let mut vectors = Vec::with_capacity(quotes.len());
    for (i, q) in quotes.iter().enumerate() {
        let v = embedder.embed(&q.text).await?;
        if let Some(first) = vectors.first().map(Vec::len) {
            if v.len() != first {
                return Err(ResourceError::Embedder(format!(
                    "row {i} embedded to {} dims, expected {first}",
                    v.len()
                )));
            }
        }
        vectors.push(v);
    }
    let dim = vectors.first().map_or(0, Vec::len);
    FlatIndex::from_vectors(dim, vectors).map_err(ResourceError::Embedder)
}

fn fallback(query_text: &str, k: usize, why: &'static str) -> CandidateSet {
    counter!("retrieval_fallback_total").increment(1);
    debug!(reason = why, "catalog fallback");
    catalog::fallback(query_text, k)
}
