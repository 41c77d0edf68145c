//! Lazy, once-only loading of the heavy retrieval resources (vector index,
//! dataset, embedding model). Consumers never wait on the load; they branch on
//! [`ResourceManager::state`] and fall back while it is not `Ready`.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use once_cell::sync::OnceCell;
use serde::Serialize;
use tracing::{info, warn};

use super::embedding::Embedder;
use super::index::{load_dataset, FlatIndex};
use crate::error::ResourceError;
use crate::quote::Quote;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadinessState {
    NotLoaded,
    Loading,
    Ready,
    Failed,
}

impl ReadinessState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Loading,
            2 => Self::Ready,
            3 => Self::Failed,
            _ => Self::NotLoaded,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::NotLoaded => 0,
            Self::Loading => 1,
            Self::Ready => 2,
            Self::Failed => 3,
        }
    }
}

/// Index and dataset, aligned row for row. Read-only once built.
#[derive(Debug)]
pub struct LoadedCorpus {
    pub index: FlatIndex,
    pub quotes: Vec<Quote>,
}

pub struct ResourceManager {
    index_path: PathBuf,
    dataset_path: PathBuf,
    embedder: Arc<dyn Embedder>,
    state: AtomicU8,
    corpus: OnceCell<Arc<LoadedCorpus>>,
}

impl ResourceManager {
    pub fn new(index_path: PathBuf, dataset_path: PathBuf, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            index_path,
            dataset_path,
            embedder,
            state: AtomicU8::new(ReadinessState::NotLoaded.as_u8()),
            corpus: OnceCell::new(),
        }
    }

    pub fn state(&self) -> ReadinessState {
        ReadinessState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_ready(&self) -> bool {
        self.state() == ReadinessState::Ready
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    pub fn corpus(&self) -> Option<Arc<LoadedCorpus>> {
        self.corpus.get().cloned()
    }

    /// Claim the load if nobody has yet. Only the caller that flips
    /// `NotLoaded -> Loading` gets `true`.
    fn claim(&self) -> bool {
        self.state
            .compare_exchange(
                ReadinessState::NotLoaded.as_u8(),
                ReadinessState::Loading.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Start the load in a background task and return immediately.
    /// Concurrent and repeated calls trigger at most one load.
    pub fn ensure_loaded(self: &Arc<Self>) {
        if !self.claim() {
            return;
        }
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.run_load().await;
        });
    }

    /// Load inline (used at startup by tooling and tests). Returns the final state.
    pub async fn load_now(&self) -> ReadinessState {
        if self.claim() {
            self.run_load().await;
        }
        self.state()
    }

    async fn run_load(&self) {
        info!(
            index = %self.index_path.display(),
            dataset = %self.dataset_path.display(),
            embedder = self.embedder.name(),
            "loading retrieval resources"
        );
        let result = async {
            let corpus = self.read_corpus().await?;
            self.embedder.warm_up().await?;
            Ok::<_, ResourceError>(corpus)
        }
        .await;
        match result {
            Ok(corpus) => {
                let n = corpus.quotes.len();
                let _ = self.corpus.set(Arc::new(corpus));
                self.state
                    .store(ReadinessState::Ready.as_u8(), Ordering::Release);
                info!(quotes = n, "retrieval resources ready");
            }
            Err(e) => {
                self.state
                    .store(ReadinessState::Failed.as_u8(), Ordering::Release);
                warn!(error = %e, "retrieval resources unavailable; using catalog fallback");
            }
        }
    }

    async fn read_corpus(&self) -> Result<LoadedCorpus, ResourceError> {
        let index_path = self.index_path.clone();
        let dataset_path = self.dataset_path.clone();
        let joined = tokio::task::spawn_blocking(move || {
            let index = FlatIndex::load(&index_path)?;
            let quotes = load_dataset(&dataset_path)?;
            Ok::<_, ResourceError>((index, quotes))
        })
        .await
        .map_err(|e| ResourceError::Embedder(format!("load task failed: {e}")))?;
        let (index, quotes) = joined?;
        if index.len() != quotes.len() {
            return Err(ResourceError::Misaligned {
                vectors: index.len(),
                rows: quotes.len(),
            });
        }
        Ok(LoadedCorpus { index, quotes })
    }
}
