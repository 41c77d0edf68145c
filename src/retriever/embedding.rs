//! Text embedders: an OpenAI-compatible HTTP provider and a local, deterministic
//! feature-hashing embedder used offline and in tests.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::config::RetrieverConfig;
use crate::error::ResourceError;

/// Max characters sent to a remote embedding endpoint.
const MAX_EMBED_CHARS: usize = 8_000;

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed one text. Output is not guaranteed to be normalized.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ResourceError>;

    /// Make sure the model is usable before the index is declared ready.
    async fn warm_up(&self) -> Result<(), ResourceError> {
        Ok(())
    }

    fn name(&self) -> &str;
}

/// Build the embedder named by `cfg.embedding_model`.
/// `hashing` / `hashing:<dim>` selects the local embedder; anything else is a
/// remote model id served at `cfg.embedding_base_url`.
pub fn build_embedder(cfg: &RetrieverConfig) -> Box<dyn Embedder> {
    if let Some(rest) = cfg.embedding_model.strip_prefix("hashing") {
        let dim = rest
            .trim_start_matches(':')
            .parse::<usize>()
            .unwrap_or(HashingEmbedder::DEFAULT_DIM);
        return Box::new(HashingEmbedder::new(dim));
    }
    Box::new(HttpEmbedder::new(
        cfg.embedding_base_url.clone(),
        cfg.embedding_model.clone(),
        cfg.embedding_api_key.clone(),
    ))
}

// ------------------------------------------------------------
// Remote provider
// ------------------------------------------------------------

pub struct HttpEmbedder {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

impl HttpEmbedder {
    pub fn new(base_url: String, model: String, api_key: String) -> Self {
        let http = reqwest::Client::builder()
            .user_agent("quote-recommender/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_default();
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            api_key,
        }
    }

    fn url(&self) -> String {
        format!("{}/embeddings", self.base_url)
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ResourceError> {
        let input: String = text.chars().take(MAX_EMBED_CHARS).collect();
        let req = EmbeddingRequest {
            model: &self.model,
            input: &input,
        };
        let resp = self
            .http
            .post(self.url())
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await
            .map_err(|e| ResourceError::Embedder(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(ResourceError::Embedder(format!(
                "embedding endpoint returned HTTP {}",
                resp.status().as_u16()
            )));
        }
        let body: EmbeddingResponse = resp
            .json()
            .await
            .map_err(|e| ResourceError::Embedder(e.to_string()))?;
        let vector = body
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| ResourceError::Embedder("no embedding in response".into()))?;
        debug!(dims = vector.len(), model = %self.model, "embedded query");
        Ok(vector)
    }

    async fn warm_up(&self) -> Result<(), ResourceError> {
        if self.api_key.trim().is_empty() {
            return Err(ResourceError::Embedder(
                "no API key configured for the embedding endpoint".into(),
            ));
        }
        if self.model.trim().is_empty() {
            return Err(ResourceError::Embedder("no embedding model configured".into()));
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.model
    }
}

// ------------------------------------------------------------
// Local feature-hashing embedder
// ------------------------------------------------------------

/// Signed feature hashing over lowercase word tokens and character bigrams.
/// Deterministic across processes, so an index built with it stays valid.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dim: usize,
}

impl HashingEmbedder {
    pub const DEFAULT_DIM: usize = 256;

    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(8) }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Synchronous embedding; also used by tooling that builds an index.
    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut out = vec![0.0f32; self.dim];
        for feature in features(text) {
            let digest = Sha256::digest(feature.as_bytes());
            let mut bucket = [0u8; 8];
            bucket.copy_from_slice(&digest[..8]);
            let slot = (u64::from_le_bytes(bucket) % self.dim as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            out[slot] += sign;
        }
        out
    }
}

fn features(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
    {
        let word = word.to_lowercase();
        let chars: Vec<char> = word.chars().collect();
        for pair in chars.windows(2) {
            out.push(format!("b:{}{}", pair[0], pair[1]));
        }
        out.push(format!("w:{word}"));
    }
    out
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ResourceError> {
        Ok(self.embed_sync(text))
    }

    fn name(&self) -> &str {
        "hashing"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashing_is_deterministic() {
        let e = HashingEmbedder::new(64);
        assert_eq!(e.embed_sync("시험을 망쳤어요"), e.embed_sync("시험을 망쳤어요"));
        assert_eq!(e.embed_sync("abc").len(), 64);
    }

    #[test]
    fn empty_text_embeds_to_zero_vector() {
        let e = HashingEmbedder::new(16);
        assert!(e.embed_sync("   ").iter().all(|v| *v == 0.0));
    }

    #[test]
    fn builder_selects_local_embedder() {
        let cfg = RetrieverConfig {
            embedding_model: "hashing:32".into(),
            ..RetrieverConfig::default()
        };
        assert_eq!(build_embedder(&cfg).name(), "hashing");
    }

    #[tokio::test]
    async fn remote_embedder_without_key_fails_warm_up() {
        let e = HttpEmbedder::new("http://localhost:9".into(), "m".into(), String::new());
        assert!(e.warm_up().await.is_err());
    }
}
