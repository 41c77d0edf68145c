//! Layered configuration: defaults, then an optional TOML file, then
//! environment overrides.

pub mod ai;

use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::info;

pub use ai::AiConfig;

pub const DEFAULT_CONFIG_PATH: &str = "config/quote.toml";
pub const ENV_CONFIG_PATH: &str = "QUOTE_CONFIG_PATH";

/// What text the retriever is queried with once analysis triggers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryStrategy {
    /// The analyzer's summary of the whole dialogue.
    #[default]
    Summary,
    /// All user messages joined with a space.
    UserMessages,
}

impl QueryStrategy {
    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "summary" => Some(Self::Summary),
            "user_messages" | "user-messages" | "raw" => Some(Self::UserMessages),
            _ => None,
        }
    }
}

fn words(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub turn_threshold: usize,
    pub max_input_chars: usize,
    pub top_k: usize,
    pub query_strategy: QueryStrategy,
    /// Messages of history handed to the chat collaborator.
    pub history_window: usize,
    pub quit_commands: Vec<String>,
    pub affirmative: Vec<String>,
    pub negative: Vec<String>,
    pub cancel: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            turn_threshold: 10,
            max_input_chars: 150,
            top_k: 3,
            query_strategy: QueryStrategy::Summary,
            history_window: 6,
            quit_commands: words(&["quit", "exit", "종료"]),
            affirmative: words(&["예", "yes", "y", "네", "선택", "select"]),
            negative: words(&["아니오", "no", "n", "아니", "다음", "next"]),
            cancel: words(&["취소", "cancel"]),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrieverConfig {
    /// Remote model id, or `hashing[:dim]` for the local embedder.
    pub embedding_model: String,
    pub embedding_base_url: String,
    pub embedding_api_key: String,
    pub index_path: PathBuf,
    pub dataset_path: PathBuf,
    /// Start loading resources at boot instead of on first retrieval.
    pub preload: bool,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            embedding_model: "embedding-query".to_string(),
            embedding_base_url: "https://api.upstage.ai/v1".to_string(),
            embedding_api_key: String::new(),
            index_path: PathBuf::from("data/quotes_index.json"),
            dataset_path: PathBuf::from("data/quotes.jsonl"),
            preload: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub engine: EngineConfig,
    pub retriever: RetrieverConfig,
    pub ai: AiConfig,
}

impl AppConfig {
    /// Load from `$QUOTE_CONFIG_PATH` (or the default path if present) and the
    /// process environment.
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var(ENV_CONFIG_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
        let base = if path.exists() {
            let raw = fs::read_to_string(&path)
                .with_context(|| format!("reading config from {}", path.display()))?;
            let cfg = Self::from_toml_str(&raw)
                .with_context(|| format!("parsing config {}", path.display()))?;
            info!(path = %path.display(), "config file loaded");
            cfg
        } else {
            Self::default()
        };
        let mut cfg = base.with_env(|k| std::env::var(k).ok());
        cfg.ai = cfg.ai.normalized();
        Ok(cfg)
    }

    pub fn from_toml_str(s: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str::<Self>(s)?.sanitized())
    }

    /// Apply overrides from a variable lookup (the process environment in
    /// production, a map in tests).
    pub fn with_env<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let num = |k: &str| lookup(k).and_then(|v| v.trim().parse::<usize>().ok());

        if let Some(v) = num("TURN_THRESHOLD") {
            self.engine.turn_threshold = v;
        }
        if let Some(v) = num("MAX_INPUT_CHARS") {
            self.engine.max_input_chars = v;
        }
        if let Some(v) = num("TOP_K") {
            self.engine.top_k = v;
        }
        if let Some(v) = lookup("QUERY_STRATEGY").and_then(|s| QueryStrategy::parse(&s)) {
            self.engine.query_strategy = v;
        }

        if let Some(v) = lookup("EMBEDDING_MODEL") {
            self.retriever.embedding_model = v;
        }
        if let Some(v) = lookup("EMBEDDING_BASE_URL") {
            self.retriever.embedding_base_url = v;
        }
        if let Some(v) = lookup("EMBEDDING_API_KEY").or_else(|| lookup("LLM_API_KEY")) {
            self.retriever.embedding_api_key = v;
        }
        if let Some(v) = lookup("VECTOR_INDEX_PATH") {
            self.retriever.index_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("QUOTE_DATASET_PATH") {
            self.retriever.dataset_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("EMBEDDING_PRELOAD") {
            self.retriever.preload = v != "0" && !v.eq_ignore_ascii_case("false");
        }

        if let Some(v) = lookup("LLM_PROVIDER") {
            self.ai.provider = v;
            self.ai.enabled = !self.ai.provider.eq_ignore_ascii_case("disabled");
        }
        if let Some(v) = lookup("LLM_BASE_URL") {
            self.ai.base_url = v;
        }
        if let Some(v) = lookup("LLM_MODEL") {
            self.ai.model = v;
        }
        if let Some(v) = lookup("LLM_API_KEY") {
            self.ai.api_key = v;
        }

        self.sanitized()
    }

    fn sanitized(mut self) -> Self {
        self.engine.turn_threshold = self.engine.turn_threshold.max(1);
        self.engine.top_k = self.engine.top_k.max(1);
        self.engine.max_input_chars = self.engine.max_input_chars.max(1);
        self.engine.history_window = self.engine.history_window.max(1);
        for list in [
            &mut self.engine.quit_commands,
            &mut self.engine.affirmative,
            &mut self.engine.negative,
            &mut self.engine.cancel,
        ] {
            *list = list
                .iter()
                .map(|w| w.trim().to_lowercase())
                .filter(|w| !w.is_empty())
                .collect();
        }
        self
    }
}
