// src/config/ai.rs
use serde::{Deserialize, Serialize};
use std::env;

fn default_provider() -> String {
    "openai".to_string()
}
fn default_base_url() -> String {
    "https://api.upstage.ai/v1".to_string()
}
fn default_model() -> String {
    "solar-pro".to_string()
}
fn default_api_key() -> String {
    "ENV".to_string()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    300
}

/// Language-model collaborator settings (chat, analysis, advice).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    #[serde(default)]
    pub enabled: bool,
    /// "openai" (any OpenAI-compatible chat completions endpoint) | "disabled"
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// "ENV" means: read from LLM_API_KEY
    #[serde(default = "default_api_key")]
    pub api_key: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: default_provider(),
            base_url: default_base_url(),
            model: default_model(),
            api_key: default_api_key(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

impl AiConfig {
    /// Lowercase the provider, resolve an "ENV" key and clamp sampling knobs.
    pub fn normalized(mut self) -> Self {
        self.provider = self.provider.trim().to_lowercase();

        if self.api_key.trim().eq_ignore_ascii_case("env") {
            self.api_key = env::var("LLM_API_KEY").unwrap_or_default();
        }

        if !(0.0..=2.0).contains(&self.temperature) {
            self.temperature = default_temperature();
        }
        if self.max_tokens == 0 {
            self.max_tokens = default_max_tokens();
        }
        self
    }

    /// Remote calls are only attempted with a provider and a key.
    pub fn is_usable(&self) -> bool {
        self.enabled && self.provider == "openai" && !self.api_key.trim().is_empty()
    }
}
