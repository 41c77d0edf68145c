//! AI adapter: provider abstraction over chat-completion style language models.
//! The real provider speaks the OpenAI-compatible `/chat/completions` API (the
//! Upstage Solar endpoint is one such); mock and failing providers give
//! deterministic behavior for local runs and tests.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::AiConfig;
use crate::error::CollaboratorError;

// ------------------------------------------------------------
// Public surface
// ------------------------------------------------------------

/// Why a completion is requested. Providers may ignore it; the mock uses it to
/// answer each stage with a well-formed response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Purpose {
    Chat,
    Analysis,
    Advice,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize)]
pub struct PromptMessage {
    pub role: Speaker,
    pub content: String,
}

impl PromptMessage {
    pub fn new(role: Speaker, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub purpose: Purpose,
    pub messages: Vec<PromptMessage>,
}

pub type Completion<'a> =
    Pin<Box<dyn Future<Output = Result<String, CollaboratorError>> + Send + 'a>>;

/// Trait object used by the collaborators (and swapped out in tests).
pub trait LanguageModel: Send + Sync {
    fn complete<'a>(&'a self, req: &'a CompletionRequest) -> Completion<'a>;
    /// Provider name for diagnostics/health.
    fn provider_name(&self) -> &'static str;
}

pub type DynLanguageModel = Arc<dyn LanguageModel>;

/// Factory: build a model according to config and environment variables.
///
/// * `AI_TEST_MODE=mock` returns the deterministic mock.
/// * `AI_TEST_MODE=error` returns a provider that always fails.
/// * Else if the config is not usable (disabled / no key), returns a disabled client.
/// * Else builds the OpenAI-compatible provider.
pub fn build_model_from_config(config: &AiConfig) -> DynLanguageModel {
    match std::env::var("AI_TEST_MODE").as_deref() {
        Ok("mock") => return Arc::new(MockModel),
        Ok("error") => return Arc::new(FailingModel),
        _ => {}
    }

    if !config.is_usable() {
        return Arc::new(DisabledClient);
    }
    Arc::new(OpenAiCompatible::new(config))
}

// ------------------------------------------------------------
// Concrete providers
// ------------------------------------------------------------

pub struct OpenAiCompatible {
    http: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAiCompatible {
    pub fn new(config: &AiConfig) -> Self {
        let http = reqwest::Client::builder()
            .user_agent("quote-recommender/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self {
            http,
            url: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }

    async fn fetch(&self, req: &CompletionRequest) -> Result<String, CollaboratorError> {
        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            messages: &'a [PromptMessage],
            temperature: f32,
            max_tokens: u32,
        }
        #[derive(Deserialize)]
        struct Resp {
            choices: Vec<Choice>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: ChoiceMsg,
        }
        #[derive(Deserialize)]
        struct ChoiceMsg {
            content: Option<String>,
        }

        let body = Req {
            model: &self.model,
            messages: &req.messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let resp = self
            .http
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(CollaboratorError::Status(resp.status().as_u16()));
        }
        let parsed: Resp = resp
            .json()
            .await
            .map_err(|e| CollaboratorError::Malformed(e.to_string()))?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        let cleaned = clean_text(&content, MAX_COMPLETION_CHARS);
        if cleaned.is_empty() {
            Err(CollaboratorError::Empty)
        } else {
            Ok(cleaned)
        }
    }
}

impl LanguageModel for OpenAiCompatible {
    fn complete<'a>(&'a self, req: &'a CompletionRequest) -> Completion<'a> {
        Box::pin(self.fetch(req))
    }
    fn provider_name(&self) -> &'static str {
        "openai"
    }
}

/// Always fails with `Disabled`; used when no provider is configured.
pub struct DisabledClient;

impl LanguageModel for DisabledClient {
    fn complete<'a>(&'a self, _req: &'a CompletionRequest) -> Completion<'a> {
        Box::pin(async { Err(CollaboratorError::Disabled) })
    }
    fn provider_name(&self) -> &'static str {
        "disabled"
    }
}

/// Always fails with a transport-like error.
pub struct FailingModel;

impl LanguageModel for FailingModel {
    fn complete<'a>(&'a self, _req: &'a CompletionRequest) -> Completion<'a> {
        Box::pin(async { Err(CollaboratorError::Status(503)) })
    }
    fn provider_name(&self) -> &'static str {
        "error"
    }
}

/// Deterministic provider for tests/local runs. Echoes the dialogue back in a
/// shape each stage accepts.
#[derive(Clone, Default)]
pub struct MockModel;

impl MockModel {
    fn answer(req: &CompletionRequest) -> String {
        let last_user = req
            .messages
            .iter()
            .rev()
            .find(|m| m.role == Speaker::User)
            .map(|m| m.content.as_str())
            .unwrap_or("");
        match req.purpose {
            Purpose::Chat => format!("I hear you: {last_user}"),
            Purpose::Analysis => format!("Summary of the dialogue. {last_user}"),
            Purpose::Advice => serde_json::json!({
                "advice": "Be gentle with yourself; every day is a new beginning.",
                "keywords": ["mock", "dialogue"]
            })
            .to_string(),
        }
    }
}

impl LanguageModel for MockModel {
    fn complete<'a>(&'a self, req: &'a CompletionRequest) -> Completion<'a> {
        let out = Self::answer(req);
        Box::pin(async move { Ok(out) })
    }
    fn provider_name(&self) -> &'static str {
        "mock"
    }
}

// ------------------------------------------------------------
// Sanitization
// ------------------------------------------------------------

const MAX_COMPLETION_CHARS: usize = 2_000;

/// Drop control characters (newlines survive), collapse runs of spaces, trim,
/// and cap the length in characters.
pub fn clean_text(input: &str, max_chars: usize) -> String {
    let mut out = String::with_capacity(input.len().min(max_chars * 4));
    let mut prev_space = false;
    let mut count = 0usize;
    for ch in input.chars() {
        let c = match ch {
            '\r' => continue,
            '\t' => ' ',
            '\n' => '\n',
            c if c.is_control() => continue,
            c => c,
        };
        if c == ' ' {
            if prev_space || out.is_empty() {
                continue;
            }
            prev_space = true;
        } else {
            prev_space = false;
        }
        out.push(c);
        count += 1;
        if count >= max_chars {
            break;
        }
    }
    out.trim().to_string()
}
