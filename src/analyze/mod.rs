// src/analyze/mod.rs
//! Language-model collaborators: the chat responder used on every ordinary turn
//! and the conversation analyzer used when a recommendation round starts.
//! The engine treats both as black boxes that may fail.

pub mod advice;
pub mod ai_adapter;

use async_trait::async_trait;

use crate::conversation::{Message, Role};
use crate::error::CollaboratorError;

pub use advice::{parse_advice, Advice};
pub use ai_adapter::{
    build_model_from_config, CompletionRequest, DynLanguageModel, LanguageModel, PromptMessage,
    Purpose, Speaker,
};

const CHAT_PROMPT: &str = "You are a warm, attentive companion. Listen to the user, \
reflect their feelings and keep replies short (at most three sentences).";

const ANALYSIS_PROMPT: &str = "Read the dialogue and describe the user's emotional state, \
the situation they are in and what they seem to need. Write one short paragraph.";

const ADVICE_PROMPT: &str = "Based on the analysis, answer with a single JSON object and \
nothing else: {\"advice\": \"<at most three gentle sentences addressed to the user>\", \
\"keywords\": [\"<up to five keywords>\"]}";

#[async_trait]
pub trait ChatResponder: Send + Sync {
    /// Reply to `input` given the prior `history`.
    async fn reply(&self, history: &[Message], input: &str) -> Result<String, CollaboratorError>;
}

#[async_trait]
pub trait ConversationAnalyzer: Send + Sync {
    /// Free-text analysis of the whole dialogue.
    async fn summarize(&self, history: &[Message]) -> Result<String, CollaboratorError>;
    /// Advice and keywords derived from an analysis.
    async fn advise(&self, summary: &str) -> Result<Advice, CollaboratorError>;
}

/// Both collaborators backed by one language model.
#[derive(Clone)]
pub struct LlmCollaborator {
    model: DynLanguageModel,
    history_window: usize,
}

impl LlmCollaborator {
    pub fn new(model: DynLanguageModel, history_window: usize) -> Self {
        Self {
            model,
            history_window,
        }
    }

    pub fn provider_name(&self) -> &'static str {
        self.model.provider_name()
    }
}

fn speaker(role: Role) -> Speaker {
    match role {
        Role::User => Speaker::User,
        Role::Assistant => Speaker::Assistant,
    }
}

fn transcript(history: &[Message]) -> String {
    history
        .iter()
        .map(|m| match m.role {
            Role::User => format!("User: {}", m.text),
            Role::Assistant => format!("Assistant: {}", m.text),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait]
impl ChatResponder for LlmCollaborator {
    async fn reply(&self, history: &[Message], input: &str) -> Result<String, CollaboratorError> {
        let start = history.len().saturating_sub(self.history_window);
        let mut messages = vec![PromptMessage::new(Speaker::System, CHAT_PROMPT)];
        messages.extend(
            history[start..]
                .iter()
                .map(|m| PromptMessage::new(speaker(m.role), m.text.clone())),
        );
        messages.push(PromptMessage::new(Speaker::User, input));
        let req = CompletionRequest {
            purpose: Purpose::Chat,
            messages,
        };
        self.model.complete(&req).await
    }
}

#[async_trait]
impl ConversationAnalyzer for LlmCollaborator {
    async fn summarize(&self, history: &[Message]) -> Result<String, CollaboratorError> {
        let req = CompletionRequest {
            purpose: Purpose::Analysis,
            messages: vec![
                PromptMessage::new(Speaker::System, ANALYSIS_PROMPT),
                PromptMessage::new(
                    Speaker::User,
                    format!("Analyze the following dialogue.\n\n{}", transcript(history)),
                ),
            ],
        };
        self.model.complete(&req).await
    }

    async fn advise(&self, summary: &str) -> Result<Advice, CollaboratorError> {
        let req = CompletionRequest {
            purpose: Purpose::Advice,
            messages: vec![
                PromptMessage::new(Speaker::System, ADVICE_PROMPT),
                PromptMessage::new(Speaker::User, summary),
            ],
        };
        let raw = self.model.complete(&req).await?;
        parse_advice(&raw)
    }
}
