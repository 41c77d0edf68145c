//! # Conversation Engine
//! Drives one conversation per session key through chatting, analysis and the
//! quote selection cycle.
//!
//! Each call to [`QuoteEngine::send_message`] holds the session's slot lock for
//! the whole turn, computes the next [`Conversation`] value and stores it only
//! once the turn succeeded. Validation failures leave the stored value as it
//! was. Collaborator failures never surface: the chat falls back to an apology,
//! the analysis to an empty summary, and the advice to [`Advice::neutral`].

use std::sync::Arc;

use metrics::{counter, gauge};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::analyze::{
    build_model_from_config, Advice, ChatResponder, ConversationAnalyzer, LlmCollaborator,
};
use crate::config::{AppConfig, EngineConfig, QueryStrategy};
use crate::conversation::{AnalysisResult, Conversation, Phase, SessionKey};
use crate::error::{EngineError, ValidationError};
use crate::logging::anon_hash;
use crate::quote::{CandidateSet, Quote, ScoredQuote};
use crate::retriever::{ReadinessState, VectorRetriever};
use crate::session::SessionStore;

pub const APOLOGY: &str = "Sorry, I could not come up with a reply just now. Please tell me more.";
pub const NO_RECOMMENDATION: &str =
    "Sorry, I could not find a quote to recommend this time. Let's keep talking.";
pub const SELECTION_REPROMPT: &str =
    "Please answer yes or no (예/아니오), or type 취소 to stop the recommendation.";
pub const CYCLE_RESTART: &str =
    "You have seen all the candidates. Starting again from the first one.";
pub const CANCELLED: &str = "Okay, I stopped the recommendation. Let's keep talking.";
pub const READY_FOR_ROUND: &str = "Your next message will bring a new quote recommendation.";

/// Externally visible state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Idle,
    Chatting,
    AwaitingSelection,
}

/// What happened during one turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnEvent {
    /// Ordinary chat reply.
    Replied,
    /// Analysis ran and the first candidate was presented.
    Presented,
    /// Analysis ran but no candidate could be produced.
    Exhausted,
    /// The user declined; the next candidate was presented.
    NextCandidate,
    /// The user declined the last candidate; the cycle restarted at the first.
    CycleRestarted,
    /// The user confirmed the current candidate.
    Selected,
    /// The user abandoned the round.
    Cancelled,
    /// Input was neither yes nor no; nothing changed.
    Reprompted,
}

/// Snapshot used by the HTTP layer's `conversation_summary`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversationSummary {
    pub message_count: usize,
    pub turn_count: usize,
    pub analysis_ready: bool,
    pub selection_mode: bool,
    pub quote_selected: Option<Quote>,
    pub advice: Option<String>,
    pub keywords: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurnReply {
    pub content: String,
    pub event: TurnEvent,
    pub status: SessionStatus,
    /// Quote presented or selected this turn, if any.
    pub quote: Option<Quote>,
    pub analysis_complete: bool,
    pub advice: Option<String>,
    pub keywords: Option<Vec<String>>,
    pub summary: ConversationSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusReport {
    pub status: SessionStatus,
    pub content: String,
    pub turn_count: usize,
    pub current_quote: Option<Quote>,
    pub summary: Option<ConversationSummary>,
}

pub struct QuoteEngine {
    cfg: EngineConfig,
    sessions: Arc<SessionStore>,
    chat: Arc<dyn ChatResponder>,
    analyzer: Arc<dyn ConversationAnalyzer>,
    retriever: VectorRetriever,
    provider: &'static str,
}

impl QuoteEngine {
    pub fn new(
        cfg: EngineConfig,
        chat: Arc<dyn ChatResponder>,
        analyzer: Arc<dyn ConversationAnalyzer>,
        retriever: VectorRetriever,
    ) -> Self {
        Self {
            cfg,
            sessions: Arc::new(SessionStore::new()),
            chat,
            analyzer,
            retriever,
            provider: "custom",
        }
    }

    /// Wire the LLM collaborators and the retriever from configuration.
    pub fn from_config(cfg: &AppConfig) -> Self {
        let model = build_model_from_config(&cfg.ai);
        let collab = Arc::new(LlmCollaborator::new(model, cfg.engine.history_window));
        info!(
            provider = collab.provider_name(),
            threshold = cfg.engine.turn_threshold,
            top_k = cfg.engine.top_k,
            strategy = ?cfg.engine.query_strategy,
            "engine configured"
        );
        let provider = collab.provider_name();
        let mut engine = Self::new(
            cfg.engine.clone(),
            collab.clone(),
            collab,
            VectorRetriever::from_config(&cfg.retriever),
        );
        engine.provider = provider;
        engine
    }

    /// Name of the language model provider behind the collaborators.
    pub fn provider(&self) -> &'static str {
        self.provider
    }

    pub fn config(&self) -> &EngineConfig {
        &self.cfg
    }

    pub fn retriever(&self) -> &VectorRetriever {
        &self.retriever
    }

    pub fn readiness(&self) -> ReadinessState {
        self.retriever.readiness()
    }

    pub fn active_conversations(&self) -> usize {
        self.sessions.len()
    }

    /// Process one user message and return the reply for that turn.
    pub async fn send_message(
        &self,
        user_id: &str,
        thread_id: &str,
        content: &str,
    ) -> Result<TurnReply, EngineError> {
        let key = SessionKey::new(user_id, thread_id);
        let session = anon_hash(&key.to_string());

        let input = match validate_input(content, self.cfg.max_input_chars) {
            Ok(s) => s,
            Err(e) => {
                counter!("validation_errors_total").increment(1);
                debug!(%session, error = %e, "input rejected");
                return Err(e.into());
            }
        };

        let slot = self.sessions.get_or_create(&key);
        gauge!("active_conversations").set(self.sessions.len() as f64);
        let mut guard = slot.lock().await;

        let (next, reply) = match guard.phase() {
            Phase::AwaitingSelection => self.selection_turn(&guard, &input),
            Phase::Chatting => self.chat_turn(&guard, &input, &session).await,
        };
        *guard = next;
        Ok(reply)
    }

    /// Current state of a session. Unknown sessions report `Idle`; nothing is
    /// created.
    pub async fn get_status(&self, user_id: &str, thread_id: &str) -> StatusReport {
        let key = SessionKey::new(user_id, thread_id);
        let Some(slot) = self.sessions.get(&key) else {
            return StatusReport {
                status: SessionStatus::Idle,
                content: "No conversation has started yet.".to_string(),
                turn_count: 0,
                current_quote: None,
                summary: None,
            };
        };
        let convo = slot.lock().await.clone();
        let status = status_of(&convo);
        let set = convo.candidates();
        let current = set.and_then(CandidateSet::current);
        let content = match current {
            Some(c) => present(
                c,
                set.map_or(0, CandidateSet::cursor),
                set.map_or(0, CandidateSet::len),
            ),
            None if convo.turn_count() >= self.cfg.turn_threshold => {
                READY_FOR_ROUND.to_string()
            }
            None => format!(
                "{} of {} turns before a quote is recommended.",
                convo.turn_count(),
                self.cfg.turn_threshold
            ),
        };
        StatusReport {
            status,
            content,
            turn_count: convo.turn_count(),
            current_quote: current.map(|c| c.quote.clone()),
            summary: Some(self.summarize(&convo)),
        }
    }

    // ------------------------------------------------------------
    // Chatting
    // ------------------------------------------------------------

    async fn chat_turn(
        &self,
        convo: &Conversation,
        input: &str,
        session: &str,
    ) -> (Conversation, TurnReply) {
        counter!("turns_total").increment(1);

        let reply = match self.chat.reply(convo.messages(), input).await {
            Ok(r) => r,
            Err(e) => {
                counter!("collaborator_errors_total", "stage" => "chat").increment(1);
                warn!(%session, error = %e, "chat collaborator failed");
                APOLOGY.to_string()
            }
        };
        let convo = convo.with_turn(input, &reply);

        let quit = is_quit(input, &self.cfg.quit_commands);
        if !should_analyze(convo.turn_count(), self.cfg.turn_threshold, quit) {
            let summary = self.summarize(&convo);
            return (
                convo,
                TurnReply {
                    content: reply,
                    event: TurnEvent::Replied,
                    status: SessionStatus::Chatting,
                    quote: None,
                    analysis_complete: false,
                    advice: None,
                    keywords: None,
                    summary,
                },
            );
        }

        info!(%session, turns = convo.turn_count(), quit, "analysis triggered");
        self.recommendation_round(convo, session).await
    }

    async fn recommendation_round(
        &self,
        convo: Conversation,
        session: &str,
    ) -> (Conversation, TurnReply) {
        counter!("analyses_total").increment(1);

        let summary_text = match self.analyzer.summarize(convo.messages()).await {
            Ok(s) => s,
            Err(e) => {
                counter!("collaborator_errors_total", "stage" => "analysis").increment(1);
                warn!(%session, error = %e, "analysis failed; continuing without summary");
                String::new()
            }
        };

        let advice = if summary_text.trim().is_empty() {
            Advice::neutral()
        } else {
            match self.analyzer.advise(&summary_text).await {
                Ok(a) => a,
                Err(e) => {
                    counter!("collaborator_errors_total", "stage" => "advice").increment(1);
                    warn!(%session, error = %e, "advice failed; using neutral advice");
                    Advice::neutral()
                }
            }
        };

        let query = build_query(&convo, &summary_text, self.cfg.query_strategy);
        let candidates = self.retriever.retrieve(&query, self.cfg.top_k).await;
        debug!(
            %session,
            origin = ?candidates.origin(),
            count = candidates.len(),
            "candidates retrieved"
        );

        let analysis = AnalysisResult {
            summary_text,
            advice_text: advice.advice.clone(),
            keywords: advice.keywords.clone(),
        };
        let next = convo.with_round(analysis, candidates);

        let (content, event, quote) = match next.candidates().and_then(CandidateSet::current) {
            Some(first) => {
                let total = next.candidates().map_or(0, CandidateSet::len);
                (
                    format!("{}\n\n{}", advice.advice, present(first, 0, total)),
                    TurnEvent::Presented,
                    Some(first.quote.clone()),
                )
            }
            None => {
                warn!(%session, "no candidates; round exhausted");
                (
                    format!("{}\n\n{}", advice.advice, NO_RECOMMENDATION),
                    TurnEvent::Exhausted,
                    None,
                )
            }
        };

        let summary = self.summarize(&next);
        let reply = TurnReply {
            content,
            event,
            status: status_of(&next),
            quote,
            analysis_complete: true,
            advice: Some(advice.advice),
            keywords: Some(advice.keywords),
            summary,
        };
        (next, reply)
    }

    // ------------------------------------------------------------
    // Selection cycle
    // ------------------------------------------------------------

    fn selection_turn(&self, convo: &Conversation, input: &str) -> (Conversation, TurnReply) {
        let token = normalize_token(input);
        let answer = if self.cfg.affirmative.contains(&token) {
            Answer::Yes
        } else if self.cfg.negative.contains(&token) {
            Answer::No
        } else if self.cfg.cancel.contains(&token) {
            Answer::Cancel
        } else {
            Answer::Other
        };

        let (next, content, event, quote) = match answer {
            Answer::Yes => match convo.accepted() {
                Some((next, outcome)) => {
                    counter!("selections_total").increment(1);
                    let content = format!(
                        "Great choice! Here is your quote:\n\n\"{}\"\n- {}",
                        outcome.quote.text, outcome.author
                    );
                    (next, content, TurnEvent::Selected, Some(outcome.quote))
                }
                None => (
                    convo.abandoned(),
                    NO_RECOMMENDATION.to_string(),
                    TurnEvent::Exhausted,
                    None,
                ),
            },
            Answer::No => {
                let (next, wrapped) = convo.rejected();
                let set = next.candidates();
                let current = set.and_then(CandidateSet::current);
                let total = set.map_or(0, CandidateSet::len);
                let cursor = set.map_or(0, CandidateSet::cursor);
                let presented = current.map(|c| present(c, cursor, total)).unwrap_or_default();
                let (content, event) = if wrapped {
                    (format!("{CYCLE_RESTART}\n\n{presented}"), TurnEvent::CycleRestarted)
                } else {
                    (format!("Here is another one.\n\n{presented}"), TurnEvent::NextCandidate)
                };
                let quote = current.map(|c| c.quote.clone());
                (next, content, event, quote)
            }
            Answer::Cancel => (
                convo.abandoned(),
                CANCELLED.to_string(),
                TurnEvent::Cancelled,
                None,
            ),
            Answer::Other => (
                convo.clone(),
                SELECTION_REPROMPT.to_string(),
                TurnEvent::Reprompted,
                None,
            ),
        };

        let analysis = next.analysis().or(convo.analysis());
        let summary = self.summarize(&next);
        let reply = TurnReply {
            content,
            event,
            status: status_of(&next),
            quote,
            analysis_complete: true,
            advice: analysis.map(|a| a.advice_text.clone()),
            keywords: analysis.map(|a| a.keywords.clone()),
            summary,
        };
        (next, reply)
    }

    fn summarize(&self, convo: &Conversation) -> ConversationSummary {
        ConversationSummary {
            message_count: convo.messages().len(),
            turn_count: convo.turn_count(),
            analysis_ready: convo.turn_count() >= self.cfg.turn_threshold,
            selection_mode: convo.phase() == Phase::AwaitingSelection,
            quote_selected: convo.last_selection().map(|s| s.quote.clone()),
            advice: convo.analysis().map(|a| a.advice_text.clone()),
            keywords: convo.analysis().map(|a| a.keywords.clone()),
        }
    }
}

enum Answer {
    Yes,
    No,
    Cancel,
    Other,
}

fn status_of(convo: &Conversation) -> SessionStatus {
    match convo.phase() {
        Phase::Chatting => SessionStatus::Chatting,
        Phase::AwaitingSelection => SessionStatus::AwaitingSelection,
    }
}

/// Trim, then reject empty input and input longer than `max_chars` characters.
pub fn validate_input(raw: &str, max_chars: usize) -> Result<String, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Empty);
    }
    let len = trimmed.chars().count();
    if len > max_chars {
        return Err(ValidationError::TooLong {
            len,
            max: max_chars,
        });
    }
    Ok(trimmed.to_string())
}

/// Selection tokens compare exactly after trimming and lowercasing.
pub fn normalize_token(input: &str) -> String {
    input.trim().to_lowercase()
}

/// True when the input holds a quit word as a whole word. ASCII words must
/// match exactly ("quite" is not "quit"); other scripts match a word prefix so
/// inflected Hangul such as "종료할게" still counts.
pub fn is_quit(input: &str, quit_commands: &[String]) -> bool {
    let lowered = input.to_lowercase();
    let words: Vec<&str> = lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    quit_commands.iter().any(|q| {
        let q = q.trim().to_lowercase();
        if q.is_empty() {
            return false;
        }
        if q.is_ascii() {
            words.iter().any(|w| *w == q)
        } else {
            words.iter().any(|w| w.starts_with(q.as_str()))
        }
    })
}

/// Analysis runs once the turn count reaches the threshold, or on a quit word.
pub fn should_analyze(turn_count: usize, threshold: usize, quit: bool) -> bool {
    quit || turn_count >= threshold
}

/// Retrieval query for the configured strategy.
pub fn build_query(convo: &Conversation, summary: &str, strategy: QueryStrategy) -> String {
    match strategy {
        QueryStrategy::Summary => summary.trim().to_string(),
        QueryStrategy::UserMessages => convo.user_messages().collect::<Vec<_>>().join(" "),
    }
}

/// Human-readable presentation of the candidate at `index` of `total`.
pub fn present(candidate: &ScoredQuote, index: usize, total: usize) -> String {
    format!(
        "Recommended quote ({}/{}):\n\"{}\"\n- {} (similarity {:.3})\n\nWould you like to choose this quote? (yes/no)",
        index + 1,
        total,
        candidate.quote.text,
        candidate.quote.author,
        candidate.similarity
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetrieverConfig;
    use crate::conversation::Message;
    use crate::error::CollaboratorError;
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scripted collaborator: echoes chat input and answers analysis with a
    /// fixed summary and advice.
    #[derive(Default)]
    struct Scripted {
        fail: bool,
        summaries: AtomicUsize,
    }

    #[async_trait]
    impl ChatResponder for Scripted {
        async fn reply(&self, _h: &[Message], input: &str) -> Result<String, CollaboratorError> {
            if self.fail {
                return Err(CollaboratorError::Status(503));
            }
            Ok(format!("echo: {input}"))
        }
    }

    #[async_trait]
    impl ConversationAnalyzer for Scripted {
        async fn summarize(&self, _h: &[Message]) -> Result<String, CollaboratorError> {
            self.summaries.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(CollaboratorError::Disabled);
            }
            Ok("The user failed an exam and feels hopeless.".to_string())
        }
        async fn advise(&self, _s: &str) -> Result<Advice, CollaboratorError> {
            if self.fail {
                return Err(CollaboratorError::Malformed("x".into()));
            }
            Ok(Advice {
                advice: "One exam does not define you.".into(),
                keywords: vec!["exam".into(), "hope".into()],
            })
        }
    }

    fn catalog_first(category: &str) -> Quote {
        crate::catalog::quotes_for(category, 3).current().unwrap().quote.clone()
    }

    fn missing_paths() -> RetrieverConfig {
        RetrieverConfig {
            embedding_model: "hashing".into(),
            index_path: PathBuf::from("/nonexistent/quotes_index.json"),
            dataset_path: PathBuf::from("/nonexistent/quotes.jsonl"),
            ..RetrieverConfig::default()
        }
    }

    fn engine_with(threshold: usize, collab: Arc<Scripted>) -> QuoteEngine {
        let cfg = EngineConfig {
            turn_threshold: threshold,
            ..EngineConfig::default()
        };
        QuoteEngine::new(
            cfg,
            collab.clone(),
            collab,
            VectorRetriever::from_config(&missing_paths()),
        )
    }

    async fn reach_selection(engine: &QuoteEngine) -> TurnReply {
        for m in ["hi", "I failed my exam", "I feel hopeless"] {
            let r = engine.send_message("u", "1", m).await.unwrap();
            assert_eq!(r.event, TurnEvent::Replied);
        }
        engine.send_message("u", "1", "what now").await.unwrap()
    }

    #[test]
    fn validation_rules() {
        assert_eq!(validate_input("   ", 150), Err(ValidationError::Empty));
        assert_eq!(validate_input(" hi ", 150).unwrap(), "hi");
        let long = "가".repeat(151);
        assert_eq!(
            validate_input(&long, 150),
            Err(ValidationError::TooLong { len: 151, max: 150 })
        );
        assert!(validate_input(&"가".repeat(150), 150).is_ok());
    }

    #[test]
    fn quit_words_match_whole_words() {
        let q = EngineConfig::default().quit_commands;
        assert!(is_quit("quit", &q));
        assert!(is_quit("I want to QUIT now", &q));
        assert!(is_quit("ok, exit.", &q));
        assert!(is_quit("이제 종료할게", &q));
        assert!(!is_quit("I'm quite tired today", &q));
        assert!(!is_quit("I exited the room", &q));
        assert!(!is_quit("keep going", &q));
    }

    #[tokio::test]
    async fn quit_lookalikes_stay_in_chat() {
        let collab = Arc::new(Scripted::default());
        let engine = engine_with(10, collab.clone());
        let r = engine.send_message("u", "1", "I'm quite tired today").await.unwrap();
        assert_eq!(r.event, TurnEvent::Replied);
        assert!(!r.analysis_complete);
        assert_eq!(collab.summaries.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn trigger_rule() {
        assert!(!should_analyze(3, 4, false));
        assert!(should_analyze(4, 4, false));
        assert!(should_analyze(5, 4, false));
        assert!(should_analyze(1, 4, true));
    }

    #[tokio::test]
    async fn fourth_turn_presents_first_candidate_with_advice() {
        let engine = engine_with(4, Arc::new(Scripted::default()));
        let r = reach_selection(&engine).await;
        assert_eq!(r.event, TurnEvent::Presented);
        assert!(r.analysis_complete);
        assert_eq!(r.status, SessionStatus::AwaitingSelection);
        assert!(r.content.starts_with("One exam does not define you."));
        assert!(r.content.contains("(1/3)"));
        assert_eq!(r.keywords.as_deref(), Some(&["exam".to_string(), "hope".to_string()][..]));
        assert!(r.quote.is_some());
    }

    #[tokio::test]
    async fn missing_index_falls_back_to_catalog() {
        let engine = engine_with(4, Arc::new(Scripted::default()));
        let r = reach_selection(&engine).await;
        // The summary mentions "hopeless", which the hope category claims.
        let quote = r.quote.unwrap();
        assert_eq!(quote, catalog_first("hope"));
        let status = engine.get_status("u", "1").await;
        assert_eq!(status.status, SessionStatus::AwaitingSelection);
        assert_eq!(status.current_quote, Some(quote));
    }

    #[tokio::test]
    async fn declining_cycles_and_restarts() {
        let engine = engine_with(4, Arc::new(Scripted::default()));
        let first = reach_selection(&engine).await.quote.unwrap();

        let r1 = engine.send_message("u", "1", "no").await.unwrap();
        assert_eq!(r1.event, TurnEvent::NextCandidate);
        assert!(r1.content.contains("(2/3)"));
        let r2 = engine.send_message("u", "1", "아니오").await.unwrap();
        assert_eq!(r2.event, TurnEvent::NextCandidate);
        assert!(r2.content.contains("(3/3)"));
        let r3 = engine.send_message("u", "1", " NO ").await.unwrap();
        assert_eq!(r3.event, TurnEvent::CycleRestarted);
        assert!(r3.content.starts_with(CYCLE_RESTART));
        assert_eq!(r3.quote, Some(first));
        assert_eq!(r3.status, SessionStatus::AwaitingSelection);
    }

    #[tokio::test]
    async fn accepting_confirms_cursor_quote() {
        let engine = engine_with(4, Arc::new(Scripted::default()));
        reach_selection(&engine).await;
        let second = engine.send_message("u", "1", "no").await.unwrap().quote.unwrap();
        let r = engine.send_message("u", "1", "예").await.unwrap();
        assert_eq!(r.event, TurnEvent::Selected);
        assert_eq!(r.quote.as_ref(), Some(&second));
        assert_eq!(r.status, SessionStatus::Chatting);
        assert_eq!(r.summary.quote_selected, Some(second));
        assert!(!r.summary.selection_mode);
    }

    #[tokio::test]
    async fn selection_then_next_turn_starts_a_fresh_cycle() {
        let engine = engine_with(4, Arc::new(Scripted::default()));
        reach_selection(&engine).await;
        engine.send_message("u", "1", "no").await.unwrap();
        let r = engine.send_message("u", "1", "yes").await.unwrap();
        assert_eq!(r.event, TurnEvent::Selected);

        let status = engine.get_status("u", "1").await;
        assert_eq!(status.status, SessionStatus::Chatting);
        assert_eq!(status.content, READY_FOR_ROUND);

        let r = engine.send_message("u", "1", "thank you").await.unwrap();
        assert_eq!(r.event, TurnEvent::Presented);
        assert!(r.content.contains("(1/3)"), "{}", r.content);
        assert_eq!(r.status, SessionStatus::AwaitingSelection);
    }

    #[tokio::test]
    async fn empty_index_exhausts_the_round() {
        let dir = tempfile::tempdir().unwrap();
        let index_path = dir.path().join("quotes_index.json");
        let dataset_path = dir.path().join("quotes.jsonl");
        std::fs::write(&index_path, r#"{"dim":256,"vectors":[]}"#).unwrap();
        std::fs::write(&dataset_path, "").unwrap();
        let retriever = VectorRetriever::from_config(&RetrieverConfig {
            embedding_model: "hashing:256".into(),
            index_path,
            dataset_path,
            ..RetrieverConfig::default()
        });
        assert_eq!(retriever.resources().load_now().await, ReadinessState::Ready);

        let collab = Arc::new(Scripted::default());
        let cfg = EngineConfig {
            turn_threshold: 1,
            ..EngineConfig::default()
        };
        let engine = QuoteEngine::new(cfg, collab.clone(), collab, retriever);
        let r = engine.send_message("u", "1", "I failed my exam").await.unwrap();
        assert_eq!(r.event, TurnEvent::Exhausted);
        assert_eq!(r.status, SessionStatus::Chatting);
        assert!(r.analysis_complete);
        assert!(r.quote.is_none());
        assert!(r.content.contains(NO_RECOMMENDATION), "{}", r.content);
    }

    #[tokio::test]
    async fn status_counts_turns_below_the_threshold() {
        let engine = engine_with(4, Arc::new(Scripted::default()));
        engine.send_message("u", "1", "hi").await.unwrap();
        let status = engine.get_status("u", "1").await;
        assert_eq!(status.content, "1 of 4 turns before a quote is recommended.");
    }

    #[tokio::test]
    async fn unknown_answer_reprompts_without_change() {
        let engine = engine_with(4, Arc::new(Scripted::default()));
        let presented = reach_selection(&engine).await;
        let r = engine.send_message("u", "1", "maybe").await.unwrap();
        assert_eq!(r.event, TurnEvent::Reprompted);
        assert_eq!(r.content, SELECTION_REPROMPT);
        assert_eq!(r.summary.message_count, presented.summary.message_count);
        let status = engine.get_status("u", "1").await;
        assert_eq!(status.current_quote, presented.quote);
    }

    #[tokio::test]
    async fn cancel_returns_to_chatting() {
        let engine = engine_with(4, Arc::new(Scripted::default()));
        reach_selection(&engine).await;
        let r = engine.send_message("u", "1", "취소").await.unwrap();
        assert_eq!(r.event, TurnEvent::Cancelled);
        assert_eq!(r.status, SessionStatus::Chatting);
        assert!(r.summary.quote_selected.is_none());
    }

    #[tokio::test]
    async fn quit_word_triggers_early_analysis() {
        let collab = Arc::new(Scripted::default());
        let engine = engine_with(10, collab.clone());
        let r = engine.send_message("u", "1", "quit").await.unwrap();
        assert!(r.analysis_complete);
        assert_eq!(r.event, TurnEvent::Presented);
        assert_eq!(collab.summaries.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failing_collaborators_degrade_gracefully() {
        let engine = engine_with(2, Arc::new(Scripted { fail: true, ..Default::default() }));
        let r = engine.send_message("u", "1", "hi").await.unwrap();
        assert_eq!(r.content, APOLOGY);
        let r = engine.send_message("u", "1", "still here").await.unwrap();
        assert_eq!(r.event, TurnEvent::Presented);
        assert_eq!(r.advice.as_deref(), Some(Advice::neutral().advice.as_str()));
        // Empty summary means the general category answers.
        assert_eq!(r.quote.unwrap(), catalog_first("general"));
    }

    #[tokio::test]
    async fn validation_failure_leaves_conversation_untouched() {
        let engine = engine_with(4, Arc::new(Scripted::default()));
        engine.send_message("u", "1", "hi").await.unwrap();
        let err = engine.send_message("u", "1", "   ").await.unwrap_err();
        assert_eq!(err, EngineError::Validation(ValidationError::Empty));
        let too_long = "x".repeat(151);
        assert!(engine.send_message("u", "1", &too_long).await.is_err());
        assert_eq!(engine.get_status("u", "1").await.turn_count, 1);
    }

    #[tokio::test]
    async fn unknown_session_is_idle() {
        let engine = engine_with(4, Arc::new(Scripted::default()));
        let s = engine.get_status("nobody", "0").await;
        assert_eq!(s.status, SessionStatus::Idle);
        assert_eq!(engine.active_conversations(), 0);
    }

    #[tokio::test]
    async fn sessions_are_isolated() {
        let engine = engine_with(2, Arc::new(Scripted::default()));
        engine.send_message("a", "1", "hi").await.unwrap();
        engine.send_message("b", "1", "hi").await.unwrap();
        let r = engine.send_message("a", "1", "again").await.unwrap();
        assert!(r.analysis_complete);
        assert_eq!(engine.get_status("b", "1").await.status, SessionStatus::Chatting);
        assert_eq!(engine.active_conversations(), 2);
    }

    #[test]
    fn user_message_query_joins_inputs() {
        let c = Conversation::new()
            .with_turn("I failed", "oh")
            .with_turn("so sad", "hm");
        assert_eq!(build_query(&c, "ignored", QueryStrategy::UserMessages), "I failed so sad");
        assert_eq!(build_query(&c, " s ", QueryStrategy::Summary), "s");
    }
}
