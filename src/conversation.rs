//! # Conversation values
//! Conversations are immutable values: every transition returns a new value and
//! the caller decides whether to store it. Nothing here performs I/O.

use serde::Serialize;

use crate::quote::{CandidateSet, Quote};

/// Identifies one conversation: a user's thread.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SessionKey {
    pub user_id: String,
    pub thread_id: String,
}

impl SessionKey {
    pub fn new(user_id: impl Into<String>, thread_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            thread_id: thread_id.into(),
        }
    }
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}_{}", self.user_id, self.thread_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub role: Role,
    pub text: String,
    pub ordinal: usize,
}

/// Analyzer output for one threshold crossing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalysisResult {
    pub summary_text: String,
    pub advice_text: String,
    pub keywords: Vec<String>,
}

/// The quote a user confirmed at the end of a recommendation round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SelectionOutcome {
    pub quote: Quote,
    pub author: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Chatting,
    AwaitingSelection,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Conversation {
    messages: Vec<Message>,
    phase: Phase,
    analysis: Option<AnalysisResult>,
    candidates: Option<CandidateSet>,
    last_selection: Option<SelectionOutcome>,
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

impl Conversation {
    pub fn new() -> Self {
        Self {
            messages: Vec::new(),
            phase: Phase::Chatting,
            analysis: None,
            candidates: None,
            last_selection: None,
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn analysis(&self) -> Option<&AnalysisResult> {
        self.analysis.as_ref()
    }

    pub fn candidates(&self) -> Option<&CandidateSet> {
        self.candidates.as_ref()
    }

    pub fn last_selection(&self) -> Option<&SelectionOutcome> {
        self.last_selection.as_ref()
    }

    /// Completed (User, Assistant) pairs.
    pub fn turn_count(&self) -> usize {
        self.messages
            .windows(2)
            .filter(|w| w[0].role == Role::User && w[1].role == Role::Assistant)
            .count()
    }

    pub fn user_messages(&self) -> impl Iterator<Item = &str> {
        self.messages
            .iter()
            .filter(|m| m.role == Role::User)
            .map(|m| m.text.as_str())
    }

    /// Append one completed turn.
    pub fn with_turn(&self, user_text: &str, reply: &str) -> Self {
        let mut next = self.clone();
        let base = next.messages.len();
        next.messages.push(Message {
            role: Role::User,
            text: user_text.to_string(),
            ordinal: base,
        });
        next.messages.push(Message {
            role: Role::Assistant,
            text: reply.to_string(),
            ordinal: base + 1,
        });
        next
    }

    /// Attach a fresh analysis and candidate set, replacing any earlier round.
    pub fn with_round(&self, analysis: AnalysisResult, candidates: CandidateSet) -> Self {
        let mut next = self.clone();
        next.phase = if candidates.is_empty() {
            Phase::Chatting
        } else {
            Phase::AwaitingSelection
        };
        next.candidates = if candidates.is_empty() {
            None
        } else {
            Some(candidates)
        };
        next.analysis = Some(analysis);
        next
    }

    /// Move to the next candidate. The flag is true when the cursor wrapped.
    pub fn rejected(&self) -> (Self, bool) {
        let mut next = self.clone();
        let mut wrapped = false;
        if let Some(set) = self.candidates.as_ref() {
            let (moved, w) = set.advanced();
            next.candidates = Some(moved);
            wrapped = w;
        }
        (next, wrapped)
    }

    /// Confirm the current candidate and end the round.
    pub fn accepted(&self) -> Option<(Self, SelectionOutcome)> {
        let current = self.candidates.as_ref()?.current()?.quote.clone();
        let outcome = SelectionOutcome {
            author: current.author.clone(),
            quote: current,
        };
        let mut next = self.clone();
        next.candidates = None;
        next.phase = Phase::Chatting;
        next.last_selection = Some(outcome.clone());
        Some((next, outcome))
    }

    /// End the round without a selection.
    pub fn abandoned(&self) -> Self {
        let mut next = self.clone();
        next.candidates = None;
        next.phase = Phase::Chatting;
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quote::{Origin, ScoredQuote};

    fn convo() -> Conversation {
        Conversation::new()
    }

    fn three() -> CandidateSet {
        CandidateSet::new(
            (0..3)
                .map(|i| ScoredQuote {
                    quote: Quote::new(&format!("q{i}"), &format!("a{i}"), "general"),
                    similarity: 0.9 - i as f32 * 0.1,
                })
                .collect(),
            Origin::Catalog,
        )
    }

    fn analysis() -> AnalysisResult {
        AnalysisResult {
            summary_text: "s".into(),
            advice_text: "a".into(),
            keywords: vec![],
        }
    }

    #[test]
    fn turns_are_counted_by_pairs_and_ordinals_increase() {
        let c = convo().with_turn("hi", "hello").with_turn("sad", "oh");
        assert_eq!(c.turn_count(), 2);
        let ords: Vec<_> = c.messages().iter().map(|m| m.ordinal).collect();
        assert_eq!(ords, vec![0, 1, 2, 3]);
        assert_eq!(c.user_messages().collect::<Vec<_>>(), vec!["hi", "sad"]);
    }

    #[test]
    fn transitions_leave_the_original_untouched() {
        let c = convo();
        let next = c.with_turn("hi", "hello");
        assert_eq!(c.turn_count(), 0);
        assert_eq!(next.turn_count(), 1);
    }

    #[test]
    fn accepting_takes_the_cursor_quote_and_clears_the_round() {
        let c = convo().with_round(analysis(), three());
        let (c, _) = c.rejected();
        let (done, outcome) = c.accepted().unwrap();
        assert_eq!(outcome.quote.text, "q1");
        assert_eq!(outcome.author, "a1");
        assert!(done.candidates().is_none());
        assert_eq!(done.phase(), Phase::Chatting);
        assert_eq!(done.last_selection(), Some(&outcome));
    }

    #[test]
    fn empty_round_stays_chatting() {
        let c = convo().with_round(analysis(), CandidateSet::empty(Origin::Embedding));
        assert_eq!(c.phase(), Phase::Chatting);
        assert!(c.accepted().is_none());
    }

    #[test]
    fn abandoning_clears_candidates() {
        let c = convo().with_round(analysis(), three()).abandoned();
        assert_eq!(c.phase(), Phase::Chatting);
        assert!(c.candidates().is_none());
    }
}
