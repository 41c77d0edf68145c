//! # Quotes and candidate sets
//! A `Quote` has the same shape whether it came from the static catalog or the
//! retrieval dataset. A `CandidateSet` is the ranked output of one retrieval and
//! carries the presentation cursor used by the selection cycle.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Quote {
    #[serde(alias = "quote")]
    pub text: String,
    pub author: String,
    pub category: String,
}

impl Quote {
    pub fn new(text: &str, author: &str, category: &str) -> Self {
        Self {
            text: text.to_string(),
            author: author.to_string(),
            category: category.to_string(),
        }
    }
}

/// Where a candidate set came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    Embedding,
    Catalog,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredQuote {
    pub quote: Quote,
    pub similarity: f32,
}

/// Ranked candidates plus a cursor. Invariant: `cursor < quotes.len()` whenever
/// the set is non-empty; for an empty set the cursor stays at 0 and there is no
/// current quote.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateSet {
    quotes: Vec<ScoredQuote>,
    cursor: usize,
    origin: Origin,
}

impl CandidateSet {
    pub fn new(quotes: Vec<ScoredQuote>, origin: Origin) -> Self {
        Self {
            quotes,
            cursor: 0,
            origin,
        }
    }

    pub fn empty(origin: Origin) -> Self {
        Self::new(Vec::new(), origin)
    }

    pub fn len(&self) -> usize {
        self.quotes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quotes.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn origin(&self) -> Origin {
        self.origin
    }

    pub fn quotes(&self) -> &[ScoredQuote] {
        &self.quotes
    }

    pub fn current(&self) -> Option<&ScoredQuote> {
        self.quotes.get(self.cursor)
    }

    /// Returns the set with the cursor moved one step forward (modulo length)
    /// and whether the move wrapped back to the first candidate.
    pub fn advanced(&self) -> (Self, bool) {
        if self.quotes.is_empty() {
            return (self.clone(), false);
        }
        let next = (self.cursor + 1) % self.quotes.len();
        let moved = Self {
            quotes: self.quotes.clone(),
            cursor: next,
            origin: self.origin,
        };
        (moved, next == 0)
    }

    /// Keep at most `k` leading candidates.
    pub fn truncated(mut self, k: usize) -> Self {
        self.quotes.truncate(k);
        if self.cursor >= self.quotes.len() {
            self.cursor = 0;
        }
        self
    }
}
