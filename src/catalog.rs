//! # Quote Catalog
//! Static, category-tagged quotes used whenever semantic search is unavailable.
//! All lookups are pure functions over process-wide immutable data.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use serde::Deserialize;

use crate::quote::{CandidateSet, Origin, Quote, ScoredQuote};

static CATALOG: Lazy<Catalog> = Lazy::new(|| {
    let raw = include_str!("../quote_catalog.json");
    serde_json::from_str::<Catalog>(raw).expect("valid quote catalog")
});

#[derive(Debug, Deserialize)]
struct Catalog {
    default_category: String,
    categories: Vec<Category>,
    /// Emotion word -> category name.
    #[serde(default)]
    emotions: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct Category {
    name: String,
    keywords: Vec<String>,
    quotes: Vec<CatalogEntry>,
}

#[derive(Debug, Deserialize)]
struct CatalogEntry {
    quote: String,
    author: String,
    category: String,
    similarity: f32,
}

impl Catalog {
    fn category(&self, name: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.name == name)
    }

    fn default_category(&self) -> &Category {
        self.category(&self.default_category)
            .unwrap_or(&self.categories[0])
    }
}

/// Name of the category used when no keyword matches.
pub fn default_category() -> &'static str {
    &CATALOG.default_category
}

/// Category whose keyword set has the most substring hits in `text`.
/// Ties go to the category declared first; zero hits yields the default.
pub fn best_category(text: &str) -> &'static str {
    let lowered = text.to_lowercase();
    let mut best: Option<(&Category, usize)> = None;
    for cat in CATALOG.categories.iter() {
        let hits = cat
            .keywords
            .iter()
            .filter(|k| lowered.contains(k.as_str()))
            .count();
        if hits == 0 {
            continue;
        }
        match best {
            Some((_, top)) if top >= hits => {}
            _ => best = Some((cat, hits)),
        }
    }
    best.map(|(c, _)| c.name.as_str())
        .unwrap_or_else(|| CATALOG.default_category().name.as_str())
}

/// Up to `k` quotes of the named category, ordered as authored.
pub fn quotes_for(category: &str, k: usize) -> CandidateSet {
    let cat = CATALOG
        .category(category)
        .unwrap_or_else(|| CATALOG.default_category());
    let quotes = cat
        .quotes
        .iter()
        .take(k)
        .map(|e| ScoredQuote {
            quote: Quote::new(&e.quote, &e.author, &e.category),
            similarity: e.similarity,
        })
        .collect();
    CandidateSet::new(quotes, Origin::Catalog)
}

/// Deterministic fallback for retrieval: keyword-match `query` to a category.
pub fn fallback(query: &str, k: usize) -> CandidateSet {
    quotes_for(best_category(query), k)
}

/// Lookup by a single emotion word (e.g. "희망"); unknown words map to the default.
pub fn by_emotion(emotion: &str, k: usize) -> CandidateSet {
    let name = CATALOG
        .emotions
        .get(emotion.trim())
        .map(String::as_str)
        .unwrap_or_else(default_category);
    quotes_for(name, k)
}

/// Lookup by an analyzer keyword list; the first keyword with a known emotion wins.
pub fn by_keywords(keywords: &[String], k: usize) -> CandidateSet {
    let name = keywords
        .iter()
        .find_map(|kw| CATALOG.emotions.get(kw.trim()))
        .map(String::as_str)
        .unwrap_or_else(default_category);
    quotes_for(name, k)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unmatched_query_uses_general_category() {
        let set = fallback("임베딩 테스트", 3);
        assert_eq!(set.len(), 3);
        assert_eq!(set.origin(), Origin::Catalog);
        assert_eq!(set.quotes()[0].quote.author, "랄프 왈도 에머슨");
        assert_eq!(best_category("nothing relevant"), "general");
    }

    #[test]
    fn keywords_pick_matching_category() {
        assert_eq!(best_category("사용자는 새로운 도전과 목표 앞에 있다"), "success");
        assert_eq!(best_category("요즘 너무 힘들고 우울해요"), "hope");
        assert_eq!(best_category("I feel so HAPPY today"), "happiness");
    }

    #[test]
    fn more_hits_beat_declaration_order() {
        // one success hit vs two hope hits
        assert_eq!(best_category("목표가 있지만 슬픔과 우울이 크다"), "hope");
    }

    #[test]
    fn fallback_is_deterministic_and_bounded() {
        let a = fallback("성공하고 싶어요", 2);
        let b = fallback("성공하고 싶어요", 2);
        assert_eq!(a, b);
        assert_eq!(a.len(), 2);
        assert_eq!(fallback("성공", 10).len(), 3);
    }

    #[test]
    fn emotion_and_keyword_lookups() {
        assert_eq!(by_emotion("희망", 3).quotes()[0].quote.category, "희망");
        assert_eq!(by_emotion("모름", 1).quotes()[0].quote.category, "성장");
        let kws = vec!["대화".to_string(), "기쁨".to_string()];
        assert_eq!(by_keywords(&kws, 1).quotes()[0].quote.category, "행복");
    }

    #[test]
    fn catalog_scores_are_non_increasing() {
        for name in ["general", "success", "hope", "happiness"] {
            let set = quotes_for(name, 3);
            for w in set.quotes().windows(2) {
                assert!(w[0].similarity >= w[1].similarity, "{name}");
            }
        }
    }
}
