//! Structured advice contract. The advice stage must answer with one JSON
//! object `{"advice": "...", "keywords": ["...", ...]}`; anything else is a
//! collaborator error and the caller substitutes [`Advice::neutral`].

use serde::{Deserialize, Serialize};

use crate::error::CollaboratorError;

pub const MAX_KEYWORDS: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Advice {
    pub advice: String,
    pub keywords: Vec<String>,
}

impl Advice {
    /// Used whenever the advice stage fails.
    pub fn neutral() -> Self {
        Self {
            advice: "대화를 통해 행복을 찾아가시길 바랍니다.".to_string(),
            keywords: vec!["대화".into(), "행복".into(), "고민".into()],
        }
    }
}

#[derive(Deserialize)]
struct RawAdvice {
    advice: Option<String>,
    #[serde(default)]
    keywords: Option<Keywords>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Keywords {
    List(Vec<String>),
    Csv(String),
}

/// Parse a model response into [`Advice`]. Tolerates a surrounding Markdown
/// code fence; requires a non-empty `advice` field. Keywords are trimmed,
/// de-duplicated (first occurrence wins) and capped at [`MAX_KEYWORDS`].
pub fn parse_advice(text: &str) -> Result<Advice, CollaboratorError> {
    let body = strip_fence(text.trim());
    let raw: RawAdvice = serde_json::from_str(body)
        .map_err(|e| CollaboratorError::Malformed(format!("advice is not a JSON record: {e}")))?;

    let advice = raw
        .advice
        .map(|a| a.trim().to_string())
        .filter(|a| !a.is_empty())
        .ok_or_else(|| CollaboratorError::Malformed("missing advice field".into()))?;

    let items = match raw.keywords {
        Some(Keywords::List(v)) => v,
        Some(Keywords::Csv(s)) => s.split(',').map(str::to_string).collect(),
        None => return Err(CollaboratorError::Malformed("missing keywords field".into())),
    };
    let mut keywords: Vec<String> = Vec::new();
    for k in items {
        let k = k.trim().to_string();
        if !k.is_empty() && !keywords.contains(&k) {
            keywords.push(k);
        }
        if keywords.len() == MAX_KEYWORDS {
            break;
        }
    }

    Ok(Advice { advice, keywords })
}

fn strip_fence(s: &str) -> &str {
    let Some(rest) = s.strip_prefix("```") else {
        return s;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
