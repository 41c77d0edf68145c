//! Exact inner-product index over L2-normalized vectors, plus the aligned quote
//! dataset. Cosine similarity is the inner product of unit vectors, so every
//! vector is normalized on ingestion and every query before search.

use std::cmp::Ordering;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ResourceError;
use crate::quote::Quote;

/// Scale `v` to unit length in place. Returns `false` (and leaves `v` alone)
/// for zero or non-finite vectors.
pub fn l2_normalize(v: &mut [f32]) -> bool {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if !norm.is_finite() || norm == 0.0 {
        return false;
    }
    for x in v.iter_mut() {
        *x /= norm;
    }
    true
}

#[derive(Debug, Serialize, Deserialize)]
struct IndexFile {
    dim: usize,
    vectors: Vec<Vec<f32>>,
}

#[derive(Debug, Clone)]
pub struct FlatIndex {
    dim: usize,
    vectors: Vec<Vec<f32>>,
}

impl FlatIndex {
    /// Build from raw vectors, normalizing each one.
    pub fn from_vectors(dim: usize, vectors: Vec<Vec<f32>>) -> Result<Self, String> {
        let mut out = Vec::with_capacity(vectors.len());
        for (i, mut v) in vectors.into_iter().enumerate() {
            if v.len() != dim {
                return Err(format!("vector {i} has {} dims, expected {dim}", v.len()));
            }
            if !l2_normalize(&mut v) {
                return Err(format!("vector {i} has zero or non-finite norm"));
            }
            out.push(v);
        }
        Ok(Self { dim, vectors: out })
    }

    pub fn load(path: &Path) -> Result<Self, ResourceError> {
        let raw = read_artifact(path)?;
        let file: IndexFile = serde_json::from_str(&raw).map_err(|e| ResourceError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_vectors(file.dim, file.vectors).map_err(|reason| ResourceError::Parse {
            path: path.to_path_buf(),
            reason,
        })
    }

    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let file = IndexFile {
            dim: self.dim,
            vectors: self.vectors.clone(),
        };
        let json = serde_json::to_string(&file)
            .map_err(|e| std::io::Error::new(ErrorKind::InvalidData, e))?;
        fs::write(path, json)
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Top `k` positions by inner product with `query` (which must already be
    /// normalized). Scores are non-increasing; ties keep index order.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<(usize, f32)> {
        if query.len() != self.dim || k == 0 {
            return Vec::new();
        }
        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(i, v)| (i, dot(v, query)))
            .collect();
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        scored.truncate(k);
        scored
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[derive(Debug, Deserialize)]
struct DatasetRow {
    quote: String,
    author: String,
    #[serde(default)]
    category: Option<String>,
}

/// Load the JSON Lines dataset; row `i` describes index vector `i`.
pub fn load_dataset(path: &Path) -> Result<Vec<Quote>, ResourceError> {
    let raw = read_artifact(path)?;
    let mut out = Vec::new();
    for (lineno, line) in raw.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let row: DatasetRow = serde_json::from_str(line).map_err(|e| ResourceError::Parse {
            path: path.to_path_buf(),
            reason: format!("line {}: {e}", lineno + 1),
        })?;
        let category = row
            .category
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| crate::catalog::default_category().to_string());
        out.push(Quote {
            text: row.quote,
            author: row.author,
            category,
        });
    }
    Ok(out)
}

fn read_artifact(path: &Path) -> Result<String, ResourceError> {
    fs::read_to_string(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => ResourceError::MissingArtifact(path.to_path_buf()),
        _ => ResourceError::Io {
            path: path.to_path_buf(),
            source: e,
        },
    })
}
