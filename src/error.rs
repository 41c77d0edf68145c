//! Error taxonomy.
//!
//! Only [`ValidationError`] ever reaches a caller of the engine. Collaborator and
//! resource errors are absorbed where they happen and turned into degraded
//! but usable responses.

use std::path::PathBuf;

use thiserror::Error;

/// Malformed user input. Reported immediately; the conversation is untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("message must not be empty")]
    Empty,
    #[error("message is {len} characters long; the limit is {max}")]
    TooLong { len: usize, max: usize },
}

/// Failure of an external language-model call (chat, analysis or advice).
#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("language model is disabled")]
    Disabled,
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("provider returned HTTP {0}")]
    Status(u16),
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("provider returned an empty response")]
    Empty,
}

/// Embedding model or vector index could not be loaded.
#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("missing artifact: {}", .0.display())]
    MissingArtifact(PathBuf),
    #[error("i/o error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse {}: {reason}", path.display())]
    Parse { path: PathBuf, reason: String },
    #[error("index has {vectors} vectors but dataset has {rows} rows")]
    Misaligned { vectors: usize, rows: usize },
    #[error("embedding model unavailable: {0}")]
    Embedder(String),
}

/// Errors the engine surfaces to its callers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
}
