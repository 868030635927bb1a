//! Error types for nodevectors.

use thiserror::Error;

/// Errors produced while loading graphs, training embedders, or persisting vectors.
#[derive(Debug, Error)]
pub enum Error {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Edge list could not be read as CSV.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Model (de)serialization error.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed text input (edge list or word2vec vectors file).
    #[error("parse error on line {line}: {message}")]
    Parse { line: usize, message: String },

    /// Invalid configuration.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// The graph has no nodes.
    #[error("graph has no nodes")]
    EmptyGraph,

    /// Node name not present in the embedding vocabulary.
    #[error("unknown node: {0}")]
    UnknownNode(String),

    /// Node index past the end of the graph or vocabulary.
    #[error("node index {index} out of range for {len} nodes")]
    NodeOutOfRange { index: usize, len: usize },

    /// `predict`/`embeddings` called before `fit`.
    #[error("embedder has not been fitted")]
    NotFitted,

    /// Training produced a non-finite loss.
    #[error("training diverged at epoch {epoch}")]
    Diverged { epoch: usize },
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
