use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalyzerError {
    #[error("Git error: {0}")]
    GitError(#[from] git2::Error),

    #[error("Repository not found at {path}: {reason}")]
    RepositoryNotFound { path: PathBuf, reason: String },

    #[error("Repository has no commits")]
    EmptyRepository,

    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    #[error("Corrupt cache entry {path}: {reason}")]
    CacheCorrupt { path: PathBuf, reason: String },

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Analysis error: {0}")]
    AnalysisError(String),
}
