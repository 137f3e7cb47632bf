use std::path::PathBuf;
use thiserror::Error;

use crate::dense::VectorStoreError;
use crate::embedding::EmbeddingError;
use crate::retrieval::SearchError;

/// Main error type for feedsearch
#[derive(Error, Debug)]
pub enum FeedsearchError {
    /// Configuration related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration validation errors
    #[error("Configuration validation failed: {errors:?}")]
    ConfigValidation { errors: Vec<ValidationError> },

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    /// Invalid configuration value
    #[error("Invalid configuration value at {path}: {message}")]
    InvalidConfigValue { path: String, message: String },

    /// Corpus file could not be parsed
    #[error("Invalid corpus record at line {line}: {message}")]
    InvalidRecord { line: usize, message: String },

    /// Dense store errors surfaced by mutating operations
    #[error("Vector store error: {0}")]
    Store(#[from] VectorStoreError),

    /// Dense lookup failures surfaced by `similar`
    #[error("Search failed: {0}")]
    Search(#[from] SearchError),

    /// Embedding backend errors
    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    /// Document lookup by id failed
    #[error("Document not found: {id}")]
    DocumentNotFound { id: String },

    /// IO errors
    #[error("IO error: {context}: {source}")]
    Io {
        source: std::io::Error,
        context: String,
    },

    /// TOML deserialization errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization errors
    #[error("TOML serialization error: {0}")]
    TomlSerialization(#[from] toml::ser::Error),

    /// JSON errors
    #[error("JSON error: {context}: {source}")]
    Json {
        source: serde_json::Error,
        context: String,
    },

    /// Generic errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Configuration validation error
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// Path to the configuration key that failed validation
    pub path: String,
    /// Error message describing the validation failure
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result type for feedsearch operations
pub type Result<T> = std::result::Result<T, FeedsearchError>;
