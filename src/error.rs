//! Error types for the Conforma compliance scoring service.
//!
//! This module provides a unified error type [`ConformaError`] for all Conforma
//! operations, along with a convenient [`Result`] type alias.
//!
//! # Error Categories
//!
//! Errors are organized into the following categories:
//!
//! - **Dataset**: CSV ingestion and label parsing errors
//! - **Vocabulary/Vectors**: tokenizer fitting and pretrained-vector import errors
//! - **Model/Artifact**: weight shape validation and portable bundle errors
//! - **Registry**: model versioning and deployment lifecycle errors
//! - **Inference/Serving**: scoring, capacity, and network errors
//! - **Configuration**: invalid settings or missing configuration
//!
//! # Example
//!
//! ```rust
//! use conforma::error::{ConformaError, Result};
//!
//! fn parse_label(row: usize, raw: &str) -> Result<u8> {
//!     match raw.trim() {
//!         "0" => Ok(0),
//!         "1" => Ok(1),
//!         other => Err(ConformaError::InvalidLabel {
//!             row,
//!             value: other.to_string(),
//!         }),
//!     }
//! }
//!
//! fn handle_error(err: &ConformaError) {
//!     if err.is_retryable() {
//!         println!("Retrying operation...");
//!     } else {
//!         println!("Fatal error: {}", err);
//!     }
//! }
//! ```
//!
//! # HTTP Integration
//!
//! Errors can be converted to HTTP status codes for the scoring API:
//!
//! ```rust
//! use conforma::error::ConformaError;
//!
//! let err = ConformaError::NotFound("component-clf:v3".into());
//! assert_eq!(err.to_status_code(), 404);
//! ```

use std::io;
use thiserror::Error;

/// Main error type for Conforma operations.
#[derive(Error, Debug)]
pub enum ConformaError {
    // Dataset errors
    #[error("Dataset error: {0}")]
    Dataset(String),

    #[error("Row {row}: unrecognized label {value:?}")]
    InvalidLabel { row: usize, value: String },

    #[error("Empty dataset: {0}")]
    EmptyDataset(String),

    // Vocabulary errors
    #[error("Vocabulary error: {0}")]
    Vocab(String),

    #[error("Vector file line {line}: {reason}")]
    VectorFormat { line: usize, reason: String },

    #[error("Vector dimension mismatch at line {line}: expected {expected}, got {actual}")]
    VectorDimension {
        expected: usize,
        actual: usize,
        line: usize,
    },

    // Model and weight errors
    #[error("Weight tensor {tensor}: expected shape {expected}, got {actual}")]
    WeightShape {
        tensor: String,
        expected: String,
        actual: String,
    },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Input length mismatch: expected {expected}, got {actual}")]
    InputLength { expected: usize, actual: usize },

    #[error("Token id {id} out of range (vocabulary rows: {rows})")]
    TokenOutOfRange { id: i64, rows: usize },

    // Portable artifact errors
    #[error("Not a Conforma artifact (bad magic)")]
    ArtifactMagic,

    #[error("Unsupported artifact format version {found} (supported: {supported})")]
    ArtifactVersion { found: u32, supported: u32 },

    #[error("Artifact digest mismatch: manifest {expected}, payload {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("Artifact corrupt: {0}")]
    ArtifactCorrupt(String),

    #[error("Artifact exceeds maximum size: {size} > {limit} bytes")]
    ArtifactTooLarge { size: u64, limit: u64 },

    // Registry errors
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    // Inference and serving errors
    #[error("Request timeout after {0}ms")]
    Timeout(u64),

    #[error("Capacity exceeded: {0}")]
    CapacityExceeded(String),

    #[error("Unavailable: {0}")]
    Unavailable(String),

    #[error("Network error: {0}")]
    Network(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration: {field}: {reason}")]
    InvalidConfig { field: String, reason: String },

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // External errors
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ConformaError {
    /// Convert to an HTTP status code for the scoring API.
    pub fn to_status_code(&self) -> u16 {
        match self {
            ConformaError::NotFound(_) => 404,
            ConformaError::AlreadyExists(_) => 409,
            ConformaError::InvalidInput(_)
            | ConformaError::InputLength { .. }
            | ConformaError::TokenOutOfRange { .. }
            | ConformaError::InvalidOperation(_) => 422,
            ConformaError::ArtifactTooLarge { .. } => 413,
            ConformaError::Timeout(_) => 504,
            ConformaError::CapacityExceeded(_) | ConformaError::Unavailable(_) => 503,
            _ => 500,
        }
    }

    /// Check if error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ConformaError::Timeout(_)
                | ConformaError::CapacityExceeded(_)
                | ConformaError::Unavailable(_)
        )
    }
}

impl From<bincode::Error> for ConformaError {
    fn from(e: bincode::Error) -> Self {
        ConformaError::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for ConformaError {
    fn from(e: serde_json::Error) -> Self {
        ConformaError::Serialization(e.to_string())
    }
}

impl From<csv::Error> for ConformaError {
    fn from(e: csv::Error) -> Self {
        ConformaError::Dataset(e.to_string())
    }
}

/// Result type alias for Conforma operations.
pub type Result<T> = std::result::Result<T, ConformaError>;
