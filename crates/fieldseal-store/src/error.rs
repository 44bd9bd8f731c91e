//! Error types for the fieldseal-store crate

use crate::principal::{PrincipalId, SubjectType};
use thiserror::Error;

/// Result type alias using `StoreError`
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in store operations
#[derive(Error, Debug)]
pub enum StoreError {
    /// A principal already exists for the subject
    #[error("duplicate key: a principal already exists for {subject_type}/{subject_id}")]
    DuplicateKey {
        subject_type: SubjectType,
        subject_id: String,
    },

    /// Principal not found
    #[error("principal not found: {0}")]
    PrincipalNotFound(PrincipalId),

    /// Record not found
    #[error("record not found: {0}")]
    RecordNotFound(String),

    /// Record id already taken
    #[error("record already exists: {0}")]
    RecordExists(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Backend-specific failure
    #[error("backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Check if this is a duplicate-key error
    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, Self::DuplicateKey { .. })
    }
}
