//! Error types for the fieldseal-core crate

use crate::pending::CorrelationId;
use fieldseal_store::SubjectType;
use thiserror::Error;

/// Result type alias using `EngineError`
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors that can occur in envelope engine operations
#[derive(Error, Debug)]
pub enum EngineError {
    /// The subject has no principal
    #[error("unknown principal: {subject_type}/{subject_id}")]
    UnknownPrincipal {
        subject_type: SubjectType,
        subject_id: String,
    },

    /// The acting user holds no wrapped key for the record
    #[error("access denied: {user_id} holds no key for {record_type}/{record_id}")]
    AccessDenied {
        record_type: String,
        record_id: String,
        user_id: String,
    },

    /// The session has no unwrapped private key
    #[error("session for {0} is locked")]
    SessionLocked(String),

    /// No pending plaintext matches the correlation id
    #[error("no pending encryption for correlation {0}")]
    UnknownCorrelation(CorrelationId),

    /// A committed document carries no id
    #[error("committed document has no id")]
    MissingRecordId,

    /// The user never initialized key material
    #[error("no protected private key stored for {0}")]
    NoProfileKey(String),

    /// The unlocked private key does not match the published public key
    #[error("unlocked key does not match the public key published for {0}")]
    KeyMismatch(String),

    /// A write failed the collection's shape check
    #[error("shape validation failed for {record_type}: {reason}")]
    ShapeValidation { record_type: String, reason: String },

    /// Collection registration is invalid
    #[error("invalid collection: {0}")]
    InvalidCollection(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Crypto error
    #[error("crypto error: {0}")]
    Crypto(#[from] fieldseal_crypto::CryptoError),

    /// Store error
    #[error("store error: {0}")]
    Store(#[from] fieldseal_store::StoreError),
}

impl EngineError {
    /// Check if this is a duplicate-key error from the principal store
    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, Self::Store(e) if e.is_duplicate_key())
    }

    /// Check if this is an access-denied error
    pub fn is_access_denied(&self) -> bool {
        matches!(self, Self::AccessDenied { .. })
    }

    /// Check if this is a shape-validation error
    pub fn is_shape_validation(&self) -> bool {
        matches!(self, Self::ShapeValidation { .. })
    }

    /// Check if this is an unknown-principal error
    pub fn is_unknown_principal(&self) -> bool {
        matches!(self, Self::UnknownPrincipal { .. })
    }
}

impl From<config::ConfigError> for EngineError {
    fn from(err: config::ConfigError) -> Self {
        EngineError::Config(err.to_string())
    }
}
