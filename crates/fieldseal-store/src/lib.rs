//! # Fieldseal Store
//!
//! Persistence seams for the Fieldseal envelope engine.
//!
//! This crate provides:
//! - **Principal store**: one principal per `(subject type, subject id)`, holding wrapped keys
//! - **Record store**: per-collection document storage, written to directly by the engine
//! - **Profile store**: a user's passphrase-protected private key
//! - **Memory backends**: `DashMap`-backed implementations of all three
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │            Envelope Engine              │
//! ├─────────────┬─────────────┬─────────────┤
//! │ Principal   │   Record    │   Profile   │
//! │ Store       │   Store     │   Store     │
//! ├─────────────┴─────────────┴─────────────┤
//! │      Host database / Memory backend     │
//! └─────────────────────────────────────────┘
//! ```

pub mod error;
pub mod memory;
pub mod principal;
pub mod record;

pub use error::{Result, StoreError};
pub use memory::{MemoryPrincipalStore, MemoryProfileStore, MemoryRecordStore};
pub use principal::{Principal, PrincipalId, SubjectType, WrappedKeyEntry, USER_SUBJECT};
pub use record::{Document, Fields, Modifier, RecordId};

use fieldseal_crypto::PassphraseProtectedKey;
use std::sync::Arc;

/// Storage of principals, unique per subject
pub trait PrincipalStore: Send + Sync {
    /// Find the principal for a subject
    fn find(&self, subject_type: &SubjectType, subject_id: &str) -> Result<Option<Principal>>;

    /// Get a principal by id
    fn get(&self, id: &PrincipalId) -> Result<Option<Principal>>;

    /// Create a principal; fails with `DuplicateKey` if the subject already has one
    fn create(&self, principal: Principal) -> Result<PrincipalId>;

    /// Remove a principal; returns whether one was removed
    fn remove(&self, id: &PrincipalId) -> Result<bool>;

    /// Atomically append one wrapped-key entry
    fn append_wrapped_key(&self, id: &PrincipalId, entry: WrappedKeyEntry) -> Result<()>;

    /// Atomically swap the subject's principal for `principal`, returning the old one
    fn replace(&self, principal: Principal) -> Result<Option<Principal>>;
}

/// Document storage for one collection
///
/// Writes here never run encryption hooks; the engine uses `update` as its
/// direct-write primitive.
pub trait RecordStore: Send + Sync {
    /// Insert a document, assigning an id when it has none
    fn insert(&self, document: Document) -> Result<Document>;

    /// Get a document by id
    fn get(&self, id: &str) -> Result<Option<Document>>;

    /// All documents
    fn list(&self) -> Result<Vec<Document>>;

    /// Apply a modifier, returning the updated document
    fn update(&self, id: &str, modifier: &Modifier) -> Result<Document>;

    /// Remove a document, returning it if it existed
    fn remove(&self, id: &str) -> Result<Option<Document>>;
}

/// Per-user profile data
pub trait ProfileStore: Send + Sync {
    /// The user's persisted protected private key
    fn wrapped_private_key(&self, user_id: &str) -> Result<Option<PassphraseProtectedKey>>;

    /// Persist the user's protected private key
    fn set_wrapped_private_key(&self, user_id: &str, key: PassphraseProtectedKey) -> Result<()>;
}

impl<T: PrincipalStore + ?Sized> PrincipalStore for Arc<T> {
    fn find(&self, subject_type: &SubjectType, subject_id: &str) -> Result<Option<Principal>> {
        (**self).find(subject_type, subject_id)
    }

    fn get(&self, id: &PrincipalId) -> Result<Option<Principal>> {
        (**self).get(id)
    }

    fn create(&self, principal: Principal) -> Result<PrincipalId> {
        (**self).create(principal)
    }

    fn remove(&self, id: &PrincipalId) -> Result<bool> {
        (**self).remove(id)
    }

    fn append_wrapped_key(&self, id: &PrincipalId, entry: WrappedKeyEntry) -> Result<()> {
        (**self).append_wrapped_key(id, entry)
    }

    fn replace(&self, principal: Principal) -> Result<Option<Principal>> {
        (**self).replace(principal)
    }
}

impl<T: RecordStore + ?Sized> RecordStore for Arc<T> {
    fn insert(&self, document: Document) -> Result<Document> {
        (**self).insert(document)
    }

    fn get(&self, id: &str) -> Result<Option<Document>> {
        (**self).get(id)
    }

    fn list(&self) -> Result<Vec<Document>> {
        (**self).list()
    }

    fn update(&self, id: &str, modifier: &Modifier) -> Result<Document> {
        (**self).update(id, modifier)
    }

    fn remove(&self, id: &str) -> Result<Option<Document>> {
        (**self).remove(id)
    }
}

impl<T: ProfileStore + ?Sized> ProfileStore for Arc<T> {
    fn wrapped_private_key(&self, user_id: &str) -> Result<Option<PassphraseProtectedKey>> {
        (**self).wrapped_private_key(user_id)
    }

    fn set_wrapped_private_key(&self, user_id: &str, key: PassphraseProtectedKey) -> Result<()> {
        (**self).set_wrapped_private_key(user_id, key)
    }
}
