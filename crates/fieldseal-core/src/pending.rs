//! Pending-encryption queue keyed by correlation id
//!
//! Capture stages the plaintext of protected fields under a fresh
//! `CorrelationId`; the host threads that id through its write and hands it
//! back to commit, which takes exactly the matching entry.

use fieldseal_store::Fields;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Links a capture to its commit
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    /// Generate a new random id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Plaintext waiting for its record to be committed
#[derive(Clone, Debug)]
pub struct PendingEntry {
    /// Collection the plaintext was captured for
    pub record_type: String,
    /// User that captured it
    pub user_id: String,
    /// Protected field values
    pub plaintext: Fields,
}

/// Thread-safe map of staged plaintexts
#[derive(Default)]
pub struct PendingQueue {
    entries: Mutex<HashMap<CorrelationId, PendingEntry>>,
}

impl PendingQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage plaintext and return its correlation id
    pub fn stage(
        &self,
        record_type: impl Into<String>,
        user_id: impl Into<String>,
        plaintext: Fields,
    ) -> CorrelationId {
        let id = CorrelationId::new();
        self.entries.lock().insert(
            id,
            PendingEntry {
                record_type: record_type.into(),
                user_id: user_id.into(),
                plaintext,
            },
        );
        id
    }

    /// Remove and return the entry for `id`
    pub fn take(&self, id: &CorrelationId) -> Option<PendingEntry> {
        self.entries.lock().remove(id)
    }

    /// Drop the entry for `id`; returns whether one existed
    pub fn discard(&self, id: &CorrelationId) -> bool {
        self.entries.lock().remove(id).is_some()
    }

    /// Number of staged entries
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether nothing is staged
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl fmt::Debug for PendingQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingQueue")
            .field("len", &self.len())
            .finish()
    }
}
