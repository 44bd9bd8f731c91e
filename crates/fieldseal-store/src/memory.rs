//! In-memory stores for testing and embedding

use crate::{
    Document, Modifier, PrincipalId, PrincipalStore, ProfileStore, RecordStore, Result,
    StoreError, SubjectType, WrappedKeyEntry,
};
use crate::principal::Principal;
use dashmap::{mapref::entry::Entry, DashMap};
use fieldseal_crypto::PassphraseProtectedKey;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

type SubjectKey = (SubjectType, String);

/// An in-memory principal store
///
/// The subject index is always locked before the principal map, which keeps
/// `create` and `replace` atomic per subject.
#[derive(Clone, Default)]
pub struct MemoryPrincipalStore {
    principals: Arc<DashMap<PrincipalId, Principal>>,
    subjects: Arc<DashMap<SubjectKey, PrincipalId>>,
}

impl MemoryPrincipalStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of principals stored
    pub fn len(&self) -> usize {
        self.principals.len()
    }

    /// Check if the store is empty
    pub fn is_empty(&self) -> bool {
        self.principals.is_empty()
    }

    /// Number of principals for one subject (0 or 1)
    pub fn count_for(&self, subject_type: &SubjectType, subject_id: &str) -> usize {
        self.principals
            .iter()
            .filter(|entry| {
                &entry.value().subject_type == subject_type && entry.value().subject_id == subject_id
            })
            .count()
    }
}

impl PrincipalStore for MemoryPrincipalStore {
    fn find(&self, subject_type: &SubjectType, subject_id: &str) -> Result<Option<Principal>> {
        let id = match self
            .subjects
            .get(&(subject_type.clone(), subject_id.to_string()))
        {
            Some(entry) => *entry.value(),
            None => return Ok(None),
        };
        Ok(self.principals.get(&id).map(|entry| entry.value().clone()))
    }

    fn get(&self, id: &PrincipalId) -> Result<Option<Principal>> {
        Ok(self.principals.get(id).map(|entry| entry.value().clone()))
    }

    fn create(&self, principal: Principal) -> Result<PrincipalId> {
        match self.subjects.entry(principal.subject_key()) {
            Entry::Occupied(_) => Err(StoreError::DuplicateKey {
                subject_type: principal.subject_type,
                subject_id: principal.subject_id,
            }),
            Entry::Vacant(slot) => {
                let id = principal.id;
                self.principals.insert(id, principal);
                slot.insert(id);
                Ok(id)
            }
        }
    }

    fn remove(&self, id: &PrincipalId) -> Result<bool> {
        match self.principals.remove(id) {
            Some((_, principal)) => {
                self.subjects
                    .remove_if(&principal.subject_key(), |_, indexed| indexed == id);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn append_wrapped_key(&self, id: &PrincipalId, entry: WrappedKeyEntry) -> Result<()> {
        let mut principal = self
            .principals
            .get_mut(id)
            .ok_or(StoreError::PrincipalNotFound(*id))?;
        principal.wrapped_keys.push(entry);
        Ok(())
    }

    fn replace(&self, principal: Principal) -> Result<Option<Principal>> {
        let id = principal.id;
        match self.subjects.entry(principal.subject_key()) {
            Entry::Occupied(mut slot) => {
                let previous = self.principals.remove(slot.get()).map(|(_, old)| old);
                debug!(
                    subject_type = %principal.subject_type,
                    subject_id = %principal.subject_id,
                    "replacing principal"
                );
                self.principals.insert(id, principal);
                slot.insert(id);
                Ok(previous)
            }
            Entry::Vacant(slot) => {
                self.principals.insert(id, principal);
                slot.insert(id);
                Ok(None)
            }
        }
    }
}

/// An in-memory document collection
#[derive(Clone, Default)]
pub struct MemoryRecordStore {
    documents: Arc<DashMap<String, Document>>,
}

impl MemoryRecordStore {
    /// Create a new empty collection
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents stored
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// Check if the collection is empty
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

impl RecordStore for MemoryRecordStore {
    fn insert(&self, mut document: Document) -> Result<Document> {
        let id = document
            .id
            .get_or_insert_with(|| Uuid::new_v4().to_string())
            .clone();
        match self.documents.entry(id.clone()) {
            Entry::Occupied(_) => Err(StoreError::RecordExists(id)),
            Entry::Vacant(slot) => {
                slot.insert(document.clone());
                Ok(document)
            }
        }
    }

    fn get(&self, id: &str) -> Result<Option<Document>> {
        Ok(self.documents.get(id).map(|entry| entry.value().clone()))
    }

    fn list(&self) -> Result<Vec<Document>> {
        Ok(self
            .documents
            .iter()
            .map(|entry| entry.value().clone())
            .collect())
    }

    fn update(&self, id: &str, modifier: &Modifier) -> Result<Document> {
        let mut document = self
            .documents
            .get_mut(id)
            .ok_or_else(|| StoreError::RecordNotFound(id.to_string()))?;
        document.apply(modifier);
        Ok(document.clone())
    }

    fn remove(&self, id: &str) -> Result<Option<Document>> {
        Ok(self.documents.remove(id).map(|(_, document)| document))
    }
}

/// An in-memory profile store
#[derive(Clone, Default)]
pub struct MemoryProfileStore {
    keys: Arc<DashMap<String, PassphraseProtectedKey>>,
}

impl MemoryProfileStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProfileStore for MemoryProfileStore {
    fn wrapped_private_key(&self, user_id: &str) -> Result<Option<PassphraseProtectedKey>> {
        Ok(self.keys.get(user_id).map(|entry| entry.value().clone()))
    }

    fn set_wrapped_private_key(&self, user_id: &str, key: PassphraseProtectedKey) -> Result<()> {
        self.keys.insert(user_id.to_string(), key);
        Ok(())
    }
}
