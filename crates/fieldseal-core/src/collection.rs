//! Host data-store adapter for one protected collection
//!
//! The hook methods map one-to-one onto a host store's before/after
//! callbacks. The drivers (`insert`, `update`, `find`, ...) run a full write
//! or read cycle against a [`RecordStore`] with those hooks in place.

use crate::{
    config::CollectionConfig,
    engine::{Captured, CapturedUpdate, EnvelopeEngine},
    pending::CorrelationId,
    session::Session,
    Result,
};
use fieldseal_store::{Document, Modifier, PrincipalStore, RecordStore, StoreError};
use std::sync::Arc;
use tracing::instrument;

/// A record store whose writes and reads pass through the envelope engine
pub struct ProtectedCollection<R, P> {
    config: CollectionConfig,
    records: R,
    engine: Arc<EnvelopeEngine<P>>,
}

impl<R: RecordStore, P: PrincipalStore> ProtectedCollection<R, P> {
    /// Attach `config` to a record store
    pub fn new(config: CollectionConfig, records: R, engine: Arc<EnvelopeEngine<P>>) -> Self {
        Self {
            config,
            records,
            engine,
        }
    }

    /// Collection name
    pub fn name(&self) -> &str {
        self.config.name()
    }

    /// Collection registration
    pub fn config(&self) -> &CollectionConfig {
        &self.config
    }

    /// The underlying record store; writes here bypass the hooks
    pub fn records(&self) -> &R {
        &self.records
    }

    /// The shared engine
    pub fn engine(&self) -> &EnvelopeEngine<P> {
        &self.engine
    }

    // Hooks

    /// Before-insert hook
    pub fn before_insert(&self, session: &Session, document: Document) -> Captured {
        self.engine.capture_insert(session, &self.config, document)
    }

    /// After-insert hook
    pub fn after_insert(
        &self,
        session: &Session,
        committed: &Document,
        correlation: Option<CorrelationId>,
    ) -> Result<Document> {
        self.finish(session, committed, correlation)
    }

    /// Before-update hook
    pub fn before_update(
        &self,
        session: &Session,
        stored: &Document,
        modifier: Modifier,
    ) -> Result<CapturedUpdate> {
        self.engine
            .capture_update(session, &self.config, stored, modifier)
    }

    /// After-update hook
    pub fn after_update(
        &self,
        session: &Session,
        committed: &Document,
        correlation: Option<CorrelationId>,
    ) -> Result<Document> {
        self.finish(session, committed, correlation)
    }

    /// After-find hook, applied per result
    pub fn after_find(&self, session: &Session, documents: Vec<Document>) -> Result<Vec<Document>> {
        documents
            .into_iter()
            .map(|document| self.engine.decrypt(session, &self.config, document))
            .collect()
    }

    /// After-find-one hook
    pub fn after_find_one(
        &self,
        session: &Session,
        document: Option<Document>,
    ) -> Result<Option<Document>> {
        document
            .map(|document| self.engine.decrypt(session, &self.config, document))
            .transpose()
    }

    /// After-remove hook: cascade to the record principal
    pub fn after_remove(&self, document: &Document) -> Result<bool> {
        match &document.id {
            Some(id) => self.engine.remove_principal(self.config.name(), id),
            None => Ok(false),
        }
    }

    // Drivers

    /// Insert and encrypt; returns the stored (ciphertext) document
    ///
    /// A document failing the shape check is rejected before anything is
    /// written.
    #[instrument(skip_all, fields(collection = %self.config.name()))]
    pub fn insert(&self, session: &Session, document: Document) -> Result<Document> {
        self.config.require_shape(&document)?;
        let Captured {
            document,
            correlation,
        } = self.before_insert(session, document);

        let written = match self.records.insert(document) {
            Ok(written) => written,
            Err(e) => {
                self.discard(correlation);
                return Err(e.into());
            }
        };
        self.after_insert(session, &written, correlation)
    }

    /// Update and re-encrypt; returns the stored (ciphertext) document
    ///
    /// An update touching protected fields whose result fails the shape
    /// check is rejected before anything is written.
    #[instrument(skip(self, session, modifier), fields(collection = %self.config.name()))]
    pub fn update(&self, session: &Session, id: &str, modifier: Modifier) -> Result<Document> {
        let stored = self
            .records
            .get(id)?
            .ok_or_else(|| StoreError::RecordNotFound(id.to_string()))?;
        let CapturedUpdate {
            modifier,
            correlation,
        } = self
            .engine
            .capture_update_strict(session, &self.config, &stored, modifier)?;

        let written = match self.records.update(id, &modifier) {
            Ok(written) => written,
            Err(e) => {
                self.discard(correlation);
                return Err(e.into());
            }
        };
        self.after_update(session, &written, correlation)
    }

    /// Read one document as the session user
    pub fn find_one(&self, session: &Session, id: &str) -> Result<Option<Document>> {
        self.after_find_one(session, self.records.get(id)?)
    }

    /// Read all documents as the session user
    pub fn find(&self, session: &Session) -> Result<Vec<Document>> {
        self.after_find(session, self.records.list()?)
    }

    /// Read one document exactly as stored
    pub fn raw(&self, id: &str) -> Result<Option<Document>> {
        Ok(self.records.get(id)?)
    }

    /// Remove a document and its principal
    #[instrument(skip(self), fields(collection = %self.config.name()))]
    pub fn remove(&self, id: &str) -> Result<Option<Document>> {
        let removed = self.records.remove(id)?;
        if let Some(document) = &removed {
            self.after_remove(document)?;
        }
        Ok(removed)
    }

    /// Grant `grantee` access to a record
    pub fn share(&self, session: &Session, id: &str, grantee: &str) -> Result<()> {
        self.engine.share(session, self.config.name(), id, grantee)
    }

    /// Holder user ids of a record
    pub fn holders(&self, id: &str) -> Result<Vec<String>> {
        self.engine.holders(self.config.name(), id)
    }

    fn finish(
        &self,
        session: &Session,
        committed: &Document,
        correlation: Option<CorrelationId>,
    ) -> Result<Document> {
        match correlation {
            Some(correlation) => {
                self.engine
                    .commit(session, &self.config, &self.records, committed, correlation)
            }
            None => Ok(committed.clone()),
        }
    }

    fn discard(&self, correlation: Option<CorrelationId>) {
        if let Some(correlation) = correlation {
            self.engine.discard(&correlation);
        }
    }
}
