//! Envelope engine: capture, commit, decrypt and share
//!
//! Each protected record is sealed under its own random [`DocumentKey`]; the
//! key is wrapped once per holder and the wraps live on the record's
//! principal. Sharing appends one wrap and never touches field ciphertext.

use crate::{
    config::{CollectionConfig, EngineConfig},
    pending::{CorrelationId, PendingQueue},
    session::Session,
    EngineError, Result,
};
use fieldseal_crypto::{
    decrypt_value, encrypt_value, unwrap_key, wrap_key, CryptoError, DocumentKey, PublicKey,
};
use fieldseal_store::{
    Document, Fields, Modifier, Principal, PrincipalStore, RecordStore, SubjectType,
    WrappedKeyEntry,
};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use tracing::{debug, info, instrument, warn};

/// Outcome of capturing a document for insert
#[derive(Clone, Debug)]
pub struct Captured {
    /// The document to hand to the underlying write
    pub document: Document,
    /// Present when plaintext was staged; pass it to commit
    pub correlation: Option<CorrelationId>,
}

/// Outcome of capturing a modifier for update
#[derive(Clone, Debug)]
pub struct CapturedUpdate {
    /// The modifier to hand to the underlying write
    pub modifier: Modifier,
    /// Present when plaintext was staged; pass it to commit
    pub correlation: Option<CorrelationId>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum OnShapeFailure {
    PassThrough,
    Reject,
}

enum KeyLookup {
    Key(DocumentKey),
    NoPrincipal,
    NoEntry,
    Locked,
}

/// Orchestrates document keys, field ciphertext and principals
pub struct EnvelopeEngine<P> {
    principals: P,
    pending: PendingQueue,
    config: EngineConfig,
}

impl<P: PrincipalStore> EnvelopeEngine<P> {
    /// Create an engine over a principal store
    pub fn new(principals: P, config: EngineConfig) -> Self {
        Self {
            principals,
            pending: PendingQueue::new(),
            config,
        }
    }

    /// Engine configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The principal store
    pub fn principals(&self) -> &P {
        &self.principals
    }

    /// Number of captures awaiting commit
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Drop staged plaintext whose write failed
    pub fn discard(&self, correlation: &CorrelationId) -> bool {
        let discarded = self.pending.discard(correlation);
        if discarded {
            debug!(%correlation, "discarded pending plaintext");
        }
        discarded
    }

    /// Strip protected plaintext from a document about to be inserted
    #[instrument(skip_all, fields(record_type = %collection.name(), user = %session.user_id()))]
    pub fn capture_insert(
        &self,
        session: &Session,
        collection: &CollectionConfig,
        mut document: Document,
    ) -> Captured {
        if let Err(reason) = collection.check_shape(&document) {
            warn!(%reason, "shape check failed; passing document through unencrypted");
            document.encrypted = false;
            return Captured {
                document,
                correlation: None,
            };
        }

        let mut plaintext = Fields::new();
        for field in collection.fields() {
            if let Some(value) = document.fields.get_mut(field) {
                plaintext.insert(field.clone(), std::mem::replace(value, self.placeholder()));
            }
        }
        document.encrypted = false;

        let correlation = (!plaintext.is_empty())
            .then(|| self.pending.stage(collection.name(), session.user_id(), plaintext));
        debug!(correlation = ?correlation, "captured insert");

        Captured {
            document,
            correlation,
        }
    }

    /// Stage the merged plaintext of an update touching protected fields
    ///
    /// The commit re-encrypts every protected field under a fresh key, so the
    /// stored record must be readable by the acting user. The shape check
    /// sees the decrypted record with the modifier applied. A failing update
    /// of an unencrypted record passes through; on an encrypted record it is
    /// `ShapeValidation`, as plaintext must not land beside ciphertext.
    pub fn capture_update(
        &self,
        session: &Session,
        collection: &CollectionConfig,
        stored: &Document,
        modifier: Modifier,
    ) -> Result<CapturedUpdate> {
        self.capture_update_with(session, collection, stored, modifier, OnShapeFailure::PassThrough)
    }

    /// [`capture_update`](Self::capture_update) with a failing shape check
    /// always rejected
    pub(crate) fn capture_update_strict(
        &self,
        session: &Session,
        collection: &CollectionConfig,
        stored: &Document,
        modifier: Modifier,
    ) -> Result<CapturedUpdate> {
        self.capture_update_with(session, collection, stored, modifier, OnShapeFailure::Reject)
    }

    #[instrument(skip_all, fields(record_type = %collection.name(), user = %session.user_id()))]
    fn capture_update_with(
        &self,
        session: &Session,
        collection: &CollectionConfig,
        stored: &Document,
        mut modifier: Modifier,
        on_shape_failure: OnShapeFailure,
    ) -> Result<CapturedUpdate> {
        if !collection.fields().iter().any(|f| modifier.touches(f)) {
            return Ok(CapturedUpdate {
                modifier,
                correlation: None,
            });
        }

        let current = if stored.encrypted {
            self.decrypt_for_update(session, collection, stored)?
        } else {
            stored.clone()
        };

        let mut preview = current.clone();
        preview.apply(&modifier);
        if let Err(reason) = collection.check_shape(&preview) {
            if stored.encrypted || on_shape_failure == OnShapeFailure::Reject {
                warn!(%reason, "shape check failed; rejecting update");
                return Err(EngineError::ShapeValidation {
                    record_type: collection.name().to_string(),
                    reason,
                });
            }
            warn!(%reason, "shape check failed; passing modifier through unencrypted");
            modifier.encrypted = Some(false);
            return Ok(CapturedUpdate {
                modifier,
                correlation: None,
            });
        }

        let mut plaintext = Fields::new();
        for field in collection.fields() {
            let value = match modifier.set.get_mut(field) {
                Some(value) => std::mem::replace(value, self.placeholder()),
                None => match current.get(field) {
                    Some(value) => value.clone(),
                    None => continue,
                },
            };
            plaintext.insert(field.clone(), value);
        }
        modifier.encrypted = Some(false);

        let correlation = self
            .pending
            .stage(collection.name(), session.user_id(), plaintext);
        debug!(%correlation, "captured update");

        Ok(CapturedUpdate {
            modifier,
            correlation: Some(correlation),
        })
    }

    /// Decrypt the protected fields of a stored document for the session user
    ///
    /// Documents that are not encrypted come back unchanged. Unless
    /// `reveal_access_errors` is set, a missing principal, a missing wrap for
    /// the user or a locked session also return the document unchanged.
    #[instrument(skip_all, fields(record_type = %collection.name(), record_id = ?document.id))]
    pub fn decrypt(
        &self,
        session: &Session,
        collection: &CollectionConfig,
        document: Document,
    ) -> Result<Document> {
        if !document.encrypted {
            return Ok(document);
        }
        let Some(record_id) = document.id.clone() else {
            return Ok(document);
        };

        match self.lookup_key(session, collection.name(), &record_id)? {
            KeyLookup::Key(key) => open_fields(&key, collection, document),
            denied => {
                if self.config.reveal_access_errors {
                    return Err(access_error(denied, session, collection.name(), &record_id));
                }
                debug!(user = %session.user_id(), "no access; returning ciphertext");
                Ok(document)
            }
        }
    }

    /// Encrypt the staged plaintext of a committed write
    ///
    /// Takes the pending entry first, so the plaintext is gone whatever the
    /// outcome. The record principal is replaced, then the ciphertext is
    /// written through `records`.
    #[instrument(
        skip_all,
        fields(record_type = %collection.name(), record_id = ?committed.id, %correlation)
    )]
    pub fn commit<R>(
        &self,
        session: &Session,
        collection: &CollectionConfig,
        records: &R,
        committed: &Document,
        correlation: CorrelationId,
    ) -> Result<Document>
    where
        R: RecordStore + ?Sized,
    {
        let entry = self
            .pending
            .take(&correlation)
            .ok_or(EngineError::UnknownCorrelation(correlation))?;
        if entry.record_type != collection.name() || entry.user_id != session.user_id() {
            warn!(
                captured_for = %entry.record_type,
                captured_by = %entry.user_id,
                "correlation does not belong to this commit"
            );
            return Err(EngineError::UnknownCorrelation(correlation));
        }
        let record_id = committed.id.clone().ok_or(EngineError::MissingRecordId)?;
        let actor_key = self.user_public_key(session.user_id())?;

        let key = DocumentKey::generate();
        let mut plaintext_doc = committed.clone();
        for (field, value) in &entry.plaintext {
            plaintext_doc.set(field.clone(), value.clone());
        }
        plaintext_doc.encrypted = false;
        collection.notify_key_generated(&key, &plaintext_doc);

        let mut modifier = Modifier::default();
        for (field, value) in &entry.plaintext {
            modifier
                .set
                .insert(field.clone(), Value::String(encrypt_value(&key, self.config.cipher, value)?));
        }
        modifier.encrypted = Some(true);

        let subject_type = collection.subject_type();
        let actor_wrap = WrappedKeyEntry::new(
            session.user_id(),
            wrap_key(&key, &actor_key, self.config.cipher)?,
        );
        let wrapped_keys = match self.principals.find(&subject_type, &record_id)? {
            Some(existing) => self.carry_forward(&key, &existing, actor_wrap),
            None => vec![actor_wrap],
        };
        let holder_count = wrapped_keys.len();

        self.principals
            .replace(Principal::record(collection.name(), record_id.as_str(), wrapped_keys))?;
        let updated = records.update(&record_id, &modifier)?;
        collection.notify_encryption_complete(&updated);

        info!(holders = holder_count, "record encrypted");
        Ok(updated)
    }

    /// Grant `grantee` access to a record the session user already holds
    ///
    /// Appends one wrap; field ciphertext is untouched. Granting to an
    /// existing holder changes nothing.
    #[instrument(skip(self, session), fields(user = %session.user_id()))]
    pub fn share(
        &self,
        session: &Session,
        record_type: &str,
        record_id: &str,
        grantee: &str,
    ) -> Result<()> {
        let grantee_key = self.user_public_key(grantee)?;

        let subject_type = SubjectType::record(record_type);
        let principal = self
            .principals
            .find(&subject_type, record_id)?
            .ok_or_else(|| EngineError::UnknownPrincipal {
                subject_type,
                subject_id: record_id.to_string(),
            })?;

        if principal.entry_for(grantee).is_some() {
            debug!("grantee already holds a key");
            return Ok(());
        }

        let secret = session
            .private_key()
            .ok_or_else(|| EngineError::SessionLocked(session.user_id().to_string()))?;
        let own = principal
            .entry_for(session.user_id())
            .ok_or_else(|| EngineError::AccessDenied {
                record_type: record_type.to_string(),
                record_id: record_id.to_string(),
                user_id: session.user_id().to_string(),
            })?;

        let key = unwrap_key(&own.key, secret)?;
        let wrapped = wrap_key(&key, &grantee_key, self.config.cipher)?;
        self.principals
            .append_wrapped_key(&principal.id, WrappedKeyEntry::new(grantee, wrapped))?;

        info!(fingerprint = %grantee_key.fingerprint(), "record shared");
        Ok(())
    }

    /// Delete the principal of a removed record
    #[instrument(skip(self))]
    pub fn remove_principal(&self, record_type: &str, record_id: &str) -> Result<bool> {
        let subject_type = SubjectType::record(record_type);
        match self.principals.find(&subject_type, record_id)? {
            Some(principal) => {
                let removed = self.principals.remove(&principal.id)?;
                debug!(removed, "record principal removed");
                Ok(removed)
            }
            None => Ok(false),
        }
    }

    /// Holder user ids of a record, in grant order
    pub fn holders(&self, record_type: &str, record_id: &str) -> Result<Vec<String>> {
        let subject_type = SubjectType::record(record_type);
        let principal = self
            .principals
            .find(&subject_type, record_id)?
            .ok_or_else(|| EngineError::UnknownPrincipal {
                subject_type,
                subject_id: record_id.to_string(),
            })?;
        Ok(principal.holders().map(str::to_string).collect())
    }

    fn placeholder(&self) -> Value {
        Value::String(self.config.placeholder.clone())
    }

    fn user_public_key(&self, user_id: &str) -> Result<PublicKey> {
        self.principals
            .find(&SubjectType::User, user_id)?
            .and_then(|principal| principal.public_key)
            .ok_or_else(|| EngineError::UnknownPrincipal {
                subject_type: SubjectType::User,
                subject_id: user_id.to_string(),
            })
    }

    /// Re-wrap `key` for every prior holder, keeping grant order
    ///
    /// The actor's wrap is always fresh; a holder that cannot be wrapped for
    /// is skipped.
    fn carry_forward(
        &self,
        key: &DocumentKey,
        existing: &Principal,
        actor_wrap: WrappedKeyEntry,
    ) -> Vec<WrappedKeyEntry> {
        let mut seen = HashSet::new();
        let mut wrapped = Vec::with_capacity(existing.wrapped_keys.len() + 1);
        let mut actor_wrap = Some(actor_wrap);

        for holder in existing.holders() {
            if !seen.insert(holder) {
                continue;
            }
            if actor_wrap
                .as_ref()
                .is_some_and(|entry| entry.holder_user_id == holder)
            {
                wrapped.extend(actor_wrap.take());
                continue;
            }

            let public_key = match self.user_public_key(holder) {
                Ok(public_key) => public_key,
                Err(e) => {
                    warn!(%holder, error = %e, "skipping holder without a user principal");
                    continue;
                }
            };
            match wrap_key(key, &public_key, self.config.cipher) {
                Ok(entry) => wrapped.push(WrappedKeyEntry::new(holder, entry)),
                Err(e) => warn!(%holder, error = %e, "skipping holder whose wrap failed"),
            }
        }

        wrapped.extend(actor_wrap);
        wrapped
    }

    fn lookup_key(&self, session: &Session, record_type: &str, record_id: &str) -> Result<KeyLookup> {
        let Some(principal) = self
            .principals
            .find(&SubjectType::record(record_type), record_id)?
        else {
            return Ok(KeyLookup::NoPrincipal);
        };
        let Some(entry) = principal.entry_for(session.user_id()) else {
            return Ok(KeyLookup::NoEntry);
        };
        let Some(secret) = session.private_key() else {
            return Ok(KeyLookup::Locked);
        };
        Ok(KeyLookup::Key(unwrap_key(&entry.key, secret)?))
    }

    fn decrypt_for_update(
        &self,
        session: &Session,
        collection: &CollectionConfig,
        stored: &Document,
    ) -> Result<Document> {
        let record_id = stored.id.clone().ok_or(EngineError::MissingRecordId)?;
        match self.lookup_key(session, collection.name(), &record_id)? {
            KeyLookup::Key(key) => open_fields(&key, collection, stored.clone()),
            denied => Err(access_error(denied, session, collection.name(), &record_id)),
        }
    }
}

impl<P> fmt::Debug for EnvelopeEngine<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvelopeEngine")
            .field("pending", &self.pending)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn open_fields(
    key: &DocumentKey,
    collection: &CollectionConfig,
    mut document: Document,
) -> Result<Document> {
    for field in collection.fields() {
        let Some(value) = document.fields.get_mut(field) else {
            continue;
        };
        let sealed = value.as_str().ok_or_else(|| {
            CryptoError::InvalidCiphertext(format!("field '{field}' is not a ciphertext string"))
        })?;
        *value = decrypt_value(key, sealed)?;
    }
    document.encrypted = false;
    Ok(document)
}

fn access_error(
    denied: KeyLookup,
    session: &Session,
    record_type: &str,
    record_id: &str,
) -> EngineError {
    match denied {
        KeyLookup::NoPrincipal => EngineError::UnknownPrincipal {
            subject_type: SubjectType::record(record_type),
            subject_id: record_id.to_string(),
        },
        KeyLookup::Locked => EngineError::SessionLocked(session.user_id().to_string()),
        KeyLookup::NoEntry | KeyLookup::Key(_) => EngineError::AccessDenied {
            record_type: record_type.to_string(),
            record_id: record_id.to_string(),
            user_id: session.user_id().to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldseal_crypto::KeyPair;
    use fieldseal_store::{MemoryPrincipalStore, MemoryRecordStore};
    use serde_json::json;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };
    use test_log::test;

    struct Fixture {
        engine: EnvelopeEngine<MemoryPrincipalStore>,
        records: MemoryRecordStore,
        notes: CollectionConfig,
    }

    impl Fixture {
        fn new(config: EngineConfig) -> Self {
            Self {
                engine: EnvelopeEngine::new(MemoryPrincipalStore::new(), config),
                records: MemoryRecordStore::new(),
                notes: CollectionConfig::new("notes", ["title", "body"]).unwrap(),
            }
        }

        fn user(&self, id: &str) -> Session {
            let (secret, public) = KeyPair::generate().into_parts();
            self.engine
                .principals()
                .create(Principal::user(id, public))
                .unwrap();
            Session::with_private_key(id, secret)
        }

        fn insert(&self, session: &Session, value: Value) -> Document {
            let captured = self
                .engine
                .capture_insert(session, &self.notes, Document::from_json(value));
            let written = self.records.insert(captured.document).unwrap();
            self.engine
                .commit(
                    session,
                    &self.notes,
                    &self.records,
                    &written,
                    captured.correlation.unwrap(),
                )
                .unwrap()
        }
    }

    #[test]
    fn test_capture_insert_strips_plaintext() {
        let fx = Fixture::new(EngineConfig::default());
        let alice = fx.user("alice");

        let captured = fx.engine.capture_insert(
            &alice,
            &fx.notes,
            Document::from_json(json!({"title": "hello", "author": "alice"})),
        );

        assert_eq!(captured.document.get("title"), Some(&json!("--")));
        assert_eq!(captured.document.get("author"), Some(&json!("alice")));
        assert!(captured.document.get("body").is_none());
        assert!(!captured.document.encrypted);
        assert!(captured.correlation.is_some());
        assert_eq!(fx.engine.pending_len(), 1);
    }

    #[test]
    fn test_capture_without_protected_fields_stages_nothing() {
        let fx = Fixture::new(EngineConfig::default());
        let alice = fx.user("alice");

        let captured = fx.engine.capture_insert(
            &alice,
            &fx.notes,
            Document::from_json(json!({"author": "alice"})),
        );
        assert!(captured.correlation.is_none());
        assert_eq!(fx.engine.pending_len(), 0);
    }

    #[test]
    fn test_shape_failure_passes_through() {
        let mut fx = Fixture::new(EngineConfig::default());
        fx.notes = fx.notes.clone().with_shape_check(|doc| match doc.get("title") {
            Some(Value::String(_)) => Ok(()),
            _ => Err("title must be a string".into()),
        });
        let alice = fx.user("alice");

        let mut document = Document::from_json(json!({"title": 7}));
        document.encrypted = true;
        let captured = fx.engine.capture_insert(&alice, &fx.notes, document);
        assert_eq!(captured.document.get("title"), Some(&json!(7)));
        assert!(!captured.document.encrypted);
        assert!(captured.correlation.is_none());
        assert_eq!(fx.engine.pending_len(), 0);
    }

    fn numeric_body(notes: &CollectionConfig) -> CollectionConfig {
        notes.clone().with_shape_check(|doc| match doc.get("body") {
            None | Some(Value::Number(_)) => Ok(()),
            Some(other) => Err(format!("body must be a number, got {other}")),
        })
    }

    #[test]
    fn test_update_shape_check_sees_plaintext() {
        let mut fx = Fixture::new(EngineConfig::default());
        fx.notes = numeric_body(&fx.notes);
        let alice = fx.user("alice");
        let stored = fx.insert(&alice, json!({"title": "a", "body": 1}));
        let id = stored.id.clone().unwrap();

        let captured = fx
            .engine
            .capture_update(
                &alice,
                &fx.notes,
                &stored,
                Modifier::default().with("title", json!("secret-edit")),
            )
            .unwrap();
        assert_eq!(captured.modifier.set.get("title"), Some(&json!("--")));

        let written = fx.records.update(&id, &captured.modifier).unwrap();
        let committed = fx
            .engine
            .commit(&alice, &fx.notes, &fx.records, &written, captured.correlation.unwrap())
            .unwrap();
        let read = fx.engine.decrypt(&alice, &fx.notes, committed).unwrap();
        assert_eq!(read.get("title"), Some(&json!("secret-edit")));
        assert_eq!(read.get("body"), Some(&json!(1)));
    }

    #[test]
    fn test_update_shape_failure_on_encrypted_record() {
        let mut fx = Fixture::new(EngineConfig::default());
        fx.notes = numeric_body(&fx.notes);
        let alice = fx.user("alice");
        let stored = fx.insert(&alice, json!({"title": "a", "body": 1}));

        let err = fx
            .engine
            .capture_update(
                &alice,
                &fx.notes,
                &stored,
                Modifier::default().with("body", json!("oops")),
            )
            .unwrap_err();
        assert!(err.is_shape_validation());
        assert_eq!(fx.engine.pending_len(), 0);
    }

    #[test]
    fn test_update_shape_failure_on_plain_record_passes_through() {
        let mut fx = Fixture::new(EngineConfig::default());
        fx.notes = numeric_body(&fx.notes);
        let alice = fx.user("alice");
        let stored = Document::from_json(json!({"title": "a"})).with_id("n1");

        let captured = fx
            .engine
            .capture_update(
                &alice,
                &fx.notes,
                &stored,
                Modifier::default().with("body", json!("oops")),
            )
            .unwrap();
        assert_eq!(captured.modifier.set.get("body"), Some(&json!("oops")));
        assert_eq!(captured.modifier.encrypted, Some(false));
        assert!(captured.correlation.is_none());
        assert_eq!(fx.engine.pending_len(), 0);
    }

    #[test]
    fn test_commit_then_decrypt() {
        let fx = Fixture::new(EngineConfig::default());
        let alice = fx.user("alice");

        let stored = fx.insert(&alice, json!({"title": "hello", "body": {"n": 1}}));
        assert!(stored.encrypted);
        assert_ne!(stored.get("title"), Some(&json!("hello")));
        assert_eq!(fx.engine.pending_len(), 0);

        let read = fx.engine.decrypt(&alice, &fx.notes, stored).unwrap();
        assert_eq!(read.get("title"), Some(&json!("hello")));
        assert_eq!(read.get("body"), Some(&json!({"n": 1})));
        assert!(!read.encrypted);
    }

    #[test]
    fn test_commit_unknown_correlation() {
        let fx = Fixture::new(EngineConfig::default());
        let alice = fx.user("alice");
        let doc = fx
            .records
            .insert(Document::from_json(json!({"title": "--"})))
            .unwrap();

        let err = fx
            .engine
            .commit(&alice, &fx.notes, &fx.records, &doc, CorrelationId::new())
            .unwrap_err();
        assert!(matches!(err, EngineError::UnknownCorrelation(_)));
    }

    #[test]
    fn test_commit_for_other_collection_is_rejected() {
        let fx = Fixture::new(EngineConfig::default());
        let alice = fx.user("alice");
        let tasks = CollectionConfig::new("tasks", ["title"]).unwrap();

        let captured =
            fx.engine
                .capture_insert(&alice, &fx.notes, Document::from_json(json!({"title": "x"})));
        let written = fx.records.insert(captured.document).unwrap();
        let err = fx
            .engine
            .commit(&alice, &tasks, &fx.records, &written, captured.correlation.unwrap())
            .unwrap_err();

        assert!(matches!(err, EngineError::UnknownCorrelation(_)));
        assert_eq!(fx.engine.pending_len(), 0);
    }

    #[test]
    fn test_commit_requires_actor_principal() {
        let fx = Fixture::new(EngineConfig::default());
        let ghost = Session::with_private_key("ghost", KeyPair::generate().into_parts().0);

        let captured =
            fx.engine
                .capture_insert(&ghost, &fx.notes, Document::from_json(json!({"title": "x"})));
        let written = fx.records.insert(captured.document).unwrap();
        let err = fx
            .engine
            .commit(&ghost, &fx.notes, &fx.records, &written, captured.correlation.unwrap())
            .unwrap_err();

        assert!(err.is_unknown_principal());
        assert!(fx.engine.principals().is_empty());
        assert_eq!(fx.engine.pending_len(), 0);
    }

    #[test]
    fn test_non_holder_sees_ciphertext() {
        let fx = Fixture::new(EngineConfig::default());
        let alice = fx.user("alice");
        let bob = fx.user("bob");

        let stored = fx.insert(&alice, json!({"title": "hello"}));
        let read = fx.engine.decrypt(&bob, &fx.notes, stored.clone()).unwrap();
        assert_eq!(read, stored);
    }

    #[test]
    fn test_reveal_access_errors() {
        let fx = Fixture::new(EngineConfig {
            reveal_access_errors: true,
            ..EngineConfig::default()
        });
        let alice = fx.user("alice");
        let bob = fx.user("bob");
        let stored = fx.insert(&alice, json!({"title": "hello"}));

        let err = fx.engine.decrypt(&bob, &fx.notes, stored.clone()).unwrap_err();
        assert!(err.is_access_denied());

        let locked = Session::new("alice");
        let err = fx.engine.decrypt(&locked, &fx.notes, stored.clone()).unwrap_err();
        assert!(matches!(err, EngineError::SessionLocked(_)));

        let orphan = stored.with_id("no-such-record");
        let err = fx.engine.decrypt(&alice, &fx.notes, orphan).unwrap_err();
        assert!(err.is_unknown_principal());
    }

    #[test]
    fn test_decrypt_unencrypted_is_noop() {
        let fx = Fixture::new(EngineConfig::default());
        let alice = fx.user("alice");
        let doc = Document::from_json(json!({"title": "not ciphertext"})).with_id("r1");

        let read = fx.engine.decrypt(&alice, &fx.notes, doc.clone()).unwrap();
        assert_eq!(read, doc);
    }

    #[test]
    fn test_share_grants_access() {
        let fx = Fixture::new(EngineConfig::default());
        let alice = fx.user("alice");
        let bob = fx.user("bob");
        let stored = fx.insert(&alice, json!({"title": "hello"}));
        let id = stored.id.clone().unwrap();

        fx.engine.share(&alice, "notes", &id, "bob").unwrap();
        fx.engine.share(&alice, "notes", &id, "bob").unwrap();

        assert_eq!(fx.engine.holders("notes", &id).unwrap(), vec!["alice", "bob"]);
        let read = fx.engine.decrypt(&bob, &fx.notes, stored).unwrap();
        assert_eq!(read.get("title"), Some(&json!("hello")));
    }

    #[test]
    fn test_share_failures() {
        let fx = Fixture::new(EngineConfig::default());
        let alice = fx.user("alice");
        let bob = fx.user("bob");
        let _carol = fx.user("carol");
        let id = fx.insert(&alice, json!({"title": "hello"})).id.unwrap();

        let err = fx.engine.share(&alice, "notes", &id, "dave").unwrap_err();
        assert!(err.is_unknown_principal());

        let err = fx.engine.share(&alice, "notes", "missing", "bob").unwrap_err();
        assert!(err.is_unknown_principal());

        let err = fx.engine.share(&bob, "notes", &id, "carol").unwrap_err();
        assert!(err.is_access_denied());

        let err = fx
            .engine
            .share(&Session::new("alice"), "notes", &id, "carol")
            .unwrap_err();
        assert!(matches!(err, EngineError::SessionLocked(_)));
    }

    #[test]
    fn test_update_reencrypts_and_keeps_holders() {
        let fx = Fixture::new(EngineConfig::default());
        let alice = fx.user("alice");
        let bob = fx.user("bob");
        let stored = fx.insert(&alice, json!({"title": "hello", "body": "first"}));
        let id = stored.id.clone().unwrap();
        fx.engine.share(&alice, "notes", &id, "bob").unwrap();

        let captured = fx
            .engine
            .capture_update(
                &bob,
                &fx.notes,
                &stored,
                Modifier::default().with("title", json!("edited")),
            )
            .unwrap();
        assert_eq!(captured.modifier.set.get("title"), Some(&json!("--")));
        assert!(!captured.modifier.touches("body"));
        assert_eq!(captured.modifier.encrypted, Some(false));

        let written = fx.records.update(&id, &captured.modifier).unwrap();
        let committed = fx
            .engine
            .commit(&bob, &fx.notes, &fx.records, &written, captured.correlation.unwrap())
            .unwrap();

        assert_eq!(fx.engine.holders("notes", &id).unwrap(), vec!["alice", "bob"]);
        for session in [&alice, &bob] {
            let read = fx.engine.decrypt(session, &fx.notes, committed.clone()).unwrap();
            assert_eq!(read.get("title"), Some(&json!("edited")));
            assert_eq!(read.get("body"), Some(&json!("first")));
        }
    }

    #[test]
    fn test_update_not_touching_protected_fields_passes_through() {
        let fx = Fixture::new(EngineConfig::default());
        let alice = fx.user("alice");
        let stored = fx.insert(&alice, json!({"title": "hello"}));

        let modifier = Modifier::default().with("author", json!("alice"));
        let captured = fx
            .engine
            .capture_update(&alice, &fx.notes, &stored, modifier.clone())
            .unwrap();
        assert_eq!(captured.modifier, modifier);
        assert!(captured.correlation.is_none());
    }

    #[test]
    fn test_update_by_non_holder_is_denied() {
        let fx = Fixture::new(EngineConfig::default());
        let alice = fx.user("alice");
        let bob = fx.user("bob");
        let stored = fx.insert(&alice, json!({"title": "hello"}));

        let err = fx
            .engine
            .capture_update(
                &bob,
                &fx.notes,
                &stored,
                Modifier::default().with("title", json!("mine")),
            )
            .unwrap_err();
        assert!(err.is_access_denied());
        assert_eq!(fx.engine.pending_len(), 0);
    }

    #[test]
    fn test_holder_without_principal_is_skipped() {
        let fx = Fixture::new(EngineConfig::default());
        let alice = fx.user("alice");
        let stored = fx.insert(&alice, json!({"title": "hello"}));
        let id = stored.id.clone().unwrap();

        let principal = fx
            .engine
            .principals()
            .find(&SubjectType::record("notes"), &id)
            .unwrap()
            .unwrap();
        fx.engine
            .principals()
            .append_wrapped_key(&principal.id, WrappedKeyEntry::new("departed", "stale"))
            .unwrap();

        let captured = fx
            .engine
            .capture_update(
                &alice,
                &fx.notes,
                &stored,
                Modifier::default().with("title", json!("again")),
            )
            .unwrap();
        let written = fx.records.update(&id, &captured.modifier).unwrap();
        fx.engine
            .commit(&alice, &fx.notes, &fx.records, &written, captured.correlation.unwrap())
            .unwrap();

        assert_eq!(fx.engine.holders("notes", &id).unwrap(), vec!["alice"]);
    }

    #[test]
    fn test_lifecycle_hooks() {
        let generated = Arc::new(AtomicUsize::new(0));
        let completed = Arc::new(AtomicUsize::new(0));
        let mut fx = Fixture::new(EngineConfig::default());
        fx.notes = fx
            .notes
            .clone()
            .on_key_generated({
                let generated = Arc::clone(&generated);
                move |_key, doc| {
                    assert_eq!(doc.get("title"), Some(&json!("hello")));
                    generated.fetch_add(1, Ordering::SeqCst);
                }
            })
            .on_encryption_complete({
                let completed = Arc::clone(&completed);
                move |doc| {
                    assert!(doc.encrypted);
                    completed.fetch_add(1, Ordering::SeqCst);
                }
            });
        let alice = fx.user("alice");

        fx.insert(&alice, json!({"title": "hello"}));
        assert_eq!(generated.load(Ordering::SeqCst), 1);
        assert_eq!(completed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_remove_principal() {
        let fx = Fixture::new(EngineConfig::default());
        let alice = fx.user("alice");
        let id = fx.insert(&alice, json!({"title": "hello"})).id.unwrap();

        assert!(fx.engine.remove_principal("notes", &id).unwrap());
        assert!(!fx.engine.remove_principal("notes", &id).unwrap());
        assert!(fx.engine.holders("notes", &id).is_err());
    }

    #[test]
    fn test_tampered_ciphertext_propagates() {
        let fx = Fixture::new(EngineConfig::default());
        let alice = fx.user("alice");
        let mut stored = fx.insert(&alice, json!({"title": "hello"}));
        stored.set("title", json!(42));

        let err = fx.engine.decrypt(&alice, &fx.notes, stored).unwrap_err();
        assert!(matches!(err, EngineError::Crypto(_)));
    }

    proptest::proptest! {
        #[test]
        fn prop_insert_roundtrip(title in ".*", count in proptest::num::u32::ANY) {
            let fx = Fixture::new(EngineConfig::default());
            let alice = fx.user("alice");

            let stored = fx.insert(&alice, json!({"title": title, "body": count}));
            let read = fx.engine.decrypt(&alice, &fx.notes, stored).unwrap();
            proptest::prop_assert_eq!(read.get("title"), Some(&json!(title)));
            proptest::prop_assert_eq!(read.get("body"), Some(&json!(count)));
        }
    }
}
