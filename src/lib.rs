//! # Fieldseal
//!
//! Per-document field-level encryption with multi-recipient key sharing.
//!
//! Each protected record is encrypted under its own random document key;
//! that key is wrapped once per holder and the wraps are kept on the
//! record's principal, so granting access never re-encrypts content.
//!
//! - [`crypto`]: field ciphers, key wrapping, passphrase-sealed keys
//! - [`store`]: principal, record and profile storage seams
//! - [`core`]: envelope engine, key manager and collection hooks
//!
//! ```rust
//! use fieldseal::prelude::*;
//! use std::sync::Arc;
//!
//! let config = EngineConfig {
//!     kdf: KdfParams::insecure_fast(),
//!     ..EngineConfig::default()
//! };
//! let principals = Arc::new(MemoryPrincipalStore::new());
//! let keys = KeyManager::new(Arc::clone(&principals), MemoryProfileStore::new(), &config);
//! let engine = Arc::new(EnvelopeEngine::new(principals, config));
//! let notes = ProtectedCollection::new(
//!     CollectionConfig::new("notes", ["title"]).unwrap(),
//!     MemoryRecordStore::new(),
//!     engine,
//! );
//!
//! let mut alice = Session::new("alice");
//! keys.initialize_keys(&mut alice, "passphrase").unwrap();
//!
//! let stored = notes
//!     .insert(&alice, Document::from_json(serde_json::json!({"title": "hello"})))
//!     .unwrap();
//! assert!(stored.encrypted);
//!
//! let read = notes.find_one(&alice, stored.id.as_deref().unwrap()).unwrap().unwrap();
//! assert_eq!(read.get("title"), Some(&serde_json::json!("hello")));
//! ```

pub use fieldseal_core as core;
pub use fieldseal_crypto as crypto;
pub use fieldseal_store as store;

/// Commonly used types
pub mod prelude {
    pub use fieldseal_core::{
        CollectionConfig, CorrelationId, EngineConfig, EngineError, EnvelopeEngine, KeyManager,
        ProtectedCollection, Session,
    };
    pub use fieldseal_crypto::{AeadCipher, DocumentKey, KdfParams, KeyPair, PublicKey, SecretKey};
    pub use fieldseal_store::{
        Document, MemoryPrincipalStore, MemoryProfileStore, MemoryRecordStore, Modifier, Principal,
        PrincipalStore, ProfileStore, RecordStore, SubjectType, WrappedKeyEntry,
    };
}
