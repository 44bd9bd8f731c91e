//! # Fieldseal Core
//!
//! Envelope engine for per-document field-level encryption with
//! multi-recipient key sharing.
//!
//! This crate provides:
//! - **Envelope Engine**: capture, commit, decrypt and share
//! - **Key Manager**: passphrase-sealed private keys, unlock and rotation
//! - **Pending Queue**: plaintext staged between a write and its commit
//! - **Protected Collection**: host data-store hooks for one collection
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │     Host data store (hooks/drivers)     │
//! ├─────────────────────────────────────────┤
//! │         Protected Collection            │
//! ├───────────────────────┬─────────────────┤
//! │   Envelope Engine     │   Key Manager   │
//! │   + Pending Queue     │                 │
//! ├───────────────────────┴─────────────────┤
//! │  fieldseal-crypto   │  fieldseal-store  │
//! └─────────────────────────────────────────┘
//! ```
//!
//! ## Write cycle
//!
//! `before_insert` swaps protected values for a placeholder and stages the
//! plaintext under a [`CorrelationId`]. Once the host write succeeds,
//! `after_insert` hands that id to commit, which generates a document key,
//! encrypts, wraps the key for every holder and writes the ciphertext back.

pub mod collection;
pub mod config;
pub mod engine;
pub mod error;
pub mod key_manager;
pub mod pending;
pub mod session;

pub use collection::ProtectedCollection;
pub use config::{CollectionConfig, EngineConfig, DEFAULT_PLACEHOLDER, ENV_PREFIX};
pub use engine::{Captured, CapturedUpdate, EnvelopeEngine};
pub use error::{EngineError, Result};
pub use key_manager::KeyManager;
pub use pending::{CorrelationId, PendingEntry, PendingQueue};
pub use session::Session;
