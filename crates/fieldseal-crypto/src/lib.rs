//! # Fieldseal Crypto
//!
//! Cryptographic primitives for Fieldseal envelope encryption.
//!
//! This crate provides:
//! - **Field encryption**: AES-256-GCM / ChaCha20-Poly1305 under a per-record document key
//! - **Key wrapping**: X25519 sealed boxes that wrap a document key for one holder
//! - **Passphrase protection**: Argon2id-sealed private keys for profile storage
//!
//! ## Key hierarchy
//!
//! ```text
//! passphrase ──Argon2id──▶ sealed private key (persisted)
//!                              │ unlock
//!                              ▼
//!                     holder secret key (session only)
//!                              │ unwrap
//!                              ▼
//!                     document key (transient)
//!                              │ decrypt
//!                              ▼
//!                       protected fields
//! ```
//!
//! ## Example
//!
//! ```rust
//! use fieldseal_crypto::{wrap_key, unwrap_key, encrypt_value, decrypt_value};
//! use fieldseal_crypto::{AeadCipher, DocumentKey, KeyPair};
//!
//! let holder = KeyPair::generate();
//! let key = DocumentKey::generate();
//!
//! let field = encrypt_value(&key, AeadCipher::default(), &serde_json::json!("hello")).unwrap();
//! let wrapped = wrap_key(&key, holder.public_key(), AeadCipher::default()).unwrap();
//!
//! let unwrapped = unwrap_key(&wrapped, holder.secret_key()).unwrap();
//! assert_eq!(decrypt_value(&unwrapped, &field).unwrap(), "hello");
//! ```

pub mod asymmetric;
pub mod error;
pub mod hashing;
pub mod keys;
pub mod passphrase;
pub mod symmetric;

pub use asymmetric::{unwrap_key, wrap_key, Decryptor, Encryptor, WrappedKey};
pub use error::{CryptoError, Result};
pub use keys::{DocumentKey, KeyPair, PublicKey, SecretKey, KEY_SIZE, NONCE_SIZE};
pub use passphrase::{KdfParams, PassphraseProtectedKey};
pub use symmetric::{decrypt_value, encrypt_value, Aead, AeadCipher, Nonce, SealedBytes};

/// The version of the ciphertext frame format
pub const CRYPTO_VERSION: u8 = 1;
