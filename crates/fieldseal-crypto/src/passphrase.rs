//! Passphrase protection of a user's private key (Argon2id -> AEAD)
//!
//! The protected form is the only one ever persisted. The AEAD tag
//! authenticates the unlock, so a wrong passphrase surfaces as
//! [`CryptoError::WrongPassphrase`] instead of a garbage key.

use crate::{
    keys::{DocumentKey, SecretKey, KEY_SIZE},
    symmetric::{AeadCipher, SealedBytes},
    CryptoError, Result,
};
use argon2::{Algorithm, Argon2, Params, Version};
use base64::Engine;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

/// Size of the Argon2id salt in bytes
pub const SALT_SIZE: usize = 16;

/// Argon2id cost parameters
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KdfParams {
    /// Memory cost in KiB
    pub memory_kib: u32,
    /// Number of passes
    pub iterations: u32,
    /// Degree of parallelism
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            memory_kib: 19 * 1024,
            iterations: 2,
            parallelism: 1,
        }
    }
}

impl KdfParams {
    /// Cheap parameters for tests; never use for real passphrases
    pub fn insecure_fast() -> Self {
        Self {
            memory_kib: 64,
            iterations: 1,
            parallelism: 1,
        }
    }

    fn argon2(&self) -> Result<Argon2<'static>> {
        let params = Params::new(
            self.memory_kib,
            self.iterations,
            self.parallelism,
            Some(KEY_SIZE),
        )
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }
}

/// Derive a symmetric key from a passphrase and salt
pub fn derive_passphrase_key(
    passphrase: &str,
    salt: &[u8; SALT_SIZE],
    params: &KdfParams,
) -> Result<DocumentKey> {
    let mut out = Zeroizing::new([0u8; KEY_SIZE]);
    params
        .argon2()?
        .hash_password_into(passphrase.as_bytes(), salt, out.as_mut_slice())
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    DocumentKey::from_bytes(out.as_slice())
}

/// A private key sealed under a passphrase-derived key
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassphraseProtectedKey {
    /// Argon2id salt (base64)
    pub salt: String,
    /// Argon2id parameters used at protection time
    pub kdf: KdfParams,
    /// Sealed private key (opaque frame, base64)
    pub sealed: String,
}

impl PassphraseProtectedKey {
    /// Seal `secret` under `passphrase`
    pub fn protect(
        secret: &SecretKey,
        passphrase: &str,
        params: &KdfParams,
        cipher: AeadCipher,
    ) -> Result<Self> {
        let mut salt = [0u8; SALT_SIZE];
        rand::RngCore::fill_bytes(&mut OsRng, &mut salt);
        let key = derive_passphrase_key(passphrase, &salt, params)?;
        let sealed = SealedBytes::seal(&key, cipher, secret.as_bytes())?;

        Ok(Self {
            salt: base64::engine::general_purpose::STANDARD.encode(salt),
            kdf: params.clone(),
            sealed: sealed.to_compact(),
        })
    }

    /// Recover the private key with `passphrase`
    pub fn unprotect(&self, passphrase: &str) -> Result<SecretKey> {
        let salt_bytes = base64::engine::general_purpose::STANDARD.decode(&self.salt)?;
        let salt: [u8; SALT_SIZE] = salt_bytes.as_slice().try_into().map_err(|_| {
            CryptoError::InvalidCiphertext(format!(
                "salt must be {} bytes, got {}",
                SALT_SIZE,
                salt_bytes.len()
            ))
        })?;
        let key = derive_passphrase_key(passphrase, &salt, &self.kdf)?;
        let sealed = SealedBytes::from_compact(&self.sealed)?;
        let plaintext = Zeroizing::new(sealed.open(&key).map_err(|e| match e {
            CryptoError::Decryption(_) => CryptoError::WrongPassphrase,
            other => other,
        })?);
        SecretKey::from_bytes(&plaintext)
    }
}
