//! Key types for field encryption and key wrapping
//!
//! - `DocumentKey`: random symmetric key encrypting one record's protected fields
//! - `KeyPair`: X25519 pair used to wrap and unwrap document keys for a holder

use crate::{hashing, CryptoError, Result};
use base64::Engine;
use rand::rngs::OsRng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Size of a symmetric key in bytes (256 bits)
pub const KEY_SIZE: usize = 32;

/// Size of a nonce in bytes (96 bits for AES-GCM/ChaCha20-Poly1305)
pub const NONCE_SIZE: usize = 12;

/// Size of an X25519 public or secret key in bytes
pub const X25519_KEY_SIZE: usize = 32;

fn copy_exact<const N: usize>(bytes: &[u8], what: &str) -> Result<[u8; N]> {
    if bytes.len() != N {
        return Err(CryptoError::InvalidKey(format!(
            "{} must be {} bytes, got {}",
            what,
            N,
            bytes.len()
        )));
    }
    let mut arr = [0u8; N];
    arr.copy_from_slice(bytes);
    Ok(arr)
}

/// A per-record symmetric key. Never persisted unwrapped.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct DocumentKey {
    key: [u8; KEY_SIZE],
}

impl DocumentKey {
    /// Generate a new random document key
    pub fn generate() -> Self {
        let mut key = [0u8; KEY_SIZE];
        rand::RngCore::fill_bytes(&mut OsRng, &mut key);
        Self { key }
    }

    /// Create a document key from raw bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(Self {
            key: copy_exact::<KEY_SIZE>(bytes, "document key")?,
        })
    }

    /// Get the key bytes
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.key
    }
}

impl PartialEq for DocumentKey {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for DocumentKey {}

impl fmt::Debug for DocumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DocumentKey(..)")
    }
}

/// An X25519 public key
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct PublicKey {
    bytes: [u8; X25519_KEY_SIZE],
}

impl PublicKey {
    /// Create from raw bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(Self {
            bytes: copy_exact::<X25519_KEY_SIZE>(bytes, "public key")?,
        })
    }

    /// Get the key bytes
    pub fn as_bytes(&self) -> &[u8; X25519_KEY_SIZE] {
        &self.bytes
    }

    /// Encode as base64
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(self.bytes)
    }

    /// Decode from base64
    pub fn from_base64(s: &str) -> Result<Self> {
        let bytes = base64::engine::general_purpose::STANDARD.decode(s)?;
        Self::from_bytes(&bytes)
    }

    /// Short hex identifier, safe to log
    pub fn fingerprint(&self) -> String {
        hashing::fingerprint(&self.bytes)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.fingerprint())
    }
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.serialize_str(&self.to_base64())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        Self::from_base64(&s).map_err(serde::de::Error::custom)
    }
}

/// An X25519 secret key
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretKey {
    bytes: [u8; X25519_KEY_SIZE],
}

impl SecretKey {
    /// Generate a new random secret key
    pub fn generate() -> Self {
        let mut bytes = [0u8; X25519_KEY_SIZE];
        rand::RngCore::fill_bytes(&mut OsRng, &mut bytes);
        Self { bytes }
    }

    /// Create from raw bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(Self {
            bytes: copy_exact::<X25519_KEY_SIZE>(bytes, "secret key")?,
        })
    }

    /// Get the key bytes
    pub fn as_bytes(&self) -> &[u8; X25519_KEY_SIZE] {
        &self.bytes
    }

    /// Derive the public key from this secret key
    pub fn public_key(&self) -> PublicKey {
        use x25519_dalek::{PublicKey as X25519Public, StaticSecret};
        let secret = StaticSecret::from(self.bytes);
        let public = X25519Public::from(&secret);
        PublicKey {
            bytes: *public.as_bytes(),
        }
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(..)")
    }
}

/// A key pair held by one user
#[derive(Clone)]
pub struct KeyPair {
    secret: SecretKey,
    public: PublicKey,
}

impl KeyPair {
    /// Generate a new random key pair
    pub fn generate() -> Self {
        let secret = SecretKey::generate();
        let public = secret.public_key();
        Self { secret, public }
    }

    /// Create from an existing secret key
    pub fn from_secret_key(secret: SecretKey) -> Self {
        let public = secret.public_key();
        Self { secret, public }
    }

    /// Get the secret key
    pub fn secret_key(&self) -> &SecretKey {
        &self.secret
    }

    /// Get the public key
    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    /// Split into the secret and public halves
    pub fn into_parts(self) -> (SecretKey, PublicKey) {
        (self.secret, self.public)
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_key_generation() {
        let k1 = DocumentKey::generate();
        let k2 = DocumentKey::generate();
        assert_ne!(k1.as_bytes(), k2.as_bytes());
    }

    #[test]
    fn test_document_key_rejects_wrong_length() {
        assert!(DocumentKey::from_bytes(&[0u8; 16]).is_err());
        assert!(DocumentKey::from_bytes(&[0u8; KEY_SIZE]).is_ok());
    }

    #[test]
    fn test_keypair_generation() {
        let kp1 = KeyPair::generate();
        let kp2 = KeyPair::generate();
        assert_ne!(kp1.public_key(), kp2.public_key());
    }

    #[test]
    fn test_public_key_derivation() {
        let kp = KeyPair::generate();
        assert_eq!(kp.public_key(), &kp.secret_key().public_key());
    }

    #[test]
    fn test_public_key_serde_is_base64_string() {
        let kp = KeyPair::generate();
        let json = serde_json::to_string(kp.public_key()).unwrap();
        assert_eq!(json, format!("\"{}\"", kp.public_key().to_base64()));

        let back: PublicKey = serde_json::from_str(&json).unwrap();
        assert_eq!(&back, kp.public_key());
    }

    #[test]
    fn test_debug_never_prints_secret_bytes() {
        let kp = KeyPair::generate();
        let rendered = format!("{:?} {:?}", kp.secret_key(), DocumentKey::generate());
        assert_eq!(rendered, "SecretKey(..) DocumentKey(..)");
    }

    #[test]
    fn test_fingerprint_is_stable() {
        let kp = KeyPair::generate();
        assert_eq!(kp.public_key().fingerprint(), kp.public_key().fingerprint());
        assert_eq!(kp.public_key().fingerprint().len(), 16);
    }
}
