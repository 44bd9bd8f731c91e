//! Symmetric encryption using AES-GCM and ChaCha20-Poly1305
//!
//! This module provides authenticated encryption for protected field values
//! under a record's `DocumentKey`, and the compact string form those
//! ciphertexts take once persisted.

use crate::{
    keys::{DocumentKey, KEY_SIZE, NONCE_SIZE},
    CryptoError, Result, CRYPTO_VERSION,
};
use aes_gcm::{aead::Aead as AeadTrait, Aes256Gcm, KeyInit};
use base64::Engine;
use chacha20poly1305::ChaCha20Poly1305;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

/// Length of the `version ‖ cipher-id` frame header
const HEADER_LEN: usize = 2;

/// A nonce for AEAD encryption
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Nonce {
    bytes: [u8; NONCE_SIZE],
}

impl Nonce {
    /// Generate a random nonce
    pub fn generate() -> Self {
        let mut bytes = [0u8; NONCE_SIZE];
        rand::RngCore::fill_bytes(&mut OsRng, &mut bytes);
        Self { bytes }
    }

    /// Create from raw bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != NONCE_SIZE {
            return Err(CryptoError::InvalidNonce(format!(
                "nonce must be {} bytes, got {}",
                NONCE_SIZE,
                bytes.len()
            )));
        }
        let mut arr = [0u8; NONCE_SIZE];
        arr.copy_from_slice(bytes);
        Ok(Self { bytes: arr })
    }

    /// Get the nonce bytes
    pub fn as_bytes(&self) -> &[u8; NONCE_SIZE] {
        &self.bytes
    }
}

/// Supported AEAD ciphers
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AeadCipher {
    /// AES-256-GCM
    #[default]
    Aes256Gcm,
    /// ChaCha20-Poly1305
    ChaCha20Poly1305,
}

impl AeadCipher {
    /// Get the algorithm identifier string
    pub fn algorithm_id(&self) -> &'static str {
        match self {
            Self::Aes256Gcm => "AES-256-GCM",
            Self::ChaCha20Poly1305 => "ChaCha20-Poly1305",
        }
    }

    /// Get the authentication tag size
    pub fn tag_size(&self) -> usize {
        16
    }

    /// Byte tag written into ciphertext frames
    pub fn wire_id(&self) -> u8 {
        match self {
            Self::Aes256Gcm => 1,
            Self::ChaCha20Poly1305 => 2,
        }
    }

    /// Resolve a frame's cipher tag
    pub fn from_wire_id(id: u8) -> Result<Self> {
        match id {
            1 => Ok(Self::Aes256Gcm),
            2 => Ok(Self::ChaCha20Poly1305),
            other => Err(CryptoError::InvalidCiphertext(format!(
                "unknown cipher id {other}"
            ))),
        }
    }
}

/// AEAD encryption/decryption interface
pub struct Aead {
    cipher: AeadCipher,
    key: Zeroizing<[u8; KEY_SIZE]>,
}

impl Aead {
    /// Create a new AEAD instance with the given key and cipher
    pub fn new(key: &DocumentKey, cipher: AeadCipher) -> Self {
        Self {
            cipher,
            key: Zeroizing::new(*key.as_bytes()),
        }
    }

    /// Encrypt data with the given nonce
    pub fn encrypt(&self, nonce: &Nonce, plaintext: &[u8]) -> Result<Vec<u8>> {
        match self.cipher {
            AeadCipher::Aes256Gcm => {
                let cipher = Aes256Gcm::new_from_slice(self.key.as_slice())
                    .map_err(|e| CryptoError::Encryption(e.to_string()))?;
                cipher
                    .encrypt(aes_gcm::Nonce::from_slice(nonce.as_bytes()), plaintext)
                    .map_err(|e| CryptoError::Encryption(e.to_string()))
            }
            AeadCipher::ChaCha20Poly1305 => {
                let cipher = ChaCha20Poly1305::new_from_slice(self.key.as_slice())
                    .map_err(|e| CryptoError::Encryption(e.to_string()))?;
                cipher
                    .encrypt(
                        chacha20poly1305::Nonce::from_slice(nonce.as_bytes()),
                        plaintext,
                    )
                    .map_err(|e| CryptoError::Encryption(e.to_string()))
            }
        }
    }

    /// Decrypt data with the given nonce
    pub fn decrypt(&self, nonce: &Nonce, ciphertext: &[u8]) -> Result<Vec<u8>> {
        match self.cipher {
            AeadCipher::Aes256Gcm => {
                let cipher = Aes256Gcm::new_from_slice(self.key.as_slice())
                    .map_err(|e| CryptoError::Decryption(e.to_string()))?;
                cipher
                    .decrypt(aes_gcm::Nonce::from_slice(nonce.as_bytes()), ciphertext)
                    .map_err(|e| CryptoError::Decryption(e.to_string()))
            }
            AeadCipher::ChaCha20Poly1305 => {
                let cipher = ChaCha20Poly1305::new_from_slice(self.key.as_slice())
                    .map_err(|e| CryptoError::Decryption(e.to_string()))?;
                cipher
                    .decrypt(
                        chacha20poly1305::Nonce::from_slice(nonce.as_bytes()),
                        ciphertext,
                    )
                    .map_err(|e| CryptoError::Decryption(e.to_string()))
            }
        }
    }
}

/// A symmetric ciphertext with the parameters needed to open it
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SealedBytes {
    /// The AEAD cipher used
    pub cipher: AeadCipher,
    /// The nonce used for AEAD
    pub nonce: Nonce,
    /// Ciphertext including the authentication tag
    pub ciphertext: Vec<u8>,
}

impl SealedBytes {
    /// Encrypt `plaintext` under `key` with a fresh nonce
    pub fn seal(key: &DocumentKey, cipher: AeadCipher, plaintext: &[u8]) -> Result<Self> {
        let nonce = Nonce::generate();
        let ciphertext = Aead::new(key, cipher).encrypt(&nonce, plaintext)?;
        Ok(Self {
            cipher,
            nonce,
            ciphertext,
        })
    }

    /// Decrypt with `key`
    pub fn open(&self, key: &DocumentKey) -> Result<Vec<u8>> {
        Aead::new(key, self.cipher).decrypt(&self.nonce, &self.ciphertext)
    }

    /// Binary frame: `version ‖ cipher-id ‖ nonce ‖ ciphertext`
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + NONCE_SIZE + self.ciphertext.len());
        out.push(CRYPTO_VERSION);
        out.push(self.cipher.wire_id());
        out.extend_from_slice(self.nonce.as_bytes());
        out.extend_from_slice(&self.ciphertext);
        out
    }

    /// Parse a binary frame
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN + NONCE_SIZE + AeadCipher::default().tag_size() {
            return Err(CryptoError::InvalidCiphertext(format!(
                "frame too short: {} bytes",
                bytes.len()
            )));
        }
        if bytes[0] != CRYPTO_VERSION {
            return Err(CryptoError::UnsupportedVersion(bytes[0]));
        }
        let cipher = AeadCipher::from_wire_id(bytes[1])?;
        let nonce = Nonce::from_bytes(&bytes[HEADER_LEN..HEADER_LEN + NONCE_SIZE])?;
        Ok(Self {
            cipher,
            nonce,
            ciphertext: bytes[HEADER_LEN + NONCE_SIZE..].to_vec(),
        })
    }

    /// Opaque string form stored in place of a protected field
    pub fn to_compact(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(self.to_bytes())
    }

    /// Parse the opaque string form
    pub fn from_compact(s: &str) -> Result<Self> {
        let bytes = base64::engine::general_purpose::STANDARD.decode(s)?;
        Self::from_bytes(&bytes)
    }
}

/// Encrypt a JSON field value into its opaque persisted string
pub fn encrypt_value(
    key: &DocumentKey,
    cipher: AeadCipher,
    value: &serde_json::Value,
) -> Result<String> {
    let plaintext = Zeroizing::new(serde_json::to_vec(value)?);
    Ok(SealedBytes::seal(key, cipher, &plaintext)?.to_compact())
}

/// Decrypt an opaque persisted string back into the original JSON value
pub fn decrypt_value(key: &DocumentKey, sealed: &str) -> Result<serde_json::Value> {
    let plaintext = Zeroizing::new(SealedBytes::from_compact(sealed)?.open(key)?);
    Ok(serde_json::from_slice(&plaintext)?)
}
