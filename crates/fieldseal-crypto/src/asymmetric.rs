//! Public-key wrapping of small secrets
//!
//! X25519 ephemeral-static key agreement, BLAKE3 key derivation and an AEAD
//! seal. Used only for document keys; bulk field data always goes through
//! [`crate::symmetric`].

use crate::{
    hashing::derive_key,
    keys::{DocumentKey, PublicKey, SecretKey, NONCE_SIZE, X25519_KEY_SIZE},
    symmetric::{Aead, AeadCipher, Nonce},
    CryptoError, Result, CRYPTO_VERSION,
};
use base64::Engine;
use rand::rngs::OsRng;
use x25519_dalek::{PublicKey as X25519Public, StaticSecret};
use zeroize::Zeroizing;

/// Key derivation context for wrapping keys
const WRAP_CONTEXT: &str = "fieldseal 2024 document-key wrap v1";

/// Length of the `version ‖ cipher-id` frame header
const HEADER_LEN: usize = 2;

/// A secret sealed for one recipient's public key
#[derive(Clone, PartialEq, Eq)]
pub struct WrappedKey {
    /// The AEAD cipher used
    pub cipher: AeadCipher,
    /// The sender's ephemeral public key
    pub ephemeral_public: [u8; X25519_KEY_SIZE],
    /// The nonce used for AEAD
    pub nonce: Nonce,
    /// Sealed secret including the authentication tag
    pub ciphertext: Vec<u8>,
}

impl WrappedKey {
    /// Binary frame: `version ‖ cipher-id ‖ ephemeral-public ‖ nonce ‖ ciphertext`
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out =
            Vec::with_capacity(HEADER_LEN + X25519_KEY_SIZE + NONCE_SIZE + self.ciphertext.len());
        out.push(CRYPTO_VERSION);
        out.push(self.cipher.wire_id());
        out.extend_from_slice(&self.ephemeral_public);
        out.extend_from_slice(self.nonce.as_bytes());
        out.extend_from_slice(&self.ciphertext);
        out
    }

    /// Parse a binary frame
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let body = HEADER_LEN + X25519_KEY_SIZE + NONCE_SIZE;
        if bytes.len() <= body {
            return Err(CryptoError::InvalidCiphertext(format!(
                "wrapped key too short: {} bytes",
                bytes.len()
            )));
        }
        if bytes[0] != CRYPTO_VERSION {
            return Err(CryptoError::UnsupportedVersion(bytes[0]));
        }
        let cipher = AeadCipher::from_wire_id(bytes[1])?;
        let mut ephemeral_public = [0u8; X25519_KEY_SIZE];
        ephemeral_public.copy_from_slice(&bytes[HEADER_LEN..HEADER_LEN + X25519_KEY_SIZE]);
        let nonce = Nonce::from_bytes(&bytes[HEADER_LEN + X25519_KEY_SIZE..body])?;
        Ok(Self {
            cipher,
            ephemeral_public,
            nonce,
            ciphertext: bytes[body..].to_vec(),
        })
    }

    /// Opaque string form stored in a principal's wrapped-key list
    pub fn to_compact(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(self.to_bytes())
    }

    /// Parse the opaque string form
    pub fn from_compact(s: &str) -> Result<Self> {
        let bytes = base64::engine::general_purpose::STANDARD.decode(s)?;
        Self::from_bytes(&bytes)
    }
}

impl std::fmt::Debug for WrappedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WrappedKey")
            .field("cipher", &self.cipher)
            .field("len", &self.ciphertext.len())
            .finish()
    }
}

fn shared_key(shared_secret: &[u8]) -> Result<DocumentKey> {
    let derived = Zeroizing::new(derive_key(WRAP_CONTEXT, shared_secret));
    DocumentKey::from_bytes(derived.as_slice())
}

/// Seals secrets for one recipient
pub struct Encryptor {
    recipient_public: PublicKey,
    cipher: AeadCipher,
}

impl Encryptor {
    /// Create a new encryptor for the given recipient
    pub fn new(recipient_public: &PublicKey) -> Self {
        Self::with_cipher(recipient_public, AeadCipher::default())
    }

    /// Create with a specific AEAD cipher
    pub fn with_cipher(recipient_public: &PublicKey, cipher: AeadCipher) -> Self {
        Self {
            recipient_public: recipient_public.clone(),
            cipher,
        }
    }

    /// Seal a small secret for the recipient
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<WrappedKey> {
        let ephemeral_secret = StaticSecret::random_from_rng(OsRng);
        let ephemeral_public = X25519Public::from(&ephemeral_secret);

        let recipient = X25519Public::from(*self.recipient_public.as_bytes());
        let shared_secret = ephemeral_secret.diffie_hellman(&recipient);
        if !shared_secret.was_contributory() {
            return Err(CryptoError::InvalidKey(
                "recipient public key is a low-order point".to_string(),
            ));
        }
        let kek = shared_key(shared_secret.as_bytes())?;

        let nonce = Nonce::generate();
        let ciphertext = Aead::new(&kek, self.cipher).encrypt(&nonce, plaintext)?;

        Ok(WrappedKey {
            cipher: self.cipher,
            ephemeral_public: *ephemeral_public.as_bytes(),
            nonce,
            ciphertext,
        })
    }

    /// Wrap a document key for the recipient
    pub fn wrap(&self, key: &DocumentKey) -> Result<WrappedKey> {
        self.encrypt(key.as_bytes())
    }
}

/// Opens secrets sealed for one secret key
pub struct Decryptor<'a> {
    secret: &'a SecretKey,
}

impl<'a> Decryptor<'a> {
    /// Create a decryptor bound to a secret key
    pub fn new(secret: &'a SecretKey) -> Self {
        Self { secret }
    }

    /// Open a sealed secret
    pub fn decrypt(&self, wrapped: &WrappedKey) -> Result<Vec<u8>> {
        let recipient_secret = StaticSecret::from(*self.secret.as_bytes());
        let ephemeral_public = X25519Public::from(wrapped.ephemeral_public);
        let shared_secret = recipient_secret.diffie_hellman(&ephemeral_public);
        let kek = shared_key(shared_secret.as_bytes())?;

        Aead::new(&kek, wrapped.cipher).decrypt(&wrapped.nonce, &wrapped.ciphertext)
    }

    /// Unwrap a document key
    pub fn unwrap(&self, wrapped: &WrappedKey) -> Result<DocumentKey> {
        let bytes = Zeroizing::new(self.decrypt(wrapped)?);
        DocumentKey::from_bytes(&bytes)
    }
}

/// Wrap `key` for `recipient` and return the persisted string form
pub fn wrap_key(key: &DocumentKey, recipient: &PublicKey, cipher: AeadCipher) -> Result<String> {
    Ok(Encryptor::with_cipher(recipient, cipher).wrap(key)?.to_compact())
}

/// Unwrap a persisted wrapped key with `secret`
pub fn unwrap_key(wrapped: &str, secret: &SecretKey) -> Result<DocumentKey> {
    Decryptor::new(secret).unwrap(&WrappedKey::from_compact(wrapped)?)
}
