//! Profile key setup, unlock and passphrase rotation

use crate::{config::EngineConfig, session::Session, EngineError, Result};
use fieldseal_crypto::{AeadCipher, KdfParams, KeyPair, PassphraseProtectedKey, PublicKey};
use fieldseal_store::{Principal, PrincipalStore, ProfileStore, StoreError, SubjectType};
use tracing::{info, instrument, warn};

/// Manages a user's asymmetric key pair
///
/// The private key is persisted only sealed under the user's passphrase; the
/// unsealed key lives in the [`Session`].
pub struct KeyManager<P, F> {
    principals: P,
    profiles: F,
    kdf: KdfParams,
    cipher: AeadCipher,
}

impl<P: PrincipalStore, F: ProfileStore> KeyManager<P, F> {
    /// Create a key manager using the engine's KDF and cipher settings
    pub fn new(principals: P, profiles: F, config: &EngineConfig) -> Self {
        Self {
            principals,
            profiles,
            kdf: config.kdf.clone(),
            cipher: config.cipher,
        }
    }

    /// Generate key material for the session user
    ///
    /// Publishes the public key as a user principal, persists the sealed
    /// private key, and unlocks the session. A user initializes once.
    #[instrument(skip_all, fields(user = %session.user_id()))]
    pub fn initialize_keys(&self, session: &mut Session, passphrase: &str) -> Result<PublicKey> {
        let user_id = session.user_id().to_string();
        if self.principals.find(&SubjectType::User, &user_id)?.is_some() {
            return Err(StoreError::DuplicateKey {
                subject_type: SubjectType::User,
                subject_id: user_id,
            }
            .into());
        }

        let (secret, public) = KeyPair::generate().into_parts();
        let sealed = PassphraseProtectedKey::protect(&secret, passphrase, &self.kdf, self.cipher)?;

        let principal_id = self
            .principals
            .create(Principal::user(user_id.as_str(), public.clone()))?;
        if let Err(e) = self.profiles.set_wrapped_private_key(&user_id, sealed) {
            if let Err(rollback) = self.principals.remove(&principal_id) {
                warn!(error = %rollback, "failed to roll back user principal");
            }
            return Err(e.into());
        }

        session.set_private_key(secret);
        info!(fingerprint = %public.fingerprint(), "keys initialized");
        Ok(public)
    }

    /// Unseal the persisted private key into the session
    #[instrument(skip_all, fields(user = %session.user_id()))]
    pub fn unlock(&self, session: &mut Session, passphrase: &str) -> Result<()> {
        let user_id = session.user_id().to_string();
        let sealed = self
            .profiles
            .wrapped_private_key(&user_id)?
            .ok_or_else(|| EngineError::NoProfileKey(user_id.clone()))?;
        let secret = sealed.unprotect(passphrase)?;

        if let Some(published) = self.public_key(&user_id)? {
            if secret.public_key() != published {
                return Err(EngineError::KeyMismatch(user_id));
            }
        }

        session.set_private_key(secret);
        info!("session unlocked");
        Ok(())
    }

    /// Re-seal the private key under a new passphrase
    ///
    /// Records are untouched: their wraps depend on the key pair only.
    #[instrument(skip_all, fields(user = %session.user_id()))]
    pub fn change_passphrase(&self, session: &Session, old: &str, new: &str) -> Result<()> {
        let user_id = session.user_id();
        let sealed = self
            .profiles
            .wrapped_private_key(user_id)?
            .ok_or_else(|| EngineError::NoProfileKey(user_id.to_string()))?;
        let secret = sealed.unprotect(old)?;
        let resealed = PassphraseProtectedKey::protect(&secret, new, &self.kdf, self.cipher)?;
        self.profiles.set_wrapped_private_key(user_id, resealed)?;

        info!("passphrase changed");
        Ok(())
    }

    /// Drop the session's private key
    pub fn lock(&self, session: &mut Session) {
        session.lock();
    }

    /// The public key a user published, if any
    pub fn public_key(&self, user_id: &str) -> Result<Option<PublicKey>> {
        Ok(self
            .principals
            .find(&SubjectType::User, user_id)?
            .and_then(|principal| principal.public_key))
    }
}
