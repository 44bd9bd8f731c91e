//! Session capability passed into every engine call

use fieldseal_crypto::SecretKey;
use std::fmt;

/// The acting user and, once unlocked, their private key
///
/// The key lives only here; dropping or locking the session zeroizes it.
#[derive(Clone)]
pub struct Session {
    user_id: String,
    private_key: Option<SecretKey>,
}

impl Session {
    /// A locked session for `user_id`
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            private_key: None,
        }
    }

    /// An unlocked session
    pub fn with_private_key(user_id: impl Into<String>, key: SecretKey) -> Self {
        Self {
            user_id: user_id.into(),
            private_key: Some(key),
        }
    }

    /// The acting user's id
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// The unwrapped private key, if unlocked
    pub fn private_key(&self) -> Option<&SecretKey> {
        self.private_key.as_ref()
    }

    /// Store an unwrapped private key for the rest of the session
    pub fn set_private_key(&mut self, key: SecretKey) {
        self.private_key = Some(key);
    }

    /// Drop the private key
    pub fn lock(&mut self) {
        self.private_key = None;
    }

    /// Whether a private key is held
    pub fn is_unlocked(&self) -> bool {
        self.private_key.is_some()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("user_id", &self.user_id)
            .field("unlocked", &self.is_unlocked())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_unlock() {
        let mut session = Session::new("alice");
        assert!(!session.is_unlocked());

        session.set_private_key(SecretKey::generate());
        assert!(session.private_key().is_some());

        session.lock();
        assert!(session.private_key().is_none());
    }

    #[test]
    fn test_debug_hides_key() {
        let session = Session::with_private_key("alice", SecretKey::generate());
        assert_eq!(
            format!("{session:?}"),
            "Session { user_id: \"alice\", unlocked: true }"
        );
    }
}
