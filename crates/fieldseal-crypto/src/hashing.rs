//! BLAKE3 helpers: key derivation for wrapping and log-safe fingerprints

use crate::keys::KEY_SIZE;

/// Number of hash bytes kept in a fingerprint
const FINGERPRINT_BYTES: usize = 8;

/// Derive a 32-byte key from input material under a context string
pub fn derive_key(context: &str, input: &[u8]) -> [u8; KEY_SIZE] {
    let mut hasher = blake3::Hasher::new_derive_key(context);
    hasher.update(input);
    *hasher.finalize().as_bytes()
}

/// Short hex identifier for public material
pub fn fingerprint(data: &[u8]) -> String {
    let hash = blake3::hash(data);
    hex::encode(&hash.as_bytes()[..FINGERPRINT_BYTES])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_key_context_separation() {
        let a = derive_key("fieldseal-test-a", b"material");
        let b = derive_key("fieldseal-test-b", b"material");
        assert_ne!(a, b);
        assert_eq!(a, derive_key("fieldseal-test-a", b"material"));
    }

    #[test]
    fn test_fingerprint_length() {
        assert_eq!(fingerprint(b"abc").len(), FINGERPRINT_BYTES * 2);
    }
}
