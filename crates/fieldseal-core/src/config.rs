//! Engine and per-collection configuration

use crate::{EngineError, Result};
use fieldseal_crypto::{AeadCipher, DocumentKey, KdfParams};
use fieldseal_store::{Document, SubjectType, USER_SUBJECT};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Prefix of environment variables read by [`EngineConfig::load`]
pub const ENV_PREFIX: &str = "FIELDSEAL";

/// Placeholder written into protected fields until ciphertext lands
pub const DEFAULT_PLACEHOLDER: &str = "--";

/// Engine-wide configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Report "no principal" and "no entry" on the read path instead of
    /// returning the record unchanged
    pub reveal_access_errors: bool,
    /// AEAD used for field ciphertext, key wraps and passphrase sealing
    pub cipher: AeadCipher,
    /// Sentinel stored in protected fields while `encrypted` is false
    pub placeholder: String,
    /// Argon2id cost for passphrase-protected private keys
    pub kdf: KdfParams,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            reveal_access_errors: false,
            cipher: AeadCipher::default(),
            placeholder: DEFAULT_PLACEHOLDER.to_string(),
            kdf: KdfParams::default(),
        }
    }
}

impl EngineConfig {
    /// Load from an optional file, then `FIELDSEAL_*` environment variables
    ///
    /// Nested keys use `__`, e.g. `FIELDSEAL_KDF__MEMORY_KIB=65536`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env(path, None)
    }

    fn load_with_env(
        path: Option<&Path>,
        env: Option<config::Map<String, String>>,
    ) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .source(env),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.placeholder.is_empty() {
            return Err(EngineError::Config("placeholder must not be empty".into()));
        }
        if self.kdf.memory_kib == 0 || self.kdf.iterations == 0 || self.kdf.parallelism == 0 {
            return Err(EngineError::Config(format!(
                "kdf costs must be non-zero (memory_kib={}, iterations={}, parallelism={})",
                self.kdf.memory_kib, self.kdf.iterations, self.kdf.parallelism
            )));
        }
        Ok(())
    }
}

/// Structural check run before capture; `Err` carries the reason
pub type ShapeCheck = Arc<dyn Fn(&Document) -> std::result::Result<(), String> + Send + Sync>;

/// Invoked after a document key is generated, before anything is persisted
pub type KeyGeneratedHook = Arc<dyn Fn(&DocumentKey, &Document) + Send + Sync>;

/// Invoked after the ciphertext write succeeds
pub type EncryptionCompleteHook = Arc<dyn Fn(&Document) + Send + Sync>;

/// Registration of one protected collection
#[derive(Clone)]
pub struct CollectionConfig {
    name: String,
    fields: Vec<String>,
    shape_check: Option<ShapeCheck>,
    on_key_generated: Option<KeyGeneratedHook>,
    on_encryption_complete: Option<EncryptionCompleteHook>,
}

impl CollectionConfig {
    /// Register `name` with the fields to protect
    pub fn new<I, S>(name: impl Into<String>, fields: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let name = name.into();
        let fields: Vec<String> = fields.into_iter().map(Into::into).collect();

        if name.is_empty() {
            return Err(EngineError::InvalidCollection("name must not be empty".into()));
        }
        if name == USER_SUBJECT {
            return Err(EngineError::InvalidCollection(format!(
                "'{USER_SUBJECT}' is reserved for user principals"
            )));
        }
        if fields.is_empty() {
            return Err(EngineError::InvalidCollection(format!(
                "{name}: at least one protected field is required"
            )));
        }
        let mut seen = HashSet::new();
        for field in &fields {
            if field == "_id" || field == "encrypted" {
                return Err(EngineError::InvalidCollection(format!(
                    "{name}: '{field}' cannot be protected"
                )));
            }
            if !seen.insert(field.as_str()) {
                return Err(EngineError::InvalidCollection(format!(
                    "{name}: field '{field}' listed twice"
                )));
            }
        }

        Ok(Self {
            name,
            fields,
            shape_check: None,
            on_key_generated: None,
            on_encryption_complete: None,
        })
    }

    /// Reject documents failing `check` before any key material is made
    pub fn with_shape_check<F>(mut self, check: F) -> Self
    where
        F: Fn(&Document) -> std::result::Result<(), String> + Send + Sync + 'static,
    {
        self.shape_check = Some(Arc::new(check));
        self
    }

    /// Observe each freshly generated document key with the plaintext document
    pub fn on_key_generated<F>(mut self, hook: F) -> Self
    where
        F: Fn(&DocumentKey, &Document) + Send + Sync + 'static,
    {
        self.on_key_generated = Some(Arc::new(hook));
        self
    }

    /// Observe each committed ciphertext document
    pub fn on_encryption_complete<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Document) + Send + Sync + 'static,
    {
        self.on_encryption_complete = Some(Arc::new(hook));
        self
    }

    /// Collection name, also the record principals' subject type
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Protected field names
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Whether `field` is protected
    pub fn is_protected(&self, field: &str) -> bool {
        self.fields.iter().any(|f| f == field)
    }

    /// Subject type of this collection's record principals
    pub fn subject_type(&self) -> SubjectType {
        SubjectType::record(self.name.as_str())
    }

    pub(crate) fn check_shape(&self, document: &Document) -> std::result::Result<(), String> {
        match &self.shape_check {
            Some(check) => check(document),
            None => Ok(()),
        }
    }

    /// Run the shape check, failing with `ShapeValidation`
    pub(crate) fn require_shape(&self, document: &Document) -> Result<()> {
        self.check_shape(document)
            .map_err(|reason| EngineError::ShapeValidation {
                record_type: self.name.clone(),
                reason,
            })
    }

    pub(crate) fn notify_key_generated(&self, key: &DocumentKey, plaintext: &Document) {
        if let Some(hook) = &self.on_key_generated {
            hook(key, plaintext);
        }
    }

    pub(crate) fn notify_encryption_complete(&self, document: &Document) {
        if let Some(hook) = &self.on_encryption_complete {
            hook(document);
        }
    }
}

impl fmt::Debug for CollectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionConfig")
            .field("name", &self.name)
            .field("fields", &self.fields)
            .field("shape_check", &self.shape_check.is_some())
            .field("on_key_generated", &self.on_key_generated.is_some())
            .field("on_encryption_complete", &self.on_encryption_complete.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> Option<config::Map<String, String>> {
        Some(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_defaults() {
        let config = EngineConfig::load_with_env(None, env(&[])).unwrap();
        assert_eq!(config, EngineConfig::default());
        assert!(!config.reveal_access_errors);
        assert_eq!(config.placeholder, "--");
        assert_eq!(config.cipher, AeadCipher::Aes256Gcm);
    }

    #[test]
    fn test_env_overrides() {
        let config = EngineConfig::load_with_env(
            None,
            env(&[
                ("FIELDSEAL_REVEAL_ACCESS_ERRORS", "true"),
                ("FIELDSEAL_CIPHER", "chacha20poly1305"),
                ("FIELDSEAL_KDF__MEMORY_KIB", "64"),
                ("FIELDSEAL_KDF__ITERATIONS", "1"),
            ]),
        )
        .unwrap();

        assert!(config.reveal_access_errors);
        assert_eq!(config.cipher, AeadCipher::ChaCha20Poly1305);
        assert_eq!(config.kdf.memory_kib, 64);
        assert_eq!(config.kdf.iterations, 1);
        assert_eq!(config.kdf.parallelism, 1);
    }

    #[test]
    fn test_file_then_env() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "reveal_access_errors = true\nplaceholder = \"[sealed]\"\n\n[kdf]\niterations = 3"
        )
        .unwrap();

        let config = EngineConfig::load_with_env(
            Some(file.path()),
            env(&[("FIELDSEAL_REVEAL_ACCESS_ERRORS", "false")]),
        )
        .unwrap();

        assert!(!config.reveal_access_errors);
        assert_eq!(config.placeholder, "[sealed]");
        assert_eq!(config.kdf.iterations, 3);
        assert_eq!(config.kdf.memory_kib, KdfParams::default().memory_kib);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = EngineConfig::load_with_env(Some(&dir.path().join("absent.toml")), env(&[]))
            .unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }

    #[rstest]
    #[case("FIELDSEAL_KDF__ITERATIONS", "0")]
    #[case("FIELDSEAL_KDF__MEMORY_KIB", "0")]
    #[case("FIELDSEAL_KDF__PARALLELISM", "0")]
    fn test_zero_kdf_cost_rejected(#[case] key: &str, #[case] value: &str) {
        let err = EngineConfig::load_with_env(None, env(&[(key, value)])).unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }

    #[test]
    fn test_empty_placeholder_rejected() {
        let config = EngineConfig {
            placeholder: String::new(),
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[rstest]
    #[case("user", vec!["title"])]
    #[case("", vec!["title"])]
    #[case("notes", vec![])]
    #[case("notes", vec!["title", "title"])]
    #[case("notes", vec!["encrypted"])]
    #[case("notes", vec!["_id"])]
    fn test_invalid_collections(#[case] name: &str, #[case] fields: Vec<&str>) {
        let err = CollectionConfig::new(name, fields).unwrap_err();
        assert!(matches!(err, EngineError::InvalidCollection(_)));
    }

    #[test]
    fn test_collection_accessors() {
        let config = CollectionConfig::new("notes", ["title", "body"]).unwrap();
        assert_eq!(config.name(), "notes");
        assert!(config.is_protected("body"));
        assert!(!config.is_protected("author"));
        assert_eq!(config.subject_type(), SubjectType::record("notes"));
        assert!(format!("{config:?}").contains("shape_check: false"));
    }
}
