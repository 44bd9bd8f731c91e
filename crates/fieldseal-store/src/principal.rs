//! Principal entities: the wrapped-key list for a user or a record

use chrono::{DateTime, Utc};
use fieldseal_crypto::PublicKey;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use uuid::Uuid;

/// Reserved subject type name for user principals
pub const USER_SUBJECT: &str = "user";

/// What a principal protects
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum SubjectType {
    /// A user's key material (public key only)
    User,
    /// A record of the named collection
    Record(String),
}

impl SubjectType {
    /// Subject type for records of `collection`
    pub fn record(collection: impl Into<String>) -> Self {
        Self::Record(collection.into())
    }

    /// Persisted discriminator string
    pub fn as_str(&self) -> &str {
        match self {
            Self::User => USER_SUBJECT,
            Self::Record(name) => name,
        }
    }

    /// Whether this is the user subject type
    pub fn is_user(&self) -> bool {
        matches!(self, Self::User)
    }
}

impl fmt::Display for SubjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for SubjectType {
    fn from(s: &str) -> Self {
        if s == USER_SUBJECT {
            Self::User
        } else {
            Self::Record(s.to_string())
        }
    }
}

impl Serialize for SubjectType {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for SubjectType {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        Ok(Self::from(s.as_str()))
    }
}

/// Store-assigned principal identifier
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrincipalId(Uuid);

impl PrincipalId {
    /// Generate a new random id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PrincipalId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One holder's wrapped copy of a record's document key
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WrappedKeyEntry {
    /// User id of the holder
    pub holder_user_id: String,
    /// Document key wrapped under the holder's public key (opaque)
    pub key: String,
}

impl WrappedKeyEntry {
    /// Create an entry
    pub fn new(holder_user_id: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            holder_user_id: holder_user_id.into(),
            key: key.into(),
        }
    }
}

/// Persisted holder of the wrapped-key list for a user or a record
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    /// Store identifier
    pub id: PrincipalId,
    /// `"user"` or the record's collection name
    pub subject_type: SubjectType,
    /// The user id or record id
    pub subject_id: String,
    /// Present only for user principals
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<PublicKey>,
    /// Wrapped document keys, in grant order (unused for user principals)
    #[serde(default)]
    pub wrapped_keys: Vec<WrappedKeyEntry>,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl Principal {
    /// A user principal publishing `public_key`
    pub fn user(user_id: impl Into<String>, public_key: PublicKey) -> Self {
        Self {
            id: PrincipalId::new(),
            subject_type: SubjectType::User,
            subject_id: user_id.into(),
            public_key: Some(public_key),
            wrapped_keys: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// A record principal for `record_id` of `collection`
    pub fn record(
        collection: impl Into<String>,
        record_id: impl Into<String>,
        wrapped_keys: Vec<WrappedKeyEntry>,
    ) -> Self {
        Self {
            id: PrincipalId::new(),
            subject_type: SubjectType::record(collection),
            subject_id: record_id.into(),
            public_key: None,
            wrapped_keys,
            created_at: Utc::now(),
        }
    }

    /// The wrapped key held by `user_id`, if any
    pub fn entry_for(&self, user_id: &str) -> Option<&WrappedKeyEntry> {
        self.wrapped_keys
            .iter()
            .find(|entry| entry.holder_user_id == user_id)
    }

    /// Holder user ids in grant order
    pub fn holders(&self) -> impl Iterator<Item = &str> {
        self.wrapped_keys
            .iter()
            .map(|entry| entry.holder_user_id.as_str())
    }

    /// The `(subject_type, subject_id)` key this principal is unique on
    pub fn subject_key(&self) -> (SubjectType, String) {
        (self.subject_type.clone(), self.subject_id.clone())
    }
}
