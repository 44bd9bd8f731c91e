//! Protected records as the host data store sees them

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Record identifier assigned by the record store
pub type RecordId = String;

/// Field map of a document or modifier
pub type Fields = Map<String, Value>;

/// A stored document
///
/// `encrypted` is `false` while protected fields hold a placeholder and
/// `true` once they hold ciphertext.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Store-assigned id (absent before the first insert)
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RecordId>,
    /// Whether protected fields currently hold ciphertext
    #[serde(default)]
    pub encrypted: bool,
    /// Application fields
    #[serde(flatten)]
    pub fields: Fields,
}

impl Document {
    /// An unsaved document with the given fields
    pub fn new(fields: Fields) -> Self {
        Self {
            id: None,
            encrypted: false,
            fields,
        }
    }

    /// Build from a JSON object; non-objects yield an empty document
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Object(fields) => Self::new(fields),
            _ => Self::default(),
        }
    }

    /// Set the id
    pub fn with_id(mut self, id: impl Into<RecordId>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Get a field value
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Set a field value
    pub fn set(&mut self, field: impl Into<String>, value: Value) {
        self.fields.insert(field.into(), value);
    }

    /// Apply a modifier in place
    pub fn apply(&mut self, modifier: &Modifier) {
        for (field, value) in &modifier.set {
            self.fields.insert(field.clone(), value.clone());
        }
        if let Some(encrypted) = modifier.encrypted {
            self.encrypted = encrypted;
        }
    }
}

/// A partial update: fields to set, plus an optional `encrypted` flag change
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Modifier {
    /// Fields to overwrite
    #[serde(default)]
    pub set: Fields,
    /// New value of the `encrypted` flag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted: Option<bool>,
}

impl Modifier {
    /// A modifier setting `fields`
    pub fn set(fields: Fields) -> Self {
        Self {
            set: fields,
            encrypted: None,
        }
    }

    /// Add one field
    pub fn with(mut self, field: impl Into<String>, value: Value) -> Self {
        self.set.insert(field.into(), value);
        self
    }

    /// Whether the modifier writes `field`
    pub fn touches(&self, field: &str) -> bool {
        self.set.contains_key(field)
    }

    /// Whether the modifier changes nothing
    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.encrypted.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_document_shape() {
        let doc = Document::from_json(json!({"title": "hello"})).with_id("r1");
        let value = serde_json::to_value(&doc).unwrap();
        assert_eq!(value, json!({"_id": "r1", "encrypted": false, "title": "hello"}));

        let back: Document = serde_json::from_value(value).unwrap();
        assert_eq!(back, doc);
    }

    #[test]
    fn test_missing_encrypted_flag_means_false() {
        let doc: Document = serde_json::from_value(json!({"title": "x"})).unwrap();
        assert!(!doc.encrypted);
        assert!(doc.id.is_none());
    }

    #[test]
    fn test_apply_modifier() {
        let mut doc = Document::from_json(json!({"title": "a", "body": "b"}));
        let mut modifier = Modifier::default().with("title", json!("z"));
        modifier.encrypted = Some(true);

        doc.apply(&modifier);
        assert_eq!(doc.get("title"), Some(&json!("z")));
        assert_eq!(doc.get("body"), Some(&json!("b")));
        assert!(doc.encrypted);
    }
}
