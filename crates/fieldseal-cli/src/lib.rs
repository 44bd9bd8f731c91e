//! Fieldseal CLI library
//!
//! Runs the envelope-encryption protocol end to end on in-memory stores so
//! the stored shapes can be inspected.

use fieldseal_core::{
    CollectionConfig, EngineConfig, EnvelopeEngine, KeyManager, ProtectedCollection, Session,
};
use fieldseal_store::{
    Document, MemoryPrincipalStore, MemoryProfileStore, MemoryRecordStore, Modifier,
    PrincipalStore,
};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

/// Inputs of the walkthrough
#[derive(Clone, Debug)]
pub struct DemoOptions {
    /// Collection name
    pub collection: String,
    /// Protected field
    pub field: String,
    /// Plaintext inserted by the owner
    pub value: String,
    /// Plaintext written by the owner's update
    pub updated_value: String,
    /// Owner user id
    pub owner: String,
    /// Grantee user id
    pub grantee: String,
    /// Passphrase used for both users
    pub passphrase: String,
}

impl Default for DemoOptions {
    fn default() -> Self {
        Self {
            collection: "notes".to_string(),
            field: "title".to_string(),
            value: "hello".to_string(),
            updated_value: "hello, again".to_string(),
            owner: "alice".to_string(),
            grantee: "bob".to_string(),
            passphrase: "correct horse battery staple".to_string(),
        }
    }
}

/// One observed state of the record
#[derive(Clone, Debug, Serialize)]
pub struct DemoStep {
    /// What happened
    pub label: String,
    /// The record as seen at that point
    pub document: Value,
}

/// Everything the walkthrough observed
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DemoReport {
    /// Observations in order
    pub steps: Vec<DemoStep>,
    /// Record holders at the end
    pub holders: Vec<String>,
    /// The record principal as persisted
    pub principal: Value,
}

impl DemoReport {
    fn record(&mut self, label: impl Into<String>, document: &Document) -> anyhow::Result<()> {
        self.steps.push(DemoStep {
            label: label.into(),
            document: serde_json::to_value(document)?,
        });
        Ok(())
    }
}

/// Insert, read, share and update one record between two users
pub fn run_demo(config: EngineConfig, options: &DemoOptions) -> anyhow::Result<DemoReport> {
    let principals = Arc::new(MemoryPrincipalStore::new());
    let keys = KeyManager::new(Arc::clone(&principals), MemoryProfileStore::new(), &config);
    let engine = Arc::new(EnvelopeEngine::new(Arc::clone(&principals), config));
    let collection = ProtectedCollection::new(
        CollectionConfig::new(options.collection.as_str(), [options.field.as_str()])?,
        MemoryRecordStore::new(),
        engine,
    );

    let mut owner = Session::new(options.owner.as_str());
    let mut grantee = Session::new(options.grantee.as_str());
    keys.initialize_keys(&mut owner, &options.passphrase)?;
    keys.initialize_keys(&mut grantee, &options.passphrase)?;

    let mut report = DemoReport::default();

    let mut document = Document::default();
    document.set(options.field.as_str(), Value::String(options.value.clone()));
    let captured = collection.before_insert(&owner, document.clone());
    report.record("captured for insert", &captured.document)?;
    // Display only; the driver below captures again
    if let Some(correlation) = captured.correlation {
        collection.engine().discard(&correlation);
    }

    let stored = collection.insert(&owner, document)?;
    let id = stored
        .id
        .clone()
        .ok_or_else(|| anyhow::anyhow!("record store assigned no id"))?;
    report.record("stored after commit", &stored)?;

    if let Some(read) = collection.find_one(&owner, &id)? {
        report.record(format!("read by {}", options.owner), &read)?;
    }
    if let Some(read) = collection.find_one(&grantee, &id)? {
        report.record(format!("read by {} before share", options.grantee), &read)?;
    }

    collection.share(&owner, &id, &options.grantee)?;
    if let Some(read) = collection.find_one(&grantee, &id)? {
        report.record(format!("read by {} after share", options.grantee), &read)?;
    }

    keys.lock(&mut owner);
    keys.unlock(&mut owner, &options.passphrase)?;
    collection.update(
        &owner,
        &id,
        Modifier::default().with(options.field.as_str(), Value::String(options.updated_value.clone())),
    )?;
    if let Some(read) = collection.find_one(&grantee, &id)? {
        report.record(format!("read by {} after update", options.grantee), &read)?;
    }

    report.holders = collection.holders(&id)?;
    report.principal = serde_json::to_value(
        principals.find(&collection.config().subject_type(), &id)?,
    )?;

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldseal_crypto::KdfParams;
    use serde_json::json;

    #[test_log::test]
    fn test_demo_walkthrough() {
        let config = EngineConfig {
            kdf: KdfParams::insecure_fast(),
            ..EngineConfig::default()
        };
        let report = run_demo(config, &DemoOptions::default()).unwrap();

        let labels: Vec<_> = report.steps.iter().map(|s| s.label.as_str()).collect();
        assert_eq!(
            labels,
            vec![
                "captured for insert",
                "stored after commit",
                "read by alice",
                "read by bob before share",
                "read by bob after share",
                "read by bob after update",
            ]
        );

        assert_eq!(report.steps[0].document["title"], json!("--"));
        assert_eq!(report.steps[0].document["encrypted"], json!(false));
        assert_eq!(report.steps[1].document["encrypted"], json!(true));
        assert_ne!(report.steps[1].document["title"], json!("hello"));
        assert_eq!(report.steps[2].document["title"], json!("hello"));
        assert_eq!(report.steps[3].document["title"], report.steps[1].document["title"]);
        assert_eq!(report.steps[4].document["title"], json!("hello"));
        assert_eq!(report.steps[5].document["title"], json!("hello, again"));

        assert_eq!(report.holders, vec!["alice", "bob"]);
        assert_eq!(report.principal["subjectType"], json!("notes"));
    }
}
