//! Version and history recording.
//!
//! Every tracked full-document write gets the next version number and an
//! append-only record in the sibling `<collection>_hist` collection: a full
//! snapshot on creation, a structural delta against the prior snapshot
//! afterwards. Partial updates store the raw patch instead. Records are
//! prepared before the mutation and appended only after it lands; history
//! writes never fail the mutation that caused them.

use warden_core::{diff_documents, Delta, Document, Update, Value};
use warden_store::{DocumentStore, StoreError, WriteConcern};

use crate::entity::{
    version_of, Stamp, ACL_FIELD, MODIFIED_BY_FIELD, MODIFIED_BY_ID_FIELD, MODIFIED_FIELD,
    TYPE_FIELD, UPDATE_REASON_FIELD, VERSION_FIELD,
};
use crate::error::{GatewayError, Result};

/// Suffix naming the history collection of a live collection.
pub const HISTORY_SUFFIX: &str = "_hist";

/// Workflow execution instances churn too fast to audit.
const EXEMPT_SUBTYPE: (&str, &str) = ("workflows", "instance");

/// Fields left out of snapshots, so restamping alone is not a change.
const UNTRACKED_FIELDS: [&str; 4] = [
    MODIFIED_FIELD,
    MODIFIED_BY_FIELD,
    MODIFIED_BY_ID_FIELD,
    UPDATE_REASON_FIELD,
];

pub fn history_collection(collection: &str) -> String {
    format!("{}{}", collection, HISTORY_SUFFIX)
}

pub fn is_history_collection(collection: &str) -> bool {
    collection.ends_with(HISTORY_SUFFIX)
}

/// What a history record holds.
#[derive(Debug, Clone, PartialEq)]
pub enum HistoryEntry {
    /// Complete snapshot of the entity at this version.
    Full { item: Document },
    /// Prior snapshot plus the delta leading to this version.
    Delta { item: Document, delta: Delta },
    /// Patch expression applied by a partial update.
    Patch { update: Document },
}

impl HistoryEntry {
    fn kind(&self) -> &'static str {
        match self {
            HistoryEntry::Full { .. } => "full",
            HistoryEntry::Delta { .. } => "delta",
            HistoryEntry::Patch { .. } => "patch",
        }
    }
}

/// One append-only history record.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryRecord {
    /// `_id` of the entity the record belongs to.
    pub entity_id: Value,
    pub name: Option<String>,
    pub version: i64,
    pub stamp: Stamp,
    /// The entity's `_type` and `_acl`, so history reads are access-filtered
    /// like the live collection.
    pub entity_type: Option<String>,
    pub acl: Value,
    pub reason: Option<String>,
    pub entry: HistoryEntry,
}

impl HistoryRecord {
    pub fn to_document(&self) -> Document {
        let mut doc = Document::new();
        doc.insert("kind".into(), Value::from(self.entry.kind()));
        doc.insert("id".into(), self.entity_id.clone());
        doc.insert(
            "name".into(),
            self.name.clone().map_or(Value::Null, Value::String),
        );
        doc.insert(VERSION_FIELD.into(), Value::Int(self.version));
        doc.insert(
            TYPE_FIELD.into(),
            self.entity_type.clone().map_or(Value::Null, Value::String),
        );
        doc.insert(ACL_FIELD.into(), self.acl.clone());
        doc.insert(
            "reason".into(),
            self.reason.clone().map_or(Value::Null, Value::String),
        );
        self.stamp.write_created(&mut doc);
        self.stamp.write_modified(&mut doc);

        match &self.entry {
            HistoryEntry::Full { item } => {
                doc.insert("item".into(), Value::Document(item.clone()));
            }
            HistoryEntry::Delta { item, delta } => {
                doc.insert("item".into(), Value::Document(item.clone()));
                doc.insert("delta".into(), delta.to_value());
            }
            HistoryEntry::Patch { update } => {
                doc.insert("update".into(), Value::Document(update.clone()));
            }
        }
        doc
    }

    /// Read back a record written by [`HistoryRecord::to_document`].
    pub fn from_document(doc: &Document) -> Result<Self> {
        let text = |field: &str| doc.get(field).and_then(Value::as_str).map(str::to_string);
        let stamp = Stamp {
            at: match doc.get(MODIFIED_FIELD) {
                Some(Value::Date(at)) => *at,
                _ => return Err(invalid("history record has no timestamp")),
            },
            by: text(MODIFIED_BY_FIELD).unwrap_or_default(),
            by_id: text(MODIFIED_BY_ID_FIELD).unwrap_or_default(),
        };
        let item = || {
            doc.get("item")
                .and_then(Value::as_document)
                .cloned()
                .ok_or_else(|| invalid("history record has no snapshot"))
        };

        let entry = match doc.get("kind").and_then(Value::as_str) {
            Some("full") => HistoryEntry::Full { item: item()? },
            Some("delta") => HistoryEntry::Delta {
                item: item()?,
                delta: doc
                    .get("delta")
                    .ok_or_else(|| invalid("delta record has no delta"))
                    .and_then(|value| {
                        Delta::from_value(value).map_err(|e| invalid(&e.to_string()))
                    })?,
            },
            Some("patch") => HistoryEntry::Patch {
                update: doc
                    .get("update")
                    .and_then(Value::as_document)
                    .cloned()
                    .ok_or_else(|| invalid("patch record has no update"))?,
            },
            other => return Err(invalid(&format!("unknown history kind {:?}", other))),
        };

        Ok(Self {
            entity_id: doc.get("id").cloned().unwrap_or(Value::Null),
            name: text("name"),
            version: version_of(doc).ok_or_else(|| invalid("history record has no version"))?,
            stamp,
            entity_type: text(TYPE_FIELD),
            acl: doc.get(ACL_FIELD).cloned().unwrap_or(Value::Null),
            reason: text("reason"),
            entry,
        })
    }

    /// The entity snapshot at this record's version. Patch records carry no
    /// snapshot.
    pub fn snapshot(&self) -> Result<Option<Document>> {
        match &self.entry {
            HistoryEntry::Full { item } => Ok(Some(item.clone())),
            HistoryEntry::Delta { item, delta } => delta
                .apply_to_document(item)
                .map(Some)
                .map_err(|e| invalid(&e.to_string())),
            HistoryEntry::Patch { .. } => Ok(None),
        }
    }
}

fn invalid(reason: &str) -> GatewayError {
    GatewayError::OperationFailed(StoreError::InvalidData(reason.to_string()))
}

/// Assigns versions and appends history records.
#[derive(Debug, Clone, Default)]
pub struct HistoryRecorder {
    skip: Vec<String>,
}

impl HistoryRecorder {
    pub fn new(skip: Vec<String>) -> Self {
        Self { skip }
    }

    /// Whether writes of `item` to `collection` are versioned and audited.
    pub fn is_tracked(&self, collection: &str, item: &Document) -> bool {
        if self.skip.iter().any(|name| name == collection) {
            return false;
        }
        let (exempt_collection, exempt_type) = EXEMPT_SUBTYPE;
        !(collection == exempt_collection
            && item.get(TYPE_FIELD).and_then(Value::as_str) == Some(exempt_type))
    }

    /// Version `item` gets from a full-document write, and the history
    /// record to append once the write has landed.
    ///
    /// Untracked writes keep the prior version (0 when there is none) and
    /// produce no record.
    pub fn prepare_write(
        &self,
        collection: &str,
        prior: Option<&Document>,
        item: &Document,
        stamp: &Stamp,
        reason: Option<String>,
    ) -> (i64, Option<HistoryRecord>) {
        if !self.is_tracked(collection, item) {
            return (prior.and_then(version_of).unwrap_or(0), None);
        }

        let version = next_version(prior);
        let mut current = snapshot_of(item);
        current.insert(VERSION_FIELD.into(), Value::Int(version));

        let entry = match prior {
            Some(prior) if version > 0 => {
                let previous = snapshot_of(prior);
                match diff_documents(&previous, &current) {
                    Some(delta) => HistoryEntry::Delta {
                        item: previous,
                        delta,
                    },
                    None => {
                        tracing::debug!(collection, version, "snapshot unchanged, no history written");
                        return (version, None);
                    }
                }
            }
            _ => HistoryEntry::Full { item: current },
        };

        let record = HistoryRecord {
            entity_id: item.get("_id").cloned().unwrap_or(Value::Null),
            name: item.get("name").and_then(Value::as_str).map(str::to_string),
            version,
            stamp: stamp.clone(),
            entity_type: item.get(TYPE_FIELD).and_then(Value::as_str).map(str::to_string),
            acl: item.get(ACL_FIELD).cloned().unwrap_or(Value::Null),
            reason,
            entry,
        };
        (version, Some(record))
    }

    /// History record for a partial update against the current `snapshot`.
    ///
    /// `update` must already have its declared fields sealed.
    pub fn prepare_patch(
        &self,
        collection: &str,
        snapshot: &Document,
        update: &Update,
        stamp: &Stamp,
        reason: Option<String>,
    ) -> Option<HistoryRecord> {
        if !self.is_tracked(collection, snapshot) {
            return None;
        }
        Some(HistoryRecord {
            entity_id: snapshot.get("_id").cloned().unwrap_or(Value::Null),
            name: snapshot.get("name").and_then(Value::as_str).map(str::to_string),
            version: version_of(snapshot).map_or(1, |v| v + 1),
            stamp: stamp.clone(),
            entity_type: snapshot.get(TYPE_FIELD).and_then(Value::as_str).map(str::to_string),
            acl: snapshot.get(ACL_FIELD).cloned().unwrap_or(Value::Null),
            reason,
            entry: HistoryEntry::Patch {
                update: update.to_document(),
            },
        })
    }

    /// Append `record` to the history of `collection`. Failures are logged.
    pub async fn append<S: DocumentStore + ?Sized>(
        &self,
        store: &S,
        collection: &str,
        record: &HistoryRecord,
    ) {
        let target = history_collection(collection);
        if let Err(e) = store
            .insert_one(&target, record.to_document(), WriteConcern::default())
            .await
        {
            tracing::error!(
                collection = %target,
                version = record.version,
                error = %e,
                "failed to write history record"
            );
        }
    }
}

/// Prior version + 1, or 0 when there is no prior version.
pub fn next_version(prior: Option<&Document>) -> i64 {
    prior.and_then(version_of).map_or(0, |v| v + 1)
}

fn snapshot_of(doc: &Document) -> Document {
    doc.iter()
        .filter(|(key, _)| !UNTRACKED_FIELDS.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use warden_core::{document_from_json, translate_update, Filter};
    use warden_perms::Identity;
    use warden_store::{FindOptions, MemoryStore};

    fn doc(json: serde_json::Value) -> Document {
        document_from_json(&json).unwrap()
    }

    fn stamp() -> Stamp {
        Stamp::now(&Identity::new("u1", "Alice", "alice"))
    }

    async fn records(store: &MemoryStore, collection: &str) -> Vec<HistoryRecord> {
        store
            .find(&history_collection(collection), &Filter::All, &FindOptions::default())
            .await
            .unwrap()
            .iter()
            .map(|d| HistoryRecord::from_document(d).unwrap())
            .collect()
    }

    async fn write(
        recorder: &HistoryRecorder,
        store: &MemoryStore,
        collection: &str,
        prior: Option<&Document>,
        item: &Document,
        reason: Option<String>,
    ) -> i64 {
        let (version, record) = recorder.prepare_write(collection, prior, item, &stamp(), reason);
        if let Some(record) = record {
            recorder.append(store, collection, &record).await;
        }
        version
    }

    #[tokio::test]
    async fn test_full_then_delta() {
        let store = MemoryStore::new();
        let recorder = HistoryRecorder::default();
        let first = doc(json!({"_id": "e1", "name": "a", "value": 1, "_acl": []}));

        let v0 = write(&recorder, &store, "entities", None, &first, None).await;
        assert_eq!(v0, 0);

        let mut stored = first.clone();
        stored.insert(VERSION_FIELD.into(), Value::Int(0));
        let second = doc(json!({"_id": "e1", "name": "a", "value": 2, "_acl": [], "_modified": "x"}));
        let v1 = write(&recorder, &store, "entities", Some(&stored), &second, Some("fix".into())).await;
        assert_eq!(v1, 1);

        let history = records(&store, "entities").await;
        assert_eq!(history.len(), 2);
        assert!(matches!(history[0].entry, HistoryEntry::Full { .. }));
        assert_eq!(history[1].reason.as_deref(), Some("fix"));

        let rebuilt = history[1].snapshot().unwrap().unwrap();
        assert_eq!(rebuilt.get("value"), Some(&Value::Int(2)));
        assert_eq!(rebuilt.get(VERSION_FIELD), Some(&Value::Int(1)));
        assert!(!rebuilt.contains_key("_modified"));
    }

    #[tokio::test]
    async fn test_untracked_keeps_prior_version() {
        let store = MemoryStore::new();
        let recorder = HistoryRecorder::new(vec!["audit".into()]);
        let prior = doc(json!({"_id": "e1", "_version": 4}));

        let v = write(&recorder, &store, "audit", Some(&prior), &prior, None).await;
        assert_eq!(v, 4);

        let instance = doc(json!({"_id": "w1", "_type": "instance"}));
        let v = write(&recorder, &store, "workflows", None, &instance, None).await;
        assert_eq!(v, 0);

        assert!(recorder
            .prepare_patch("audit", &prior, &Update::default(), &stamp(), None)
            .is_none());
        assert!(records(&store, "audit").await.is_empty());
        assert!(records(&store, "workflows").await.is_empty());
    }

    #[tokio::test]
    async fn test_patch_record() {
        let store = MemoryStore::new();
        let recorder = HistoryRecorder::default();
        let snapshot = doc(json!({"_id": "e1", "name": "a", "_version": 1}));
        let update = translate_update(&json!({"$set": {"value": 3}})).unwrap();

        let record = recorder
            .prepare_patch("entities", &snapshot, &update, &stamp(), None)
            .unwrap();
        recorder.append(&store, "entities", &record).await;

        let history = records(&store, "entities").await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].version, 2);
        assert_eq!(
            history[0].entry,
            HistoryEntry::Patch {
                update: update.to_document()
            }
        );
        assert_eq!(history[0].snapshot().unwrap(), None);
    }

    #[tokio::test]
    async fn test_history_failure_is_swallowed() {
        let store = MemoryStore::new();
        store.set_unavailable("entities_hist", true).unwrap();
        let recorder = HistoryRecorder::default();
        let item = doc(json!({"_id": "e1"}));
        let v = write(&recorder, &store, "entities", None, &item, None).await;
        assert_eq!(v, 0);
    }

    #[test]
    fn test_collection_names() {
        assert_eq!(history_collection("entities"), "entities_hist");
        assert!(is_history_collection("entities_hist"));
        assert!(!is_history_collection("entities"));
    }
}
