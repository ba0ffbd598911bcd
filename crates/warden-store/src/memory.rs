//! In-memory implementation of the DocumentStore trait.
//!
//! Evaluates filters and patches in process with the same semantics the
//! SQLite store uses. Clones share the same data, so a `MemoryStore` also
//! serves as its own connector.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use warden_core::{Document, Filter, ObjectId, Update, Value};

use crate::error::{Result, StoreError};
use crate::traits::{
    apply_find_options, DeleteOutcome, DocumentStore, FindOptions, InsertOutcome, StoreConnector,
    UpdateOutcome, WriteConcern,
};

/// In-memory store implementation.
///
/// All data is lost when the last clone is dropped. Thread-safe via RwLock.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<RwLock<MemoryStoreInner>>,
}

struct MemoryStoreInner {
    /// Documents per collection, in insertion order.
    collections: HashMap<String, Vec<Document>>,

    /// Whether writes report acknowledgment.
    acknowledge: bool,

    /// Collections that reject every operation.
    unavailable: HashSet<String>,

    /// Concern passed with the most recent write.
    last_concern: Option<WriteConcern>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(MemoryStoreInner {
                collections: HashMap::new(),
                acknowledge: true,
                unavailable: HashSet::new(),
                last_concern: None,
            })),
        }
    }

    /// Make subsequent writes report as unacknowledged (or not).
    pub fn set_acknowledge(&self, acknowledge: bool) -> Result<()> {
        self.write()?.acknowledge = acknowledge;
        Ok(())
    }

    /// Make every operation on `collection` fail.
    pub fn set_unavailable(&self, collection: &str, unavailable: bool) -> Result<()> {
        let mut inner = self.write()?;
        if unavailable {
            inner.unavailable.insert(collection.to_string());
        } else {
            inner.unavailable.remove(collection);
        }
        Ok(())
    }

    /// The write concern of the most recent write.
    pub fn last_write_concern(&self) -> Result<Option<WriteConcern>> {
        Ok(self.read()?.last_concern)
    }

    /// Every stored document of a collection, unfiltered.
    pub fn documents(&self, collection: &str) -> Result<Vec<Document>> {
        Ok(self
            .read()?
            .collections
            .get(collection)
            .cloned()
            .unwrap_or_default())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryStoreInner>> {
        self.inner
            .read()
            .map_err(|e| StoreError::Poisoned(e.to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryStoreInner>> {
        self.inner
            .write()
            .map_err(|e| StoreError::Poisoned(e.to_string()))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStoreInner {
    fn check(&self, collection: &str) -> Result<()> {
        if self.unavailable.contains(collection) {
            return Err(StoreError::Unavailable(collection.to_string()));
        }
        Ok(())
    }

    /// Record the concern and report whether the write counts as acknowledged.
    fn begin_write(&mut self, collection: &str, concern: WriteConcern) -> Result<bool> {
        self.check(collection)?;
        self.last_concern = Some(concern);
        Ok(self.acknowledge && concern.requires_ack())
    }

    fn collection_mut(&mut self, collection: &str) -> &mut Vec<Document> {
        self.collections.entry(collection.to_string()).or_default()
    }

    fn matching(&self, collection: &str, filter: &Filter) -> Vec<usize> {
        self.collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .enumerate()
                    .filter(|(_, doc)| filter.matches(doc))
                    .map(|(i, _)| i)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn patch(
        &mut self,
        collection: &str,
        filter: &Filter,
        update: &Update,
        concern: WriteConcern,
        many: bool,
    ) -> Result<UpdateOutcome> {
        let acknowledged = self.begin_write(collection, concern)?;
        let mut targets = self.matching(collection, filter);
        if !many {
            targets.truncate(1);
        }

        let docs = self.collection_mut(collection);
        let mut modified = 0;
        for &i in &targets {
            if update.apply(&mut docs[i])? {
                modified += 1;
            }
        }
        Ok(UpdateOutcome {
            acknowledged,
            matched: targets.len() as u64,
            modified,
        })
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn insert_one(
        &self,
        collection: &str,
        mut doc: Document,
        concern: WriteConcern,
    ) -> Result<InsertOutcome> {
        let mut inner = self.write()?;
        let acknowledged = inner.begin_write(collection, concern)?;

        let id = doc
            .entry("_id".to_string())
            .or_insert_with(|| Value::ObjectId(ObjectId::generate()))
            .clone();

        let docs = inner.collection_mut(collection);
        if docs.iter().any(|existing| existing.get("_id") == Some(&id)) {
            return Err(StoreError::DuplicateKey {
                collection: collection.to_string(),
                id: id.id_string().unwrap_or_else(|| format!("{:?}", id)),
            });
        }
        docs.push(doc);
        Ok(InsertOutcome { acknowledged, id })
    }

    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        options: &FindOptions,
    ) -> Result<Vec<Document>> {
        let inner = self.read()?;
        inner.check(collection)?;
        let docs = inner
            .collections
            .get(collection)
            .map(|docs| docs.iter().filter(|d| filter.matches(d)).cloned().collect())
            .unwrap_or_default();
        Ok(apply_find_options(docs, options))
    }

    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64> {
        let inner = self.read()?;
        inner.check(collection)?;
        Ok(inner.matching(collection, filter).len() as u64)
    }

    async fn replace_one(
        &self,
        collection: &str,
        filter: &Filter,
        mut doc: Document,
        concern: WriteConcern,
    ) -> Result<UpdateOutcome> {
        let mut inner = self.write()?;
        let acknowledged = inner.begin_write(collection, concern)?;
        let targets = inner.matching(collection, filter);

        let mut modified = 0;
        if let Some(&first) = targets.first() {
            let docs = inner.collection_mut(collection);
            if let Some(id) = docs[first].get("_id").cloned() {
                doc.insert("_id".to_string(), id);
            }
            if docs[first] != doc {
                docs[first] = doc;
                modified = 1;
            }
        }
        Ok(UpdateOutcome {
            acknowledged,
            matched: targets.len() as u64,
            modified,
        })
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        update: &Update,
        concern: WriteConcern,
    ) -> Result<UpdateOutcome> {
        self.write()?.patch(collection, filter, update, concern, false)
    }

    async fn update_many(
        &self,
        collection: &str,
        filter: &Filter,
        update: &Update,
        concern: WriteConcern,
    ) -> Result<UpdateOutcome> {
        self.write()?.patch(collection, filter, update, concern, true)
    }

    async fn delete_one(
        &self,
        collection: &str,
        filter: &Filter,
        concern: WriteConcern,
    ) -> Result<DeleteOutcome> {
        let mut inner = self.write()?;
        let acknowledged = inner.begin_write(collection, concern)?;
        let deleted = match inner.matching(collection, filter).first() {
            Some(&index) => {
                inner.collection_mut(collection).remove(index);
                1
            }
            None => 0,
        };
        Ok(DeleteOutcome {
            acknowledged,
            deleted,
        })
    }
}

#[async_trait]
impl StoreConnector for MemoryStore {
    type Store = MemoryStore;

    async fn connect(&self) -> Result<MemoryStore> {
        Ok(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::{Acknowledgment, StoreExt};
    use serde_json::json;
    use warden_core::{document_from_json, translate_filter, translate_update};

    fn doc(json: serde_json::Value) -> Document {
        document_from_json(&json).unwrap()
    }

    #[tokio::test]
    async fn test_insert_assigns_id_and_rejects_duplicates() {
        let store = MemoryStore::new();
        let outcome = store
            .insert_one("things", doc(json!({"name": "a"})), WriteConcern::default())
            .await
            .unwrap();
        assert!(outcome.acknowledged);
        assert!(matches!(outcome.id, Value::ObjectId(_)));

        store
            .insert_one("things", doc(json!({"_id": "k", "name": "b"})), WriteConcern::default())
            .await
            .unwrap();
        let err = store
            .insert_one("things", doc(json!({"_id": "k"})), WriteConcern::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey { .. }));
    }

    #[tokio::test]
    async fn test_find_and_patch() {
        let store = MemoryStore::new();
        for n in 0..3 {
            store
                .insert_one("things", doc(json!({"_id": n, "n": n})), WriteConcern::default())
                .await
                .unwrap();
        }

        let filter = translate_filter(&json!({"n": {"$gte": 1}})).unwrap();
        assert_eq!(store.count("things", &filter).await.unwrap(), 2);

        let update = translate_update(&json!({"$inc": {"n": 10}})).unwrap();
        let outcome = store
            .update_many("things", &filter, &update, WriteConcern::default())
            .await
            .unwrap();
        assert_eq!((outcome.matched, outcome.modified), (2, 2));

        let one = store
            .find_one("things", &Filter::eq("_id", 2i64))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(one.get("n"), Some(&Value::Int(12)));
    }

    #[tokio::test]
    async fn test_replace_keeps_id_and_reports_all_matches() {
        let store = MemoryStore::new();
        for id in ["a", "b"] {
            store
                .insert_one("things", doc(json!({"_id": id, "kind": "x"})), WriteConcern::default())
                .await
                .unwrap();
        }
        let outcome = store
            .replace_one(
                "things",
                &Filter::eq("kind", "x"),
                doc(json!({"kind": "y"})),
                WriteConcern::default(),
            )
            .await
            .unwrap();
        assert_eq!(outcome.matched, 2);
        assert_eq!(outcome.modified, 1);
        assert_eq!(store.documents("things").unwrap()[0], doc(json!({"_id": "a", "kind": "y"})));
    }

    #[tokio::test]
    async fn test_concern_and_acknowledgment() {
        let store = MemoryStore::new();
        let concern = WriteConcern::new(Acknowledgment::Majority, true);
        store.insert_one("c", Document::new(), concern).await.unwrap();
        assert_eq!(store.last_write_concern().unwrap(), Some(concern));

        let quiet = store
            .insert_one("c", Document::new(), WriteConcern::unacknowledged())
            .await
            .unwrap();
        assert!(!quiet.acknowledged);

        store.set_acknowledge(false).unwrap();
        let lost = store
            .delete_one("c", &Filter::All, WriteConcern::default())
            .await
            .unwrap();
        assert!(!lost.acknowledged);
    }

    #[tokio::test]
    async fn test_unavailable_collection() {
        let store = MemoryStore::new();
        store.set_unavailable("broken", true).unwrap();
        assert!(store.find("broken", &Filter::All, &FindOptions::default()).await.is_err());
        assert!(store.find("fine", &Filter::All, &FindOptions::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_connector_shares_state() {
        let store = MemoryStore::new();
        let connected = store.connect().await.unwrap();
        connected
            .insert_one("c", Document::new(), WriteConcern::default())
            .await
            .unwrap();
        assert_eq!(store.documents("c").unwrap().len(), 1);
    }
}
