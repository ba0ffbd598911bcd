//! SQLite implementation of the DocumentStore trait.
//!
//! Documents are kept as CBOR blobs keyed by collection and a typed id key.
//! Filters and patches are evaluated in process, so results match the
//! in-memory store exactly. Blocking calls run on tokio::spawn_blocking.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use warden_core::{Document, Filter, ObjectId, Update, Value};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{
    apply_find_options, DeleteOutcome, DocumentStore, FindOptions, InsertOutcome, StoreConnector,
    UpdateOutcome, WriteConcern,
};

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn blocking<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|e| StoreError::Poisoned(e.to_string()))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

/// Typed key for a document identifier, so `"1"` and `1` stay distinct.
fn id_key(id: &Value) -> Result<String> {
    match id {
        Value::String(s) => Ok(format!("s:{}", s)),
        Value::ObjectId(oid) => Ok(format!("o:{}", oid.to_hex())),
        Value::Int(n) => Ok(format!("i:{}", n)),
        other => Err(StoreError::InvalidData(format!(
            "unsupported _id type: {}",
            other.type_name()
        ))),
    }
}

fn encode_body(doc: &Document) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(doc, &mut buf).map_err(|e| StoreError::Serialization(e.to_string()))?;
    Ok(buf)
}

fn decode_body(bytes: &[u8]) -> Result<Document> {
    ciborium::from_reader(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn apply_concern(conn: &Connection, concern: WriteConcern) -> Result<()> {
    let level = if concern.journal { "FULL" } else { "NORMAL" };
    conn.pragma_update(None, "synchronous", level)?;
    Ok(())
}

/// Load every document of a collection with its id key, in insertion order.
fn load(conn: &Connection, collection: &str) -> Result<Vec<(String, Document)>> {
    let mut stmt =
        conn.prepare("SELECT id, body FROM documents WHERE collection = ?1 ORDER BY rowid")?;
    let rows = stmt.query_map(params![collection], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?))
    })?;

    let mut docs = Vec::new();
    for row in rows {
        let (id, body) = row?;
        docs.push((id, decode_body(&body)?));
    }
    Ok(docs)
}

fn load_matching(
    conn: &Connection,
    collection: &str,
    filter: &Filter,
) -> Result<Vec<(String, Document)>> {
    Ok(load(conn, collection)?
        .into_iter()
        .filter(|(_, doc)| filter.matches(doc))
        .collect())
}

fn store_body(tx: &Transaction<'_>, collection: &str, id: &str, doc: &Document) -> Result<()> {
    tx.execute(
        "UPDATE documents SET body = ?3 WHERE collection = ?1 AND id = ?2",
        params![collection, id, encode_body(doc)?],
    )?;
    Ok(())
}

fn patch(
    conn: &mut Connection,
    collection: &str,
    filter: &Filter,
    update: &Update,
    concern: WriteConcern,
    many: bool,
) -> Result<UpdateOutcome> {
    apply_concern(conn, concern)?;
    let mut targets = load_matching(conn, collection, filter)?;
    if !many {
        targets.truncate(1);
    }

    let tx = conn.transaction()?;
    let mut modified = 0;
    for (id, doc) in targets.iter_mut() {
        if update.apply(doc)? {
            store_body(&tx, collection, id, doc)?;
            modified += 1;
        }
    }
    tx.commit()?;

    Ok(UpdateOutcome {
        acknowledged: concern.requires_ack(),
        matched: targets.len() as u64,
        modified,
    })
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn insert_one(
        &self,
        collection: &str,
        mut doc: Document,
        concern: WriteConcern,
    ) -> Result<InsertOutcome> {
        let collection = collection.to_string();
        let id = doc
            .entry("_id".to_string())
            .or_insert_with(|| Value::ObjectId(ObjectId::generate()))
            .clone();
        let key = id_key(&id)?;

        self.blocking(move |conn| {
            apply_concern(conn, concern)?;
            let existing: Option<String> = conn
                .query_row(
                    "SELECT id FROM documents WHERE collection = ?1 AND id = ?2",
                    params![collection, key],
                    |row| row.get(0),
                )
                .optional()?;
            if existing.is_some() {
                return Err(StoreError::DuplicateKey {
                    collection,
                    id: id.id_string().unwrap_or(key),
                });
            }

            conn.execute(
                "INSERT INTO documents (collection, id, body, inserted_at) VALUES (?1, ?2, ?3, ?4)",
                params![
                    collection,
                    key,
                    encode_body(&doc)?,
                    chrono::Utc::now().timestamp_millis()
                ],
            )?;
            Ok(InsertOutcome {
                acknowledged: concern.requires_ack(),
                id,
            })
        })
        .await
    }

    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        options: &FindOptions,
    ) -> Result<Vec<Document>> {
        let collection = collection.to_string();
        let filter = filter.clone();
        let options = options.clone();

        self.blocking(move |conn| {
            let docs = load_matching(conn, &collection, &filter)?
                .into_iter()
                .map(|(_, doc)| doc)
                .collect();
            Ok(apply_find_options(docs, &options))
        })
        .await
    }

    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64> {
        let collection = collection.to_string();
        let filter = filter.clone();

        self.blocking(move |conn| Ok(load_matching(conn, &collection, &filter)?.len() as u64))
            .await
    }

    async fn replace_one(
        &self,
        collection: &str,
        filter: &Filter,
        mut doc: Document,
        concern: WriteConcern,
    ) -> Result<UpdateOutcome> {
        let collection = collection.to_string();
        let filter = filter.clone();

        self.blocking(move |conn| {
            apply_concern(conn, concern)?;
            let targets = load_matching(conn, &collection, &filter)?;

            let mut modified = 0;
            if let Some((id, current)) = targets.first() {
                if let Some(existing_id) = current.get("_id").cloned() {
                    doc.insert("_id".to_string(), existing_id);
                }
                if *current != doc {
                    let tx = conn.transaction()?;
                    store_body(&tx, &collection, id, &doc)?;
                    tx.commit()?;
                    modified = 1;
                }
            }
            Ok(UpdateOutcome {
                acknowledged: concern.requires_ack(),
                matched: targets.len() as u64,
                modified,
            })
        })
        .await
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        update: &Update,
        concern: WriteConcern,
    ) -> Result<UpdateOutcome> {
        let collection = collection.to_string();
        let filter = filter.clone();
        let update = update.clone();

        self.blocking(move |conn| patch(conn, &collection, &filter, &update, concern, false))
            .await
    }

    async fn update_many(
        &self,
        collection: &str,
        filter: &Filter,
        update: &Update,
        concern: WriteConcern,
    ) -> Result<UpdateOutcome> {
        let collection = collection.to_string();
        let filter = filter.clone();
        let update = update.clone();

        self.blocking(move |conn| patch(conn, &collection, &filter, &update, concern, true))
            .await
    }

    async fn delete_one(
        &self,
        collection: &str,
        filter: &Filter,
        concern: WriteConcern,
    ) -> Result<DeleteOutcome> {
        let collection = collection.to_string();
        let filter = filter.clone();

        self.blocking(move |conn| {
            apply_concern(conn, concern)?;
            let deleted = match load_matching(conn, &collection, &filter)?.first() {
                Some((id, _)) => conn.execute(
                    "DELETE FROM documents WHERE collection = ?1 AND id = ?2",
                    params![collection, id],
                )? as u64,
                None => 0,
            };
            Ok(DeleteOutcome {
                acknowledged: concern.requires_ack(),
                deleted,
            })
        })
        .await
    }
}

/// Connects to a SQLite database file, or to a private in-memory database.
#[derive(Debug, Clone, Default)]
pub struct SqliteConnector {
    path: Option<PathBuf>,
}

impl SqliteConnector {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    pub fn in_memory() -> Self {
        Self { path: None }
    }
}

#[async_trait]
impl StoreConnector for SqliteConnector {
    type Store = SqliteStore;

    async fn connect(&self) -> Result<SqliteStore> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || match path {
            Some(path) => {
                tracing::debug!(path = %path.display(), "opening sqlite document store");
                SqliteStore::open(path)
            }
            None => SqliteStore::open_memory(),
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}
