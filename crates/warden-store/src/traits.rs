//! Store trait: the abstract interface to the underlying document database.
//!
//! The mediation layer is database-agnostic. Implementations include SQLite
//! and in-memory (for tests and embedding).

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::OnceCell;
use warden_core::{sort_documents, Document, Filter, Projection, SortKey, Update, Value};

use crate::error::{Result, StoreError};

/// How many nodes must acknowledge a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acknowledgment {
    /// An explicit node count; `0` means fire-and-forget.
    Nodes(u32),
    Majority,
}

/// Durability requested by the caller, passed through unmodified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteConcern {
    pub w: Acknowledgment,
    /// Wait for the on-disk journal.
    pub journal: bool,
}

impl Default for WriteConcern {
    fn default() -> Self {
        Self {
            w: Acknowledgment::Nodes(1),
            journal: false,
        }
    }
}

impl WriteConcern {
    pub fn new(w: Acknowledgment, journal: bool) -> Self {
        Self { w, journal }
    }

    /// Fire-and-forget.
    pub fn unacknowledged() -> Self {
        Self::new(Acknowledgment::Nodes(0), false)
    }

    /// Parse caller-supplied `w` and `j` values. `null` means the default.
    ///
    /// `w` is a non-negative integer or `"majority"`; `j` is a boolean or
    /// the strings `"true"` / `"false"`.
    pub fn parse(w: &serde_json::Value, j: &serde_json::Value) -> Result<Self> {
        use serde_json::Value as Json;

        let w = match w {
            Json::Null => Acknowledgment::Nodes(1),
            Json::Number(n) => n
                .as_u64()
                .and_then(|n| u32::try_from(n).ok())
                .map(Acknowledgment::Nodes)
                .ok_or_else(|| StoreError::InvalidWriteConcern(format!("w = {}", n)))?,
            Json::String(s) if s == "majority" => Acknowledgment::Majority,
            other => return Err(StoreError::InvalidWriteConcern(format!("w = {}", other))),
        };
        let journal = match j {
            Json::Null => false,
            Json::Bool(b) => *b,
            Json::String(s) if s == "true" => true,
            Json::String(s) if s == "false" => false,
            other => return Err(StoreError::InvalidWriteConcern(format!("j = {}", other))),
        };
        Ok(Self { w, journal })
    }

    /// Whether the caller expects the store to confirm the write.
    pub fn requires_ack(&self) -> bool {
        self.w != Acknowledgment::Nodes(0)
    }
}

/// Options for a find.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    pub limit: Option<usize>,
    pub skip: usize,
    pub sort: Vec<SortKey>,
    pub projection: Option<Projection>,
}

impl FindOptions {
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_skip(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }

    pub fn with_sort(mut self, sort: Vec<SortKey>) -> Self {
        self.sort = sort;
        self
    }

    pub fn with_projection(mut self, projection: Option<Projection>) -> Self {
        self.projection = projection;
        self
    }
}

/// Result of inserting a document.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertOutcome {
    pub acknowledged: bool,
    /// The stored identifier, assigned by the store when absent.
    pub id: Value,
}

/// Result of a replace or patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UpdateOutcome {
    pub acknowledged: bool,
    pub matched: u64,
    pub modified: u64,
}

/// Result of a delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeleteOutcome {
    pub acknowledged: bool,
    pub deleted: u64,
}

/// The DocumentStore trait: async interface to a document database.
///
/// # Design Notes
///
/// - **Identifiers**: `_id` uniqueness per collection is the store's job.
///   Inserting a document without `_id` assigns a fresh [`ObjectId`](warden_core::ObjectId).
/// - **Replace**: `matched` counts every document the filter hits, even
///   though only the first is replaced, so callers can detect ambiguity.
/// - **Concern**: the write concern is passed through; `acknowledged`
///   reflects what the store reports back.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert a document.
    async fn insert_one(
        &self,
        collection: &str,
        doc: Document,
        concern: WriteConcern,
    ) -> Result<InsertOutcome>;

    /// Find documents matching `filter`.
    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        options: &FindOptions,
    ) -> Result<Vec<Document>>;

    /// Count documents matching `filter`.
    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64>;

    /// Replace the first match, keeping its `_id`.
    async fn replace_one(
        &self,
        collection: &str,
        filter: &Filter,
        doc: Document,
        concern: WriteConcern,
    ) -> Result<UpdateOutcome>;

    /// Patch the first match.
    async fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        update: &Update,
        concern: WriteConcern,
    ) -> Result<UpdateOutcome>;

    /// Patch every match.
    async fn update_many(
        &self,
        collection: &str,
        filter: &Filter,
        update: &Update,
        concern: WriteConcern,
    ) -> Result<UpdateOutcome>;

    /// Delete the first match.
    async fn delete_one(
        &self,
        collection: &str,
        filter: &Filter,
        concern: WriteConcern,
    ) -> Result<DeleteOutcome>;
}

/// Extension trait for common store patterns.
pub trait StoreExt: DocumentStore {
    /// First document matching `filter`.
    fn find_one(
        &self,
        collection: &str,
        filter: &Filter,
    ) -> impl std::future::Future<Output = Result<Option<Document>>> + Send;
}

impl<S: DocumentStore + ?Sized> StoreExt for S {
    async fn find_one(&self, collection: &str, filter: &Filter) -> Result<Option<Document>> {
        let options = FindOptions::default().with_limit(1);
        Ok(self.find(collection, filter, &options).await?.into_iter().next())
    }
}

/// Opens a connection to a document store.
#[async_trait]
pub trait StoreConnector: Send + Sync + 'static {
    type Store: DocumentStore + 'static;

    async fn connect(&self) -> Result<Self::Store>;
}

/// A store connection established on first use and shared afterwards.
///
/// Concurrent first callers race to initialize; exactly one connection is kept.
pub struct LazyStore<C: StoreConnector> {
    connector: C,
    cell: OnceCell<Arc<C::Store>>,
}

impl<C: StoreConnector> LazyStore<C> {
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            cell: OnceCell::new(),
        }
    }

    /// The shared connection, connecting if needed.
    pub async fn get(&self) -> Result<Arc<C::Store>> {
        self.cell
            .get_or_try_init(|| async {
                let store = self.connector.connect().await?;
                tracing::debug!("document store connected");
                Ok::<_, StoreError>(Arc::new(store))
            })
            .await
            .map(Arc::clone)
    }

    pub fn is_connected(&self) -> bool {
        self.cell.initialized()
    }
}

/// Sort, skip, limit and project already-filtered documents.
pub fn apply_find_options(mut docs: Vec<Document>, options: &FindOptions) -> Vec<Document> {
    sort_documents(&mut docs, &options.sort);
    let limit = options.limit.unwrap_or(usize::MAX);
    docs.into_iter()
        .skip(options.skip)
        .take(limit)
        .map(|doc| match &options.projection {
            Some(projection) => projection.apply(&doc),
            None => doc,
        })
        .collect()
}
