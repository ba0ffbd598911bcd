//! The Gateway: permission-enforcing reads and writes over a document store.
//!
//! Every operation runs as an [`Identity`]. Reads are scoped by the access
//! filter; writes pass the in-process authorization rules, get actor stamps
//! and resource defaults, have declared fields sealed, and are versioned
//! into the sibling history collection before reaching the store.
//!
//! Stored documents are always sealed first and encoded second. Documents
//! handed back to callers are decoded first and opened second.

use std::sync::Arc;

use warden_core::{
    decode_document, encode_document, encode_update, id_filter, id_filter_on, translate_document,
    translate_filter, translate_update, Document, Filter, JsonInput, ObjectId, SortKey, Update,
    Value,
};
use warden_perms::{
    AccessControl, AccessFilterBuilder, Action, FieldCipher, FieldCodec, Identity,
    IdentityVerifier, Right, FILES_COLLECTION, USERS_NAME,
};
use warden_store::{
    DocumentStore, FindOptions, LazyStore, StoreConnector, StoreError, UpdateOutcome,
    WriteConcern,
};

use crate::config::GatewayConfig;
use crate::entity::{
    display_name, ensure_owner, ensure_resource, merge_metadata, Stamp, TYPE_FIELD,
    UPDATE_REASON_FIELD, VERSION_FIELD,
};
use crate::error::{GatewayError, Result};
use crate::history::{history_collection, is_history_collection, HistoryRecord, HistoryRecorder};
use crate::roles::{DocumentRoleStore, RoleStore, USERS_COLLECTION};

/// Short name callers may use for the file metadata collection.
const FILES_ALIAS: &str = "files";

/// Permission-enforcing persistence gateway.
pub struct Gateway<C: StoreConnector> {
    store: Arc<LazyStore<C>>,
    config: GatewayConfig,
    access: AccessControl,
    codec: Option<FieldCodec>,
    history: HistoryRecorder,
    roles: Arc<dyn RoleStore>,
    verifier: Option<Arc<dyn IdentityVerifier>>,
}

impl<C: StoreConnector> Gateway<C> {
    /// Create a gateway that connects through `connector` on first use.
    ///
    /// Roles are read from and saved to the `users` collection of the same
    /// store unless another [`RoleStore`] is supplied.
    pub fn new(connector: C, config: GatewayConfig) -> Self {
        let store = Arc::new(LazyStore::new(connector));
        Self {
            roles: Arc::new(DocumentRoleStore::new(Arc::clone(&store))),
            access: AccessControl::new(config.bypass_permission_checks),
            history: HistoryRecorder::new(config.skip_history_collections.clone()),
            codec: None,
            verifier: None,
            store,
            config,
        }
    }

    /// Seal and open the fields each entity lists in `_encrypt`.
    pub fn with_cipher(mut self, cipher: Arc<dyn FieldCipher>) -> Self {
        self.codec = Some(FieldCodec::new(cipher));
        self
    }

    pub fn with_verifier(mut self, verifier: Arc<dyn IdentityVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    pub fn with_role_store(mut self, roles: Arc<dyn RoleStore>) -> Self {
        self.roles = roles;
        self
    }

    /// Replace how access filters are built.
    pub fn with_access_filter_builder(mut self, builder: Arc<dyn AccessFilterBuilder>) -> Self {
        self.access = self.access.with_builder(builder);
        self
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// The shared store connection, connecting if needed.
    pub async fn store(&self) -> Result<Arc<C::Store>> {
        Ok(self.store.get().await?)
    }

    /// Resolve a credential into an identity.
    pub async fn authenticate(&self, token: &str) -> Result<Identity> {
        let verifier = self
            .verifier
            .as_ref()
            .ok_or_else(|| GatewayError::AccessDenied("no identity verifier configured".into()))?;
        Ok(verifier.verify(token).await?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────────────────

    /// Find the documents of `collection` matching `filter` that the caller
    /// may read.
    ///
    /// Without an explicit limit, at most `default_query_limit` documents
    /// are returned. History collections are readable here too, under the
    /// same access filter.
    pub async fn query<'a>(
        &self,
        identity: &Identity,
        collection: &str,
        filter: impl Into<JsonInput<'a>>,
        options: FindOptions,
    ) -> Result<Vec<Document>> {
        let collection = resolve_collection(collection);
        let filter = translate_filter(filter)?;
        tracing::debug!(collection = %collection, user = %identity.username, "query");

        let docs = self.find_stored(identity, &collection, filter, options).await?;
        Ok(docs.into_iter().map(|doc| self.present(doc)).collect())
    }

    /// The document with `_id` equal to `id`, if it exists and is readable.
    pub async fn get_by_id(
        &self,
        identity: &Identity,
        collection: &str,
        id: &str,
    ) -> Result<Option<Document>> {
        let collection = resolve_collection(collection);
        let found = self.find_one_stored(identity, &collection, id_filter(id)).await?;
        Ok(found.map(|doc| self.present(doc)))
    }

    /// Readable history records of one entity, oldest version first.
    pub async fn history(
        &self,
        identity: &Identity,
        collection: &str,
        id: &str,
    ) -> Result<Vec<HistoryRecord>> {
        let collection = history_collection(&resolve_collection(collection));
        let options = FindOptions::default()
            .with_limit(usize::MAX)
            .with_sort(vec![SortKey::ascending(VERSION_FIELD)]);
        let docs = self
            .find_stored(identity, &collection, id_filter_on("id", id), options)
            .await?;
        docs.iter().map(HistoryRecord::from_document).collect()
    }

    /// The entity as it was at `version`, rebuilt from its history.
    ///
    /// Returns `None` when no full or delta record exists for that version.
    pub async fn version_at(
        &self,
        identity: &Identity,
        collection: &str,
        id: &str,
        version: i64,
    ) -> Result<Option<Document>> {
        for record in self.history(identity, collection, id).await? {
            if record.version != version {
                continue;
            }
            if let Some(snapshot) = record.snapshot()? {
                return Ok(Some(self.present(snapshot)));
            }
        }
        Ok(None)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Writes
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert a new entity and return it as stored (decoded and opened).
    pub async fn insert<'a>(
        &self,
        identity: &Identity,
        collection: &str,
        item: impl Into<JsonInput<'a>>,
        concern: WriteConcern,
    ) -> Result<Document> {
        let collection = writable_collection(collection)?;
        let item = translate_document(item)?
            .ok_or_else(|| GatewayError::InvalidArgument("cannot insert a null item".into()))?;
        self.insert_document(identity, &collection, item, concern).await
    }

    /// Replace an existing entity, identified by its `_id`.
    pub async fn update<'a>(
        &self,
        identity: &Identity,
        collection: &str,
        item: impl Into<JsonInput<'a>>,
        concern: WriteConcern,
    ) -> Result<Document> {
        let collection = writable_collection(collection)?;
        let item = translate_document(item)?
            .ok_or_else(|| GatewayError::InvalidArgument("cannot update a null item".into()))?;
        self.authorize(identity, &item, Action::Update)?;
        self.replace_document(identity, &collection, item, None, concern)
            .await
    }

    /// Apply a patch expression to the first writable entity matching
    /// `filter`.
    ///
    /// Fields the entity declares in `_encrypt` are sealed inside `$set`
    /// before the patch is encoded or recorded in history. The live version
    /// counter is incremented in the same write.
    pub async fn update_where<'a, 'b>(
        &self,
        identity: &Identity,
        collection: &str,
        filter: impl Into<JsonInput<'a>>,
        patch: impl Into<JsonInput<'b>>,
        concern: WriteConcern,
    ) -> Result<UpdateOutcome> {
        let collection = writable_collection(collection)?;
        let matching = translate_filter(filter)?;
        let mut update = translate_update(patch)?;
        self.authorize(identity, &update.set, Action::Update)?;

        let stamp = Stamp::now(identity);
        let reason = take_reason(&mut update.set);
        update.set.remove(VERSION_FIELD);

        let filter = Filter::and(vec![matching, self.writable_by(identity, &collection, Right::Update)]);
        let snapshot = self
            .find_one_stored(identity, &collection, filter.clone())
            .await?
            .ok_or_else(|| GatewayError::NotFound(format!("no writable match in {}", collection)))?;

        self.seal_patch(&snapshot, &mut update);
        let record = self
            .history
            .prepare_patch(&collection, &snapshot, &update, &stamp, reason);
        stamp.write_modified(&mut update.set);
        update.inc.insert(VERSION_FIELD.to_string(), Value::Int(1));
        let update = encode_update(update);

        let target = match snapshot.get("_id") {
            Some(id) => Filter::and(vec![Filter::eq("_id", id.clone()), filter]),
            None => filter,
        };
        tracing::debug!(collection = %collection, user = %identity.username, "partial update");
        let store = self.store.get().await?;
        let outcome = store.update_one(&collection, &target, &update, concern).await?;
        ensure_acknowledged("update", concern, outcome.acknowledged)?;
        if outcome.matched == 0 {
            return Err(GatewayError::NotFound(format!(
                "no writable match in {}",
                collection
            )));
        }
        if let Some(record) = record {
            self.history.append(store.as_ref(), &collection, &record).await;
        }
        Ok(outcome)
    }

    /// Apply a patch expression to every writable entity matching `filter`.
    ///
    /// Bulk updates are stamped but not versioned.
    pub async fn update_many<'a, 'b>(
        &self,
        identity: &Identity,
        collection: &str,
        filter: impl Into<JsonInput<'a>>,
        patch: impl Into<JsonInput<'b>>,
        concern: WriteConcern,
    ) -> Result<UpdateOutcome> {
        let collection = writable_collection(collection)?;
        let matching = translate_filter(filter)?;
        let mut update = translate_update(patch)?;
        self.authorize(identity, &update.set, Action::Update)?;

        take_reason(&mut update.set);
        Stamp::now(identity).write_modified(&mut update.set);
        let update = encode_update(update);

        let filter = Filter::and(vec![matching, self.writable_by(identity, &collection, Right::Update)]);
        let store = self.store.get().await?;
        let outcome = store
            .update_many(&collection, &filter, &update, concern)
            .await?;
        ensure_acknowledged("update_many", concern, outcome.acknowledged)?;
        tracing::debug!(
            collection = %collection,
            user = %identity.username,
            matched = outcome.matched,
            modified = outcome.modified,
            "bulk update"
        );
        Ok(outcome)
    }

    /// Insert `item`, or replace the single entity it collides with.
    ///
    /// `uniqueness` is a comma-separated list of fields identifying the
    /// entity; without it the `_id` does. More than one readable match is an
    /// error.
    pub async fn upsert<'a>(
        &self,
        identity: &Identity,
        collection: &str,
        item: impl Into<JsonInput<'a>>,
        uniqueness: Option<&str>,
        concern: WriteConcern,
    ) -> Result<Document> {
        let collection = writable_collection(collection)?;
        let mut item = translate_document(item)?
            .ok_or_else(|| GatewayError::InvalidArgument("cannot upsert a null item".into()))?;

        let matching = match uniqueness_filter(&item, uniqueness)? {
            Some(matching) => matching,
            None => return self.insert_document(identity, &collection, item, concern).await,
        };
        let options = FindOptions::default().with_limit(2);
        let mut existing = self
            .find_stored(identity, &collection, matching.clone(), options)
            .await?;
        if existing.len() > 1 {
            return Err(GatewayError::InvalidArgument(format!(
                "more than one entity in {} matches the uniqueness fields",
                collection
            )));
        }
        self.authorize(identity, &item, Action::Update)?;

        match existing.pop() {
            Some(found) => {
                if let Some(id) = found.get("_id") {
                    item.insert("_id".to_string(), id.clone());
                }
                self.replace_document(identity, &collection, item, Some(matching), concern)
                    .await
            }
            None => self.insert_document(identity, &collection, item, concern).await,
        }
    }

    /// Delete the entity with `_id` equal to `id` if the caller holds the
    /// delete right on it.
    pub async fn delete(&self, identity: &Identity, collection: &str, id: &str) -> Result<()> {
        let collection = writable_collection(collection)?;
        if id.is_empty() {
            return Err(GatewayError::InvalidArgument("id cannot be empty".into()));
        }

        let filter = Filter::and(vec![id_filter(id), self.writable_by(identity, &collection, Right::Delete)]);
        tracing::debug!(collection = %collection, user = %identity.username, id, "delete");
        let store = self.store.get().await?;
        let concern = WriteConcern::default();
        let outcome = store.delete_one(&collection, &filter, concern).await?;
        ensure_acknowledged("delete", concern, outcome.acknowledged)?;
        if outcome.deleted == 0 {
            return Err(GatewayError::NotFound(format!("{} in {}", id, collection)));
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Pipeline steps
    // ─────────────────────────────────────────────────────────────────────────

    async fn insert_document(
        &self,
        identity: &Identity,
        collection: &str,
        mut item: Document,
        concern: WriteConcern,
    ) -> Result<Document> {
        let mut acl = ensure_resource(&mut item)?;
        self.authorize(identity, &item, Action::Create)?;

        let stamp = Stamp::now(identity);
        stamp.write_created(&mut item);
        stamp.write_modified(&mut item);
        if ensure_owner(&mut item, &mut acl, identity) {
            tracing::debug!(collection, user = %identity.username, "creator granted full control");
        }
        let reason = take_reason(&mut item);

        let mut item = self.to_stored(item);
        if item.get("_id").map_or(true, Value::is_null) {
            item.insert("_id".to_string(), Value::String(ObjectId::generate().to_hex()));
        }

        let (version, record) = self
            .history
            .prepare_write(collection, None, &item, &stamp, reason);
        item.insert(VERSION_FIELD.to_string(), Value::Int(version));

        tracing::debug!(collection, name = display_name(&item), version, "insert");
        let store = self.store.get().await?;
        let outcome = store.insert_one(collection, item.clone(), concern).await?;
        ensure_acknowledged("insert", concern, outcome.acknowledged)?;
        if let Some(record) = record {
            self.history.append(store.as_ref(), collection, &record).await;
        }

        if collection == USERS_COLLECTION
            && item.get(TYPE_FIELD).and_then(Value::as_str) == Some("user")
        {
            self.register_user(&item).await?;
        }
        Ok(self.present(item))
    }

    /// Full update of the entity named by `item._id`, restricted to
    /// `matching` when given.
    ///
    /// The prior version is loaded through the update-right filter, so a
    /// caller who may only read the entity fails before anything is recorded.
    async fn replace_document(
        &self,
        identity: &Identity,
        collection: &str,
        mut item: Document,
        matching: Option<Filter>,
        concern: WriteConcern,
    ) -> Result<Document> {
        let id = item
            .get("_id")
            .and_then(Value::id_string)
            .ok_or_else(|| GatewayError::InvalidArgument("cannot update an item without _id".into()))?;
        let matching = matching.unwrap_or_else(|| id_filter(&id));
        let filter = Filter::and(vec![matching, self.writable_by(identity, collection, Right::Update)]);
        let prior = self
            .find_one_stored(identity, collection, Filter::and(vec![id_filter(&id), filter.clone()]))
            .await?
            .ok_or_else(|| GatewayError::NotFound(format!("{} in {}", id, collection)))?;

        let stamp = Stamp::now(identity);
        stamp.write_modified(&mut item);
        merge_metadata(&self.present(prior.clone()), &mut item);
        ensure_resource(&mut item)?;
        let reason = take_reason(&mut item);
        let mut item = self.to_stored(item);

        let (version, record) = self
            .history
            .prepare_write(collection, Some(&prior), &item, &stamp, reason);
        item.insert(VERSION_FIELD.to_string(), Value::Int(version));

        tracing::debug!(collection, name = display_name(&item), version, "update");
        let store = self.store.get().await?;
        let outcome = store
            .replace_one(collection, &filter, item.clone(), concern)
            .await?;
        ensure_acknowledged("update", concern, outcome.acknowledged)?;

        match outcome.matched {
            0 => Err(GatewayError::NotFound(format!("{} in {}", id, collection))),
            1 => {
                if let Some(record) = record {
                    self.history.append(store.as_ref(), collection, &record).await;
                }
                Ok(self.present(item))
            }
            n => Err(GatewayError::OperationFailed(StoreError::UnexpectedMatchCount(n))),
        }
    }

    /// Add a newly created user to the built-in users role.
    async fn register_user(&self, user: &Document) -> Result<()> {
        let id = user.get("_id").and_then(Value::id_string).unwrap_or_default();
        match self.roles.find_by_name(USERS_NAME).await? {
            Some(mut role) => {
                if role.add_member(&id, display_name(user)) {
                    self.roles.save(&role).await?;
                }
            }
            None => tracing::warn!(user = %id, "users role missing, new user not added"),
        }
        Ok(())
    }

    fn authorize(&self, identity: &Identity, entity: &Document, action: Action) -> Result<()> {
        Ok(self.access.authorize(identity, entity, action)?)
    }

    fn writable_by(&self, identity: &Identity, collection: &str, right: Right) -> Filter {
        self.access.filter(identity, collection, &[right])
    }

    async fn find_stored(
        &self,
        identity: &Identity,
        collection: &str,
        filter: Filter,
        mut options: FindOptions,
    ) -> Result<Vec<Document>> {
        if options.limit.is_none() {
            options.limit = Some(self.config.default_query_limit);
        }
        let filter = Filter::and(vec![filter, self.access.filter(identity, collection, &[Right::Read])]);
        let store = self.store.get().await?;
        Ok(store.find(collection, &filter, &options).await?)
    }

    async fn find_one_stored(
        &self,
        identity: &Identity,
        collection: &str,
        filter: Filter,
    ) -> Result<Option<Document>> {
        let options = FindOptions::default().with_limit(1);
        let docs = self.find_stored(identity, collection, filter, options).await?;
        Ok(docs.into_iter().next())
    }

    /// Seal the `$set` fields declared in `_encrypt` by the stored entity or
    /// by the patch itself. Values must still be unencoded.
    fn seal_patch(&self, snapshot: &Document, update: &mut Update) {
        let Some(codec) = &self.codec else {
            return;
        };
        let mut fields = FieldCodec::declared_fields(snapshot);
        for field in FieldCodec::declared_fields(&update.set) {
            if !fields.contains(&field) {
                fields.push(field);
            }
        }
        codec.seal_fields(&fields, &mut update.set);
    }

    /// Seal, then encode.
    fn to_stored(&self, mut doc: Document) -> Document {
        if let Some(codec) = &self.codec {
            codec.seal(&mut doc);
        }
        encode_document(doc)
    }

    /// Decode, then open.
    fn present(&self, doc: Document) -> Document {
        let mut doc = decode_document(doc);
        if let Some(codec) = &self.codec {
            codec.open(&mut doc);
        }
        doc
    }
}

fn resolve_collection(collection: &str) -> String {
    if collection == FILES_ALIAS {
        FILES_COLLECTION.to_string()
    } else {
        collection.to_string()
    }
}

fn writable_collection(collection: &str) -> Result<String> {
    let collection = resolve_collection(collection);
    if is_history_collection(&collection) {
        return Err(GatewayError::InvalidArgument(format!(
            "{} is maintained by the gateway and cannot be written",
            collection
        )));
    }
    Ok(collection)
}

fn take_reason(doc: &mut Document) -> Option<String> {
    match doc.remove(UPDATE_REASON_FIELD) {
        Some(Value::String(reason)) => Some(reason),
        _ => None,
    }
}

fn ensure_acknowledged(operation: &str, concern: WriteConcern, acknowledged: bool) -> Result<()> {
    if concern.requires_ack() && !acknowledged {
        return Err(GatewayError::OperationFailed(StoreError::Unacknowledged {
            operation: operation.to_string(),
        }));
    }
    Ok(())
}

/// Filter selecting the entity `item` collides with, or `None` when it
/// cannot collide with anything.
///
/// Values are run through the query translator so dates and ids match
/// their stored form.
fn uniqueness_filter(item: &Document, uniqueness: Option<&str>) -> Result<Option<Filter>> {
    let fields: Vec<&str> = uniqueness
        .map(|list| list.split(',').map(str::trim).filter(|f| !f.is_empty()).collect())
        .unwrap_or_default();

    if fields.is_empty() {
        return Ok(item
            .get("_id")
            .and_then(Value::id_string)
            .map(|id| id_filter(&id)));
    }

    let query: serde_json::Map<String, serde_json::Value> = fields
        .into_iter()
        .map(|field| {
            let value = item.get(field).map_or(serde_json::Value::Null, Value::to_json);
            (field.to_string(), value)
        })
        .collect();
    Ok(Some(translate_filter(&serde_json::Value::Object(query))?))
}
