//! End-to-end pipeline tests over the memory and SQLite stores.

use serde_json::json;
use warden::{Gateway, GatewayConfig, GatewayError, HistoryEntry};
use warden_core::{Delta, Document, Value};
use warden_perms::{FieldCipher, Identity, USERS_NAME};
use warden_store::{FindOptions, SqliteConnector, StoreConnector, WriteConcern};
use warden_testkit::fixtures::{admin, alice, bob, TestFixture};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn id_of(doc: &Document) -> String {
    doc.get("_id").and_then(Value::id_string).unwrap()
}

fn int(doc: &Document, field: &str) -> Option<i64> {
    doc.get(field).and_then(Value::as_i64)
}

async fn insert<C: StoreConnector>(
    gateway: &Gateway<C>,
    identity: &Identity,
    item: serde_json::Value,
) -> Document {
    gateway
        .insert(identity, "entities", &item, WriteConcern::default())
        .await
        .unwrap()
}

// ─────────────────────────────────────────────────────────────────────────────
// Versioning scenario, run against both stores
// ─────────────────────────────────────────────────────────────────────────────

async fn version_scenario<C: StoreConnector>(gateway: &Gateway<C>) {
    let alice = alice();
    let created = insert(gateway, &alice, json!({"name": "a", "value": 1})).await;
    let id = id_of(&created);
    assert_eq!(int(&created, "_version"), Some(0));

    let updated = gateway
        .update(
            &alice,
            "entities",
            &json!({"_id": id, "name": "a", "value": 2}),
            WriteConcern::default(),
        )
        .await
        .unwrap();
    assert_eq!(int(&updated, "_version"), Some(1));

    let outcome = gateway
        .update_where(
            &alice,
            "entities",
            &json!({"_id": id}),
            &json!({"$set": {"value": 3}}),
            WriteConcern::default(),
        )
        .await
        .unwrap();
    assert_eq!((outcome.matched, outcome.modified), (1, 1));

    let live = gateway.get_by_id(&alice, "entities", &id).await.unwrap().unwrap();
    assert_eq!(int(&live, "value"), Some(3));
    assert_eq!(int(&live, "_version"), Some(2));

    let history = gateway.history(&alice, "entities", &id).await.unwrap();
    assert_eq!(history.len(), 3);
    assert_eq!(
        history.iter().map(|r| r.version).collect::<Vec<_>>(),
        vec![0, 1, 2]
    );
    assert!(matches!(history[0].entry, HistoryEntry::Full { .. }));

    match &history[1].entry {
        HistoryEntry::Delta {
            delta: Delta::Object(fields),
            ..
        } => assert_eq!(
            fields.get("value"),
            Some(&Delta::Replaced {
                old: Value::Int(1),
                new: Value::Int(2)
            })
        ),
        other => panic!("expected a delta record, got {:?}", other),
    }

    match &history[2].entry {
        HistoryEntry::Patch { update } => {
            let set = update.get("$set").and_then(Value::as_document).unwrap();
            assert_eq!(int(set, "value"), Some(3));
        }
        other => panic!("expected a patch record, got {:?}", other),
    }

    let rebuilt = gateway
        .version_at(&alice, "entities", &id, 1)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(int(&rebuilt, "value"), Some(2));
}

#[tokio::test]
async fn test_version_scenario_memory() {
    init_tracing();
    let fixture = TestFixture::new();
    version_scenario(&fixture.gateway).await;
}

#[tokio::test]
async fn test_version_scenario_sqlite() {
    init_tracing();
    let gateway = Gateway::new(SqliteConnector::in_memory(), GatewayConfig::default());
    version_scenario(&gateway).await;
}

#[tokio::test]
async fn test_version_scenario_sqlite_file() {
    let dir = tempfile::TempDir::new().unwrap();
    let gateway = Gateway::new(
        SqliteConnector::file(dir.path().join("warden.db")),
        GatewayConfig::default(),
    );
    version_scenario(&gateway).await;
}

#[tokio::test]
async fn test_sequential_full_updates() {
    let fixture = TestFixture::new();
    let alice = alice();
    let created = insert(&fixture.gateway, &alice, json!({"name": "counter", "n": 0})).await;
    let id = id_of(&created);

    for n in 1..=5 {
        let updated = fixture
            .gateway
            .update(
                &alice,
                "entities",
                &json!({"_id": id, "name": "counter", "n": n}),
                WriteConcern::default(),
            )
            .await
            .unwrap();
        assert_eq!(int(&updated, "_version"), Some(n));
    }

    let history = fixture.gateway.history(&alice, "entities", &id).await.unwrap();
    let full = history
        .iter()
        .filter(|r| matches!(r.entry, HistoryEntry::Full { .. }))
        .count();
    let deltas = history
        .iter()
        .filter(|r| matches!(r.entry, HistoryEntry::Delta { .. }))
        .count();
    assert_eq!((full, deltas), (1, 5));
}

// ─────────────────────────────────────────────────────────────────────────────
// Insert
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_insert_grants_creator_full_control() {
    let fixture = TestFixture::new();
    let created = insert(&fixture.gateway, &alice(), json!({"name": "doc"})).await;

    let acl = created.get("_acl").and_then(Value::as_array).unwrap();
    let owners: Vec<&Document> = acl
        .iter()
        .filter_map(Value::as_document)
        .filter(|ace| ace.get("_id") == Some(&Value::String(alice().id)))
        .collect();
    assert_eq!(owners.len(), 1);
    assert_eq!(int(owners[0], "rights"), Some(-1));

    assert_eq!(
        created.get("_createdby").and_then(Value::as_str),
        Some("Alice")
    );
    assert!(matches!(created.get("_created"), Some(Value::Date(_))));
}

#[tokio::test]
async fn test_insert_rejects_null_and_reserved() {
    let fixture = TestFixture::new();
    let err = fixture
        .gateway
        .insert(&alice(), "entities", &json!(null), WriteConcern::default())
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::InvalidArgument(_)));

    let err = fixture
        .gateway
        .insert(
            &alice(),
            "users",
            &json!({"_type": "role", "name": "Admins"}),
            WriteConcern::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::AccessDenied(_)));
    assert!(fixture.raw("users").is_empty());
}

#[tokio::test]
async fn test_insert_user_joins_users_role() {
    let fixture = TestFixture::new();
    fixture.seed_users_role().await.unwrap();

    let user = fixture
        .gateway
        .insert(
            &admin(),
            "users",
            &json!({"_type": "user", "name": "Carol", "username": "carol"}),
            WriteConcern::default(),
        )
        .await
        .unwrap();

    let role = fixture
        .raw("users")
        .into_iter()
        .find(|doc| doc.get("name").and_then(Value::as_str) == Some(USERS_NAME))
        .unwrap();
    let members = role.get("members").and_then(Value::as_array).unwrap();
    assert!(members.iter().any(|m| {
        m.as_document().and_then(|m| m.get("_id")).and_then(Value::id_string) == Some(id_of(&user))
    }));
}

#[tokio::test]
async fn test_insert_user_without_users_role() {
    let fixture = TestFixture::new();
    fixture
        .gateway
        .insert(
            &admin(),
            "users",
            &json!({"_type": "user", "name": "Dave"}),
            WriteConcern::default(),
        )
        .await
        .unwrap();
    assert_eq!(fixture.raw("users").len(), 1);
}

// ─────────────────────────────────────────────────────────────────────────────
// Stored form
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_declared_fields_are_sealed_at_rest() {
    let fixture = TestFixture::new();
    let alice = alice();
    let created = insert(
        &fixture.gateway,
        &alice,
        json!({
            "name": "card",
            "_encrypt": ["pan", "pin"],
            "pan": "4111 1111 1111 1111",
            "pin": 1234,
            "holder": "Alice"
        }),
    )
    .await;
    assert_eq!(
        created.get("pan").and_then(Value::as_str),
        Some("4111 1111 1111 1111")
    );

    let stored = &fixture.raw("entities")[0];
    let sealed = stored.get("pan").and_then(Value::as_str).unwrap();
    assert_ne!(sealed, "4111 1111 1111 1111");
    assert_eq!(int(stored, "pin"), Some(1234));
    assert_eq!(stored.get("holder").and_then(Value::as_str), Some("Alice"));

    let read = fixture
        .gateway
        .get_by_id(&alice, "entities", &id_of(&created))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(read.get("pan"), created.get("pan"));
    assert_eq!(read.get("holder"), created.get("holder"));

    // Partial updates seal the declared fields they set.
    fixture
        .gateway
        .update_where(
            &alice,
            "entities",
            &json!({"name": "card"}),
            &json!({"$set": {"pan": "5500 0000 0000 0004"}}),
            WriteConcern::default(),
        )
        .await
        .unwrap();
    let stored = &fixture.raw("entities")[0];
    assert_ne!(
        stored.get("pan").and_then(Value::as_str),
        Some("5500 0000 0000 0004")
    );
    let read = fixture
        .gateway
        .get_by_id(&alice, "entities", &id_of(&created))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        read.get("pan").and_then(Value::as_str),
        Some("5500 0000 0000 0004")
    );

    // The patch kept in history holds the sealed value too.
    let history = fixture.raw("entities_hist");
    let patch = history
        .iter()
        .find(|record| record.get("kind").and_then(Value::as_str) == Some("patch"))
        .unwrap();
    let set = patch
        .get("update")
        .and_then(Value::as_document)
        .and_then(|update| update.get("$set"))
        .and_then(Value::as_document)
        .unwrap();
    let expected = fixture.cipher.encrypt("5500 0000 0000 0004").unwrap();
    assert_eq!(set.get("pan").and_then(Value::as_str), Some(expected.as_str()));
}

#[tokio::test]
async fn test_patched_secret_shaped_like_a_date_is_sealed() {
    let fixture = TestFixture::new();
    let alice = alice();
    let created = insert(
        &fixture.gateway,
        &alice,
        json!({"name": "token", "_encrypt": ["tok"], "tok": "initial"}),
    )
    .await;

    fixture
        .gateway
        .update_where(
            &alice,
            "entities",
            &json!({"_id": id_of(&created)}),
            &json!({"$set": {"tok": "2020-01-01T00:00:00.000Z", "due": "2020-01-01T00:00:00.000Z"}}),
            WriteConcern::default(),
        )
        .await
        .unwrap();

    let stored = &fixture.raw("entities")[0];
    let expected = fixture.cipher.encrypt("2020-01-01T00:00:00.000Z").unwrap();
    assert_eq!(stored.get("tok").and_then(Value::as_str), Some(expected.as_str()));
    assert!(matches!(stored.get("due"), Some(Value::Date(_))));

    let read = fixture
        .gateway
        .get_by_id(&alice, "entities", &id_of(&created))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        read.get("tok").and_then(Value::as_str),
        Some("2020-01-01T00:00:00.000Z")
    );
}

#[tokio::test]
async fn test_dotted_keys_survive_round_trip() {
    let fixture = TestFixture::new();
    let alice = alice();
    let created = insert(
        &fixture.gateway,
        &alice,
        json!({"name": "dotted", "config": {"a.b": 1}, "x.y": "z"}),
    )
    .await;

    let stored = &fixture.raw("entities")[0];
    assert!(stored.get("x.y").is_none());
    assert!(stored.get("x____y").is_some());

    let read = fixture
        .gateway
        .get_by_id(&alice, "entities", &id_of(&created))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(read.get("x.y").and_then(Value::as_str), Some("z"));
    let config = read.get("config").and_then(Value::as_document).unwrap();
    assert_eq!(int(config, "a.b"), Some(1));
}

#[tokio::test]
async fn test_canonical_dates_are_stored_natively() {
    let fixture = TestFixture::new();
    insert(
        &fixture.gateway,
        &alice(),
        json!({"name": "dated", "due": "2024-03-01T12:00:00.000Z"}),
    )
    .await;
    let stored = &fixture.raw("entities")[0];
    assert!(matches!(stored.get("due"), Some(Value::Date(_))));

    let found = fixture
        .gateway
        .query(
            &alice(),
            "entities",
            &json!({"due": {"$gte": "2024-01-01T00:00:00.000Z"}}),
            FindOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
}

// ─────────────────────────────────────────────────────────────────────────────
// Access
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_missing_rights_never_match() {
    let fixture = TestFixture::new();
    let gateway = &fixture.gateway;
    let (alice, bob) = (alice(), bob());

    let private = insert(gateway, &alice, json!({"name": "private"})).await;
    let id = id_of(&private);

    assert!(gateway.get_by_id(&bob, "entities", &id).await.unwrap().is_none());
    assert!(gateway.history(&bob, "entities", &id).await.unwrap().is_empty());
    let err = gateway
        .update(&bob, "entities", &json!({"_id": id, "name": "mine"}), WriteConcern::default())
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::NotFound(_)));
    let err = gateway.delete(&bob, "entities", &id).await.unwrap_err();
    assert!(matches!(err, GatewayError::NotFound(_)));

    // Read-only grant: visible, but still not writable or deletable.
    let shared = insert(
        gateway,
        &alice,
        json!({
            "name": "shared",
            "_acl": [{"_id": bob.id, "name": "Bob", "rights": 2}]
        }),
    )
    .await;
    let id = id_of(&shared);
    assert!(gateway.get_by_id(&bob, "entities", &id).await.unwrap().is_some());
    let history_before = fixture.raw("entities_hist");
    let err = gateway
        .update(
            &bob,
            "entities",
            &json!({"_id": id, "name": "shared", "value": 666}),
            WriteConcern::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::NotFound(_)));
    let err = gateway
        .update_where(
            &bob,
            "entities",
            &json!({"_id": id}),
            &json!({"$set": {"name": "taken"}}),
            WriteConcern::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::NotFound(_)));
    let err = gateway
        .upsert(
            &bob,
            "entities",
            &json!({"_id": id, "name": "shared", "value": 667}),
            None,
            WriteConcern::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::NotFound(_)));
    let err = gateway.delete(&bob, "entities", &id).await.unwrap_err();
    assert!(matches!(err, GatewayError::NotFound(_)));

    // Rejected writes leave no trace in history.
    assert_eq!(fixture.raw("entities_hist"), history_before);

    let updated = gateway
        .update(
            &alice,
            "entities",
            &json!({"_id": id, "name": "shared", "value": 2}),
            WriteConcern::default(),
        )
        .await
        .unwrap();
    assert_eq!(int(&updated, "_version"), Some(1));
    let versions: Vec<(i64, String)> = gateway
        .history(&alice, "entities", &id)
        .await
        .unwrap()
        .into_iter()
        .map(|record| (record.version, record.stamp.by))
        .collect();
    assert_eq!(versions, vec![(0, "Alice".to_string()), (1, "Alice".to_string())]);
    let at_one = gateway
        .version_at(&alice, "entities", &id, 1)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(int(&at_one, "value"), Some(2));

    gateway.delete(&alice, "entities", &id).await.unwrap();
    assert!(gateway.get_by_id(&alice, "entities", &id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_bypass_skips_filtering() {
    let fixture = TestFixture::with_config(GatewayConfig::default().with_bypass(true));
    let private = insert(&fixture.gateway, &alice(), json!({"name": "private"})).await;
    assert!(fixture
        .gateway
        .get_by_id(&bob(), "entities", &id_of(&private))
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn test_history_collections_are_read_only() {
    let fixture = TestFixture::new();
    insert(&fixture.gateway, &alice(), json!({"name": "a"})).await;

    let records = fixture
        .gateway
        .query(&alice(), "entities_hist", &json!({}), FindOptions::default())
        .await
        .unwrap();
    assert_eq!(records.len(), 1);

    let err = fixture
        .gateway
        .delete(&Identity::root(), "entities_hist", &id_of(&records[0]))
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::InvalidArgument(_)));
    assert_eq!(fixture.raw("entities_hist").len(), 1);
}

// ─────────────────────────────────────────────────────────────────────────────
// Update paths
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_full_update_merges_metadata() {
    let fixture = TestFixture::new();
    let alice = alice();
    let created = insert(
        &fixture.gateway,
        &alice,
        json!({"name": "m", "_type": "Report", "_custom": "keep", "_drop": "x"}),
    )
    .await;
    let id = id_of(&created);
    assert_eq!(created.get("_type").and_then(Value::as_str), Some("report"));

    let updated = fixture
        .gateway
        .update(
            &admin(),
            "entities",
            &json!({
                "_id": id,
                "name": "m2",
                "_created": "2000-01-01T00:00:00.000Z",
                "_drop": null,
                "_updatereason": "rename"
            }),
            WriteConcern::default(),
        )
        .await
        .unwrap();

    assert_eq!(updated.get("_created"), created.get("_created"));
    assert_eq!(updated.get("_createdby").and_then(Value::as_str), Some("Alice"));
    assert_eq!(updated.get("_modifiedby").and_then(Value::as_str), Some("Admin"));
    assert_eq!(updated.get("_custom").and_then(Value::as_str), Some("keep"));
    assert_eq!(updated.get("_type").and_then(Value::as_str), Some("report"));
    assert!(updated.get("_drop").is_none());
    assert!(updated.get("_updatereason").is_none());
    assert_eq!(updated.get("_acl"), created.get("_acl"));

    let history = fixture.gateway.history(&alice, "entities", &id).await.unwrap();
    assert_eq!(history[1].reason.as_deref(), Some("rename"));
}

#[tokio::test]
async fn test_full_update_requires_existing_id() {
    let fixture = TestFixture::new();
    let err = fixture
        .gateway
        .update(&alice(), "entities", &json!({"name": "x"}), WriteConcern::default())
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::InvalidArgument(_)));

    let err = fixture
        .gateway
        .update(
            &alice(),
            "entities",
            &json!({"_id": "missing", "name": "x"}),
            WriteConcern::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::NotFound(_)));
}

#[tokio::test]
async fn test_bulk_update_stamps_without_history() {
    let fixture = TestFixture::new();
    let alice = alice();
    for name in ["a", "b", "c"] {
        insert(&fixture.gateway, &alice, json!({"name": name, "group": 1})).await;
    }
    insert(&fixture.gateway, &bob(), json!({"name": "d", "group": 1})).await;

    let outcome = fixture
        .gateway
        .update_many(
            &alice,
            "entities",
            &json!({"group": 1}),
            &json!({"$set": {"flag": true}}),
            WriteConcern::default(),
        )
        .await
        .unwrap();
    assert_eq!((outcome.matched, outcome.modified), (3, 3));

    for doc in fixture.raw("entities") {
        let mine = doc.get("name").and_then(Value::as_str) != Some("d");
        assert_eq!(doc.get("flag").is_some(), mine);
        assert_eq!(int(&doc, "_version"), Some(0));
    }
    assert_eq!(fixture.raw("entities_hist").len(), 4);
}

#[tokio::test]
async fn test_partial_update_without_match() {
    let fixture = TestFixture::new();
    let err = fixture
        .gateway
        .update_where(
            &alice(),
            "entities",
            &json!({"name": "nobody"}),
            &json!({"$set": {"x": 1}}),
            WriteConcern::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::NotFound(_)));
    assert!(fixture.raw("entities_hist").is_empty());
}

// ─────────────────────────────────────────────────────────────────────────────
// Upsert and delete
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_upsert_rejects_ambiguous_match() {
    let fixture = TestFixture::new();
    let alice = alice();
    insert(&fixture.gateway, &alice, json!({"name": "x", "n": 1})).await;
    insert(&fixture.gateway, &alice, json!({"name": "x", "n": 2})).await;

    let err = fixture
        .gateway
        .upsert(
            &alice,
            "entities",
            &json!({"name": "x", "n": 3}),
            Some("name"),
            WriteConcern::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::InvalidArgument(_)));
    assert_eq!(fixture.raw("entities").len(), 2);
}

#[tokio::test]
async fn test_upsert_routes_by_uniqueness() {
    let fixture = TestFixture::new();
    let alice = alice();

    let first = fixture
        .gateway
        .upsert(
            &alice,
            "entities",
            &json!({"name": "u", "n": 1}),
            Some("name"),
            WriteConcern::default(),
        )
        .await
        .unwrap();
    assert_eq!(int(&first, "_version"), Some(0));

    let second = fixture
        .gateway
        .upsert(
            &alice,
            "entities",
            &json!({"name": "u", "n": 2}),
            Some("name, "),
            WriteConcern::default(),
        )
        .await
        .unwrap();
    assert_eq!(id_of(&second), id_of(&first));
    assert_eq!(int(&second, "_version"), Some(1));
    assert_eq!(fixture.raw("entities").len(), 1);

    let by_id = fixture
        .gateway
        .upsert(
            &alice,
            "entities",
            &json!({"_id": id_of(&first), "name": "u", "n": 3}),
            None,
            WriteConcern::default(),
        )
        .await
        .unwrap();
    assert_eq!(int(&by_id, "n"), Some(3));
    assert_eq!(fixture.raw("entities").len(), 1);
}

#[tokio::test]
async fn test_delete_validation() {
    let fixture = TestFixture::new();
    let err = fixture.gateway.delete(&alice(), "entities", "").await.unwrap_err();
    assert!(matches!(err, GatewayError::InvalidArgument(_)));
    let err = fixture
        .gateway
        .delete(&alice(), "entities", "5a17f157c4815318c8536c99")
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::NotFound(_)));
}

// ─────────────────────────────────────────────────────────────────────────────
// Configuration and write concern
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_skipped_collections_keep_version() {
    let config = GatewayConfig::default().with_skip_history("audit, noisy");
    let fixture = TestFixture::with_config(config);
    let alice = alice();
    let created = fixture
        .gateway
        .insert(&alice, "noisy", &json!({"name": "n"}), WriteConcern::default())
        .await
        .unwrap();
    let updated = fixture
        .gateway
        .update(
            &alice,
            "noisy",
            &json!({"_id": id_of(&created), "name": "n2"}),
            WriteConcern::default(),
        )
        .await
        .unwrap();
    assert_eq!(int(&updated, "_version"), Some(0));
    assert!(fixture.raw("noisy_hist").is_empty());
}

#[tokio::test]
async fn test_write_concern_passes_through() {
    let fixture = TestFixture::new();
    let concern = WriteConcern::parse(&json!("majority"), &json!("true")).unwrap();
    fixture
        .gateway
        .insert(&alice(), "entities", &json!({"name": "durable"}), concern)
        .await
        .unwrap();
    assert_eq!(fixture.store.last_write_concern().unwrap(), Some(concern));
}

#[tokio::test]
async fn test_query_default_limit() {
    let fixture = TestFixture::with_config(GatewayConfig::default().with_default_query_limit(2));
    for n in 0..4 {
        insert(&fixture.gateway, &alice(), json!({"name": "q", "n": n})).await;
    }
    let found = fixture
        .gateway
        .query(&alice(), "entities", "{\"name\": \"q\"}", FindOptions::default())
        .await
        .unwrap();
    assert_eq!(found.len(), 2);

    let all = fixture
        .gateway
        .query(&alice(), "entities", &json!({"name": "q"}), FindOptions::default().with_limit(10))
        .await
        .unwrap();
    assert_eq!(all.len(), 4);
}

#[tokio::test]
async fn test_authenticate_resolves_tokens() {
    let fixture = TestFixture::new();
    assert_eq!(fixture.gateway.authenticate("alice-token").await.unwrap(), alice());
    let err = fixture.gateway.authenticate("forged").await.unwrap_err();
    assert!(matches!(err, GatewayError::AccessDenied(_)));
}
