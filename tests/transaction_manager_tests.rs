/// Transaction manager tests
///
/// Entity versioning, verified removal and the begin/commit/rollback envelope
/// Run with: cargo test --test transaction_manager_tests
use kvwarden::{
    BatchReply, Entity, EntityRepository, ErrorCode, InMemoryTransport, JsonRepository,
    KeyValueTransport, KvError, Result, TransactionManager,
};
use serde_json::json;
use std::sync::Arc;
use tokio_test::{assert_err, assert_ok};

fn setup(schema: &str) -> (Arc<InMemoryTransport>, TransactionManager) {
    let transport = Arc::new(InMemoryTransport::new());
    let repository = Arc::new(JsonRepository::new(transport.clone(), schema));
    (transport.clone(), TransactionManager::new(transport, repository))
}

/// Repository whose remove always fails, to check it is only best-effort
struct FailingRemoveRepository {
    inner: JsonRepository,
}

#[async_trait::async_trait]
impl EntityRepository for FailingRemoveRepository {
    fn schema_name(&self) -> &str {
        self.inner.schema_name()
    }

    async fn save(&self, entity: Entity) -> Result<Entity> {
        self.inner.save(entity).await
    }

    async fn fetch(&self, entity_id: &str) -> Result<Option<Entity>> {
        self.inner.fetch(entity_id).await
    }

    async fn remove(&self, _entity_id: &str) -> Result<()> {
        Err(KvError::new(ErrorCode::RedisOperationError, "index cleanup unavailable"))
    }
}

#[tokio::test]
async fn test_nth_save_yields_version_n() {
    let (_, manager) = setup("counters");

    let mut entity = manager.save(Entity::new().with_field("n", 0)).await.unwrap();
    let entity_id = entity.entity_id().unwrap().to_string();

    for n in 2..=10u64 {
        entity.set_field("n", n);
        entity = manager.save(entity).await.unwrap();
        assert_eq!(entity.version(), n);
        assert_eq!(entity.entity_id(), Some(entity_id.as_str()));
    }

    let fetched = manager.fetch(&entity_id).await.unwrap();
    assert_eq!(fetched.version(), 10);
    assert_eq!(fetched.field("n"), Some(&json!(10)));
}

#[tokio::test]
async fn test_save_restamps_last_updated() {
    let (_, manager) = setup("stamps");

    let first = manager.save(Entity::new()).await.unwrap();
    let second = manager.save(first.clone()).await.unwrap();

    assert!(second.last_updated().unwrap() >= first.last_updated().unwrap());
}

#[tokio::test]
async fn test_fetch_never_saved_is_not_found() {
    let (_, manager) = setup("users");

    let err = assert_err!(manager.fetch("does-not-exist").await);
    assert_eq!(err.code(), ErrorCode::EntityNotFound);
    assert_eq!(err.status(), 404);
}

#[tokio::test]
async fn test_lifecycle_scenario() {
    let (transport, manager) = setup("users");

    let created = manager
        .save(Entity::new().with_field("name", "John").with_field("value", 42))
        .await
        .unwrap();
    assert_eq!(created.version(), 1);
    let entity_id = created.entity_id().expect("id assigned").to_string();

    let updated = manager
        .save(created.with_field("value", 200))
        .await
        .unwrap();
    assert_eq!(updated.version(), 2);
    assert_eq!(updated.entity_id(), Some(entity_id.as_str()));

    assert_ok!(manager.remove(&entity_id).await);

    let err = assert_err!(manager.fetch(&entity_id).await);
    assert_eq!(err.code(), ErrorCode::EntityNotFound);
    assert!(transport.keys(&manager.key_pattern(&entity_id)).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_remove_missing_is_not_found() {
    let (_, manager) = setup("users");

    let err = assert_err!(manager.remove("ghost").await);
    assert_eq!(err.code(), ErrorCode::EntityNotFound);
}

#[tokio::test]
async fn test_remove_tolerates_repository_failure() {
    let transport = Arc::new(InMemoryTransport::new());
    let repository = Arc::new(FailingRemoveRepository {
        inner: JsonRepository::new(transport.clone(), "notes"),
    });
    let manager = TransactionManager::new(transport.clone(), repository);

    let saved = manager.save(Entity::new().with_field("text", "hi")).await.unwrap();
    let entity_id = saved.entity_id().unwrap().to_string();

    assert_ok!(manager.remove(&entity_id).await);
    assert!(transport.is_empty().await);
}

#[tokio::test]
async fn test_remove_does_not_touch_other_entities() {
    let (transport, manager) = setup("users");

    let keep = manager.save(Entity::new().with_field("name", "keep")).await.unwrap();
    let drop = manager.save(Entity::new().with_field("name", "drop")).await.unwrap();

    manager.remove(drop.entity_id().unwrap()).await.unwrap();

    assert_eq!(transport.len().await, 1);
    let fetched = manager.fetch(keep.entity_id().unwrap()).await.unwrap();
    assert_eq!(fetched.field("name"), Some(&json!("keep")));
}

#[tokio::test]
async fn test_save_failure_is_transaction_error() {
    let (transport, manager) = setup("users");
    transport.fail_on("set").await;

    let err = assert_err!(manager.save(Entity::new()).await);
    assert_eq!(err.code(), ErrorCode::TransactionError);
    assert_eq!(err.detail("operation"), Some(&json!("save")));
    assert!(err.detail("cause").is_some());
}

#[tokio::test]
async fn test_scan_failure_is_transaction_error() {
    let (transport, manager) = setup("users");
    transport.fail_on("keys").await;

    let err = assert_err!(manager.fetch("any").await);
    assert_eq!(err.code(), ErrorCode::TransactionError);
    assert_eq!(err.detail("pattern"), Some(&json!("users:any*")));
}

#[tokio::test]
async fn test_double_begin_is_rejected() {
    let (_, manager) = setup("users");

    assert_ok!(manager.begin_transaction().await);
    let err = assert_err!(manager.begin_transaction().await);
    assert_eq!(err.code(), ErrorCode::TransactionError);
    assert!(err.message().contains("already in progress"));

    assert_ok!(manager.rollback_transaction().await);
}

#[tokio::test]
async fn test_commit_and_rollback_require_active_envelope() {
    let (_, manager) = setup("users");

    let err = assert_err!(manager.commit_transaction().await);
    assert_eq!(err.code(), ErrorCode::TransactionError);

    let err = assert_err!(manager.rollback_transaction().await);
    assert_eq!(err.code(), ErrorCode::TransactionError);
}

#[tokio::test]
async fn test_commit_applies_queued_writes() {
    let (transport, manager) = setup("users");

    manager.begin_transaction().await.unwrap();
    transport.set("users:batch", "1").await.unwrap();
    assert_eq!(transport.get("users:batch").await.unwrap(), None);

    let replies = manager.commit_transaction().await.unwrap();
    assert_eq!(replies, vec![BatchReply::Ok]);
    assert_eq!(transport.get("users:batch").await.unwrap().as_deref(), Some("1"));
    assert!(!manager.is_transaction_active().await);
}

#[tokio::test]
async fn test_rollback_discards_queued_writes() {
    let (transport, manager) = setup("users");

    manager.begin_transaction().await.unwrap();
    transport.set("users:batch", "1").await.unwrap();
    manager.rollback_transaction().await.unwrap();

    assert_eq!(transport.get("users:batch").await.unwrap(), None);
    assert_ok!(manager.begin_transaction().await);
}

#[tokio::test]
async fn test_run_in_transaction_commits_on_ok() {
    let (transport, manager) = setup("users");

    let value = manager
        .run_in_transaction(|tx| async move {
            tx.set("users:a", "1").await.map_err(|e| {
                KvError::wrap(ErrorCode::RedisOperationError, "set failed", e)
            })?;
            Ok(7)
        })
        .await
        .unwrap();

    assert_eq!(value, 7);
    assert_eq!(transport.get("users:a").await.unwrap().as_deref(), Some("1"));
    assert!(!manager.is_transaction_active().await);
}

#[tokio::test]
async fn test_run_in_transaction_rolls_back_on_err() {
    let (transport, manager) = setup("users");

    let err = manager
        .run_in_transaction(|tx| async move {
            tx.set("users:a", "1").await.ok();
            Err::<(), _>(KvError::new(ErrorCode::ValidationError, "bad input"))
        })
        .await
        .unwrap_err();

    assert_eq!(err.code(), ErrorCode::ValidationError);
    assert_eq!(transport.get("users:a").await.unwrap(), None);
    assert!(!manager.is_transaction_active().await);
}

#[tokio::test]
async fn test_disconnect_rolls_back_and_is_idempotent() {
    let (transport, manager) = setup("users");

    manager.begin_transaction().await.unwrap();
    transport.set("users:pending", "1").await.unwrap();

    assert_ok!(manager.disconnect().await);
    assert!(!manager.is_transaction_active().await);
    assert!(!transport.is_open().await);
    assert_ok!(manager.disconnect().await);

    transport.connect().await.unwrap();
    assert_eq!(transport.get("users:pending").await.unwrap(), None);
}

#[tokio::test]
async fn test_disconnect_failure_is_connection_error() {
    let (transport, manager) = setup("users");
    transport.fail_on("close").await;

    let err = assert_err!(manager.disconnect().await);
    assert_eq!(err.code(), ErrorCode::RedisConnectionError);
}

#[tokio::test]
async fn test_concurrent_begin_admits_one() {
    let (_, manager) = setup("users");
    let manager = Arc::new(manager);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let manager = manager.clone();
            tokio::spawn(async move { manager.begin_transaction().await })
        })
        .collect();

    let mut started = 0;
    for handle in handles {
        if handle.await.unwrap().is_ok() {
            started += 1;
        }
    }

    assert_eq!(started, 1);
    assert!(manager.is_transaction_active().await);
}

#[tokio::test]
async fn test_reserved_field_names_are_rejected() {
    let (transport, manager) = setup("users");

    for name in ["version", "entityId", "lastUpdated"] {
        let err = assert_err!(manager.save(Entity::new().with_field(name, "v2-api")).await);
        assert_eq!(err.code(), ErrorCode::ValidationError);
        assert_eq!(err.status(), 400);
        assert_eq!(err.detail("fields"), Some(&json!([name])));
    }

    assert!(transport.is_empty().await);
}

#[tokio::test]
async fn test_saved_entity_with_ordinary_fields_stays_removable() {
    let (transport, manager) = setup("users");

    let saved = manager
        .save(Entity::new().with_field("apiVersion", "v2").with_field("updated", true))
        .await
        .unwrap();
    let entity_id = saved.entity_id().unwrap().to_string();

    let fetched = manager.fetch(&entity_id).await.unwrap();
    assert_eq!(fetched.field("apiVersion"), Some(&json!("v2")));
    assert_ok!(manager.remove(&entity_id).await);
    assert!(transport.is_empty().await);
}

#[tokio::test]
async fn test_remove_rejected_while_envelope_open() {
    let (transport, manager) = setup("users");
    let saved = manager.save(Entity::new().with_field("name", "keep")).await.unwrap();
    let entity_id = saved.entity_id().unwrap().to_string();

    manager.begin_transaction().await.unwrap();
    let err = assert_err!(manager.remove(&entity_id).await);
    assert_eq!(err.code(), ErrorCode::TransactionError);
    assert!(err.message().contains("transaction is in progress"));

    // Nothing was queued, so committing leaves the entity in place.
    let replies = manager.commit_transaction().await.unwrap();
    assert!(replies.is_empty());
    assert_eq!(transport.keys(&manager.key_pattern(&entity_id)).await.unwrap().len(), 1);

    assert_ok!(manager.remove(&entity_id).await);
    assert!(transport.is_empty().await);
}

#[tokio::test]
async fn test_save_inside_envelope_applies_on_commit() {
    let (transport, manager) = setup("users");

    manager.begin_transaction().await.unwrap();
    let saved = manager.save(Entity::new().with_field("name", "queued")).await.unwrap();
    let entity_id = saved.entity_id().unwrap().to_string();
    assert_eq!(saved.version(), 1);
    assert!(transport.is_empty().await);

    assert_eq!(manager.commit_transaction().await.unwrap(), vec![BatchReply::Ok]);
    let fetched = manager.fetch(&entity_id).await.unwrap();
    assert_eq!(fetched.field("name"), Some(&json!("queued")));
}

#[tokio::test]
async fn test_save_inside_envelope_discarded_on_rollback() {
    let (transport, manager) = setup("users");

    manager.begin_transaction().await.unwrap();
    let saved = manager.save(Entity::new().with_field("name", "dropped")).await.unwrap();
    manager.rollback_transaction().await.unwrap();

    assert!(transport.is_empty().await);
    let err = assert_err!(manager.fetch(saved.entity_id().unwrap()).await);
    assert_eq!(err.code(), ErrorCode::EntityNotFound);
}
