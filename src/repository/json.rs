use crate::core::{Entity, ErrorCode, KvError, Result};
use crate::interface::{EntityRepository, KeyValueTransport};
use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

/// Stores each entity as one JSON document under `<schema>:<entityId>`.
///
/// Ids supplied by the caller are used as-is. Entity scans match on the
/// `<schema>:<entityId>*` prefix, so an id that is a prefix of another
/// (`1` and `10`) makes removing the shorter one delete both. Generated
/// UUID v4 ids never collide this way.
pub struct JsonRepository {
    transport: Arc<dyn KeyValueTransport>,
    schema_name: String,
}

impl JsonRepository {
    pub fn new(transport: Arc<dyn KeyValueTransport>, schema_name: impl Into<String>) -> Self {
        Self {
            transport,
            schema_name: schema_name.into(),
        }
    }

    pub fn key_for(&self, entity_id: &str) -> String {
        format!("{}:{}", self.schema_name, entity_id)
    }

    fn operation_error(&self, operation: &str, err: impl std::fmt::Display) -> KvError {
        KvError::wrap(
            ErrorCode::RedisOperationError,
            format!("Repository {} failed for '{}'", operation, self.schema_name),
            err,
        )
        .in_operation("JsonRepository", operation)
    }
}

#[async_trait]
impl EntityRepository for JsonRepository {
    fn schema_name(&self) -> &str {
        &self.schema_name
    }

    async fn save(&self, mut entity: Entity) -> Result<Entity> {
        let entity_id = match entity.entity_id.clone() {
            Some(id) => id,
            None => {
                let id = Uuid::new_v4().to_string();
                entity.entity_id = Some(id.clone());
                id
            }
        };

        let document = serde_json::to_string(&entity)?;
        self.transport
            .set(&self.key_for(&entity_id), &document)
            .await
            .map_err(|e| self.operation_error("save", e).with_detail("entityId", entity_id.as_str()))?;

        Ok(entity)
    }

    async fn fetch(&self, entity_id: &str) -> Result<Option<Entity>> {
        let document = self
            .transport
            .get(&self.key_for(entity_id))
            .await
            .map_err(|e| self.operation_error("fetch", e).with_detail("entityId", entity_id))?;

        let Some(document) = document else {
            return Ok(None);
        };

        let mut entity: Entity = serde_json::from_str(&document)?;
        entity.entity_id = Some(entity_id.to_string());
        Ok(Some(entity))
    }

    async fn remove(&self, entity_id: &str) -> Result<()> {
        self.transport
            .delete(&[self.key_for(entity_id)])
            .await
            .map_err(|e| self.operation_error("remove", e).with_detail("entityId", entity_id))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryTransport;
    use serde_json::json;

    fn repository() -> (Arc<InMemoryTransport>, JsonRepository) {
        let transport = Arc::new(InMemoryTransport::new());
        let repository = JsonRepository::new(transport.clone(), "users");
        (transport, repository)
    }

    #[tokio::test]
    async fn test_save_assigns_id_once() {
        let (transport, repository) = repository();

        let saved = repository.save(Entity::new().with_field("name", "John")).await.unwrap();
        let id = saved.entity_id().unwrap().to_string();
        assert!(Uuid::parse_str(&id).is_ok());
        assert!(transport.get(&format!("users:{}", id)).await.unwrap().is_some());

        let resaved = repository.save(saved.with_field("name", "Jane")).await.unwrap();
        assert_eq!(resaved.entity_id(), Some(id.as_str()));
        assert_eq!(transport.len().await, 1);
    }

    #[tokio::test]
    async fn test_fetch_round_trip() {
        let (_, repository) = repository();
        let saved = repository.save(Entity::new().with_field("value", 42)).await.unwrap();
        let id = saved.entity_id().unwrap();

        let fetched = repository.fetch(id).await.unwrap().unwrap();
        assert_eq!(fetched.field("value"), Some(&json!(42)));
        assert_eq!(fetched.entity_id(), Some(id));
    }

    #[tokio::test]
    async fn test_fetch_missing() {
        let (_, repository) = repository();
        assert!(repository.fetch("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_corrupt_document_is_validation_error() {
        let (transport, repository) = repository();
        transport.set("users:bad", "{not json").await.unwrap();

        let err = repository.fetch("bad").await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);
    }

    #[tokio::test]
    async fn test_transport_failure_is_wrapped() {
        let (transport, repository) = repository();
        transport.fail_on("set").await;

        let err = repository.save(Entity::new()).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::RedisOperationError);
        assert_eq!(err.detail("operation"), Some(&json!("save")));
    }
}
