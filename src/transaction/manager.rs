// ============================================================================
// Transaction Manager
// ============================================================================

use super::state::{TransactionState, Transition};
use crate::core::{Entity, ErrorCode, KvError, Result};
use crate::interface::{BatchReply, EntityRepository, KeyValueTransport};
use chrono::Utc;
use log::warn;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{Instrument, Level, event, info_span};

const COMPONENT: &str = "TransactionManager";

/// Versioned entity lifecycle plus a single-in-flight batch envelope.
///
/// The key space is the authoritative existence signal: `fetch` scans
/// `<schema>:<id>*` before asking the repository, and `remove` only succeeds
/// once a re-scan of that pattern comes back empty.
pub struct TransactionManager {
    transport: Arc<dyn KeyValueTransport>,
    repository: Arc<dyn EntityRepository>,
    // Held across the transport round trip, so concurrent begin/commit on one
    // instance are serialized rather than racing.
    state: Mutex<TransactionState>,
}

impl TransactionManager {
    pub fn new(transport: Arc<dyn KeyValueTransport>, repository: Arc<dyn EntityRepository>) -> Self {
        Self {
            transport,
            repository,
            state: Mutex::new(TransactionState::Idle),
        }
    }

    pub fn schema_name(&self) -> &str {
        self.repository.schema_name()
    }

    /// Wildcard pattern covering every key owned by the entity
    pub fn key_pattern(&self, entity_id: &str) -> String {
        format!("{}:{}*", self.schema_name(), entity_id)
    }

    pub async fn transaction_state(&self) -> TransactionState {
        *self.state.lock().await
    }

    pub async fn is_transaction_active(&self) -> bool {
        self.state.lock().await.is_active()
    }

    // ------------------------------------------------------------------
    // Entity lifecycle
    // ------------------------------------------------------------------

    /// Bumps `version`, stamps `last_updated` and writes through the repository.
    ///
    /// User fields named after the housekeeping fields are rejected with
    /// `VALIDATION_ERROR` before anything is written.
    pub async fn save(&self, mut entity: Entity) -> Result<Entity> {
        let reserved = entity.reserved_fields();
        if !reserved.is_empty() {
            return Err(KvError::new(
                ErrorCode::ValidationError,
                format!("Entity fields use reserved names: {}", reserved.join(", ")),
            )
            .in_operation(COMPONENT, "save")
            .with_detail("schema", self.schema_name())
            .with_detail("fields", reserved));
        }

        entity.stamp(Utc::now());
        let version = entity.version;

        let saved = self.repository.save(entity).await.map_err(|e| {
            event!(Level::ERROR, error = %e, schema = %self.schema_name(), "entity save failed");
            self.wrap("save", "Failed to save entity", e)
                .with_detail("version", version)
        })?;

        let entity_id = saved.entity_id.clone().ok_or_else(|| {
            KvError::new(ErrorCode::TransactionError, "Repository did not assign an entity id")
                .in_operation(COMPONENT, "save")
                .with_detail("schema", self.schema_name())
        })?;

        event!(
            Level::DEBUG,
            schema = %self.schema_name(),
            entity_id = %entity_id,
            version,
            "entity saved"
        );

        Ok(Entity {
            entity_id: Some(entity_id),
            ..saved
        })
    }

    /// Fetches an entity, checking the raw key space first.
    pub async fn fetch(&self, entity_id: &str) -> Result<Entity> {
        let keys = self.scan(entity_id, "fetch").await?;
        if keys.is_empty() {
            return Err(KvError::entity_not_found(self.schema_name(), entity_id));
        }

        let entity = match self.repository.fetch(entity_id).await {
            Ok(Some(entity)) => entity,
            Ok(None) => return Err(KvError::entity_not_found(self.schema_name(), entity_id)),
            Err(e) if e.is(ErrorCode::EntityNotFound) => return Err(e),
            Err(e) => {
                return Err(self
                    .wrap("fetch", "Failed to fetch entity", e)
                    .with_detail("entityId", entity_id));
            }
        };

        Ok(Entity {
            entity_id: Some(entity_id.to_string()),
            ..entity
        })
    }

    /// Removes every key of the entity and verifies none are left.
    ///
    /// Not available while an envelope is open: the delete would only be
    /// queued, so it could not be verified.
    pub async fn remove(&self, entity_id: &str) -> Result<()> {
        // Held for the whole remove so no envelope opens mid-way.
        let state = self.state.lock().await;
        if state.is_active() {
            return Err(KvError::new(
                ErrorCode::TransactionError,
                "Cannot remove an entity while a transaction is in progress",
            )
            .in_operation(COMPONENT, "remove")
            .with_detail("entityId", entity_id)
            .with_detail("state", (*state).to_string()));
        }

        let span = info_span!(
            "transaction.remove",
            schema = %self.schema_name(),
            entity_id = %entity_id
        );
        self.remove_verified(entity_id).instrument(span).await
    }

    async fn remove_verified(&self, entity_id: &str) -> Result<()> {
        self.fetch(entity_id).await?;

        let keys = self.scan(entity_id, "remove").await?;
        if !keys.is_empty() {
            let removed = self.transport.delete(&keys).await.map_err(|e| {
                event!(Level::ERROR, error = %e, "entity key delete failed");
                self.wrap("remove", "Failed to delete entity keys", e)
                    .with_detail("entityId", entity_id)
            })?;
            event!(Level::DEBUG, scanned = keys.len(), removed, "entity keys deleted");
        }

        // The key-level delete above is authoritative.
        if let Err(e) = self.repository.remove(entity_id).await {
            warn!(
                "Repository remove failed for '{}:{}' after key delete: {}",
                self.schema_name(),
                entity_id,
                e
            );
        }

        let residual = self.scan(entity_id, "remove").await?;
        if !residual.is_empty() {
            event!(Level::ERROR, residual = residual.len(), "entity keys survived delete");
            return Err(KvError::new(
                ErrorCode::TransactionError,
                format!("Entity '{}' still has keys after delete", entity_id),
            )
            .in_operation(COMPONENT, "remove")
            .with_detail("entityId", entity_id)
            .with_detail("remainingKeys", residual));
        }

        event!(Level::DEBUG, "entity removed");
        Ok(())
    }

    async fn scan(&self, entity_id: &str, operation: &str) -> Result<Vec<String>> {
        let pattern = self.key_pattern(entity_id);
        self.transport.keys(&pattern).await.map_err(|e| {
            self.wrap(operation, "Failed to scan entity keys", e)
                .with_detail("entityId", entity_id)
                .with_detail("pattern", pattern.as_str())
        })
    }

    // ------------------------------------------------------------------
    // Transaction envelope
    // ------------------------------------------------------------------

    pub async fn begin_transaction(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        let next = self.transition(*state, Transition::Begin)?;

        self.transport
            .begin_batch()
            .await
            .map_err(|e| self.wrap("beginTransaction", "Failed to begin transaction", e))?;

        *state = next;
        event!(Level::DEBUG, "transaction started");
        Ok(())
    }

    /// Executes the open batch. An empty reply set is a successful commit.
    pub async fn commit_transaction(&self) -> Result<Vec<BatchReply>> {
        let mut state = self.state.lock().await;
        let next = self.transition(*state, Transition::Commit)?;

        // The batch is consumed by the attempt whether or not it succeeds.
        let result = self.transport.execute_batch().await;
        *state = next;

        let replies = result.map_err(|e| {
            event!(Level::ERROR, error = %e, "transaction commit failed");
            KvError::wrap(ErrorCode::TransactionCommitError, "Failed to commit transaction", e)
                .in_operation(COMPONENT, "commitTransaction")
        })?;

        event!(Level::DEBUG, replies = replies.len(), "transaction committed");
        Ok(replies)
    }

    pub async fn rollback_transaction(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        let next = self.transition(*state, Transition::Rollback)?;

        let result = self.transport.discard_batch().await;
        *state = next;

        result.map_err(|e| {
            event!(Level::ERROR, error = %e, "transaction rollback failed");
            KvError::wrap(ErrorCode::TransactionRollbackError, "Failed to roll back transaction", e)
                .in_operation(COMPONENT, "rollbackTransaction")
        })?;

        event!(Level::DEBUG, "transaction rolled back");
        Ok(())
    }

    /// Runs `operation` inside an envelope: commit on `Ok`, rollback on `Err`.
    ///
    /// The operation receives the transport so that its writes land in the
    /// open batch.
    pub async fn run_in_transaction<F, Fut, T>(&self, operation: F) -> Result<T>
    where
        F: FnOnce(Arc<dyn KeyValueTransport>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.begin_transaction().await?;

        match operation(self.transport.clone()).await {
            Ok(value) => {
                self.commit_transaction().await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = self.rollback_transaction().await {
                    warn!(
                        "Rollback after failed transactional operation also failed: {}",
                        rollback_err
                    );
                }
                Err(err)
            }
        }
    }

    /// Rolls back an open envelope, then releases the transport. Idempotent.
    pub async fn disconnect(&self) -> Result<()> {
        {
            let mut state = self.state.lock().await;
            if state.is_active() {
                if let Err(e) = self.transport.discard_batch().await {
                    warn!("Implicit rollback on disconnect failed: {}", e);
                }
                *state = TransactionState::Idle;
                event!(Level::DEBUG, "open transaction rolled back on disconnect");
            }
        }

        if !self.transport.is_open().await {
            return Ok(());
        }

        self.transport.close().await.map_err(|e| {
            let code = if e.is_connection() {
                ErrorCode::RedisConnectionError
            } else {
                ErrorCode::RedisOperationError
            };
            KvError::wrap(code, "Failed to disconnect", e).in_operation(COMPONENT, "disconnect")
        })
    }

    fn transition(&self, state: TransactionState, transition: Transition) -> Result<TransactionState> {
        state.next(transition).ok_or_else(|| {
            let message = match transition {
                Transition::Begin => "Transaction already in progress",
                Transition::Commit | Transition::Rollback => "No transaction in progress",
            };
            KvError::new(ErrorCode::TransactionError, message)
                .in_operation(COMPONENT, &format!("{}Transaction", transition))
                .with_detail("state", state.to_string())
        })
    }

    fn wrap(&self, operation: &str, message: &str, source: impl std::fmt::Display) -> KvError {
        KvError::wrap(ErrorCode::TransactionError, message, source)
            .in_operation(COMPONENT, operation)
            .with_detail("schema", self.schema_name())
    }
}
