// ============================================================================
// kvwarden Library
// ============================================================================

pub mod core;
pub mod connection;
pub mod interface;
pub mod storage;
pub mod repository;
pub mod transaction;
pub mod persistence;

// Re-export main types for convenience
pub use crate::core::{Entity, ErrorCode, ErrorReport, KvError, Result};
pub use crate::connection::ConnectionConfig;
pub use crate::interface::{BatchReply, EntityRepository, KeyValueTransport, TransportError, TransportResult};
pub use crate::storage::{InMemoryTransport, StatusCounters};
pub use crate::repository::JsonRepository;
pub use crate::transaction::{TransactionManager, TransactionState};
pub use crate::persistence::{
    AppendFsync, PersistenceConfig, PersistenceController, PersistencePolicy, PersistenceStatus,
    PersistenceType,
};

use std::sync::Arc;

// ============================================================================
// High-level Client API
// ============================================================================

/// Both managers bound to one transport and one repository
///
/// # Examples
///
/// ```
/// use kvwarden::{Client, Entity, PersistenceConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let client = Client::in_memory("orders");
///
/// let saved = client.transactions().save(Entity::new().with_field("total", 10)).await?;
/// assert_eq!(saved.version(), 1);
///
/// client.persistence().set_persistence(&PersistenceConfig::rdb(3600)).await?;
/// client.disconnect().await?;
/// # Ok(())
/// # }
/// ```
pub struct Client {
    transport: Arc<dyn KeyValueTransport>,
    transactions: TransactionManager,
    persistence: PersistenceController,
}

impl Client {
    /// Bind to an already connected transport
    pub fn new(transport: Arc<dyn KeyValueTransport>, repository: Arc<dyn EntityRepository>) -> Self {
        Self {
            transactions: TransactionManager::new(transport.clone(), repository),
            persistence: PersistenceController::new(transport.clone()),
            transport,
        }
    }

    /// Client over a fresh in-memory transport with a JSON repository
    pub fn in_memory(schema_name: &str) -> Self {
        let transport: Arc<dyn KeyValueTransport> = Arc::new(InMemoryTransport::new());
        let repository = Arc::new(JsonRepository::new(transport.clone(), schema_name));
        Self::new(transport, repository)
    }

    pub fn transactions(&self) -> &TransactionManager {
        &self.transactions
    }

    pub fn persistence(&self) -> &PersistenceController {
        &self.persistence
    }

    pub fn transport(&self) -> &Arc<dyn KeyValueTransport> {
        &self.transport
    }

    /// Rolls back any open envelope and releases the shared transport
    pub async fn disconnect(&self) -> Result<()> {
        self.transactions.disconnect().await?;
        self.persistence.disconnect().await
    }
}
