use crate::core::{Entity, Result};
use async_trait::async_trait;
use thiserror::Error;

/// Failure reported by a transport implementation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Command error: {0}")]
    Command(String),

    #[error("Connection is closed")]
    Closed,
}

impl TransportError {
    pub fn is_connection(&self) -> bool {
        matches!(self, TransportError::Connection(_) | TransportError::Closed)
    }
}

pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Reply to one command queued inside an atomic batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchReply {
    Ok,
    Integer(i64),
    Error(String),
}

/// Command-level capability of a key-value store.
///
/// Implementations are expected to be connected before they are handed to
/// the managers; the crate never bootstraps connections itself. You can use
/// `InMemoryTransport` for tests, or wrap a real client (a Redis connection,
/// for instance) to implement this trait for production use.
#[async_trait]
pub trait KeyValueTransport: Send + Sync {
    async fn get(&self, key: &str) -> TransportResult<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> TransportResult<()>;

    /// Glob-style key enumeration (`*`, `?`, `\` escapes).
    async fn keys(&self, pattern: &str) -> TransportResult<Vec<String>>;

    /// Deletes the given keys, returning how many existed.
    async fn delete(&self, keys: &[String]) -> TransportResult<u64>;

    async fn config_get(&self, name: &str) -> TransportResult<Option<String>>;

    async fn config_set(&self, name: &str, value: &str) -> TransportResult<()>;

    /// Text blob of `key:value` lines for the given section.
    async fn info(&self, section: &str) -> TransportResult<String>;

    async fn begin_batch(&self) -> TransportResult<()>;

    async fn execute_batch(&self) -> TransportResult<Vec<BatchReply>>;

    async fn discard_batch(&self) -> TransportResult<()>;

    async fn is_open(&self) -> bool;

    async fn connect(&self) -> TransportResult<()>;

    async fn close(&self) -> TransportResult<()>;
}

/// Maps records to store keys and back.
///
/// The id of a saved record is returned explicitly in `Entity::entity_id`.
#[async_trait]
pub trait EntityRepository: Send + Sync {
    /// Key namespace used for `<schema>:<id>` keys.
    fn schema_name(&self) -> &str;

    async fn save(&self, entity: Entity) -> Result<Entity>;

    async fn fetch(&self, entity_id: &str) -> Result<Option<Entity>>;

    async fn remove(&self, entity_id: &str) -> Result<()>;
}
