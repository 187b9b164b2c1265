use super::policy::{AppendFsync, PersistenceConfig, PersistencePolicy};
use super::status::PersistenceStatus;
use crate::core::{ErrorCode, KvError, Result};
use crate::interface::KeyValueTransport;
use std::sync::Arc;
use tracing::{Level, event};

const COMPONENT: &str = "PersistenceController";

pub const SAVE_CONFIG: &str = "save";
pub const APPENDONLY_CONFIG: &str = "appendonly";
pub const APPENDFSYNC_CONFIG: &str = "appendfsync";

/// Drives the store's durability mode through its configuration surface.
///
/// Holds no copy of the policy: every read goes back to the store.
pub struct PersistenceController {
    transport: Arc<dyn KeyValueTransport>,
}

impl PersistenceController {
    pub fn new(transport: Arc<dyn KeyValueTransport>) -> Self {
        Self { transport }
    }

    /// Validate `config`, then apply it. Nothing is written if validation fails.
    pub async fn set_persistence(&self, config: &PersistenceConfig) -> Result<()> {
        let policy = config.validate().map_err(|e| e.in_operation(COMPONENT, "setPersistence"))?;
        self.set_policy(&policy).await
    }

    /// Apply an already validated policy.
    ///
    /// Writes go out in a fixed order: snapshot interval, append-only toggle,
    /// then fsync mode. A failure part-way leaves the earlier writes in place.
    pub async fn set_policy(&self, policy: &PersistencePolicy) -> Result<()> {
        let save = match policy {
            // One write within the interval triggers a snapshot.
            PersistencePolicy::Rdb { save_frequency } => format!("{} 1", save_frequency),
            _ => String::new(),
        };
        self.write_config(SAVE_CONFIG, &save).await?;

        let appendonly = match policy {
            PersistencePolicy::Aof { .. } => "yes",
            _ => "no",
        };
        self.write_config(APPENDONLY_CONFIG, appendonly).await?;

        if let PersistencePolicy::Aof { appendfsync } = policy {
            self.write_config(APPENDFSYNC_CONFIG, appendfsync.as_str()).await?;
        }

        event!(Level::INFO, policy = ?policy, "persistence policy applied");
        Ok(())
    }

    /// Rebuild the active policy from live configuration.
    ///
    /// A non-empty snapshot interval wins over the append-only toggle, so a
    /// store with both enabled reports RDB.
    pub async fn get_current_config(&self) -> Result<PersistencePolicy> {
        let save = self.read_config(SAVE_CONFIG).await?.unwrap_or_default();
        let appendonly = self.read_config(APPENDONLY_CONFIG).await?.unwrap_or_default();
        let appendfsync = self.read_config(APPENDFSYNC_CONFIG).await?;

        if !save.trim().is_empty() {
            let save_frequency = parse_save_frequency(&save)?;
            return Ok(PersistencePolicy::Rdb { save_frequency });
        }

        if appendonly.trim().eq_ignore_ascii_case("yes") {
            let appendfsync = match appendfsync.as_deref().map(str::trim) {
                None | Some("") => AppendFsync::Everysec,
                Some(mode) => mode.parse::<AppendFsync>().map_err(|e| {
                    KvError::wrap(
                        ErrorCode::PersistenceConfigError,
                        "Store reports an unknown appendfsync mode",
                        e,
                    )
                    .in_operation(COMPONENT, "getCurrentConfig")
                })?,
            };
            return Ok(PersistencePolicy::Aof { appendfsync });
        }

        Ok(PersistencePolicy::None)
    }

    pub async fn check_persistence_status(&self) -> Result<PersistenceStatus> {
        let info = self.transport.info("persistence").await.map_err(|e| {
            KvError::wrap(
                ErrorCode::PersistenceOperationError,
                "Failed to read persistence status",
                e,
            )
            .in_operation(COMPONENT, "checkPersistenceStatus")
        })?;

        Ok(PersistenceStatus::from_info(&info))
    }

    /// Release the transport. Calling it on a closed transport is a no-op.
    pub async fn disconnect(&self) -> Result<()> {
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

    async fn write_config(&self, name: &str, value: &str) -> Result<()> {
        self.transport.config_set(name, value).await.map_err(|e| {
            event!(Level::ERROR, error = %e, config = name, "persistence config write failed");
            KvError::wrap(
                ErrorCode::PersistenceOperationError,
                format!("Failed to set '{}'", name),
                e,
            )
            .in_operation(COMPONENT, "setPersistence")
            .with_detail("config", name)
            .with_detail("value", value)
        })
    }

    async fn read_config(&self, name: &str) -> Result<Option<String>> {
        self.transport.config_get(name).await.map_err(|e| {
            KvError::wrap(
                ErrorCode::PersistenceOperationError,
                format!("Failed to read '{}'", name),
                e,
            )
            .in_operation(COMPONENT, "getCurrentConfig")
            .with_detail("config", name)
        })
    }
}

/// Leading interval of a `save` value such as `"3600 1 300 100"`
fn parse_save_frequency(save: &str) -> Result<u64> {
    save.split_whitespace()
        .next()
        .and_then(|first| first.parse::<u64>().ok())
        .filter(|seconds| *seconds > 0)
        .ok_or_else(|| {
            KvError::new(
                ErrorCode::PersistenceConfigError,
                format!("Cannot read snapshot interval from '{}'", save),
            )
            .in_operation(COMPONENT, "getCurrentConfig")
        })
}
