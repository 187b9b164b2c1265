use crate::core::{ErrorCode, KvError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Durability mode of the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PersistenceType {
    None,
    Rdb,
    Aof,
}

/// fsync cadence of the append-only log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppendFsync {
    Always,
    Everysec,
    No,
}

impl AppendFsync {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppendFsync::Always => "always",
            AppendFsync::Everysec => "everysec",
            AppendFsync::No => "no",
        }
    }
}

impl fmt::Display for AppendFsync {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppendFsync {
    type Err = KvError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "always" => Ok(AppendFsync::Always),
            "everysec" => Ok(AppendFsync::Everysec),
            "no" => Ok(AppendFsync::No),
            other => Err(KvError::invalid_config(format!("Unknown appendfsync mode '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RdbOptions {
    /// Snapshot interval in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub save_frequency: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AofOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub appendfsync: Option<AppendFsync>,
}

/// Declarative durability configuration as supplied by callers.
///
/// JSON shape:
/// `{ "type": "NONE"|"RDB"|"AOF", "rdbOptions"?: { "saveFrequency": n }, "aofOptions"?: { "appendfsync": "always"|"everysec"|"no" } }`
///
/// A document may be incomplete; [`PersistenceConfig::validate`] turns it
/// into a [`PersistencePolicy`] or fails with `INVALID_CONFIG`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistenceConfig {
    #[serde(rename = "type")]
    pub kind: PersistenceType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rdb_options: Option<RdbOptions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aof_options: Option<AofOptions>,
}

impl PersistenceConfig {
    /// A document of the given kind with no options attached
    pub fn of_type(kind: PersistenceType) -> Self {
        Self {
            kind,
            rdb_options: None,
            aof_options: None,
        }
    }

    pub fn none() -> Self {
        Self::of_type(PersistenceType::None)
    }

    pub fn rdb(save_frequency: u64) -> Self {
        Self {
            rdb_options: Some(RdbOptions {
                save_frequency: Some(save_frequency),
            }),
            ..Self::of_type(PersistenceType::Rdb)
        }
    }

    pub fn aof(appendfsync: AppendFsync) -> Self {
        Self {
            aof_options: Some(AofOptions {
                appendfsync: Some(appendfsync),
            }),
            ..Self::of_type(PersistenceType::Aof)
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| {
            KvError::wrap(ErrorCode::InvalidConfig, "Invalid persistence configuration", e)
        })
    }

    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = tokio::fs::read_to_string(path).await.map_err(|e| {
            KvError::wrap(ErrorCode::InvalidConfig, "Cannot read persistence configuration", e)
                .with_detail("path", path.display().to_string())
        })?;
        Self::from_json(&json)
    }

    /// Check the document and produce the policy it describes.
    ///
    /// Options that do not belong to the selected kind are ignored.
    pub fn validate(&self) -> Result<PersistencePolicy> {
        match self.kind {
            PersistenceType::None => Ok(PersistencePolicy::None),
            PersistenceType::Rdb => {
                let save_frequency = self
                    .rdb_options
                    .as_ref()
                    .and_then(|o| o.save_frequency)
                    .ok_or_else(|| {
                        KvError::invalid_config("RDB persistence requires rdbOptions.saveFrequency")
                    })?;
                if save_frequency == 0 {
                    return Err(KvError::invalid_config("rdbOptions.saveFrequency must be positive")
                        .with_detail("saveFrequency", save_frequency));
                }
                Ok(PersistencePolicy::Rdb { save_frequency })
            }
            PersistenceType::Aof => {
                let appendfsync = self
                    .aof_options
                    .as_ref()
                    .and_then(|o| o.appendfsync)
                    .ok_or_else(|| {
                        KvError::invalid_config("AOF persistence requires aofOptions.appendfsync")
                    })?;
                Ok(PersistencePolicy::Aof { appendfsync })
            }
        }
    }
}

/// A validated durability policy. Each variant carries exactly its options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "PersistenceConfig", try_from = "PersistenceConfig")]
pub enum PersistencePolicy {
    None,
    Rdb { save_frequency: u64 },
    Aof { appendfsync: AppendFsync },
}

impl PersistencePolicy {
    pub fn kind(&self) -> PersistenceType {
        match self {
            PersistencePolicy::None => PersistenceType::None,
            PersistencePolicy::Rdb { .. } => PersistenceType::Rdb,
            PersistencePolicy::Aof { .. } => PersistenceType::Aof,
        }
    }

    pub fn to_config(&self) -> PersistenceConfig {
        match *self {
            PersistencePolicy::None => PersistenceConfig::none(),
            PersistencePolicy::Rdb { save_frequency } => PersistenceConfig::rdb(save_frequency),
            PersistencePolicy::Aof { appendfsync } => PersistenceConfig::aof(appendfsync),
        }
    }
}

impl From<PersistencePolicy> for PersistenceConfig {
    fn from(policy: PersistencePolicy) -> Self {
        policy.to_config()
    }
}

impl TryFrom<PersistenceConfig> for PersistencePolicy {
    type Error = KvError;

    fn try_from(config: PersistenceConfig) -> Result<Self> {
        config.validate()
    }
}
