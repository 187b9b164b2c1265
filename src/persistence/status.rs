use serde::{Deserialize, Serialize};

/// Live persistence activity as reported by `INFO persistence`.
///
/// Fields missing from the report keep their zero value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistenceStatus {
    pub rdb_save_in_progress: bool,
    pub aof_rewrite_in_progress: bool,
    /// Unix seconds of the last successful snapshot
    pub last_rdb_save_time: i64,
    pub last_aof_rewrite_time: i64,
}

impl PersistenceStatus {
    /// Parse a `key:value` report, ignoring section headers and unknown keys
    pub fn from_info(info: &str) -> Self {
        let mut status = Self::default();

        for line in info.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();

            match key.trim() {
                "rdb_bgsave_in_progress" => status.rdb_save_in_progress = value == "1",
                "aof_rewrite_in_progress" => status.aof_rewrite_in_progress = value == "1",
                "rdb_last_save_time" => status.last_rdb_save_time = value.parse().unwrap_or(0),
                "aof_last_rewrite_time_sec" => {
                    status.last_aof_rewrite_time = value.parse().unwrap_or(0)
                }
                _ => {}
            }
        }

        status
    }
}
