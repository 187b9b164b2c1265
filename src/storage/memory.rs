use super::pattern::glob_match;
use crate::connection::ConnectionConfig;
use crate::interface::{BatchReply, KeyValueTransport, TransportError, TransportResult};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use tokio::sync::RwLock;

/// Store defaults mirrored from a stock Redis configuration.
const DEFAULT_CONFIG: [(&str, &str); 3] = [
    ("save", "3600 1 300 100 60 10000"),
    ("appendonly", "no"),
    ("appendfsync", "everysec"),
];

#[derive(Debug, Clone)]
enum QueuedCommand {
    Set(String, String),
    Delete(Vec<String>),
}

/// Counters rendered by `INFO persistence`.
#[derive(Debug, Clone, Default)]
pub struct StatusCounters {
    pub rdb_bgsave_in_progress: bool,
    pub rdb_last_save_time: i64,
    pub aof_rewrite_in_progress: bool,
    pub aof_last_rewrite_time_sec: i64,
}

#[derive(Debug, Default)]
struct State {
    open: bool,
    data: BTreeMap<String, String>,
    config: HashMap<String, String>,
    batch: Option<Vec<QueuedCommand>>,
    status: StatusCounters,
    faults: HashSet<String>,
    /// Keys that survive `delete`, to emulate a concurrent writer.
    sticky: HashSet<String>,
}

impl State {
    fn check(&self, command: &str) -> TransportResult<()> {
        if !self.open {
            return Err(TransportError::Closed);
        }
        self.fault(command)
    }

    fn fault(&self, command: &str) -> TransportResult<()> {
        if self.faults.contains(command) {
            return Err(TransportError::Command(format!("injected failure on '{}'", command)));
        }
        Ok(())
    }

    fn apply_delete(&mut self, keys: &[String]) -> u64 {
        let mut removed = 0;
        for key in keys {
            if self.sticky.contains(key) {
                if self.data.contains_key(key) {
                    removed += 1;
                }
                continue;
            }
            if self.data.remove(key).is_some() {
                removed += 1;
            }
        }
        removed
    }
}

/// In-process key-value transport.
///
/// Behaves like a single Redis connection: string values, glob key scans,
/// a `CONFIG` table, an `INFO persistence` section and MULTI-style batching.
/// While a batch is open, `set` and `delete` are queued until
/// `execute_batch`; reads are served immediately.
pub struct InMemoryTransport {
    state: RwLock<State>,
    db: u32,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        let config = DEFAULT_CONFIG
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        Self {
            state: RwLock::new(State {
                open: true,
                config,
                ..State::default()
            }),
            db: 0,
        }
    }

    /// Build an open transport for an already validated configuration
    pub fn from_config(config: &ConnectionConfig) -> Self {
        let mut transport = Self::new();
        transport.db = config.db.unwrap_or(0);
        transport
    }

    pub fn db(&self) -> u32 {
        self.db
    }

    /// Make the named command fail until `clear_faults` is called
    pub async fn fail_on(&self, command: &str) {
        self.state.write().await.faults.insert(command.to_string());
    }

    pub async fn clear_faults(&self) {
        self.state.write().await.faults.clear();
    }

    /// Keep `key` alive across deletes
    pub async fn make_sticky(&self, key: &str) {
        self.state.write().await.sticky.insert(key.to_string());
    }

    pub async fn set_status(&self, status: StatusCounters) {
        self.state.write().await.status = status;
    }

    pub async fn in_batch(&self) -> bool {
        self.state.read().await.batch.is_some()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.data.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for InMemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyValueTransport for InMemoryTransport {
    async fn get(&self, key: &str) -> TransportResult<Option<String>> {
        let state = self.state.read().await;
        state.check("get")?;
        Ok(state.data.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> TransportResult<()> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        state.check("set")?;
        match state.batch.as_mut() {
            Some(queue) => queue.push(QueuedCommand::Set(key.to_string(), value.to_string())),
            None => {
                state.data.insert(key.to_string(), value.to_string());
            }
        }
        Ok(())
    }

    async fn keys(&self, pattern: &str) -> TransportResult<Vec<String>> {
        let state = self.state.read().await;
        state.check("keys")?;
        let mut matched = Vec::new();
        for key in state.data.keys() {
            if glob_match(key, pattern)? {
                matched.push(key.clone());
            }
        }
        Ok(matched)
    }

    async fn delete(&self, keys: &[String]) -> TransportResult<u64> {
        let mut state = self.state.write().await;
        state.check("delete")?;
        if let Some(queue) = state.batch.as_mut() {
            queue.push(QueuedCommand::Delete(keys.to_vec()));
            return Ok(0);
        }
        Ok(state.apply_delete(keys))
    }

    async fn config_get(&self, name: &str) -> TransportResult<Option<String>> {
        let state = self.state.read().await;
        state.check("config_get")?;
        Ok(state.config.get(name).cloned())
    }

    async fn config_set(&self, name: &str, value: &str) -> TransportResult<()> {
        let mut state = self.state.write().await;
        state.check("config_set")?;
        if name == "appendonly" && !matches!(value, "yes" | "no") {
            return Err(TransportError::Command(format!(
                "argument must be 'yes' or 'no', got '{}'",
                value
            )));
        }
        if name == "appendfsync" && !matches!(value, "always" | "everysec" | "no") {
            return Err(TransportError::Command(format!("invalid appendfsync '{}'", value)));
        }
        state.config.insert(name.to_string(), value.to_string());
        Ok(())
    }

    async fn info(&self, section: &str) -> TransportResult<String> {
        let state = self.state.read().await;
        state.check("info")?;
        if !matches!(section.to_ascii_lowercase().as_str(), "persistence" | "all" | "") {
            return Ok(String::new());
        }

        let status = &state.status;
        let aof_enabled = state.config.get("appendonly").map(String::as_str) == Some("yes");
        Ok(format!(
            "# Persistence\r\n\
             loading:0\r\n\
             rdb_bgsave_in_progress:{}\r\n\
             rdb_last_save_time:{}\r\n\
             aof_enabled:{}\r\n\
             aof_rewrite_in_progress:{}\r\n\
             aof_last_rewrite_time_sec:{}\r\n",
            status.rdb_bgsave_in_progress as u8,
            status.rdb_last_save_time,
            aof_enabled as u8,
            status.aof_rewrite_in_progress as u8,
            status.aof_last_rewrite_time_sec,
        ))
    }

    async fn begin_batch(&self) -> TransportResult<()> {
        let mut state = self.state.write().await;
        state.check("begin_batch")?;
        if state.batch.is_some() {
            return Err(TransportError::Command("MULTI calls can not be nested".into()));
        }
        state.batch = Some(Vec::new());
        Ok(())
    }

    async fn execute_batch(&self) -> TransportResult<Vec<BatchReply>> {
        let mut state = self.state.write().await;
        state.check("execute_batch")?;
        let queue = state
            .batch
            .take()
            .ok_or_else(|| TransportError::Command("EXEC without MULTI".into()))?;

        let mut replies = Vec::with_capacity(queue.len());
        for command in queue {
            match command {
                QueuedCommand::Set(key, value) => {
                    state.data.insert(key, value);
                    replies.push(BatchReply::Ok);
                }
                QueuedCommand::Delete(keys) => {
                    let removed = state.apply_delete(&keys);
                    replies.push(BatchReply::Integer(removed as i64));
                }
            }
        }
        Ok(replies)
    }

    async fn discard_batch(&self) -> TransportResult<()> {
        let mut state = self.state.write().await;
        state.check("discard_batch")?;
        state
            .batch
            .take()
            .map(|_| ())
            .ok_or_else(|| TransportError::Command("DISCARD without MULTI".into()))
    }

    async fn is_open(&self) -> bool {
        self.state.read().await.open
    }

    async fn connect(&self) -> TransportResult<()> {
        let mut state = self.state.write().await;
        state.fault("connect")?;
        state.open = true;
        Ok(())
    }

    async fn close(&self) -> TransportResult<()> {
        let mut state = self.state.write().await;
        state.fault("close").map_err(|e| TransportError::Connection(e.to_string()))?;
        state.open = false;
        state.batch = None;
        Ok(())
    }
}
