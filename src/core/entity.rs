use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// A versioned record: free-form named fields plus housekeeping metadata.
///
/// `entity_id` is assigned by the repository on first save. `version` and
/// `last_updated` are owned by the transaction manager and re-derived on
/// every save; callers only touch `fields`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    /// Zero means "never saved".
    #[serde(default)]
    pub version: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub fields: Map<String, JsonValue>,
}

impl Entity {
    /// JSON names of the housekeeping fields; user fields may not reuse them.
    pub const RESERVED_FIELDS: [&'static str; 3] = ["entityId", "version", "lastUpdated"];

    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(mut self, name: &str, value: impl Into<JsonValue>) -> Self {
        self.set_field(name, value);
        self
    }

    pub fn set_field(&mut self, name: &str, value: impl Into<JsonValue>) {
        self.fields.insert(name.to_string(), value.into());
    }

    pub fn field(&self, name: &str) -> Option<&JsonValue> {
        self.fields.get(name)
    }

    /// User fields that would collide with housekeeping fields once flattened
    pub fn reserved_fields(&self) -> Vec<&str> {
        Self::RESERVED_FIELDS
            .into_iter()
            .filter(|name| self.fields.contains_key(*name))
            .collect()
    }

    pub fn entity_id(&self) -> Option<&str> {
        self.entity_id.as_deref()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.last_updated
    }

    /// Bumps the version and stamps the save time.
    pub(crate) fn stamp(&mut self, now: DateTime<Utc>) {
        self.version = self.version.saturating_add(1);
        self.last_updated = Some(now);
    }
}
