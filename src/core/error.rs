use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::fmt;
use thiserror::Error;

/// Closed set of failure kinds raised by every public operation.
///
/// The string form (`as_str`) is stable and is what ends up in reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    RedisConnectionError,
    RedisOperationError,
    PersistenceConfigError,
    PersistenceOperationError,
    TransactionError,
    TransactionCommitError,
    TransactionRollbackError,
    EntityNotFound,
    InvalidConfig,
    ValidationError,
    SystemError,
    UnexpectedError,
}

impl ErrorCode {
    pub const ALL: [ErrorCode; 12] = [
        ErrorCode::RedisConnectionError,
        ErrorCode::RedisOperationError,
        ErrorCode::PersistenceConfigError,
        ErrorCode::PersistenceOperationError,
        ErrorCode::TransactionError,
        ErrorCode::TransactionCommitError,
        ErrorCode::TransactionRollbackError,
        ErrorCode::EntityNotFound,
        ErrorCode::InvalidConfig,
        ErrorCode::ValidationError,
        ErrorCode::SystemError,
        ErrorCode::UnexpectedError,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::RedisConnectionError => "REDIS_CONNECTION_ERROR",
            ErrorCode::RedisOperationError => "REDIS_OPERATION_ERROR",
            ErrorCode::PersistenceConfigError => "PERSISTENCE_CONFIG_ERROR",
            ErrorCode::PersistenceOperationError => "PERSISTENCE_OPERATION_ERROR",
            ErrorCode::TransactionError => "TRANSACTION_ERROR",
            ErrorCode::TransactionCommitError => "TRANSACTION_COMMIT_ERROR",
            ErrorCode::TransactionRollbackError => "TRANSACTION_ROLLBACK_ERROR",
            ErrorCode::EntityNotFound => "ENTITY_NOT_FOUND",
            ErrorCode::InvalidConfig => "INVALID_CONFIG",
            ErrorCode::ValidationError => "VALIDATION_ERROR",
            ErrorCode::SystemError => "SYSTEM_ERROR",
            ErrorCode::UnexpectedError => "UNEXPECTED_ERROR",
        }
    }

    /// HTTP-style status class used when reporting the failure.
    pub fn status(&self) -> u16 {
        match self {
            ErrorCode::EntityNotFound => 404,
            ErrorCode::InvalidConfig | ErrorCode::ValidationError => 400,
            _ => 500,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The single error type of the crate.
///
/// Dispatch happens on `code`; `details` carries the operation context
/// (component, operation, identifiers, underlying cause) as a JSON object.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("[{code}] {message}")]
pub struct KvError {
    code: ErrorCode,
    message: String,
    details: Map<String, JsonValue>,
}

impl KvError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: Map::new(),
        }
    }

    /// Wraps an underlying failure, keeping its message under `details.cause`.
    pub fn wrap(code: ErrorCode, message: impl Into<String>, source: impl fmt::Display) -> Self {
        Self::new(code, message).with_detail("cause", source.to_string())
    }

    pub fn with_detail(mut self, key: &str, value: impl Into<JsonValue>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }

    /// Attaches the component/operation pair that raised the error.
    pub fn in_operation(self, component: &str, operation: &str) -> Self {
        self.with_detail("component", component)
            .with_detail("operation", operation)
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn status(&self) -> u16 {
        self.code.status()
    }

    pub fn details(&self) -> &Map<String, JsonValue> {
        &self.details
    }

    pub fn detail(&self, key: &str) -> Option<&JsonValue> {
        self.details.get(key)
    }

    pub fn is(&self, code: ErrorCode) -> bool {
        self.code == code
    }

    pub fn report(&self) -> ErrorReport {
        ErrorReport {
            code: self.code,
            message: self.message.clone(),
            status: self.status(),
            details: JsonValue::Object(self.details.clone()),
        }
    }

    pub(crate) fn invalid_config(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidConfig, message)
    }

    pub(crate) fn entity_not_found(schema: &str, entity_id: &str) -> Self {
        Self::new(
            ErrorCode::EntityNotFound,
            format!("Entity '{}' not found in '{}'", entity_id, schema),
        )
        .with_detail("schema", schema)
        .with_detail("entityId", entity_id)
    }
}

/// Serializable view of a `KvError`, suitable for API responses and logs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorReport {
    pub code: ErrorCode,
    pub message: String,
    pub status: u16,
    pub details: JsonValue,
}

pub type Result<T> = std::result::Result<T, KvError>;

impl From<serde_json::Error> for KvError {
    fn from(err: serde_json::Error) -> Self {
        Self::wrap(ErrorCode::ValidationError, "Invalid JSON payload", err)
    }
}
