pub mod entity;
pub mod error;

pub use entity::Entity;
pub use error::{ErrorCode, ErrorReport, KvError, Result};
