//! Durability policy control
//!
//! - `policy`: the declarative document callers send and the validated policy
//! - `status`: parsed `INFO persistence` activity
//! - `controller`: validate-then-apply and live reconstruction

pub mod controller;
pub mod policy;
pub mod status;

pub use controller::PersistenceController;
pub use policy::{
    AofOptions, AppendFsync, PersistenceConfig, PersistencePolicy, PersistenceType, RdbOptions,
};
pub use status::PersistenceStatus;
