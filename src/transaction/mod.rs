// ============================================================================
// Transaction Management Module
// ============================================================================
//
// Versioned entity lifecycle over a repository, with verified deletes, and an
// explicit begin/commit/rollback envelope over the transport's atomic batch.
//
// ============================================================================

pub mod manager;
pub mod state;

pub use manager::TransactionManager;
pub use state::{TransactionState, Transition};
