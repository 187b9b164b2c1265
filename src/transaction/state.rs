// ============================================================================
// Transaction Envelope State
// ============================================================================
//
// One envelope per manager instance. The transport's atomic batch is either
// open (Active) or not (Idle); there is no nesting.
//
// ============================================================================

use std::fmt;

/// Envelope state
///
/// State transitions:
/// ```text
/// Idle ──begin──> Active
///                   │
///   Idle <──commit / rollback──┘
/// ```
/// `begin` from `Active` and `commit`/`rollback` from `Idle` are invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransactionState {
    #[default]
    Idle,
    Active,
}

/// Envelope transitions, used for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Begin,
    Commit,
    Rollback,
}

impl TransactionState {
    pub fn is_active(&self) -> bool {
        matches!(self, TransactionState::Active)
    }

    /// State reached by `transition`, or `None` if it is not allowed from here
    pub fn next(self, transition: Transition) -> Option<TransactionState> {
        match (self, transition) {
            (TransactionState::Idle, Transition::Begin) => Some(TransactionState::Active),
            (TransactionState::Active, Transition::Commit | Transition::Rollback) => {
                Some(TransactionState::Idle)
            }
            _ => None,
        }
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionState::Idle => write!(f, "IDLE"),
            TransactionState::Active => write!(f, "ACTIVE"),
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transition::Begin => write!(f, "begin"),
            Transition::Commit => write!(f, "commit"),
            Transition::Rollback => write!(f, "rollback"),
        }
    }
}
