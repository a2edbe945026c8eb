//! Error types for RIPPLE operations

use crate::counters::CounterField;
use crate::events::FeedOp;
use crate::ids::EntityKind;
use thiserror::Error;
use uuid::Uuid;

/// Identity gate errors. Both variants surface BEFORE any optimistic write,
/// so there is never anything to roll back for them.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IdentityError {
    #[error("Local identity is not resolved yet")]
    NotReady,

    #[error("Actor '{alias}' has read-only access")]
    ReadOnly { alias: String },
}

/// Transport layer errors. `Network` and `Rejected` reach the caller only
/// after the coordinator has rolled the optimistic write back.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("Network failure during {op}: {message}")]
    Network { op: FeedOp, message: String },

    #[error("Server rejected {op} ({code}): {message}")]
    Rejected {
        op: FeedOp,
        code: String,
        message: String,
    },

    #[error("Unauthorized during {op}: {message}")]
    Unauthorized { op: FeedOp, message: String },

    #[error("Failed to decode server payload: {message}")]
    Decode { message: String },
}

/// Local mutation errors raised before a mutation touches any state.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MutationError {
    #[error("Another write is in flight for {kind} {id}")]
    WriteInFlight { kind: EntityKind, id: Uuid },

    #[error("{kind} {id} is not in the local store")]
    MissingTarget { kind: EntityKind, id: Uuid },

    #[error("Counter field '{field}' does not apply to {kind}")]
    CounterMismatch {
        kind: EntityKind,
        field: CounterField,
    },

    #[error("Engine state lock poisoned")]
    LockPoisoned,
}

/// Master error type for all RIPPLE operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SyncError {
    #[error("Identity error: {0}")]
    Identity(#[from] IdentityError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Mutation error: {0}")]
    Mutation(#[from] MutationError),
}

impl SyncError {
    /// The mutation was refused because the local identity has not resolved.
    pub fn is_identity_not_ready(&self) -> bool {
        matches!(self, SyncError::Identity(IdentityError::NotReady))
    }

    /// The actor may not write (locally known or server-declared).
    pub fn is_auth_required(&self) -> bool {
        matches!(self, SyncError::Identity(IdentityError::ReadOnly { .. }))
            || matches!(
                self,
                SyncError::Transport(TransportError::Unauthorized { .. })
            )
    }

    /// Transient transport failure; the mutation was rolled back and can be
    /// re-proposed as-is.
    pub fn is_network_failure(&self) -> bool {
        matches!(self, SyncError::Transport(TransportError::Network { .. }))
    }

    /// The server rejected the mutation (validation, version conflict);
    /// rolled back, re-proposing the same payload will fail again.
    pub fn is_conflict(&self) -> bool {
        matches!(self, SyncError::Transport(TransportError::Rejected { .. }))
    }
}

/// Result type alias for RIPPLE operations.
pub type SyncResult<T> = Result<T, SyncError>;

// =============================================================================
// TESTS
// =============================================================================
