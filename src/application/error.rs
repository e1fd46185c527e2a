use thiserror::Error;

use crate::domain::{ApprovalStatus, Cents, EntityId, EntityKind, ValidationError};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid input: {0}")]
    Validation(#[from] ValidationError),

    #[error("Cannot move {kind} {id} from {from} to {to}")]
    InvalidTransition {
        kind: EntityKind,
        id: EntityId,
        from: ApprovalStatus,
        to: ApprovalStatus,
    },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Insufficient funds for wholesaler {id}: balance {balance}, requested change {delta}")]
    InsufficientFunds {
        id: EntityId,
        balance: Cents,
        delta: Cents,
    },

    #[error("Database error: {0}")]
    Database(#[from] anyhow::Error),
}

impl AppError {
    /// Conflicts may succeed after re-reading current state. Everything else
    /// is final for the request that produced it.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::Conflict(_))
    }
}
