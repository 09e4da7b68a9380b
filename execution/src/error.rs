use sabong_types::{CashStatus, Phase, RequestId};
use thiserror::Error;

use crate::state::StoreError;

/// Every way an arena command can be refused.
///
/// A refused command leaves the arena untouched.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ArenaError {
    #[error("{command} is not allowed while the fight is {phase}")]
    InvalidTransition { command: &'static str, phase: Phase },
    #[error("insufficient credits: balance {balance}, requested {requested}")]
    InsufficientCredits { balance: u64, requested: u64 },
    #[error("request {request_id} was already {status}")]
    AlreadyProcessed {
        request_id: RequestId,
        status: CashStatus,
    },
    #[error("fight {fight} is already settled")]
    AlreadySettled { fight: u64 },
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("settlement of fight {fight} blocked after {attempts} attempts: {reason}")]
    SettlementBlocked {
        fight: u64,
        attempts: u32,
        reason: String,
    },
    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl ArenaError {
    /// Stable machine-readable code sent to clients.
    pub fn code(&self) -> &'static str {
        match self {
            ArenaError::InvalidTransition { .. } => "INVALID_TRANSITION",
            ArenaError::InsufficientCredits { .. } => "INSUFFICIENT_CREDITS",
            ArenaError::AlreadyProcessed { .. } => "ALREADY_PROCESSED",
            ArenaError::AlreadySettled { .. } => "ALREADY_SETTLED",
            ArenaError::NotFound(_) => "NOT_FOUND",
            ArenaError::Validation(_) => "VALIDATION_ERROR",
            ArenaError::Forbidden(_) => "FORBIDDEN",
            ArenaError::SettlementBlocked { .. } => "SETTLEMENT_BLOCKED",
            ArenaError::Storage(_) => "STORAGE_ERROR",
        }
    }

    pub(crate) fn not_found(what: &str, id: impl std::fmt::Display) -> Self {
        ArenaError::NotFound(format!("{what} {id}"))
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        ArenaError::Validation(message.into())
    }
}

pub type Result<T> = std::result::Result<T, ArenaError>;
