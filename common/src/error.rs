//! Error and rejection types for economy operations.

use crate::{Balance, Timestamp};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Infrastructure and programming errors. Business-rule outcomes are
/// [`Rejection`]s and never travel through this type.
#[derive(Error, Debug)]
pub enum EconomyError {
    /// The storage gateway failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// The store lost contact while committing; the write may or may not
    /// have landed.
    #[error("Commit outcome unknown: {0}")]
    CommitUnknown(String),

    /// The balance write and the transaction record diverged.
    #[error("Ledger inconsistency on {account}: {detail}")]
    Inconsistency { account: String, detail: String },

    /// An account actor stopped before answering.
    #[error("Account actor unavailable: {0}")]
    ActorUnavailable(String),

    /// The engine is not accepting requests.
    #[error("Engine not running")]
    NotRunning,

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Serialization failure.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl EconomyError {
    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EconomyError::Storage(_) | EconomyError::ActorUnavailable(_)
        )
    }

    /// Whether the failed operation may have been applied anyway. Callers
    /// must not undo their own bookkeeping on such errors.
    pub fn outcome_unknown(&self) -> bool {
        matches!(self, EconomyError::CommitUnknown(_))
    }

    /// Get error code for replies and logs.
    pub fn error_code(&self) -> &'static str {
        match self {
            EconomyError::Storage(_) => "STORAGE_ERROR",
            EconomyError::CommitUnknown(_) => "COMMIT_OUTCOME_UNKNOWN",
            EconomyError::Inconsistency { .. } => "LEDGER_INCONSISTENCY",
            EconomyError::ActorUnavailable(_) => "ACTOR_UNAVAILABLE",
            EconomyError::NotRunning => "NOT_RUNNING",
            EconomyError::Configuration(_) => "CONFIGURATION_ERROR",
            EconomyError::Serialization(_) => "SERIALIZATION_ERROR",
            EconomyError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Message safe to show a user; never leaks internal detail.
    pub fn user_message(&self) -> &'static str {
        "Something went wrong, please try again later."
    }
}

/// Result type alias for economy operations.
pub type Result<T> = std::result::Result<T, EconomyError>;

/// A game move that is not legal in the current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IllegalAction {
    /// Double on a hand that is not an untouched two-card hand.
    DoubleNotAllowed,
    /// Split on unequal cards, after acting, on a second hand, or twice.
    SplitNotAllowed,
    /// The hand is already finished.
    HandFinished,
    /// Slot line count outside what the tier allows.
    InvalidLineCount,
    /// Replay requested with no previous spin.
    NothingToReplay,
    /// Robbing oneself.
    SelfTarget,
    /// A game of this kind is already running for this key.
    GameInProgress,
}

impl IllegalAction {
    fn message(&self) -> &'static str {
        match self {
            IllegalAction::DoubleNotAllowed => "You can only double on your first two cards.",
            IllegalAction::SplitNotAllowed => "You can only split a matching pair once, before acting.",
            IllegalAction::HandFinished => "That hand is already finished.",
            IllegalAction::InvalidLineCount => "That number of lines is not allowed for this bet.",
            IllegalAction::NothingToReplay => "You have no previous spin to repeat.",
            IllegalAction::SelfTarget => "You cannot target yourself.",
            IllegalAction::GameInProgress => "Finish your current game first.",
        }
    }
}

/// Business-rule rejection. Returned as a value; no state was changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Rejection {
    /// The debit would take the balance below zero.
    InsufficientFunds { required: Balance, available: Balance },
    /// Amount is zero or too large.
    InvalidAmount,
    /// No game in progress for this key.
    SessionNotFound,
    /// The game timed out and was discarded.
    SessionExpired,
    /// Someone other than the owner tried to act.
    SessionNotOwned,
    /// The move is not legal now.
    IllegalAction { action: IllegalAction },
    /// A periodic claim or robbery is still cooling down.
    OnCooldown { ready_at: Timestamp },
    /// The robbable flag cannot be changed yet.
    ToggleLocked { until: Timestamp },
    /// Robber or target has not opted in to robbery.
    NotRobbable,
}

impl Rejection {
    /// Stable code for this rejection.
    pub fn code(&self) -> &'static str {
        match self {
            Rejection::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            Rejection::InvalidAmount => "INVALID_AMOUNT",
            Rejection::SessionNotFound => "SESSION_NOT_FOUND",
            Rejection::SessionExpired => "SESSION_EXPIRED",
            Rejection::SessionNotOwned => "SESSION_NOT_OWNED",
            Rejection::IllegalAction { .. } => "ILLEGAL_ACTION",
            Rejection::OnCooldown { .. } => "ON_COOLDOWN",
            Rejection::ToggleLocked { .. } => "TOGGLE_LOCKED",
            Rejection::NotRobbable => "NOT_ROBBABLE",
        }
    }

    /// User-facing explanation.
    pub fn message(&self) -> String {
        match self {
            Rejection::InsufficientFunds { required, available } => {
                format!("Insufficient funds: need {required}, have {available}.")
            }
            Rejection::InvalidAmount => "Amount must be a positive number.".to_string(),
            Rejection::SessionNotFound => "No game in progress, start a new one.".to_string(),
            Rejection::SessionExpired => "That game expired, start a new one.".to_string(),
            Rejection::SessionNotOwned => "This game belongs to someone else.".to_string(),
            Rejection::IllegalAction { action } => action.message().to_string(),
            Rejection::OnCooldown { ready_at } => format!("Try again after {ready_at}."),
            Rejection::ToggleLocked { until } => format!("You can change this after {until}."),
            Rejection::NotRobbable => "Both players must be open to robbery.".to_string(),
        }
    }
}

impl From<IllegalAction> for Rejection {
    fn from(action: IllegalAction) -> Self {
        Rejection::IllegalAction { action }
    }
}
