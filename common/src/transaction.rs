//! Transaction log records.

use crate::{AccountRef, Balance, ExternalEventId, SignedAmount, Timestamp, TransactionId, UserId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Category tag attached to every balance change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransactionCategory {
    /// Daily claim.
    Daily,
    /// Weekly claim.
    Weekly,
    /// Administrative credit.
    AdminGrant,
    /// Administrative debit.
    AdminTake,
    /// Automated payout for an external event.
    ExternalAward,
    /// Stake charged for a game.
    Wager,
    /// Winnings (or returned stake) from a game.
    Payout,
    /// Amount taken from a robbery victim.
    RobberyLoss,
    /// Amount gained by a successful robber.
    RobberyGain,
    /// Fine paid by a failed robber.
    RobberyFine,
}

impl TransactionCategory {
    /// Stable tag stored in the transaction log.
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionCategory::Daily => "daily",
            TransactionCategory::Weekly => "weekly",
            TransactionCategory::AdminGrant => "admin-grant",
            TransactionCategory::AdminTake => "admin-take",
            TransactionCategory::ExternalAward => "external-award",
            TransactionCategory::Wager => "wager",
            TransactionCategory::Payout => "payout",
            TransactionCategory::RobberyLoss => "robbery-loss",
            TransactionCategory::RobberyGain => "robbery-gain",
            TransactionCategory::RobberyFine => "robbery-fine",
        }
    }

    /// Parse a stored tag.
    pub fn parse(tag: &str) -> Option<Self> {
        let category = match tag {
            "daily" => TransactionCategory::Daily,
            "weekly" => TransactionCategory::Weekly,
            "admin-grant" => TransactionCategory::AdminGrant,
            "admin-take" => TransactionCategory::AdminTake,
            "external-award" => TransactionCategory::ExternalAward,
            "wager" => TransactionCategory::Wager,
            "payout" => TransactionCategory::Payout,
            "robbery-loss" => TransactionCategory::RobberyLoss,
            "robbery-gain" => TransactionCategory::RobberyGain,
            "robbery-fine" => TransactionCategory::RobberyFine,
            _ => return None,
        };
        Some(category)
    }
}

impl fmt::Display for TransactionCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who initiated a balance change.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Initiator {
    /// A platform user (the player or an administrator).
    User(UserId),
    /// The engine itself (automated payouts).
    System,
}

impl Initiator {
    /// Value stored in the log's actor column.
    pub fn as_column(&self) -> String {
        match self {
            Initiator::User(id) => id.to_string(),
            Initiator::System => "system".to_string(),
        }
    }

    /// Inverse of [`Initiator::as_column`].
    pub fn from_column(value: &str) -> Self {
        if value == "system" {
            Initiator::System
        } else {
            Initiator::User(UserId::new(value))
        }
    }
}

impl fmt::Display for Initiator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_column())
    }
}

/// Immutable, append-only record of one applied balance change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    /// Unique record ID.
    pub id: TransactionId,
    /// Account the change was applied to.
    pub account: AccountRef,
    /// Signed amount applied.
    pub amount: SignedAmount,
    /// Balance observed before the change.
    pub balance_before: Balance,
    /// Balance written by the change.
    pub balance_after: Balance,
    /// Category tag.
    pub category: TransactionCategory,
    /// Free-text reason.
    pub reason: String,
    /// Initiating actor.
    pub initiator: Initiator,
    /// Correlation id of the external event that caused the change, if any.
    pub external_event_id: Option<ExternalEventId>,
    /// When the change was applied.
    pub created_at: Timestamp,
}

/// Dedupe marker for an external event. At most one exists per
/// `(guild_id, event_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalEventRecord {
    /// Guild the event was observed in.
    pub guild_id: crate::GuildId,
    /// External event id.
    pub event_id: ExternalEventId,
    /// Credited user.
    pub recipient: UserId,
    /// Credited amount.
    pub amount: Balance,
    /// When the marker was written.
    pub recorded_at: Timestamp,
}
