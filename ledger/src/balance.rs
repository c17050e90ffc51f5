//! Balance mutation requests and outcomes.

use capo_common::{
    AccountRef, Balance, ExternalEventId, Initiator, Rejection, SignedAmount, TransactionCategory,
    TransactionId, TransactionRecord,
};
use serde::{Deserialize, Serialize};

/// A request to change one account's balance by a signed amount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationRequest {
    /// Account to mutate (created on first reference).
    pub account: AccountRef,
    /// Signed amount: positive credits, negative debits.
    pub amount: SignedAmount,
    /// Category tag for the log.
    pub category: TransactionCategory,
    /// Free-text reason for the log.
    pub reason: String,
    /// Who asked for the change.
    pub initiator: Initiator,
    /// External event this change answers, if any.
    pub external_event_id: Option<ExternalEventId>,
}

impl MutationRequest {
    /// Create a new request.
    pub fn new(
        account: AccountRef,
        amount: SignedAmount,
        category: TransactionCategory,
        initiator: Initiator,
    ) -> Self {
        Self {
            account,
            amount,
            category,
            reason: category.as_str().to_string(),
            initiator,
            external_event_id: None,
        }
    }

    /// Set the free-text reason.
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    /// Attach an external event correlation id.
    pub fn with_external_event(mut self, event_id: ExternalEventId) -> Self {
        self.external_event_id = Some(event_id);
        self
    }
}

/// Result of applying a [`MutationRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyOutcome {
    /// Whether the balance changed.
    pub applied: bool,
    /// Balance observed before the change.
    pub balance_before: Balance,
    /// Balance after the change (equal to `balance_before` when declined).
    pub balance_after: Balance,
    /// Why the change was declined.
    pub failure: Option<Rejection>,
    /// Record written for the change.
    pub transaction_id: Option<TransactionId>,
}

impl ApplyOutcome {
    /// Outcome of a committed change.
    pub fn applied(record: &TransactionRecord) -> Self {
        Self {
            applied: true,
            balance_before: record.balance_before,
            balance_after: record.balance_after,
            failure: None,
            transaction_id: Some(record.id),
        }
    }

    /// Outcome of a change refused because it would overdraw the account.
    pub fn insufficient_funds(balance: Balance, amount: SignedAmount) -> Self {
        Self::declined(
            balance,
            Rejection::InsufficientFunds {
                required: amount.unsigned_abs(),
                available: balance,
            },
        )
    }

    /// Outcome of a change refused for any business reason.
    pub fn declined(balance: Balance, rejection: Rejection) -> Self {
        Self {
            applied: false,
            balance_before: balance,
            balance_after: balance,
            failure: Some(rejection),
            transaction_id: None,
        }
    }

    /// Convert into `Ok(balance_after)` or the rejection.
    pub fn into_result(self) -> Result<Balance, Rejection> {
        match self.failure {
            Some(rejection) => Err(rejection),
            None => Ok(self.balance_after),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_defaults_reason_to_category() {
        let request = MutationRequest::new(
            AccountRef::new("1", "2"),
            -25,
            TransactionCategory::Wager,
            Initiator::System,
        );
        assert_eq!(request.reason, "wager");
        assert!(request.external_event_id.is_none());

        let request = request
            .with_reason("coinflip")
            .with_external_event(ExternalEventId::new("m1"));
        assert_eq!(request.reason, "coinflip");
        assert_eq!(request.external_event_id, Some(ExternalEventId::new("m1")));
    }

    #[test]
    fn test_insufficient_funds_outcome() {
        let outcome = ApplyOutcome::insufficient_funds(10, -25);
        assert!(!outcome.applied);
        assert_eq!(outcome.balance_before, outcome.balance_after);
        assert_eq!(
            outcome.into_result(),
            Err(Rejection::InsufficientFunds {
                required: 25,
                available: 10
            })
        );
    }
}
