//! Wager and payout calls into the ledger.

use capo_common::{credit, debit, AccountRef, Balance, Initiator, Rejection, Result, TransactionCategory};
use capo_ledger::{LedgerEngine, MutationRequest};

/// Debit a stake. Declines come back as the inner `Err`.
pub(crate) async fn charge(
    ledger: &LedgerEngine,
    account: &AccountRef,
    amount: Balance,
    reason: &str,
) -> Result<std::result::Result<Balance, Rejection>> {
    let request = MutationRequest::new(
        account.clone(),
        debit(amount),
        TransactionCategory::Wager,
        Initiator::User(account.user_id.clone()),
    )
    .with_reason(reason);
    Ok(ledger.apply(request).await?.into_result())
}

/// Credit winnings. A zero payout writes nothing and returns the current
/// balance.
pub(crate) async fn pay(
    ledger: &LedgerEngine,
    account: &AccountRef,
    amount: Balance,
    reason: &str,
) -> Result<Balance> {
    if amount == 0 {
        return ledger.balance(account).await;
    }
    let request = MutationRequest::new(
        account.clone(),
        credit(amount),
        TransactionCategory::Payout,
        Initiator::System,
    )
    .with_reason(reason);

    let outcome = ledger.apply(request).await?;
    match outcome.failure {
        None => Ok(outcome.balance_after),
        // A credit can only be declined for an out-of-range amount.
        Some(rejection) => Err(capo_common::EconomyError::Internal(format!(
            "payout of {amount} to {account} declined: {}",
            rejection.code()
        ))),
    }
}
