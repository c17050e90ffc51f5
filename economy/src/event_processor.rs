//! Idempotent crediting of externally observed events.
//!
//! The dedupe marker is inserted before the credit and the storage layer's
//! uniqueness constraint on `(guild_id, event_id)` is the only duplicate
//! signal. Two deliveries of the same event can race freely; exactly one
//! of them wins the insert and credits.

use std::sync::Arc;

use capo_common::{
    AccountRef, Balance, ExternalEventId, ExternalEventRecord, GuildId, Initiator, Rejection,
    Result, TransactionCategory, UserId,
};
use capo_ledger::{EventInsert, LedgerEngine, MutationRequest};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};

/// Result of [`EventProcessor::process_once`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditOutcome {
    /// False when the event had already been credited.
    pub credited: bool,
    /// Recipient balance after the credit, when credited.
    pub balance_after: Option<Balance>,
}

impl CreditOutcome {
    fn duplicate() -> Self {
        Self {
            credited: false,
            balance_after: None,
        }
    }
}

/// Credits external events at most once.
pub struct EventProcessor {
    ledger: Arc<LedgerEngine>,
}

impl EventProcessor {
    pub fn new(ledger: Arc<LedgerEngine>) -> Self {
        Self { ledger }
    }

    /// Credit `amount` to `recipient` for `event_id`, unless that event was
    /// already credited in `guild_id`.
    ///
    /// If the credit is declined, or fails before reaching storage, the
    /// marker is released so a redelivery can try again. When the store
    /// cannot tell whether the credit committed, the marker stays: a missed
    /// award is recoverable by an admin grant, a double award is not.
    #[instrument(skip(self, guild_id, recipient), fields(guild = %guild_id, event = %event_id))]
    pub async fn process_once(
        &self,
        guild_id: &GuildId,
        event_id: &ExternalEventId,
        recipient: &UserId,
        amount: Balance,
    ) -> Result<std::result::Result<CreditOutcome, Rejection>> {
        if amount == 0 || i64::try_from(amount).is_err() {
            return Ok(Err(Rejection::InvalidAmount));
        }

        let store = self.ledger.store();
        let marker = ExternalEventRecord {
            guild_id: guild_id.clone(),
            event_id: event_id.clone(),
            recipient: recipient.clone(),
            amount,
            recorded_at: self.ledger.clock().now(),
        };

        if store.record_event(&marker).await? == EventInsert::Duplicate {
            debug!("External event already credited");
            return Ok(Ok(CreditOutcome::duplicate()));
        }

        let request = MutationRequest::new(
            AccountRef::new(guild_id.clone(), recipient.clone()),
            amount as i64,
            TransactionCategory::ExternalAward,
            Initiator::System,
        )
        .with_reason(format!("external event {event_id}"))
        .with_external_event(event_id.clone());

        let outcome = match self.ledger.apply(request).await {
            Ok(outcome) => outcome,
            Err(e) if e.outcome_unknown() => {
                error!(error = %e, recipient = %recipient, amount, "Credit outcome unknown, keeping event marker");
                return Err(e);
            }
            Err(e) => {
                warn!(error = %e, "Credit failed, releasing event marker");
                self.release(guild_id, event_id).await;
                return Err(e);
            }
        };

        match outcome.into_result() {
            Ok(balance_after) => {
                info!(recipient = %recipient, amount, "External event credited");
                Ok(Ok(CreditOutcome {
                    credited: true,
                    balance_after: Some(balance_after),
                }))
            }
            Err(rejection) => {
                self.release(guild_id, event_id).await;
                Ok(Err(rejection))
            }
        }
    }

    async fn release(&self, guild_id: &GuildId, event_id: &ExternalEventId) {
        if let Err(e) = self.ledger.store().release_event(guild_id, event_id).await {
            warn!(error = %e, event = %event_id, "Failed to release event marker");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use capo_ledger::{MemoryStore, StorageGateway};

    fn setup() -> (EventProcessor, Arc<LedgerEngine>, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let ledger = Arc::new(LedgerEngine::new(store.clone()));
        (EventProcessor::new(ledger.clone()), ledger, store)
    }

    #[tokio::test]
    async fn test_duplicate_event_credits_once() {
        let (processor, ledger, _) = setup();
        let guild = GuildId::new("1");
        let event = ExternalEventId::new("555");
        let user = UserId::new("42");

        let first = processor.process_once(&guild, &event, &user, 250).await.unwrap().unwrap();
        let second = processor.process_once(&guild, &event, &user, 250).await.unwrap().unwrap();

        assert!(first.credited);
        assert_eq!(first.balance_after, Some(250));
        assert!(!second.credited);

        let account = AccountRef::new("1", "42");
        assert_eq!(ledger.balance(&account).await.unwrap(), 250);
        let records = ledger.transactions(&account).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].category, TransactionCategory::ExternalAward);
        assert_eq!(records[0].external_event_id, Some(event));
    }

    #[tokio::test]
    async fn test_same_event_in_other_guild_is_distinct() {
        let (processor, _, _) = setup();
        let event = ExternalEventId::new("555");
        let user = UserId::new("42");

        let a = processor.process_once(&GuildId::new("1"), &event, &user, 10).await.unwrap().unwrap();
        let b = processor.process_once(&GuildId::new("2"), &event, &user, 10).await.unwrap().unwrap();
        assert!(a.credited && b.credited);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_deliveries_credit_once() {
        let (processor, ledger, _) = setup();
        let processor = Arc::new(processor);

        let mut handles = Vec::new();
        for _ in 0..16 {
            let processor = processor.clone();
            handles.push(tokio::spawn(async move {
                processor
                    .process_once(&GuildId::new("1"), &ExternalEventId::new("9"), &UserId::new("7"), 100)
                    .await
                    .unwrap()
                    .unwrap()
            }));
        }

        let mut credited = 0;
        for handle in handles {
            if handle.await.unwrap().credited {
                credited += 1;
            }
        }

        assert_eq!(credited, 1);
        assert_eq!(ledger.balance(&AccountRef::new("1", "7")).await.unwrap(), 100);
    }

    #[tokio::test]
    async fn test_failed_credit_releases_marker() {
        let (processor, ledger, store) = setup();
        let guild = GuildId::new("1");
        let event = ExternalEventId::new("77");
        let user = UserId::new("3");

        // Create the account first so the injected failure hits the credit.
        ledger.balance(&AccountRef::new("1", "3")).await.unwrap();
        store.fail_next_commits(1);

        assert!(processor.process_once(&guild, &event, &user, 50).await.is_err());
        assert!(!store.has_event_record(&guild, &event).await.unwrap());

        let retry = processor.process_once(&guild, &event, &user, 50).await.unwrap().unwrap();
        assert!(retry.credited);
        assert_eq!(ledger.balance(&AccountRef::new("1", "3")).await.unwrap(), 50);
    }

    #[tokio::test]
    async fn test_unknown_commit_outcome_keeps_marker() {
        let (processor, ledger, store) = setup();
        let guild = GuildId::new("1");
        let event = ExternalEventId::new("78");
        let user = UserId::new("3");

        ledger.balance(&AccountRef::new("1", "3")).await.unwrap();
        store.lose_next_commit_acks(1);

        let err = processor.process_once(&guild, &event, &user, 50).await.unwrap_err();
        assert!(err.outcome_unknown());
        assert!(store.has_event_record(&guild, &event).await.unwrap());

        let redelivery = processor.process_once(&guild, &event, &user, 50).await.unwrap().unwrap();
        assert!(!redelivery.credited);
        assert_eq!(ledger.balance(&AccountRef::new("1", "3")).await.unwrap(), 50);
    }

    #[tokio::test]
    async fn test_zero_amount_is_invalid() {
        let (processor, _, store) = setup();
        let result = processor
            .process_once(&GuildId::new("1"), &ExternalEventId::new("1"), &UserId::new("1"), 0)
            .await
            .unwrap();
        assert_eq!(result, Err(Rejection::InvalidAmount));
        assert!(!store
            .has_event_record(&GuildId::new("1"), &ExternalEventId::new("1"))
            .await
            .unwrap());
    }
}
