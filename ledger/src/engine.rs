//! Core ledger engine implementation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::oneshot;
use tracing::{info, instrument, warn};

use capo_common::{
    constants, AccountRef, Balance, ClaimKind, ClaimSchedule, DurationExt, EconomyError, GuildId,
    Rejection, Result, SharedClock, SystemClock, TransactionRecord,
};

use crate::account::Account;
use crate::actor::{self, AccountCommand, ActorRegistry};
use crate::balance::{ApplyOutcome, MutationRequest};
use crate::claims::ClaimOutcome;
use crate::journal::{AuditFailure, AuditReport};
use crate::rank::{self, LeaderboardPage};
use crate::store::SharedStore;

/// Ledger tuning.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// How long an account actor waits for work before retiring.
    pub actor_idle_timeout: Duration,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            actor_idle_timeout: constants::actor_idle_timeout().as_std(),
        }
    }
}

/// The ledger engine is the only writer of balances and transaction records.
///
/// Balance-affecting work for one account is funneled through that
/// account's actor, which serializes it. Reads of derived views (the
/// leaderboard) go straight to storage.
pub struct LedgerEngine {
    store: SharedStore,
    clock: SharedClock,
    config: LedgerConfig,
    actors: ActorRegistry,
    next_generation: AtomicU64,
}

impl LedgerEngine {
    /// Create a ledger over `store` using the wall clock.
    pub fn new(store: SharedStore) -> Self {
        Self::with_clock(store, Arc::new(SystemClock), LedgerConfig::default())
    }

    /// Create a ledger with an explicit clock and configuration.
    pub fn with_clock(store: SharedStore, clock: SharedClock, config: LedgerConfig) -> Self {
        info!(store = store.name(), "Ledger engine created");
        Self {
            store,
            clock,
            config,
            actors: Arc::new(DashMap::new()),
            next_generation: AtomicU64::new(0),
        }
    }

    /// Storage backing this ledger.
    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    /// Clock used for timestamps and cooldowns.
    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    /// Number of live account actors.
    pub fn active_actors(&self) -> usize {
        self.actors.len()
    }

    /// Apply a signed change to one account.
    ///
    /// The account is created with a zero balance if absent. A change that
    /// would take the balance below zero is declined with
    /// [`Rejection::InsufficientFunds`] and leaves no trace. Storage
    /// failures come back as `Err`; in that case nothing was applied.
    #[instrument(skip(self, request), fields(account = %request.account, amount = request.amount))]
    pub async fn apply(&self, request: MutationRequest) -> Result<ApplyOutcome> {
        let account = request.account.clone();
        self.call(&account, |reply| AccountCommand::Apply { request, reply })
            .await
    }

    /// Make a periodic claim.
    #[instrument(skip(self, account, schedule), fields(account = %account))]
    pub async fn claim(
        &self,
        account: &AccountRef,
        kind: ClaimKind,
        schedule: ClaimSchedule,
    ) -> Result<std::result::Result<ClaimOutcome, Rejection>> {
        self.call(account, |reply| AccountCommand::Claim {
            kind,
            schedule,
            reply,
        })
        .await
    }

    /// Change the robbable flag of an account.
    pub async fn set_robbable(
        &self,
        account: &AccountRef,
        robbable: bool,
    ) -> Result<std::result::Result<Account, Rejection>> {
        self.call(account, |reply| AccountCommand::SetRobbable { robbable, reply })
            .await
    }

    /// Record a robbery attempt by `account`, enforcing opt-in and cooldown.
    pub async fn start_rob_attempt(
        &self,
        account: &AccountRef,
    ) -> Result<std::result::Result<Account, Rejection>> {
        self.call(account, |reply| AccountCommand::StartRobAttempt { reply })
            .await
    }

    /// Current account state, creating the account if absent.
    pub async fn account(&self, account: &AccountRef) -> Result<Account> {
        self.call(account, |reply| AccountCommand::Snapshot { reply })
            .await
    }

    /// Current balance, creating the account if absent.
    pub async fn balance(&self, account: &AccountRef) -> Result<Balance> {
        Ok(self.account(account).await?.balance)
    }

    /// Transaction log of an account, in append order.
    pub async fn transactions(&self, account: &AccountRef) -> Result<Vec<TransactionRecord>> {
        self.store.transactions(account).await
    }

    /// Check that an account's log replays to its balance.
    pub async fn audit(
        &self,
        account: &AccountRef,
    ) -> Result<std::result::Result<AuditReport, AuditFailure>> {
        self.call(account, |reply| AccountCommand::Audit { reply })
            .await
    }

    /// One page of the guild's balance ranking.
    pub async fn leaderboard(
        &self,
        guild_id: &GuildId,
        page: u64,
        per_page: u64,
    ) -> Result<LeaderboardPage> {
        rank::leaderboard(self.store.as_ref(), guild_id, page, per_page).await
    }

    /// Ask the account's actor to do `build`'s work and wait for the answer.
    async fn call<T, F>(&self, account: &AccountRef, build: F) -> Result<T>
    where
        F: FnOnce(oneshot::Sender<Result<T>>) -> AccountCommand,
    {
        let (reply, response) = oneshot::channel();
        self.dispatch(account, build(reply))?;
        response
            .await
            .map_err(|_| EconomyError::ActorUnavailable(account.to_string()))?
    }

    fn dispatch(&self, account: &AccountRef, command: AccountCommand) -> Result<()> {
        let mut handle = self
            .actors
            .entry(account.clone())
            .or_insert_with(|| self.spawn_actor(account));

        match handle.sender.send(command) {
            Ok(()) => Ok(()),
            Err(mpsc_error) => {
                // The actor died without retiring. Replace it and retry once.
                warn!(account = %account, "Account actor gone, respawning");
                *handle = self.spawn_actor(account);
                handle
                    .sender
                    .send(mpsc_error.0)
                    .map_err(|_| EconomyError::ActorUnavailable(account.to_string()))
            }
        }
    }

    fn spawn_actor(&self, account: &AccountRef) -> actor::ActorHandle {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        actor::spawn(
            account.clone(),
            generation,
            self.store.clone(),
            self.clock.clone(),
            self.actors.clone(),
            self.config.actor_idle_timeout,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use capo_common::{credit, debit, GuildConfig, Initiator, ManualClock, TransactionCategory};
    use chrono::Duration as ChronoDuration;
    use proptest::prelude::*;

    fn engine() -> (LedgerEngine, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (LedgerEngine::new(store.clone()), store)
    }

    fn grant(account: &AccountRef, amount: i64) -> MutationRequest {
        MutationRequest::new(
            account.clone(),
            amount,
            TransactionCategory::AdminGrant,
            Initiator::System,
        )
    }

    #[tokio::test]
    async fn test_apply_creates_account_and_records() {
        let (engine, _) = engine();
        let account = AccountRef::new("1", "2");

        let outcome = engine.apply(grant(&account, 100)).await.unwrap();
        assert!(outcome.applied);
        assert_eq!(outcome.balance_before, 0);
        assert_eq!(outcome.balance_after, 100);

        let records = engine.transactions(&account).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].amount, 100);
        assert_eq!(Some(records[0].id), outcome.transaction_id);
    }

    #[tokio::test]
    async fn test_overdraw_is_declined_without_trace() {
        let (engine, _) = engine();
        let account = AccountRef::new("1", "2");
        engine.apply(grant(&account, 10)).await.unwrap();

        let outcome = engine.apply(grant(&account, -11)).await.unwrap();
        assert!(!outcome.applied);
        assert_eq!(
            outcome.failure,
            Some(Rejection::InsufficientFunds {
                required: 11,
                available: 10
            })
        );
        assert_eq!(engine.balance(&account).await.unwrap(), 10);
        assert_eq!(engine.transactions(&account).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_zero_amount_is_invalid() {
        let (engine, _) = engine();
        let outcome = engine
            .apply(grant(&AccountRef::new("1", "2"), 0))
            .await
            .unwrap();
        assert_eq!(outcome.failure, Some(Rejection::InvalidAmount));
    }

    #[tokio::test]
    async fn test_storage_failure_applies_nothing() {
        let (engine, store) = engine();
        let account = AccountRef::new("1", "2");
        engine.apply(grant(&account, 50)).await.unwrap();

        store.fail_next_commits(1);
        let err = engine.apply(grant(&account, 25)).await.unwrap_err();
        assert!(err.is_retryable());

        assert_eq!(engine.balance(&account).await.unwrap(), 50);
        assert!(engine.audit(&account).await.unwrap().is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_applies_form_one_chain() {
        let (engine, _) = engine();
        let engine = Arc::new(engine);
        let account = AccountRef::new("1", "2");
        engine.apply(grant(&account, 1_000)).await.unwrap();

        let mut tasks = Vec::new();
        for i in 0..100i64 {
            let engine = engine.clone();
            let account = account.clone();
            let amount = if i % 2 == 0 { credit(7) } else { debit(5) };
            tasks.push(tokio::spawn(async move {
                engine.apply(grant(&account, amount)).await
            }));
        }
        for task in tasks {
            assert!(task.await.unwrap().unwrap().applied);
        }

        // 50 credits of 7 and 50 debits of 5 on top of 1000.
        assert_eq!(engine.balance(&account).await.unwrap(), 1_100);

        let records = engine.transactions(&account).await.unwrap();
        assert_eq!(records.len(), 101);
        let report = engine.audit(&account).await.unwrap().unwrap();
        assert_eq!(report.net_amount, 1_100);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_debits_never_overdraw() {
        let (engine, _) = engine();
        let engine = Arc::new(engine);
        let account = AccountRef::new("1", "2");
        engine.apply(grant(&account, 100)).await.unwrap();

        let mut tasks = Vec::new();
        for _ in 0..30 {
            let engine = engine.clone();
            let account = account.clone();
            tasks.push(tokio::spawn(async move {
                engine.apply(grant(&account, debit(10))).await
            }));
        }

        let mut applied = 0;
        for task in tasks {
            if task.await.unwrap().unwrap().applied {
                applied += 1;
            }
        }
        assert_eq!(applied, 10);
        assert_eq!(engine.balance(&account).await.unwrap(), 0);
        assert!(engine.audit(&account).await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_claim_streak_with_manual_clock() {
        let store = Arc::new(MemoryStore::new());
        let clock = ManualClock::default();
        let engine = LedgerEngine::with_clock(
            store,
            Arc::new(clock.clone()),
            LedgerConfig::default(),
        );
        let account = AccountRef::new("1", "2");
        let daily = GuildConfig::new(GuildId::new("1")).daily;

        let first = engine
            .claim(&account, ClaimKind::Daily, daily)
            .await
            .unwrap()
            .unwrap();
        assert_eq!((first.amount, first.streak), (100, 1));

        let early = engine
            .claim(&account, ClaimKind::Daily, daily)
            .await
            .unwrap();
        assert!(matches!(early, Err(Rejection::OnCooldown { .. })));

        clock.advance(ChronoDuration::hours(25));
        let second = engine
            .claim(&account, ClaimKind::Daily, daily)
            .await
            .unwrap()
            .unwrap();
        assert_eq!((second.amount, second.streak), (110, 2));
        assert_eq!(second.balance_after, 210);
        assert!(engine.audit(&account).await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_idle_actor_retires_and_respawns() {
        let store = Arc::new(MemoryStore::new());
        let engine = LedgerEngine::with_clock(
            store,
            Arc::new(SystemClock),
            LedgerConfig {
                actor_idle_timeout: Duration::from_millis(20),
            },
        );
        let account = AccountRef::new("1", "2");

        engine.apply(grant(&account, 5)).await.unwrap();
        assert_eq!(engine.active_actors(), 1);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(engine.active_actors(), 0);

        engine.apply(grant(&account, 5)).await.unwrap();
        assert_eq!(engine.balance(&account).await.unwrap(), 10);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_balance_equals_log_sum(amounts in proptest::collection::vec(-200i64..200, 1..40)) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            runtime.block_on(async {
                let (engine, _) = engine();
                let account = AccountRef::new("1", "2");
                for amount in amounts {
                    engine.apply(grant(&account, amount)).await.unwrap();
                }
                let balance = engine.balance(&account).await.unwrap();
                let records = engine.transactions(&account).await.unwrap();
                let sum: i128 = records.iter().map(|r| i128::from(r.amount)).sum();
                assert_eq!(i128::from(balance), sum);
                assert!(engine.audit(&account).await.unwrap().is_ok());
            });
        }
    }
}
