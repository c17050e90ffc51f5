//! Per-account serialized workers.
//!
//! Every account key is owned by at most one actor task at a time. The
//! actor drains its mailbox in order, so each command's pre-state is the
//! post-state of the previous command on that account. Commands for
//! different accounts run on different actors and interleave freely.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace, warn};

use capo_common::{
    apply_delta, credit, AccountRef, Initiator, Rejection, Result, SharedClock,
    TransactionCategory, TransactionId, TransactionRecord, MAX_AMOUNT,
};
use capo_common::{ClaimKind, ClaimSchedule};

use crate::account::Account;
use crate::balance::{ApplyOutcome, MutationRequest};
use crate::claims::{plan_claim, ClaimOutcome};
use crate::journal::{audit, AuditFailure, AuditReport};
use crate::store::SharedStore;

type Reply<T> = oneshot::Sender<Result<T>>;

/// A unit of work for one account.
pub(crate) enum AccountCommand {
    Apply {
        request: MutationRequest,
        reply: Reply<ApplyOutcome>,
    },
    Claim {
        kind: ClaimKind,
        schedule: ClaimSchedule,
        reply: Reply<std::result::Result<ClaimOutcome, Rejection>>,
    },
    SetRobbable {
        robbable: bool,
        reply: Reply<std::result::Result<Account, Rejection>>,
    },
    StartRobAttempt {
        reply: Reply<std::result::Result<Account, Rejection>>,
    },
    Snapshot {
        reply: Reply<Account>,
    },
    Audit {
        reply: Reply<std::result::Result<AuditReport, AuditFailure>>,
    },
}

/// Registry entry for a live actor.
pub(crate) struct ActorHandle {
    pub(crate) generation: u64,
    pub(crate) sender: mpsc::UnboundedSender<AccountCommand>,
}

pub(crate) type ActorRegistry = Arc<DashMap<AccountRef, ActorHandle>>;

/// Spawn the actor for `account` and return its handle. Must be called
/// with the registry entry for `account` held so no second actor can be
/// spawned for the same key.
pub(crate) fn spawn(
    account: AccountRef,
    generation: u64,
    store: SharedStore,
    clock: SharedClock,
    registry: ActorRegistry,
    idle_timeout: Duration,
) -> ActorHandle {
    let (sender, receiver) = mpsc::unbounded_channel();
    let actor = AccountActor {
        account,
        generation,
        store,
        clock,
        registry,
        idle_timeout,
        receiver,
    };
    tokio::spawn(actor.run());
    ActorHandle { generation, sender }
}

struct AccountActor {
    account: AccountRef,
    generation: u64,
    store: SharedStore,
    clock: SharedClock,
    registry: ActorRegistry,
    idle_timeout: Duration,
    receiver: mpsc::UnboundedReceiver<AccountCommand>,
}

impl AccountActor {
    async fn run(mut self) {
        trace!(account = %self.account, generation = self.generation, "Account actor started");

        loop {
            match tokio::time::timeout(self.idle_timeout, self.receiver.recv()).await {
                Ok(Some(command)) => self.handle(command).await,
                Ok(None) => break,
                Err(_) => {
                    // Senders only push while holding the registry shard
                    // lock, so an empty mailbox observed under that lock
                    // stays empty once the entry is gone.
                    let generation = self.generation;
                    let receiver = &self.receiver;
                    let retired = self
                        .registry
                        .remove_if(&self.account, |_, handle| {
                            handle.generation == generation && receiver.is_empty()
                        })
                        .is_some();
                    if retired {
                        break;
                    }
                }
            }
        }

        trace!(account = %self.account, generation = self.generation, "Account actor retired");
    }

    async fn handle(&mut self, command: AccountCommand) {
        match command {
            AccountCommand::Apply { request, reply } => {
                let _ = reply.send(self.apply(request).await);
            }
            AccountCommand::Claim {
                kind,
                schedule,
                reply,
            } => {
                let _ = reply.send(self.claim(kind, schedule).await);
            }
            AccountCommand::SetRobbable { robbable, reply } => {
                let _ = reply.send(self.set_robbable(robbable).await);
            }
            AccountCommand::StartRobAttempt { reply } => {
                let _ = reply.send(self.start_rob_attempt().await);
            }
            AccountCommand::Snapshot { reply } => {
                let now = self.clock.now();
                let _ = reply.send(self.store.upsert_account(&self.account, now).await);
            }
            AccountCommand::Audit { reply } => {
                let _ = reply.send(self.audit().await);
            }
        }
    }

    async fn apply(&self, request: MutationRequest) -> Result<ApplyOutcome> {
        let now = self.clock.now();
        let mut account = self.store.upsert_account(&self.account, now).await?;
        let before = account.balance;

        if request.amount == 0 || request.amount.unsigned_abs() > MAX_AMOUNT {
            return Ok(ApplyOutcome::declined(before, Rejection::InvalidAmount));
        }

        let after = match apply_delta(before, request.amount) {
            Some(after) => after,
            None if request.amount < 0 => {
                debug!(
                    account = %self.account,
                    balance = before,
                    amount = request.amount,
                    "Mutation declined: insufficient funds"
                );
                return Ok(ApplyOutcome::insufficient_funds(before, request.amount));
            }
            None => return Ok(ApplyOutcome::declined(before, Rejection::InvalidAmount)),
        };

        let record = TransactionRecord {
            id: TransactionId::new(),
            account: self.account.clone(),
            amount: request.amount,
            balance_before: before,
            balance_after: after,
            category: request.category,
            reason: request.reason,
            initiator: request.initiator,
            external_event_id: request.external_event_id,
            created_at: now,
        };

        account.balance = after;
        account.updated_at = now;
        self.store.commit(&account, Some(&record)).await?;

        debug!(
            account = %self.account,
            category = record.category.as_str(),
            amount = record.amount,
            balance_after = after,
            "Mutation applied"
        );
        Ok(ApplyOutcome::applied(&record))
    }

    async fn claim(
        &self,
        kind: ClaimKind,
        schedule: ClaimSchedule,
    ) -> Result<std::result::Result<ClaimOutcome, Rejection>> {
        let now = self.clock.now();
        let mut account = self.store.upsert_account(&self.account, now).await?;

        let plan = match plan_claim(account.claim_state(kind), kind, &schedule, now) {
            Ok(plan) => plan,
            Err(rejection) => return Ok(Err(rejection)),
        };

        let amount = credit(plan.amount);
        let before = account.balance;
        let Some(after) = apply_delta(before, amount) else {
            return Ok(Err(Rejection::InvalidAmount));
        };

        let category = match kind {
            ClaimKind::Daily => TransactionCategory::Daily,
            ClaimKind::Weekly => TransactionCategory::Weekly,
        };
        let record = TransactionRecord {
            id: TransactionId::new(),
            account: self.account.clone(),
            amount,
            balance_before: before,
            balance_after: after,
            category,
            reason: format!("{} claim, streak {}", category.as_str(), plan.streak),
            initiator: Initiator::User(self.account.user_id.clone()),
            external_event_id: None,
            created_at: now,
        };

        account.balance = after;
        account.updated_at = now;
        let state = account.claim_state_mut(kind);
        state.last_claimed_at = Some(now);
        state.streak = plan.streak;

        // An empty schedule still advances the cooldown but writes no record.
        let record = (plan.amount > 0).then_some(record);
        self.store.commit(&account, record.as_ref()).await?;

        Ok(Ok(ClaimOutcome {
            kind,
            amount: plan.amount,
            streak: plan.streak,
            balance_after: account.balance,
            next_claim_at: now + kind.cooldown(),
        }))
    }

    async fn set_robbable(&self, robbable: bool) -> Result<std::result::Result<Account, Rejection>> {
        let now = self.clock.now();
        let mut account = self.store.upsert_account(&self.account, now).await?;
        if let Err(rejection) = account.set_robbable(robbable, now) {
            return Ok(Err(rejection));
        }
        self.store.commit(&account, None).await?;
        Ok(Ok(account))
    }

    async fn start_rob_attempt(&self) -> Result<std::result::Result<Account, Rejection>> {
        let now = self.clock.now();
        let mut account = self.store.upsert_account(&self.account, now).await?;
        if let Err(rejection) = account.start_rob_attempt(now) {
            return Ok(Err(rejection));
        }
        self.store.commit(&account, None).await?;
        Ok(Ok(account))
    }

    async fn audit(&self) -> Result<std::result::Result<AuditReport, AuditFailure>> {
        let now = self.clock.now();
        let account = self.store.upsert_account(&self.account, now).await?;
        let records = self.store.transactions(&self.account).await?;
        let report = audit(&account, &records);
        if let Err(failure) = &report {
            warn!(account = %self.account, error = %failure, "Ledger audit failed");
        }
        Ok(report)
    }
}
