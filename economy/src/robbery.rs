//! Robbery between two opted-in players of the same guild.

use std::sync::Arc;

use capo_common::{
    credit, debit, AccountRef, Balance, IllegalAction, Initiator, Rejection, Result,
    TransactionCategory,
};
use capo_games::GameRng;
use capo_ledger::{LedgerEngine, MutationRequest};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};

/// Share of the target's balance taken on success, in percent.
pub const STEAL_PERCENT: u64 = 10;
/// Smallest successful theft.
pub const MIN_STEAL: Balance = 1;
/// Largest successful theft.
pub const MAX_STEAL: Balance = 5000;
/// Share of the robber's own balance paid as a fine when caught, in percent.
pub const FINE_PERCENT: u64 = 10;

/// Result of a robbery attempt that was allowed to happen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum RobOutcome {
    /// The robber took `stolen` from the target.
    Success {
        stolen: Balance,
        robber_balance: Balance,
        target_balance: Balance,
    },
    /// The robbery succeeded but the target had nothing to take.
    NothingTaken { target_balance: Balance },
    /// The robber was caught and fined.
    Caught { fine: Balance, robber_balance: Balance },
}

/// Theft amount for a target holding `balance`.
pub fn steal_amount(balance: Balance) -> Balance {
    (balance / 100 * STEAL_PERCENT + balance % 100 * STEAL_PERCENT / 100).clamp(MIN_STEAL, MAX_STEAL)
}

/// Fine for a robber holding `balance`.
pub fn fine_amount(balance: Balance) -> Balance {
    balance / 100 * FINE_PERCENT + balance % 100 * FINE_PERCENT / 100
}

/// Runs robbery attempts against the ledger.
pub struct Robbery {
    ledger: Arc<LedgerEngine>,
    rng: GameRng,
    odds: (u32, u32),
}

impl Robbery {
    /// Robberies succeed half of the time.
    pub fn new(ledger: Arc<LedgerEngine>, rng: GameRng) -> Self {
        Self::with_odds(ledger, rng, (1, 2))
    }

    /// Robberies succeed with probability `odds.0 / odds.1`.
    pub fn with_odds(ledger: Arc<LedgerEngine>, rng: GameRng, odds: (u32, u32)) -> Self {
        Self { ledger, rng, odds }
    }

    /// Attempt to rob `target` on behalf of `robber`.
    ///
    /// The attempt is recorded on the robber before the outcome is drawn,
    /// so the cooldown applies whatever happens next.
    #[instrument(skip(self, robber, target), fields(robber = %robber, target = %target))]
    pub async fn rob(
        &self,
        robber: &AccountRef,
        target: &AccountRef,
    ) -> Result<std::result::Result<RobOutcome, Rejection>> {
        if robber == target {
            return Ok(Err(IllegalAction::SelfTarget.into()));
        }
        if !self.ledger.account(target).await?.robbable {
            return Ok(Err(Rejection::NotRobbable));
        }
        let robber_account = match self.ledger.start_rob_attempt(robber).await? {
            Ok(account) => account,
            Err(rejection) => return Ok(Err(rejection)),
        };

        if !self.rng.chance(self.odds.0, self.odds.1) {
            return self.fine(robber, robber_account.balance).await.map(Ok);
        }

        let target_balance = self.ledger.balance(target).await?;
        let stolen = steal_amount(target_balance);
        let loss = MutationRequest::new(
            target.clone(),
            debit(stolen),
            TransactionCategory::RobberyLoss,
            Initiator::User(robber.user_id.clone()),
        )
        .with_reason(format!("robbed by {}", robber.user_id));

        let loss = self.ledger.apply(loss).await?;
        if !loss.applied {
            info!(target_balance = loss.balance_before, "Robbery found nothing to take");
            return Ok(Ok(RobOutcome::NothingTaken {
                target_balance: loss.balance_before,
            }));
        }

        let gain = MutationRequest::new(
            robber.clone(),
            credit(stolen),
            TransactionCategory::RobberyGain,
            Initiator::User(robber.user_id.clone()),
        )
        .with_reason(format!("robbed {}", target.user_id));

        let gain = match self.ledger.apply(gain).await {
            Ok(gain) => gain,
            Err(e) => {
                error!(stolen, error = %e, "Target debited but robber credit failed");
                return Err(e);
            }
        };

        info!(stolen, "Robbery succeeded");
        Ok(Ok(RobOutcome::Success {
            stolen,
            robber_balance: gain.balance_after,
            target_balance: loss.balance_after,
        }))
    }

    async fn fine(&self, robber: &AccountRef, balance: Balance) -> Result<RobOutcome> {
        let fine = fine_amount(balance);
        if fine == 0 {
            info!("Robber caught with nothing to fine");
            return Ok(RobOutcome::Caught {
                fine: 0,
                robber_balance: balance,
            });
        }

        let request = MutationRequest::new(
            robber.clone(),
            debit(fine),
            TransactionCategory::RobberyFine,
            Initiator::System,
        )
        .with_reason("caught robbing");
        let outcome = self.ledger.apply(request).await?;
        let fine = if outcome.applied { fine } else { 0 };

        info!(fine, "Robber caught");
        Ok(RobOutcome::Caught {
            fine,
            robber_balance: outcome.balance_after,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use capo_common::ManualClock;
    use capo_ledger::{LedgerConfig, MemoryStore};
    use chrono::{Duration, TimeZone, Utc};
    use proptest::prelude::*;

    struct Fixture {
        ledger: Arc<LedgerEngine>,
        clock: ManualClock,
        robber: AccountRef,
        target: AccountRef,
    }

    async fn fixture(robber_balance: i64, target_balance: i64) -> Fixture {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap());
        let ledger = Arc::new(LedgerEngine::with_clock(
            Arc::new(MemoryStore::new()),
            Arc::new(clock.clone()),
            LedgerConfig::default(),
        ));
        let robber = AccountRef::new("1", "10");
        let target = AccountRef::new("1", "20");
        for (account, balance) in [(&robber, robber_balance), (&target, target_balance)] {
            if balance > 0 {
                ledger
                    .apply(MutationRequest::new(
                        account.clone(),
                        balance,
                        TransactionCategory::AdminGrant,
                        Initiator::System,
                    ))
                    .await
                    .unwrap();
            }
            ledger.set_robbable(account, true).await.unwrap().unwrap();
        }
        Fixture {
            ledger,
            clock,
            robber,
            target,
        }
    }

    fn always(ledger: &Arc<LedgerEngine>) -> Robbery {
        Robbery::with_odds(ledger.clone(), GameRng::seeded(1), (1, 1))
    }

    fn never(ledger: &Arc<LedgerEngine>) -> Robbery {
        Robbery::with_odds(ledger.clone(), GameRng::seeded(1), (0, 1))
    }

    #[test]
    fn test_steal_amount_bounds() {
        assert_eq!(steal_amount(0), 1);
        assert_eq!(steal_amount(5), 1);
        assert_eq!(steal_amount(1000), 100);
        assert_eq!(steal_amount(1_000_000), 5000);
        assert_eq!(fine_amount(9), 0);
        assert_eq!(fine_amount(250), 25);
    }

    proptest! {
        #[test]
        fn prop_steal_never_exceeds_bounds(balance in 0u64..10_000_000) {
            let stolen = steal_amount(balance);
            prop_assert!((MIN_STEAL..=MAX_STEAL).contains(&stolen));
            if balance >= 10 {
                prop_assert!(stolen <= balance);
            }
            prop_assert!(fine_amount(balance) <= balance);
        }
    }

    #[tokio::test]
    async fn test_successful_robbery_moves_funds() {
        let f = fixture(100, 1000).await;
        let outcome = always(&f.ledger).rob(&f.robber, &f.target).await.unwrap().unwrap();
        assert_eq!(
            outcome,
            RobOutcome::Success {
                stolen: 100,
                robber_balance: 200,
                target_balance: 900,
            }
        );

        let loss = f.ledger.transactions(&f.target).await.unwrap();
        assert_eq!(loss.last().unwrap().category, TransactionCategory::RobberyLoss);
        let gain = f.ledger.transactions(&f.robber).await.unwrap();
        assert_eq!(gain.last().unwrap().category, TransactionCategory::RobberyGain);
    }

    #[tokio::test]
    async fn test_empty_target_means_no_transfer() {
        let f = fixture(100, 0).await;
        let outcome = always(&f.ledger).rob(&f.robber, &f.target).await.unwrap().unwrap();
        assert_eq!(outcome, RobOutcome::NothingTaken { target_balance: 0 });
        assert_eq!(f.ledger.balance(&f.robber).await.unwrap(), 100);
        assert!(f.ledger.transactions(&f.target).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_caught_robber_is_fined() {
        let f = fixture(500, 1000).await;
        let outcome = never(&f.ledger).rob(&f.robber, &f.target).await.unwrap().unwrap();
        assert_eq!(
            outcome,
            RobOutcome::Caught {
                fine: 50,
                robber_balance: 450,
            }
        );
        assert_eq!(f.ledger.balance(&f.target).await.unwrap(), 1000);
    }

    #[tokio::test]
    async fn test_cooldown_applies_after_any_attempt() {
        let f = fixture(500, 1000).await;
        let robbery = never(&f.ledger);
        robbery.rob(&f.robber, &f.target).await.unwrap().unwrap();

        let again = robbery.rob(&f.robber, &f.target).await.unwrap();
        assert!(matches!(again, Err(Rejection::OnCooldown { .. })));

        f.clock.advance(Duration::hours(1));
        assert!(robbery.rob(&f.robber, &f.target).await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_rejections() {
        let f = fixture(100, 100).await;
        let robbery = always(&f.ledger);

        assert_eq!(
            robbery.rob(&f.robber, &f.robber).await.unwrap(),
            Err(IllegalAction::SelfTarget.into())
        );

        let stranger = AccountRef::new("1", "30");
        assert_eq!(
            robbery.rob(&f.robber, &stranger).await.unwrap(),
            Err(Rejection::NotRobbable)
        );
        assert_eq!(
            robbery.rob(&stranger, &f.target).await.unwrap(),
            Err(Rejection::NotRobbable)
        );
        assert_eq!(f.ledger.balance(&f.target).await.unwrap(), 100);
    }
}
