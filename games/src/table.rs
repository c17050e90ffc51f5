//! Blackjack table: wires the rules to the ledger and the session store.

use std::sync::Arc;

use capo_common::{Balance, Rejection, Result, SessionKey, UserId, Wager};
use capo_ledger::LedgerEngine;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};

use crate::blackjack::{BlackjackAction, BlackjackGame, Hand, Settlement};
use crate::cards::{Card, Shoe};
use crate::session::{SessionStore, SessionStoreConfig};
use crate::stake;

/// What the player gets to see after each step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlackjackView {
    pub hands: Vec<Hand>,
    /// Only the upcard while the player is acting; the full hand once settled.
    pub dealer: Vec<Card>,
    pub active_hand: Option<usize>,
    pub settlement: Option<Settlement>,
    pub balance: Balance,
}

impl BlackjackView {
    fn of(game: &BlackjackGame, balance: Balance) -> Self {
        let dealer = match game.settlement() {
            Some(_) => game.dealer().to_vec(),
            None => game.dealer_upcard().into_iter().collect(),
        };
        Self {
            hands: game.hands().as_slice().to_vec(),
            dealer,
            active_hand: game.active_hand(),
            settlement: game.settlement().cloned(),
            balance,
        }
    }
}

/// Runs blackjack games, one per (guild, channel, user).
pub struct BlackjackTable {
    ledger: Arc<LedgerEngine>,
    sessions: SessionStore<BlackjackGame>,
    shoe: Arc<dyn Shoe>,
    /// Settled games whose payout failed to commit. Collected on the
    /// owner's next move or game start; never expires.
    unpaid: DashMap<SessionKey, BlackjackGame>,
}

impl BlackjackTable {
    pub fn new(ledger: Arc<LedgerEngine>, shoe: Arc<dyn Shoe>, config: SessionStoreConfig) -> Self {
        let sessions = SessionStore::with_config(ledger.clock().clone(), config);
        Self {
            ledger,
            sessions,
            shoe,
            unpaid: DashMap::new(),
        }
    }

    /// Live and expired-but-untouched sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Settled games still waiting for their payout.
    pub fn unpaid_count(&self) -> usize {
        self.unpaid.len()
    }

    /// Take the wager and deal. If the wager is declined no session exists.
    #[instrument(skip(self), fields(session = %key))]
    pub async fn start(
        &self,
        key: &SessionKey,
        bet: u64,
    ) -> Result<std::result::Result<BlackjackView, Rejection>> {
        if self.sessions.contains(key) {
            return Ok(Err(capo_common::IllegalAction::GameInProgress.into()));
        }
        let Some(wager) = Wager::new(bet) else {
            return Ok(Err(Rejection::InvalidAmount));
        };
        self.collect_unpaid(key).await?;

        let account = key.account();
        let balance = match stake::charge(&self.ledger, &account, wager.amount(), "blackjack bet").await? {
            Ok(balance) => balance,
            Err(rejection) => return Ok(Err(rejection)),
        };

        let game = BlackjackGame::deal(wager, self.shoe.as_ref());
        match game.settlement() {
            Some(_) => self.settle(key, game).await.map(Ok),
            None => {
                let view = BlackjackView::of(&game, balance);
                self.sessions.put(key.clone(), game);
                debug!(bet, "Blackjack dealt");
                Ok(Ok(view))
            }
        }
    }

    /// Apply a move on behalf of `actor`.
    #[instrument(skip(self), fields(session = %key))]
    pub async fn act(
        &self,
        key: &SessionKey,
        actor: &UserId,
        action: BlackjackAction,
    ) -> Result<std::result::Result<BlackjackView, Rejection>> {
        if self.unpaid.contains_key(key) {
            if &key.user_id != actor {
                return Ok(Err(Rejection::SessionNotOwned));
            }
            if let Some(view) = self.collect_unpaid(key).await? {
                return Ok(Ok(view));
            }
        }

        let mut game = match self.sessions.lookup(key, actor) {
            Ok(game) => game,
            Err(rejection) => return Ok(Err(rejection)),
        };

        let extra = match game.check(action) {
            Ok(extra) => extra,
            Err(illegal) => return Ok(Err(illegal.into())),
        };

        let account = key.account();
        if extra > 0 {
            let reason = match action {
                BlackjackAction::Split => "blackjack split",
                _ => "blackjack double",
            };
            if let Err(rejection) = stake::charge(&self.ledger, &account, extra, reason).await? {
                return Ok(Err(rejection));
            }
        }

        if let Err(illegal) = game.act(action, self.shoe.as_ref()) {
            return Ok(Err(illegal.into()));
        }

        if game.is_settled() {
            return self.settle(key, game).await.map(Ok);
        }

        let balance = self.ledger.balance(&account).await?;
        let view = BlackjackView::of(&game, balance);
        if let Err(rejection) = self.sessions.update(key, game) {
            info!(extra, code = rejection.code(), "Game expired during the move");
            return Ok(Err(rejection));
        }
        Ok(Ok(view))
    }

    /// Credit a settled game, then drop its session.
    ///
    /// If the credit fails the game is parked in `unpaid` so the owner can
    /// collect later. When the store cannot say whether the credit landed,
    /// nothing is parked and the failure is logged for reconciliation.
    async fn settle(&self, key: &SessionKey, game: BlackjackGame) -> Result<BlackjackView> {
        let Some(settlement) = game.settlement() else {
            return Err(capo_common::EconomyError::Internal(format!(
                "settling unfinished game {key}"
            )));
        };
        let payout = settlement.payout;
        let total_bet = settlement.total_bet();

        match stake::pay(&self.ledger, &key.account(), payout, "blackjack payout").await {
            Ok(balance) => {
                self.sessions.delete(key);
                info!(total_bet, payout, "Blackjack settled");
                Ok(BlackjackView::of(&game, balance))
            }
            Err(e) => {
                self.sessions.delete(key);
                if e.outcome_unknown() {
                    error!(payout, error = %e, "Blackjack payout outcome unknown");
                } else {
                    warn!(payout, error = %e, "Blackjack payout failed, keeping game for collection");
                    self.unpaid.insert(key.clone(), game);
                }
                Err(e)
            }
        }
    }

    /// Retry the payout of a parked game, if there is one.
    async fn collect_unpaid(&self, key: &SessionKey) -> Result<Option<BlackjackView>> {
        let Some((_, game)) = self.unpaid.remove(key) else {
            return Ok(None);
        };
        debug!("Collecting unpaid blackjack payout");
        self.settle(key, game).await.map(Some)
    }
}
