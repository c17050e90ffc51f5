//! Single-shot wagers: coin flip and die roll.

use std::sync::Arc;

use capo_common::{AccountRef, Balance, Rejection, Result, Wager};
use capo_ledger::LedgerEngine;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::rng::GameRng;
use crate::stake;

/// Coin flip returns twice the wager on a correct call.
pub const COIN_FLIP_MULTIPLIER: u64 = 2;
/// A winning die roll returns three times the wager.
pub const DIE_MULTIPLIER: u64 = 3;
/// Lowest winning die face.
pub const DIE_WINNING_FACE: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoinSide {
    Heads,
    Tails,
}

/// Result of a single-shot wager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WagerOutcome<T> {
    pub wager: Balance,
    pub drawn: T,
    pub won: bool,
    pub payout: Balance,
    pub balance: Balance,
}

/// Coin flip and die roll against the ledger.
pub struct QuickGames {
    ledger: Arc<LedgerEngine>,
    rng: GameRng,
}

impl QuickGames {
    pub fn new(ledger: Arc<LedgerEngine>, rng: GameRng) -> Self {
        Self { ledger, rng }
    }

    /// Call a side; a correct call pays [`COIN_FLIP_MULTIPLIER`]x.
    pub async fn coin_flip(
        &self,
        account: &AccountRef,
        amount: u64,
        call: CoinSide,
    ) -> Result<std::result::Result<WagerOutcome<CoinSide>, Rejection>> {
        self.play(account, amount, "coinflip", COIN_FLIP_MULTIPLIER, || {
            let side = if self.rng.coin() {
                CoinSide::Heads
            } else {
                CoinSide::Tails
            };
            (side, side == call)
        })
        .await
    }

    /// Roll one die; [`DIE_WINNING_FACE`] or higher pays [`DIE_MULTIPLIER`]x.
    pub async fn roll_die(
        &self,
        account: &AccountRef,
        amount: u64,
    ) -> Result<std::result::Result<WagerOutcome<u32>, Rejection>> {
        self.play(account, amount, "dice", DIE_MULTIPLIER, || {
            let face = self.rng.range_inclusive(1, 6);
            (face, face >= DIE_WINNING_FACE)
        })
        .await
    }

    /// Charge, draw, and credit on a win. Nothing is drawn when the charge
    /// is declined.
    async fn play<T, F>(
        &self,
        account: &AccountRef,
        amount: u64,
        game: &str,
        multiplier: u64,
        draw: F,
    ) -> Result<std::result::Result<WagerOutcome<T>, Rejection>>
    where
        F: FnOnce() -> (T, bool),
    {
        let Some(wager) = Wager::new(amount) else {
            return Ok(Err(Rejection::InvalidAmount));
        };

        let mut balance =
            match stake::charge(&self.ledger, account, wager.amount(), &format!("{game} bet")).await? {
                Ok(balance) => balance,
                Err(rejection) => return Ok(Err(rejection)),
            };

        let (drawn, won) = draw();
        let payout = if won { wager.times(multiplier) } else { 0 };
        if won {
            balance = stake::pay(&self.ledger, account, payout, &format!("{game} win")).await?;
        }
        debug!(game, account = %account, wager = wager.amount(), won, payout, "Wager settled");

        Ok(Ok(WagerOutcome {
            wager: wager.amount(),
            drawn,
            won,
            payout,
            balance,
        }))
    }
}
