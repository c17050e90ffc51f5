//! Currency amounts.
//!
//! Balances are whole units of the guild currency (`u64`); ledger deltas are
//! signed (`i64`). All arithmetic is checked so an overflowing payout is
//! reported instead of wrapping.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A non-negative account balance in the currency's smallest unit.
pub type Balance = u64;

/// A signed ledger delta: positive credits, negative debits.
pub type SignedAmount = i64;

/// Largest single wager or grant accepted. Keeps every derived payout
/// (at most 2.5x for blackjack naturals, 3x for dice) inside `i64`.
pub const MAX_AMOUNT: u64 = (i64::MAX as u64) / 4;

/// Compute `balance + delta`, returning `None` when the result would be
/// negative or overflow.
pub fn apply_delta(balance: Balance, delta: SignedAmount) -> Option<Balance> {
    let next = i128::from(balance) + i128::from(delta);
    if next < 0 || next > i128::from(u64::MAX) {
        None
    } else {
        Some(next as Balance)
    }
}

/// Convert a credit amount to a signed delta.
pub fn credit(amount: u64) -> SignedAmount {
    amount.min(i64::MAX as u64) as SignedAmount
}

/// Convert a debit amount to a signed delta.
pub fn debit(amount: u64) -> SignedAmount {
    -credit(amount)
}

/// A validated, strictly positive stake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct Wager(u64);

impl Wager {
    /// Create a wager; zero and oversized amounts are refused.
    pub fn new(amount: u64) -> Option<Self> {
        if amount == 0 || amount > MAX_AMOUNT {
            None
        } else {
            Some(Self(amount))
        }
    }

    /// The staked amount.
    pub fn amount(&self) -> u64 {
        self.0
    }

    /// The wager multiplied by `factor`, saturating.
    pub fn times(&self, factor: u64) -> u64 {
        self.0.saturating_mul(factor)
    }
}

impl TryFrom<u64> for Wager {
    type Error = String;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        Wager::new(value).ok_or_else(|| format!("invalid wager amount {value}"))
    }
}

impl From<Wager> for u64 {
    fn from(wager: Wager) -> Self {
        wager.0
    }
}

impl fmt::Display for Wager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_delta() {
        assert_eq!(apply_delta(100, -40), Some(60));
        assert_eq!(apply_delta(100, -100), Some(0));
        assert_eq!(apply_delta(100, -101), None);
        assert_eq!(apply_delta(u64::MAX, 1), None);
        assert_eq!(apply_delta(0, 25), Some(25));
    }

    #[test]
    fn test_wager_validation() {
        assert!(Wager::new(0).is_none());
        assert!(Wager::new(MAX_AMOUNT + 1).is_none());
        assert_eq!(Wager::new(10).unwrap().times(3), 30);
    }

    #[test]
    fn test_wager_deserialize_rejects_zero() {
        assert!(serde_json::from_str::<Wager>("0").is_err());
        assert_eq!(serde_json::from_str::<Wager>("15").unwrap().amount(), 15);
    }
}
