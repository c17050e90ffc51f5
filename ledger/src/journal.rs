//! Transaction log auditing.
//!
//! An account's log must replay to its balance: the first record starts at
//! zero, every record's `balance_before` equals the previous record's
//! `balance_after`, and every record satisfies
//! `balance_after = balance_before + amount`.

use capo_common::{apply_delta, AccountRef, Balance, TransactionRecord};
use thiserror::Error;

use crate::account::Account;

/// A violation found while auditing a log.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuditFailure {
    /// A record's before/after do not match its amount.
    #[error("record {index} of {account}: {before} + {amount} != {after}")]
    Arithmetic {
        account: AccountRef,
        index: usize,
        before: Balance,
        amount: i64,
        after: Balance,
    },

    /// A record does not start where the previous one ended.
    #[error("record {index} of {account} starts at {actual}, previous ended at {expected}")]
    ChainBreak {
        account: AccountRef,
        index: usize,
        expected: Balance,
        actual: Balance,
    },

    /// The replayed log disagrees with the stored balance.
    #[error("{account} holds {stored} but its log replays to {replayed}")]
    BalanceMismatch {
        account: AccountRef,
        stored: Balance,
        replayed: Balance,
    },
}

/// Summary of a clean audit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuditReport {
    /// Records checked.
    pub records: usize,
    /// Sum of all signed amounts.
    pub net_amount: i128,
    /// Balance the log replays to.
    pub replayed_balance: Balance,
}

/// Sum of all signed amounts in a log.
pub fn net_amount(records: &[TransactionRecord]) -> i128 {
    records.iter().map(|r| i128::from(r.amount)).sum()
}

/// Verify that `records` (in append order) form one unbroken chain from zero
/// to `account.balance`.
pub fn audit(account: &Account, records: &[TransactionRecord]) -> Result<AuditReport, AuditFailure> {
    let mut expected: Balance = 0;

    for (index, record) in records.iter().enumerate() {
        if record.balance_before != expected {
            return Err(AuditFailure::ChainBreak {
                account: account.account.clone(),
                index,
                expected,
                actual: record.balance_before,
            });
        }
        if apply_delta(record.balance_before, record.amount) != Some(record.balance_after) {
            return Err(AuditFailure::Arithmetic {
                account: account.account.clone(),
                index,
                before: record.balance_before,
                amount: record.amount,
                after: record.balance_after,
            });
        }
        expected = record.balance_after;
    }

    if expected != account.balance {
        return Err(AuditFailure::BalanceMismatch {
            account: account.account.clone(),
            stored: account.balance,
            replayed: expected,
        });
    }

    Ok(AuditReport {
        records: records.len(),
        net_amount: net_amount(records),
        replayed_balance: expected,
    })
}
