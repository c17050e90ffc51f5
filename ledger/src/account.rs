//! Account definitions for ledger.

use capo_common::{constants, AccountRef, Balance, ClaimKind, Rejection, Timestamp};
use serde::{Deserialize, Serialize};

/// Claim bookkeeping for one claim kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClaimState {
    /// When the last successful claim happened.
    pub last_claimed_at: Option<Timestamp>,
    /// Consecutive claims made inside the grace window.
    pub streak: u32,
}

/// A ledger account. Created lazily with a zero balance, never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Account reference.
    pub account: AccountRef,
    /// Current balance.
    pub balance: Balance,
    /// Daily claim state.
    pub daily: ClaimState,
    /// Weekly claim state.
    pub weekly: ClaimState,
    /// Whether the user has opted in to robbery.
    pub robbable: bool,
    /// The robbable flag cannot change before this time.
    pub robbable_locked_until: Option<Timestamp>,
    /// Last robbery attempt made by this user.
    pub last_rob_at: Option<Timestamp>,
    /// When the account was created.
    pub created_at: Timestamp,
    /// When the account was last updated.
    pub updated_at: Timestamp,
}

impl Account {
    /// Create a new, empty account.
    pub fn new(account: AccountRef, now: Timestamp) -> Self {
        Self {
            account,
            balance: 0,
            daily: ClaimState::default(),
            weekly: ClaimState::default(),
            robbable: false,
            robbable_locked_until: None,
            last_rob_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Claim state for a kind.
    pub fn claim_state(&self, kind: ClaimKind) -> &ClaimState {
        match kind {
            ClaimKind::Daily => &self.daily,
            ClaimKind::Weekly => &self.weekly,
        }
    }

    /// Mutable claim state for a kind.
    pub fn claim_state_mut(&mut self, kind: ClaimKind) -> &mut ClaimState {
        match kind {
            ClaimKind::Daily => &mut self.daily,
            ClaimKind::Weekly => &mut self.weekly,
        }
    }

    /// Change the robbable flag, respecting the toggle lock.
    pub fn set_robbable(&mut self, robbable: bool, now: Timestamp) -> Result<(), Rejection> {
        if let Some(until) = self.robbable_locked_until {
            if now < until {
                return Err(Rejection::ToggleLocked { until });
            }
        }
        self.robbable = robbable;
        self.robbable_locked_until = Some(now + constants::robbable_toggle_lock());
        self.updated_at = now;
        Ok(())
    }

    /// Record a robbery attempt, respecting the robber cooldown.
    pub fn start_rob_attempt(&mut self, now: Timestamp) -> Result<(), Rejection> {
        if !self.robbable {
            return Err(Rejection::NotRobbable);
        }
        if let Some(last) = self.last_rob_at {
            let ready_at = last + constants::rob_cooldown();
            if now < ready_at {
                return Err(Rejection::OnCooldown { ready_at });
            }
        }
        self.last_rob_at = Some(now);
        self.updated_at = now;
        Ok(())
    }
}
