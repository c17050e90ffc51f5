//! Daily and weekly claim rules.

use capo_common::{Balance, ClaimKind, ClaimSchedule, Rejection, Timestamp};
use serde::{Deserialize, Serialize};

use crate::account::ClaimState;

/// What a claim will pay and the streak it produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClaimPlan {
    pub amount: Balance,
    pub streak: u32,
}

/// Result of a successful claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimOutcome {
    pub kind: ClaimKind,
    pub amount: Balance,
    pub streak: u32,
    pub balance_after: Balance,
    /// Earliest time of the next claim.
    pub next_claim_at: Timestamp,
}

/// Decide whether a claim is allowed at `now` and what it pays.
///
/// A claim inside the cooldown is rejected. A claim made no later than
/// cooldown + grace after the previous one extends the streak; anything
/// later starts over at 1.
pub fn plan_claim(
    state: &ClaimState,
    kind: ClaimKind,
    schedule: &ClaimSchedule,
    now: Timestamp,
) -> Result<ClaimPlan, Rejection> {
    let streak = match state.last_claimed_at {
        Some(last) => {
            let ready_at = last + kind.cooldown();
            if now < ready_at {
                return Err(Rejection::OnCooldown { ready_at });
            }
            if now <= ready_at + schedule.grace() {
                state.streak.saturating_add(1)
            } else {
                1
            }
        }
        None => 1,
    };

    Ok(ClaimPlan {
        amount: schedule.reward(streak),
        streak,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use capo_common::{GuildConfig, GuildId};
    use chrono::Duration;

    fn schedule() -> ClaimSchedule {
        GuildConfig::new(GuildId::new("1")).daily
    }

    #[test]
    fn test_first_claim() {
        let plan = plan_claim(
            &ClaimState::default(),
            ClaimKind::Daily,
            &schedule(),
            capo_common::now(),
        )
        .unwrap();
        assert_eq!(plan, ClaimPlan { amount: 100, streak: 1 });
    }

    #[test]
    fn test_claim_on_cooldown() {
        let now = capo_common::now();
        let state = ClaimState {
            last_claimed_at: Some(now - Duration::hours(3)),
            streak: 2,
        };
        let err = plan_claim(&state, ClaimKind::Daily, &schedule(), now).unwrap_err();
        assert_eq!(
            err,
            Rejection::OnCooldown {
                ready_at: now + Duration::hours(21)
            }
        );
    }

    #[test]
    fn test_streak_extends_within_grace() {
        let now = capo_common::now();
        let state = ClaimState {
            last_claimed_at: Some(now - Duration::hours(30)),
            streak: 4,
        };
        let plan = plan_claim(&state, ClaimKind::Daily, &schedule(), now).unwrap();
        assert_eq!(plan, ClaimPlan { amount: 140, streak: 5 });
    }

    #[test]
    fn test_streak_resets_after_grace() {
        let now = capo_common::now();
        let state = ClaimState {
            last_claimed_at: Some(now - Duration::hours(49)),
            streak: 9,
        };
        let plan = plan_claim(&state, ClaimKind::Daily, &schedule(), now).unwrap();
        assert_eq!(plan.streak, 1);
    }

    #[test]
    fn test_weekly_cooldown() {
        let now = capo_common::now();
        let state = ClaimState {
            last_claimed_at: Some(now - Duration::days(6)),
            streak: 1,
        };
        let weekly = GuildConfig::new(GuildId::new("1")).weekly;
        assert!(plan_claim(&state, ClaimKind::Weekly, &weekly, now).is_err());
    }
}
