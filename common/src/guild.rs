//! Per-guild economy settings.

use crate::{Balance, ChannelId, GuildId, UserId};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Default announcement template for external awards.
pub const DEFAULT_RUMBLE_MESSAGE: &str = "{user} won the rumble and earned {amount} {currency}!";

/// The two periodic claims.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimKind {
    Daily,
    Weekly,
}

impl ClaimKind {
    /// Minimum time between two claims.
    pub fn cooldown(&self) -> Duration {
        match self {
            ClaimKind::Daily => Duration::hours(24),
            ClaimKind::Weekly => Duration::days(7),
        }
    }
}

/// Reward schedule for one claim kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimSchedule {
    /// Amount paid on the first claim of a streak.
    pub base: Balance,
    /// Extra amount per consecutive claim.
    pub streak_bonus: Balance,
    /// Upper bound on a single claim.
    pub cap: Balance,
    /// How long after the cooldown ends the streak survives.
    pub grace_hours: i64,
}

impl ClaimSchedule {
    /// Reward for a claim that brings the streak to `streak`.
    pub fn reward(&self, streak: u32) -> Balance {
        let bonus = self
            .streak_bonus
            .saturating_mul(u64::from(streak.saturating_sub(1)));
        self.base.saturating_add(bonus).min(self.cap)
    }

    /// Grace window as a duration.
    pub fn grace(&self) -> Duration {
        Duration::hours(self.grace_hours)
    }
}

/// Economy settings of one guild. Auto-created with defaults on first access.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildConfig {
    /// Guild these settings belong to.
    pub guild_id: GuildId,
    /// Display name of the currency.
    pub currency_name: String,
    /// Daily claim schedule.
    pub daily: ClaimSchedule,
    /// Weekly claim schedule.
    pub weekly: ClaimSchedule,
    /// Bot whose messages announce rumble winners.
    pub rumble_bot_id: Option<UserId>,
    /// Default payout for a rumble win.
    pub rumble_win_amount: Balance,
    /// Per-channel payout overrides.
    #[serde(default)]
    pub channel_payouts: HashMap<ChannelId, Balance>,
    /// Announcement template; supports `{user}`, `{amount}` and `{currency}`.
    pub rumble_message: String,
}

impl GuildConfig {
    /// Default settings for a guild.
    pub fn new(guild_id: GuildId) -> Self {
        Self {
            guild_id,
            currency_name: "Capo Cash".to_string(),
            daily: ClaimSchedule {
                base: 100,
                streak_bonus: 10,
                cap: 500,
                grace_hours: 24,
            },
            weekly: ClaimSchedule {
                base: 1000,
                streak_bonus: 100,
                cap: 3000,
                grace_hours: 48,
            },
            rumble_bot_id: None,
            rumble_win_amount: 250,
            channel_payouts: HashMap::new(),
            rumble_message: DEFAULT_RUMBLE_MESSAGE.to_string(),
        }
    }

    /// Schedule for a claim kind.
    pub fn schedule(&self, kind: ClaimKind) -> &ClaimSchedule {
        match kind {
            ClaimKind::Daily => &self.daily,
            ClaimKind::Weekly => &self.weekly,
        }
    }

    /// Rumble payout for a channel, honouring overrides.
    pub fn rumble_payout(&self, channel_id: &ChannelId) -> Balance {
        self.channel_payouts
            .get(channel_id)
            .copied()
            .unwrap_or(self.rumble_win_amount)
    }

    /// Render the announcement template.
    pub fn render_rumble_message(&self, user: &UserId, amount: Balance) -> String {
        self.rumble_message
            .replace("{user}", &format!("<@{user}>"))
            .replace("{amount}", &amount.to_string())
            .replace("{currency}", &self.currency_name)
    }
}
