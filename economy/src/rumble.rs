//! Recognition of award announcements posted by the rumble bot.

use std::sync::OnceLock;

use capo_common::{Balance, ChannelId, ExternalEventId, GuildConfig, UserId};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// A platform message as seen by the economy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomingMessage {
    /// Platform message id; doubles as the external event id.
    pub message_id: String,
    pub channel_id: ChannelId,
    pub author_id: UserId,
    pub content: String,
}

/// A recognized award announcement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RumbleWin {
    pub event_id: ExternalEventId,
    pub winner: UserId,
    pub amount: Balance,
}

fn mention_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"<@!?(\d{17,20})>").ok())
        .as_ref()
}

/// First user mentioned in `content`, if any.
pub fn first_mention(content: &str) -> Option<UserId> {
    mention_pattern()?
        .captures(content)
        .and_then(|caps| caps.get(1))
        .map(|m| UserId::new(m.as_str()))
}

/// Recognize `message` as a rumble win under `config`.
///
/// Only messages authored by the configured rumble bot count. The winner is
/// the first mention and the payout honours per-channel overrides.
pub fn recognize(config: &GuildConfig, message: &IncomingMessage) -> Option<RumbleWin> {
    let bot = config.rumble_bot_id.as_ref()?;
    if &message.author_id != bot {
        return None;
    }
    let winner = first_mention(&message.content)?;
    Some(RumbleWin {
        event_id: ExternalEventId::new(message.message_id.clone()),
        winner,
        amount: config.rumble_payout(&message.channel_id),
    })
}
