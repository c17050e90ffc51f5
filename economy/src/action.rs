//! Closed set of player actions and replies.
//!
//! Every intent the presentation layer can express is one [`PlayerAction`]
//! variant, and every variant has exactly one handler in
//! [`crate::Economy::handle`].

use capo_common::{
    AccountRef, Balance, ChannelId, ClaimKind, EconomyError, GuildConfig, GuildId, Rejection,
    SignedAmount, Timestamp, UserId,
};
use capo_games::{BlackjackAction, BlackjackView, CoinSide, SlotTier, SpinOutcome, WagerOutcome};
use capo_ledger::{ClaimOutcome, LeaderboardPage};
use serde::{Deserialize, Serialize};

use crate::robbery::RobOutcome;
use crate::rumble::IncomingMessage;

/// A player or administrator intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PlayerAction {
    Balance {
        guild_id: GuildId,
        user_id: UserId,
    },
    Leaderboard {
        guild_id: GuildId,
        #[serde(default)]
        page: Option<u64>,
        #[serde(default)]
        per_page: Option<u64>,
    },
    Claim {
        guild_id: GuildId,
        user_id: UserId,
        kind: ClaimKind,
    },
    /// Administrative credit.
    Give {
        guild_id: GuildId,
        admin_id: UserId,
        target_id: UserId,
        amount: u64,
        #[serde(default)]
        reason: Option<String>,
    },
    /// Administrative debit. Never clamps.
    Take {
        guild_id: GuildId,
        admin_id: UserId,
        target_id: UserId,
        amount: u64,
        #[serde(default)]
        reason: Option<String>,
    },
    SetRobbable {
        guild_id: GuildId,
        user_id: UserId,
        robbable: bool,
    },
    Rob {
        guild_id: GuildId,
        user_id: UserId,
        target_id: UserId,
    },
    CoinFlip {
        guild_id: GuildId,
        user_id: UserId,
        amount: u64,
        call: CoinSide,
    },
    Dice {
        guild_id: GuildId,
        user_id: UserId,
        amount: u64,
    },
    Slots {
        guild_id: GuildId,
        user_id: UserId,
        tier: SlotTier,
        #[serde(default)]
        lines: Option<u8>,
    },
    SlotsReplay {
        guild_id: GuildId,
        user_id: UserId,
    },
    BlackjackStart {
        guild_id: GuildId,
        channel_id: ChannelId,
        user_id: UserId,
        bet: u64,
    },
    /// A move in a running game. `owner_id` names the game's owner when
    /// someone else is pressing the button; it defaults to `user_id`.
    BlackjackAct {
        guild_id: GuildId,
        channel_id: ChannelId,
        user_id: UserId,
        #[serde(default)]
        owner_id: Option<UserId>,
        play: BlackjackAction,
    },
    /// A message observed in a guild channel.
    ExternalMessage {
        guild_id: GuildId,
        message: IncomingMessage,
    },
    SetRumbleMessage {
        guild_id: GuildId,
        template: String,
    },
    SetRumbleBot {
        guild_id: GuildId,
        #[serde(default)]
        bot_id: Option<UserId>,
    },
    /// Override the rumble payout of one channel; `None` removes it.
    SetChannelPayout {
        guild_id: GuildId,
        channel_id: ChannelId,
        #[serde(default)]
        amount: Option<Balance>,
    },
    ViewConfig {
        guild_id: GuildId,
    },
}

impl PlayerAction {
    /// Stable action name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            PlayerAction::Balance { .. } => "balance",
            PlayerAction::Leaderboard { .. } => "leaderboard",
            PlayerAction::Claim { .. } => "claim",
            PlayerAction::Give { .. } => "give",
            PlayerAction::Take { .. } => "take",
            PlayerAction::SetRobbable { .. } => "set_robbable",
            PlayerAction::Rob { .. } => "rob",
            PlayerAction::CoinFlip { .. } => "coin_flip",
            PlayerAction::Dice { .. } => "dice",
            PlayerAction::Slots { .. } => "slots",
            PlayerAction::SlotsReplay { .. } => "slots_replay",
            PlayerAction::BlackjackStart { .. } => "blackjack_start",
            PlayerAction::BlackjackAct { .. } => "blackjack_act",
            PlayerAction::ExternalMessage { .. } => "external_message",
            PlayerAction::SetRumbleMessage { .. } => "set_rumble_message",
            PlayerAction::SetRumbleBot { .. } => "set_rumble_bot",
            PlayerAction::SetChannelPayout { .. } => "set_channel_payout",
            PlayerAction::ViewConfig { .. } => "view_config",
        }
    }

    /// Guild the action targets.
    pub fn guild_id(&self) -> &GuildId {
        match self {
            PlayerAction::Balance { guild_id, .. }
            | PlayerAction::Leaderboard { guild_id, .. }
            | PlayerAction::Claim { guild_id, .. }
            | PlayerAction::Give { guild_id, .. }
            | PlayerAction::Take { guild_id, .. }
            | PlayerAction::SetRobbable { guild_id, .. }
            | PlayerAction::Rob { guild_id, .. }
            | PlayerAction::CoinFlip { guild_id, .. }
            | PlayerAction::Dice { guild_id, .. }
            | PlayerAction::Slots { guild_id, .. }
            | PlayerAction::SlotsReplay { guild_id, .. }
            | PlayerAction::BlackjackStart { guild_id, .. }
            | PlayerAction::BlackjackAct { guild_id, .. }
            | PlayerAction::ExternalMessage { guild_id, .. }
            | PlayerAction::SetRumbleMessage { guild_id, .. }
            | PlayerAction::SetRumbleBot { guild_id, .. }
            | PlayerAction::SetChannelPayout { guild_id, .. }
            | PlayerAction::ViewConfig { guild_id } => guild_id,
        }
    }
}

/// What the presentation layer gets back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reply", rename_all = "snake_case")]
pub enum ActionReply {
    Balance {
        account: AccountRef,
        balance: Balance,
    },
    Leaderboard {
        page: LeaderboardPage,
    },
    Claimed {
        outcome: ClaimOutcome,
    },
    /// An administrative grant or take was applied.
    Adjusted {
        account: AccountRef,
        amount: SignedAmount,
        balance_after: Balance,
    },
    RobbableSet {
        robbable: bool,
        locked_until: Option<Timestamp>,
    },
    Robbery {
        outcome: RobOutcome,
    },
    CoinFlip {
        outcome: WagerOutcome<CoinSide>,
    },
    Dice {
        outcome: WagerOutcome<u32>,
    },
    Slots {
        outcome: SpinOutcome,
    },
    Blackjack {
        view: BlackjackView,
    },
    /// A recognized award announcement. `credited` is false for a redelivery.
    ExternalAward {
        winner: UserId,
        amount: Balance,
        credited: bool,
        announcement: Option<String>,
    },
    /// The message was not an award announcement.
    Ignored,
    Config {
        config: GuildConfig,
    },
    /// A business rule said no; nothing changed.
    Rejected {
        code: String,
        message: String,
        rejection: Rejection,
    },
    /// Infrastructure failure. Carries no internal detail.
    Failed {
        code: String,
        message: String,
    },
}

impl ActionReply {
    pub fn rejected(rejection: Rejection) -> Self {
        ActionReply::Rejected {
            code: rejection.code().to_string(),
            message: rejection.message(),
            rejection,
        }
    }

    pub fn failed(error: &EconomyError) -> Self {
        ActionReply::Failed {
            code: error.error_code().to_string(),
            message: error.user_message().to_string(),
        }
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, ActionReply::Rejected { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ActionReply::Failed { .. })
    }
}
