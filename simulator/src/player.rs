//! Simulated players.

use rand::rngs::StdRng;
use rand::Rng;

use capo_common::{ChannelId, ClaimKind, GuildId, UserId};
use capo_economy::PlayerAction;
use capo_games::{BlackjackAction, CoinSide, SlotTier};

use crate::scenario::{ActionKind, ActionMix};

/// Guild every simulated player lives in.
pub const GUILD_ID: &str = "700000000000000001";
/// Channel games are played in.
pub const CHANNEL_ID: &str = "700000000000000002";
/// Author of simulated rumble announcements.
pub const RUMBLE_BOT_ID: &str = "700000000000000003";
/// Administrator issuing grants.
pub const ADMIN_ID: &str = "700000000000000004";

/// A simulated player.
#[derive(Debug, Clone)]
pub struct SimulatedPlayer {
    pub user_id: UserId,
}

impl SimulatedPlayer {
    /// Player number `index`. Ids look like real platform ids so the rumble
    /// recognizer accepts mentions of them.
    pub fn new(index: usize) -> Self {
        Self {
            user_id: UserId::new(format!("{}", 800_000_000_000_000_000u64 + index as u64)),
        }
    }

    pub fn guild_id() -> GuildId {
        GuildId::new(GUILD_ID)
    }

    pub fn channel_id() -> ChannelId {
        ChannelId::new(CHANNEL_ID)
    }

    /// Pick the next single-step action. Blackjack is played by the
    /// controller since it spans several actions.
    pub fn next_action(
        &self,
        rng: &mut StdRng,
        mix: &ActionMix,
        peers: &[SimulatedPlayer],
    ) -> (ActionKind, PlayerAction) {
        let kind = mix.pick(rng);
        let guild_id = Self::guild_id();
        let user_id = self.user_id.clone();
        let stake = rng.gen_range(1..=50);

        let action = match kind {
            ActionKind::Claim => PlayerAction::Claim {
                guild_id,
                user_id,
                kind: if rng.gen_bool(0.8) {
                    ClaimKind::Daily
                } else {
                    ClaimKind::Weekly
                },
            },
            ActionKind::CoinFlip => PlayerAction::CoinFlip {
                guild_id,
                user_id,
                amount: stake,
                call: if rng.gen_bool(0.5) {
                    CoinSide::Heads
                } else {
                    CoinSide::Tails
                },
            },
            ActionKind::Dice => PlayerAction::Dice {
                guild_id,
                user_id,
                amount: stake,
            },
            ActionKind::Slots => {
                let tier = match rng.gen_range(0..10) {
                    0..=6 => SlotTier::Single,
                    7..=8 => SlotTier::AllLines,
                    _ => SlotTier::MaxBet,
                };
                let lines = match tier {
                    SlotTier::Single => Some(rng.gen_range(1..=7)),
                    _ => None,
                };
                PlayerAction::Slots {
                    guild_id,
                    user_id,
                    tier,
                    lines,
                }
            }
            ActionKind::Rob => {
                let target = &peers[rng.gen_range(0..peers.len())];
                PlayerAction::Rob {
                    guild_id,
                    user_id,
                    target_id: target.user_id.clone(),
                }
            }
            ActionKind::Blackjack => PlayerAction::BlackjackStart {
                guild_id,
                channel_id: Self::channel_id(),
                user_id,
                bet: stake,
            },
            ActionKind::Balance => PlayerAction::Balance { guild_id, user_id },
        };
        (kind, action)
    }

    /// A move for a running blackjack hand with the given total.
    pub fn blackjack_move(&self, rng: &mut StdRng, total: u32) -> PlayerAction {
        let play = match total {
            0..=11 => BlackjackAction::Hit,
            12..=16 if rng.gen_bool(0.5) => BlackjackAction::Hit,
            _ => BlackjackAction::Stand,
        };
        PlayerAction::BlackjackAct {
            guild_id: Self::guild_id(),
            channel_id: Self::channel_id(),
            user_id: self.user_id.clone(),
            owner_id: None,
            play,
        }
    }
}

/// Create `count` players.
pub fn create_players(count: usize) -> Vec<SimulatedPlayer> {
    (0..count).map(SimulatedPlayer::new).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_player_ids_are_mentionable() {
        let players = create_players(3);
        for player in &players {
            assert!(player.user_id.is_valid());
            assert_eq!(player.user_id.as_str().len(), 18);
        }
        assert_ne!(players[0].user_id, players[1].user_id);
    }

    #[test]
    fn test_actions_follow_mix() {
        let players = create_players(2);
        let mix = ActionMix::only(ActionKind::Dice);
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..10 {
            let (kind, action) = players[0].next_action(&mut rng, &mix, &players);
            assert_eq!(kind, ActionKind::Dice);
            assert!(matches!(action, PlayerAction::Dice { .. }));
        }
    }
}
