//! Simulation scenarios.

use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Kinds of player actions the simulator issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Balance,
    Claim,
    CoinFlip,
    Dice,
    Slots,
    Blackjack,
    Rob,
}

/// Relative weights of action kinds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionMix {
    weights: Vec<(ActionKind, u32)>,
}

impl ActionMix {
    pub fn new(weights: Vec<(ActionKind, u32)>) -> Self {
        Self { weights }
    }

    /// A mix with a single action kind.
    pub fn only(kind: ActionKind) -> Self {
        Self::new(vec![(kind, 1)])
    }

    /// Draw one action kind. An all-zero mix checks balances.
    pub fn pick(&self, rng: &mut StdRng) -> ActionKind {
        let total: u32 = self.weights.iter().map(|(_, w)| w).sum();
        if total == 0 {
            return ActionKind::Balance;
        }
        let mut roll = rng.gen_range(0..total);
        for (kind, weight) in &self.weights {
            if roll < *weight {
                return *kind;
            }
            roll -= weight;
        }
        ActionKind::Balance
    }
}

/// A simulation scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Scenario name.
    pub name: String,
    /// Description.
    pub description: String,
    /// Actions each player issues.
    pub rounds: usize,
    /// Which actions players pick.
    pub mix: ActionMix,
    /// Distinct rumble announcements posted during the run.
    pub rumble_events: usize,
    /// How many times each announcement is delivered, concurrently.
    pub deliveries_per_event: usize,
    /// Grant every player receives before the run.
    pub starting_balance: u64,
    /// Whether players opt in to robbery.
    pub robbable: bool,
}

impl Scenario {
    /// Load a scenario by name.
    pub fn load(name: &str) -> anyhow::Result<Self> {
        match name {
            "casino-floor" => Ok(Self::casino_floor()),
            "rumble-storm" => Ok(Self::rumble_storm()),
            "heist-night" => Ok(Self::heist_night()),
            "mixed" => Ok(Self::mixed()),
            _ => Err(anyhow::anyhow!("Unknown scenario: {}", name)),
        }
    }

    /// Every game, no external events.
    fn casino_floor() -> Self {
        Self {
            name: "casino-floor".to_string(),
            description: "Players gamble on every game".to_string(),
            rounds: 200,
            mix: ActionMix::new(vec![
                (ActionKind::CoinFlip, 3),
                (ActionKind::Dice, 3),
                (ActionKind::Slots, 3),
                (ActionKind::Blackjack, 2),
                (ActionKind::Balance, 1),
            ]),
            rumble_events: 0,
            deliveries_per_event: 0,
            starting_balance: 5_000,
            robbable: false,
        }
    }

    /// Many announcements, each delivered several times at once.
    fn rumble_storm() -> Self {
        Self {
            name: "rumble-storm".to_string(),
            description: "Duplicate deliveries of award announcements".to_string(),
            rounds: 20,
            mix: ActionMix::new(vec![(ActionKind::Balance, 1), (ActionKind::Claim, 1)]),
            rumble_events: 200,
            deliveries_per_event: 8,
            starting_balance: 0,
            robbable: false,
        }
    }

    /// Robbery-heavy run between opted-in players.
    fn heist_night() -> Self {
        Self {
            name: "heist-night".to_string(),
            description: "Opted-in players rob each other".to_string(),
            rounds: 50,
            mix: ActionMix::new(vec![(ActionKind::Rob, 4), (ActionKind::CoinFlip, 1)]),
            rumble_events: 0,
            deliveries_per_event: 0,
            starting_balance: 10_000,
            robbable: true,
        }
    }

    /// A bit of everything.
    fn mixed() -> Self {
        Self {
            name: "mixed".to_string(),
            description: "Games, claims, robbery and announcements together".to_string(),
            rounds: 100,
            mix: ActionMix::new(vec![
                (ActionKind::Claim, 1),
                (ActionKind::CoinFlip, 2),
                (ActionKind::Dice, 2),
                (ActionKind::Slots, 2),
                (ActionKind::Blackjack, 2),
                (ActionKind::Rob, 1),
                (ActionKind::Balance, 1),
            ]),
            rumble_events: 50,
            deliveries_per_event: 3,
            starting_balance: 2_000,
            robbable: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_known_scenarios_load() {
        for name in ["casino-floor", "rumble-storm", "heist-night", "mixed"] {
            assert_eq!(Scenario::load(name).unwrap().name, name);
        }
        assert!(Scenario::load("bank-run").is_err());
    }

    #[test]
    fn test_zero_weights_never_picked() {
        let mix = ActionMix::new(vec![(ActionKind::Dice, 0), (ActionKind::Slots, 5)]);
        let mut rng = StdRng::seed_from_u64(9);
        for _ in 0..100 {
            assert_eq!(mix.pick(&mut rng), ActionKind::Slots);
        }
    }
}
