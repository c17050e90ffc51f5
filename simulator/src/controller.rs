//! Simulation controller.

use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use capo_common::{AccountRef, TransactionCategory, UserId};
use capo_economy::{ActionReply, Economy, EconomyConfig, IncomingMessage, PlayerAction};

use crate::metrics::SimulationMetrics;
use crate::player::{self, SimulatedPlayer, ADMIN_ID, RUMBLE_BOT_ID};
use crate::scenario::{ActionKind, Scenario};

/// Upper bound on moves in one blackjack game.
const MAX_BLACKJACK_MOVES: usize = 12;

/// Result of the post-run consistency check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuditSummary {
    pub accounts: usize,
    pub failures: usize,
    /// External award records found across all accounts.
    pub awards_recorded: usize,
    /// Distinct announcements posted.
    pub awards_expected: usize,
}

impl AuditSummary {
    pub fn is_clean(&self) -> bool {
        self.failures == 0 && self.awards_recorded == self.awards_expected
    }
}

/// Controls the simulation.
pub struct SimulationController {
    /// Base seed; every worker derives its own generator from it.
    seed: u64,
    economy: Arc<Economy>,
    players: Arc<Vec<SimulatedPlayer>>,
    metrics: Arc<Mutex<SimulationMetrics>>,
}

impl SimulationController {
    /// Create a controller with `player_count` players over an in-memory
    /// economy.
    pub fn new(player_count: usize, seed: Option<u64>) -> anyhow::Result<Self> {
        let seed = seed.unwrap_or_else(rand::random);
        let mut config = EconomyConfig::default();
        config.games.rng_seed = Some(seed);

        Ok(Self {
            seed,
            economy: Arc::new(Economy::in_memory(config)?),
            players: Arc::new(player::create_players(player_count.max(2))),
            metrics: Arc::new(Mutex::new(SimulationMetrics::new())),
        })
    }

    /// Seed used for this run.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Start the economy and prepare players for `scenario`.
    pub async fn initialize(&self, scenario: &Scenario) -> anyhow::Result<()> {
        info!("Initializing simulation with {} players", self.players.len());
        self.economy.start().await?;

        self.expect_ok(
            PlayerAction::SetRumbleBot {
                guild_id: SimulatedPlayer::guild_id(),
                bot_id: Some(UserId::new(RUMBLE_BOT_ID)),
            },
        )
        .await?;

        for player in self.players.iter() {
            if scenario.starting_balance > 0 {
                self.expect_ok(PlayerAction::Give {
                    guild_id: SimulatedPlayer::guild_id(),
                    admin_id: UserId::new(ADMIN_ID),
                    target_id: player.user_id.clone(),
                    amount: scenario.starting_balance,
                    reason: Some("simulation bankroll".to_string()),
                })
                .await?;
            }
            if scenario.robbable {
                self.expect_ok(PlayerAction::SetRobbable {
                    guild_id: SimulatedPlayer::guild_id(),
                    user_id: player.user_id.clone(),
                    robbable: true,
                })
                .await?;
            }
        }
        Ok(())
    }

    async fn expect_ok(&self, action: PlayerAction) -> anyhow::Result<()> {
        match self.economy.handle(action).await {
            ActionReply::Rejected { code, .. } | ActionReply::Failed { code, .. } => {
                Err(anyhow::anyhow!("setup action refused: {}", code))
            }
            _ => Ok(()),
        }
    }

    /// Run a scenario: all players and all announcement deliveries at once.
    pub async fn run_scenario(&self, scenario: &Scenario) -> anyhow::Result<()> {
        info!("Running scenario: {} - {}", scenario.name, scenario.description);
        let started = Instant::now();

        let mut handles = Vec::new();
        for (index, player) in self.players.iter().enumerate() {
            let economy = self.economy.clone();
            let players = self.players.clone();
            let player = player.clone();
            let scenario = scenario.clone();
            let mut rng = StdRng::seed_from_u64(self.seed ^ (index as u64 + 1));

            handles.push(tokio::spawn(async move {
                let mut metrics = SimulationMetrics::new();
                for _ in 0..scenario.rounds {
                    let (kind, action) = player.next_action(&mut rng, &scenario.mix, &players);
                    if kind == ActionKind::Blackjack {
                        play_blackjack(&economy, &player, &mut rng, action, &mut metrics).await;
                    } else {
                        timed(&economy, Some(kind), action, &mut metrics).await;
                    }
                }
                metrics
            }));
        }

        let economy = self.economy.clone();
        let players = self.players.clone();
        let rumble = scenario.clone();
        let mut rng = StdRng::seed_from_u64(self.seed.rotate_left(17));
        handles.push(tokio::spawn(async move {
            let mut metrics = SimulationMetrics::new();
            for event in 0..rumble.rumble_events {
                let winner = &players[rng.gen_range(0..players.len())];
                let message = IncomingMessage {
                    message_id: format!("{}", 900_000_000_000_000_000u64 + event as u64),
                    channel_id: SimulatedPlayer::channel_id(),
                    author_id: UserId::new(RUMBLE_BOT_ID),
                    content: format!("<@{}> is the last one standing!", winner.user_id),
                };
                deliver(&economy, &message, rumble.deliveries_per_event, &mut metrics).await;
            }
            metrics
        }));

        for handle in handles {
            match handle.await {
                Ok(worker) => self.metrics.lock().await.merge(worker),
                Err(e) => error!(error = %e, "Simulation worker panicked"),
            }
        }

        info!(elapsed_ms = started.elapsed().as_millis() as u64, "Scenario finished");
        Ok(())
    }

    /// Check every account's log against its balance and count external
    /// awards.
    pub async fn audit(&self, scenario: &Scenario) -> anyhow::Result<AuditSummary> {
        let ledger = self.economy.ledger();
        let mut summary = AuditSummary {
            accounts: 0,
            failures: 0,
            awards_recorded: 0,
            awards_expected: scenario.rumble_events,
        };

        for player in self.players.iter() {
            let account = AccountRef::new(SimulatedPlayer::guild_id(), player.user_id.clone());
            let passed = match ledger.audit(&account).await? {
                Ok(_) => true,
                Err(failure) => {
                    error!(account = %account, %failure, "Audit failed");
                    false
                }
            };
            summary.accounts += 1;
            if !passed {
                summary.failures += 1;
            }
            self.metrics.lock().await.record_audit(passed);

            summary.awards_recorded += ledger
                .transactions(&account)
                .await?
                .iter()
                .filter(|r| r.category == TransactionCategory::ExternalAward)
                .count();
        }

        if summary.awards_recorded != summary.awards_expected {
            warn!(
                recorded = summary.awards_recorded,
                expected = summary.awards_expected,
                "External award count mismatch"
            );
        }
        Ok(summary)
    }

    /// Get simulation metrics.
    pub async fn metrics(&self) -> SimulationMetrics {
        self.metrics.lock().await.clone()
    }

    /// Economy-side counters.
    pub fn economy_metrics(&self) -> capo_economy::MetricsSnapshot {
        self.economy.metrics().snapshot()
    }

    /// Stop the economy.
    pub async fn stop(&self) -> anyhow::Result<()> {
        self.economy.stop().await?;
        Ok(())
    }
}

async fn timed(
    economy: &Economy,
    kind: Option<ActionKind>,
    action: PlayerAction,
    metrics: &mut SimulationMetrics,
) -> ActionReply {
    let started = Instant::now();
    let reply = economy.handle(action).await;
    metrics.record(kind, &reply, started.elapsed().as_micros() as u64);
    reply
}

/// Start a game and play it to the end or until a move is refused.
async fn play_blackjack(
    economy: &Economy,
    player: &SimulatedPlayer,
    rng: &mut StdRng,
    start: PlayerAction,
    metrics: &mut SimulationMetrics,
) {
    let mut reply = timed(economy, Some(ActionKind::Blackjack), start, metrics).await;
    for _ in 0..MAX_BLACKJACK_MOVES {
        let ActionReply::Blackjack { view } = &reply else {
            return;
        };
        if view.settlement.is_some() {
            return;
        }
        let Some(total) = view
            .active_hand
            .and_then(|i| view.hands.get(i))
            .map(|hand| hand.score().total)
        else {
            return;
        };
        let action = player.blackjack_move(rng, total);
        reply = timed(economy, None, action, metrics).await;
    }
}

/// Deliver one announcement `deliveries` times concurrently.
async fn deliver(
    economy: &Economy,
    message: &IncomingMessage,
    deliveries: usize,
    metrics: &mut SimulationMetrics,
) {
    let started = Instant::now();
    let replies = join_all((0..deliveries).map(|_| {
        economy.handle(PlayerAction::ExternalMessage {
            guild_id: SimulatedPlayer::guild_id(),
            message: message.clone(),
        })
    }))
    .await;
    let latency = started.elapsed().as_micros() as u64;
    for reply in &replies {
        metrics.record(None, reply, latency);
    }
}
