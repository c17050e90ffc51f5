//! Capo Cash Simulator
//!
//! Drives concurrent players and duplicate award announcements against an
//! in-memory economy, then audits every account.

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod controller;
mod metrics;
mod player;
mod scenario;

use controller::SimulationController;
use scenario::Scenario;

/// Capo Cash Simulator CLI
#[derive(Parser, Debug)]
#[command(name = "simulator")]
#[command(about = "Load and consistency simulator for the Capo Cash economy")]
struct Args {
    /// Number of simulated players
    #[arg(short, long, default_value = "16")]
    players: usize,

    /// Scenario to run: casino-floor, rumble-storm, heist-night or mixed
    #[arg(short, long, default_value = "mixed")]
    scenario: String,

    /// Override the number of actions per player
    #[arg(long)]
    rounds: Option<usize>,

    /// Random seed for reproducibility
    #[arg(long)]
    seed: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let mut scenario = Scenario::load(&args.scenario)?;
    if let Some(rounds) = args.rounds {
        scenario.rounds = rounds;
    }

    let controller = SimulationController::new(args.players, args.seed)?;
    info!("Starting Capo Cash Simulator");
    info!("Players: {}", args.players);
    info!("Seed: {}", controller.seed());

    controller.initialize(&scenario).await?;
    controller.run_scenario(&scenario).await?;
    let audit = controller.audit(&scenario).await?;
    controller.stop().await?;

    let metrics = controller.metrics().await;
    let economy = controller.economy_metrics();
    info!("Simulation complete");
    info!("Total actions: {}", metrics.total_actions);
    info!("Successful: {}", metrics.successful_actions);
    info!("Rejected: {}", metrics.rejected_actions);
    info!("Failed: {}", metrics.failed_actions);
    for (kind, count) in &metrics.by_kind {
        info!("  {:?}: {}", kind, count);
    }
    info!(
        "Announcements: {} credited, {} duplicates skipped",
        metrics.events_credited, metrics.events_duplicate
    );
    info!("Wagered: {}, paid out: {}", economy.wagered, economy.paid_out);
    info!(
        "Latency: avg {}µs, p99 {}µs",
        metrics.average_latency_us(),
        metrics.p99_latency_us()
    );
    info!("Availability: {:.4}", metrics.availability());
    info!(
        "Audit: {} accounts, {} passed, {} failed",
        audit.accounts, metrics.audits_passed, metrics.audits_failed
    );

    if !audit.is_clean() {
        error!(?audit, "Ledger audit failed");
        anyhow::bail!("ledger audit failed");
    }
    Ok(())
}
