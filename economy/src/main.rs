//! Capo Cash economy binary
//!
//! Reads newline-delimited JSON actions on stdin and answers each with one
//! JSON reply line on stdout. Logs go to stderr.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use capo_common::SystemClock;
use capo_economy::{ActionReply, Economy, EconomyConfig, PlayerAction};
use capo_ledger::{MemoryStore, PgStore, SharedStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = EconomyConfig::from_env();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| config.log_level.clone()),
        ))
        .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
        .init();

    info!("Starting Capo Cash economy");

    if let Err(e) = config.validate() {
        error!(error = %e, "Invalid configuration");
        return Err(anyhow::anyhow!("Configuration error: {}", e));
    }

    let store: SharedStore = match &config.storage.database_url {
        Some(url) => {
            let store = PgStore::connect(url, config.storage.max_connections).await?;
            if config.storage.run_migrations {
                store.migrate().await?;
            }
            Arc::new(store)
        }
        None => {
            warn!("DATABASE_URL not set, balances will not survive a restart");
            Arc::new(MemoryStore::new())
        }
    };

    let economy = Economy::new(config, store, Arc::new(SystemClock))?;
    economy.start().await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        };
        let Some(line) = line else {
            info!("Input closed");
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        let reply = match serde_json::from_str::<PlayerAction>(&line) {
            Ok(action) => economy.handle(action).await,
            Err(e) => {
                warn!(error = %e, "Unreadable action");
                ActionReply::Failed {
                    code: "INVALID_ACTION".to_string(),
                    message: "That action is not recognized.".to_string(),
                }
            }
        };

        let mut out = serde_json::to_vec(&reply)?;
        out.push(b'\n');
        stdout.write_all(&out).await?;
        stdout.flush().await?;
    }

    economy.stop().await?;
    info!(metrics = ?economy.metrics().snapshot(), "Economy shutdown complete");
    Ok(())
}
