//! Economy service configuration.

use std::time::Duration;

/// Ledger configuration.
#[derive(Debug, Clone)]
pub struct LedgerSettings {
    /// Idle time before an account actor retires.
    pub actor_idle_timeout: Duration,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            actor_idle_timeout: Duration::from_secs(60),
        }
    }
}

/// Game configuration.
#[derive(Debug, Clone)]
pub struct GameSettings {
    /// Lifetime of an in-progress game, from creation.
    pub session_ttl: Duration,
    /// Fixed RNG seed; entropy when unset.
    pub rng_seed: Option<u64>,
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            session_ttl: Duration::from_secs(5 * 60),
            rng_seed: None,
        }
    }
}

/// Storage configuration.
#[derive(Debug, Clone)]
pub struct StorageSettings {
    /// Postgres URL. The in-memory store is used when unset.
    pub database_url: Option<String>,
    /// Pool size.
    pub max_connections: u32,
    /// Run migrations on start.
    pub run_migrations: bool,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            database_url: None,
            max_connections: 10,
            run_migrations: true,
        }
    }
}

/// Main economy configuration.
#[derive(Debug, Clone)]
pub struct EconomyConfig {
    /// Storage configuration.
    pub storage: StorageSettings,
    /// Ledger configuration.
    pub ledger: LedgerSettings,
    /// Game configuration.
    pub games: GameSettings,
    /// Log level.
    pub log_level: String,
}

impl Default for EconomyConfig {
    fn default() -> Self {
        Self {
            storage: StorageSettings::default(),
            ledger: LedgerSettings::default(),
            games: GameSettings::default(),
            log_level: "info".to_string(),
        }
    }
}

impl EconomyConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("DATABASE_URL") {
            if !url.is_empty() {
                config.storage.database_url = Some(url);
            }
        }

        if let Ok(level) = std::env::var("LOG_LEVEL") {
            config.log_level = level;
        }

        if let Ok(secs) = std::env::var("CAPO_SESSION_TTL_SECS") {
            if let Ok(secs) = secs.parse() {
                config.games.session_ttl = Duration::from_secs(secs);
            }
        }

        if let Ok(secs) = std::env::var("CAPO_ACTOR_IDLE_SECS") {
            if let Ok(secs) = secs.parse() {
                config.ledger.actor_idle_timeout = Duration::from_secs(secs);
            }
        }

        if let Ok(seed) = std::env::var("CAPO_RNG_SEED") {
            if let Ok(seed) = seed.parse() {
                config.games.rng_seed = Some(seed);
            }
        }

        config
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.games.session_ttl.is_zero() {
            return Err("Session TTL cannot be 0".to_string());
        }

        if self.ledger.actor_idle_timeout.is_zero() {
            return Err("Actor idle timeout cannot be 0".to_string());
        }

        if matches!(&self.storage.database_url, Some(url) if !url.starts_with("postgres")) {
            return Err("Database URL must be a postgres:// URL".to_string());
        }

        if self.storage.max_connections == 0 {
            return Err("Connection pool size cannot be 0".to_string());
        }

        Ok(())
    }

    /// Session TTL as a chrono duration.
    pub fn session_ttl(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.games.session_ttl)
            .unwrap_or_else(|_| capo_common::constants::session_ttl())
    }
}
