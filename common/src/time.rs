//! Time utilities and constants for the economy.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::sync::Arc;

/// Timing constants.
pub mod constants {
    use super::Duration;

    /// Lifetime of an in-progress game session (5 minutes).
    pub fn session_ttl() -> Duration {
        Duration::minutes(5)
    }

    /// Minimum time between two robbery attempts by the same user (1 hour).
    pub fn rob_cooldown() -> Duration {
        Duration::hours(1)
    }

    /// How long the robbable flag stays locked after a change (24 hours).
    pub fn robbable_toggle_lock() -> Duration {
        Duration::hours(24)
    }

    /// Idle time after which an account actor retires (60 seconds).
    pub fn actor_idle_timeout() -> Duration {
        Duration::seconds(60)
    }
}

/// A timestamp with timezone (always UTC).
pub type Timestamp = DateTime<Utc>;

/// Get the current timestamp.
pub fn now() -> Timestamp {
    Utc::now()
}

/// Check if a timestamp has passed.
pub fn is_expired(expiry: Timestamp) -> bool {
    now() > expiry
}

/// Duration extensions for convenient construction.
pub trait DurationExt {
    fn as_std(&self) -> std::time::Duration;
}

impl DurationExt for Duration {
    fn as_std(&self) -> std::time::Duration {
        self.to_std().unwrap_or(std::time::Duration::ZERO)
    }
}

/// Source of the current time. Cooldowns, streaks and session expiry read
/// time through this so they can be driven deterministically.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Clone)]
pub struct ManualClock {
    current: Arc<Mutex<Timestamp>>,
}

impl ManualClock {
    /// Create a clock frozen at `start`.
    pub fn new(start: Timestamp) -> Self {
        Self {
            current: Arc::new(Mutex::new(start)),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let mut current = self.current.lock();
        *current = *current + by;
    }

    /// Jump to an absolute time.
    pub fn set(&self, to: Timestamp) {
        *self.current.lock() = to;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.current.lock()
    }
}

/// Shared clock handle.
pub type SharedClock = Arc<dyn Clock>;
