//! Counters for the economy service.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Economy metrics.
pub struct Metrics {
    /// Actions received.
    pub actions_total: AtomicU64,
    /// Actions answered with a rejection.
    pub actions_rejected: AtomicU64,
    /// Actions that hit an infrastructure error.
    pub actions_failed: AtomicU64,
    /// External events credited.
    pub events_credited: AtomicU64,
    /// External events skipped as duplicates.
    pub events_duplicate: AtomicU64,
    /// Sum of all wagers charged.
    pub wagered: AtomicU64,
    /// Sum of all game payouts credited.
    pub paid_out: AtomicU64,
}

impl Metrics {
    /// Create new metrics instance.
    pub fn new() -> Self {
        Self {
            actions_total: AtomicU64::new(0),
            actions_rejected: AtomicU64::new(0),
            actions_failed: AtomicU64::new(0),
            events_credited: AtomicU64::new(0),
            events_duplicate: AtomicU64::new(0),
            wagered: AtomicU64::new(0),
            paid_out: AtomicU64::new(0),
        }
    }

    pub fn action_received(&self) {
        self.actions_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn action_rejected(&self) {
        self.actions_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn action_failed(&self) {
        self.actions_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn event_credited(&self) {
        self.events_credited.fetch_add(1, Ordering::Relaxed);
    }

    pub fn event_duplicate(&self) {
        self.events_duplicate.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a settled game.
    pub fn game_settled(&self, wager: u64, payout: u64) {
        self.wagered.fetch_add(wager, Ordering::Relaxed);
        self.paid_out.fetch_add(payout, Ordering::Relaxed);
    }

    /// Get current metrics snapshot.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            actions_total: self.actions_total.load(Ordering::Relaxed),
            actions_rejected: self.actions_rejected.load(Ordering::Relaxed),
            actions_failed: self.actions_failed.load(Ordering::Relaxed),
            events_credited: self.events_credited.load(Ordering::Relaxed),
            events_duplicate: self.events_duplicate.load(Ordering::Relaxed),
            wagered: self.wagered.load(Ordering::Relaxed),
            paid_out: self.paid_out.load(Ordering::Relaxed),
        }
    }

    /// Export metrics in Prometheus text format.
    pub fn to_prometheus(&self) -> String {
        let s = self.snapshot();
        format!(
            r#"# HELP capo_actions_total Total player actions received
# TYPE capo_actions_total counter
capo_actions_total {}

# HELP capo_actions_rejected Actions rejected by a business rule
# TYPE capo_actions_rejected counter
capo_actions_rejected {}

# HELP capo_actions_failed Actions that failed on infrastructure
# TYPE capo_actions_failed counter
capo_actions_failed {}

# HELP capo_events_credited External events credited
# TYPE capo_events_credited counter
capo_events_credited {}

# HELP capo_events_duplicate External events skipped as duplicates
# TYPE capo_events_duplicate counter
capo_events_duplicate {}

# HELP capo_wagered Currency staked on games
# TYPE capo_wagered counter
capo_wagered {}

# HELP capo_paid_out Currency paid out by games
# TYPE capo_paid_out counter
capo_paid_out {}
"#,
            s.actions_total,
            s.actions_rejected,
            s.actions_failed,
            s.events_credited,
            s.events_duplicate,
            s.wagered,
            s.paid_out,
        )
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub actions_total: u64,
    pub actions_rejected: u64,
    pub actions_failed: u64,
    pub events_credited: u64,
    pub events_duplicate: u64,
    pub wagered: u64,
    pub paid_out: u64,
}

/// Shared metrics instance.
pub type SharedMetrics = Arc<Metrics>;
