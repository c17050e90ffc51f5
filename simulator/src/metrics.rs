//! Simulation metrics.

use std::collections::{HashMap, VecDeque};

use capo_economy::ActionReply;

use crate::scenario::ActionKind;

/// Simulation metrics.
#[derive(Debug, Clone)]
pub struct SimulationMetrics {
    /// Total actions issued.
    pub total_actions: u64,
    /// Actions answered with a result.
    pub successful_actions: u64,
    /// Actions answered with a business rejection.
    pub rejected_actions: u64,
    /// Actions that hit an infrastructure failure.
    pub failed_actions: u64,
    /// Actions issued per kind.
    pub by_kind: HashMap<ActionKind, u64>,
    /// Announcement deliveries that credited.
    pub events_credited: u64,
    /// Announcement deliveries skipped as duplicates.
    pub events_duplicate: u64,
    /// Accounts whose log replayed to their balance.
    pub audits_passed: u64,
    /// Accounts that failed the audit.
    pub audits_failed: u64,
    /// Latency samples (µs).
    latency_samples: VecDeque<u64>,
    /// Maximum samples to keep.
    max_samples: usize,
}

impl SimulationMetrics {
    /// Create new metrics.
    pub fn new() -> Self {
        Self {
            total_actions: 0,
            successful_actions: 0,
            rejected_actions: 0,
            failed_actions: 0,
            by_kind: HashMap::new(),
            events_credited: 0,
            events_duplicate: 0,
            audits_passed: 0,
            audits_failed: 0,
            latency_samples: VecDeque::with_capacity(10000),
            max_samples: 10000,
        }
    }

    /// Record the reply to one action.
    pub fn record(&mut self, kind: Option<ActionKind>, reply: &ActionReply, latency_us: u64) {
        self.total_actions += 1;
        if let Some(kind) = kind {
            *self.by_kind.entry(kind).or_default() += 1;
        }

        match reply {
            ActionReply::Rejected { .. } => self.rejected_actions += 1,
            ActionReply::Failed { .. } => self.failed_actions += 1,
            ActionReply::ExternalAward { credited, .. } => {
                self.successful_actions += 1;
                if *credited {
                    self.events_credited += 1;
                } else {
                    self.events_duplicate += 1;
                }
            }
            _ => self.successful_actions += 1,
        }

        if self.latency_samples.len() >= self.max_samples {
            self.latency_samples.pop_front();
        }
        self.latency_samples.push_back(latency_us);
    }

    /// Record one account audit.
    pub fn record_audit(&mut self, passed: bool) {
        if passed {
            self.audits_passed += 1;
        } else {
            self.audits_failed += 1;
        }
    }

    /// Fold another worker's metrics into this one.
    pub fn merge(&mut self, other: SimulationMetrics) {
        self.total_actions += other.total_actions;
        self.successful_actions += other.successful_actions;
        self.rejected_actions += other.rejected_actions;
        self.failed_actions += other.failed_actions;
        for (kind, count) in other.by_kind {
            *self.by_kind.entry(kind).or_default() += count;
        }
        self.events_credited += other.events_credited;
        self.events_duplicate += other.events_duplicate;
        self.audits_passed += other.audits_passed;
        self.audits_failed += other.audits_failed;
        for sample in other.latency_samples {
            if self.latency_samples.len() >= self.max_samples {
                self.latency_samples.pop_front();
            }
            self.latency_samples.push_back(sample);
        }
    }

    /// Get average latency in µs.
    pub fn average_latency_us(&self) -> u64 {
        if self.latency_samples.is_empty() {
            return 0;
        }

        let sum: u64 = self.latency_samples.iter().sum();
        sum / self.latency_samples.len() as u64
    }

    /// Get p99 latency.
    pub fn p99_latency_us(&self) -> u64 {
        self.percentile_latency(99)
    }

    fn percentile_latency(&self, percentile: usize) -> u64 {
        if self.latency_samples.is_empty() {
            return 0;
        }

        let mut sorted: Vec<_> = self.latency_samples.iter().copied().collect();
        sorted.sort_unstable();

        let idx = (sorted.len() * percentile / 100).min(sorted.len() - 1);
        sorted[idx]
    }

    /// Share of actions that did not fail on infrastructure.
    pub fn availability(&self) -> f64 {
        if self.total_actions == 0 {
            return 0.0;
        }

        (self.total_actions - self.failed_actions) as f64 / self.total_actions as f64
    }
}

impl Default for SimulationMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use capo_common::{Rejection, UserId};

    #[test]
    fn test_metrics() {
        let mut metrics = SimulationMetrics::new();
        let award = |credited| ActionReply::ExternalAward {
            winner: UserId::new("1"),
            amount: 10,
            credited,
            announcement: None,
        };

        metrics.record(Some(ActionKind::Dice), &ActionReply::Ignored, 100);
        metrics.record(Some(ActionKind::Dice), &ActionReply::rejected(Rejection::InvalidAmount), 200);
        metrics.record(None, &award(true), 150);
        metrics.record(None, &award(false), 150);

        assert_eq!(metrics.total_actions, 4);
        assert_eq!(metrics.successful_actions, 3);
        assert_eq!(metrics.rejected_actions, 1);
        assert_eq!(metrics.events_credited, 1);
        assert_eq!(metrics.events_duplicate, 1);
        assert_eq!(metrics.by_kind[&ActionKind::Dice], 2);
        assert_eq!(metrics.average_latency_us(), 150);
        assert_eq!(metrics.availability(), 1.0);
    }

    #[test]
    fn test_merge() {
        let mut a = SimulationMetrics::new();
        let mut b = SimulationMetrics::new();
        a.record_audit(true);
        b.record_audit(false);
        b.record(Some(ActionKind::Slots), &ActionReply::Ignored, 10);
        a.merge(b);
        assert_eq!(a.audits_passed, 1);
        assert_eq!(a.audits_failed, 1);
        assert_eq!(a.total_actions, 1);
        assert_eq!(a.p99_latency_us(), 10);
    }
}
