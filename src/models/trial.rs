//! Trial records and best-result tracking

use crate::search::Candidate;
use crate::types::{ReadinessOutcome, TargetIdentity, TrialStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Outcome of one complete trial
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialResult {
    /// 1-based trial number
    pub trial: u32,
    pub candidate: Candidate,
    /// Transactions per second, 0 when no signal was obtained
    pub throughput: f64,
    pub latency_ms: Option<f64>,
    /// Benchmark attempts made
    pub attempts: u32,
    pub target: TargetIdentity,
    pub readiness: ReadinessOutcome,
    pub status: TrialStatus,
    pub elapsed: Duration,
    pub started_at: DateTime<Utc>,
}

impl TrialResult {
    /// Value reported to the search strategy
    pub fn score(&self) -> f64 {
        -self.throughput
    }

    pub fn has_signal(&self) -> bool {
        self.status == TrialStatus::Measured && self.throughput > 0.0
    }
}

/// Keeps the trial with the highest throughput seen so far
#[derive(Debug, Clone, Default)]
pub struct BestTracker {
    best: Option<TrialResult>,
}

impl BestTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer a completed trial; returns true when it became the new best.
    ///
    /// Only a strictly higher throughput replaces the incumbent, so the first
    /// trial to reach a value keeps it.
    pub fn offer(&mut self, result: &TrialResult) -> bool {
        let improves = match &self.best {
            None => true,
            Some(best) => result.throughput > best.throughput,
        };
        if improves {
            self.best = Some(result.clone());
        }
        improves
    }

    pub fn best(&self) -> Option<&TrialResult> {
        self.best.as_ref()
    }

    pub fn best_throughput(&self) -> f64 {
        self.best.as_ref().map_or(0.0, |b| b.throughput)
    }

    pub fn into_best(self) -> Option<TrialResult> {
        self.best
    }
}
