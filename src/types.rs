//! Type definitions and aliases

use std::fmt;
use std::time::Duration;
use serde::{Deserialize, Serialize};

// Re-export commonly used types
pub use crate::error::{AppError, Result};

/// How the tuning target was chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResolutionSource {
    /// The container reported itself as cluster leader
    Leader,
    /// Leader detection was disabled, the configured name is used as-is
    Static,
    /// Detection failed, the well-known default is used
    Fallback,
}

impl ResolutionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionSource::Leader => "leader",
            ResolutionSource::Static => "static",
            ResolutionSource::Fallback => "fallback",
        }
    }
}

/// The container every trial operates on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetIdentity {
    /// Container name passed to the runtime
    pub name: String,
    /// How the name was obtained
    pub source: ResolutionSource,
}

impl TargetIdentity {
    pub fn new<S: Into<String>>(name: S, source: ResolutionSource) -> Self {
        Self { name: name.into(), source }
    }

    pub fn leader<S: Into<String>>(name: S) -> Self {
        Self::new(name, ResolutionSource::Leader)
    }

    pub fn fallback<S: Into<String>>(name: S) -> Self {
        Self::new(name, ResolutionSource::Fallback)
    }

    pub fn is_fallback(&self) -> bool {
        self.source == ResolutionSource::Fallback
    }

    /// Name plus how it was chosen, e.g. `postgres-2 (leader)`
    pub fn describe(&self) -> String {
        format!("{} ({})", self.name, self.source.as_str())
    }
}

impl fmt::Display for TargetIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Result of restarting the target and waiting for it
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ReadinessOutcome {
    /// The probe reported the readiness marker
    Ready { waited: Duration, polls: u32 },
    /// The timeout elapsed first
    TimedOut { waited: Duration, polls: u32 },
    /// Restart and readiness were skipped (e.g. the mutation failed)
    Skipped,
}

impl ReadinessOutcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready { .. })
    }

    pub fn is_timed_out(&self) -> bool {
        matches!(self, Self::TimedOut { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Ready { .. } => "ready",
            Self::TimedOut { .. } => "timed-out",
            Self::Skipped => "skipped",
        }
    }
}

/// States of the tuning loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TunerPhase {
    Idle,
    ProposingCandidate,
    Mutating,
    Restarting,
    Benchmarking,
    Scoring,
    Done,
}

impl TunerPhase {
    /// Whether the loop may move from `self` to `next`
    pub fn can_transition_to(self, next: TunerPhase) -> bool {
        use TunerPhase::*;
        matches!(
            (self, next),
            (Idle, ProposingCandidate)
                | (Idle, Done)
                | (ProposingCandidate, Mutating)
                | (Mutating, Restarting)
                | (Mutating, Scoring)
                | (Restarting, Benchmarking)
                | (Benchmarking, Scoring)
                | (Scoring, ProposingCandidate)
                | (Scoring, Done)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TunerPhase::Idle => "idle",
            TunerPhase::ProposingCandidate => "proposing",
            TunerPhase::Mutating => "mutating",
            TunerPhase::Restarting => "restarting",
            TunerPhase::Benchmarking => "benchmarking",
            TunerPhase::Scoring => "scoring",
            TunerPhase::Done => "done",
        }
    }
}

/// Trial execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrialStatus {
    /// Benchmark produced a positive throughput
    Measured,
    /// Benchmark retries were exhausted, sentinel recorded
    NoSignal,
    /// Configuration could not be written, sentinel recorded
    MutationFailed,
}

impl TrialStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrialStatus::Measured => "measured",
            TrialStatus::NoSignal => "no-signal",
            TrialStatus::MutationFailed => "mutation-failed",
        }
    }
}
