//! Optimization driver: the closed tuning loop
//!
//! Each trial asks the search strategy for a candidate, writes it to the
//! configuration document, restarts the target, waits for readiness, runs the
//! benchmark and reports `-throughput` back to the strategy. Trials are
//! strictly sequential and the run ends after the trial budget.
//!
//! Failure handling follows the trial/run split of [`AppError::is_run_fatal`]:
//! document I/O problems cost one trial (recorded with zero throughput),
//! structural and search failures end the run.

mod plan;

pub use plan::RunPlan;

use crate::benchmark::{BenchmarkOutcome, BenchmarkPlan, ThroughputProbe};
use crate::error::{AppError, Result};
use crate::lifecycle::TargetLifecycle;
use crate::logging::{ErrorEventLogger, Logger, TrialLogger};
use crate::models::{BestTracker, Config, TrialResult};
use crate::mutator::ConfigApplier;
use crate::output::ResultsWriter;
use crate::resolver::TargetResolution;
use crate::search::{Observation, ParameterSpace, SearchStrategy};
use crate::types::{ReadinessOutcome, TargetIdentity, TrialStatus, TunerPhase};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Timing and benchmark settings of the loop
#[derive(Debug, Clone, PartialEq)]
pub struct TunerSettings {
    pub ready_timeout: Duration,
    pub poll_interval: Duration,
    pub benchmark: BenchmarkPlan,
    /// Resolve the target again after each restart
    pub re_resolve_after_restart: bool,
}

impl TunerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            ready_timeout: config.ready_timeout(),
            poll_interval: config.poll_interval(),
            benchmark: BenchmarkPlan::from_config(config),
            re_resolve_after_restart: config.re_resolve_after_restart,
        }
    }
}

/// The external collaborators driven by the loop
#[derive(Clone)]
pub struct TunerComponents {
    pub resolver: Arc<dyn TargetResolution>,
    pub applier: Arc<dyn ConfigApplier>,
    pub lifecycle: Arc<dyn TargetLifecycle>,
    pub probe: Arc<dyn ThroughputProbe>,
}

/// Outcome of a complete run
#[derive(Debug, Clone, Serialize)]
pub struct TuningReport {
    /// Target at the end of the run
    pub target: TargetIdentity,
    pub strategy: String,
    pub budget: u32,
    /// Every trial in execution order
    pub trials: Vec<TrialResult>,
    pub best: Option<TrialResult>,
    pub elapsed: Duration,
}

impl TuningReport {
    pub fn best(&self) -> Option<&TrialResult> {
        self.best.as_ref()
    }

    /// Trials that produced a throughput signal
    pub fn measured(&self) -> usize {
        self.trials.iter().filter(|t| t.has_signal()).count()
    }

    pub fn failed(&self) -> usize {
        self.trials.len() - self.measured()
    }
}

/// Closed-loop tuner
pub struct Tuner {
    components: TunerComponents,
    strategy: Box<dyn SearchStrategy>,
    settings: TunerSettings,
    logger: Logger,
    trial_logger: TrialLogger,
    error_logger: ErrorEventLogger,
    results: Option<ResultsWriter>,
    phase: TunerPhase,
    phase_history: Vec<TunerPhase>,
}

impl Tuner {
    pub fn new(
        components: TunerComponents,
        strategy: Box<dyn SearchStrategy>,
        settings: TunerSettings,
        logger: Logger,
    ) -> Self {
        Self {
            trial_logger: TrialLogger::new(logger.clone()),
            error_logger: ErrorEventLogger::new(logger.clone()),
            components,
            strategy,
            settings,
            logger,
            results: None,
            phase: TunerPhase::Idle,
            phase_history: vec![TunerPhase::Idle],
        }
    }

    pub fn with_trial_logger(mut self, trial_logger: TrialLogger) -> Self {
        self.trial_logger = trial_logger;
        self
    }

    pub fn with_error_logger(mut self, error_logger: ErrorEventLogger) -> Self {
        self.error_logger = error_logger;
        self
    }

    /// Append one record per trial to `writer`
    pub fn with_results(mut self, writer: ResultsWriter) -> Self {
        self.results = Some(writer);
        self
    }

    pub fn phase(&self) -> TunerPhase {
        self.phase
    }

    /// Every phase entered so far, starting with `Idle`
    pub fn phase_history(&self) -> &[TunerPhase] {
        &self.phase_history
    }

    fn transition(&mut self, next: TunerPhase) -> Result<()> {
        if !self.phase.can_transition_to(next) {
            return Err(AppError::internal(format!(
                "Invalid tuner transition {} -> {}",
                self.phase.as_str(),
                next.as_str()
            )));
        }
        self.phase = next;
        self.phase_history.push(next);
        Ok(())
    }

    /// Run `budget` trials over `space`
    pub async fn run(&mut self, space: &ParameterSpace, budget: u32) -> Result<TuningReport> {
        let run_started = Instant::now();
        let operation = self.logger.start_operation("tuning run").await;
        self.logger
            .info(&format!(
                "Starting {} search: {} trials over {} dimensions ({} combinations)",
                self.strategy.name(),
                budget,
                space.len(),
                space.cardinality()
            ))
            .log()
            .await;

        let result = self.run_trials(space, budget, &operation).await;
        self.logger
            .end_operation(&operation, "tuning run", result.is_ok())
            .await;

        let (target, trials, best) = result?;
        self.transition(TunerPhase::Done)?;

        let report = TuningReport {
            target,
            strategy: self.strategy.name().to_string(),
            budget,
            trials,
            best: best.into_best(),
            elapsed: run_started.elapsed(),
        };

        if let (Some(writer), Some(best)) = (self.results.as_mut(), report.best.as_ref()) {
            if let Err(e) = writer.write_best(best) {
                self.logger
                    .warn(&format!("Could not record best result: {}", e))
                    .log()
                    .await;
            }
        }

        match report.best() {
            Some(best) => {
                self.logger
                    .info(&format!(
                        "Best configuration: {} with {:.2} tps (trial {})",
                        best.candidate, best.throughput, best.trial
                    ))
                    .candidate(&best.candidate)
                    .field("throughput", best.throughput)
                    .log()
                    .await;
            }
            None => {
                self.logger.warn("No trials were run").log().await;
            }
        }

        Ok(report)
    }

    async fn run_trials(
        &mut self,
        space: &ParameterSpace,
        budget: u32,
        operation: &str,
    ) -> Result<(TargetIdentity, Vec<TrialResult>, BestTracker)> {
        let mut target = self.components.resolver.resolve().await;
        let mut history: Vec<Observation> = Vec::with_capacity(budget as usize);
        let mut trials = Vec::with_capacity(budget as usize);
        let mut best = BestTracker::new();

        for trial in 1..=budget {
            self.transition(TunerPhase::ProposingCandidate)?;
            let candidate = self.strategy.propose(&history)?;
            space.validate_candidate(&candidate)?;
            self.trial_logger.trial_started(trial, budget, &candidate).await;

            let started = Instant::now();
            let started_at = Utc::now();

            self.transition(TunerPhase::Mutating)?;
            let (readiness, outcome, status) = match self.components.applier.apply(&target, &candidate).await {
                Ok(_) => {
                    self.transition(TunerPhase::Restarting)?;
                    let readiness = self
                        .components
                        .lifecycle
                        .restart_and_await_ready(&target, self.settings.ready_timeout, self.settings.poll_interval)
                        .await;

                    if self.settings.re_resolve_after_restart {
                        let resolved = self.components.resolver.resolve().await;
                        if resolved.name != target.name {
                            self.logger
                                .warn(&format!("Target moved from {} to {}", target.name, resolved.name))
                                .correlation_id(operation)
                                .log()
                                .await;
                        }
                        target = resolved;
                    }

                    self.transition(TunerPhase::Benchmarking)?;
                    let outcome = self.components.probe.run(&target, &self.settings.benchmark).await;
                    let status = if outcome.has_signal() {
                        TrialStatus::Measured
                    } else {
                        TrialStatus::NoSignal
                    };
                    (readiness, outcome, status)
                }
                Err(e) if e.is_run_fatal() => {
                    self.error_logger
                        .log_error(&e, Some(&format!("Trial {} aborted the run", trial)), Some(operation))
                        .await;
                    return Err(e);
                }
                Err(e) => {
                    self.error_logger
                        .log_error(&e, Some(&format!("Trial {}", trial)), Some(operation))
                        .await;
                    self.error_logger
                        .log_recovery_attempt(&e, "recording zero throughput, skipping restart", Some(operation))
                        .await;
                    (ReadinessOutcome::Skipped, BenchmarkOutcome::no_signal(0), TrialStatus::MutationFailed)
                }
            };

            self.transition(TunerPhase::Scoring)?;
            let result = TrialResult {
                trial,
                candidate: candidate.clone(),
                throughput: outcome.throughput,
                latency_ms: outcome.latency_ms,
                attempts: outcome.attempts,
                target: target.clone(),
                readiness,
                status,
                elapsed: started.elapsed(),
                started_at,
            };

            let observation = Observation::new(candidate, result.score());
            self.strategy.update(&observation)?;
            history.push(observation);

            self.trial_logger.trial_completed(&result).await;
            if best.offer(&result) {
                self.trial_logger.new_best(&result).await;
            }

            if let Some(writer) = self.results.as_mut() {
                if let Err(e) = writer.append(&result) {
                    self.logger
                        .warn(&format!("Could not record trial {}: {}", trial, e))
                        .log()
                        .await;
                }
            }
            trials.push(result);
        }

        Ok((target, trials, best))
    }
}

#[cfg(test)]
mod tests;
