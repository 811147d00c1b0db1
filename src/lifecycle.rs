//! Restart orchestration and readiness polling

use crate::logging::Logger;
use crate::models::Config;
use crate::parsing;
use crate::runtime::ContainerRuntime;
use crate::types::{ReadinessOutcome, TargetIdentity};
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Restart a target and wait until it accepts connections
#[async_trait]
pub trait TargetLifecycle: Send + Sync {
    /// Never fails: a target that does not come up yields `TimedOut`
    async fn restart_and_await_ready(
        &self,
        target: &TargetIdentity,
        timeout: Duration,
        poll_interval: Duration,
    ) -> ReadinessOutcome;
}

/// Container restart plus `pg_isready` polling
pub struct LifecycleController {
    runtime: ContainerRuntime,
    db_user: String,
    db_name: String,
    logger: Logger,
}

impl LifecycleController {
    pub fn new(runtime: ContainerRuntime, db_user: String, db_name: String, logger: Logger) -> Self {
        Self {
            runtime,
            db_user,
            db_name,
            logger,
        }
    }

    pub fn from_config(runtime: ContainerRuntime, config: &Config, logger: Logger) -> Self {
        Self::new(runtime, config.db_user.clone(), config.db_name.clone(), logger)
    }

    fn probe_args(&self) -> Vec<String> {
        vec![
            "pg_isready".to_string(),
            "-U".to_string(),
            self.db_user.clone(),
            "-d".to_string(),
            self.db_name.clone(),
        ]
    }

    async fn restart(&self, target: &TargetIdentity, limit: Duration) {
        self.logger
            .info(&format!("Restarting container {}", target.name))
            .log()
            .await;

        match self.runtime.restart(&target.name, limit).await {
            Ok(output) if output.success() => {}
            Ok(output) => {
                self.logger
                    .warn(&format!(
                        "Restart of {} exited with status {}: {}",
                        target.name,
                        output.status_label(),
                        output.stderr.trim()
                    ))
                    .log()
                    .await;
            }
            Err(e) => {
                self.logger
                    .warn(&format!("Restart of {} failed: {}", target.name, e))
                    .error_info(&e)
                    .log()
                    .await;
            }
        }
    }

    /// A probe that does not answer within `limit` counts as not ready
    async fn probe(&self, target: &TargetIdentity, limit: Duration) -> bool {
        match self.runtime.exec_within(&target.name, &self.probe_args(), limit).await {
            Ok(output) => output.success() && parsing::is_ready(&output.stdout),
            Err(e) => {
                self.logger
                    .debug(&format!("Readiness probe failed: {}", e))
                    .log()
                    .await;
                false
            }
        }
    }
}

#[async_trait]
impl TargetLifecycle for LifecycleController {
    async fn restart_and_await_ready(
        &self,
        target: &TargetIdentity,
        timeout: Duration,
        poll_interval: Duration,
    ) -> ReadinessOutcome {
        let started = Instant::now();
        let deadline = started + timeout;
        self.restart(target, timeout).await;

        let mut polls = 0u32;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                let waited = started.elapsed();
                self.logger
                    .warn(&format!(
                        "{} not ready after {}s, benchmarking anyway",
                        target.name,
                        waited.as_secs()
                    ))
                    .field("polls", polls)
                    .log()
                    .await;
                return ReadinessOutcome::TimedOut { waited, polls };
            }

            polls += 1;
            if self.probe(target, remaining).await {
                let waited = started.elapsed();
                self.logger
                    .info(&format!("{} is accepting connections", target.name))
                    .field("waited_ms", waited.as_millis() as u64)
                    .field("polls", polls)
                    .log()
                    .await;
                return ReadinessOutcome::Ready { waited, polls };
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if !remaining.is_zero() {
                self.logger
                    .info(&format!(
                        "Waiting for {} to accept connections ({}s elapsed)",
                        target.name,
                        started.elapsed().as_secs()
                    ))
                    .log()
                    .await;
                sleep(poll_interval.min(remaining)).await;
            }
        }
    }
}
