//! Load benchmark execution with retry and backoff
//!
//! One benchmark run yields a throughput figure scraped from pgbench output.
//! Runs that fail, print no `tps =` line or report zero are retried after the
//! policy's wait; when every attempt fails the result is the sentinel
//! throughput `0`, the worst possible score.

use crate::error::{Result, RetryPolicy};
use crate::logging::Logger;
use crate::models::{BenchmarkMode, Config};
use crate::parsing::BenchmarkReport;
use crate::runtime::{CommandOutput, CommandRequest, ContainerRuntime};
use crate::types::TargetIdentity;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::sleep;

/// Measure throughput of a target
#[async_trait]
pub trait ThroughputProbe: Send + Sync {
    /// Never fails: exhausted retries yield zero throughput
    async fn run(&self, target: &TargetIdentity, plan: &BenchmarkPlan) -> BenchmarkOutcome;
}

/// How pgbench reaches the database
#[derive(Debug, Clone, PartialEq)]
pub enum Invocation {
    /// Inside the target container
    Container,
    /// From the host over TCP
    Host {
        host: String,
        port: u16,
        password: Option<String>,
    },
}

impl Invocation {
    pub fn from_config(config: &Config) -> Self {
        match config.benchmark_mode {
            BenchmarkMode::Container => Invocation::Container,
            BenchmarkMode::Host => Invocation::Host {
                host: config.db_host.clone(),
                port: config.db_port,
                password: config.db_password.clone(),
            },
        }
    }
}

/// Parameters of one benchmark step
#[derive(Debug, Clone, PartialEq)]
pub struct BenchmarkPlan {
    pub clients: u32,
    pub duration: Duration,
    pub retry: RetryPolicy,
}

impl BenchmarkPlan {
    /// `retries` attempts with a fixed `retry_wait` after each failure
    pub fn new(clients: u32, duration: Duration, retries: u32, retry_wait: Duration) -> Self {
        Self {
            clients,
            duration,
            retry: RetryPolicy::fixed(retries, retry_wait),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.clients,
            config.benchmark_duration(),
            config.retries,
            config.retry_wait(),
        )
    }
}

/// Result of a benchmark step
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkOutcome {
    /// Transactions per second, 0 when no attempt produced a signal
    pub throughput: f64,
    pub latency_ms: Option<f64>,
    /// Attempts made, including the successful one
    pub attempts: u32,
}

impl BenchmarkOutcome {
    pub fn no_signal(attempts: u32) -> Self {
        Self {
            throughput: 0.0,
            latency_ms: None,
            attempts,
        }
    }

    pub fn has_signal(&self) -> bool {
        self.throughput > 0.0
    }
}

/// pgbench runner
pub struct BenchmarkRunner {
    runtime: ContainerRuntime,
    invocation: Invocation,
    db_user: String,
    db_name: String,
    logger: Logger,
}

impl BenchmarkRunner {
    pub fn new(
        runtime: ContainerRuntime,
        invocation: Invocation,
        db_user: String,
        db_name: String,
        logger: Logger,
    ) -> Self {
        Self {
            runtime,
            invocation,
            db_user,
            db_name,
            logger,
        }
    }

    pub fn from_config(runtime: ContainerRuntime, config: &Config, logger: Logger) -> Self {
        Self::new(
            runtime,
            Invocation::from_config(config),
            config.db_user.clone(),
            config.db_name.clone(),
            logger,
        )
    }

    /// pgbench arguments, database name last
    fn pgbench_args(&self, plan: &BenchmarkPlan) -> Vec<String> {
        let mut args = vec!["pgbench".to_string()];
        if let Invocation::Host { host, port, .. } = &self.invocation {
            args.extend(["-h".to_string(), host.clone(), "-p".to_string(), port.to_string()]);
        }
        args.extend([
            "-c".to_string(),
            plan.clients.to_string(),
            "-T".to_string(),
            plan.duration.as_secs().to_string(),
            "-U".to_string(),
            self.db_user.clone(),
            self.db_name.clone(),
        ]);
        args
    }

    async fn attempt(&self, target: &TargetIdentity, plan: &BenchmarkPlan) -> Result<CommandOutput> {
        let args = self.pgbench_args(plan);
        match &self.invocation {
            Invocation::Container => self.runtime.exec(&target.name, &args).await,
            Invocation::Host { password, .. } => {
                let mut request = CommandRequest::new(&args[0]).args(args[1..].iter().cloned());
                if let Some(password) = password {
                    request = request.env("PGPASSWORD", password);
                }
                self.runtime.host(request).await
            }
        }
    }
}

#[async_trait]
impl ThroughputProbe for BenchmarkRunner {
    async fn run(&self, target: &TargetIdentity, plan: &BenchmarkPlan) -> BenchmarkOutcome {
        let max_attempts = plan.retry.max_attempts;

        for attempt in plan.retry.attempts() {
            self.logger
                .info(&format!(
                    "Running pgbench against {} (attempt {}/{}, {} clients, {}s)",
                    target.name,
                    attempt,
                    max_attempts,
                    plan.clients,
                    plan.duration.as_secs()
                ))
                .log()
                .await;

            match self.attempt(target, plan).await {
                Ok(output) => {
                    let captured = output.combined();
                    let report = BenchmarkReport::parse(&captured);
                    if let Some(tps) = report.usable_tps() {
                        self.logger
                            .info(&format!("pgbench succeeded on attempt {}: {:.2} tps", attempt, tps))
                            .field("attempt", attempt)
                            .field("tps", tps)
                            .field("latency_ms", report.latency_ms)
                            .log()
                            .await;
                        return BenchmarkOutcome {
                            throughput: tps,
                            latency_ms: report.latency_ms,
                            attempts: attempt,
                        };
                    }
                    self.logger
                        .warn(&format!(
                            "pgbench produced no throughput on attempt {} (exit status {})",
                            attempt,
                            output.status_label()
                        ))
                        .field("tps", report.tps)
                        .log()
                        .await;
                    crate::log_debug!(self.logger, "Full pgbench output:\n{}", captured);
                }
                Err(e) => {
                    self.logger
                        .warn(&format!("pgbench could not run on attempt {}: {}", attempt, e))
                        .error_info(&e)
                        .log()
                        .await;
                }
            }

            let wait = plan.retry.delay_after(attempt);
            self.logger
                .info(&format!("Retrying in {}s", wait.as_secs()))
                .log()
                .await;
            sleep(wait).await;
        }

        self.logger
            .error(&format!(
                "pgbench failed after {} attempts, recording 0 tps",
                max_attempts
            ))
            .log()
            .await;
        BenchmarkOutcome::no_signal(max_attempts)
    }
}
