//! Static description of a tuning run, shown before trials start

use crate::benchmark::BenchmarkPlan;
use crate::models::{Config, ConfigFormat};
use crate::search::{ParameterSpace, StrategyKind};
use crate::types::TargetIdentity;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

/// Everything a run will do, resolved from configuration
#[derive(Debug, Clone, Serialize)]
pub struct RunPlan {
    pub target: TargetIdentity,
    pub format: ConfigFormat,
    /// Host document, or the file inside the target for the conf format
    pub document: PathBuf,
    pub section: String,
    pub allow_list: Vec<String>,
    pub space: ParameterSpace,
    pub strategy: StrategyKind,
    pub seed: u64,
    pub budget: u32,
    pub initial_points: u32,
    pub clients: u32,
    pub benchmark_duration: Duration,
    pub retries: u32,
    pub retry_wait: Duration,
    pub ready_timeout: Duration,
    pub poll_interval: Duration,
    pub re_resolve_after_restart: bool,
    /// Current parameters section, when it could be read
    pub current_parameters: Option<Vec<(String, String)>>,
}

impl RunPlan {
    pub fn new(config: &Config, space: ParameterSpace, target: TargetIdentity) -> Self {
        Self {
            target,
            format: config.config_format,
            document: match config.config_format {
                ConfigFormat::Patroni => config.config_file.clone(),
                ConfigFormat::Conf => PathBuf::from(&config.conf_path),
            },
            section: config.parameters_section.clone(),
            allow_list: config.allow_list.clone(),
            space,
            strategy: config.strategy,
            seed: config.seed,
            budget: config.trials,
            initial_points: config.initial_points,
            clients: config.clients,
            benchmark_duration: config.benchmark_duration(),
            retries: config.retries,
            retry_wait: config.retry_wait(),
            ready_timeout: config.ready_timeout(),
            poll_interval: config.poll_interval(),
            re_resolve_after_restart: config.re_resolve_after_restart,
            current_parameters: None,
        }
    }

    pub fn with_current_parameters(mut self, parameters: Vec<(String, String)>) -> Self {
        self.current_parameters = Some(parameters);
        self
    }

    /// Where candidates are written, as shown to the operator
    pub fn document_label(&self) -> String {
        match self.format {
            ConfigFormat::Patroni => format!("{} [{}]", self.document.display(), self.section),
            ConfigFormat::Conf => format!("{} inside {}", self.document.display(), self.target.name),
        }
    }

    /// Pruning only happens in the YAML document
    pub fn prunes(&self) -> bool {
        self.format == ConfigFormat::Patroni
    }

    pub fn benchmark_plan(&self) -> BenchmarkPlan {
        BenchmarkPlan::new(self.clients, self.benchmark_duration, self.retries, self.retry_wait)
    }

    /// Typical trial length: one benchmark run plus one readiness poll
    pub fn expected_trial_time(&self) -> Duration {
        self.benchmark_duration + self.poll_interval
    }

    /// Longest a single trial can block: full readiness timeout plus every
    /// benchmark attempt and backoff sleep
    pub fn worst_case_trial_time(&self) -> Duration {
        let plan = self.benchmark_plan();
        self.ready_timeout + self.benchmark_duration * self.retries + plan.retry.worst_case_wait()
    }

    pub fn worst_case_run_time(&self) -> Duration {
        self.worst_case_trial_time() * self.budget
    }
}
