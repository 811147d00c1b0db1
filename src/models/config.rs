//! Configuration data model and validation

use crate::error::{AppError, Result};
use crate::logging::LogFormat;
use crate::search::{Dimension, ParameterSpace, StrategyKind};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Where the benchmark tool runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BenchmarkMode {
    /// `docker exec <target> pgbench ...`
    Container,
    /// `pgbench -h <host> -p <port> ...` from the host
    Host,
}

impl BenchmarkMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            BenchmarkMode::Container => "container",
            BenchmarkMode::Host => "host",
        }
    }
}

impl FromStr for BenchmarkMode {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "container" | "docker" => Ok(BenchmarkMode::Container),
            "host" | "local" => Ok(BenchmarkMode::Host),
            other => Err(AppError::config(format!(
                "Unknown benchmark mode '{}' (expected container or host)",
                other
            ))),
        }
    }
}

/// How candidates reach the database
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigFormat {
    /// Parameters section of a Patroni YAML document on the host
    Patroni,
    /// Flat `key = 'value'` file inside the target container
    Conf,
}

impl ConfigFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigFormat::Patroni => "patroni",
            ConfigFormat::Conf => "conf",
        }
    }
}

impl FromStr for ConfigFormat {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "patroni" | "yaml" => Ok(ConfigFormat::Patroni),
            "conf" | "postgresql.conf" => Ok(ConfigFormat::Conf),
            other => Err(AppError::config(format!(
                "Unknown configuration format '{}' (expected patroni or conf)",
                other
            ))),
        }
    }
}

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_config_format")]
    pub config_format: ConfigFormat,

    /// Path of the YAML document the database reads its parameters from
    #[serde(default = "default_config_file")]
    pub config_file: PathBuf,

    /// Flat configuration file inside the container, for the `conf` format
    #[serde(default = "default_conf_path")]
    pub conf_path: String,

    /// Dotted path of the parameters mapping inside the document
    #[serde(default = "default_parameters_section")]
    pub parameters_section: String,

    /// Keys kept in the parameters section besides the tuned ones
    #[serde(default = "default_allow_list")]
    pub allow_list: Vec<String>,

    #[serde(default = "default_docker_binary")]
    pub docker_binary: String,

    /// Only containers whose name starts with this are considered
    #[serde(default = "default_container_prefix")]
    pub container_prefix: String,

    /// Target used when no leader is found or detection is disabled
    #[serde(default = "default_container")]
    pub default_container: String,

    /// Ask the cluster manager which member is the leader
    #[serde(default = "default_true")]
    pub detect_leader: bool,

    /// Resolve the target again after every restart
    #[serde(default)]
    pub re_resolve_after_restart: bool,

    #[serde(default = "default_patronictl_path")]
    pub patronictl_path: String,

    #[serde(default = "default_patroni_config")]
    pub patroni_config: String,

    #[serde(default = "default_db_user")]
    pub db_user: String,

    #[serde(default = "default_db_name")]
    pub db_name: String,

    #[serde(default = "default_benchmark_mode")]
    pub benchmark_mode: BenchmarkMode,

    /// Host and port used in host benchmark mode
    #[serde(default = "default_db_host")]
    pub db_host: String,

    #[serde(default = "default_db_port")]
    pub db_port: u16,

    /// Passed as `PGPASSWORD`, never logged
    #[serde(default, skip_serializing)]
    pub db_password: Option<String>,

    /// Concurrent benchmark clients
    #[serde(default = "default_clients")]
    pub clients: u32,

    /// Benchmark run length
    #[serde(default = "default_duration_secs")]
    pub duration_seconds: u64,

    /// Benchmark attempts before giving up with zero throughput
    #[serde(default = "default_retries")]
    pub retries: u32,

    #[serde(default = "default_retry_wait_secs")]
    pub retry_wait_seconds: u64,

    #[serde(default = "default_ready_timeout_secs")]
    pub ready_timeout_seconds: u64,

    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_seconds: u64,

    /// Number of trials to run
    #[serde(default = "default_trials")]
    pub trials: u32,

    #[serde(default = "default_seed")]
    pub seed: u64,

    #[serde(default = "default_strategy")]
    pub strategy: StrategyKind,

    /// Random proposals before the surrogate model is used
    #[serde(default = "default_initial_points")]
    pub initial_points: u32,

    /// Points per integer range in grid search
    #[serde(default = "default_grid_points")]
    pub grid_points: u32,

    #[serde(default = "default_shared_buffers")]
    pub shared_buffers: Vec<String>,

    #[serde(default = "default_work_mem")]
    pub work_mem: Vec<String>,

    #[serde(default = "default_max_connections")]
    pub max_connections: (i64, i64),

    /// Plain-text per-trial records are appended here
    #[serde(default)]
    pub results_file: Option<PathBuf>,

    /// Log lines are also appended here
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    #[serde(default = "default_log_format")]
    pub log_format: LogFormat,

    /// Enable colored terminal output
    #[serde(default = "default_enable_color")]
    pub enable_color: bool,

    /// Enable verbose output
    #[serde(default)]
    pub verbose: bool,

    /// Enable debug output
    #[serde(default)]
    pub debug: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            config_format: default_config_format(),
            config_file: default_config_file(),
            conf_path: default_conf_path(),
            parameters_section: default_parameters_section(),
            allow_list: default_allow_list(),
            docker_binary: default_docker_binary(),
            container_prefix: default_container_prefix(),
            default_container: default_container(),
            detect_leader: true,
            re_resolve_after_restart: false,
            patronictl_path: default_patronictl_path(),
            patroni_config: default_patroni_config(),
            db_user: default_db_user(),
            db_name: default_db_name(),
            benchmark_mode: default_benchmark_mode(),
            db_host: default_db_host(),
            db_port: default_db_port(),
            db_password: None,
            clients: default_clients(),
            duration_seconds: default_duration_secs(),
            retries: default_retries(),
            retry_wait_seconds: default_retry_wait_secs(),
            ready_timeout_seconds: default_ready_timeout_secs(),
            poll_interval_seconds: default_poll_interval_secs(),
            trials: default_trials(),
            seed: default_seed(),
            strategy: default_strategy(),
            initial_points: default_initial_points(),
            grid_points: default_grid_points(),
            shared_buffers: default_shared_buffers(),
            work_mem: default_work_mem(),
            max_connections: default_max_connections(),
            results_file: None,
            log_file: None,
            log_format: default_log_format(),
            enable_color: default_enable_color(),
            verbose: false,
            debug: false,
        }
    }
}

impl Config {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    pub fn benchmark_duration(&self) -> Duration {
        Duration::from_secs(self.duration_seconds)
    }

    pub fn retry_wait(&self) -> Duration {
        Duration::from_secs(self.retry_wait_seconds)
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_secs(self.ready_timeout_seconds)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }

    /// Section path split into mapping keys
    pub fn section_path(&self) -> Vec<String> {
        self.parameters_section
            .split('.')
            .map(|s| s.trim().to_string())
            .collect()
    }

    /// Search space built from the configured value sets
    pub fn parameter_space(&self) -> Result<ParameterSpace> {
        let shared_buffers: Vec<&str> = self.shared_buffers.iter().map(String::as_str).collect();
        let work_mem: Vec<&str> = self.work_mem.iter().map(String::as_str).collect();
        ParameterSpace::new(vec![
            Dimension::categorical("shared_buffers", &shared_buffers),
            Dimension::categorical("work_mem", &work_mem),
            Dimension::integer("max_connections", self.max_connections.0, self.max_connections.1),
        ])
        .map_err(|e| AppError::config(format!("Invalid parameter space: {}", e)))
    }

    /// Validate the configuration and return any errors
    pub fn validate(&self) -> Result<()> {
        match self.config_format {
            ConfigFormat::Patroni if self.config_file.as_os_str().is_empty() => {
                return Err(AppError::config("Configuration document path cannot be empty"));
            }
            ConfigFormat::Conf if !self.conf_path.trim().starts_with('/') => {
                return Err(AppError::config(format!(
                    "Container configuration path must be absolute, got '{}'",
                    self.conf_path
                )));
            }
            _ => {}
        }

        if self.section_path().iter().any(|segment| segment.is_empty()) {
            return Err(AppError::config(format!(
                "Invalid parameters section path '{}'",
                self.parameters_section
            )));
        }

        if self.allow_list.iter().any(|key| key.trim().is_empty()) {
            return Err(AppError::config("Allow-list entries cannot be empty"));
        }

        if self.docker_binary.trim().is_empty() {
            return Err(AppError::config("Container runtime binary cannot be empty"));
        }

        if self.default_container.trim().is_empty() {
            return Err(AppError::config("Default container name cannot be empty"));
        }

        if self.db_user.trim().is_empty() || self.db_name.trim().is_empty() {
            return Err(AppError::config("Database user and name cannot be empty"));
        }

        if self.benchmark_mode == BenchmarkMode::Host {
            if self.db_host.trim().is_empty() {
                return Err(AppError::config("Database host is required in host benchmark mode"));
            }
            if self.db_port == 0 {
                return Err(AppError::config("Database port must be greater than 0"));
            }
        }

        if self.clients == 0 {
            return Err(AppError::config("Benchmark clients must be greater than 0"));
        }

        if self.duration_seconds == 0 {
            return Err(AppError::config("Benchmark duration must be greater than 0"));
        }

        if self.retries == 0 {
            return Err(AppError::config("Benchmark retries must be at least 1"));
        }

        if self.ready_timeout_seconds == 0 {
            return Err(AppError::config("Readiness timeout must be greater than 0"));
        }

        if self.poll_interval_seconds == 0 {
            return Err(AppError::config("Poll interval must be greater than 0"));
        }

        if self.trials == 0 {
            return Err(AppError::config("Trial budget must be greater than 0"));
        }

        if self.trials > 1000 {
            return Err(AppError::config("Trial budget cannot exceed 1000"));
        }

        if self.grid_points == 0 {
            return Err(AppError::config("Grid points must be greater than 0"));
        }

        self.parameter_space()?;

        Ok(())
    }

    /// Merge environment variables into this configuration
    pub fn merge_from_env(&mut self) -> Result<()> {
        self.merge_from_lookup(|key| std::env::var(key).ok())
    }

    /// Merge values from any `AUTOTUNE_*` style lookup
    pub fn merge_from_lookup<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(value) = get("AUTOTUNE_CONFIG_FORMAT") {
            self.config_format = value.parse()?;
        }
        if let Some(path) = get("AUTOTUNE_CONF_PATH") {
            self.conf_path = path.trim().to_string();
        }
        if let Some(path) = get("AUTOTUNE_CONFIG_FILE") {
            self.config_file = PathBuf::from(path.trim());
        }
        if let Some(section) = get("AUTOTUNE_PARAMETERS_SECTION") {
            self.parameters_section = section.trim().to_string();
        }
        if let Some(list) = get("AUTOTUNE_ALLOW_LIST") {
            self.allow_list = split_list(&list);
        }
        if let Some(binary) = get("AUTOTUNE_DOCKER_BINARY") {
            self.docker_binary = binary.trim().to_string();
        }
        if let Some(prefix) = lookup("AUTOTUNE_CONTAINER_PREFIX") {
            self.container_prefix = prefix.trim().to_string();
        }
        if let Some(container) = get("AUTOTUNE_CONTAINER") {
            self.default_container = container.trim().to_string();
        }
        if let Some(value) = get("AUTOTUNE_DETECT_LEADER") {
            self.detect_leader = parse_env("AUTOTUNE_DETECT_LEADER", &value)?;
        }
        if let Some(value) = get("AUTOTUNE_RE_RESOLVE") {
            self.re_resolve_after_restart = parse_env("AUTOTUNE_RE_RESOLVE", &value)?;
        }
        if let Some(user) = get("AUTOTUNE_DB_USER") {
            self.db_user = user.trim().to_string();
        }
        if let Some(name) = get("AUTOTUNE_DB_NAME") {
            self.db_name = name.trim().to_string();
        }
        if let Some(value) = get("AUTOTUNE_BENCH_MODE") {
            self.benchmark_mode = value.parse()?;
        }
        if let Some(host) = get("AUTOTUNE_DB_HOST") {
            self.db_host = host.trim().to_string();
        }
        if let Some(value) = get("AUTOTUNE_DB_PORT") {
            self.db_port = parse_env("AUTOTUNE_DB_PORT", &value)?;
        }
        if let Some(password) = lookup("AUTOTUNE_DB_PASSWORD").or_else(|| lookup("PGPASSWORD")) {
            self.db_password = Some(password);
        }
        if let Some(value) = get("AUTOTUNE_CLIENTS") {
            self.clients = parse_env("AUTOTUNE_CLIENTS", &value)?;
        }
        if let Some(value) = get("AUTOTUNE_DURATION_SECONDS") {
            self.duration_seconds = parse_env("AUTOTUNE_DURATION_SECONDS", &value)?;
        }
        if let Some(value) = get("AUTOTUNE_RETRIES") {
            self.retries = parse_env("AUTOTUNE_RETRIES", &value)?;
        }
        if let Some(value) = get("AUTOTUNE_RETRY_WAIT_SECONDS") {
            self.retry_wait_seconds = parse_env("AUTOTUNE_RETRY_WAIT_SECONDS", &value)?;
        }
        if let Some(value) = get("AUTOTUNE_READY_TIMEOUT_SECONDS") {
            self.ready_timeout_seconds = parse_env("AUTOTUNE_READY_TIMEOUT_SECONDS", &value)?;
        }
        if let Some(value) = get("AUTOTUNE_POLL_INTERVAL_SECONDS") {
            self.poll_interval_seconds = parse_env("AUTOTUNE_POLL_INTERVAL_SECONDS", &value)?;
        }
        if let Some(value) = get("AUTOTUNE_TRIALS") {
            self.trials = parse_env("AUTOTUNE_TRIALS", &value)?;
        }
        if let Some(value) = get("AUTOTUNE_SEED") {
            self.seed = parse_env("AUTOTUNE_SEED", &value)?;
        }
        if let Some(value) = get("AUTOTUNE_STRATEGY") {
            self.strategy = value.parse()?;
        }
        if let Some(value) = get("AUTOTUNE_INITIAL_POINTS") {
            self.initial_points = parse_env("AUTOTUNE_INITIAL_POINTS", &value)?;
        }
        if let Some(value) = get("AUTOTUNE_GRID_POINTS") {
            self.grid_points = parse_env("AUTOTUNE_GRID_POINTS", &value)?;
        }
        if let Some(value) = get("AUTOTUNE_SHARED_BUFFERS") {
            self.shared_buffers = split_list(&value);
        }
        if let Some(value) = get("AUTOTUNE_WORK_MEM") {
            self.work_mem = split_list(&value);
        }
        if let Some(value) = get("AUTOTUNE_MAX_CONNECTIONS") {
            self.max_connections = parse_int_range(&value)
                .map_err(|e| AppError::config(format!("Invalid AUTOTUNE_MAX_CONNECTIONS value '{}': {}", value, e)))?;
        }
        if let Some(path) = get("AUTOTUNE_RESULTS_FILE") {
            self.results_file = Some(PathBuf::from(path.trim()));
        }
        if let Some(path) = get("AUTOTUNE_LOG_FILE") {
            self.log_file = Some(PathBuf::from(path.trim()));
        }
        if let Some(value) = get("AUTOTUNE_LOG_FORMAT") {
            self.log_format = value.parse()?;
        }
        if let Some(value) = get("AUTOTUNE_ENABLE_COLOR") {
            self.enable_color = parse_env("AUTOTUNE_ENABLE_COLOR", &value)?;
        }

        Ok(())
    }
}

/// Comma-separated list with blanks removed
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Parse an inclusive `LOW-HIGH` range
pub fn parse_int_range(value: &str) -> Result<(i64, i64)> {
    let (low, high) = value
        .trim()
        .split_once('-')
        .ok_or_else(|| AppError::parse(format!("Expected LOW-HIGH, got '{}'", value)))?;
    let low: i64 = low.trim().parse()?;
    let high: i64 = high.trim().parse()?;
    if low > high {
        return Err(AppError::parse(format!("Range lower bound {} exceeds upper bound {}", low, high)));
    }
    Ok((low, high))
}

fn parse_env<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| AppError::config(format!("Invalid {} value '{}': {}", key, value, e)))
}

// Default value functions for serde
fn default_config_format() -> ConfigFormat {
    ConfigFormat::Patroni
}

fn default_conf_path() -> String {
    crate::defaults::DEFAULT_CONF_PATH.to_string()
}

fn default_log_format() -> LogFormat {
    LogFormat::Console
}

fn default_config_file() -> PathBuf {
    PathBuf::from(crate::defaults::DEFAULT_CONFIG_FILE)
}

fn default_parameters_section() -> String {
    crate::defaults::DEFAULT_PARAMETERS_SECTION.to_string()
}

fn default_allow_list() -> Vec<String> {
    crate::defaults::DEFAULT_ALLOW_LIST
        .iter()
        .map(|&s| s.to_string())
        .collect()
}

fn default_docker_binary() -> String {
    crate::defaults::DEFAULT_DOCKER_BINARY.to_string()
}

fn default_container_prefix() -> String {
    crate::defaults::DEFAULT_CONTAINER_PREFIX.to_string()
}

fn default_container() -> String {
    crate::defaults::DEFAULT_CONTAINER.to_string()
}

fn default_true() -> bool {
    true
}

fn default_patronictl_path() -> String {
    crate::defaults::DEFAULT_PATRONICTL.to_string()
}

fn default_patroni_config() -> String {
    crate::defaults::DEFAULT_PATRONI_CONFIG.to_string()
}

fn default_db_user() -> String {
    crate::defaults::DEFAULT_DB_USER.to_string()
}

fn default_db_name() -> String {
    crate::defaults::DEFAULT_DB_NAME.to_string()
}

fn default_benchmark_mode() -> BenchmarkMode {
    BenchmarkMode::Container
}

fn default_db_host() -> String {
    crate::defaults::DEFAULT_DB_HOST.to_string()
}

fn default_db_port() -> u16 {
    crate::defaults::DEFAULT_DB_PORT
}

fn default_clients() -> u32 {
    crate::defaults::DEFAULT_BENCH_CLIENTS
}

fn default_duration_secs() -> u64 {
    crate::defaults::DEFAULT_BENCH_DURATION.as_secs()
}

fn default_retries() -> u32 {
    crate::defaults::DEFAULT_BENCH_RETRIES
}

fn default_retry_wait_secs() -> u64 {
    crate::defaults::DEFAULT_BENCH_RETRY_WAIT.as_secs()
}

fn default_ready_timeout_secs() -> u64 {
    crate::defaults::DEFAULT_READY_TIMEOUT.as_secs()
}

fn default_poll_interval_secs() -> u64 {
    crate::defaults::DEFAULT_POLL_INTERVAL.as_secs()
}

fn default_trials() -> u32 {
    crate::defaults::DEFAULT_TRIALS
}

fn default_seed() -> u64 {
    crate::defaults::DEFAULT_SEED
}

fn default_strategy() -> StrategyKind {
    StrategyKind::Bayesian
}

fn default_initial_points() -> u32 {
    crate::defaults::DEFAULT_INITIAL_POINTS
}

fn default_grid_points() -> u32 {
    crate::defaults::DEFAULT_GRID_POINTS
}

fn default_shared_buffers() -> Vec<String> {
    crate::defaults::DEFAULT_SHARED_BUFFERS
        .iter()
        .map(|&s| s.to_string())
        .collect()
}

fn default_work_mem() -> Vec<String> {
    crate::defaults::DEFAULT_WORK_MEM
        .iter()
        .map(|&s| s.to_string())
        .collect()
}

fn default_max_connections() -> (i64, i64) {
    crate::defaults::DEFAULT_MAX_CONNECTIONS
}

fn default_enable_color() -> bool {
    crate::defaults::DEFAULT_ENABLE_COLOR
}
