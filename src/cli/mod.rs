//! Command-line interface
//!
//! Every option is optional: unset flags leave the value coming from defaults,
//! `.env` or `AUTOTUNE_*` variables untouched.

use clap::Parser;
use std::path::PathBuf;

/// PostgreSQL Auto-Tuner - closed-loop search over database parameters
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "pg-autotune")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Where candidates are written: patroni (YAML document) or conf (file in the container)
    #[arg(long, value_name = "FORMAT")]
    pub config_format: Option<String>,

    /// YAML document holding the database parameters
    #[arg(short = 'f', long, value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    /// postgresql.conf path inside the target container, for the conf format
    #[arg(long, value_name = "PATH")]
    pub conf_path: Option<String>,

    /// Dotted path of the parameters mapping inside the document
    #[arg(long, value_name = "PATH")]
    pub parameters_section: Option<String>,

    /// Keys preserved besides the tuned ones (comma-separated)
    #[arg(long, value_name = "KEYS")]
    pub allow_list: Option<String>,

    /// Container runtime binary
    #[arg(long, value_name = "BIN")]
    pub docker_binary: Option<String>,

    /// Only containers with this name prefix are leader candidates
    #[arg(long, value_name = "PREFIX")]
    pub container_prefix: Option<String>,

    /// Fallback target, or the fixed target with --no-leader-detection
    #[arg(long, value_name = "NAME")]
    pub container: Option<String>,

    /// Use --container as-is instead of asking the cluster manager
    #[arg(long)]
    pub no_leader_detection: bool,

    /// Resolve the target again after every restart
    #[arg(long)]
    pub re_resolve: bool,

    /// patronictl path inside the containers
    #[arg(long, value_name = "PATH")]
    pub patronictl: Option<String>,

    /// Patroni configuration path inside the containers
    #[arg(long, value_name = "PATH")]
    pub patroni_config: Option<String>,

    #[arg(short = 'U', long, value_name = "USER")]
    pub db_user: Option<String>,

    #[arg(short = 'd', long, value_name = "NAME")]
    pub db_name: Option<String>,

    /// Where pgbench runs: container or host
    #[arg(long, value_name = "MODE")]
    pub bench_mode: Option<String>,

    /// Database host for host benchmark mode
    #[arg(long, value_name = "HOST")]
    pub db_host: Option<String>,

    /// Database port for host benchmark mode
    #[arg(long, value_name = "PORT")]
    pub db_port: Option<u16>,

    /// Concurrent benchmark clients
    #[arg(short = 'c', long, value_name = "N")]
    pub clients: Option<u32>,

    /// Benchmark duration in seconds
    #[arg(short = 'T', long, value_name = "SECS", value_parser = parse_seconds)]
    pub duration: Option<u64>,

    /// Benchmark attempts before recording zero throughput
    #[arg(long, value_name = "N")]
    pub retries: Option<u32>,

    /// Seconds between benchmark attempts
    #[arg(long, value_name = "SECS", value_parser = parse_seconds)]
    pub retry_wait: Option<u64>,

    /// Seconds to wait for the target to accept connections
    #[arg(long, value_name = "SECS", value_parser = parse_seconds)]
    pub ready_timeout: Option<u64>,

    /// Seconds between readiness probes
    #[arg(long, value_name = "SECS", value_parser = parse_seconds)]
    pub poll_interval: Option<u64>,

    /// Number of trials
    #[arg(short = 'n', long, value_name = "N")]
    pub trials: Option<u32>,

    /// Seed for reproducible proposals
    #[arg(short = 's', long, value_name = "SEED")]
    pub seed: Option<u64>,

    /// Search strategy: bayesian, random or grid
    #[arg(long, value_name = "NAME")]
    pub strategy: Option<String>,

    /// Random proposals before the surrogate model takes over
    #[arg(long, value_name = "N")]
    pub initial_points: Option<u32>,

    /// Values per integer range in grid search
    #[arg(long, value_name = "N")]
    pub grid_points: Option<u32>,

    /// shared_buffers choices (comma-separated, in order)
    #[arg(long, value_name = "LIST")]
    pub shared_buffers: Option<String>,

    /// work_mem choices (comma-separated, in order)
    #[arg(long, value_name = "LIST")]
    pub work_mem: Option<String>,

    /// max_connections range, e.g. 50-100
    #[arg(long, value_name = "LOW-HIGH")]
    pub max_connections: Option<String>,

    /// Append one record per trial to this file
    #[arg(short = 'o', long, value_name = "PATH")]
    pub results_file: Option<PathBuf>,

    /// Also append log lines to this file
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Log line format: console, json or compact
    #[arg(long, value_name = "FORMAT")]
    pub log_format: Option<String>,

    /// Resolve the target and show the plan without touching anything
    #[arg(long)]
    pub dry_run: bool,

    /// Print an example .env file and exit
    #[arg(long)]
    pub print_env_example: bool,

    /// Force colored output
    #[arg(long)]
    pub color: bool,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,

    /// Enable verbose output
    #[arg(long)]
    pub verbose: bool,

    /// Enable debug output
    #[arg(long)]
    pub debug: bool,
}

impl Cli {
    /// Validate CLI arguments for conflicts and requirements
    pub fn validate(&self) -> Result<(), String> {
        if self.color && self.no_color {
            return Err("Cannot specify both --color and --no-color".to_string());
        }

        if let Some(range) = &self.max_connections {
            crate::models::config::parse_int_range(range)
                .map_err(|e| format!("Invalid --max-connections '{}': {}", range, e))?;
        }

        if let Some(strategy) = &self.strategy {
            strategy
                .parse::<crate::search::StrategyKind>()
                .map_err(|e| e.to_string())?;
        }

        if let Some(mode) = &self.bench_mode {
            mode.parse::<crate::models::BenchmarkMode>()
                .map_err(|e| e.to_string())?;
        }

        if let Some(format) = &self.config_format {
            format
                .parse::<crate::models::ConfigFormat>()
                .map_err(|e| e.to_string())?;
        }

        if let Some(format) = &self.log_format {
            format
                .parse::<crate::logging::LogFormat>()
                .map_err(|e| e.to_string())?;
        }

        if self.re_resolve && self.no_leader_detection {
            return Err("--re-resolve has no effect with --no-leader-detection".to_string());
        }

        Ok(())
    }

    /// Check if colors should be enabled
    pub fn use_colors(&self) -> bool {
        if self.color {
            true
        } else if self.no_color {
            false
        } else {
            supports_color()
        }
    }
}

/// Positive number of seconds, at most one day
fn parse_seconds(s: &str) -> Result<u64, String> {
    if s.starts_with('+') || s.starts_with("0x") || s.starts_with("0X") {
        return Err(format!("Invalid duration: {}", s));
    }

    s.parse::<u64>()
        .map_err(|_| format!("Invalid duration: {}", s))
        .and_then(|secs| {
            if secs == 0 {
                Err("Duration must be greater than 0".to_string())
            } else if secs > 86_400 {
                Err("Duration cannot exceed 86400 seconds".to_string())
            } else {
                Ok(secs)
            }
        })
}

/// Check if the terminal supports color output
pub fn supports_color() -> bool {
    if let Ok(term) = std::env::var("TERM") {
        if term == "dumb" {
            return false;
        }
    }

    if std::env::var("NO_COLOR").is_ok() {
        return false;
    }

    if std::env::var("FORCE_COLOR").is_ok() {
        return true;
    }

    #[cfg(unix)]
    {
        true
    }
    #[cfg(not(unix))]
    {
        false
    }
}
