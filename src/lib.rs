//! PostgreSQL Auto-Tuner
//!
//! Closed-loop tuning of a few database engine parameters: every trial rewrites
//! the persisted configuration, restarts the target container, waits until it
//! accepts connections, runs a load benchmark and feeds the measured throughput
//! back into a search strategy that proposes the next candidate.

pub mod app;
pub mod benchmark;
pub mod cli;
pub mod conf_file;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod logging;
pub mod models;
pub mod mutator;
pub mod output;
pub mod parsing;
pub mod resolver;
pub mod runtime;
pub mod search;
pub mod tuner;
pub mod types;

// Re-export commonly used types
pub use error::{AppError, Result};
pub use models::{Config, TrialResult, BestTracker};
pub use search::{Candidate, Dimension, ParameterSpace, ParameterValue, SearchStrategy};
pub use tuner::{Tuner, TuningReport};
pub use types::{ReadinessOutcome, TargetIdentity};

/// Application version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");
pub const PKG_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
pub const BUILD_TIME: Option<&str> = option_env!("BUILD_TIME");
pub const GIT_COMMIT: Option<&str> = option_env!("GIT_COMMIT");

/// Default configuration values
pub mod defaults {
    use std::time::Duration;

    pub const DEFAULT_CONFIG_FILE: &str = "config/patroni-master.yml";
    pub const DEFAULT_CONF_PATH: &str = "/var/lib/postgresql/data/postgresql.conf";
    pub const DEFAULT_PARAMETERS_SECTION: &str = "postgresql.parameters";
    pub const DEFAULT_ALLOW_LIST: &[&str] = &["shared_preload_libraries", "unix_socket_directories"];

    pub const DEFAULT_DOCKER_BINARY: &str = "docker";
    pub const DEFAULT_CONTAINER_PREFIX: &str = "postgres-";
    pub const DEFAULT_CONTAINER: &str = "postgres-master";
    pub const DEFAULT_PATRONICTL: &str = "/opt/patroni/bin/patronictl";
    pub const DEFAULT_PATRONI_CONFIG: &str = "/etc/patroni.yml";

    pub const DEFAULT_DB_USER: &str = "postgres";
    pub const DEFAULT_DB_NAME: &str = "postgres";
    pub const DEFAULT_DB_HOST: &str = "localhost";
    pub const DEFAULT_DB_PORT: u16 = 5432;

    pub const DEFAULT_BENCH_CLIENTS: u32 = 10;
    pub const DEFAULT_BENCH_DURATION: Duration = Duration::from_secs(30);
    pub const DEFAULT_BENCH_RETRIES: u32 = 5;
    pub const DEFAULT_BENCH_RETRY_WAIT: Duration = Duration::from_secs(8);

    pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(120);
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

    pub const DEFAULT_TRIALS: u32 = 10;
    pub const DEFAULT_SEED: u64 = 42;
    pub const DEFAULT_INITIAL_POINTS: u32 = 5;
    pub const DEFAULT_GRID_POINTS: u32 = 3;

    pub const DEFAULT_SHARED_BUFFERS: &[&str] = &["128MB", "256MB", "512MB"];
    pub const DEFAULT_WORK_MEM: &[&str] = &["4MB", "8MB", "16MB"];
    pub const DEFAULT_MAX_CONNECTIONS: (i64, i64) = (50, 100);

    pub const READINESS_MARKER: &str = "accepting connections";
    pub const THROUGHPUT_MARKER: &str = "tps =";
    pub const LATENCY_MARKER: &str = "latency average =";

    pub const DEFAULT_ENABLE_COLOR: bool = true;
}
