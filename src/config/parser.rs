//! Configuration parsing from CLI arguments and environment variables

use crate::{
    cli::{supports_color, Cli},
    config::env::EnvManager,
    error::{AppError, Result},
    models::{config::parse_int_range, config::split_list, Config, ConfigFormat},
};
use std::path::PathBuf;

/// Configuration parser that combines CLI arguments with environment variables
pub struct ConfigParser {
    cli: Cli,
}

impl ConfigParser {
    /// Create a new configuration parser with CLI arguments
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }

    /// Parse and build the complete configuration
    pub fn parse(&self) -> Result<Config> {
        let mut config = Config::default();

        EnvManager::load_env_file(self.cli.debug)?;
        config.merge_from_env()?;

        self.apply_cli_overrides(&mut config)?;
        config.validate()?;

        Ok(config)
    }

    /// Apply CLI argument overrides to configuration
    pub fn apply_cli_overrides(&self, config: &mut Config) -> Result<()> {
        let cli = &self.cli;

        if let Some(format) = &cli.config_format {
            config.config_format = format.parse()?;
        }
        if let Some(path) = &cli.config_file {
            config.config_file = path.clone();
        }
        if let Some(path) = &cli.conf_path {
            config.conf_path = path.trim().to_string();
        }
        if let Some(section) = &cli.parameters_section {
            config.parameters_section = section.trim().to_string();
        }
        if let Some(list) = &cli.allow_list {
            config.allow_list = split_list(list);
        }

        if let Some(binary) = &cli.docker_binary {
            config.docker_binary = binary.clone();
        }
        if let Some(prefix) = &cli.container_prefix {
            config.container_prefix = prefix.clone();
        }
        if let Some(container) = &cli.container {
            config.default_container = container.clone();
        }
        if cli.no_leader_detection {
            config.detect_leader = false;
        }
        if cli.re_resolve {
            config.re_resolve_after_restart = true;
        }
        if let Some(path) = &cli.patronictl {
            config.patronictl_path = path.clone();
        }
        if let Some(path) = &cli.patroni_config {
            config.patroni_config = path.clone();
        }

        if let Some(user) = &cli.db_user {
            config.db_user = user.clone();
        }
        if let Some(name) = &cli.db_name {
            config.db_name = name.clone();
        }
        if let Some(mode) = &cli.bench_mode {
            config.benchmark_mode = mode.parse()?;
        }
        if let Some(host) = &cli.db_host {
            config.db_host = host.clone();
        }
        if let Some(port) = cli.db_port {
            config.db_port = port;
        }

        if let Some(clients) = cli.clients {
            config.clients = clients;
        }
        if let Some(duration) = cli.duration {
            config.duration_seconds = duration;
        }
        if let Some(retries) = cli.retries {
            config.retries = retries;
        }
        if let Some(wait) = cli.retry_wait {
            config.retry_wait_seconds = wait;
        }
        if let Some(timeout) = cli.ready_timeout {
            config.ready_timeout_seconds = timeout;
        }
        if let Some(interval) = cli.poll_interval {
            config.poll_interval_seconds = interval;
        }

        if let Some(trials) = cli.trials {
            config.trials = trials;
        }
        if let Some(seed) = cli.seed {
            config.seed = seed;
        }
        if let Some(strategy) = &cli.strategy {
            config.strategy = strategy.parse()?;
        }
        if let Some(points) = cli.initial_points {
            config.initial_points = points;
        }
        if let Some(points) = cli.grid_points {
            config.grid_points = points;
        }
        if let Some(values) = &cli.shared_buffers {
            config.shared_buffers = split_list(values);
        }
        if let Some(values) = &cli.work_mem {
            config.work_mem = split_list(values);
        }
        if let Some(range) = &cli.max_connections {
            config.max_connections = parse_int_range(range)
                .map_err(|e| AppError::config(format!("Invalid --max-connections '{}': {}", range, e)))?;
        }

        if let Some(path) = &cli.results_file {
            config.results_file = Some(path.clone());
        }
        if let Some(path) = &cli.log_file {
            config.log_file = Some(path.clone());
        }
        if let Some(format) = &cli.log_format {
            config.log_format = format.parse()?;
        }

        if cli.color {
            config.enable_color = true;
        } else if cli.no_color || !supports_color() {
            config.enable_color = false;
        }

        // CLI-only flags
        config.verbose = cli.verbose;
        config.debug = cli.debug;

        if config.debug {
            eprintln!("Applied CLI overrides to configuration");
            eprintln!(
                "Final config: trials={}, strategy={}, seed={}, target={}",
                config.trials,
                config.strategy.as_str(),
                config.seed,
                config.default_container
            );
        }

        Ok(())
    }
}

/// Convenience function to load complete configuration from CLI arguments
pub fn load_config(cli: Cli) -> Result<Config> {
    ConfigParser::new(cli).parse()
}

/// Display configuration summary for debug purposes
pub fn display_config_summary(config: &Config) -> String {
    let mut summary = Vec::new();

    match config.config_format {
        ConfigFormat::Patroni => summary.push(format!(
            "Document: {} [{}]",
            config.config_file.display(),
            config.parameters_section
        )),
        ConfigFormat::Conf => summary.push(format!("Document: {} (inside the target)", config.conf_path)),
    }
    summary.push(format!("Allow-list: {}", config.allow_list.join(", ")));
    summary.push(format!(
        "Target: {} (leader detection: {}, prefix: '{}')",
        config.default_container, config.detect_leader, config.container_prefix
    ));
    summary.push(format!(
        "Benchmark: {} mode, {} clients, {}s, {} retries every {}s",
        config.benchmark_mode.as_str(),
        config.clients,
        config.duration_seconds,
        config.retries,
        config.retry_wait_seconds
    ));
    summary.push(format!(
        "Readiness: every {}s for up to {}s",
        config.poll_interval_seconds, config.ready_timeout_seconds
    ));
    summary.push(format!(
        "Search: {} with {} trials (seed {})",
        config.strategy.as_str(),
        config.trials,
        config.seed
    ));
    summary.push(format!(
        "Results File: {}",
        config
            .results_file
            .as_ref()
            .map(PathBuf::as_path)
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none)".to_string())
    ));
    summary.push(format!("Log Format: {}", config.log_format.as_str()));
    summary.push(format!("Color Output: {}", config.enable_color));
    summary.push(format!("Verbose: {}", config.verbose));
    summary.push(format!("Debug: {}", config.debug));

    summary.join("\n")
}
