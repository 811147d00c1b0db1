//! Configuration validation utilities and rules
//!
//! [`Config::validate`] rejects settings the tuner cannot run with. The
//! validator here goes one step further and reports combinations that are
//! legal but probably not what the operator meant.

use crate::{
    error::Result,
    models::{BenchmarkMode, Config, ConfigFormat},
    search::StrategyKind,
};
use std::time::Duration;

/// Tuned parameter names
const TUNED_KEYS: &[&str] = &["shared_buffers", "work_mem", "max_connections"];

/// Configuration validator with advanced validation rules
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate configuration with comprehensive checks
    pub fn validate_comprehensive(config: &Config) -> Result<Vec<ValidationWarning>> {
        config.validate()?;

        let mut warnings = Vec::new();
        warnings.extend(Self::validate_document(config));
        warnings.extend(Self::validate_search(config)?);
        warnings.extend(Self::validate_timing(config));
        warnings.extend(Self::validate_benchmark(config));
        warnings.extend(Self::validate_resolution(config));
        Ok(warnings)
    }

    fn validate_document(config: &Config) -> Vec<ValidationWarning> {
        let mut warnings = Vec::new();

        if config.config_format == ConfigFormat::Conf {
            if config.detect_leader {
                warnings.push(ValidationWarning::new(
                    ValidationLevel::Warning,
                    format!(
                        "{} is edited inside the resolved leader only; Patroni rewrites it from its own document",
                        config.conf_path
                    ),
                ));
            }
            return warnings;
        }

        if !config.config_file.exists() {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Warning,
                format!(
                    "Configuration document {} does not exist; every trial will fail to apply",
                    config.config_file.display()
                ),
            ));
        }

        for key in &config.allow_list {
            if TUNED_KEYS.contains(&key.as_str()) {
                warnings.push(ValidationWarning::new(
                    ValidationLevel::Info,
                    format!("Allow-list entry '{}' is a tuned parameter and is always kept", key),
                ));
            }
        }

        warnings
    }

    fn validate_search(config: &Config) -> Result<Vec<ValidationWarning>> {
        let mut warnings = Vec::new();
        let space = config.parameter_space()?;

        match config.strategy {
            StrategyKind::Bayesian if config.trials <= config.initial_points => {
                warnings.push(ValidationWarning::new(
                    ValidationLevel::Warning,
                    format!(
                        "{} trials with {} initial points: every proposal will be random",
                        config.trials, config.initial_points
                    ),
                ));
            }
            StrategyKind::Grid => {
                let size = space.grid(config.grid_points as usize).len();
                if (config.trials as usize) < size {
                    warnings.push(ValidationWarning::new(
                        ValidationLevel::Info,
                        format!("Grid has {} points, only the first {} will be tried", size, config.trials),
                    ));
                } else if (config.trials as usize) > size {
                    warnings.push(ValidationWarning::new(
                        ValidationLevel::Info,
                        format!("Grid has {} points, {} trials will revisit some of them", size, config.trials),
                    ));
                }
            }
            _ => {}
        }

        if space.cardinality() < config.trials as u64 {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Info,
                format!(
                    "Only {} distinct configurations exist for {} trials",
                    space.cardinality(),
                    config.trials
                ),
            ));
        }

        Ok(warnings)
    }

    fn validate_timing(config: &Config) -> Vec<ValidationWarning> {
        let mut warnings = Vec::new();

        if config.ready_timeout() < config.poll_interval() {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Warning,
                format!(
                    "Readiness timeout ({}s) is shorter than the poll interval ({}s); only one probe will run",
                    config.ready_timeout_seconds, config.poll_interval_seconds
                ),
            ));
        }

        let worst_trial = config.ready_timeout()
            + config.benchmark_duration() * config.retries
            + config.retry_wait() * config.retries;
        let worst_run = worst_trial * config.trials;
        if worst_run > Duration::from_secs(24 * 3600) {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Warning,
                format!(
                    "Worst-case run time is {:.1} hours",
                    worst_run.as_secs_f64() / 3600.0
                ),
            ));
        }

        warnings
    }

    fn validate_benchmark(config: &Config) -> Vec<ValidationWarning> {
        let mut warnings = Vec::new();

        if config.duration_seconds < 10 {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Info,
                format!(
                    "{}s benchmarks are short; throughput will be noisy between trials",
                    config.duration_seconds
                ),
            ));
        }

        if i64::from(config.clients) >= config.max_connections.0 {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Warning,
                format!(
                    "{} clients may exceed max_connections={} and make pgbench fail to connect",
                    config.clients, config.max_connections.0
                ),
            ));
        }

        if config.benchmark_mode == BenchmarkMode::Host && config.db_password.is_none() {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Info,
                "Host benchmark mode without a password relies on trust auth or ~/.pgpass".to_string(),
            ));
        }

        warnings
    }

    fn validate_resolution(config: &Config) -> Vec<ValidationWarning> {
        let mut warnings = Vec::new();

        if config.re_resolve_after_restart && !config.detect_leader {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Warning,
                "Re-resolving after restarts has no effect without leader detection".to_string(),
            ));
        }

        if config.detect_leader && !config.default_container.starts_with(&config.container_prefix) {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Info,
                format!(
                    "Fallback container '{}' does not match prefix '{}'",
                    config.default_container, config.container_prefix
                ),
            ));
        }

        warnings
    }
}

/// Validation warning levels
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationLevel {
    Info,
    Warning,
    Error,
}

impl ValidationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
        }
    }
}

/// Configuration validation warning
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub level: ValidationLevel,
    pub message: String,
}

impl ValidationWarning {
    pub fn new(level: ValidationLevel, message: String) -> Self {
        Self { level, message }
    }

    pub fn format(&self) -> String {
        format!("[{}] {}", self.level.as_str(), self.message)
    }
}

/// Convenience function for comprehensive configuration validation
pub fn validate_config(config: &Config) -> Result<Vec<ValidationWarning>> {
    ConfigValidator::validate_comprehensive(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn config_with_document() -> (Config, NamedTempFile) {
        let document = NamedTempFile::new().unwrap();
        let config = Config {
            config_file: document.path().to_path_buf(),
            ..Config::default()
        };
        (config, document)
    }

    fn messages(warnings: &[ValidationWarning]) -> Vec<String> {
        warnings.iter().map(|w| w.format()).collect()
    }

    #[test]
    fn test_defaults_produce_no_warnings() {
        let (config, _doc) = config_with_document();
        let warnings = validate_config(&config).unwrap();
        assert!(warnings.is_empty(), "{:?}", messages(&warnings));
    }

    #[test]
    fn test_missing_document_warns() {
        let config = Config {
            config_file: "/nonexistent/patroni.yml".into(),
            ..Config::default()
        };
        let warnings = validate_config(&config).unwrap();
        assert!(warnings
            .iter()
            .any(|w| w.level == ValidationLevel::Warning && w.message.contains("does not exist")));
    }

    #[test]
    fn test_conf_format_skips_host_document() {
        let config = Config {
            config_format: ConfigFormat::Conf,
            config_file: "/nonexistent/patroni.yml".into(),
            ..Config::default()
        };
        let text = messages(&validate_config(&config).unwrap()).join("\n");
        assert!(!text.contains("does not exist"));
        assert!(text.contains("edited inside the resolved leader only"));

        let standalone = Config {
            detect_leader: false,
            ..config
        };
        assert!(validate_config(&standalone).unwrap().is_empty());
    }

    #[test]
    fn test_bayesian_without_model_trials() {
        let (mut config, _doc) = config_with_document();
        config.trials = 5;
        config.initial_points = 5;
        let text = messages(&validate_config(&config).unwrap()).join("\n");
        assert!(text.contains("every proposal will be random"));
    }

    #[test]
    fn test_grid_coverage() {
        let (mut config, _doc) = config_with_document();
        config.strategy = StrategyKind::Grid;
        config.trials = 4;
        let text = messages(&validate_config(&config).unwrap()).join("\n");
        // 3 x 3 x 3 grid
        assert!(text.contains("Grid has 27 points, only the first 4 will be tried"));
    }

    #[test]
    fn test_timing_and_benchmark_warnings() {
        let (mut config, _doc) = config_with_document();
        config.ready_timeout_seconds = 2;
        config.duration_seconds = 5;
        config.clients = 64;
        let warnings = validate_config(&config).unwrap();
        let text = messages(&warnings).join("\n");
        assert!(text.contains("only one probe will run"));
        assert!(text.contains("throughput will be noisy"));
        assert!(text.contains("64 clients may exceed max_connections=50"));
    }

    #[test]
    fn test_resolution_warnings() {
        let (mut config, _doc) = config_with_document();
        config.detect_leader = false;
        config.re_resolve_after_restart = true;
        let warnings = validate_config(&config).unwrap();
        assert!(warnings.iter().any(|w| w.message.contains("no effect without leader detection")));
    }

    #[test]
    fn test_invalid_config_is_an_error() {
        let (mut config, _doc) = config_with_document();
        config.trials = 0;
        assert!(validate_config(&config).is_err());
    }
}
