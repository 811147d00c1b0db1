//! Environment variable handling and .env file management

use crate::error::{AppError, Result};
use std::path::Path;

/// Environment variable configuration manager
pub struct EnvManager;

impl EnvManager {
    /// Load .env file if it exists
    pub fn load_env_file(debug: bool) -> Result<()> {
        Self::load_env_file_from(Path::new(".env"), debug)
    }

    pub fn load_env_file_from(path: &Path, debug: bool) -> Result<()> {
        if path.exists() {
            dotenv::from_path(path)
                .map_err(|e| AppError::config(format!("Failed to load {}: {}", path.display(), e)))?;
            if debug {
                eprintln!("Loaded configuration from {}", path.display());
            }
        } else if debug {
            eprintln!("No .env file found, using defaults and CLI arguments");
        }
        Ok(())
    }

    /// Create example .env file content
    pub fn create_example_env_content() -> String {
        let mut content = String::from(
            "# PostgreSQL Auto-Tuner Configuration\n\
             #\n\
             # Values here override built-in defaults and are overridden by\n\
             # command-line arguments.\n\n",
        );
        for (var, description, example) in Self::get_supported_env_vars() {
            content.push_str(&format!("# {}\n# {}={}\n\n", description, var, example));
        }
        content.push_str(
            "# Example: tune a standalone container from the host\n\
             # AUTOTUNE_DETECT_LEADER=false\n\
             # AUTOTUNE_CONTAINER=postgres\n\
             # AUTOTUNE_BENCH_MODE=host\n\
             # AUTOTUNE_DB_PORT=5433\n\n\
             # Example: edit postgresql.conf inside a single container\n\
             # AUTOTUNE_CONFIG_FORMAT=conf\n\
             # AUTOTUNE_DETECT_LEADER=false\n",
        );
        content
    }

    /// Save example .env file to disk
    pub fn save_example_env_file(path: &Path) -> Result<()> {
        std::fs::write(path, Self::create_example_env_content())
            .map_err(|e| AppError::config(format!("Failed to write example .env file: {}", e)))
    }

    /// Validate environment variable format before parsing
    pub fn validate_env_var(key: &str, value: &str) -> Result<()> {
        let value = value.trim();
        let positive = |key: &str, max: u64| -> Result<()> {
            let n: u64 = value
                .parse()
                .map_err(|e| AppError::config(format!("Invalid {} value '{}': {}", key, value, e)))?;
            if n == 0 || n > max {
                return Err(AppError::config(format!("{} must be between 1 and {}, got: {}", key, max, n)));
            }
            Ok(())
        };

        match key {
            "AUTOTUNE_CLIENTS" => positive(key, 10_000),
            "AUTOTUNE_RETRIES" => positive(key, 100),
            "AUTOTUNE_TRIALS" => positive(key, 1000),
            "AUTOTUNE_GRID_POINTS" => positive(key, 1000),
            "AUTOTUNE_DURATION_SECONDS"
            | "AUTOTUNE_RETRY_WAIT_SECONDS"
            | "AUTOTUNE_READY_TIMEOUT_SECONDS"
            | "AUTOTUNE_POLL_INTERVAL_SECONDS" => positive(key, 86_400),
            "AUTOTUNE_DB_PORT" => value
                .parse::<u16>()
                .map(|_| ())
                .map_err(|e| AppError::config(format!("Invalid {} value '{}': {}", key, value, e))),
            "AUTOTUNE_SEED" | "AUTOTUNE_INITIAL_POINTS" => value
                .parse::<u64>()
                .map(|_| ())
                .map_err(|e| AppError::config(format!("Invalid {} value '{}': {}", key, value, e))),
            "AUTOTUNE_DETECT_LEADER" | "AUTOTUNE_RE_RESOLVE" | "AUTOTUNE_ENABLE_COLOR" => value
                .parse::<bool>()
                .map(|_| ())
                .map_err(|e| AppError::config(format!("Invalid {} value '{}': {}", key, value, e))),
            "AUTOTUNE_STRATEGY" => value.parse::<crate::search::StrategyKind>().map(|_| ()),
            "AUTOTUNE_BENCH_MODE" => value.parse::<crate::models::BenchmarkMode>().map(|_| ()),
            "AUTOTUNE_CONFIG_FORMAT" => value.parse::<crate::models::ConfigFormat>().map(|_| ()),
            "AUTOTUNE_LOG_FORMAT" => value.parse::<crate::logging::LogFormat>().map(|_| ()),
            "AUTOTUNE_CONF_PATH" => {
                if !value.starts_with('/') {
                    return Err(AppError::config(format!("{} must be an absolute path, got '{}'", key, value)));
                }
                Ok(())
            }
            "AUTOTUNE_MAX_CONNECTIONS" => crate::models::config::parse_int_range(value)
                .map(|_| ())
                .map_err(|e| AppError::config(format!("Invalid {} value '{}': {}", key, value, e))),
            "AUTOTUNE_SHARED_BUFFERS" | "AUTOTUNE_WORK_MEM" | "AUTOTUNE_ALLOW_LIST" => {
                if crate::models::config::split_list(value).is_empty() {
                    return Err(AppError::config(format!("{} must list at least one value", key)));
                }
                Ok(())
            }
            "AUTOTUNE_PARAMETERS_SECTION" => {
                if value.split('.').any(|s| s.trim().is_empty()) {
                    return Err(AppError::config(format!("Invalid {} value '{}'", key, value)));
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Get list of all supported environment variables with descriptions
    pub fn get_supported_env_vars() -> Vec<(&'static str, &'static str, &'static str)> {
        vec![
            ("AUTOTUNE_CONFIG_FORMAT", "Where candidates are written (patroni/conf)", "patroni"),
            ("AUTOTUNE_CONFIG_FILE", "YAML document holding the database parameters", "config/patroni-master.yml"),
            ("AUTOTUNE_CONF_PATH", "postgresql.conf inside the target, for the conf format", "/var/lib/postgresql/data/postgresql.conf"),
            ("AUTOTUNE_PARAMETERS_SECTION", "Dotted path of the parameters mapping", "postgresql.parameters"),
            ("AUTOTUNE_ALLOW_LIST", "Keys preserved besides the tuned ones", "shared_preload_libraries,unix_socket_directories"),
            ("AUTOTUNE_DOCKER_BINARY", "Container runtime binary", "docker"),
            ("AUTOTUNE_CONTAINER_PREFIX", "Name prefix of cluster member containers", "postgres-"),
            ("AUTOTUNE_CONTAINER", "Fallback or fixed target container", "postgres-master"),
            ("AUTOTUNE_DETECT_LEADER", "Ask patronictl for the leader (true/false)", "true"),
            ("AUTOTUNE_RE_RESOLVE", "Resolve the target again after each restart", "false"),
            ("AUTOTUNE_DB_USER", "Database user for probes and benchmarks", "postgres"),
            ("AUTOTUNE_DB_NAME", "Database name for probes and benchmarks", "postgres"),
            ("AUTOTUNE_BENCH_MODE", "Where pgbench runs (container/host)", "container"),
            ("AUTOTUNE_DB_HOST", "Database host in host mode", "localhost"),
            ("AUTOTUNE_DB_PORT", "Database port in host mode", "5432"),
            ("AUTOTUNE_DB_PASSWORD", "Password passed as PGPASSWORD (falls back to PGPASSWORD)", "secret"),
            ("AUTOTUNE_CLIENTS", "Concurrent pgbench clients", "10"),
            ("AUTOTUNE_DURATION_SECONDS", "Benchmark length in seconds", "30"),
            ("AUTOTUNE_RETRIES", "Benchmark attempts before recording 0 tps", "5"),
            ("AUTOTUNE_RETRY_WAIT_SECONDS", "Seconds between benchmark attempts", "8"),
            ("AUTOTUNE_READY_TIMEOUT_SECONDS", "Seconds to wait for readiness", "120"),
            ("AUTOTUNE_POLL_INTERVAL_SECONDS", "Seconds between readiness probes", "5"),
            ("AUTOTUNE_TRIALS", "Number of trials (1-1000)", "10"),
            ("AUTOTUNE_SEED", "Seed for reproducible proposals", "42"),
            ("AUTOTUNE_STRATEGY", "Search strategy (bayesian/random/grid)", "bayesian"),
            ("AUTOTUNE_INITIAL_POINTS", "Random proposals before the model is used", "5"),
            ("AUTOTUNE_GRID_POINTS", "Values per integer range in grid search", "3"),
            ("AUTOTUNE_SHARED_BUFFERS", "shared_buffers choices, in order", "128MB,256MB,512MB"),
            ("AUTOTUNE_WORK_MEM", "work_mem choices, in order", "4MB,8MB,16MB"),
            ("AUTOTUNE_MAX_CONNECTIONS", "max_connections range LOW-HIGH", "50-100"),
            ("AUTOTUNE_RESULTS_FILE", "Per-trial results file", "tuning_results.txt"),
            ("AUTOTUNE_LOG_FILE", "Append log lines to this file", "autotune.log"),
            ("AUTOTUNE_LOG_FORMAT", "Log line format (console/json/compact)", "console"),
            ("AUTOTUNE_ENABLE_COLOR", "Enable colored output (true/false)", "true"),
        ]
    }

    /// Display environment variable help
    pub fn display_env_help() -> String {
        let mut help = String::from("Supported Environment Variables:\n\n");
        for (var, description, example) in Self::get_supported_env_vars() {
            help.push_str(&format!("  {:<32} {}\n", var, description));
            help.push_str(&format!("  {:<32} Example: {}\n\n", "", example));
        }

        help.push_str("Configuration Priority (highest to lowest):\n");
        help.push_str("  1. Command-line arguments\n");
        help.push_str("  2. Environment variables\n");
        help.push_str("  3. .env file values\n");
        help.push_str("  4. Default values\n");
        help
    }

    /// Validate all currently set environment variables
    pub fn validate_current_env() -> Vec<String> {
        Self::get_supported_env_vars()
            .into_iter()
            .filter_map(|(var, _, _)| {
                let value = std::env::var(var).ok()?;
                Self::validate_env_var(var, &value).err().map(|e| format!("Warning: {}", e))
            })
            .collect()
    }

    /// Check a .env file line by line; `None` when the file does not exist
    pub fn check_env_file(path: &Path) -> Result<Option<Vec<String>>> {
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::config(format!("Failed to read {}: {}", path.display(), e)))?;

        let mut warnings = Vec::new();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                if let Err(e) = Self::validate_env_var(key.trim(), value.trim()) {
                    warnings.push(format!("Line '{}': {}", line, e));
                }
            }
        }
        Ok(Some(warnings))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{NamedTempFile, TempDir};

    #[test]
    fn test_example_content_lists_every_variable() {
        let content = EnvManager::create_example_env_content();
        assert!(content.starts_with("# PostgreSQL Auto-Tuner Configuration"));
        for (var, _, example) in EnvManager::get_supported_env_vars() {
            assert!(content.contains(&format!("# {}={}", var, example)), "{}", var);
        }
    }

    #[test]
    fn test_example_values_are_valid() {
        for (var, _, example) in EnvManager::get_supported_env_vars() {
            assert!(EnvManager::validate_env_var(var, example).is_ok(), "{}={}", var, example);
        }
    }

    #[test]
    fn test_validate_env_var() {
        assert!(EnvManager::validate_env_var("AUTOTUNE_TRIALS", "25").is_ok());
        assert!(EnvManager::validate_env_var("AUTOTUNE_TRIALS", "0").is_err());
        assert!(EnvManager::validate_env_var("AUTOTUNE_TRIALS", "1001").is_err());
        assert!(EnvManager::validate_env_var("AUTOTUNE_RETRIES", "many").is_err());
        assert!(EnvManager::validate_env_var("AUTOTUNE_DB_PORT", "70000").is_err());
        assert!(EnvManager::validate_env_var("AUTOTUNE_DETECT_LEADER", "maybe").is_err());
        assert!(EnvManager::validate_env_var("AUTOTUNE_STRATEGY", "grid").is_ok());
        assert!(EnvManager::validate_env_var("AUTOTUNE_STRATEGY", "annealing").is_err());
        assert!(EnvManager::validate_env_var("AUTOTUNE_MAX_CONNECTIONS", "100-50").is_err());
        assert!(EnvManager::validate_env_var("AUTOTUNE_WORK_MEM", " , ").is_err());
        assert!(EnvManager::validate_env_var("AUTOTUNE_PARAMETERS_SECTION", "postgresql..parameters").is_err());
        assert!(EnvManager::validate_env_var("AUTOTUNE_CONFIG_FORMAT", "conf").is_ok());
        assert!(EnvManager::validate_env_var("AUTOTUNE_CONFIG_FORMAT", "ini").is_err());
        assert!(EnvManager::validate_env_var("AUTOTUNE_CONF_PATH", "postgresql.conf").is_err());
        assert!(EnvManager::validate_env_var("AUTOTUNE_LOG_FORMAT", "json").is_ok());
        assert!(EnvManager::validate_env_var("AUTOTUNE_LOG_FORMAT", "xml").is_err());
        assert!(EnvManager::validate_env_var("UNRELATED", "anything").is_ok());
    }

    #[test]
    fn test_save_example_env_file() {
        let temp_file = NamedTempFile::new().unwrap();
        EnvManager::save_example_env_file(temp_file.path()).unwrap();
        let content = std::fs::read_to_string(temp_file.path()).unwrap();
        assert!(content.contains("AUTOTUNE_TRIALS"));
    }

    #[test]
    fn test_check_env_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".env");
        assert!(EnvManager::check_env_file(&path).unwrap().is_none());

        std::fs::write(&path, "# comment\nAUTOTUNE_TRIALS=20\nAUTOTUNE_CLIENTS=0\n").unwrap();
        let warnings = EnvManager::check_env_file(&path).unwrap().unwrap();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("AUTOTUNE_CLIENTS=0"));
    }

    #[test]
    fn test_env_help_mentions_priority() {
        let help = EnvManager::display_env_help();
        assert!(help.contains("AUTOTUNE_CONFIG_FILE"));
        assert!(help.contains("1. Command-line arguments"));
    }
}
