//! Error handling for the configuration tuner

pub mod recovery;

pub use recovery::RetryPolicy;

use thiserror::Error;

/// Custom error types for the configuration tuner
#[derive(Error, Debug, Clone)]
pub enum AppError {
    /// Configuration-related errors (settings, CLI, environment)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Target resolution errors
    #[error("Target resolution error: {0}")]
    Resolution(String),

    /// Configuration document could not be read, parsed or written
    #[error("Configuration document error: {0}")]
    Document(String),

    /// Configuration document does not have the expected shape
    #[error("Configuration structure error: {0}")]
    Structure(String),

    /// External command could not be spawned or awaited
    #[error("Command error: {0}")]
    Command(String),

    /// Target never reported readiness
    #[error("Readiness error: {0}")]
    Readiness(String),

    /// Benchmark run failed or produced no signal
    #[error("Benchmark error: {0}")]
    Benchmark(String),

    /// Search procedure failures
    #[error("Search error: {0}")]
    Search(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// I/O errors (file operations, etc.)
    #[error("I/O error: {0}")]
    Io(String),

    /// Parsing errors (numbers, YAML, JSON, etc.)
    #[error("Parsing error: {0}")]
    Parse(String),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config(message.into())
    }

    /// Create a new target resolution error
    pub fn resolution<S: Into<String>>(message: S) -> Self {
        Self::Resolution(message.into())
    }

    /// Create a new configuration document error
    pub fn document<S: Into<String>>(message: S) -> Self {
        Self::Document(message.into())
    }

    /// Create a new configuration structure error
    pub fn structure<S: Into<String>>(message: S) -> Self {
        Self::Structure(message.into())
    }

    /// Create a new command error
    pub fn command<S: Into<String>>(message: S) -> Self {
        Self::Command(message.into())
    }

    /// Create a new readiness error
    pub fn readiness<S: Into<String>>(message: S) -> Self {
        Self::Readiness(message.into())
    }

    /// Create a new benchmark error
    pub fn benchmark<S: Into<String>>(message: S) -> Self {
        Self::Benchmark(message.into())
    }

    /// Create a new search error
    pub fn search<S: Into<String>>(message: S) -> Self {
        Self::Search(message.into())
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation(message.into())
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        Self::Io(message.into())
    }

    /// Create a new parsing error
    pub fn parse<S: Into<String>>(message: S) -> Self {
        Self::Parse(message.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal(message.into())
    }

    /// Get error category for logging and reporting
    pub fn category(&self) -> &'static str {
        match self {
            Self::Config(_) => "CONFIG",
            Self::Resolution(_) => "RESOLVE",
            Self::Document(_) => "DOCUMENT",
            Self::Structure(_) => "STRUCTURE",
            Self::Command(_) => "COMMAND",
            Self::Readiness(_) => "READINESS",
            Self::Benchmark(_) => "BENCH",
            Self::Search(_) => "SEARCH",
            Self::Validation(_) => "VALIDATION",
            Self::Io(_) => "IO",
            Self::Parse(_) => "PARSE",
            Self::Internal(_) => "INTERNAL",
        }
    }

    /// Check if error is recoverable (the next attempt may succeed)
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Command(_) | Self::Readiness(_) | Self::Benchmark(_) | Self::Resolution(_) => true,
            Self::Document(_) | Self::Io(_) => true,
            Self::Config(_) | Self::Validation(_) | Self::Parse(_) => false,
            Self::Structure(_) | Self::Search(_) | Self::Internal(_) => false,
        }
    }

    /// Whether this error must terminate the whole tuning run.
    ///
    /// Everything below the trial level is converted into a throughput signal;
    /// only a broken document shape, a failing search procedure and internal
    /// faults stop the loop.
    pub fn is_run_fatal(&self) -> bool {
        matches!(
            self,
            Self::Structure(_) | Self::Search(_) | Self::Internal(_) | Self::Config(_) | Self::Validation(_)
        )
    }

    /// Get user-friendly error message with suggestions
    pub fn user_friendly_message(&self) -> String {
        match self {
            Self::Config(msg) => {
                format!("Configuration problem: {}\n\nSuggestion: Check your .env file or command line arguments.", msg)
            }
            Self::Resolution(msg) => {
                format!("Could not identify the tuning target: {}\n\nSuggestion: Check that the cluster containers are running or pass --container.", msg)
            }
            Self::Document(msg) => {
                format!("Configuration document problem: {}\n\nSuggestion: Check the path given with --config-file and its permissions.", msg)
            }
            Self::Structure(msg) => {
                format!("Unexpected configuration layout: {}\n\nSuggestion: The document must contain the parameters section named by --parameters-section.", msg)
            }
            Self::Command(msg) => {
                format!("External command failed: {}\n\nSuggestion: Verify that the container runtime is installed and on PATH.", msg)
            }
            Self::Readiness(msg) => {
                format!("Target not ready: {}\n\nSuggestion: Increase --ready-timeout or inspect the container logs.", msg)
            }
            Self::Benchmark(msg) => {
                format!("Benchmark failed: {}\n\nSuggestion: Make sure pgbench is initialised in the target database.", msg)
            }
            Self::Search(msg) => {
                format!("Search procedure failed: {}\n\nSuggestion: Check the parameter space and the selected strategy.", msg)
            }
            Self::Validation(msg) => {
                format!("Invalid input: {}\n\nSuggestion: Check the parameter space definition and numeric options.", msg)
            }
            Self::Io(msg) => {
                format!("File operation failed: {}\n\nSuggestion: Check file permissions and disk space.", msg)
            }
            Self::Parse(msg) => {
                format!("Failed to parse data: {}\n\nSuggestion: Check the format of your input data or configuration files.", msg)
            }
            Self::Internal(msg) => {
                format!("Internal error: {}\n\nThis is likely a bug. Please report this issue with the error details.", msg)
            }
        }
    }

    /// Get exit code for this error type
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Validation(_) | Self::Parse(_) => 1,
            Self::Resolution(_) | Self::Command(_) => 2,
            Self::Readiness(_) => 3,
            Self::Document(_) | Self::Structure(_) => 4,
            Self::Io(_) => 5,
            Self::Benchmark(_) | Self::Search(_) => 6,
            Self::Internal(_) => 99,
        }
    }

    /// Format error for console display with color coding
    pub fn format_for_console(&self, use_color: bool) -> String {
        let category = self.category();
        let message = self.to_string();

        if use_color {
            use colored::Colorize;
            match self {
                Self::Config(_) | Self::Validation(_) | Self::Parse(_) => {
                    format!("[{}] {}", category.red().bold(), message.red())
                }
                Self::Resolution(_) | Self::Command(_) | Self::Readiness(_) => {
                    format!("[{}] {}", category.yellow().bold(), message.yellow())
                }
                Self::Document(_) | Self::Structure(_) => {
                    format!("[{}] {}", category.magenta().bold(), message.magenta())
                }
                Self::Io(_) | Self::Benchmark(_) | Self::Search(_) => {
                    format!("[{}] {}", category.cyan().bold(), message.cyan())
                }
                Self::Internal(_) => {
                    format!("[{}] {}", category.bright_red().bold(), message.bright_red())
                }
            }
        } else {
            format!("[{}] {}", category, message)
        }
    }
}

// Standard library error conversions
impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        Self::io(error.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(error: serde_yaml::Error) -> Self {
        Self::document(format!("YAML error: {}", error))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(error: serde_json::Error) -> Self {
        Self::parse(format!("JSON parse error: {}", error))
    }
}

impl From<dotenv::Error> for AppError {
    fn from(error: dotenv::Error) -> Self {
        Self::config(format!("Environment file error: {}", error))
    }
}

impl From<std::num::ParseIntError> for AppError {
    fn from(error: std::num::ParseIntError) -> Self {
        Self::parse(format!("Integer parse error: {}", error))
    }
}

impl From<std::num::ParseFloatError> for AppError {
    fn from(error: std::num::ParseFloatError) -> Self {
        Self::parse(format!("Float parse error: {}", error))
    }
}

impl From<std::str::ParseBoolError> for AppError {
    fn from(error: std::str::ParseBoolError) -> Self {
        Self::parse(format!("Boolean parse error: {}", error))
    }
}

// Anyhow integration
impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        Self::internal(error.to_string())
    }
}

/// Custom Result type for the application
pub type Result<T> = std::result::Result<T, AppError>;

/// Error context trait for adding context to errors
pub trait ErrorContext<T> {
    /// Add context to an error
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;

    /// Add static context to an error
    fn context(self, message: &'static str) -> Result<T>;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: Into<AppError>,
{
    /// Prefixes the message while keeping the original category, so the
    /// trial/run fatality of the error survives the added context.
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| {
            let original = e.into();
            let context = f();
            match original {
                AppError::Config(m) => AppError::Config(format!("{}: {}", context, m)),
                AppError::Resolution(m) => AppError::Resolution(format!("{}: {}", context, m)),
                AppError::Document(m) => AppError::Document(format!("{}: {}", context, m)),
                AppError::Structure(m) => AppError::Structure(format!("{}: {}", context, m)),
                AppError::Command(m) => AppError::Command(format!("{}: {}", context, m)),
                AppError::Readiness(m) => AppError::Readiness(format!("{}: {}", context, m)),
                AppError::Benchmark(m) => AppError::Benchmark(format!("{}: {}", context, m)),
                AppError::Search(m) => AppError::Search(format!("{}: {}", context, m)),
                AppError::Validation(m) => AppError::Validation(format!("{}: {}", context, m)),
                AppError::Io(m) => AppError::Io(format!("{}: {}", context, m)),
                AppError::Parse(m) => AppError::Parse(format!("{}: {}", context, m)),
                AppError::Internal(m) => AppError::Internal(format!("{}: {}", context, m)),
            }
        })
    }

    fn context(self, message: &'static str) -> Result<T> {
        self.with_context(|| message.to_string())
    }
}

/// Error reporter for structured error logging and user feedback
pub struct ErrorReporter {
    pub use_color: bool,
    pub verbose: bool,
}

impl ErrorReporter {
    /// Create a new error reporter
    pub fn new(use_color: bool, verbose: bool) -> Self {
        Self { use_color, verbose }
    }

    /// Report an error to the user
    pub fn report_error(&self, error: &AppError) {
        eprintln!("{}", self.render(error));
    }

    /// Render the report without printing it
    pub fn render(&self, error: &AppError) -> String {
        let mut out = error.format_for_console(self.use_color);

        if self.verbose {
            out.push_str("\n\n");
            out.push_str(&error.user_friendly_message());

            if error.is_recoverable() {
                out.push_str("\n\n");
                let hint = "This error might be temporary. You can try running the command again.";
                if self.use_color {
                    use colored::Colorize;
                    out.push_str(&hint.green().to_string());
                } else {
                    out.push_str(hint);
                }
            }
        }

        out
    }
}
