//! Structured logging for the tuning loop
//!
//! This module provides:
//! - Leveled, structured log entries with typed fields
//! - Console, JSON and compact renderings
//! - Multiple sinks per logger (terminal and an append-only log file)
//! - Per-component loggers sharing one session id
//! - Trial and error event loggers for the control loop

use crate::error::{AppError, Result};
use crate::models::{Config, TrialResult};
use crate::search::Candidate;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Component logger names
pub mod components {
    pub const RESOLVE: &str = "RESOLVE";
    pub const CONFIG: &str = "CONFIG";
    pub const LIFECYCLE: &str = "LIFECYCLE";
    pub const BENCH: &str = "BENCH";
    pub const TUNER: &str = "TUNER";
    pub const TRIAL: &str = "TRIAL";
    pub const ERROR: &str = "ERR";
}

/// Log level enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LogLevel {
    /// Trace level - most detailed
    Trace = 0,
    /// Debug level - detailed information for debugging
    Debug = 1,
    /// Info level - general application information
    Info = 2,
    /// Warning level - potentially harmful situations
    Warn = 3,
    /// Error level - error events but application can continue
    Error = 4,
    /// Fatal level - severe error events that cause application termination
    Fatal = 5,
}

impl LogLevel {
    /// Get log level name as string
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::Fatal => "FATAL",
        }
    }

    /// Get ANSI color code for console output
    pub fn color_code(&self) -> &'static str {
        match self {
            LogLevel::Trace => "\x1b[37m",    // White
            LogLevel::Debug => "\x1b[36m",    // Cyan
            LogLevel::Info => "\x1b[32m",     // Green
            LogLevel::Warn => "\x1b[33m",     // Yellow
            LogLevel::Error => "\x1b[31m",    // Red
            LogLevel::Fatal => "\x1b[35m",    // Magenta
        }
    }

    /// Reset ANSI color code
    pub fn reset_code() -> &'static str {
        "\x1b[0m"
    }
}

impl std::str::FromStr for LogLevel {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "TRACE" => Ok(LogLevel::Trace),
            "DEBUG" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            "WARN" | "WARNING" => Ok(LogLevel::Warn),
            "ERROR" => Ok(LogLevel::Error),
            "FATAL" => Ok(LogLevel::Fatal),
            _ => Err(AppError::parse(format!("Invalid log level: {}", s))),
        }
    }
}

/// Log entry structure for structured logging
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// Timestamp when log entry was created
    pub timestamp: DateTime<Utc>,
    /// Log level
    pub level: LogLevel,
    /// Log message
    pub message: String,
    /// Logger name/component
    pub logger: String,
    /// Correlation ID for tracking related events
    pub correlation_id: Option<String>,
    /// Additional structured fields, ordered by key
    pub fields: BTreeMap<String, serde_json::Value>,
    /// Thread name if available
    pub thread_id: Option<String>,
    /// File and line information
    pub location: Option<LogLocation>,
}

/// Source code location information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogLocation {
    /// Source file name
    pub file: String,
    /// Line number
    pub line: u32,
    /// Module path
    pub module: Option<String>,
}

/// Log output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable console format
    Console,
    /// JSON format for structured logging
    Json,
    /// Compact single-line format
    Compact,
}

impl LogFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogFormat::Console => "console",
            LogFormat::Json => "json",
            LogFormat::Compact => "compact",
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "console" | "text" => Ok(LogFormat::Console),
            "json" => Ok(LogFormat::Json),
            "compact" => Ok(LogFormat::Compact),
            other => Err(AppError::config(format!(
                "Unknown log format '{}' (expected console, json or compact)",
                other
            ))),
        }
    }
}

/// Destination for rendered log lines
pub trait LogSink: Send + Sync {
    /// Whether ANSI colors may be written to this sink
    fn supports_color(&self) -> bool {
        false
    }

    fn write_line(&self, level: LogLevel, line: &str);
}

/// Terminal sink: warnings and errors to stderr, everything else to stdout
#[derive(Debug, Default)]
pub struct ConsoleSink;

impl LogSink for ConsoleSink {
    fn supports_color(&self) -> bool {
        true
    }

    fn write_line(&self, level: LogLevel, line: &str) {
        if level >= LogLevel::Warn {
            let _ = writeln!(io::stderr(), "{}", line);
        } else {
            let _ = writeln!(io::stdout(), "{}", line);
        }
    }
}

/// Append-only log file
#[derive(Debug)]
pub struct FileSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl FileSink {
    /// Open `path` for appending, creating it and its parent directory if needed
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| AppError::io(format!("Cannot create log directory {}: {}", parent.display(), e)))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| AppError::io(format!("Cannot open log file {}: {}", path.display(), e)))?;
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LogSink for FileSink {
    fn write_line(&self, _level: LogLevel, line: &str) {
        if let Ok(mut file) = self.file.lock() {
            let _ = writeln!(file, "{}", line);
        }
    }
}

/// In-memory sink, mostly for inspecting log output in tests
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<(LogLevel, String)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .map(|l| l.iter().map(|(_, s)| s.clone()).collect())
            .unwrap_or_default()
    }

    /// Lines written at `level`
    pub fn lines_at(&self, level: LogLevel) -> Vec<String> {
        self.lines
            .lock()
            .map(|l| l.iter().filter(|(lv, _)| *lv == level).map(|(_, s)| s.clone()).collect())
            .unwrap_or_default()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines().iter().any(|l| l.contains(needle))
    }
}

impl LogSink for MemorySink {
    fn write_line(&self, level: LogLevel, line: &str) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push((level, line.to_string()));
        }
    }
}

/// Shared logging context for correlation and session tracking
#[derive(Debug, Default)]
struct LogContext {
    /// Correlation ID for the whole run
    session_id: Option<String>,
    /// Current operation correlation ID
    current_correlation_id: Option<String>,
}

/// Logger implementation with multiple output formats
#[derive(Clone)]
pub struct Logger {
    /// Minimum log level to output
    min_level: LogLevel,
    /// Whether to use colored output where the sink allows it
    use_color: bool,
    /// Whether to include location information
    include_location: bool,
    /// Output format
    format: LogFormat,
    /// Logger name
    name: String,
    /// Shared context storage
    context: Arc<RwLock<LogContext>>,
    sinks: Vec<Arc<dyn LogSink>>,
}

impl std::fmt::Debug for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Logger")
            .field("name", &self.name)
            .field("min_level", &self.min_level)
            .field("format", &self.format)
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

impl Logger {
    /// Create a console logger
    pub fn new(name: String) -> Self {
        Self {
            min_level: LogLevel::Info,
            use_color: true,
            include_location: false,
            format: LogFormat::Console,
            name,
            context: Arc::new(RwLock::new(LogContext::default())),
            sinks: vec![Arc::new(ConsoleSink)],
        }
    }

    /// Create a console logger with level and color taken from the configuration
    pub fn with_config(name: String, config: &Config) -> Self {
        Self::with_sinks(name, config, vec![Arc::new(ConsoleSink)])
    }

    /// Create a logger writing to the given sinks
    pub fn with_sinks(name: String, config: &Config, sinks: Vec<Arc<dyn LogSink>>) -> Self {
        let min_level = if config.debug || config.verbose {
            LogLevel::Debug
        } else {
            LogLevel::Info
        };

        Self {
            min_level,
            use_color: config.enable_color,
            include_location: config.debug,
            format: config.log_format,
            name,
            context: Arc::new(RwLock::new(LogContext::default())),
            sinks,
        }
    }

    /// Logger that discards everything
    pub fn silent(name: &str) -> Self {
        Self {
            min_level: LogLevel::Fatal,
            sinks: Vec::new(),
            ..Self::new(name.to_string())
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Set session correlation ID
    pub async fn set_session_id(&self, session_id: String) {
        let mut context = self.context.write().await;
        context.session_id = Some(session_id);
    }

    /// Start a correlated operation
    pub async fn start_operation(&self, operation_name: &str) -> String {
        let correlation_id = Uuid::new_v4().to_string();
        {
            let mut context = self.context.write().await;
            context.current_correlation_id = Some(correlation_id.clone());
        }

        self.debug(&format!("Started operation: {}", operation_name))
            .correlation_id(&correlation_id)
            .field("operation", operation_name)
            .log()
            .await;

        correlation_id
    }

    /// End a correlated operation
    pub async fn end_operation(&self, correlation_id: &str, operation_name: &str, success: bool) {
        self.debug(&format!("Completed operation: {} (success: {})", operation_name, success))
            .correlation_id(correlation_id)
            .field("operation", operation_name)
            .field("success", success)
            .log()
            .await;

        let mut context = self.context.write().await;
        if context.current_correlation_id.as_deref() == Some(correlation_id) {
            context.current_correlation_id = None;
        }
    }

    /// Create a log entry builder
    pub fn log(&self, level: LogLevel, message: &str) -> LogEntryBuilder<'_> {
        LogEntryBuilder::new(self, level, message.to_string())
    }

    /// Convenience methods for different log levels
    pub fn trace(&self, message: &str) -> LogEntryBuilder<'_> {
        self.log(LogLevel::Trace, message)
    }

    pub fn debug(&self, message: &str) -> LogEntryBuilder<'_> {
        self.log(LogLevel::Debug, message)
    }

    pub fn info(&self, message: &str) -> LogEntryBuilder<'_> {
        self.log(LogLevel::Info, message)
    }

    pub fn warn(&self, message: &str) -> LogEntryBuilder<'_> {
        self.log(LogLevel::Warn, message)
    }

    pub fn error(&self, message: &str) -> LogEntryBuilder<'_> {
        self.log(LogLevel::Error, message)
    }

    pub fn fatal(&self, message: &str) -> LogEntryBuilder<'_> {
        self.log(LogLevel::Fatal, message)
    }

    /// Check if a log level would be output
    pub fn would_log(&self, level: LogLevel) -> bool {
        level >= self.min_level && !self.sinks.is_empty()
    }

    /// Write log entry to every sink
    async fn write_entry(&self, mut entry: LogEntry) {
        if !self.would_log(entry.level) {
            return;
        }

        let context = self.context.read().await;
        if entry.correlation_id.is_none() {
            entry.correlation_id = context.current_correlation_id.clone();
        }
        if self.format == LogFormat::Json {
            if let Some(session_id) = &context.session_id {
                entry
                    .fields
                    .insert("session_id".to_string(), serde_json::Value::String(session_id.clone()));
            }
        }
        drop(context);

        let plain = self.render(&entry, false);
        let colored = if self.use_color && self.format == LogFormat::Console {
            Some(self.render(&entry, true))
        } else {
            None
        };

        for sink in &self.sinks {
            let line = match &colored {
                Some(colored) if sink.supports_color() => colored,
                _ => &plain,
            };
            sink.write_line(entry.level, line);
        }
    }

    fn render(&self, entry: &LogEntry, color: bool) -> String {
        match self.format {
            LogFormat::Console => self.format_console(entry, color),
            LogFormat::Json => self.format_json(entry),
            LogFormat::Compact => self.format_compact(entry),
        }
    }

    /// Format log entry for console output
    fn format_console(&self, entry: &LogEntry, color: bool) -> String {
        let timestamp = entry.timestamp.format("%Y-%m-%d %H:%M:%S%.3f");
        let level_str = entry.level.as_str();

        let formatted_level = if color {
            format!("{}{:>5}{}", entry.level.color_code(), level_str, LogLevel::reset_code())
        } else {
            format!("{:>5}", level_str)
        };

        let mut output = format!("{} {} [{}] {}", timestamp, formatted_level, entry.logger, entry.message);

        if let Some(correlation_id) = &entry.correlation_id {
            let short: String = correlation_id.chars().take(8).collect();
            output.push_str(&format!(" [{}]", short));
        }

        if !entry.fields.is_empty() {
            let fields_str: Vec<String> = entry.fields.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
            output.push_str(&format!(" {{{}}}", fields_str.join(", ")));
        }

        if self.include_location {
            if let Some(location) = &entry.location {
                output.push_str(&format!(" @ {}:{}", location.file, location.line));
            }
        }

        output
    }

    /// Format log entry as JSON
    fn format_json(&self, entry: &LogEntry) -> String {
        match serde_json::to_string(entry) {
            Ok(json) => json,
            Err(_) => format!(
                "{{\"error\": \"Failed to serialize log entry\", \"message\": {:?}}}",
                entry.message
            ),
        }
    }

    /// Format log entry in compact format
    fn format_compact(&self, entry: &LogEntry) -> String {
        let timestamp = entry.timestamp.format("%H:%M:%S");
        format!(
            "{} {} {}: {}",
            timestamp,
            entry.level.as_str().chars().next().unwrap_or('?'),
            entry.logger,
            entry.message
        )
    }
}

/// Builder pattern for creating log entries
pub struct LogEntryBuilder<'a> {
    logger: &'a Logger,
    entry: LogEntry,
}

impl<'a> LogEntryBuilder<'a> {
    fn new(logger: &'a Logger, level: LogLevel, message: String) -> Self {
        Self {
            logger,
            entry: LogEntry {
                timestamp: Utc::now(),
                level,
                message,
                logger: logger.name.clone(),
                correlation_id: None,
                fields: BTreeMap::new(),
                thread_id: std::thread::current().name().map(String::from),
                location: None,
            },
        }
    }

    /// Add a correlation ID
    pub fn correlation_id(mut self, id: &str) -> Self {
        self.entry.correlation_id = Some(id.to_string());
        self
    }

    /// Add a structured field
    pub fn field<T: Serialize>(mut self, key: &str, value: T) -> Self {
        if let Ok(json_value) = serde_json::to_value(value) {
            self.entry.fields.insert(key.to_string(), json_value);
        }
        self
    }

    /// Add location information
    pub fn location(mut self, file: &str, line: u32, module: Option<&str>) -> Self {
        self.entry.location = Some(LogLocation {
            file: file.to_string(),
            line,
            module: module.map(String::from),
        });
        self
    }

    /// Add one field per candidate parameter
    pub fn candidate(mut self, candidate: &Candidate) -> Self {
        for (name, value) in candidate.iter() {
            self = self.field(name, value.to_string());
        }
        self
    }

    /// Add error information
    pub fn error_info(self, error: &AppError) -> Self {
        self.field("error_category", error.category())
            .field("error_run_fatal", error.is_run_fatal())
            .field("error_exit_code", error.exit_code())
    }

    /// Finalize and write the log entry
    pub async fn log(self) {
        self.logger.write_entry(self.entry).await;
    }
}

/// Trial lifecycle logger
pub struct TrialLogger {
    logger: Logger,
}

impl TrialLogger {
    pub fn new(logger: Logger) -> Self {
        Self { logger }
    }

    /// Announce a trial and the candidate it evaluates
    pub async fn trial_started(&self, trial: u32, budget: u32, candidate: &Candidate) {
        self.logger
            .info(&format!("Trial {}/{}: testing {}", trial, budget, candidate))
            .field("trial", trial)
            .field("budget", budget)
            .log()
            .await;
    }

    /// Log the completed trial with timing and outcome
    pub async fn trial_completed(&self, result: &TrialResult) {
        let level = if result.has_signal() { LogLevel::Info } else { LogLevel::Warn };
        let message = format!(
            "Trial {} finished: {:.2} tps ({}, {}) in {:.1}s",
            result.trial,
            result.throughput,
            result.status.as_str(),
            result.readiness.label(),
            result.elapsed.as_secs_f64()
        );

        let mut builder = self
            .logger
            .log(level, &message)
            .field("trial", result.trial)
            .field("throughput", result.throughput)
            .field("attempts", result.attempts)
            .field("target", &result.target.name)
            .field("elapsed_ms", result.elapsed.as_millis() as u64);
        if let Some(latency) = result.latency_ms {
            builder = builder.field("latency_ms", latency);
        }
        builder.log().await;
    }

    /// Log that a trial became the best so far
    pub async fn new_best(&self, result: &TrialResult) {
        self.logger
            .info(&format!(
                "New best: {} -> {:.2} tps (trial {})",
                result.candidate.short(),
                result.throughput,
                result.trial
            ))
            .field("trial", result.trial)
            .field("throughput", result.throughput)
            .candidate(&result.candidate)
            .log()
            .await;
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }
}

/// Error event logger with enhanced context
pub struct ErrorEventLogger {
    logger: Logger,
}

impl ErrorEventLogger {
    pub fn new(logger: Logger) -> Self {
        Self { logger }
    }

    /// Log an application error with full context
    pub async fn log_error(&self, error: &AppError, context: Option<&str>, correlation_id: Option<&str>) {
        let message = match context {
            Some(ctx) => format!("{}: {}", ctx, error),
            None => error.to_string(),
        };

        let mut builder = self.logger.error(&message).error_info(error);
        if let Some(id) = correlation_id {
            builder = builder.correlation_id(id);
        }
        if let Some(ctx) = context {
            builder = builder.field("context", ctx);
        }
        builder.log().await;
    }

    /// Log how a failure is being absorbed
    pub async fn log_recovery_attempt(&self, error: &AppError, recovery_action: &str, correlation_id: Option<&str>) {
        let message = format!("Recovering from {}: {}", error.category(), recovery_action);
        let mut builder = self
            .logger
            .warn(&message)
            .field("error_category", error.category())
            .field("recovery_action", recovery_action);
        if let Some(id) = correlation_id {
            builder = builder.correlation_id(id);
        }
        builder.log().await;
    }
}

/// Creates loggers that share sinks and a session id
pub struct LoggerFactory {
    config: Config,
    session_id: String,
    sinks: Vec<Arc<dyn LogSink>>,
}

impl LoggerFactory {
    /// Console logging plus the configured log file, if any
    pub fn new(config: Config) -> Result<Self> {
        let mut sinks: Vec<Arc<dyn LogSink>> = vec![Arc::new(ConsoleSink)];
        if let Some(path) = &config.log_file {
            sinks.push(Arc::new(FileSink::open(path)?));
        }
        Ok(Self::with_sinks(config, sinks))
    }

    pub fn with_sinks(config: Config, sinks: Vec<Arc<dyn LogSink>>) -> Self {
        Self {
            config,
            session_id: Uuid::new_v4().to_string(),
            sinks,
        }
    }

    /// Create a logger with a specific name
    pub async fn create_logger(&self, name: &str) -> Logger {
        let logger = Logger::with_sinks(name.to_string(), &self.config, self.sinks.clone());
        logger.set_session_id(self.session_id.clone()).await;
        logger
    }

    pub async fn create_trial_logger(&self) -> TrialLogger {
        TrialLogger::new(self.create_logger(components::TRIAL).await)
    }

    pub async fn create_error_logger(&self) -> ErrorEventLogger {
        ErrorEventLogger::new(self.create_logger(components::ERROR).await)
    }

    /// Get session ID
    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

/// Debug entry carrying the caller's location
#[macro_export]
macro_rules! log_debug {
    ($logger:expr, $($arg:tt)*) => {
        $logger.debug(&format!($($arg)*))
            .location(file!(), line!(), Some(module_path!()))
            .log()
            .await
    };
}

/// Logger writing into a fresh memory sink, for tests
#[cfg(test)]
pub(crate) fn memory_logger(name: &str) -> (Logger, Arc<MemorySink>) {
    let sink = Arc::new(MemorySink::new());
    let config = Config {
        verbose: true,
        enable_color: false,
        ..Config::default()
    };
    let logger = Logger::with_sinks(name.to_string(), &config, vec![sink.clone()]);
    (logger, sink)
}
