//! Output formatting and display system
//!
//! Human-facing rendering of run plans, trial tables and final reports, in a
//! plain and a colored flavour, plus the machine-readable results file.

mod colored;
mod formatter;
mod results;

pub use colored::{ColorScheme, ColoredFormatter, ThroughputLevel};
pub use formatter::{
    format_duration, format_tps, Alignment, Column, FormattingOptions, PlainFormatter, ReportFormatter, RowData,
    TableFormat,
};
pub use results::{record, ResultsWriter};

use crate::{
    error::Result,
    models::{Config, TrialResult},
    tuner::{RunPlan, TuningReport},
};

/// Picks the formatter for the current terminal and settings
pub struct ReportFormatterFactory;

impl ReportFormatterFactory {
    pub fn create_formatter(enable_color: bool, verbose: bool) -> Box<dyn ReportFormatter> {
        let options = FormattingOptions {
            enable_color,
            verbose_mode: verbose,
            ..FormattingOptions::default()
        };

        if enable_color {
            Box::new(ColoredFormatter::new(options))
        } else {
            Box::new(PlainFormatter::new(options))
        }
    }

    pub fn from_config(config: &Config) -> Box<dyn ReportFormatter> {
        Self::create_formatter(config.enable_color, config.verbose)
    }

    /// Plain text formatter for scripts/logs
    pub fn create_plain_formatter() -> Box<dyn ReportFormatter> {
        Self::create_formatter(false, true)
    }
}

/// Main output coordinator that handles all result display
pub struct OutputCoordinator {
    formatter: Box<dyn ReportFormatter>,
}

impl OutputCoordinator {
    pub fn new(formatter: Box<dyn ReportFormatter>) -> Self {
        Self { formatter }
    }

    pub fn display_plan(&self, plan: &RunPlan) -> Result<String> {
        let mut output = self.formatter.format_header("PostgreSQL Auto-Tuner")?;
        output.push_str("\n\n");
        output.push_str(&self.formatter.format_plan(plan)?);
        Ok(output)
    }

    pub fn display_report(&self, report: &TuningReport) -> Result<String> {
        self.formatter.format_report(report)
    }

    pub fn display_trial(&self, trial: &TrialResult) -> Result<String> {
        self.formatter.format_trial(trial)
    }

    pub fn display_warning(&self, warning: &str) -> Result<String> {
        self.formatter.format_warning(warning)
    }

    pub fn display_success(&self, message: &str) -> Result<String> {
        self.formatter.format_success(message)
    }

    pub fn display_error(&self, error: &str) -> Result<String> {
        self.formatter.format_error(error)
    }
}
