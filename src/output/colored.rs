//! Colored formatter implementation with terminal color support
//!
//! Layout comes from [`PlainFormatter`]; this formatter only adds ANSI styling,
//! so colored and plain output line up column for column.

use super::formatter::{
    describe_dimension, format_duration, format_tps, trial_rows, FormattingOptions, PlainFormatter, ReportFormatter,
};
use crate::{
    error::Result,
    models::TrialResult,
    tuner::{RunPlan, TuningReport},
};
use colored::*;

/// Throughput of a trial relative to the best trial of the run
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ThroughputLevel {
    /// Within 5% of the best
    Top,
    /// Within 20% of the best
    Good,
    /// Measured but well behind
    Weak,
    /// Sentinel zero
    NoSignal,
}

impl ThroughputLevel {
    pub fn classify(throughput: f64, best: f64) -> Self {
        if throughput <= 0.0 {
            Self::NoSignal
        } else if best <= 0.0 || throughput >= best * 0.95 {
            Self::Top
        } else if throughput >= best * 0.8 {
            Self::Good
        } else {
            Self::Weak
        }
    }

    pub fn color(&self) -> Color {
        match self {
            Self::Top => Color::Green,
            Self::Good => Color::Cyan,
            Self::Weak => Color::Yellow,
            Self::NoSignal => Color::Red,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Top => "★",
            Self::Good => "●",
            Self::Weak => "○",
            Self::NoSignal => "✗",
        }
    }
}

/// Color scheme configuration
#[derive(Debug, Clone)]
pub struct ColorScheme {
    pub header: Color,
    pub success: Color,
    pub warning: Color,
    pub error: Color,
    pub info: Color,
    pub highlight: Color,
    pub muted: Color,
    pub border: Color,
}

impl Default for ColorScheme {
    fn default() -> Self {
        Self {
            header: Color::Blue,
            success: Color::Green,
            warning: Color::Yellow,
            error: Color::Red,
            info: Color::Cyan,
            highlight: Color::Magenta,
            muted: Color::BrightBlack,
            border: Color::BrightBlack,
        }
    }
}

/// Colored formatter implementation
pub struct ColoredFormatter {
    plain: PlainFormatter,
    options: FormattingOptions,
    color_scheme: ColorScheme,
}

impl ColoredFormatter {
    pub fn new(options: FormattingOptions) -> Self {
        Self::with_color_scheme(options, ColorScheme::default())
    }

    pub fn with_color_scheme(options: FormattingOptions, color_scheme: ColorScheme) -> Self {
        Self {
            plain: PlainFormatter::new(options.clone()),
            options,
            color_scheme,
        }
    }

    pub fn set_colors_enabled(&mut self, enabled: bool) {
        self.options.enable_color = enabled;
        self.plain = PlainFormatter::new(self.options.clone());
    }

    fn colorize(&self, text: &str, color: Color) -> ColoredString {
        if self.options.enable_color {
            text.color(color)
        } else {
            text.normal()
        }
    }

    fn bold(&self, text: &str) -> ColoredString {
        if self.options.enable_color {
            text.bold()
        } else {
            text.normal()
        }
    }

    fn section_header(&self, title: &str, icon: &str) -> String {
        let underline = "─".repeat(title.chars().count() + 3);
        format!(
            "{} {}\n{}",
            icon,
            self.bold(&self.colorize(title, self.color_scheme.header).to_string()),
            self.colorize(&underline, self.color_scheme.border)
        )
    }

    fn label(&self, name: &str) -> ColoredString {
        self.colorize(&format!("{:<18}", name), self.color_scheme.muted)
    }
}

impl ReportFormatter for ColoredFormatter {
    fn format_header(&self, title: &str) -> Result<String> {
        let border = "═".repeat(title.chars().count() + 4);
        Ok(format!(
            "{}\n  {}  \n{}",
            self.colorize(&border, self.color_scheme.header),
            self.bold(&self.colorize(title, self.color_scheme.header).to_string()),
            self.colorize(&border, self.color_scheme.header)
        ))
    }

    fn format_plan(&self, plan: &RunPlan) -> Result<String> {
        let mut lines = vec![self.section_header("Tuning Plan", "⚙")];
        let target_color = if plan.target.is_fallback() {
            self.color_scheme.warning
        } else {
            self.color_scheme.success
        };
        lines.push(format!(
            "{}{}",
            self.label("Target:"),
            self.colorize(&plan.target.describe(), target_color)
        ));
        lines.push(format!("{}{}", self.label("Document:"), plan.document_label()));
        if plan.prunes() {
            lines.push(format!("{}{}", self.label("Allow-list:"), plan.allow_list.join(", ")));
        }
        lines.push(format!(
            "{}{} (seed {})",
            self.label("Search:"),
            self.colorize(plan.strategy.as_str(), self.color_scheme.highlight),
            plan.seed
        ));
        lines.push(format!("{}{}", self.label("Trials:"), plan.budget));
        lines.push(format!(
            "{}{} clients x {}, {} attempts, {} between attempts",
            self.label("Benchmark:"),
            plan.clients,
            format_duration(plan.benchmark_duration),
            plan.retries,
            format_duration(plan.retry_wait)
        ));
        lines.push(format!(
            "{}poll every {}, give up after {}",
            self.label("Readiness:"),
            format_duration(plan.poll_interval),
            format_duration(plan.ready_timeout)
        ));
        lines.push(format!(
            "{}{}",
            self.label("Worst case:"),
            self.colorize(
                &format!(
                    "{} per trial, {} total",
                    format_duration(plan.worst_case_trial_time()),
                    format_duration(plan.worst_case_run_time())
                ),
                self.color_scheme.warning
            )
        ));
        lines.push(format!("Parameter space ({} combinations):", plan.space.cardinality()));
        for dim in plan.space.dimensions() {
            lines.push(format!("  • {}", describe_dimension(dim)));
        }
        if let Some(current) = &plan.current_parameters {
            lines.push("Current parameters:".to_string());
            for (key, value) in current {
                lines.push(format!("  {}: {}", self.colorize(key, self.color_scheme.info), value));
            }
        }
        Ok(lines.join("\n"))
    }

    fn format_trial_table(&self, trials: &[TrialResult]) -> Result<String> {
        if trials.is_empty() {
            return Ok(self.colorize("No trials were run.", self.color_scheme.muted).to_string());
        }

        let best = trials.iter().map(|t| t.throughput).fold(0.0, f64::max);
        let (columns, rows) = trial_rows(trials, self.options.verbose_mode);
        let lines = self.plain.table_lines(columns, &rows);

        // header block is border/header/border when borders are on
        let header_lines = if self.options.table_borders { 3 } else { 1 };
        let mut output = Vec::with_capacity(lines.len());
        for (idx, line) in lines.iter().enumerate() {
            let styled = if idx < header_lines {
                self.bold(line).to_string()
            } else if let Some(trial) = trials.get(idx - header_lines) {
                let level = ThroughputLevel::classify(trial.throughput, best);
                let text = self.colorize(line, level.color());
                if level == ThroughputLevel::Top {
                    self.bold(&text.to_string()).to_string()
                } else {
                    text.to_string()
                }
            } else {
                self.colorize(line, self.color_scheme.border).to_string()
            };
            output.push(styled);
        }
        Ok(output.join("\n"))
    }

    fn format_trial(&self, trial: &TrialResult) -> Result<String> {
        let level = if trial.has_signal() {
            ThroughputLevel::Top
        } else {
            ThroughputLevel::NoSignal
        };
        Ok(format!(
            "{} Trial {}: {} -> {} tps ({})",
            self.colorize(level.symbol(), level.color()),
            trial.trial,
            trial.candidate.short(),
            self.colorize(&format_tps(trial), level.color()),
            trial.status.as_str()
        ))
    }

    fn format_best(&self, best: Option<&TrialResult>) -> Result<String> {
        let mut lines = vec![self.section_header("Best Configuration", "★")];
        match best {
            Some(best) if best.has_signal() => {
                for (name, value) in best.candidate.iter() {
                    lines.push(format!(
                        "  {}: {}",
                        name,
                        self.bold(&self.colorize(&value.to_string(), self.color_scheme.success).to_string())
                    ));
                }
                lines.push(format!(
                    "{}{} (trial {})",
                    self.label("Throughput:"),
                    self.colorize(&format!("{:.2} tps", best.throughput), self.color_scheme.success),
                    best.trial
                ));
            }
            Some(best) => lines.push(
                self.colorize(
                    &format!(
                        "No trial produced a throughput signal; trial {} ({}) is kept as the incumbent",
                        best.trial,
                        best.candidate.short()
                    ),
                    self.color_scheme.error,
                )
                .to_string(),
            ),
            None => lines.push(self.colorize("No trials were run", self.color_scheme.muted).to_string()),
        }
        Ok(lines.join("\n"))
    }

    fn format_report(&self, report: &TuningReport) -> Result<String> {
        let mut sections = vec![self.format_header("PostgreSQL Tuning Results")?];

        let failed = report.failed();
        let failed_text = format!("{} without signal", failed);
        let summary = [
            format!("{}{}", self.label("Strategy:"), report.strategy),
            format!("{}{}", self.label("Target:"), report.target.describe()),
            format!(
                "{}{}/{} ({} measured, {})",
                self.label("Trials:"),
                report.trials.len(),
                report.budget,
                report.measured(),
                if failed > 0 {
                    self.colorize(&failed_text, self.color_scheme.warning)
                } else {
                    self.colorize(&failed_text, self.color_scheme.muted)
                }
            ),
            format!("{}{}", self.label("Duration:"), format_duration(report.elapsed)),
        ];
        sections.push(summary.join("\n"));
        sections.push(self.format_trial_table(&report.trials)?);
        sections.push(self.format_best(report.best())?);
        Ok(sections.join("\n\n"))
    }

    fn format_error(&self, error: &str) -> Result<String> {
        Ok(format!(
            "{} {}",
            self.colorize("✗", self.color_scheme.error),
            self.colorize(error, self.color_scheme.error)
        ))
    }

    fn format_warning(&self, warning: &str) -> Result<String> {
        Ok(format!(
            "{} {}",
            self.colorize("⚠", self.color_scheme.warning),
            self.colorize(warning, self.color_scheme.warning)
        ))
    }

    fn format_success(&self, message: &str) -> Result<String> {
        Ok(format!(
            "{} {}",
            self.colorize("✓", self.color_scheme.success),
            self.colorize(message, self.color_scheme.success)
        ))
    }
}
