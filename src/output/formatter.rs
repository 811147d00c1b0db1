//! Core formatting traits and the plain text implementation
//!
//! Tables are rendered with fixed ASCII borders so the same output works in
//! terminals, CI logs and redirected files.

use crate::{
    error::{AppError, Result},
    models::TrialResult,
    search::Dimension,
    tuner::{RunPlan, TuningReport},
};
use std::fmt::Write as _;
use std::time::Duration;

/// Rendering of everything the tuner shows to a human
pub trait ReportFormatter {
    /// Format a header section
    fn format_header(&self, title: &str) -> Result<String>;

    /// Describe what a run is about to do
    fn format_plan(&self, plan: &RunPlan) -> Result<String>;

    /// Table with one row per trial
    fn format_trial_table(&self, trials: &[TrialResult]) -> Result<String>;

    /// One-line summary of a finished trial
    fn format_trial(&self, trial: &TrialResult) -> Result<String>;

    /// The winning configuration, or a note that nothing was measured
    fn format_best(&self, best: Option<&TrialResult>) -> Result<String>;

    /// Complete end-of-run report
    fn format_report(&self, report: &TuningReport) -> Result<String>;

    fn format_error(&self, error: &str) -> Result<String>;

    fn format_warning(&self, warning: &str) -> Result<String>;

    fn format_success(&self, message: &str) -> Result<String>;
}

/// Configuration options for formatting
#[derive(Debug, Clone)]
pub struct FormattingOptions {
    /// Enable colored output
    pub enable_color: bool,
    /// Include per-trial detail (attempts, readiness wait, target)
    pub verbose_mode: bool,
    /// Show table borders
    pub table_borders: bool,
    /// Maximum output width
    pub max_width: usize,
}

impl Default for FormattingOptions {
    fn default() -> Self {
        Self {
            enable_color: true,
            verbose_mode: false,
            table_borders: true,
            max_width: 120,
        }
    }
}

/// Table formatting configuration
#[derive(Debug, Clone)]
pub struct TableFormat {
    /// Column definitions
    pub columns: Vec<Column>,
    /// Show borders around table
    pub show_borders: bool,
    /// Show header row
    pub show_header: bool,
    /// Width used for cells beyond the declared columns
    pub min_column_width: usize,
    pub max_column_width: usize,
}

/// Column definition for table formatting
#[derive(Debug, Clone)]
pub struct Column {
    pub header: String,
    pub alignment: Alignment,
    pub min_width: usize,
    pub max_width: usize,
}

impl Column {
    pub fn new<S: Into<String>>(header: S, alignment: Alignment, min_width: usize, max_width: usize) -> Self {
        Self {
            header: header.into(),
            alignment,
            min_width,
            max_width,
        }
    }
}

/// Text alignment options
#[derive(Debug, Clone)]
pub enum Alignment {
    Left,
    Right,
    Center,
}

/// Row data for table formatting
pub type RowData = Vec<String>;

fn fmt_err(what: &str) -> impl Fn(std::fmt::Error) -> AppError + '_ {
    move |e| AppError::io(format!("Failed to format {}: {}", what, e))
}

/// Render a duration as `850ms`, `12.3s` or `4m05s`
pub fn format_duration(duration: Duration) -> String {
    let ms = duration.as_secs_f64() * 1000.0;
    if ms < 1000.0 {
        format!("{:.0}ms", ms)
    } else if ms < 60_000.0 {
        format!("{:.1}s", ms / 1000.0)
    } else {
        let total = duration.as_secs();
        format!("{}m{:02}s", total / 60, total % 60)
    }
}

/// Throughput with two decimals, `0 (no signal)` for the sentinel
pub fn format_tps(trial: &TrialResult) -> String {
    if trial.has_signal() {
        format!("{:.2}", trial.throughput)
    } else {
        "0 (no signal)".to_string()
    }
}

pub(crate) fn describe_dimension(dim: &Dimension) -> String {
    match dim {
        Dimension::Categorical { name, choices } => format!("{} in {{{}}}", name, choices.join(", ")),
        Dimension::IntegerRange { name, low, high } => format!("{} in [{}, {}]", name, low, high),
    }
}

/// Column headers and rows of the trial table
pub(crate) fn trial_rows(trials: &[TrialResult], verbose: bool) -> (Vec<Column>, Vec<RowData>) {
    let mut columns = vec![Column::new("#", Alignment::Right, 2, 4)];
    if let Some(first) = trials.first() {
        for (name, _) in first.candidate.iter() {
            columns.push(Column::new(name, Alignment::Right, 6, 24));
        }
    }
    columns.push(Column::new("TPS", Alignment::Right, 10, 16));
    columns.push(Column::new("Latency", Alignment::Right, 8, 12));
    columns.push(Column::new("Status", Alignment::Left, 8, 16));
    if verbose {
        columns.push(Column::new("Attempts", Alignment::Right, 8, 8));
        columns.push(Column::new("Readiness", Alignment::Left, 9, 24));
        columns.push(Column::new("Target", Alignment::Left, 8, 32));
    }
    columns.push(Column::new("Time", Alignment::Right, 6, 10));

    let rows = trials
        .iter()
        .map(|t| {
            let mut row = vec![t.trial.to_string()];
            row.extend(t.candidate.values().map(|v| v.to_string()));
            row.push(format_tps(t));
            row.push(t.latency_ms.map_or("-".to_string(), |l| format!("{:.2}ms", l)));
            row.push(t.status.as_str().to_string());
            if verbose {
                row.push(t.attempts.to_string());
                row.push(readiness_detail(t));
                row.push(t.target.describe());
            }
            row.push(format_duration(t.elapsed));
            row
        })
        .collect();

    (columns, rows)
}

fn readiness_detail(trial: &TrialResult) -> String {
    use crate::types::ReadinessOutcome;
    match &trial.readiness {
        ReadinessOutcome::Ready { waited, polls } | ReadinessOutcome::TimedOut { waited, polls } => format!(
            "{} {} ({} polls)",
            trial.readiness.label(),
            format_duration(*waited),
            polls
        ),
        ReadinessOutcome::Skipped => trial.readiness.label().to_string(),
    }
}

/// Plain text formatter implementation
pub struct PlainFormatter {
    options: FormattingOptions,
}

impl PlainFormatter {
    pub fn new(options: FormattingOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &FormattingOptions {
        &self.options
    }

    /// Render rows as a table; returns one string per output line
    pub(crate) fn table_lines(&self, columns: Vec<Column>, rows: &[RowData]) -> Vec<String> {
        let format = TableFormat {
            columns,
            show_borders: self.options.table_borders,
            show_header: true,
            min_column_width: 4,
            max_column_width: 40,
        };
        if rows.is_empty() {
            return Vec::new();
        }

        let widths = self.calculate_column_widths(&format, rows);
        let mut lines = Vec::with_capacity(rows.len() + 4);

        if format.show_header && !format.columns.is_empty() {
            if format.show_borders {
                lines.push(self.create_horizontal_border(&widths));
            }
            let headers: Vec<String> = format.columns.iter().map(|c| c.header.clone()).collect();
            lines.push(self.create_row(&headers, &widths, &format));
            if format.show_borders {
                lines.push(self.create_horizontal_border(&widths));
            }
        }

        for row in rows {
            lines.push(self.create_row(row, &widths, &format));
        }

        if format.show_borders {
            lines.push(self.create_horizontal_border(&widths));
        }
        lines
    }

    fn calculate_column_widths(&self, format: &TableFormat, rows: &[RowData]) -> Vec<usize> {
        let num_columns = format
            .columns
            .len()
            .max(rows.iter().map(|r| r.len()).max().unwrap_or(0));

        (0..num_columns)
            .map(|idx| {
                let column = format.columns.get(idx);
                let mut width = column
                    .map(|c| c.min_width.max(c.header.chars().count()))
                    .unwrap_or(format.min_column_width);
                for row in rows {
                    if let Some(cell) = row.get(idx) {
                        width = width.max(cell.chars().count());
                    }
                }
                width.min(column.map_or(format.max_column_width, |c| c.max_width))
            })
            .collect()
    }

    fn create_row(&self, data: &[String], widths: &[usize], format: &TableFormat) -> String {
        let mut row = String::new();
        if format.show_borders {
            row.push('|');
        }

        for (idx, (cell, &width)) in data.iter().zip(widths.iter()).enumerate() {
            let alignment = format.columns.get(idx).map_or(&Alignment::Left, |c| &c.alignment);
            if format.show_borders {
                row.push(' ');
            }
            row.push_str(&self.align_text(cell, width, alignment));
            if format.show_borders {
                row.push_str(" |");
            } else {
                row.push_str("  ");
            }
        }

        row.trim_end().to_string()
    }

    fn create_horizontal_border(&self, widths: &[usize]) -> String {
        let mut border = String::from("+");
        for &width in widths {
            border.push_str(&"-".repeat(width + 2));
            border.push('+');
        }
        border
    }

    fn align_text(&self, text: &str, width: usize, alignment: &Alignment) -> String {
        let len = text.chars().count();
        if len >= width {
            return text.chars().take(width).collect();
        }

        let padding = width - len;
        match alignment {
            Alignment::Left => format!("{}{}", text, " ".repeat(padding)),
            Alignment::Right => format!("{}{}", " ".repeat(padding), text),
            Alignment::Center => {
                let left_pad = padding / 2;
                format!("{}{}{}", " ".repeat(left_pad), text, " ".repeat(padding - left_pad))
            }
        }
    }
}

impl ReportFormatter for PlainFormatter {
    fn format_header(&self, title: &str) -> Result<String> {
        let mut output = String::new();
        let border = "=".repeat(title.chars().count() + 4);
        let err = fmt_err("header");
        writeln!(output, "{}", border).map_err(&err)?;
        writeln!(output, "  {}  ", title).map_err(&err)?;
        write!(output, "{}", border).map_err(&err)?;
        Ok(output)
    }

    fn format_plan(&self, plan: &RunPlan) -> Result<String> {
        let mut output = String::new();
        let err = fmt_err("plan");

        writeln!(output, "Tuning Plan:").map_err(&err)?;
        writeln!(output, "------------").map_err(&err)?;
        writeln!(output, "Target:           {}", plan.target.describe()).map_err(&err)?;
        writeln!(output, "Document:         {}", plan.document_label()).map_err(&err)?;
        if plan.prunes() {
            writeln!(output, "Allow-list:       {}", plan.allow_list.join(", ")).map_err(&err)?;
        }
        writeln!(output, "Search:           {} (seed {})", plan.strategy.as_str(), plan.seed).map_err(&err)?;
        writeln!(output, "Trials:           {}", plan.budget).map_err(&err)?;
        writeln!(
            output,
            "Benchmark:        {} clients x {}, {} attempts, {} between attempts",
            plan.clients,
            format_duration(plan.benchmark_duration),
            plan.retries,
            format_duration(plan.retry_wait)
        )
        .map_err(&err)?;
        writeln!(
            output,
            "Readiness:        poll every {}, give up after {}",
            format_duration(plan.poll_interval),
            format_duration(plan.ready_timeout)
        )
        .map_err(&err)?;
        writeln!(
            output,
            "Worst case:       {} per trial, {} total",
            format_duration(plan.worst_case_trial_time()),
            format_duration(plan.worst_case_run_time())
        )
        .map_err(&err)?;
        writeln!(output, "Parameter space ({} combinations):", plan.space.cardinality()).map_err(&err)?;
        for dim in plan.space.dimensions() {
            writeln!(output, "  - {}", describe_dimension(dim)).map_err(&err)?;
        }

        if let Some(current) = &plan.current_parameters {
            writeln!(output, "Current parameters:").map_err(&err)?;
            if current.is_empty() {
                writeln!(output, "  (empty)").map_err(&err)?;
            }
            for (key, value) in current {
                writeln!(output, "  {}: {}", key, value).map_err(&err)?;
            }
        }

        Ok(output.trim_end().to_string())
    }

    fn format_trial_table(&self, trials: &[TrialResult]) -> Result<String> {
        if trials.is_empty() {
            return Ok("No trials were run.".to_string());
        }
        let (columns, rows) = trial_rows(trials, self.options.verbose_mode);
        Ok(self.table_lines(columns, &rows).join("\n"))
    }

    fn format_trial(&self, trial: &TrialResult) -> Result<String> {
        Ok(format!(
            "Trial {}: {} -> {} tps ({})",
            trial.trial,
            trial.candidate.short(),
            format_tps(trial),
            trial.status.as_str()
        ))
    }

    fn format_best(&self, best: Option<&TrialResult>) -> Result<String> {
        let mut output = String::new();
        let err = fmt_err("best result");

        writeln!(output, "Best Configuration:").map_err(&err)?;
        writeln!(output, "-------------------").map_err(&err)?;
        match best {
            Some(best) if best.has_signal() => {
                for (name, value) in best.candidate.iter() {
                    writeln!(output, "  {}: {}", name, value).map_err(&err)?;
                }
                write!(output, "Throughput:       {:.2} tps (trial {})", best.throughput, best.trial).map_err(&err)?;
            }
            Some(best) => {
                write!(
                    output,
                    "No trial produced a throughput signal; trial {} ({}) is kept as the incumbent",
                    best.trial,
                    best.candidate.short()
                )
                .map_err(&err)?;
            }
            None => write!(output, "No trials were run").map_err(&err)?,
        }
        Ok(output)
    }

    fn format_report(&self, report: &TuningReport) -> Result<String> {
        let mut output = String::new();
        let err = fmt_err("report");

        output.push_str(&self.format_header("PostgreSQL Tuning Results")?);
        output.push_str("\n\n");
        writeln!(output, "Strategy:         {}", report.strategy).map_err(&err)?;
        writeln!(output, "Target:           {}", report.target.describe()).map_err(&err)?;
        writeln!(
            output,
            "Trials:           {}/{} ({} measured, {} without signal)",
            report.trials.len(),
            report.budget,
            report.measured(),
            report.failed()
        )
        .map_err(&err)?;
        writeln!(output, "Duration:         {}", format_duration(report.elapsed)).map_err(&err)?;
        output.push('\n');
        output.push_str(&self.format_trial_table(&report.trials)?);
        output.push_str("\n\n");
        output.push_str(&self.format_best(report.best())?);
        Ok(output)
    }

    fn format_error(&self, error: &str) -> Result<String> {
        Ok(format!("ERROR: {}", error))
    }

    fn format_warning(&self, warning: &str) -> Result<String> {
        Ok(format!("WARNING: {}", warning))
    }

    fn format_success(&self, message: &str) -> Result<String> {
        Ok(format!("SUCCESS: {}", message))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::search::{Candidate, ParameterSpace, ParameterValue};
    use crate::types::{ReadinessOutcome, TargetIdentity, TrialStatus};
    use chrono::Utc;

    pub(crate) fn trial(n: u32, sb: &str, tps: f64) -> TrialResult {
        TrialResult {
            trial: n,
            candidate: Candidate::new(vec![
                ("shared_buffers".to_string(), ParameterValue::Categorical(sb.to_string())),
                ("work_mem".to_string(), ParameterValue::Categorical("8MB".to_string())),
                ("max_connections".to_string(), ParameterValue::Integer(75)),
            ]),
            throughput: tps,
            latency_ms: if tps > 0.0 { Some(8.57) } else { None },
            attempts: if tps > 0.0 { 1 } else { 5 },
            target: TargetIdentity::leader("postgres-2"),
            readiness: ReadinessOutcome::Ready {
                waited: Duration::from_secs(10),
                polls: 3,
            },
            status: if tps > 0.0 { TrialStatus::Measured } else { TrialStatus::NoSignal },
            elapsed: Duration::from_secs(41),
            started_at: Utc::now(),
        }
    }

    fn plain() -> PlainFormatter {
        PlainFormatter::new(FormattingOptions {
            enable_color: false,
            ..FormattingOptions::default()
        })
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(850)), "850ms");
        assert_eq!(format_duration(Duration::from_millis(12_340)), "12.3s");
        assert_eq!(format_duration(Duration::from_secs(245)), "4m05s");
    }

    #[test]
    fn test_trial_table_layout() {
        let table = plain()
            .format_trial_table(&[trial(1, "128MB", 812.4), trial(2, "256MB", 0.0)])
            .unwrap();
        let lines: Vec<&str> = table.lines().collect();

        // border, header, border, 2 rows, border
        assert_eq!(lines.len(), 6);
        assert!(lines[0].starts_with("+---"));
        assert!(lines[1].contains("shared_buffers"));
        assert!(lines[1].contains("TPS"));
        assert!(lines[3].contains("812.40"));
        assert!(lines[4].contains("0 (no signal)"));
        assert!(lines[4].contains("no-signal"));
        let width = lines[0].len();
        assert!(lines.iter().all(|l| l.chars().count() == width));
    }

    #[test]
    fn test_verbose_table_shows_readiness() {
        let formatter = PlainFormatter::new(FormattingOptions {
            enable_color: false,
            verbose_mode: true,
            ..FormattingOptions::default()
        });
        let table = formatter.format_trial_table(&[trial(1, "128MB", 812.4)]).unwrap();
        assert!(table.contains("ready 10.0s (3 polls)"));
        assert!(table.contains("postgres-2 (leader)"));
    }

    #[test]
    fn test_best_section() {
        let best = trial(3, "512MB", 1020.0);
        let text = plain().format_best(Some(&best)).unwrap();
        assert!(text.contains("shared_buffers: 512MB"));
        assert!(text.contains("1020.00 tps (trial 3)"));

        let none = plain().format_best(None).unwrap();
        assert!(none.contains("No trials were run"));

        let dud = plain().format_best(Some(&trial(1, "128MB", 0.0))).unwrap();
        assert!(dud.contains("No trial produced a throughput signal"));
    }

    #[test]
    fn test_plan_lists_space_and_current_values() {
        let config = crate::models::Config::default();
        let plan = RunPlan::new(&config, ParameterSpace::postgres_default(), TargetIdentity::fallback("postgres-master"))
            .with_current_parameters(vec![("shared_buffers".to_string(), "128MB".to_string())]);
        let text = plain().format_plan(&plan).unwrap();

        assert!(text.contains("postgres-master (fallback)"));
        assert!(text.contains("shared_buffers in {128MB, 256MB, 512MB}"));
        assert!(text.contains("max_connections in [50, 100]"));
        assert!(text.contains("Current parameters:\n  shared_buffers: 128MB"));
        assert!(text.contains("Worst case:       5m10s per trial"));
        assert!(text.contains("Allow-list:"));
    }

    #[test]
    fn test_conf_plan_has_no_allow_list() {
        let config = crate::models::Config {
            config_format: crate::models::ConfigFormat::Conf,
            ..crate::models::Config::default()
        };
        let plan = RunPlan::new(&config, ParameterSpace::postgres_default(), TargetIdentity::leader("postgres-2"));
        let text = plain().format_plan(&plan).unwrap();

        assert!(text.contains("Document:         /var/lib/postgresql/data/postgresql.conf inside postgres-2"));
        assert!(!text.contains("Allow-list:"));
    }
}
