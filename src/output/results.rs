//! Line-oriented results file
//!
//! One `key=value` record per trial, flushed as soon as the trial is scored so
//! an interrupted run keeps everything measured so far. The file is truncated
//! when a run starts; a final `best ...` record closes a completed run.

use crate::error::{AppError, Result};
use crate::models::TrialResult;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

pub struct ResultsWriter {
    path: PathBuf,
    file: File,
}

impl ResultsWriter {
    /// Create or truncate the file at `path`
    pub fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| AppError::io(format!("Cannot create {}: {}", parent.display(), e)))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)
            .map_err(|e| AppError::io(format!("Cannot open results file {}: {}", path.display(), e)))?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&mut self, trial: &TrialResult) -> Result<()> {
        self.write_line(&record(trial))
    }

    pub fn write_best(&mut self, best: &TrialResult) -> Result<()> {
        self.write_line(&format!("best {}", record(best)))
    }

    fn write_line(&mut self, line: &str) -> Result<()> {
        writeln!(self.file, "{}", line)
            .and_then(|_| self.file.flush())
            .map_err(|e| AppError::io(format!("Cannot write {}: {}", self.path.display(), e)))
    }
}

/// Render a trial as space-separated `key=value` pairs
pub fn record(trial: &TrialResult) -> String {
    let mut fields = vec![format!("trial={}", trial.trial)];
    fields.extend(trial.candidate.iter().map(|(name, value)| format!("{}={}", name, value)));
    fields.push(format!("tps={:.2}", trial.throughput));
    if let Some(latency) = trial.latency_ms {
        fields.push(format!("latency_ms={:.3}", latency));
    }
    fields.push(format!("attempts={}", trial.attempts));
    fields.push(format!("readiness={}", trial.readiness.label()));
    fields.push(format!("status={}", trial.status.as_str()));
    fields.push(format!("target={}", trial.target.name));
    fields.push(format!("elapsed_s={:.1}", trial.elapsed.as_secs_f64()));
    fields.push(format!("started_at={}", trial.started_at.to_rfc3339()));
    fields.join(" ")
}
