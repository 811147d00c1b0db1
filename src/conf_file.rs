//! Flat `postgresql.conf` editing inside the target container
//!
//! For every tuned key the active `key = ...` lines are dropped and a fresh
//! `key = 'value'` line is appended at the end. Comments and unrelated
//! settings stay where they are. The file is read with `cat` and written back
//! with `sh`, both through `exec` on the resolved target.

use crate::error::{AppError, Result};
use crate::logging::Logger;
use crate::models::Config;
use crate::mutator::{ConfigApplier, MutationReport};
use crate::runtime::{CommandOutput, ContainerRuntime};
use crate::search::{Candidate, ParameterValue};
use crate::types::TargetIdentity;
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;

/// Limit for each `cat`/`sh` call inside the container
const EXEC_TIMEOUT: Duration = Duration::from_secs(30);

/// The original is only truncated once the staged copy is complete
const WRITE_SCRIPT: &str =
    "printf '%s' \"$1\" > \"$2.autotune\" && cat \"$2.autotune\" > \"$2\" && rm -f \"$2.autotune\"";

/// Edits a flat configuration file inside the target container
pub struct ConfFileApplier {
    runtime: ContainerRuntime,
    path: String,
    logger: Logger,
}

impl ConfFileApplier {
    pub fn new(runtime: ContainerRuntime, path: String, logger: Logger) -> Self {
        Self { runtime, path, logger }
    }

    pub fn from_config(runtime: ContainerRuntime, config: &Config, logger: Logger) -> Self {
        Self::new(runtime, config.conf_path.trim().to_string(), logger)
    }

    async fn read(&self, target: &TargetIdentity) -> Result<String> {
        let args = vec!["cat".to_string(), self.path.clone()];
        let output = self
            .runtime
            .exec_within(&target.name, &args, EXEC_TIMEOUT)
            .await
            .map_err(|e| self.failure("read", target, &e.to_string()))?;
        if !output.success() {
            return Err(self.failure("read", target, &status_text(&output)));
        }
        Ok(output.stdout)
    }

    async fn write(&self, target: &TargetIdentity, contents: String) -> Result<()> {
        let args = vec![
            "sh".to_string(),
            "-c".to_string(),
            WRITE_SCRIPT.to_string(),
            "autotune".to_string(),
            contents,
            self.path.clone(),
        ];
        let output = self
            .runtime
            .exec_within(&target.name, &args, EXEC_TIMEOUT)
            .await
            .map_err(|e| self.failure("write", target, &e.to_string()))?;
        if !output.success() {
            return Err(self.failure("write", target, &status_text(&output)));
        }
        Ok(())
    }

    fn failure(&self, action: &str, target: &TargetIdentity, detail: &str) -> AppError {
        AppError::document(format!(
            "Cannot {} {} in {}: {}",
            action, self.path, target.name, detail
        ))
    }
}

#[async_trait]
impl ConfigApplier for ConfFileApplier {
    async fn apply(&self, target: &TargetIdentity, candidate: &Candidate) -> Result<MutationReport> {
        let current = self.read(target).await?;
        let rewritten = rewrite_conf(&current, candidate);
        let written: Vec<String> = candidate.iter().map(|(name, _)| name.to_string()).collect();

        if rewritten == current {
            self.logger
                .debug(&format!("{} in {} already holds the candidate", self.path, target.name))
                .log()
                .await;
        } else {
            self.write(target, rewritten).await?;
        }

        self.logger
            .info(&format!("Updated {} in {}", self.path, target.name))
            .candidate(candidate)
            .log()
            .await;

        Ok(MutationReport {
            path: PathBuf::from(&self.path),
            written,
            pruned: Vec::new(),
        })
    }

    async fn current_parameters(&self, target: &TargetIdentity) -> Result<Vec<(String, String)>> {
        Ok(active_settings(&self.read(target).await?))
    }
}

fn status_text(output: &CommandOutput) -> String {
    format!("exit status {}: {}", output.status_label(), output.stderr.trim())
}

/// Replace the tuned keys of a flat configuration file
pub fn rewrite_conf(text: &str, candidate: &Candidate) -> String {
    let mut rewritten = String::with_capacity(text.len() + 64);
    for line in text.lines() {
        let tuned = setting_name(line)
            .map(|name| candidate.iter().any(|(key, _)| key.eq_ignore_ascii_case(name)))
            .unwrap_or(false);
        if !tuned {
            rewritten.push_str(line);
            rewritten.push('\n');
        }
    }
    for (key, value) in candidate.iter() {
        rewritten.push_str(&format!("{} = {}\n", key, conf_value(value)));
    }
    rewritten
}

/// Settings in effect, later lines overriding earlier ones
pub fn active_settings(text: &str) -> Vec<(String, String)> {
    let mut settings: Vec<(String, String)> = Vec::new();
    for line in text.lines() {
        let Some(name) = setting_name(line) else {
            continue;
        };
        let value = setting_value(line, name);
        match settings.iter_mut().find(|(key, _)| key.eq_ignore_ascii_case(name)) {
            Some(entry) => entry.1 = value,
            None => settings.push((name.to_string(), value)),
        }
    }
    settings
}

/// Name of the parameter an active line sets
fn setting_name(line: &str) -> Option<&str> {
    let trimmed = line.trim_start();
    let end = trimmed
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '.'))
        .unwrap_or(trimmed.len());
    let (name, rest) = trimmed.split_at(end);
    let separated = rest.starts_with('=') || rest.starts_with(char::is_whitespace);
    if name.is_empty() || !separated || rest.trim().is_empty() {
        return None;
    }
    Some(name)
}

fn setting_value(line: &str, name: &str) -> String {
    let trimmed = line.trim_start();
    let rest = trimmed[name.len()..].trim_start();
    let rest = rest.strip_prefix('=').unwrap_or(rest).trim_start();

    if let Some(quoted) = rest.strip_prefix('\'') {
        let mut value = String::new();
        let mut chars = quoted.chars().peekable();
        while let Some(c) = chars.next() {
            if c == '\'' {
                if chars.peek() == Some(&'\'') {
                    chars.next();
                    value.push('\'');
                } else {
                    break;
                }
            } else {
                value.push(c);
            }
        }
        value
    } else {
        rest.split('#').next().unwrap_or("").trim().to_string()
    }
}

fn conf_value(value: &ParameterValue) -> String {
    match value {
        ParameterValue::Categorical(s) => format!("'{}'", s.replace('\'', "''")),
        ParameterValue::Integer(i) => i.to_string(),
    }
}
