//! External command execution and the container runtime interface
//!
//! Every interaction with docker, patronictl, pg_isready and pgbench goes
//! through [`CommandRunner`], so the control loop can be driven by scripted
//! runners in tests.

use crate::error::{AppError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::{
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::process::Command;
use tokio::time::timeout;

/// Command execution trait for abstraction and testing
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run a command to completion and capture its output
    async fn run(&self, request: CommandRequest) -> Result<CommandOutput>;
}

/// A single external command invocation
#[derive(Debug, Clone, PartialEq)]
pub struct CommandRequest {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub timeout: Option<Duration>,
}

impl CommandRequest {
    pub fn new<S: Into<String>>(program: S) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            timeout: None,
        }
    }

    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set an environment variable for the child process
    pub fn env<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Command line as it would be typed in a shell (environment omitted)
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Captured result of a finished command
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandOutput {
    /// Exit code, `None` when terminated by a signal
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

impl CommandOutput {
    /// Successful output with the given stdout
    pub fn ok<S: Into<String>>(stdout: S) -> Self {
        Self {
            status: Some(0),
            stdout: stdout.into(),
            ..Self::default()
        }
    }

    /// Failed output with the given exit code and stderr
    pub fn failed<S: Into<String>>(code: i32, stderr: S) -> Self {
        Self {
            status: Some(code),
            stderr: stderr.into(),
            ..Self::default()
        }
    }

    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    /// stdout followed by stderr
    pub fn combined(&self) -> String {
        match (self.stdout.is_empty(), self.stderr.is_empty()) {
            (_, true) => self.stdout.clone(),
            (true, false) => self.stderr.clone(),
            (false, false) => {
                let mut text = self.stdout.clone();
                if !text.ends_with('\n') {
                    text.push('\n');
                }
                text.push_str(&self.stderr);
                text
            }
        }
    }

    /// Exit status for log lines
    pub fn status_label(&self) -> String {
        match self.status {
            Some(code) => code.to_string(),
            None => "signal".to_string(),
        }
    }
}

/// Runs commands as child processes
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, request: CommandRequest) -> Result<CommandOutput> {
        let mut command = Command::new(&request.program);
        command.args(&request.args).kill_on_drop(true);
        for (key, value) in &request.env {
            command.env(key, value);
        }

        let started = Instant::now();
        let output = match request.timeout {
            Some(limit) => timeout(limit, command.output()).await.map_err(|_| {
                AppError::command(format!(
                    "'{}' did not finish within {:?}",
                    request.command_line(),
                    limit
                ))
            })?,
            None => command.output().await,
        }
        .map_err(|e| AppError::command(format!("Failed to run '{}': {}", request.command_line(), e)))?;

        Ok(CommandOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            duration: started.elapsed(),
        })
    }
}

/// Container runtime operations used by the tuner
#[derive(Clone)]
pub struct ContainerRuntime {
    runner: Arc<dyn CommandRunner>,
    binary: String,
}

impl std::fmt::Debug for ContainerRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerRuntime").field("binary", &self.binary).finish()
    }
}

impl ContainerRuntime {
    pub fn new<S: Into<String>>(runner: Arc<dyn CommandRunner>, binary: S) -> Self {
        Self {
            runner,
            binary: binary.into(),
        }
    }

    /// Runtime backed by real child processes
    pub fn docker<S: Into<String>>(binary: S) -> Self {
        Self::new(Arc::new(ProcessRunner::new()), binary)
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    pub fn runner(&self) -> Arc<dyn CommandRunner> {
        Arc::clone(&self.runner)
    }

    /// Names of running containers
    pub async fn list_running(&self) -> Result<Vec<String>> {
        let request = CommandRequest::new(&self.binary).args(["ps", "--format", "{{.Names}}"]);
        let output = self.runner.run(request).await?;
        if !output.success() {
            return Err(AppError::command(format!(
                "Container listing exited with status {}: {}",
                output.status_label(),
                output.stderr.trim()
            )));
        }
        Ok(output
            .stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect())
    }

    /// Run a command inside a container
    pub async fn exec(&self, container: &str, args: &[String]) -> Result<CommandOutput> {
        self.exec_with_env(container, &[], args).await
    }

    /// Run a command inside a container with extra environment variables
    pub async fn exec_with_env(
        &self,
        container: &str,
        env: &[(String, String)],
        args: &[String],
    ) -> Result<CommandOutput> {
        let mut request = CommandRequest::new(&self.binary).arg("exec");
        for (key, value) in env {
            request = request.arg("-e").arg(format!("{}={}", key, value));
        }
        let request = request.arg(container).args(args.iter().cloned());
        self.runner.run(request).await
    }

    /// Run a command inside a container, giving up after `limit`
    pub async fn exec_within(&self, container: &str, args: &[String], limit: Duration) -> Result<CommandOutput> {
        let request = CommandRequest::new(&self.binary)
            .arg("exec")
            .arg(container)
            .args(args.iter().cloned());
        self.run_bounded(request, limit).await
    }

    /// Restart a container, giving up after `limit`
    pub async fn restart(&self, container: &str, limit: Duration) -> Result<CommandOutput> {
        let request = CommandRequest::new(&self.binary).args(["restart", container]);
        self.run_bounded(request, limit).await
    }

    /// The limit is carried on the request and also enforced here, whatever the runner does with it
    async fn run_bounded(&self, request: CommandRequest, limit: Duration) -> Result<CommandOutput> {
        let line = request.command_line();
        match timeout(limit, self.runner.run(request.with_timeout(limit))).await {
            Ok(result) => result,
            Err(_) => Err(AppError::command(format!(
                "'{}' did not finish within {:?}",
                line, limit
            ))),
        }
    }

    /// Run a command on the host
    pub async fn host(&self, request: CommandRequest) -> Result<CommandOutput> {
        self.runner.run(request).await
    }
}


#[cfg(test)]
mod tests {
    use super::testing::ScriptedRunner;
    use super::*;

    #[test]
    fn test_command_line_rendering() {
        let request = CommandRequest::new("docker")
            .args(["exec", "postgres-master"])
            .arg("pg_isready")
            .env("PGPASSWORD", "secret");
        assert_eq!(request.command_line(), "docker exec postgres-master pg_isready");
        assert_eq!(request.env, vec![("PGPASSWORD".to_string(), "secret".to_string())]);
    }

    #[test]
    fn test_combined_output() {
        let mut output = CommandOutput::ok("out");
        assert_eq!(output.combined(), "out");
        output.stderr = "err".to_string();
        assert_eq!(output.combined(), "out\nerr");
        assert_eq!(CommandOutput::failed(1, "boom").combined(), "boom");
        assert!(!CommandOutput::failed(1, "").success());
    }

    #[tokio::test]
    async fn test_list_running_containers() {
        let runner = Arc::new(
            ScriptedRunner::new().on("ps --format", CommandOutput::ok("postgres-master\npostgres-2\n\n")),
        );
        let runtime = ContainerRuntime::new(runner.clone(), "docker");
        let names = runtime.list_running().await.unwrap();
        assert_eq!(names, vec!["postgres-master", "postgres-2"]);
        assert_eq!(runner.calls(), vec!["docker ps --format {{.Names}}"]);
    }

    #[tokio::test]
    async fn test_list_running_reports_daemon_failure() {
        let runner = Arc::new(ScriptedRunner::new().on(
            "ps",
            CommandOutput::failed(1, "Cannot connect to the Docker daemon"),
        ));
        let runtime = ContainerRuntime::new(runner, "docker");
        let err = runtime.list_running().await.unwrap_err();
        assert!(matches!(err, AppError::Command(_)));
    }

    #[tokio::test]
    async fn test_exec_passes_environment_flags() {
        let runner = Arc::new(ScriptedRunner::new().on("exec", CommandOutput::ok("")));
        let runtime = ContainerRuntime::new(runner.clone(), "docker");
        runtime
            .exec_with_env(
                "pg",
                &[("PGPASSWORD".to_string(), "pw".to_string())],
                &["psql".to_string(), "-c".to_string(), "select 1".to_string()],
            )
            .await
            .unwrap();
        assert_eq!(runner.calls(), vec!["docker exec -e PGPASSWORD=pw pg psql -c select 1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_exec_gives_up_on_hung_command() {
        let runner = Arc::new(ScriptedRunner::new().hang_on("pg_isready"));
        let runtime = ContainerRuntime::new(runner.clone(), "docker");

        let started = tokio::time::Instant::now();
        let err = runtime
            .exec_within("pg", &["pg_isready".to_string()], Duration::from_secs(3))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Command(_)));
        assert!(err.to_string().contains("did not finish within 3s"));
        assert_eq!(started.elapsed(), Duration::from_secs(3));
        assert_eq!(runner.requests()[0].timeout, Some(Duration::from_secs(3)));
    }

    #[tokio::test]
    async fn test_scripted_sequence_repeats_last() {
        let runner = ScriptedRunner::new().on_sequence(
            "probe",
            vec![CommandOutput::failed(2, "no"), CommandOutput::ok("yes")],
        );
        let first = runner.run(CommandRequest::new("probe")).await.unwrap();
        let second = runner.run(CommandRequest::new("probe")).await.unwrap();
        let third = runner.run(CommandRequest::new("probe")).await.unwrap();
        assert!(!first.success());
        assert!(second.success() && third.success());
        assert_eq!(runner.count("probe"), 3);
    }

    #[tokio::test]
    async fn test_process_runner_reports_missing_binary() {
        let runner = ProcessRunner::new();
        let result = runner
            .run(CommandRequest::new("definitely-not-a-real-binary-pg-autotune"))
            .await;
        assert!(matches!(result, Err(AppError::Command(_))));
    }
}
