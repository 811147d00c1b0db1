//! End-to-end tests of the tuning loop against a simulated container runtime
//!
//! The fake runtime answers docker, patronictl, pg_isready and pgbench
//! commands. Its pgbench throughput depends on the parameters currently
//! written to the document, which closes the loop without a database.

use async_trait::async_trait;
use clap::Parser;
use pg_autotune::{
    app::App,
    cli::Cli,
    error::Result,
    runtime::{CommandOutput, CommandRequest, CommandRunner, ContainerRuntime},
};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

const DOCUMENT: &str = "\
scope: pg-cluster
postgresql:
  listen: 0.0.0.0:5432
  parameters:
    shared_buffers: 128MB
    work_mem: 4MB
    max_connections: 100
    shared_preload_libraries: pg_stat_statements
    wal_level: replica
";

const ROLE_TABLE: &str = "\
+ Cluster: pg-cluster ----+---------+-----------+----+
| Member     | Host       | Role    | State     | TL |
+------------+------------+---------+-----------+----+
| postgres-1 | 172.18.0.3 | Replica | streaming |  4 |
| postgres-2 | 172.18.0.4 | Leader  | running   |  4 |
+------------+------------+---------+-----------+----+
";

const POSTGRESQL_CONF: &str = "\
listen_addresses = '*'
shared_buffers = 128MB
max_connections = 100
";

/// Simulated docker host running a two-member cluster
struct FakeDocker {
    document: PathBuf,
    /// postgresql.conf inside the containers
    conf: Mutex<String>,
    calls: Mutex<Vec<String>>,
}

impl FakeDocker {
    fn new(document: &Path) -> Arc<Self> {
        Arc::new(Self {
            document: document.to_path_buf(),
            conf: Mutex::new(POSTGRESQL_CONF.to_string()),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn conf(&self) -> String {
        self.conf.lock().unwrap().clone()
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn count(&self, needle: &str) -> usize {
        self.calls().iter().filter(|c| c.contains(needle)).count()
    }

    /// Throughput of the parameters currently on disk
    fn current_tps(&self) -> f64 {
        let conf = self.conf();
        if conf.contains("shared_buffers = '256MB'") {
            return 900.0;
        }
        let text = std::fs::read_to_string(&self.document).unwrap_or_default();
        let document: serde_yaml::Value = serde_yaml::from_str(&text).unwrap_or(serde_yaml::Value::Null);
        match document["postgresql"]["parameters"]["shared_buffers"].as_str() {
            Some("256MB") => 900.0,
            Some("512MB") => 700.0,
            _ => 400.0,
        }
    }
}

#[async_trait]
impl CommandRunner for FakeDocker {
    async fn run(&self, request: CommandRequest) -> Result<CommandOutput> {
        let line = request.command_line();
        self.calls.lock().unwrap().push(line.clone());

        let output = if line.contains(" sh -c ") {
            *self.conf.lock().unwrap() = request.args[6].clone();
            CommandOutput::ok("")
        } else if line.contains(" cat /") {
            CommandOutput::ok(self.conf())
        } else if line.contains(" ps ") {
            CommandOutput::ok("postgres-1\npostgres-2\nredis\n")
        } else if line.contains("patronictl") {
            CommandOutput::ok(ROLE_TABLE)
        } else if line.contains(" restart ") {
            CommandOutput::ok("restarted\n")
        } else if line.contains("pg_isready") {
            CommandOutput::ok("/var/run/postgresql:5432 - accepting connections\n")
        } else if line.contains("pgbench") {
            CommandOutput::ok(format!(
                "latency average = 11.000 ms\ntps = {:.6} (without initial connection time)\n",
                self.current_tps()
            ))
        } else {
            CommandOutput::failed(127, "unknown command")
        };
        Ok(output)
    }
}

struct Workspace {
    _dir: TempDir,
    document: PathBuf,
    results: PathBuf,
}

fn workspace() -> Workspace {
    let dir = TempDir::new().unwrap();
    let document = dir.path().join("patroni-master.yml");
    std::fs::write(&document, DOCUMENT).unwrap();
    let results = dir.path().join("out").join("results.txt");
    Workspace {
        document,
        results,
        _dir: dir,
    }
}

fn cli(workspace: &Workspace, extra: &[&str]) -> Cli {
    let document = workspace.document.to_string_lossy().to_string();
    let results = workspace.results.to_string_lossy().to_string();
    let mut args = vec![
        "pg-autotune",
        "-f", &document,
        "-o", &results,
        "--allow-list", "shared_preload_libraries",
        "--container-prefix", "postgres-",
        "--container", "postgres-master",
        "-T", "1",
        "--retries", "2",
        "--retry-wait", "1",
        "--ready-timeout", "5",
        "--poll-interval", "1",
        "--no-color",
    ];
    args.extend_from_slice(extra);
    Cli::parse_from(args)
}

#[tokio::test]
async fn test_full_grid_finds_best_shared_buffers() {
    let ws = workspace();
    let docker = FakeDocker::new(&ws.document);
    let runtime = ContainerRuntime::new(docker.clone(), "docker");

    App::new(cli(&ws, &["--strategy", "grid", "--grid-points", "3", "-n", "27"]))
        .unwrap()
        .with_runtime(runtime)
        .run()
        .await
        .unwrap();

    let results = std::fs::read_to_string(&ws.results).unwrap();
    let lines: Vec<&str> = results.lines().collect();
    assert_eq!(lines.len(), 28);
    assert!(lines[0].starts_with("trial=1 "));

    let best = lines[27];
    assert!(best.starts_with("best trial="), "{}", best);
    assert!(best.contains("shared_buffers=256MB"));
    assert!(best.contains("tps=900.00"));
    assert!(best.contains("target=postgres-2"));

    assert_eq!(docker.count("docker restart postgres-2"), 27);
    assert_eq!(docker.count("pgbench"), 27);
}

#[tokio::test]
async fn test_document_keeps_only_tuned_and_allowed_keys() {
    let ws = workspace();
    let docker = FakeDocker::new(&ws.document);
    let runtime = ContainerRuntime::new(docker.clone(), "docker");

    App::new(cli(&ws, &["--strategy", "random", "-s", "3", "-n", "2"]))
        .unwrap()
        .with_runtime(runtime)
        .run()
        .await
        .unwrap();

    let text = std::fs::read_to_string(&ws.document).unwrap();
    let document: serde_yaml::Value = serde_yaml::from_str(&text).unwrap();
    let parameters = document["postgresql"]["parameters"].as_mapping().unwrap();
    let keys: Vec<&str> = parameters.keys().filter_map(|k| k.as_str()).collect();

    assert_eq!(
        keys,
        vec!["shared_buffers", "work_mem", "max_connections", "shared_preload_libraries"]
    );
    assert_eq!(document["scope"].as_str(), Some("pg-cluster"));
    assert_eq!(document["postgresql"]["listen"].as_str(), Some("0.0.0.0:5432"));
}

#[tokio::test]
async fn test_seeded_runs_are_reproducible() {
    let mut candidate_columns = Vec::new();
    for _ in 0..2 {
        let ws = workspace();
        let runtime = ContainerRuntime::new(FakeDocker::new(&ws.document), "docker");
        App::new(cli(&ws, &["-s", "11", "-n", "7", "--initial-points", "3"]))
            .unwrap()
            .with_runtime(runtime)
            .run()
            .await
            .unwrap();

        let results = std::fs::read_to_string(&ws.results).unwrap();
        let columns: Vec<String> = results
            .lines()
            .map(|line| {
                line.split_whitespace()
                    .filter(|f| {
                        f.starts_with("trial=") || f.starts_with("shared_buffers=")
                            || f.starts_with("work_mem=") || f.starts_with("max_connections=")
                            || f.starts_with("tps=")
                    })
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect();
        candidate_columns.push(columns);
    }

    assert_eq!(candidate_columns[0].len(), 8);
    assert_eq!(candidate_columns[0], candidate_columns[1]);
}

#[tokio::test]
async fn test_static_target_skips_leader_detection() {
    let ws = workspace();
    let docker = FakeDocker::new(&ws.document);
    let runtime = ContainerRuntime::new(docker.clone(), "docker");

    App::new(cli(&ws, &["--no-leader-detection", "-n", "1"]))
        .unwrap()
        .with_runtime(runtime)
        .run()
        .await
        .unwrap();

    assert_eq!(docker.count("patronictl"), 0);
    assert_eq!(docker.count(" ps "), 0);
    assert_eq!(docker.count("docker restart postgres-master"), 1);
}

#[tokio::test]
async fn test_dry_run_changes_nothing() {
    let ws = workspace();
    let docker = FakeDocker::new(&ws.document);
    let runtime = ContainerRuntime::new(docker.clone(), "docker");

    App::new(cli(&ws, &["--dry-run"]))
        .unwrap()
        .with_runtime(runtime)
        .run()
        .await
        .unwrap();

    assert_eq!(std::fs::read_to_string(&ws.document).unwrap(), DOCUMENT);
    assert!(!ws.results.exists());
    assert_eq!(docker.count("restart"), 0);
    assert_eq!(docker.count("pgbench"), 0);
}

#[tokio::test]
async fn test_missing_section_aborts_run() {
    let ws = workspace();
    std::fs::write(&ws.document, "scope: pg-cluster\npostgresql:\n  listen: 0.0.0.0:5432\n").unwrap();
    let docker = FakeDocker::new(&ws.document);
    let runtime = ContainerRuntime::new(docker.clone(), "docker");

    let err = App::new(cli(&ws, &["-n", "3"]))
        .unwrap()
        .with_runtime(runtime)
        .run()
        .await
        .unwrap_err();

    assert_eq!(err.category(), "STRUCTURE");
    assert_eq!(docker.count("restart"), 0);
}

#[tokio::test]
async fn test_conf_format_edits_file_inside_leader() {
    let ws = workspace();
    let docker = FakeDocker::new(&ws.document);
    let runtime = ContainerRuntime::new(docker.clone(), "docker");

    App::new(cli(&ws, &["--config-format", "conf", "--strategy", "grid", "--grid-points", "2", "-n", "12"]))
        .unwrap()
        .with_runtime(runtime)
        .run()
        .await
        .unwrap();

    let results = std::fs::read_to_string(&ws.results).unwrap();
    let best = results.lines().last().unwrap();
    assert!(best.contains("shared_buffers=256MB"), "{}", best);
    assert!(best.contains("tps=900.00"));

    // The host document is never touched in this format
    assert_eq!(std::fs::read_to_string(&ws.document).unwrap(), DOCUMENT);

    let conf = docker.conf();
    assert!(conf.starts_with("listen_addresses = '*'\n"));
    assert_eq!(conf.matches("shared_buffers").count(), 1);
    assert_eq!(conf.matches("max_connections").count(), 1);
    assert!(docker.count("docker exec postgres-2 cat /var/lib/postgresql/data/postgresql.conf") >= 12);
}
