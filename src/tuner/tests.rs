use super::*;
use crate::lifecycle::LifecycleController;
use crate::logging::{memory_logger, LogLevel, MemorySink};
use crate::mutator::ConfigMutator;
use crate::runtime::testing::ScriptedRunner;
use crate::runtime::{CommandOutput, ContainerRuntime};
use crate::search::{build_strategy, Candidate, ParameterValue, StrategyKind};
use async_trait::async_trait;
use serde_yaml::Value;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::TempDir;

const DOCUMENT: &str = "\
scope: demo
postgresql:
  listen: 0.0.0.0:5432
  parameters:
    shared_buffers: 128MB
    wal_level: replica
    shared_preload_libraries: pg_stat_statements
    hot_standby: 'on'
";

fn candidate(sb: &str, wm: &str, mc: i64) -> Candidate {
    Candidate::new(vec![
        ("shared_buffers".to_string(), ParameterValue::Categorical(sb.to_string())),
        ("work_mem".to_string(), ParameterValue::Categorical(wm.to_string())),
        ("max_connections".to_string(), ParameterValue::Integer(mc)),
    ])
}

/// Replays a fixed list of candidates and records the scores it receives
struct ScriptedStrategy {
    queue: VecDeque<Candidate>,
    scores: Arc<Mutex<Vec<f64>>>,
}

impl ScriptedStrategy {
    fn new(candidates: Vec<Candidate>) -> (Self, Arc<Mutex<Vec<f64>>>) {
        let scores = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                queue: candidates.into(),
                scores: scores.clone(),
            },
            scores,
        )
    }
}

impl SearchStrategy for ScriptedStrategy {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn propose(&mut self, _history: &[Observation]) -> Result<Candidate> {
        self.queue
            .pop_front()
            .ok_or_else(|| AppError::search("script exhausted"))
    }

    fn update(&mut self, observation: &Observation) -> Result<()> {
        self.scores.lock().unwrap().push(observation.score);
        Ok(())
    }
}

/// Hands out targets in order, repeating the last one
struct SequenceResolver {
    targets: Mutex<VecDeque<TargetIdentity>>,
    calls: Mutex<u32>,
}

impl SequenceResolver {
    fn new(targets: Vec<TargetIdentity>) -> Self {
        Self {
            targets: Mutex::new(targets.into()),
            calls: Mutex::new(0),
        }
    }

    fn calls(&self) -> u32 {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl TargetResolution for SequenceResolver {
    async fn resolve(&self) -> TargetIdentity {
        *self.calls.lock().unwrap() += 1;
        let mut targets = self.targets.lock().unwrap();
        if targets.len() > 1 {
            targets.pop_front().unwrap()
        } else {
            targets.front().cloned().unwrap()
        }
    }
}

/// Scores whatever is currently on disk: one configuration is fast, the rest slow
struct DocumentProbe {
    path: PathBuf,
    targets: Mutex<Vec<String>>,
}

impl DocumentProbe {
    fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            targets: Mutex::new(Vec::new()),
        }
    }

    fn targets(&self) -> Vec<String> {
        self.targets.lock().unwrap().clone()
    }
}

#[async_trait]
impl ThroughputProbe for DocumentProbe {
    async fn run(&self, target: &TargetIdentity, _plan: &BenchmarkPlan) -> BenchmarkOutcome {
        self.targets.lock().unwrap().push(target.name.clone());
        let text = std::fs::read_to_string(&self.path).unwrap();
        let doc: Value = serde_yaml::from_str(&text).unwrap();
        let params = &doc["postgresql"]["parameters"];
        let fast = params["shared_buffers"].as_str() == Some("256MB")
            && params["work_mem"].as_str() == Some("8MB")
            && params["max_connections"].as_i64() == Some(75);
        BenchmarkOutcome {
            throughput: if fast { 100.0 } else { 10.0 },
            latency_ms: Some(1.0),
            attempts: 1,
        }
    }
}

struct Fixture {
    _dir: TempDir,
    path: PathBuf,
    runner: Arc<ScriptedRunner>,
    probe: Arc<DocumentProbe>,
    sink: Arc<MemorySink>,
    logger: Logger,
}

fn fixture() -> Fixture {
    fixture_with(
        ScriptedRunner::new()
            .on("restart", CommandOutput::ok(""))
            .on("pg_isready", CommandOutput::ok("/var/run/postgresql:5432 - accepting connections")),
    )
}

fn fixture_with(runner: ScriptedRunner) -> Fixture {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("patroni-master.yml");
    std::fs::write(&path, DOCUMENT).unwrap();
    let runner = Arc::new(runner);
    let probe = Arc::new(DocumentProbe::new(&path));
    let (logger, sink) = memory_logger("TUNER");
    Fixture {
        _dir: dir,
        path,
        runner,
        probe,
        sink,
        logger,
    }
}

fn settings() -> TunerSettings {
    TunerSettings {
        ready_timeout: Duration::from_secs(120),
        poll_interval: Duration::from_secs(5),
        benchmark: BenchmarkPlan::new(10, Duration::from_secs(30), 5, Duration::from_secs(8)),
        re_resolve_after_restart: false,
    }
}

fn components(fx: &Fixture, document: &Path, resolver: Arc<dyn TargetResolution>) -> TunerComponents {
    let runtime = ContainerRuntime::new(fx.runner.clone(), "docker");
    TunerComponents {
        resolver,
        applier: Arc::new(ConfigMutator::new(
            document.to_path_buf(),
            vec!["postgresql".to_string(), "parameters".to_string()],
            vec!["shared_preload_libraries".to_string()],
            fx.logger.clone(),
        )),
        lifecycle: Arc::new(LifecycleController::new(
            runtime,
            "postgres".to_string(),
            "postgres".to_string(),
            fx.logger.clone(),
        )),
        probe: fx.probe.clone(),
    }
}

fn leader() -> Arc<SequenceResolver> {
    Arc::new(SequenceResolver::new(vec![TargetIdentity::leader("postgres-2")]))
}

#[tokio::test(start_paused = true)]
async fn test_closed_loop_finds_fast_configuration() {
    let fx = fixture();
    let (strategy, scores) = ScriptedStrategy::new(vec![
        candidate("128MB", "4MB", 50),
        candidate("256MB", "8MB", 75),
        candidate("512MB", "16MB", 100),
    ]);
    let mut tuner = Tuner::new(
        components(&fx, &fx.path, leader()),
        Box::new(strategy),
        settings(),
        fx.logger.clone(),
    );

    let report = tuner
        .run(&ParameterSpace::postgres_default(), 3)
        .await
        .unwrap();

    assert_eq!(report.trials.len(), 3);
    assert_eq!(report.strategy, "scripted");
    assert_eq!(report.measured(), 3);
    let best = report.best().unwrap();
    assert_eq!(best.trial, 2);
    assert_eq!(best.candidate, candidate("256MB", "8MB", 75));
    assert_eq!(best.throughput, 100.0);
    assert_eq!(*scores.lock().unwrap(), vec![-10.0, -100.0, -10.0]);

    // The document holds the last candidate, pruned to tuned plus allow-listed keys
    let doc: Value = serde_yaml::from_str(&std::fs::read_to_string(&fx.path).unwrap()).unwrap();
    let params = doc["postgresql"]["parameters"].as_mapping().unwrap();
    let keys: Vec<&str> = params.keys().filter_map(|k| k.as_str()).collect();
    assert_eq!(
        keys,
        vec!["shared_buffers", "shared_preload_libraries", "work_mem", "max_connections"]
    );
    assert_eq!(doc["postgresql"]["parameters"]["shared_buffers"].as_str(), Some("512MB"));
    assert_eq!(doc["scope"].as_str(), Some("demo"));

    assert_eq!(fx.runner.count("docker restart postgres-2"), 3);
    assert!(report
        .trials
        .iter()
        .all(|t| t.readiness.is_ready() && t.status == TrialStatus::Measured));
    assert!(fx.sink.contains("New best: 256MB/8MB/75 -> 100.00 tps (trial 2)"));
}

#[tokio::test(start_paused = true)]
async fn test_phase_sequence_for_measured_trial() {
    let fx = fixture();
    let (strategy, _) = ScriptedStrategy::new(vec![candidate("256MB", "8MB", 75)]);
    let mut tuner = Tuner::new(
        components(&fx, &fx.path, leader()),
        Box::new(strategy),
        settings(),
        fx.logger.clone(),
    );
    assert_eq!(tuner.phase(), TunerPhase::Idle);

    tuner.run(&ParameterSpace::postgres_default(), 1).await.unwrap();

    assert_eq!(
        tuner.phase_history(),
        &[
            TunerPhase::Idle,
            TunerPhase::ProposingCandidate,
            TunerPhase::Mutating,
            TunerPhase::Restarting,
            TunerPhase::Benchmarking,
            TunerPhase::Scoring,
            TunerPhase::Done,
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_readiness_timeout_still_benchmarks() {
    let fx = fixture_with(
        ScriptedRunner::new()
            .on("restart", CommandOutput::ok(""))
            .on("pg_isready", CommandOutput::failed(2, "/var/run/postgresql:5432 - no response")),
    );
    let (strategy, scores) = ScriptedStrategy::new(vec![candidate("256MB", "8MB", 75)]);
    let mut tuner = Tuner::new(
        components(&fx, &fx.path, leader()),
        Box::new(strategy),
        settings(),
        fx.logger.clone(),
    );

    let report = tuner.run(&ParameterSpace::postgres_default(), 1).await.unwrap();

    let trial = &report.trials[0];
    assert!(trial.readiness.is_timed_out());
    assert_eq!(trial.status, TrialStatus::Measured);
    assert_eq!(trial.throughput, 100.0);
    assert_eq!(fx.probe.targets(), vec!["postgres-2"]);
    assert_eq!(*scores.lock().unwrap(), vec![-100.0]);
    assert!(tuner.phase_history().contains(&TunerPhase::Benchmarking));
    assert_eq!(tuner.phase(), TunerPhase::Done);
    assert!(fx.sink.lines_at(LogLevel::Warn).iter().any(|l| l.contains("not ready after 120s")));
}

#[tokio::test(start_paused = true)]
async fn test_unwritable_document_costs_one_trial() {
    let fx = fixture();
    let missing = fx.path.with_file_name("missing.yml");
    let (strategy, scores) = ScriptedStrategy::new(vec![candidate("256MB", "8MB", 75)]);
    let mut tuner = Tuner::new(
        components(&fx, &missing, leader()),
        Box::new(strategy),
        settings(),
        fx.logger.clone(),
    );

    let report = tuner.run(&ParameterSpace::postgres_default(), 1).await.unwrap();

    let trial = &report.trials[0];
    assert_eq!(trial.status, TrialStatus::MutationFailed);
    assert_eq!(trial.readiness, ReadinessOutcome::Skipped);
    assert_eq!(trial.throughput, 0.0);
    assert_eq!(*scores.lock().unwrap(), vec![-0.0]);
    assert_eq!(report.failed(), 1);
    // No restart and no benchmark for a configuration that never landed
    assert_eq!(fx.runner.count("restart"), 0);
    assert!(fx.probe.targets().is_empty());
    assert_eq!(
        tuner.phase_history(),
        &[
            TunerPhase::Idle,
            TunerPhase::ProposingCandidate,
            TunerPhase::Mutating,
            TunerPhase::Scoring,
            TunerPhase::Done,
        ]
    );
    assert!(fx.sink.contains("Recovering from DOCUMENT"));
}

#[tokio::test(start_paused = true)]
async fn test_missing_section_aborts_run() {
    let fx = fixture();
    std::fs::write(&fx.path, "scope: demo\npostgresql:\n  listen: 0.0.0.0:5432\n").unwrap();
    let (strategy, _) = ScriptedStrategy::new(vec![candidate("256MB", "8MB", 75), candidate("128MB", "4MB", 50)]);
    let mut tuner = Tuner::new(
        components(&fx, &fx.path, leader()),
        Box::new(strategy),
        settings(),
        fx.logger.clone(),
    );

    let err = tuner
        .run(&ParameterSpace::postgres_default(), 2)
        .await
        .unwrap_err();

    assert_eq!(err.category(), "STRUCTURE");
    assert_eq!(tuner.phase(), TunerPhase::Mutating);
    assert_eq!(fx.runner.count("restart"), 0);
    assert!(!fx.sink.lines_at(LogLevel::Error).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_candidate_outside_space_is_a_search_failure() {
    let fx = fixture();
    let (strategy, _) = ScriptedStrategy::new(vec![candidate("64GB", "8MB", 75)]);
    let mut tuner = Tuner::new(
        components(&fx, &fx.path, leader()),
        Box::new(strategy),
        settings(),
        fx.logger.clone(),
    );

    let err = tuner.run(&ParameterSpace::postgres_default(), 1).await.unwrap_err();
    assert_eq!(err.category(), "SEARCH");
    // Nothing was written
    assert_eq!(std::fs::read_to_string(&fx.path).unwrap(), DOCUMENT);
}

#[tokio::test(start_paused = true)]
async fn test_zero_budget_is_done_immediately() {
    let fx = fixture();
    let (strategy, _) = ScriptedStrategy::new(vec![]);
    let mut tuner = Tuner::new(
        components(&fx, &fx.path, leader()),
        Box::new(strategy),
        settings(),
        fx.logger.clone(),
    );

    let report = tuner.run(&ParameterSpace::postgres_default(), 0).await.unwrap();
    assert!(report.trials.is_empty());
    assert!(report.best().is_none());
    assert_eq!(tuner.phase_history(), &[TunerPhase::Idle, TunerPhase::Done]);
}

#[tokio::test(start_paused = true)]
async fn test_re_resolve_follows_failover() {
    let fx = fixture();
    let resolver = Arc::new(SequenceResolver::new(vec![
        TargetIdentity::leader("postgres-1"),
        TargetIdentity::leader("postgres-3"),
    ]));
    let (strategy, _) = ScriptedStrategy::new(vec![candidate("256MB", "8MB", 75), candidate("128MB", "4MB", 50)]);
    let mut tuner = Tuner::new(
        components(&fx, &fx.path, resolver.clone()),
        Box::new(strategy),
        TunerSettings {
            re_resolve_after_restart: true,
            ..settings()
        },
        fx.logger.clone(),
    );

    let report = tuner.run(&ParameterSpace::postgres_default(), 2).await.unwrap();

    // Initial resolution plus one per restart
    assert_eq!(resolver.calls(), 3);
    assert_eq!(fx.runner.count("docker restart postgres-1"), 1);
    assert_eq!(fx.runner.count("docker restart postgres-3"), 1);
    assert_eq!(fx.probe.targets(), vec!["postgres-3", "postgres-3"]);
    assert_eq!(report.target.name, "postgres-3");
    assert!(fx.sink.contains("Target moved from postgres-1 to postgres-3"));
}

#[tokio::test(start_paused = true)]
async fn test_target_fixed_without_re_resolve() {
    let fx = fixture();
    let resolver = Arc::new(SequenceResolver::new(vec![
        TargetIdentity::leader("postgres-1"),
        TargetIdentity::leader("postgres-3"),
    ]));
    let (strategy, _) = ScriptedStrategy::new(vec![candidate("256MB", "8MB", 75), candidate("128MB", "4MB", 50)]);
    let mut tuner = Tuner::new(
        components(&fx, &fx.path, resolver.clone()),
        Box::new(strategy),
        settings(),
        fx.logger.clone(),
    );

    tuner.run(&ParameterSpace::postgres_default(), 2).await.unwrap();
    assert_eq!(resolver.calls(), 1);
    assert_eq!(fx.probe.targets(), vec!["postgres-1", "postgres-1"]);
}

#[tokio::test(start_paused = true)]
async fn test_seeded_bayesian_runs_are_reproducible() {
    async fn run_once() -> Vec<Candidate> {
        let fx = fixture();
        let space = ParameterSpace::postgres_default();
        let strategy = build_strategy(StrategyKind::Bayesian, space.clone(), 7, 3, 3);
        let mut tuner = Tuner::new(
            components(&fx, &fx.path, leader()),
            strategy,
            settings(),
            Logger::silent("TUNER"),
        );
        let report = tuner.run(&space, 6).await.unwrap();
        report.trials.into_iter().map(|t| t.candidate).collect()
    }

    let first = run_once().await;
    let second = run_once().await;
    assert_eq!(first.len(), 6);
    assert_eq!(first, second);
}

#[tokio::test(start_paused = true)]
async fn test_results_file_records_every_trial() {
    let fx = fixture();
    let results_path = fx.path.with_file_name("tuning_results.txt");
    let (strategy, _) = ScriptedStrategy::new(vec![candidate("128MB", "4MB", 50), candidate("256MB", "8MB", 75)]);
    let mut tuner = Tuner::new(
        components(&fx, &fx.path, leader()),
        Box::new(strategy),
        settings(),
        fx.logger.clone(),
    )
    .with_results(ResultsWriter::create(&results_path).unwrap());

    tuner.run(&ParameterSpace::postgres_default(), 2).await.unwrap();

    let text = std::fs::read_to_string(&results_path).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("trial=1 shared_buffers=128MB work_mem=4MB max_connections=50 tps=10.00"));
    assert!(lines[1].starts_with("trial=2 shared_buffers=256MB"));
    assert!(lines[2].starts_with("best trial=2 shared_buffers=256MB work_mem=8MB max_connections=75 tps=100.00"));
}
