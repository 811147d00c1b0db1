//! Configuration document mutation
//!
//! [`ConfigApplier`] is the seam between the tuner and wherever the database
//! reads its settings from. [`ConfigMutator`] rewrites the parameters section
//! of a Patroni YAML document for a candidate:
//! tuned keys are overwritten, every key outside `tuned ∪ allow-list` is
//! dropped, and the whole document is written back through a temporary file
//! in the same directory followed by a rename.

use crate::conf_file::ConfFileApplier;
use crate::error::{AppError, Result};
use crate::logging::Logger;
use crate::models::{Config, ConfigFormat};
use crate::runtime::ContainerRuntime;
use crate::search::{Candidate, ParameterValue};
use crate::types::TargetIdentity;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;

/// Anything that can persist a candidate for the target to pick up
#[async_trait]
pub trait ConfigApplier: Send + Sync {
    /// Write `candidate` where `target` reads it on its next start
    async fn apply(&self, target: &TargetIdentity, candidate: &Candidate) -> Result<MutationReport>;

    /// Parameters currently in effect, as printable pairs
    async fn current_parameters(&self, target: &TargetIdentity) -> Result<Vec<(String, String)>>;
}

/// Applier for the configured format
pub fn applier_from_config(config: &Config, runtime: ContainerRuntime, logger: Logger) -> Arc<dyn ConfigApplier> {
    match config.config_format {
        ConfigFormat::Patroni => Arc::new(ConfigMutator::from_config(config, logger)),
        ConfigFormat::Conf => Arc::new(ConfFileApplier::from_config(runtime, config, logger)),
    }
}

/// What a mutation changed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MutationReport {
    pub path: PathBuf,
    /// Keys written from the candidate, in candidate order
    pub written: Vec<String>,
    /// Keys removed because they were outside the allow-list
    pub pruned: Vec<String>,
}

/// Rewrites the parameters section of a YAML document
pub struct ConfigMutator {
    path: PathBuf,
    section: Vec<String>,
    allow_list: Vec<String>,
    logger: Logger,
}

impl ConfigMutator {
    pub fn new(path: PathBuf, section: Vec<String>, allow_list: Vec<String>, logger: Logger) -> Self {
        Self {
            path,
            section,
            allow_list,
            logger,
        }
    }

    pub fn from_config(config: &Config, logger: Logger) -> Self {
        Self::new(
            config.config_file.clone(),
            config.section_path(),
            config.allow_list.clone(),
            logger,
        )
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current contents of the parameters section
    pub fn read_parameters(&self) -> Result<Mapping> {
        let mut document = self.load()?;
        Ok(self.section_mut(&mut document)?.clone())
    }

    /// Apply `candidate` to the document on disk
    pub fn apply_sync(&self, candidate: &Candidate) -> Result<MutationReport> {
        let mut document = self.load()?;
        let section = self.section_mut(&mut document)?;

        let mut written = Vec::with_capacity(candidate.len());
        for (name, value) in candidate.iter() {
            section.insert(Value::String(name.to_string()), yaml_value(value));
            written.push(name.to_string());
        }

        let mut pruned = Vec::new();
        section.retain(|key, _| {
            let keep = key
                .as_str()
                .map(|k| written.iter().any(|w| w == k) || self.allow_list.iter().any(|a| a == k))
                .unwrap_or(false);
            if !keep {
                pruned.push(key_label(key));
            }
            keep
        });

        let rendered = serde_yaml::to_string(&document)
            .map_err(|e| AppError::document(format!("Cannot serialize {}: {}", self.path.display(), e)))?;
        self.write_atomically(&rendered)?;

        Ok(MutationReport {
            path: self.path.clone(),
            written,
            pruned,
        })
    }

    fn load(&self) -> Result<Value> {
        let text = std::fs::read_to_string(&self.path)
            .map_err(|e| AppError::document(format!("Cannot read {}: {}", self.path.display(), e)))?;
        serde_yaml::from_str(&text)
            .map_err(|e| AppError::document(format!("Cannot parse {}: {}", self.path.display(), e)))
    }

    fn section_mut<'a>(&self, document: &'a mut Value) -> Result<&'a mut Mapping> {
        let mut current = document;
        for (depth, key) in self.section.iter().enumerate() {
            let walked = self.section[..=depth].join(".");
            current = current.get_mut(key.as_str()).ok_or_else(|| {
                AppError::structure(format!("Section '{}' not found in {}", walked, self.path.display()))
            })?;
        }
        current.as_mapping_mut().ok_or_else(|| {
            AppError::structure(format!(
                "Section '{}' in {} is not a mapping",
                self.section.join("."),
                self.path.display()
            ))
        })
    }

    fn write_atomically(&self, contents: &str) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let fail = |e: std::io::Error| AppError::document(format!("Cannot write {}: {}", self.path.display(), e));

        let mut temp = NamedTempFile::new_in(&dir).map_err(fail)?;
        temp.write_all(contents.as_bytes()).map_err(fail)?;
        temp.as_file().sync_all().map_err(fail)?;
        if let Ok(metadata) = std::fs::metadata(&self.path) {
            temp.as_file().set_permissions(metadata.permissions()).map_err(fail)?;
        }
        temp.persist(&self.path).map_err(|e| fail(e.error))?;
        Ok(())
    }
}

#[async_trait]
impl ConfigApplier for ConfigMutator {
    async fn apply(&self, _target: &TargetIdentity, candidate: &Candidate) -> Result<MutationReport> {
        let report = self.apply_sync(candidate)?;
        self.logger
            .info(&format!("Updated {}", report.path.display()))
            .candidate(candidate)
            .log()
            .await;
        if !report.pruned.is_empty() {
            self.logger
                .info(&format!("Removed keys outside the allow-list: {}", report.pruned.join(", ")))
                .field("pruned", &report.pruned)
                .log()
                .await;
        }
        Ok(report)
    }

    async fn current_parameters(&self, _target: &TargetIdentity) -> Result<Vec<(String, String)>> {
        Ok(describe_parameters(&self.read_parameters()?))
    }
}

/// Flatten a parameters mapping into printable pairs
pub fn describe_parameters(parameters: &Mapping) -> Vec<(String, String)> {
    parameters
        .iter()
        .map(|(key, value)| (scalar_text(key), scalar_text(value)))
        .collect()
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "~".to_string(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim().replace('\n', " "))
            .unwrap_or_default(),
    }
}

/// Categorical values become YAML strings, integers stay integers
fn yaml_value(value: &ParameterValue) -> Value {
    match value {
        ParameterValue::Categorical(s) => Value::String(s.clone()),
        ParameterValue::Integer(i) => Value::Number((*i).into()),
    }
}

fn key_label(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|_| "<key>".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::memory_logger;

    const DOCUMENT: &str = "\
scope: pg-cluster
name: postgres-master
postgresql:
  listen: 0.0.0.0:5432
  parameters:
    shared_buffers: 128MB
    unix_socket_directories: /var/run/postgresql
    wal_level: replica
    work_mem: 4MB
    shared_preload_libraries: pg_stat_statements
    max_connections: 100
    hot_standby: 'on'
bootstrap:
  dcs:
    ttl: 30
";

    fn candidate(sb: &str, wm: &str, mc: i64) -> Candidate {
        Candidate::new(vec![
            ("shared_buffers".to_string(), ParameterValue::Categorical(sb.to_string())),
            ("work_mem".to_string(), ParameterValue::Categorical(wm.to_string())),
            ("max_connections".to_string(), ParameterValue::Integer(mc)),
        ])
    }

    fn mutator_for(contents: &str) -> (tempfile::TempDir, ConfigMutator) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("patroni.yml");
        std::fs::write(&path, contents).unwrap();
        let (logger, _) = memory_logger("CONFIG");
        let mutator = ConfigMutator::new(
            path,
            vec!["postgresql".to_string(), "parameters".to_string()],
            crate::defaults::DEFAULT_ALLOW_LIST.iter().map(|s| s.to_string()).collect(),
            logger,
        );
        (dir, mutator)
    }

    #[test]
    fn test_apply_sets_values_and_prunes() {
        let (_dir, mutator) = mutator_for(DOCUMENT);
        let report = mutator.apply_sync(&candidate("256MB", "8MB", 75)).unwrap();

        assert_eq!(report.written, vec!["shared_buffers", "work_mem", "max_connections"]);
        assert_eq!(report.pruned, vec!["wal_level", "hot_standby"]);

        let params = mutator.read_parameters().unwrap();
        assert_eq!(params.len(), 5);
        assert_eq!(params.get("shared_buffers"), Some(&Value::String("256MB".to_string())));
        assert_eq!(params.get("work_mem"), Some(&Value::String("8MB".to_string())));
        assert_eq!(params.get("max_connections").and_then(Value::as_i64), Some(75));
        assert_eq!(
            params.get("shared_preload_libraries"),
            Some(&Value::String("pg_stat_statements".to_string()))
        );
        assert_eq!(
            params.get("unix_socket_directories"),
            Some(&Value::String("/var/run/postgresql".to_string()))
        );
    }

    #[test]
    fn test_rest_of_document_is_preserved() {
        let (_dir, mutator) = mutator_for(DOCUMENT);
        mutator.apply_sync(&candidate("512MB", "16MB", 50)).unwrap();

        let text = std::fs::read_to_string(mutator.path()).unwrap();
        let doc: Value = serde_yaml::from_str(&text).unwrap();
        assert_eq!(doc["scope"], Value::String("pg-cluster".to_string()));
        assert_eq!(doc["postgresql"]["listen"], Value::String("0.0.0.0:5432".to_string()));
        assert_eq!(doc["bootstrap"]["dcs"]["ttl"].as_i64(), Some(30));
        // Mapping order survives the rewrite
        let keys: Vec<&str> = doc.as_mapping().unwrap().keys().filter_map(Value::as_str).collect();
        assert_eq!(keys, vec!["scope", "name", "postgresql", "bootstrap"]);
    }

    #[test]
    fn test_apply_is_idempotent() {
        let (_dir, mutator) = mutator_for(DOCUMENT);
        let c = candidate("256MB", "8MB", 75);

        mutator.apply_sync(&c).unwrap();
        let first = std::fs::read(mutator.path()).unwrap();
        let report = mutator.apply_sync(&c).unwrap();
        let second = std::fs::read(mutator.path()).unwrap();

        assert_eq!(first, second);
        assert!(report.pruned.is_empty());
    }

    #[test]
    fn test_missing_tunables_are_added() {
        let doc = "postgresql:\n  parameters:\n    unix_socket_directories: /tmp\n";
        let (_dir, mutator) = mutator_for(doc);
        mutator.apply_sync(&candidate("128MB", "4MB", 60)).unwrap();
        let params = mutator.read_parameters().unwrap();
        assert_eq!(params.len(), 4);
        assert_eq!(params.get("max_connections").and_then(Value::as_i64), Some(60));
    }

    #[test]
    fn test_missing_section_is_structural() {
        let (_dir, mutator) = mutator_for("postgresql:\n  listen: 0.0.0.0:5432\n");
        let err = mutator.apply_sync(&candidate("128MB", "4MB", 50)).unwrap_err();
        assert!(matches!(err, AppError::Structure(_)));
        assert!(err.is_run_fatal());
    }

    #[test]
    fn test_non_mapping_section_is_structural() {
        let (_dir, mutator) = mutator_for("postgresql:\n  parameters: []\n");
        let err = mutator.apply_sync(&candidate("128MB", "4MB", 50)).unwrap_err();
        assert!(matches!(err, AppError::Structure(_)));
    }

    #[test]
    fn test_unreadable_document_is_trial_fatal() {
        let (dir, mutator) = mutator_for(DOCUMENT);
        std::fs::remove_file(dir.path().join("patroni.yml")).unwrap();
        let err = mutator.apply_sync(&candidate("128MB", "4MB", 50)).unwrap_err();
        assert!(matches!(err, AppError::Document(_)));
        assert!(!err.is_run_fatal());
    }

    #[test]
    fn test_invalid_yaml_is_document_error() {
        let (_dir, mutator) = mutator_for("postgresql: [unclosed\n");
        let err = mutator.apply_sync(&candidate("128MB", "4MB", 50)).unwrap_err();
        assert!(matches!(err, AppError::Document(_)));
    }

    #[test]
    fn test_no_temp_files_left_behind() {
        let (dir, mutator) = mutator_for(DOCUMENT);
        mutator.apply_sync(&candidate("256MB", "8MB", 75)).unwrap();
        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn test_apply_logs_pruned_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("patroni.yml");
        std::fs::write(&path, DOCUMENT).unwrap();
        let (logger, sink) = memory_logger("CONFIG");
        let config = Config { config_file: path, ..Config::default() };
        let mutator = ConfigMutator::from_config(&config, logger);

        let target = TargetIdentity::leader("postgres-2");
        mutator.apply(&target, &candidate("256MB", "8MB", 75)).await.unwrap();
        assert!(sink.contains("Removed keys outside the allow-list: wal_level, hot_standby"));

        let current = mutator.current_parameters(&target).await.unwrap();
        assert_eq!(current[0], ("shared_buffers".to_string(), "256MB".to_string()));
    }

    #[test]
    fn test_describe_parameters() {
        let mapping: Mapping = serde_yaml::from_str(
            "shared_buffers: 256MB\nmax_connections: 75\nhot_standby: true\nunset: ~\nlist: [a, b]\n",
        )
        .unwrap();

        let described = describe_parameters(&mapping);
        assert_eq!(
            described,
            vec![
                ("shared_buffers".to_string(), "256MB".to_string()),
                ("max_connections".to_string(), "75".to_string()),
                ("hot_standby".to_string(), "true".to_string()),
                ("unset".to_string(), "~".to_string()),
                ("list".to_string(), "- a - b".to_string()),
            ]
        );
    }
}
