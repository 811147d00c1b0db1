//! Target resolution: which container is the authoritative tuning target
//!
//! With leader detection enabled, every running container matching the name
//! prefix is asked for the cluster role table; the first one that lists
//! itself as `Leader` wins. Any failure along the way degrades to the
//! configured default container. Resolution never fails.

use crate::logging::Logger;
use crate::models::Config;
use crate::parsing;
use crate::runtime::ContainerRuntime;
use crate::types::{ResolutionSource, TargetIdentity};
use async_trait::async_trait;

/// Anything that can name the current tuning target
#[async_trait]
pub trait TargetResolution: Send + Sync {
    async fn resolve(&self) -> TargetIdentity;
}

/// Resolver settings
#[derive(Debug, Clone, PartialEq)]
pub struct ResolverSettings {
    pub container_prefix: String,
    pub default_container: String,
    pub detect_leader: bool,
    pub patronictl_path: String,
    pub patroni_config: String,
}

impl ResolverSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            container_prefix: config.container_prefix.clone(),
            default_container: config.default_container.clone(),
            detect_leader: config.detect_leader,
            patronictl_path: config.patronictl_path.clone(),
            patroni_config: config.patroni_config.clone(),
        }
    }

    fn role_query(&self) -> Vec<String> {
        vec![
            self.patronictl_path.clone(),
            "-c".to_string(),
            self.patroni_config.clone(),
            "list".to_string(),
        ]
    }
}

/// Leader-detecting resolver backed by the container runtime
pub struct TargetResolver {
    runtime: ContainerRuntime,
    settings: ResolverSettings,
    logger: Logger,
}

impl TargetResolver {
    pub fn new(runtime: ContainerRuntime, settings: ResolverSettings, logger: Logger) -> Self {
        Self {
            runtime,
            settings,
            logger,
        }
    }

    async fn detect_leader(&self) -> Option<String> {
        let running = match self.runtime.list_running().await {
            Ok(names) => names,
            Err(e) => {
                self.logger
                    .warn(&format!("Cannot list running containers: {}", e))
                    .error_info(&e)
                    .log()
                    .await;
                return None;
            }
        };

        let candidates = parsing::container_names(&running.join("\n"), &self.settings.container_prefix);
        if candidates.is_empty() {
            self.logger
                .warn(&format!(
                    "No running container matches prefix '{}'",
                    self.settings.container_prefix
                ))
                .log()
                .await;
            return None;
        }

        let query = self.settings.role_query();
        for name in candidates {
            match self.runtime.exec(&name, &query).await {
                Ok(output) if output.success() => {
                    if parsing::is_leader_row(&output.stdout, &name) {
                        return Some(name);
                    }
                    self.logger
                        .debug(&format!("{} is not the leader", name))
                        .log()
                        .await;
                }
                Ok(output) => {
                    self.logger
                        .debug(&format!(
                            "Role query in {} exited with status {}",
                            name,
                            output.status_label()
                        ))
                        .field("stderr", output.stderr.trim())
                        .log()
                        .await;
                }
                Err(e) => {
                    self.logger
                        .debug(&format!("Role query in {} failed: {}", name, e))
                        .log()
                        .await;
                }
            }
        }
        None
    }
}

#[async_trait]
impl TargetResolution for TargetResolver {
    async fn resolve(&self) -> TargetIdentity {
        let identity = if !self.settings.detect_leader {
            TargetIdentity::new(&self.settings.default_container, ResolutionSource::Static)
        } else {
            match self.detect_leader().await {
                Some(name) => TargetIdentity::leader(name),
                None => {
                    self.logger
                        .error(&format!(
                            "Leader not found, using default container {}",
                            self.settings.default_container
                        ))
                        .log()
                        .await;
                    TargetIdentity::fallback(&self.settings.default_container)
                }
            }
        };

        self.logger
            .info(&format!("Target container: {}", identity.name))
            .field("source", identity.source)
            .log()
            .await;
        identity
    }
}
