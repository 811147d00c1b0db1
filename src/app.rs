//! Main application orchestration and execution

use crate::{
    benchmark::BenchmarkRunner,
    cli::Cli,
    config::{display_config_summary, load_config, validate_config},
    error::Result,
    lifecycle::LifecycleController,
    logging::{components, LoggerFactory},
    models::Config,
    mutator::applier_from_config,
    output::{OutputCoordinator, ReportFormatterFactory, ResultsWriter},
    resolver::{ResolverSettings, TargetResolution, TargetResolver},
    runtime::ContainerRuntime,
    search::build_strategy,
    tuner::{RunPlan, Tuner, TunerComponents, TunerSettings},
};
use std::sync::Arc;

/// Main application struct that coordinates all components
pub struct App {
    cli: Cli,
    runtime: Option<ContainerRuntime>,
}

impl App {
    /// Create a new application instance with CLI configuration
    pub fn new(cli: Cli) -> Result<Self> {
        Ok(Self { cli, runtime: None })
    }

    /// Use `runtime` instead of spawning the configured container binary
    pub fn with_runtime(mut self, runtime: ContainerRuntime) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Run the application
    pub async fn run(self) -> Result<()> {
        let config = load_config(self.cli.clone())?;
        let warnings = validate_config(&config)?;
        let coordinator = OutputCoordinator::new(ReportFormatterFactory::from_config(&config));

        if config.debug {
            println!("{} v{}", crate::PKG_NAME, crate::VERSION);
            println!("\nConfiguration Summary:");
            println!("{}\n", display_config_summary(&config));
        }

        for warning in &warnings {
            println!("{}", coordinator.display_warning(&warning.format())?);
        }

        let runtime = self
            .runtime
            .clone()
            .unwrap_or_else(|| ContainerRuntime::docker(config.docker_binary.clone()));
        let loggers = LoggerFactory::new(config.clone())?;

        let resolver: Arc<dyn TargetResolution> = Arc::new(TargetResolver::new(
            runtime.clone(),
            ResolverSettings::from_config(&config),
            loggers.create_logger(components::RESOLVE).await,
        ));
        let applier = applier_from_config(
            &config,
            runtime.clone(),
            loggers.create_logger(components::CONFIG).await,
        );

        let space = config.parameter_space()?;
        let target = resolver.resolve().await;
        let mut plan = RunPlan::new(&config, space.clone(), target.clone());
        match applier.current_parameters(&target).await {
            Ok(parameters) => plan = plan.with_current_parameters(parameters),
            Err(e) => println!(
                "{}",
                coordinator.display_warning(&format!("Cannot read current parameters: {}", e))?
            ),
        }
        println!("{}\n", coordinator.display_plan(&plan)?);

        if self.cli.dry_run {
            println!("{}", coordinator.display_success("Dry run: nothing was changed")?);
            return Ok(());
        }

        let parts = TunerComponents {
            resolver,
            applier,
            lifecycle: Arc::new(LifecycleController::from_config(
                runtime.clone(),
                &config,
                loggers.create_logger(components::LIFECYCLE).await,
            )),
            probe: Arc::new(BenchmarkRunner::from_config(
                runtime,
                &config,
                loggers.create_logger(components::BENCH).await,
            )),
        };

        let mut tuner = self.build_tuner(&config, parts, &loggers).await?;
        let report = tuner.run(&space, config.trials).await?;

        println!("\n{}", coordinator.display_report(&report)?);
        if let Some(path) = &config.results_file {
            println!(
                "\n{}",
                coordinator.display_success(&format!("Results written to {}", path.display()))?
            );
        }

        Ok(())
    }

    async fn build_tuner(
        &self,
        config: &Config,
        parts: TunerComponents,
        loggers: &LoggerFactory,
    ) -> Result<Tuner> {
        let strategy = build_strategy(
            config.strategy,
            config.parameter_space()?,
            config.seed,
            config.initial_points as usize,
            config.grid_points as usize,
        );

        let mut tuner = Tuner::new(
            parts,
            strategy,
            TunerSettings::from_config(config),
            loggers.create_logger(components::TUNER).await,
        )
        .with_trial_logger(loggers.create_trial_logger().await)
        .with_error_logger(loggers.create_error_logger().await);

        if let Some(path) = &config.results_file {
            tuner = tuner.with_results(ResultsWriter::create(path)?);
        }

        Ok(tuner)
    }
}
