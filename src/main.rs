//! PostgreSQL Auto-Tuner - Main CLI Application
//!
//! Repeatedly rewrites the database configuration, restarts the target
//! container, benchmarks it and lets a search strategy pick the next
//! parameter set.

use clap::Parser;
use pg_autotune::{
    app::App,
    cli::Cli,
    config::EnvManager,
    error::{AppError, ErrorReporter, Result},
};
use std::process;

#[tokio::main]
async fn main() {
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("Application panic: {}", panic_info);
        eprintln!("The configuration document may have been left with a partially applied candidate.");
        process::exit(AppError::internal("panic").exit_code());
    }));

    let cli = Cli::parse();

    if cli.print_env_example {
        print!("{}", EnvManager::create_example_env_content());
        return;
    }

    if let Err(message) = cli.validate() {
        eprintln!("Error: {}", message);
        process::exit(AppError::config(message).exit_code());
    }

    let reporter = ErrorReporter::new(cli.use_colors(), cli.verbose || cli.debug);

    if let Err(e) = run_application(cli).await {
        reporter.report_error(&e);
        print_error_suggestions(&e);
        process::exit(e.exit_code());
    }
}

/// Main application logic
async fn run_application(cli: Cli) -> Result<()> {
    App::new(cli)?.run().await
}

/// Print helpful suggestions for common errors
fn print_error_suggestions(error: &AppError) {
    match error {
        AppError::Config(_) => {
            eprintln!();
            eprintln!("Configuration help:");
            eprintln!("  - Check your .env file format (see --print-env-example)");
            eprintln!("  - Ranges are written LOW-HIGH, lists are comma-separated");
            eprintln!("  - Durations are whole seconds between 1 and 86400");
        }
        AppError::Structure(_) => {
            eprintln!();
            eprintln!("Document help:");
            eprintln!("  - Check --parameters-section against the document layout");
            eprintln!("  - Every segment of the section path must be a mapping");
        }
        AppError::Search(_) => {
            eprintln!();
            eprintln!("Search help:");
            eprintln!("  - Every parameter needs at least one value");
            eprintln!("  - Try --strategy random to rule out the surrogate model");
        }
        _ => {}
    }
}
