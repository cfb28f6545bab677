mod commands;
mod logging;
mod progress;

use std::process;
use std::sync::Arc;

use anyhow::Context;
use cad_intake_core::{AppConfig, ConsoleEngine, Database, UpdateEngine, UpdateOptions};
use clap::{CommandFactory, Parser};
use colored::*;
use commands::{Cli, Commands};
use dotenv::dotenv;
use progress::CliReporter;
use tracing::{error, info};

fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let args = Cli::parse();
    let config = cad_intake_core::config::load_configuration();

    let log_file = logging::log_file_path(
        config.as_ref().ok().map(|c| c.log_dir.as_path()),
        args.command.as_ref().and_then(Commands::project),
    );
    let _guard = logging::init_logger(&log_file);

    let config = match config {
        Ok(config) => config,
        Err(err) => {
            error!("Error loading configuration: {}", err);
            process::exit(1);
        }
    };

    match args.command {
        Some(Commands::Update {
            project,
            preview,
            show_unknown,
            show_ignored,
        }) => {
            let options = UpdateOptions {
                preview,
                show_unknown,
                show_ignored,
            };
            if let Err(err) = run_update(&config, &project, options) {
                error!("Error: {:#}", err);
                process::exit(1);
            }
        }
        Some(Commands::PrintConfig) => {
            println!("Configuration: {:#?}", config);
        }
        None => {
            let _ = Cli::command().print_long_help();
        }
    }

    Ok(())
}

fn run_update(config: &AppConfig, project: &str, options: UpdateOptions) -> anyhow::Result<()> {
    let store = Database::open(&config.metadata_db_path).with_context(|| {
        format!(
            "opening metadata store {}",
            config.metadata_db_path.display()
        )
    })?;
    let cad = ConsoleEngine::new(&config.cad_engine_path);

    if !options.preview {
        info!("Preview creation disabled");
    }

    let engine = UpdateEngine::new(config.clone(), Arc::new(store), Arc::new(cad)).with_options(options);
    let reporter = CliReporter::new();
    let result = engine.run(project, &reporter)?;
    reporter.finish_bar();

    println!();
    info!(
        "{} processed, {} failed, {} copied, {} up to date in {}",
        format!("{}", result.report.processed.len()).green(),
        format!("{}", result.report.failed.len()).red(),
        format!("{}", result.report.copied.len()).cyan(),
        result.report.up_to_date.len(),
        format!("{:.2}s", result.duration.as_secs_f64()).green(),
    );
    if let Some(path) = &result.report_path {
        info!("Report written to {}", path.display());
    }

    Ok(())
}
