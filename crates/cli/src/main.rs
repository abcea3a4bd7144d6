use crate::{
    commands::{Commands, ImportArgs},
    error::CliError,
    shutdown::{ExitCode, ShutdownCoordinator},
};
use clap::Parser;
use connectors::{
    factory::UrlConnectionFactory,
    file::input::{InputFilter, discover_inputs},
};
use engine_config::{Configuration, loader};
use engine_core::{eval::functions::FunctionRegistry, progress::DEFAULT_PROGRESS_INTERVAL};
use engine_runtime::execution::importer::{ImportSettings, Importer};
use std::{sync::Arc, thread};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod commands;
mod conn;
mod error;
mod output;
mod shutdown;

#[derive(Parser)]
#[command(name = "csvload", version = "0.1.0", about = "Concurrent CSV to SQL table loader")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let cli = Cli::parse();

    let verbose = matches!(&cli.command, Commands::Import(args) if args.verbose);
    init_logging(verbose);

    match cli.command {
        Commands::Import(args) => {
            let shutdown = ShutdownCoordinator::new(CancellationToken::new());
            shutdown.register_handlers();

            let result = import(args, shutdown.cancel_token()).await;
            if shutdown.is_shutdown_requested() {
                warn!("Import interrupted");
                std::process::exit(ExitCode::ShutdownRequested.as_i32());
            }
            if let Err(e) = &result {
                error!("{e}");
                std::process::exit(ExitCode::GeneralError.as_i32());
            }
        }
        Commands::Config { config, output } => {
            let config = loader::load_file(&config)?;
            let json = config.to_json_pretty()?;
            output::write_or_print(&json, output.as_deref()).await?;
        }
        Commands::TestConn { config } => {
            let config = loader::load_file(&config)?;
            conn::test_connection(&config).await?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn import(args: ImportArgs, cancel: CancellationToken) -> Result<(), CliError> {
    let mut config = loader::load_file(&args.config)?;
    apply_overrides(&mut config, &args);

    let filter = InputFilter::new(args.include.as_deref(), args.skip.as_deref())?;
    let inputs = discover_inputs(&args.input, &filter)?;
    if inputs.is_empty() {
        return Err(CliError::NoInput(args.input.display().to_string()));
    }

    let threads = effective_threads(args.threads, available_cores());
    info!(inputs = inputs.len(), threads, "Starting csvload");

    let factory = Arc::new(UrlConnectionFactory::new(
        config.connection_url.clone(),
        config.connection_properties.clone(),
    ));
    let settings = ImportSettings {
        threads,
        progress: args.progress.then_some(DEFAULT_PROGRESS_INTERVAL),
    };
    let importer = Importer::new(
        config,
        &FunctionRegistry::with_builtins(),
        factory,
        settings,
        cancel,
    )?;

    let summaries = importer.import_files(&inputs).await?;
    println!("{}", output::render_summaries(&summaries));

    let failed: usize = summaries.iter().map(|s| s.failures.len()).sum();
    if failed > 0 {
        return Err(CliError::WorkersFailed(failed));
    }
    Ok(())
}

fn apply_overrides(config: &mut Configuration, args: &ImportArgs) {
    if let Some(batch_size) = args.batch_size {
        config.batch_size = batch_size;
    }
    if let Some(limit) = args.limit {
        config.limit = limit;
    }
}

fn available_cores() -> usize {
    thread::available_parallelism().map_or(1, |n| n.get())
}

/// Requested worker count clamped to `[1, cores]`; all cores by default.
fn effective_threads(requested: Option<usize>, cores: usize) -> usize {
    let cores = cores.max(1);
    requested.unwrap_or(cores).clamp(1, cores)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn threads_are_clamped_to_available_cores() {
        assert_eq!(effective_threads(None, 8), 8);
        assert_eq!(effective_threads(Some(0), 8), 1);
        assert_eq!(effective_threads(Some(3), 8), 3);
        assert_eq!(effective_threads(Some(64), 8), 8);
        assert_eq!(effective_threads(Some(2), 0), 1);
    }

    #[test]
    fn command_line_overrides_win() {
        let cli = Cli::parse_from([
            "csvload",
            "import",
            "--config",
            "load.json",
            "--input",
            "data",
            "--batch-size",
            "5",
            "--limit",
            "20",
        ]);
        let Commands::Import(args) = cli.command else {
            panic!("expected the import command");
        };
        assert_eq!(args.input, PathBuf::from("data"));

        let mut config = Configuration::default();
        apply_overrides(&mut config, &args);
        assert_eq!(config.batch_size, 5);
        assert_eq!(config.limit, 20);
        assert!(!args.verbose);
    }

    #[tokio::test]
    async fn config_file_is_printed_with_its_parent_merged() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("base.json"),
            r#"{ "targetTable": "people", "batchSize": 7 }"#,
        )
        .unwrap();
        let child = dir.path().join("child.json");
        std::fs::write(&child, r#"{ "extend": "base.json", "batchSize": 9 }"#).unwrap();
        let out = dir.path().join("effective.json");

        let config = loader::load_file(&child).unwrap();
        output::write_or_print(&config.to_json_pretty().unwrap(), Some(&out))
            .await
            .unwrap();

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(out).unwrap()).unwrap();
        assert_eq!(written["targetTable"], "people");
        assert_eq!(written["batchSize"], 9);
    }
}
