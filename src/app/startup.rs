use super::cli::args::{Args, Command};
use super::cli::commands::{self, EXIT_FAILURE};
use crate::core::error_handling::log_error_with_context;
use crate::core::logging::init_logging;
use crate::core::shutdown::ShutdownCoordinator;
use crate::orchestrator::config::default_config_path;
use crate::orchestrator::{ConfigError, Orchestrator, OrchestratorConfig, OrchestratorError};
use std::path::Path;

/// Parse arguments, set up logging and configuration, run the command.
/// Returns the process exit code.
pub async fn startup() -> i32 {
    let args = Args::parse_styled();

    if let Command::Worker(worker_args) = &args.command {
        // Worker stderr is captured by the spawner; keep it plain
        let _logger = match init_logging(args.log_level.as_deref(), args.log_format.as_deref(), None, false) {
            Ok(handle) => Some(handle),
            Err(e) => {
                eprintln!("Failed to initialise logging: {}", e);
                None
            }
        };
        return commands::worker(worker_args).await;
    }

    let table = match config_table(args.config_file.as_deref()) {
        Ok(table) => table,
        Err(e) => {
            eprintln!("Error: {}", e);
            return EXIT_FAILURE;
        }
    };

    let use_color = args.use_color();
    let log_level = args
        .log_level
        .clone()
        .or_else(|| table_string(table.as_ref(), "log-level"));
    let log_format = args
        .log_format
        .clone()
        .or_else(|| table_string(table.as_ref(), "log-format"));
    let log_file = match args.log_file() {
        Some(path) => Some(path.to_string_lossy().into_owned()),
        None if args.log_file.is_some() => None,
        None => table_string(table.as_ref(), "log-file").filter(|f| f != "none"),
    };
    let _logger = match init_logging(
        log_level.as_deref(),
        log_format.as_deref(),
        log_file.as_deref(),
        use_color && log_file.is_none(),
    ) {
        Ok(handle) => Some(handle),
        Err(e) => {
            eprintln!("Failed to initialise logging: {}", e);
            None
        }
    };

    let mut config = match OrchestratorConfig::load(table.as_ref()) {
        Ok(config) => config,
        Err(e) => {
            log_error_with_context(&OrchestratorError::from(e), "Loading configuration");
            return EXIT_FAILURE;
        }
    };
    if let Some(job_root) = &args.job_root {
        config.job_root = job_root.clone();
    }
    log::debug!("Configuration: {:?}", config);

    let orchestrator = match Orchestrator::with_current_exe(config) {
        Ok(orchestrator) => orchestrator,
        Err(e) => {
            log_error_with_context(&e, "Starting orchestrator");
            return EXIT_FAILURE;
        }
    };

    let (context, result) = match &args.command {
        Command::Scan(scan_args) => (
            "Running scan job",
            ShutdownCoordinator::guard(|token| {
                commands::scan(&orchestrator, scan_args, token, use_color)
            })
            .await,
        ),
        Command::Status(status_args) => (
            "Reading job status",
            commands::status(&orchestrator, status_args, use_color),
        ),
        Command::Sweep(sweep_args) => (
            "Sweeping expired jobs",
            commands::sweep(&orchestrator, sweep_args, use_color),
        ),
        Command::Worker(_) => return EXIT_FAILURE,
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            log_error_with_context(&e, context);
            EXIT_FAILURE
        }
    }
}

/// The explicit config file, else the default one if it exists
fn config_table(explicit: Option<&Path>) -> Result<Option<toml::Table>, ConfigError> {
    match explicit {
        Some(path) => OrchestratorConfig::read_toml(path).map(Some),
        None => match default_config_path() {
            Some(path) if path.exists() => OrchestratorConfig::read_toml(&path).map(Some),
            _ => Ok(None),
        },
    }
}

fn table_string(table: Option<&toml::Table>, key: &str) -> Option<String> {
    table?.get(key)?.as_str().map(str::to_string)
}
