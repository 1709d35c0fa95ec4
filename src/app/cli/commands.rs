//! Subcommand implementations
//!
//! Each command returns the process exit code; errors are reported through
//! [`log_error_with_context`](crate::core::error_handling::log_error_with_context)
//! by the caller.

use crate::app::cli::args::{ScanArgs, StatusArgs, SweepArgs, WorkerArgs};
use crate::app::cli::display;
use crate::core::shutdown::{ShutdownCoordinator, FORCED_EXIT_CODE};
use crate::core::time::SystemClock;
use crate::orchestrator::{Orchestrator, OrchestratorResult};
use crate::spawner::JobLimits;
use crate::status::JobState;
use crate::worker::{run_worker, DirectoryScanEngine};
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => log::error!("Failed to render JSON output: {}", e),
    }
}

/// Submit, wait, print. A shutdown signal cancels the job and still waits
/// for every worker to be reaped before returning.
pub async fn scan(
    orchestrator: &Orchestrator,
    args: &ScanArgs,
    shutdown: CancellationToken,
    use_color: bool,
) -> OrchestratorResult<i32> {
    let defaults = orchestrator.config().limits();
    let limits = JobLimits {
        concurrency_limit: args.concurrency.unwrap_or(defaults.concurrency_limit),
        unit_timeout: args
            .timeout_secs
            .map(std::time::Duration::from_secs)
            .unwrap_or(defaults.unit_timeout),
    };

    orchestrator.start_sweeper()?;
    let job_id = orchestrator.submit_with(args.units(), limits)?;
    log::info!(
        "Submitted job {} ({} units, concurrency {})",
        job_id,
        args.repos.len(),
        limits.concurrency_limit
    );
    eprintln!("{}", job_id);

    let mut interrupted = false;
    let view = tokio::select! {
        view = orchestrator.wait(&job_id) => view?,
        _ = shutdown.cancelled() => {
            interrupted = true;
            orchestrator.cancel(&job_id)?;
            orchestrator.wait(&job_id).await?
        }
    };
    orchestrator.shutdown().await?;

    if args.json {
        print_json(&view);
    } else {
        display::print_job_view(&view, use_color);
    }

    Ok(if interrupted {
        FORCED_EXIT_CODE
    } else if view.state == JobState::Completed {
        EXIT_SUCCESS
    } else {
        EXIT_FAILURE
    })
}

pub fn status(orchestrator: &Orchestrator, args: &StatusArgs, use_color: bool) -> OrchestratorResult<i32> {
    if args.summary {
        let master = orchestrator.get_summary(&args.job_id)?;
        if args.json {
            print_json(&master);
        } else {
            println!("{}", display::format_master_summary(&master, use_color));
        }
    } else {
        let view = orchestrator.get_status(&args.job_id)?;
        if args.json {
            print_json(&view);
        } else {
            display::print_job_view(&view, use_color);
        }
    }
    Ok(EXIT_SUCCESS)
}

pub fn sweep(orchestrator: &Orchestrator, args: &SweepArgs, use_color: bool) -> OrchestratorResult<i32> {
    let report = orchestrator.sweep_now();
    if args.json {
        print_json(&report);
    } else {
        println!("{}", display::format_sweep_report(&report, use_color));
    }
    Ok(if report.errors.is_empty() {
        EXIT_SUCCESS
    } else {
        EXIT_FAILURE
    })
}

/// Body of a worker process
pub async fn worker(args: &WorkerArgs) -> i32 {
    let coordinator = ShutdownCoordinator::new();
    coordinator.install_signal_handlers();

    let spec = args.spec();
    log::debug!(
        "Worker for unit {} ({}) of job {} starting",
        spec.unit_index,
        spec.name,
        spec.job_id
    );
    let engine = DirectoryScanEngine::new();
    run_worker(&spec, &engine, Arc::new(SystemClock), coordinator.token())
        .await
        .code()
}
