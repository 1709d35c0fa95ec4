//! Unit supervision
//!
//! One supervisor per launched worker: it waits for the process, enforces
//! the unit deadline, reacts to job cancellation, and afterwards takes over
//! the unit's status file to make sure it ends in a terminal phase.

use crate::core::time::Clock;
use crate::spawner::command::{WorkerCommand, WorkerInvocation};
use crate::spawner::types::UnitSpec;
use crate::status::{FailureReason, Phase, StatusStore, UnitStatus};
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::process::ExitStatus;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStderr};
use tokio::sync::OwnedSemaphorePermit;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Bytes of worker stderr kept for the error list
pub const DIAGNOSTIC_TAIL_BYTES: usize = 4096;

/// How long to wait for the stderr reader once the worker is gone
const DIAGNOSTIC_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Shared, per-job state every supervisor needs
pub(crate) struct SupervisorContext {
    pub store: StatusStore,
    pub job_root: PathBuf,
    pub job_id: String,
    pub command: WorkerCommand,
    pub cadence: Duration,
    pub unit_timeout: Duration,
    pub kill_grace: Duration,
    pub cancel: CancellationToken,
    pub live_workers: Arc<AtomicUsize>,
    pub peak_workers: Arc<AtomicUsize>,
    pub clock: Arc<dyn Clock>,
}

/// Why supervision of a unit ended
#[derive(Debug)]
pub(crate) enum Ending {
    Exited(ExitStatus),
    WaitFailed(String),
    TimedOut(Duration),
    Cancelled,
    LaunchFailed(String),
}

/// Terminal state a supervised unit ended in
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct UnitOutcome {
    pub index: usize,
    pub phase: Phase,
    pub failure_reason: Option<FailureReason>,
}

/// Counts a worker as alive for as long as it is held
struct LiveWorker {
    live: Arc<AtomicUsize>,
}

impl LiveWorker {
    fn enter(live: &Arc<AtomicUsize>, peak: &AtomicUsize) -> Self {
        let now_live = live.fetch_add(1, Ordering::AcqRel) + 1;
        peak.fetch_max(now_live, Ordering::AcqRel);
        Self {
            live: Arc::clone(live),
        }
    }
}

impl Drop for LiveWorker {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Launch and supervise one unit, holding `permit` until it is final
pub(crate) async fn supervise_unit(
    ctx: Arc<SupervisorContext>,
    index: usize,
    unit: UnitSpec,
    permit: OwnedSemaphorePermit,
) -> UnitOutcome {
    let (ending, pid, diagnostics) = run_unit(&ctx, index, &unit).await;
    let outcome = finalize_unit(Arc::clone(&ctx), index, unit.name, ending, pid, diagnostics).await;
    drop(permit);
    outcome
}

async fn run_unit(
    ctx: &SupervisorContext,
    index: usize,
    unit: &UnitSpec,
) -> (Ending, Option<u32>, String) {
    if ctx.cancel.is_cancelled() {
        return (Ending::Cancelled, None, String::new());
    }

    let invocation = WorkerInvocation {
        job_root: &ctx.job_root,
        job_id: &ctx.job_id,
        unit_index: index,
        name: &unit.name,
        locator: &unit.locator,
        cadence: ctx.cadence,
    };
    let mut child = match ctx.command.build(&invocation).spawn() {
        Ok(child) => child,
        Err(e) => {
            log::error!(
                "Failed to launch worker for unit {} ({}): {}",
                index,
                unit.name,
                e
            );
            let message = format!(
                "Failed to launch worker '{}': {}",
                ctx.command.program().display(),
                e
            );
            return (Ending::LaunchFailed(message), None, String::new());
        }
    };

    let live = LiveWorker::enter(&ctx.live_workers, &ctx.peak_workers);
    let pid = child.id();
    log::debug!("Unit {} ({}) running as pid {:?}", index, unit.name, pid);
    let tail = child.stderr.take().map(capture_tail);

    let ending = tokio::select! {
        biased;

        status = child.wait() => match status {
            Ok(status) => Ending::Exited(status),
            Err(e) => Ending::WaitFailed(e.to_string()),
        },
        _ = ctx.cancel.cancelled() => Ending::Cancelled,
        _ = tokio::time::sleep(ctx.unit_timeout) => Ending::TimedOut(ctx.unit_timeout),
    };

    if matches!(ending, Ending::Cancelled | Ending::TimedOut(_)) {
        log::warn!(
            "Stopping unit {} ({}): {}",
            index,
            unit.name,
            if matches!(ending, Ending::Cancelled) {
                "job cancelled"
            } else {
                "timed out"
            }
        );
        terminate(&mut child, ctx.kill_grace).await;
    }
    drop(live);

    let diagnostics = match tail {
        Some(handle) => collect_tail(handle).await,
        None => String::new(),
    };
    (ending, pid, diagnostics)
}

/// SIGTERM the worker's process group, then SIGKILL after `grace`
async fn terminate(child: &mut Child, grace: Duration) -> Option<ExitStatus> {
    signal_group(child, Signal::Terminate);
    match tokio::time::timeout(grace, child.wait()).await {
        Ok(Ok(status)) => return Some(status),
        Ok(Err(e)) => log::warn!("Waiting for terminated worker failed: {}", e),
        Err(_) => log::warn!("Worker ignored SIGTERM for {:?}; killing", grace),
    }

    signal_group(child, Signal::Kill);
    if let Err(e) = child.start_kill() {
        log::debug!("start_kill: {}", e);
    }
    child.wait().await.ok()
}

#[derive(Debug, Clone, Copy)]
enum Signal {
    Terminate,
    Kill,
}

#[cfg(unix)]
fn signal_group(child: &Child, signal: Signal) {
    let Some(pid) = child.id() else {
        return;
    };
    let signo = match signal {
        Signal::Terminate => libc::SIGTERM,
        Signal::Kill => libc::SIGKILL,
    };
    // The worker was started with process_group(0), so its pid is the pgid
    let rc = unsafe { libc::killpg(pid as libc::pid_t, signo) };
    if rc != 0 {
        log::debug!(
            "killpg({}, {:?}) failed: {}",
            pid,
            signal,
            std::io::Error::last_os_error()
        );
    }
}

#[cfg(not(unix))]
fn signal_group(child: &mut Child, _signal: Signal) {
    let _ = child.start_kill();
}

/// Drain `stderr` in the background, keeping only the last bytes
fn capture_tail(mut stderr: ChildStderr) -> JoinHandle<String> {
    tokio::spawn(async move {
        let mut tail: Vec<u8> = Vec::with_capacity(DIAGNOSTIC_TAIL_BYTES);
        let mut chunk = [0u8; 1024];
        loop {
            match stderr.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    tail.extend_from_slice(&chunk[..n]);
                    if tail.len() > DIAGNOSTIC_TAIL_BYTES {
                        let excess = tail.len() - DIAGNOSTIC_TAIL_BYTES;
                        tail.drain(..excess);
                    }
                }
            }
        }
        String::from_utf8_lossy(&tail).trim().to_string()
    })
}

// A grandchild holding the pipe open must not stall finalization
async fn collect_tail(mut handle: JoinHandle<String>) -> String {
    match tokio::time::timeout(DIAGNOSTIC_DRAIN_TIMEOUT, &mut handle).await {
        Ok(Ok(tail)) => tail,
        Ok(Err(e)) => {
            log::debug!("stderr reader failed: {}", e);
            String::new()
        }
        Err(_) => {
            handle.abort();
            String::new()
        }
    }
}

fn describe_exit(status: &ExitStatus) -> String {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return format!("Worker killed by signal {}", signal);
        }
    }
    match status.code() {
        Some(code) => format!("Worker exited with code {}", code),
        None => "Worker exited abnormally".to_string(),
    }
}

/// Compute the unit's final status, or `None` to leave the file untouched
///
/// Called only once the worker is gone, so the spawner is the file's sole
/// writer. A terminal record the worker wrote itself is final; only
/// `failed/terminated`, which the worker writes when the spawner stopped it,
/// is reclassified by how the process actually ended.
pub(crate) fn final_status(
    existing: Option<UnitStatus>,
    index: usize,
    name: &str,
    ending: &Ending,
    pid: Option<u32>,
    diagnostics: &str,
    now: DateTime<Utc>,
) -> Option<UnitStatus> {
    if let Some(status) = &existing {
        if status.is_terminal() && status.failure_reason != Some(FailureReason::Terminated) {
            return None;
        }
    }

    let mut status =
        existing.unwrap_or_else(|| UnitStatus::new(index, name, pid.unwrap_or(0), now));
    let (reason, message) = match ending {
        Ending::Exited(exit) if exit.success() => {
            if status.is_terminal() {
                return None;
            }
            (
                FailureReason::MissingTerminalStatus,
                "Worker exited successfully without writing a terminal status".to_string(),
            )
        }
        Ending::Exited(exit) => (FailureReason::Crashed, describe_exit(exit)),
        Ending::WaitFailed(error) => (
            FailureReason::Crashed,
            format!("Lost track of worker: {}", error),
        ),
        Ending::TimedOut(limit) => (
            FailureReason::Timeout,
            format!("Unit exceeded its timeout of {}s", limit.as_secs()),
        ),
        Ending::Cancelled => (FailureReason::Cancelled, "Job cancelled".to_string()),
        Ending::LaunchFailed(error) => (FailureReason::LaunchFailed, error.clone()),
    };

    status.phase = Phase::Failed;
    status.failure_reason = Some(reason);
    status.current_item = None;
    status.errors.push(message);
    if !diagnostics.is_empty() {
        status.errors.push(format!("Worker stderr: {}", diagnostics));
    }
    status.touch(now);
    Some(status)
}

/// Settle the unit's status file on a blocking thread
pub(crate) async fn finalize_unit(
    ctx: Arc<SupervisorContext>,
    index: usize,
    name: String,
    ending: Ending,
    pid: Option<u32>,
    diagnostics: String,
) -> UnitOutcome {
    let job_id = ctx.job_id.clone();
    let settled = tokio::task::spawn_blocking(move || {
        record_final_status(&ctx, index, &name, &ending, pid, &diagnostics)
    })
    .await;
    settled.unwrap_or_else(|e| {
        log::error!("Finalizing unit {} of job {} failed: {}", index, job_id, e);
        UnitOutcome {
            index,
            phase: Phase::Failed,
            failure_reason: None,
        }
    })
}

fn record_final_status(
    ctx: &SupervisorContext,
    index: usize,
    name: &str,
    ending: &Ending,
    pid: Option<u32>,
    diagnostics: &str,
) -> UnitOutcome {
    let existing = match ctx.store.read_unit(&ctx.job_id, index) {
        Ok(existing) => existing,
        Err(e) => {
            log::warn!("Replacing unreadable status of unit {}: {}", index, e);
            None
        }
    };
    let fallback = existing.as_ref().map(|s| (s.phase, s.failure_reason));

    match final_status(
        existing,
        index,
        name,
        ending,
        pid,
        diagnostics,
        ctx.clock.utc_now(),
    ) {
        Some(status) => {
            log::info!(
                "Unit {} ({}) failed: {}",
                index,
                name,
                status
                    .failure_reason
                    .map(|r| r.as_str())
                    .unwrap_or("unknown")
            );
            if let Err(e) = ctx.store.write_unit(&ctx.job_id, &status) {
                log::error!("Could not record final status of unit {}: {}", index, e);
            }
            UnitOutcome {
                index,
                phase: status.phase,
                failure_reason: status.failure_reason,
            }
        }
        None => {
            let (phase, failure_reason) = fallback.unwrap_or((Phase::Failed, None));
            if !diagnostics.is_empty() && phase == Phase::Failed {
                log::debug!("Unit {} ({}) stderr: {}", index, name, diagnostics);
            }
            log::info!("Unit {} ({}) finished: {}", index, name, phase);
            UnitOutcome {
                index,
                phase,
                failure_reason,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    fn exit_code(code: i32) -> ExitStatus {
        use std::os::unix::process::ExitStatusExt;
        ExitStatus::from_raw(code << 8)
    }

    #[cfg(unix)]
    fn killed_by(signal: i32) -> ExitStatus {
        use std::os::unix::process::ExitStatusExt;
        ExitStatus::from_raw(signal)
    }

    fn unit_in(phase: Phase, now: DateTime<Utc>) -> UnitStatus {
        let mut status = UnitStatus::new(0, "web", 77, now);
        status.phase = phase;
        status
    }

    #[cfg(unix)]
    #[test]
    fn test_clean_exit_with_terminal_status_is_kept() {
        let now = Utc::now();
        for phase in [Phase::Completed, Phase::Failed] {
            let mut existing = unit_in(phase, now);
            existing.failure_reason = (phase == Phase::Failed).then_some(FailureReason::ScanError);
            let result = final_status(
                Some(existing),
                0,
                "web",
                &Ending::Exited(exit_code(0)),
                Some(77),
                "",
                now,
            );
            assert!(result.is_none(), "{} should be kept", phase);
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_clean_exit_without_terminal_status() {
        let now = Utc::now();
        let status = final_status(
            Some(unit_in(Phase::Analyzing, now)),
            0,
            "web",
            &Ending::Exited(exit_code(0)),
            Some(77),
            "",
            now,
        )
        .unwrap();
        assert_eq!(status.phase, Phase::Failed);
        assert_eq!(
            status.failure_reason,
            Some(FailureReason::MissingTerminalStatus)
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_kill_without_terminal_status_is_crash() {
        let now = Utc::now();
        let status = final_status(
            Some(unit_in(Phase::Scanning, now)),
            0,
            "web",
            &Ending::Exited(killed_by(9)),
            Some(77),
            "panicked at src/main.rs",
            now,
        )
        .unwrap();
        assert_eq!(status.failure_reason, Some(FailureReason::Crashed));
        assert_eq!(
            status.errors,
            vec![
                "Worker killed by signal 9".to_string(),
                "Worker stderr: panicked at src/main.rs".to_string()
            ]
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_scan_error_keeps_worker_account() {
        let now = Utc::now();
        let mut existing = unit_in(Phase::Failed, now);
        existing.failure_reason = Some(FailureReason::ScanError);
        existing.errors.push("no such directory".into());

        let result = final_status(
            Some(existing),
            0,
            "web",
            &Ending::Exited(exit_code(1)),
            Some(77),
            "ERR scan failed",
            now,
        );
        assert!(result.is_none());
    }

    #[test]
    fn test_worker_failure_survives_timeout_and_cancel() {
        let now = Utc::now();
        let mut existing = unit_in(Phase::Failed, now);
        existing.failure_reason = Some(FailureReason::ScanError);
        existing.errors.push("manifest parser exploded".into());

        for ending in [Ending::TimedOut(Duration::from_secs(1)), Ending::Cancelled] {
            let result = final_status(
                Some(existing.clone()),
                0,
                "web",
                &ending,
                Some(77),
                "still flushing",
                now,
            );
            assert!(result.is_none(), "{:?} rewrote a terminal record", ending);
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_terminated_worker_becomes_crash() {
        let now = Utc::now();
        let mut existing = unit_in(Phase::Failed, now);
        existing.failure_reason = Some(FailureReason::Terminated);
        existing.errors.push("Worker terminated by signal".into());

        let status = final_status(
            Some(existing),
            0,
            "web",
            &Ending::Exited(exit_code(143)),
            Some(77),
            "",
            now,
        )
        .unwrap();
        assert_eq!(status.failure_reason, Some(FailureReason::Crashed));
        assert_eq!(status.errors.len(), 2);
    }

    #[test]
    fn test_timeout_merges_worker_errors() {
        let now = Utc::now();
        let mut existing = unit_in(Phase::Failed, now);
        existing.failure_reason = Some(FailureReason::Terminated);
        existing.errors.push("Worker terminated by signal".into());

        let status = final_status(
            Some(existing),
            0,
            "web",
            &Ending::TimedOut(Duration::from_secs(2)),
            Some(77),
            "",
            now,
        )
        .unwrap();
        assert_eq!(status.failure_reason, Some(FailureReason::Timeout));
        assert_eq!(
            status.errors,
            vec![
                "Worker terminated by signal".to_string(),
                "Unit exceeded its timeout of 2s".to_string()
            ]
        );
    }

    #[test]
    fn test_completed_unit_survives_timeout() {
        let now = Utc::now();
        assert!(final_status(
            Some(unit_in(Phase::Completed, now)),
            0,
            "web",
            &Ending::TimedOut(Duration::from_secs(1)),
            Some(77),
            "",
            now,
        )
        .is_none());
    }

    #[test]
    fn test_unlaunched_units_get_fresh_status() {
        let now = Utc::now();
        let status = final_status(
            None,
            4,
            "docs",
            &Ending::LaunchFailed("No such file or directory".into()),
            None,
            "",
            now,
        )
        .unwrap();
        assert_eq!(status.unit_index, 4);
        assert_eq!(status.name, "docs");
        assert_eq!(status.pid, 0);
        assert_eq!(status.failure_reason, Some(FailureReason::LaunchFailed));

        let cancelled = final_status(None, 5, "site", &Ending::Cancelled, None, "", now).unwrap();
        assert_eq!(cancelled.failure_reason, Some(FailureReason::Cancelled));
    }

    #[test]
    fn test_final_write_never_moves_last_update_back() {
        let now = Utc::now();
        let ahead = now + chrono::Duration::seconds(10);
        let mut existing = unit_in(Phase::Scanning, now);
        existing.last_update = ahead;

        let status = final_status(Some(existing), 0, "web", &Ending::Cancelled, Some(77), "", now).unwrap();
        assert_eq!(status.last_update, ahead);
    }

    #[test]
    fn test_live_worker_guard_tracks_peak() {
        let live = Arc::new(AtomicUsize::new(0));
        let peak = AtomicUsize::new(0);
        {
            let _a = LiveWorker::enter(&live, &peak);
            let _b = LiveWorker::enter(&live, &peak);
            assert_eq!(live.load(Ordering::Acquire), 2);
        }
        let _c = LiveWorker::enter(&live, &peak);
        assert_eq!(live.load(Ordering::Acquire), 1);
        assert_eq!(peak.load(Ordering::Acquire), 2);
    }
}
