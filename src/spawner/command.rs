//! Worker command line
//!
//! Builds the `tokio::process::Command` for one worker. The program and its
//! leading arguments are configurable; the per-unit arguments are fixed:
//!
//! ```text
//! <program> <base args> --job-root <dir> --job-id <id> --unit-index <i>
//!     --name <name> --locator <locator> --cadence-ms <ms>
//! ```

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Per-unit values passed on the worker command line
#[derive(Debug, Clone, Copy)]
pub struct WorkerInvocation<'a> {
    pub job_root: &'a Path,
    pub job_id: &'a str,
    pub unit_index: usize,
    pub name: &'a str,
    pub locator: &'a str,
    pub cadence: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerCommand {
    program: PathBuf,
    base_args: Vec<OsString>,
    envs: Vec<(OsString, OsString)>,
}

impl WorkerCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            base_args: Vec::new(),
            envs: Vec::new(),
        }
    }

    /// `<current executable> worker`
    pub fn current_exe() -> std::io::Result<Self> {
        Ok(Self::new(std::env::current_exe()?).arg("worker"))
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.base_args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.base_args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Full argument list for one unit, base arguments first
    pub fn worker_args(&self, invocation: &WorkerInvocation<'_>) -> Vec<OsString> {
        let mut args = self.base_args.clone();
        args.extend([
            OsString::from("--job-root"),
            invocation.job_root.as_os_str().to_owned(),
            OsString::from("--job-id"),
            OsString::from(invocation.job_id),
            OsString::from("--unit-index"),
            OsString::from(invocation.unit_index.to_string()),
            OsString::from("--name"),
            OsString::from(invocation.name),
            OsString::from("--locator"),
            OsString::from(invocation.locator),
            OsString::from("--cadence-ms"),
            OsString::from(invocation.cadence.as_millis().max(1).to_string()),
        ]);
        args
    }

    /// Command ready to spawn
    ///
    /// stdin and stdout are discarded, stderr is piped for diagnostics. On
    /// unix the worker leads its own process group so a kill reaches anything
    /// it started.
    pub fn build(&self, invocation: &WorkerInvocation<'_>) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(self.worker_args(invocation))
            .envs(self.envs.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);
        command
    }
}
