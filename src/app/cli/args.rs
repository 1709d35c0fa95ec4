//! Command line arguments
//!
//! Global options apply to every subcommand; values given here win over the
//! configuration file, which wins over built-in defaults.

use crate::core::styles::palette_to_clap;
use crate::core::validation::{parse_unit_arg, validate_positive_int, validate_positive_secs};
use crate::spawner::UnitSpec;
use crate::worker::WorkerSpec;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug, Clone)]
#[command(name = "stackscan")]
#[command(about = "Scan repositories in parallel worker processes")]
#[command(version)]
#[command(after_help = " * can be specified multiple times")]
pub struct Args {
    /// Configuration file path
    #[arg(short = 'c', long = "config-file", value_name = "FILE", global = true)]
    pub config_file: Option<PathBuf>,

    /// Log level
    #[arg(
        short = 'l',
        long = "log-level",
        value_name = "LEVEL",
        global = true,
        value_parser = ["trace", "debug", "info", "warn", "error", "off"]
    )]
    pub log_level: Option<String>,

    /// Log output format
    #[arg(
        short = 'o',
        long = "log-format",
        value_name = "FORMAT",
        global = true,
        value_parser = ["text", "ext", "json"]
    )]
    pub log_format: Option<String>,

    /// Log file path (use 'none' to log to stderr)
    #[arg(short = 'f', long = "log-file", value_name = "FILE", global = true)]
    pub log_file: Option<PathBuf>,

    /// Force colored output
    #[arg(long = "color", conflicts_with = "no_color", global = true)]
    pub color: bool,

    /// Disable colored output
    #[arg(long = "no-color", global = true)]
    pub no_color: bool,

    /// Directory holding per-job status directories
    #[arg(long = "job-root", value_name = "DIR", global = true)]
    pub job_root: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Submit a scan job and wait for it to finish
    Scan(ScanArgs),
    /// Show the status of a job
    Status(StatusArgs),
    /// Remove finished jobs older than the retention window
    Sweep(SweepArgs),
    /// Run a single unit (launched by the spawner)
    #[command(hide = true)]
    Worker(WorkerArgs),
}

#[derive(clap::Args, Debug, Clone)]
pub struct ScanArgs {
    /// Repositories to scan*, as NAME=LOCATOR or a bare path
    #[arg(
        short = 'r',
        long = "repo",
        value_name = "NAME=LOCATOR",
        required = true,
        value_parser = parse_unit_arg
    )]
    pub repos: Vec<(String, String)>,

    /// Maximum workers running at once
    #[arg(long = "concurrency", value_name = "COUNT", value_parser = validate_positive_int)]
    pub concurrency: Option<usize>,

    /// Per-unit time limit in seconds
    #[arg(long = "timeout-secs", value_name = "SECONDS", value_parser = validate_positive_secs)]
    pub timeout_secs: Option<u64>,

    /// Print the final status as JSON
    #[arg(long = "json")]
    pub json: bool,
}

impl ScanArgs {
    pub fn units(&self) -> Vec<UnitSpec> {
        self.repos
            .iter()
            .map(|(name, locator)| UnitSpec::new(name.as_str(), locator.as_str()))
            .collect()
    }
}

#[derive(clap::Args, Debug, Clone)]
pub struct StatusArgs {
    /// Job identifier printed by `scan`
    #[arg(value_name = "JOB_ID")]
    pub job_id: String,

    /// Show only the last rollup written by the spawner
    #[arg(long = "summary")]
    pub summary: bool,

    /// Print as JSON
    #[arg(long = "json")]
    pub json: bool,
}

#[derive(clap::Args, Debug, Clone)]
pub struct SweepArgs {
    /// Print the report as JSON
    #[arg(long = "json")]
    pub json: bool,
}

#[derive(clap::Args, Debug, Clone)]
pub struct WorkerArgs {
    #[arg(long = "job-root", value_name = "DIR")]
    pub job_root: PathBuf,

    #[arg(long = "job-id", value_name = "ID")]
    pub job_id: String,

    #[arg(long = "unit-index", value_name = "INDEX")]
    pub unit_index: usize,

    #[arg(long = "name", value_name = "NAME")]
    pub name: String,

    #[arg(long = "locator", value_name = "LOCATOR")]
    pub locator: String,

    #[arg(long = "cadence-ms", value_name = "MILLIS", default_value_t = 30_000)]
    pub cadence_ms: u64,
}

impl WorkerArgs {
    pub fn spec(&self) -> WorkerSpec {
        WorkerSpec {
            job_root: self.job_root.clone(),
            job_id: self.job_id.clone(),
            unit_index: self.unit_index,
            name: self.name.clone(),
            locator: self.locator.clone(),
            cadence: Duration::from_millis(self.cadence_ms.max(1)),
        }
    }
}

impl Args {
    /// Parse the process arguments, styling help with the shared palette
    ///
    /// Exits with clap's usage error on bad input.
    pub fn parse_styled() -> Self {
        Self::parse_styled_from(std::env::args_os())
    }

    pub fn parse_styled_from<I, T>(args: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        use clap::{ColorChoice, CommandFactory, FromArgMatches};
        use std::io::IsTerminal;

        let args: Vec<std::ffi::OsString> = args.into_iter().map(Into::into).collect();
        let color_choice = if args.iter().any(|a| a == "--no-color") {
            ColorChoice::Never
        } else if args.iter().any(|a| a == "--color") {
            ColorChoice::Always
        } else {
            ColorChoice::Auto
        };
        let styled = match color_choice {
            ColorChoice::Never => false,
            ColorChoice::Always => true,
            ColorChoice::Auto => std::io::stderr().is_terminal(),
        };

        let matches = Self::command()
            .color(color_choice)
            .styles(palette_to_clap(styled))
            .get_matches_from(args);
        Self::from_arg_matches(&matches).unwrap_or_else(|e| e.exit())
    }

    /// Resolve --color/--no-color against whether stdout is a terminal
    pub fn use_color(&self) -> bool {
        use std::io::IsTerminal;
        if self.no_color {
            false
        } else {
            self.color || std::io::stdout().is_terminal()
        }
    }

    /// Log file, with `none` meaning stderr
    pub fn log_file(&self) -> Option<&std::path::Path> {
        self.log_file
            .as_deref()
            .filter(|path| path.as_os_str() != "none")
    }

    pub fn is_worker(&self) -> bool {
        matches!(self.command, Command::Worker(_))
    }
}
