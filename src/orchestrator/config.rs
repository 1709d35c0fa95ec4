//! Orchestrator configuration
//!
//! Defaults, then the TOML file, then `STACKSCAN_*` environment variables;
//! the CLI applies its own flags last.

use crate::core::validation::{validate_positive_int, validate_positive_secs};
use crate::spawner::JobLimits;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONCURRENCY_LIMIT: usize = 5;
pub const DEFAULT_UNIT_TIMEOUT_SECS: u64 = 3600;
pub const DEFAULT_WRITE_CADENCE_SECS: u64 = 30;
pub const DEFAULT_STALENESS_MULTIPLIER: u32 = 4;
pub const DEFAULT_KILL_GRACE_SECS: u64 = 5;

/// Prefix of every configuration environment variable
pub const ENV_PREFIX: &str = "STACKSCAN_";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for '{key}': {message}")]
    Invalid { key: String, message: String },

    #[error("Error reading configuration file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Error parsing configuration file {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

impl ConfigError {
    fn invalid(key: &str, message: impl Into<String>) -> Self {
        ConfigError::Invalid {
            key: key.to_string(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    pub job_root: PathBuf,
    pub concurrency_limit: usize,
    pub unit_timeout: Duration,
    pub write_cadence: Duration,
    pub staleness_multiplier: u32,
    pub retention: Duration,
    pub sweep_interval: Duration,
    pub kill_grace: Duration,
}

/// `<cache dir>/stackscan/jobs`, or under the temp dir when there is no cache dir
pub fn default_job_root() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("stackscan")
        .join("jobs")
}

/// `<config dir>/Stackscan/stackscan.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("Stackscan").join("stackscan.toml"))
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            job_root: default_job_root(),
            concurrency_limit: DEFAULT_CONCURRENCY_LIMIT,
            unit_timeout: Duration::from_secs(DEFAULT_UNIT_TIMEOUT_SECS),
            write_cadence: Duration::from_secs(DEFAULT_WRITE_CADENCE_SECS),
            staleness_multiplier: DEFAULT_STALENESS_MULTIPLIER,
            retention: Duration::from_secs(crate::retention::DEFAULT_RETENTION_SECS),
            sweep_interval: Duration::from_secs(crate::retention::DEFAULT_SWEEP_INTERVAL_SECS),
            kill_grace: Duration::from_secs(DEFAULT_KILL_GRACE_SECS),
        }
    }
}

fn toml_positive(table: &toml::Table, key: &str) -> Result<Option<u64>, ConfigError> {
    match table.get(key) {
        None => Ok(None),
        Some(value) => match value.as_integer() {
            Some(n) if n > 0 => Ok(Some(n as u64)),
            Some(_) => Err(ConfigError::invalid(key, "must be greater than 0")),
            None => Err(ConfigError::invalid(key, "expected a positive integer")),
        },
    }
}

impl OrchestratorConfig {
    /// Defaults with a different job root
    pub fn with_job_root(job_root: impl Into<PathBuf>) -> Self {
        Self {
            job_root: job_root.into(),
            ..Self::default()
        }
    }

    /// Silence after which a non-terminal unit is reported stale
    pub fn stale_after(&self) -> Duration {
        self.write_cadence
            .checked_mul(self.staleness_multiplier)
            .unwrap_or(Duration::MAX)
    }

    pub fn limits(&self) -> JobLimits {
        JobLimits {
            concurrency_limit: self.concurrency_limit,
            unit_timeout: self.unit_timeout,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.job_root.as_os_str().is_empty() {
            return Err(ConfigError::invalid("job-root", "cannot be empty"));
        }
        if self.concurrency_limit == 0 {
            return Err(ConfigError::invalid("concurrency-limit", "must be at least 1"));
        }
        if self.staleness_multiplier == 0 {
            return Err(ConfigError::invalid("staleness-multiplier", "must be at least 1"));
        }
        for (key, value) in [
            ("unit-timeout-secs", self.unit_timeout),
            ("write-cadence-secs", self.write_cadence),
            ("retention-secs", self.retention),
            ("sweep-interval-secs", self.sweep_interval),
        ] {
            if value.is_zero() {
                return Err(ConfigError::invalid(key, "must be greater than 0"));
            }
        }
        Ok(())
    }

    /// Apply kebab-case keys from a parsed TOML table; unknown keys are ignored
    pub fn apply_toml(&mut self, table: &toml::Table) -> Result<(), ConfigError> {
        if let Some(value) = table.get("job-root") {
            let root = value
                .as_str()
                .ok_or_else(|| ConfigError::invalid("job-root", "expected a path string"))?;
            self.job_root = PathBuf::from(root);
        }
        if let Some(n) = toml_positive(table, "concurrency-limit")? {
            self.concurrency_limit = n as usize;
        }
        if let Some(n) = toml_positive(table, "unit-timeout-secs")? {
            self.unit_timeout = Duration::from_secs(n);
        }
        if let Some(n) = toml_positive(table, "write-cadence-secs")? {
            self.write_cadence = Duration::from_secs(n);
        }
        if let Some(n) = toml_positive(table, "staleness-multiplier")? {
            self.staleness_multiplier = u32::try_from(n)
                .map_err(|_| ConfigError::invalid("staleness-multiplier", "value too large"))?;
        }
        if let Some(n) = toml_positive(table, "retention-secs")? {
            self.retention = Duration::from_secs(n);
        }
        if let Some(n) = toml_positive(table, "sweep-interval-secs")? {
            self.sweep_interval = Duration::from_secs(n);
        }
        if let Some(n) = toml_positive(table, "kill-grace-secs")? {
            self.kill_grace = Duration::from_secs(n);
        }
        Ok(())
    }

    /// Apply `STACKSCAN_*` variables looked up through `lookup`
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |suffix: &str| {
            let key = format!("{}{}", ENV_PREFIX, suffix);
            lookup(&key).map(|value| (key, value))
        };
        let secs = |suffix: &str| -> Result<Option<Duration>, ConfigError> {
            match get(suffix) {
                Some((key, value)) => validate_positive_secs(&value)
                    .map(|n| Some(Duration::from_secs(n)))
                    .map_err(|message| ConfigError::invalid(&key, message)),
                None => Ok(None),
            }
        };

        if let Some((_, value)) = get("JOB_ROOT") {
            if !value.trim().is_empty() {
                self.job_root = PathBuf::from(value.trim());
            }
        }
        if let Some((key, value)) = get("CONCURRENCY_LIMIT") {
            self.concurrency_limit =
                validate_positive_int(&value).map_err(|m| ConfigError::invalid(&key, m))?;
        }
        if let Some((key, value)) = get("STALENESS_MULTIPLIER") {
            let n = validate_positive_int(&value).map_err(|m| ConfigError::invalid(&key, m))?;
            self.staleness_multiplier =
                u32::try_from(n).map_err(|_| ConfigError::invalid(&key, "value too large"))?;
        }
        if let Some(d) = secs("UNIT_TIMEOUT_SECS")? {
            self.unit_timeout = d;
        }
        if let Some(d) = secs("WRITE_CADENCE_SECS")? {
            self.write_cadence = d;
        }
        if let Some(d) = secs("RETENTION_SECS")? {
            self.retention = d;
        }
        if let Some(d) = secs("SWEEP_INTERVAL_SECS")? {
            self.sweep_interval = d;
        }
        if let Some(d) = secs("KILL_GRACE_SECS")? {
            self.kill_grace = d;
        }
        Ok(())
    }

    /// Read and parse a TOML configuration file
    pub fn read_toml(path: &Path) -> Result<toml::Table, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str::<toml::Table>(&contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Defaults, then `table` if given, then the process environment
    pub fn load(table: Option<&toml::Table>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(table) = table {
            config.apply_toml(table)?;
        }
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }
}
