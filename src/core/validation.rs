//! Validation utilities
//!
//! Shared checks for configuration values, CLI arguments and identifiers that
//! end up in filesystem paths.

/// Longest job id accepted as a directory name
pub const MAX_JOB_ID_LEN: usize = 128;

/// Validate positive integer value
pub fn validate_positive_int(value: &str) -> Result<usize, String> {
    match value.trim().parse::<usize>() {
        Ok(0) => Err("Value must be greater than 0".to_string()),
        Ok(n) => Ok(n),
        Err(_) => Err(format!("'{}' is not a valid positive integer", value)),
    }
}

/// Validate a whole number of seconds (zero rejected)
pub fn validate_positive_secs(value: &str) -> Result<u64, String> {
    match value.trim().parse::<u64>() {
        Ok(0) => Err("Duration must be at least 1 second".to_string()),
        Ok(n) => Ok(n),
        Err(_) => Err(format!("'{}' is not a valid number of seconds", value)),
    }
}

/// Validate a job id before it is joined onto the job root
///
/// Only ASCII alphanumerics, `-` and `_` are accepted so an id can never
/// escape the root or collide with the store's own file names.
pub fn validate_job_id(job_id: &str) -> Result<(), String> {
    if job_id.is_empty() {
        return Err("Job id cannot be empty".to_string());
    }
    if job_id.len() > MAX_JOB_ID_LEN {
        return Err(format!(
            "Job id is longer than {} characters",
            MAX_JOB_ID_LEN
        ));
    }
    if let Some(bad) = job_id
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
    {
        return Err(format!("Job id contains invalid character '{}'", bad));
    }
    Ok(())
}

/// Parse a `NAME=LOCATOR` unit argument
///
/// A bare locator is accepted too; its name becomes the last path segment.
pub fn parse_unit_arg(value: &str) -> Result<(String, String), String> {
    let value = value.trim();
    if value.is_empty() {
        return Err("Repository cannot be empty".to_string());
    }

    // Only treat '=' as a separator when it precedes any URL scheme
    if let Some((name, locator)) = value.split_once('=') {
        if !name.contains('/') && !name.contains(':') {
            let (name, locator) = (name.trim(), locator.trim());
            if name.is_empty() || locator.is_empty() {
                return Err(format!("'{}' must be NAME=LOCATOR", value));
            }
            return Ok((name.to_string(), locator.to_string()));
        }
    }

    let name = value
        .trim_end_matches('/')
        .rsplit(['/', ':'])
        .next()
        .map(|segment| segment.trim_end_matches(".git"))
        .filter(|segment| !segment.is_empty())
        .unwrap_or(value);
    Ok((name.to_string(), value.to_string()))
}
