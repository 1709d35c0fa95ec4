//! Status Store
//!
//! Filesystem-backed store for job status. Every job owns one directory under
//! the job root; inside it each unit has its own `unit_<i>.json`, the rollup
//! lives in `master.json`, and successful scans leave a `result_<i>.json`.
//!
//! All writes go through [`write_json_atomic`]: the document is written to a
//! temporary file in the same directory, synced, and renamed over the target,
//! so readers see either the previous snapshot or the new one.

use crate::core::validation::validate_job_id;
use crate::status::error::{StatusError, StatusResult};
use crate::status::types::{MasterStatus, UnitStatus};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};

/// File name of the job rollup
pub const MASTER_FILE: &str = "master.json";

const UNIT_PREFIX: &str = "unit_";
const RESULT_PREFIX: &str = "result_";
const JSON_SUFFIX: &str = ".json";

/// File name of the status file for unit `index`
pub fn unit_file_name(index: usize) -> String {
    format!("{}{}{}", UNIT_PREFIX, index, JSON_SUFFIX)
}

/// File name of the scan result for unit `index`
pub fn result_file_name(index: usize) -> String {
    format!("{}{}{}", RESULT_PREFIX, index, JSON_SUFFIX)
}

/// Parse `unit_<i>.json` back into `i`; anything else yields `None`
pub fn parse_unit_file_name(file_name: &str) -> Option<usize> {
    let digits = file_name
        .strip_prefix(UNIT_PREFIX)?
        .strip_suffix(JSON_SUFFIX)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Serialise `value` and atomically replace `target` with it
pub fn write_json_atomic<T: Serialize>(target: &Path, value: &T) -> StatusResult<()> {
    let parent = target
        .parent()
        .ok_or_else(|| StatusError::DirectoryMissing(target.to_path_buf()))?;
    let payload = serde_json::to_vec_pretty(value).map_err(|e| StatusError::Serialize {
        path: target.to_path_buf(),
        message: e.to_string(),
    })?;

    // Leading dot keeps in-flight temp files out of directory listings
    let prefix = format!(
        ".{}.",
        target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    );
    let mut temp = tempfile::Builder::new()
        .prefix(&prefix)
        .suffix(".tmp")
        .tempfile_in(parent)
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StatusError::DirectoryMissing(parent.to_path_buf())
            } else {
                StatusError::io(parent, e)
            }
        })?;

    temp.write_all(&payload)
        .map_err(|e| StatusError::io(temp.path(), e))?;
    temp.as_file()
        .sync_all()
        .map_err(|e| StatusError::io(temp.path(), e))?;
    temp.persist(target)
        .map_err(|e| StatusError::io(target, e.error))?;
    Ok(())
}

/// Read and parse a JSON document; a missing file yields `Ok(None)`
pub fn read_json<T: DeserializeOwned>(path: &Path) -> StatusResult<Option<T>> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(StatusError::io(path, e)),
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| StatusError::Corrupt {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
}

/// Handle on a job root directory
#[derive(Debug, Clone)]
pub struct StatusStore {
    root: PathBuf,
}

impl StatusStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory of `job_id`; the id is validated before a path is built
    pub fn job_dir(&self, job_id: &str) -> StatusResult<PathBuf> {
        validate_job_id(job_id).map_err(|reason| StatusError::InvalidJobId {
            job_id: job_id.to_string(),
            reason,
        })?;
        Ok(self.root.join(job_id))
    }

    pub fn unit_path(&self, job_id: &str, index: usize) -> StatusResult<PathBuf> {
        Ok(self.job_dir(job_id)?.join(unit_file_name(index)))
    }

    pub fn master_path(&self, job_id: &str) -> StatusResult<PathBuf> {
        Ok(self.job_dir(job_id)?.join(MASTER_FILE))
    }

    pub fn result_path(&self, job_id: &str, index: usize) -> StatusResult<PathBuf> {
        Ok(self.job_dir(job_id)?.join(result_file_name(index)))
    }

    /// Create the directory for a new job; fails if it already exists
    pub fn create_job_dir(&self, job_id: &str) -> StatusResult<PathBuf> {
        let dir = self.job_dir(job_id)?;
        std::fs::create_dir_all(&self.root).map_err(|e| StatusError::io(&self.root, e))?;
        match std::fs::create_dir(&dir) {
            Ok(()) => Ok(dir),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(StatusError::JobExists(dir))
            }
            Err(e) => Err(StatusError::io(&dir, e)),
        }
    }

    pub fn job_exists(&self, job_id: &str) -> bool {
        self.job_dir(job_id).map(|dir| dir.is_dir()).unwrap_or(false)
    }

    /// Fail with `DirectoryMissing` unless the job directory is present
    pub fn require_job_dir(&self, job_id: &str) -> StatusResult<PathBuf> {
        let dir = self.job_dir(job_id)?;
        if dir.is_dir() {
            Ok(dir)
        } else {
            Err(StatusError::DirectoryMissing(dir))
        }
    }

    pub fn write_unit(&self, job_id: &str, status: &UnitStatus) -> StatusResult<()> {
        let path = self.unit_path(job_id, status.unit_index)?;
        write_json_atomic(&path, status)
    }

    /// Read one unit's status; `Ok(None)` when its worker has not written yet
    pub fn read_unit(&self, job_id: &str, index: usize) -> StatusResult<Option<UnitStatus>> {
        read_json(&self.unit_path(job_id, index)?)
    }

    pub fn write_master(&self, master: &MasterStatus) -> StatusResult<()> {
        let path = self.master_path(&master.job_id)?;
        write_json_atomic(&path, master)
    }

    pub fn read_master(&self, job_id: &str) -> StatusResult<Option<MasterStatus>> {
        read_json(&self.master_path(job_id)?)
    }

    pub fn write_result<T: Serialize>(&self, job_id: &str, index: usize, result: &T) -> StatusResult<()> {
        write_json_atomic(&self.result_path(job_id, index)?, result)
    }

    pub fn read_result<T: DeserializeOwned>(&self, job_id: &str, index: usize) -> StatusResult<Option<T>> {
        read_json(&self.result_path(job_id, index)?)
    }

    /// Indices of all unit files currently present, sorted ascending
    pub fn list_unit_indices(&self, job_id: &str) -> StatusResult<Vec<usize>> {
        let dir = self.job_dir(job_id)?;
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StatusError::DirectoryMissing(dir));
            }
            Err(e) => return Err(StatusError::io(&dir, e)),
        };

        let mut indices = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StatusError::io(&dir, e))?;
            if let Some(index) = entry.file_name().to_str().and_then(parse_unit_file_name) {
                indices.push(index);
            }
        }
        indices.sort_unstable();
        Ok(indices)
    }

    /// Ids of all job directories under the root
    ///
    /// Entries that are not directories, or whose names are not valid job
    /// ids, are skipped. A missing root yields an empty list.
    pub fn list_jobs(&self) -> StatusResult<Vec<String>> {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StatusError::io(&self.root, e)),
        };

        let mut jobs = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StatusError::io(&self.root, e))?;
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            if !is_dir {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if validate_job_id(name).is_ok() {
                    jobs.push(name.to_string());
                }
            }
        }
        jobs.sort();
        Ok(jobs)
    }

    /// Recursively delete a job directory
    ///
    /// Returns `Ok(false)` if the directory was already gone.
    pub fn remove_job(&self, job_id: &str) -> StatusResult<bool> {
        let dir = self.job_dir(job_id)?;
        match std::fs::remove_dir_all(&dir) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StatusError::io(&dir, e)),
        }
    }
}
