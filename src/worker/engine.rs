//! Scanning engines
//!
//! The worker only knows the [`ScanEngine`] capability: given a unit request
//! and a progress handle, produce a [`ScanSummary`] or a [`ScanError`]. The
//! real dependency parsers live outside this crate; [`DirectoryScanEngine`]
//! is the built-in engine used by the `worker` subcommand.

use crate::status::Phase;
use crate::worker::error::ScanError;
use crate::worker::reporter::StatusReporter;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// What a worker was asked to scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRequest {
    pub name: String,
    pub locator: String,
}

/// Progress handle passed to engines
///
/// Engines may move the unit through the non-terminal phases and report item
/// counts. Completing or failing the unit is left to the worker.
#[derive(Clone)]
pub struct ScanProgress {
    reporter: Arc<StatusReporter>,
}

impl ScanProgress {
    pub fn new(reporter: Arc<StatusReporter>) -> Self {
        Self { reporter }
    }

    pub fn enter(&self, phase: Phase) -> Result<(), ScanError> {
        if phase.is_terminal() {
            return Err(ScanError::Engine(format!(
                "Engine cannot enter terminal phase '{}'",
                phase
            )));
        }
        Ok(self.reporter.transition(phase)?)
    }

    pub fn set_total(&self, total: u64) -> Result<(), ScanError> {
        Ok(self.reporter.set_total(total)?)
    }

    pub fn advance(&self, item: impl Into<String>) -> Result<(), ScanError> {
        Ok(self.reporter.advance(Some(item.into()))?)
    }
}

/// Engine output persisted as `result_<i>.json`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanSummary {
    pub files_scanned: u64,
    pub total_bytes: u64,
    /// File count per lower-cased extension; `""` for files without one
    pub extensions: BTreeMap<String, u64>,
    /// Relative paths of recognised dependency manifests
    pub manifests: Vec<String>,
}

#[async_trait]
pub trait ScanEngine: Send + Sync {
    async fn scan(
        &self,
        request: &ScanRequest,
        progress: &ScanProgress,
    ) -> Result<ScanSummary, ScanError>;
}

/// File names that identify a dependency manifest
const MANIFEST_NAMES: &[&str] = &[
    "Cargo.toml",
    "package.json",
    "pyproject.toml",
    "requirements.txt",
    "Pipfile",
    "setup.py",
    "pom.xml",
    "build.gradle",
    "build.gradle.kts",
    "go.mod",
    "Gemfile",
    "composer.json",
    "mix.exs",
    "pubspec.yaml",
    "Package.swift",
];

/// Directories never descended into
const SKIPPED_DIRS: &[&str] = &[".git", ".hg", ".svn"];

/// Built-in engine that walks a local directory
///
/// Accepts a plain path or a `file://` URL. Remote locators are rejected,
/// since cloning is not this crate's job.
#[derive(Debug, Default, Clone)]
pub struct DirectoryScanEngine;

impl DirectoryScanEngine {
    pub fn new() -> Self {
        Self
    }

    fn resolve(locator: &str) -> Result<PathBuf, ScanError> {
        let locator = locator.trim();
        let path = locator.strip_prefix("file://").unwrap_or(locator);
        if path.contains("://") || path.starts_with("git@") {
            return Err(ScanError::UnsupportedLocator {
                locator: locator.to_string(),
                reason: "only local directories can be scanned".to_string(),
            });
        }
        if path.is_empty() {
            return Err(ScanError::UnsupportedLocator {
                locator: locator.to_string(),
                reason: "empty path".to_string(),
            });
        }

        let path = PathBuf::from(path);
        let metadata = std::fs::metadata(&path).map_err(|e| ScanError::io(&path, e))?;
        if !metadata.is_dir() {
            return Err(ScanError::UnsupportedLocator {
                locator: locator.to_string(),
                reason: "not a directory".to_string(),
            });
        }
        Ok(path)
    }
}

/// One regular file found by the walk
struct FoundFile {
    path: PathBuf,
    relative: String,
}

// Symlinks are not followed
fn collect_files(root: &Path) -> Result<Vec<FoundFile>, ScanError> {
    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let entries = std::fs::read_dir(&dir).map_err(|e| ScanError::io(&dir, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| ScanError::io(&dir, e))?;
            let file_type = entry.file_type().map_err(|e| ScanError::io(entry.path(), e))?;
            let path = entry.path();

            if file_type.is_dir() {
                let skipped = entry
                    .file_name()
                    .to_str()
                    .map(|name| SKIPPED_DIRS.contains(&name))
                    .unwrap_or(false);
                if !skipped {
                    pending.push(path);
                }
            } else if file_type.is_file() {
                let relative = path
                    .strip_prefix(root)
                    .unwrap_or(&path)
                    .to_string_lossy()
                    .into_owned();
                files.push(FoundFile { path, relative });
            }
        }
    }

    files.sort_by(|a, b| a.relative.cmp(&b.relative));
    Ok(files)
}

/// Stat and classify each file, advancing `progress` one file at a time
///
/// A file deleted since the walk still counts, with size 0.
fn tally_files(files: &[FoundFile], progress: &ScanProgress) -> Result<ScanSummary, ScanError> {
    progress.set_total(files.len() as u64)?;
    let mut summary = ScanSummary::default();
    for file in files {
        let size = match std::fs::symlink_metadata(&file.path) {
            Ok(metadata) => metadata.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0,
            Err(e) => return Err(ScanError::io(&file.path, e)),
        };
        summary.files_scanned += 1;
        summary.total_bytes += size;
        *summary
            .extensions
            .entry(extension_of(&file.relative))
            .or_insert(0) += 1;
        if is_manifest(&file.relative) {
            summary.manifests.push(file.relative.clone());
        }
        progress.advance(file.relative.clone())?;
    }
    Ok(summary)
}

fn extension_of(relative: &str) -> String {
    Path::new(relative)
        .extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

fn is_manifest(relative: &str) -> bool {
    Path::new(relative)
        .file_name()
        .and_then(|name| name.to_str())
        .map(|name| MANIFEST_NAMES.contains(&name))
        .unwrap_or(false)
}

#[async_trait]
impl ScanEngine for DirectoryScanEngine {
    async fn scan(
        &self,
        request: &ScanRequest,
        progress: &ScanProgress,
    ) -> Result<ScanSummary, ScanError> {
        let root = Self::resolve(&request.locator)?;

        // A local directory needs no clone
        progress.enter(Phase::Scanning)?;
        let walk_progress = progress.clone();
        let summary = tokio::task::spawn_blocking(move || {
            let files = collect_files(&root)?;
            tally_files(&files, &walk_progress)
        })
        .await
        .map_err(|e| ScanError::Engine(format!("Directory walk panicked: {}", e)))??;

        progress.enter(Phase::Analyzing)?;
        log::info!(
            "Scanned {} ({} files, {} manifests)",
            request.name,
            summary.files_scanned,
            summary.manifests.len()
        );
        Ok(summary)
    }
}
