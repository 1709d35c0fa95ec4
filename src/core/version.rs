//! Build metadata accessors.
//! Includes the version.rs generated by the build script so the status schema
//! version, build time and git hash have a single source of truth.

include!(concat!(env!("OUT_DIR"), "/version.rs"));

/// Schema version stamped into every `master.json`.
/// Falls back to 0 if the build script could not read the manifest metadata.
pub fn status_schema_version() -> u32 {
    STATUS_SCHEMA_VERSION.parse().unwrap_or(0)
}

/// Build time string from the build script (UTC)
pub fn build_time() -> &'static str {
    BUILD_TIME
}

/// Short git hash captured by the build script
pub fn git_hash() -> &'static str {
    GIT_HASH
}

/// Long version line for `--version` style output
pub fn long_version() -> String {
    format!(
        "{} (schema {}, built {}, git {})",
        env!("CARGO_PKG_VERSION"),
        status_schema_version(),
        build_time(),
        git_hash()
    )
}
