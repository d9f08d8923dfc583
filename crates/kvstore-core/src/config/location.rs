//! Storage location for the process-wide shared handle
//!
//! Resolution order for the directory:
//! 1. `KVSTORE_DIR` environment variable
//! 2. `<home>/.cache/kvstore`
//! 3. `/tmp/kvstore`
//!
//! The file name is derived from the running program, so two binaries using
//! the shared handle never share a database file by accident.

use std::path::{Path, PathBuf};

/// Environment variable overriding the cache directory
pub const DIR_ENV: &str = "KVSTORE_DIR";

const CACHE_SUBDIR: &str = ".cache/kvstore";
const FALLBACK_DIR: &str = "/tmp/kvstore";
const FALLBACK_STEM: &str = "kvstore";

/// Resolve the directory holding shared database files
pub fn cache_dir() -> PathBuf {
    resolve_dir(std::env::var_os(DIR_ENV).map(PathBuf::from), dirs::home_dir())
}

/// Full path of the shared database file for the running program
pub fn shared_db_path() -> PathBuf {
    let stem = std::env::current_exe()
        .ok()
        .as_deref()
        .and_then(program_stem)
        .unwrap_or_else(|| FALLBACK_STEM.to_string());
    cache_dir().join(format!("{}.db", stem))
}

fn resolve_dir(env_override: Option<PathBuf>, home: Option<PathBuf>) -> PathBuf {
    if let Some(dir) = env_override.filter(|d| !d.as_os_str().is_empty()) {
        return dir;
    }
    match home {
        Some(home) => home.join(CACHE_SUBDIR),
        None => PathBuf::from(FALLBACK_DIR),
    }
}

fn program_stem(exe: &Path) -> Option<String> {
    exe.file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
