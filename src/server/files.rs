//! Discovery of Parquet inputs under the configured data directory.

use crate::error::ServerResult;
use chrono::{DateTime, SecondsFormat, Utc};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::SystemTime;
use tracing::warn;

/// Files offered for loading
static PARQUET_FILE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\.parquet$").expect("Invalid parquet file regex"));

/// Metadata about a discovered input file
#[derive(Debug, Clone, serde::Serialize)]
pub struct InputFile {
    pub name: String,
    /// Canonical absolute path
    pub path: String,
    /// Path relative to the scanned directory
    pub relative_path: String,
    pub size: u64,
    /// Last modification, RFC 3339 UTC
    pub modified: String,
    #[serde(skip)]
    pub modified_at: SystemTime,
}

pub fn is_parquet_file(name: &str) -> bool {
    PARQUET_FILE_REGEX.is_match(name)
}

/// Recursively list Parquet files under `directory`, newest first.
///
/// A missing directory yields an empty list. Unreadable subdirectories
/// are skipped with a warning.
pub fn list_inputs(directory: &Path) -> ServerResult<Vec<InputFile>> {
    if !directory.is_dir() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    let mut pending: Vec<PathBuf> = vec![directory.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if dir.as_path() == directory => return Err(e.into()),
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "skipping unreadable directory");
                continue;
            }
        };

        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            let file_type = entry.file_type()?;

            // Symlinked directories are not followed
            if file_type.is_dir() {
                pending.push(path);
                continue;
            }

            let name = entry.file_name().to_string_lossy().to_string();
            if !is_parquet_file(&name) {
                continue;
            }

            let metadata = match std::fs::metadata(&path) {
                Ok(m) if m.is_file() => m,
                Ok(_) => continue,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable file");
                    continue;
                }
            };

            let modified_at = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            let relative_path = path
                .strip_prefix(directory)
                .unwrap_or(&path)
                .to_string_lossy()
                .to_string();
            let canonical = std::fs::canonicalize(&path).unwrap_or_else(|_| path.clone());

            files.push(InputFile {
                name,
                path: canonical.to_string_lossy().to_string(),
                relative_path,
                size: metadata.len(),
                modified: DateTime::<Utc>::from(modified_at)
                    .to_rfc3339_opts(SecondsFormat::Secs, true),
                modified_at,
            });
        }
    }

    // Stable: equal timestamps keep enumeration order
    files.sort_by(|a, b| b.modified_at.cmp(&a.modified_at));
    Ok(files)
}
