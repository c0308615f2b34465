use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
#[cfg(feature = "parallel-scan")]
use rayon::prelude::*;
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

use super::error::RetentionError;
use super::types::{FileRecord, ScanWarning};

/// Every regular file under a root at one instant.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub root: PathBuf,
    pub captured_at: DateTime<Utc>,
    pub files: Vec<FileRecord>,
    pub warnings: Vec<ScanWarning>,
}

impl Snapshot {
    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.size_bytes).sum()
    }
}

/// Walks `root` and records (path, age, size) for every regular file.
///
/// Directories and symlinks are never reported. A file or subdirectory that
/// disappears mid-walk becomes a warning; any other walk failure aborts the
/// scan since a partial tree must not drive deletions.
pub fn scan(
    root: &Path,
    now: DateTime<Utc>,
    cancel: Option<&CancellationToken>,
) -> Result<Snapshot, RetentionError> {
    let mut paths = Vec::new();
    let mut warnings = Vec::new();

    // walkdir keeps its own stack of open directories, so depth is not
    // bounded by the call stack.
    for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
        if cancel.map_or(false, |c| c.is_cancelled()) {
            return Err(RetentionError::Cancelled);
        }
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                let vanished = err.depth() > 0
                    && err.io_error().map(|e| e.kind()) == Some(ErrorKind::NotFound);
                if vanished {
                    warnings.push(ScanWarning {
                        path: err.path().map(Path::to_path_buf).unwrap_or_default(),
                        message: "vanished during scan".to_string(),
                    });
                    continue;
                }
                return Err(RetentionError::Scan {
                    path: err
                        .path()
                        .map(Path::to_path_buf)
                        .unwrap_or_else(|| root.to_path_buf()),
                    source: err,
                });
            }
        };
        if entry.file_type().is_file() {
            paths.push(entry.into_path());
        }
    }

    #[cfg(feature = "parallel-scan")]
    let stats: Vec<Result<FileRecord, ScanWarning>> =
        paths.into_par_iter().map(|p| stat_file(p, now)).collect();
    #[cfg(not(feature = "parallel-scan"))]
    let stats: Vec<Result<FileRecord, ScanWarning>> =
        paths.into_iter().map(|p| stat_file(p, now)).collect();

    let mut files = Vec::with_capacity(stats.len());
    for stat in stats {
        match stat {
            Ok(record) => files.push(record),
            Err(warning) => warnings.push(warning),
        }
    }

    Ok(Snapshot {
        root: root.to_path_buf(),
        captured_at: now,
        files,
        warnings,
    })
}

pub(crate) fn stat_file(path: PathBuf, now: DateTime<Utc>) -> Result<FileRecord, ScanWarning> {
    let metadata = match fs::symlink_metadata(&path) {
        Ok(m) => m,
        Err(e) => {
            let message = if e.kind() == ErrorKind::NotFound {
                "vanished before it could be inspected".to_string()
            } else {
                format!("metadata unavailable: {}", e)
            };
            return Err(ScanWarning { path, message });
        }
    };
    if !metadata.is_file() {
        return Err(ScanWarning {
            path,
            message: "no longer a regular file".to_string(),
        });
    }
    let modified = match metadata.modified() {
        Ok(t) => DateTime::<Utc>::from(t),
        Err(e) => {
            return Err(ScanWarning {
                path,
                message: format!("modification time unavailable: {}", e),
            })
        }
    };
    Ok(FileRecord::new(path, modified, metadata.len(), now))
}
