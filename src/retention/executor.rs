use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

use super::observer::RetentionObserver;
use super::types::{DeleteFailure, Eviction, FailureKind, PruneFailure};

#[derive(Debug, Default)]
pub(crate) struct ExecutionOutcome {
    pub removed: Vec<Eviction>,
    pub failures: Vec<DeleteFailure>,
    pub pruned_dirs: Vec<PathBuf>,
    pub prune_failures: Vec<PruneFailure>,
    pub cancelled: bool,
}

/// Reports (dry run) or deletes every eviction, then prunes empty
/// directories under `root`. Single-file failures never stop the pass.
pub(crate) fn execute(
    root: &Path,
    evictions: Vec<Eviction>,
    dry_run: bool,
    cancel: Option<&CancellationToken>,
    observer: &dyn RetentionObserver,
) -> ExecutionOutcome {
    let mut outcome = ExecutionOutcome::default();

    if dry_run {
        for eviction in &evictions {
            observer.on_eviction(eviction, true);
        }
        outcome.removed = evictions;
        return outcome;
    }

    for eviction in evictions {
        if cancel.map_or(false, |c| c.is_cancelled()) {
            outcome.cancelled = true;
            break;
        }
        observer.on_eviction(&eviction, false);
        match fs::remove_file(&eviction.file.path) {
            Ok(()) => outcome.removed.push(eviction),
            Err(e) => {
                let failure = DeleteFailure {
                    kind: FailureKind::from(e.kind()),
                    message: e.to_string(),
                    eviction,
                };
                observer.on_delete_failure(&failure);
                outcome.failures.push(failure);
            }
        }
    }

    let (pruned, prune_failures) = prune_empty_dirs_with(root, observer);
    outcome.pruned_dirs = pruned;
    outcome.prune_failures = prune_failures;
    outcome
}

/// Removes every directory under (never equal to) `root` that is empty,
/// deepest first, so parents emptied by the removal of their children go too.
/// Returns removed directories in removal order plus non-fatal failures.
pub fn prune_empty_dirs(root: &Path) -> (Vec<PathBuf>, Vec<PruneFailure>) {
    prune_empty_dirs_with(root, &super::observer::LogObserver)
}

pub(crate) fn prune_empty_dirs_with(
    root: &Path,
    observer: &dyn RetentionObserver,
) -> (Vec<PathBuf>, Vec<PruneFailure>) {
    let mut failures = Vec::new();
    let mut dirs: Vec<(usize, PathBuf)> = Vec::new();

    for entry in WalkDir::new(root)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
    {
        match entry {
            Ok(entry) if entry.file_type().is_dir() => {
                dirs.push((entry.depth(), entry.into_path()));
            }
            Ok(_) => {}
            Err(err) => {
                if err.io_error().map(|e| e.kind()) == Some(ErrorKind::NotFound) {
                    continue;
                }
                let failure = PruneFailure {
                    path: err
                        .path()
                        .map(Path::to_path_buf)
                        .unwrap_or_else(|| root.to_path_buf()),
                    message: err.to_string(),
                };
                observer.on_prune_failure(&failure);
                failures.push(failure);
            }
        }
    }

    // Stable sort keeps name order within one depth.
    dirs.sort_by(|a, b| b.0.cmp(&a.0));

    let mut pruned = Vec::new();
    for (_, dir) in dirs {
        match is_empty_dir(&dir) {
            Ok(false) => continue,
            Ok(true) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => continue,
            Err(e) => {
                let failure = PruneFailure {
                    path: dir,
                    message: e.to_string(),
                };
                observer.on_prune_failure(&failure);
                failures.push(failure);
                continue;
            }
        }
        match fs::remove_dir(&dir) {
            Ok(()) => {
                observer.on_dir_pruned(&dir);
                pruned.push(dir);
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                // A writer may have dropped a file in since the emptiness check.
                let failure = PruneFailure {
                    path: dir,
                    message: e.to_string(),
                };
                observer.on_prune_failure(&failure);
                failures.push(failure);
            }
        }
    }

    (pruned, failures)
}

fn is_empty_dir(dir: &Path) -> std::io::Result<bool> {
    Ok(fs::read_dir(dir)?.next().is_none())
}
