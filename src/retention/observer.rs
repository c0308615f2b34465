use std::path::Path;

use bytesize::ByteSize;
use log::{debug, info, warn};
use uuid::Uuid;

use super::types::{
    DeleteFailure, Eviction, FileRecord, PassPhase, PassReport, ProtectionReason, PruneFailure,
    ScanWarning,
};

/// Receives every decision and failure of a retention pass.
///
/// Injected at engine construction; all methods default to no-ops so an
/// observer only implements what it cares about.
pub trait RetentionObserver: Send + Sync {
    fn on_phase(&self, _pass_id: Uuid, _phase: PassPhase) {}

    fn on_policy_warning(&self, _message: &str) {}

    fn on_scan_warning(&self, _warning: &ScanWarning) {}

    fn on_protected(&self, _file: &FileRecord, _reason: ProtectionReason) {}

    fn on_eviction(&self, _eviction: &Eviction, _dry_run: bool) {}

    /// A group was left untouched because `blocker` is protected.
    fn on_group_held(&self, _trigger: &FileRecord, _blocker: &FileRecord, _reason: ProtectionReason) {}

    fn on_delete_failure(&self, _failure: &DeleteFailure) {}

    fn on_dir_pruned(&self, _dir: &Path) {}

    fn on_prune_failure(&self, _failure: &PruneFailure) {}

    fn on_pass_finished(&self, _report: &PassReport) {}
}

/// Forwards everything to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl RetentionObserver for LogObserver {
    fn on_phase(&self, pass_id: Uuid, phase: PassPhase) {
        debug!("pass {} entering {:?}", pass_id, phase);
    }

    fn on_policy_warning(&self, message: &str) {
        warn!("{}", message);
    }

    fn on_scan_warning(&self, warning: &ScanWarning) {
        warn!("skipping {}: {}", warning.path.display(), warning.message);
    }

    fn on_protected(&self, file: &FileRecord, reason: ProtectionReason) {
        debug!(
            "keeping {} ({}, age {}s, {})",
            file.path.display(),
            reason,
            file.age_seconds,
            ByteSize(file.size_bytes)
        );
    }

    fn on_eviction(&self, eviction: &Eviction, dry_run: bool) {
        let file = &eviction.file;
        if dry_run {
            info!(
                "(dry-run) would remove {} [{}] age {}s, {}",
                file.path.display(),
                eviction.reason,
                file.age_seconds,
                ByteSize(file.size_bytes)
            );
        } else {
            info!(
                "removing {} [{}] age {}s, {}",
                file.path.display(),
                eviction.reason,
                file.age_seconds,
                ByteSize(file.size_bytes)
            );
        }
    }

    fn on_group_held(&self, trigger: &FileRecord, blocker: &FileRecord, reason: ProtectionReason) {
        info!(
            "holding back group of {}: member {} is protected ({})",
            trigger.path.display(),
            blocker.path.display(),
            reason
        );
    }

    fn on_delete_failure(&self, failure: &DeleteFailure) {
        warn!(
            "failed to remove {} ({}, {:?}): {}",
            failure.eviction.file.path.display(),
            ByteSize(failure.eviction.file.size_bytes),
            failure.kind,
            failure.message
        );
    }

    fn on_dir_pruned(&self, dir: &Path) {
        debug!("removed empty directory {}", dir.display());
    }

    fn on_prune_failure(&self, failure: &PruneFailure) {
        warn!(
            "could not remove directory {}: {}",
            failure.path.display(),
            failure.message
        );
    }

    fn on_pass_finished(&self, report: &PassReport) {
        let prefix = if report.dry_run { "(dry-run) " } else { "" };
        info!(
            "{}pass {} on {}: {} of {} files selected ({}), {} groups held, {} failures, {} dirs pruned",
            prefix,
            report.pass_id,
            report.root.display(),
            report.removed.len(),
            report.scanned_files,
            ByteSize(report.removed_bytes()),
            report.held_groups,
            report.failures.len(),
            report.pruned_dirs.len()
        );
    }
}
