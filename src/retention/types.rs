use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One regular file captured by a scan. Immutable for the rest of the pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub path: PathBuf,
    pub modified: DateTime<Utc>,
    pub age_seconds: i64,
    pub size_bytes: u64,
}

impl FileRecord {
    pub fn new(path: PathBuf, modified: DateTime<Utc>, size_bytes: u64, now: DateTime<Utc>) -> Self {
        // Future timestamps (clock skew, copied files) count as brand new.
        let age_seconds = now.signed_duration_since(modified).num_seconds().max(0);
        FileRecord {
            path,
            modified,
            age_seconds,
            size_bytes,
        }
    }

    /// Builds a record whose modification time lies `age_seconds` before `now`.
    pub fn aged(
        path: impl Into<PathBuf>,
        age_seconds: i64,
        size_bytes: u64,
        now: DateTime<Utc>,
    ) -> Self {
        let modified = now - ChronoDuration::seconds(age_seconds);
        FileRecord::new(path.into(), modified, size_bytes, now)
    }

    pub fn parent(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new(""))
    }
}

/// Why a file was selected for eviction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EvictionReason {
    /// Older than `max_age_seconds`.
    Age,
    /// Selected under size pressure; `tier` is the sacrifice tier that
    /// admitted it, `None` when no tiers are configured.
    Size { tier: Option<usize> },
    /// Pulled in because a sibling matching the same group pattern was selected.
    Group { trigger: PathBuf },
}

impl std::fmt::Display for EvictionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EvictionReason::Age => write!(f, "age"),
            EvictionReason::Size { tier: None } => write!(f, "size"),
            EvictionReason::Size { tier: Some(t) } => write!(f, "size-tier-{}", t),
            EvictionReason::Group { trigger } => write!(f, "group-of({})", trigger.display()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Eviction {
    pub file: FileRecord,
    pub reason: EvictionReason,
}

/// Why a file is not a deletion candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtectionReason {
    /// Younger than `min_age_seconds`.
    TooYoung,
    /// Matches a whitelist pattern.
    Whitelisted,
    /// Matches a pattern supplied by the caller for this pass only.
    InUse,
    /// A blacklist is configured and the file matches none of it.
    NotBlacklisted,
    /// Neither list is configured and no priority tier claims the file.
    Unclaimed,
}

impl std::fmt::Display for ProtectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ProtectionReason::TooYoung => "younger than min age",
            ProtectionReason::Whitelisted => "whitelisted",
            ProtectionReason::InUse => "in use",
            ProtectionReason::NotBlacklisted => "not blacklisted",
            ProtectionReason::Unclaimed => "not claimed by any rule",
        };
        f.write_str(s)
    }
}

/// Result of the decision stages for one snapshot. Not persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EvictionDecision {
    pub evictions: Vec<Eviction>,
    pub scanned_files: usize,
    pub eligible_files: usize,
    pub protected_files: usize,
    pub eligible_bytes_before: u64,
    pub eligible_bytes_after: u64,
    /// `None` when no size limit applies.
    pub size_goal_met: Option<bool>,
    /// `None` when no hard floor is configured.
    pub hard_limit_met: Option<bool>,
    pub held_groups: usize,
}

impl EvictionDecision {
    pub fn paths(&self) -> Vec<&Path> {
        self.evictions.iter().map(|e| e.file.path.as_path()).collect()
    }

    pub fn total_bytes(&self) -> u64 {
        self.evictions.iter().map(|e| e.file.size_bytes).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassPhase {
    Idle,
    Scanning,
    Filtering,
    AgeReclaim,
    SizeReclaim,
    Execute,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanWarning {
    pub path: PathBuf,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Vanished,
    PermissionDenied,
    Other,
}

impl From<std::io::ErrorKind> for FailureKind {
    fn from(kind: std::io::ErrorKind) -> Self {
        match kind {
            std::io::ErrorKind::NotFound => FailureKind::Vanished,
            std::io::ErrorKind::PermissionDenied => FailureKind::PermissionDenied,
            _ => FailureKind::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeleteFailure {
    pub eviction: Eviction,
    pub kind: FailureKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PruneFailure {
    pub path: PathBuf,
    pub message: String,
}

/// Everything one `clean_up` call did (or would do, for a dry run).
#[derive(Debug, Clone, Serialize)]
pub struct PassReport {
    pub pass_id: Uuid,
    pub root: PathBuf,
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub scanned_files: usize,
    pub eligible_files: usize,
    pub protected_files: usize,
    pub eligible_bytes_before: u64,
    pub eligible_bytes_after: u64,
    pub size_goal_met: Option<bool>,
    pub hard_limit_met: Option<bool>,
    /// Groups left untouched because a member is protected.
    pub held_groups: usize,
    pub removed: Vec<Eviction>,
    pub failures: Vec<DeleteFailure>,
    pub pruned_dirs: Vec<PathBuf>,
    pub prune_failures: Vec<PruneFailure>,
    pub scan_warnings: Vec<ScanWarning>,
    pub cancelled: bool,
}

impl PassReport {
    pub fn removed_bytes(&self) -> u64 {
        self.removed.iter().map(|e| e.file.size_bytes).sum()
    }

    pub fn removed_paths(&self) -> Vec<&Path> {
        self.removed.iter().map(|e| e.file.path.as_path()).collect()
    }
}
