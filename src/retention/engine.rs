use std::sync::Arc;

use bytesize::ByteSize;
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::RetentionConfig;

use super::age::reclaim_by_age;
use super::error::{ConfigError, RetentionError};
use super::executor::execute;
use super::filter::{classify, oldest_first, PassOverrides, Verdict};
use super::group::GroupResolver;
use super::observer::{LogObserver, RetentionObserver};
use super::policy::RetentionPolicy;
use super::scanner::scan;
use super::size::reclaim_by_size;
use super::types::{Eviction, EvictionDecision, FileRecord, PassPhase, PassReport};

/// Arguments of one retention pass.
#[derive(Debug, Clone, Default)]
pub struct CleanUpRequest {
    pub dry_run: bool,
    /// Protected for this pass only, e.g. outputs of jobs still in flight.
    pub extra_whitelist: Vec<String>,
    /// Merged into the blacklist for this pass only.
    pub extra_blacklist: Vec<String>,
}

impl CleanUpRequest {
    pub fn dry_run() -> Self {
        CleanUpRequest {
            dry_run: true,
            ..Self::default()
        }
    }

    pub fn live() -> Self {
        Self::default()
    }
}

/// Keeps one directory tree within its retention policy.
///
/// Stateless between passes: every call rescans and recomputes. The caller
/// must not run overlapping passes over the same root.
pub struct RetentionEngine {
    policy: RetentionPolicy,
    observer: Arc<dyn RetentionObserver>,
}

impl RetentionEngine {
    pub fn new(config: &RetentionConfig) -> Result<Self, ConfigError> {
        Self::with_observer(config, Arc::new(LogObserver))
    }

    pub fn with_observer(
        config: &RetentionConfig,
        observer: Arc<dyn RetentionObserver>,
    ) -> Result<Self, ConfigError> {
        let policy = RetentionPolicy::from_config(config)?;
        Ok(Self::from_policy(policy, observer))
    }

    pub fn from_policy(policy: RetentionPolicy, observer: Arc<dyn RetentionObserver>) -> Self {
        for warning in policy.warnings() {
            observer.on_policy_warning(warning);
        }
        RetentionEngine { policy, observer }
    }

    pub fn policy(&self) -> &RetentionPolicy {
        &self.policy
    }

    /// Runs one pass. `extra_*` lists apply to this call only.
    pub fn clean_up(
        &self,
        dry_run: bool,
        extra_whitelist: &[String],
        extra_blacklist: &[String],
    ) -> Result<PassReport, RetentionError> {
        let request = CleanUpRequest {
            dry_run,
            extra_whitelist: extra_whitelist.to_vec(),
            extra_blacklist: extra_blacklist.to_vec(),
        };
        self.clean_up_with(&request, &CancellationToken::new())
    }

    /// Runs one pass, checking `cancel` between phases and between deletions.
    pub fn clean_up_with(
        &self,
        request: &CleanUpRequest,
        cancel: &CancellationToken,
    ) -> Result<PassReport, RetentionError> {
        let pass_id = Uuid::new_v4();
        let started_at = Utc::now();
        let root = self.policy.root();
        let overrides =
            PassOverrides::compile(&self.policy, &request.extra_whitelist, &request.extra_blacklist)?;

        if cancel.is_cancelled() {
            return Err(RetentionError::Cancelled);
        }
        self.observer.on_phase(pass_id, PassPhase::Scanning);
        let snapshot = scan(root, started_at, Some(cancel))?;
        for warning in &snapshot.warnings {
            self.observer.on_scan_warning(warning);
        }
        if cancel.is_cancelled() {
            return Err(RetentionError::Cancelled);
        }

        let decision = self.plan_pass(pass_id, snapshot.files, &overrides);
        if cancel.is_cancelled() {
            return Err(RetentionError::Cancelled);
        }

        self.observer.on_phase(pass_id, PassPhase::Execute);
        let outcome = execute(
            root,
            decision.evictions,
            request.dry_run,
            Some(cancel),
            self.observer.as_ref(),
        );
        self.observer.on_phase(pass_id, PassPhase::Idle);

        if decision.hard_limit_met == Some(false) {
            self.observer.on_policy_warning(&format!(
                "hard size limit on {} not reached: {} of eligible data remains",
                root.display(),
                ByteSize(decision.eligible_bytes_after)
            ));
        }

        let report = PassReport {
            pass_id,
            root: root.to_path_buf(),
            dry_run: request.dry_run,
            started_at,
            finished_at: Utc::now(),
            scanned_files: decision.scanned_files,
            eligible_files: decision.eligible_files,
            protected_files: decision.protected_files,
            eligible_bytes_before: decision.eligible_bytes_before,
            eligible_bytes_after: decision.eligible_bytes_after,
            size_goal_met: decision.size_goal_met,
            hard_limit_met: decision.hard_limit_met,
            held_groups: decision.held_groups,
            removed: outcome.removed,
            failures: outcome.failures,
            pruned_dirs: outcome.pruned_dirs,
            prune_failures: outcome.prune_failures,
            scan_warnings: snapshot.warnings,
            cancelled: outcome.cancelled,
        };
        self.observer.on_pass_finished(&report);
        Ok(report)
    }

    /// Computes the eviction decision for an in-memory snapshot without
    /// touching the filesystem.
    pub fn plan(&self, records: Vec<FileRecord>, overrides: &PassOverrides) -> EvictionDecision {
        self.plan_pass(Uuid::new_v4(), records, overrides)
    }

    fn plan_pass(
        &self,
        pass_id: Uuid,
        records: Vec<FileRecord>,
        overrides: &PassOverrides,
    ) -> EvictionDecision {
        let observer = self.observer.as_ref();

        observer.on_phase(pass_id, PassPhase::Filtering);
        let files = classify(records, &self.policy, overrides);
        let mut eligible_files = 0usize;
        let mut eligible_bytes_before = 0u64;
        for file in &files {
            match file.verdict {
                Verdict::Eligible => {
                    eligible_files += 1;
                    eligible_bytes_before += file.record.size_bytes;
                }
                Verdict::Protected(reason) => observer.on_protected(&file.record, reason),
            }
        }
        let order = oldest_first(&files);
        let resolver = GroupResolver::build(&files, &order);

        observer.on_phase(pass_id, PassPhase::AgeReclaim);
        let by_age = reclaim_by_age(
            &files,
            &order,
            self.policy.max_age_seconds(),
            &resolver,
            observer,
        );

        observer.on_phase(pass_id, PassPhase::SizeReclaim);
        let by_size = reclaim_by_size(
            &files,
            &order,
            &resolver,
            &by_age.scheduled,
            &by_age.held,
            self.policy.size_limit(),
            self.policy.priority_tiers().len(),
            observer,
        );

        let evictions: Vec<Eviction> = by_age
            .selected
            .iter()
            .chain(by_size.selected.iter())
            .map(|(idx, reason)| Eviction {
                file: files[*idx].record.clone(),
                reason: reason.clone(),
            })
            .collect();

        EvictionDecision {
            evictions,
            scanned_files: files.len(),
            eligible_files,
            protected_files: files.len() - eligible_files,
            eligible_bytes_before,
            eligible_bytes_after: by_size.eligible_bytes.saturating_sub(by_size.removed_bytes),
            size_goal_met: by_size.goal_met,
            hard_limit_met: by_size.hard_limit_met,
            held_groups: by_age.held_groups + by_size.held_groups,
        }
    }
}
