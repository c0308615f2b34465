use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::retention::{CleanUpRequest, PassReport, RetentionEngine, RetentionError};

/// Supplies patterns for paths that must survive the next pass, e.g. outputs
/// of jobs the transaction tracker still marks as in flight.
pub trait ProtectionSource: Send + Sync {
    fn protected_patterns(&self) -> Vec<String>;
}

/// Protects nothing beyond the stored policy.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProtection;

impl ProtectionSource for NoProtection {
    fn protected_patterns(&self) -> Vec<String> {
        Vec::new()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PassStatus {
    Completed,
    Canceled,
    Failed,
}

/// Outcome of the most recent scheduled pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassSummary {
    pub pass_id: Option<Uuid>,
    pub finished_at: DateTime<Utc>,
    pub status: PassStatus,
    pub removed_files: usize,
    pub removed_bytes: u64,
    pub failures: usize,
    pub details: Option<String>,
}

/// Runs retention passes periodically on a blocking worker, one at a time.
#[derive(Clone)]
pub struct RetentionScheduler {
    engine: Arc<RetentionEngine>,
    protection: Arc<dyn ProtectionSource>,
    period: Duration,
    dry_run: bool,
    // Single permit: passes over one root never overlap.
    pass_sem: Arc<Semaphore>,
    last: Arc<Mutex<Option<PassSummary>>>,
}

impl RetentionScheduler {
    pub fn new(engine: Arc<RetentionEngine>, period: Duration) -> Self {
        RetentionScheduler {
            engine,
            protection: Arc::new(NoProtection),
            period,
            dry_run: false,
            pass_sem: Arc::new(Semaphore::new(1)),
            last: Arc::new(Mutex::new(None)),
        }
    }

    pub fn with_protection(mut self, protection: Arc<dyn ProtectionSource>) -> Self {
        self.protection = protection;
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn last_summary(&self) -> Option<PassSummary> {
        self.last.lock().ok().and_then(|guard| guard.clone())
    }

    /// Runs one pass now. Fails with `PassInProgress` instead of queueing
    /// behind a running pass.
    pub async fn run_once(&self, cancel: &CancellationToken) -> Result<PassReport, RetentionError> {
        let root = self.engine.policy().root().to_path_buf();
        let _permit = self
            .pass_sem
            .clone()
            .try_acquire_owned()
            .map_err(|_| RetentionError::PassInProgress(root))?;

        let request = CleanUpRequest {
            dry_run: self.dry_run,
            extra_whitelist: self.protection.protected_patterns(),
            extra_blacklist: Vec::new(),
        };
        let engine = self.engine.clone();
        let token = cancel.clone();
        let result = tokio::task::spawn_blocking(move || engine.clean_up_with(&request, &token))
            .await
            .map_err(|join_err| RetentionError::Worker(join_err.to_string()))
            .and_then(|r| r);

        self.record(&result);
        result
    }

    /// Runs a pass every period until `cancel` fires. Pass errors are logged
    /// and retried on the next tick.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("retention scheduler for {} stopped", self.engine.policy().root().display());
                    return;
                }
                _ = ticker.tick() => {
                    if let Err(err) = self.run_once(&cancel).await {
                        warn!("retention pass failed: {}", err);
                    }
                }
            }
        }
    }

    fn record(&self, result: &Result<PassReport, RetentionError>) {
        let summary = match result {
            Ok(report) => PassSummary {
                pass_id: Some(report.pass_id),
                finished_at: report.finished_at,
                status: if report.cancelled {
                    PassStatus::Canceled
                } else {
                    PassStatus::Completed
                },
                removed_files: report.removed.len(),
                removed_bytes: report.removed_bytes(),
                failures: report.failures.len(),
                details: None,
            },
            Err(RetentionError::PassInProgress(_)) => return,
            Err(err) => PassSummary {
                pass_id: None,
                finished_at: Utc::now(),
                status: if matches!(err, RetentionError::Cancelled) {
                    PassStatus::Canceled
                } else {
                    PassStatus::Failed
                },
                removed_files: 0,
                removed_bytes: 0,
                failures: 0,
                details: Some(err.to_string()),
            },
        };
        if let Ok(mut guard) = self.last.lock() {
            *guard = Some(summary);
        }
    }
}
