use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use artifact_retention::{
    load_config_from_env, prune_empty_dirs, scan, ByteValue, CleanUpRequest, ConfigError, Eviction,
    EvictionReason, FailureKind, ProtectionSource, RetentionConfig, RetentionEngine,
    RetentionError, RetentionObserver, RetentionScheduler, SizeLimitSetting, CONFIG_ENV_VAR,
};
use chrono::Utc;
use lazy_static::lazy_static;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

lazy_static! {
    static ref TEST_ENV_GUARD: Mutex<()> = Mutex::new(());
}

struct ArtifactTree {
    dir: TempDir,
}

impl ArtifactTree {
    fn new() -> Self {
        ArtifactTree {
            dir: TempDir::new().expect("temp root"),
        }
    }

    fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Creates `relative` with `size` bytes, last modified `age_secs` ago.
    fn create_file(&self, relative: &str, size: usize, age_secs: u64) -> PathBuf {
        let path = self.root().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent");
        }
        let mut file = fs::File::create(&path).expect("create file");
        if size > 0 {
            file.write_all(&vec![0u8; size]).expect("write file");
        }
        let modified = SystemTime::now() - Duration::from_secs(age_secs);
        file.set_modified(modified).expect("set mtime");
        drop(file);
        path
    }

    fn config(&self) -> RetentionConfig {
        let mut config = RetentionConfig::new(self.root());
        config.blacklist = vec!["*".to_string()];
        config
    }
}

fn removed_names(removed: &[Eviction]) -> Vec<String> {
    removed
        .iter()
        .map(|e| e.file.path.file_name().unwrap().to_string_lossy().to_string())
        .collect()
}

#[test]
fn scan_reports_only_regular_files() {
    let tree = ArtifactTree::new();
    tree.create_file("job-1/a.dcm", 10, 100);
    tree.create_file("job-1/nested/deeper/b.nii", 20, 50);
    fs::create_dir_all(tree.root().join("job-2/empty")).unwrap();

    let snapshot = scan(tree.root(), Utc::now(), None).expect("scan");
    assert_eq!(snapshot.files.len(), 2);
    assert!(snapshot.warnings.is_empty());
    assert_eq!(snapshot.total_bytes(), 30);
    let old = snapshot
        .files
        .iter()
        .find(|f| f.path.ends_with("a.dcm"))
        .unwrap();
    assert!(old.age_seconds >= 99 && old.age_seconds <= 110, "{:?}", old);
}

#[test]
fn scan_of_missing_root_is_fatal() {
    let tree = ArtifactTree::new();
    let missing = tree.root().join("nope");
    let err = scan(&missing, Utc::now(), None).unwrap_err();
    assert!(matches!(err, RetentionError::Scan { .. }));

    let engine = RetentionEngine::new(&{
        let mut config = RetentionConfig::new(&missing);
        config.blacklist = vec!["*".into()];
        config.max_age_seconds = 10;
        config
    })
    .unwrap();
    assert!(matches!(
        engine.clean_up(false, &[], &[]),
        Err(RetentionError::Scan { .. })
    ));
}

#[test]
fn age_pass_deletes_old_files_and_prunes_empty_dirs() {
    let tree = ArtifactTree::new();
    let old_a = tree.create_file("job-1/series/a.dcm", 10, 3_600);
    let old_b = tree.create_file("job-1/b.nii", 10, 3_600);
    let fresh = tree.create_file("job-2/c.nii", 10, 5);
    fs::create_dir_all(tree.root().join("job-3/never/used")).unwrap();

    let mut config = tree.config();
    config.max_age_seconds = 600;
    let engine = RetentionEngine::new(&config).unwrap();
    let report = engine.clean_up(false, &[], &[]).expect("pass");

    assert_eq!(report.removed.len(), 2);
    assert!(report.removed.iter().all(|e| e.reason == EvictionReason::Age));
    assert!(report.failures.is_empty());
    assert!(!old_a.exists());
    assert!(!old_b.exists());
    assert!(fresh.exists());

    assert!(!tree.root().join("job-1").exists());
    assert!(!tree.root().join("job-3").exists());
    assert!(tree.root().join("job-2").exists());
    assert!(tree.root().exists());
    assert!(report
        .pruned_dirs
        .iter()
        .any(|d| d.ends_with("job-3/never/used")));
}

#[test]
fn dry_run_changes_nothing_and_repeats_identically() {
    let tree = ArtifactTree::new();
    tree.create_file("job-1/a.dcm", 30, 15);
    tree.create_file("job-1/b.dcm", 10, 5);
    tree.create_file("job-2/c.dcm", 30, 11);
    tree.create_file("job-2/d.dcm", 30, 13);
    fs::create_dir_all(tree.root().join("empty")).unwrap();

    let mut config = tree.config();
    config.size_limit_bytes = SizeLimitSetting::Single(ByteValue::Bytes(50));
    let engine = RetentionEngine::new(&config).unwrap();

    let first = engine.clean_up(true, &[], &[]).expect("first dry run");
    let second = engine.clean_up(true, &[], &[]).expect("second dry run");

    assert!(first.dry_run);
    assert_eq!(removed_names(&first.removed), vec!["a.dcm", "d.dcm"]);
    assert_eq!(removed_names(&first.removed), removed_names(&second.removed));
    assert_eq!(first.removed_bytes(), 60);
    assert!(first.pruned_dirs.is_empty());
    assert!(tree.root().join("job-1/a.dcm").exists());
    assert!(tree.root().join("empty").exists());
    assert_ne!(first.pass_id, second.pass_id);
}

#[test]
fn size_pass_brings_eligible_total_under_limit() {
    let tree = ArtifactTree::new();
    for i in 0..20 {
        tree.create_file(&format!("job-{}/out.bin", i), 1_000, 100 + i * 10);
    }

    let mut config = tree.config();
    config.size_limit_bytes = SizeLimitSetting::Single(ByteValue::Human("8 KB".into()));
    let engine = RetentionEngine::new(&config).unwrap();
    let report = engine.clean_up(false, &[], &[]).expect("pass");

    assert_eq!(report.size_goal_met, Some(true));
    let after = scan(tree.root(), Utc::now(), None).unwrap();
    assert!(after.total_bytes() <= 8_000, "{} bytes left", after.total_bytes());
    // Oldest jobs went first.
    assert!(!tree.root().join("job-19").exists());
    assert!(tree.root().join("job-0/out.bin").exists());
}

#[test]
fn group_members_are_deleted_together() {
    let tree = ArtifactTree::new();
    tree.create_file("series/a.dcm", 10, 300);
    tree.create_file("series/b.dcm", 10, 100);
    tree.create_file("series/c.nii", 10, 200);

    let mut config = tree.config();
    config.group_patterns = vec!["*.dcm".into()];
    config.size_limit_bytes = SizeLimitSetting::Single(ByteValue::Bytes(25));
    let engine = RetentionEngine::new(&config).unwrap();
    let report = engine.clean_up(false, &[], &[]).expect("pass");

    assert_eq!(removed_names(&report.removed), vec!["a.dcm", "b.dcm"]);
    assert!(matches!(
        report.removed[1].reason,
        EvictionReason::Group { .. }
    ));
    assert!(tree.root().join("series/c.nii").exists());
}

#[test]
fn held_group_is_recorded_in_pass_report() {
    let tree = ArtifactTree::new();
    let old = tree.create_file("series/a.dcm", 10, 3_600);
    let young = tree.create_file("series/b.dcm", 10, 5);

    let mut config = tree.config();
    config.min_age_seconds = 60;
    config.max_age_seconds = 600;
    config.group_patterns = vec!["*.dcm".into()];
    let engine = RetentionEngine::new(&config).unwrap();
    let report = engine.clean_up(false, &[], &[]).expect("pass");

    assert!(report.removed.is_empty());
    assert_eq!(report.held_groups, 1);
    assert!(old.exists());
    assert!(young.exists());
    let json = serde_json::to_value(&report).expect("serialize report");
    assert_eq!(json["held_groups"], 1);
}

#[test]
fn whitelist_survives_any_pressure() {
    let tree = ArtifactTree::new();
    let keep = tree.create_file("job-1/result.keep", 500, 10_000);
    tree.create_file("job-1/scratch.bin", 10, 10_000);

    let mut config = RetentionConfig::new(tree.root());
    config.whitelist = vec!["*.keep".into()];
    config.max_age_seconds = 60;
    config.size_limit_bytes = SizeLimitSetting::Single(ByteValue::Bytes(1));
    let engine = RetentionEngine::new(&config).unwrap();
    let report = engine.clean_up(false, &[], &[]).expect("pass");

    assert_eq!(removed_names(&report.removed), vec!["scratch.bin"]);
    assert!(keep.exists());
    assert_eq!(report.protected_files, 1);
}

#[test]
fn extra_whitelist_protects_in_flight_jobs_for_one_call() {
    let tree = ArtifactTree::new();
    tree.create_file("job-1/a.nii", 10, 1_000);
    tree.create_file("job-2/b.nii", 10, 1_000);

    let mut config = tree.config();
    config.max_age_seconds = 60;
    let engine = RetentionEngine::new(&config).unwrap();

    let report = engine
        .clean_up(true, &["job-2/**".to_string()], &[])
        .expect("pass");
    assert_eq!(removed_names(&report.removed), vec!["a.nii"]);

    let report = engine.clean_up(true, &[], &[]).expect("pass");
    assert_eq!(removed_names(&report.removed), vec!["a.nii", "b.nii"]);
}

#[test]
fn extra_blacklist_is_rejected_for_whitelist_policies() {
    let tree = ArtifactTree::new();
    let mut config = RetentionConfig::new(tree.root());
    config.whitelist = vec!["*.keep".into()];
    config.max_age_seconds = 60;
    let engine = RetentionEngine::new(&config).unwrap();
    assert!(matches!(
        engine.clean_up(true, &[], &["*.bin".to_string()]),
        Err(RetentionError::Config(ConfigError::BothListsConfigured))
    ));
}

struct VanishingObserver;

impl RetentionObserver for VanishingObserver {
    fn on_eviction(&self, eviction: &Eviction, dry_run: bool) {
        if !dry_run && eviction.file.path.ends_with("racy.bin") {
            let _ = fs::remove_file(&eviction.file.path);
        }
    }
}

#[test]
fn vanished_file_is_recorded_and_pass_continues() {
    let tree = ArtifactTree::new();
    tree.create_file("job-1/racy.bin", 10, 1_000);
    let other = tree.create_file("job-1/stale.bin", 10, 900);

    let mut config = tree.config();
    config.max_age_seconds = 60;
    let engine = RetentionEngine::with_observer(&config, Arc::new(VanishingObserver)).unwrap();
    let report = engine.clean_up(false, &[], &[]).expect("pass");

    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].kind, FailureKind::Vanished);
    assert_eq!(removed_names(&report.removed), vec!["stale.bin"]);
    assert!(!other.exists());
    assert!(!tree.root().join("job-1").exists());
}

#[test]
fn cancelled_pass_touches_nothing() {
    let tree = ArtifactTree::new();
    let file = tree.create_file("job-1/a.bin", 10, 1_000);
    let mut config = tree.config();
    config.max_age_seconds = 60;
    let engine = RetentionEngine::new(&config).unwrap();

    let token = CancellationToken::new();
    token.cancel();
    let result = engine.clean_up_with(&CleanUpRequest::live(), &token);
    assert!(matches!(result, Err(RetentionError::Cancelled)));
    assert!(file.exists());
}

#[test]
fn prune_removes_deepest_directories_first() {
    let tree = ArtifactTree::new();
    fs::create_dir_all(tree.root().join("t1/t3")).unwrap();
    fs::create_dir_all(tree.root().join("t2")).unwrap();
    tree.create_file("t2/keep.bin", 1, 0);

    let (pruned, failures) = prune_empty_dirs(tree.root());
    assert!(failures.is_empty());
    assert_eq!(
        pruned,
        vec![tree.root().join("t1/t3"), tree.root().join("t1")]
    );
    assert!(tree.root().join("t2").exists());

    let (pruned, _) = prune_empty_dirs(tree.root());
    assert!(pruned.is_empty());
}

#[test]
fn config_loads_from_environment() {
    let _guard = TEST_ENV_GUARD.lock().expect("env guard");
    let tree = ArtifactTree::new();
    let config_path = tree.root().join("policy.json");
    fs::write(
        &config_path,
        format!(
            r#"{{"root_folder": "{}", "max_age_seconds": 60, "blacklist": ["*.bin"]}}"#,
            tree.root().display()
        ),
    )
    .unwrap();

    let previous = std::env::var_os(CONFIG_ENV_VAR);
    std::env::set_var(CONFIG_ENV_VAR, &config_path);
    let loaded = load_config_from_env();
    std::env::remove_var(CONFIG_ENV_VAR);
    let missing = load_config_from_env();
    if let Some(prev) = previous {
        std::env::set_var(CONFIG_ENV_VAR, prev);
    }

    let config = loaded.expect("config from env");
    assert_eq!(config.root_folder, tree.root());
    assert_eq!(config.blacklist, vec!["*.bin".to_string()]);
    assert!(matches!(missing, Err(ConfigError::MissingEnv(_))));
}

struct StaticProtection(Vec<String>);

impl ProtectionSource for StaticProtection {
    fn protected_patterns(&self) -> Vec<String> {
        self.0.clone()
    }
}

#[tokio::test]
async fn scheduler_runs_pass_with_protection_hints() {
    let tree = ArtifactTree::new();
    tree.create_file("job-1/a.bin", 10, 1_000);
    let busy = tree.create_file("job-2/b.bin", 10, 1_000);

    let mut config = tree.config();
    config.max_age_seconds = 60;
    let engine = Arc::new(RetentionEngine::new(&config).unwrap());
    let scheduler = RetentionScheduler::new(engine, Duration::from_secs(3600))
        .with_protection(Arc::new(StaticProtection(vec!["job-2/**".into()])));

    let token = CancellationToken::new();
    let report = scheduler.run_once(&token).await.expect("pass");
    assert_eq!(removed_names(&report.removed), vec!["a.bin"]);
    assert!(busy.exists());

    let summary = scheduler.last_summary().expect("summary");
    assert_eq!(summary.pass_id, Some(report.pass_id));
    assert_eq!(summary.removed_files, 1);
}

#[tokio::test]
async fn scheduler_loop_stops_on_cancel() {
    let tree = ArtifactTree::new();
    tree.create_file("job-1/a.bin", 10, 1_000);
    let mut config = tree.config();
    config.max_age_seconds = 60;
    let engine = Arc::new(RetentionEngine::new(&config).unwrap());
    let scheduler = RetentionScheduler::new(engine, Duration::from_millis(20)).dry_run(true);

    let token = CancellationToken::new();
    let runner = {
        let scheduler = scheduler.clone();
        let token = token.clone();
        tokio::spawn(async move { scheduler.run(token).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    token.cancel();
    tokio::time::timeout(Duration::from_secs(5), runner)
        .await
        .expect("scheduler stopped")
        .expect("join");

    assert!(tree.root().join("job-1/a.bin").exists());
}
