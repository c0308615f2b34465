mod age;
mod engine;
mod error;
mod executor;
pub mod filter;
mod group;
pub mod observer;
pub mod patterns;
pub mod policy;
pub mod scanner;
mod size;
pub mod types;


pub use engine::{CleanUpRequest, RetentionEngine};
pub use error::{ConfigError, RetentionError};
pub use executor::prune_empty_dirs;
pub use filter::{assess, eligible, PassOverrides, Verdict};
pub use observer::{LogObserver, RetentionObserver};
pub use patterns::{MatchKey, PatternSet};
pub use policy::{MembershipMode, RetentionPolicy, SizeLimit};
pub use scanner::{scan, Snapshot};
pub use types::{
    DeleteFailure, Eviction, EvictionDecision, EvictionReason, FailureKind, FileRecord, PassPhase,
    PassReport, ProtectionReason, PruneFailure, ScanWarning,
};
