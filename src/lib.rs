//! Retention engine for directory trees that keep accumulating per-job
//! artifacts. Each pass scans the tree, drops eligible files past the maximum
//! age, then sacrifices further files oldest first (tier by tier, group by
//! group) until the size goal holds, and finally prunes empty directories.

pub mod config;
mod retention;
pub mod scheduler;

pub use config::{
    load_config_from_env, load_config_result, parse_config, ByteValue, RetentionConfig,
    SizeLimitSetting, CONFIG_ENV_VAR,
};
pub use retention::*;
pub use scheduler::{NoProtection, PassStatus, PassSummary, ProtectionSource, RetentionScheduler};
