use std::path::PathBuf;

use thiserror::Error;

/// Invalid retention configuration. Raised while building a policy and fatal
/// for that instance.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("root_folder must not be empty")]
    MissingRoot,

    #[error("whitelist and blacklist are mutually exclusive")]
    BothListsConfigured,

    #[error("min_age_seconds ({min}) exceeds max_age_seconds ({max})")]
    MinAgeExceedsMaxAge { min: i64, max: i64 },

    #[error("no removal criteria: whitelist, blacklist and priority_tiers are all empty")]
    NoRemovalCriteria,

    #[error("soft size limit ({soft} bytes) is above the hard limit ({hard} bytes)")]
    SoftAboveHard { soft: u64, hard: u64 },

    #[error("{field} must be -1 (disabled) or non-negative, got {value}")]
    InvalidThreshold { field: &'static str, value: i64 },

    #[error("invalid size value {value:?}: {reason}")]
    InvalidSize { value: String, reason: String },

    #[error("invalid pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("failed to read configuration {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("environment variable {0} is not set")]
    MissingEnv(&'static str),
}

/// Failure of a whole retention pass.
#[derive(Debug, Error)]
pub enum RetentionError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to scan {path}: {source}")]
    Scan {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("retention pass cancelled")]
    Cancelled,

    #[error("a retention pass over {0} is already running")]
    PassInProgress(PathBuf),

    #[error("retention worker failed: {0}")]
    Worker(String),
}
