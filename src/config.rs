// src/config.rs

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use bytesize::ByteSize;
use serde::{Deserialize, Serialize};

use crate::retention::ConfigError;

/// Environment variable naming a JSON policy file.
pub const CONFIG_ENV_VAR: &str = "ARTIFACT_RETENTION_CONFIG";

/// Raw retention options as read from JSON. Validated by
/// [`RetentionPolicy::from_config`](crate::RetentionPolicy::from_config).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    pub root_folder: PathBuf,
    #[serde(default = "disabled")]
    pub max_age_seconds: i64,
    #[serde(default = "disabled")]
    pub min_age_seconds: i64,
    #[serde(default)]
    pub size_limit_bytes: SizeLimitSetting,
    #[serde(default)]
    pub whitelist: Vec<String>,
    #[serde(default)]
    pub blacklist: Vec<String>,
    #[serde(default)]
    pub priority_tiers: Vec<Vec<String>>,
    #[serde(default)]
    pub group_patterns: Vec<String>,
}

impl RetentionConfig {
    pub fn new(root_folder: impl Into<PathBuf>) -> Self {
        RetentionConfig {
            root_folder: root_folder.into(),
            max_age_seconds: -1,
            min_age_seconds: -1,
            size_limit_bytes: SizeLimitSetting::default(),
            whitelist: Vec::new(),
            blacklist: Vec::new(),
            priority_tiers: Vec::new(),
            group_patterns: Vec::new(),
        }
    }
}

fn disabled() -> i64 {
    -1
}

/// A byte count given either as an integer or a human string like `"50 GiB"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ByteValue {
    Bytes(i64),
    Human(String),
}

impl Default for ByteValue {
    fn default() -> Self {
        ByteValue::Bytes(-1)
    }
}

impl ByteValue {
    /// `None` when disabled (`-1`, `0`, or the string `"-1"`).
    pub fn resolve(&self, field: &'static str) -> Result<Option<u64>, ConfigError> {
        match self {
            ByteValue::Bytes(-1) => Ok(None),
            ByteValue::Bytes(v) if *v < 0 => Err(ConfigError::InvalidThreshold { field, value: *v }),
            ByteValue::Bytes(v) => Ok(positive(*v as u64)),
            ByteValue::Human(raw) => {
                let trimmed = raw.trim();
                if trimmed == "-1" {
                    return Ok(None);
                }
                trimmed
                    .parse::<ByteSize>()
                    .map(|size| positive(size.as_u64()))
                    .map_err(|reason| ConfigError::InvalidSize {
                        value: raw.clone(),
                        reason,
                    })
            }
        }
    }
}

fn positive(v: u64) -> Option<u64> {
    if v > 0 {
        Some(v)
    } else {
        None
    }
}

/// Either a single limit or a soft goal with a hard floor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SizeLimitSetting {
    Single(ByteValue),
    Split {
        #[serde(default)]
        soft: ByteValue,
        #[serde(default)]
        hard: ByteValue,
    },
}

impl Default for SizeLimitSetting {
    fn default() -> Self {
        SizeLimitSetting::Single(ByteValue::default())
    }
}

/// Load a policy file with error propagation.
pub fn load_config_result(path: &Path) -> Result<RetentionConfig, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&raw)
}

pub fn parse_config(raw: &str) -> Result<RetentionConfig, ConfigError> {
    Ok(serde_json::from_str(raw)?)
}

/// Load the policy file named by [`CONFIG_ENV_VAR`].
pub fn load_config_from_env() -> Result<RetentionConfig, ConfigError> {
    let path = env::var_os(CONFIG_ENV_VAR).ok_or(ConfigError::MissingEnv(CONFIG_ENV_VAR))?;
    load_config_result(Path::new(&path))
}
