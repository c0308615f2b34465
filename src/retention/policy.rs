use std::path::{Path, PathBuf};

use crate::config::{RetentionConfig, SizeLimitSetting};

use super::error::ConfigError;
use super::patterns::{MatchKey, PatternSet};
use super::types::FileRecord;

/// How membership patterns decide eligibility.
#[derive(Debug, Clone)]
pub enum MembershipMode {
    /// Files matching any pattern are never deleted.
    Whitelist(PatternSet),
    /// Only files matching a pattern may be deleted.
    Blacklist(PatternSet),
    /// No list; priority tiers alone identify removable files.
    None,
}

/// Size target. `soft` is the reduction goal, `hard` the mandatory floor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SizeLimit {
    pub soft: Option<u64>,
    pub hard: Option<u64>,
}

impl SizeLimit {
    pub fn single(bytes: u64) -> Self {
        SizeLimit {
            soft: None,
            hard: Some(bytes),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.goal().is_some()
    }

    /// The size the reclaimer works toward.
    pub fn goal(&self) -> Option<u64> {
        self.soft.or(self.hard)
    }
}

/// A validated, immutable retention policy.
#[derive(Debug, Clone)]
pub struct RetentionPolicy {
    root: PathBuf,
    root_str: String,
    max_age_seconds: Option<i64>,
    min_age_seconds: Option<i64>,
    size_limit: SizeLimit,
    membership: MembershipMode,
    priority_tiers: Vec<PatternSet>,
    group_patterns: PatternSet,
    warnings: Vec<String>,
}

impl RetentionPolicy {
    pub fn from_config(config: &RetentionConfig) -> Result<Self, ConfigError> {
        if config.root_folder.as_os_str().is_empty() {
            return Err(ConfigError::MissingRoot);
        }
        if !config.whitelist.is_empty() && !config.blacklist.is_empty() {
            return Err(ConfigError::BothListsConfigured);
        }
        let has_tier_patterns = config.priority_tiers.iter().any(|t| !t.is_empty());
        if config.whitelist.is_empty() && config.blacklist.is_empty() && !has_tier_patterns {
            return Err(ConfigError::NoRemovalCriteria);
        }

        let max_age = threshold("max_age_seconds", config.max_age_seconds)?.filter(|v| *v > 0);
        let min_age = threshold("min_age_seconds", config.min_age_seconds)?;
        if let (Some(min), Some(max)) = (min_age, max_age) {
            if min > max {
                return Err(ConfigError::MinAgeExceedsMaxAge { min, max });
            }
        }

        let size_limit = match &config.size_limit_bytes {
            SizeLimitSetting::Single(v) => SizeLimit {
                soft: None,
                hard: v.resolve("size_limit_bytes")?,
            },
            SizeLimitSetting::Split { soft, hard } => SizeLimit {
                soft: soft.resolve("size_limit_bytes.soft")?,
                hard: hard.resolve("size_limit_bytes.hard")?,
            },
        };
        if let (Some(soft), Some(hard)) = (size_limit.soft, size_limit.hard) {
            if soft > hard {
                return Err(ConfigError::SoftAboveHard { soft, hard });
            }
        }

        let root = config.root_folder.clone();
        let root_str = root.to_string_lossy().to_string();

        let membership = if !config.whitelist.is_empty() {
            MembershipMode::Whitelist(PatternSet::new(&config.whitelist, &root_str)?)
        } else if !config.blacklist.is_empty() {
            MembershipMode::Blacklist(PatternSet::new(&config.blacklist, &root_str)?)
        } else {
            MembershipMode::None
        };

        let priority_tiers = config
            .priority_tiers
            .iter()
            .map(|tier| PatternSet::new(tier, &root_str))
            .collect::<Result<Vec<_>, _>>()?;
        let group_patterns = PatternSet::new(&config.group_patterns, &root_str)?;

        let mut warnings = Vec::new();
        if has_tier_patterns && !size_limit.is_enabled() {
            warnings.push(format!(
                "priority_tiers on {} have no effect without a size limit",
                root.display()
            ));
        }
        if !group_patterns.is_empty() && !size_limit.is_enabled() {
            warnings.push(format!(
                "group_patterns on {} have no effect without a size limit",
                root.display()
            ));
        }
        if max_age.is_none() && !size_limit.is_enabled() {
            warnings.push(format!(
                "neither max_age_seconds nor a size limit is set for {}; passes will remove nothing",
                root.display()
            ));
        }

        Ok(RetentionPolicy {
            root,
            root_str,
            max_age_seconds: max_age,
            min_age_seconds: min_age,
            size_limit,
            membership,
            priority_tiers,
            group_patterns,
            warnings,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn max_age_seconds(&self) -> Option<i64> {
        self.max_age_seconds
    }

    pub fn min_age_seconds(&self) -> Option<i64> {
        self.min_age_seconds
    }

    pub fn size_limit(&self) -> SizeLimit {
        self.size_limit
    }

    pub fn membership(&self) -> &MembershipMode {
        &self.membership
    }

    pub fn priority_tiers(&self) -> &[PatternSet] {
        &self.priority_tiers
    }

    pub fn group_patterns(&self) -> &PatternSet {
        &self.group_patterns
    }

    /// Non-fatal oddities found while validating.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Compiles caller-supplied patterns the same way stored ones are.
    pub fn compile_patterns(&self, patterns: &[String]) -> Result<PatternSet, ConfigError> {
        PatternSet::new(patterns, &self.root_str)
    }

    pub fn match_key(&self, file: &FileRecord) -> MatchKey {
        let name = file
            .path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let relative = file
            .path
            .strip_prefix(&self.root)
            .unwrap_or(&file.path)
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        MatchKey { name, relative }
    }

    /// Lowest tier index whose patterns match.
    pub fn tier_of(&self, key: &MatchKey) -> Option<usize> {
        self.priority_tiers.iter().position(|tier| tier.is_match(key))
    }
}

fn threshold(field: &'static str, value: i64) -> Result<Option<i64>, ConfigError> {
    match value {
        -1 => Ok(None),
        v if v < 0 => Err(ConfigError::InvalidThreshold { field, value: v }),
        v => Ok(Some(v)),
    }
}
