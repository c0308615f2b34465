use super::error::ConfigError;
use super::patterns::{MatchKey, PatternSet};
use super::policy::{MembershipMode, RetentionPolicy};
use super::types::{FileRecord, ProtectionReason};

/// Patterns supplied for a single pass, typically paths held by in-flight jobs.
#[derive(Debug, Clone, Default)]
pub struct PassOverrides {
    extra_whitelist: Option<PatternSet>,
    extra_blacklist: Option<PatternSet>,
}

impl PassOverrides {
    pub fn none() -> Self {
        Self::default()
    }

    /// Compiles the per-call lists against `policy`. A blacklist cannot be
    /// added to a whitelist policy.
    pub fn compile(
        policy: &RetentionPolicy,
        extra_whitelist: &[String],
        extra_blacklist: &[String],
    ) -> Result<Self, ConfigError> {
        if !extra_blacklist.is_empty() && matches!(policy.membership(), MembershipMode::Whitelist(_)) {
            return Err(ConfigError::BothListsConfigured);
        }
        let compile = |patterns: &[String]| -> Result<Option<PatternSet>, ConfigError> {
            if patterns.is_empty() {
                Ok(None)
            } else {
                policy.compile_patterns(patterns).map(Some)
            }
        };
        Ok(PassOverrides {
            extra_whitelist: compile(extra_whitelist)?,
            extra_blacklist: compile(extra_blacklist)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Eligible,
    Protected(ProtectionReason),
}

impl Verdict {
    pub fn is_eligible(self) -> bool {
        matches!(self, Verdict::Eligible)
    }
}

/// Decides whether `file` may be considered for deletion at all.
///
/// The min-age guard overrides everything; then the whitelist, the blacklist,
/// or (when neither exists) the priority tiers decide.
pub fn assess(
    file: &FileRecord,
    key: &MatchKey,
    policy: &RetentionPolicy,
    overrides: &PassOverrides,
) -> Verdict {
    if let Some(min_age) = policy.min_age_seconds() {
        if file.age_seconds < min_age {
            return Verdict::Protected(ProtectionReason::TooYoung);
        }
    }
    if let Some(ref in_use) = overrides.extra_whitelist {
        if in_use.is_match(key) {
            return Verdict::Protected(ProtectionReason::InUse);
        }
    }

    match policy.membership() {
        MembershipMode::Whitelist(whitelist) => {
            if whitelist.is_match(key) {
                Verdict::Protected(ProtectionReason::Whitelisted)
            } else {
                Verdict::Eligible
            }
        }
        MembershipMode::Blacklist(blacklist) => {
            let extra = overrides.extra_blacklist.as_ref();
            if blacklist.is_match(key) || extra.map_or(false, |b| b.is_match(key)) {
                Verdict::Eligible
            } else {
                Verdict::Protected(ProtectionReason::NotBlacklisted)
            }
        }
        MembershipMode::None => match overrides.extra_blacklist {
            Some(ref extra) => {
                if extra.is_match(key) {
                    Verdict::Eligible
                } else {
                    Verdict::Protected(ProtectionReason::NotBlacklisted)
                }
            }
            None => {
                if policy.tier_of(key).is_some() {
                    Verdict::Eligible
                } else {
                    Verdict::Protected(ProtectionReason::Unclaimed)
                }
            }
        },
    }
}

/// Convenience wrapper over [`assess`] with no per-pass overrides.
pub fn eligible(file: &FileRecord, policy: &RetentionPolicy) -> bool {
    let key = policy.match_key(file);
    assess(file, &key, policy, &PassOverrides::none()).is_eligible()
}

/// A scanned file with every per-file judgement computed once.
#[derive(Debug, Clone)]
pub(crate) struct ClassifiedFile {
    pub record: FileRecord,
    pub verdict: Verdict,
    /// Lowest matching priority tier.
    pub tier: Option<usize>,
    /// Indices of matching group patterns.
    pub groups: Vec<usize>,
}

impl ClassifiedFile {
    pub fn is_eligible(&self) -> bool {
        self.verdict.is_eligible()
    }
}

pub(crate) fn classify(
    records: Vec<FileRecord>,
    policy: &RetentionPolicy,
    overrides: &PassOverrides,
) -> Vec<ClassifiedFile> {
    let group_patterns = policy.group_patterns();
    records
        .into_iter()
        .map(|record| {
            let key = policy.match_key(&record);
            let verdict = assess(&record, &key, policy, overrides);
            let tier = policy.tier_of(&key);
            let groups = if group_patterns.is_empty() {
                Vec::new()
            } else {
                group_patterns.matching(&key)
            };
            ClassifiedFile {
                record,
                verdict,
                tier,
                groups,
            }
        })
        .collect()
}

/// Indices into `files`, oldest first, path as tie-break.
pub(crate) fn oldest_first(files: &[ClassifiedFile]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..files.len()).collect();
    order.sort_by(|&a, &b| {
        let (fa, fb) = (&files[a].record, &files[b].record);
        fa.modified.cmp(&fb.modified).then_with(|| fa.path.cmp(&fb.path))
    });
    order
}
