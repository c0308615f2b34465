use std::collections::{HashMap, HashSet};
use std::path::Path;

use super::filter::{ClassifiedFile, Verdict};
use super::types::ProtectionReason;

/// One group: files in `dir` matching group pattern `pattern`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct GroupKey<'a> {
    dir: &'a Path,
    pattern: usize,
}

/// Outcome of selecting a file that may belong to groups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Expansion {
    /// Not grouped, or every sibling is already scheduled.
    Single,
    /// Siblings to schedule alongside the trigger, oldest first.
    Members(Vec<usize>),
    /// A member is protected; nothing in `members` (trigger included) may go.
    Held {
        members: Vec<usize>,
        blocker: usize,
        reason: ProtectionReason,
    },
}

/// Files bucketed once by (parent directory, group pattern) so expansion
/// never rescans a directory.
pub(crate) struct GroupResolver<'a> {
    buckets: HashMap<GroupKey<'a>, Vec<usize>>,
}

impl<'a> GroupResolver<'a> {
    /// `order` fixes member ordering inside each bucket.
    pub fn build(files: &'a [ClassifiedFile], order: &[usize]) -> Self {
        let mut buckets: HashMap<GroupKey<'a>, Vec<usize>> = HashMap::new();
        for &idx in order {
            let file = &files[idx];
            for &pattern in &file.groups {
                buckets
                    .entry(GroupKey {
                        dir: file.record.parent(),
                        pattern,
                    })
                    .or_default()
                    .push(idx);
            }
        }
        GroupResolver { buckets }
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Collects the closure of every group `trigger` belongs to, following
    /// members' other group patterns too. Members in `scheduled` are skipped.
    pub fn expand(
        &self,
        trigger: usize,
        files: &'a [ClassifiedFile],
        scheduled: &HashSet<usize>,
    ) -> Expansion {
        if files[trigger].groups.is_empty() {
            return Expansion::Single;
        }

        let mut visited_groups: HashSet<GroupKey<'a>> = HashSet::new();
        let mut seen: HashSet<usize> = HashSet::new();
        seen.insert(trigger);
        let mut members = Vec::new();
        let mut pending = vec![trigger];

        while let Some(idx) = pending.pop() {
            let file = &files[idx];
            for &pattern in &file.groups {
                let key = GroupKey {
                    dir: file.record.parent(),
                    pattern,
                };
                if !visited_groups.insert(key.clone()) {
                    continue;
                }
                let Some(bucket) = self.buckets.get(&key) else {
                    continue;
                };
                for &member in bucket {
                    if scheduled.contains(&member) || !seen.insert(member) {
                        continue;
                    }
                    members.push(member);
                    pending.push(member);
                }
            }
        }

        let blocker = members.iter().copied().find(|&m| !files[m].is_eligible());
        if let Some(blocker) = blocker {
            let reason = match files[blocker].verdict {
                Verdict::Protected(reason) => reason,
                Verdict::Eligible => ProtectionReason::Unclaimed,
            };
            let mut held = Vec::with_capacity(members.len() + 1);
            held.push(trigger);
            held.extend(members);
            return Expansion::Held {
                members: held,
                blocker,
                reason,
            };
        }

        if members.is_empty() {
            return Expansion::Single;
        }
        members.sort_by(|&a, &b| {
            let (fa, fb) = (&files[a].record, &files[b].record);
            fa.modified.cmp(&fb.modified).then_with(|| fa.path.cmp(&fb.path))
        });
        Expansion::Members(members)
    }
}
