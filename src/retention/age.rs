use std::collections::HashSet;

use super::filter::ClassifiedFile;
use super::group::{Expansion, GroupResolver};
use super::observer::RetentionObserver;
use super::types::EvictionReason;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct AgeOutcome {
    /// Selections in decision order.
    pub selected: Vec<(usize, EvictionReason)>,
    pub scheduled: HashSet<usize>,
    /// Members of groups held back because one of them is protected.
    pub held: HashSet<usize>,
    pub held_groups: usize,
}

/// Eligible files strictly older than `max_age_seconds`, in `order`.
///
/// A file past the age drags its group siblings along even when they are
/// younger; a group with a protected member is left alone entirely.
pub(crate) fn reclaim_by_age<'a>(
    files: &'a [ClassifiedFile],
    order: &[usize],
    max_age_seconds: Option<i64>,
    resolver: &GroupResolver<'a>,
    observer: &dyn RetentionObserver,
) -> AgeOutcome {
    let mut outcome = AgeOutcome::default();
    let max_age = match max_age_seconds {
        Some(max_age) if max_age > 0 => max_age,
        _ => return outcome,
    };

    for &idx in order {
        let file = &files[idx];
        if !file.is_eligible()
            || file.record.age_seconds <= max_age
            || outcome.scheduled.contains(&idx)
            || outcome.held.contains(&idx)
        {
            continue;
        }

        let expansion = if resolver.is_empty() {
            Expansion::Single
        } else {
            resolver.expand(idx, files, &outcome.scheduled)
        };
        match expansion {
            Expansion::Held {
                members,
                blocker,
                reason,
            } => {
                observer.on_group_held(&file.record, &files[blocker].record, reason);
                outcome.held.extend(members);
                outcome.held_groups += 1;
            }
            Expansion::Single => {
                outcome.scheduled.insert(idx);
                outcome.selected.push((idx, EvictionReason::Age));
            }
            Expansion::Members(members) => {
                outcome.scheduled.insert(idx);
                outcome.selected.push((idx, EvictionReason::Age));
                for member in members {
                    outcome.scheduled.insert(member);
                    outcome.selected.push((
                        member,
                        EvictionReason::Group {
                            trigger: file.record.path.clone(),
                        },
                    ));
                }
            }
        }
    }
    outcome
}
