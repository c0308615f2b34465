use std::collections::HashSet;

use super::filter::ClassifiedFile;
use super::group::{Expansion, GroupResolver};
use super::observer::RetentionObserver;
use super::policy::SizeLimit;
use super::types::EvictionReason;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct SizeOutcome {
    /// Selections in decision order.
    pub selected: Vec<(usize, EvictionReason)>,
    /// Eligible bytes left after age reclaiming.
    pub eligible_bytes: u64,
    pub removed_bytes: u64,
    pub goal_met: Option<bool>,
    pub hard_limit_met: Option<bool>,
    pub held_groups: usize,
}

/// Selects further files until the eligible total drops to the size goal.
///
/// Candidates are taken oldest first. With priority tiers, tier 0 is drained
/// first, then the set widens to tiers {0, 1} and so on; files outside every
/// tier are never taken. A selected file drags its group siblings along, and
/// the file that closes the deficit is removed whole. Groups already held
/// back by the age stage stay held and are not reported twice.
pub(crate) fn reclaim_by_size<'a>(
    files: &'a [ClassifiedFile],
    order: &[usize],
    resolver: &GroupResolver<'a>,
    already_scheduled: &HashSet<usize>,
    already_held: &HashSet<usize>,
    limit: SizeLimit,
    tier_count: usize,
    observer: &dyn RetentionObserver,
) -> SizeOutcome {
    let eligible_bytes: u64 = files
        .iter()
        .enumerate()
        .filter(|(idx, f)| f.is_eligible() && !already_scheduled.contains(idx))
        .map(|(_, f)| f.record.size_bytes)
        .sum();

    let Some(goal) = limit.goal() else {
        return SizeOutcome {
            eligible_bytes,
            ..SizeOutcome::default()
        };
    };

    let deficit = eligible_bytes.saturating_sub(goal);
    let mut outcome = SizeOutcome {
        eligible_bytes,
        ..SizeOutcome::default()
    };

    if deficit > 0 {
        let mut scheduled = already_scheduled.clone();
        let mut held = already_held.clone();

        let stages: Vec<Option<usize>> = if tier_count == 0 {
            vec![None]
        } else {
            (0..tier_count).map(Some).collect()
        };

        'stages: for stage in stages {
            for &idx in order {
                if outcome.removed_bytes >= deficit {
                    break 'stages;
                }
                let file = &files[idx];
                if !file.is_eligible() || scheduled.contains(&idx) || held.contains(&idx) {
                    continue;
                }
                if let Some(widest) = stage {
                    match file.tier {
                        Some(t) if t <= widest => {}
                        _ => continue,
                    }
                }

                let expansion = if resolver.is_empty() {
                    Expansion::Single
                } else {
                    resolver.expand(idx, files, &scheduled)
                };
                match expansion {
                    Expansion::Held {
                        members,
                        blocker,
                        reason,
                    } => {
                        observer.on_group_held(&file.record, &files[blocker].record, reason);
                        held.extend(members);
                        outcome.held_groups += 1;
                    }
                    Expansion::Single => {
                        scheduled.insert(idx);
                        outcome.removed_bytes += file.record.size_bytes;
                        outcome
                            .selected
                            .push((idx, EvictionReason::Size { tier: stage }));
                    }
                    Expansion::Members(members) => {
                        scheduled.insert(idx);
                        outcome.removed_bytes += file.record.size_bytes;
                        outcome
                            .selected
                            .push((idx, EvictionReason::Size { tier: stage }));
                        for member in members {
                            scheduled.insert(member);
                            outcome.removed_bytes += files[member].record.size_bytes;
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
        }
    }

    let remaining = eligible_bytes.saturating_sub(outcome.removed_bytes);
    outcome.goal_met = Some(remaining <= goal);
    outcome.hard_limit_met = limit.hard.map(|hard| remaining <= hard);
    outcome
}
