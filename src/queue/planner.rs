//! Selection policy: turns two directory listings and a budget into a plan.
//!
//! Planning is pure; nothing here touches the filesystem.
//!
//! Flat layout:
//! 1. Active entries sorted by key; the longest admissible prefix is kept, the
//!    rest overflows to offload.
//! 2. Offload entries sorted by key are pulled in while the running tally
//!    (kept + pulled) stays within budget; pulling stops at the first misfit.
//!
//! An overflow file whose name already exists in offload cannot leave, so it
//! counts against the budget like a kept file.
//!
//! Grouped layout merges both roots into one ordering that interleaves groups
//! (first file of every group, then second, ...). A group whose file is
//! rejected is capped, so the active files of each group stay a prefix of it.

#![allow(missing_docs)]

use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::queue::budget::{Budget, Tally};
use crate::queue::listing::{DirectoryState, FileEntry, Layout};
use crate::queue::ordering::{OrderKey, natural_cmp};

/// Which way a file travels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Active → offload.
    Offload,
    /// Offload → active.
    Activate,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Offload => "offload",
            Self::Activate => "activate",
        })
    }
}

/// A single move decided by the planner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedMove {
    pub entry: FileEntry,
    pub direction: Direction,
}

/// Output of the selection policy.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcilePlan {
    /// Active files that stay.
    pub kept: Vec<FileEntry>,
    /// Moves in execution order: offloads first, then activations.
    pub moves: Vec<PlannedMove>,
    /// Moves that cannot happen because the name exists on both sides.
    pub conflicts: Vec<PlannedMove>,
    /// Expected active count/bytes once every move succeeds.
    pub projected: Tally,
}

impl ReconcilePlan {
    /// True when there is nothing to move and nothing to report.
    pub fn is_noop(&self) -> bool {
        self.moves.is_empty() && self.conflicts.is_empty()
    }

    pub fn count(&self, direction: Direction) -> usize {
        self.moves
            .iter()
            .filter(|m| m.direction == direction)
            .count()
    }

    fn finish(mut self) -> Self {
        // Stable sort keeps key order within each direction.
        self.moves.sort_by_key(|m| match m.direction {
            Direction::Offload => 0,
            Direction::Activate => 1,
        });
        self
    }
}

/// Build the plan for the given layout.
pub fn plan(
    layout: Layout,
    active: &DirectoryState,
    offload: &DirectoryState,
    budget: &Budget,
    key: OrderKey,
) -> ReconcilePlan {
    match layout {
        Layout::Flat => plan_flat(active, offload, budget, key),
        Layout::Grouped => plan_grouped(active, offload, budget, key),
    }
}

/// Keep-prefix-then-pull policy for flat directories.
pub fn plan_flat(
    active: &DirectoryState,
    offload: &DirectoryState,
    budget: &Budget,
    key: OrderKey,
) -> ReconcilePlan {
    let active_names: HashSet<&Path> =
        active.entries.iter().map(|e| e.rel_path.as_path()).collect();
    let offload_names: HashSet<&Path> =
        offload.entries.iter().map(|e| e.rel_path.as_path()).collect();

    let mut active_sorted = active.entries.clone();
    key.sort(&mut active_sorted);
    let mut offload_sorted = offload.entries.clone();
    key.sort(&mut offload_sorted);

    let mut plan = ReconcilePlan::default();
    let mut tally = Tally::default();
    let mut overflowing = false;

    for entry in active_sorted {
        if !overflowing && budget.admits(&tally, entry.size_bytes) {
            tally.add(entry.size_bytes);
            plan.kept.push(entry);
            continue;
        }
        overflowing = true;
        let planned = PlannedMove {
            direction: Direction::Offload,
            entry,
        };
        if offload_names.contains(planned.entry.rel_path.as_path()) {
            // Stays in active.
            tally.add(planned.entry.size_bytes);
            plan.conflicts.push(planned);
        } else {
            plan.moves.push(planned);
        }
    }

    for entry in offload_sorted {
        if active_names.contains(entry.rel_path.as_path()) {
            plan.conflicts.push(PlannedMove {
                entry,
                direction: Direction::Activate,
            });
            continue;
        }
        if !budget.admits(&tally, entry.size_bytes) {
            break;
        }
        tally.add(entry.size_bytes);
        plan.moves.push(PlannedMove {
            entry,
            direction: Direction::Activate,
        });
    }

    plan.projected = tally;
    plan.finish()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Location {
    Active,
    Offload,
    Both,
}

struct Candidate {
    entry: FileEntry,
    location: Location,
    index: usize,
}

/// Merged per-group policy for grouped layout.
///
/// Candidates are ordered by (position in group, larger groups first, name
/// within the group, group name). A file is admitted when its group is not
/// capped, the global `max_count` has room, and either fewer than `min_count`
/// files are admitted so far or the group is under `per_group_count` and the
/// file fits the remaining `max_bytes`. `min_count` never lifts `max_count`,
/// the same rule the flat layout follows.
///
/// A rejected file that also exists in offload stays in active and is
/// counted in the tally.
pub fn plan_grouped(
    active: &DirectoryState,
    offload: &DirectoryState,
    budget: &Budget,
    key: OrderKey,
) -> ReconcilePlan {
    let mut merged: HashMap<PathBuf, (FileEntry, Location)> = HashMap::new();
    for entry in &active.entries {
        merged.insert(entry.rel_path.clone(), (entry.clone(), Location::Active));
    }
    for entry in &offload.entries {
        merged
            .entry(entry.rel_path.clone())
            .and_modify(|(_, loc)| *loc = Location::Both)
            .or_insert_with(|| (entry.clone(), Location::Offload));
    }

    let mut groups: HashMap<String, Vec<(FileEntry, Location)>> = HashMap::new();
    for (entry, location) in merged.into_values() {
        let group = entry.group.clone().unwrap_or_default();
        groups.entry(group).or_default().push((entry, location));
    }

    let group_sizes: HashMap<String, usize> =
        groups.iter().map(|(g, files)| (g.clone(), files.len())).collect();

    let mut candidates: Vec<Candidate> = Vec::new();
    for mut files in groups.into_values() {
        files.sort_by(|a, b| key.compare_in_group(&a.0, &b.0));
        candidates.extend(
            files
                .into_iter()
                .enumerate()
                .map(|(index, (entry, location))| Candidate {
                    entry,
                    location,
                    index,
                }),
        );
    }

    let group_of = |c: &Candidate| c.entry.group.clone().unwrap_or_default();
    candidates.sort_by(|a, b| {
        let (ga, gb) = (group_of(a), group_of(b));
        a.index
            .cmp(&b.index)
            .then_with(|| {
                Reverse(group_sizes.get(&ga).copied().unwrap_or(0))
                    .cmp(&Reverse(group_sizes.get(&gb).copied().unwrap_or(0)))
            })
            .then_with(|| key.compare_in_group(&a.entry, &b.entry))
            .then_with(|| natural_cmp(&ga, &gb))
    });

    let mut plan = ReconcilePlan::default();
    let mut tally = Tally::default();
    let mut per_group: HashMap<String, usize> = HashMap::new();
    let mut capped: HashSet<String> = HashSet::new();

    for candidate in candidates {
        let group = group_of(&candidate);
        let group_count = per_group.get(&group).copied().unwrap_or(0);
        let admitted = !capped.contains(&group)
            && budget.admits(&tally, candidate.entry.size_bytes)
            && (tally.count < budget.min_count || budget.admits_in_group(group_count));

        if admitted {
            tally.add(candidate.entry.size_bytes);
            *per_group.entry(group).or_default() += 1;
        } else {
            if candidate.location == Location::Both {
                tally.add(candidate.entry.size_bytes);
            }
            capped.insert(group);
        }

        let Candidate {
            entry, location, ..
        } = candidate;
        match (admitted, location) {
            (true, Location::Active) => plan.kept.push(entry),
            (true, Location::Offload) => plan.moves.push(PlannedMove {
                entry,
                direction: Direction::Activate,
            }),
            (true, Location::Both) => plan.conflicts.push(PlannedMove {
                entry,
                direction: Direction::Activate,
            }),
            (false, Location::Active) => plan.moves.push(PlannedMove {
                entry,
                direction: Direction::Offload,
            }),
            (false, Location::Both) => plan.conflicts.push(PlannedMove {
                entry,
                direction: Direction::Offload,
            }),
            (false, Location::Offload) => {}
        }
    }

    plan.projected = tally;
    plan.finish()
}
