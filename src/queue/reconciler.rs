//! Reconciler: scan both roots, plan, execute, report.
//!
//! Pre-flight problems (missing or nested roots, unbounded budget, unreadable
//! root) abort the run before anything moves. Once moves start, every per-file
//! problem is recorded in the [`ReconcileReport`] and the batch carries on.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::Serialize;

use crate::core::config::Config;
use crate::core::errors::{MqError, Result};
use crate::core::paths::{ensure_disjoint, require_directory, resolve_absolute_path};
use crate::logger::activity::{ActivityEvent, ActivityLogger};
use crate::queue::budget::{Budget, Tally};
use crate::queue::listing::{DirectoryState, Layout, ListingOptions, list_directory};
use crate::queue::ordering::OrderKey;
use crate::queue::planner::{self, Direction, PlannedMove, ReconcilePlan};
use crate::queue::transfer::{MoveMethod, TransferOptions, move_file, prune_empty_parents};

/// Everything a run needs to know.
#[derive(Debug, Clone)]
pub struct ReconcileConfig {
    pub active_dir: PathBuf,
    pub offload_dir: PathBuf,
    pub budget: Budget,
    pub order: OrderKey,
    pub listing: ListingOptions,
    pub transfer: TransferOptions,
    /// Plan only; nothing is moved.
    pub dry_run: bool,
}

impl ReconcileConfig {
    /// Flat layout, natural name order, rename-or-copy moves.
    pub fn new(
        active_dir: impl Into<PathBuf>,
        offload_dir: impl Into<PathBuf>,
        budget: Budget,
    ) -> Self {
        Self {
            active_dir: active_dir.into(),
            offload_dir: offload_dir.into(),
            budget,
            order: OrderKey::default(),
            listing: ListingOptions::default(),
            transfer: TransferOptions::default(),
            dry_run: false,
        }
    }

    /// Build from a loaded [`Config`] and the two roots.
    pub fn from_config(cfg: &Config, active_dir: PathBuf, offload_dir: PathBuf) -> Result<Self> {
        let layout = cfg.listing.layout;
        Ok(Self {
            active_dir,
            offload_dir,
            budget: cfg.budget.resolve(layout)?,
            order: cfg.listing.order,
            listing: ListingOptions::new(layout, &cfg.listing.ignore_patterns)?,
            transfer: TransferOptions {
                strategy: cfg.transfer.strategy,
                verify_checksum: cfg.transfer.verify_checksum,
            },
            dry_run: false,
        })
    }

    pub fn layout(&self) -> Layout {
        self.listing.layout
    }
}

/// A move that was performed (or would be, in a dry run).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MoveOutcome {
    pub name: String,
    pub size_bytes: u64,
    /// `None` in a dry run.
    pub method: Option<MoveMethod>,
}

/// A move skipped because the destination already holds the name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConflictRecord {
    pub name: String,
    pub direction: Direction,
}

/// A move that failed; the source is left where it was.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureRecord {
    pub name: String,
    pub direction: Direction,
    pub code: String,
    pub message: String,
}

/// Result of one reconcile run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileReport {
    pub active_dir: PathBuf,
    pub offload_dir: PathBuf,
    pub dry_run: bool,
    pub offloaded: Vec<MoveOutcome>,
    pub activated: Vec<MoveOutcome>,
    pub conflicts: Vec<ConflictRecord>,
    pub failures: Vec<FailureRecord>,
    /// Activations dropped because an earlier offload did not happen.
    pub deferred: Vec<String>,
    /// Active files left in place by the plan.
    pub kept: usize,
    /// Active count/bytes after the run.
    pub active_count: usize,
    pub active_bytes: u64,
    pub duration_ms: u64,
}

impl ReconcileReport {
    /// True when anything moved or would move.
    pub fn moved_anything(&self) -> bool {
        !self.offloaded.is_empty() || !self.activated.is_empty()
    }

    /// True when no conflicts, failures or deferrals were recorded.
    pub fn is_clean(&self) -> bool {
        self.conflicts.is_empty() && self.failures.is_empty() && self.deferred.is_empty()
    }

    pub fn bytes_moved(&self, direction: Direction) -> u64 {
        let outcomes = match direction {
            Direction::Offload => &self.offloaded,
            Direction::Activate => &self.activated,
        };
        outcomes.iter().map(|o| o.size_bytes).sum()
    }
}

/// Scans, plans and executes one reconciliation pass.
pub struct Reconciler {
    config: ReconcileConfig,
    logger: Option<ActivityLogger>,
    config_hash: Option<String>,
}

impl Reconciler {
    pub fn new(config: ReconcileConfig, logger: Option<ActivityLogger>) -> Self {
        Self {
            config,
            logger,
            config_hash: None,
        }
    }

    /// Attach the effective-config hash recorded in `reconcile_start` events.
    #[must_use]
    pub fn with_config_hash(mut self, hash: Option<String>) -> Self {
        self.config_hash = hash;
        self
    }

    pub fn config(&self) -> &ReconcileConfig {
        &self.config
    }

    /// Pre-flight checks, then list both roots.
    pub fn scan(&self) -> Result<(DirectoryState, DirectoryState)> {
        require_directory(&self.config.active_dir)?;
        require_directory(&self.config.offload_dir)?;
        ensure_disjoint(
            &resolve_absolute_path(&self.config.active_dir),
            &resolve_absolute_path(&self.config.offload_dir),
        )?;
        self.config.budget.validate()?;

        let active = list_directory(&self.config.active_dir, &self.config.listing)?;
        let offload = list_directory(&self.config.offload_dir, &self.config.listing)?;
        Ok((active, offload))
    }

    /// Decide what to move; pure.
    pub fn plan(&self, active: &DirectoryState, offload: &DirectoryState) -> ReconcilePlan {
        planner::plan(
            self.config.layout(),
            active,
            offload,
            &self.config.budget,
            self.config.order,
        )
    }

    /// Scan, plan and (unless dry-run) execute.
    pub fn run(&mut self) -> Result<ReconcileReport> {
        let started = Instant::now();
        self.log(&ActivityEvent::ReconcileStarted {
            active: self.config.active_dir.display().to_string(),
            offload: self.config.offload_dir.display().to_string(),
            budget: self.config.budget.to_string(),
            config_hash: self.config_hash.clone(),
            dry_run: self.config.dry_run,
        });

        let (active, offload) = match self.scan() {
            Ok(states) => states,
            Err(err) => {
                self.log(&ActivityEvent::Error {
                    code: err.code().to_string(),
                    message: err.to_string(),
                });
                self.flush();
                return Err(err);
            }
        };

        let plan = self.plan(&active, &offload);
        let mut report = if self.config.dry_run {
            self.preview(&plan)
        } else {
            self.execute(&plan)
        };
        report.duration_ms = elapsed_ms(started);

        self.log(&ActivityEvent::ReconcileCompleted {
            activated: report.activated.len(),
            offloaded: report.offloaded.len(),
            conflicts: report.conflicts.len(),
            failures: report.failures.len(),
            active_count: report.active_count,
            active_bytes: report.active_bytes,
            duration_ms: report.duration_ms,
        });
        self.flush();
        Ok(report)
    }

    /// Report what `plan` would do without touching the filesystem.
    pub fn preview(&mut self, plan: &ReconcilePlan) -> ReconcileReport {
        let mut report = self.empty_report(plan);
        report.dry_run = true;
        for planned in &plan.moves {
            let outcome = MoveOutcome {
                name: planned.entry.name.clone(),
                size_bytes: planned.entry.size_bytes,
                method: None,
            };
            match planned.direction {
                Direction::Offload => report.offloaded.push(outcome),
                Direction::Activate => report.activated.push(outcome),
            }
        }
        report.active_count = plan.projected.count;
        report.active_bytes = plan.projected.bytes;
        report
    }

    /// Apply `plan`. Offloads run first so capacity is freed before files are
    /// pulled in; if some offload does not happen, later activations are
    /// re-checked against the budget and deferred when they no longer fit.
    pub fn execute(&mut self, plan: &ReconcilePlan) -> ReconcileReport {
        let mut report = self.empty_report(plan);
        let mut tally = resident_tally(plan);
        let mut offload_shortfall = false;

        for planned in &plan.moves {
            let size = planned.entry.size_bytes;
            if planned.direction == Direction::Activate
                && offload_shortfall
                && !self.config.budget.admits(&tally, size)
            {
                report.deferred.push(planned.entry.name.clone());
                continue;
            }

            match self.move_one(planned) {
                Ok(outcome) => match planned.direction {
                    Direction::Offload => report.offloaded.push(outcome),
                    Direction::Activate => {
                        tally.add(size);
                        report.activated.push(outcome);
                    }
                },
                Err(err) => {
                    if planned.direction == Direction::Offload {
                        offload_shortfall = true;
                        tally.add(size);
                    }
                    self.record_error(&mut report, planned, &err);
                }
            }
        }

        report.active_count = tally.count;
        report.active_bytes = tally.bytes;
        report
    }

    fn move_one(&mut self, planned: &PlannedMove) -> Result<MoveOutcome> {
        let (src_root, dst_root) = self.roots(planned.direction);
        let src = src_root.join(&planned.entry.rel_path);
        let dst = dst_root.join(&planned.entry.rel_path);

        let started = Instant::now();
        let method = move_file(&src, &dst, &self.config.transfer)?;
        let duration_ms = elapsed_ms(started);

        if self.config.layout() == Layout::Grouped {
            prune_empty_parents(&src, src_root);
        }

        let path = planned.entry.name.clone();
        let size_bytes = planned.entry.size_bytes;
        let method_name = method.to_string();
        self.log(&match planned.direction {
            Direction::Offload => ActivityEvent::FileOffloaded {
                path,
                size_bytes,
                method: method_name,
                duration_ms,
            },
            Direction::Activate => ActivityEvent::FileActivated {
                path,
                size_bytes,
                method: method_name,
                duration_ms,
            },
        });

        Ok(MoveOutcome {
            name: planned.entry.name.clone(),
            size_bytes,
            method: Some(method),
        })
    }

    fn record_error(&mut self, report: &mut ReconcileReport, planned: &PlannedMove, err: &MqError) {
        if matches!(err, MqError::NameConflict { .. }) {
            self.record_conflict(report, planned);
            return;
        }
        self.log(&ActivityEvent::MoveFailed {
            path: planned.entry.name.clone(),
            direction: planned.direction.to_string(),
            error_code: err.code().to_string(),
            error_message: err.to_string(),
        });
        report.failures.push(FailureRecord {
            name: planned.entry.name.clone(),
            direction: planned.direction,
            code: err.code().to_string(),
            message: err.to_string(),
        });
    }

    fn record_conflict(&mut self, report: &mut ReconcileReport, planned: &PlannedMove) {
        self.log(&ActivityEvent::MoveConflict {
            path: planned.entry.name.clone(),
            direction: planned.direction.to_string(),
        });
        report.conflicts.push(ConflictRecord {
            name: planned.entry.name.clone(),
            direction: planned.direction,
        });
    }

    fn empty_report(&mut self, plan: &ReconcilePlan) -> ReconcileReport {
        let mut report = ReconcileReport {
            active_dir: self.config.active_dir.clone(),
            offload_dir: self.config.offload_dir.clone(),
            dry_run: self.config.dry_run,
            kept: plan.kept.len(),
            ..ReconcileReport::default()
        };
        for planned in &plan.conflicts {
            self.record_conflict(&mut report, planned);
        }
        report
    }

    fn roots(&self, direction: Direction) -> (&Path, &Path) {
        match direction {
            Direction::Offload => (&self.config.active_dir, &self.config.offload_dir),
            Direction::Activate => (&self.config.offload_dir, &self.config.active_dir),
        }
    }

    fn log(&mut self, event: &ActivityEvent) {
        if let Some(logger) = self.logger.as_mut() {
            logger.log(event);
        }
    }

    fn flush(&mut self) {
        if let Some(logger) = self.logger.as_mut() {
            logger.flush();
        }
    }
}

/// One pass with default listing, ordering and transfer settings.
pub fn reconcile(active_dir: &Path, offload_dir: &Path, budget: Budget) -> Result<ReconcileReport> {
    Reconciler::new(ReconcileConfig::new(active_dir, offload_dir, budget), None).run()
}

/// Count/bytes that stay in active before any activation: the projected
/// tally minus the planned activations. Includes overflow files stranded by
/// a plan-time conflict.
fn resident_tally(plan: &ReconcilePlan) -> Tally {
    let mut tally = plan.projected;
    for planned in plan.moves.iter().filter(|m| m.direction == Direction::Activate) {
        tally.count = tally.count.saturating_sub(1);
        tally.bytes = tally.bytes.saturating_sub(planned.entry.size_bytes);
    }
    tally
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
