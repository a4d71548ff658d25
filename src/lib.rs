#![forbid(unsafe_code)]

//! mediaqueue keeps a count- or size-bounded "active" directory filled from
//! an unbounded "offload" directory.
//!
//! Each run is a single reconciliation pass:
//! 1. **Scan** both roots, skipping hidden and partially written files
//! 2. **Plan** which files stay, which are pushed out and which are pulled in
//! 3. **Execute** the moves (rename, or copy + fsync + delete across filesystems)
//!
//! # Library usage
//!
//! Use the [`prelude`] for convenient access to the most common types:
//!
//! ```rust,no_run
//! use mediaqueue::prelude::*;
//! use std::path::Path;
//!
//! let budget = Budget::new(Some(5), None)?;
//! let report = reconcile(Path::new("/media/active"), Path::new("/media/offload"), budget)?;
//! println!("{} files pulled in", report.activated.len());
//! # Ok::<(), MqError>(())
//! ```
//!
//! Individual modules can also be imported directly:
//!
//! ```rust,no_run
//! use mediaqueue::core::config::Config;
//! use mediaqueue::queue::planner::plan_flat;
//! ```

pub mod prelude;

pub mod core;
pub mod logger;
pub mod queue;
