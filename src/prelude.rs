//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use mediaqueue::prelude::*;
//! ```

// Core
pub use crate::core::config::Config;
pub use crate::core::errors::{MqError, Result};
pub use crate::core::units::{format_bytes, parse_size};

// Logging
pub use crate::logger::activity::{ActivityEvent, ActivityLogger};
pub use crate::logger::jsonl::JsonlConfig;

// Queue
pub use crate::queue::budget::Budget;
pub use crate::queue::listing::{DirectoryState, FileEntry, Layout, ListingOptions};
pub use crate::queue::ordering::OrderKey;
pub use crate::queue::planner::{Direction, ReconcilePlan};
pub use crate::queue::reconciler::{ReconcileConfig, ReconcileReport, Reconciler, reconcile};
pub use crate::queue::transfer::{TransferOptions, TransferStrategy};
