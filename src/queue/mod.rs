//! Queue reconciliation: listing, ordering, budget, planning and moves.

pub mod budget;
pub mod listing;
pub mod ordering;
pub mod planner;
pub mod reconciler;
pub mod transfer;
