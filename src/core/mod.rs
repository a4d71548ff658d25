//! Core types: errors, configuration, paths and size units.

pub mod config;
pub mod errors;
pub mod paths;
pub mod units;
