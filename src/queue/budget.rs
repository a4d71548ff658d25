//! Capacity budget for the active directory.

#![allow(missing_docs)]

use std::fmt;

use serde::Serialize;

use crate::core::errors::{MqError, Result};

/// Maximum count and/or bytes allowed in the active directory.
///
/// At least one limit must be set. The first `min_count` admitted files skip
/// the byte limit, which lets a single file larger than `max_bytes` stay
/// active on its own. `max_count` always binds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Budget {
    pub max_count: Option<usize>,
    pub max_bytes: Option<u64>,
    pub min_count: usize,
    /// Per-group cap, grouped layout only.
    pub per_group_count: Option<usize>,
}

/// Running count and byte total of admitted files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Tally {
    pub count: usize,
    pub bytes: u64,
}

impl Tally {
    pub fn add(&mut self, size_bytes: u64) {
        self.count += 1;
        self.bytes = self.bytes.saturating_add(size_bytes);
    }
}

impl Budget {
    /// Build a budget from the two primary limits.
    pub fn new(max_count: Option<usize>, max_bytes: Option<u64>) -> Result<Self> {
        let budget = Self {
            max_count,
            max_bytes,
            min_count: 1,
            per_group_count: None,
        };
        budget.validate()?;
        Ok(budget)
    }

    #[must_use]
    pub fn with_min_count(mut self, min_count: usize) -> Self {
        self.min_count = min_count;
        self
    }

    #[must_use]
    pub fn with_per_group_count(mut self, per_group_count: Option<usize>) -> Self {
        self.per_group_count = per_group_count;
        self
    }

    /// True when some limit is configured.
    pub fn is_bounded(&self) -> bool {
        self.max_count.is_some() || self.max_bytes.is_some() || self.per_group_count.is_some()
    }

    pub fn validate(&self) -> Result<()> {
        if !self.is_bounded() {
            return Err(MqError::InvalidConfig {
                details: "budget needs at least one of max_count or max_bytes".to_string(),
            });
        }
        Ok(())
    }

    /// Whether a file of `size_bytes` can be admitted on top of `tally`.
    pub fn admits(&self, tally: &Tally, size_bytes: u64) -> bool {
        if self.max_count.is_some_and(|max| tally.count >= max) {
            return false;
        }
        if tally.count < self.min_count {
            return true;
        }
        self.max_bytes.is_none_or(|max| {
            tally
                .bytes
                .checked_add(size_bytes)
                .is_some_and(|total| total <= max)
        })
    }

    /// Whether a group holding `group_count` admitted files may take another.
    pub fn admits_in_group(&self, group_count: usize) -> bool {
        self.per_group_count.is_none_or(|max| group_count < max)
    }

    /// Whether a final active tally honours the budget, allowing the
    /// `min_count`-admitted prefix to exceed the byte limit.
    pub fn is_satisfied_by(&self, tally: &Tally) -> bool {
        let count_ok = self.max_count.is_none_or(|max| tally.count <= max);
        let bytes_ok = self
            .max_bytes
            .is_none_or(|max| tally.bytes <= max || tally.count <= self.min_count);
        count_ok && bytes_ok
    }
}

impl fmt::Display for Budget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(n) = self.max_count {
            parts.push(format!("max_count={n}"));
        }
        if let Some(n) = self.max_bytes {
            parts.push(format!("max_bytes={n}"));
        }
        if let Some(n) = self.per_group_count {
            parts.push(format!("per_group_count={n}"));
        }
        parts.push(format!("min_count={}", self.min_count));
        f.write_str(&parts.join(" "))
    }
}
