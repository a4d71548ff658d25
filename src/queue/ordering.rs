//! Ordering keys deciding which files count as "first" in a queue.
//!
//! `Name` uses natural ordering so `ep2` sorts before `ep10`; `Mtime` orders by
//! modification time, oldest first. Both fall back to the raw name so the
//! order is total and stable across runs.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::errors::MqError;
use crate::queue::listing::FileEntry;

/// Sort key applied to both directories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderKey {
    /// Natural (digit-aware) file name ordering.
    #[default]
    Name,
    /// Modification time ascending, natural name as tie-break.
    Mtime,
}

impl OrderKey {
    /// Compare two entries under this key.
    pub fn compare(self, a: &FileEntry, b: &FileEntry) -> Ordering {
        self.compare_by(a, b, |e| e.name.as_str())
    }

    /// Like [`OrderKey::compare`], but names are taken relative to each
    /// entry's group.
    pub fn compare_in_group(self, a: &FileEntry, b: &FileEntry) -> Ordering {
        self.compare_by(a, b, FileEntry::name_in_group)
    }

    fn compare_by<F>(self, a: &FileEntry, b: &FileEntry, name: F) -> Ordering
    where
        F: Fn(&FileEntry) -> &str,
    {
        match self {
            Self::Name => natural_cmp(name(a), name(b)),
            Self::Mtime => a
                .modified
                .cmp(&b.modified)
                .then_with(|| natural_cmp(name(a), name(b))),
        }
    }

    /// Sort entries in place, ascending.
    pub fn sort(self, entries: &mut [FileEntry]) {
        entries.sort_by(|a, b| self.compare(a, b));
    }
}

impl fmt::Display for OrderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Name => "name",
            Self::Mtime => "mtime",
        })
    }
}

impl FromStr for OrderKey {
    type Err = MqError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "name" => Ok(Self::Name),
            "mtime" | "time" => Ok(Self::Mtime),
            other => Err(MqError::InvalidConfig {
                details: format!("unknown order key {other:?} (expected name or mtime)"),
            }),
        }
    }
}

/// Digit-aware string comparison.
///
/// Runs of ASCII digits compare by numeric value with leading zeros ignored;
/// everything else compares bytewise. Strings equal under that rule are
/// ordered by their raw bytes so distinct names never compare equal.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut left = Chunks::new(a);
    let mut right = Chunks::new(b);

    loop {
        match (left.next(), right.next()) {
            (None, None) => return a.cmp(b),
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => {
                let ord = match (x, y) {
                    (Chunk::Digits(x), Chunk::Digits(y)) => cmp_digits(x, y),
                    (Chunk::Text(x), Chunk::Text(y)) => x.cmp(y),
                    // Numbers sort before text at the same position.
                    (Chunk::Digits(_), Chunk::Text(_)) => Ordering::Less,
                    (Chunk::Text(_), Chunk::Digits(_)) => Ordering::Greater,
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}

fn cmp_digits(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

#[derive(Debug, Clone, Copy)]
enum Chunk<'a> {
    Digits(&'a str),
    Text(&'a str),
}

struct Chunks<'a> {
    rest: &'a str,
}

impl<'a> Chunks<'a> {
    fn new(s: &'a str) -> Self {
        Self { rest: s }
    }
}

impl<'a> Iterator for Chunks<'a> {
    type Item = Chunk<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let first = self.rest.chars().next()?;
        let digits = first.is_ascii_digit();
        let end = self
            .rest
            .find(|c: char| c.is_ascii_digit() != digits)
            .unwrap_or(self.rest.len());
        let (chunk, rest) = self.rest.split_at(end);
        self.rest = rest;
        Some(if digits {
            Chunk::Digits(chunk)
        } else {
            Chunk::Text(chunk)
        })
    }
}
