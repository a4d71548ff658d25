//! Configuration system: TOML file + env var overrides + defaults.

#![allow(missing_docs)]

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};

use crate::core::errors::{MqError, Result};
use crate::core::paths::expand_home;
use crate::core::units::parse_size;
use crate::queue::budget::Budget;
use crate::queue::listing::Layout;
use crate::queue::ordering::OrderKey;
use crate::queue::transfer::TransferStrategy;

/// Limit applied when neither the file, the environment nor the CLI sets one.
pub const DEFAULT_FALLBACK_LIMIT: usize = 3;

/// Full mediaqueue configuration model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Config {
    pub dirs: DirsConfig,
    pub budget: BudgetConfig,
    pub listing: ListingConfig,
    pub transfer: TransferConfig,
    pub logging: LoggingConfig,
    /// Where this config was loaded from (not read from the file itself).
    #[serde(skip)]
    pub config_file: PathBuf,
}

/// Default active/offload roots, used when none are given on the command line.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct DirsConfig {
    pub active: Option<PathBuf>,
    pub offload: Option<PathBuf>,
}

/// Capacity limits for the active directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BudgetConfig {
    pub max_count: Option<usize>,
    /// Accepts an integer byte count or a size string like `"4G"`.
    #[serde(deserialize_with = "deserialize_size")]
    pub max_bytes: Option<u64>,
    pub min_count: usize,
    pub per_group_count: Option<usize>,
}

/// Listing and ordering knobs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct ListingConfig {
    pub layout: Layout,
    pub order: OrderKey,
    /// Regexes matched against file names; matches are never moved.
    pub ignore_patterns: Vec<String>,
}

/// Move strategy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct TransferConfig {
    pub strategy: TransferStrategy,
    pub verify_checksum: bool,
}

/// JSONL activity log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    pub enabled: bool,
    pub jsonl_log: PathBuf,
    pub max_size_bytes: u64,
    pub max_rotated_files: u32,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            max_count: None,
            max_bytes: None,
            min_count: 1,
            per_group_count: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            jsonl_log: data_dir().join("activity.jsonl"),
            max_size_bytes: 10 * 1024 * 1024,
            max_rotated_files: 3,
        }
    }
}

impl BudgetConfig {
    /// True when at least one limit is configured.
    pub fn has_limit(&self) -> bool {
        self.max_count.is_some() || self.max_bytes.is_some() || self.per_group_count.is_some()
    }

    /// Build the effective [`Budget`], falling back to a count of
    /// [`DEFAULT_FALLBACK_LIMIT`] (global for flat, per group for grouped)
    /// when nothing is configured.
    pub fn resolve(&self, layout: Layout) -> Result<Budget> {
        let mut budget = Budget {
            max_count: self.max_count,
            max_bytes: self.max_bytes,
            min_count: self.min_count,
            per_group_count: self.per_group_count,
        };
        if !self.has_limit() {
            match layout {
                Layout::Flat => budget.max_count = Some(DEFAULT_FALLBACK_LIMIT),
                Layout::Grouped => budget.per_group_count = Some(DEFAULT_FALLBACK_LIMIT),
            }
        }
        budget.validate()?;
        Ok(budget)
    }
}

fn home_dir() -> PathBuf {
    env::var_os("HOME").map_or_else(
        || {
            eprintln!("[MQ-CONFIG] WARNING: HOME not set, falling back to /tmp for data paths");
            PathBuf::from("/tmp")
        },
        PathBuf::from,
    )
}

fn data_dir() -> PathBuf {
    home_dir().join(".local").join("share").join("mediaqueue")
}

impl Config {
    /// Default configuration path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        home_dir()
            .join(".config")
            .join("mediaqueue")
            .join("config.toml")
    }

    /// Load config from default or explicit path, then apply env overrides.
    ///
    /// Missing config file is not an error when loading from default path; defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with(path, env_var)
    }

    /// [`Config::load`] with an injectable environment lookup.
    pub fn load_with<F>(path: Option<&Path>, lookup: F) -> Result<Self>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let path_buf = path.map_or_else(Self::default_path, Path::to_path_buf);
        let is_explicit_path = path.is_some();

        let mut cfg = if path_buf.exists() {
            let raw = fs::read_to_string(&path_buf).map_err(|e| MqError::io(&path_buf, e))?;
            toml::from_str::<Self>(&raw)?
        } else if is_explicit_path {
            return Err(MqError::MissingConfig { path: path_buf });
        } else {
            Self::default()
        };

        cfg.config_file = path_buf;
        cfg.apply_env_overrides_from(lookup)?;
        cfg.normalize_paths();
        cfg.validate()?;
        Ok(cfg)
    }

    /// Deterministic FNV-1a hash of the effective config, recorded in the activity log.
    pub fn stable_hash(&self) -> Result<String> {
        let canonical = serde_json::to_string(self)?;
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in canonical.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        Ok(format!("{hash:016x}"))
    }

    fn apply_env_overrides_from<F>(&mut self, mut lookup: F) -> Result<()>
    where
        F: FnMut(&str) -> Option<String>,
    {
        // budget
        if let Some(raw) = lookup("MQ_BUDGET_MAX_COUNT") {
            self.budget.max_count = Some(parse_env_usize("MQ_BUDGET_MAX_COUNT", &raw)?);
        }
        if let Some(raw) = lookup("MQ_BUDGET_MAX_BYTES") {
            let bytes =
                parse_size(&raw).map_err(|e| env_error("MQ_BUDGET_MAX_BYTES", &raw, e))?;
            self.budget.max_bytes = Some(bytes);
        }
        if let Some(raw) = lookup("MQ_BUDGET_MIN_COUNT") {
            self.budget.min_count = parse_env_usize("MQ_BUDGET_MIN_COUNT", &raw)?;
        }
        if let Some(raw) = lookup("MQ_BUDGET_PER_GROUP_COUNT") {
            self.budget.per_group_count =
                Some(parse_env_usize("MQ_BUDGET_PER_GROUP_COUNT", &raw)?);
        }

        // listing
        if let Some(raw) = lookup("MQ_LISTING_LAYOUT") {
            self.listing.layout = raw
                .parse::<Layout>()
                .map_err(|e| env_error("MQ_LISTING_LAYOUT", &raw, e))?;
        }
        if let Some(raw) = lookup("MQ_LISTING_ORDER") {
            self.listing.order = raw
                .parse::<OrderKey>()
                .map_err(|e| env_error("MQ_LISTING_ORDER", &raw, e))?;
        }

        // transfer
        if let Some(raw) = lookup("MQ_TRANSFER_STRATEGY") {
            self.transfer.strategy = raw
                .parse::<TransferStrategy>()
                .map_err(|e| env_error("MQ_TRANSFER_STRATEGY", &raw, e))?;
        }
        if let Some(raw) = lookup("MQ_TRANSFER_VERIFY_CHECKSUM") {
            self.transfer.verify_checksum = parse_env_bool("MQ_TRANSFER_VERIFY_CHECKSUM", &raw)?;
        }

        // logging
        if let Some(raw) = lookup("MQ_LOGGING_ENABLED") {
            self.logging.enabled = parse_env_bool("MQ_LOGGING_ENABLED", &raw)?;
        }
        if let Some(raw) = lookup("MQ_LOGGING_JSONL_LOG") {
            self.logging.jsonl_log = PathBuf::from(raw);
        }

        Ok(())
    }

    fn normalize_paths(&mut self) {
        for slot in [&mut self.dirs.active, &mut self.dirs.offload] {
            if let Some(path) = slot.as_mut() {
                *path = expand_home(path);
            }
        }
        self.logging.jsonl_log = expand_home(&self.logging.jsonl_log);
    }

    fn validate(&self) -> Result<()> {
        for pattern in &self.listing.ignore_patterns {
            regex::Regex::new(pattern).map_err(|e| MqError::InvalidConfig {
                details: format!(
                    "listing.ignore_patterns entry {pattern:?} is not a valid regex: {e}"
                ),
            })?;
        }

        if self.logging.max_size_bytes == 0 {
            return Err(MqError::InvalidConfig {
                details: "logging.max_size_bytes must be > 0".to_string(),
            });
        }
        if self.logging.max_rotated_files == 0 {
            return Err(MqError::InvalidConfig {
                details: "logging.max_rotated_files must be > 0".to_string(),
            });
        }

        if self.budget.max_count == Some(0) && self.budget.max_bytes.is_none() {
            eprintln!("[MQ-CONFIG] WARNING: budget.max_count = 0 empties the active directory");
        }

        Ok(())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SizeValue {
    Bytes(u64),
    Text(String),
}

fn deserialize_size<'de, D>(deserializer: D) -> std::result::Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<SizeValue>::deserialize(deserializer)? {
        None => Ok(None),
        Some(SizeValue::Bytes(n)) => Ok(Some(n)),
        Some(SizeValue::Text(raw)) => parse_size(&raw)
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|raw| !raw.trim().is_empty())
}

fn env_error(name: &str, raw: &str, error: impl std::fmt::Display) -> MqError {
    MqError::ConfigParse {
        context: "env",
        details: format!("{name}={raw:?}: {error}"),
    }
}

fn parse_env_usize(name: &str, raw: &str) -> Result<usize> {
    raw.trim()
        .parse::<usize>()
        .map_err(|error| env_error(name, raw, error))
}

fn parse_env_bool(name: &str, raw: &str) -> Result<bool> {
    raw.trim()
        .parse::<bool>()
        .map_err(|error| env_error(name, raw, error))
}
