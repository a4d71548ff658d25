//! MQ-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, MqError>;

/// Top-level error type for mediaqueue.
#[derive(Debug, Error)]
pub enum MqError {
    #[error("[MQ-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[MQ-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[MQ-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[MQ-2001] directory not found: {path}")]
    DirectoryNotFound { path: PathBuf },

    #[error("[MQ-2101] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[MQ-3001] permission denied for {path}")]
    PermissionDenied { path: PathBuf },

    #[error("[MQ-3002] name conflict: {path} already exists")]
    NameConflict { path: PathBuf },

    #[error("[MQ-3003] move failed for {path}: {details}")]
    MoveFailed { path: PathBuf, details: String },

    #[error("[MQ-3004] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("[MQ-3005] copy verification failed for {path}: {details}")]
    VerificationFailed { path: PathBuf, details: String },
}

impl MqError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "MQ-1001",
            Self::MissingConfig { .. } => "MQ-1002",
            Self::ConfigParse { .. } => "MQ-1003",
            Self::DirectoryNotFound { .. } => "MQ-2001",
            Self::Serialization { .. } => "MQ-2101",
            Self::PermissionDenied { .. } => "MQ-3001",
            Self::NameConflict { .. } => "MQ-3002",
            Self::MoveFailed { .. } => "MQ-3003",
            Self::Io { .. } => "MQ-3004",
            Self::VerificationFailed { .. } => "MQ-3005",
        }
    }

    /// Whether a per-file move can skip this error and carry on with the batch.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::PermissionDenied { .. }
                | Self::NameConflict { .. }
                | Self::MoveFailed { .. }
                | Self::Io { .. }
                | Self::VerificationFailed { .. }
        )
    }

    /// Convenience constructor for IO errors with a known path.
    ///
    /// `PermissionDenied` is lifted into its own variant so callers can report
    /// it separately from generic IO failures.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: io::Error) -> Self {
        let path = path.as_ref().to_path_buf();
        if source.kind() == io::ErrorKind::PermissionDenied {
            Self::PermissionDenied { path }
        } else {
            Self::Io { path, source }
        }
    }
}

impl From<serde_json::Error> for MqError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for MqError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}

impl From<regex::Error> for MqError {
    fn from(value: regex::Error) -> Self {
        Self::InvalidConfig {
            details: format!("invalid pattern: {value}"),
        }
    }
}
