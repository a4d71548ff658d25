//! Byte-size parsing and formatting.
//!
//! Size arguments accept an optional single-letter suffix. Lowercase suffixes
//! (`k m g t p e z y`) are powers of 1000, uppercase ones powers of 1024.
//! Decimal mantissas are allowed (`1.5g`).

use regex::Regex;

use crate::core::errors::{MqError, Result};

const SUFFIXES: &str = "kmgtpezy";

const SIZE_PATTERN: &str = r"^(?P<number>[0-9]+(?:\.[0-9]+)?)(?P<suffix>[A-Za-z]?)$";

/// Parse a human size string such as `500`, `10k`, `4G` or `1.5g` into bytes.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
pub fn parse_size(raw: &str) -> Result<u64> {
    let invalid = || MqError::InvalidConfig {
        details: format!("invalid size {raw:?}: expected e.g. 500, 10k, 4G or 1.5g"),
    };

    let size_re = Regex::new(SIZE_PATTERN)?;
    let trimmed = raw.trim();
    let caps = size_re.captures(trimmed).ok_or_else(invalid)?;
    let number = &caps["number"];
    let suffix = &caps["suffix"];

    let factor: u128 = if let Some(c) = suffix.chars().next() {
        let base: u128 = if c.is_ascii_uppercase() { 1024 } else { 1000 };
        let pos = SUFFIXES
            .find(c.to_ascii_lowercase())
            .ok_or_else(invalid)?;
        base.checked_pow(u32::try_from(pos + 1).map_err(|_| invalid())?)
            .ok_or_else(invalid)?
    } else {
        1
    };

    if let Ok(whole) = number.parse::<u128>() {
        let bytes = whole.checked_mul(factor).ok_or_else(invalid)?;
        return u64::try_from(bytes).map_err(|_| invalid());
    }

    let value: f64 = number.parse().map_err(|_| invalid())?;
    let bytes = value * factor as f64;
    if !bytes.is_finite() || bytes >= u64::MAX as f64 {
        return Err(invalid());
    }
    Ok(bytes as u64)
}

/// Format a byte count using binary units.
#[allow(clippy::cast_precision_loss)]
pub fn format_bytes(bytes: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = 1024 * KIB;
    const GIB: u64 = 1024 * MIB;
    const TIB: u64 = 1024 * GIB;

    if bytes >= TIB {
        format!("{:.1} TB", bytes as f64 / TIB as f64)
    } else if bytes >= GIB {
        format!("{:.1} GB", bytes as f64 / GIB as f64)
    } else if bytes >= MIB {
        format!("{:.1} MB", bytes as f64 / MIB as f64)
    } else if bytes >= KIB {
        format!("{:.1} KB", bytes as f64 / KIB as f64)
    } else {
        format!("{bytes} B")
    }
}
