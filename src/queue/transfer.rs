//! Safe single-file move between the active and offload roots.
//!
//! Same filesystem: one `rename`. Across filesystems: copy into a hidden
//! partial file next to the destination, fsync, carry over mtime and
//! permissions, optionally compare SHA-256 digests, rename into place, and
//! only then remove the source. Any failure before the final rename leaves
//! the source untouched and removes the partial file.
//!
//! An existing destination is never overwritten.

#![allow(missing_docs)]

use std::fmt;
use std::fs::{self, File, Metadata, OpenOptions};
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::core::errors::{MqError, Result};

/// How moves are performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferStrategy {
    /// Rename, falling back to copy+delete across filesystems.
    #[default]
    Auto,
    /// Always copy+delete.
    Copy,
}

impl FromStr for TransferStrategy {
    type Err = MqError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" | "rename" => Ok(Self::Auto),
            "copy" => Ok(Self::Copy),
            other => Err(MqError::InvalidConfig {
                details: format!("unknown transfer strategy {other:?} (expected auto or copy)"),
            }),
        }
    }
}

/// How a completed move was carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveMethod {
    Rename,
    Copy,
}

impl fmt::Display for MoveMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Rename => "rename",
            Self::Copy => "copy",
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferOptions {
    pub strategy: TransferStrategy,
    pub verify_checksum: bool,
}

/// Move `src` to `dst`, creating missing destination parents.
pub fn move_file(src: &Path, dst: &Path, options: &TransferOptions) -> Result<MoveMethod> {
    if exists_no_follow(dst) {
        return Err(MqError::NameConflict {
            path: dst.to_path_buf(),
        });
    }
    let src_meta = fs::metadata(src).map_err(|e| MqError::io(src, e))?;

    // Deepest ancestor that already exists; anything below it is ours to remove.
    let existing_base = dst.ancestors().skip(1).find(|dir| dir.is_dir());
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent).map_err(|e| MqError::io(parent, e))?;
    }

    let verifier = options.verify_checksum.then_some(verify_copy as Verifier);
    let moved = transfer(src, dst, &src_meta, options.strategy, verifier);
    if let (Err(_), Some(base)) = (&moved, existing_base) {
        prune_empty_parents(dst, base);
    }
    moved
}

/// Compares a staged copy against its source.
type Verifier = fn(&Path, &Path) -> Result<()>;

fn transfer(
    src: &Path,
    dst: &Path,
    src_meta: &Metadata,
    strategy: TransferStrategy,
    verifier: Option<Verifier>,
) -> Result<MoveMethod> {
    if strategy == TransferStrategy::Auto {
        match fs::rename(src, dst) {
            Ok(()) => return Ok(MoveMethod::Rename),
            Err(e) if e.kind() == ErrorKind::CrossesDevices => {}
            Err(e) => return Err(MqError::io(src, e)),
        }
    }

    copy_then_remove(src, dst, src_meta, verifier)?;
    Ok(MoveMethod::Copy)
}

/// SHA-256 comparison of `src` and its staged copy.
pub fn verify_copy(src: &Path, copy: &Path) -> Result<()> {
    let expected = compute_sha256(src).map_err(|e| MqError::io(src, e))?;
    let actual = compute_sha256(copy).map_err(|e| MqError::io(copy, e))?;
    if expected != actual {
        return Err(MqError::VerificationFailed {
            path: src.to_path_buf(),
            details: format!("sha256 mismatch: source {expected}, copy {actual}"),
        });
    }
    Ok(())
}

/// Remove directories left empty by a move, walking up from `path`'s parent
/// and stopping at `root` (which is never removed).
pub fn prune_empty_parents(path: &Path, root: &Path) {
    let mut current = path.parent();
    while let Some(dir) = current {
        if dir == root || !dir.starts_with(root) {
            break;
        }
        // remove_dir only succeeds on empty directories.
        if fs::remove_dir(dir).is_err() {
            break;
        }
        current = dir.parent();
    }
}

/// Hidden sibling used while a cross-device copy is in flight.
pub fn partial_path(dst: &Path) -> PathBuf {
    let name = dst
        .file_name()
        .map_or_else(String::new, |n| n.to_string_lossy().into_owned());
    dst.with_file_name(format!(".{name}.mq-partial"))
}

/// Hex SHA-256 of a file, streamed.
pub fn compute_sha256(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hex_encode(&hasher.finalize()))
}

fn exists_no_follow(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

fn copy_then_remove(
    src: &Path,
    dst: &Path,
    src_meta: &Metadata,
    verifier: Option<Verifier>,
) -> Result<()> {
    let partial = partial_path(dst);

    let staged = write_partial(src, &partial, src_meta, verifier).and_then(|()| {
        if exists_no_follow(dst) {
            return Err(MqError::NameConflict {
                path: dst.to_path_buf(),
            });
        }
        fs::rename(&partial, dst).map_err(|e| MqError::io(dst, e))
    });
    if let Err(err) = staged {
        let _ = fs::remove_file(&partial);
        return Err(err);
    }

    if let Err(e) = fs::remove_file(src) {
        // Put things back the way they were rather than leave two copies.
        let _ = fs::remove_file(dst);
        return Err(MqError::MoveFailed {
            path: src.to_path_buf(),
            details: format!("source could not be removed after copy: {e}"),
        });
    }
    Ok(())
}

fn write_partial(
    src: &Path,
    partial: &Path,
    src_meta: &Metadata,
    verifier: Option<Verifier>,
) -> Result<()> {
    let mut reader = File::open(src).map_err(|e| MqError::io(src, e))?;
    let mut writer = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(partial)
        .map_err(|e| MqError::io(partial, e))?;

    let copied = io::copy(&mut reader, &mut writer).map_err(|e| MqError::MoveFailed {
        path: src.to_path_buf(),
        details: format!("copy to {} failed: {e}", partial.display()),
    })?;
    if copied != src_meta.len() {
        return Err(MqError::MoveFailed {
            path: src.to_path_buf(),
            details: format!(
                "source changed during copy: expected {} bytes, copied {copied}",
                src_meta.len()
            ),
        });
    }

    if let Ok(modified) = src_meta.modified() {
        writer
            .set_modified(modified)
            .map_err(|e| MqError::io(partial, e))?;
    }
    writer.sync_all().map_err(|e| MqError::io(partial, e))?;
    drop(writer);
    fs::set_permissions(partial, src_meta.permissions()).map_err(|e| MqError::io(partial, e))?;

    match verifier {
        Some(verify) => verify(src, partial),
        None => Ok(()),
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    bytes
        .iter()
        .fold(String::with_capacity(bytes.len() * 2), |mut s, b| {
            let _ = write!(s, "{b:02x}");
            s
        })
}
