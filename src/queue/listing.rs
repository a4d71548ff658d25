//! Directory listing: builds a [`DirectoryState`] for the active or offload root.
//!
//! Hidden files (leading `.`) and temporary/partial downloads are never
//! entries, so in-flight writes and our own partial copies are never moved.

#![allow(missing_docs)]

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::SystemTime;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::errors::{MqError, Result};

/// File name suffixes treated as temporary or still being written.
const TEMP_SUFFIXES: &[&str] = &[
    "~",
    ".tmp",
    ".part",
    ".partial",
    ".crdownload",
    ".download",
];

/// How files are laid out under each root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    /// Regular files directly inside the root; subdirectories are ignored.
    #[default]
    Flat,
    /// Each top-level subdirectory is a group; files beneath it are entries.
    Grouped,
}

impl FromStr for Layout {
    type Err = MqError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "flat" => Ok(Self::Flat),
            "grouped" => Ok(Self::Grouped),
            other => Err(MqError::InvalidConfig {
                details: format!("unknown layout {other:?} (expected flat or grouped)"),
            }),
        }
    }
}

/// One candidate file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileEntry {
    /// Display and sort name: the path relative to the root, `/`-separated.
    pub name: String,
    /// Exact relative path used for moves.
    pub rel_path: PathBuf,
    /// Top-level group (grouped layout only).
    pub group: Option<String>,
    pub size_bytes: u64,
    #[serde(skip)]
    pub modified: SystemTime,
}

impl FileEntry {
    /// Name relative to the entry's group (`ep1.mkv` for `Show/ep1.mkv`).
    pub fn name_in_group(&self) -> &str {
        self.group
            .as_deref()
            .and_then(|group| self.name.strip_prefix(group))
            .and_then(|rest| rest.strip_prefix('/'))
            .unwrap_or(&self.name)
    }
}

/// Listing of one root.
#[derive(Debug, Clone, Default)]
pub struct DirectoryState {
    pub root: PathBuf,
    pub entries: Vec<FileEntry>,
    pub total_bytes: u64,
    /// Hidden, temporary, ignored or unreadable names passed over.
    pub skipped: usize,
}

impl DirectoryState {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn push(&mut self, entry: FileEntry) {
        self.total_bytes = self.total_bytes.saturating_add(entry.size_bytes);
        self.entries.push(entry);
    }
}

/// Listing filters.
#[derive(Debug, Clone, Default)]
pub struct ListingOptions {
    pub layout: Layout,
    /// Extra file-name patterns to skip.
    pub ignore: Vec<Regex>,
}

impl ListingOptions {
    /// Compile user-supplied ignore patterns.
    pub fn new(layout: Layout, patterns: &[String]) -> Result<Self> {
        let ignore = patterns
            .iter()
            .map(|p| Regex::new(p))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self { layout, ignore })
    }

    /// Whether a file name should be passed over.
    pub fn is_skipped_name(&self, name: &str) -> bool {
        is_hidden(name) || is_temporary(name) || self.ignore.iter().any(|re| re.is_match(name))
    }
}

/// Names starting with `.` are hidden.
pub fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

/// Names that look like in-progress downloads or editor backups.
pub fn is_temporary(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    TEMP_SUFFIXES.iter().any(|suffix| lower.ends_with(suffix))
}

/// List `root` according to `options`.
///
/// The root itself must be readable; per-entry failures (vanished files,
/// unreadable metadata) are counted in `skipped` and do not fail the listing.
pub fn list_directory(root: &Path, options: &ListingOptions) -> Result<DirectoryState> {
    let mut state = DirectoryState {
        root: root.to_path_buf(),
        ..DirectoryState::default()
    };

    match options.layout {
        Layout::Flat => list_flat(root, options, &mut state)?,
        Layout::Grouped => list_grouped(root, options, &mut state)?,
    }

    Ok(state)
}

fn read_dir_checked(dir: &Path) -> Result<fs::ReadDir> {
    fs::read_dir(dir).map_err(|source| {
        if source.kind() == ErrorKind::NotFound {
            MqError::DirectoryNotFound {
                path: dir.to_path_buf(),
            }
        } else {
            MqError::io(dir, source)
        }
    })
}

fn list_flat(root: &Path, options: &ListingOptions, state: &mut DirectoryState) -> Result<()> {
    for dirent in read_dir_checked(root)? {
        let Ok(dirent) = dirent else {
            state.skipped += 1;
            continue;
        };
        let file_name = dirent.file_name();
        let name = file_name.to_string_lossy().into_owned();
        if options.is_skipped_name(&name) {
            state.skipped += 1;
            continue;
        }

        // metadata() follows symlinks: a link to a regular file is an entry.
        match fs::metadata(dirent.path()) {
            Ok(meta) if meta.is_file() => state.push(FileEntry {
                rel_path: PathBuf::from(&file_name),
                name,
                group: None,
                size_bytes: meta.len(),
                modified: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            }),
            Ok(_) => {}
            Err(_) => state.skipped += 1,
        }
    }
    Ok(())
}

fn list_grouped(root: &Path, options: &ListingOptions, state: &mut DirectoryState) -> Result<()> {
    for dirent in read_dir_checked(root)? {
        let Ok(dirent) = dirent else {
            state.skipped += 1;
            continue;
        };
        let file_name = dirent.file_name();
        let group = file_name.to_string_lossy().into_owned();
        if is_hidden(&group) {
            continue;
        }
        let path = dirent.path();
        if !path.is_dir() {
            continue;
        }
        walk_group(&path, &PathBuf::from(&file_name), &group, options, state);
    }
    Ok(())
}

fn walk_group(
    dir: &Path,
    rel_dir: &Path,
    group: &str,
    options: &ListingOptions,
    state: &mut DirectoryState,
) {
    let Ok(read) = fs::read_dir(dir) else {
        state.skipped += 1;
        return;
    };

    // Deterministic traversal keeps listings comparable between runs.
    let mut children: Vec<_> = read.flatten().collect();
    children.sort_by_key(fs::DirEntry::file_name);

    for dirent in children {
        let file_name = dirent.file_name();
        let name = file_name.to_string_lossy();
        if is_hidden(&name) {
            state.skipped += 1;
            continue;
        }
        let rel_path = rel_dir.join(&file_name);
        let Ok(meta) = fs::metadata(dirent.path()) else {
            state.skipped += 1;
            continue;
        };

        if meta.is_dir() {
            walk_group(&dirent.path(), &rel_path, group, options, state);
        } else if meta.is_file() {
            if options.is_skipped_name(&name) {
                state.skipped += 1;
                continue;
            }
            state.push(FileEntry {
                name: display_name(&rel_path),
                rel_path,
                group: Some(group.to_string()),
                size_bytes: meta.len(),
                modified: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            });
        }
    }
}

fn display_name(rel_path: &Path) -> String {
    rel_path
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
