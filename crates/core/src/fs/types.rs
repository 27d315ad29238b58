//! Types produced by directory enumeration.

use serde::{Deserialize, Serialize};
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

/// Immutable snapshot of a file taken at enumeration time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDescriptor {
    /// Absolute (or root-joined) path to the file.
    pub full_path: PathBuf,
    /// File name including extension.
    pub name: String,
    /// Directory containing the file.
    pub parent_path: PathBuf,
    /// Path relative to the enumeration root.
    pub relative_path: PathBuf,
    /// Size in bytes when enumerated.
    pub size: u64,
    /// Lower-cased extension without the dot, empty if none.
    pub extension: String,
}

impl FileDescriptor {
    /// Builds a descriptor for `path`, computing `relative_path` against `root`.
    ///
    /// Falls back to the bare file name when `path` is not under `root`.
    pub fn new(path: &Path, root: &Path, size: u64) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let parent_path = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let relative_path = path
            .strip_prefix(root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| PathBuf::from(&name));
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        Self {
            full_path: path.to_path_buf(),
            name,
            parent_path,
            relative_path,
            size,
            extension,
        }
    }

    /// File name as stored on disk. `name` is only its display form.
    pub fn file_name(&self) -> &OsStr {
        self.full_path
            .file_name()
            .unwrap_or_else(|| self.full_path.as_os_str())
    }

    /// File name without its extension, as stored on disk.
    pub fn stem(&self) -> OsString {
        self.full_path
            .file_stem()
            .unwrap_or_else(|| self.file_name())
            .to_os_string()
    }

    /// Directory part of `relative_path` (empty for files at the root).
    pub fn relative_dir(&self) -> PathBuf {
        self.relative_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default()
    }
}

/// Kind of an enumerated entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

/// One node of an enumerated directory tree.
#[derive(Debug, Clone)]
pub struct DirectoryEntry {
    pub kind: EntryKind,
    pub path: PathBuf,
    /// Size in bytes; zero for directories.
    pub size: u64,
    /// Children, populated for directories within the depth limit.
    pub children: Vec<DirectoryEntry>,
}

impl DirectoryEntry {
    /// Iterates over every file below this entry, depth first.
    pub fn files(&self) -> Vec<&DirectoryEntry> {
        let mut out = Vec::new();
        self.collect_files(&mut out);
        out
    }

    fn collect_files<'a>(&'a self, out: &mut Vec<&'a DirectoryEntry>) {
        match self.kind {
            EntryKind::File => out.push(self),
            EntryKind::Directory => {
                for child in &self.children {
                    child.collect_files(out);
                }
            }
        }
    }
}
