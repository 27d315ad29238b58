//! Async filesystem operations used by jobs and the ledger.

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use walkdir::WalkDir;

use super::error::FsError;
use super::types::{DirectoryEntry, EntryKind, FileDescriptor};

/// Returns whether anything exists at `path`.
pub async fn exists(path: &Path) -> bool {
    fs::try_exists(path).await.unwrap_or(false)
}

/// Creates `path` and all missing parents.
///
/// Succeeds if the directory already exists; fails if `path` exists and is
/// something other than a directory.
pub async fn make_dir(path: &Path) -> Result<(), FsError> {
    match fs::metadata(path).await {
        Ok(meta) if meta.is_dir() => return Ok(()),
        Ok(_) => {
            return Err(FsError::NotADirectory {
                path: path.to_path_buf(),
            })
        }
        Err(_) => {}
    }

    fs::create_dir_all(path)
        .await
        .map_err(|e| FsError::DirectoryCreationFailed {
            path: path.to_path_buf(),
            source: e,
        })
}

/// Reads a whole file as UTF-8.
pub async fn read_file(path: &Path) -> Result<String, FsError> {
    fs::read_to_string(path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            FsError::NotFound {
                path: path.to_path_buf(),
            }
        } else {
            FsError::ReadFailed {
                path: path.to_path_buf(),
                source: e,
            }
        }
    })
}

/// Writes `content` to `path`, truncating when `truncate` is set and
/// appending otherwise. The file is created if missing.
pub async fn write_file(path: &Path, content: &str, truncate: bool) -> Result<(), FsError> {
    let write_err = |e| FsError::WriteFailed {
        path: path.to_path_buf(),
        source: e,
    };

    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(truncate)
        .append(!truncate)
        .open(path)
        .await
        .map_err(write_err)?;

    file.write_all(content.as_bytes()).await.map_err(write_err)?;
    file.flush().await.map_err(write_err)?;
    file.sync_all().await.map_err(write_err)?;
    Ok(())
}

/// Replaces `path` with `content` through a sibling temp file and a rename,
/// so readers never observe a partially written file.
pub async fn write_file_atomic(path: &Path, content: &str) -> Result<(), FsError> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "ledger".to_string());
    let staging = path.with_file_name(format!(".{}.partial", file_name));

    write_file(&staging, content, true).await?;
    rename(&staging, path).await
}

/// Copies `from` to `to`, returning the number of bytes copied.
pub async fn copy_file(from: &Path, to: &Path) -> Result<u64, FsError> {
    fs::copy(from, to).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound && !from.exists() {
            FsError::NotFound {
                path: from.to_path_buf(),
            }
        } else {
            FsError::CopyFailed {
                from: from.to_path_buf(),
                to: to.to_path_buf(),
                source: e,
            }
        }
    })
}

/// Deletes a file.
pub async fn unlink_file(path: &Path) -> Result<(), FsError> {
    fs::remove_file(path)
        .await
        .map_err(|e| FsError::UnlinkFailed {
            path: path.to_path_buf(),
            source: e,
        })
}

/// Deletes a file, logging instead of failing. Returns whether the file is
/// gone afterwards (an already-missing file counts as deleted).
pub async fn safe_unlink(path: &Path) -> bool {
    match unlink_file(path).await {
        Ok(()) => {
            debug!("Deleted {}", path.display());
            true
        }
        Err(e) if e.is_not_found() => true,
        Err(e) => {
            warn!("{}: {}", e, error_source(&e));
            false
        }
    }
}

/// Renames `from` to `to`, replacing any existing file at `to`.
pub async fn rename(from: &Path, to: &Path) -> Result<(), FsError> {
    fs::rename(from, to)
        .await
        .map_err(|e| FsError::RenameFailed {
            from: from.to_path_buf(),
            to: to.to_path_buf(),
            source: e,
        })
}

/// Size of the file at `path` in bytes.
pub async fn file_size(path: &Path) -> Result<u64, FsError> {
    let meta = fs::metadata(path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            FsError::NotFound {
                path: path.to_path_buf(),
            }
        } else {
            FsError::Io(e)
        }
    })?;
    Ok(meta.len())
}

/// Last modification time of `path`, if it exists and the platform reports one.
pub async fn modified_at(path: &Path) -> Option<DateTime<Utc>> {
    let meta = fs::metadata(path).await.ok()?;
    meta.modified().ok().map(DateTime::<Utc>::from)
}

/// Enumerates `path` into a tree.
///
/// `max_depth <= 0` lists one level; a positive value descends that many
/// extra levels.
pub async fn enumerate_directory(path: &Path, max_depth: i32) -> Result<DirectoryEntry, FsError> {
    let root = path.to_path_buf();
    let levels = 1 + max_depth.max(0) as usize;

    tokio::task::spawn_blocking(move || build_tree(&root, levels))
        .await
        .map_err(|e| FsError::EnumerationFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?
}

/// Enumerates `root` and returns descriptors for every file whose extension
/// is in `extensions` (case-insensitive; empty list accepts everything).
pub async fn collect_files(
    root: &Path,
    max_depth: i32,
    extensions: &[String],
) -> Result<Vec<FileDescriptor>, FsError> {
    let tree = enumerate_directory(root, max_depth).await?;
    let wanted: Vec<String> = extensions
        .iter()
        .map(|e| e.trim_start_matches('.').to_lowercase())
        .collect();

    let files = tree
        .files()
        .into_iter()
        .filter(|entry| {
            // The ledger and the transcoder arguments carry paths as text.
            let is_text = entry.path.to_str().is_some();
            if !is_text {
                warn!("Skipping {}: path is not valid UTF-8", entry.path.display());
            }
            is_text
        })
        .map(|entry| FileDescriptor::new(&entry.path, root, entry.size))
        .filter(|d| wanted.is_empty() || wanted.contains(&d.extension))
        .collect();

    Ok(files)
}

fn build_tree(root: &Path, levels: usize) -> Result<DirectoryEntry, FsError> {
    if !root.exists() {
        return Err(FsError::NotFound {
            path: root.to_path_buf(),
        });
    }
    if !root.is_dir() {
        return Err(FsError::NotADirectory {
            path: root.to_path_buf(),
        });
    }

    // Entries arrive depth-first in pre-order; the stack holds the chain of
    // open directories from the root down to the current parent.
    let mut stack: Vec<DirectoryEntry> = Vec::new();

    for entry in WalkDir::new(root).max_depth(levels).sort_by_file_name() {
        let entry = entry.map_err(|e| FsError::EnumerationFailed {
            path: root.to_path_buf(),
            reason: e.to_string(),
        })?;
        let depth = entry.depth();

        while stack.len() > depth {
            close_directory(&mut stack);
        }

        let path = entry.path().to_path_buf();
        if path.is_dir() {
            stack.push(DirectoryEntry {
                kind: EntryKind::Directory,
                path,
                size: 0,
                children: Vec::new(),
            });
        } else {
            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            if let Some(parent) = stack.last_mut() {
                parent.children.push(DirectoryEntry {
                    kind: EntryKind::File,
                    path,
                    size,
                    children: Vec::new(),
                });
            }
        }
    }

    while stack.len() > 1 {
        close_directory(&mut stack);
    }

    stack.pop().ok_or_else(|| FsError::EnumerationFailed {
        path: PathBuf::from(root),
        reason: "walk produced no root entry".to_string(),
    })
}

fn close_directory(stack: &mut Vec<DirectoryEntry>) {
    if let Some(done) = stack.pop() {
        if let Some(parent) = stack.last_mut() {
            parent.children.push(done);
        }
    }
}

fn error_source(e: &FsError) -> String {
    std::error::Error::source(e)
        .map(|s| s.to_string())
        .unwrap_or_default()
}
