//! Error types for the filesystem module.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by filesystem operations.
#[derive(Debug, Error)]
pub enum FsError {
    /// Path does not exist.
    #[error("Path not found: {path}")]
    NotFound { path: PathBuf },

    /// Path exists but is not a directory.
    #[error("Path exists and is not a directory: {path}")]
    NotADirectory { path: PathBuf },

    /// Failed to read a file.
    #[error("Failed to read {path}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to write a file.
    #[error("Failed to write {path}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to create a directory.
    #[error("Failed to create directory: {path}")]
    DirectoryCreationFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to copy a file.
    #[error("Failed to copy file from {from} to {to}")]
    CopyFailed {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to rename a file.
    #[error("Failed to rename {from} to {to}")]
    RenameFailed {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to delete a file.
    #[error("Failed to delete {path}")]
    UnlinkFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to walk a directory tree.
    #[error("Failed to enumerate {path}: {reason}")]
    EnumerationFailed { path: PathBuf, reason: String },

    /// Any other I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FsError {
    /// Whether this error means the path was simply absent.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound { .. } => true,
            Self::ReadFailed { source, .. }
            | Self::WriteFailed { source, .. }
            | Self::UnlinkFailed { source, .. } => {
                source.kind() == std::io::ErrorKind::NotFound
            }
            Self::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}
