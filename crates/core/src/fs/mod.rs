//! Filesystem operations and directory enumeration.
//!
//! Thin async wrappers over `tokio::fs` with path-carrying errors, plus the
//! directory walk that produces [`FileDescriptor`]s for a run.

mod error;
mod ops;
mod types;

pub use error::FsError;
pub use ops::{
    collect_files, copy_file, enumerate_directory, exists, file_size, make_dir, modified_at,
    read_file, rename, safe_unlink, unlink_file, write_file, write_file_atomic,
};
pub use types::{DirectoryEntry, EntryKind, FileDescriptor};
