//! Target path resolution and the temp-token prefix.

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

use crate::config::{RunSettings, TargetLayout};
use crate::fs::FileDescriptor;

/// File name prefix of an in-flight target that would otherwise collide
/// with its own source.
pub const TEMP_TOKEN: &str = ".transcodr-tmp.";

/// Whether the file name of `path` carries the temp token.
pub fn has_temp_token(path: &Path) -> bool {
    path.file_name()
        .map(|n| n.as_encoded_bytes().starts_with(TEMP_TOKEN.as_bytes()))
        .unwrap_or(false)
}

/// `path` with the temp token prepended to its file name.
pub fn add_temp_token(path: &Path) -> PathBuf {
    let mut name = OsString::from(TEMP_TOKEN);
    if let Some(file_name) = path.file_name() {
        name.push(file_name);
    }
    path.with_file_name(name)
}

/// `path` with the temp token removed, or `None` if it had none.
pub fn strip_temp_token(path: &Path) -> Option<PathBuf> {
    let name = path.file_name()?.as_encoded_bytes();
    let stripped = name.strip_prefix(TEMP_TOKEN.as_bytes())?;
    // SAFETY: the bytes come from `as_encoded_bytes` and are split right
    // after a non-empty UTF-8 prefix.
    let stripped = unsafe { OsStr::from_encoded_bytes_unchecked(stripped) };
    Some(path.with_file_name(stripped))
}

/// Directory the target of `source` goes into.
pub fn target_parent(source: &FileDescriptor, settings: &RunSettings) -> PathBuf {
    match settings.layout {
        TargetLayout::SaveInPlace => source.parent_path.clone(),
        TargetLayout::MirrorRelative => settings.target_root().join(source.relative_dir()),
        TargetLayout::Flat => settings.target_root().to_path_buf(),
    }
}

/// Target file name: unchanged for the `copy` container, else the source
/// stem with the container's extension.
pub fn target_name(source: &FileDescriptor, settings: &RunSettings) -> OsString {
    match settings.convert.target_extension() {
        None => source.file_name().to_os_string(),
        Some(ext) => {
            let mut name = source.stem();
            name.push(".");
            name.push(ext);
            name
        }
    }
}

/// Untokenized target path of `source`.
pub fn resolve_target(source: &FileDescriptor, settings: &RunSettings) -> PathBuf {
    target_parent(source, settings).join(target_name(source, settings))
}
