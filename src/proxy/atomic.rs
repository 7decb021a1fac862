// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Crash-safe file replacement.
//!
//! [`write_atomically`] writes into a uniquely-named temporary file in the target's
//! own directory, fsyncs it, and renames it over the target. A reader of the target
//! path observes either the complete old content or the complete new content, never a
//! partial write. On any failure the temporary file is removed and the target is left
//! untouched.
//!
//! The same primitive installs the proxy configuration and every certificate, key and
//! chain file.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::debug;

/// Atomically replace `target` with `content`.
///
/// The parent directory is created if it does not exist. When `mode` is set the
/// temporary file is given those permission bits before it is renamed into place
/// (Unix only).
///
/// # Errors
///
/// Returns the underlying I/O error of the first step that failed. The previous
/// content of `target`, if any, is unchanged in that case.
pub fn write_atomically(target: &Path, content: &[u8], mode: Option<u32>) -> io::Result<()> {
    write_atomically_with(target, content, mode, |_| Ok(()))
}

/// [`write_atomically`] with a hook that runs after the temporary file is durable and
/// before it is renamed over the target. An error from the hook aborts the write.
pub(crate) fn write_atomically_with<F>(
    target: &Path,
    content: &[u8],
    mode: Option<u32>,
    before_commit: F,
) -> io::Result<()>
where
    F: FnOnce(&Path) -> io::Result<()>,
{
    let parent = match target.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;

    let file_name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    // Temp file lives next to the target so the rename stays on one filesystem.
    // Dropping `temp` on an early return removes it.
    let mut temp = tempfile::Builder::new()
        .prefix(&format!(".{file_name}."))
        .suffix(".tmp")
        .tempfile_in(parent)?;

    temp.write_all(content)?;
    temp.flush()?;
    set_mode(&temp, mode)?;
    temp.as_file().sync_all()?;

    before_commit(temp.path())?;

    temp.persist(target).map_err(|e| e.error)?;
    sync_dir(parent);

    debug!(
        path = %target.display(),
        bytes = content.len(),
        "Atomically replaced file"
    );
    Ok(())
}

/// Remove a file, treating "already absent" as success.
///
/// # Errors
///
/// Returns any I/O error other than `NotFound`.
pub fn remove_if_exists(path: &Path) -> io::Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Read a file, returning `None` when it does not exist.
///
/// # Errors
///
/// Returns any I/O error other than `NotFound`.
pub fn read_if_exists(path: &Path) -> io::Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

#[cfg(unix)]
fn set_mode(temp: &NamedTempFile, mode: Option<u32>) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    if let Some(mode) = mode {
        temp.as_file()
            .set_permissions(fs::Permissions::from_mode(mode))?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn set_mode(_temp: &NamedTempFile, _mode: Option<u32>) -> io::Result<()> {
    Ok(())
}

/// Persist the rename itself. Best effort: not every platform can fsync a directory.
fn sync_dir(dir: &Path) {
    if let Ok(handle) = File::open(dir) {
        let _ = handle.sync_all();
    }
}

#[cfg(test)]
#[path = "atomic_tests.rs"]
mod atomic_tests;
