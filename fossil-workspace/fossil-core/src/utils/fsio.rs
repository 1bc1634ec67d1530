// src/utils/fsio.rs
//! Crash-safe file primitives shared by the repository and canonical manager.

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::error::{FossilError, Result};
use crate::faults::{self, FaultPoint};

/// Suffix every in-flight write carries. Scans must ignore these files.
pub const TMP_SUFFIX: &str = ".tmp";

/// Atomically replace `path` with `bytes`.
///
/// Writes a uniquely named sibling temp file, fsyncs it, renames it over the
/// target and fsyncs the directory. Readers see either the old or the new
/// file, never a partial one. `fault` is checked between the temp write and
/// the rename; on any failure the temp file is removed.
pub fn write_atomic(path: &Path, bytes: &[u8], fault: Option<FaultPoint>) -> Result<()> {
    let parent = parent_of(path)?;
    fs::create_dir_all(parent).map_err(|e| FossilError::io(parent, e))?;

    let tmp = tmp_path_for(path);
    let result = (|| {
        {
            let mut f = File::create(&tmp).map_err(|e| FossilError::io(&tmp, e))?;
            f.write_all(bytes).map_err(|e| FossilError::io(&tmp, e))?;
            f.sync_all().map_err(|e| FossilError::io(&tmp, e))?;
        }
        if let Some(point) = fault {
            faults::check(point)?;
        }
        fs::rename(&tmp, path).map_err(|e| FossilError::io(path, e))?;
        sync_dir(parent);
        Ok(())
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

/// Write `bytes` to a path that must not exist yet, durably.
///
/// Used for archives: an existing file is never overwritten. Returns
/// `Ok(false)` when the path is already taken so the caller can pick another
/// name.
pub fn write_new_durable(path: &Path, bytes: &[u8]) -> Result<bool> {
    let parent = parent_of(path)?;
    fs::create_dir_all(parent).map_err(|e| FossilError::io(parent, e))?;

    let mut f = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(false),
        Err(e) => return Err(FossilError::io(path, e)),
    };
    let written = f
        .write_all(bytes)
        .and_then(|_| f.sync_all())
        .map_err(|e| FossilError::io(path, e));
    if let Err(e) = written {
        drop(f);
        let _ = fs::remove_file(path);
        return Err(e);
    }
    sync_dir(parent);
    Ok(true)
}

/// Read a file, mapping "not found" to `Ok(None)`.
pub fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(FossilError::io(path, e)),
    }
}

/// Files directly under `dir` with the given extension, sorted by name.
/// A missing directory is an empty listing.
pub fn list_files_with_ext(dir: &Path, ext: &str) -> Result<Vec<PathBuf>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(FossilError::io(dir, e)),
    };
    let mut out = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| FossilError::io(dir, e))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') || name.ends_with(TMP_SUFFIX) {
            continue;
        }
        if path.extension().and_then(|s| s.to_str()) == Some(ext) {
            out.push(path);
        }
    }
    out.sort();
    Ok(out)
}

fn parent_of(path: &Path) -> Result<&Path> {
    path.parent().ok_or_else(|| {
        FossilError::io(
            path,
            std::io::Error::new(ErrorKind::InvalidInput, "path has no parent directory"),
        )
    })
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let unique = uuid::Uuid::new_v4().simple().to_string();
    path.with_file_name(format!(".{name}.{}{TMP_SUFFIX}", &unique[..12]))
}

// Directory fsync makes the rename durable on POSIX.
#[cfg(unix)]
fn sync_dir(dir: &Path) {
    if let Ok(d) = File::open(dir) {
        let _ = d.sync_all();
    }
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) {}
