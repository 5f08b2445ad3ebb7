//! Shadow file naming and writing.
//!
//! `dir/Name.sol` is written to `dir/.Name.cover.sol`. The leading dot keeps
//! shadow files out of source discovery; the `.cover` infix lets build
//! tooling recognize them.

use super::InstrumentedFile;
use crate::errors::{SelectError, WriteError};
use crate::select::SourceFile;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const SHADOW_INFIX: &str = "cover";

/// Deterministic shadow path for a source path.
pub fn shadow_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_os_string())
        .unwrap_or_default();

    let mut name = OsString::from(".");
    name.push(&stem);
    name.push(".");
    name.push(SHADOW_INFIX);
    if let Some(ext) = path.extension() {
        name.push(".");
        name.push(ext);
    }

    match path.parent() {
        Some(parent) => parent.join(name),
        None => PathBuf::from(name),
    }
}

/// Whether a path follows the shadow naming convention.
pub fn is_shadow_file(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    let Some(rest) = name.strip_prefix('.') else {
        return false;
    };
    let marker = format!(".{SHADOW_INFIX}");
    match rest.rsplit_once('.') {
        Some((head, _ext)) if head.ends_with(&marker) => head.len() > marker.len(),
        _ => rest.ends_with(&marker) && rest.len() > marker.len(),
    }
}

/// Write instrumented sources, then pass-through sources verbatim, each to
/// its shadow path. Stops at the first failure; earlier files stay written.
pub fn write_shadow_files(
    instrumented: &[InstrumentedFile],
    pass_through: &[SourceFile],
) -> Result<Vec<PathBuf>, WriteError> {
    let contents = instrumented
        .iter()
        .map(|f| (f.file.path(), f.instrumented.as_str()))
        .chain(pass_through.iter().map(|f| (f.path(), f.source())));

    let mut written = Vec::with_capacity(instrumented.len() + pass_through.len());
    for (path, content) in contents {
        let dest = shadow_path(&path);
        std::fs::write(&dest, content).map_err(|source| WriteError {
            path: dest.clone(),
            source,
        })?;
        tracing::debug!(source = %path.display(), shadow = %dest.display(), "Wrote shadow file");
        written.push(dest);
    }
    Ok(written)
}

/// Every shadow file under `root`, sorted by path.
pub fn find_shadow_files(root: &Path) -> Result<Vec<PathBuf>, SelectError> {
    if !root.is_dir() {
        return Err(SelectError::RootMissing {
            path: root.to_path_buf(),
        });
    }

    let mut found = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|source| SelectError::Walk {
            root: root.to_path_buf(),
            source,
        })?;
        if entry.file_type().is_file() && is_shadow_file(entry.path()) {
            found.push(entry.into_path());
        }
    }
    Ok(found)
}

/// Delete the given shadow files, returning how many were removed.
pub fn remove_shadow_files(paths: &[PathBuf]) -> Result<usize, WriteError> {
    let mut removed = 0;
    for path in paths {
        match std::fs::remove_file(path) {
            Ok(()) => removed += 1,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(WriteError {
                    path: path.clone(),
                    source,
                });
            }
        }
    }
    Ok(removed)
}
