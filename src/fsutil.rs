// SPDX-FileCopyrightText: 2026 Dotweave Contributors
// SPDX-License-Identifier: MIT

//! Filesystem helpers.
//!
//! Small primitives shared by the linking engine and the manifest store:
//! permission-preserving copies, crash-atomic whole-file writes, and
//! timestamped backup path generation.

use chrono::Local;
use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

/// Timestamp layout used for backup names and snapshot directories.
///
/// Second granularity only, so [`backup_path`] guards against collisions
/// with a counter suffix.
pub const BACKUP_TIMESTAMP: &str = "%Y%m%d-%H%M%S";

/// Check whether a filesystem entry exists at `path` without following
/// symlinks.
///
/// A dangling symlink still counts as existing, which matters when a stale
/// link squats on a link target.
pub fn entry_exists(path: impl AsRef<Path>) -> bool {
    fs::symlink_metadata(path.as_ref()).is_ok()
}

/// Generate a fresh backup path beside `original`.
///
/// Produces `<original>.backup.<timestamp>`. Two backups of the same path
/// within the same second get a `-<n>` counter suffix instead of clobbering
/// each other.
pub fn backup_path(original: impl AsRef<Path>) -> PathBuf {
    let stamp = Local::now().format(BACKUP_TIMESTAMP);
    let base = format!("{}.backup.{stamp}", original.as_ref().display());

    let mut candidate = PathBuf::from(&base);
    let mut counter = 1;
    while entry_exists(&candidate) {
        candidate = PathBuf::from(format!("{base}-{counter}"));
        counter += 1;
    }

    candidate
}

/// Copy a single file, preserving its permissions.
///
/// # Errors
///
/// - Return [`FsError::Copy`] if the source cannot be read or the
///   destination cannot be written.
pub fn copy_file(src: impl AsRef<Path>, dst: impl AsRef<Path>) -> Result<()> {
    let (src, dst) = (src.as_ref(), dst.as_ref());
    if let Some(parent) = dst.parent() {
        mkdirp::mkdirp(parent).map_err(|err| FsError::CreateDir {
            source: err,
            path: parent.to_path_buf(),
        })?;
    }

    // std::fs::copy preserves the permission bits of the source.
    fs::copy(src, dst).map_err(|err| FsError::Copy {
        source: err,
        from: src.to_path_buf(),
        to: dst.to_path_buf(),
    })?;

    Ok(())
}

/// Recursively copy a directory tree, preserving permissions.
///
/// # Errors
///
/// - Return [`FsError::CreateDir`] if a destination directory cannot be
///   created.
/// - Return [`FsError::Copy`] if any entry cannot be copied.
pub fn copy_dir(src: impl AsRef<Path>, dst: impl AsRef<Path>) -> Result<()> {
    let (src, dst) = (src.as_ref(), dst.as_ref());
    let metadata = fs::metadata(src).map_err(|err| FsError::Copy {
        source: err,
        from: src.to_path_buf(),
        to: dst.to_path_buf(),
    })?;

    mkdirp::mkdirp(dst).map_err(|err| FsError::CreateDir {
        source: err,
        path: dst.to_path_buf(),
    })?;
    fs::set_permissions(dst, metadata.permissions()).map_err(|err| FsError::Copy {
        source: err,
        from: src.to_path_buf(),
        to: dst.to_path_buf(),
    })?;

    let entries = fs::read_dir(src).map_err(|err| FsError::Copy {
        source: err,
        from: src.to_path_buf(),
        to: dst.to_path_buf(),
    })?;

    for entry in entries {
        let entry = entry.map_err(|err| FsError::Copy {
            source: err,
            from: src.to_path_buf(),
            to: dst.to_path_buf(),
        })?;
        let from = entry.path();
        let to = dst.join(entry.file_name());

        if from.is_dir() {
            copy_dir(&from, &to)?;
        } else {
            copy_file(&from, &to)?;
        }
    }

    Ok(())
}

/// Write a whole file crash-atomically.
///
/// Writes to a temporary sibling first, then renames over the destination,
/// so readers never observe a half-written document.
///
/// # Errors
///
/// - Return [`FsError::Write`] if the temporary file cannot be written or
///   renamed into place.
pub fn atomic_write(path: impl AsRef<Path>, contents: impl AsRef<[u8]>) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        mkdirp::mkdirp(parent).map_err(|err| FsError::CreateDir {
            source: err,
            path: parent.to_path_buf(),
        })?;
    }

    // INVARIANT: Temp file lives in the same directory as the destination,
    // otherwise the final rename is not guaranteed to be atomic.
    let tmp = path.with_extension("tmp.dotweave");
    let write = |tmp: &Path| -> std::io::Result<()> {
        let mut file = fs::File::create(tmp)?;
        file.write_all(contents.as_ref())?;
        file.sync_all()?;
        Ok(())
    };

    if let Err(err) = write(&tmp).and_then(|()| fs::rename(&tmp, path)) {
        let _ = fs::remove_file(&tmp);
        return Err(FsError::Write {
            source: err,
            path: path.to_path_buf(),
        });
    }

    Ok(())
}

/// Create a symlink at `target` pointing at `source`.
///
/// # Errors
///
/// - Return [`FsError::Symlink`] if the link cannot be created.
#[cfg(unix)]
pub fn symlink(source: impl AsRef<Path>, target: impl AsRef<Path>) -> Result<()> {
    std::os::unix::fs::symlink(source.as_ref(), target.as_ref()).map_err(|err| FsError::Symlink {
        source: err,
        target: target.as_ref().to_path_buf(),
    })
}

#[cfg(windows)]
pub fn symlink(source: impl AsRef<Path>, target: impl AsRef<Path>) -> Result<()> {
    let link = if source.as_ref().is_dir() {
        std::os::windows::fs::symlink_dir(source.as_ref(), target.as_ref())
    } else {
        std::os::windows::fs::symlink_file(source.as_ref(), target.as_ref())
    };

    link.map_err(|err| FsError::Symlink {
        source: err,
        target: target.as_ref().to_path_buf(),
    })
}

/// Filesystem helper error types.
#[derive(Debug, thiserror::Error)]
pub enum FsError {
    /// Directory cannot be created.
    #[error("failed to create directory at {:?}", path.display())]
    CreateDir {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// File or directory tree cannot be copied.
    #[error("failed to copy {:?} to {:?}", from.display(), to.display())]
    Copy {
        #[source]
        source: std::io::Error,
        from: PathBuf,
        to: PathBuf,
    },

    /// Whole-file write cannot be completed.
    #[error("failed to write {:?}", path.display())]
    Write {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Symlink cannot be created.
    #[error("failed to create symlink at {:?}", target.display())]
    Symlink {
        #[source]
        source: std::io::Error,
        target: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = FsError> = std::result::Result<T, E>;
