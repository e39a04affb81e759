// SPDX-FileCopyrightText: 2026 Dotweave Contributors
// SPDX-License-Identifier: MIT

//! Path resolution utilities.
//!
//! Determine relevant path information for the manifest document, the
//! dotfiles root, and user-supplied target paths.

use std::path::{Component, Path, PathBuf};

/// Determine absolute path to user's home directory.
///
/// Does not check if the path returned actually exists.
///
/// # Errors
///
/// - Return [`NoWayHome`] if home directory path cannot be determined.
pub fn home_dir() -> Result<PathBuf, NoWayHome> {
    dirs::home_dir().ok_or(NoWayHome)
}

/// Determine default absolute path to dotweave's configuration root.
///
/// Uses XDG Base Directory path `$XDG_CONFIG_HOME/dotweave` as the default
/// absolute path. The manifest document, canonical sources, templates, and
/// snapshot backups all live underneath it. Does not check if the path
/// returned actually exists.
///
/// # See Also
///
/// - [XDG Base Directory](https://wiki.archlinux.org/title/XDG_Base_Directory)
pub fn default_config_dir() -> Result<PathBuf, NoWayHome> {
    dirs::config_dir()
        .map(|path| path.join("dotweave"))
        .ok_or(NoWayHome)
}

/// Expand a user-supplied path into an absolute target path.
///
/// Performs shell expansion (`~`, `$VAR`), then anchors any still-relative
/// path to the user's home directory. A bare `.vimrc` therefore resolves to
/// `$HOME/.vimrc`, matching how dotfiles are usually addressed.
///
/// # Errors
///
/// - Return [`ExpandError::ShellExpansion`] if expansion references an
///   undefined variable.
/// - Return [`ExpandError::NoWayHome`] if a relative path is given but the
///   home directory cannot be determined.
pub fn expand_target(path: impl AsRef<str>) -> Result<PathBuf> {
    let expanded = PathBuf::from(shellexpand::full(path.as_ref())?.into_owned());
    if expanded.is_absolute() {
        return Ok(expanded);
    }

    Ok(home_dir()?.join(expanded))
}

/// Check that a relative source path stays inside the dotfiles root.
///
/// Rejects absolute paths and any `..` component, so the joined path can
/// never traverse outside the root.
pub fn is_contained(source: impl AsRef<Path>) -> bool {
    let source = source.as_ref();
    if source.is_absolute() {
        return false;
    }

    source
        .components()
        .all(|part| matches!(part, Component::Normal(_) | Component::CurDir))
}

/// No way to determine user's home directory.
///
/// # See Also
///
/// - [`dirs::home_dir`](https://docs.rs/dirs/latest/dirs/fn.home_dir.html)
#[derive(Clone, Debug, thiserror::Error)]
#[error("cannot determine absolute path to user's home directory")]
pub struct NoWayHome;

/// Target path expansion error types.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ExpandError {
    /// Shell expansion references something undefined.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),

    /// Relative path given, but home directory is unknown.
    #[error(transparent)]
    NoWayHome(#[from] NoWayHome),
}

/// Friendly result alias :3
pub type Result<T, E = ExpandError> = std::result::Result<T, E>;
