// SPDX-FileCopyrightText: 2026 Dotweave Contributors
// SPDX-License-Identifier: MIT

//! On-disk home of the manifest and the dotfiles tree.
//!
//! Dotweave keeps everything under one configuration directory, by default
//! `$XDG_CONFIG_HOME/dotweave`:
//!
//! ```text
//! dotweave/
//!   manifest.toml     tracked files, categories, variables
//!   dotfiles/         the sources that targets symlink back to
//!   templates/        template sources, seeded with starters on init
//!   backups/          timestamped snapshots taken before risky runs
//! ```
//!
//! Loading is tolerant: a missing manifest yields a fresh default one, and
//! a corrupt manifest is warned about and replaced by defaults rather than
//! aborting the whole program. Saving is crash-atomic through a sibling
//! temp file renamed into place.

use crate::{
    fsutil::{self, FsError},
    manifest::Manifest,
};

use chrono::Local;
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::{debug, instrument, warn};

/// Manifest file name inside the configuration directory.
pub const MANIFEST_FILE: &str = "manifest.toml";

/// Starter templates seeded by `init`, as (relative path, contents) pairs.
const STARTER_TEMPLATES: [(&str, &str); 3] = [
    (
        "gitconfig.tmpl",
        "\
[user]
\tname = {{ user }}
{{ if contains(hostname, \"work\") }}
\temail = {{ user }}@company.example
{{ else }}
\temail = {{ user }}@users.noreply.github.com
{{ end }}
[core]
\teditor = {{ editor }}
",
    ),
    (
        "zshrc.tmpl",
        "\
export EDITOR={{ editor }}
export SHELL={{ shell }}
{{ if hasprefix(hostname, \"work\") }}
export HTTP_PROXY=http://proxy.internal:8080
{{ end }}
",
    ),
    (
        "vimrc.tmpl",
        "\
set nocompatible
syntax on
\" Generated for {{ user }}@{{ hostname }}
",
    ),
];

/// Handle on the dotweave configuration directory.
#[derive(Debug, Clone)]
pub struct Store {
    config_dir: PathBuf,
}

impl Store {
    pub fn open(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
        }
    }

    /// Path of the manifest file.
    pub fn manifest_path(&self) -> PathBuf {
        self.config_dir.join(MANIFEST_FILE)
    }

    /// Default dotfiles root for a fresh manifest.
    pub fn dotfiles_dir(&self) -> PathBuf {
        self.config_dir.join("dotfiles")
    }

    /// Directory of template sources.
    pub fn templates_dir(&self) -> PathBuf {
        self.config_dir.join("templates")
    }

    /// Directory of timestamped snapshots.
    pub fn backups_dir(&self) -> PathBuf {
        self.config_dir.join("backups")
    }

    /// Directories searched for template sources, most specific first.
    pub fn template_dirs(&self, manifest: &Manifest) -> Vec<PathBuf> {
        vec![self.templates_dir(), manifest.dotfiles_dir.clone()]
    }

    /// Load the manifest, falling back to defaults when absent or corrupt.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::Read`] if the manifest exists but cannot be
    ///   read at all.
    #[instrument(skip(self), level = "debug")]
    pub fn load(&self) -> Result<Manifest> {
        let path = self.manifest_path();
        if !path.exists() {
            debug!("no manifest at {}, starting fresh", path.display());
            return Ok(Manifest::new(self.dotfiles_dir()));
        }

        let text = fs::read_to_string(&path).map_err(|source| StoreError::Read {
            source,
            path: path.clone(),
        })?;
        match text.parse::<Manifest>() {
            Ok(mut manifest) => {
                manifest.refresh_statuses();
                Ok(manifest)
            }
            Err(err) => {
                warn!("manifest at {} is corrupt ({err}), using defaults", path.display());
                Ok(Manifest::new(self.dotfiles_dir()))
            }
        }
    }

    /// Persist the manifest through a temp file renamed into place.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::Fs`] if the write or rename failed.
    #[instrument(skip(self, manifest), level = "debug")]
    pub fn save(&self, manifest: &Manifest) -> Result<()> {
        fsutil::atomic_write(self.manifest_path(), manifest.to_string())?;
        Ok(())
    }

    /// Create the store layout and seed starter templates.
    ///
    /// Safe to run on an existing store: directories that exist are left
    /// alone and starter templates never overwrite user files.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::Fs`] if a directory or starter file could not
    ///   be created.
    #[instrument(skip(self), level = "debug")]
    pub fn init(&self) -> Result<()> {
        for dir in [
            self.config_dir.clone(),
            self.dotfiles_dir(),
            self.templates_dir(),
            self.backups_dir(),
        ] {
            mkdirp::mkdirp(&dir).map_err(|source| FsError::CreateDir {
                source,
                path: dir.clone(),
            })?;
        }

        for (name, contents) in STARTER_TEMPLATES {
            let path = self.templates_dir().join(name);
            if path.exists() {
                continue;
            }
            fsutil::atomic_write(&path, contents)?;
        }

        Ok(())
    }

    /// Snapshot every tracked target into `backups/<timestamp>/`.
    ///
    /// Targets that are symlinks are skipped, they carry no content of
    /// their own. Returns the snapshot directory and how many entries were
    /// copied into it.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::Fs`] if the snapshot directory or a copy
    ///   inside it could not be created.
    #[instrument(skip(self, manifest), level = "debug")]
    pub fn backup_all(&self, manifest: &Manifest) -> Result<(PathBuf, usize)> {
        let stamp = Local::now().format(fsutil::BACKUP_TIMESTAMP).to_string();
        let snapshot = self.backups_dir().join(stamp);
        mkdirp::mkdirp(&snapshot).map_err(|source| FsError::CreateDir {
            source,
            path: snapshot.clone(),
        })?;

        let mut copied = 0;
        for file in manifest.files() {
            let target = &file.target;
            if target.is_symlink() || !fsutil::entry_exists(target) {
                continue;
            }

            let dst = snapshot.join(backup_entry_name(target, &file.name));
            if target.is_dir() {
                fsutil::copy_dir(target, &dst)?;
            } else {
                fsutil::copy_file(target, &dst)?;
            }
            debug!("snapshot {} -> {}", target.display(), dst.display());
            copied += 1;
        }

        Ok((snapshot, copied))
    }
}

// Leading dots would hide snapshot entries from a plain `ls`.
fn backup_entry_name(target: &Path, fallback: &str) -> String {
    let name = target
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| fallback.to_string());
    name.trim_start_matches('.').to_string()
}

/// All possible error types for store interaction.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("cannot read manifest at {path}")]
    Read {
        source: std::io::Error,
        path: PathBuf,
    },

    #[error(transparent)]
    Fs(#[from] FsError),
}

/// Friendly result alias :3
pub type Result<T, E = StoreError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::TrackedFile;
    use pretty_assertions::assert_eq;
    use std::fs;

    #[test]
    fn missing_manifest_loads_defaults() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let store = Store::open(tmp.path());

        let manifest = store.load()?;
        assert_eq!(manifest.dotfiles_dir, store.dotfiles_dir());
        assert!(manifest.files().is_empty());
        Ok(())
    }

    #[test]
    fn corrupt_manifest_loads_defaults() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let store = Store::open(tmp.path());
        fs::write(store.manifest_path(), "not [ valid { toml")?;

        let manifest = store.load()?;
        assert!(manifest.files().is_empty());
        Ok(())
    }

    #[test]
    fn save_then_load_round_trips_tracked_files() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let store = Store::open(tmp.path());

        let mut manifest = store.load()?;
        manifest.add_file(TrackedFile {
            name: ".gitconfig".into(),
            source: "git/gitconfig".into(),
            target: tmp.path().join(".gitconfig"),
            category: "git".into(),
            ..Default::default()
        })?;
        store.save(&manifest)?;

        let loaded = store.load()?;
        assert_eq!(loaded.files().len(), 1);
        assert_eq!(loaded.files()[0].name, ".gitconfig");
        assert_eq!(loaded.files()[0].category, "git");
        Ok(())
    }

    #[test]
    fn init_seeds_starters_without_clobbering() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let store = Store::open(tmp.path());
        store.init()?;

        let seeded = store.templates_dir().join("zshrc.tmpl");
        assert!(seeded.exists());
        fs::write(&seeded, "mine now")?;

        store.init()?;
        assert_eq!(fs::read_to_string(&seeded)?, "mine now");
        Ok(())
    }

    #[test]
    fn backup_all_copies_real_files_and_skips_symlinks() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let store = Store::open(tmp.path().join("config"));
        store.init()?;

        let vimrc = tmp.path().join(".vimrc");
        fs::write(&vimrc, "set number")?;
        let linked = tmp.path().join(".zshrc");
        crate::fsutil::symlink(&vimrc, &linked)?;

        let mut manifest = store.load()?;
        manifest.add_file(TrackedFile {
            name: ".vimrc".into(),
            source: "editor/vimrc".into(),
            target: vimrc.clone(),
            category: "editor".into(),
            ..Default::default()
        })?;
        manifest.add_file(TrackedFile {
            name: ".zshrc".into(),
            source: "shell/zshrc".into(),
            target: linked,
            category: "shell".into(),
            ..Default::default()
        })?;

        let (snapshot, copied) = store.backup_all(&manifest)?;
        assert_eq!(copied, 1);
        assert_eq!(fs::read_to_string(snapshot.join("vimrc"))?, "set number");
        Ok(())
    }
}
