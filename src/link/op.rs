// SPDX-FileCopyrightText: 2026 Dotweave Contributors
// SPDX-License-Identifier: MIT

//! Reversible filesystem operations.
//!
//! An [`Operation`] is one unit of reversible filesystem work. It captures
//! whatever pre-state it needs for undo while executing (did I create this
//! path, did I move something aside and where to), so a later
//! [`rollback`](Operation::rollback) can restore the filesystem without
//! consulting anything else. Operations are built by the planner, executed
//! at most once by a [`Transaction`](crate::link::Transaction), and never
//! reused.

use crate::{
    fsutil::{self, FsError},
    template::{render_file, TemplateContext, TemplateError},
};

use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::{debug, warn};

/// One unit of reversible filesystem work.
///
/// Rolling back an operation that never executed is a no-op, and rolling
/// back twice undoes nothing the second time; implementations clear their
/// captured pre-state as they consume it.
pub trait Operation {
    /// Apply the operation to the filesystem.
    fn execute(&mut self) -> Result<()>;

    /// Undo whatever [`execute`](Operation::execute) managed to apply.
    ///
    /// Best-effort: all undo substeps are attempted even if one fails, and
    /// failures are aggregated into [`OpError::RollbackIncomplete`].
    fn rollback(&mut self) -> Result<()>;

    /// Human-readable description for diagnostics.
    fn describe(&self) -> String;

    /// Name of the tracked file this operation belongs to.
    fn owner(&self) -> &str;
}

/// Move an existing entry at `path` aside to a timestamped backup.
///
/// Returns the backup path, or `None` when nothing occupied `path`.
/// Detects entries via lstat, so a dangling symlink is backed up too.
fn backup_aside(path: &Path) -> Result<Option<PathBuf>> {
    if !fsutil::entry_exists(path) {
        return Ok(None);
    }

    let backup = fsutil::backup_path(path);
    fs::rename(path, &backup).map_err(|err| OpError::Io {
        action: "back up",
        source: err,
        path: path.to_path_buf(),
    })?;
    debug!("backed up {:?} to {:?}", path.display(), backup.display());

    Ok(Some(backup))
}

/// Restore a backup made by [`backup_aside`] to its original path.
fn restore_backup(backup: &Path, original: &Path) -> Result<()> {
    fs::rename(backup, original).map_err(|err| OpError::Io {
        action: "restore backup of",
        source: err,
        path: original.to_path_buf(),
    })
}

/// Remove whatever entry sits at `path`, file, symlink, or directory tree.
fn remove_entry(path: &Path) -> Result<()> {
    let metadata = fs::symlink_metadata(path).map_err(|err| OpError::Io {
        action: "inspect",
        source: err,
        path: path.to_path_buf(),
    })?;

    let removal = if metadata.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };

    removal.map_err(|err| OpError::Io {
        action: "remove",
        source: err,
        path: path.to_path_buf(),
    })
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        mkdirp::mkdirp(parent).map_err(|err| OpError::Io {
            action: "create parent directory of",
            source: err,
            path: path.to_path_buf(),
        })?;
    }

    Ok(())
}

/// Symlink creation with backup-on-conflict.
///
/// Execute renames any existing target entry aside to a timestamped
/// backup, then creates a symlink at the target pointing at the source.
/// Rollback removes the symlink and restores the backup.
#[derive(Debug)]
pub struct LinkOp {
    owner: String,
    source: PathBuf,
    target: PathBuf,
    backup: Option<PathBuf>,
    created: bool,
}

impl LinkOp {
    pub fn new(
        owner: impl Into<String>,
        source: impl Into<PathBuf>,
        target: impl Into<PathBuf>,
    ) -> Self {
        Self {
            owner: owner.into(),
            source: source.into(),
            target: target.into(),
            backup: None,
            created: false,
        }
    }

    /// Backup path captured during execute, if any entry was moved aside.
    pub fn backup(&self) -> Option<&Path> {
        self.backup.as_deref()
    }
}

impl Operation for LinkOp {
    fn execute(&mut self) -> Result<()> {
        self.backup = backup_aside(&self.target)?;
        ensure_parent(&self.target)?;
        fsutil::symlink(&self.source, &self.target)?;
        self.created = true;
        debug!(
            "linked {:?} -> {:?}",
            self.target.display(),
            self.source.display()
        );

        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        let mut failures = Vec::new();

        // INVARIANT: Both substeps are attempted even if one fails.
        if self.created {
            match remove_entry(&self.target) {
                Ok(()) => self.created = false,
                Err(err) => failures.push(err),
            }
        }
        if let Some(backup) = self.backup.take() {
            if let Err(err) = restore_backup(&backup, &self.target) {
                self.backup = Some(backup);
                failures.push(err);
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(OpError::RollbackIncomplete { failures })
        }
    }

    fn describe(&self) -> String {
        format!(
            "link {} -> {}",
            self.target.display(),
            self.source.display()
        )
    }

    fn owner(&self) -> &str {
        &self.owner
    }
}

/// File or directory copy with backup-on-conflict.
///
/// A missing source is the sentinel for "no canonical artifact exists
/// yet": execute then writes a generated placeholder instead of copying
/// (a directory when the tracked entry is directory-shaped). Rollback
/// removes the created artifact and restores any backup.
#[derive(Debug)]
pub struct CopyOp {
    owner: String,
    source: Option<PathBuf>,
    target: PathBuf,
    directory: bool,
    backup: Option<PathBuf>,
    created: bool,
}

impl CopyOp {
    /// Copy an existing file or directory tree to `target`.
    pub fn new(
        owner: impl Into<String>,
        source: impl Into<PathBuf>,
        target: impl Into<PathBuf>,
    ) -> Self {
        Self {
            owner: owner.into(),
            source: Some(source.into()),
            target: target.into(),
            directory: false,
            backup: None,
            created: false,
        }
    }

    /// Generate a placeholder artifact at `target` instead of copying.
    pub fn placeholder(
        owner: impl Into<String>,
        target: impl Into<PathBuf>,
        directory: bool,
    ) -> Self {
        Self {
            owner: owner.into(),
            source: None,
            target: target.into(),
            directory,
            backup: None,
            created: false,
        }
    }

    fn placeholder_contents(&self) -> String {
        format!("# {} configuration\n# Managed by dotweave\n", self.owner)
    }
}

impl Operation for CopyOp {
    fn execute(&mut self) -> Result<()> {
        self.backup = backup_aside(&self.target)?;

        // INVARIANT: Marked before the copy starts. A directory copy can
        // fail partway and leave a partial artifact at the target, which
        // rollback must still remove before restoring the backup.
        self.created = true;

        match &self.source {
            None if self.directory => {
                mkdirp::mkdirp(&self.target).map_err(|err| OpError::Io {
                    action: "create placeholder directory at",
                    source: err,
                    path: self.target.clone(),
                })?;
            }
            None => {
                ensure_parent(&self.target)?;
                fs::write(&self.target, self.placeholder_contents()).map_err(|err| {
                    OpError::Io {
                        action: "write placeholder at",
                        source: err,
                        path: self.target.clone(),
                    }
                })?;
            }
            Some(source) if source.is_dir() => fsutil::copy_dir(source, &self.target)?,
            Some(source) => fsutil::copy_file(source, &self.target)?,
        }

        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        let mut failures = Vec::new();

        if self.created {
            if !fsutil::entry_exists(&self.target) {
                // Execute failed before anything reached the target.
                self.created = false;
            } else {
                match remove_entry(&self.target) {
                    Ok(()) => self.created = false,
                    Err(err) => failures.push(err),
                }
            }
        }
        if let Some(backup) = self.backup.take() {
            if let Err(err) = restore_backup(&backup, &self.target) {
                self.backup = Some(backup);
                failures.push(err);
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(OpError::RollbackIncomplete { failures })
        }
    }

    fn describe(&self) -> String {
        match &self.source {
            Some(source) => format!(
                "copy {} -> {}",
                source.display(),
                self.target.display()
            ),
            None => format!("create placeholder at {}", self.target.display()),
        }
    }

    fn owner(&self) -> &str {
        &self.owner
    }
}

/// Template rendering with backup-on-conflict.
///
/// Execute backs up any existing output, renders the template against the
/// captured context, and writes the result. A render failure surfaces the
/// template path and the underlying syntax error; the backup is restored
/// by rollback.
#[derive(Debug)]
pub struct TemplateOp {
    owner: String,
    template: PathBuf,
    output: PathBuf,
    context: TemplateContext,
    backup: Option<PathBuf>,
    created: bool,
}

impl TemplateOp {
    pub fn new(
        owner: impl Into<String>,
        template: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
        context: TemplateContext,
    ) -> Self {
        Self {
            owner: owner.into(),
            template: template.into(),
            output: output.into(),
            context,
            backup: None,
            created: false,
        }
    }
}

impl Operation for TemplateOp {
    fn execute(&mut self) -> Result<()> {
        self.backup = backup_aside(&self.output)?;
        let rendered = render_file(&self.template, &self.context)?;

        ensure_parent(&self.output)?;
        // Marked before the write; a failed write can leave a partial file.
        self.created = true;
        fs::write(&self.output, rendered).map_err(|err| OpError::Io {
            action: "write rendered template to",
            source: err,
            path: self.output.clone(),
        })?;

        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        let mut failures = Vec::new();

        if self.created {
            if !fsutil::entry_exists(&self.output) {
                self.created = false;
            } else {
                match remove_entry(&self.output) {
                    Ok(()) => self.created = false,
                    Err(err) => failures.push(err),
                }
            }
        }
        if let Some(backup) = self.backup.take() {
            if let Err(err) = restore_backup(&backup, &self.output) {
                self.backup = Some(backup);
                failures.push(err);
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            warn!(
                "rollback of template render for {} incomplete",
                self.owner
            );
            Err(OpError::RollbackIncomplete { failures })
        }
    }

    fn describe(&self) -> String {
        format!(
            "render {} -> {}",
            self.template.display(),
            self.output.display()
        )
    }

    fn owner(&self) -> &str {
        &self.owner
    }
}

fn join_failures(failures: &[OpError]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Operation error types.
#[derive(Debug, thiserror::Error)]
pub enum OpError {
    /// Raw filesystem action failed.
    #[error("failed to {action} {:?}", path.display())]
    Io {
        action: &'static str,
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Filesystem helper failed.
    #[error(transparent)]
    Fs(#[from] FsError),

    /// Template lookup or rendering failed.
    #[error(transparent)]
    Template(#[from] TemplateError),

    /// One or more undo substeps failed; every cause is preserved.
    #[error("rollback incomplete: {}", join_failures(failures))]
    RollbackIncomplete { failures: Vec<OpError> },
}

/// Friendly result alias :3
pub type Result<T, E = OpError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn link_backs_up_existing_target_and_restores_on_rollback() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let source = tmp.path().join("dotfiles").join("vimrc");
        fs::create_dir_all(source.parent().unwrap())?;
        fs::write(&source, "canonical")?;
        let target = tmp.path().join(".vimrc");
        fs::write(&target, "original")?;

        let mut op = LinkOp::new(".vimrc", &source, &target);
        op.execute()?;

        assert_eq!(fs::read_link(&target)?, source);
        let backup = op.backup().unwrap().to_path_buf();
        assert_eq!(fs::read_to_string(&backup)?, "original");

        op.rollback()?;
        assert_eq!(fs::read_to_string(&target)?, "original");
        assert!(!fsutil::entry_exists(&backup));
        Ok(())
    }

    #[test]
    fn link_backs_up_stale_symlink() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let source = tmp.path().join("source");
        fs::write(&source, "x")?;
        let target = tmp.path().join(".zshrc");
        fsutil::symlink(tmp.path().join("gone"), &target)?;

        let mut op = LinkOp::new(".zshrc", &source, &target);
        op.execute()?;

        assert_eq!(fs::read_link(&target)?, source);
        assert!(op.backup().is_some());
        Ok(())
    }

    #[test]
    fn rollback_without_execute_is_a_noop() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let target = tmp.path().join(".vimrc");
        fs::write(&target, "keep me")?;

        let mut op = LinkOp::new(".vimrc", tmp.path().join("source"), &target);
        op.rollback()?;
        assert_eq!(fs::read_to_string(&target)?, "keep me");

        let mut op = CopyOp::placeholder(".vimrc", &target, false);
        op.rollback()?;
        assert_eq!(fs::read_to_string(&target)?, "keep me");
        Ok(())
    }

    #[test]
    fn rollback_twice_undoes_nothing_the_second_time() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let source = tmp.path().join("source");
        fs::write(&source, "x")?;
        let target = tmp.path().join(".tmux.conf");

        let mut op = LinkOp::new(".tmux.conf", &source, &target);
        op.execute()?;
        op.rollback()?;
        assert!(!fsutil::entry_exists(&target));

        // A later state change must survive the second rollback.
        fs::write(&target, "newer")?;
        op.rollback()?;
        assert_eq!(fs::read_to_string(&target)?, "newer");
        Ok(())
    }

    #[test]
    fn copy_placeholder_and_rollback() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let target = tmp.path().join("git").join("gitconfig");

        let mut op = CopyOp::placeholder(".gitconfig", &target, false);
        op.execute()?;
        let contents = fs::read_to_string(&target)?;
        assert!(contents.contains(".gitconfig configuration"));

        op.rollback()?;
        assert!(!fsutil::entry_exists(&target));
        Ok(())
    }

    #[test]
    fn directory_placeholder_creates_and_removes_a_directory() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let target = tmp.path().join("editor").join("nvim");

        let mut op = CopyOp::placeholder("nvim", &target, true);
        op.execute()?;
        assert!(target.is_dir());

        op.rollback()?;
        assert!(!fsutil::entry_exists(&target));
        Ok(())
    }

    #[test]
    fn copy_preserves_directory_trees() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let src = tmp.path().join("nvim");
        fs::create_dir_all(src.join("lua"))?;
        fs::write(src.join("init.lua"), "require('opts')")?;
        fs::write(src.join("lua").join("opts.lua"), "return {}")?;

        let dst = tmp.path().join("dotfiles").join("nvim");
        let mut op = CopyOp::new("nvim", &src, &dst);
        op.execute()?;
        assert_eq!(
            fs::read_to_string(dst.join("lua").join("opts.lua"))?,
            "return {}"
        );

        op.rollback()?;
        assert!(!fsutil::entry_exists(&dst));
        Ok(())
    }

    #[test]
    fn failed_directory_copy_rolls_back_to_the_original_target() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let src = tmp.path().join("nvim");
        fs::create_dir_all(&src)?;
        fs::write(src.join("init.lua"), "require('opts')")?;
        // A dangling symlink makes the tree copy fail partway through.
        fsutil::symlink(tmp.path().join("gone"), src.join("broken"))?;

        let target = tmp.path().join("dotfiles").join("nvim");
        fs::create_dir_all(target.parent().unwrap())?;
        fs::write(&target, "plain file")?;

        let mut op = CopyOp::new("nvim", &src, &target);
        op.execute().unwrap_err();

        // Rollback removes the partial directory and restores the backup.
        op.rollback()?;
        assert!(target.is_file());
        assert_eq!(fs::read_to_string(&target)?, "plain file");
        Ok(())
    }

    #[test]
    fn template_render_failure_leaves_backup_restorable() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let template = tmp.path().join("gitconfig.tmpl");
        fs::write(&template, "{{ undefined_variable }}")?;
        let output = tmp.path().join("git").join("gitconfig");
        fs::create_dir_all(output.parent().unwrap())?;
        fs::write(&output, "previous")?;

        let mut op = TemplateOp::new(
            ".gitconfig",
            &template,
            &output,
            TemplateContext::dummy(),
        );
        let err = op.execute().unwrap_err();
        assert!(err.to_string().contains("gitconfig.tmpl"));

        // Execute moved the old output aside before rendering failed;
        // rollback must put it back.
        op.rollback()?;
        assert_eq!(fs::read_to_string(&output)?, "previous");
        Ok(())
    }
}
