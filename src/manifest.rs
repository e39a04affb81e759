// SPDX-FileCopyrightText: 2026 Dotweave Contributors
// SPDX-License-Identifier: MIT

//! Manifest document layout.
//!
//! The manifest is the single persisted document of dotweave: the full set
//! of tracked files plus global configuration (dotfiles root, categories,
//! template extensions, editor and shell preferences, global template
//! variables). File I/O is left to [`crate::store`]; this module only
//! specifies the layout and the validated accessors through which the
//! manifest may be mutated.
//!
//! # Invariants
//!
//! - Target paths are unique across all tracked files.
//! - Source paths are relative and never escape the dotfiles root.
//! - A tracked file's category is either empty or one of the declared
//!   categories.
//!
//! Every mutating accessor checks its invariant before committing the
//! change, so a rejected mutation leaves the manifest untouched.

use crate::path::is_contained;

use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    fs,
    path::PathBuf,
    str::FromStr,
};

/// Default category set for fresh manifests.
pub const DEFAULT_CATEGORIES: [&str; 6] = ["shell", "editor", "git", "terminal", "misc", "custom"];

/// Default template file extensions.
pub const DEFAULT_TEMPLATE_EXTS: [&str; 3] = [".tmpl", ".template", ".tpl"];

/// One managed configuration artifact.
///
/// The canonical copy lives at `source` (relative to the dotfiles root)
/// and must appear at `target` as a symlink once linked.
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct TrackedFile {
    /// Display identifier, e.g. ".gitconfig".
    pub name: String,

    /// Path of the canonical artifact, relative to the dotfiles root.
    pub source: PathBuf,

    /// Absolute path where the artifact must appear as a symlink.
    pub target: PathBuf,

    /// Grouping tag; must belong to the manifest's category set.
    #[serde(default)]
    pub category: String,

    /// Whether the canonical artifact is generated from a template.
    #[serde(default)]
    pub template: bool,

    /// File-specific template variables, merged over the global table.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub variables: BTreeMap<String, String>,

    /// Display-only: target is a symlink pointing at the resolved source.
    /// Recomputed on demand, never persisted.
    #[serde(skip)]
    pub is_linked: bool,

    /// Display-only: target exists but is not the expected symlink.
    #[serde(skip)]
    pub has_conflict: bool,
}

/// The manifest document.
///
/// Serialized as TOML with tracked files as an array of tables. Tracked
/// files are private so that every mutation funnels through the validated
/// accessors.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Manifest {
    /// Absolute path of the dotfiles root holding canonical sources.
    pub dotfiles_dir: PathBuf,

    /// Declared category set.
    #[serde(default)]
    categories: Vec<String>,

    /// Recognized template file extensions, in lookup order.
    #[serde(default)]
    pub template_exts: Vec<String>,

    /// Preferred editor binary.
    #[serde(default)]
    pub editor: String,

    /// Preferred shell.
    #[serde(default)]
    pub shell: String,

    /// Global template variables.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    variables: BTreeMap<String, String>,

    /// Tracked files.
    #[serde(default, rename = "file", skip_serializing_if = "Vec::is_empty")]
    files: Vec<TrackedFile>,
}

impl Manifest {
    /// Construct an empty manifest rooted at `dotfiles_dir` with documented
    /// defaults for categories, template extensions, editor, and shell.
    pub fn new(dotfiles_dir: impl Into<PathBuf>) -> Self {
        Self {
            dotfiles_dir: dotfiles_dir.into(),
            categories: DEFAULT_CATEGORIES.map(String::from).to_vec(),
            template_exts: DEFAULT_TEMPLATE_EXTS.map(String::from).to_vec(),
            editor: "vim".into(),
            shell: "bash".into(),
            variables: BTreeMap::new(),
            files: Vec::new(),
        }
    }

    /// Currently tracked files.
    pub fn files(&self) -> &[TrackedFile] {
        &self.files
    }

    /// Find a tracked file by name.
    pub fn file(&self, name: impl AsRef<str>) -> Option<&TrackedFile> {
        self.files.iter().find(|file| file.name == name.as_ref())
    }

    /// Declared category set.
    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    /// Global template variables.
    pub fn variables(&self) -> &BTreeMap<String, String> {
        &self.variables
    }

    /// Resolve the absolute path of a tracked file's canonical source.
    pub fn resolve_source(&self, file: &TrackedFile) -> PathBuf {
        self.dotfiles_dir.join(&file.source)
    }

    /// Merge global variables with a file's overrides; the file wins.
    pub fn merged_variables(&self, file: &TrackedFile) -> BTreeMap<String, String> {
        let mut merged = self.variables.clone();
        merged.extend(file.variables.clone());
        merged
    }

    /// Track a new file.
    ///
    /// # Errors
    ///
    /// - Return [`ManifestError::EmptyField`] if name, source, or target is
    ///   empty.
    /// - Return [`ManifestError::TargetNotAbsolute`] if target is relative.
    /// - Return [`ManifestError::DuplicateTarget`] if target is already
    ///   claimed by another tracked file.
    /// - Return [`ManifestError::SourceEscapesRoot`] if source is absolute
    ///   or contains `..` components.
    /// - Return [`ManifestError::UnknownCategory`] if category is set but
    ///   not declared.
    pub fn add_file(&mut self, file: TrackedFile) -> Result<()> {
        if file.name.is_empty() {
            return Err(ManifestError::EmptyField { field: "name" });
        }
        if file.source.as_os_str().is_empty() {
            return Err(ManifestError::EmptyField { field: "source" });
        }
        if file.target.as_os_str().is_empty() {
            return Err(ManifestError::EmptyField { field: "target" });
        }
        if !file.target.is_absolute() {
            return Err(ManifestError::TargetNotAbsolute {
                target: file.target.clone(),
            });
        }
        if let Some(existing) = self.files.iter().find(|entry| entry.target == file.target) {
            return Err(ManifestError::DuplicateTarget {
                target: file.target.clone(),
                existing: existing.name.clone(),
            });
        }
        if !is_contained(&file.source) {
            return Err(ManifestError::SourceEscapesRoot {
                path: file.source.clone(),
            });
        }
        if !file.category.is_empty() && !self.categories.contains(&file.category) {
            return Err(ManifestError::UnknownCategory {
                category: file.category.clone(),
            });
        }

        self.files.push(file);
        Ok(())
    }

    /// Stop tracking a file by name.
    ///
    /// # Errors
    ///
    /// - Return [`ManifestError::UnknownFile`] if no tracked file carries
    ///   the given name.
    pub fn remove_file(&mut self, name: impl AsRef<str>) -> Result<TrackedFile> {
        let position = self
            .files
            .iter()
            .position(|file| file.name == name.as_ref())
            .ok_or_else(|| ManifestError::UnknownFile {
                name: name.as_ref().into(),
            })?;

        Ok(self.files.remove(position))
    }

    /// Declare a new category.
    ///
    /// # Errors
    ///
    /// - Return [`ManifestError::EmptyField`] if the category is empty.
    /// - Return [`ManifestError::DuplicateCategory`] if already declared.
    pub fn add_category(&mut self, category: impl Into<String>) -> Result<()> {
        let category = category.into();
        if category.is_empty() {
            return Err(ManifestError::EmptyField { field: "category" });
        }
        if self.categories.contains(&category) {
            return Err(ManifestError::DuplicateCategory { category });
        }

        self.categories.push(category);
        Ok(())
    }

    /// Drop a declared category.
    ///
    /// # Errors
    ///
    /// - Return [`ManifestError::UnknownCategory`] if not declared.
    /// - Return [`ManifestError::CategoryInUse`] if any tracked file still
    ///   uses it.
    pub fn remove_category(&mut self, category: impl AsRef<str>) -> Result<()> {
        let category = category.as_ref();
        let position = self
            .categories
            .iter()
            .position(|entry| entry == category)
            .ok_or_else(|| ManifestError::UnknownCategory {
                category: category.into(),
            })?;

        if let Some(file) = self.files.iter().find(|file| file.category == category) {
            return Err(ManifestError::CategoryInUse {
                category: category.into(),
                file: file.name.clone(),
            });
        }

        self.categories.remove(position);
        Ok(())
    }

    /// Set a global template variable.
    pub fn set_variable(&mut self, key: impl Into<String>, value: impl Into<String>) -> Result<()> {
        let key = key.into();
        if key.is_empty() {
            return Err(ManifestError::EmptyField { field: "variable" });
        }

        self.variables.insert(key, value.into());
        Ok(())
    }

    /// Remove a global template variable.
    ///
    /// # Errors
    ///
    /// - Return [`ManifestError::UnknownVariable`] if not set.
    pub fn remove_variable(&mut self, key: impl AsRef<str>) -> Result<()> {
        self.variables
            .remove(key.as_ref())
            .map(|_| ())
            .ok_or_else(|| ManifestError::UnknownVariable {
                key: key.as_ref().into(),
            })
    }

    /// Recompute the display-only link status of every tracked file.
    ///
    /// `is_linked` means the target is a symlink whose destination equals
    /// the resolved source path; `has_conflict` means the target exists but
    /// is anything else. Never authoritative for linking decisions.
    pub fn refresh_statuses(&mut self) {
        let dotfiles_dir = self.dotfiles_dir.clone();
        for file in &mut self.files {
            let expected = dotfiles_dir.join(&file.source);
            file.is_linked = false;
            file.has_conflict = false;

            let Ok(metadata) = fs::symlink_metadata(&file.target) else {
                continue;
            };

            if metadata.file_type().is_symlink() {
                match fs::read_link(&file.target) {
                    Ok(destination) if destination == expected => file.is_linked = true,
                    _ => file.has_conflict = true,
                }
            } else {
                file.has_conflict = true;
            }
        }
    }

    /// Drop tracked files whose target duplicates an earlier entry.
    ///
    /// Loaded documents may carry duplicates written by older builds; the
    /// first entry wins, matching the uniqueness invariant enforced by
    /// [`Manifest::add_file`].
    fn dedup_targets(&mut self) {
        let mut seen: Vec<PathBuf> = Vec::new();
        self.files.retain(|file| {
            if seen.contains(&file.target) {
                return false;
            }
            seen.push(file.target.clone());
            true
        });
    }
}

impl FromStr for Manifest {
    type Err = ManifestError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut manifest: Manifest = toml::de::from_str(data).map_err(ManifestError::Deserialize)?;

        // INVARIANT: Perform shell expansion on the dotfiles root.
        manifest.dotfiles_dir = PathBuf::from(
            shellexpand::full(manifest.dotfiles_dir.to_string_lossy().as_ref())
                .map_err(ManifestError::ShellExpansion)?
                .into_owned(),
        );

        // Older documents may omit these tables entirely.
        if manifest.categories.is_empty() {
            manifest.categories = DEFAULT_CATEGORIES.map(String::from).to_vec();
        }
        if manifest.template_exts.is_empty() {
            manifest.template_exts = DEFAULT_TEMPLATE_EXTS.map(String::from).to_vec();
        }
        if manifest.editor.is_empty() {
            manifest.editor = "vim".into();
        }
        if manifest.shell.is_empty() {
            manifest.shell = "bash".into();
        }
        manifest.dedup_targets();

        Ok(manifest)
    }
}

impl Display for Manifest {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ManifestError::Serialize)?
                .as_str(),
        )
    }
}

/// Manifest error types.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    /// Failed to deserialize manifest document.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize manifest document.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Failed to perform shell expansion on manifest paths.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),

    /// Required field left empty.
    #[error("field '{field}' cannot be empty")]
    EmptyField { field: &'static str },

    /// Target path must be absolute.
    #[error("target {:?} must be an absolute path", target.display())]
    TargetNotAbsolute { target: PathBuf },

    /// Another tracked file already claims this target.
    #[error("target {:?} already tracked by '{existing}'", target.display())]
    DuplicateTarget { target: PathBuf, existing: String },

    /// Source path resolves outside the dotfiles root.
    #[error("source {:?} escapes the dotfiles root", path.display())]
    SourceEscapesRoot { path: PathBuf },

    /// Category is not declared in the manifest.
    #[error("category '{category}' is not declared")]
    UnknownCategory { category: String },

    /// Category is already declared.
    #[error("category '{category}' is already declared")]
    DuplicateCategory { category: String },

    /// Category is still used by a tracked file.
    #[error("category '{category}' is still used by '{file}'")]
    CategoryInUse { category: String, file: String },

    /// No tracked file carries this name.
    #[error("no tracked file named '{name}'")]
    UnknownFile { name: String },

    /// No global variable with this key.
    #[error("no global variable named '{key}'")]
    UnknownVariable { key: String },
}

impl From<ManifestError> for FmtError {
    fn from(_: ManifestError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
type Result<T, E = ManifestError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;

    fn tracked(name: &str, source: &str, target: &str) -> TrackedFile {
        TrackedFile {
            name: name.into(),
            source: source.into(),
            target: target.into(),
            category: "git".into(),
            ..Default::default()
        }
    }

    #[sealed_test(env = [("DOTS", "/home/blah/dotfiles")])]
    fn deserialize_manifest() -> anyhow::Result<()> {
        let result: Manifest = indoc! {r#"
            dotfiles_dir = "$DOTS"
            categories = ["shell", "git"]
            template_exts = [".tmpl"]
            editor = "nvim"
            shell = "zsh"

            [variables]
            email_domain = "example.com"

            [[file]]
            name = ".gitconfig"
            source = "git/gitconfig"
            target = "/home/blah/.gitconfig"
            category = "git"
            template = true
        "#}
        .parse()?;

        assert_eq!(result.dotfiles_dir, PathBuf::from("/home/blah/dotfiles"));
        assert_eq!(result.categories(), ["shell", "git"]);
        assert_eq!(result.editor, "nvim");
        assert_eq!(result.files().len(), 1);
        assert_eq!(result.files()[0].name, ".gitconfig");
        assert!(result.files()[0].template);
        assert_eq!(
            result.variables().get("email_domain"),
            Some(&"example.com".to_string())
        );

        Ok(())
    }

    #[test]
    fn parse_fills_defaults_and_dedups_targets() -> anyhow::Result<()> {
        let result: Manifest = indoc! {r#"
            dotfiles_dir = "/home/blah/dotfiles"

            [[file]]
            name = "first"
            source = "git/gitconfig"
            target = "/home/blah/.gitconfig"

            [[file]]
            name = "second"
            source = "git/other"
            target = "/home/blah/.gitconfig"
        "#}
        .parse()?;

        assert_eq!(result.categories(), DEFAULT_CATEGORIES);
        assert_eq!(result.template_exts, DEFAULT_TEMPLATE_EXTS);
        assert_eq!(result.editor, "vim");
        assert_eq!(result.shell, "bash");
        assert_eq!(result.files().len(), 1);
        assert_eq!(result.files()[0].name, "first");

        Ok(())
    }

    #[test]
    fn round_trip_through_display() -> anyhow::Result<()> {
        let mut manifest = Manifest::new("/home/blah/dotfiles");
        manifest.set_variable("email_domain", "example.com")?;
        manifest.add_file(tracked(".gitconfig", "git/gitconfig", "/home/blah/.gitconfig"))?;

        let reparsed: Manifest = manifest.to_string().parse()?;
        assert_eq!(reparsed, manifest);
        Ok(())
    }

    #[test]
    fn duplicate_target_rejected_without_mutation() {
        let mut manifest = Manifest::new("/home/blah/dotfiles");
        manifest
            .add_file(tracked(".gitconfig", "git/gitconfig", "/home/blah/.gitconfig"))
            .unwrap();

        let result = manifest.add_file(tracked("other", "git/other", "/home/blah/.gitconfig"));
        assert!(matches!(
            result,
            Err(ManifestError::DuplicateTarget { existing, .. }) if existing == ".gitconfig"
        ));
        assert_eq!(manifest.files().len(), 1);
    }

    #[test]
    fn escaping_source_rejected() {
        let mut manifest = Manifest::new("/home/blah/dotfiles");

        let result = manifest.add_file(tracked("evil", "../outside", "/home/blah/.evil"));
        assert!(matches!(
            result,
            Err(ManifestError::SourceEscapesRoot { ref path }) if path == &PathBuf::from("../outside")
        ));

        let result = manifest.add_file(tracked("evil", "/etc/passwd", "/home/blah/.evil"));
        assert!(matches!(result, Err(ManifestError::SourceEscapesRoot { .. })));
        assert!(manifest.files().is_empty());
    }

    #[test]
    fn escaping_source_error_names_the_offending_path() {
        let mut manifest = Manifest::new("/home/blah/dotfiles");

        let err = manifest
            .add_file(tracked("evil", "../outside", "/home/blah/.evil"))
            .unwrap_err();
        assert!(err.to_string().contains("outside"));
        assert!(std::error::Error::source(&err).is_none());
    }

    #[test]
    fn unknown_category_rejected() {
        let mut manifest = Manifest::new("/home/blah/dotfiles");
        let mut file = tracked(".gitconfig", "git/gitconfig", "/home/blah/.gitconfig");
        file.category = "nonsense".into();

        let result = manifest.add_file(file);
        assert!(matches!(result, Err(ManifestError::UnknownCategory { .. })));
    }

    #[test]
    fn category_in_use_cannot_be_removed() -> anyhow::Result<()> {
        let mut manifest = Manifest::new("/home/blah/dotfiles");
        manifest.add_file(tracked(".gitconfig", "git/gitconfig", "/home/blah/.gitconfig"))?;

        let result = manifest.remove_category("git");
        assert!(matches!(result, Err(ManifestError::CategoryInUse { .. })));

        manifest.remove_file(".gitconfig")?;
        manifest.remove_category("git")?;
        assert!(!manifest.categories().iter().any(|c| c == "git"));
        Ok(())
    }

    #[test]
    fn merged_variables_prefer_file_overrides() -> anyhow::Result<()> {
        let mut manifest = Manifest::new("/home/blah/dotfiles");
        manifest.set_variable("email_domain", "example.com")?;
        manifest.set_variable("theme", "dark")?;

        let mut file = tracked(".gitconfig", "git/gitconfig", "/home/blah/.gitconfig");
        file.variables.insert("email_domain".into(), "work.example".into());
        manifest.add_file(file)?;

        let merged = manifest.merged_variables(manifest.file(".gitconfig").unwrap());
        assert_eq!(merged.get("email_domain"), Some(&"work.example".to_string()));
        assert_eq!(merged.get("theme"), Some(&"dark".to_string()));
        Ok(())
    }

    #[test]
    fn refresh_statuses_marks_links_and_conflicts() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let root = tmp.path().join("dotfiles");
        std::fs::create_dir_all(root.join("git"))?;
        std::fs::write(root.join("git").join("gitconfig"), "[user]")?;

        let mut manifest = Manifest::new(&root);
        let linked = tmp.path().join(".gitconfig");
        crate::fsutil::symlink(root.join("git").join("gitconfig"), &linked)?;
        manifest.add_file(tracked(".gitconfig", "git/gitconfig", linked.to_str().unwrap()))?;

        let conflicted = tmp.path().join(".vimrc");
        std::fs::write(&conflicted, "set number")?;
        manifest.add_file(tracked(".vimrc", "editor/vimrc", conflicted.to_str().unwrap()))?;

        manifest.refresh_statuses();
        assert!(manifest.file(".gitconfig").unwrap().is_linked);
        assert!(!manifest.file(".gitconfig").unwrap().has_conflict);
        assert!(manifest.file(".vimrc").unwrap().has_conflict);
        Ok(())
    }
}
