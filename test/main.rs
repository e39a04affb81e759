// SPDX-FileCopyrightText: 2026 Dotweave Contributors
// SPDX-License-Identifier: MIT


use anyhow::Result;
use dotweave::{
    manifest::{Manifest, TrackedFile},
    store::Store,
};
use std::{fs, path::PathBuf};
use tempfile::TempDir;

/// Disposable dotweave installation with its own home directory.
pub(crate) struct Sandbox {
    root: TempDir,
    store: Store,
}

impl Sandbox {
    pub(crate) fn new() -> Result<Self> {
        let root = TempDir::new()?;
        fs::create_dir_all(root.path().join("home"))?;

        let store = Store::open(root.path().join("config"));
        store.init()?;

        Ok(Self { root, store })
    }

    pub(crate) fn store(&self) -> &Store {
        &self.store
    }

    pub(crate) fn manifest(&self) -> Result<Manifest> {
        Ok(self.store.load()?)
    }

    /// Absolute path of a would-be dotfile in the sandbox home.
    pub(crate) fn home_path(&self, name: &str) -> PathBuf {
        self.root.path().join("home").join(name)
    }

    /// Track `name` under `category` with the conventional source layout.
    pub(crate) fn track(
        &self,
        manifest: &mut Manifest,
        name: &str,
        category: &str,
        template: bool,
    ) -> Result<()> {
        manifest.add_file(TrackedFile {
            name: name.into(),
            source: PathBuf::from(category).join(name.trim_start_matches('.')),
            target: self.home_path(name),
            category: category.into(),
            template,
            ..Default::default()
        })?;
        Ok(())
    }
}
