// SPDX-FileCopyrightText: 2026 Dotweave Contributors
// SPDX-License-Identifier: MIT

//! Linking plans.
//!
//! [`plan_for`] inspects the current filesystem state around one tracked
//! file and produces the ordered operation list that brings the target to
//! its desired end state: a symlink at the target pointing at the
//! canonical source, with the source materialized first when it does not
//! exist yet.
//!
//! Source materialization picks exactly one of three strategies:
//!
//! 1. a template render, when the file is marked as a template and a
//!    template can be located (fixed lookup order, first match wins),
//! 2. a preserve-copy of the user's existing target file into the
//!    canonical location, so real content survives being replaced by a
//!    symlink,
//! 3. a generated placeholder, when there is nothing to copy and no
//!    template to render.
//!
//! The final step is always the symlink creation. When the target is
//! already a symlink pointing exactly at the resolved source, the plan
//! short-circuits to [`Plan::AlreadyLinked`] and no operations run.

use crate::{
    link::op::{CopyOp, LinkOp, Operation, TemplateOp},
    manifest::{Manifest, TrackedFile},
    template::{find_template, TemplateContext},
};

use std::{fs, path::PathBuf};
use tracing::debug;

/// Outcome of planning one tracked file.
pub enum Plan {
    /// Target is already a symlink pointing exactly at the resolved
    /// source; nothing to do.
    AlreadyLinked,

    /// Ordered operations to execute inside one transaction.
    Steps(Vec<Box<dyn Operation>>),
}

impl Plan {
    /// Number of planned operations.
    pub fn len(&self) -> usize {
        match self {
            Plan::AlreadyLinked => 0,
            Plan::Steps(steps) => steps.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for Plan {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Plan::AlreadyLinked => fmt.write_str("Plan::AlreadyLinked"),
            Plan::Steps(steps) => fmt
                .debug_list()
                .entries(steps.iter().map(|step| step.describe()))
                .finish(),
        }
    }
}

/// Build the operation list that links one tracked file.
///
/// `template_dirs` are searched in order when the file is marked as a
/// template and its source does not exist yet.
pub fn plan_for(manifest: &Manifest, file: &TrackedFile, template_dirs: &[PathBuf]) -> Plan {
    let source = manifest.resolve_source(file);

    // INVARIANT: Short-circuit only on an exact match; a symlink pointing
    // anywhere else is a conflict that gets backed up like any other entry.
    if let Ok(destination) = fs::read_link(&file.target) {
        if destination == source {
            debug!("{} already linked correctly", file.name);
            return Plan::AlreadyLinked;
        }
    }

    let mut steps: Vec<Box<dyn Operation>> = Vec::new();

    if !source.exists() {
        if file.template {
            match find_template(template_dirs, &manifest.template_exts, file) {
                Some(template) => {
                    let context = TemplateContext::for_file(manifest, file);
                    steps.push(Box::new(TemplateOp::new(
                        &file.name, template, &source, context,
                    )));
                }
                None if file.target.exists() => {
                    debug!("no template found for {}, preserving target content", file.name);
                    steps.push(Box::new(CopyOp::new(&file.name, &file.target, &source)));
                }
                None => {
                    debug!("no template found for {}, planning placeholder", file.name);
                    steps.push(Box::new(CopyOp::placeholder(&file.name, &source, false)));
                }
            }
        } else if file.target.exists() {
            // Preserve the user's existing content into the canonical
            // location before the target gets replaced by a symlink.
            steps.push(Box::new(CopyOp::new(&file.name, &file.target, &source)));
        } else {
            steps.push(Box::new(CopyOp::placeholder(&file.name, &source, false)));
        }
    }

    steps.push(Box::new(LinkOp::new(&file.name, &source, &file.target)));

    Plan::Steps(steps)
}
