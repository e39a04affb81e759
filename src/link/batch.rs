// SPDX-FileCopyrightText: 2026 Dotweave Contributors
// SPDX-License-Identifier: MIT

//! Batch linking across the whole manifest.
//!
//! Runs one transaction per tracked file, independently: a failed file is
//! rolled back on its own, already-linked files are skipped, and the rest
//! of the batch always gets its attempt. When anything failed, the batch
//! reports an aggregate error enumerating every failing file with its
//! cause, while files that succeeded stay linked.

use crate::{
    link::{
        plan::{plan_for, Plan},
        transaction::{Transaction, TransactionError},
    },
    manifest::{Manifest, TrackedFile},
};

use std::path::PathBuf;
use tracing::{info, instrument, warn};

/// Per-file outcome of a successful link attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkSummary {
    /// Tracked file name.
    pub name: String,

    /// What happened, suitable for display.
    pub message: String,
}

/// Link one tracked file inside its own transaction.
///
/// # Errors
///
/// - Return [`TransactionError`] if any step failed; completed steps were
///   rolled back and the filesystem is back in its prior state.
#[instrument(skip(manifest, file, template_dirs), fields(file = %file.name), level = "debug")]
pub fn link_one(
    manifest: &Manifest,
    file: &TrackedFile,
    template_dirs: &[PathBuf],
) -> Result<LinkSummary, TransactionError> {
    match plan_for(manifest, file, template_dirs) {
        Plan::AlreadyLinked => Ok(LinkSummary {
            name: file.name.clone(),
            message: format!("{} already linked correctly", file.name),
        }),
        Plan::Steps(steps) => {
            let count = steps.len();
            let mut tx = Transaction::new(&file.name);
            for step in steps {
                tx.push(step)?;
            }
            tx.execute()?;

            info!("linked {} ({count} step(s))", file.name);
            Ok(LinkSummary {
                name: file.name.clone(),
                message: format!("linked {} ({count} step(s))", file.name),
            })
        }
    }
}

/// Link every tracked file, one independent transaction per file.
///
/// # Errors
///
/// - Return [`BatchError`] when at least one file failed. Every failure is
///   enumerated with its cause; files that succeeded remain linked and
///   their summaries ride along in the error.
pub fn link_all(manifest: &Manifest, template_dirs: &[PathBuf]) -> Result<Vec<LinkSummary>> {
    let mut completed = Vec::new();
    let mut failures = Vec::new();

    for file in manifest.files() {
        // INVARIANT: One file's failure never aborts the remaining files.
        match link_one(manifest, file, template_dirs) {
            Ok(summary) => completed.push(summary),
            Err(err) => {
                warn!("linking {} failed: {err}", file.name);
                failures.push((file.name.clone(), err));
            }
        }
    }

    if failures.is_empty() {
        Ok(completed)
    } else {
        Err(BatchError {
            completed,
            failures,
        })
    }
}

fn enumerate_failures(failures: &[(String, TransactionError)]) -> String {
    failures
        .iter()
        .map(|(name, err)| format!("{name}: {err}"))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Aggregate failure of a batch link run.
///
/// Preserves every per-file cause instead of collapsing to the first, and
/// carries the summaries of files that did link so callers can report
/// partial progress honestly.
#[derive(Debug, thiserror::Error)]
#[error("linking failed for {} file(s): {}", failures.len(), enumerate_failures(failures))]
pub struct BatchError {
    /// Files that linked successfully and stay linked.
    pub completed: Vec<LinkSummary>,

    /// Every failing file with its transaction error.
    pub failures: Vec<(String, TransactionError)>,
}

/// Friendly result alias :3
pub type Result<T, E = BatchError> = std::result::Result<T, E>;
