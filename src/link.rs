// SPDX-FileCopyrightText: 2026 Dotweave Contributors
// SPDX-License-Identifier: MIT

//! Transactional linking engine.
//!
//! Linking a tracked file means making its target path a symlink to the
//! canonical source inside the dotfiles root, creating that source first
//! when needed (from a template, from the user's existing file, or as a
//! placeholder). Several filesystem mutations may be required, and a
//! failure halfway through must not strand the user's configuration in a
//! half-moved state.
//!
//! # All-Or-Nothing Linking
//!
//! The engine is a small in-process saga: a [`plan`](plan::plan_for) turns
//! the desired end state plus current filesystem observations into an
//! ordered list of [`Operation`]s, a [`Transaction`] executes them in
//! order, and on any step's failure unwinds the already-applied steps in
//! strict reverse order. Every operation backs up whatever it is about to
//! overwrite and never deletes user data outright; the backup-then-act
//! pattern is the load-bearing safety property of the whole engine.
//!
//! Rollback is best-effort: substep failures during an unwind are
//! aggregated and reported alongside the original failure, never silently
//! swallowed and never allowed to mask it.
//!
//! # Batch Linking
//!
//! [`batch::link_all`] runs one transaction per tracked file. Files are
//! independent: one file's failed-and-rolled-back transaction never
//! unwinds another file's committed transaction, and the batch keeps going
//! so a single bad entry cannot block the rest of the manifest.

pub mod batch;
pub mod op;
pub mod plan;
pub mod transaction;

pub use batch::{link_all, link_one, BatchError, LinkSummary};
pub use op::{CopyOp, LinkOp, OpError, Operation, TemplateOp};
pub use plan::{plan_for, Plan};
pub use transaction::{Transaction, TransactionError, TxState};
