// SPDX-FileCopyrightText: 2026 Dotweave Contributors
// SPDX-License-Identifier: MIT

//! Dotfile management through a manifest, templates, and transactional
//! symlinking.
//!
//! Dotweave tracks configuration files in a TOML manifest, keeps their
//! real contents in a dotfiles directory, and places symlinks at the
//! locations programs actually read. Sources can be rendered from
//! templates so one tracked file adapts per machine.
//!
//! # All-or-Nothing Linking
//!
//! Every mutation of the user's home directory runs inside a transaction
//! of small reversible steps. If any step fails, all completed steps are
//! undone in reverse order, so a half-linked dotfile never survives an
//! error. See [`link`] for the machinery.

pub mod external;
pub mod fsutil;
pub mod link;
pub mod manifest;
pub mod path;
pub mod store;
pub mod template;
