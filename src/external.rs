// SPDX-FileCopyrightText: 2026 Dotweave Contributors
// SPDX-License-Identifier: MIT

//! Interactive surfaces: editor subprocesses and terminal prompts.
//!
//! The editor runs attached to the user's terminal and dotweave blocks
//! until it exits. GUI editors that fork by default get their wait flag
//! appended so the block actually holds. Prompt helpers treat Esc/Ctrl-C
//! as a declined answer rather than an error, callers see `Ok(None)`.

use inquire::{Confirm, InquireError, Select};
use std::{
    ffi::OsStr,
    path::Path,
    process::Command,
};
use tracing::{debug, instrument};

/// Editors that detach unless told to wait, with the flag that holds them.
const WAIT_FLAGS: [(&str, &str); 2] = [("code", "--wait"), ("subl", "--wait")];

/// Open `path` in `editor` and block until the editor exits.
///
/// # Errors
///
/// - Return [`ExternalError::Spawn`] if the editor could not be launched.
/// - Return [`ExternalError::EditorFailed`] if it exited non-zero.
#[instrument(skip(path), level = "debug")]
pub fn edit_file(editor: &str, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let mut command = Command::new(editor);

    let bin = Path::new(editor)
        .file_name()
        .and_then(OsStr::to_str)
        .unwrap_or(editor);
    if let Some((_, flag)) = WAIT_FLAGS.iter().find(|(name, _)| *name == bin) {
        command.arg(flag);
    }

    debug!("opening {} in {editor}", path.display());
    let status = command
        .arg(path)
        .spawn()
        .map_err(|source| ExternalError::Spawn {
            source,
            editor: editor.to_string(),
        })?
        .wait()
        .map_err(|source| ExternalError::Spawn {
            source,
            editor: editor.to_string(),
        })?;

    if !status.success() {
        return Err(ExternalError::EditorFailed {
            editor: editor.to_string(),
            status,
        });
    }

    Ok(())
}

/// Ask a yes/no question. Cancelling the prompt answers `None`.
///
/// # Errors
///
/// - Return [`ExternalError::Prompt`] if the terminal interaction itself
///   broke.
pub fn confirm(message: &str, default: bool) -> Result<Option<bool>> {
    match Confirm::new(message).with_default(default).prompt() {
        Ok(answer) => Ok(Some(answer)),
        Err(InquireError::OperationCanceled | InquireError::OperationInterrupted) => Ok(None),
        Err(source) => Err(ExternalError::Prompt { source }),
    }
}

/// Pick one option from a list. Cancelling the prompt answers `None`.
///
/// # Errors
///
/// - Return [`ExternalError::Prompt`] if the terminal interaction itself
///   broke.
pub fn select(message: &str, options: Vec<String>) -> Result<Option<String>> {
    match Select::new(message, options).prompt() {
        Ok(choice) => Ok(Some(choice)),
        Err(InquireError::OperationCanceled | InquireError::OperationInterrupted) => Ok(None),
        Err(source) => Err(ExternalError::Prompt { source }),
    }
}

/// All possible error types for external interaction.
#[derive(Debug, thiserror::Error)]
pub enum ExternalError {
    #[error("cannot launch editor {editor}")]
    Spawn {
        source: std::io::Error,
        editor: String,
    },

    #[error("editor {editor} exited with {status}")]
    EditorFailed {
        editor: String,
        status: std::process::ExitStatus,
    },

    #[error("prompt failed")]
    Prompt { source: InquireError },
}

/// Friendly result alias :3
pub type Result<T, E = ExternalError> = std::result::Result<T, E>;
