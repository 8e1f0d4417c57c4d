// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Back up gitignored files that are marked as worth keeping.
//!
//! Secrets, local configuration, and other files that must never be committed
//! to a project are usually listed in its `.gitignore`. Gitsafe lets the user
//! tag such lines with a trailing `#safe` marker:
//!
//! ```text
//! .env #safe
//! secrets/*.json #safe
//! node_modules/
//! ```
//!
//! Every tagged pattern is resolved against the project directory, and the
//! resulting files are copied into a __mirror__, a local clone of a separate
//! backup repository. The mirror is committed and pushed. A push that fails
//! leaves its commit queued in the mirror until the next backup.
//!
//! # Layout
//!
//! - [`marker`] extracts tagged patterns from an ignore file.
//! - [`resolve`] turns one pattern into concrete files.
//! - [`fileset`] unions resolutions into one sorted set.
//! - [`config`] loads and validates settings.
//! - [`mirror`] manages the local working copy of the backup repository.
//! - [`backup`] runs one backup pass end to end.
//! - [`hook`] installs the post-commit hook that triggers backups.

pub mod backup;
pub mod config;
pub mod fileset;
pub mod hook;
pub mod marker;
pub mod mirror;
pub mod path;
pub mod resolve;

pub use backup::{Backup, BackupOutcome, BackupReport};
pub use config::Settings;
pub use fileset::FileSet;

use git2::Repository;
use std::path::{Path, PathBuf};

/// Determine root directory of project containing given path.
///
/// Walks up from `start` until a Git repository is found, and returns its
/// working tree.
///
/// # Errors
///
/// - Return [`git2::Error`] if no repository is found, or if the repository
///   found is bare.
pub fn discover_project_root(start: impl AsRef<Path>) -> Result<PathBuf, git2::Error> {
    let repository = Repository::discover(start.as_ref())?;
    repository
        .workdir()
        .map(Path::to_path_buf)
        .ok_or_else(|| git2::Error::from_str("bare repository has no project directory"))
}
