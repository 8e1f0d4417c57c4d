// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Post-commit hook management.
//!
//! Gitsafe runs a backup after every commit of a project through a
//! `post-commit` hook. Our hook is recognized by its signature line, so a hook
//! written by somebody else is never overwritten or removed. A foreign hook
//! found at install time is moved aside, and put back on uninstall.

use git2::Repository;
use std::{
    fs::{read_to_string, remove_file, rename, write},
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tracing::{info, instrument, warn};

/// Name of hook that gitsafe installs.
pub const HOOK_NAME: &str = "post-commit";

/// Line identifying a hook as ours.
pub const SIGNATURE: &str = "# gitsafe: back up #safe files after every commit";

const HOOK_SCRIPT: &str = r#"#!/bin/sh
# gitsafe: back up #safe files after every commit

if ! command -v gitsafe > /dev/null 2>&1; then
    echo "gitsafe: not found in PATH, skipping backup" >&2
    exit 0
fi

gitsafe backup || echo "gitsafe: backup failed, see output above" >&2
exit 0
"#;

/// Result of installing the hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Installed {
    /// Hook written into empty slot.
    Fresh,

    /// Hook was already in place.
    Unchanged,

    /// Foreign hook moved to given path before writing ours.
    MovedForeign(PathBuf),
}

/// Result of uninstalling the hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Uninstalled {
    /// Hook removed, and foreign hook restored if one was moved aside.
    Removed { restored: bool },

    /// No hook in place.
    Missing,

    /// Hook in place is not ours, and was left alone.
    Foreign,
}

/// Locate hooks directory of the repository containing given path.
///
/// # Errors
///
/// - Return [`HookError::Git2`] if no repository can be discovered.
pub fn hooks_dir(project: impl AsRef<Path>) -> Result<PathBuf> {
    let repository = Repository::discover(project.as_ref())?;
    Ok(repository.path().join("hooks"))
}

/// Install post-commit hook into repository of project.
///
/// Installing twice is harmless.
///
/// # Errors
///
/// - Return [`HookError::BackupExists`] if a foreign hook needs to be moved,
///   but an older backup of it is in the way.
/// - Return [`HookError`] if the hook cannot be read or written.
#[instrument(skip(project), level = "debug")]
pub fn install(project: impl AsRef<Path>) -> Result<Installed> {
    let dir = hooks_dir(project)?;
    mkdirp::mkdirp(&dir).map_err(|err| HookError::Write {
        source: err,
        path: dir.clone(),
    })?;

    let hook = dir.join(HOOK_NAME);
    let mut status = Installed::Fresh;
    if let Some(content) = read_hook(&hook)? {
        if content.contains(SIGNATURE) {
            info!("{HOOK_NAME} hook already installed");
            return Ok(Installed::Unchanged);
        }

        let backup = backup_path(&dir);
        if backup.exists() {
            return Err(HookError::BackupExists(backup));
        }
        move_hook(&hook, &backup)?;
        warn!("moved existing {HOOK_NAME} hook to {:?}", backup.display());
        status = Installed::MovedForeign(backup);
    }

    write(&hook, HOOK_SCRIPT).map_err(|err| HookError::Write {
        source: err,
        path: hook.clone(),
    })?;

    #[cfg(unix)]
    {
        use std::{fs::set_permissions, os::unix::fs::PermissionsExt};
        set_permissions(&hook, std::fs::Permissions::from_mode(0o755)).map_err(|err| {
            HookError::Write {
                source: err,
                path: hook.clone(),
            }
        })?;
    }

    info!("installed {HOOK_NAME} hook at {:?}", hook.display());
    Ok(status)
}

/// Remove post-commit hook from repository of project.
///
/// # Errors
///
/// - Return [`HookError`] if the hook cannot be read, removed, or restored.
#[instrument(skip(project), level = "debug")]
pub fn uninstall(project: impl AsRef<Path>) -> Result<Uninstalled> {
    let dir = hooks_dir(project)?;
    let hook = dir.join(HOOK_NAME);
    let Some(content) = read_hook(&hook)? else {
        return Ok(Uninstalled::Missing);
    };

    if !content.contains(SIGNATURE) {
        warn!("{HOOK_NAME} hook was not installed by gitsafe, leaving it alone");
        return Ok(Uninstalled::Foreign);
    }

    remove_file(&hook).map_err(|err| HookError::Write {
        source: err,
        path: hook.clone(),
    })?;

    let backup = backup_path(&dir);
    let restored = backup.exists();
    if restored {
        move_hook(&backup, &hook)?;
        info!("restored previous {HOOK_NAME} hook");
    }

    Ok(Uninstalled::Removed { restored })
}

fn backup_path(dir: &Path) -> PathBuf {
    dir.join(format!("{HOOK_NAME}.backup"))
}

fn read_hook(path: &Path) -> Result<Option<String>> {
    match read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(HookError::Read {
            source: err,
            path: path.to_path_buf(),
        }),
    }
}

fn move_hook(from: &Path, to: &Path) -> Result<()> {
    rename(from, to).map_err(|err| HookError::Rename {
        source: err,
        from: from.to_path_buf(),
        to: to.to_path_buf(),
    })
}

/// Hook error types.
#[derive(Debug, thiserror::Error)]
pub enum HookError {
    /// Repository cannot be discovered.
    #[error(transparent)]
    Git2(#[from] git2::Error),

    /// Hook exists but cannot be read.
    #[error("failed to read hook {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Hook cannot be written or removed.
    #[error("failed to write hook {:?}", path.display())]
    Write {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Hook cannot be moved.
    #[error("failed to move hook {:?} to {:?}", from.display(), to.display())]
    Rename {
        #[source]
        source: std::io::Error,
        from: PathBuf,
        to: PathBuf,
    },

    /// Backup of foreign hook already exists.
    #[error("cannot move existing hook aside, {:?} is in the way", .0.display())]
    BackupExists(PathBuf),
}

/// Friendly result alias :3
pub type Result<T, E = HookError> = std::result::Result<T, E>;
