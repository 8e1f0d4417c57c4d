// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Backup cache mirror.
//!
//! The __mirror__ is a local working copy of the backup repository. It lives
//! inside the cache root, in a directory named after the sanitized remote URL,
//! and houses one subdirectory per project:
//!
//! ```text
//! <cache-root>/<sanitized-remote>/<project-name>/<relative-path>
//! ```
//!
//! The mirror is created by cloning the remote the first time it is needed,
//! and updated with a pull on every later use. Files are copied into the
//! project subdirectory, overwriting older copies.
//!
//! # Push Queue
//!
//! Local commits of the mirror that are not on its upstream yet form a
//! durable push queue. A failed push leaves the commit in place, and the next
//! push sends everything that is queued. Nothing else needs to remember that
//! a push failed.
//!
//! # Pitfalls
//!
//! Nothing locks the mirror. Two invocations racing on the same mirror can
//! step on each other. Gitsafe runs from a post-commit hook, which makes that
//! unlikely, but not impossible across projects sharing one remote.

pub mod git;

pub use git::{MirrorError, SystemGit, VersionControl};

use crate::fileset::{is_contained, FileSet};

use std::{
    fs::copy,
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument, warn};

/// Local working copy of the backup repository.
#[derive(Debug, Clone)]
pub struct Mirror<V = SystemGit>
where
    V: VersionControl,
{
    root: PathBuf,
    remote: String,
    vcs: V,
}

impl<V> Mirror<V>
where
    V: VersionControl,
{
    /// Construct new mirror handle.
    ///
    /// Does not touch the file system.
    pub fn new(root: impl Into<PathBuf>, remote: impl Into<String>, vcs: V) -> Self {
        Self {
            root: root.into(),
            remote: remote.into(),
            vcs,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn remote(&self) -> &str {
        &self.remote
    }

    pub fn vcs(&self) -> &V {
        &self.vcs
    }

    /// Check if mirror working copy exists locally.
    pub fn exists(&self) -> bool {
        self.root.join(".git").exists()
    }

    /// Make sure mirror exists, and is up to date with its remote.
    ///
    /// Clones the remote on first use. Afterwards pulls latest changes if the
    /// current branch has an upstream. A failed pull only logs a warning, so
    /// backups can still be committed and queued while offline. Any rebase
    /// the pull leaves behind is aborted first, so later commits land on the
    /// branch instead of a detached HEAD.
    ///
    /// # Errors
    ///
    /// - Return [`MirrorError::CreateDir`] if cache root cannot be created.
    /// - Return [`MirrorError`] if the clone fails, or if a rebase left over
    ///   by a failed pull cannot be aborted.
    #[instrument(skip(self), level = "debug")]
    pub fn sync(&self) -> Result<()> {
        if !self.exists() {
            info!("clone {} into {:?}", self.remote, self.root.display());
            if let Some(parent) = self.root.parent() {
                create_dir(parent)?;
            }
            return self.vcs.clone_repo(&self.remote, &self.root);
        }

        // INVARIANT: Never build on top of a rebase that an earlier run left half done.
        self.vcs.abort_rebase(&self.root)?;

        if !self.vcs.has_upstream(&self.root)? {
            debug!("mirror {:?} has no upstream yet", self.root.display());
            return Ok(());
        }

        if let Err(error) = self.vcs.pull(&self.root) {
            warn!("cannot pull latest backup, continuing with local mirror: {error}");
            self.vcs.abort_rebase(&self.root)?;
        }

        Ok(())
    }

    /// Copy files of project into its subdirectory of the mirror.
    ///
    /// Intermediate directories are created as needed. Existing copies are
    /// overwritten.
    ///
    /// # Errors
    ///
    /// - Return [`MirrorError::CreateDir`] if a directory cannot be created.
    /// - Return [`MirrorError::Copy`] if a file cannot be copied.
    #[instrument(skip(self, project_root, files), level = "debug")]
    pub fn copy_files(
        &self,
        project_root: impl AsRef<Path>,
        project_name: &str,
        files: &FileSet,
    ) -> Result<()> {
        let target_root = self.root.join(project_name);
        for relative in files {
            if !is_contained(relative) {
                warn!("refuse to copy {:?} outside of project", relative.display());
                continue;
            }

            let from = project_root.as_ref().join(relative);
            let to = target_root.join(relative);
            if let Some(parent) = to.parent() {
                create_dir(parent)?;
            }

            debug!("copy {:?}", relative.display());
            copy(&from, &to).map_err(|err| MirrorError::Copy {
                source: err,
                from: from.clone(),
                to: to.clone(),
            })?;
        }

        Ok(())
    }

    /// Stage project subdirectory of mirror.
    ///
    /// Returns `true` if the index now differs from the current commit.
    ///
    /// # Errors
    ///
    /// - Return [`MirrorError`] if staging fails.
    #[instrument(skip(self), level = "debug")]
    pub fn stage_project(&self, project_name: &str) -> Result<bool> {
        if self.root.join(project_name).exists() {
            self.vcs.stage(&self.root, Path::new(project_name))?;
        }

        self.vcs.has_staged_changes(&self.root)
    }

    /// Commit staged changes.
    ///
    /// # Errors
    ///
    /// - Return [`MirrorError`] if committing fails.
    #[instrument(skip(self, message), level = "debug")]
    pub fn commit(&self, message: &str) -> Result<()> {
        self.vcs.commit(&self.root, message)
    }

    /// Number of commits waiting in the push queue.
    ///
    /// # Errors
    ///
    /// - Return [`MirrorError`] if the mirror cannot be inspected.
    pub fn pending(&self) -> Result<usize> {
        self.vcs.unpushed_commits(&self.root)
    }

    /// Push every queued commit to the remote.
    ///
    /// # Errors
    ///
    /// - Return [`MirrorError`] if the push fails. Queued commits stay in
    ///   place either way.
    pub fn push(&self) -> Result<()> {
        self.vcs.push(&self.root)
    }
}

fn create_dir(path: &Path) -> Result<()> {
    mkdirp::mkdirp(path).map_err(|err| MirrorError::CreateDir {
        source: err,
        path: path.to_path_buf(),
    })?;

    Ok(())
}

type Result<T, E = MirrorError> = std::result::Result<T, E>;
