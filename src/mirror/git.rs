// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Version control of the mirror.
//!
//! Anything that talks to the network, or that must respect the user's own
//! Git setup (credential helpers, SSH agents, hooks, identity), goes through
//! the Git binary as an external process. Read-only inspection of the mirror
//! goes through libgit2 instead, which keeps the answers structured rather
//! than parsed from text.

use git2::{
    BranchType, ErrorCode, Oid, Reference, Repository, RepositoryState, Status, StatusOptions,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::{
    ffi::{OsStr, OsString},
    path::Path,
    process::Command,
    time::Duration,
};
use tracing::{debug, instrument};

/// Operations the mirror needs from a version control system.
///
/// Every method receives the path of the mirror working copy.
pub trait VersionControl {
    /// Clone remote repository into target path.
    fn clone_repo(&self, url: &str, path: &Path) -> Result<()>;

    /// Check if current branch tracks a remote branch.
    fn has_upstream(&self, path: &Path) -> Result<bool>;

    /// Pull latest changes of upstream into working copy.
    fn pull(&self, path: &Path) -> Result<()>;

    /// Abort rebase left behind by a failed pull.
    ///
    /// Does nothing if no rebase is in progress.
    fn abort_rebase(&self, path: &Path) -> Result<()>;

    /// Stage every change under a pathspec, ignored files included.
    fn stage(&self, path: &Path, pathspec: &Path) -> Result<()>;

    /// Check if index differs from current commit.
    fn has_staged_changes(&self, path: &Path) -> Result<bool>;

    /// Commit index with message.
    fn commit(&self, path: &Path, message: &str) -> Result<()>;

    /// Count local commits missing from upstream.
    ///
    /// Without an upstream every local commit counts as unpushed.
    fn unpushed_commits(&self, path: &Path) -> Result<usize>;

    /// Push current branch, and make it track its remote counterpart.
    fn push(&self, path: &Path) -> Result<()>;
}

/// Version control through the Git binary and libgit2.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemGit;

impl SystemGit {
    /// Construct new system Git.
    pub fn new() -> Self {
        Self
    }
}

impl VersionControl for SystemGit {
    #[instrument(skip(self), level = "debug")]
    fn clone_repo(&self, url: &str, path: &Path) -> Result<()> {
        let args: Vec<OsString> = vec![
            "clone".into(),
            "--quiet".into(),
            url.into(),
            path.as_os_str().into(),
        ];
        with_spinner(format!("clone {url}"), || syscall_non_interactive("git", args))?;
        Ok(())
    }

    fn has_upstream(&self, path: &Path) -> Result<bool> {
        let repository = Repository::open(path)?;
        let Some(head) = current_head(&repository)? else {
            return Ok(false);
        };

        Ok(upstream_target(&repository, &head)?.is_some())
    }

    #[instrument(skip(self), level = "debug")]
    fn pull(&self, path: &Path) -> Result<()> {
        with_spinner("pull latest backup", || {
            gitcall(path, ["pull", "--rebase", "--quiet"])
        })?;
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    fn abort_rebase(&self, path: &Path) -> Result<()> {
        let repository = Repository::open(path)?;
        if !matches!(
            repository.state(),
            RepositoryState::Rebase
                | RepositoryState::RebaseInteractive
                | RepositoryState::RebaseMerge
        ) {
            return Ok(());
        }

        gitcall(path, ["rebase", "--abort"])?;
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    fn stage(&self, path: &Path, pathspec: &Path) -> Result<()> {
        let args: Vec<OsString> = vec![
            "add".into(),
            "--all".into(),
            "--force".into(),
            "--".into(),
            pathspec.as_os_str().into(),
        ];
        gitcall(path, args)?;
        Ok(())
    }

    fn has_staged_changes(&self, path: &Path) -> Result<bool> {
        let repository = Repository::open(path)?;
        let mut opts = StatusOptions::new();
        opts.include_untracked(false).include_ignored(false);

        let staged = Status::INDEX_NEW
            | Status::INDEX_MODIFIED
            | Status::INDEX_DELETED
            | Status::INDEX_RENAMED
            | Status::INDEX_TYPECHANGE;
        let statuses = repository.statuses(Some(&mut opts))?;

        Ok(statuses
            .iter()
            .any(|entry| entry.status().intersects(staged)))
    }

    #[instrument(skip(self, message), level = "debug")]
    fn commit(&self, path: &Path, message: &str) -> Result<()> {
        let output = gitcall(path, ["commit", "--quiet", "--message", message])?;
        debug!("{output}");
        Ok(())
    }

    fn unpushed_commits(&self, path: &Path) -> Result<usize> {
        let repository = Repository::open(path)?;
        let Some(head) = current_head(&repository)? else {
            return Ok(0);
        };
        let Some(local) = head.target() else {
            return Ok(0);
        };

        match upstream_target(&repository, &head)? {
            Some(upstream) => Ok(repository.graph_ahead_behind(local, upstream)?.0),
            None => {
                let mut walk = repository.revwalk()?;
                walk.push(local)?;
                Ok(walk.count())
            }
        }
    }

    #[instrument(skip(self), level = "debug")]
    fn push(&self, path: &Path) -> Result<()> {
        with_spinner("push backup", || {
            gitcall(path, ["push", "--quiet", "--set-upstream", "origin", "HEAD"])
        })?;
        Ok(())
    }
}

/// Current HEAD reference, or `None` if the branch has no commits yet.
fn current_head(repository: &Repository) -> Result<Option<Reference<'_>>> {
    match repository.head() {
        Ok(head) => Ok(Some(head)),
        Err(err) if matches!(err.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound) => {
            Ok(None)
        }
        Err(err) => Err(err.into()),
    }
}

fn upstream_target(repository: &Repository, head: &Reference<'_>) -> Result<Option<Oid>> {
    if !head.is_branch() {
        return Ok(None);
    }

    let Some(name) = head.shorthand() else {
        return Ok(None);
    };

    let branch = repository.find_branch(name, BranchType::Local)?;
    match branch.upstream() {
        Ok(upstream) => Ok(upstream.get().target()),
        Err(err) if err.code() == ErrorCode::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

fn with_spinner<T>(message: impl Into<String>, task: impl FnOnce() -> Result<T>) -> Result<T> {
    let bar = ProgressBar::new_spinner();
    bar.set_style(ProgressStyle::with_template("{spinner:.green} {msg}")?);
    bar.set_message(message.into());
    bar.enable_steady_tick(Duration::from_millis(100));

    let result = task();
    bar.finish_and_clear();

    result
}

fn gitcall(
    path: &Path,
    args: impl IntoIterator<Item = impl Into<OsString>>,
) -> Result<String> {
    let mut bin_args: Vec<OsString> = vec!["-C".into(), path.as_os_str().into()];
    bin_args.extend(args.into_iter().map(Into::into));
    syscall_non_interactive("git", bin_args)
}

fn syscall_non_interactive(
    cmd: impl AsRef<OsStr>,
    args: impl IntoIterator<Item = impl AsRef<OsStr>>,
) -> Result<String> {
    let args = args
        .into_iter()
        .map(|arg| arg.as_ref().to_os_string())
        .collect::<Vec<_>>();
    let command_line = std::iter::once(cmd.as_ref())
        .chain(args.iter().map(OsString::as_os_str))
        .map(OsStr::to_string_lossy)
        .collect::<Vec<_>>()
        .join(" ");

    let output = Command::new(cmd.as_ref())
        .args(&args)
        .output()
        .map_err(|err| MirrorError::Spawn {
            source: err,
            command: command_line.clone(),
        })?;
    let stdout = String::from_utf8_lossy(output.stdout.as_slice()).into_owned();
    let stderr = String::from_utf8_lossy(output.stderr.as_slice()).into_owned();
    let mut message = String::new();

    if !stdout.is_empty() {
        message.push_str(format!("stdout: {stdout}").as_str());
    }

    if !stderr.is_empty() {
        message.push_str(format!("stderr: {stderr}").as_str());
    }

    // INVARIANT: Chomp trailing newlines.
    let message = message
        .strip_suffix("\r\n")
        .or(message.strip_suffix('\n'))
        .map(ToString::to_string)
        .unwrap_or(message);

    if !output.status.success() {
        return Err(MirrorError::Command {
            command: command_line,
            message,
        });
    }

    Ok(message)
}

/// Mirror error types.
#[derive(Debug, thiserror::Error)]
pub enum MirrorError {
    /// External process cannot be started.
    #[error("failed to run {command:?}")]
    Spawn {
        #[source]
        source: std::io::Error,
        command: String,
    },

    /// External process exited with failure.
    #[error("command {command:?} failed:\n{message}")]
    Command { command: String, message: String },

    /// Directory inside mirror cannot be created.
    #[error("failed to create directory {:?}", path.display())]
    CreateDir {
        #[source]
        source: std::io::Error,
        path: std::path::PathBuf,
    },

    /// File cannot be copied into mirror.
    #[error("failed to copy {:?} to {:?}", from.display(), to.display())]
    Copy {
        #[source]
        source: std::io::Error,
        from: std::path::PathBuf,
        to: std::path::PathBuf,
    },

    /// Style template cannot be set for progress spinner.
    #[error(transparent)]
    IndicatifStyleTemplate(#[from] indicatif::style::TemplateError),

    /// Operations from libgit2 fail.
    #[error(transparent)]
    Git2(#[from] git2::Error),
}

/// Friendly result alias :3
pub type Result<T, E = MirrorError> = std::result::Result<T, E>;
