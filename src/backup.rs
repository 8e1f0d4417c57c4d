// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Backup orchestration.
//!
//! One backup pass walks through a fixed sequence of stages:
//!
//! 1. Resolve the file set of the project from its ignore file.
//! 2. Sync the mirror, cloning it on first use.
//! 3. Copy every file of the file set into the project subdirectory.
//! 4. Stage, and commit if anything changed.
//! 5. Push everything in the push queue.
//!
//! Configuration problems surface before any file is touched, because
//! [`Backup`] can only be built from valid [`Settings`]. A failed push is not
//! an error. The commit stays in the mirror, and the next pass pushes it.

use crate::{
    config::{ConfigError, Settings},
    fileset::FileSet,
    marker::MarkerError,
    mirror::{Mirror, MirrorError, SystemGit, VersionControl},
};

use regex::{Captures, Regex};
use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
    sync::LazyLock,
};
use tracing::{info, instrument, warn};

/// Format of `{date}` placeholder in commit messages.
pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{(project|date|count|files)\}").expect("valid placeholder regex")
});

/// Render commit message template.
///
/// Substitutes `{project}`, `{date}`, `{count}`, and `{files}`. Substituted
/// text is never scanned again, so a project name containing braces stays as
/// is. Unknown placeholders are left untouched.
pub fn render_commit_message(template: &str, project: &str, date: &str, files: &FileSet) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures<'_>| match &caps[1] {
            "project" => project.to_string(),
            "date" => date.to_string(),
            "count" => files.len().to_string(),
            "files" => files
                .iter()
                .map(|path| path.display().to_string())
                .collect::<Vec<_>>()
                .join(", "),
            _ => caps[0].to_string(),
        })
        .into_owned()
}

/// Final state of the push queue after a backup pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupOutcome {
    /// Every queued commit reached the remote.
    Pushed { commits: usize },

    /// Push failed, commits stay queued for the next pass.
    Queued { pending: usize, reason: String },

    /// Nothing to commit, and nothing queued.
    UpToDate,
}

impl Display for BackupOutcome {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Pushed { commits } => write!(fmt, "pushed {commits} commit(s)"),
            Self::Queued { pending, reason } => {
                write!(fmt, "{pending} commit(s) queued, push failed: {reason}")
            }
            Self::UpToDate => write!(fmt, "backup is up to date"),
        }
    }
}

/// Summary of one backup pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupReport {
    /// Files copied into the mirror.
    pub files: FileSet,

    /// Whether this pass created a new commit.
    pub committed: bool,

    pub outcome: BackupOutcome,
}

/// Backup pass of one project into its mirror.
#[derive(Debug, Clone)]
pub struct Backup<V = SystemGit>
where
    V: VersionControl,
{
    project_root: PathBuf,
    settings: Settings,
    mirror: Mirror<V>,
}

impl Backup<SystemGit> {
    /// Construct new backup of project through system Git.
    pub fn new(project_root: impl Into<PathBuf>, settings: Settings) -> Self {
        Self::with_vcs(project_root, settings, SystemGit::new())
    }

    /// Load settings of project, and construct new backup through system Git.
    ///
    /// # Errors
    ///
    /// - Return [`BackupError::Config`] if settings cannot be loaded.
    pub fn load(project_root: impl Into<PathBuf>) -> Result<Self> {
        let project_root = project_root.into();
        let settings = Settings::load(&project_root)?;
        Ok(Self::new(project_root, settings))
    }
}

impl<V> Backup<V>
where
    V: VersionControl,
{
    /// Construct new backup of project through custom version control.
    pub fn with_vcs(project_root: impl Into<PathBuf>, settings: Settings, vcs: V) -> Self {
        let mirror = Mirror::new(settings.mirror_dir(), settings.remote.clone(), vcs);
        Self {
            project_root: project_root.into(),
            settings,
            mirror,
        }
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn mirror(&self) -> &Mirror<V> {
        &self.mirror
    }

    /// Run one backup pass.
    ///
    /// An empty file set never produces a commit, but anything already queued
    /// is still pushed.
    ///
    /// # Errors
    ///
    /// - Return [`BackupError::Resolve`] if the ignore file cannot be read.
    /// - Return [`BackupError::Stage`] if the mirror fails at any stage
    ///   before pushing, or if the push queue cannot be inspected.
    #[instrument(skip(self), fields(project = %self.settings.project_name), level = "debug")]
    pub fn run(&self) -> Result<BackupReport> {
        let files = FileSet::from_project(&self.project_root)?;
        info!("{} file(s) marked for backup", files.len());

        let project = self.settings.project_name.as_str();
        self.mirror.sync().map_err(at(Stage::Syncing))?;
        self.mirror
            .copy_files(&self.project_root, project, &files)
            .map_err(at(Stage::Copying))?;

        let mut committed = false;
        // INVARIANT: Never commit on behalf of an empty file set.
        if !files.is_empty() && self.mirror.stage_project(project).map_err(at(Stage::Staging))? {
            let date = chrono::Local::now().format(DATE_FORMAT).to_string();
            let message =
                render_commit_message(&self.settings.commit_template, project, &date, &files);
            self.mirror.commit(&message).map_err(at(Stage::Committing))?;
            info!("commit {message:?}");
            committed = true;
        }

        let outcome = self.flush_queue()?;
        Ok(BackupReport {
            files,
            committed,
            outcome,
        })
    }

    /// Push whatever sits in the push queue of the mirror.
    ///
    /// # Errors
    ///
    /// - Return [`BackupError::Stage`] if the push queue cannot be inspected.
    pub fn flush_queue(&self) -> Result<BackupOutcome> {
        let pending = self.mirror.pending().map_err(at(Stage::Pushing))?;
        if pending == 0 {
            return Ok(BackupOutcome::UpToDate);
        }

        if let Err(error) = self.mirror.push() {
            warn!("push failed, {pending} commit(s) stay queued: {error}");
            return Ok(BackupOutcome::Queued {
                pending,
                reason: error.to_string(),
            });
        }

        let remaining = self.mirror.pending().map_err(at(Stage::Pushing))?;
        if remaining > 0 {
            warn!("push finished but {remaining} commit(s) are still queued");
            return Ok(BackupOutcome::Queued {
                pending: remaining,
                reason: "remote did not receive every queued commit".into(),
            });
        }

        Ok(BackupOutcome::Pushed { commits: pending })
    }
}

/// Stage of a backup pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Syncing,
    Copying,
    Staging,
    Committing,
    Pushing,
}

impl Display for Stage {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        let stage = match self {
            Self::Syncing => "syncing mirror",
            Self::Copying => "copying files",
            Self::Staging => "staging files",
            Self::Committing => "committing",
            Self::Pushing => "pushing",
        };
        fmt.write_str(stage)
    }
}

fn at(stage: Stage) -> impl FnOnce(MirrorError) -> BackupError {
    move |source| BackupError::Stage { stage, source }
}

/// Backup error types.
#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    /// Settings of project are invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// File set of project cannot be resolved.
    #[error(transparent)]
    Resolve(#[from] MarkerError),

    /// Mirror fails during a stage of the backup pass.
    #[error("backup failed while {stage}")]
    Stage {
        stage: Stage,
        #[source]
        source: MirrorError,
    },
}

/// Friendly result alias :3
pub type Result<T, E = BackupError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mirror::git;
    use pretty_assertions::assert_eq;
    use simple_test_case::test_case;
    use std::{
        cell::{Cell, RefCell},
        collections::BTreeMap,
        fs::{create_dir_all, read, read_dir, write},
    };
    use tempfile::TempDir;

    type Snapshot = BTreeMap<PathBuf, Vec<u8>>;

    /// Version control double that tracks commits and a push queue.
    #[derive(Debug, Default)]
    struct QueueVcs {
        committed: RefCell<Snapshot>,
        staged: RefCell<Option<Snapshot>>,
        messages: RefCell<Vec<String>>,
        local: Cell<usize>,
        pushed: Cell<usize>,
        offline: Cell<bool>,
    }

    fn snapshot(root: &Path, dir: &Path, into: &mut Snapshot) -> std::io::Result<()> {
        for entry in read_dir(dir)? {
            let path = entry?.path();
            if path.is_dir() {
                snapshot(root, &path, into)?;
            } else if let Ok(relative) = path.strip_prefix(root) {
                into.insert(relative.to_path_buf(), read(&path)?);
            }
        }
        Ok(())
    }

    fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> MirrorError + '_ {
        |err| MirrorError::CreateDir {
            source: err,
            path: path.to_path_buf(),
        }
    }

    impl VersionControl for QueueVcs {
        fn clone_repo(&self, _: &str, path: &Path) -> git::Result<()> {
            create_dir_all(path.join(".git")).map_err(io_error(path))
        }

        fn has_upstream(&self, _: &Path) -> git::Result<bool> {
            Ok(self.pushed.get() > 0)
        }

        fn pull(&self, _: &Path) -> git::Result<()> {
            Ok(())
        }

        fn abort_rebase(&self, _: &Path) -> git::Result<()> {
            Ok(())
        }

        fn stage(&self, path: &Path, pathspec: &Path) -> git::Result<()> {
            let mut tree = Snapshot::new();
            snapshot(path, &path.join(pathspec), &mut tree).map_err(io_error(path))?;
            *self.staged.borrow_mut() = Some(tree);
            Ok(())
        }

        fn has_staged_changes(&self, _: &Path) -> git::Result<bool> {
            Ok(self
                .staged
                .borrow()
                .as_ref()
                .is_some_and(|tree| *tree != *self.committed.borrow()))
        }

        fn commit(&self, _: &Path, message: &str) -> git::Result<()> {
            if let Some(tree) = self.staged.borrow_mut().take() {
                *self.committed.borrow_mut() = tree;
            }
            self.messages.borrow_mut().push(message.into());
            self.local.set(self.local.get() + 1);
            Ok(())
        }

        fn unpushed_commits(&self, _: &Path) -> git::Result<usize> {
            Ok(self.local.get() - self.pushed.get())
        }

        fn push(&self, _: &Path) -> git::Result<()> {
            if self.offline.get() {
                return Err(MirrorError::Command {
                    command: "git push".into(),
                    message: "stderr: could not resolve host".into(),
                });
            }
            self.pushed.set(self.local.get());
            Ok(())
        }
    }

    struct Fixture {
        project: TempDir,
        _cache: TempDir,
        backup: Backup<QueueVcs>,
    }

    impl Fixture {
        fn new(gitignore: &str, files: &[(&str, &str)]) -> anyhow::Result<Self> {
            let project = tempfile::tempdir()?;
            let cache = tempfile::tempdir()?;
            write(project.path().join(".gitignore"), gitignore)?;
            for (name, content) in files {
                let path = project.path().join(name);
                if let Some(parent) = path.parent() {
                    create_dir_all(parent)?;
                }
                write(path, content)?;
            }

            let settings = Settings {
                remote: "git@example.com:me/backup.git".into(),
                project_name: "app".into(),
                commit_template: "backup({project}): {count}".into(),
                cache_dir: cache.path().to_path_buf(),
            };
            let backup = Backup::with_vcs(project.path(), settings, QueueVcs::default());

            Ok(Self {
                project,
                _cache: cache,
                backup,
            })
        }

        fn vcs(&self) -> &QueueVcs {
            self.backup.mirror().vcs()
        }
    }

    #[test]
    fn first_pass_commits_and_pushes() -> anyhow::Result<()> {
        let fixture = Fixture::new(".env #safe\nnode_modules/\n", &[(".env", "KEY=1")])?;

        let report = fixture.backup.run()?;
        assert_eq!(report.files, FileSet::from_iter([".env"]));
        assert!(report.committed);
        assert_eq!(report.outcome, BackupOutcome::Pushed { commits: 1 });
        assert_eq!(*fixture.vcs().messages.borrow(), vec!["backup(app): 1"]);
        assert_eq!(
            read(fixture.backup.mirror().root().join("app/.env"))?,
            b"KEY=1"
        );

        Ok(())
    }

    #[test]
    fn unchanged_files_do_not_commit() -> anyhow::Result<()> {
        let fixture = Fixture::new(".env #safe\n", &[(".env", "KEY=1")])?;

        fixture.backup.run()?;
        let report = fixture.backup.run()?;
        assert!(!report.committed);
        assert_eq!(report.outcome, BackupOutcome::UpToDate);
        assert_eq!(fixture.vcs().local.get(), 1);

        Ok(())
    }

    #[test]
    fn failed_push_queues_commit_for_next_pass() -> anyhow::Result<()> {
        let fixture = Fixture::new(".env #safe\n", &[(".env", "KEY=1")])?;
        fixture.vcs().offline.set(true);

        let report = fixture.backup.run()?;
        assert!(report.committed);
        match report.outcome {
            BackupOutcome::Queued { pending, reason } => {
                assert_eq!(pending, 1);
                assert!(reason.contains("could not resolve host"));
            }
            other => panic!("expected queued outcome, got {other:?}"),
        }

        fixture.vcs().offline.set(false);
        let report = fixture.backup.run()?;
        assert!(!report.committed);
        assert_eq!(report.outcome, BackupOutcome::Pushed { commits: 1 });
        assert_eq!(fixture.vcs().messages.borrow().len(), 1);

        Ok(())
    }

    #[test]
    fn queue_grows_while_offline() -> anyhow::Result<()> {
        let fixture = Fixture::new(".env #safe\n", &[(".env", "KEY=1")])?;
        fixture.vcs().offline.set(true);

        fixture.backup.run()?;
        write(fixture.project.path().join(".env"), "KEY=2")?;
        let report = fixture.backup.run()?;
        assert!(matches!(report.outcome, BackupOutcome::Queued { pending: 2, .. }));

        fixture.vcs().offline.set(false);
        assert_eq!(
            fixture.backup.flush_queue()?,
            BackupOutcome::Pushed { commits: 2 }
        );

        Ok(())
    }

    #[test]
    fn empty_file_set_never_commits() -> anyhow::Result<()> {
        let fixture = Fixture::new("node_modules/\n", &[("node_modules/a.js", "")])?;

        let report = fixture.backup.run()?;
        assert!(report.files.is_empty());
        assert!(!report.committed);
        assert_eq!(report.outcome, BackupOutcome::UpToDate);
        assert!(fixture.vcs().messages.borrow().is_empty());

        Ok(())
    }

    #[test]
    fn copy_failure_reports_stage() -> anyhow::Result<()> {
        let fixture = Fixture::new(".env #safe\n", &[(".env", "KEY=1")])?;
        let mirror_root = fixture.backup.mirror().root().to_path_buf();
        create_dir_all(mirror_root.join(".git"))?;
        write(mirror_root.join("app"), "not a directory")?;

        match fixture.backup.run() {
            Err(BackupError::Stage { stage, .. }) => assert_eq!(stage, Stage::Copying),
            other => panic!("expected copy stage error, got {other:?}"),
        }
        assert!(fixture.vcs().messages.borrow().is_empty());

        Ok(())
    }

    #[test_case("{project}: {count} file(s)", "app: 2 file(s)"; "project and count")]
    #[test_case("{files} at {date}", ".env, secrets/a.json at 2025-01-02 03:04:05"; "files and date")]
    #[test_case("{unknown} {project}", "{unknown} app"; "unknown placeholder")]
    #[test_case("plain", "plain"; "no placeholder")]
    #[test]
    fn render_commit_message_substitutes(template: &str, expect: &str) {
        let files = FileSet::from_iter([".env", "secrets/a.json"]);
        let result = render_commit_message(template, "app", "2025-01-02 03:04:05", &files);
        pretty_assertions::assert_eq!(result, expect);
    }

    #[test]
    fn render_commit_message_does_not_rescan() {
        let result = render_commit_message("{project} {count}", "{count}", "", &FileSet::new());
        assert_eq!(result, "{count} 0");
    }
}
