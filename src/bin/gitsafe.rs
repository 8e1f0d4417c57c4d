// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use gitsafe::{
    backup::{Backup, BackupOutcome},
    config::Settings,
    discover_project_root,
    fileset::FileSet,
    hook::{self, Installed, Uninstalled},
    marker::{read_patterns, IGNORE_FILE},
    resolve::Pattern,
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::{path::PathBuf, process::exit};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "gitsafe [options] <gitsafe-command>",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    /// Run as if gitsafe was started in given project directory.
    #[arg(short = 'C', global = true, value_name = "path")]
    pub project: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    fn run(self) -> Result<()> {
        let start = match self.project {
            Some(path) => path,
            None => std::env::current_dir().context("cannot determine current directory")?,
        };
        let root = discover_project_root(&start)
            .with_context(|| format!("{:?} is not inside a Git project", start.display()))?;

        match self.command {
            Command::Status => run_status(root),
            Command::Patterns => run_patterns(root),
            Command::Backup => run_backup(root),
            Command::Install => run_install(root),
            Command::Uninstall => run_uninstall(root),
            Command::Config => run_config(root),
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// List files that the next backup would copy.
    #[command(override_usage = "gitsafe status [options]")]
    Status,

    /// List patterns tagged with #safe, and how each one is resolved.
    #[command(override_usage = "gitsafe patterns [options]")]
    Patterns,

    /// Copy tagged files into backup mirror, then commit and push.
    #[command(override_usage = "gitsafe backup [options]")]
    Backup,

    /// Install post-commit hook that runs a backup after every commit.
    #[command(override_usage = "gitsafe install [options]")]
    Install,

    /// Remove post-commit hook installed by gitsafe.
    #[command(override_usage = "gitsafe uninstall [options]")]
    Uninstall,

    /// Show effective settings of project.
    #[command(override_usage = "gitsafe config [options]")]
    Config,
}

fn main() {
    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .with_writer(std::io::stderr)
        .without_time();
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_default();
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    if let Err(error) = run() {
        error!("{error:?}");
        exit(1);
    }

    exit(0)
}

fn run() -> Result<()> {
    Cli::parse().run()
}

fn run_status(root: PathBuf) -> Result<()> {
    let files = FileSet::from_project(&root)?;
    print!("{files}");

    Ok(())
}

fn run_patterns(root: PathBuf) -> Result<()> {
    for raw in read_patterns(root.join(IGNORE_FILE))? {
        let pattern = Pattern::new(raw);
        let kind = if pattern.is_negated() {
            format!("!{}", pattern.kind())
        } else {
            pattern.kind().to_string()
        };
        println!("{kind:<16}{}", pattern.raw());
    }

    Ok(())
}

fn run_backup(root: PathBuf) -> Result<()> {
    let backup = Backup::load(root)?;
    let report = backup.run()?;

    match &report.outcome {
        BackupOutcome::Queued { .. } => warn!("{}", report.outcome),
        _ => info!("{}", report.outcome),
    }

    Ok(())
}

fn run_install(root: PathBuf) -> Result<()> {
    match hook::install(root)? {
        Installed::Fresh | Installed::Unchanged => {}
        Installed::MovedForeign(backup) => {
            info!("previous hook kept at {:?}", backup.display());
        }
    }

    Ok(())
}

fn run_uninstall(root: PathBuf) -> Result<()> {
    match hook::uninstall(root)? {
        Uninstalled::Removed { .. } => info!("removed {} hook", hook::HOOK_NAME),
        Uninstalled::Missing => info!("no {} hook installed", hook::HOOK_NAME),
        Uninstalled::Foreign => {}
    }

    Ok(())
}

fn run_config(root: PathBuf) -> Result<()> {
    let settings = Settings::load(&root)?;
    print!("{settings}");
    info!("mirror at {:?}", settings.mirror_dir().display());

    Ok(())
}
