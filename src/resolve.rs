// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Pattern resolution.
//!
//! Turn one tagged pattern into the concrete files it denotes on disk.
//!
//! # Pattern Classes
//!
//! Every pattern belongs to exactly one [`PatternKind`]. Classes are checked
//! in the following order, first match wins:
//!
//! 1. __Recursive glob__ (contains `**`). Wildcard tokens are stripped to get
//!    a residual substring. Every file anywhere under the base directory
//!    whose name contains the residual matches. If the residual itself holds
//!    a separator, it is looked for in the path relative to the base instead.
//!    This is a loose approximation of recursive glob semantics, and is kept
//!    loose on purpose: existing tags may depend on it.
//! 2. __Rooted__ (contains `/`). An existing file resolves to itself. An
//!    existing directory resolves to every file beneath it. Anything else is
//!    expanded as a glob relative to the base directory.
//! 3. __Simple glob__ (contains `*`, `?`, or `[`). An existing file with that
//!    exact name resolves to itself, otherwise the pattern is expanded as a
//!    glob anchored at the base directory.
//! 4. __Literal__. The exact file name relative to the base directory.
//!
//! Only regular files ever come out of resolution. Patterns that match
//! nothing resolve to nothing; that is not an error, since tagged files
//! commonly do not exist yet.

pub mod matcher;
pub mod pattern;

pub use matcher::{GlobMatcher, ShellGlob};
pub use pattern::{Pattern, PatternKind};

use ignore::WalkBuilder;
use std::{
    iter::{empty, once},
    path::{Path, PathBuf},
};
use tracing::debug;

/// Lazy sequence of resolved file paths.
pub type Resolved<'a> = Box<dyn Iterator<Item = PathBuf> + 'a>;

/// Resolve patterns to files relative to a base directory.
///
/// Globs are expanded by the [`GlobMatcher`] the resolver is built with, so
/// the classification logic stays the same no matter what backs it.
#[derive(Debug, Clone)]
pub struct Resolver<M = ShellGlob>
where
    M: GlobMatcher,
{
    base_dir: PathBuf,
    matcher: M,
}

impl Resolver<ShellGlob> {
    /// Construct new resolver using shell glob semantics.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self::with_matcher(base_dir, ShellGlob::new())
    }
}

impl<M> Resolver<M>
where
    M: GlobMatcher,
{
    /// Construct new resolver with a custom glob matcher.
    pub fn with_matcher(base_dir: impl Into<PathBuf>, matcher: M) -> Self {
        Self {
            base_dir: base_dir.into(),
            matcher,
        }
    }

    /// Directory every pattern is resolved against.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Resolve pattern into absolute paths of existing regular files.
    ///
    /// Negation is ignored here, only the body of the pattern is resolved.
    /// Each call starts over from scratch, nothing is cached between calls.
    pub fn resolve<'a>(&'a self, pattern: &Pattern) -> Resolved<'a> {
        if pattern.is_empty() {
            return Box::new(empty());
        }

        debug!("resolve {} pattern {:?}", pattern.kind(), pattern.raw());
        match pattern.kind() {
            PatternKind::RecursiveGlob => self.resolve_recursive(pattern.residual()),
            PatternKind::Rooted => self.resolve_rooted(pattern.rooted_path()),
            PatternKind::SimpleGlob => self.resolve_simple_glob(pattern.body()),
            PatternKind::Literal => self.resolve_literal(pattern.body()),
        }
    }

    fn resolve_recursive(&self, residual: String) -> Resolved<'_> {
        let base_dir = self.base_dir.as_path();
        let files = walk_files(base_dir).filter(move |path| {
            if residual.contains('/') {
                // INVARIANT: Anchor relative path with a separator so "/name" can match top-level.
                let relative = path.strip_prefix(base_dir).unwrap_or(path);
                let relative = format!("/{}", to_slash(relative));
                relative.contains(residual.as_str())
            } else {
                path.file_name()
                    .map(|name| name.to_string_lossy().contains(residual.as_str()))
                    .unwrap_or(false)
            }
        });

        Box::new(files)
    }

    fn resolve_rooted(&self, path: &str) -> Resolved<'_> {
        // INVARIANT: A bare separator does not mean the whole project.
        if path.is_empty() {
            return Box::new(empty());
        }

        let target = self.base_dir.join(path);
        if target.is_file() {
            Box::new(once(target))
        } else if target.is_dir() {
            Box::new(walk_files(&target))
        } else {
            self.expand_files(path)
        }
    }

    fn resolve_simple_glob(&self, pattern: &str) -> Resolved<'_> {
        let target = self.base_dir.join(pattern);
        if target.is_file() {
            return Box::new(once(target));
        }

        self.expand_files(pattern)
    }

    fn resolve_literal(&self, name: &str) -> Resolved<'_> {
        let target = self.base_dir.join(name);
        if target.is_file() {
            Box::new(once(target))
        } else {
            Box::new(empty())
        }
    }

    fn expand_files(&self, pattern: &str) -> Resolved<'_> {
        let files = self
            .matcher
            .expand(pattern, &self.base_dir)
            .into_iter()
            .filter(|path| path.is_file());

        Box::new(files)
    }
}

/// Walk every regular file beneath root, ignore rules included.
fn walk_files(root: &Path) -> impl Iterator<Item = PathBuf> {
    WalkBuilder::new(root)
        .standard_filters(false)
        .build()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry.into_path()),
            Err(error) => {
                debug!("skip unreadable entry: {error}");
                None
            }
        })
        .filter(|path| path.is_file())
}

fn to_slash(path: &Path) -> String {
    path.components()
        .map(|component| component.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}
