// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! File set construction.
//!
//! A __file set__ is the deduplicated, sorted collection of files that one
//! backup pass copies into the mirror. Paths are kept relative to the project
//! root, and sorted so that output is deterministic and diffs against older
//! backups stay stable.

use crate::{
    marker::{self, IGNORE_FILE},
    resolve::{GlobMatcher, Pattern, Resolver},
};

use std::{
    collections::{btree_set, BTreeSet},
    fmt::{Display, Formatter, Result as FmtResult},
    path::{Component, Path, PathBuf},
};
use tracing::{debug, instrument};

/// Sorted set of files relative to the project root.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FileSet {
    files: BTreeSet<PathBuf>,
}

impl FileSet {
    /// Construct new empty file set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build file set by resolving every pattern.
    ///
    /// Each pattern is resolved independently, and every match lands in one
    /// set, so a file matched by several patterns appears once. Negated
    /// patterns are applied last, and remove whatever they resolve to.
    #[instrument(skip(resolver, patterns), level = "debug")]
    pub fn build<M>(
        resolver: &Resolver<M>,
        patterns: impl IntoIterator<Item = impl Into<Pattern>>,
    ) -> Self
    where
        M: GlobMatcher,
    {
        let (negations, positives): (Vec<Pattern>, Vec<Pattern>) = patterns
            .into_iter()
            .map(Into::into)
            .partition(Pattern::is_negated);

        let mut absolute = BTreeSet::new();
        for pattern in &positives {
            absolute.extend(resolver.resolve(pattern));
        }

        for pattern in &negations {
            for path in resolver.resolve(pattern) {
                if absolute.remove(&path) {
                    debug!("{:?} excluded by {:?}", path.display(), pattern.raw());
                }
            }
        }

        let base_dir = resolver.base_dir();
        let files = absolute
            .into_iter()
            .filter_map(|path| match path.strip_prefix(base_dir) {
                // INVARIANT: Relative paths never step out of the base directory.
                Ok(relative) if is_contained(relative) => Some(relative.to_path_buf()),
                _ => {
                    debug!("skip {:?} outside of {:?}", path.display(), base_dir.display());
                    None
                }
            })
            .collect();

        Self { files }
    }

    /// Build file set of a project from the markers in its ignore file.
    ///
    /// # Errors
    ///
    /// - Return [`marker::MarkerError`] if the ignore file exists but cannot
    ///   be read.
    pub fn from_project(root: impl AsRef<Path>) -> marker::Result<Self> {
        let root = root.as_ref();
        let patterns = marker::read_patterns(root.join(IGNORE_FILE))?;
        Ok(Self::build(&Resolver::new(root), patterns))
    }

    /// Number of files in set.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Check if set holds given path relative to the project root.
    pub fn contains(&self, path: impl AsRef<Path>) -> bool {
        self.files.contains(path.as_ref())
    }

    /// Iterate relative paths in sorted order.
    pub fn iter(&self) -> btree_set::Iter<'_, PathBuf> {
        self.files.iter()
    }
}

/// Check that a relative path is made of plain names only.
pub(crate) fn is_contained(relative: &Path) -> bool {
    relative
        .components()
        .all(|component| matches!(component, Component::Normal(_)))
}

impl<'a> IntoIterator for &'a FileSet {
    type Item = &'a PathBuf;
    type IntoIter = btree_set::Iter<'a, PathBuf>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<P> FromIterator<P> for FileSet
where
    P: Into<PathBuf>,
{
    fn from_iter<I: IntoIterator<Item = P>>(iter: I) -> Self {
        Self {
            files: iter.into_iter().map(Into::into).collect(),
        }
    }
}

/// One path per line, in sorted order.
impl Display for FileSet {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        for path in &self.files {
            writeln!(fmt, "{}", path.display())?;
        }

        Ok(())
    }
}
