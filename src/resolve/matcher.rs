// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Filesystem glob matching.
//!
//! The resolver never interprets wildcards itself. It hands single-level globs
//! to a [`GlobMatcher`], which expands them into whatever paths currently
//! exist on disk. Bracket classes and `?` are passed through untouched, so
//! their meaning is whatever the matcher gives them.

use glob::{glob_with, MatchOptions, Pattern as GlobPattern};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Expand glob patterns into existing paths.
pub trait GlobMatcher {
    /// Expand glob relative to base directory.
    ///
    /// Returns every existing path the glob denotes, files and directories
    /// alike. A glob that matches nothing, or that cannot be parsed, expands
    /// to nothing.
    fn expand(&self, pattern: &str, base_dir: &Path) -> Vec<PathBuf>;
}

/// Glob matcher with shell semantics backed by the [`glob`] crate.
///
/// Like a POSIX shell, wildcards never cross a path separator, and never
/// match a leading dot unless the dot is written out. Hidden entries are
/// filtered here rather than by the [`glob`] crate, whose own leading dot
/// option also rejects patterns that start with a literal dot.
#[derive(Debug, Clone, Copy)]
pub struct ShellGlob {
    options: MatchOptions,
}

impl ShellGlob {
    /// Construct new shell glob matcher.
    pub fn new() -> Self {
        Self {
            options: MatchOptions {
                case_sensitive: true,
                require_literal_separator: true,
                require_literal_leading_dot: false,
            },
        }
    }
}

impl Default for ShellGlob {
    fn default() -> Self {
        Self::new()
    }
}

impl GlobMatcher for ShellGlob {
    fn expand(&self, pattern: &str, base_dir: &Path) -> Vec<PathBuf> {
        // INVARIANT: Base directory is literal text, even if it contains glob characters.
        let base = GlobPattern::escape(base_dir.to_string_lossy().as_ref());
        let full = format!("{}/{}", base.trim_end_matches('/'), pattern);

        let paths = match glob_with(&full, self.options) {
            Ok(paths) => paths,
            Err(error) => {
                debug!("skip invalid glob {pattern:?}: {error}");
                return Vec::new();
            }
        };

        paths
            .filter_map(|entry| match entry {
                Ok(path) => Some(path),
                Err(error) => {
                    debug!("skip unreadable glob entry: {error}");
                    None
                }
            })
            .filter(|path| match path.strip_prefix(base_dir) {
                Ok(relative) => !hidden_by_wildcard(pattern, relative),
                Err(_) => true,
            })
            .collect()
    }
}

/// Check if a wildcard matched the leading dot of a hidden entry.
///
/// Pattern and path are compared component by component. A hidden component
/// only counts as matched on purpose if its pattern component starts with a
/// dot as well.
fn hidden_by_wildcard(pattern: &str, relative: &Path) -> bool {
    pattern
        .split('/')
        .filter(|part| !part.is_empty())
        .zip(relative.components())
        .any(|(part, component)| {
            component.as_os_str().to_string_lossy().starts_with('.') && !part.starts_with('.')
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs::{create_dir_all, write};

    #[test]
    fn expand_single_level_wildcard() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        write(dir.path().join("server.key"), "")?;
        write(dir.path().join("client.key"), "")?;
        write(dir.path().join("notes.txt"), "")?;
        create_dir_all(dir.path().join("nested"))?;
        write(dir.path().join("nested").join("deep.key"), "")?;

        let mut result = ShellGlob::new().expand("*.key", dir.path());
        result.sort();
        let expect = vec![dir.path().join("client.key"), dir.path().join("server.key")];
        assert_eq!(result, expect);

        Ok(())
    }

    #[test]
    fn expand_passes_special_characters_through() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        write(dir.path().join("config1.json"), "")?;
        write(dir.path().join("data7.txt"), "")?;

        let matcher = ShellGlob::new();
        assert_eq!(
            matcher.expand("config[1].json", dir.path()),
            vec![dir.path().join("config1.json")]
        );
        assert_eq!(
            matcher.expand("data?.txt", dir.path()),
            vec![dir.path().join("data7.txt")]
        );

        Ok(())
    }

    #[test]
    fn expand_skips_hidden_files_without_literal_dot() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        write(dir.path().join(".hidden.env"), "")?;

        let matcher = ShellGlob::new();
        assert!(matcher.expand("*.env", dir.path()).is_empty());
        assert_eq!(
            matcher.expand(".*.env", dir.path()),
            vec![dir.path().join(".hidden.env")]
        );

        Ok(())
    }

    #[test]
    fn expand_pattern_with_literal_leading_dot() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        create_dir_all(dir.path().join("cfg"))?;
        write(dir.path().join(".env.local"), "")?;
        write(dir.path().join("cfg").join(".env.prod"), "")?;
        write(dir.path().join("cfg").join("env.txt"), "")?;

        let matcher = ShellGlob::new();
        assert_eq!(
            matcher.expand(".env.*", dir.path()),
            vec![dir.path().join(".env.local")]
        );
        assert_eq!(
            matcher.expand("cfg/.env*", dir.path()),
            vec![dir.path().join("cfg").join(".env.prod")]
        );
        assert_eq!(
            matcher.expand("cfg/*", dir.path()),
            vec![dir.path().join("cfg").join("env.txt")]
        );

        Ok(())
    }

    #[test]
    fn expand_invalid_glob_is_empty() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        assert!(ShellGlob::new().expand("broken[", dir.path()).is_empty());
        Ok(())
    }
}
