// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Marker extraction.
//!
//! Projects opt gitignored files into backup by appending the __marker__
//! `#safe` to the matching line of their ignore file:
//!
//! ```text
//! .env #safe
//! secrets/*.json	#safe
//! node_modules/
//! ```
//!
//! Only tagged lines are of interest. Everything else in the ignore file is
//! left for Git to deal with.
//!
//! # Extraction Rules
//!
//! A line is a candidate if, after trimming trailing whitespace, it ends with
//! the marker. Any amount of whitespace, including none at all, may sit
//! between the pattern and the marker. The marker and that whitespace are
//! removed, and what remains is trimmed of trailing whitespace only. Leading
//! whitespace is kept, because it is part of the pattern as far as the ignore
//! file is concerned.
//!
//! Comment lines are normally skipped. A comment line that carries the
//! marker is still a pattern: its text is whatever follows the comment
//! character.

use std::{
    fs::read_to_string,
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tracing::debug;

/// Tag that opts an ignore file line into backup.
pub const MARKER: &str = "#safe";

/// Ignore file scanned for markers, relative to the project root.
pub const IGNORE_FILE: &str = ".gitignore";

/// Extract the tagged pattern from a single ignore file line.
///
/// Returns `None` if the line is not tagged, or if nothing remains of it once
/// the marker is removed.
pub fn extract_pattern(line: &str) -> Option<&str> {
    let untagged = line.trim_end().strip_suffix(MARKER)?.trim_end();

    // INVARIANT: A tagged comment line yields the text after the comment character.
    let pattern = untagged.strip_prefix('#').unwrap_or(untagged);
    if pattern.trim().is_empty() {
        return None;
    }

    Some(pattern)
}

/// Extract every tagged pattern from ignore file content.
///
/// Patterns are listed in order of first appearance. Duplicates are kept.
pub fn extract_patterns(content: &str) -> Vec<String> {
    content
        .lines()
        .filter_map(extract_pattern)
        .map(str::to_owned)
        .collect()
}

/// Read ignore file and extract every tagged pattern.
///
/// A missing ignore file simply has no patterns.
///
/// # Errors
///
/// - Return [`MarkerError::ReadIgnoreFile`] if the ignore file exists but
///   cannot be read.
pub fn read_patterns(path: impl AsRef<Path>) -> Result<Vec<String>> {
    let path = path.as_ref();
    match read_to_string(path) {
        Ok(content) => Ok(extract_patterns(&content)),
        Err(err) if err.kind() == ErrorKind::NotFound => {
            debug!("no ignore file at {:?}", path.display());
            Ok(Vec::new())
        }
        Err(err) => Err(MarkerError::ReadIgnoreFile {
            source: err,
            path: path.to_path_buf(),
        }),
    }
}

/// Marker extraction error types.
#[derive(Debug, thiserror::Error)]
pub enum MarkerError {
    /// Ignore file exists but cannot be read.
    #[error("failed to read ignore file at {:?}", path.display())]
    ReadIgnoreFile {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = MarkerError> = std::result::Result<T, E>;
