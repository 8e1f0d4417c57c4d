// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Pattern classification.

use std::{
    convert::Infallible,
    fmt::{Display, Formatter, Result as FmtResult},
    str::FromStr,
};

/// Token that turns a glob into a recursive glob.
const RECURSIVE_WILDCARD: &str = "**";

/// Characters that make a pattern a single-level glob.
const GLOB_CHARS: [char; 3] = ['*', '?', '['];

/// Syntactic class of a tagged pattern.
///
/// Classes are listed in the priority order used to classify a pattern. The
/// first class whose rule applies wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PatternKind {
    /// Contains `**`. Loosely matched by substring anywhere under the base.
    RecursiveGlob,

    /// Contains a path separator. Names a file, a directory, or a glob
    /// relative to the base.
    Rooted,

    /// Contains a single-level wildcard, but no path separator.
    SimpleGlob,

    /// Exact file name relative to the base.
    Literal,
}

impl Display for PatternKind {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(match self {
            Self::RecursiveGlob => "recursive-glob",
            Self::Rooted => "rooted",
            Self::SimpleGlob => "simple-glob",
            Self::Literal => "literal",
        })
    }
}

/// Tagged pattern pulled from an ignore file.
///
/// Keeps the raw text as written, along with its class and whether it is a
/// negation. A negation is written with a leading `!`, and removes files
/// from the backup instead of adding them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Pattern {
    raw: String,
    kind: PatternKind,
    negated: bool,
}

impl Pattern {
    /// Classify raw pattern text.
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let negated = raw.starts_with('!');
        let body = if negated { &raw[1..] } else { raw.as_str() };
        let kind = classify(body);

        Self { raw, kind, negated }
    }

    /// Pattern text exactly as written in the ignore file.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Pattern text without its negation prefix.
    pub fn body(&self) -> &str {
        if self.negated {
            &self.raw[1..]
        } else {
            &self.raw
        }
    }

    pub fn kind(&self) -> PatternKind {
        self.kind
    }

    pub fn is_negated(&self) -> bool {
        self.negated
    }

    /// Pattern has nothing left to match once its prefix is removed.
    pub fn is_empty(&self) -> bool {
        self.body().trim().is_empty()
    }

    /// Directory part of a rooted pattern.
    ///
    /// Returns `None` for every other class, or if the rooted pattern has no
    /// directory part, e.g., `/.env`.
    pub fn prefix(&self) -> Option<&str> {
        if self.kind != PatternKind::Rooted {
            return None;
        }

        let body = self.rooted_path();
        body.rfind('/').map(|index| &body[..index])
    }

    /// Path of a rooted pattern relative to its base.
    ///
    /// Drops the leading separator that anchors the pattern, and the trailing
    /// separator that marks a directory.
    pub fn rooted_path(&self) -> &str {
        self.body().trim_start_matches('/').trim_end_matches('/')
    }

    /// Substring left after wildcard tokens are stripped.
    ///
    /// This is what a recursive glob is matched against.
    pub fn residual(&self) -> String {
        self.body()
            .replace("**/", "")
            .replace(RECURSIVE_WILDCARD, "")
            .replace('*', "")
    }
}

impl FromStr for Pattern {
    type Err = Infallible;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(data))
    }
}

impl From<&str> for Pattern {
    fn from(data: &str) -> Self {
        Self::new(data)
    }
}

impl From<String> for Pattern {
    fn from(data: String) -> Self {
        Self::new(data)
    }
}

impl Display for Pattern {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(&self.raw)
    }
}

fn classify(body: &str) -> PatternKind {
    if body.contains(RECURSIVE_WILDCARD) {
        PatternKind::RecursiveGlob
    } else if body.contains('/') {
        PatternKind::Rooted
    } else if body.contains(GLOB_CHARS) {
        PatternKind::SimpleGlob
    } else {
        PatternKind::Literal
    }
}
