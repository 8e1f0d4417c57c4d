// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Gitsafe reads two configuration tiers on every invocation: a global file
//! shared by every project of the user, and a local file at the top-level of
//! the project. Both use the same line-oriented layout:
//!
//! ```text
//! # backup target
//! SAFE_REMOTE=git@github.com:me/backups.git
//! SAFE_PROJECT_NAME="my-app"
//! ```
//!
//! Files are parsed, never evaluated. Blank lines and lines starting with `#`
//! are skipped, every other line must be `KEY=value`. A value may be wrapped
//! in one pair of matching quotes. Local keys override global keys one by one.
//!
//! # Recognized Keys
//!
//! - `SAFE_REMOTE`: URL of backup repository. Required.
//! - `SAFE_PROJECT_NAME`: Subdirectory of mirror to back up into. Defaults to
//!   the base name of the project directory.
//! - `SAFE_COMMIT_MSG`: Commit message template. See [`DEFAULT_COMMIT_MSG`].
//! - `SAFE_CACHE_DIR`: Directory housing every mirror. Defaults to
//!   `$XDG_CACHE_HOME/gitsafe`. Shell expansion is performed on it.

use crate::path::{default_cache_dir, global_config_file, mirror_dir, NoWayHome};

use regex::Regex;
use serde::{de::value::MapDeserializer, Deserialize};
use std::{
    collections::BTreeMap,
    fmt::{Display, Formatter, Result as FmtResult},
    fs::read_to_string,
    io::ErrorKind,
    path::{Component, Path, PathBuf},
    sync::LazyLock,
};
use tracing::{debug, warn};

/// Name of local configuration file at the top-level of a project.
pub const LOCAL_CONFIG_FILE: &str = ".gitsafe";

/// Commit message template used when none is configured.
///
/// Templates may use `{project}`, `{date}`, `{count}`, and `{files}`.
pub const DEFAULT_COMMIT_MSG: &str = "backup({project}): {count} file(s) on {date}";

const KNOWN_KEYS: [&str; 4] = [
    "SAFE_REMOTE",
    "SAFE_PROJECT_NAME",
    "SAFE_COMMIT_MSG",
    "SAFE_CACHE_DIR",
];

static KEY_SHAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid key regex"));

static SSH_REMOTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9._-]+@[A-Za-z0-9.-]+:[A-Za-z0-9._~/-]+\.git$")
        .expect("valid ssh remote regex")
});

static HTTPS_REMOTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https://[A-Za-z0-9.-]+(:[0-9]+)?/[A-Za-z0-9._~/-]+\.git$")
        .expect("valid https remote regex")
});

/// Raw key/value pairs of one or more configuration tiers.
pub type ConfigMap = BTreeMap<String, String>;

/// Parse configuration file content into key/value pairs.
///
/// Later assignments of the same key win.
///
/// # Errors
///
/// - Return [`SyntaxError`] for the first line that is not a valid
///   assignment.
pub fn parse_kv(data: &str) -> std::result::Result<ConfigMap, SyntaxError> {
    let mut map = ConfigMap::new();

    for (index, line) in data.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let syntax_error = |reason: &str| SyntaxError {
            line: index + 1,
            reason: reason.into(),
        };

        let (key, value) = line
            .split_once('=')
            .ok_or_else(|| syntax_error("expected KEY=value"))?;
        let key = key.trim();
        if !KEY_SHAPE.is_match(key) {
            return Err(syntax_error("invalid key name"));
        }

        let value = unquote(value.trim()).ok_or_else(|| syntax_error("unbalanced quotes"))?;
        map.insert(key.to_string(), value.to_string());
    }

    Ok(map)
}

/// Merge two configuration tiers.
///
/// Every key of `local` overrides the same key of `global`.
pub fn merge(global: ConfigMap, local: ConfigMap) -> ConfigMap {
    let mut merged = global;
    merged.extend(local);
    merged
}

/// Check that remote URL has a supported shape.
///
/// Accepts SSH remotes like `git@host:path.git`, and HTTPS remotes like
/// `https://host/path.git`.
pub fn validate_remote_url(url: &str) -> bool {
    SSH_REMOTE.is_match(url) || HTTPS_REMOTE.is_match(url)
}

fn unquote(value: &str) -> Option<&str> {
    for quote in ['"', '\''] {
        if let Some(rest) = value.strip_prefix(quote) {
            return rest.strip_suffix(quote).filter(|inner| !inner.contains(quote));
        }
    }

    if value.contains(['"', '\'']) {
        return None;
    }

    Some(value)
}

/// Keys as they appear in configuration files.
///
/// Missing keys and empty values both come out as empty strings.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawSettings {
    #[serde(rename = "SAFE_REMOTE")]
    remote: String,

    #[serde(rename = "SAFE_PROJECT_NAME")]
    project_name: String,

    #[serde(rename = "SAFE_COMMIT_MSG")]
    commit_msg: String,

    #[serde(rename = "SAFE_CACHE_DIR")]
    cache_dir: String,
}

/// Effective settings for one project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// URL of backup repository.
    pub remote: String,

    /// Subdirectory of mirror that receives this project's files.
    pub project_name: String,

    /// Commit message template.
    pub commit_template: String,

    /// Directory housing every mirror.
    pub cache_dir: PathBuf,
}

impl Settings {
    /// Load settings of project from global and local configuration files.
    ///
    /// Missing files count as empty.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError`] if a file cannot be read or parsed, or if the
    ///   merged settings are invalid.
    pub fn load(project_root: impl AsRef<Path>) -> Result<Self> {
        let project_root = project_root.as_ref();
        Self::load_from(
            Some(global_config_file()?),
            project_root.join(LOCAL_CONFIG_FILE),
            project_root,
        )
    }

    /// Load settings from explicit configuration file paths.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError`] if a file cannot be read or parsed, or if the
    ///   merged settings are invalid.
    pub fn load_from(
        global: Option<PathBuf>,
        local: impl AsRef<Path>,
        project_root: impl AsRef<Path>,
    ) -> Result<Self> {
        let global = match global {
            Some(path) => read_config(path)?,
            None => ConfigMap::new(),
        };
        let local = read_config(local)?;

        Self::from_map(merge(global, local), project_root)
    }

    /// Build settings from merged key/value pairs.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::MissingRemote`] if no remote is configured.
    /// - Return [`ConfigError::InvalidRemote`] if the remote has an
    ///   unsupported shape.
    /// - Return [`ConfigError::InvalidProjectName`] if the project name is not
    ///   a plain directory name.
    /// - Return [`ConfigError::ShellExpansion`] if the cache directory cannot
    ///   be expanded.
    pub fn from_map(map: ConfigMap, project_root: impl AsRef<Path>) -> Result<Self> {
        for key in map.keys().filter(|key| !KNOWN_KEYS.contains(&key.as_str())) {
            warn!("ignore unknown configuration key {key}");
        }

        let deserializer: MapDeserializer<'_, _, serde::de::value::Error> =
            MapDeserializer::new(map.into_iter());
        let raw = RawSettings::deserialize(deserializer)?;

        let remote = raw.remote;
        if remote.is_empty() {
            return Err(ConfigError::MissingRemote);
        }
        if !validate_remote_url(&remote) {
            return Err(ConfigError::InvalidRemote(remote));
        }

        let project_name = if raw.project_name.is_empty() {
            project_root
                .as_ref()
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default()
        } else {
            raw.project_name
        };

        // INVARIANT: Project name is exactly one normal path component, so copies stay inside the mirror.
        let mut components = Path::new(&project_name).components();
        if !matches!(
            (components.next(), components.next()),
            (Some(Component::Normal(_)), None)
        ) {
            return Err(ConfigError::InvalidProjectName(project_name));
        }

        let commit_template = if raw.commit_msg.is_empty() {
            DEFAULT_COMMIT_MSG.to_string()
        } else {
            raw.commit_msg
        };

        let cache_dir = if raw.cache_dir.is_empty() {
            default_cache_dir()?
        } else {
            PathBuf::from(shellexpand::full(&raw.cache_dir)?.into_owned())
        };

        Ok(Self {
            remote,
            project_name,
            commit_template,
            cache_dir,
        })
    }

    /// Path of the mirror working copy for the configured remote.
    pub fn mirror_dir(&self) -> PathBuf {
        mirror_dir(&self.cache_dir, &self.remote)
    }
}

impl Display for Settings {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        writeln!(fmt, "SAFE_REMOTE={}", self.remote)?;
        writeln!(fmt, "SAFE_PROJECT_NAME={}", self.project_name)?;
        writeln!(fmt, "SAFE_COMMIT_MSG={}", self.commit_template)?;
        writeln!(fmt, "SAFE_CACHE_DIR={}", self.cache_dir.display())
    }
}

fn read_config(path: impl AsRef<Path>) -> Result<ConfigMap> {
    let path = path.as_ref();
    let content = match read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            debug!("no configuration file at {:?}", path.display());
            return Ok(ConfigMap::new());
        }
        Err(err) => {
            return Err(ConfigError::ReadFile {
                source: err,
                path: path.to_path_buf(),
            })
        }
    };

    parse_kv(&content).map_err(|err| ConfigError::Syntax {
        source: err,
        path: path.to_path_buf(),
    })
}

/// Malformed configuration line.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("line {line}: {reason}")]
pub struct SyntaxError {
    pub line: usize,
    pub reason: String,
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Configuration file exists but cannot be read.
    #[error("failed to read configuration file at {:?}", path.display())]
    ReadFile {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Configuration file contains a malformed line.
    #[error("invalid configuration file at {:?}", path.display())]
    Syntax {
        #[source]
        source: SyntaxError,
        path: PathBuf,
    },

    /// Merged key/value pairs cannot be turned into settings.
    #[error(transparent)]
    Deserialize(#[from] serde::de::value::Error),

    /// No backup repository configured.
    #[error("SAFE_REMOTE is not set in global or local configuration")]
    MissingRemote,

    /// Backup repository URL has an unsupported shape.
    #[error("SAFE_REMOTE {0:?} is neither git@host:path.git nor https://host/path.git")]
    InvalidRemote(String),

    /// Project name cannot be used as a mirror subdirectory.
    #[error("SAFE_PROJECT_NAME {0:?} must be a plain directory name")]
    InvalidProjectName(String),

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),

    /// Default locations cannot be determined.
    #[error(transparent)]
    NoWayHome(#[from] NoWayHome),
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;
    use simple_test_case::test_case;

    fn map(pairs: &[(&str, &str)]) -> ConfigMap {
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }

    #[test]
    fn parse_kv_assignments() -> anyhow::Result<()> {
        let result = parse_kv(indoc! {r#"
            # backup target
            SAFE_REMOTE=git@github.com:me/backups.git

              SAFE_PROJECT_NAME = "my app"
            SAFE_COMMIT_MSG='save {count} files'
            SAFE_CACHE_DIR=
            SAFE_REMOTE=https://example.com/me/backups.git
        "#})?;

        let expect = map(&[
            ("SAFE_CACHE_DIR", ""),
            ("SAFE_COMMIT_MSG", "save {count} files"),
            ("SAFE_PROJECT_NAME", "my app"),
            ("SAFE_REMOTE", "https://example.com/me/backups.git"),
        ]);
        assert_eq!(result, expect);

        Ok(())
    }

    #[test_case("SAFE_REMOTE", 1, "expected KEY=value"; "missing assignment")]
    #[test_case("A=1\n$(rm -rf ~)=x", 2, "invalid key name"; "command substitution key")]
    #[test_case("SAFE REMOTE=x", 1, "invalid key name"; "space in key")]
    #[test_case("A=\"open", 1, "unbalanced quotes"; "unterminated quote")]
    #[test_case("A='a'b'", 1, "unbalanced quotes"; "inner quote")]
    #[test_case("A=it's", 1, "unbalanced quotes"; "stray quote")]
    #[test]
    fn parse_kv_rejects_malformed_line(data: &str, line: usize, reason: &str) {
        let result = parse_kv(data);
        let expect = Err(SyntaxError {
            line,
            reason: reason.into(),
        });
        pretty_assertions::assert_eq!(result, expect);
    }

    #[test]
    fn local_overrides_global_per_key() {
        let global = map(&[("SAFE_REMOTE", "global"), ("SAFE_COMMIT_MSG", "global msg")]);
        let local = map(&[("SAFE_REMOTE", "local"), ("SAFE_PROJECT_NAME", "proj")]);

        let expect = map(&[
            ("SAFE_COMMIT_MSG", "global msg"),
            ("SAFE_PROJECT_NAME", "proj"),
            ("SAFE_REMOTE", "local"),
        ]);
        assert_eq!(merge(global, local), expect);
    }

    #[test_case("git@host:path.git", true; "ssh")]
    #[test_case("git@github.com:me/nested/backups.git", true; "ssh nested")]
    #[test_case("https://host/path.git", true; "https")]
    #[test_case("https://git.example.com:8443/me/backups.git", true; "https with port")]
    #[test_case("not-a-url", false; "garbage")]
    #[test_case("http://host/path.git", false; "plain http")]
    #[test_case("git@host:path", false; "ssh without suffix")]
    #[test_case("https://host/path.git; rm -rf ~", false; "trailing command")]
    #[test_case("", false; "empty")]
    #[test]
    fn remote_url_shapes(url: &str, expect: bool) {
        pretty_assertions::assert_eq!(validate_remote_url(url), expect);
    }

    #[test]
    fn settings_require_remote() {
        let result = Settings::from_map(map(&[("SAFE_PROJECT_NAME", "x")]), "/work/app");
        assert!(matches!(result, Err(ConfigError::MissingRemote)));

        let result = Settings::from_map(map(&[("SAFE_REMOTE", "not-a-url")]), "/work/app");
        assert!(matches!(result, Err(ConfigError::InvalidRemote(url)) if url == "not-a-url"));
    }

    #[test_case("../escape"; "parent")]
    #[test_case("a/b"; "nested")]
    #[test_case("/abs"; "absolute")]
    #[test_case("."; "current")]
    #[test]
    fn settings_reject_project_name(name: &str) {
        let config = map(&[("SAFE_REMOTE", "git@h:p.git"), ("SAFE_PROJECT_NAME", name)]);
        let result = Settings::from_map(config, "/work/app");
        assert!(matches!(result, Err(ConfigError::InvalidProjectName(_))));
    }

    #[sealed_test(env = [("XDG_CACHE_HOME", "/tmp/cache")])]
    fn settings_defaults() -> anyhow::Result<()> {
        let result = Settings::from_map(map(&[("SAFE_REMOTE", "git@h:p.git")]), "/work/app")?;
        let expect = Settings {
            remote: "git@h:p.git".into(),
            project_name: "app".into(),
            commit_template: DEFAULT_COMMIT_MSG.into(),
            cache_dir: PathBuf::from("/tmp/cache/gitsafe"),
        };
        assert_eq!(result, expect);
        assert_eq!(result.mirror_dir(), PathBuf::from("/tmp/cache/gitsafe/git_h_p_git"));

        Ok(())
    }

    #[sealed_test(env = [("BACKUPS", "/srv/backups")])]
    fn settings_expand_cache_dir() -> anyhow::Result<()> {
        let config = map(&[("SAFE_REMOTE", "git@h:p.git"), ("SAFE_CACHE_DIR", "$BACKUPS/cache")]);
        let result = Settings::from_map(config, "/work/app")?;
        assert_eq!(result.cache_dir, PathBuf::from("/srv/backups/cache"));
        Ok(())
    }

    #[sealed_test(env = [("XDG_CACHE_HOME", "/tmp/cache")])]
    fn load_from_merges_tiers() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let project = dir.path().join("project");
        std::fs::create_dir_all(&project)?;
        let global = dir.path().join("global");
        std::fs::write(
            &global,
            "SAFE_REMOTE=git@h:global.git\nSAFE_COMMIT_MSG=from global\n",
        )?;
        std::fs::write(
            project.join(LOCAL_CONFIG_FILE),
            "SAFE_REMOTE=https://h/local.git\n",
        )?;

        let result = Settings::load_from(Some(global), project.join(LOCAL_CONFIG_FILE), &project)?;
        assert_eq!(result.remote, "https://h/local.git");
        assert_eq!(result.commit_template, "from global");
        assert_eq!(result.project_name, "project");

        Ok(())
    }

    #[test]
    fn load_from_reports_bad_line_with_path() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let local = dir.path().join(LOCAL_CONFIG_FILE);
        std::fs::write(&local, "SAFE_REMOTE=git@h:p.git\noops\n")?;

        let result = Settings::load_from(None, &local, dir.path());
        match result {
            Err(ConfigError::Syntax { source, path }) => {
                assert_eq!(source.line, 2);
                assert_eq!(path, local);
            }
            other => panic!("expected syntax error, got {other:?}"),
        }

        Ok(())
    }

    #[sealed_test(env = [("XDG_CACHE_HOME", "/tmp/cache")])]
    fn display_as_config_file() -> anyhow::Result<()> {
        let result = Settings::from_map(map(&[("SAFE_REMOTE", "git@h:p.git")]), "/work/app")?;
        let expect = indoc! {r#"
            SAFE_REMOTE=git@h:p.git
            SAFE_PROJECT_NAME=app
            SAFE_COMMIT_MSG=backup({project}): {count} file(s) on {date}
            SAFE_CACHE_DIR=/tmp/cache/gitsafe
        "#};
        assert_eq!(result.to_string(), expect);
        Ok(())
    }
}
