// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Path resolution utilities.
//!
//! Determine relevent path information for external files that gitsafe needs
//! to read or manage: the global configuration file, the backup cache root,
//! and the layout of a mirror inside that cache.

use std::path::{Path, PathBuf};

/// Determine default absolute path to the global configuration file.
///
/// Uses XDG Base Directory path `$XDG_CONFIG_HOME/gitsafe/config`. Does not
/// check if the path returned actually exists.
///
/// # Errors
///
/// - Return [`NoWayHome`] if home directory path cannot be determined.
pub fn global_config_file() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|path| path.join("gitsafe").join("config"))
        .ok_or(NoWayHome)
}

/// Determine default absolute path to the backup cache root.
///
/// Uses XDG Base Directory path `$XDG_CACHE_HOME/gitsafe` as the default
/// location that houses every mirror. Does not check if the path returned
/// actually exists.
///
/// # Errors
///
/// - Return [`NoWayHome`] if home directory path cannot be determined.
///
/// # See Also
///
/// - [XDG Base Directory](https://wiki.archlinux.org/title/XDG_Base_Directory)
pub fn default_cache_dir() -> Result<PathBuf> {
    dirs::cache_dir()
        .map(|path| path.join("gitsafe"))
        .ok_or(NoWayHome)
}

/// Turn a remote URL into a directory name.
///
/// Every character that is not ASCII alphanumeric becomes an underscore.
/// Near-identical URLs may collide, e.g., `a-b` and `a.b`.
pub fn sanitize_remote(url: impl AsRef<str>) -> String {
    url.as_ref()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// Path of the mirror working copy for a remote inside a cache root.
pub fn mirror_dir(cache_root: impl AsRef<Path>, remote: impl AsRef<str>) -> PathBuf {
    cache_root.as_ref().join(sanitize_remote(remote))
}

/// No way to determine user's home directory.
///
/// # See Also
///
/// - [`dirs::home_dir`](https://docs.rs/dirs/latest/dirs/fn.home_dir.html)
#[derive(Clone, Debug, thiserror::Error)]
#[error("cannot determine absolute path to user's home directory")]
pub struct NoWayHome;

/// Friendly result alias :3
pub type Result<T, E = NoWayHome> = std::result::Result<T, E>;
