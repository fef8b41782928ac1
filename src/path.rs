// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Path resolution utilities.
//!
//! Determine relevent path information for external files that need to be
//! interacted with, or managed in some way.

use std::{env, path::PathBuf};

/// Determine absolute path to user's home directory.
///
/// Does not check if the path returned actually exists.
///
/// # Errors
///
/// - Return [`NoWayHome`] if home directory path cannot be determined.
pub fn home_dir() -> Result<PathBuf> {
    dirs::home_dir().ok_or(NoWayHome)
}

/// Determine default absolute path to the configuration file.
///
/// Uses XDG Base Directory path `$XDG_CONFIG_HOME/dotsync/config.toml`. Does
/// not check if the path returned actually exists.
///
/// # Errors
///
/// - Return [`NoWayHome`] if home directory path cannot be determined.
///
/// # See Also
///
/// - [XDG Base Directory](https://wiki.archlinux.org/title/XDG_Base_Directory)
pub fn default_config_file() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|path| path.join("dotsync").join("config.toml"))
        .ok_or(NoWayHome)
}

/// Determine default directory for persisted sync state.
///
/// State lives in the system temporary directory, keyed by the name of the
/// current user so that separate accounts on the same machine never share a
/// timestamp or failure ledger.
pub fn default_state_dir() -> PathBuf {
    env::temp_dir().join(format!("dotsync-{}", user_name()))
}

fn user_name() -> String {
    ["USER", "LOGNAME", "USERNAME"]
        .into_iter()
        .filter_map(|key| env::var(key).ok())
        .find(|name| !name.is_empty())
        .unwrap_or_else(|| "unknown".into())
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

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;

    #[sealed_test(env = [("USER", "jdoe")])]
    fn state_dir_keyed_by_user() {
        let result = default_state_dir();
        let expect = env::temp_dir().join("dotsync-jdoe");
        assert_eq!(result, expect);
    }

    #[sealed_test(env = [("USER", ""), ("LOGNAME", "fallback")])]
    fn state_dir_skips_empty_user() {
        let result = default_state_dir();
        let expect = env::temp_dir().join("dotsync-fallback");
        assert_eq!(result, expect);
    }
}
