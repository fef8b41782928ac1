// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Specify which repositories get synced, and how often. Dotsync works out of
//! the box with two built-in __sync domains__: the user's dotfiles working
//! copy, and the working copy holding AI agent configuration. A config file
//! may replace that listing entirely, e.g., to track a third repository.
//!
//! # General Layout
//!
//! ```toml
//! [settings]
//! interval_secs = 14400
//! failure_threshold = 3
//!
//! [[domain]]
//! name = "dotfiles"
//! path = "~/.dotfiles"
//! path_var = "DOTFILES_PATH"
//! disable_var = "DOTFILES_SYNC_DISABLED"
//! ```
//!
//! # Environment Overrides
//!
//! Environment variables always win over the config file. `SYNC_DISABLED`
//! turns off every pass. Each domain names its own variables for overriding
//! its path, its clone URL, and for switching that single domain off.
//! `SYNC_STATE_DIR` relocates persisted state.

use serde::{Deserialize, Serialize};
use std::{
    collections::HashSet,
    env,
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    fs::read_to_string,
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::debug;

/// Environment variable that disables every sync pass.
pub const GLOBAL_DISABLE_VAR: &str = "SYNC_DISABLED";

/// Environment variable that relocates persisted sync state.
pub const STATE_DIR_VAR: &str = "SYNC_STATE_DIR";

/// Sync configuration layout.
///
/// Composed of two basic parts: global settings that shape the interval gate
/// and circuit breaker, and the ordered listing of sync domains. Domains are
/// processed in the order they are listed.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct SyncConfig {
    /// Global sync settings.
    #[serde(default)]
    pub settings: SyncSettings,

    /// Ordered listing of sync domains.
    #[serde(rename = "domain", default = "default_domains")]
    pub domains: Vec<DomainDescriptor>,
}

impl SyncConfig {
    /// Load configuration file, falling back to built-in defaults.
    ///
    /// A missing file is not an error. Environment overrides are applied after
    /// the file is parsed.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::ReadFile`] if file exists but cannot be read.
    /// - Return [`ConfigError::Deserialize`] if file content is malformed.
    /// - Return [`ConfigError::InvalidDomain`] if domain listing is invalid.
    /// - Return [`ConfigError::InvalidSetting`] if a setting is out of range.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.is_file() {
            debug!("load config file {:?}", path.display());
            read_to_string(path)
                .map_err(|err| ConfigError::ReadFile {
                    source: err,
                    path: path.to_path_buf(),
                })?
                .parse()?
        } else {
            debug!("no config file at {:?}, using defaults", path.display());
            Self::default()
        };
        config.apply_env()?;

        Ok(config)
    }

    /// Apply environment overrides from current process environment.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::ShellExpansion`] if an override path cannot be
    ///   expanded.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_with(|key| env::var(key).ok())
    }

    /// Apply environment overrides through custom variable lookup.
    ///
    /// Empty values are treated as unset.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::ShellExpansion`] if an override path cannot be
    ///   expanded.
    pub fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let lookup = |key: &str| lookup(key).filter(|value| !value.is_empty());

        if lookup(GLOBAL_DISABLE_VAR).is_some() {
            self.settings.disabled = true;
        }

        if let Some(dir) = lookup(STATE_DIR_VAR) {
            self.settings.state_dir = Some(expand_path(&dir)?);
        }

        for domain in &mut self.domains {
            if let Some(var) = &domain.disable_var {
                domain.disabled = lookup(var).is_some();
            }

            if let Some(path) = domain.path_var.as_deref().and_then(lookup) {
                domain.path = expand_path(&path)?;
            }

            if let Some(url) = domain.url_var.as_deref().and_then(lookup) {
                domain.clone_url = Some(url);
            }
        }

        Ok(())
    }

    /// Look up domain by name.
    pub fn domain(&self, name: impl AsRef<str>) -> Option<&DomainDescriptor> {
        self.domains
            .iter()
            .find(|domain| domain.name == name.as_ref())
    }

    fn validate(&self) -> Result<()> {
        self.settings.validate()?;

        let mut seen = HashSet::new();
        for domain in &self.domains {
            if domain.name.is_empty()
                || domain.name.contains(':')
                || domain.name.chars().any(char::is_whitespace)
            {
                return Err(ConfigError::InvalidDomain {
                    name: domain.name.clone(),
                    reason: "names must be non-empty without colons or whitespace",
                });
            }

            if !seen.insert(domain.name.as_str()) {
                return Err(ConfigError::InvalidDomain {
                    name: domain.name.clone(),
                    reason: "names must be unique",
                });
            }
        }

        Ok(())
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            settings: SyncSettings::default(),
            domains: default_domains(),
        }
    }
}

impl FromStr for SyncConfig {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut config: SyncConfig = toml::de::from_str(data).map_err(ConfigError::Deserialize)?;

        // INVARIANT: Perform shell expansion on every domain path.
        for domain in &mut config.domains {
            domain.path = expand_path(domain.path.to_string_lossy().as_ref())?;
        }

        if let Some(dir) = &config.settings.state_dir {
            config.settings.state_dir = Some(expand_path(dir.to_string_lossy().as_ref())?);
        }

        config.validate()?;

        Ok(config)
    }
}

impl Display for SyncConfig {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

/// Global sync settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Minimum seconds between two checks.
    pub interval_secs: i64,

    /// Seconds a check is pushed out when the user ignores it for the session.
    pub ignore_secs: i64,

    /// Failures of one domain inside the window that trip the breaker.
    pub failure_threshold: usize,

    /// Trailing window in seconds used to count failures.
    pub failure_window_secs: i64,

    /// Directory holding the timestamp file and failure ledger.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_dir: Option<PathBuf>,

    /// Every pass is disabled.
    #[serde(skip)]
    pub disabled: bool,
}

impl SyncSettings {
    fn validate(&self) -> Result<()> {
        let positive = [
            ("interval_secs", self.interval_secs),
            ("ignore_secs", self.ignore_secs),
            ("failure_window_secs", self.failure_window_secs),
        ];
        for (name, value) in positive {
            if value <= 0 {
                return Err(ConfigError::InvalidSetting {
                    name,
                    reason: "must be greater than zero",
                });
            }
        }

        if self.failure_threshold == 0 {
            return Err(ConfigError::InvalidSetting {
                name: "failure_threshold",
                reason: "must be at least one",
            });
        }

        Ok(())
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            interval_secs: 4 * 60 * 60,
            ignore_secs: 24 * 60 * 60,
            failure_threshold: 3,
            failure_window_secs: 60 * 60,
            state_dir: None,
            disabled: false,
        }
    }
}

/// Descriptor of one sync domain.
///
/// A __sync domain__ is a git working copy that dotsync watches for drift
/// against its remote tracking branch. The orchestrator treats every domain
/// identically, so all domain specific behavior lives here.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct DomainDescriptor {
    /// Unique name, also used to tag failure records.
    pub name: String,

    /// Path to git working copy.
    pub path: PathBuf,

    /// Name of remote to fetch, pull, and push against.
    #[serde(default = "default_remote")]
    pub remote: String,

    /// Branch on remote to track.
    #[serde(default = "default_branch")]
    pub branch: String,

    /// URL to clone working copy from if path does not exist yet.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clone_url: Option<String>,

    /// Change detector executable, relative to working copy path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hook: Option<PathBuf>,

    /// Default commit message offered to the user.
    #[serde(default = "default_commit_message")]
    pub commit_message: String,

    /// Environment variable overriding path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path_var: Option<String>,

    /// Environment variable overriding clone URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url_var: Option<String>,

    /// Environment variable disabling this domain.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disable_var: Option<String>,

    /// Domain is disabled.
    #[serde(skip)]
    pub disabled: bool,
}

impl DomainDescriptor {
    /// Construct new domain descriptor tracking `origin/main`.
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            remote: default_remote(),
            branch: default_branch(),
            clone_url: None,
            hook: None,
            commit_message: default_commit_message(),
            path_var: None,
            url_var: None,
            disable_var: None,
            disabled: false,
        }
    }

    /// Full name of remote tracking branch, e.g., `origin/main`.
    pub fn upstream(&self) -> String {
        format!("{}/{}", self.remote, self.branch)
    }

    /// Absolute path to change detector, if one is configured.
    pub fn hook_path(&self) -> Option<PathBuf> {
        self.hook.as_ref().map(|hook| self.path.join(hook))
    }
}

fn default_domains() -> Vec<DomainDescriptor> {
    let home = crate::path::home_dir().unwrap_or_default();

    let mut dotfiles = DomainDescriptor::new("dotfiles", home.join(".dotfiles"));
    dotfiles.path_var = Some("DOTFILES_PATH".into());
    dotfiles.disable_var = Some("DOTFILES_SYNC_DISABLED".into());
    dotfiles.commit_message = "Update dotfiles".into();

    let mut agent = DomainDescriptor::new("agent-config", home.join(".claude"));
    agent.path_var = Some("CLAUDE_DIR".into());
    agent.url_var = Some("CLAUDE_REPO_URL".into());
    agent.disable_var = Some("CLAUDE_SYNC_DISABLED".into());
    agent.hook = Some(PathBuf::from("scripts").join("detect-local-changes"));
    agent.commit_message = "Update agent configuration".into();

    vec![dotfiles, agent]
}

fn default_remote() -> String {
    "origin".into()
}

fn default_branch() -> String {
    "main".into()
}

fn default_commit_message() -> String {
    "Sync local changes".into()
}

fn expand_path(path: &str) -> Result<PathBuf> {
    Ok(PathBuf::from(
        shellexpand::full(path)
            .map_err(ConfigError::ShellExpansion)?
            .into_owned(),
    ))
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file at {:?}", path.display())]
    ReadFile {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),

    /// Domain listing is invalid.
    #[error("invalid domain {name:?}: {reason}")]
    InvalidDomain { name: String, reason: &'static str },

    /// Setting is out of range.
    #[error("invalid setting {name}: {reason}")]
    InvalidSetting {
        name: &'static str,
        reason: &'static str,
    },
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
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
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[sealed_test(env = [("BLAH", "/home/blah")])]
    fn deserialize_sync_config() -> anyhow::Result<()> {
        let result: SyncConfig = r#"
            [settings]
            interval_secs = 600
            failure_threshold = 5

            [[domain]]
            name = "notes"
            path = "$BLAH/notes"
            branch = "trunk"
            clone_url = "https://blah.org/notes.git"
            hook = "bin/detect"
        "#
        .parse()?;

        let mut notes = DomainDescriptor::new("notes", "/home/blah/notes");
        notes.branch = "trunk".into();
        notes.clone_url = Some("https://blah.org/notes.git".into());
        notes.hook = Some(PathBuf::from("bin/detect"));
        let expect = SyncConfig {
            settings: SyncSettings {
                interval_secs: 600,
                failure_threshold: 5,
                ..SyncSettings::default()
            },
            domains: vec![notes],
        };

        assert_eq!(result, expect);

        Ok(())
    }

    #[test]
    fn serialize_sync_config() {
        let mut notes = DomainDescriptor::new("notes", "/home/blah/notes");
        notes.disable_var = Some("NOTES_SYNC_DISABLED".into());
        let result = SyncConfig {
            settings: SyncSettings::default(),
            domains: vec![notes],
        }
        .to_string();

        let expect = indoc! {r#"
            [settings]
            interval_secs = 14400
            ignore_secs = 86400
            failure_threshold = 3
            failure_window_secs = 3600

            [[domain]]
            name = "notes"
            path = "/home/blah/notes"
            remote = "origin"
            branch = "main"
            commit_message = "Sync local changes"
            disable_var = "NOTES_SYNC_DISABLED"
        "#};

        assert_eq!(result, expect);
    }

    #[test]
    fn missing_domain_listing_uses_builtin_domains() -> anyhow::Result<()> {
        let result: SyncConfig = "[settings]\ninterval_secs = 60\n".parse()?;
        let names: Vec<_> = result.domains.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["dotfiles", "agent-config"]);
        assert_eq!(result.settings.interval_secs, 60);

        Ok(())
    }

    #[test_case("bad:name"; "colon")]
    #[test_case("bad name"; "whitespace")]
    #[test_case(""; "empty")]
    #[test]
    fn reject_invalid_domain_names(name: &str) {
        let data = format!("[[domain]]\nname = {name:?}\npath = \"/tmp/x\"\n");
        let result = data.parse::<SyncConfig>();
        assert!(matches!(result, Err(ConfigError::InvalidDomain { .. })));
    }

    #[test_case("interval_secs = 0"; "zero interval")]
    #[test_case("interval_secs = -60"; "negative interval")]
    #[test_case("ignore_secs = 0"; "zero ignore period")]
    #[test_case("failure_threshold = 0"; "zero threshold")]
    #[test_case("failure_window_secs = -1"; "negative window")]
    #[test]
    fn reject_out_of_range_settings(setting: &str) {
        let data = format!("[settings]\n{setting}\n");
        let result = data.parse::<SyncConfig>();
        assert!(matches!(result, Err(ConfigError::InvalidSetting { .. })));
    }

    #[test]
    fn reject_duplicate_domain_names() {
        let data = indoc! {r#"
            [[domain]]
            name = "dup"
            path = "/tmp/a"

            [[domain]]
            name = "dup"
            path = "/tmp/b"
        "#};
        let result = data.parse::<SyncConfig>();
        assert!(matches!(result, Err(ConfigError::InvalidDomain { .. })));
    }

    #[test]
    fn env_overrides_paths_and_urls() -> anyhow::Result<()> {
        let mut config = SyncConfig::default();
        config.apply_env_with(lookup(&[
            ("DOTFILES_PATH", "/srv/dots"),
            ("CLAUDE_DIR", "/srv/agent"),
            ("CLAUDE_REPO_URL", "git@example.com:me/agent.git"),
            ("SYNC_STATE_DIR", "/srv/state"),
        ]))?;

        let dotfiles = config.domain("dotfiles").unwrap();
        let agent = config.domain("agent-config").unwrap();
        assert_eq!(dotfiles.path, PathBuf::from("/srv/dots"));
        assert_eq!(agent.path, PathBuf::from("/srv/agent"));
        assert_eq!(
            agent.clone_url.as_deref(),
            Some("git@example.com:me/agent.git")
        );
        assert_eq!(
            agent.hook_path(),
            Some(PathBuf::from("/srv/agent/scripts/detect-local-changes"))
        );
        assert_eq!(config.settings.state_dir, Some(PathBuf::from("/srv/state")));
        assert!(!config.settings.disabled);

        Ok(())
    }

    #[test_case(&[("SYNC_DISABLED", "1")], true, false, false; "global")]
    #[test_case(&[("DOTFILES_SYNC_DISABLED", "yes")], false, true, false; "dotfiles only")]
    #[test_case(&[("CLAUDE_SYNC_DISABLED", "1")], false, false, true; "agent only")]
    #[test_case(&[("SYNC_DISABLED", "")], false, false, false; "empty value is unset")]
    #[test]
    fn env_disable_flags(
        vars: &[(&str, &str)],
        global: bool,
        dotfiles: bool,
        agent: bool,
    ) {
        let mut config = SyncConfig::default();
        config.apply_env_with(lookup(vars)).unwrap();

        pretty_assertions::assert_eq!(config.settings.disabled, global);
        pretty_assertions::assert_eq!(config.domain("dotfiles").unwrap().disabled, dotfiles);
        pretty_assertions::assert_eq!(config.domain("agent-config").unwrap().disabled, agent);
    }

    #[sealed_test]
    fn load_missing_file_uses_defaults() -> anyhow::Result<()> {
        let config = SyncConfig::load("does-not-exist.toml")?;
        assert_eq!(config.settings, SyncSettings::default());
        assert_eq!(config.domains.len(), 2);

        Ok(())
    }

    #[sealed_test(env = [("DOTFILES_PATH", "/env/dots")])]
    fn load_file_then_apply_env() -> anyhow::Result<()> {
        std::fs::write(
            "config.toml",
            indoc! {r#"
                [[domain]]
                name = "dotfiles"
                path = "/file/dots"
                path_var = "DOTFILES_PATH"
            "#},
        )?;
        let config = SyncConfig::load("config.toml")?;
        assert_eq!(
            config.domain("dotfiles").unwrap().path,
            PathBuf::from("/env/dots")
        );

        Ok(())
    }
}
