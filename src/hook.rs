// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! External change detector plugin.
//!
//! A domain may ship an executable inside its own working copy that gets run
//! after every check of that domain, e.g., to copy live configuration back
//! into the working copy so the next check notices it.
//!
//! # Contract
//!
//! - Run as a subprocess, never sourced, with the domain's working copy as
//!   its working directory.
//! - `DOTSYNC_DOMAIN` holds the domain name, `DOTSYNC_DOMAIN_PATH` the
//!   absolute path to the working copy.
//! - Standard streams are inherited from dotsync.
//! - Exit status zero means success. Anything else is reported as a warning
//!   and otherwise ignored.

use crate::config::DomainDescriptor;

use std::{
    path::PathBuf,
    process::{Command, ExitStatus},
};
use tracing::{debug, instrument};

/// Environment variable carrying domain name to change detector.
pub const DOMAIN_VAR: &str = "DOTSYNC_DOMAIN";

/// Environment variable carrying working copy path to change detector.
pub const DOMAIN_PATH_VAR: &str = "DOTSYNC_DOMAIN_PATH";

/// Outcome of looking for and running a change detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookOutcome {
    /// Domain has no change detector, or it is not present on disk.
    Absent,

    /// Change detector ran and exited successfully.
    Succeeded,
}

/// Runs change detector of a domain.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChangeDetector;

impl ChangeDetector {
    /// Run change detector of domain, if it has one.
    ///
    /// # Errors
    ///
    /// - Return [`HookError::Spawn`] if change detector cannot be started.
    /// - Return [`HookError::Status`] if change detector exits unsuccessfully.
    #[instrument(skip(self, domain), fields(domain = %domain.name), level = "debug")]
    pub fn run(&self, domain: &DomainDescriptor) -> Result<HookOutcome> {
        let Some(hook) = domain.hook_path() else {
            return Ok(HookOutcome::Absent);
        };

        if !hook.is_file() {
            debug!("no change detector at {:?}", hook.display());
            return Ok(HookOutcome::Absent);
        }

        // INVARIANT: Program path must not depend on child working directory.
        let hook = hook.canonicalize().unwrap_or(hook);
        debug!("run change detector {:?}", hook.display());
        let status = Command::new(&hook)
            .current_dir(&domain.path)
            .env(DOMAIN_VAR, &domain.name)
            .env(DOMAIN_PATH_VAR, &domain.path)
            .status()
            .map_err(|err| HookError::Spawn {
                source: err,
                path: hook.clone(),
            })?;

        if !status.success() {
            return Err(HookError::Status { path: hook, status });
        }

        Ok(HookOutcome::Succeeded)
    }
}

/// Change detector error types.
#[derive(Debug, thiserror::Error)]
pub enum HookError {
    /// Change detector cannot be started.
    #[error("failed to run change detector {:?}", path.display())]
    Spawn {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Change detector exited unsuccessfully.
    #[error("change detector {:?} exited with {status}", path.display())]
    Status { path: PathBuf, status: ExitStatus },
}

/// Friendly result alias :3
pub type Result<T, E = HookError> = std::result::Result<T, E>;
