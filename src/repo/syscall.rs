// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Git binary invocation.
//!
//! Anything that talks to a remote, or that the user should watch happen,
//! goes through the git binary so that the user's own credential helpers,
//! hooks, and SSH configuration apply.

use std::{
    ffi::OsStr,
    path::Path,
    process::{Command, Stdio},
};
use tracing::debug;

/// Run git in working copy with terminal attached.
///
/// Blocks until git exits. Output goes straight to the user's terminal.
///
/// # Errors
///
/// - Return [`SyscallError::Spawn`] if git cannot be started.
/// - Return [`SyscallError::Status`] if git exits unsuccessfully.
pub fn gitcall_interactive(
    work_tree: &Path,
    args: impl IntoIterator<Item = impl AsRef<OsStr>>,
) -> Result<()> {
    let args = collect_args(args);
    debug!("git {}", display_args(&args));
    let status = Command::new("git")
        .arg("-C")
        .arg(work_tree)
        .args(&args)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()?;

    if !status.success() {
        return Err(SyscallError::Status {
            command: display_args(&args),
            message: format!("exited with {status}"),
        });
    }

    Ok(())
}

/// Run git in working copy without terminal.
///
/// Credential prompts are refused, so a remote that wants a password fails
/// fast instead of hanging. Standard output is returned with trailing line
/// breaks chomped.
///
/// # Errors
///
/// - Return [`SyscallError::Spawn`] if git cannot be started.
/// - Return [`SyscallError::Status`] if git exits unsuccessfully, carrying
///   whatever git wrote to stderr.
pub fn gitcall_non_interactive(
    work_tree: &Path,
    args: impl IntoIterator<Item = impl AsRef<OsStr>>,
) -> Result<String> {
    let args = collect_args(args);
    debug!("git {}", display_args(&args));
    let output = Command::new("git")
        .arg("-C")
        .arg(work_tree)
        .args(&args)
        .env("GIT_TERMINAL_PROMPT", "0")
        .stdin(Stdio::null())
        .output()?;
    let stdout = String::from_utf8_lossy(output.stdout.as_slice()).into_owned();
    let stderr = String::from_utf8_lossy(output.stderr.as_slice()).into_owned();

    if !output.status.success() {
        return Err(SyscallError::Status {
            command: display_args(&args),
            message: chomp(stderr),
        });
    }

    Ok(chomp(stdout))
}

fn collect_args(args: impl IntoIterator<Item = impl AsRef<OsStr>>) -> Vec<std::ffi::OsString> {
    args.into_iter().map(|arg| arg.as_ref().to_owned()).collect()
}

fn display_args(args: &[std::ffi::OsString]) -> String {
    args.iter()
        .map(|arg| arg.to_string_lossy())
        .collect::<Vec<_>>()
        .join(" ")
}

// INVARIANT: Chomp trailing newlines.
fn chomp(message: String) -> String {
    message.trim_end_matches(['\r', '\n']).to_string()
}

/// Git invocation error types.
#[derive(Debug, thiserror::Error)]
pub enum SyscallError {
    /// Git binary cannot be started.
    #[error("failed to run git")]
    Spawn(#[from] std::io::Error),

    /// Git exited unsuccessfully.
    #[error("git {command} failed: {message}")]
    Status { command: String, message: String },
}

/// Friendly result alias :3
pub type Result<T, E = SyscallError> = std::result::Result<T, E>;
