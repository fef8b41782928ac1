// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Working copy inspection and manipulation.
//!
//! Every sync domain is backed by a plain (non-bare) git working copy that
//! tracks a branch on a remote. Dotsync asks two questions of it: does the
//! working tree hold uncommitted changes, and does the remote tracking branch
//! hold commits that HEAD lacks? Answering the second one needs a fetch.
//!
//! # Read Versus Write
//!
//! Read-only checks go through libgit2, which is fast and never prompts.
//! Fetching, committing, pushing, and pulling go through the git binary, so
//! that the user's credential helpers and hooks apply just like they would
//! from a regular shell. Fetching never prompts for credentials.
//!
//! # Fail-Open Fetch
//!
//! A failed fetch is reported as "no remote updates" rather than as an error.
//! A flaky network should never make dotsync nag the user.

pub mod auth;
pub mod syscall;

use crate::{
    config::DomainDescriptor,
    repo::{
        auth::IndicatifPrompter,
        syscall::{gitcall_interactive, gitcall_non_interactive, SyscallError},
    },
};

use auth_git2::GitAuthenticator;
use git2::{build::RepoBuilder, Config, FetchOptions, RemoteCallbacks, Repository, StatusOptions};
use indicatif::{ProgressBar, ProgressStyle};
use std::{
    path::{Path, PathBuf},
    time,
};
use tracing::{debug, info, instrument};

/// Point in time view of a working copy.
///
/// Computed fresh on every check, never persisted.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RepositorySnapshot {
    /// Working tree or index differ from HEAD, or untracked files exist.
    pub has_uncommitted_changes: bool,

    /// Commits on remote tracking branch missing from HEAD.
    pub commits_behind_remote: usize,

    /// Commits on HEAD missing from remote tracking branch.
    pub commits_ahead_of_remote: usize,
}

/// Git working copy of one sync domain.
pub trait WorkingCopy {
    /// Check for uncommitted changes, including untracked files.
    fn has_local_changes(&self) -> Result<bool>;

    /// Fetch tracked branch from remote.
    fn fetch(&self) -> Result<()>;

    /// Count commits on remote tracking branch missing from HEAD.
    fn commits_behind(&self) -> Result<usize>;

    /// Count commits on HEAD missing from remote tracking branch.
    fn commits_ahead(&self) -> Result<usize>;

    /// Short working tree status for display.
    fn status(&self) -> Result<String>;

    /// Diff of working tree against HEAD for display.
    fn diff(&self) -> Result<String>;

    /// One line summary of each incoming commit for display.
    fn incoming(&self) -> Result<String>;

    /// Stage everything and commit it.
    fn commit_all(&self, message: &str) -> Result<()>;

    /// Push tracked branch to remote.
    fn push(&self) -> Result<()>;

    /// Pull tracked branch from remote.
    fn pull(&self) -> Result<()>;

    /// Fetch, then check if remote tracking branch is ahead of HEAD.
    ///
    /// Fails open: if the fetch or the comparison fails, there are no updates.
    fn has_remote_updates(&self) -> bool {
        if let Err(error) = self.fetch() {
            debug!("fetch failed, assuming no remote updates: {error}");
            return false;
        }

        match self.commits_behind() {
            Ok(behind) => behind > 0,
            Err(error) => {
                debug!("cannot compare against remote, assuming no updates: {error}");
                false
            }
        }
    }

    /// Snapshot of working copy against last fetched remote state.
    ///
    /// Does not fetch. An unknown remote tracking branch counts as zero
    /// commits either way.
    fn snapshot(&self) -> Result<RepositorySnapshot> {
        Ok(RepositorySnapshot {
            has_uncommitted_changes: self.has_local_changes()?,
            commits_behind_remote: self.commits_behind().unwrap_or_default(),
            commits_ahead_of_remote: self.commits_ahead().unwrap_or_default(),
        })
    }
}

/// Layer of indirection for working copy access.
pub trait RepoAccess {
    /// Working copy type handed out.
    type Copy: WorkingCopy;

    /// Open working copy of domain.
    ///
    /// Returns [`None`] if the domain path is not a usable, non-bare git
    /// repository. That is a configuration matter, not a failure.
    fn open(&self, domain: &DomainDescriptor) -> Option<Self::Copy>;

    /// Clone working copy of domain from `url` into domain path.
    fn clone_domain(&self, url: &str, domain: &DomainDescriptor) -> Result<()>;
}

impl<R: RepoAccess + ?Sized> RepoAccess for &R {
    type Copy = R::Copy;

    fn open(&self, domain: &DomainDescriptor) -> Option<Self::Copy> {
        (**self).open(domain)
    }

    fn clone_domain(&self, url: &str, domain: &DomainDescriptor) -> Result<()> {
        (**self).clone_domain(url, domain)
    }
}

/// Working copy access through libgit2 and the git binary.
#[derive(Debug, Default, Clone, Copy)]
pub struct Git2Access;

impl RepoAccess for Git2Access {
    type Copy = Git2WorkingCopy;

    #[instrument(skip(self, domain), fields(domain = %domain.name), level = "debug")]
    fn open(&self, domain: &DomainDescriptor) -> Option<Git2WorkingCopy> {
        match Repository::open(&domain.path) {
            Ok(repository) if repository.is_bare() => {
                debug!("{:?} is bare, skipping", domain.path.display());
                None
            }
            Ok(repository) => Some(Git2WorkingCopy::new(
                repository,
                &domain.path,
                &domain.remote,
                &domain.branch,
            )),
            Err(error) => {
                debug!("{:?} is not a repository: {error}", domain.path.display());
                None
            }
        }
    }

    /// Clone working copy from remote repository.
    ///
    /// The progress of the clone is displayed through a progress bar. If
    /// credentials are required for the clone to continue, then the user will
    /// be prompted for them, and the progress bar will be blocked for input.
    #[instrument(skip(self, url, domain), fields(domain = %domain.name), level = "debug")]
    fn clone_domain(&self, url: &str, domain: &DomainDescriptor) -> Result<()> {
        info!("clone {url} into {:?}", domain.path.display());
        if let Some(parent) = domain.path.parent() {
            mkdirp::mkdirp(parent).map_err(|err| RepoError::CreateDir {
                source: err,
                path: parent.to_path_buf(),
            })?;
        }

        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{elapsed_precise:.green}  {msg:<50}  [{wide_bar:.yellow/blue}]",
        )?
        .progress_chars("-Cco.");
        bar.set_style(style);
        bar.set_message(url.to_string());
        bar.enable_steady_tick(time::Duration::from_millis(100));

        let prompter = IndicatifPrompter::new(bar);
        let authenticator = GitAuthenticator::default().set_prompter(prompter.clone());
        let config = Config::open_default()?;

        let mut throttle = time::Instant::now();
        let mut rc = RemoteCallbacks::new();
        rc.credentials(authenticator.credentials(&config));
        rc.transfer_progress(|progress| {
            let stats = progress.to_owned();
            if throttle.elapsed() > time::Duration::from_millis(10) {
                throttle = time::Instant::now();
                prompter.bar.set_length(stats.total_objects() as u64);
                prompter.bar.set_position(stats.received_objects() as u64);
            }
            true
        });

        let mut fo = FetchOptions::new();
        fo.remote_callbacks(rc);
        let result = RepoBuilder::new()
            .fetch_options(fo)
            .clone(url, &domain.path);
        prompter.bar.finish_and_clear();
        result?;

        Ok(())
    }
}

/// Working copy through libgit2 and the git binary.
pub struct Git2WorkingCopy {
    repository: Repository,
    work_tree: PathBuf,
    remote: String,
    branch: String,
}

impl Git2WorkingCopy {
    /// Construct new working copy handle.
    pub fn new(
        repository: Repository,
        work_tree: impl Into<PathBuf>,
        remote: impl Into<String>,
        branch: impl Into<String>,
    ) -> Self {
        Self {
            repository,
            work_tree: work_tree.into(),
            remote: remote.into(),
            branch: branch.into(),
        }
    }

    /// Path to working tree.
    pub fn work_tree(&self) -> &Path {
        &self.work_tree
    }

    fn upstream(&self) -> String {
        format!("{}/{}", self.remote, self.branch)
    }

    fn ahead_behind(&self) -> Result<(usize, usize)> {
        let head = self.repository.head()?.peel_to_commit()?.id();
        let upstream = self
            .repository
            .refname_to_id(&format!("refs/remotes/{}", self.upstream()))?;
        Ok(self.repository.graph_ahead_behind(head, upstream)?)
    }
}

impl std::fmt::Debug for Git2WorkingCopy {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fmt.debug_struct("Git2WorkingCopy")
            .field("work_tree", &self.work_tree)
            .field("upstream", &self.upstream())
            .finish()
    }
}

impl WorkingCopy for Git2WorkingCopy {
    fn has_local_changes(&self) -> Result<bool> {
        let mut opts = StatusOptions::new();
        opts.include_untracked(true)
            .recurse_untracked_dirs(false)
            .include_ignored(false);
        let statuses = self.repository.statuses(Some(&mut opts))?;
        debug!("{} changed paths in {:?}", statuses.len(), self.work_tree.display());

        Ok(!statuses.is_empty())
    }

    #[instrument(skip(self), level = "debug")]
    fn fetch(&self) -> Result<()> {
        gitcall_non_interactive(
            &self.work_tree,
            ["fetch", "--quiet", self.remote.as_str(), self.branch.as_str()],
        )?;
        Ok(())
    }

    fn commits_behind(&self) -> Result<usize> {
        self.ahead_behind().map(|(_, behind)| behind)
    }

    fn commits_ahead(&self) -> Result<usize> {
        self.ahead_behind().map(|(ahead, _)| ahead)
    }

    fn status(&self) -> Result<String> {
        Ok(gitcall_non_interactive(
            &self.work_tree,
            ["status", "--short", "--branch"],
        )?)
    }

    fn diff(&self) -> Result<String> {
        Ok(gitcall_non_interactive(
            &self.work_tree,
            ["diff", "--stat", "--patch", "HEAD"],
        )?)
    }

    fn incoming(&self) -> Result<String> {
        let range = format!("HEAD..{}", self.upstream());
        Ok(gitcall_non_interactive(
            &self.work_tree,
            ["log", "--oneline", "--no-decorate", range.as_str()],
        )?)
    }

    #[instrument(skip(self, message), level = "debug")]
    fn commit_all(&self, message: &str) -> Result<()> {
        gitcall_interactive(&self.work_tree, ["add", "--all"])?;
        gitcall_interactive(&self.work_tree, ["commit", "--quiet", "--message", message])?;
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    fn push(&self) -> Result<()> {
        gitcall_interactive(
            &self.work_tree,
            ["push", self.remote.as_str(), self.branch.as_str()],
        )?;
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    fn pull(&self) -> Result<()> {
        gitcall_interactive(
            &self.work_tree,
            ["pull", self.remote.as_str(), self.branch.as_str()],
        )?;
        Ok(())
    }
}

/// Working copy error types.
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    /// Git binary invocation fails.
    #[error(transparent)]
    Syscall(#[from] SyscallError),

    /// Operations from libgit2 fail.
    #[error(transparent)]
    Git2(#[from] git2::Error),

    /// Style template cannot be set for progress bars.
    #[error(transparent)]
    IndicatifStyleTemplate(#[from] indicatif::style::TemplateError),

    /// Parent directory of clone target cannot be created.
    #[error("failed to create directory {:?}", path.display())]
    CreateDir {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = RepoError> = std::result::Result<T, E>;
