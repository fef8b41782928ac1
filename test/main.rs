// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT


use anyhow::Result;
use git2::{IndexEntry, IndexTime, Repository, RepositoryInitOptions};
use std::path::{Path, PathBuf};

pub(crate) struct RepoFixture {
    repo: Repository,
    path: PathBuf,
}

impl RepoFixture {
    pub(crate) fn new(path: impl AsRef<Path>, kind: RepoKind) -> Result<Self> {
        let mut opts = RepositoryInitOptions::new();
        opts.initial_head("main");
        opts.bare(kind.is_bare());
        let repo = Repository::init_opts(path.as_ref(), &opts)?;
        Self::configure(&repo)?;

        Ok(Self {
            repo,
            path: path.as_ref().to_path_buf(),
        })
    }

    /// Clone working copy from bare remote fixture.
    pub(crate) fn clone_from(remote: &RepoFixture, path: impl AsRef<Path>) -> Result<Self> {
        let repo = Repository::clone(&remote.url(), path.as_ref())?;
        Self::configure(&repo)?;

        Ok(Self {
            repo,
            path: path.as_ref().to_path_buf(),
        })
    }

    // INVARIANT: Always provide valid name and email.
    //   - Git will complain if this is not set in CI/CD environments.
    fn configure(repo: &Repository) -> Result<()> {
        let mut config = repo.config()?;
        config.set_str("user.name", "John Doe")?;
        config.set_str("user.email", "john@doe.com")?;
        Ok(())
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn url(&self) -> String {
        self.repo.path().to_string_lossy().into_owned()
    }

    /// Write file into working tree without staging it.
    pub(crate) fn write(&self, filename: impl AsRef<Path>, contents: impl AsRef<str>) -> Result<()> {
        std::fs::write(self.path.join(filename), contents.as_ref())?;
        Ok(())
    }

    pub(crate) fn stage_and_commit(
        &self,
        filename: impl AsRef<Path>,
        contents: impl AsRef<str>,
    ) -> Result<()> {
        let mut index = self.repo.index()?;
        if self.repo.is_bare() {
            let entry = IndexEntry {
                ctime: IndexTime::new(0, 0),
                mtime: IndexTime::new(0, 0),
                dev: 0,
                ino: 0,
                mode: 0o100644,
                uid: 0,
                gid: 0,
                file_size: contents.as_ref().len() as u32,
                id: self.repo.blob(contents.as_ref().as_bytes())?,
                flags: 0,
                flags_extended: 0,
                path: filename.as_ref().to_string_lossy().as_bytes().to_vec(),
            };
            index.add_frombuffer(&entry, contents.as_ref().as_bytes())?;
        } else {
            // INVARIANT: Working tree and index must agree after commit.
            self.write(filename.as_ref(), contents.as_ref())?;
            index.add_path(filename.as_ref())?;
            index.write()?;
        }

        // INVARIANT: Always use new tree produced by index after staging new entry.
        let tree_oid = index.write_tree()?;
        let tree = self.repo.find_tree(tree_oid)?;

        // INVARIANT: Always determine latest parent commits to append to.
        let signature = self.repo.signature()?;
        let mut parents = Vec::new();
        if let Some(parent) = self.repo.head().ok().and_then(|head| head.target()) {
            parents.push(self.repo.find_commit(parent)?);
        }
        let parents = parents.iter().collect::<Vec<_>>();

        // INVARIANT: Commit to HEAD by appending to obtained parent commits.
        self.repo.commit(
            Some("HEAD"),
            &signature,
            &signature,
            format!("chore: add {:?}", filename.as_ref()).as_ref(),
            &tree,
            &parents,
        )?;

        Ok(())
    }

    /// Push main branch of working copy to its origin.
    pub(crate) fn push(&self) -> Result<()> {
        let mut remote = self.repo.find_remote("origin")?;
        remote.push(&["refs/heads/main:refs/heads/main"], None)?;
        Ok(())
    }

    /// Point origin somewhere else, e.g., at a remote that does not exist.
    pub(crate) fn set_origin_url(&self, url: impl AsRef<str>) -> Result<()> {
        self.repo.remote_set_url("origin", url.as_ref())?;
        Ok(())
    }

    pub(crate) fn head_message(&self) -> Result<String> {
        let commit = self.repo.head()?.peel_to_commit()?;
        Ok(commit.message().unwrap_or_default().trim_end().to_string())
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) enum RepoKind {
    #[default]
    Bare,

    Normal,
}

impl RepoKind {
    pub(crate) fn is_bare(&self) -> bool {
        match self {
            Self::Bare => true,
            Self::Normal => false,
        }
    }
}

/// Bare remote with one commit, plus a working clone of it.
pub(crate) fn remote_and_clone(root: &Path) -> Result<(RepoFixture, RepoFixture)> {
    let remote = RepoFixture::new(root.join("remote.git"), RepoKind::Bare)?;
    remote.stage_and_commit(".zshrc", "export EDITOR=vim\n")?;
    let local = RepoFixture::clone_from(&remote, root.join("local"))?;
    Ok((remote, local))
}
