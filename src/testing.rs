// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Test doubles for working copies.

use crate::{
    config::DomainDescriptor,
    repo::{syscall::SyscallError, RepoAccess, RepoError, Result, WorkingCopy},
};

use std::{
    cell::RefCell,
    collections::{HashMap, HashSet},
    rc::Rc,
};

#[derive(Debug, Default)]
pub(crate) struct FakeRepoState {
    pub(crate) local_changes: bool,
    pub(crate) behind: usize,
    pub(crate) ahead: usize,
    pub(crate) fetch_fails: bool,
    pub(crate) failing: HashSet<&'static str>,
    pub(crate) calls: Vec<String>,
}

/// Working copy whose state is shared with the test that made it.
#[derive(Debug, Default, Clone)]
pub(crate) struct FakeCopy(pub(crate) Rc<RefCell<FakeRepoState>>);

impl FakeCopy {
    pub(crate) fn clean() -> Self {
        Self::default()
    }

    pub(crate) fn dirty() -> Self {
        let copy = Self::default();
        copy.0.borrow_mut().local_changes = true;
        copy
    }

    pub(crate) fn behind(commits: usize) -> Self {
        let copy = Self::default();
        copy.0.borrow_mut().behind = commits;
        copy
    }

    pub(crate) fn ahead(commits: usize) -> Self {
        let copy = Self::default();
        copy.0.borrow_mut().ahead = commits;
        copy
    }

    pub(crate) fn failing(self, op: &'static str) -> Self {
        self.0.borrow_mut().failing.insert(op);
        self
    }

    pub(crate) fn offline(self) -> Self {
        self.0.borrow_mut().fetch_fails = true;
        self
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.0.borrow().calls.clone()
    }

    fn call(&self, op: &'static str) -> Result<()> {
        let mut state = self.0.borrow_mut();
        state.calls.push(op.to_string());
        if state.failing.contains(op) {
            return Err(RepoError::Syscall(SyscallError::Status {
                command: op.into(),
                message: format!("simulated {op} failure"),
            }));
        }
        Ok(())
    }
}

impl WorkingCopy for FakeCopy {
    fn has_local_changes(&self) -> Result<bool> {
        self.call("status-check")?;
        Ok(self.0.borrow().local_changes)
    }

    fn fetch(&self) -> Result<()> {
        self.call("fetch")?;
        if self.0.borrow().fetch_fails {
            return Err(RepoError::Syscall(SyscallError::Status {
                command: "fetch".into(),
                message: "could not resolve host".into(),
            }));
        }
        Ok(())
    }

    fn commits_behind(&self) -> Result<usize> {
        Ok(self.0.borrow().behind)
    }

    fn commits_ahead(&self) -> Result<usize> {
        Ok(self.0.borrow().ahead)
    }

    fn status(&self) -> Result<String> {
        self.call("status")?;
        Ok(" M .zshrc".into())
    }

    fn diff(&self) -> Result<String> {
        self.call("diff")?;
        Ok("-old\n+new".into())
    }

    fn incoming(&self) -> Result<String> {
        self.call("incoming")?;
        Ok("abc1234 tweak prompt".into())
    }

    fn commit_all(&self, message: &str) -> Result<()> {
        self.call("commit")?;
        let mut state = self.0.borrow_mut();
        state.calls.push(format!("message: {message}"));
        state.local_changes = false;
        state.ahead += 1;
        Ok(())
    }

    fn push(&self) -> Result<()> {
        self.call("push")?;
        self.0.borrow_mut().ahead = 0;
        Ok(())
    }

    fn pull(&self) -> Result<()> {
        self.call("pull")?;
        self.0.borrow_mut().behind = 0;
        Ok(())
    }
}

/// Repository access handing out [`FakeCopy`] instances by domain name.
#[derive(Debug, Default, Clone)]
pub(crate) struct FakeAccess {
    pub(crate) copies: RefCell<HashMap<String, FakeCopy>>,
    pub(crate) clones: RefCell<Vec<(String, String)>>,
    pub(crate) opened: RefCell<Vec<String>>,
}

impl FakeAccess {
    pub(crate) fn with(self, name: &str, copy: FakeCopy) -> Self {
        self.copies.borrow_mut().insert(name.into(), copy);
        self
    }
}

impl RepoAccess for FakeAccess {
    type Copy = FakeCopy;

    fn open(&self, domain: &DomainDescriptor) -> Option<FakeCopy> {
        self.opened.borrow_mut().push(domain.name.clone());
        self.copies.borrow().get(&domain.name).cloned()
    }

    fn clone_domain(&self, url: &str, domain: &DomainDescriptor) -> Result<()> {
        self.clones
            .borrow_mut()
            .push((domain.name.clone(), url.to_string()));
        if url.contains("unreachable") {
            return Err(RepoError::Syscall(SyscallError::Status {
                command: "clone".into(),
                message: format!("repository {url} not found"),
            }));
        }

        self.copies
            .borrow_mut()
            .insert(domain.name.clone(), FakeCopy::clean());
        Ok(())
    }
}
