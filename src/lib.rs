// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Keep git-tracked configuration in sync from a shell prompt hook.
//!
//! Each __sync domain__ is a git working copy, e.g., a dotfiles repository,
//! that should stay in step with its remote. Right before a shell prompt is
//! drawn, dotsync checks every domain for drift at most once per interval,
//! and asks the user what to do about whatever drift it finds:
//!
//! - Uncommitted local changes can be committed and pushed.
//! - New remote commits can be pulled.
//! - Local commits missing from the remote can be pushed.
//!
//! Repeated failures of the same domain trip a circuit breaker that keeps
//! dotsync quiet until the failures are cleared by hand.

pub mod clock;
pub mod config;
pub mod hook;
pub mod ledger;
pub mod path;
pub mod prompt;
pub mod repo;
pub mod resolve;
pub mod state;
pub mod sync;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{DomainDescriptor, SyncConfig};
pub use sync::{DomainOutcome, PassReport, PassStatus, SyncManager};
