// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Wall clock access.
//!
//! All persisted times are plain Unix epoch seconds.

use std::{
    cell::Cell,
    time::{SystemTime, UNIX_EPOCH},
};

/// Source of current time in epoch seconds.
pub trait Clock {
    /// Current Unix time in seconds.
    fn now(&self) -> i64;
}

/// Clock backed by system time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs() as i64)
            .unwrap_or_default()
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Default, Clone)]
pub struct ManualClock {
    now: Cell<i64>,
}

impl ManualClock {
    /// Construct new manual clock frozen at `now`.
    pub fn new(now: i64) -> Self {
        Self {
            now: Cell::new(now),
        }
    }

    /// Move clock forward by `secs`.
    pub fn advance(&self, secs: i64) {
        self.now.set(self.now.get() + secs);
    }

    /// Set clock to `now`.
    pub fn set(&self, now: i64) {
        self.now.set(now);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> i64 {
        self.now.get()
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> i64 {
        (**self).now()
    }
}
