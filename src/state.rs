// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Interval gate persistence.
//!
//! Dotsync runs on every prompt render, which can be many times per minute.
//! To avoid hammering remotes, a single "last checked" timestamp is persisted,
//! and a new check only happens once the configured interval has elapsed
//! since then. The timestamp can also be pushed into the future to silence
//! checks for longer than one interval.
//!
//! # File Layout
//!
//! The timestamp file holds one line: decimal Unix epoch seconds.

use std::{
    cell::Cell,
    fs::{read_to_string, write},
    path::{Path, PathBuf},
};
use tracing::{debug, warn};

/// Persist the last checked timestamp.
pub trait SyncStateStore {
    /// Load last checked timestamp, if any was ever stored.
    fn load(&self) -> Result<Option<i64>>;

    /// Overwrite last checked timestamp.
    fn save(&self, epoch: i64) -> Result<()>;

    /// Forget last checked timestamp.
    fn reset(&self) -> Result<()>;
}

impl<S: SyncStateStore + ?Sized> SyncStateStore for &S {
    fn load(&self) -> Result<Option<i64>> {
        (**self).load()
    }

    fn save(&self, epoch: i64) -> Result<()> {
        (**self).save(epoch)
    }

    fn reset(&self) -> Result<()> {
        (**self).reset()
    }
}

/// Timestamp kept in a plain text file.
#[derive(Debug, Clone)]
pub struct FileStateStore {
    path: PathBuf,
}

impl FileStateStore {
    /// Construct new file backed store.
    ///
    /// Nothing is touched on disk until the first save.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path to timestamp file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SyncStateStore for FileStateStore {
    fn load(&self) -> Result<Option<i64>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let content = read_to_string(&self.path).map_err(|err| StateError::Read {
            source: err,
            path: self.path.clone(),
        })?;
        let epoch = content
            .trim()
            .parse::<i64>()
            .map_err(|_| StateError::Corrupt {
                content: content.trim().to_string(),
                path: self.path.clone(),
            })?;

        Ok(Some(epoch))
    }

    fn save(&self, epoch: i64) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            mkdirp::mkdirp(parent).map_err(|err| StateError::Write {
                source: err,
                path: self.path.clone(),
            })?;
        }

        write(&self.path, format!("{epoch}\n")).map_err(|err| StateError::Write {
            source: err,
            path: self.path.clone(),
        })
    }

    fn reset(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Err(err) if err.kind() != std::io::ErrorKind::NotFound => Err(StateError::Write {
                source: err,
                path: self.path.clone(),
            }),
            _ => Ok(()),
        }
    }
}

/// Timestamp kept in memory.
#[derive(Debug, Default, Clone)]
pub struct MemoryStateStore {
    epoch: Cell<Option<i64>>,
}

impl MemoryStateStore {
    /// Construct new store already holding `epoch`.
    pub fn with_epoch(epoch: i64) -> Self {
        Self {
            epoch: Cell::new(Some(epoch)),
        }
    }
}

impl SyncStateStore for MemoryStateStore {
    fn load(&self) -> Result<Option<i64>> {
        Ok(self.epoch.get())
    }

    fn save(&self, epoch: i64) -> Result<()> {
        self.epoch.set(Some(epoch));
        Ok(())
    }

    fn reset(&self) -> Result<()> {
        self.epoch.set(None);
        Ok(())
    }
}

/// Interval gate over a [`SyncStateStore`].
#[derive(Debug, Clone)]
pub struct TimestampStore<S>
where
    S: SyncStateStore,
{
    store: S,
    interval: i64,
}

impl<S> TimestampStore<S>
where
    S: SyncStateStore,
{
    /// Construct new interval gate.
    pub fn new(store: S, interval: i64) -> Self {
        Self { store, interval }
    }

    /// Check if interval has elapsed since last check.
    ///
    /// True when nothing was stored yet, or `now - stored >= interval`. A
    /// timestamp that cannot be read counts as never stored.
    pub fn should_check(&self, now: i64) -> bool {
        match self.last_checked() {
            Some(last) => now.saturating_sub(last) >= self.interval,
            None => true,
        }
    }

    /// Last checked timestamp, if readable.
    pub fn last_checked(&self) -> Option<i64> {
        match self.store.load() {
            Ok(epoch) => epoch,
            Err(error) => {
                warn!("ignore unreadable timestamp: {error}");
                None
            }
        }
    }

    /// Time at which the next check becomes due.
    pub fn next_due(&self) -> Option<i64> {
        self.last_checked().map(|last| last.saturating_add(self.interval))
    }

    /// Overwrite last checked timestamp.
    ///
    /// # Errors
    ///
    /// - Return [`StateError::Write`] if timestamp cannot be persisted.
    pub fn update(&self, epoch: i64) -> Result<()> {
        debug!("store last checked timestamp {epoch}");
        self.store.save(epoch)
    }

    /// Forget last checked timestamp so that next check is due immediately.
    ///
    /// # Errors
    ///
    /// - Return [`StateError::Write`] if timestamp cannot be removed.
    pub fn reset(&self) -> Result<()> {
        self.store.reset()
    }

    /// Interval in seconds.
    pub fn interval(&self) -> i64 {
        self.interval
    }
}

/// Timestamp persistence error types.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    /// Timestamp file cannot be read.
    #[error("failed to read timestamp at {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Timestamp file cannot be written.
    #[error("failed to write timestamp at {:?}", path.display())]
    Write {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Timestamp file holds something other than epoch seconds.
    #[error("timestamp at {:?} is corrupt: {content:?}", path.display())]
    Corrupt { content: String, path: PathBuf },
}

/// Friendly result alias :3
pub type Result<T, E = StateError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;
    use simple_test_case::test_case;

    const HOUR: i64 = 60 * 60;

    #[test]
    fn due_when_never_checked() {
        let gate = TimestampStore::new(MemoryStateStore::default(), 4 * HOUR);
        assert!(gate.should_check(1_000));
    }

    #[test_case(0, false; "immediately after update")]
    #[test_case(4 * HOUR - 1, false; "one second short")]
    #[test_case(4 * HOUR, true; "exactly on interval")]
    #[test_case(5 * HOUR, true; "well past interval")]
    #[test]
    fn due_once_interval_elapsed(elapsed: i64, expect: bool) {
        let gate = TimestampStore::new(MemoryStateStore::default(), 4 * HOUR);
        gate.update(10_000).unwrap();
        pretty_assertions::assert_eq!(gate.should_check(10_000 + elapsed), expect);
    }

    #[test_case(i64::MIN, true; "far past")]
    #[test_case(i64::MAX, false; "far future")]
    #[test]
    fn extreme_stored_timestamp(stored: i64, expect: bool) {
        let gate = TimestampStore::new(MemoryStateStore::with_epoch(stored), 4 * HOUR);
        pretty_assertions::assert_eq!(gate.should_check(1_700_000_000), expect);
        assert!(gate.next_due().is_some());
    }

    #[test]
    fn future_timestamp_silences_past_interval() {
        let gate = TimestampStore::new(MemoryStateStore::default(), 4 * HOUR);
        gate.update(10_000 + 24 * HOUR).unwrap();
        assert!(!gate.should_check(10_000 + 5 * HOUR));
        assert!(!gate.should_check(10_000 + 23 * HOUR));
        assert!(gate.should_check(10_000 + 28 * HOUR));
    }

    #[sealed_test]
    fn file_store_round_trip() -> anyhow::Result<()> {
        let store = FileStateStore::new("state/nested/last-check");
        assert_eq!(store.load()?, None);

        store.save(1_700_000_000)?;
        assert_eq!(std::fs::read_to_string(store.path())?, "1700000000\n");
        assert_eq!(store.load()?, Some(1_700_000_000));

        store.reset()?;
        assert_eq!(store.load()?, None);
        store.reset()?;

        Ok(())
    }

    #[sealed_test]
    fn corrupt_file_counts_as_due() -> anyhow::Result<()> {
        std::fs::write("last-check", "not a number")?;
        let store = FileStateStore::new("last-check");
        assert!(matches!(store.load(), Err(StateError::Corrupt { .. })));

        let gate = TimestampStore::new(store, 4 * HOUR);
        assert!(gate.should_check(0));

        Ok(())
    }
}
