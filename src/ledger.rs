// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Failure ledger and circuit breaker.
//!
//! Every operational failure, e.g., a failed clone, push, or pull, is appended
//! to the __failure ledger__. Once one domain fails too often inside a
//! trailing window, a disable marker is appended and _all_ syncing halts. The
//! marker is sticky: nothing removes it except clearing the ledger by hand.
//!
//! # File Layout
//!
//! One record per line, colon delimited:
//!
//! ```text
//! 1700000000:dotfiles:push to origin/main failed
//! DISABLED:1700000100:3 failures of dotfiles within 3600s
//! ```
//!
//! The message is the last field, so it may contain colons itself.

use std::{
    cell::RefCell,
    fmt::{Display, Formatter, Result as FmtResult},
    fs::{read_to_string, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::{debug, warn};

const DISABLED_TOKEN: &str = "DISABLED";

/// Single ledger record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerEntry {
    /// Operational failure of a domain.
    Failure {
        at: i64,
        domain: String,
        message: String,
    },

    /// Breaker tripped. Applies to every domain.
    Disabled { at: i64, reason: String },
}

impl LedgerEntry {
    /// Construct new failure record.
    ///
    /// Line breaks in message are flattened so the record stays on one line.
    pub fn failure(at: i64, domain: impl Into<String>, message: impl AsRef<str>) -> Self {
        Self::Failure {
            at,
            domain: domain.into(),
            message: flatten(message.as_ref()),
        }
    }

    /// Construct new disable marker.
    pub fn disabled(at: i64, reason: impl AsRef<str>) -> Self {
        Self::Disabled {
            at,
            reason: flatten(reason.as_ref()),
        }
    }

    /// Time record was made.
    pub fn at(&self) -> i64 {
        match self {
            Self::Failure { at, .. } | Self::Disabled { at, .. } => *at,
        }
    }

    /// Check if record is a disable marker.
    pub fn is_disabled(&self) -> bool {
        matches!(self, Self::Disabled { .. })
    }
}

impl Display for LedgerEntry {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Failure {
                at,
                domain,
                message,
            } => write!(fmt, "{at}:{domain}:{message}"),
            Self::Disabled { at, reason } => write!(fmt, "{DISABLED_TOKEN}:{at}:{reason}"),
        }
    }
}

impl FromStr for LedgerEntry {
    type Err = LedgerError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let malformed = || LedgerError::Malformed(line.to_string());
        let mut fields = line.splitn(3, ':');
        let head = fields.next().ok_or_else(malformed)?;

        // INVARIANT: Any line led by the disable token is a marker.
        if head == DISABLED_TOKEN {
            let rest = line.split_once(':').map_or("", |(_, rest)| rest);
            let (at, reason) = rest.split_once(':').unwrap_or((rest, ""));
            return Ok(match at.parse() {
                Ok(at) => Self::Disabled {
                    at,
                    reason: reason.to_string(),
                },
                Err(_) => Self::Disabled {
                    at: 0,
                    reason: rest.to_string(),
                },
            });
        }

        let at = head.parse().map_err(|_| malformed())?;
        let domain = fields
            .next()
            .filter(|domain| !domain.is_empty())
            .ok_or_else(malformed)?
            .to_string();
        let message = fields.next().unwrap_or_default().to_string();

        Ok(Self::Failure {
            at,
            domain,
            message,
        })
    }
}

fn flatten(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Persist ledger records.
pub trait LedgerStore {
    /// Read all records in order of insertion.
    fn entries(&self) -> Result<Vec<LedgerEntry>>;

    /// Append one record.
    fn append(&self, entry: &LedgerEntry) -> Result<()>;

    /// Remove every record.
    fn clear(&self) -> Result<()>;
}

impl<L: LedgerStore + ?Sized> LedgerStore for &L {
    fn entries(&self) -> Result<Vec<LedgerEntry>> {
        (**self).entries()
    }

    fn append(&self, entry: &LedgerEntry) -> Result<()> {
        (**self).append(entry)
    }

    fn clear(&self) -> Result<()> {
        (**self).clear()
    }
}

/// Ledger kept in an append-only text file.
#[derive(Debug, Clone)]
pub struct FileLedgerStore {
    path: PathBuf,
}

impl FileLedgerStore {
    /// Construct new file backed ledger.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path to ledger file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LedgerStore for FileLedgerStore {
    fn entries(&self) -> Result<Vec<LedgerEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let content = read_to_string(&self.path).map_err(|err| LedgerError::Read {
            source: err,
            path: self.path.clone(),
        })?;

        // INVARIANT: Skip lines we cannot make sense of instead of failing.
        let entries = content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match line.parse::<LedgerEntry>() {
                Ok(entry) => Some(entry),
                Err(error) => {
                    debug!("skip ledger line: {error}");
                    None
                }
            })
            .collect();

        Ok(entries)
    }

    fn append(&self, entry: &LedgerEntry) -> Result<()> {
        let write_err = |err| LedgerError::Write {
            source: err,
            path: self.path.clone(),
        };

        if let Some(parent) = self.path.parent() {
            mkdirp::mkdirp(parent).map_err(write_err)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(write_err)?;
        writeln!(file, "{entry}").map_err(write_err)
    }

    fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Err(err) if err.kind() != std::io::ErrorKind::NotFound => Err(LedgerError::Write {
                source: err,
                path: self.path.clone(),
            }),
            _ => Ok(()),
        }
    }
}

/// Ledger kept in memory.
#[derive(Debug, Default, Clone)]
pub struct MemoryLedgerStore {
    entries: RefCell<Vec<LedgerEntry>>,
}

impl LedgerStore for MemoryLedgerStore {
    fn entries(&self) -> Result<Vec<LedgerEntry>> {
        Ok(self.entries.borrow().clone())
    }

    fn append(&self, entry: &LedgerEntry) -> Result<()> {
        self.entries.borrow_mut().push(entry.clone());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.entries.borrow_mut().clear();
        Ok(())
    }
}

/// State of circuit breaker after a failure was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    /// Syncing may continue.
    Closed,

    /// This failure tripped the breaker.
    Tripped,

    /// Breaker was already open before this failure.
    AlreadyOpen,
}

/// Circuit breaker over a [`LedgerStore`].
#[derive(Debug, Clone)]
pub struct FailureLedger<L>
where
    L: LedgerStore,
{
    store: L,
    threshold: usize,
    window: i64,
}

impl<L> FailureLedger<L>
where
    L: LedgerStore,
{
    /// Construct new failure ledger.
    ///
    /// Breaker trips once `threshold` failures of one domain land within
    /// `window` seconds of each other.
    pub fn new(store: L, threshold: usize, window: i64) -> Self {
        Self {
            store,
            threshold,
            window,
        }
    }

    /// Record operational failure of domain.
    ///
    /// Appends failure, then counts failures of that domain inside the
    /// trailing window. Reaching the threshold appends a disable marker,
    /// unless one is already present.
    ///
    /// # Errors
    ///
    /// - Return [`LedgerError::Write`] if record cannot be appended.
    /// - Return [`LedgerError::Read`] if ledger cannot be read back.
    pub fn record_failure(
        &self,
        domain: impl AsRef<str>,
        message: impl AsRef<str>,
        now: i64,
    ) -> Result<BreakerState> {
        let domain = domain.as_ref();
        self.store.append(&LedgerEntry::failure(now, domain, message))?;

        let entries = self.store.entries()?;
        if entries.iter().any(LedgerEntry::is_disabled) {
            return Ok(BreakerState::AlreadyOpen);
        }

        let since = now.saturating_sub(self.window);
        let recent = entries
            .iter()
            .filter(|entry| match entry {
                LedgerEntry::Failure { at, domain: d, .. } => d == domain && *at >= since,
                LedgerEntry::Disabled { .. } => false,
            })
            .count();
        debug!("{recent} recent failures of {domain}");

        if recent < self.threshold {
            return Ok(BreakerState::Closed);
        }

        let reason = format!("{recent} failures of {domain} within {}s", self.window);
        self.store.append(&LedgerEntry::disabled(now, &reason))?;
        warn!("sync disabled: {reason}; run `dotsync clear-failures` to re-enable");

        Ok(BreakerState::Tripped)
    }

    /// Check if syncing is allowed.
    ///
    /// False if and only if a disable marker exists anywhere in the ledger.
    /// An unreadable ledger does not block syncing.
    pub fn is_enabled(&self) -> bool {
        match self.store.entries() {
            Ok(entries) => !entries.iter().any(LedgerEntry::is_disabled),
            Err(error) => {
                warn!("ignore unreadable failure ledger: {error}");
                true
            }
        }
    }

    /// Disable marker currently in effect.
    pub fn disabled_marker(&self) -> Option<LedgerEntry> {
        self.store
            .entries()
            .ok()?
            .into_iter()
            .find(LedgerEntry::is_disabled)
    }

    /// All failure records, oldest first.
    ///
    /// # Errors
    ///
    /// - Return [`LedgerError::Read`] if ledger cannot be read.
    pub fn failures(&self) -> Result<Vec<LedgerEntry>> {
        Ok(self
            .store
            .entries()?
            .into_iter()
            .filter(|entry| !entry.is_disabled())
            .collect())
    }

    /// Remove every record, re-enabling all domains.
    ///
    /// # Errors
    ///
    /// - Return [`LedgerError::Write`] if ledger cannot be removed.
    pub fn clear(&self) -> Result<()> {
        self.store.clear()
    }
}

/// Failure ledger error types.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// Ledger file cannot be read.
    #[error("failed to read failure ledger at {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Ledger file cannot be written.
    #[error("failed to write failure ledger at {:?}", path.display())]
    Write {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Ledger line cannot be parsed.
    #[error("malformed ledger line {0:?}")]
    Malformed(String),
}

/// Friendly result alias :3
pub type Result<T, E = LedgerError> = std::result::Result<T, E>;
