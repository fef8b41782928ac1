// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Sync orchestration.
//!
//! The [`SyncManager`] is meant to run right before every shell prompt. Almost
//! always it returns immediately: either syncing is disabled, the circuit
//! breaker is open, or the interval has not elapsed yet. Otherwise, every sync
//! domain is checked in configuration order:
//!
//! 1. Clone the working copy if it is missing and the domain has a clone URL.
//! 2. Skip the domain quietly if its path is not a usable git repository.
//! 3. Uncommitted local changes get the local changes menu. Otherwise, a
//!    fetch that turns up new remote commits gets the remote updates menu.
//!    Otherwise, unpushed commits get the push menu.
//! 4. Run the domain's change detector, if any.
//!
//! Operational failures of one domain are recorded in the failure ledger and
//! never stop the other domains from being checked. Nothing in a pass is
//! allowed to bring down the calling shell.

use crate::{
    clock::{Clock, SystemClock},
    config::{DomainDescriptor, SyncConfig},
    hook::{ChangeDetector, HookOutcome},
    ledger::{FailureLedger, FileLedgerStore, LedgerEntry, LedgerStore},
    path::default_state_dir,
    prompt::{InquirePrompter, PromptError, Prompter},
    repo::{Git2Access, RepoAccess, RepoError, RepositorySnapshot, WorkingCopy},
    resolve::{ResolveError, Resolution, Resolver, StateEffect},
    state::{FileStateStore, SyncStateStore, TimestampStore},
};

use std::path::PathBuf;
use tracing::{debug, info, instrument, warn};

/// Name of timestamp file inside state directory.
pub const TIMESTAMP_FILE: &str = "last-check";

/// Name of failure ledger file inside state directory.
pub const LEDGER_FILE: &str = "failures.log";

/// Why a pass ended where it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassStatus {
    /// Syncing is switched off.
    Disabled,

    /// Circuit breaker is open.
    BreakerOpen,

    /// Interval has not elapsed since last check.
    NotDue,

    /// Domains were checked.
    Ran,
}

/// Why a domain was not checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Domain is switched off.
    Disabled,

    /// Domain path is not a usable git repository.
    NotARepository,

    /// Circuit breaker tripped earlier in the same pass.
    BreakerOpen,
}

/// What happened to one domain during a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainOutcome {
    /// Domain was not checked.
    Skipped(SkipReason),

    /// Domain had no drift.
    UpToDate,

    /// Domain had drift and the user picked a resolution.
    Resolved(Resolution),

    /// Domain check failed.
    Failed(String),
}

impl DomainOutcome {
    /// Effect of this outcome on the last checked timestamp.
    pub fn state_effect(&self) -> StateEffect {
        match self {
            Self::UpToDate => StateEffect::Touch,
            Self::Resolved(resolution) => resolution.state_effect(),
            Self::Skipped(_) | Self::Failed(_) => StateEffect::Untouched,
        }
    }
}

/// Outcome of one domain during a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainReport {
    pub name: String,
    pub outcome: DomainOutcome,
}

/// Outcome of a whole pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassReport {
    pub status: PassStatus,
    pub outcomes: Vec<DomainReport>,
}

impl PassReport {
    fn early(status: PassStatus) -> Self {
        Self {
            status,
            outcomes: Vec::new(),
        }
    }

    /// Outcome of domain by name.
    pub fn outcome(&self, name: impl AsRef<str>) -> Option<&DomainOutcome> {
        self.outcomes
            .iter()
            .find(|report| report.name == name.as_ref())
            .map(|report| &report.outcome)
    }
}

/// What is known about one domain without touching the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainState {
    /// Domain path is not a usable git repository.
    NotARepository,

    /// Working copy could be inspected.
    Snapshot(RepositorySnapshot),

    /// Working copy could not be inspected.
    Unreadable(String),
}

/// Status of one domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainStatus {
    pub name: String,
    pub path: PathBuf,
    pub upstream: String,
    pub disabled: bool,
    pub state: DomainState,
}

/// Status of sync as a whole.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub disabled: bool,
    pub last_checked: Option<i64>,
    pub next_due: Option<i64>,
    pub breaker: Option<LedgerEntry>,
    pub failures: Vec<LedgerEntry>,
    pub domains: Vec<DomainStatus>,
}

/// Sync orchestrator.
pub struct SyncManager<S, L, R, P, C>
where
    S: SyncStateStore,
    L: LedgerStore,
    R: RepoAccess,
    P: Prompter,
    C: Clock,
{
    config: SyncConfig,
    timestamps: TimestampStore<S>,
    ledger: FailureLedger<L>,
    access: R,
    prompter: P,
    clock: C,
    detector: ChangeDetector,
}

impl SyncManager<FileStateStore, FileLedgerStore, Git2Access, InquirePrompter, SystemClock> {
    /// Construct sync manager for real use.
    ///
    /// State files live in the configured state directory, falling back to a
    /// per-user directory under the system temporary directory.
    pub fn from_config(config: SyncConfig) -> Self {
        let state_dir = config
            .settings
            .state_dir
            .clone()
            .unwrap_or_else(default_state_dir);
        debug!("using state directory {:?}", state_dir.display());

        Self::new(
            config,
            FileStateStore::new(state_dir.join(TIMESTAMP_FILE)),
            FileLedgerStore::new(state_dir.join(LEDGER_FILE)),
            Git2Access,
            InquirePrompter,
            SystemClock,
        )
    }
}

impl<S, L, R, P, C> SyncManager<S, L, R, P, C>
where
    S: SyncStateStore,
    L: LedgerStore,
    R: RepoAccess,
    P: Prompter,
    C: Clock,
{
    /// Construct new sync manager.
    pub fn new(
        config: SyncConfig,
        state_store: S,
        ledger_store: L,
        access: R,
        prompter: P,
        clock: C,
    ) -> Self {
        let settings = &config.settings;
        let timestamps = TimestampStore::new(state_store, settings.interval_secs);
        let ledger = FailureLedger::new(
            ledger_store,
            settings.failure_threshold,
            settings.failure_window_secs,
        );

        Self {
            config,
            timestamps,
            ledger,
            access,
            prompter,
            clock,
            detector: ChangeDetector,
        }
    }

    /// Run one pass, honoring the interval gate.
    ///
    /// Safe to call as often as desired. Never fails; everything that goes
    /// wrong is logged, and operational failures are recorded.
    pub fn run_pass(&mut self) -> PassReport {
        self.pass(true)
    }

    /// Run one pass, ignoring the interval gate.
    ///
    /// The disable flag and circuit breaker still apply.
    pub fn force_pass(&mut self) -> PassReport {
        self.pass(false)
    }

    /// Clear failure ledger, re-enabling every domain.
    ///
    /// # Errors
    ///
    /// - Return [`crate::ledger::LedgerError`] if ledger cannot be removed.
    pub fn clear_failures(&self) -> crate::ledger::Result<()> {
        info!("clear failure ledger");
        self.ledger.clear()
    }

    /// Forget last checked timestamp, so the next pass checks right away.
    ///
    /// # Errors
    ///
    /// - Return [`crate::state::StateError`] if timestamp cannot be removed.
    pub fn reset_interval(&self) -> crate::state::Result<()> {
        info!("reset last checked timestamp");
        self.timestamps.reset()
    }

    /// Gather status without touching the network.
    pub fn status_report(&self) -> StatusReport {
        let domains = self
            .config
            .domains
            .iter()
            .map(|domain| DomainStatus {
                name: domain.name.clone(),
                path: domain.path.clone(),
                upstream: domain.upstream(),
                disabled: domain.disabled,
                state: match self.access.open(domain) {
                    None => DomainState::NotARepository,
                    Some(copy) => match copy.snapshot() {
                        Ok(snapshot) => DomainState::Snapshot(snapshot),
                        Err(error) => DomainState::Unreadable(error.to_string()),
                    },
                },
            })
            .collect();

        StatusReport {
            disabled: self.config.settings.disabled,
            last_checked: self.timestamps.last_checked(),
            next_due: self.timestamps.next_due(),
            breaker: self.ledger.disabled_marker(),
            failures: self.ledger.failures().unwrap_or_default(),
            domains,
        }
    }

    /// Interval gate in use.
    pub fn timestamps(&self) -> &TimestampStore<S> {
        &self.timestamps
    }

    /// Failure ledger in use.
    pub fn ledger(&self) -> &FailureLedger<L> {
        &self.ledger
    }

    fn pass(&mut self, respect_interval: bool) -> PassReport {
        if self.config.settings.disabled {
            debug!("sync disabled through environment");
            return PassReport::early(PassStatus::Disabled);
        }

        if !self.ledger.is_enabled() {
            debug!("sync disabled by circuit breaker");
            return PassReport::early(PassStatus::BreakerOpen);
        }

        let now = self.clock.now();
        if respect_interval && !self.timestamps.should_check(now) {
            debug!("interval has not elapsed");
            return PassReport::early(PassStatus::NotDue);
        }

        let domains = self.config.domains.clone();
        let mut reports = Vec::with_capacity(domains.len());
        for domain in &domains {
            // INVARIANT: A breaker tripped by an earlier domain halts the rest.
            let outcome = if self.ledger.is_enabled() {
                self.process(domain, now)
            } else {
                DomainOutcome::Skipped(SkipReason::BreakerOpen)
            };
            debug!("{}: {outcome:?}", domain.name);
            reports.push(DomainReport {
                name: domain.name.clone(),
                outcome,
            });
        }

        self.store_timestamp(&reports, now);

        PassReport {
            status: PassStatus::Ran,
            outcomes: reports,
        }
    }

    #[instrument(skip(self, domain, now), fields(domain = %domain.name), level = "debug")]
    fn process(&mut self, domain: &DomainDescriptor, now: i64) -> DomainOutcome {
        if domain.disabled {
            return DomainOutcome::Skipped(SkipReason::Disabled);
        }

        if let Some(url) = domain.clone_url.as_deref() {
            if !domain.path.exists() {
                if let Err(error) = self.access.clone_domain(url, domain) {
                    let message = format!("clone of {url} failed: {error}");
                    warn!("{}: {message}", domain.name);
                    self.record_failure(domain, &message, now);
                    return DomainOutcome::Failed(message);
                }
            }
        }

        let Some(copy) = self.access.open(domain) else {
            return DomainOutcome::Skipped(SkipReason::NotARepository);
        };

        let outcome = match self.check(domain, &copy) {
            Ok(outcome) => outcome,
            Err(error) => {
                let message = error.to_string();
                if error.is_operational() {
                    self.record_failure(domain, &message, now);
                } else {
                    warn!("{}: {message}", domain.name);
                }
                DomainOutcome::Failed(message)
            }
        };

        match self.detector.run(domain) {
            Ok(HookOutcome::Succeeded) => debug!("change detector succeeded"),
            Ok(HookOutcome::Absent) => {}
            Err(error) => warn!("{}: {error}", domain.name),
        }

        outcome
    }

    fn check(&mut self, domain: &DomainDescriptor, copy: &R::Copy) -> Result<DomainOutcome> {
        let has_local_changes = copy.has_local_changes()?;
        let snooze_secs = self.config.settings.interval_secs;
        let mut resolver =
            Resolver::new(domain, copy, &mut self.prompter).snooze_secs(snooze_secs);

        // INVARIANT: Local changes always take precedence over remote updates.
        let resolution = if has_local_changes {
            info!("{}: uncommitted changes found", domain.name);
            resolver.resolve_local_changes()?
        } else if copy.has_remote_updates() {
            info!("{}: remote updates found", domain.name);
            resolver.resolve_remote_updates()?
        } else if copy.commits_ahead().unwrap_or_default() > 0 {
            info!("{}: unpushed commits found", domain.name);
            resolver.resolve_unpushed()?
        } else {
            return Ok(DomainOutcome::UpToDate);
        };

        Ok(DomainOutcome::Resolved(resolution))
    }

    fn record_failure(&self, domain: &DomainDescriptor, message: &str, now: i64) {
        if let Err(error) = self.ledger.record_failure(&domain.name, message, now) {
            warn!("cannot record failure of {}: {error}", domain.name);
        }
    }

    fn store_timestamp(&self, reports: &[DomainReport], now: i64) {
        let ignore_until = now.saturating_add(self.config.settings.ignore_secs);
        let target = reports
            .iter()
            .filter_map(|report| match report.outcome.state_effect() {
                StateEffect::Touch => Some(now),
                StateEffect::IgnoreForDay => Some(ignore_until),
                StateEffect::Untouched => None,
            })
            .max();

        match target {
            Some(epoch) => {
                if let Err(error) = self.timestamps.update(epoch) {
                    warn!("cannot store last checked timestamp: {error}");
                }
            }
            None => debug!("no domain completed, leaving timestamp alone"),
        }
    }
}

/// Domain check error types.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Working copy cannot be inspected.
    #[error(transparent)]
    Repo(#[from] RepoError),

    /// Drift resolution fails.
    #[error(transparent)]
    Resolve(#[from] ResolveError),
}

impl SyncError {
    /// Check if error counts against the circuit breaker.
    ///
    /// Failing to prompt the user is not an operational failure of the
    /// domain itself.
    pub fn is_operational(&self) -> bool {
        !matches!(self, Self::Resolve(ResolveError::Prompt(PromptError::Inquire(_))))
    }
}

/// Friendly result alias :3
pub type Result<T, E = SyncError> = std::result::Result<T, E>;
