// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Interactive drift resolution.
//!
//! Once a working copy is found to have drifted from its remote, the user is
//! offered a menu of remediation actions. Inspection actions, e.g., showing
//! the status or diff, display their output and return to the same menu.
//! Every other action resolves the menu.
//!
//! # Menu State Machine
//!
//! ```text
//!            +--------------------------+
//!            v                          |
//!     AwaitingChoice --> ShowingStatus -+
//!            |       --> ShowingDiff ---+
//!            |       --> ShowingIncoming+
//!            v
//!        Resolved
//! ```
//!
//! Dismissing a menu resolves it as [`Resolution::Cancelled`], which leaves
//! all persisted state untouched so that the same menu comes back on the next
//! check.

use crate::{
    config::DomainDescriptor,
    prompt::{PromptError, Prompter},
    repo::{RepoError, WorkingCopy},
};

use std::fmt::{Display, Formatter, Result as FmtResult};
use tracing::{error, info};

/// How a menu was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Local changes were committed and pushed.
    CommittedAndPushed,

    /// Local changes were committed but not pushed.
    Committed,

    /// Unpushed commits were pushed.
    Pushed,

    /// Remote updates were pulled.
    Pulled,

    /// User asked to be reminded after one interval.
    Snoozed,

    /// User asked to be left alone for the rest of the day.
    IgnoredForDay,

    /// User declined to push for now.
    Deferred,

    /// User dismissed the menu without choosing.
    Cancelled,
}

impl Resolution {
    /// Effect this resolution has on the last checked timestamp.
    pub fn state_effect(self) -> StateEffect {
        match self {
            Self::Cancelled => StateEffect::Untouched,
            Self::IgnoredForDay => StateEffect::IgnoreForDay,
            _ => StateEffect::Touch,
        }
    }
}

impl Display for Resolution {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(match self {
            Self::CommittedAndPushed => "committed and pushed",
            Self::Committed => "committed",
            Self::Pushed => "pushed",
            Self::Pulled => "pulled",
            Self::Snoozed => "snoozed",
            Self::IgnoredForDay => "ignored for the day",
            Self::Deferred => "push deferred",
            Self::Cancelled => "cancelled",
        })
    }
}

/// Effect of a resolution on the last checked timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateEffect {
    /// Set to now.
    Touch,

    /// Set to now plus the ignore period.
    IgnoreForDay,

    /// Leave as is.
    Untouched,
}

/// Menu option.
pub trait MenuAction: Display + Copy {
    /// Every option, in presentation order.
    fn all() -> Vec<Self>;

    /// Check if option postpones the menu until the next check.
    fn is_snooze(&self) -> bool {
        false
    }
}

/// Options offered for uncommitted local changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalAction {
    CommitAndPush,
    CommitOnly,
    ShowStatus,
    ShowDiff,
    Snooze,
    IgnoreForDay,
}

impl MenuAction for LocalAction {
    fn all() -> Vec<Self> {
        vec![
            Self::CommitAndPush,
            Self::CommitOnly,
            Self::ShowStatus,
            Self::ShowDiff,
            Self::Snooze,
            Self::IgnoreForDay,
        ]
    }

    fn is_snooze(&self) -> bool {
        matches!(self, Self::Snooze)
    }
}

impl Display for LocalAction {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(match self {
            Self::CommitAndPush => "Commit and push now",
            Self::CommitOnly => "Commit only",
            Self::ShowStatus => "Show status",
            Self::ShowDiff => "Show diff",
            Self::Snooze => SNOOZE_LABEL,
            Self::IgnoreForDay => IGNORE_LABEL,
        })
    }
}

/// Options offered for incoming remote commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteAction {
    Pull,
    ShowIncoming,
    Snooze,
    IgnoreForDay,
}

impl MenuAction for RemoteAction {
    fn all() -> Vec<Self> {
        vec![
            Self::Pull,
            Self::ShowIncoming,
            Self::Snooze,
            Self::IgnoreForDay,
        ]
    }

    fn is_snooze(&self) -> bool {
        matches!(self, Self::Snooze)
    }
}

impl Display for RemoteAction {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(match self {
            Self::Pull => "Pull now",
            Self::ShowIncoming => "Show incoming commits",
            Self::Snooze => SNOOZE_LABEL,
            Self::IgnoreForDay => IGNORE_LABEL,
        })
    }
}

/// Options offered for commits not yet pushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushAction {
    PushNow,
    PushLater,
}

impl MenuAction for PushAction {
    fn all() -> Vec<Self> {
        vec![Self::PushNow, Self::PushLater]
    }
}

impl Display for PushAction {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(match self {
            Self::PushNow => "Push now",
            Self::PushLater => "Push later",
        })
    }
}

const SNOOZE_LABEL: &str = "Snooze until next check";
const IGNORE_LABEL: &str = "Ignore for this session";

/// Snooze period used unless told otherwise.
pub const DEFAULT_SNOOZE_SECS: i64 = 4 * 60 * 60;

/// Label of the snooze option for a given snooze period.
pub fn snooze_label(secs: i64) -> String {
    let (amount, unit) = match secs {
        secs if secs >= 3600 && secs % 3600 == 0 => (secs / 3600, "hour"),
        secs if secs >= 60 && secs % 60 == 0 => (secs / 60, "minute"),
        secs => (secs, "second"),
    };
    let plural = if amount == 1 { "" } else { "s" };

    format!("Snooze for {amount} {unit}{plural}")
}

/// Menu option as presented to the user.
struct MenuItem<A> {
    action: A,
    label: String,
}

impl<A> Display for MenuItem<A> {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(&self.label)
    }
}

/// State of one menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuState {
    AwaitingChoice,
    ShowingStatus,
    ShowingDiff,
    ShowingIncoming,
    Resolved(Resolution),
}

/// Drive remediation menus for one working copy.
pub struct Resolver<'a, W, P>
where
    W: WorkingCopy,
    P: Prompter,
{
    domain: &'a DomainDescriptor,
    copy: &'a W,
    prompter: &'a mut P,
    snooze_secs: i64,
}

impl<'a, W, P> Resolver<'a, W, P>
where
    W: WorkingCopy,
    P: Prompter,
{
    /// Construct new resolver.
    pub fn new(domain: &'a DomainDescriptor, copy: &'a W, prompter: &'a mut P) -> Self {
        Self {
            domain,
            copy,
            prompter,
            snooze_secs: DEFAULT_SNOOZE_SECS,
        }
    }

    /// Use different snooze period in menu labels.
    ///
    /// Snoozing leaves the next check to the interval gate, so this should
    /// match the configured check interval.
    pub fn snooze_secs(mut self, secs: i64) -> Self {
        self.snooze_secs = secs;
        self
    }

    /// Offer remediation for uncommitted local changes.
    ///
    /// # Errors
    ///
    /// - Return [`ResolveError::Action`] if commit or push fails.
    /// - Return [`ResolveError::Prompt`] if user cannot be prompted.
    pub fn resolve_local_changes(&mut self) -> Result<Resolution> {
        let message = format!(
            "{}: uncommitted changes in {}",
            self.domain.name,
            self.domain.path.display()
        );
        self.drive(&message, Self::apply_local)
    }

    /// Offer remediation for incoming remote commits.
    ///
    /// # Errors
    ///
    /// - Return [`ResolveError::Action`] if pull fails.
    /// - Return [`ResolveError::Prompt`] if user cannot be prompted.
    pub fn resolve_remote_updates(&mut self) -> Result<Resolution> {
        let message = format!(
            "{}: new commits on {}",
            self.domain.name,
            self.domain.upstream()
        );
        self.drive(&message, Self::apply_remote)
    }

    /// Offer to push commits that never made it to the remote.
    ///
    /// # Errors
    ///
    /// - Return [`ResolveError::Action`] if push fails.
    /// - Return [`ResolveError::Prompt`] if user cannot be prompted.
    pub fn resolve_unpushed(&mut self) -> Result<Resolution> {
        let message = format!(
            "{}: local commits not on {}",
            self.domain.name,
            self.domain.upstream()
        );
        self.drive(&message, Self::apply_push)
    }

    fn drive<A: MenuAction>(
        &mut self,
        message: &str,
        apply: fn(&mut Self, A) -> Result<MenuState>,
    ) -> Result<Resolution> {
        let mut state = MenuState::AwaitingChoice;
        loop {
            state = match state {
                MenuState::AwaitingChoice => {
                    let items: Vec<_> = A::all().into_iter().map(|a| self.item(a)).collect();
                    match self.prompter.select(message, items)? {
                        Some(item) => apply(self, item.action)?,
                        None => MenuState::Resolved(Resolution::Cancelled),
                    }
                }
                MenuState::ShowingStatus => {
                    let status = self.copy.status();
                    self.display("status", status);
                    MenuState::AwaitingChoice
                }
                MenuState::ShowingDiff => {
                    let diff = self.copy.diff();
                    self.display("diff", diff);
                    MenuState::AwaitingChoice
                }
                MenuState::ShowingIncoming => {
                    let incoming = self.copy.incoming();
                    self.display("incoming commits", incoming);
                    MenuState::AwaitingChoice
                }
                MenuState::Resolved(resolution) => return Ok(resolution),
            };
        }
    }

    fn item<A: MenuAction>(&self, action: A) -> MenuItem<A> {
        let label = if action.is_snooze() {
            snooze_label(self.snooze_secs)
        } else {
            action.to_string()
        };

        MenuItem { action, label }
    }

    fn apply_local(&mut self, action: LocalAction) -> Result<MenuState> {
        let resolution = match action {
            LocalAction::CommitAndPush => {
                if !self.commit()? {
                    return Ok(MenuState::Resolved(Resolution::Cancelled));
                }
                self.push()?;
                Resolution::CommittedAndPushed
            }
            LocalAction::CommitOnly => {
                if !self.commit()? {
                    return Ok(MenuState::Resolved(Resolution::Cancelled));
                }
                match self.resolve_unpushed()? {
                    Resolution::Pushed => Resolution::CommittedAndPushed,
                    _ => Resolution::Committed,
                }
            }
            LocalAction::ShowStatus => return Ok(MenuState::ShowingStatus),
            LocalAction::ShowDiff => return Ok(MenuState::ShowingDiff),
            LocalAction::Snooze => Resolution::Snoozed,
            LocalAction::IgnoreForDay => Resolution::IgnoredForDay,
        };

        Ok(MenuState::Resolved(resolution))
    }

    fn apply_remote(&mut self, action: RemoteAction) -> Result<MenuState> {
        let resolution = match action {
            RemoteAction::Pull => {
                self.run("pull", W::pull)?;
                Resolution::Pulled
            }
            RemoteAction::ShowIncoming => return Ok(MenuState::ShowingIncoming),
            RemoteAction::Snooze => Resolution::Snoozed,
            RemoteAction::IgnoreForDay => Resolution::IgnoredForDay,
        };

        Ok(MenuState::Resolved(resolution))
    }

    fn apply_push(&mut self, action: PushAction) -> Result<MenuState> {
        let resolution = match action {
            PushAction::PushNow => {
                self.push()?;
                Resolution::Pushed
            }
            PushAction::PushLater => Resolution::Deferred,
        };

        Ok(MenuState::Resolved(resolution))
    }

    fn commit(&mut self) -> Result<bool> {
        let Some(message) = self
            .prompter
            .input("Commit message:", &self.domain.commit_message)?
        else {
            return Ok(false);
        };

        self.run("commit", |copy| copy.commit_all(&message))?;
        Ok(true)
    }

    fn push(&mut self) -> Result<()> {
        self.run("push", W::push)
    }

    fn run(
        &mut self,
        action: &'static str,
        op: impl FnOnce(&W) -> crate::repo::Result<()>,
    ) -> Result<()> {
        match op(self.copy) {
            Ok(()) => {
                info!("{}: {action} succeeded", self.domain.name);
                Ok(())
            }
            Err(source) => {
                error!("{}: {action} failed: {source}", self.domain.name);
                Err(ResolveError::Action { action, source })
            }
        }
    }

    fn display(&mut self, what: &str, output: crate::repo::Result<String>) {
        match output {
            Ok(text) if text.is_empty() => self.prompter.show(&format!("(no {what})")),
            Ok(text) => self.prompter.show(&text),
            Err(error) => self
                .prompter
                .show(&format!("failed to show {what}: {error}")),
        }
    }
}

/// Resolution error types.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    /// Repository mutation fails.
    #[error("{action} failed: {source}")]
    Action {
        action: &'static str,
        #[source]
        source: RepoError,
    },

    /// User cannot be prompted.
    #[error(transparent)]
    Prompt(#[from] PromptError),
}

/// Friendly result alias :3
pub type Result<T, E = ResolveError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        prompt::{Answer, ScriptedPrompter},
        testing::FakeCopy,
    };
    use pretty_assertions::assert_eq;
    use simple_test_case::test_case;

    fn domain() -> DomainDescriptor {
        DomainDescriptor::new("dotfiles", "/home/blah/.dotfiles")
    }

    #[test]
    fn commit_and_push_now() -> anyhow::Result<()> {
        let domain = domain();
        let copy = FakeCopy::dirty();
        let mut prompter = ScriptedPrompter::new([
            Answer::choose("Commit and push now"),
            Answer::type_text("tweak zshrc"),
        ]);

        let result = Resolver::new(&domain, &copy, &mut prompter).resolve_local_changes()?;
        assert_eq!(result, Resolution::CommittedAndPushed);
        assert_eq!(copy.calls(), vec!["commit", "message: tweak zshrc", "push"]);

        Ok(())
    }

    #[test]
    fn inspection_returns_to_menu() -> anyhow::Result<()> {
        let domain = domain();
        let copy = FakeCopy::dirty();
        let mut prompter = ScriptedPrompter::new([
            Answer::choose("Show status"),
            Answer::choose("Show diff"),
            Answer::choose("Snooze for 4 hours"),
        ]);

        let result = Resolver::new(&domain, &copy, &mut prompter).resolve_local_changes()?;
        assert_eq!(result, Resolution::Snoozed);
        assert_eq!(copy.calls(), vec!["status", "diff"]);
        assert_eq!(prompter.menus().len(), 3);
        assert_eq!(prompter.shown(), &[" M .zshrc".to_string(), "-old\n+new".to_string()]);

        Ok(())
    }

    #[test]
    fn failed_inspection_is_shown_not_raised() -> anyhow::Result<()> {
        let domain = domain();
        let copy = FakeCopy::dirty().failing("diff");
        let mut prompter = ScriptedPrompter::new([
            Answer::choose("Show diff"),
            Answer::choose("Ignore for this session"),
        ]);

        let result = Resolver::new(&domain, &copy, &mut prompter).resolve_local_changes()?;
        assert_eq!(result, Resolution::IgnoredForDay);
        assert!(prompter.shown()[0].starts_with("failed to show diff"));

        Ok(())
    }

    #[test_case(Answer::choose("Push now"), Resolution::CommittedAndPushed, &["commit", "message: wip", "push"]; "push after commit")]
    #[test_case(Answer::choose("Push later"), Resolution::Committed, &["commit", "message: wip"]; "defer push")]
    #[test_case(Answer::Dismiss, Resolution::Committed, &["commit", "message: wip"]; "dismiss push menu")]
    #[test]
    fn commit_only_offers_push(answer: Answer, expect: Resolution, calls: &[&str]) {
        let domain = domain();
        let copy = FakeCopy::dirty();
        let mut prompter = ScriptedPrompter::new([
            Answer::choose("Commit only"),
            Answer::type_text("wip"),
            answer,
        ]);

        let result = Resolver::new(&domain, &copy, &mut prompter)
            .resolve_local_changes()
            .unwrap();
        pretty_assertions::assert_eq!(result, expect);
        pretty_assertions::assert_eq!(copy.calls(), calls);
        pretty_assertions::assert_eq!(prompter.menus()[1].1, vec!["Push now", "Push later"]);
    }

    #[test]
    fn dismissed_commit_message_cancels() -> anyhow::Result<()> {
        let domain = domain();
        let copy = FakeCopy::dirty();
        let mut prompter =
            ScriptedPrompter::new([Answer::choose("Commit and push now"), Answer::Dismiss]);

        let result = Resolver::new(&domain, &copy, &mut prompter).resolve_local_changes()?;
        assert_eq!(result, Resolution::Cancelled);
        assert!(copy.calls().is_empty());

        Ok(())
    }

    #[test]
    fn dismissed_menu_cancels() -> anyhow::Result<()> {
        let domain = domain();
        let copy = FakeCopy::behind(3);
        let mut prompter = ScriptedPrompter::new([Answer::Dismiss]);

        let result = Resolver::new(&domain, &copy, &mut prompter).resolve_remote_updates()?;
        assert_eq!(result, Resolution::Cancelled);
        assert_eq!(result.state_effect(), StateEffect::Untouched);

        Ok(())
    }

    #[test]
    fn failed_push_is_an_error() {
        let domain = domain();
        let copy = FakeCopy::dirty().failing("push");
        let mut prompter = ScriptedPrompter::new([
            Answer::choose("Commit and push now"),
            Answer::type_text("tweak"),
        ]);

        let result = Resolver::new(&domain, &copy, &mut prompter).resolve_local_changes();
        assert!(matches!(
            result,
            Err(ResolveError::Action { action: "push", .. })
        ));
    }

    #[test]
    fn pull_after_showing_incoming() -> anyhow::Result<()> {
        let domain = domain();
        let copy = FakeCopy::behind(2);
        let mut prompter = ScriptedPrompter::new([
            Answer::choose("Show incoming commits"),
            Answer::choose("Pull now"),
        ]);

        let result = Resolver::new(&domain, &copy, &mut prompter).resolve_remote_updates()?;
        assert_eq!(result, Resolution::Pulled);
        assert_eq!(copy.calls(), vec!["incoming", "pull"]);
        assert_eq!(
            prompter.menus()[0].1,
            vec![
                "Pull now",
                "Show incoming commits",
                "Snooze for 4 hours",
                "Ignore for this session"
            ]
        );

        Ok(())
    }

    #[test_case(4 * 60 * 60, "Snooze for 4 hours"; "default interval")]
    #[test_case(60 * 60, "Snooze for 1 hour"; "one hour")]
    #[test_case(90 * 60, "Snooze for 90 minutes"; "minutes")]
    #[test_case(45, "Snooze for 45 seconds"; "seconds")]
    #[test]
    fn snooze_label_follows_interval(secs: i64, expect: &str) {
        pretty_assertions::assert_eq!(snooze_label(secs), expect);
    }

    #[test]
    fn snooze_menu_uses_configured_interval() -> anyhow::Result<()> {
        let domain = domain();
        let copy = FakeCopy::behind(1);
        let mut prompter = ScriptedPrompter::new([Answer::choose("Snooze for 2 hours")]);

        let result = Resolver::new(&domain, &copy, &mut prompter)
            .snooze_secs(2 * 60 * 60)
            .resolve_remote_updates()?;
        assert_eq!(result, Resolution::Snoozed);
        assert!(!prompter.menus()[0]
            .1
            .contains(&"Snooze for 4 hours".to_string()));

        Ok(())
    }

    #[test_case(Resolution::Snoozed, StateEffect::Touch; "snooze")]
    #[test_case(Resolution::IgnoredForDay, StateEffect::IgnoreForDay; "ignore")]
    #[test_case(Resolution::Cancelled, StateEffect::Untouched; "cancel")]
    #[test_case(Resolution::Deferred, StateEffect::Touch; "defer")]
    #[test]
    fn resolution_state_effects(resolution: Resolution, expect: StateEffect) {
        pretty_assertions::assert_eq!(resolution.state_effect(), expect);
    }
}
