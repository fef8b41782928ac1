// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Blocking user prompts.
//!
//! Every prompt may be dismissed. Dismissal is not an error, it simply means
//! the user did not choose anything.

use inquire::{InquireError, Select, Text};
use std::{collections::VecDeque, fmt::Display};

/// Ask the user things.
pub trait Prompter {
    /// Present single-choice menu, blocking until user picks or dismisses.
    fn select<T: Display>(&mut self, message: &str, options: Vec<T>) -> Result<Option<T>>;

    /// Ask for one line of text, offering `default`.
    ///
    /// Blank answers count as dismissal.
    fn input(&mut self, message: &str, default: &str) -> Result<Option<String>>;

    /// Show block of text to the user.
    fn show(&mut self, text: &str);
}

impl<P: Prompter> Prompter for &mut P {
    fn select<T: Display>(&mut self, message: &str, options: Vec<T>) -> Result<Option<T>> {
        (**self).select(message, options)
    }

    fn input(&mut self, message: &str, default: &str) -> Result<Option<String>> {
        (**self).input(message, default)
    }

    fn show(&mut self, text: &str) {
        (**self).show(text)
    }
}

/// Terminal prompts through inquire.
///
/// Menus come with fuzzy filtering. Escape and Ctrl-C dismiss.
#[derive(Debug, Default, Clone, Copy)]
pub struct InquirePrompter;

impl Prompter for InquirePrompter {
    fn select<T: Display>(&mut self, message: &str, options: Vec<T>) -> Result<Option<T>> {
        let page_size = options.len().max(1);
        dismissable(Select::new(message, options).with_page_size(page_size).prompt())
    }

    fn input(&mut self, message: &str, default: &str) -> Result<Option<String>> {
        let answer = dismissable(Text::new(message).with_default(default).prompt())?;
        Ok(answer.filter(|text| !text.trim().is_empty()))
    }

    fn show(&mut self, text: &str) {
        println!("{text}");
    }
}

fn dismissable<T>(result: std::result::Result<T, InquireError>) -> Result<Option<T>> {
    match result {
        Ok(answer) => Ok(Some(answer)),
        Err(InquireError::OperationCanceled | InquireError::OperationInterrupted) => Ok(None),
        Err(error) => Err(error.into()),
    }
}

/// Canned answer for [`ScriptedPrompter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Answer {
    /// Pick menu option with this label.
    Choose(String),

    /// Type this line of text.
    Type(String),

    /// Dismiss prompt.
    Dismiss,
}

impl Answer {
    /// Pick menu option with this label.
    pub fn choose(label: impl Into<String>) -> Self {
        Self::Choose(label.into())
    }

    /// Type this line of text.
    pub fn type_text(text: impl Into<String>) -> Self {
        Self::Type(text.into())
    }
}

/// Prompter replaying canned answers.
///
/// Records every menu it was shown and every block of text displayed. Runs
/// out of answers by dismissing.
#[derive(Debug, Default, Clone)]
pub struct ScriptedPrompter {
    answers: VecDeque<Answer>,
    menus: Vec<(String, Vec<String>)>,
    shown: Vec<String>,
}

impl ScriptedPrompter {
    /// Construct new scripted prompter.
    pub fn new(answers: impl IntoIterator<Item = Answer>) -> Self {
        Self {
            answers: answers.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Menus presented so far, as message and option labels.
    pub fn menus(&self) -> &[(String, Vec<String>)] {
        &self.menus
    }

    /// Text displayed so far.
    pub fn shown(&self) -> &[String] {
        &self.shown
    }

    /// Answers never consumed.
    pub fn remaining(&self) -> usize {
        self.answers.len()
    }
}

impl Prompter for ScriptedPrompter {
    fn select<T: Display>(&mut self, message: &str, options: Vec<T>) -> Result<Option<T>> {
        let labels = options.iter().map(ToString::to_string).collect::<Vec<_>>();
        self.menus.push((message.to_string(), labels.clone()));

        match self.answers.pop_front() {
            Some(Answer::Choose(label)) => {
                let index = labels
                    .iter()
                    .position(|option| *option == label)
                    .ok_or_else(|| PromptError::Script(format!("no option labeled {label:?}")))?;
                Ok(options.into_iter().nth(index))
            }
            Some(Answer::Type(text)) => Err(PromptError::Script(format!(
                "expected menu choice, got text {text:?}"
            ))),
            Some(Answer::Dismiss) | None => Ok(None),
        }
    }

    fn input(&mut self, message: &str, _default: &str) -> Result<Option<String>> {
        match self.answers.pop_front() {
            Some(Answer::Type(text)) => Ok(Some(text).filter(|text| !text.trim().is_empty())),
            Some(Answer::Choose(label)) => Err(PromptError::Script(format!(
                "expected text for {message:?}, got choice {label:?}"
            ))),
            Some(Answer::Dismiss) | None => Ok(None),
        }
    }

    fn show(&mut self, text: &str) {
        self.shown.push(text.to_string());
    }
}

/// Prompt error types.
#[derive(Debug, thiserror::Error)]
pub enum PromptError {
    /// Terminal prompt fails, e.g., no TTY available.
    #[error(transparent)]
    Inquire(#[from] InquireError),

    /// Scripted answer does not fit prompt.
    #[error("scripted prompt mismatch: {0}")]
    Script(String),
}

/// Friendly result alias :3
pub type Result<T, E = PromptError> = std::result::Result<T, E>;
