//! Interactive username entry.
//!
//! The prompt is a small retry machine: ask, validate, explain the rejection
//! and ask again until a usable name comes back. There is no retry limit; only
//! closing the input ends the loop (as an error).

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::account::Provisioner;
use crate::config::MAX_USERNAME_LEN;
use crate::error::Error;
use crate::system::terminal::Terminal;

static USERNAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new("^[a-zA-Z0-9]+$").expect("username pattern is valid")
});

/// Why an entered username was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UsernameRejection {
    Empty,
    NotOneWord,
    TooLong { excess: usize },
    Taken,
}

impl fmt::Display for UsernameRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "Type a cool name."),
            Self::NotOneWord => write!(f, "Just one word, letters or numbers! Try again."),
            Self::TooLong { excess } => {
                write!(f, "This one is too long by {excess} characters! Try again.")
            }
            Self::Taken => write!(f, "This one is already taken! Try again."),
        }
    }
}

/// Check the shape of a username: one ASCII alphanumeric token of at most
/// [`MAX_USERNAME_LEN`] characters. Surrounding whitespace is ignored.
pub fn check_format(raw: &str) -> Result<String, UsernameRejection> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(UsernameRejection::Empty);
    }
    if !USERNAME_PATTERN.is_match(name) {
        return Err(UsernameRejection::NotOneWord);
    }
    if name.len() > MAX_USERNAME_LEN {
        return Err(UsernameRejection::TooLong {
            excess: name.len() - MAX_USERNAME_LEN,
        });
    }
    Ok(name.to_string())
}

enum PromptState {
    Asking,
    Rejected(UsernameRejection),
    Accepted(String),
}

/// Asks the operator for a username until one passes validation.
pub struct UsernamePrompt<'a> {
    terminal: &'a dyn Terminal,
    provisioner: &'a Provisioner,
}

impl<'a> UsernamePrompt<'a> {
    pub fn new(terminal: &'a dyn Terminal, provisioner: &'a Provisioner) -> Self {
        Self {
            terminal,
            provisioner,
        }
    }

    pub async fn ask(&self) -> Result<String, Error> {
        let mut state = PromptState::Asking;
        loop {
            state = match state {
                PromptState::Asking => {
                    let raw = self.terminal.prompt_line("Your name: ").await?;
                    self.validate(&raw).await?
                }
                PromptState::Rejected(reason) => {
                    tracing::debug!(?reason, "Username rejected");
                    self.terminal.say(&reason.to_string()).await?;
                    PromptState::Asking
                }
                PromptState::Accepted(name) => return Ok(name),
            };
        }
    }

    async fn validate(&self, raw: &str) -> Result<PromptState, Error> {
        let name = match check_format(raw) {
            Ok(name) => name,
            Err(reason) => return Ok(PromptState::Rejected(reason)),
        };
        if self.provisioner.user_exists(&name).await? {
            return Ok(PromptState::Rejected(UsernameRejection::Taken));
        }
        Ok(PromptState::Accepted(name))
    }
}
