//! Onboarding stages and the persisted progress through them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StatusError;

/// The stages of the first-boot flow.
///
/// Progresses linearly: Username → Lightup → Switch → Letters → WhiteRabbit →
/// Love → Final → UiInit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    #[default]
    Username,
    Lightup,
    Switch,
    Letters,
    WhiteRabbit,
    Love,
    Final,
    UiInit,
}

impl Stage {
    /// Every stage in flow order.
    pub const ALL: [Stage; 8] = [
        Stage::Username,
        Stage::Lightup,
        Stage::Switch,
        Stage::Letters,
        Stage::WhiteRabbit,
        Stage::Love,
        Stage::Final,
        Stage::UiInit,
    ];

    /// Check if a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: Stage) -> bool {
        use Stage::*;
        matches!(
            (self, target),
            (Username, Lightup)
                | (Lightup, Switch)
                | (Switch, Letters)
                | (Letters, WhiteRabbit)
                | (WhiteRabbit, Love)
                | (Love, Final)
                | (Final, UiInit)
        )
    }

    /// Whether this stage hands off to the graphical first run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::UiInit)
    }

    /// Get the next stage in the linear progression, if any.
    pub fn next(&self) -> Option<Stage> {
        use Stage::*;
        match self {
            Username => Some(Lightup),
            Lightup => Some(Switch),
            Switch => Some(Letters),
            Letters => Some(WhiteRabbit),
            WhiteRabbit => Some(Love),
            Love => Some(Final),
            Final => Some(UiInit),
            UiInit => None,
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Username => "username",
            Self::Lightup => "lightup",
            Self::Switch => "switch",
            Self::Letters => "letters",
            Self::WhiteRabbit => "white_rabbit",
            Self::Love => "love",
            Self::Final => "final",
            Self::UiInit => "ui_init",
        };
        write!(f, "{s}")
    }
}

/// Persisted onboarding progress.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowStatus {
    stage: Stage,
    /// Account provisioned by the username stage.
    #[serde(default)]
    pub username: Option<String>,
    /// Account the username stage is in the middle of creating.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl FlowStatus {
    /// Status positioned at `stage`, as left behind by an earlier run.
    pub fn at(stage: Stage) -> Self {
        Self {
            stage,
            ..Self::default()
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Advance to the next stage. Returns an error if already at the terminal stage.
    pub fn advance(&mut self) -> Result<Stage, StatusError> {
        let next = self
            .stage
            .next()
            .ok_or_else(|| StatusError::Terminal(self.stage.to_string()))?;
        if !self.stage.can_transition_to(next) {
            return Err(StatusError::InvalidTransition {
                from: self.stage.to_string(),
                to: next.to_string(),
            });
        }
        self.stage = next;
        Ok(next)
    }

    /// Record the account the username stage settled on.
    pub fn record_username(&mut self, name: impl Into<String>) {
        self.username = Some(name.into());
        self.pending_username = None;
    }
}
