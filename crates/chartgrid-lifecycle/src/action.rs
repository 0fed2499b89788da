//! Lifecycle actions and the version transition table.

use std::fmt;
use std::str::FromStr;

use chartgrid_core::VersionState;
use serde::{Deserialize, Serialize};

use crate::error::LifecycleError;

/// An operator action on an application version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Send a draft for review.
    Submit,
    /// Withdraw a submission back to draft.
    Cancel,
    /// Approve a submission.
    Pass,
    /// Turn down a submission.
    Reject,
    /// Publish an approved version to the app store.
    Release,
    /// Take a published version off the app store.
    Suspend,
    /// Put a suspended version back on the app store.
    Recover,
}

impl Action {
    pub const ALL: [Action; 7] = [
        Action::Submit,
        Action::Cancel,
        Action::Pass,
        Action::Reject,
        Action::Release,
        Action::Suspend,
        Action::Recover,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Submit => "submit",
            Action::Cancel => "cancel",
            Action::Pass => "pass",
            Action::Reject => "reject",
            Action::Release => "release",
            Action::Suspend => "suspend",
            Action::Recover => "recover",
        }
    }

    /// State the version is in after the action.
    pub fn target(&self) -> VersionState {
        match self {
            Action::Submit => VersionState::Submitted,
            Action::Cancel => VersionState::Draft,
            Action::Pass => VersionState::Passed,
            Action::Reject => VersionState::Rejected,
            Action::Release | Action::Recover => VersionState::Active,
            Action::Suspend => VersionState::Suspended,
        }
    }

    /// State the version must be in for the action under strict transitions.
    pub fn required_state(&self) -> VersionState {
        match self {
            Action::Submit => VersionState::Draft,
            Action::Cancel | Action::Pass | Action::Reject => VersionState::Submitted,
            Action::Release => VersionState::Passed,
            Action::Suspend => VersionState::Active,
            Action::Recover => VersionState::Suspended,
        }
    }

    /// Whether the action makes the version visible in the app store.
    pub fn publishes(&self) -> bool {
        matches!(self, Action::Release | Action::Recover)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = LifecycleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| LifecycleError::UnknownAction(s.to_string()))
    }
}

/// How preconditions are enforced when applying an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransitionPolicy {
    /// Any action is accepted from any state.
    #[default]
    Permissive,
    /// The version must be in the action's required state.
    Strict,
}

impl TransitionPolicy {
    pub fn from_strict(strict: bool) -> Self {
        if strict {
            TransitionPolicy::Strict
        } else {
            TransitionPolicy::Permissive
        }
    }

    /// Check that `action` may be applied to a version in `current`.
    pub fn check(&self, action: Action, current: VersionState) -> Result<(), LifecycleError> {
        match self {
            TransitionPolicy::Permissive => Ok(()),
            TransitionPolicy::Strict if action.required_state() == current => Ok(()),
            TransitionPolicy::Strict => Err(LifecycleError::InvalidTransition { action, current }),
        }
    }
}
