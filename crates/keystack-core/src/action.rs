// Keystack Actions
// What a compiled rule does when it fires

use smallvec::SmallVec;

use crate::{KeyPress, StateFlag};

/// One step of a rule's output. A rule runs its actions in order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Action {
    /// Emit a key, with modifiers held
    Key(KeyPress),
    /// Set a flag to true
    SetFlag(StateFlag),
    /// Set every listed flag to false
    ClearFlags(SmallVec<[StateFlag; 4]>),
    /// Run an external command
    Shell(String),
}

impl Action {
    pub fn key(key: impl Into<KeyPress>) -> Self {
        Action::Key(key.into())
    }

    pub fn clear(flags: impl IntoIterator<Item = StateFlag>) -> Self {
        Action::ClearFlags(flags.into_iter().collect())
    }

    /// Returns true if this action only touches flags
    pub fn is_side_effect(&self) -> bool {
        matches!(self, Action::SetFlag(_) | Action::ClearFlags(_))
    }

    /// Flags this action sets to true
    pub fn sets(&self) -> Option<StateFlag> {
        match self {
            Action::SetFlag(flag) => Some(*flag),
            _ => None,
        }
    }

    /// Flags this action clears
    pub fn clears(&self) -> &[StateFlag] {
        match self {
            Action::ClearFlags(flags) => flags,
            _ => &[],
        }
    }
}

/// Actions the host engine schedules when a rule fires and runs after
/// `delay_ms` unless another key is pressed first.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DelayedAction {
    pub delay_ms: u64,
    /// Run when the delay elapses with no other key pressed
    pub on_invoked: Vec<Action>,
    /// Run when another key press cancels the delay
    pub on_canceled: Vec<Action>,
}

impl DelayedAction {
    /// A delayed action that runs `actions` on timeout and on cancel alike
    pub fn disarm(delay_ms: u64, actions: Vec<Action>) -> Self {
        Self {
            delay_ms,
            on_invoked: actions.clone(),
            on_canceled: actions,
        }
    }
}
