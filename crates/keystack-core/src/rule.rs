// Keystack Compiled Rules
// Trigger + conditions + actions, in the shape the host engine evaluates

use std::fmt;

use smallvec::SmallVec;

use crate::mapping::SimultaneousOptions;
use crate::{Action, Conditions, DelayedAction, TriggerKey};

/// The input side of a compiled rule
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Trigger {
    Key(TriggerKey),
    Simultaneous {
        keys: SmallVec<[TriggerKey; 4]>,
        options: SimultaneousOptions,
    },
}

impl Trigger {
    pub fn simultaneous(keys: impl IntoIterator<Item = TriggerKey>, options: SimultaneousOptions) -> Self {
        Trigger::Simultaneous {
            keys: keys.into_iter().collect(),
            options,
        }
    }

    /// Every key this trigger involves
    pub fn keys(&self) -> &[TriggerKey] {
        match self {
            Trigger::Key(key) => std::slice::from_ref(key),
            Trigger::Simultaneous { keys, .. } => keys,
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Key(key) => write!(f, "{}", key),
            Trigger::Simultaneous { keys, .. } => {
                for (i, key) in keys.iter().enumerate() {
                    if i > 0 {
                        f.write_str("+")?;
                    }
                    write!(f, "{}", key)?;
                }
                Ok(())
            }
        }
    }
}

/// One compiled rule. The host engine tries rules in order and fires the
/// first whose trigger matches and whose conditions all hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    trigger: Trigger,
    conditions: Conditions,
    actions: Vec<Action>,
    alone: Vec<Action>,
    held: Vec<Action>,
    after_key_up: Vec<Action>,
    delayed: Option<DelayedAction>,
}

impl Rule {
    pub fn new(trigger: Trigger, conditions: Conditions, actions: Vec<Action>) -> Self {
        Self {
            trigger,
            conditions,
            actions,
            alone: Vec::new(),
            held: Vec::new(),
            after_key_up: Vec::new(),
            delayed: None,
        }
    }

    pub fn with_alone(mut self, actions: Vec<Action>) -> Self {
        self.alone = actions;
        self
    }

    pub fn with_held(mut self, actions: Vec<Action>) -> Self {
        self.held = actions;
        self
    }

    pub fn with_after_key_up(mut self, actions: Vec<Action>) -> Self {
        self.after_key_up = actions;
        self
    }

    pub fn with_delayed(mut self, delayed: DelayedAction) -> Self {
        self.delayed = Some(delayed);
        self
    }

    pub fn trigger(&self) -> &Trigger {
        &self.trigger
    }

    pub fn conditions(&self) -> &Conditions {
        &self.conditions
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    /// Actions when the trigger key is pressed and released alone
    pub fn alone(&self) -> &[Action] {
        &self.alone
    }

    /// Actions when the trigger key is held down
    pub fn held(&self) -> &[Action] {
        &self.held
    }

    pub fn after_key_up(&self) -> &[Action] {
        &self.after_key_up
    }

    pub fn delayed(&self) -> Option<&DelayedAction> {
        self.delayed.as_ref()
    }
}

/// A named, ordered list of rules
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleGroup {
    name: String,
    rules: Vec<Rule>,
}

impl RuleGroup {
    pub fn new(name: impl Into<String>, rules: Vec<Rule>) -> Self {
        Self {
            name: name.into(),
            rules,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
