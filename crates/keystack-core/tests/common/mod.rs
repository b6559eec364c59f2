// Keystack Test Host
// Minimal first-match rule evaluator used by the integration tests

#![allow(dead_code)]

use std::collections::HashSet;

use keystack_core::{
    compile, Action, Condition, Declaration, DelayedAction, Document, LayerBuilder, ProfileBuilder, Rule, StateFlag,
    Trigger, TriggerKey,
};

/// A key or chord currently held down, with the rule that consumed it
struct Held<'d> {
    keys: Vec<String>,
    rule: Option<&'d Rule>,
    interrupted: bool,
}

/// Evaluates the rules of one profile the way the host engine does:
/// first matching rule wins, key up goes to the rule that took the key down,
/// a pending delayed action is cancelled by the next key down.
///
/// On key down the rule is chosen against the flags as they stand, then the
/// cancel actions of the pending delayed action run, then the chosen rule's
/// actions.
pub struct Host<'d> {
    document: &'d Document,
    rules: Vec<&'d Rule>,
    flags: HashSet<StateFlag>,
    app: Option<String>,
    held: Vec<Held<'d>>,
    pending: Option<&'d DelayedAction>,
    output: Vec<String>,
}

impl<'d> Host<'d> {
    pub fn new(document: &'d Document, profile: &str) -> Self {
        let rules = document
            .profile(profile)
            .unwrap_or_else(|| panic!("no profile named {}", profile))
            .rules()
            .collect();
        Self {
            document,
            rules,
            flags: HashSet::new(),
            app: None,
            held: Vec::new(),
            pending: None,
            output: Vec::new(),
        }
    }

    pub fn set_app(&mut self, bundle_id: &str) {
        self.app = Some(bundle_id.to_string());
    }

    /// Current value of a named flag
    pub fn flag(&self, name: &str) -> bool {
        self.document
            .flags()
            .get(name)
            .is_some_and(|flag| self.flags.contains(&flag))
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    fn condition_holds(&self, condition: &Condition) -> bool {
        match condition {
            Condition::Flag { flag, expected } => self.flags.contains(flag) == *expected,
            Condition::AppIs(ids) => self.app.as_ref().is_some_and(|app| ids.contains(app)),
            Condition::AppIsNot(ids) => !self.app.as_ref().is_some_and(|app| ids.contains(app)),
        }
    }

    fn matches_key(trigger: &TriggerKey, key: &str) -> bool {
        trigger.key().name() == key && trigger.mandatory().is_empty()
    }

    fn run(&mut self, actions: &[Action]) {
        for action in actions {
            match action {
                Action::Key(press) => self.output.push(press.to_string()),
                Action::SetFlag(flag) => {
                    self.flags.insert(*flag);
                }
                Action::ClearFlags(flags) => {
                    for flag in flags {
                        self.flags.remove(flag);
                    }
                }
                Action::Shell(command) => self.output.push(format!("shell:{}", command)),
            }
        }
    }

    fn begin_key_down(&mut self) {
        for held in &mut self.held {
            held.interrupted = true;
        }
        if let Some(delayed) = self.pending.take() {
            self.run(&delayed.on_canceled);
        }
    }

    fn fire(&mut self, rule: Option<&'d Rule>, keys: Vec<String>) {
        match rule {
            Some(rule) => {
                self.run(rule.actions());
                self.pending = rule.delayed();
            }
            None => self.output.extend(keys.iter().cloned()),
        }
        self.held.push(Held {
            keys,
            rule,
            interrupted: false,
        });
    }

    pub fn down(&mut self, key: &str) {
        let rule = self.rules.iter().copied().find(|rule| {
            matches!(rule.trigger(), Trigger::Key(trigger) if Self::matches_key(trigger, key))
                && rule.conditions().iter().all(|c| self.condition_holds(c))
        });
        self.begin_key_down();
        self.fire(rule, vec![key.to_string()]);
    }

    /// Press several keys at the same instant
    pub fn chord(&mut self, keys: &[&str]) {
        let mut wanted: Vec<&str> = keys.to_vec();
        wanted.sort_unstable();
        let rule = self.rules.iter().copied().find(|rule| match rule.trigger() {
            Trigger::Simultaneous { keys: trigger_keys, .. } => {
                let mut names: Vec<&str> = trigger_keys.iter().map(|k| k.key().name()).collect();
                names.sort_unstable();
                names == wanted && rule.conditions().iter().all(|c| self.condition_holds(c))
            }
            Trigger::Key(_) => false,
        });
        match rule {
            Some(rule) => {
                self.begin_key_down();
                self.fire(Some(rule), keys.iter().map(|k| k.to_string()).collect());
            }
            None => {
                for key in keys {
                    self.down(key);
                }
            }
        }
    }

    pub fn up(&mut self, key: &str) {
        let Some(position) = self.held.iter().position(|h| h.keys.iter().any(|k| k == key)) else {
            return;
        };
        let mut held = self.held.remove(position);
        held.keys.retain(|k| k != key);
        let Some(rule) = held.rule else {
            return;
        };
        self.run(rule.after_key_up());
        if !held.interrupted {
            self.run(rule.alone());
        }
        // Release of one chord key ends the chord; the rest are swallowed
        if !held.keys.is_empty() {
            self.held.push(Held {
                keys: held.keys,
                rule: None,
                interrupted: true,
            });
        }
    }

    pub fn tap(&mut self, key: &str) {
        self.down(key);
        self.up(key);
    }

    /// Let the pending delayed action run out
    pub fn elapse(&mut self) {
        if let Some(delayed) = self.pending.take() {
            self.run(&delayed.on_invoked);
        }
    }

    pub fn take_output(&mut self) -> Vec<String> {
        std::mem::take(&mut self.output)
    }
}

/// Compile a single-profile declaration named "Default" from layer builders
pub fn compile_layers(layers: Vec<LayerBuilder>) -> Document {
    let profile = layers
        .into_iter()
        .fold(ProfileBuilder::new("Default"), ProfileBuilder::layer_with)
        .build()
        .expect("profile should build");
    compile(&Declaration::new().profile(profile)).expect("declaration should compile")
}
