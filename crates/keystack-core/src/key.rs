// Keystack Key Types
// Host key codes, trigger keys (key + modifiers) and emitted key presses

use std::fmt;
use std::str::FromStr;

use smallvec::SmallVec;

use crate::config::key_parser::{parse_key_string, KeyParseError};
use crate::Modifier;

/// Well-known host key names.
pub mod keys {
    pub const CMD: &str = "command";
    pub const ALT: &str = "option";
    pub const OPT: &str = "option";
    pub const CTRL: &str = "control";
    pub const SHIFT: &str = "shift";

    pub const R_CMD: &str = "right_command";
    pub const L_CMD: &str = "left_command";
    pub const R_OPT: &str = "right_option";
    pub const L_OPT: &str = "left_option";
    pub const R_CTRL: &str = "right_control";
    pub const L_CTRL: &str = "left_control";
    pub const R_SHIFT: &str = "right_shift";
    pub const L_SHIFT: &str = "left_shift";

    pub const CAPS: &str = "caps_lock";
    pub const ESC: &str = "escape";
    pub const ENTER: &str = "return_or_enter";
    pub const SPACE: &str = "spacebar";
    pub const TAB: &str = "tab";
    pub const BACKSPACE: &str = "delete_or_backspace";
    pub const DELETE: &str = "delete_forward";

    pub const UP: &str = "up_arrow";
    pub const DOWN: &str = "down_arrow";
    pub const LEFT: &str = "left_arrow";
    pub const RIGHT: &str = "right_arrow";

    pub const PAGE_UP: &str = "page_up";
    pub const PAGE_DOWN: &str = "page_down";
    pub const HOME: &str = "home";
    pub const END: &str = "end";
}

/// A host key name such as `h`, `right_command` or `left_arrow`.
///
/// Construction never fails; emptiness is checked when the declaration that
/// uses the key is finalized.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyCode(String);

impl KeyCode {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl From<&str> for KeyCode {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for KeyCode {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl fmt::Display for KeyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

type Modifiers = SmallVec<[Modifier; 4]>;

fn normalized(modifiers: impl IntoIterator<Item = Modifier>) -> Modifiers {
    let mut modifiers: Modifiers = modifiers.into_iter().collect();
    modifiers.sort();
    modifiers.dedup();
    modifiers
}

/// The input side of a rule: a key plus the modifiers that must (mandatory)
/// or may (optional) be held with it.
///
/// Modifiers are kept sorted so that `Cmd-Shift-h` and `Shift-Cmd-h` compare
/// and hash equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TriggerKey {
    key: KeyCode,
    mandatory: Modifiers,
    optional: Modifiers,
}

impl TriggerKey {
    /// A bare key with no modifiers
    pub fn new(key: impl Into<KeyCode>) -> Self {
        Self {
            key: key.into(),
            mandatory: SmallVec::new(),
            optional: SmallVec::new(),
        }
    }

    /// A key that requires the given modifiers to be held
    pub fn with_modifiers(key: impl Into<KeyCode>, mandatory: impl IntoIterator<Item = Modifier>) -> Self {
        Self {
            key: key.into(),
            mandatory: normalized(mandatory),
            optional: SmallVec::new(),
        }
    }

    /// Allow additional modifiers to be held without breaking the match
    pub fn optional(mut self, modifiers: impl IntoIterator<Item = Modifier>) -> Self {
        self.optional = normalized(self.optional.iter().copied().chain(modifiers));
        self
    }

    /// Same key, with every other modifier allowed (`optional: ["any"]`).
    /// Mandatory modifiers are kept.
    pub fn any_optional(&self) -> Self {
        self.clone().optional([Modifier::Any])
    }

    pub fn key(&self) -> &KeyCode {
        &self.key
    }

    pub fn mandatory(&self) -> &[Modifier] {
        &self.mandatory
    }

    pub fn optional_modifiers(&self) -> &[Modifier] {
        &self.optional
    }

    /// The key as it would be emitted: same key code, mandatory modifiers held.
    pub fn as_press(&self) -> KeyPress {
        KeyPress::with_modifiers(self.key.clone(), self.mandatory.iter().copied())
    }

    /// Flag-name friendly rendering (`command_h`)
    pub fn slug(&self) -> String {
        let mut parts: Vec<&str> = self.mandatory.iter().map(|m| m.name()).collect();
        parts.push(self.key.name());
        parts.join("_")
    }
}

impl From<&str> for TriggerKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for TriggerKey {
    fn from(key: String) -> Self {
        Self::new(key)
    }
}

impl From<KeyCode> for TriggerKey {
    fn from(key: KeyCode) -> Self {
        Self::new(key)
    }
}

impl FromStr for TriggerKey {
    type Err = KeyParseError;

    /// Parse `Mod-Mod-key` strings such as `Cmd-Shift-h` or `left_control-w`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parsed = parse_key_string(s)?;
        Ok(Self::with_modifiers(parsed.key, parsed.modifiers))
    }
}

impl fmt::Display for TriggerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for modifier in &self.mandatory {
            write!(f, "{}-", modifier)?;
        }
        write!(f, "{}", self.key)
    }
}

/// An emitted key: key code plus modifiers held while it is sent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyPress {
    key: KeyCode,
    modifiers: Modifiers,
}

impl KeyPress {
    pub fn new(key: impl Into<KeyCode>) -> Self {
        Self {
            key: key.into(),
            modifiers: SmallVec::new(),
        }
    }

    pub fn with_modifiers(key: impl Into<KeyCode>, modifiers: impl IntoIterator<Item = Modifier>) -> Self {
        Self {
            key: key.into(),
            modifiers: normalized(modifiers),
        }
    }

    pub fn key(&self) -> &KeyCode {
        &self.key
    }

    pub fn modifiers(&self) -> &[Modifier] {
        &self.modifiers
    }
}

impl From<&str> for KeyPress {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl FromStr for KeyPress {
    type Err = KeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parsed = parse_key_string(s)?;
        Ok(Self::with_modifiers(parsed.key, parsed.modifiers))
    }
}

impl fmt::Display for KeyPress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for modifier in &self.modifiers {
            write!(f, "{}-", modifier)?;
        }
        write!(f, "{}", self.key)
    }
}
