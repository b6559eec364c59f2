// Keystack Mapping Declarations
// Mapping, Combo, Sequence and the outputs they declare

use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::Deserialize;
use strum_macros::{Display, EnumString};

use crate::config::key_parser::KeyParseError;
use crate::{KeyPress, Requirement, TriggerKey};

/// Sequence timeout used when a layer does not set one (milliseconds)
pub const DEFAULT_SEQUENCE_TIMEOUT_MS: u64 = 500;

/// Errors from parsing an output expression
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OutputParseError {
    #[error(transparent)]
    Key(#[from] KeyParseError),

    #[error("malformed output '{0}'")]
    Malformed(String),
}

/// A declared output, before flag names and templates are resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    Key(KeyPress),
    Flag { name: String, on: bool },
    Shell(String),
    Macro {
        template: String,
        params: IndexMap<String, String>,
    },
}

impl Output {
    pub fn shell(command: impl Into<String>) -> Self {
        Output::Shell(command.into())
    }

    pub fn set(name: impl Into<String>) -> Self {
        Output::Flag {
            name: name.into(),
            on: true,
        }
    }

    pub fn unset(name: impl Into<String>) -> Self {
        Output::Flag {
            name: name.into(),
            on: false,
        }
    }

    pub fn macro_call<I, K, V>(template: impl Into<String>, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Output::Macro {
            template: template.into(),
            params: params.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

impl From<KeyPress> for Output {
    fn from(key: KeyPress) -> Self {
        Output::Key(key)
    }
}

impl FromStr for Output {
    type Err = OutputParseError;

    /// Parse an output expression:
    /// - `left_arrow`, `Cmd-Shift-z`: a key press
    /// - `Shell(open -a Mail)`: a shell command
    /// - `Set(name=1)` / `Set(name=0)`: set or clear a flag
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();

        if let Some(rest) = trimmed.strip_prefix("Shell(") {
            let command = rest
                .strip_suffix(')')
                .ok_or_else(|| OutputParseError::Malformed(trimmed.to_string()))?;
            if command.trim().is_empty() {
                return Err(OutputParseError::Malformed(trimmed.to_string()));
            }
            return Ok(Output::Shell(command.to_string()));
        }

        if let Some(rest) = trimmed.strip_prefix("Set(") {
            let body = rest
                .strip_suffix(')')
                .ok_or_else(|| OutputParseError::Malformed(trimmed.to_string()))?;
            let (name, value) = body
                .split_once('=')
                .ok_or_else(|| OutputParseError::Malformed(trimmed.to_string()))?;
            let name = name.trim();
            if name.is_empty() {
                return Err(OutputParseError::Malformed(trimmed.to_string()));
            }
            let on = match value.trim() {
                "1" | "true" => true,
                "0" | "false" => false,
                _ => return Err(OutputParseError::Malformed(trimmed.to_string())),
            };
            return Ok(Output::Flag {
                name: name.to_string(),
                on,
            });
        }

        Ok(Output::Key(trimmed.parse()?))
    }
}

impl fmt::Display for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Output::Key(key) => write!(f, "{}", key),
            Output::Flag { name, on } => write!(f, "Set({}={})", name, u8::from(*on)),
            Output::Shell(command) => write!(f, "Shell({})", command),
            Output::Macro { template, .. } => write!(f, "Macro({})", template),
        }
    }
}

/// Parse a list of output expressions
pub fn parse_outputs<S: AsRef<str>>(exprs: &[S]) -> Result<Vec<Output>, OutputParseError> {
    exprs.iter().map(|e| e.as_ref().parse()).collect()
}

/// A single key mapped to outputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mapping {
    trigger: TriggerKey,
    outputs: Vec<Output>,
    requirements: Vec<Requirement>,
    alone: Vec<Output>,
    held: Vec<Output>,
}

impl Mapping {
    pub fn new(trigger: TriggerKey, outputs: Vec<Output>) -> Self {
        Self {
            trigger,
            outputs,
            requirements: Vec::new(),
            alone: Vec::new(),
            held: Vec::new(),
        }
    }

    /// Parse `from` and `to` expressions into a mapping
    pub fn parse<S: AsRef<str>>(from: &str, to: &[S]) -> Result<Self, OutputParseError> {
        Ok(Self::new(from.parse()?, parse_outputs(to)?))
    }

    /// Outputs sent when the key is tapped alone
    pub fn alone(mut self, outputs: Vec<Output>) -> Self {
        self.alone = outputs;
        self
    }

    /// Outputs sent when the key is held down
    pub fn held(mut self, outputs: Vec<Output>) -> Self {
        self.held = outputs;
        self
    }

    pub fn require(mut self, requirement: Requirement) -> Self {
        self.requirements.push(requirement);
        self
    }

    pub fn trigger(&self) -> &TriggerKey {
        &self.trigger
    }

    pub fn outputs(&self) -> &[Output] {
        &self.outputs
    }

    pub fn requirements(&self) -> &[Requirement] {
        &self.requirements
    }

    pub fn alone_outputs(&self) -> &[Output] {
        &self.alone
    }

    pub fn held_outputs(&self) -> &[Output] {
        &self.held
    }

    /// Returns true if the mapping carries its own requirements
    pub fn is_conditional(&self) -> bool {
        !self.requirements.is_empty()
    }
}

/// Order in which combo keys must go down or come up
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, EnumString, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum KeyOrder {
    #[default]
    Insensitive,
    Strict,
    StrictInverse,
}

/// Whether a combo releases when any key or all keys come up
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, EnumString, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum KeyUpWhen {
    #[default]
    Any,
    All,
}

/// Timing options of a simultaneous trigger
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct SimultaneousOptions {
    pub detect_key_down_uninterruptedly: bool,
    pub key_down_order: KeyOrder,
    pub key_up_order: KeyOrder,
    pub key_up_when: KeyUpWhen,
}

impl SimultaneousOptions {
    /// Returns true if every option has its host default
    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }
}

/// Keys pressed together (order-insensitive unless options say otherwise).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Combo {
    keys: Vec<TriggerKey>,
    outputs: Vec<Output>,
    requirements: Vec<Requirement>,
    options: SimultaneousOptions,
    after_key_up: Vec<Output>,
}

impl Combo {
    pub fn new(keys: Vec<TriggerKey>, outputs: Vec<Output>) -> Self {
        Self {
            keys,
            outputs,
            requirements: Vec::new(),
            options: SimultaneousOptions::default(),
            after_key_up: Vec::new(),
        }
    }

    pub fn parse<K: AsRef<str>, S: AsRef<str>>(keys: &[K], to: &[S]) -> Result<Self, OutputParseError> {
        let keys = keys
            .iter()
            .map(|k| k.as_ref().parse())
            .collect::<Result<Vec<TriggerKey>, _>>()?;
        Ok(Self::new(keys, parse_outputs(to)?))
    }

    pub fn options(mut self, options: SimultaneousOptions) -> Self {
        self.options = options;
        self
    }

    /// Outputs sent when the combo keys are released
    pub fn after_key_up(mut self, outputs: Vec<Output>) -> Self {
        self.after_key_up = outputs;
        self
    }

    pub fn require(mut self, requirement: Requirement) -> Self {
        self.requirements.push(requirement);
        self
    }

    pub fn keys(&self) -> &[TriggerKey] {
        &self.keys
    }

    pub fn outputs(&self) -> &[Output] {
        &self.outputs
    }

    pub fn requirements(&self) -> &[Requirement] {
        &self.requirements
    }

    pub fn simultaneous_options(&self) -> &SimultaneousOptions {
        &self.options
    }

    pub fn after_key_up_outputs(&self) -> &[Output] {
        &self.after_key_up
    }

    /// The keys as a sorted set, for duplicate detection
    pub fn key_set(&self) -> Vec<TriggerKey> {
        let mut keys = self.keys.clone();
        keys.sort();
        keys.dedup();
        keys
    }
}

/// Keys pressed one after another within a timeout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sequence {
    keys: Vec<TriggerKey>,
    outputs: Vec<Output>,
    requirements: Vec<Requirement>,
    timeout_ms: u64,
}

impl Sequence {
    pub fn new(keys: Vec<TriggerKey>, outputs: Vec<Output>) -> Self {
        Self {
            keys,
            outputs,
            requirements: Vec::new(),
            timeout_ms: DEFAULT_SEQUENCE_TIMEOUT_MS,
        }
    }

    pub fn parse<K: AsRef<str>, S: AsRef<str>>(keys: &[K], to: &[S]) -> Result<Self, OutputParseError> {
        let keys = keys
            .iter()
            .map(|k| k.as_ref().parse())
            .collect::<Result<Vec<TriggerKey>, _>>()?;
        Ok(Self::new(keys, parse_outputs(to)?))
    }

    pub fn timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn require(mut self, requirement: Requirement) -> Self {
        self.requirements.push(requirement);
        self
    }

    pub fn keys(&self) -> &[TriggerKey] {
        &self.keys
    }

    pub fn outputs(&self) -> &[Output] {
        &self.outputs
    }

    pub fn requirements(&self) -> &[Requirement] {
        &self.requirements
    }

    pub fn timeout_ms(&self) -> u64 {
        self.timeout_ms
    }

    /// Keys joined for names and messages (`g+g`)
    pub fn label(&self) -> String {
        self.keys
            .iter()
            .map(|k| k.to_string())
            .collect::<Vec<_>>()
            .join("+")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Modifier;

    #[test]
    fn test_parse_key_output() {
        let output: Output = "Cmd-Shift-z".parse().unwrap();
        assert_eq!(
            output,
            Output::Key(KeyPress::with_modifiers("z", [Modifier::Command, Modifier::Shift]))
        );
    }

    #[test]
    fn test_parse_shell_output() {
        let output: Output = "Shell(open -a 'Activity Monitor')".parse().unwrap();
        assert_eq!(output, Output::shell("open -a 'Activity Monitor'"));

        let nested: Output = "Shell(echo $(date))".parse().unwrap();
        assert_eq!(nested, Output::shell("echo $(date)"));
    }

    #[test]
    fn test_parse_set_output() {
        assert_eq!("Set(mouse_mode=1)".parse::<Output>().unwrap(), Output::set("mouse_mode"));
        assert_eq!("Set(mouse_mode=0)".parse::<Output>().unwrap(), Output::unset("mouse_mode"));
    }

    #[test]
    fn test_parse_malformed_outputs() {
        assert!(matches!("Shell(".parse::<Output>(), Err(OutputParseError::Malformed(_))));
        assert!(matches!("Shell()".parse::<Output>(), Err(OutputParseError::Malformed(_))));
        assert!(matches!("Set(x)".parse::<Output>(), Err(OutputParseError::Malformed(_))));
        assert!(matches!("Set(x=2)".parse::<Output>(), Err(OutputParseError::Malformed(_))));
        assert!(matches!("Bogus-x".parse::<Output>(), Err(OutputParseError::Key(_))));
    }

    #[test]
    fn test_output_display() {
        assert_eq!(Output::set("a").to_string(), "Set(a=1)");
        assert_eq!(Output::shell("ls").to_string(), "Shell(ls)");
        assert_eq!(
            Output::macro_call("open", [("path", "/tmp")]).to_string(),
            "Macro(open)"
        );
    }

    #[test]
    fn test_mapping_parse() {
        let mapping = Mapping::parse("h", &["left_arrow"]).unwrap();
        assert_eq!(mapping.trigger(), &TriggerKey::new("h"));
        assert_eq!(mapping.outputs(), &[Output::Key(KeyPress::new("left_arrow"))]);
        assert!(!mapping.is_conditional());
    }

    #[test]
    fn test_mapping_conditional() {
        let mapping = Mapping::parse("h", &["left_arrow"])
            .unwrap()
            .require(Requirement::app_in(["com.apple.Terminal"]));
        assert!(mapping.is_conditional());
    }

    #[test]
    fn test_combo_key_set_ignores_order() {
        let a = Combo::parse(&["j", "k"], &["escape"]).unwrap();
        let b = Combo::parse(&["k", "j"], &["escape"]).unwrap();
        assert_eq!(a.key_set(), b.key_set());
    }

    #[test]
    fn test_key_order_from_str() {
        assert_eq!("strict_inverse".parse::<KeyOrder>().unwrap(), KeyOrder::StrictInverse);
        assert_eq!(KeyOrder::Strict.to_string(), "strict");
        assert_eq!("all".parse::<KeyUpWhen>().unwrap(), KeyUpWhen::All);
        assert!(SimultaneousOptions::default().is_default());
    }

    #[test]
    fn test_sequence_defaults() {
        let sequence = Sequence::parse(&["g", "g"], &["home"]).unwrap();
        assert_eq!(sequence.timeout_ms(), DEFAULT_SEQUENCE_TIMEOUT_MS);
        assert_eq!(sequence.label(), "g+g");
        assert_eq!(sequence.timeout(300).timeout_ms(), 300);
    }
}
