// Keystack Core Library
// Compiles layer, combo, sequence and macro declarations into flag-driven rules

pub mod action;
pub mod analysis;
pub mod compile;
pub mod condition;
pub mod config;
pub mod document;
pub mod flag;
pub mod key;
pub mod layer;
pub mod mapping;
pub mod modifier;
pub mod presets;
pub mod profile;
pub mod render;
pub mod rule;
pub mod template;

pub use action::{Action, DelayedAction};
pub use analysis::{coverage, CoverageReport, RuleRef};
pub use compile::{compile, CompileError, Compiler};
pub use condition::{Condition, ConditionBuilder, Conditions, Requirement};
pub use config::{parse_key_string, Config, ConfigError, KeyParseError};
pub use document::{Document, Profile};
pub use flag::{FlagNamespace, StateFlag};
pub use key::{keys, KeyCode, KeyPress, TriggerKey};
pub use layer::{params, Activation, Layer, LayerBuilder};
pub use mapping::{Combo, KeyOrder, KeyUpWhen, Mapping, Output, OutputParseError, Sequence, SimultaneousOptions};
pub use modifier::Modifier;
pub use presets::{apply_presets, Preset};
pub use profile::{Declaration, Device, GlobalSettings, ProfileBuilder, ProfileDecl, RuleGroupDecl};
pub use rule::{Rule, RuleGroup, Trigger};
pub use template::{TemplateError, TemplateRegistry};
