// Keystack Config Parser - TOML with Serde
// Reads a declaration file into profiles, layers and templates

use std::fs;
use std::path::Path;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::Deserialize;

use crate::compile::CompileError;
use crate::mapping::{
    parse_outputs, KeyOrder, KeyUpWhen, Output, OutputParseError, SimultaneousOptions, DEFAULT_SEQUENCE_TIMEOUT_MS,
};
use crate::presets::{self, Preset};
use crate::template::TemplateRegistry;
use crate::{
    Combo, Compiler, Declaration, Device, Document, GlobalSettings, LayerBuilder, Mapping, Modifier, ProfileBuilder,
    ProfileDecl, Requirement, RuleGroupDecl, Sequence,
};

/// Configuration parser errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(String),

    #[error("Invalid output: {0}")]
    InvalidOutput(#[from] OutputParseError),

    #[error("Invalid modifier: {0}")]
    InvalidModifier(String),

    #[error("Unknown preset '{0}'")]
    InvalidPreset(String),

    #[error("Layer '{0}' must set exactly one of `trigger` and `stack`")]
    AmbiguousActivation(String),

    #[error(transparent)]
    Declaration(#[from] CompileError),
}

/// Root of the declaration file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigToml {
    #[serde(default)]
    pub global: GlobalSettings,

    /// Extra macro templates, name to command
    #[serde(default)]
    pub templates: IndexMap<String, String>,

    #[serde(default)]
    pub profiles: Vec<ProfileToml>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfileToml {
    pub name: String,

    #[serde(default = "default_true")]
    pub selected: bool,

    #[serde(default)]
    pub country_code: u32,

    /// Complex modification parameters, e.g. `basic.to_if_alone_timeout_milliseconds`
    #[serde(default)]
    pub parameters: IndexMap<String, i64>,

    #[serde(default)]
    pub devices: Vec<Device>,

    /// Caps lock style hyper key, added before the other standalone groups
    pub hyper_key: Option<HyperKeyToml>,

    pub app_switcher: Option<AppSwitcherToml>,

    #[serde(default)]
    pub layers: Vec<LayerToml>,

    #[serde(default)]
    pub groups: Vec<GroupToml>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HyperKeyToml {
    #[serde(default = "default_hyper_from")]
    pub from: String,
    #[serde(default = "default_hyper_to")]
    pub to: String,
    #[serde(default = "default_hyper_alone")]
    pub alone: Option<String>,
}

fn default_hyper_from() -> String {
    "caps_lock".to_string()
}

fn default_hyper_to() -> String {
    "right_command".to_string()
}

fn default_hyper_alone() -> Option<String> {
    Some("escape".to_string())
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppSwitcherToml {
    #[serde(default = "default_tab")]
    pub from: String,
    #[serde(default = "default_tab")]
    pub to: String,
    #[serde(default)]
    pub modifiers: Vec<String>,
}

fn default_tab() -> String {
    "tab".to_string()
}

/// One expression or a list of them
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    Single(String),
    Multiple(Vec<String>),
}

impl OneOrMany {
    pub fn as_vec(&self) -> Vec<&str> {
        match self {
            OneOrMany::Single(s) => vec![s.as_str()],
            OneOrMany::Multiple(list) => list.iter().map(String::as_str).collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LayerToml {
    pub name: String,

    /// Activation key, or keys held together
    pub trigger: Option<OneOrMany>,

    /// Parent layers whose activation keys are held together
    pub stack: Option<Vec<String>>,

    pub alone: Option<String>,

    #[serde(default)]
    pub when_app: Vec<String>,

    #[serde(default)]
    pub unless_app: Vec<String>,

    pub when_variable: Option<String>,

    pub unless_variable: Option<String>,

    pub sequence_timeout_ms: Option<u64>,

    #[serde(default)]
    pub presets: Vec<String>,

    #[serde(default)]
    pub map: IndexMap<String, OneOrMany>,

    #[serde(default)]
    pub combos: Vec<ComboToml>,

    #[serde(default)]
    pub sequences: Vec<SequenceToml>,

    #[serde(default)]
    pub macros: Vec<MacroToml>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ComboToml {
    pub keys: Vec<String>,
    pub to: OneOrMany,
    #[serde(default)]
    pub detect_key_down_uninterruptedly: bool,
    #[serde(default)]
    pub key_down_order: KeyOrder,
    #[serde(default)]
    pub key_up_order: KeyOrder,
    #[serde(default)]
    pub key_up_when: KeyUpWhen,
    pub after_key_up: Option<OneOrMany>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SequenceToml {
    pub keys: Vec<String>,
    pub to: OneOrMany,
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MacroToml {
    pub key: String,
    pub template: String,
    #[serde(default)]
    pub params: IndexMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GroupToml {
    pub name: String,
    #[serde(default)]
    pub mappings: Vec<GroupMappingToml>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GroupMappingToml {
    pub from: String,
    pub to: OneOrMany,
    pub alone: Option<OneOrMany>,
    pub held: Option<OneOrMany>,
    #[serde(default)]
    pub when_app: Vec<String>,
    #[serde(default)]
    pub unless_app: Vec<String>,
    pub when_variable: Option<String>,
    pub unless_variable: Option<String>,
}

/// A parsed declaration file, ready to compile
#[derive(Debug, Clone)]
pub struct Config {
    pub declaration: Declaration,
    pub templates: TemplateRegistry,
}

impl Config {
    /// Parse a TOML declaration file
    pub fn from_toml_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        log::debug!("reading declarations from {}", path.display());
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse a declaration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let toml_config: ConfigToml = toml::from_str(content).map_err(|e| ConfigError::TomlParse(e.to_string()))?;
        toml_config.to_config()
    }

    /// Compile with the built-in templates plus the file's own
    pub fn compile(&self) -> Result<Document, CompileError> {
        Compiler::new(self.templates.clone()).compile(&self.declaration)
    }
}

impl ConfigToml {
    fn to_config(&self) -> Result<Config, ConfigError> {
        let mut templates = TemplateRegistry::with_builtins();
        for (name, source) in &self.templates {
            if templates.contains(name) {
                log::warn!("template '{}' overrides a built-in template", name);
            }
            templates.register(name.clone(), source);
        }

        let mut declaration = Declaration::new().global(self.global);
        for profile in &self.profiles {
            declaration = declaration.profile(profile.to_decl()?);
        }

        log::debug!(
            "parsed {} profiles, {} templates",
            declaration.profiles.len(),
            templates.names().count()
        );
        Ok(Config { declaration, templates })
    }
}

fn parse_modifiers(names: &[String]) -> Result<Vec<Modifier>, ConfigError> {
    names
        .iter()
        .map(|name| Modifier::from_alias(name).ok_or_else(|| ConfigError::InvalidModifier(name.clone())))
        .collect()
}

impl ProfileToml {
    fn to_decl(&self) -> Result<ProfileDecl, ConfigError> {
        let mut builder = ProfileBuilder::new(&self.name)
            .selected(self.selected)
            .country_code(self.country_code);

        for (name, value) in &self.parameters {
            builder = builder.parameter(name.clone(), *value);
        }
        for device in &self.devices {
            builder = builder.device(device.clone());
        }
        for layer in &self.layers {
            builder = builder.layer_with(layer.to_builder()?);
        }

        if let Some(hyper) = &self.hyper_key {
            builder = builder.group(presets::hyper_key(&hyper.from, &hyper.to, hyper.alone.as_deref())?);
        }
        if let Some(switcher) = &self.app_switcher {
            let modifiers = parse_modifiers(&switcher.modifiers)?;
            builder = builder.group(presets::app_switcher(&switcher.from, &switcher.to, &modifiers)?);
        }
        for group in &self.groups {
            builder = builder.group(group.to_decl()?);
        }

        Ok(builder.build()?)
    }
}

impl LayerToml {
    fn to_builder(&self) -> Result<LayerBuilder, ConfigError> {
        let mut builder = LayerBuilder::new(&self.name);

        builder = match (&self.trigger, &self.stack) {
            (Some(trigger), None) => builder.triggers(&trigger.as_vec()),
            (None, Some(parents)) => builder.stacked_on(parents.iter().cloned()),
            _ => return Err(ConfigError::AmbiguousActivation(self.name.clone())),
        };

        if let Some(alone) = &self.alone {
            builder = builder.alone(alone);
        }
        if !self.when_app.is_empty() {
            builder = builder.when_app(self.when_app.iter().cloned());
        }
        if !self.unless_app.is_empty() {
            builder = builder.unless_app(self.unless_app.iter().cloned());
        }
        if let Some(name) = &self.when_variable {
            builder = builder.when_variable(name.clone());
        }
        if let Some(name) = &self.unless_variable {
            builder = builder.unless_variable(name.clone());
        }
        if let Some(timeout) = self.sequence_timeout_ms {
            builder = builder.sequence_timeout(timeout);
        }

        for name in &self.presets {
            let preset = Preset::from_str(name).map_err(|_| ConfigError::InvalidPreset(name.clone()))?;
            builder = preset.apply(builder);
        }

        for (from, to) in &self.map {
            builder = builder.map_all(from, &to.as_vec());
        }

        for combo in &self.combos {
            let options = SimultaneousOptions {
                detect_key_down_uninterruptedly: combo.detect_key_down_uninterruptedly,
                key_down_order: combo.key_down_order,
                key_up_order: combo.key_up_order,
                key_up_when: combo.key_up_when,
            };
            let mut parsed = Combo::parse(&combo.keys, &combo.to.as_vec())?.options(options);
            if let Some(after) = &combo.after_key_up {
                parsed = parsed.after_key_up(parse_outputs(&after.as_vec())?);
            }
            builder = builder.combo_with(parsed);
        }

        let default_timeout = self.sequence_timeout_ms.unwrap_or(DEFAULT_SEQUENCE_TIMEOUT_MS);
        for sequence in &self.sequences {
            let timeout = sequence.timeout_ms.unwrap_or(default_timeout);
            let parsed = Sequence::parse(&sequence.keys, &sequence.to.as_vec())?.timeout(timeout);
            builder = builder.sequence_with(parsed);
        }

        for entry in &self.macros {
            builder = builder.macro_key(&entry.key, &entry.template, entry.params.iter());
        }

        Ok(builder)
    }
}

impl GroupToml {
    fn to_decl(&self) -> Result<RuleGroupDecl, ConfigError> {
        let mut group = RuleGroupDecl::new(&self.name);
        for entry in &self.mappings {
            group = group.mapping(entry.to_mapping()?);
        }
        Ok(group)
    }
}

impl GroupMappingToml {
    fn to_mapping(&self) -> Result<Mapping, ConfigError> {
        let mut mapping = Mapping::parse(&self.from, &self.to.as_vec())?;
        if let Some(alone) = &self.alone {
            mapping = mapping.alone(parse_outputs(&alone.as_vec())?);
        }
        if let Some(held) = &self.held {
            mapping = mapping.held(parse_outputs(&held.as_vec())?);
        }
        if !self.when_app.is_empty() {
            mapping = mapping.require(Requirement::app_in(self.when_app.iter().cloned()));
        }
        if !self.unless_app.is_empty() {
            mapping = mapping.require(Requirement::app_not_in(self.unless_app.iter().cloned()));
        }
        if let Some(name) = &self.when_variable {
            mapping = mapping.require(Requirement::flag(name.clone(), true));
        }
        if let Some(name) = &self.unless_variable {
            mapping = mapping.require(Requirement::flag(name.clone(), false));
        }
        Ok(mapping)
    }
}

/// Parse a single output expression outside of any layer
pub fn parse_output(expression: &str) -> Result<Output, ConfigError> {
    Ok(expression.parse()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Action, KeyPress, Trigger};

    #[test]
    fn test_minimal_config() {
        let toml = r#"
            [[profiles]]
            name = "Default"

            [[profiles.layers]]
            name = "nav"
            trigger = "caps_lock"
            alone = "escape"

            [profiles.layers.map]
            h = "left_arrow"
            w = ["Opt-right_arrow", "Shift-Opt-left_arrow"]
        "#;

        let config = Config::from_toml(toml).unwrap();
        let profile = &config.declaration.profiles[0];
        assert_eq!(profile.name(), "Default");
        assert!(profile.is_selected());

        let layer = &profile.layers()[0];
        assert_eq!(layer.name(), "nav");
        assert_eq!(layer.alone(), Some(&KeyPress::new("escape")));
        assert_eq!(layer.mappings().len(), 2);
        assert_eq!(layer.mappings()[1].outputs().len(), 2);
    }

    #[test]
    fn test_global_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.declaration.global, GlobalSettings::default());
        assert!(config.declaration.profiles.is_empty());
        assert!(config.templates.contains("open"));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let toml = r#"
            [[profiles]]
            name = "Default"
            colour = "blue"
        "#;
        assert!(matches!(Config::from_toml(toml), Err(ConfigError::TomlParse(_))));
    }

    #[test]
    fn test_trigger_and_stack_conflict() {
        let toml = r#"
            [[profiles]]
            name = "Default"

            [[profiles.layers]]
            name = "both"
            trigger = "a"
            stack = ["x", "y"]
        "#;
        assert!(matches!(
            Config::from_toml(toml),
            Err(ConfigError::AmbiguousActivation(name)) if name == "both"
        ));
    }

    #[test]
    fn test_unknown_preset() {
        let toml = r#"
            [[profiles]]
            name = "Default"

            [[profiles.layers]]
            name = "nav"
            trigger = "caps_lock"
            presets = ["emacs"]
        "#;
        assert!(matches!(Config::from_toml(toml), Err(ConfigError::InvalidPreset(p)) if p == "emacs"));
    }

    #[test]
    fn test_invalid_key_reports_layer() {
        let toml = r#"
            [[profiles]]
            name = "Default"

            [[profiles.layers]]
            name = "nav"
            trigger = "caps_lock"

            [profiles.layers.map]
            h = "Hyper-left_arrow"
        "#;
        assert!(matches!(
            Config::from_toml(toml),
            Err(ConfigError::Declaration(CompileError::InvalidExpression { layer, .. })) if layer == "nav"
        ));
    }

    #[test]
    fn test_combo_options() {
        let toml = r#"
            [[profiles]]
            name = "Default"

            [[profiles.layers]]
            name = "nav"
            trigger = "caps_lock"

            [[profiles.layers.combos]]
            keys = ["j", "k"]
            to = "escape"
            key_down_order = "strict"
            key_up_when = "all"
        "#;
        let config = Config::from_toml(toml).unwrap();
        let combo = &config.declaration.profiles[0].layers()[0].combos()[0];
        assert_eq!(combo.simultaneous_options().key_down_order, KeyOrder::Strict);
        assert_eq!(combo.simultaneous_options().key_up_when, KeyUpWhen::All);
        assert_eq!(combo.simultaneous_options().key_up_order, KeyOrder::Insensitive);
    }

    #[test]
    fn test_sequence_timeouts() {
        let toml = r#"
            [[profiles]]
            name = "Default"

            [[profiles.layers]]
            name = "nav"
            trigger = "caps_lock"
            sequence_timeout_ms = 300

            [[profiles.layers.sequences]]
            keys = ["g", "g"]
            to = "home"

            [[profiles.layers.sequences]]
            keys = ["d", "d"]
            to = "end"
            timeout_ms = 800
        "#;
        let config = Config::from_toml(toml).unwrap();
        let sequences = config.declaration.profiles[0].layers()[0].sequences();
        assert_eq!(sequences[0].timeout_ms(), 300);
        assert_eq!(sequences[1].timeout_ms(), 800);
    }

    #[test]
    fn test_hyper_key_defaults() {
        let toml = r#"
            [[profiles]]
            name = "Default"

            [profiles.hyper_key]

            [[profiles.groups]]
            name = "Escape"

            [[profiles.groups.mappings]]
            from = "Ctrl-open_bracket"
            to = "escape"
            unless_app = ["com.apple.Terminal"]
        "#;
        let config = Config::from_toml(toml).unwrap();
        let groups = config.declaration.profiles[0].groups();
        assert_eq!(groups[0], presets::default_hyper_key());
        assert_eq!(groups[1].name(), "Escape");
        assert!(groups[1].mappings()[0].is_conditional());
    }

    #[test]
    fn test_app_switcher_bad_modifier() {
        let toml = r#"
            [[profiles]]
            name = "Default"

            [profiles.app_switcher]
            modifiers = ["Hyper"]
        "#;
        assert!(matches!(Config::from_toml(toml), Err(ConfigError::InvalidModifier(m)) if m == "Hyper"));
    }

    #[test]
    fn test_custom_template_compiles() {
        let toml = r#"
            [templates]
            notify = "osascript -e 'display notification \"{message}\"'"

            [[profiles]]
            name = "Default"

            [[profiles.layers]]
            name = "apps"
            trigger = "right_option"

            [[profiles.layers.macros]]
            key = "n"
            template = "notify"
            params = { message = "hello" }
        "#;
        let config = Config::from_toml(toml).unwrap();
        let document = config.compile().unwrap();
        let body = document.profiles()[0].group("apps").unwrap();
        let rule = &body.rules()[0];
        assert!(matches!(rule.trigger(), Trigger::Key(k) if k.key().name() == "n"));
        assert_eq!(
            rule.actions(),
            &[Action::Shell("osascript -e 'display notification \"hello\"'".to_string())]
        );
    }

    #[test]
    fn test_parse_output() {
        assert_eq!(parse_output("Shell(open -a Mail)").unwrap(), Output::shell("open -a Mail"));
        assert!(matches!(parse_output("Set(x=2)"), Err(ConfigError::InvalidOutput(_))));
    }
}
