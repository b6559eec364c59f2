// Keystack Presets
// Reusable bundles of mappings for layers and standalone groups

use strum_macros::{Display, EnumIter, EnumString};

use crate::mapping::{Output, OutputParseError};
use crate::key::keys;
use crate::{KeyPress, LayerBuilder, Mapping, Modifier, RuleGroupDecl, TriggerKey};

/// Named layer presets, as written in a declaration file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum Preset {
    /// h/j/k/l arrows, u/d page up/down, 0/4 home/end
    VimNavigation,
    /// m, s, c for mission control, spotlight, control center
    SystemShortcuts,
}

impl Preset {
    pub fn apply(self, builder: LayerBuilder) -> LayerBuilder {
        match self {
            Preset::VimNavigation => vim_navigation(builder),
            Preset::SystemShortcuts => system_shortcuts(builder),
        }
    }
}

pub fn vim_navigation(builder: LayerBuilder) -> LayerBuilder {
    builder
        .map("h", keys::LEFT)
        .map("j", keys::DOWN)
        .map("k", keys::UP)
        .map("l", keys::RIGHT)
        .map("u", keys::PAGE_UP)
        .map("d", keys::PAGE_DOWN)
        .map("0", keys::HOME)
        // shift-4 is `$`; optional modifiers let 4 stand in for it
        .map("4", keys::END)
}

pub fn system_shortcuts(builder: LayerBuilder) -> LayerBuilder {
    builder
        .map("m", "mission_control")
        .map("s", "spotlight")
        .map("c", "control_center")
}

/// Apply presets to a layer builder in order
pub fn apply_presets(builder: LayerBuilder, presets: &[Preset]) -> LayerBuilder {
    presets.iter().fold(builder, |builder, preset| preset.apply(builder))
}

/// A standalone group turning `from` into `to` while held and `alone` when
/// tapped on its own.
pub fn hyper_key(from: &str, to: &str, alone: Option<&str>) -> Result<RuleGroupDecl, OutputParseError> {
    let mut mapping = Mapping::parse(from, &[to])?;
    if let Some(alone) = alone {
        mapping = mapping.alone(vec![alone.parse::<Output>()?]);
    }
    Ok(RuleGroupDecl::new(format!("Hyper Key: {} to {}", from, to)).mapping(mapping))
}

/// The usual caps lock hyper key: right command when held, escape alone
pub fn default_hyper_key() -> RuleGroupDecl {
    let mapping = Mapping::new(TriggerKey::new(keys::CAPS), vec![Output::Key(KeyPress::new(keys::R_CMD))])
        .alone(vec![Output::Key(KeyPress::new(keys::ESC))]);
    RuleGroupDecl::new("Hyper Key: caps_lock to right_command").mapping(mapping)
}

/// Remap `modifiers-from` to `to`, left command + tab by default
pub fn app_switcher(from: &str, to: &str, modifiers: &[Modifier]) -> Result<RuleGroupDecl, OutputParseError> {
    let modifiers: &[Modifier] = if modifiers.is_empty() {
        &[Modifier::LeftCommand]
    } else {
        modifiers
    };
    let trigger = TriggerKey::with_modifiers(from, modifiers.iter().copied());
    let output: Output = to.parse()?;
    Ok(RuleGroupDecl::new("App Switcher Enhancement").mapping(Mapping::new(trigger, vec![output])))
}
