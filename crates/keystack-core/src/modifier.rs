// Keystack Modifier System
// Host modifier names (command, option, control, shift, ...) and their aliases

use strum_macros::{AsRefStr, Display, EnumIter, EnumString, IntoStaticStr};

/// Alias table: (alias, modifier). Aliases are case-sensitive, like the
/// combo strings users write in their declarations ("Cmd-h", "LOpt-j").
const ALIASES: &[(&str, Modifier)] = &[
    ("Cmd", Modifier::Command),
    ("Command", Modifier::Command),
    ("Super", Modifier::Command),
    ("Win", Modifier::Command),
    ("Meta", Modifier::Command),
    ("LCmd", Modifier::LeftCommand),
    ("LCommand", Modifier::LeftCommand),
    ("LSuper", Modifier::LeftCommand),
    ("RCmd", Modifier::RightCommand),
    ("RCommand", Modifier::RightCommand),
    ("RSuper", Modifier::RightCommand),
    ("Opt", Modifier::Option),
    ("Option", Modifier::Option),
    ("Alt", Modifier::Option),
    ("A", Modifier::Option),
    ("LOpt", Modifier::LeftOption),
    ("LOption", Modifier::LeftOption),
    ("LAlt", Modifier::LeftOption),
    ("LA", Modifier::LeftOption),
    ("ROpt", Modifier::RightOption),
    ("ROption", Modifier::RightOption),
    ("RAlt", Modifier::RightOption),
    ("RA", Modifier::RightOption),
    ("Ctrl", Modifier::Control),
    ("C", Modifier::Control),
    ("LCtrl", Modifier::LeftControl),
    ("LC", Modifier::LeftControl),
    ("RCtrl", Modifier::RightControl),
    ("RC", Modifier::RightControl),
    ("Shift", Modifier::Shift),
    ("LShift", Modifier::LeftShift),
    ("RShift", Modifier::RightShift),
    ("Fn", Modifier::Fn),
    ("Caps", Modifier::CapsLock),
    ("Any", Modifier::Any),
];

/// A modifier as the host engine names it.
///
/// `Display` / `FromStr` use the host spelling (`left_command`, `option`,
/// `any`); [`Modifier::from_alias`] additionally accepts the short aliases.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    EnumString,
    AsRefStr,
    IntoStaticStr,
    EnumIter,
)]
#[strum(serialize_all = "snake_case")]
pub enum Modifier {
    Command,
    LeftCommand,
    RightCommand,
    Option,
    LeftOption,
    RightOption,
    Control,
    LeftControl,
    RightControl,
    Shift,
    LeftShift,
    RightShift,
    Fn,
    CapsLock,
    Any,
}

impl Modifier {
    /// Look up a modifier by alias ("Cmd", "LOpt") or host name ("left_option").
    pub fn from_alias(alias: &str) -> Option<Self> {
        ALIASES
            .iter()
            .find(|(name, _)| *name == alias)
            .map(|(_, modifier)| *modifier)
            .or_else(|| alias.parse().ok())
    }

    /// The shortest alias that resolves to this modifier, if any.
    pub fn primary_alias(self) -> Option<&'static str> {
        ALIASES
            .iter()
            .filter(|(_, modifier)| *modifier == self)
            .map(|(name, _)| *name)
            .min_by_key(|name| name.len())
    }

    /// Returns true for side-specific modifiers (left_/right_ variants)
    pub fn is_specific(self) -> bool {
        matches!(
            self,
            Modifier::LeftCommand
                | Modifier::RightCommand
                | Modifier::LeftOption
                | Modifier::RightOption
                | Modifier::LeftControl
                | Modifier::RightControl
                | Modifier::LeftShift
                | Modifier::RightShift
        )
    }

    /// Host name of this modifier
    pub fn name(self) -> &'static str {
        self.into()
    }
}
