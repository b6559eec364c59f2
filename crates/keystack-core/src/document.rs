// Keystack Document
// The compiled output: profiles of ordered rule groups plus the flag names

use indexmap::IndexMap;

use crate::profile::{Device, GlobalSettings};
use crate::{FlagNamespace, Rule, RuleGroup, StateFlag};

/// A compiled profile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    name: String,
    selected: bool,
    parameters: IndexMap<String, i64>,
    devices: Vec<Device>,
    country_code: u32,
    groups: Vec<RuleGroup>,
}

impl Profile {
    pub(crate) fn new(
        name: String,
        selected: bool,
        parameters: IndexMap<String, i64>,
        devices: Vec<Device>,
        country_code: u32,
        groups: Vec<RuleGroup>,
    ) -> Self {
        Self {
            name,
            selected,
            parameters,
            devices,
            country_code,
            groups,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_selected(&self) -> bool {
        self.selected
    }

    pub fn parameters(&self) -> &IndexMap<String, i64> {
        &self.parameters
    }

    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    pub fn country_code(&self) -> u32 {
        self.country_code
    }

    pub fn groups(&self) -> &[RuleGroup] {
        &self.groups
    }

    pub fn group(&self, name: &str) -> Option<&RuleGroup> {
        self.groups.iter().find(|g| g.name() == name)
    }

    /// Every rule of the profile, in evaluation order
    pub fn rules(&self) -> impl Iterator<Item = &Rule> + '_ {
        self.groups.iter().flat_map(|g| g.rules().iter())
    }
}

/// Compiled, ordered rule document.
///
/// Two compilations of the same declaration compare equal and render to
/// identical JSON.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    global: GlobalSettings,
    profiles: Vec<Profile>,
    flags: FlagNamespace,
}

impl Document {
    pub(crate) fn new(global: GlobalSettings, profiles: Vec<Profile>, flags: FlagNamespace) -> Self {
        Self {
            global,
            profiles,
            flags,
        }
    }

    pub fn global(&self) -> &GlobalSettings {
        &self.global
    }

    pub fn profiles(&self) -> &[Profile] {
        &self.profiles
    }

    pub fn profile(&self, name: &str) -> Option<&Profile> {
        self.profiles.iter().find(|p| p.name() == name)
    }

    /// Names of every flag the document refers to
    pub fn flags(&self) -> &FlagNamespace {
        &self.flags
    }

    pub fn flag_name(&self, flag: StateFlag) -> &str {
        self.flags.name(flag)
    }

    /// Total rule count across profiles
    pub fn rule_count(&self) -> usize {
        self.profiles.iter().map(|p| p.rules().count()).sum()
    }
}
