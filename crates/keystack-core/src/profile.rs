// Keystack Profiles
// Profile and whole-file declarations: layers, standalone groups, engine settings

use indexmap::IndexMap;
use serde::Deserialize;

use crate::compile::CompileError;
use crate::{Layer, LayerBuilder, Mapping};

/// Host engine settings outside any profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct GlobalSettings {
    pub check_for_updates_on_startup: bool,
    pub show_in_menu_bar: bool,
    pub show_profile_name_in_menu_bar: bool,
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            check_for_updates_on_startup: true,
            show_in_menu_bar: true,
            show_profile_name_in_menu_bar: false,
        }
    }
}

/// Per-device settings of a profile
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Device {
    pub vendor_id: u32,
    pub product_id: u32,
    #[serde(default = "default_true")]
    pub is_keyboard: bool,
    #[serde(default)]
    pub is_pointing_device: bool,
    #[serde(default)]
    pub disable_built_in_keyboard_if_exists: bool,
}

fn default_true() -> bool {
    true
}

impl Device {
    /// A keyboard identified by vendor and product id
    pub fn keyboard(vendor_id: u32, product_id: u32) -> Self {
        Self {
            vendor_id,
            product_id,
            is_keyboard: true,
            is_pointing_device: false,
            disable_built_in_keyboard_if_exists: false,
        }
    }

    pub fn disable_built_in_keyboard(mut self) -> Self {
        self.disable_built_in_keyboard_if_exists = true;
        self
    }
}

/// A named group of mappings that apply regardless of any layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleGroupDecl {
    name: String,
    mappings: Vec<Mapping>,
}

impl RuleGroupDecl {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mappings: Vec::new(),
        }
    }

    pub fn mapping(mut self, mapping: Mapping) -> Self {
        self.mappings.push(mapping);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mappings(&self) -> &[Mapping] {
        &self.mappings
    }
}

/// One profile's declarations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileDecl {
    name: String,
    selected: bool,
    parameters: IndexMap<String, i64>,
    devices: Vec<Device>,
    country_code: u32,
    layers: Vec<Layer>,
    groups: Vec<RuleGroupDecl>,
}

impl ProfileDecl {
    pub fn builder(name: impl Into<String>) -> ProfileBuilder {
        ProfileBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_selected(&self) -> bool {
        self.selected
    }

    /// Engine parameters such as `basic.to_if_alone_timeout_milliseconds`
    pub fn parameters(&self) -> &IndexMap<String, i64> {
        &self.parameters
    }

    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    /// Virtual keyboard country code
    pub fn country_code(&self) -> u32 {
        self.country_code
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn groups(&self) -> &[RuleGroupDecl] {
        &self.groups
    }
}

/// Fluent builder for [`ProfileDecl`]
#[derive(Debug, Clone)]
pub struct ProfileBuilder {
    profile: ProfileDecl,
    error: Option<CompileError>,
}

impl ProfileBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            profile: ProfileDecl {
                name: name.into(),
                selected: true,
                parameters: IndexMap::new(),
                devices: Vec::new(),
                country_code: 0,
                layers: Vec::new(),
                groups: Vec::new(),
            },
            error: None,
        }
    }

    pub fn selected(mut self, selected: bool) -> Self {
        self.profile.selected = selected;
        self
    }

    pub fn parameter(mut self, name: impl Into<String>, value: i64) -> Self {
        self.profile.parameters.insert(name.into(), value);
        self
    }

    pub fn device(mut self, device: Device) -> Self {
        self.profile.devices.push(device);
        self
    }

    pub fn country_code(mut self, country_code: u32) -> Self {
        self.profile.country_code = country_code;
        self
    }

    pub fn layer(mut self, layer: Layer) -> Self {
        self.profile.layers.push(layer);
        self
    }

    /// Build `builder` and add the layer; a build error is kept and
    /// returned by [`ProfileBuilder::build`].
    pub fn layer_with(mut self, builder: LayerBuilder) -> Self {
        match builder.build() {
            Ok(layer) => self.profile.layers.push(layer),
            Err(e) => {
                if self.error.is_none() {
                    self.error = Some(e);
                }
            }
        }
        self
    }

    pub fn group(mut self, group: RuleGroupDecl) -> Self {
        self.profile.groups.push(group);
        self
    }

    pub fn build(self) -> Result<ProfileDecl, CompileError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.profile),
        }
    }
}

/// Everything the compiler turns into one document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Declaration {
    pub global: GlobalSettings,
    pub profiles: Vec<ProfileDecl>,
}

impl Declaration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn profile(mut self, profile: ProfileDecl) -> Self {
        self.profiles.push(profile);
        self
    }

    pub fn global(mut self, global: GlobalSettings) -> Self {
        self.global = global;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_defaults() {
        let profile = ProfileBuilder::new("Default").build().unwrap();
        assert_eq!(profile.name(), "Default");
        assert!(profile.is_selected());
        assert_eq!(profile.country_code(), 0);
        assert!(profile.layers().is_empty());
    }

    #[test]
    fn test_layer_error_surfaces_at_build() {
        let result = ProfileBuilder::new("Default")
            .layer_with(LayerBuilder::new("nav"))
            .build();
        assert!(matches!(result, Err(CompileError::InvalidLayer { .. })));
    }

    #[test]
    fn test_parameters_keep_order() {
        let profile = ProfileBuilder::new("Default")
            .parameter("basic.to_if_alone_timeout_milliseconds", 250)
            .parameter("basic.simultaneous_threshold_milliseconds", 50)
            .build()
            .unwrap();
        let names: Vec<&str> = profile.parameters().keys().map(String::as_str).collect();
        assert_eq!(
            names,
            vec![
                "basic.to_if_alone_timeout_milliseconds",
                "basic.simultaneous_threshold_milliseconds"
            ]
        );
    }

    #[test]
    fn test_device_defaults_from_toml() {
        let device: Device = toml::from_str("vendor_id = 1452\nproduct_id = 834").unwrap();
        assert_eq!(device, Device::keyboard(1452, 834));
    }

    #[test]
    fn test_global_defaults() {
        let global = GlobalSettings::default();
        assert!(global.check_for_updates_on_startup);
        assert!(global.show_in_menu_bar);
        assert!(!global.show_profile_name_in_menu_bar);
    }
}
