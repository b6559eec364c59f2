// Keystack Renderer
// Document to the host engine's JSON configuration shape

use serde::{Serialize, Serializer};
use serde_json::{json, Map, Value};

use crate::document::Profile;
use crate::mapping::{KeyOrder, KeyUpWhen, SimultaneousOptions};
use crate::profile::Device;
use crate::{Action, Condition, Conditions, Document, FlagNamespace, Modifier, Rule, Trigger, TriggerKey};

/// Host parameter carrying a rule's delayed-action timeout
pub const DELAY_PARAMETER: &str = "basic.to_delayed_action_delay_milliseconds";

fn modifier_names(modifiers: &[Modifier]) -> Vec<&'static str> {
    modifiers.iter().map(|m| m.name()).collect()
}

fn from_modifiers(mandatory: &[Modifier], optional: &[Modifier]) -> Option<Value> {
    if mandatory.is_empty() && optional.is_empty() {
        return None;
    }
    let mut modifiers = Map::new();
    if !mandatory.is_empty() {
        modifiers.insert("mandatory".into(), json!(modifier_names(mandatory)));
    }
    if !optional.is_empty() {
        modifiers.insert("optional".into(), json!(modifier_names(optional)));
    }
    Some(Value::Object(modifiers))
}

fn simultaneous_options(options: &SimultaneousOptions) -> Option<Value> {
    let mut map = Map::new();
    if options.detect_key_down_uninterruptedly {
        map.insert("detect_key_down_uninterruptedly".into(), json!(true));
    }
    if options.key_down_order != KeyOrder::Insensitive {
        map.insert("key_down_order".into(), json!(options.key_down_order.to_string()));
    }
    if options.key_up_order != KeyOrder::Insensitive {
        map.insert("key_up_order".into(), json!(options.key_up_order.to_string()));
    }
    if options.key_up_when != KeyUpWhen::Any {
        map.insert("key_up_when".into(), json!(options.key_up_when.to_string()));
    }
    (!map.is_empty()).then_some(Value::Object(map))
}

fn sorted_union<'a>(keys: &'a [TriggerKey], pick: impl Fn(&'a TriggerKey) -> &'a [Modifier]) -> Vec<Modifier> {
    let mut all: Vec<Modifier> = keys.iter().flat_map(|k| pick(k).iter().copied()).collect();
    all.sort();
    all.dedup();
    all
}

fn render_from(trigger: &Trigger) -> Value {
    let mut from = Map::new();
    match trigger {
        Trigger::Key(key) => {
            from.insert("key_code".into(), json!(key.key().name()));
            if let Some(modifiers) = from_modifiers(key.mandatory(), key.optional_modifiers()) {
                from.insert("modifiers".into(), modifiers);
            }
        }
        Trigger::Simultaneous { keys, options } => {
            let entries: Vec<Value> = keys.iter().map(|k| json!({ "key_code": k.key().name() })).collect();
            from.insert("simultaneous".into(), Value::Array(entries));
            if let Some(options) = simultaneous_options(options) {
                from.insert("simultaneous_options".into(), options);
            }
            let mandatory = sorted_union(keys, TriggerKey::mandatory);
            let optional = sorted_union(keys, TriggerKey::optional_modifiers);
            if let Some(modifiers) = from_modifiers(&mandatory, &optional) {
                from.insert("modifiers".into(), modifiers);
            }
        }
    }
    Value::Object(from)
}

fn set_variable(flags: &FlagNamespace, flag: crate::StateFlag, value: u8) -> Value {
    json!({ "set_variable": { "name": flags.name(flag), "value": value } })
}

fn render_actions(actions: &[Action], flags: &FlagNamespace) -> Vec<Value> {
    let mut out = Vec::with_capacity(actions.len());
    for action in actions {
        match action {
            Action::Key(press) => {
                let mut key = Map::new();
                key.insert("key_code".into(), json!(press.key().name()));
                if !press.modifiers().is_empty() {
                    key.insert("modifiers".into(), json!(modifier_names(press.modifiers())));
                }
                out.push(Value::Object(key));
            }
            Action::SetFlag(flag) => out.push(set_variable(flags, *flag, 1)),
            Action::ClearFlags(cleared) => {
                out.extend(cleared.iter().map(|flag| set_variable(flags, *flag, 0)));
            }
            Action::Shell(command) => out.push(json!({ "shell_command": command })),
        }
    }
    out
}

fn render_conditions(conditions: &Conditions, flags: &FlagNamespace) -> Vec<Value> {
    conditions
        .iter()
        .map(|condition| match condition {
            Condition::Flag { flag, expected: true } => {
                json!({ "type": "variable_if", "name": flags.name(*flag), "value": 1 })
            }
            Condition::Flag { flag, expected: false } => {
                json!({ "type": "variable_unless", "name": flags.name(*flag), "value": 1 })
            }
            Condition::AppIs(ids) => {
                json!({ "type": "frontmost_application_if", "bundle_identifiers": ids })
            }
            Condition::AppIsNot(ids) => {
                json!({ "type": "frontmost_application_unless", "bundle_identifiers": ids })
            }
        })
        .collect()
}

/// One rule as a host manipulator
pub fn render_rule(rule: &Rule, flags: &FlagNamespace) -> Value {
    let mut manipulator = Map::new();
    manipulator.insert("type".into(), json!("basic"));
    manipulator.insert("from".into(), render_from(rule.trigger()));

    let sections = [
        ("to", rule.actions()),
        ("to_if_alone", rule.alone()),
        ("to_if_held_down", rule.held()),
        ("to_after_key_up", rule.after_key_up()),
    ];
    for (name, actions) in sections {
        if !actions.is_empty() {
            manipulator.insert(name.into(), Value::Array(render_actions(actions, flags)));
        }
    }

    if let Some(delayed) = rule.delayed() {
        manipulator.insert(
            "to_delayed_action".into(),
            json!({
                "to_if_invoked": render_actions(&delayed.on_invoked, flags),
                "to_if_canceled": render_actions(&delayed.on_canceled, flags),
            }),
        );
        manipulator.insert("parameters".into(), json!({ DELAY_PARAMETER: delayed.delay_ms }));
    }

    if !rule.conditions().is_empty() {
        manipulator.insert(
            "conditions".into(),
            Value::Array(render_conditions(rule.conditions(), flags)),
        );
    }
    Value::Object(manipulator)
}

fn render_device(device: &Device) -> Value {
    json!({
        "identifiers": {
            "vendor_id": device.vendor_id,
            "product_id": device.product_id,
            "is_keyboard": device.is_keyboard,
            "is_pointing_device": device.is_pointing_device,
        },
        "disable_built_in_keyboard_if_exists": device.disable_built_in_keyboard_if_exists,
    })
}

fn render_profile(profile: &Profile, flags: &FlagNamespace) -> Value {
    let rules: Vec<Value> = profile
        .groups()
        .iter()
        .map(|group| {
            let manipulators: Vec<Value> = group.rules().iter().map(|r| render_rule(r, flags)).collect();
            json!({ "description": group.name(), "manipulators": manipulators })
        })
        .collect();

    let mut complex = Map::new();
    if !profile.parameters().is_empty() {
        complex.insert("parameters".into(), json!(profile.parameters()));
    }
    complex.insert("rules".into(), Value::Array(rules));

    json!({
        "name": profile.name(),
        "selected": profile.is_selected(),
        "complex_modifications": complex,
        "devices": profile.devices().iter().map(render_device).collect::<Vec<_>>(),
        "virtual_hid_keyboard": { "country_code": profile.country_code() },
    })
}

impl Document {
    /// The document as a JSON value in the host engine's layout
    pub fn to_value(&self) -> Value {
        let global = self.global();
        json!({
            "global": {
                "check_for_updates_on_startup": global.check_for_updates_on_startup,
                "show_in_menu_bar": global.show_in_menu_bar,
                "show_profile_name_in_menu_bar": global.show_profile_name_in_menu_bar,
            },
            "profiles": self
                .profiles()
                .iter()
                .map(|p| render_profile(p, self.flags()))
                .collect::<Vec<_>>(),
        })
    }

    /// Pretty-printed JSON. Identical documents give identical bytes.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.to_value())
    }
}

impl Serialize for Document {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}
