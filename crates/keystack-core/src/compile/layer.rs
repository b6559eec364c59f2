// Keystack Layer Composer
// Activation rules, layer ordering and per-layer rule groups

use std::collections::HashSet;

use indexmap::IndexMap;

use super::trigger::{self, LayerScope};
use super::{CompileError, Scope};
use crate::layer::Activation;
use crate::mapping::SimultaneousOptions;
use crate::{Action, ConditionBuilder, Layer, Rule, RuleGroup, StateFlag, Trigger, TriggerKey};

/// Resolve the activation keys of every layer, following parent links.
fn activation_keys(layers: &[&Layer]) -> Result<IndexMap<String, Vec<TriggerKey>>, CompileError> {
    let by_name: IndexMap<&str, &Layer> = layers.iter().map(|&l| (l.name(), l)).collect();
    let mut resolved = IndexMap::new();
    for &layer in layers {
        let mut visiting = HashSet::new();
        let keys = resolve_keys(layer, &by_name, &mut visiting)?;
        resolved.insert(layer.name().to_string(), keys);
    }
    Ok(resolved)
}

fn resolve_keys<'a>(
    layer: &'a Layer,
    by_name: &IndexMap<&str, &'a Layer>,
    visiting: &mut HashSet<&'a str>,
) -> Result<Vec<TriggerKey>, CompileError> {
    if !visiting.insert(layer.name()) {
        return Err(CompileError::InvalidLayer {
            layer: layer.name().to_string(),
            reason: "layer stacking forms a cycle".to_string(),
        });
    }

    let keys = match layer.activation() {
        Activation::Keys(keys) => keys.clone(),
        Activation::Parents(parents) => {
            let mut keys: Vec<TriggerKey> = Vec::new();
            for parent in parents {
                let parent_layer = by_name.get(parent.as_str()).copied().ok_or_else(|| {
                    CompileError::UnknownParentLayer {
                        layer: layer.name().to_string(),
                        parent: parent.clone(),
                    }
                })?;
                for key in resolve_keys(parent_layer, by_name, visiting)? {
                    if !keys.contains(&key) {
                        keys.push(key);
                    }
                }
            }
            keys
        }
    };

    visiting.remove(layer.name());
    Ok(keys)
}

fn shares_key(keys: &IndexMap<String, Vec<TriggerKey>>, a: &Layer, b: &Layer) -> bool {
    match (keys.get(a.name()), keys.get(b.name())) {
        (Some(a), Some(b)) => a.iter().any(|k| b.contains(k)),
        _ => false,
    }
}

/// Evaluation order of layers: declaration order, but a layer with app
/// requirements goes before the first earlier unconditional layer that
/// shares an activation key with it.
fn order_layers<'a>(layers: &[&'a Layer], keys: &IndexMap<String, Vec<TriggerKey>>) -> Vec<&'a Layer> {
    let mut ordered: Vec<&'a Layer> = Vec::with_capacity(layers.len());
    for &layer in layers {
        let position = if layer.has_app_requirement() {
            ordered
                .iter()
                .position(|&earlier| earlier.requirements().is_empty() && shares_key(keys, earlier, layer))
        } else {
            None
        };
        match position {
            Some(position) => {
                log::debug!(
                    "layer '{}' hoisted before '{}'",
                    layer.name(),
                    ordered[position].name()
                );
                ordered.insert(position, layer);
            }
            None => ordered.push(layer),
        }
    }
    ordered
}

fn activation_rule(
    scope: &mut Scope<'_>,
    layer: &Layer,
    flag: StateFlag,
    keys: &[TriggerKey],
    sequence_flags: &[StateFlag],
) -> Rule {
    let conditions = ConditionBuilder::new()
        .requirements(layer.requirements(), &mut scope.flags)
        .finish();
    let on = vec![Action::SetFlag(flag)];
    let off = vec![Action::clear(std::iter::once(flag).chain(sequence_flags.iter().copied()))];

    match keys {
        [key] => {
            let alone = layer.alone().cloned().unwrap_or_else(|| key.as_press());
            Rule::new(Trigger::Key(key.any_optional()), conditions, on)
                .with_after_key_up(off)
                .with_alone(vec![Action::Key(alone)])
        }
        _ => {
            let trigger = Trigger::simultaneous(
                keys.iter().map(TriggerKey::any_optional),
                SimultaneousOptions::default(),
            );
            Rule::new(trigger, conditions, on).with_after_key_up(off)
        }
    }
}

/// Compile the layers of one profile into rule groups: stacked activations,
/// single-key activations, then layer bodies.
pub(crate) fn compose_layers(scope: &mut Scope<'_>, layers: &[Layer]) -> Result<Vec<RuleGroup>, CompileError> {
    let mut seen = HashSet::new();
    for layer in layers {
        if !seen.insert(layer.name()) {
            return Err(CompileError::DuplicateLayer {
                layer: layer.name().to_string(),
            });
        }
    }

    let declared: Vec<&Layer> = layers.iter().collect();
    let keys = activation_keys(&declared)?;
    let ordered = order_layers(&declared, &keys);

    let mut stacked = Vec::new();
    let mut single = Vec::new();
    let mut bodies = Vec::new();

    for layer in ordered {
        let flag = scope.flags.intern(layer.name());
        let body = trigger::compile_layer(scope, &LayerScope { layer, flag })?;
        let layer_keys = keys.get(layer.name()).map(Vec::as_slice).unwrap_or(&[]);
        let activation = activation_rule(scope, layer, flag, layer_keys, &body.sequence_flags);

        if layer_keys.len() > 1 {
            stacked.push(RuleGroup::new(format!("{} stacked activation", layer.name()), vec![activation]));
        } else {
            single.push(RuleGroup::new(format!("{} activation", layer.name()), vec![activation]));
        }
        if !body.rules.is_empty() {
            bodies.push(RuleGroup::new(layer.name(), body.rules));
        }
    }

    let mut groups = stacked;
    groups.extend(single);
    groups.extend(bodies);
    Ok(groups)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::TemplateRegistry;
    use crate::{Condition, LayerBuilder};

    fn compose(layers: &[Layer]) -> Result<(Vec<RuleGroup>, crate::FlagNamespace), CompileError> {
        let templates = TemplateRegistry::with_builtins();
        let mut scope = Scope::new(&templates);
        let groups = compose_layers(&mut scope, layers)?;
        Ok((groups, scope.flags))
    }

    fn names(groups: &[RuleGroup]) -> Vec<&str> {
        groups.iter().map(RuleGroup::name).collect()
    }

    #[test]
    fn test_single_activation_rule() {
        let layer = LayerBuilder::new("nav")
            .trigger("right_command")
            .map("h", "left_arrow")
            .build()
            .unwrap();
        let (groups, flags) = compose(&[layer]).unwrap();
        assert_eq!(names(&groups), vec!["nav activation", "nav"]);

        let nav = flags.get("nav").unwrap();
        let rule = &groups[0].rules()[0];
        assert!(rule.conditions().is_empty());
        assert_eq!(rule.actions(), &[Action::SetFlag(nav)]);
        assert_eq!(rule.after_key_up(), &[Action::clear([nav])]);
        assert_eq!(rule.alone(), &[Action::key("right_command")]);
    }

    #[test]
    fn test_alone_key_used() {
        let layer = LayerBuilder::new("hyper")
            .trigger("caps_lock")
            .alone("escape")
            .map("h", "left_arrow")
            .build()
            .unwrap();
        let (groups, _) = compose(&[layer]).unwrap();
        assert_eq!(groups[0].rules()[0].alone(), &[Action::key("escape")]);
    }

    #[test]
    fn test_stacked_groups_first() {
        let a = LayerBuilder::new("a").trigger("a").map("x", "1").build().unwrap();
        let s = LayerBuilder::new("s").trigger("s").map("x", "2").build().unwrap();
        let both = LayerBuilder::new("as")
            .stacked_on(["a", "s"])
            .map("x", "3")
            .build()
            .unwrap();
        let (groups, _) = compose(&[a, s, both]).unwrap();
        assert_eq!(
            names(&groups),
            vec!["as stacked activation", "a activation", "s activation", "a", "s", "as"]
        );
        match groups[0].rules()[0].trigger() {
            Trigger::Simultaneous { keys, .. } => {
                let names: Vec<&str> = keys.iter().map(|k| k.key().name()).collect();
                assert_eq!(names, vec!["a", "s"]);
            }
            other => panic!("expected simultaneous trigger, got {:?}", other),
        }
        assert!(groups[0].rules()[0].alone().is_empty());
    }

    #[test]
    fn test_unknown_parent() {
        let layer = LayerBuilder::new("as").stacked_on(["a", "s"]).build().unwrap();
        assert_eq!(
            compose(&[layer]).unwrap_err(),
            CompileError::UnknownParentLayer {
                layer: "as".to_string(),
                parent: "a".to_string(),
            }
        );
    }

    #[test]
    fn test_stacking_cycle() {
        let a = LayerBuilder::new("a").stacked_on(["b"]).build().unwrap();
        let b = LayerBuilder::new("b").stacked_on(["a"]).build().unwrap();
        assert!(matches!(compose(&[a, b]), Err(CompileError::InvalidLayer { .. })));
    }

    #[test]
    fn test_duplicate_layer() {
        let a = LayerBuilder::new("nav").trigger("a").build().unwrap();
        let b = LayerBuilder::new("nav").trigger("b").build().unwrap();
        assert_eq!(
            compose(&[a, b]).unwrap_err(),
            CompileError::DuplicateLayer {
                layer: "nav".to_string()
            }
        );
    }

    #[test]
    fn test_app_layer_hoisted() {
        let general = LayerBuilder::new("general").trigger("caps_lock").map("h", "left_arrow").build().unwrap();
        let other = LayerBuilder::new("other").trigger("tab").map("h", "home").build().unwrap();
        let code = LayerBuilder::new("code")
            .trigger("caps_lock")
            .when_app(["com.microsoft.VSCode"])
            .map("h", "Cmd-left_arrow")
            .build()
            .unwrap();
        let (groups, _) = compose(&[general, other, code]).unwrap();
        assert_eq!(
            names(&groups),
            vec![
                "code activation",
                "general activation",
                "other activation",
                "code",
                "general",
                "other"
            ]
        );
        assert_eq!(
            groups[0].rules()[0].conditions().as_slice(),
            &[Condition::AppIs(vec!["com.microsoft.VSCode".to_string()])]
        );
    }

    #[test]
    fn test_activation_clears_sequence_flags() {
        let layer = LayerBuilder::new("nav")
            .trigger("a")
            .sequence(&["g", "g"], "home")
            .build()
            .unwrap();
        let (groups, flags) = compose(&[layer]).unwrap();
        let nav = flags.get("nav").unwrap();
        let step = flags.get("nav_seq_g_g_step1").unwrap();
        assert_eq!(groups[0].rules()[0].after_key_up(), &[Action::clear([nav, step])]);
    }

    #[test]
    fn test_empty_body_omitted() {
        let layer = LayerBuilder::new("mode").trigger("f").build().unwrap();
        let (groups, _) = compose(&[layer]).unwrap();
        assert_eq!(names(&groups), vec!["mode activation"]);
    }
}
