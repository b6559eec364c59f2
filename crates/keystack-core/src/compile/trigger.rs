// Keystack Trigger Compiler
// Mappings, combos and sequences of one layer into ordered rules

use indexmap::IndexMap;

use super::sequence::{self, Fallback};
use super::{CompileError, Scope};
use crate::mapping::Mapping;
use crate::{
    Action, ConditionBuilder, Conditions, Layer, Requirement, Rule, RuleGroupDecl, StateFlag, Trigger,
    TriggerKey,
};

/// A layer together with its activation flag
pub(crate) struct LayerScope<'l> {
    pub layer: &'l Layer,
    pub flag: StateFlag,
}

impl LayerScope<'_> {
    /// Layer flag, layer requirements, item requirements, then `extra` flags
    pub fn conditions(
        &self,
        scope: &mut Scope<'_>,
        item: &[Requirement],
        extra: &[(StateFlag, bool)],
    ) -> Conditions {
        let mut builder = ConditionBuilder::new();
        builder
            .require(self.flag, true)
            .requirements(self.layer.requirements(), &mut scope.flags)
            .requirements(item, &mut scope.flags);
        for (flag, expected) in extra {
            builder.require(*flag, *expected);
        }
        builder.finish()
    }
}

/// Compiled body of a layer
#[derive(Debug, Default)]
pub(crate) struct LayerRules {
    pub rules: Vec<Rule>,
    /// Sequence step flags owned by the layer
    pub sequence_flags: Vec<StateFlag>,
}

/// Order mappings for first-match evaluation: declaration order, except a
/// conditional mapping goes in front of an earlier unconditional mapping of
/// the same key.
pub(crate) fn order_mappings(mappings: &[Mapping]) -> Vec<&Mapping> {
    let mut ordered: Vec<&Mapping> = Vec::with_capacity(mappings.len());
    for mapping in mappings {
        let shadowing = mapping.is_conditional().then(|| {
            ordered
                .iter()
                .position(|m| !m.is_conditional() && m.trigger() == mapping.trigger())
        });
        match shadowing.flatten() {
            Some(position) => ordered.insert(position, mapping),
            None => ordered.push(mapping),
        }
    }
    ordered
}

fn check_duplicates(owner: &str, mappings: &[Mapping]) -> Result<(), CompileError> {
    for (i, a) in mappings.iter().enumerate() {
        if mappings[i + 1..]
            .iter()
            .any(|b| a.trigger() == b.trigger() && a.requirements() == b.requirements())
        {
            return Err(CompileError::DuplicateTriggerKey {
                layer: owner.to_string(),
                trigger: a.trigger().to_string(),
            });
        }
    }
    Ok(())
}

fn check_combo_duplicates(layer: &Layer) -> Result<(), CompileError> {
    let combos = layer.combos();
    for (i, a) in combos.iter().enumerate() {
        let keys = a.key_set();
        if combos[i + 1..]
            .iter()
            .any(|b| b.key_set() == keys && a.requirements() == b.requirements())
        {
            let names: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
            return Err(CompileError::DuplicateTriggerKey {
                layer: layer.name().to_string(),
                trigger: names.join("+"),
            });
        }
    }
    Ok(())
}

/// Actions of one mapping on its main rule, with tap and hold variants
fn mapping_rule(
    scope: &mut Scope<'_>,
    owner: &str,
    mapping: &Mapping,
    trigger: TriggerKey,
    conditions: Conditions,
) -> Result<Rule, CompileError> {
    let label = mapping.trigger();
    let actions = scope.resolve(mapping.outputs(), owner, label)?;
    let alone = scope.resolve(mapping.alone_outputs(), owner, label)?;
    let held = scope.resolve(mapping.held_outputs(), owner, label)?;
    Ok(Rule::new(Trigger::Key(trigger), conditions, actions)
        .with_alone(alone)
        .with_held(held))
}

/// Compile the body of `layer`: combos, sequence steps, sequence aborts,
/// then plain mappings.
pub(crate) fn compile_layer(scope: &mut Scope<'_>, layer: &LayerScope<'_>) -> Result<LayerRules, CompileError> {
    let decl = layer.layer;
    let name = decl.name();
    check_duplicates(name, decl.mappings())?;
    check_combo_duplicates(decl)?;

    let mut rules = Vec::new();

    for combo in decl.combos() {
        let label = combo
            .keys()
            .iter()
            .map(|k| k.to_string())
            .collect::<Vec<_>>()
            .join("+");
        let conditions = layer.conditions(scope, combo.requirements(), &[]);
        let actions = scope.resolve(combo.outputs(), name, &label)?;
        let after = scope.resolve(combo.after_key_up_outputs(), name, &label)?;
        let trigger = Trigger::simultaneous(
            combo.keys().iter().map(TriggerKey::any_optional),
            *combo.simultaneous_options(),
        );
        rules.push(Rule::new(trigger, conditions, actions).with_after_key_up(after));
    }

    // What each declared key does outside a sequence, in evaluation order
    let mut fallbacks: IndexMap<TriggerKey, Vec<Fallback>> = IndexMap::new();
    if !decl.sequences().is_empty() {
        let keys = decl
            .sequences()
            .iter()
            .flat_map(|s| s.keys().iter())
            .chain(decl.mappings().iter().map(Mapping::trigger));
        for key in keys {
            if fallbacks.contains_key(key) {
                continue;
            }
            let mut entries = Vec::new();
            for mapping in order_mappings(decl.mappings()).into_iter().filter(|m| m.trigger() == key) {
                entries.push(Fallback {
                    requirements: mapping.requirements().to_vec(),
                    actions: scope.resolve(mapping.outputs(), name, key)?,
                    alone: scope.resolve(mapping.alone_outputs(), name, key)?,
                    held: scope.resolve(mapping.held_outputs(), name, key)?,
                });
            }
            if entries.iter().all(|f| !f.requirements.is_empty()) {
                entries.push(Fallback::passthrough(key));
            }
            fallbacks.insert(key.clone(), entries);
        }

        for mapping in decl.mappings() {
            if decl.sequences().iter().any(|s| s.keys()[0] == *mapping.trigger()) {
                log::warn!(
                    "layer '{}': mapping for '{}' is shadowed by a sequence starting with the same key",
                    name,
                    mapping.trigger()
                );
            }
        }
    }

    let sequences = sequence::compile(scope, layer, &fallbacks)?;
    rules.extend(sequences.steps);
    rules.extend(sequences.aborts);

    for mapping in order_mappings(decl.mappings()) {
        let conditions = layer.conditions(scope, mapping.requirements(), &[]);
        let trigger = mapping.trigger().any_optional();
        rules.push(mapping_rule(scope, name, mapping, trigger, conditions)?);
    }

    log::debug!("layer '{}': {} rules", name, rules.len());
    Ok(LayerRules {
        rules,
        sequence_flags: sequences.flags,
    })
}

/// Compile a standalone group. Triggers keep their declared modifiers and
/// conditions come from the mappings alone.
pub(crate) fn compile_group(scope: &mut Scope<'_>, group: &RuleGroupDecl) -> Result<Vec<Rule>, CompileError> {
    check_duplicates(group.name(), group.mappings())?;

    let mut rules = Vec::with_capacity(group.mappings().len());
    for mapping in order_mappings(group.mappings()) {
        let conditions = ConditionBuilder::new()
            .requirements(mapping.requirements(), &mut scope.flags)
            .finish();
        let trigger = mapping.trigger().clone();
        rules.push(mapping_rule(scope, group.name(), mapping, trigger, conditions)?);
    }
    log::debug!("group '{}': {} rules", group.name(), rules.len());
    Ok(rules)
}
