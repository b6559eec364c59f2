// Keystack Sequence Compiler
// Ordered key sequences as chains of step flags

use indexmap::IndexMap;

use super::trigger::LayerScope;
use super::{CompileError, Scope};
use crate::mapping::Sequence;
use crate::{Action, DelayedAction, Layer, Requirement, Rule, StateFlag, Trigger, TriggerKey};

/// What a key does when it interrupts an armed sequence: one entry per
/// mapping of the key, in evaluation order, plus the bare key when no
/// unconditional mapping exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Fallback {
    pub requirements: Vec<Requirement>,
    pub actions: Vec<Action>,
    pub alone: Vec<Action>,
    pub held: Vec<Action>,
}

impl Fallback {
    /// The key sent through unchanged
    pub fn passthrough(key: &TriggerKey) -> Self {
        Self {
            requirements: Vec::new(),
            actions: vec![Action::Key(key.as_press())],
            alone: Vec::new(),
            held: Vec::new(),
        }
    }
}

/// Rules and flags produced for the sequences of one layer
#[derive(Debug, Default)]
pub(crate) struct SequenceRules {
    /// Step and final rules, deepest first
    pub steps: Vec<Rule>,
    /// Rules that disarm every sequence when a key interrupts one
    pub aborts: Vec<Rule>,
    /// Every step flag of the layer, in allocation order
    pub flags: Vec<StateFlag>,
}

/// A sequence with its allocated step flags (`flags[i]` is step `i + 1`)
struct Chain<'a> {
    sequence: &'a Sequence,
    flags: Vec<StateFlag>,
}

impl Chain<'_> {
    fn len(&self) -> usize {
        self.sequence.keys().len()
    }
}

/// Reject sequences that can never be told apart
pub(crate) fn check(layer: &Layer) -> Result<(), CompileError> {
    let sequences = layer.sequences();
    for (i, a) in sequences.iter().enumerate() {
        for b in &sequences[i + 1..] {
            if a.keys() == b.keys() {
                return Err(CompileError::DuplicateTriggerKey {
                    layer: layer.name().to_string(),
                    trigger: a.label(),
                });
            }
            let (short, long) = if a.keys().len() < b.keys().len() { (a, b) } else { (b, a) };
            if long.keys().starts_with(short.keys()) {
                return Err(CompileError::ShadowedSequence {
                    layer: layer.name().to_string(),
                    sequence: long.label(),
                    prefix: short.label(),
                });
            }
        }
    }
    Ok(())
}

fn flag_base(layer: &str, sequence: &Sequence) -> String {
    let keys: Vec<String> = sequence.keys().iter().map(TriggerKey::slug).collect();
    format!("{}_seq_{}", layer, keys.join("_"))
}

/// Compile the sequences of a layer.
///
/// `fallbacks` maps every key the layer declares to what it does outside a
/// sequence; an abort rule is emitted for each (key, fallback, sequence),
/// unless an earlier step or final rule already takes that key in every
/// state the abort would match.
///
/// Every step rule disarms its sequences when the host cancels its delayed
/// action, so a key the layer does not declare also interrupts them.
pub(crate) fn compile(
    scope: &mut Scope<'_>,
    layer: &LayerScope<'_>,
    fallbacks: &IndexMap<TriggerKey, Vec<Fallback>>,
) -> Result<SequenceRules, CompileError> {
    let sequences = layer.layer.sequences();
    if sequences.is_empty() {
        return Ok(SequenceRules::default());
    }
    check(layer.layer)?;

    let chains: Vec<Chain<'_>> = sequences
        .iter()
        .map(|sequence| {
            let base = flag_base(layer.layer.name(), sequence);
            let flags = (1..sequence.keys().len())
                .map(|step| scope.flags.allocate(&format!("{}_step{}", base, step)))
                .collect();
            Chain { sequence, flags }
        })
        .collect();
    let all_flags: Vec<StateFlag> = chains.iter().flat_map(|c| c.flags.iter().copied()).collect();

    let max_len = chains.iter().map(Chain::len).max().unwrap_or(0);
    let mut steps = Vec::new();

    for depth in (1..=max_len).rev() {
        // (first declaration index, rule)
        let mut at_depth: Vec<(usize, Rule)> = Vec::new();

        for (index, chain) in chains.iter().enumerate().filter(|(_, c)| c.len() == depth) {
            at_depth.push((index, final_rule(scope, layer, chain, &all_flags)?));
        }

        let mut groups: IndexMap<(&[TriggerKey], &[Requirement]), Vec<usize>> = IndexMap::new();
        for (index, chain) in chains.iter().enumerate().filter(|(_, c)| c.len() > depth) {
            let key = (&chain.sequence.keys()[..depth], chain.sequence.requirements());
            groups.entry(key).or_default().push(index);
        }
        for members in groups.values() {
            let group: Vec<&Chain<'_>> = members.iter().map(|&i| &chains[i]).collect();
            at_depth.push((members[0], step_rule(scope, layer, &group, depth, &all_flags)));
        }

        at_depth.sort_by_key(|(index, _)| *index);
        steps.extend(at_depth.into_iter().map(|(_, rule)| rule));
    }

    let mut aborts = Vec::with_capacity(fallbacks.len() * chains.len());
    for (key, entries) in fallbacks {
        let trigger = Trigger::Key(key.any_optional());
        for fallback in entries {
            for chain in &chains {
                let mut requirements = chain.sequence.requirements().to_vec();
                requirements.extend(fallback.requirements.iter().cloned());
                let conditions = layer.conditions(scope, &requirements, &[(chain.flags[0], true)]);
                // a step or final rule already takes this key in this state
                if steps
                    .iter()
                    .any(|r| r.trigger() == &trigger && r.conditions().is_subset_of(&conditions))
                {
                    continue;
                }
                let mut actions = vec![Action::clear(all_flags.iter().copied())];
                actions.extend(fallback.actions.iter().cloned());
                aborts.push(
                    Rule::new(trigger.clone(), conditions, actions)
                        .with_alone(fallback.alone.clone())
                        .with_held(fallback.held.clone()),
                );
            }
        }
    }

    log::trace!(
        "layer '{}': {} sequences, {} step rules, {} abort rules",
        layer.layer.name(),
        chains.len(),
        steps.len(),
        aborts.len()
    );

    Ok(SequenceRules {
        steps,
        aborts,
        flags: all_flags,
    })
}

/// Rule for step `depth` shared by every chain in `group`.
///
/// The rule sets the whole prefix of each chain rather than only the new
/// step flag: the host runs the cancel actions of the previous step after
/// this rule has matched, and those clear the prefix.
fn step_rule(
    scope: &mut Scope<'_>,
    layer: &LayerScope<'_>,
    group: &[&Chain<'_>],
    depth: usize,
    all_flags: &[StateFlag],
) -> Rule {
    let lead = group[0].sequence;
    let key = &lead.keys()[depth - 1];

    let mut expected = Vec::new();
    for chain in group {
        for (i, flag) in chain.flags.iter().enumerate() {
            expected.push((*flag, i + 1 < depth));
        }
    }
    let conditions = layer.conditions(scope, lead.requirements(), &expected);

    let group_flags: Vec<StateFlag> = group.iter().flat_map(|c| c.flags.iter().copied()).collect();
    let others: Vec<StateFlag> = all_flags
        .iter()
        .copied()
        .filter(|f| !group_flags.contains(f))
        .collect();

    let mut actions = Vec::with_capacity(group.len() * depth + 1);
    if !others.is_empty() {
        actions.push(Action::clear(others));
    }
    for chain in group {
        actions.extend(chain.flags[..depth].iter().map(|flag| Action::SetFlag(*flag)));
    }

    let delay_ms = group.iter().map(|c| c.sequence.timeout_ms()).max().unwrap_or(lead.timeout_ms());
    let reset = DelayedAction::disarm(delay_ms, vec![Action::clear(group_flags)]);

    Rule::new(Trigger::Key(key.any_optional()), conditions, actions).with_delayed(reset)
}

/// Rule for the last key of a chain: run the outputs, disarm everything
fn final_rule(
    scope: &mut Scope<'_>,
    layer: &LayerScope<'_>,
    chain: &Chain<'_>,
    all_flags: &[StateFlag],
) -> Result<Rule, CompileError> {
    let sequence = chain.sequence;
    let key = &sequence.keys()[sequence.keys().len() - 1];
    let armed: Vec<(StateFlag, bool)> = chain.flags.iter().map(|f| (*f, true)).collect();
    let conditions = layer.conditions(scope, sequence.requirements(), &armed);

    let mut actions = scope.resolve(sequence.outputs(), layer.layer.name(), &sequence.label())?;
    let mut cleared = chain.flags.clone();
    cleared.extend(all_flags.iter().copied().filter(|f| !chain.flags.contains(f)));
    actions.push(Action::clear(cleared));

    Ok(Rule::new(Trigger::Key(key.any_optional()), conditions, actions))
}
