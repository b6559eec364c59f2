// Keystack Document Assembler
// Composed layer groups and standalone groups into profiles

use super::{layer, trigger, CompileError, Scope};
use crate::document::Profile;
use crate::{ProfileDecl, RuleGroup};

/// Compile one profile: layer groups first, then standalone groups in
/// declaration order. Empty standalone groups are dropped.
pub(crate) fn assemble_profile(scope: &mut Scope<'_>, decl: &ProfileDecl) -> Result<Profile, CompileError> {
    let mut groups = layer::compose_layers(scope, decl.layers())?;

    for group in decl.groups() {
        let rules = trigger::compile_group(scope, group)?;
        if !rules.is_empty() {
            groups.push(RuleGroup::new(group.name(), rules));
        }
    }

    if groups.is_empty() {
        return Err(CompileError::EmptyProfile {
            profile: decl.name().to_string(),
        });
    }

    for group in &groups {
        for rule in group.rules() {
            log::trace!(
                "[{}] {}: {} when {}",
                decl.name(),
                group.name(),
                rule.trigger(),
                rule.conditions().describe(&scope.flags)
            );
        }
    }
    log::debug!(
        "profile '{}': {} layers, {} groups",
        decl.name(),
        decl.layers().len(),
        groups.len()
    );

    Ok(Profile::new(
        decl.name().to_string(),
        decl.is_selected(),
        decl.parameters().clone(),
        decl.devices().to_vec(),
        decl.country_code(),
        groups,
    ))
}
