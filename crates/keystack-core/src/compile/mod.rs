// Keystack Compiler
// Declarations in, ordered flag-driven rule document out

mod assemble;
mod layer;
mod sequence;
mod trigger;

use std::fmt::Display;

use crate::mapping::{Output, OutputParseError};
use crate::template::{TemplateError, TemplateRegistry};
use crate::{Action, Declaration, Document, FlagNamespace};

/// Errors raised while validating or compiling declarations.
///
/// Any error aborts the whole compilation; no partial document is produced.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CompileError {
    #[error("invalid layer '{layer}': {reason}")]
    InvalidLayer { layer: String, reason: String },

    #[error("invalid mapping in '{layer}': {reason}")]
    InvalidMapping { layer: String, reason: String },

    #[error("invalid combo in layer '{layer}': {reason}")]
    InvalidCombo { layer: String, reason: String },

    #[error("invalid sequence in layer '{layer}': {reason}")]
    InvalidSequence { layer: String, reason: String },

    #[error("invalid expression '{expression}' in '{layer}': {source}")]
    InvalidExpression {
        layer: String,
        expression: String,
        #[source]
        source: OutputParseError,
    },

    #[error("'{trigger}' is declared more than once in '{layer}'")]
    DuplicateTriggerKey { layer: String, trigger: String },

    #[error("sequence '{sequence}' in layer '{layer}' can never complete: '{prefix}' is a prefix of it")]
    ShadowedSequence {
        layer: String,
        sequence: String,
        prefix: String,
    },

    #[error("layer '{layer}' is declared more than once")]
    DuplicateLayer { layer: String },

    #[error("layer '{layer}' is stacked on unknown layer '{parent}'")]
    UnknownParentLayer { layer: String, parent: String },

    #[error("profile '{profile}' has no rules")]
    EmptyProfile { profile: String },

    #[error("macro on '{trigger}' in '{layer}': {source}")]
    Template {
        layer: String,
        trigger: String,
        #[source]
        source: TemplateError,
    },
}

/// Compiler front end. Holds the template registry; every call to
/// [`Compiler::compile`] works on its own flag namespace.
#[derive(Debug, Clone)]
pub struct Compiler {
    templates: TemplateRegistry,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new(TemplateRegistry::with_builtins())
    }
}

impl Compiler {
    pub fn new(templates: TemplateRegistry) -> Self {
        Self { templates }
    }

    pub fn templates(&self) -> &TemplateRegistry {
        &self.templates
    }

    /// Compile `declaration` into a document
    pub fn compile(&self, declaration: &Declaration) -> Result<Document, CompileError> {
        let mut scope = Scope::new(&self.templates);
        let profiles = declaration
            .profiles
            .iter()
            .map(|profile| assemble::assemble_profile(&mut scope, profile))
            .collect::<Result<Vec<_>, _>>()?;

        log::debug!(
            "compiled {} profiles, {} flags",
            profiles.len(),
            scope.flags.len()
        );
        Ok(Document::new(declaration.global, profiles, scope.flags))
    }
}

/// Compile with the built-in templates
pub fn compile(declaration: &Declaration) -> Result<Document, CompileError> {
    Compiler::default().compile(declaration)
}

/// State of one compilation
pub(crate) struct Scope<'a> {
    pub templates: &'a TemplateRegistry,
    pub flags: FlagNamespace,
}

impl<'a> Scope<'a> {
    pub fn new(templates: &'a TemplateRegistry) -> Self {
        Self {
            templates,
            flags: FlagNamespace::new(),
        }
    }

    /// Resolve declared outputs into actions. `owner` and `trigger` only
    /// label template errors.
    pub fn resolve(
        &mut self,
        outputs: &[Output],
        owner: &str,
        trigger: &dyn Display,
    ) -> Result<Vec<Action>, CompileError> {
        let mut actions = Vec::with_capacity(outputs.len());
        for output in outputs {
            match output {
                Output::Key(press) => actions.push(Action::Key(press.clone())),
                Output::Flag { name, on: true } => {
                    actions.push(Action::SetFlag(self.flags.intern(name)));
                }
                Output::Flag { name, on: false } => {
                    actions.push(Action::clear([self.flags.intern(name)]));
                }
                Output::Shell(command) => actions.push(Action::Shell(command.clone())),
                Output::Macro { template, params } => {
                    let resolved = self.templates.resolve(template, params).map_err(|source| {
                        CompileError::Template {
                            layer: owner.to_string(),
                            trigger: trigger.to_string(),
                            source,
                        }
                    })?;
                    actions.extend(resolved);
                }
            }
        }
        Ok(actions)
    }
}
