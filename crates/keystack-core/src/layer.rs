// Keystack Layer Declarations
// A layer: activation keys, requirements, and the mappings active while held

use indexmap::IndexMap;

use crate::compile::CompileError;
use crate::mapping::{Combo, Mapping, Output, OutputParseError, Sequence, SimultaneousOptions};
use crate::{KeyPress, Requirement, TriggerKey};

/// How a layer is switched on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Activation {
    /// Held keys. More than one key makes a stacked (simultaneous) layer.
    Keys(Vec<TriggerKey>),
    /// Stacked on other layers: their activation keys held together
    Parents(Vec<String>),
}

/// A validated layer declaration. Built with [`LayerBuilder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layer {
    name: String,
    activation: Activation,
    alone: Option<KeyPress>,
    requirements: Vec<Requirement>,
    mappings: Vec<Mapping>,
    combos: Vec<Combo>,
    sequences: Vec<Sequence>,
}

impl Layer {
    pub fn builder(name: impl Into<String>) -> LayerBuilder {
        LayerBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn activation(&self) -> &Activation {
        &self.activation
    }

    /// Key sent when the activation key is tapped alone
    pub fn alone(&self) -> Option<&KeyPress> {
        self.alone.as_ref()
    }

    pub fn requirements(&self) -> &[Requirement] {
        &self.requirements
    }

    pub fn mappings(&self) -> &[Mapping] {
        &self.mappings
    }

    pub fn combos(&self) -> &[Combo] {
        &self.combos
    }

    pub fn sequences(&self) -> &[Sequence] {
        &self.sequences
    }

    /// Returns true if the layer is restricted to (or excluded from) apps
    pub fn has_app_requirement(&self) -> bool {
        self.requirements.iter().any(Requirement::is_app)
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty() && self.combos.is_empty() && self.sequences.is_empty()
    }
}

/// Fluent builder for [`Layer`].
///
/// Key and output expressions are parsed as they are added; the first
/// problem found is reported by [`LayerBuilder::build`].
///
/// ```
/// use keystack_core::LayerBuilder;
///
/// let layer = LayerBuilder::new("nav")
///     .trigger("right_command")
///     .map("h", "left_arrow")
///     .map("Shift-h", "Cmd-left_arrow")
///     .combo(&["j", "k"], "escape")
///     .sequence(&["g", "g"], "home")
///     .build()
///     .unwrap();
/// assert_eq!(layer.mappings().len(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct LayerBuilder {
    name: String,
    activation: Activation,
    alone: Option<KeyPress>,
    requirements: Vec<Requirement>,
    mappings: Vec<Mapping>,
    combos: Vec<Combo>,
    sequences: Vec<Sequence>,
    sequence_timeout_ms: u64,
    error: Option<CompileError>,
}

impl LayerBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            activation: Activation::Keys(Vec::new()),
            alone: None,
            requirements: Vec::new(),
            mappings: Vec::new(),
            combos: Vec::new(),
            sequences: Vec::new(),
            sequence_timeout_ms: crate::mapping::DEFAULT_SEQUENCE_TIMEOUT_MS,
            error: None,
        }
    }

    fn record(&mut self, expression: &str, source: OutputParseError) {
        if self.error.is_none() {
            self.error = Some(CompileError::InvalidExpression {
                layer: self.name.clone(),
                expression: expression.to_string(),
                source,
            });
        }
    }

    fn parse_key(&mut self, expression: &str) -> Option<TriggerKey> {
        match expression.parse::<TriggerKey>() {
            Ok(key) => Some(key),
            Err(e) => {
                self.record(expression, e.into());
                None
            }
        }
    }

    fn parse_keys(&mut self, expressions: &[&str]) -> Option<Vec<TriggerKey>> {
        let mut keys = Vec::with_capacity(expressions.len());
        for expression in expressions {
            keys.push(self.parse_key(expression)?);
        }
        Some(keys)
    }

    fn parse_output(&mut self, expression: &str) -> Option<Output> {
        match expression.parse::<Output>() {
            Ok(output) => Some(output),
            Err(e) => {
                self.record(expression, e);
                None
            }
        }
    }

    /// Activate the layer while `key` is held
    pub fn trigger(self, key: &str) -> Self {
        self.triggers(&[key])
    }

    /// Activate the layer while all `keys` are held together
    pub fn triggers(mut self, keys: &[&str]) -> Self {
        if let Some(keys) = self.parse_keys(keys) {
            self.activation = Activation::Keys(keys);
        }
        self
    }

    /// Activate the layer while the activation keys of `parents` are held
    pub fn stacked_on<I, S>(mut self, parents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.activation = Activation::Parents(parents.into_iter().map(Into::into).collect());
        self
    }

    /// Key sent when the activation key is tapped without using the layer
    pub fn alone(mut self, key: &str) -> Self {
        match key.parse::<KeyPress>() {
            Ok(press) => self.alone = Some(press),
            Err(e) => self.record(key, e.into()),
        }
        self
    }

    /// Only active while one of `apps` is frontmost
    pub fn when_app<I, S>(mut self, apps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.requirements.push(Requirement::app_in(apps));
        self
    }

    /// Never active while one of `apps` is frontmost
    pub fn unless_app<I, S>(mut self, apps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.requirements.push(Requirement::app_not_in(apps));
        self
    }

    /// Never active while flag `name` is set
    pub fn unless_variable(mut self, name: impl Into<String>) -> Self {
        self.requirements.push(Requirement::flag(name, false));
        self
    }

    /// Only active while flag `name` is set
    pub fn when_variable(mut self, name: impl Into<String>) -> Self {
        self.requirements.push(Requirement::flag(name, true));
        self
    }

    /// Map `from` to a single output expression
    pub fn map(self, from: &str, to: &str) -> Self {
        self.map_all(from, &[to])
    }

    /// Map `from` to several output expressions, sent in order
    pub fn map_all(mut self, from: &str, to: &[&str]) -> Self {
        let Some(trigger) = self.parse_key(from) else {
            return self;
        };
        let mut outputs = Vec::with_capacity(to.len());
        for expression in to {
            match self.parse_output(expression) {
                Some(output) => outputs.push(output),
                None => return self,
            }
        }
        self.mappings.push(Mapping::new(trigger, outputs));
        self
    }

    /// Map `from` to a macro template call
    pub fn macro_key<I, K, V>(mut self, from: &str, template: &str, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        if let Some(trigger) = self.parse_key(from) {
            let output = Output::macro_call(template, params);
            self.mappings.push(Mapping::new(trigger, vec![output]));
        }
        self
    }

    /// Add a fully specified mapping
    pub fn mapping(mut self, mapping: Mapping) -> Self {
        self.mappings.push(mapping);
        self
    }

    /// Map keys pressed together to an output expression
    pub fn combo(self, keys: &[&str], to: &str) -> Self {
        self.combo_options(keys, to, SimultaneousOptions::default())
    }

    /// Like [`LayerBuilder::combo`], with timing options
    pub fn combo_options(mut self, keys: &[&str], to: &str, options: SimultaneousOptions) -> Self {
        let Some(keys) = self.parse_keys(keys) else {
            return self;
        };
        if let Some(output) = self.parse_output(to) {
            self.combos.push(Combo::new(keys, vec![output]).options(options));
        }
        self
    }

    /// Add a fully specified combo
    pub fn combo_with(mut self, combo: Combo) -> Self {
        self.combos.push(combo);
        self
    }

    /// Map keys pressed one after another to an output expression.
    /// Uses the timeout set by the last [`LayerBuilder::sequence_timeout`].
    pub fn sequence(mut self, keys: &[&str], to: &str) -> Self {
        let Some(keys) = self.parse_keys(keys) else {
            return self;
        };
        if let Some(output) = self.parse_output(to) {
            let sequence = Sequence::new(keys, vec![output]).timeout(self.sequence_timeout_ms);
            self.sequences.push(sequence);
        }
        self
    }

    /// Add a fully specified sequence
    pub fn sequence_with(mut self, sequence: Sequence) -> Self {
        self.sequences.push(sequence);
        self
    }

    /// Timeout for sequences added after this call
    pub fn sequence_timeout(mut self, timeout_ms: u64) -> Self {
        if timeout_ms == 0 && self.error.is_none() {
            self.error = Some(CompileError::InvalidSequence {
                layer: self.name.clone(),
                reason: "sequence timeout must be positive".to_string(),
            });
        }
        self.sequence_timeout_ms = timeout_ms;
        self
    }

    /// Validate and produce the layer
    pub fn build(self) -> Result<Layer, CompileError> {
        if let Some(error) = self.error {
            return Err(error);
        }

        let invalid_layer = |reason: &str| CompileError::InvalidLayer {
            layer: self.name.clone(),
            reason: reason.to_string(),
        };

        if self.name.trim().is_empty() {
            return Err(invalid_layer("layer name cannot be empty"));
        }
        match &self.activation {
            Activation::Keys(keys) if keys.is_empty() => {
                return Err(invalid_layer("layer has no activation keys"));
            }
            Activation::Keys(keys) if keys.iter().any(|k| k.key().is_empty()) => {
                return Err(invalid_layer("activation keys cannot be empty"));
            }
            Activation::Parents(parents) if parents.is_empty() => {
                return Err(invalid_layer("stacked layer has no parents"));
            }
            Activation::Parents(parents) if parents.iter().any(|p| p == &self.name) => {
                return Err(invalid_layer("layer cannot be stacked on itself"));
            }
            _ => {}
        }

        for mapping in &self.mappings {
            if mapping.trigger().key().is_empty() {
                return Err(CompileError::InvalidMapping {
                    layer: self.name.clone(),
                    reason: "mapping key cannot be empty".to_string(),
                });
            }
            if mapping.outputs().is_empty() {
                return Err(CompileError::InvalidMapping {
                    layer: self.name.clone(),
                    reason: format!("mapping for '{}' has no outputs", mapping.trigger()),
                });
            }
        }

        for combo in &self.combos {
            if combo.key_set().len() < 2 {
                return Err(CompileError::InvalidCombo {
                    layer: self.name.clone(),
                    reason: "combo must contain at least two distinct keys".to_string(),
                });
            }
            if combo.keys().iter().any(|k| k.key().is_empty()) {
                return Err(CompileError::InvalidCombo {
                    layer: self.name.clone(),
                    reason: "combo keys cannot be empty".to_string(),
                });
            }
            if combo.outputs().is_empty() {
                return Err(CompileError::InvalidCombo {
                    layer: self.name.clone(),
                    reason: "combo has no outputs".to_string(),
                });
            }
        }

        for sequence in &self.sequences {
            let reason = if sequence.keys().len() < 2 {
                Some("sequence must contain at least two keys")
            } else if sequence.keys().iter().any(|k| k.key().is_empty()) {
                Some("sequence keys cannot be empty")
            } else if sequence.outputs().is_empty() {
                Some("sequence has no outputs")
            } else if sequence.timeout_ms() == 0 {
                Some("sequence timeout must be positive")
            } else {
                None
            };
            if let Some(reason) = reason {
                return Err(CompileError::InvalidSequence {
                    layer: self.name.clone(),
                    reason: reason.to_string(),
                });
            }
        }

        Ok(Layer {
            name: self.name,
            activation: self.activation,
            alone: self.alone,
            requirements: self.requirements,
            mappings: self.mappings,
            combos: self.combos,
            sequences: self.sequences,
        })
    }
}

/// Macro parameters from string pairs
pub fn params<const N: usize>(pairs: [(&str, &str); N]) -> IndexMap<String, String> {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}
