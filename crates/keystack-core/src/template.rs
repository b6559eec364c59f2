// Keystack Macro Templates
// Named shell command templates with {placeholder} parameters

use std::sync::OnceLock;

use indexmap::{IndexMap, IndexSet};
use regex::Regex;

use crate::Action;

/// Template resolution errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    #[error("unknown template '{template}'")]
    UnknownTemplate { template: String },

    #[error("template '{template}' requires parameter '{parameter}'")]
    MissingParameter { template: String, parameter: String },
}

/// Built-in templates: (name, command)
const BUILTINS: &[(&str, &str)] = &[
    (
        "typed_text",
        r#"osascript -e 'tell application "System Events" to keystroke "{text}"'"#,
    ),
    (
        "alfred",
        r#"osascript -e 'tell application id "com.runningwithcrayons.Alfred" to run trigger "{trigger}" in workflow "{workflow}" with argument "{arg}"'"#,
    ),
    (
        "keyboard_maestro",
        r#"osascript -e 'tell application "Keyboard Maestro Engine" to do script "{script}"'"#,
    ),
    ("open", r#"open "{path}""#),
    ("shell", "{command}"),
];

fn token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\{\{|\}\}|\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("placeholder pattern is valid")
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
}

/// A parsed template: literal text interleaved with named parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    source: String,
    segments: Vec<Segment>,
    required: IndexSet<String>,
}

impl Template {
    /// Parse `source`. `{name}` is a parameter, `{{` and `}}` are literal
    /// braces, any other brace is kept as is.
    pub fn parse(source: &str) -> Self {
        let mut segments = Vec::new();
        let mut required = IndexSet::new();
        let mut literal = String::new();
        let mut last = 0;

        for caps in token_pattern().captures_iter(source) {
            let Some(whole) = caps.get(0) else { continue };
            literal.push_str(&source[last..whole.start()]);
            last = whole.end();

            match caps.get(1) {
                Some(name) => {
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    required.insert(name.as_str().to_string());
                    segments.push(Segment::Param(name.as_str().to_string()));
                }
                None => literal.push(if whole.as_str() == "{{" { '{' } else { '}' }),
            }
        }
        literal.push_str(&source[last..]);
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Self {
            source: source.to_string(),
            segments,
            required,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Parameter names in order of first appearance
    pub fn parameters(&self) -> impl Iterator<Item = &str> + '_ {
        self.required.iter().map(String::as_str)
    }

    /// The first required parameter missing from `params`
    pub fn missing<'a>(&'a self, params: &IndexMap<String, String>) -> Option<&'a str> {
        self.parameters().find(|name| !params.contains_key(*name))
    }

    /// Substitute every parameter. Parameters must all be present.
    fn render(&self, params: &IndexMap<String, String>) -> String {
        let mut out = String::with_capacity(self.source.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Param(name) => {
                    if let Some(value) = params.get(name) {
                        out.push_str(value);
                    }
                }
            }
        }
        out
    }
}

/// Name -> template table handed to the compiler.
#[derive(Debug, Clone, Default)]
pub struct TemplateRegistry {
    templates: IndexMap<String, Template>,
}

impl TemplateRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in templates
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for (name, source) in BUILTINS {
            registry.register(*name, source);
        }
        registry
    }

    /// Add a template, replacing any previous one with the same name
    pub fn register(&mut self, name: impl Into<String>, source: &str) -> &mut Self {
        let name = name.into();
        let template = Template::parse(source);
        log::trace!(
            "registered template '{}' ({} parameters)",
            name,
            template.required.len()
        );
        self.templates.insert(name, template);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Template> {
        self.templates.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.templates.keys().map(String::as_str)
    }

    /// Resolve `name` with `params` into the actions of a macro.
    ///
    /// Parameters not used by the template are ignored.
    pub fn resolve(
        &self,
        name: &str,
        params: &IndexMap<String, String>,
    ) -> Result<Vec<Action>, TemplateError> {
        let template = self
            .templates
            .get(name)
            .ok_or_else(|| TemplateError::UnknownTemplate {
                template: name.to_string(),
            })?;

        if let Some(parameter) = template.missing(params) {
            return Err(TemplateError::MissingParameter {
                template: name.to_string(),
                parameter: parameter.to_string(),
            });
        }

        Ok(vec![Action::Shell(template.render(params))])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> IndexMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_open_template() {
        let registry = TemplateRegistry::with_builtins();
        let actions = registry
            .resolve("open", &params(&[("path", "/Applications/Safari.app")]))
            .unwrap();
        assert_eq!(
            actions,
            vec![Action::Shell(r#"open "/Applications/Safari.app""#.to_string())]
        );
    }

    #[test]
    fn test_missing_parameter() {
        let registry = TemplateRegistry::with_builtins();
        let result = registry.resolve("open", &IndexMap::new());
        assert_eq!(
            result,
            Err(TemplateError::MissingParameter {
                template: "open".to_string(),
                parameter: "path".to_string(),
            })
        );
    }

    #[test]
    fn test_first_missing_parameter_reported() {
        let registry = TemplateRegistry::with_builtins();
        let result = registry.resolve("alfred", &params(&[("trigger", "t")]));
        assert_eq!(
            result,
            Err(TemplateError::MissingParameter {
                template: "alfred".to_string(),
                parameter: "workflow".to_string(),
            })
        );
    }

    #[test]
    fn test_unknown_template() {
        let registry = TemplateRegistry::with_builtins();
        assert_eq!(
            registry.resolve("nope", &IndexMap::new()),
            Err(TemplateError::UnknownTemplate {
                template: "nope".to_string()
            })
        );
    }

    #[test]
    fn test_extra_parameters_ignored() {
        let registry = TemplateRegistry::with_builtins();
        let actions = registry
            .resolve("shell", &params(&[("command", "say hi"), ("unused", "x")]))
            .unwrap();
        assert_eq!(actions, vec![Action::Shell("say hi".to_string())]);
    }

    #[test]
    fn test_escaped_braces() {
        let mut registry = TemplateRegistry::new();
        registry.register("json", r#"echo '{{"name": "{name}"}}'"#);
        let template = registry.get("json").unwrap();
        assert_eq!(template.parameters().collect::<Vec<_>>(), vec!["name"]);

        let actions = registry.resolve("json", &params(&[("name", "kb")])).unwrap();
        assert_eq!(actions, vec![Action::Shell(r#"echo '{"name": "kb"}'"#.to_string())]);
    }

    #[test]
    fn test_register_replaces() {
        let mut registry = TemplateRegistry::with_builtins();
        registry.register("open", "open -a {app}");
        let actions = registry.resolve("open", &params(&[("app", "Mail")])).unwrap();
        assert_eq!(actions, vec![Action::Shell("open -a Mail".to_string())]);
    }

    #[test]
    fn test_repeated_placeholder() {
        let template = Template::parse("{x}-{x}");
        assert_eq!(template.parameters().count(), 1);
        assert_eq!(template.render(&params(&[("x", "a")])), "a-a");
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let registry = TemplateRegistry::with_builtins();
        let p = params(&[("text", "hello")]);
        assert_eq!(registry.resolve("typed_text", &p), registry.resolve("typed_text", &p));
    }

    #[test]
    fn test_builtins_present() {
        let registry = TemplateRegistry::with_builtins();
        let names: Vec<&str> = registry.names().collect();
        assert_eq!(
            names,
            vec!["typed_text", "alfred", "keyboard_maestro", "open", "shell"]
        );
    }
}
