// Keystack Conditions
// Guards evaluated by the host engine before a rule may fire

use std::fmt;

use indexmap::IndexMap;

use crate::{FlagNamespace, StateFlag};

/// A single guard on a compiled rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Condition {
    /// Flag must currently hold `expected`
    Flag { flag: StateFlag, expected: bool },
    /// Frontmost application is one of these identifiers
    AppIs(Vec<String>),
    /// Frontmost application is none of these identifiers
    AppIsNot(Vec<String>),
}

impl Condition {
    pub fn flag(flag: StateFlag, expected: bool) -> Self {
        Condition::Flag { flag, expected }
    }

    /// Returns true for app predicates
    pub fn is_app(&self) -> bool {
        matches!(self, Condition::AppIs(_) | Condition::AppIsNot(_))
    }
}

/// Ordered, conjunctive list of conditions. Empty means always true.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Conditions(Vec<Condition>);

impl Conditions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Condition> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[Condition] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The value this list requires for `flag`, if it mentions it
    pub fn expects(&self, flag: StateFlag) -> Option<bool> {
        self.0.iter().find_map(|condition| match condition {
            Condition::Flag { flag: f, expected } if *f == flag => Some(*expected),
            _ => None,
        })
    }

    /// Returns true if every condition here is also in `other`, so a rule
    /// guarded by `self` matches whenever one guarded by `other` does
    pub fn is_subset_of(&self, other: &Conditions) -> bool {
        self.0.iter().all(|c| other.0.contains(c))
    }

    /// Returns true if any app predicate is present
    pub fn has_app_predicate(&self) -> bool {
        self.0.iter().any(Condition::is_app)
    }

    /// Render with flag names resolved, for logs and reports
    pub fn describe<'a>(&'a self, flags: &'a FlagNamespace) -> Describe<'a> {
        Describe {
            conditions: self,
            flags,
        }
    }
}

impl<'a> IntoIterator for &'a Conditions {
    type Item = &'a Condition;
    type IntoIter = std::slice::Iter<'a, Condition>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Display adapter returned by [`Conditions::describe`]
pub struct Describe<'a> {
    conditions: &'a Conditions,
    flags: &'a FlagNamespace,
}

impl fmt::Display for Describe<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.conditions.is_empty() {
            return f.write_str("always");
        }
        for (i, condition) in self.conditions.iter().enumerate() {
            if i > 0 {
                f.write_str(" && ")?;
            }
            match condition {
                Condition::Flag { flag, expected: true } => write!(f, "{}", self.flags.name(*flag))?,
                Condition::Flag { flag, expected: false } => write!(f, "!{}", self.flags.name(*flag))?,
                Condition::AppIs(ids) => write!(f, "app in [{}]", ids.join(", "))?,
                Condition::AppIsNot(ids) => write!(f, "app not in [{}]", ids.join(", "))?,
            }
        }
        Ok(())
    }
}

/// Build conditions from flag requirements (in insertion order) and an
/// optional app allowlist.
pub fn build(flag_requirements: &IndexMap<StateFlag, bool>, app_allowlist: &[String]) -> Conditions {
    let mut builder = ConditionBuilder::new();
    for (flag, expected) in flag_requirements {
        builder.require(*flag, *expected);
    }
    builder.allow_apps(app_allowlist.iter().cloned());
    builder.finish()
}

/// Declaration-side guard, referring to flags by name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Requirement {
    Flag { name: String, expected: bool },
    AppIn(Vec<String>),
    AppNotIn(Vec<String>),
}

impl Requirement {
    pub fn flag(name: impl Into<String>, expected: bool) -> Self {
        Requirement::Flag {
            name: name.into(),
            expected,
        }
    }

    pub fn app_in<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Requirement::AppIn(ids.into_iter().map(Into::into).collect())
    }

    pub fn app_not_in<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Requirement::AppNotIn(ids.into_iter().map(Into::into).collect())
    }

    pub fn is_app(&self) -> bool {
        matches!(self, Requirement::AppIn(_) | Requirement::AppNotIn(_))
    }
}

/// Incremental condition builder.
///
/// Flag conditions come first, in the order they were first required (a
/// repeated flag keeps its position and takes the latest value). App
/// predicates follow, in the order they were added.
#[derive(Debug, Clone, Default)]
pub struct ConditionBuilder {
    flags: IndexMap<StateFlag, bool>,
    apps: Vec<Condition>,
}

impl ConditionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn require(&mut self, flag: StateFlag, expected: bool) -> &mut Self {
        self.flags.insert(flag, expected);
        self
    }

    pub fn allow_apps(&mut self, ids: impl IntoIterator<Item = String>) -> &mut Self {
        let ids: Vec<String> = ids.into_iter().collect();
        if !ids.is_empty() {
            self.apps.push(Condition::AppIs(ids));
        }
        self
    }

    pub fn deny_apps(&mut self, ids: impl IntoIterator<Item = String>) -> &mut Self {
        let ids: Vec<String> = ids.into_iter().collect();
        if !ids.is_empty() {
            self.apps.push(Condition::AppIsNot(ids));
        }
        self
    }

    /// Resolve declaration requirements, interning flag names in `flags`
    pub fn requirements<'a>(
        &mut self,
        requirements: impl IntoIterator<Item = &'a Requirement>,
        flags: &mut FlagNamespace,
    ) -> &mut Self {
        for requirement in requirements {
            match requirement {
                Requirement::Flag { name, expected } => {
                    let flag = flags.intern(name);
                    self.require(flag, *expected);
                }
                Requirement::AppIn(ids) => {
                    self.allow_apps(ids.iter().cloned());
                }
                Requirement::AppNotIn(ids) => {
                    self.deny_apps(ids.iter().cloned());
                }
            }
        }
        self
    }

    pub fn finish(&self) -> Conditions {
        let mut conditions: Vec<Condition> = self
            .flags
            .iter()
            .map(|(flag, expected)| Condition::flag(*flag, *expected))
            .collect();
        conditions.extend(self.apps.iter().cloned());
        Conditions(conditions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_empty_is_always_true() {
        let conditions = build(&IndexMap::new(), &[]);
        assert!(conditions.is_empty());
    }

    #[test]
    fn test_build_preserves_insertion_order() {
        let mut ns = FlagNamespace::new();
        let nav = ns.intern("nav");
        let step = ns.allocate("nav_seq_g_g_step1");

        let mut requirements = IndexMap::new();
        requirements.insert(step, false);
        requirements.insert(nav, true);
        let conditions = build(&requirements, &["com.apple.Terminal".to_string()]);

        assert_eq!(
            conditions.as_slice(),
            &[
                Condition::flag(step, false),
                Condition::flag(nav, true),
                Condition::AppIs(vec!["com.apple.Terminal".to_string()]),
            ]
        );
    }

    #[test]
    fn test_builder_repeated_flag_keeps_position() {
        let mut ns = FlagNamespace::new();
        let a = ns.intern("a");
        let b = ns.intern("b");
        let conditions = ConditionBuilder::new()
            .require(a, true)
            .require(b, true)
            .require(a, false)
            .finish();
        assert_eq!(conditions.as_slice(), &[Condition::flag(a, false), Condition::flag(b, true)]);
    }

    #[test]
    fn test_requirements_intern_names() {
        let mut ns = FlagNamespace::new();
        let requirements = vec![
            Requirement::flag("caps_lock_pressed", false),
            Requirement::app_not_in(["com.apple.finder"]),
        ];
        let conditions = ConditionBuilder::new().requirements(&requirements, &mut ns).finish();

        let flag = ns.get("caps_lock_pressed").unwrap();
        assert_eq!(conditions.expects(flag), Some(false));
        assert!(conditions.has_app_predicate());
        assert_eq!(conditions.len(), 2);
    }

    #[test]
    fn test_empty_app_lists_are_dropped() {
        let conditions = ConditionBuilder::new()
            .allow_apps(Vec::new())
            .deny_apps(Vec::new())
            .finish();
        assert!(conditions.is_empty());
    }

    #[test]
    fn test_subset() {
        let mut ns = FlagNamespace::new();
        let nav = ns.intern("nav");
        let step = ns.intern("step");
        let narrow = ConditionBuilder::new()
            .require(step, true)
            .require(nav, true)
            .allow_apps(vec!["com.apple.Safari".to_string()])
            .finish();
        let wide = ConditionBuilder::new().require(nav, true).finish();

        assert!(wide.is_subset_of(&narrow));
        assert!(!narrow.is_subset_of(&wide));
        assert!(Conditions::new().is_subset_of(&wide));
    }

    #[test]
    fn test_describe() {
        let mut ns = FlagNamespace::new();
        let nav = ns.intern("nav");
        let step = ns.intern("step");
        let conditions = ConditionBuilder::new()
            .require(nav, true)
            .require(step, false)
            .allow_apps(vec!["com.apple.Safari".to_string()])
            .finish();
        assert_eq!(
            conditions.describe(&ns).to_string(),
            "nav && !step && app in [com.apple.Safari]"
        );
        assert_eq!(Conditions::new().describe(&ns).to_string(), "always");
    }
}
