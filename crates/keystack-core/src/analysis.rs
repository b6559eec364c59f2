// Keystack Static Analysis
// Rule coverage and overlapping triggers in a compiled document

use std::fmt;

use indexmap::IndexMap;

use crate::{Condition, Conditions, Document, Modifier, StateFlag, Trigger, TriggerKey};

/// Where a rule lives, with its conditions rendered as text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleRef {
    pub profile: String,
    pub group: String,
    pub index: usize,
    pub conditions: String,
}

/// Result of [`coverage`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoverageReport {
    pub total_rules: usize,
    pub unique_signatures: usize,
    /// Rules beyond the first for each shared signature
    pub duplicate_count: usize,
    /// Signatures used by more than one rule of a profile
    pub overlaps: IndexMap<String, Vec<RuleRef>>,
    /// Rules that can never fire: earlier rules with the same trigger
    /// already match in every state this rule matches
    pub unreachable: Vec<RuleRef>,
}

impl CoverageReport {
    pub fn has_unreachable(&self) -> bool {
        !self.unreachable.is_empty()
    }
}

fn join_modifiers(modifiers: &[Modifier]) -> String {
    let mut names: Vec<&str> = modifiers.iter().map(|m| m.name()).collect();
    names.sort_unstable();
    names.join("+")
}

fn key_signature(key: &TriggerKey) -> String {
    if key.mandatory().is_empty() && key.optional_modifiers().is_empty() {
        return format!("key({})", key.key());
    }
    format!(
        "key({})|m:{}|o:{}",
        key.key(),
        join_modifiers(key.mandatory()),
        join_modifiers(key.optional_modifiers())
    )
}

/// Identity of a trigger, including its modifiers
pub fn signature(trigger: &Trigger) -> String {
    match trigger {
        Trigger::Key(key) => key_signature(key),
        Trigger::Simultaneous { keys, .. } => {
            let mut names: Vec<&str> = keys.iter().map(|k| k.key().name()).collect();
            names.sort_unstable();
            format!("simultaneous({})", names.join("+"))
        }
    }
}

/// True if `earlier`, ignoring `flag`, only requires what `later` requires
fn covers_except(earlier: &Conditions, flag: StateFlag, later: &Conditions) -> bool {
    earlier.iter().all(|c| match c {
        Condition::Flag { flag: f, .. } if *f == flag => true,
        _ => later.iter().any(|l| l == c),
    })
}

/// Returns true if the `earlier` rules of a trigger take every state in
/// which `later` holds. Either one of them asks for a subset of `later`, or
/// two of them split on a flag `later` leaves open and are otherwise subsets.
/// The second case catches a mapping behind the step and final rules of a
/// sequence that starts with its key.
fn shadowed(earlier: &[&Conditions], later: &Conditions) -> bool {
    if earlier.iter().any(|c| c.is_subset_of(later)) {
        return true;
    }
    earlier.iter().any(|a| {
        a.iter().any(|condition| match condition {
            Condition::Flag { flag, expected } if later.expects(*flag).is_none() => {
                covers_except(a, *flag, later)
                    && earlier
                        .iter()
                        .any(|b| b.expects(*flag) == Some(!*expected) && covers_except(b, *flag, later))
            }
            _ => false,
        })
    })
}

/// Count rules, group them by trigger signature and find unreachable ones.
/// Signatures are compared within a profile.
pub fn coverage(document: &Document) -> CoverageReport {
    let mut report = CoverageReport::default();
    let mut all_signatures: IndexMap<String, Vec<RuleRef>> = IndexMap::new();

    for profile in document.profiles() {
        let mut seen: IndexMap<String, Vec<&Conditions>> = IndexMap::new();

        for group in profile.groups() {
            for (index, rule) in group.rules().iter().enumerate() {
                report.total_rules += 1;
                let signature = signature(rule.trigger());
                let reference = RuleRef {
                    profile: profile.name().to_string(),
                    group: group.name().to_string(),
                    index,
                    conditions: rule.conditions().describe(document.flags()).to_string(),
                };

                let earlier = seen.entry(signature.clone()).or_default();
                if shadowed(earlier, rule.conditions()) {
                    report.unreachable.push(reference.clone());
                }
                earlier.push(rule.conditions());

                all_signatures
                    .entry(format!("{}::{}", profile.name(), signature))
                    .or_default()
                    .push(reference);
            }
        }
    }

    report.unique_signatures = all_signatures.len();
    for (key, refs) in all_signatures {
        if refs.len() > 1 {
            report.duplicate_count += refs.len() - 1;
            let signature = key.split_once("::").map(|(_, s)| s).unwrap_or(&key).to_string();
            report.overlaps.entry(signature).or_default().extend(refs);
        }
    }
    report
}

impl fmt::Display for CoverageReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Static Coverage Report")?;
        writeln!(f, "Total rules: {}", self.total_rules)?;
        writeln!(f, "Unique trigger signatures: {}", self.unique_signatures)?;
        writeln!(f, "Rules sharing a signature: {}", self.duplicate_count)?;

        if !self.overlaps.is_empty() {
            writeln!(f)?;
            writeln!(f, "Shared signatures:")?;
            for (signature, refs) in &self.overlaps {
                writeln!(f, "- {}", signature)?;
                for r in refs {
                    writeln!(f, "  Profile: {} | Group: {} | When: {}", r.profile, r.group, r.conditions)?;
                }
            }
        }

        if !self.unreachable.is_empty() {
            writeln!(f)?;
            writeln!(f, "Unreachable rules:")?;
            for r in &self.unreachable {
                writeln!(f, "- {} #{} ({})", r.group, r.index, r.conditions)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{compile, Declaration, LayerBuilder, Mapping, ProfileBuilder, Requirement, RuleGroupDecl};

    #[test]
    fn test_signature_includes_modifiers() {
        let plain = Trigger::Key(TriggerKey::new("h"));
        let relaxed = Trigger::Key(TriggerKey::new("h").any_optional());
        assert_eq!(signature(&plain), "key(h)");
        assert_eq!(signature(&relaxed), "key(h)|m:|o:any");
    }

    #[test]
    fn test_coverage_counts() {
        let profile = ProfileBuilder::new("Default")
            .layer_with(
                LayerBuilder::new("nav")
                    .trigger("right_command")
                    .map("h", "left_arrow")
                    .map("j", "down_arrow"),
            )
            .layer_with(LayerBuilder::new("sym").trigger("right_option").map("h", "1"))
            .build()
            .unwrap();
        let document = compile(&Declaration::new().profile(profile)).unwrap();
        let report = coverage(&document);

        assert_eq!(report.total_rules, 5);
        assert_eq!(report.unique_signatures, 4);
        assert_eq!(report.duplicate_count, 1);
        assert_eq!(report.overlaps.len(), 1);
        assert!(!report.has_unreachable());

        let text = report.to_string();
        assert!(text.contains("Total rules: 5"));
        assert!(text.contains("key(h)|m:|o:any"));
    }

    #[test]
    fn test_unreachable_rule_reported() {
        let profile = ProfileBuilder::new("Default")
            .group(RuleGroupDecl::new("First").mapping(Mapping::parse("caps_lock", &["escape"]).unwrap()))
            .group(RuleGroupDecl::new("Second").mapping(Mapping::parse("caps_lock", &["right_command"]).unwrap()))
            .build()
            .unwrap();
        let document = compile(&Declaration::new().profile(profile)).unwrap();
        let report = coverage(&document);
        assert_eq!(report.unreachable.len(), 1);
        assert_eq!(report.unreachable[0].group, "Second");
    }

    #[test]
    fn test_narrower_rule_after_wider_is_unreachable() {
        let profile = ProfileBuilder::new("Default")
            .group(RuleGroupDecl::new("Any").mapping(Mapping::parse("caps_lock", &["escape"]).unwrap()))
            .group(
                RuleGroupDecl::new("Terminal").mapping(
                    Mapping::parse("caps_lock", &["right_command"])
                        .unwrap()
                        .require(Requirement::app_in(["com.apple.Terminal"])),
                ),
            )
            .build()
            .unwrap();
        let document = compile(&Declaration::new().profile(profile)).unwrap();
        let report = coverage(&document);
        assert_eq!(report.unreachable.len(), 1);
        assert_eq!(report.unreachable[0].group, "Terminal");
    }

    #[test]
    fn test_mapping_behind_sequence_head_is_unreachable() {
        let profile = ProfileBuilder::new("Default")
            .layer_with(
                LayerBuilder::new("nav")
                    .trigger("caps_lock")
                    .sequence(&["g", "g"], "home")
                    .map("g", "end"),
            )
            .build()
            .unwrap();
        let document = compile(&Declaration::new().profile(profile)).unwrap();
        let report = coverage(&document);

        assert_eq!(report.unreachable.len(), 1);
        let shadowed = &report.unreachable[0];
        assert_eq!(shadowed.group, "nav");
        assert_eq!(shadowed.conditions, "nav");
        assert!(report.to_string().contains("Unreachable rules:"));
    }

    #[test]
    fn test_sequence_rules_are_reachable() {
        let profile = ProfileBuilder::new("Default")
            .layer_with(
                LayerBuilder::new("nav")
                    .trigger("caps_lock")
                    .sequence(&["g", "g", "x"], "home")
                    .sequence(&["t", "g"], "end")
                    .map("h", "left_arrow"),
            )
            .build()
            .unwrap();
        let document = compile(&Declaration::new().profile(profile)).unwrap();
        assert!(!coverage(&document).has_unreachable());
    }
}
