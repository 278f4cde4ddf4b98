//! Rule-based ingredient substitution.
//!
//! Rewrites a step toward a dietary tag with ordered find-and-replace rules
//! from `data/substitutions.json`. A rule may carry guard strings that block a
//! match when the text immediately before or after it starts with one of them
//! (`milk` is left alone in `almond milk`). Matching is case-insensitive.

use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, LazyLock};

use crate::error::RulesError;
use crate::markers;
use crate::types::{Diet, StyleTag};

#[derive(Deserialize)]
struct SubstitutionData {
    version: String,
    groups: HashMap<String, Vec<RuleData>>,
    tags: HashMap<String, Vec<String>>,
}

#[derive(Deserialize)]
struct RuleData {
    pattern: String,
    replacement: String,
    reverse: String,
    #[serde(default)]
    not_preceded_by: Vec<String>,
    #[serde(default)]
    not_followed_by: Vec<String>,
}

#[derive(Debug, Clone)]
struct Rule {
    forward: Regex,
    backward: Regex,
    replacement: String,
    reverse: String,
    not_preceded_by: Vec<String>,
    not_followed_by: Vec<String>,
}

impl Rule {
    fn compile(data: &RuleData) -> Result<Self, RulesError> {
        let compile = |pattern: String| {
            Regex::new(&pattern).map_err(|e| RulesError::InvalidPattern {
                pattern,
                message: e.to_string(),
            })
        };
        Ok(Self {
            forward: compile(format!("(?i){}", data.pattern))?,
            backward: compile(format!("(?i){}", regex::escape(&data.replacement)))?,
            replacement: data.replacement.clone(),
            reverse: data.reverse.clone(),
            not_preceded_by: data.not_preceded_by.iter().map(|g| g.to_lowercase()).collect(),
            not_followed_by: data.not_followed_by.iter().map(|g| g.to_lowercase()).collect(),
        })
    }

    fn is_blocked(&self, text: &str, start: usize, end: usize) -> bool {
        let before = text[..start].to_lowercase();
        let after = text[end..].to_lowercase();
        self.not_preceded_by.iter().any(|g| before.ends_with(g.as_str()))
            || self.not_followed_by.iter().any(|g| after.starts_with(g.as_str()))
    }

    fn apply_forward(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut last = 0;
        for m in self.forward.find_iter(text) {
            out.push_str(&text[last..m.start()]);
            if self.is_blocked(text, m.start(), m.end()) {
                out.push_str(m.as_str());
            } else {
                out.push_str(&match_case(m.as_str(), &self.replacement));
            }
            last = m.end();
        }
        out.push_str(&text[last..]);
        out
    }

    fn apply_backward(&self, text: &str) -> String {
        self.backward
            .replace_all(text, |caps: &regex::Captures| match_case(&caps[0], &self.reverse))
            .into_owned()
    }
}

/// `replacement`, capitalized when `matched` starts with an uppercase letter.
fn match_case(matched: &str, replacement: &str) -> String {
    if !matched.chars().next().is_some_and(char::is_uppercase) {
        return replacement.to_string();
    }
    let mut chars = replacement.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

static BUILTIN: LazyLock<Arc<RuleSubstituter>> = LazyLock::new(|| {
    let json = include_str!("../../data/substitutions.json");
    Arc::new(RuleSubstituter::from_json(json).expect("Failed to parse substitutions.json"))
});

#[derive(Debug, Clone)]
pub struct RuleSubstituter {
    version: String,
    rules: HashMap<Diet, Vec<Rule>>,
}

impl RuleSubstituter {
    pub fn from_json(json: &str) -> Result<Self, RulesError> {
        let data: SubstitutionData = serde_json::from_str(json)?;

        let mut rules = HashMap::new();
        for (tag, groups) in &data.tags {
            let diet: Diet = tag
                .parse()
                .map_err(|_| RulesError::UnknownTag(tag.clone()))?;
            let mut compiled = Vec::new();
            for group in groups {
                let entries = data.groups.get(group).ok_or_else(|| RulesError::UnknownGroup {
                    tag: tag.clone(),
                    group: group.clone(),
                })?;
                for entry in entries {
                    compiled.push(Rule::compile(entry)?);
                }
            }
            rules.insert(diet, compiled);
        }

        Ok(Self {
            version: data.version,
            rules,
        })
    }

    pub fn from_file(path: &Path) -> Result<Self, RulesError> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    /// The embedded substitution rules.
    pub fn builtin() -> Arc<RuleSubstituter> {
        Arc::clone(&BUILTIN)
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Rewrite `text` toward `tag`.
    ///
    /// Positive tags replace forbidden ingredients with substitutes; negative
    /// tags turn substitutes back into the original ingredient. Steps joined
    /// with `<inst>` are rewritten one at a time.
    pub fn substitute(&self, text: &str, tag: &StyleTag) -> String {
        let Some(rules) = self.rules.get(&tag.diet) else {
            return text.to_string();
        };
        let separator = format!(" {} ", markers::INST);
        text.split(separator.as_str())
            .map(|step| {
                rules.iter().fold(step.to_string(), |acc, rule| {
                    if tag.is_positive() {
                        rule.apply_forward(&acc)
                    } else {
                        rule.apply_backward(&acc)
                    }
                })
            })
            .collect::<Vec<_>>()
            .join(separator.as_str())
    }

    /// Ingredient words the rules for `tag` can introduce, in rule order.
    pub fn replacement_terms(&self, tag: &StyleTag) -> Vec<String> {
        let mut terms: Vec<String> = Vec::new();
        for rule in self.rules.get(&tag.diet).into_iter().flatten() {
            let term = if tag.is_positive() {
                &rule.replacement
            } else {
                &rule.reverse
            };
            if !terms.contains(term) {
                terms.push(term.clone());
            }
        }
        terms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag(s: &str) -> StyleTag {
        s.parse().unwrap()
    }

    #[test]
    fn test_forward_substitution() {
        let subs = RuleSubstituter::builtin();
        assert_eq!(
            subs.substitute("Pour the milk over the fish.", &tag("vegan")),
            "Pour the soymilk over the tofu."
        );
    }

    #[test]
    fn test_guards_block_matches() {
        let subs = RuleSubstituter::builtin();
        assert_eq!(
            subs.substitute("Warm the almond milk.", &tag("dairy-free")),
            "Warm the almond milk."
        );
        assert_eq!(
            subs.substitute("Dice the eggplant.", &tag("egg-free")),
            "Dice the eggplant."
        );
    }

    #[test]
    fn test_replacement_keeps_capitalization() {
        let subs = RuleSubstituter::builtin();
        assert_eq!(
            subs.substitute("Milk the cow.", &tag("dairy-free")),
            "Soymilk the cow."
        );
        assert_eq!(
            subs.substitute("Tofu goes in last.", &tag("non-vegetarian")),
            "Fish goes in last."
        );
    }

    #[test]
    fn test_reverse_substitution() {
        let subs = RuleSubstituter::builtin();
        assert_eq!(
            subs.substitute("Crumble the tofu.", &tag("non-vegetarian")),
            "Crumble the fish."
        );
    }

    #[test]
    fn test_steps_are_rewritten_separately() {
        let subs = RuleSubstituter::builtin();
        let out = subs.substitute("Melt butter. <inst> Add milk.", &tag("dairy-free"));
        assert_eq!(out, "Melt nondairy butter. <inst> Add soymilk.");
    }

    #[test]
    fn test_replacement_terms() {
        let subs = RuleSubstituter::builtin();
        let terms = subs.replacement_terms(&tag("dairy-free"));
        assert!(terms.contains(&"soymilk".to_string()));
        let reverse = subs.replacement_terms(&tag("non-dairy-free"));
        assert!(reverse.contains(&"milk".to_string()));
    }

    #[test]
    fn test_invalid_pattern() {
        let json = r#"{"version": "t", "groups": {"g": [{"pattern": "(", "replacement": "x", "reverse": "y"}]}, "tags": {"vegan": ["g"]}}"#;
        assert!(matches!(
            RuleSubstituter::from_json(json).unwrap_err(),
            RulesError::InvalidPattern { .. }
        ));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("substitutions.json");
        std::fs::write(
            &path,
            r#"{"version": "test-1", "groups": {"dairy": [{"pattern": "cream", "replacement": "coconut cream", "reverse": "cream", "not_preceded_by": ["coconut "]}]}, "tags": {"dairy-free": ["dairy"]}}"#,
        )
        .unwrap();

        let subs = RuleSubstituter::from_file(&path).unwrap();
        assert_eq!(subs.version(), "test-1");
        assert_eq!(
            subs.substitute("Whip the cream.", &tag("dairy-free")),
            "Whip the coconut cream."
        );
        assert_eq!(
            subs.substitute("Whip the coconut cream.", &tag("dairy-free")),
            "Whip the coconut cream."
        );
        assert_eq!(subs.substitute("Fry the bacon.", &tag("vegan")), "Fry the bacon.");
    }
}
