//! Dietary compliance checking.
//!
//! Counts the words in a text that a dietary tag forbids. Word lists, the
//! groups each tag forbids, and per-word exception phrases come from
//! `data/dietary_rules.json`.

use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, LazyLock};

use crate::error::RulesError;
use crate::types::{Diet, StyleTag};

pub trait ComplianceChecker: Send + Sync + fmt::Debug {
    /// Number of words in `text` that violate `tag`.
    fn check_violations(&self, text: &str, tag: &StyleTag) -> usize;
}

#[derive(Deserialize)]
struct RulesData {
    version: String,
    groups: HashMap<String, Vec<String>>,
    tags: HashMap<String, Vec<String>>,
    #[serde(default)]
    exceptions: HashMap<String, Vec<String>>,
}

#[derive(Debug, Clone)]
struct Forbidden {
    word: String,
    exceptions: Vec<String>,
}

static BUILTIN: LazyLock<Arc<RuleTableChecker>> = LazyLock::new(|| {
    let json = include_str!("../../data/dietary_rules.json");
    Arc::new(RuleTableChecker::from_json(json).expect("Failed to parse dietary_rules.json"))
});

/// Checker backed by versioned word tables.
#[derive(Debug, Clone)]
pub struct RuleTableChecker {
    version: String,
    forbidden: HashMap<Diet, Vec<Forbidden>>,
}

impl RuleTableChecker {
    pub fn from_json(json: &str) -> Result<Self, RulesError> {
        let data: RulesData = serde_json::from_str(json)?;

        let mut forbidden = HashMap::new();
        for (tag, groups) in &data.tags {
            let diet: Diet = tag
                .parse()
                .map_err(|_| RulesError::UnknownTag(tag.clone()))?;

            let mut words: Vec<Forbidden> = Vec::new();
            for group in groups {
                let members = data.groups.get(group).ok_or_else(|| RulesError::UnknownGroup {
                    tag: tag.clone(),
                    group: group.clone(),
                })?;
                for word in members {
                    let word = word.to_lowercase();
                    if words.iter().any(|w| w.word == word) {
                        continue;
                    }
                    let exceptions = data
                        .exceptions
                        .get(&word)
                        .map(|phrases| phrases.iter().map(|p| p.to_lowercase()).collect())
                        .unwrap_or_default();
                    words.push(Forbidden { word, exceptions });
                }
            }
            forbidden.insert(diet, words);
        }

        Ok(Self {
            version: data.version,
            forbidden,
        })
    }

    pub fn from_file(path: &Path) -> Result<Self, RulesError> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    /// The embedded rule tables.
    pub fn builtin() -> Arc<RuleTableChecker> {
        Arc::clone(&BUILTIN)
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// The forbidden words found in `text`, in table order.
    pub fn violations(&self, text: &str, tag: &StyleTag) -> Vec<String> {
        if !tag.is_positive() {
            return Vec::new();
        }
        let Some(words) = self.forbidden.get(&tag.diet) else {
            return Vec::new();
        };

        let lower = text.to_lowercase();
        words
            .iter()
            .filter(|f| lower.contains(&f.word))
            .filter(|f| !f.exceptions.iter().any(|e| lower.contains(e.as_str())))
            .map(|f| f.word.trim().to_string())
            .collect()
    }
}

impl ComplianceChecker for RuleTableChecker {
    fn check_violations(&self, text: &str, tag: &StyleTag) -> usize {
        self.violations(text, tag).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag(s: &str) -> StyleTag {
        s.parse().unwrap()
    }

    #[test]
    fn test_counts_forbidden_words() {
        let checker = RuleTableChecker::builtin();
        assert_eq!(
            checker.check_violations("Fry the bacon in butter.", &tag("vegan")),
            2
        );
        assert_eq!(
            checker.check_violations("Fry the tofu in oil.", &tag("vegan")),
            0
        );
    }

    #[test]
    fn test_exception_phrases() {
        let checker = RuleTableChecker::builtin();
        assert_eq!(
            checker.check_violations("Whisk in the almond milk.", &tag("dairy-free")),
            0
        );
        assert_eq!(
            checker.check_violations("Whisk in the milk.", &tag("dairy-free")),
            1
        );
        assert_eq!(
            checker.check_violations("Roast the eggplant.", &tag("egg-free")),
            0
        );
    }

    #[test]
    fn test_negative_tags_never_violate() {
        let checker = RuleTableChecker::builtin();
        assert_eq!(
            checker.check_violations("Fry the bacon.", &tag("non-vegan")),
            0
        );
    }

    #[test]
    fn test_tag_scope() {
        let checker = RuleTableChecker::builtin();
        // Dairy is allowed for vegetarians.
        assert_eq!(
            checker.check_violations("Melt the butter.", &tag("vegetarian")),
            0
        );
        assert_eq!(
            checker.check_violations("Add the chicken.", &tag("vegetarian")),
            1
        );
    }

    #[test]
    fn test_unknown_group_is_rejected() {
        let json = r#"{"version": "t", "groups": {}, "tags": {"vegan": ["meat"]}}"#;
        let err = RuleTableChecker::from_json(json).unwrap_err();
        assert!(matches!(err, RulesError::UnknownGroup { .. }));
    }

    #[test]
    fn test_unknown_tag_is_rejected() {
        let json = r#"{"version": "t", "groups": {}, "tags": {"paleo": []}}"#;
        assert!(matches!(
            RuleTableChecker::from_json(json).unwrap_err(),
            RulesError::UnknownTag(_)
        ));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("rules.json");
        std::fs::write(
            &path,
            r#"{"version": "test-1", "groups": {"fish": ["salmon", "anchovy"]}, "tags": {"vegan": ["fish"]}}"#,
        )
        .unwrap();

        let checker = RuleTableChecker::from_file(&path).unwrap();
        assert_eq!(checker.version(), "test-1");
        assert_eq!(
            checker.violations("Add salmon and bacon.", &tag("vegan")),
            vec!["salmon"]
        );
        assert_eq!(checker.check_violations("Add salmon.", &tag("vegetarian")), 0);
    }
}
