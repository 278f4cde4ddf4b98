//! Ingredient-mention matching.
//!
//! Finds which structured ingredients an instruction refers to by intersecting
//! lemmatized n-grams (n = 1..5) of the instruction with those of each
//! ingredient line. The mention reported for an (instruction, ingredient) pair
//! is the longest shared n-gram, in the ingredient's own wording.

mod lexicon;

pub use lexicon::Lexicon;

use regex::Regex;
use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};

/// Longest n-gram considered.
pub const MAX_NGRAM: usize = 5;

static TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\w+(?:[-/]\w+)*|[^\s\w]").expect("token pattern is valid"));

/// N-gram membership for one document, keyed by lemma n-gram.
///
/// The value is the first surface n-gram in the document that lemmatizes to
/// the key.
#[derive(Debug, Default)]
struct NgramSet {
    grams: BTreeMap<String, String>,
}

impl NgramSet {
    fn contains(&self, lemma: &str) -> bool {
        self.grams.contains_key(lemma)
    }
}

#[derive(Debug, Clone)]
pub struct IngredientMatcher {
    lexicon: Arc<Lexicon>,
}

impl Default for IngredientMatcher {
    fn default() -> Self {
        Self::new(Lexicon::builtin())
    }
}

impl IngredientMatcher {
    pub fn new(lexicon: Arc<Lexicon>) -> Self {
        Self { lexicon }
    }

    pub fn lexicon(&self) -> &Lexicon {
        &self.lexicon
    }

    /// Mentions for every instruction, in ingredient-list order.
    ///
    /// When a title is given it is matched as one more ingredient line after
    /// the real ones.
    pub fn match_mentions(
        &self,
        instructions: &[String],
        ingredients: &[String],
        title: Option<&str>,
    ) -> Vec<Vec<String>> {
        let ingredient_sets: Vec<NgramSet> = ingredients
            .iter()
            .map(String::as_str)
            .chain(title.filter(|t| !t.trim().is_empty()))
            .map(|text| self.ngrams(text))
            .collect();

        instructions
            .iter()
            .map(|step| self.mentions_for(&self.ngrams(step), &ingredient_sets))
            .collect()
    }

    /// Mentions in a single sentence.
    pub fn mentions_in(&self, sentence: &str, ingredients: &[String]) -> Vec<String> {
        let ingredient_sets: Vec<NgramSet> =
            ingredients.iter().map(|text| self.ngrams(text)).collect();
        self.mentions_for(&self.ngrams(sentence), &ingredient_sets)
    }

    fn mentions_for(&self, step: &NgramSet, ingredients: &[NgramSet]) -> Vec<String> {
        let mut found: Vec<String> = Vec::new();
        for ingredient in ingredients {
            let mut best: Option<&String> = None;
            for (lemma, surface) in &ingredient.grams {
                if !step.contains(lemma) || !self.can_stand_alone(lemma, surface) {
                    continue;
                }
                // Strictly longer only, so the first n-gram wins ties.
                if best.map_or(true, |b| surface.chars().count() > b.chars().count()) {
                    best = Some(surface);
                }
            }
            if let Some(mention) = best {
                if !found.contains(mention) {
                    found.push(mention.clone());
                }
            }
        }

        found
            .iter()
            .filter(|m| !found.iter().any(|other| other != *m && other.contains(m.as_str())))
            .cloned()
            .collect()
    }

    fn can_stand_alone(&self, lemma: &str, surface: &str) -> bool {
        if lemma.split(' ').any(|w| self.lexicon.is_stopword(w)) {
            return false;
        }
        !self.lexicon.is_modifier(lemma) && !self.lexicon.is_modifier(surface)
    }

    /// Content tokens of `text` as (surface, lemma) pairs.
    fn content_tokens(&self, text: &str) -> Vec<(String, String)> {
        let lower = text.replace('™', " ").to_lowercase();
        TOKEN_RE
            .find_iter(&lower)
            .map(|m| m.as_str())
            .filter(|t| t.chars().any(char::is_alphanumeric))
            .filter(|t| !self.lexicon.is_stopword(t) && !is_numeric(t))
            .map(|t| (t.to_string(), self.lexicon.lemmatize(t)))
            .collect()
    }

    fn ngrams(&self, text: &str) -> NgramSet {
        let tokens = self.content_tokens(text);
        let mut set = NgramSet::default();
        for n in 1..=MAX_NGRAM.min(tokens.len()) {
            for window in tokens.windows(n) {
                let lemma = window
                    .iter()
                    .map(|(_, l)| l.as_str())
                    .collect::<Vec<_>>()
                    .join(" ");
                let surface = window
                    .iter()
                    .map(|(s, _)| s.as_str())
                    .collect::<Vec<_>>()
                    .join(" ");
                set.grams.entry(lemma).or_insert(surface);
            }
        }
        set
    }
}

/// Numbers, ranges, and fractions such as `2`, `1.5`, `3-4`, `1/2`.
fn is_numeric(token: &str) -> bool {
    token.parse::<f64>().is_ok()
        || (token.chars().any(|c| c.is_ascii_digit())
            && token
                .chars()
                .all(|c| c.is_ascii_digit() || matches!(c, '-' | '/' | '.')))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_mentions_follow_ingredient_order() {
        let matcher = IngredientMatcher::default();
        let mentions = matcher.match_mentions(
            &strings(&["Heat tortillas and beans, then assemble tacos."]),
            &strings(&["beans", "tortillas", "avocado"]),
            None,
        );
        assert_eq!(mentions, vec![strings(&["beans", "tortillas"])]);
    }

    #[test]
    fn test_no_overlap_gives_no_mentions() {
        let matcher = IngredientMatcher::default();
        let mentions = matcher.mentions_in("Preheat the oven.", &strings(&["2 cups flour"]));
        assert!(mentions.is_empty());
    }

    #[test]
    fn test_longest_ngram_wins() {
        let matcher = IngredientMatcher::default();
        let mentions = matcher.mentions_in(
            "Stir in the orange juice.",
            &strings(&["1 cup orange juice"]),
        );
        assert_eq!(mentions, strings(&["orange juice"]));
    }

    #[test]
    fn test_substring_mentions_are_dropped() {
        let matcher = IngredientMatcher::default();
        let mentions = matcher.mentions_in(
            "Stir in the orange juice.",
            &strings(&["1 orange, zested", "1 cup orange juice"]),
        );
        assert_eq!(mentions, strings(&["orange juice"]));
    }

    #[test]
    fn test_modifiers_never_stand_alone() {
        let matcher = IngredientMatcher::default();
        let mentions =
            matcher.mentions_in("Add the diced peppers.", &strings(&["2 onions, diced"]));
        assert!(mentions.is_empty());
    }

    #[test]
    fn test_plural_and_singular_match() {
        let matcher = IngredientMatcher::default();
        let mentions = matcher.mentions_in("Slice the tomato thinly.", &strings(&["3 tomatoes"]));
        assert_eq!(mentions, strings(&["tomatoes"]));
    }

    #[test]
    fn test_units_and_numbers_ignored() {
        let matcher = IngredientMatcher::default();
        let mentions = matcher.mentions_in(
            "Measure 2 cups of water.",
            &strings(&["2 cups flour", "1/2 teaspoon salt"]),
        );
        assert!(mentions.is_empty());
    }

    #[test]
    fn test_title_counts_as_ingredient() {
        let matcher = IngredientMatcher::default();
        let mentions = matcher.match_mentions(
            &strings(&["Top the chili with cheese."]),
            &strings(&["1 cup cheddar"]),
            Some("Vegan Chili"),
        );
        assert_eq!(mentions, vec![strings(&["chili"])]);
    }

    #[test]
    fn test_is_numeric() {
        assert!(is_numeric("2"));
        assert!(is_numeric("1.5"));
        assert!(is_numeric("3-4"));
        assert!(is_numeric("1/2"));
        assert!(!is_numeric("low-fat"));
    }
}
