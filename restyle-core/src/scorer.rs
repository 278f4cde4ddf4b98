//! Candidate scoring.
//!
//! Ranks sampled continuations with additive heuristics: formatting,
//! spelling against the source step, dietary compliance toward the target
//! tag, and ingredient overlap with the source step. Higher is better.

use regex::Regex;
use std::sync::{Arc, LazyLock};

use crate::compliance::{ComplianceChecker, RuleTableChecker};
use crate::dictionary::{Dictionary, WordList};
use crate::markers;
use crate::matcher::IngredientMatcher;
use crate::types::StyleTag;

/// Characters a step should not contain.
const DISALLOWED: [&str; 9] = ["*", "#", "$", "^", "%", "=", "+", "\"", " : "];

/// Score of a candidate with no text. Loses to any non-empty candidate.
pub const EMPTY_SCORE: f64 = f64::NEG_INFINITY;

static SEPARATOR_RE: LazyLock<Regex> = LazyLock::new(|| {
    let inst = regex::escape(markers::INST);
    Regex::new(&format!("[A-Za-z] {inst}|{inst} [a-z]")).expect("separator pattern is valid")
});

static WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\w+").expect("word pattern is valid"));

/// Undo the tokenizer artifact that drops the accent from "Sauté".
pub fn repair(text: &str) -> String {
    text.replace("Saut ", "Saute ").replace("saut ", "saute ")
}

/// Index of the highest score; ties keep the first.
pub fn select_best(scores: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &score) in scores.iter().enumerate() {
        if best.map_or(true, |(_, b)| score > b) {
            best = Some((i, score));
        }
    }
    best.map(|(i, _)| i)
}

#[derive(Debug, Clone)]
pub struct CandidateScorer {
    matcher: IngredientMatcher,
    dictionary: Arc<dyn Dictionary>,
    checker: Arc<dyn ComplianceChecker>,
}

impl Default for CandidateScorer {
    fn default() -> Self {
        Self::new(
            IngredientMatcher::default(),
            WordList::builtin(),
            RuleTableChecker::builtin(),
        )
    }
}

impl CandidateScorer {
    pub fn new(
        matcher: IngredientMatcher,
        dictionary: Arc<dyn Dictionary>,
        checker: Arc<dyn ComplianceChecker>,
    ) -> Self {
        Self {
            matcher,
            dictionary,
            checker,
        }
    }

    pub fn matcher(&self) -> &IngredientMatcher {
        &self.matcher
    }

    /// Score a rewritten step.
    ///
    /// `vocabulary` is the ingredient list both the source step and the
    /// candidate are matched against.
    pub fn score_step(
        &self,
        candidate: &str,
        source_step: &str,
        target: &StyleTag,
        vocabulary: &[String],
    ) -> f64 {
        let text = markers::strip_terminators(&repair(candidate));

        let format = format_penalty(&text);
        let spelling = self.dictionary_penalty(&text, source_step);
        let violations = self.checker.check_violations(&text, target);
        let source_mentions = self.matcher.mentions_in(source_step, vocabulary);
        let candidate_mentions = self.matcher.mentions_in(&text, vocabulary);
        let overlap = similarity(&source_mentions, &candidate_mentions);

        let score = format + spelling - 100.0 * violations as f64 + overlap;
        tracing::debug!(
            candidate = %text,
            format,
            spelling,
            violations,
            overlap,
            score,
            "Scored step candidate"
        );
        score
    }

    /// Score a predicted ingredient-mention list for the step being rewritten.
    pub fn score_mentions(
        &self,
        mentions: &[String],
        source_step: &str,
        target: &StyleTag,
        vocabulary: &[String],
    ) -> f64 {
        let violations = self.checker.check_violations(&mentions.join(" "), target);
        let source_mentions = self.matcher.mentions_in(source_step, vocabulary);
        let score = similarity(&source_mentions, mentions) - 100.0 * violations as f64;
        tracing::debug!(?mentions, violations, score, "Scored mention candidate");
        score
    }

    /// −1 per alphabetic word that is neither in the dictionary nor in the source step.
    fn dictionary_penalty(&self, text: &str, source_step: &str) -> f64 {
        let unknown = WORD_RE
            .find_iter(text)
            .map(|m| m.as_str())
            .filter(|w| w.chars().all(char::is_alphabetic))
            .filter(|w| !self.dictionary.contains(w) && !source_step.contains(w))
            .count();
        -(unknown as f64)
    }
}

/// Penalties for text that does not look like a single well-formed step.
pub fn format_penalty(text: &str) -> f64 {
    let length = text.chars().count();
    let mut score = 0.0;

    if markers::contains_marker(text) || length > 80 {
        score -= 1.0;
        if length > 100 {
            score -= 1.0;
        }
        if length > 120 {
            score -= 1.0;
        }
        if length > 150 {
            score -= 5.0;
        }
    }
    if DISALLOWED.iter().any(|s| text.contains(s)) {
        score -= 1.0;
    }
    if !text.chars().next().is_some_and(char::is_uppercase) {
        score -= 5.0;
    }
    if SEPARATOR_RE.is_match(text) {
        score -= 1.0;
    }
    if text.chars().last().is_some_and(char::is_alphabetic) {
        score -= 5.0;
    }
    score - glued_punctuation(text) as f64
}

/// Punctuation marks directly followed by a letter.
fn glued_punctuation(text: &str) -> usize {
    text.chars()
        .zip(text.chars().skip(1))
        .filter(|&(c, next)| matches!(c, ',' | '.' | '!' | '?') && next.is_alphabetic())
        .count()
}

/// Overlap bonus between the mentions of the source step and of a candidate.
fn similarity(source: &[String], candidate: &[String]) -> f64 {
    let shared = source.iter().filter(|m| candidate.contains(m)).count();
    let mut score =
        2.0 * shared as f64 - 0.5 * (source.len() as f64 - candidate.len() as f64).abs();
    if source.is_empty() && candidate.is_empty() {
        score += 1.0;
    }
    score
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vegan() -> StyleTag {
        "vegan".parse().unwrap()
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_clean_step_has_no_format_penalty() {
        assert_eq!(format_penalty("Heat the oil."), 0.0);
    }

    #[test]
    fn test_format_penalties() {
        // Lowercase start and no closing punctuation.
        assert_eq!(format_penalty("heat the oil"), -10.0);
        assert_eq!(format_penalty("Heat the oil.Add salt."), -1.0);
        assert_eq!(format_penalty("Mix in a.b.c well."), -2.0);
        assert_eq!(format_penalty("Mix well.,stir."), -1.0);
        assert_eq!(format_penalty("Heat * oil."), -1.0);
        assert_eq!(format_penalty("Heat the oil. <ing>"), -1.0);
        // Leaked separator, also missing punctuation before it.
        assert_eq!(format_penalty("Heat the oil <inst> Stir."), -2.0);
    }

    #[test]
    fn test_length_penalties_accumulate() {
        let long = format!("{}.", "Stir ".repeat(20));
        assert_eq!(long.chars().count(), 101);
        assert_eq!(format_penalty(&long), -2.0);

        let longer = format!("{}.", "Stir ".repeat(31));
        assert_eq!(format_penalty(&longer), -8.0);
    }

    #[test]
    fn test_unknown_words_are_penalized_unless_in_source() {
        let scorer = CandidateScorer::default();
        let tag: StyleTag = "non-vegan".parse().unwrap();
        let novel = scorer.score_step("Heat the zorbly.", "Heat the oil.", &tag, &[]);
        let copied = scorer.score_step("Heat the zorbly.", "Heat the zorbly oil.", &tag, &[]);
        assert_eq!(copied - novel, 1.0);
    }

    #[test]
    fn test_compliant_candidate_wins() {
        let scorer = CandidateScorer::default();
        let vocab = strings(&["bacon", "tofu"]);
        let tofu = scorer.score_step("Fry the tofu.", "Fry the bacon.", &vegan(), &vocab);
        let bacon = scorer.score_step("Fry the bacon.", "Fry the bacon.", &vegan(), &vocab);
        assert!(tofu > bacon);
    }

    #[test]
    fn test_saut_is_repaired() {
        assert_eq!(repair("Saut the onions."), "Saute the onions.");
        let scorer = CandidateScorer::default();
        let tag = vegan();
        assert_eq!(
            scorer.score_step("Saut the onions.", "", &tag, &[]),
            scorer.score_step("Saute the onions.", "", &tag, &[])
        );
    }

    #[test]
    fn test_terminators_are_not_penalized() {
        let scorer = CandidateScorer::default();
        let tag = vegan();
        assert_eq!(
            scorer.score_step("Serve warm. <endofinst>", "", &tag, &[]),
            scorer.score_step("Serve warm.", "", &tag, &[])
        );
    }

    #[test]
    fn test_similarity() {
        assert_eq!(similarity(&[], &[]), 1.0);
        assert_eq!(
            similarity(&strings(&["beans", "rice"]), &strings(&["beans"])),
            1.5
        );
    }

    #[test]
    fn test_mention_candidates() {
        let scorer = CandidateScorer::default();
        let vocab = strings(&["butter", "nondairy butter"]);
        let good = scorer.score_mentions(&strings(&["nondairy butter"]), "Melt the butter.", &vegan(), &vocab);
        let bad = scorer.score_mentions(&strings(&["butter"]), "Melt the butter.", &vegan(), &vocab);
        assert!(good > bad);
    }

    #[test]
    fn test_select_best_keeps_first_on_ties() {
        assert_eq!(select_best(&[1.0, 3.0, 3.0]), Some(1));
        assert_eq!(select_best(&[EMPTY_SCORE, EMPTY_SCORE]), Some(0));
        assert_eq!(select_best(&[EMPTY_SCORE, -50.0]), Some(1));
        assert_eq!(select_best(&[]), None);
    }
}
