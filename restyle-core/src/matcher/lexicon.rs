//! Stopword, modifier, and lemma tables for the ingredient matcher.
//!
//! Tables are loaded from `data/matcher_vocabulary.json` at compile time and
//! can also be read from a file to test a revised vocabulary.

use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, LazyLock};

use crate::error::RulesError;

#[derive(Deserialize)]
struct VocabularyData {
    version: String,
    stopwords: Vec<String>,
    #[serde(default)]
    extra_stopwords: Vec<String>,
    #[serde(default)]
    modifier_words: Vec<String>,
    #[serde(default)]
    lemma_overrides: HashMap<String, String>,
    #[serde(default)]
    irregular_lemmas: HashMap<String, String>,
}

static BUILTIN: LazyLock<Arc<Lexicon>> = LazyLock::new(|| {
    let json = include_str!("../../../data/matcher_vocabulary.json");
    Arc::new(Lexicon::from_json(json).expect("Failed to parse matcher_vocabulary.json"))
});

#[derive(Debug, Clone)]
pub struct Lexicon {
    version: String,
    stopwords: HashSet<String>,
    modifiers: HashSet<String>,
    lemma_overrides: HashMap<String, String>,
    irregular: HashMap<String, String>,
}

impl Lexicon {
    pub fn from_json(json: &str) -> Result<Self, RulesError> {
        let data: VocabularyData = serde_json::from_str(json)?;
        let stopwords = data
            .stopwords
            .into_iter()
            .chain(data.extra_stopwords)
            .map(|w| w.to_lowercase())
            .collect();
        Ok(Self {
            version: data.version,
            stopwords,
            modifiers: data.modifier_words.into_iter().collect(),
            lemma_overrides: data.lemma_overrides,
            irregular: data.irregular_lemmas,
        })
    }

    pub fn from_file(path: &Path) -> Result<Self, RulesError> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    /// The embedded vocabulary.
    pub fn builtin() -> Arc<Lexicon> {
        Arc::clone(&BUILTIN)
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn is_stopword(&self, word: &str) -> bool {
        self.stopwords.contains(word)
    }

    /// Words that qualify an ingredient but never name one alone.
    pub fn is_modifier(&self, phrase: &str) -> bool {
        self.modifiers.contains(phrase)
    }

    /// Reduce a lowercase token to its dictionary form.
    pub fn lemmatize(&self, word: &str) -> String {
        let lemma = match self.irregular.get(word) {
            Some(lemma) => lemma.clone(),
            None => regular_lemma(word),
        };
        match self.lemma_overrides.get(&lemma) {
            Some(fixed) => fixed.clone(),
            None => lemma,
        }
    }
}

fn regular_lemma(word: &str) -> String {
    if !word.chars().all(|c| c.is_alphabetic()) || word.len() <= 3 {
        return word.to_string();
    }
    if let Some(stem) = word.strip_suffix("ies") {
        return format!("{}y", stem);
    }
    if word.ends_with("sses") {
        return word[..word.len() - 2].to_string();
    }
    for suffix in ["shes", "ches", "xes", "zes"] {
        if word.ends_with(suffix) {
            return word[..word.len() - 2].to_string();
        }
    }
    if word.ends_with('s') && !["ss", "us", "is"].iter().any(|s| word.ends_with(s)) {
        return word[..word.len() - 1].to_string();
    }
    word.to_string()
}
