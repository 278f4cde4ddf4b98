//! Word lists for the scorer's spelling check.

use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, LazyLock};

pub trait Dictionary: Send + Sync + fmt::Debug {
    fn contains(&self, word: &str) -> bool;
}

static BUILTIN: LazyLock<Arc<WordList>> =
    LazyLock::new(|| Arc::new(WordList::parse(include_str!("../../data/dictionary.txt"))));

/// Newline-separated words, matched case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct WordList {
    words: HashSet<String>,
}

impl WordList {
    pub fn parse(text: &str) -> Self {
        let words = text
            .lines()
            .map(str::trim)
            .filter(|w| !w.is_empty() && !w.starts_with('#'))
            .map(str::to_lowercase)
            .collect();
        Self { words }
    }

    /// Load a list such as `/usr/share/dict/words`.
    pub fn from_file(path: &Path) -> std::io::Result<Self> {
        Ok(Self::parse(&std::fs::read_to_string(path)?))
    }

    /// The embedded cooking word list.
    pub fn builtin() -> Arc<WordList> {
        Arc::clone(&BUILTIN)
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

impl Dictionary for WordList {
    fn contains(&self, word: &str) -> bool {
        self.words.contains(&word.to_lowercase())
    }
}
