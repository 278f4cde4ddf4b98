//! Text tokenization for token-budget management.
//!
//! The truncator and the generation loop count and cut prompts in token ids.
//! [`WordTokenizer`] is a lossless word-level tokenizer that maps every segment
//! marker to a single id at or above [`Tokenizer::special_threshold`].

use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::sync::{LazyLock, RwLock};

use crate::markers;

/// First id used for marker tokens.
pub const SPECIAL_BASE: u32 = 1 << 24;

pub trait Tokenizer: Send + Sync + fmt::Debug {
    fn encode(&self, text: &str) -> Vec<u32>;

    fn decode(&self, ids: &[u32]) -> String;

    /// Id of a single token, if the tokenizer knows it.
    fn token_id(&self, token: &str) -> Option<u32>;

    /// Ids at or above this value are marker tokens.
    fn special_threshold(&self) -> u32;

    /// Number of tokens `text` encodes to.
    fn count(&self, text: &str) -> usize {
        self.encode(text).len()
    }
}

static PIECE_RE: LazyLock<Regex> = LazyLock::new(|| {
    let pattern = format!(r"(?P<marker>{})|\s+|\w+|[^\s\w]", markers::marker_regex().as_str());
    Regex::new(&pattern).expect("token pattern is valid")
});

#[derive(Debug)]
struct Vocab {
    ids: HashMap<String, u32>,
    pieces: Vec<String>,
    special_ids: HashMap<String, u32>,
    special_pieces: Vec<String>,
    /// Ordinary ids stay below this, which is at most `SPECIAL_BASE`.
    ordinary_limit: u32,
}

impl Vocab {
    fn new(ordinary_limit: u32) -> Self {
        Self {
            ids: HashMap::new(),
            pieces: Vec::new(),
            special_ids: HashMap::new(),
            special_pieces: Vec::new(),
            ordinary_limit: ordinary_limit.min(SPECIAL_BASE),
        }
    }

    /// `None` once the ordinary id range is used up.
    fn ordinary(&mut self, piece: &str) -> Option<u32> {
        if let Some(&id) = self.ids.get(piece) {
            return Some(id);
        }
        let id = u32::try_from(self.pieces.len())
            .ok()
            .filter(|&id| id < self.ordinary_limit)?;
        self.pieces.push(piece.to_string());
        self.ids.insert(piece.to_string(), id);
        Some(id)
    }

    fn special(&mut self, piece: &str) -> u32 {
        if let Some(&id) = self.special_ids.get(piece) {
            return id;
        }
        let id = SPECIAL_BASE + self.special_pieces.len() as u32;
        self.special_pieces.push(piece.to_string());
        self.special_ids.insert(piece.to_string(), id);
        id
    }

    fn piece(&self, id: u32) -> Option<&str> {
        if id >= SPECIAL_BASE {
            self.special_pieces
                .get((id - SPECIAL_BASE) as usize)
                .map(|s| s.as_str())
        } else {
            self.pieces.get(id as usize).map(|s| s.as_str())
        }
    }
}

/// Word-level tokenizer with a vocabulary that grows as text is encoded.
///
/// Each whitespace run, word, and punctuation mark is one token, so
/// `decode(encode(s)) == s` while the vocabulary has room. Ordinary ids
/// never reach [`SPECIAL_BASE`]: once 2^24 distinct pieces have been seen,
/// new pieces are dropped from the encoding with a warning.
#[derive(Debug)]
pub struct WordTokenizer {
    vocab: RwLock<Vocab>,
}

impl WordTokenizer {
    pub fn new() -> Self {
        Self::with_ordinary_limit(SPECIAL_BASE)
    }

    fn with_ordinary_limit(limit: u32) -> Self {
        let mut vocab = Vocab::new(limit);
        for marker in markers::all_markers() {
            vocab.special(&marker);
        }
        Self {
            vocab: RwLock::new(vocab),
        }
    }

    /// Number of distinct ordinary tokens seen so far.
    pub fn vocab_size(&self) -> usize {
        self.vocab.read().unwrap().pieces.len()
    }
}

impl Default for WordTokenizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Tokenizer for WordTokenizer {
    fn encode(&self, text: &str) -> Vec<u32> {
        let mut vocab = self.vocab.write().unwrap();
        PIECE_RE
            .captures_iter(text)
            .filter_map(|caps| match caps.name("marker") {
                Some(m) => Some(vocab.special(m.as_str())),
                None => {
                    let id = vocab.ordinary(&caps[0]);
                    if id.is_none() {
                        tracing::warn!(piece = &caps[0], "Vocabulary full, dropping token");
                    }
                    id
                }
            })
            .collect()
    }

    fn decode(&self, ids: &[u32]) -> String {
        let vocab = self.vocab.read().unwrap();
        let mut out = String::new();
        for &id in ids {
            match vocab.piece(id) {
                Some(piece) => out.push_str(piece),
                None => tracing::warn!(id, "Dropping unknown token id"),
            }
        }
        out
    }

    fn token_id(&self, token: &str) -> Option<u32> {
        let vocab = self.vocab.read().unwrap();
        vocab
            .special_ids
            .get(token)
            .or_else(|| vocab.ids.get(token))
            .copied()
    }

    fn special_threshold(&self) -> u32 {
        SPECIAL_BASE
    }
}
