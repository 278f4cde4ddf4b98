//! Continuation parsing.
//!
//! Models return full sequences. The continuation is what follows the
//! prompt; from it the engine keeps either the first new segment or every
//! segment up to a termination marker.

use crate::markers::{self, normalize_whitespace};
use crate::tokenizer::Tokenizer;

/// Generated text following a prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Continuation {
    pub text: String,
    /// Tokens the continuation took.
    pub tokens: usize,
}

/// Strip the prompt from a returned sequence.
///
/// Prefers an exact token prefix, then a match on whitespace-normalized
/// text. When neither is found the whole sequence is treated as new text.
pub fn continuation(tokenizer: &dyn Tokenizer, prompt: &[u32], sequence: &[u32]) -> Continuation {
    if sequence.starts_with(prompt) {
        let rest = &sequence[prompt.len()..];
        return Continuation {
            text: tokenizer.decode(rest),
            tokens: rest.len(),
        };
    }

    let prompt_text = normalize_whitespace(&tokenizer.decode(prompt));
    let full = normalize_whitespace(&tokenizer.decode(sequence));
    let text = match full.strip_prefix(prompt_text.as_str()) {
        Some(rest) => rest.to_string(),
        None => match full.rfind(prompt_text.as_str()) {
            Some(pos) => full[pos + prompt_text.len()..].to_string(),
            None => {
                tracing::warn!(
                    prompt_tokens = prompt.len(),
                    sequence_tokens = sequence.len(),
                    "Prompt not found in model output, using the whole sequence"
                );
                full
            }
        },
    };
    let tokens = tokenizer.count(&text);
    Continuation { text, tokens }
}

/// Earliest position of any of `needles` in `text`, with the needle found.
fn find_first<'a>(text: &str, needles: &[&'a str]) -> Option<(usize, &'a str)> {
    needles
        .iter()
        .filter_map(|n| text.find(n).map(|pos| (pos, *n)))
        .min_by_key(|(pos, _)| *pos)
}

/// The first new segment of a continuation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub text: String,
    /// A termination marker closed the segment.
    pub terminal: bool,
}

/// Cut a continuation at its first separator or termination marker.
pub fn first_segment(continuation: &str) -> Segment {
    let mut stops = vec![markers::INST];
    stops.extend(markers::TERMINATORS);
    match find_first(continuation, &stops) {
        Some((pos, marker)) => Segment {
            text: normalize_whitespace(&continuation[..pos]),
            terminal: marker != markers::INST,
        },
        None => Segment {
            text: normalize_whitespace(continuation),
            terminal: false,
        },
    }
}

/// Every segment of a continuation up to its first termination marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segments {
    pub steps: Vec<String>,
    pub terminal: bool,
}

pub fn all_segments(continuation: &str) -> Segments {
    let (body, terminal) = match find_first(continuation, &markers::TERMINATORS) {
        Some((pos, _)) => (&continuation[..pos], true),
        None => (continuation, false),
    };
    let steps = body
        .split(markers::INST)
        .map(normalize_whitespace)
        .filter(|s| !s.is_empty())
        .collect();
    Segments { steps, terminal }
}

/// The mention list an ingredient-phase continuation predicts.
///
/// Empty output and the `<noings>` sentinel both give an empty list.
pub fn parse_mentions(continuation: &str) -> Vec<String> {
    let mut stops: Vec<&str> = markers::TERMINATORS.to_vec();
    stops.push(markers::END_PROMPT);
    let body = match find_first(continuation, &stops) {
        Some((pos, _)) => &continuation[..pos],
        None => continuation,
    };

    let mut mentions: Vec<String> = Vec::new();
    for mention in body.split(markers::ING).map(markers::strip_markers) {
        if !mention.is_empty() && !mentions.contains(&mention) {
            mentions.push(mention);
        }
    }
    mentions
}
