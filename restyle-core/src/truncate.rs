//! Context-window truncation.
//!
//! An over-long prompt is shortened by deleting whole segments: for a boundary
//! token, the span from just after the nearest preceding marker through the
//! first occurrence of the boundary is removed. Boundaries are tried in
//! priority order until the prompt fits.

use crate::markers;
use crate::tokenizer::Tokenizer;

/// Boundary tokens in the order they are tried.
pub const DEFAULT_BOUNDARIES: [&str; 4] = [markers::INST, markers::ING, ":", "."];

/// Result of shortening a prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Truncated {
    pub tokens: Vec<u32>,
    pub within_budget: bool,
}

/// Shorten `tokens` to at most `budget` ids.
///
/// `boundaries` are token ids tried in order; ids at or above `threshold` are
/// markers. A prompt already within budget is returned unchanged. When every
/// boundary is exhausted the best-effort result is returned with
/// `within_budget == false`.
pub fn truncate(tokens: &[u32], budget: usize, boundaries: &[u32], threshold: u32) -> Truncated {
    let mut tokens = tokens.to_vec();
    if tokens.len() <= budget {
        return Truncated {
            tokens,
            within_budget: true,
        };
    }

    for &boundary in boundaries {
        let occurrences = tokens.iter().filter(|&&t| t == boundary).count();
        for _ in 0..occurrences {
            let Some(end) = tokens.iter().position(|&t| t == boundary) else {
                break;
            };
            let start = tokens[..end]
                .iter()
                .rposition(|&t| t >= threshold)
                .map_or(0, |marker| marker + 1);
            tokens.drain(start..=end);

            if tokens.len() <= budget {
                return Truncated {
                    tokens,
                    within_budget: true,
                };
            }
        }
    }

    Truncated {
        tokens,
        within_budget: false,
    }
}

/// Truncate a prompt string with the default boundaries.
pub fn truncate_prompt(tokenizer: &dyn Tokenizer, prompt: &str, budget: usize) -> Truncated {
    let tokens = tokenizer.encode(prompt);
    let boundaries: Vec<u32> = DEFAULT_BOUNDARIES
        .iter()
        .filter_map(|b| tokenizer.token_id(b))
        .collect();
    truncate(&tokens, budget, &boundaries, tokenizer.special_threshold())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::WordTokenizer;

    #[test]
    fn test_within_budget_is_noop() {
        let tokens = vec![1, 2, 3];
        let out = truncate(&tokens, 3, &[2], 100);
        assert_eq!(out.tokens, tokens);
        assert!(out.within_budget);
    }

    #[test]
    fn test_removes_first_segment_after_marker() {
        // 100 = marker, 50 = boundary
        let tokens = vec![100, 1, 2, 50, 3, 4, 50, 5];
        let out = truncate(&tokens, 6, &[50], 100);
        assert_eq!(out.tokens, vec![100, 3, 4, 50, 5]);
        assert!(out.within_budget);
    }

    #[test]
    fn test_falls_through_to_next_boundary() {
        let tokens = vec![100, 1, 60, 2, 50, 3];
        let out = truncate(&tokens, 2, &[50, 60], 100);
        // First pass removes "1 60 2 50", leaving [100, 3].
        assert_eq!(out.tokens, vec![100, 3]);
        assert!(out.within_budget);
    }

    #[test]
    fn test_no_marker_deletes_from_start() {
        let tokens = vec![1, 2, 50, 3, 4];
        let out = truncate(&tokens, 2, &[50], 100);
        assert_eq!(out.tokens, vec![3, 4]);
        assert!(out.within_budget);
    }

    #[test]
    fn test_best_effort_when_budget_unreachable() {
        let tokens = vec![100, 1, 50, 2, 3, 4];
        let out = truncate(&tokens, 2, &[50], 100);
        assert_eq!(out.tokens, vec![100, 2, 3, 4]);
        assert!(!out.within_budget);
    }

    #[test]
    fn test_prompt_drops_oldest_steps() {
        let tok = WordTokenizer::new();
        let prompt = "<|startoftext|> Soup <endoftitle> Boil water. <inst> Add salt. <inst> Serve hot. <endofinst>";
        let full = tok.encode(prompt).len();
        let out = truncate_prompt(&tok, prompt, full - 4);
        assert!(out.within_budget);
        assert_eq!(
            tok.decode(&out.tokens),
            "<|startoftext|> Soup <endoftitle> Add salt. <inst> Serve hot. <endofinst>"
        );
    }
}
