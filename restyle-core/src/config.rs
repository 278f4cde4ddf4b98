//! Engine configuration from environment variables.

use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use thiserror::Error;

pub const DEFAULT_CONTEXT_WINDOW: usize = 512;
pub const DEFAULT_MAX_NEW_TOKENS: usize = 128;
pub const DEFAULT_NUM_RETURN_SEQUENCES: usize = 1;

/// Rounds a task may run before it is finalized. Also the ceiling for
/// `max_rounds`.
pub const MAX_ROUNDS: usize = 20;

pub const DEFAULT_MAX_GENERATED_TOKENS: usize = 1024;
pub const DEFAULT_EMPTY_RETRY_LIMIT: usize = 2;

/// Tokens kept free for the continuation in the step phase.
const STEP_PHASE_RESERVE: usize = 30;
/// Tokens kept free for the continuation in the ingredient phase.
const INGREDIENT_PHASE_RESERVE: usize = 20;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Unknown generation mode: {0}")]
    UnknownMode(String),

    #[error("Unknown style tag: {0}")]
    UnknownTag(String),

    #[error("Recipe {recipe} is missing required field {field}")]
    MissingField { recipe: String, field: String },

    #[error("Invalid value {value:?} for {var}")]
    InvalidValue { var: String, value: String },

    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Mode {0} needs an ingredient source")]
    MissingIngredientSource(String),
}

/// Sampling settings passed through to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplingParams {
    pub temperature: f64,
    /// 0 disables top-k filtering.
    pub top_k: usize,
    pub top_p: f64,
    pub repetition_penalty: f64,
    pub seed: u64,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature: 1.0,
            top_k: 0,
            top_p: 0.9,
            repetition_penalty: 1.0,
            seed: 42,
        }
    }
}

/// Settings for the generation loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Token budget of the model, prompt included.
    pub context_window: usize,
    pub max_new_tokens: usize,
    /// Candidates sampled per prompt.
    pub num_return_sequences: usize,
    pub sampling: SamplingParams,
    pub max_rounds: usize,
    /// Cumulative generated tokens after which a task is finalized.
    pub max_generated_tokens: usize,
    /// Consecutive empty rounds re-submitted before advancing with an empty step.
    pub empty_retry_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            context_window: DEFAULT_CONTEXT_WINDOW,
            max_new_tokens: DEFAULT_MAX_NEW_TOKENS,
            num_return_sequences: DEFAULT_NUM_RETURN_SEQUENCES,
            sampling: SamplingParams::default(),
            max_rounds: MAX_ROUNDS,
            max_generated_tokens: DEFAULT_MAX_GENERATED_TOKENS,
            empty_retry_limit: DEFAULT_EMPTY_RETRY_LIMIT,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables.
    ///
    /// Optional, each falling back to its default:
    /// - `RESTYLE_CONTEXT_WINDOW`, `RESTYLE_MAX_NEW_TOKENS`, `RESTYLE_NUM_RETURN_SEQUENCES`
    /// - `RESTYLE_TEMPERATURE`, `RESTYLE_TOP_K`, `RESTYLE_TOP_P`,
    ///   `RESTYLE_REPETITION_PENALTY`, `RESTYLE_SEED`
    /// - `RESTYLE_MAX_ROUNDS` (capped at 20), `RESTYLE_MAX_GENERATED_TOKENS`,
    ///   `RESTYLE_EMPTY_RETRY_LIMIT`
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let sampling = SamplingParams {
            temperature: env_or("RESTYLE_TEMPERATURE", defaults.sampling.temperature)?,
            top_k: env_or("RESTYLE_TOP_K", defaults.sampling.top_k)?,
            top_p: env_or("RESTYLE_TOP_P", defaults.sampling.top_p)?,
            repetition_penalty: env_or(
                "RESTYLE_REPETITION_PENALTY",
                defaults.sampling.repetition_penalty,
            )?,
            seed: env_or("RESTYLE_SEED", defaults.sampling.seed)?,
        };

        Ok(Self {
            context_window: env_or("RESTYLE_CONTEXT_WINDOW", defaults.context_window)?,
            max_new_tokens: env_or("RESTYLE_MAX_NEW_TOKENS", defaults.max_new_tokens)?,
            num_return_sequences: env_or(
                "RESTYLE_NUM_RETURN_SEQUENCES",
                defaults.num_return_sequences,
            )?,
            sampling,
            max_rounds: env_or("RESTYLE_MAX_ROUNDS", defaults.max_rounds)?,
            max_generated_tokens: env_or(
                "RESTYLE_MAX_GENERATED_TOKENS",
                defaults.max_generated_tokens,
            )?,
            empty_retry_limit: env_or("RESTYLE_EMPTY_RETRY_LIMIT", defaults.empty_retry_limit)?,
        })
    }

    /// `max_rounds` clamped to 1..=20.
    pub fn round_limit(&self) -> usize {
        self.max_rounds.clamp(1, MAX_ROUNDS)
    }

    /// At least one candidate per prompt.
    pub fn candidates_per_prompt(&self) -> usize {
        self.num_return_sequences.max(1)
    }

    pub fn step_budget(&self) -> usize {
        self.context_window.saturating_sub(STEP_PHASE_RESERVE)
    }

    pub fn ingredient_budget(&self) -> usize {
        self.context_window.saturating_sub(INGREDIENT_PHASE_RESERVE)
    }

    pub fn full_recipe_budget(&self) -> usize {
        self.context_window / 2
    }
}

fn env_or<T: FromStr>(var: &str, default: T) -> Result<T, ConfigError> {
    match env::var(var) {
        Ok(value) => value.trim().parse().map_err(|_| ConfigError::InvalidValue {
            var: var.to_string(),
            value,
        }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.context_window, 512);
        assert_eq!(config.sampling.top_p, 0.9);
        assert_eq!(config.round_limit(), 20);
    }

    #[test]
    fn test_phase_budgets() {
        let config = EngineConfig {
            context_window: 100,
            ..EngineConfig::default()
        };
        assert_eq!(config.step_budget(), 70);
        assert_eq!(config.ingredient_budget(), 80);
        assert_eq!(config.full_recipe_budget(), 50);
    }

    #[test]
    fn test_round_limit_is_capped() {
        let config = EngineConfig {
            max_rounds: 50,
            ..EngineConfig::default()
        };
        assert_eq!(config.round_limit(), 20);

        let config = EngineConfig {
            max_rounds: 0,
            ..EngineConfig::default()
        };
        assert_eq!(config.round_limit(), 1);
    }

    #[test]
    fn test_env_or_rejects_garbage() {
        // Unique name so parallel tests never see it.
        let var = "RESTYLE_TEST_ENV_OR_GARBAGE";
        env::set_var(var, "lots");
        let err = env_or::<usize>(var, 3).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
        env::remove_var(var);
        assert_eq!(env_or::<usize>(var, 3).unwrap(), 3);
    }
}
