//! Abstraction over the sequence-generation model.
//!
//! The engine owns all token-budget management; a model only samples
//! continuations for prompts it is handed. Implementations return every
//! sequence in full, prompt tokens first.

mod caching;
mod fake;
mod http;

pub use caching::{CacheStats, CachingModel};
pub use fake::FakeModel;
pub use http::HttpModel;

use async_trait::async_trait;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

use crate::config::SamplingParams;
use crate::tokenizer::Tokenizer;

pub const DEFAULT_MODEL_NAME: &str = "recipe-gpt2";
pub const DEFAULT_INGREDIENT_MODEL_NAME: &str = "recipe-gpt2-ingredients";
pub const DEFAULT_CACHE_DIR: &str = ".cache/generation";

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Generation request failed: {0}")]
    RequestFailed(String),

    #[error("Model endpoint returned error: {status} - {message}")]
    ApiError { status: u16, message: String },

    #[error("Failed to parse model response: {0}")]
    ParseError(String),

    #[error("Model not configured: {0}")]
    NotConfigured(String),

    #[error("Cache error: {0}")]
    CacheError(String),
}

/// Sequences sampled for one prompt.
pub type Samples = Vec<Vec<u32>>;

#[async_trait]
pub trait GenerationModel: Send + Sync + fmt::Debug {
    /// Sample `n` continuations for each prompt.
    ///
    /// The result has one entry per prompt, each holding `n` full sequences.
    async fn generate(
        &self,
        prompts: &[Vec<u32>],
        max_new_tokens: usize,
        params: &SamplingParams,
        n: usize,
    ) -> Result<Vec<Samples>, ModelError>;

    /// Provider name (e.g., "http", "fake").
    fn provider_name(&self) -> &'static str;

    fn model_name(&self) -> &str;
}

/// Build the model named by the environment.
///
/// - `RESTYLE_MODEL`: "fake" | "http" (default "fake")
/// - `RESTYLE_MODEL_URL`: generation endpoint, required for "http"
/// - `RESTYLE_MODEL_NAME`: model name sent to the endpoint
pub fn create_model_from_env(
    tokenizer: Arc<dyn Tokenizer>,
) -> Result<Box<dyn GenerationModel>, ModelError> {
    let provider = std::env::var("RESTYLE_MODEL").unwrap_or_else(|_| "fake".to_string());

    match provider.as_str() {
        "fake" => Ok(Box::new(FakeModel::new(tokenizer).with_default_response(
            crate::markers::END_RECIPE,
        ))),
        "http" => {
            let url = std::env::var("RESTYLE_MODEL_URL")
                .map_err(|_| ModelError::NotConfigured("RESTYLE_MODEL_URL not set".to_string()))?;
            let model = std::env::var("RESTYLE_MODEL_NAME")
                .unwrap_or_else(|_| DEFAULT_MODEL_NAME.to_string());
            Ok(Box::new(HttpModel::new(url, model, tokenizer)))
        }
        other => Err(ModelError::NotConfigured(format!(
            "Unknown model provider: {}",
            other
        ))),
    }
}

/// Build the ingredient-prediction model named by the environment.
///
/// Uses the same provider as [`create_model_from_env`]. For "http",
/// `RESTYLE_INGREDIENT_MODEL_URL` falls back to `RESTYLE_MODEL_URL` and the
/// name comes from `RESTYLE_INGREDIENT_MODEL_NAME`. The fake model predicts
/// no ingredients.
pub fn create_ingredient_model_from_env(
    tokenizer: Arc<dyn Tokenizer>,
) -> Result<Box<dyn GenerationModel>, ModelError> {
    let provider = std::env::var("RESTYLE_MODEL").unwrap_or_else(|_| "fake".to_string());

    match provider.as_str() {
        "fake" => Ok(Box::new(FakeModel::new(tokenizer).with_default_response(
            &format!("{} {}", crate::markers::NO_INGS, crate::markers::END_TEXT),
        ))),
        "http" => {
            let url = std::env::var("RESTYLE_INGREDIENT_MODEL_URL")
                .or_else(|_| std::env::var("RESTYLE_MODEL_URL"))
                .map_err(|_| {
                    ModelError::NotConfigured(
                        "RESTYLE_INGREDIENT_MODEL_URL or RESTYLE_MODEL_URL not set".to_string(),
                    )
                })?;
            let model = std::env::var("RESTYLE_INGREDIENT_MODEL_NAME")
                .unwrap_or_else(|_| DEFAULT_INGREDIENT_MODEL_NAME.to_string());
            Ok(Box::new(HttpModel::new(url, model, tokenizer)))
        }
        other => Err(ModelError::NotConfigured(format!(
            "Unknown model provider: {}",
            other
        ))),
    }
}

/// Like [`create_model_from_env`], with the disk cache in front.
///
/// The cache directory is `RESTYLE_MODEL_CACHE_DIR` or `.cache/generation`.
pub fn create_cached_model_from_env(
    tokenizer: Arc<dyn Tokenizer>,
) -> Result<Box<dyn GenerationModel>, ModelError> {
    let inner = create_model_from_env(Arc::clone(&tokenizer))?;

    let cache_dir = std::env::var("RESTYLE_MODEL_CACHE_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CACHE_DIR));

    Ok(Box::new(CachingModel::new(inner, tokenizer, cache_dir)))
}
