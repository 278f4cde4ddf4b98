//! Disk cache in front of a generation model.
//!
//! Each prompt is cached separately, keyed by the SHA-256 of its text together
//! with the sampling settings, so a batch that repeats earlier prompts only
//! sends the new ones to the wrapped model. Sequences are stored as text and
//! re-encoded on a hit, since token ids are not stable across tokenizers.
//!
//! A prompt submitted again by the same `CachingModel` is a new attempt with
//! its own cache entry, so retrying a prompt samples fresh continuations and a
//! rerun replays every attempt in order.

use super::{GenerationModel, ModelError, Samples};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::config::SamplingParams;
use crate::tokenizer::Tokenizer;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheMetadata {
    pub provider: String,
    pub model: String,
    pub prompt_hash: String,
    pub cached_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedSamples {
    metadata: CacheMetadata,
    sequences: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub cached_prompts: usize,
}

#[derive(Debug)]
pub struct CachingModel {
    inner: Box<dyn GenerationModel>,
    tokenizer: Arc<dyn Tokenizer>,
    cache_dir: PathBuf,
    /// Times each prompt key has been requested by this instance.
    attempts: Mutex<HashMap<String, usize>>,
}

impl CachingModel {
    pub fn new(
        inner: Box<dyn GenerationModel>,
        tokenizer: Arc<dyn Tokenizer>,
        cache_dir: PathBuf,
    ) -> Self {
        Self {
            inner,
            tokenizer,
            cache_dir,
            attempts: Mutex::new(HashMap::new()),
        }
    }

    fn cache_key(
        &self,
        prompt: &str,
        max_new_tokens: usize,
        params: &SamplingParams,
        n: usize,
        attempt: usize,
    ) -> String {
        let mut hasher = Sha256::new();
        hasher.update(prompt.as_bytes());
        // Serializing a struct of numbers cannot fail.
        hasher.update(serde_json::to_string(params).unwrap_or_default().as_bytes());
        hasher.update(format!("|{}|{}", max_new_tokens, n).as_bytes());
        if attempt > 0 {
            hasher.update(format!("|attempt{}", attempt).as_bytes());
        }
        let result = hasher.finalize();

        // First 16 bytes (32 hex chars) keep filenames short.
        hex::encode(&result[..16])
    }

    fn model_cache_dir(&self) -> PathBuf {
        self.cache_dir
            .join(self.inner.provider_name())
            .join(self.inner.model_name().replace(['/', ':'], "_"))
    }

    fn cache_path(&self, prompt_hash: &str) -> PathBuf {
        self.model_cache_dir().join(format!("{}.json", prompt_hash))
    }

    fn get_cached(&self, prompt_hash: &str) -> Option<Samples> {
        let content = fs::read_to_string(self.cache_path(prompt_hash)).ok()?;
        let cached: CachedSamples = serde_json::from_str(&content).ok()?;
        tracing::debug!(
            provider = self.inner.provider_name(),
            model = self.inner.model_name(),
            prompt_hash,
            "Generation cache hit"
        );
        Some(
            cached
                .sequences
                .iter()
                .map(|text| self.tokenizer.encode(text))
                .collect(),
        )
    }

    fn save_to_cache(&self, prompt_hash: &str, samples: &Samples) -> Result<(), ModelError> {
        let dir = self.model_cache_dir();
        fs::create_dir_all(&dir).map_err(|e| ModelError::CacheError(e.to_string()))?;

        let cached = CachedSamples {
            metadata: CacheMetadata {
                provider: self.inner.provider_name().to_string(),
                model: self.inner.model_name().to_string(),
                prompt_hash: prompt_hash.to_string(),
                cached_at: Utc::now(),
            },
            sequences: samples.iter().map(|s| self.tokenizer.decode(s)).collect(),
        };

        let content = serde_json::to_string_pretty(&cached)
            .map_err(|e| ModelError::CacheError(e.to_string()))?;
        fs::write(self.cache_path(prompt_hash), content)
            .map_err(|e| ModelError::CacheError(e.to_string()))?;

        tracing::debug!(prompt_hash, "Generation cached");
        Ok(())
    }

    pub fn cache_stats(&self) -> CacheStats {
        let mut stats = CacheStats::default();
        if let Ok(entries) = fs::read_dir(self.model_cache_dir()) {
            stats.cached_prompts = entries
                .filter_map(|e| e.ok())
                .filter(|e| e.path().extension().is_some_and(|ext| ext == "json"))
                .count();
        }
        stats
    }
}

#[async_trait]
impl GenerationModel for CachingModel {
    async fn generate(
        &self,
        prompts: &[Vec<u32>],
        max_new_tokens: usize,
        params: &SamplingParams,
        n: usize,
    ) -> Result<Vec<Samples>, ModelError> {
        let keys: Vec<String> = {
            let mut attempts = self.attempts.lock().unwrap();
            prompts
                .iter()
                .map(|p| {
                    let text = self.tokenizer.decode(p);
                    let base = self.cache_key(&text, max_new_tokens, params, n, 0);
                    let count = attempts.entry(base.clone()).or_insert(0);
                    let attempt = *count;
                    *count += 1;
                    if attempt == 0 {
                        base
                    } else {
                        self.cache_key(&text, max_new_tokens, params, n, attempt)
                    }
                })
                .collect()
        };

        let mut results: Vec<Option<Samples>> = keys.iter().map(|k| self.get_cached(k)).collect();
        let missing: Vec<usize> = (0..prompts.len())
            .filter(|&i| results[i].is_none())
            .collect();

        if !missing.is_empty() {
            tracing::debug!(
                model = self.inner.model_name(),
                misses = missing.len(),
                "Generation cache miss, calling model"
            );
            let batch: Vec<Vec<u32>> = missing.iter().map(|&i| prompts[i].clone()).collect();
            let generated = self.inner.generate(&batch, max_new_tokens, params, n).await?;
            if generated.len() != batch.len() {
                return Err(ModelError::ParseError(format!(
                    "expected {} results, model returned {}",
                    batch.len(),
                    generated.len()
                )));
            }

            for (&i, samples) in missing.iter().zip(generated) {
                // Caching is best-effort.
                if let Err(e) = self.save_to_cache(&keys[i], &samples) {
                    tracing::warn!(error = %e, "Failed to cache generation");
                }
                results[i] = Some(samples);
            }
        }

        Ok(results.into_iter().map(Option::unwrap_or_default).collect())
    }

    fn provider_name(&self) -> &'static str {
        self.inner.provider_name()
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}
