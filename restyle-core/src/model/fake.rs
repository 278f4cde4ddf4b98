//! Fake generation model for testing.
//!
//! Continuations come from a per-sample script, then from prompt substring
//! matches, then from a default, so tests drive the loop deterministically.

use super::{GenerationModel, ModelError, Samples};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, RwLock};

use crate::config::SamplingParams;
use crate::tokenizer::Tokenizer;

#[derive(Debug)]
pub struct FakeModel {
    tokenizer: Arc<dyn Tokenizer>,
    /// Queued continuations, one consumed per sample.
    script: Mutex<VecDeque<String>>,
    /// Prompt substring -> continuation, checked in registration order.
    responses: RwLock<Vec<(String, String)>>,
    default_response: Option<String>,
    prompts_seen: Mutex<Vec<String>>,
}

impl FakeModel {
    /// A model with nothing registered; every call fails until responses are added.
    pub fn new(tokenizer: Arc<dyn Tokenizer>) -> Self {
        Self {
            tokenizer,
            script: Mutex::new(VecDeque::new()),
            responses: RwLock::new(Vec::new()),
            default_response: None,
            prompts_seen: Mutex::new(Vec::new()),
        }
    }

    /// A model that answers each sample with the next scripted continuation.
    pub fn scripted<I, S>(tokenizer: Arc<dyn Tokenizer>, continuations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let model = Self::new(tokenizer);
        model
            .script
            .lock()
            .unwrap()
            .extend(continuations.into_iter().map(Into::into));
        model
    }

    /// Answer prompts containing `prompt_contains` (case-insensitive) with `continuation`.
    pub fn add_response(&self, prompt_contains: &str, continuation: &str) {
        self.responses
            .write()
            .unwrap()
            .push((prompt_contains.to_lowercase(), continuation.to_string()));
    }

    pub fn with_default_response(mut self, continuation: &str) -> Self {
        self.default_response = Some(continuation.to_string());
        self
    }

    /// Decoded prompts in the order they were received.
    pub fn prompts_seen(&self) -> Vec<String> {
        self.prompts_seen.lock().unwrap().clone()
    }

    fn continuation_for(&self, prompt: &str) -> Result<String, ModelError> {
        if let Some(next) = self.script.lock().unwrap().pop_front() {
            return Ok(next);
        }

        let prompt_lower = prompt.to_lowercase();
        let responses = self.responses.read().unwrap();
        if let Some((_, continuation)) = responses
            .iter()
            .find(|(pattern, _)| prompt_lower.contains(pattern.as_str()))
        {
            return Ok(continuation.clone());
        }

        self.default_response.clone().ok_or_else(|| {
            ModelError::RequestFailed(format!(
                "FakeModel: No response configured for prompt (first 100 chars): {}",
                prompt.chars().take(100).collect::<String>()
            ))
        })
    }
}

#[async_trait]
impl GenerationModel for FakeModel {
    async fn generate(
        &self,
        prompts: &[Vec<u32>],
        _max_new_tokens: usize,
        _params: &SamplingParams,
        n: usize,
    ) -> Result<Vec<Samples>, ModelError> {
        let mut out = Vec::with_capacity(prompts.len());
        for prompt in prompts {
            let text = self.tokenizer.decode(prompt);
            self.prompts_seen.lock().unwrap().push(text.clone());

            let mut samples = Vec::with_capacity(n);
            for _ in 0..n {
                let continuation = self.continuation_for(&text)?;
                let mut sequence = prompt.clone();
                if !continuation.is_empty() && !continuation.starts_with(char::is_whitespace) {
                    sequence.extend(self.tokenizer.encode(" "));
                }
                sequence.extend(self.tokenizer.encode(&continuation));
                samples.push(sequence);
            }
            out.push(samples);
        }
        Ok(out)
    }

    fn provider_name(&self) -> &'static str {
        "fake"
    }

    fn model_name(&self) -> &str {
        "fake-model"
    }
}
