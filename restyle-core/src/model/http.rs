//! Text-generation endpoint over HTTP.
//!
//! Prompts are decoded with the shared tokenizer and posted as text; the
//! endpoint answers with continuation texts, which are encoded again and
//! appended to the prompt tokens.

use super::{GenerationModel, ModelError, Samples};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::SamplingParams;
use crate::tokenizer::Tokenizer;

#[derive(Debug)]
pub struct HttpModel {
    url: String,
    model: String,
    tokenizer: Arc<dyn Tokenizer>,
    client: reqwest::Client,
}

impl HttpModel {
    pub fn new(url: String, model: String, tokenizer: Arc<dyn Tokenizer>) -> Self {
        Self {
            url,
            model,
            tokenizer,
            client: reqwest::Client::new(),
        }
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompts: Vec<String>,
    max_new_tokens: usize,
    num_return_sequences: usize,
    #[serde(flatten)]
    params: &'a SamplingParams,
}

/// One list of continuation texts per prompt.
#[derive(Debug, Deserialize)]
struct GenerateResponse {
    generations: Vec<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct EndpointError {
    error: String,
}

/// Pass the body of any 2xx response through; decode the endpoint's error otherwise.
fn check_status(status: reqwest::StatusCode, body: String) -> Result<String, ModelError> {
    if status.is_success() {
        return Ok(body);
    }
    let message = serde_json::from_str::<EndpointError>(&body)
        .map(|e| e.error)
        .unwrap_or(body);
    Err(ModelError::ApiError {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl GenerationModel for HttpModel {
    async fn generate(
        &self,
        prompts: &[Vec<u32>],
        max_new_tokens: usize,
        params: &SamplingParams,
        n: usize,
    ) -> Result<Vec<Samples>, ModelError> {
        let request = GenerateRequest {
            model: &self.model,
            prompts: prompts.iter().map(|p| self.tokenizer.decode(p)).collect(),
            max_new_tokens,
            num_return_sequences: n,
            params,
        };

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| ModelError::RequestFailed(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ModelError::RequestFailed(e.to_string()))?;
        let body = check_status(status, body)?;

        let response: GenerateResponse =
            serde_json::from_str(&body).map_err(|e| ModelError::ParseError(e.to_string()))?;
        if response.generations.len() != prompts.len() {
            return Err(ModelError::ParseError(format!(
                "expected {} generations, endpoint returned {}",
                prompts.len(),
                response.generations.len()
            )));
        }

        Ok(prompts
            .iter()
            .zip(response.generations)
            .map(|(prompt, texts)| {
                texts
                    .iter()
                    .map(|text| {
                        let mut sequence = prompt.clone();
                        sequence.extend(self.tokenizer.encode(text));
                        sequence
                    })
                    .collect()
            })
            .collect())
    }

    fn provider_name(&self) -> &'static str {
        "http"
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
