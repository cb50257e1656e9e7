//! Text generation served by an OpenAI-compatible completions endpoint
//! (vLLM, text-generation-inference, Ollama and similar servers).

use crate::config::ModelConfig;
use crate::domain::ports::{GenerationParams, ModelLoader, TextGenerator};
use crate::error::{Result, ServiceError};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

const CONNECT_TIMEOUT_SECS: u64 = 5;

#[derive(Debug, Deserialize)]
struct ModelList {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    max_tokens: u32,
    temperature: f32,
    n: u32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    #[serde(default)]
    text: String,
}

/// Loads a [`CompletionModel`] by checking that the endpoint serves the configured model.
pub struct CompletionModelLoader {
    endpoint: Option<String>,
    model_id: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl CompletionModelLoader {
    pub fn new(config: &ModelConfig) -> Self {
        Self {
            endpoint: config
                .endpoint
                .as_deref()
                .filter(|e| !e.is_empty())
                .map(|e| e.trim_end_matches('/').to_string()),
            model_id: config.model_id.clone(),
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
            timeout: config.generation_timeout(),
        }
    }
}

#[async_trait]
impl ModelLoader for CompletionModelLoader {
    async fn load(&self) -> Result<Arc<dyn TextGenerator>> {
        let base_url = self
            .endpoint
            .clone()
            .ok_or_else(|| ServiceError::Unavailable("No model endpoint configured".to_string()))?;

        info!(base_url = %base_url, model = %self.model_id, "Loading AI model");
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(self.timeout)
            .build()
            .map_err(|e| ServiceError::Unavailable(format!("Failed to create HTTP client: {e}")))?;

        let model = CompletionModel {
            client,
            base_url,
            model_id: self.model_id.clone(),
            api_key: self.api_key.clone(),
        };
        model.verify_served().await?;

        info!(model = %self.model_id, "AI model loaded successfully");
        Ok(Arc::new(model))
    }
}

pub struct CompletionModel {
    client: Client,
    base_url: String,
    model_id: String,
    api_key: Option<String>,
}

impl CompletionModel {
    fn api_url(&self, endpoint: &str) -> String {
        format!("{}/v1/{}", self.base_url, endpoint)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    async fn verify_served(&self) -> Result<()> {
        let response = self
            .authorize(self.client.get(self.api_url("models")))
            .send()
            .await
            .map_err(|e| ServiceError::Unavailable(format!("Model endpoint unreachable: {e}")))?;

        if !response.status().is_success() {
            return Err(ServiceError::Unavailable(format!(
                "Model endpoint returned {}",
                response.status()
            )));
        }

        let models: ModelList = response
            .json()
            .await
            .map_err(|e| ServiceError::Unavailable(format!("Unexpected model listing: {e}")))?;

        if models.data.iter().any(|m| m.id == self.model_id) {
            Ok(())
        } else {
            Err(ServiceError::Unavailable(format!(
                "Model {} is not served by {}",
                self.model_id, self.base_url
            )))
        }
    }
}

fn completion_request<'a>(
    model: &'a str,
    prompt: &'a str,
    params: &GenerationParams,
) -> CompletionRequest<'a> {
    CompletionRequest {
        model,
        prompt,
        max_tokens: params.max_length,
        temperature: if params.do_sample {
            params.temperature
        } else {
            0.0
        },
        n: params.num_return_sequences,
    }
}

#[async_trait]
impl TextGenerator for CompletionModel {
    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<Vec<String>> {
        let body = completion_request(&self.model_id, prompt, params);
        debug!(prompt_len = prompt.len(), "Sending completion request");

        let response = self
            .authorize(self.client.post(self.api_url("completions")))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ServiceError::Unavailable(format!(
                "Completion request failed with {status}"
            )));
        }

        let completion: CompletionResponse = response.json().await?;
        Ok(completion.choices.into_iter().map(|c| c.text).collect())
    }
}
