//! Generation provider client
//!
//! Defines the client trait and response types for calling the text
//! generation service. The service is keyed by model id: given a prompt it
//! returns a continuation and the number of completion tokens it used.
//!
//! `MockProvider` returns scripted responses and records every request.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Mutex;

/// Sampling overrides for one generation request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

/// A completed generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Generation {
    pub text: String,
    pub completion_token_count: u64,
}

impl Generation {
    pub fn new(text: impl Into<String>, completion_token_count: u64) -> Self {
        Self {
            text: text.into(),
            completion_token_count,
        }
    }

    /// True when the provider produced nothing usable.
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }

    /// Token supply for a node minted from this generation, at least 1.
    pub fn token_supply(&self) -> u64 {
        self.completion_token_count.max(1)
    }
}

/// Errors from generation provider operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    #[error("provider not available: {0}")]
    Unavailable(String),
    #[error("model not found: {0}")]
    ModelNotFound(String),
    #[error("generation failed: {0}")]
    GenerationFailed(String),
    #[error("response parse error: {0}")]
    ParseError(String),
}

/// Client trait for the generation service.
///
/// Abstracts over transport (HTTP, subprocess, mock) so orchestrators
/// don't depend on how the provider is reached.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Generate a continuation of `prompt` with `model_id`.
    async fn generate(
        &self,
        model_id: &str,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<Generation, ProviderError>;
}

/// A request seen by [`MockProvider`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub model_id: String,
    pub prompt: String,
    pub params: GenerationParams,
}

/// Mock provider for testing — returns scripted responses in call order.
///
/// When the script runs out it echoes a fixed continuation.
pub struct MockProvider {
    script: Mutex<VecDeque<Result<Generation, ProviderError>>>,
    requests: Mutex<Vec<RecordedRequest>>,
    fallback: Option<Generation>,
}

impl MockProvider {
    /// A provider that answers every request with `text`.
    pub fn always(text: impl Into<String>, completion_token_count: u64) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            fallback: Some(Generation::new(text, completion_token_count)),
        }
    }

    /// A provider with no fallback: requests past the script fail.
    pub fn scripted() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            fallback: None,
        }
    }

    /// Queue a successful response.
    pub fn with_response(self, text: impl Into<String>, completion_token_count: u64) -> Self {
        self.push(Ok(Generation::new(text, completion_token_count)));
        self
    }

    /// Queue a failure.
    pub fn with_failure(self, error: ProviderError) -> Self {
        self.push(Err(error));
        self
    }

    fn push(&self, entry: Result<Generation, ProviderError>) {
        self.script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(entry);
    }

    /// Every request received so far, in arrival order.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl GenerationProvider for MockProvider {
    async fn generate(
        &self,
        model_id: &str,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<Generation, ProviderError> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(RecordedRequest {
                model_id: model_id.to_string(),
                prompt: prompt.to_string(),
                params: params.clone(),
            });

        let scripted = self
            .script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        match (scripted, &self.fallback) {
            (Some(entry), _) => entry,
            (None, Some(fallback)) => Ok(fallback.clone()),
            (None, None) => Err(ProviderError::Unavailable(format!(
                "no scripted response left for model '{}'",
                model_id
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_responses_come_back_in_order() {
        let provider = MockProvider::scripted()
            .with_response("first", 5)
            .with_failure(ProviderError::GenerationFailed("overloaded".into()))
            .with_response("third", 0);

        let params = GenerationParams::default();
        let first = provider.generate("m", "p", &params).await.unwrap();
        assert_eq!(first.text, "first");
        assert!(provider.generate("m", "p", &params).await.is_err());
        let third = provider.generate("m", "p", &params).await.unwrap();
        assert_eq!(third.token_supply(), 1);

        let err = provider.generate("m", "p", &params).await.unwrap_err();
        assert!(matches!(err, ProviderError::Unavailable(_)));
        assert_eq!(provider.requests().len(), 4);
    }

    #[tokio::test]
    async fn always_provider_records_params() {
        let provider = MockProvider::always("more", 12);
        let params = GenerationParams {
            temperature: Some(0.7),
            max_tokens: Some(64),
        };
        let generation = provider.generate("model-x", "prompt", &params).await.unwrap();
        assert_eq!(generation.token_supply(), 12);

        let requests = provider.requests();
        assert_eq!(requests[0].model_id, "model-x");
        assert_eq!(requests[0].params, params);
    }

    #[test]
    fn whitespace_generation_is_blank() {
        assert!(Generation::new("  \n\t", 3).is_blank());
        assert!(!Generation::new(" a ", 3).is_blank());
    }
}
