//! Extraction client: one prompt (plus an optional page image) in, response
//! text out.
//!
//! The pipelines talk to the [`ExtractionClient`] trait. The production
//! implementation, [`LlmExtractionClient`], wraps an `edgequake-llm`
//! provider. There is deliberately no retry loop here: a rate-limit response
//! is reported as [`ExtractionError::RateLimited`] and the caller decides how
//! to back off.

use crate::config::StudyBotConfig;
use crate::error::StudyBotError;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info};

/// Why a model request failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExtractionError {
    /// HTTP 429 / quota exhausted.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Anything else.
    #[error("{0}")]
    Failed(String),
}

impl ExtractionError {
    /// Classify a provider error message.
    ///
    /// Providers surface rate limiting differently (status code in the text,
    /// Gemini's `RESOURCE_EXHAUSTED`, "quota" wording), so this matches on the
    /// rendered message.
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_ascii_lowercase();
        let rate_limited = lower.contains("429")
            || lower.contains("rate limit")
            || lower.contains("ratelimit")
            || lower.contains("rate_limit")
            || lower.contains("resource_exhausted")
            || lower.contains("too many requests")
            || lower.contains("quota");
        if rate_limited {
            ExtractionError::RateLimited(message)
        } else {
            ExtractionError::Failed(message)
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ExtractionError::RateLimited(_))
    }
}

/// One request to the model.
#[derive(Debug, Clone)]
pub struct ExtractionRequest {
    pub prompt: String,
    pub image: Option<ImageData>,
    pub max_tokens: usize,
}

impl ExtractionRequest {
    /// A text-only request.
    pub fn text(prompt: impl Into<String>, max_tokens: usize) -> Self {
        Self {
            prompt: prompt.into(),
            image: None,
            max_tokens,
        }
    }

    /// A prompt accompanied by one page image.
    pub fn vision(prompt: impl Into<String>, image: ImageData, max_tokens: usize) -> Self {
        Self {
            prompt: prompt.into(),
            image: Some(image),
            max_tokens,
        }
    }
}

/// Sends prompts to a remote generative model.
#[async_trait]
pub trait ExtractionClient: Send + Sync {
    async fn generate(&self, request: ExtractionRequest) -> Result<String, ExtractionError>;
}

/// [`ExtractionClient`] backed by an `edgequake-llm` provider.
pub struct LlmExtractionClient {
    provider: Arc<dyn LLMProvider>,
    temperature: f32,
}

impl LlmExtractionClient {
    pub fn new(provider: Arc<dyn LLMProvider>, temperature: f32) -> Self {
        Self {
            provider,
            temperature,
        }
    }

    /// Resolve the provider described by `config` and wrap it.
    pub fn from_config(config: &StudyBotConfig) -> Result<Self, StudyBotError> {
        let provider = resolve_provider(config)?;
        Ok(Self::new(provider, config.temperature))
    }
}

#[async_trait]
impl ExtractionClient for LlmExtractionClient {
    async fn generate(&self, request: ExtractionRequest) -> Result<String, ExtractionError> {
        let start = Instant::now();
        let message = match request.image {
            Some(image) => ChatMessage::user_with_images(request.prompt.as_str(), vec![image]),
            None => ChatMessage::user(request.prompt.as_str()),
        };
        let options = CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(request.max_tokens),
            ..Default::default()
        };

        match self.provider.chat(&[message], Some(&options)).await {
            Ok(response) => {
                debug!(
                    "Model call: {} input tokens, {} output tokens, {:?}",
                    response.prompt_tokens,
                    response.completion_tokens,
                    start.elapsed()
                );
                Ok(response.content)
            }
            Err(e) => Err(ExtractionError::classify(e.to_string())),
        }
    }
}

fn create_provider(name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, StudyBotError> {
    ProviderFactory::create_llm_provider(name, model).map_err(|e| {
        StudyBotError::ProviderNotConfigured {
            provider: name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the LLM provider, from most-specific to least-specific:
///
/// 1. a pre-built provider on the config;
/// 2. a named provider (`--provider`, settings file) with the configured model;
/// 3. `EDGEQUAKE_LLM_PROVIDER` (and `EDGEQUAKE_MODEL`, if set) from the
///    environment;
/// 4. Gemini when `GEMINI_API_KEY` is set;
/// 5. whatever `ProviderFactory::from_env` detects.
pub fn resolve_provider(config: &StudyBotConfig) -> Result<Arc<dyn LLMProvider>, StudyBotError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        info!("Using provider '{}' with model '{}'", name, config.model);
        return create_provider(name, &config.model);
    }

    if let Ok(name) = std::env::var("EDGEQUAKE_LLM_PROVIDER") {
        if !name.is_empty() {
            let model = std::env::var("EDGEQUAKE_MODEL")
                .ok()
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| config.model.clone());
            return create_provider(&name, &model);
        }
    }

    if let Ok(key) = std::env::var("GEMINI_API_KEY") {
        if !key.is_empty() {
            return create_provider("gemini", &config.model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| StudyBotError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set GEMINI_API_KEY (or OPENAI_API_KEY, ANTHROPIC_API_KEY) or pass --provider.\n\
                Error: {e}"
            ),
        })?;

    Ok(llm_provider)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_rate_limits() {
        for msg in [
            "HTTP 429 Too Many Requests",
            "Rate limit exceeded for provider 'gemini'",
            "RESOURCE_EXHAUSTED: Quota exceeded for metric",
        ] {
            assert!(ExtractionError::classify(msg).is_rate_limited(), "{msg}");
        }
    }

    #[test]
    fn other_errors_are_plain_failures() {
        let e = ExtractionError::classify("HTTP 500 internal error");
        assert_eq!(e, ExtractionError::Failed("HTTP 500 internal error".into()));
    }

    #[test]
    fn request_constructors() {
        let r = ExtractionRequest::text("hello", 128);
        assert!(r.image.is_none());
        assert_eq!(r.max_tokens, 128);
    }
}
