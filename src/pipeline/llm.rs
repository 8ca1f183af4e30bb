//! Model interaction: send one page image plus an instruction, get text back.
//!
//! The service is a capability behind the [`VisionModel`] trait, so tests
//! substitute a deterministic stub and the pipeline never knows which
//! provider it is talking to. [`LlmVisionModel`] is the production
//! implementation on top of `edgequake-llm`.
//!
//! [`InterpretationClient`] owns the retry policy and the per-attempt
//! timeout. Its job ends at "text was received": a reply with no usable
//! table is still a success here and is judged by
//! [`crate::pipeline::blocks`].

use crate::error::InterpretationError;
use crate::pipeline::encode::encode_page;
use crate::pipeline::render::PageImage;
use crate::pipeline::retry::RetryPolicy;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, LlmError};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

/// One interpretation call: the encoded page and what to do with it.
#[derive(Debug, Clone)]
pub struct ExtractionRequest<'a> {
    /// 1-based page index, for logging and error tagging.
    pub page: usize,
    pub instruction: &'a str,
    /// Base64-encoded PNG.
    pub image: &'a ImageData,
    /// Response-length cap.
    pub max_tokens: usize,
    /// Pinned to 0.0 by default: the most deterministic setting.
    pub temperature: f32,
}

/// Text returned by the service, with token usage when the provider reports it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelReply {
    pub text: String,
    pub input_tokens: usize,
    pub output_tokens: usize,
}

impl ModelReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }
}

/// Why one attempt failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    /// Network failure before a response arrived.
    #[error("transport error: {0}")]
    Transport(String),
    /// The service answered with an error.
    #[error("service error: {0}")]
    Service(String),
    /// No answer within the per-attempt timeout.
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

impl From<LlmError> for ModelError {
    /// Network failures and provider-side timeouts happen before any answer
    /// arrives; everything else is the service refusing or erroring.
    fn from(e: LlmError) -> Self {
        match e {
            LlmError::NetworkError(msg) => ModelError::Transport(msg),
            LlmError::Timeout => ModelError::Transport("request timed out".into()),
            other => ModelError::Service(other.to_string()),
        }
    }
}

/// A vision-capable model: given an image and an instruction, return text.
#[async_trait]
pub trait VisionModel: Send + Sync {
    /// Provider/model label for logs.
    fn name(&self) -> &str;

    async fn interpret(&self, request: &ExtractionRequest<'_>) -> Result<ModelReply, ModelError>;
}

/// [`VisionModel`] backed by an `edgequake-llm` provider.
pub struct LlmVisionModel {
    provider: Arc<dyn LLMProvider>,
    label: String,
}

impl LlmVisionModel {
    pub fn new(provider: Arc<dyn LLMProvider>, label: impl Into<String>) -> Self {
        Self {
            provider,
            label: label.into(),
        }
    }
}

#[async_trait]
impl VisionModel for LlmVisionModel {
    fn name(&self) -> &str {
        &self.label
    }

    /// One user message carrying the instruction text and the page image.
    async fn interpret(&self, request: &ExtractionRequest<'_>) -> Result<ModelReply, ModelError> {
        let messages = vec![ChatMessage::user_with_images(
            request.instruction,
            vec![request.image.clone()],
        )];
        let options = CompletionOptions {
            temperature: Some(request.temperature),
            max_tokens: Some(request.max_tokens),
            ..Default::default()
        };

        let response = self
            .provider
            .chat(&messages, Some(&options))
            .await
            .map_err(ModelError::from)?;

        Ok(ModelReply {
            text: response.content,
            input_tokens: response.prompt_tokens,
            output_tokens: response.completion_tokens,
        })
    }
}

/// Raw text received for one page, with call stats.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub page: usize,
    pub text: String,
    /// Attempts it took (1 = first call succeeded).
    pub attempts: u32,
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub duration_ms: u64,
}

/// Calls a [`VisionModel`] for one page with retry and timeout.
#[derive(Clone)]
pub struct InterpretationClient {
    model: Arc<dyn VisionModel>,
    retry: RetryPolicy,
    call_timeout: Duration,
    max_tokens: usize,
    temperature: f32,
}

impl InterpretationClient {
    pub fn new(model: Arc<dyn VisionModel>, retry: RetryPolicy, call_timeout: Duration) -> Self {
        Self {
            model,
            retry,
            call_timeout,
            max_tokens: 1500,
            temperature: 0.0,
        }
    }

    /// Build from the run configuration.
    pub fn from_config(model: Arc<dyn VisionModel>, config: &crate::ExtractionConfig) -> Self {
        Self::new(model, config.retry_policy(), config.api_timeout())
            .with_generation(config.max_tokens, config.temperature)
    }

    pub fn with_generation(mut self, max_tokens: usize, temperature: f32) -> Self {
        self.max_tokens = max_tokens;
        self.temperature = temperature;
        self
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    /// Interpret one page.
    ///
    /// Every failed attempt (transport, service error, timeout) is retried
    /// until the policy runs out; the last error is then returned tagged
    /// with the page index.
    pub async fn interpret(
        &self,
        page: &PageImage,
        instruction: &str,
    ) -> Result<RawResponse, InterpretationError> {
        let start = Instant::now();
        let image = encode_page(page);
        let request = ExtractionRequest {
            page: page.page,
            instruction,
            image: &image,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };
        let label = format!("Page {}", page.page);
        let model = &self.model;
        let request = &request;
        let call_timeout = self.call_timeout;

        let outcome = self
            .retry
            .run(&label, |_attempt| async move {
                match tokio::time::timeout(call_timeout, model.interpret(request)).await {
                    Ok(result) => result,
                    Err(_) => Err(ModelError::Timeout(call_timeout)),
                }
            })
            .await;

        match outcome {
            Ok(done) => {
                let duration = start.elapsed();
                debug!(
                    "Page {}: {} chars, {} input tokens, {} output tokens, {:?}",
                    page.page,
                    done.value.text.len(),
                    done.value.input_tokens,
                    done.value.output_tokens,
                    duration
                );
                Ok(RawResponse {
                    page: page.page,
                    text: done.value.text,
                    attempts: done.attempts,
                    input_tokens: done.value.input_tokens,
                    output_tokens: done.value.output_tokens,
                    duration_ms: duration.as_millis() as u64,
                })
            }
            Err(exhausted) => Err(InterpretationError {
                page: page.page,
                attempts: exhausted.attempts,
                detail: exhausted.last_error.to_string(),
            }),
        }
    }
}
