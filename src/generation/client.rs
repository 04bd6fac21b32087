//! @ai:module:intent Text-generation capability behind a typed completion contract
//! @ai:module:layer infrastructure
//! @ai:module:public_api TextGenerator, Completion, OpenAiClient, DryRunGenerator
//! @ai:module:stateless false

use crate::config::ApiConfig;
use crate::error::{ConfigurationError, GenerationError};
use crate::generation::rate_limiter::{RateLimiter, RateLimiterTrait};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

/// @ai:intent Validated completion text returned by a generator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    pub text: String,
    pub finish_reason: Option<String>,
}

/// @ai:intent (model, prompt) -> completion or classified failure
pub trait TextGenerator: Send + Sync + 'static {
    /// @ai:intent Issue a single completion request
    fn complete(
        &self,
        model: &str,
        prompt: &str,
    ) -> impl Future<Output = Result<Completion, GenerationError>> + Send;

    fn name(&self) -> &'static str;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    n: u32,
    messages: [ChatMessage<'a>; 1],
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// @ai:intent Client for an OpenAI-compatible chat-completions endpoint
pub struct OpenAiClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    max_tokens: u32,
    temperature: f32,
    rate_limiter: RateLimiter,
}

impl OpenAiClient {
    /// @ai:intent Build a client from config, reading the key from the environment
    /// @ai:pre the variable named by `api_key_env` is set
    /// @ai:effects env
    pub fn new(config: &ApiConfig) -> Result<Self, ConfigurationError> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            ConfigurationError::Capability(format!("{} not set in environment", config.api_key_env))
        })?;

        Self::with_api_key(config, api_key)
    }

    /// @ai:intent Build a client with an explicit key
    /// @ai:effects pure
    pub fn with_api_key(config: &ApiConfig, api_key: String) -> Result<Self, ConfigurationError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ConfigurationError::Capability(e.to_string()))?;

        Ok(Self {
            http,
            endpoint: config.endpoint.clone(),
            api_key,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            rate_limiter: RateLimiter::new(config.requests_per_minute),
        })
    }
}

impl TextGenerator for OpenAiClient {
    /// @ai:effects network
    async fn complete(&self, model: &str, prompt: &str) -> Result<Completion, GenerationError> {
        self.rate_limiter.wait().await;

        let request = ChatRequest {
            model,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            n: 1,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(classify_transport_error)?;

        if !(200..300).contains(&status) {
            return Err(classify_status(status, body));
        }

        parse_chat_response(&body)
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

/// @ai:intent Map network-level failures onto the generation taxonomy
/// @ai:effects pure
fn classify_transport_error(error: reqwest::Error) -> GenerationError {
    if error.is_timeout() {
        GenerationError::Timeout
    } else {
        GenerationError::Unreachable(error.to_string())
    }
}

/// @ai:intent Map a non-2xx HTTP status onto the generation taxonomy
/// @ai:effects pure
fn classify_status(status: u16, body: String) -> GenerationError {
    match status {
        429 => GenerationError::RateLimited(body),
        408 | 504 => GenerationError::Timeout,
        500..=599 => GenerationError::Unreachable(format!("HTTP {status}: {body}")),
        _ => GenerationError::Rejected { status, body },
    }
}

/// @ai:intent Validate the loosely-shaped completion body into a typed result
/// @ai:post Ok implies non-empty text
/// @ai:effects pure
fn parse_chat_response(body: &str) -> Result<Completion, GenerationError> {
    let parsed: ChatResponse = serde_json::from_str(body)
        .map_err(|e| GenerationError::MalformedResponse(e.to_string()))?;

    let choice = parsed
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| GenerationError::MalformedResponse("response has no choices".to_string()))?;

    match choice.message.content {
        Some(text) if !text.trim().is_empty() => Ok(Completion {
            text,
            finish_reason: choice.finish_reason,
        }),
        _ => Err(GenerationError::EmptyResponse),
    }
}

/// @ai:intent Offline generator that echoes prompts, used for --dry-run
pub struct DryRunGenerator;

impl TextGenerator for DryRunGenerator {
    /// @ai:effects pure
    async fn complete(&self, model: &str, prompt: &str) -> Result<Completion, GenerationError> {
        Ok(Completion {
            text: format!("[DRY RUN model={model}] {prompt}\n"),
            finish_reason: Some("dry_run".to_string()),
        })
    }

    fn name(&self) -> &'static str {
        "dry-run"
    }
}
