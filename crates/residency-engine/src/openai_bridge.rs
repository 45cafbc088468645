//! Completion service bridge (OpenAI-compatible chat completions).
//!
//! The rest of the engine talks to the [`CompletionService`] trait; this
//! module provides the production implementation plus the error taxonomy
//! the retry loop is built on. Transient classes (rate limit, network,
//! 5xx) are retried with linearly increasing backoff; empty model output
//! is not, since the identical prompt would reproduce the same empty
//! result.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::router::TaskType;
use crate::usage::{TokenUsage, UsageLedger};

const MAX_ATTEMPTS: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_secs(2);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// One completion call.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub task: TaskType,
    pub model: String,
    pub system_prompt: String,
    pub user_prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Completion failure classes. Distinct variants so callers can branch on
/// auth vs. rate-limit vs. network vs. contract violations without string
/// matching.
#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("OPENAI_API_KEY is not set in environment")]
    MissingCredential,

    #[error("Authentication failed — completion API key is invalid or revoked")]
    Auth,

    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    #[error("Network error reaching completion endpoint: {0}")]
    Network(String),

    /// The model returned no content. Non-retryable: the same prompt is
    /// expected to reproduce the same empty result.
    #[error("Model returned empty content (finish_reason={finish_reason})")]
    EmptyOutput { finish_reason: String },

    #[error("Completion API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Malformed completion response: {0}")]
    MalformedResponse(String),
}

impl CompletionError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited(_) | Self::Network(_) => true,
            Self::Api { status, .. } => *status >= 500,
            Self::MissingCredential
            | Self::Auth
            | Self::EmptyOutput { .. }
            | Self::MalformedResponse(_) => false,
        }
    }
}

/// The generation-service seam. Tests substitute scripted implementations.
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError>;
}

// ── Wire types ────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ApiUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
    total_tokens: u64,
    prompt_tokens_details: Option<PromptTokensDetails>,
}

#[derive(Deserialize)]
struct PromptTokensDetails {
    cached_tokens: Option<u64>,
}

// ── Production client ─────────────────────────────────────────────────────

/// Reqwest-backed completion client with usage accounting.
pub struct OpenAiBridge {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    ledger: Option<UsageLedger>,
}

impl OpenAiBridge {
    pub fn new(api_key: String, base_url: String, ledger: Option<UsageLedger>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            ledger,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Result<Self, CompletionError> {
        let api_key = config
            .openai_api_key
            .clone()
            .ok_or(CompletionError::MissingCredential)?;
        Ok(Self::new(
            api_key,
            config.openai_base_url.clone(),
            Some(UsageLedger::new(&config.residency_dir)),
        ))
    }

    async fn try_complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        let body = serde_json::json!({
            "model": request.model,
            "messages": [
                {"role": "system", "content": request.system_prompt},
                {"role": "user", "content": request.user_prompt},
            ],
            "temperature": request.temperature,
            "max_completion_tokens": request.max_tokens,
        });

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .timeout(REQUEST_TIMEOUT)
            .json(&body)
            .send()
            .await
            .map_err(|e| CompletionError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                401 | 403 => CompletionError::Auth,
                429 => CompletionError::RateLimited(message),
                code => CompletionError::Api {
                    status: code,
                    message,
                },
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| CompletionError::MalformedResponse(e.to_string()))?;

        // Usage is logged whenever the API reports it, even for empty
        // content: the tokens were still billed.
        if let (Some(ledger), Some(api_usage)) = (&self.ledger, &parsed.usage) {
            ledger.record(
                request.task,
                &request.model,
                TokenUsage {
                    prompt_tokens: api_usage.prompt_tokens,
                    cached_tokens: api_usage
                        .prompt_tokens_details
                        .as_ref()
                        .and_then(|d| d.cached_tokens)
                        .unwrap_or(0),
                    completion_tokens: api_usage.completion_tokens,
                    total_tokens: api_usage.total_tokens,
                },
            );
        }

        let choice = parsed.choices.into_iter().next();
        let finish_reason = choice
            .as_ref()
            .and_then(|c| c.finish_reason.clone())
            .unwrap_or_else(|| "unknown".into());
        let content = choice
            .and_then(|c| c.message.content)
            .unwrap_or_default()
            .trim()
            .to_string();

        if content.is_empty() {
            return Err(CompletionError::EmptyOutput { finish_reason });
        }
        Ok(content)
    }
}

#[async_trait]
impl CompletionService for OpenAiBridge {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        let mut last_error = None;
        for attempt in 1..=MAX_ATTEMPTS {
            debug!(
                model = %request.model,
                task = %request.task,
                attempt,
                max = MAX_ATTEMPTS,
                "Completion call"
            );
            match self.try_complete(request).await {
                Ok(text) => return Ok(text),
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => {
                    warn!(attempt, error = %e, "Completion attempt failed");
                    if attempt < MAX_ATTEMPTS {
                        tokio::time::sleep(RETRY_DELAY * attempt).await;
                    }
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or(CompletionError::Network(
            "retry loop ended without an error".into(),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classes_are_retryable() {
        assert!(CompletionError::RateLimited("quota".into()).is_retryable());
        assert!(CompletionError::Network("reset".into()).is_retryable());
        assert!(CompletionError::Api {
            status: 503,
            message: "overloaded".into()
        }
        .is_retryable());
    }

    #[test]
    fn test_empty_output_is_not_retryable() {
        let err = CompletionError::EmptyOutput {
            finish_reason: "length".into(),
        };
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_auth_and_contract_errors_are_not_retryable() {
        assert!(!CompletionError::Auth.is_retryable());
        assert!(!CompletionError::MissingCredential.is_retryable());
        assert!(!CompletionError::MalformedResponse("junk".into()).is_retryable());
        assert!(!CompletionError::Api {
            status: 400,
            message: "bad request".into()
        }
        .is_retryable());
    }

    #[test]
    fn test_from_config_requires_credential() {
        let config = EngineConfig::default();
        assert!(matches!(
            OpenAiBridge::from_config(&config),
            Err(CompletionError::MissingCredential)
        ));
    }
}
