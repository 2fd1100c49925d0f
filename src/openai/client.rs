use std::env;
use std::time::Duration;

use reqwest::Client;
use tracing::{debug, warn};

use super::types::{ApiError, ChatCompletionRequest, ChatCompletionResponse, Message};

const API_BASE: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4.1";
const DEFAULT_TIMEOUT_SECS: u64 = 20;
const TEMPERATURE: f32 = 0.7;

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("OPENAI_API_KEY not set. Get one at https://platform.openai.com/api-keys")]
    ApiKeyNotSet,

    #[error("API rate limit exceeded. Please retry later.")]
    RateLimited,

    #[error("API quota exhausted: {0}")]
    QuotaExhausted(String),

    #[error("API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("model call timed out after {0}s")]
    Timeout(u64),

    #[error("model returned an empty response")]
    EmptyResponse,

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

/// Abstraction for structured generation against a chat-completion model.
/// Implemented by `OpenAiClient` for production; mock implementations used in tests.
pub trait ChatClient {
    async fn complete(&self, system: &str, user: &str) -> Result<String, ChatError>;
}

#[derive(Clone)]
struct ApiKey(String);

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("[REDACTED]")
    }
}

#[derive(Clone)]
pub struct OpenAiClient {
    http: Client,
    api_key: ApiKey,
    model: String,
    base_url: String,
    timeout: Duration,
}

impl OpenAiClient {
    pub fn from_env(http: Client) -> Result<Self, ChatError> {
        let api_key = env::var("OPENAI_API_KEY").map_err(|_| ChatError::ApiKeyNotSet)?;
        if api_key.trim().is_empty() {
            return Err(ChatError::ApiKeyNotSet);
        }
        let model = env::var("OPENAI_MODEL")
            .ok()
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let timeout_secs = env::var("OPENAI_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.trim().parse::<u64>().ok())
            .filter(|&s| s > 0)
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        Ok(Self {
            http,
            api_key: ApiKey(api_key.trim().to_string()),
            model,
            base_url: API_BASE.to_string(),
            timeout: Duration::from_secs(timeout_secs),
        })
    }

    #[cfg(test)]
    pub(crate) fn with_base_url(http: Client, base_url: &str) -> Self {
        Self {
            http,
            api_key: ApiKey("test-key".to_string()),
            model: DEFAULT_MODEL.to_string(),
            base_url: base_url.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    async fn chat_completion(
        &self,
        messages: Vec<Message>,
    ) -> Result<ChatCompletionResponse, ChatError> {
        let url = format!("{}/chat/completions", self.base_url);

        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages,
            temperature: TEMPERATURE,
        };

        debug_assert!(
            url.starts_with("https://") || cfg!(test),
            "API key must only be sent over HTTPS"
        );

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key.0)
            .header("User-Agent", crate::USER_AGENT)
            .json(&request)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response
                .text()
                .await
                .map_err(|e| self.map_transport_error(e))?;
            if let Ok(body) = serde_json::from_str::<ChatCompletionResponse>(&text)
                && let Some(err) = &body.error
            {
                let classified = classify_api_error(status.as_u16(), err);
                warn!(error = %classified, "OpenAI API error");
                return Err(classified);
            }
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                warn!("OpenAI API rate limited");
                return Err(ChatError::RateLimited);
            }
            let snippet = if text.len() > 200 { &text[..200] } else { &text };
            warn!(status = %status, "OpenAI API error (no structured body)");
            return Err(ChatError::Api {
                code: status.as_u16(),
                message: format!("HTTP {status}: {snippet}"),
            });
        }

        let body: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| self.map_transport_error(e))?;
        debug!(model = %self.model, "chat completion received");

        if let Some(err) = &body.error {
            let classified = classify_api_error(status.as_u16(), err);
            warn!(error = %classified, "OpenAI API error in 200 response");
            return Err(classified);
        }

        Ok(body)
    }

    fn map_transport_error(&self, e: reqwest::Error) -> ChatError {
        if e.is_timeout() {
            ChatError::Timeout(self.timeout.as_secs())
        } else {
            ChatError::Network(e)
        }
    }
}

const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 1000;

impl ChatClient for OpenAiClient {
    async fn complete(&self, system: &str, user: &str) -> Result<String, ChatError> {
        let messages = || vec![Message::system(system), Message::user(user)];

        let mut last_err = None;
        for attempt in 0..MAX_RETRIES {
            match self.chat_completion(messages()).await {
                Ok(response) => {
                    return response
                        .first_content()
                        .map(str::to_string)
                        .ok_or(ChatError::EmptyResponse);
                }
                Err(e) if is_retriable(&e) => {
                    last_err = Some(e);
                    if attempt + 1 < MAX_RETRIES {
                        let delay_ms = jittered_backoff(attempt);
                        debug!(
                            attempt = attempt + 1,
                            delay_ms, "retrying after transient error"
                        );
                        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    }
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_err.unwrap_or(ChatError::RateLimited))
    }
}

fn is_retriable(e: &ChatError) -> bool {
    matches!(
        e,
        ChatError::RateLimited
            | ChatError::Api {
                code: 500..=599,
                ..
            }
    )
}

/// Equal jitter backoff: base/2 + rand(0, base/2).
fn jittered_backoff(attempt: u32) -> u64 {
    let base = INITIAL_BACKOFF_MS * 2u64.pow(attempt);
    let half = base / 2;
    half + fastrand::u64(..half.max(1))
}

fn classify_api_error(status: u16, err: &ApiError) -> ChatError {
    let message = err
        .message
        .clone()
        .unwrap_or_else(|| "Unknown error".to_string());

    // OpenAI reports exhausted billing quota as a 429 with its own type.
    if err.kind.as_deref() == Some("insufficient_quota")
        || err.code.as_deref() == Some("insufficient_quota")
    {
        return ChatError::QuotaExhausted(message);
    }
    match status {
        429 => ChatError::RateLimited,
        code => ChatError::Api { code, message },
    }
}
