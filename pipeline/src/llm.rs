//! Outbound language-model client with bounded retries.
//!
//! One trait, one HTTP implementation. The retrieval call uses a 3-attempt
//! policy with jittered exponential backoff; gate and renderer calls are
//! single-attempt and degrade on failure.

use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Characters of a response body kept in user-facing diagnostics.
const MAX_ERROR_BODY_CHARS: usize = 1500;

/// Transport and protocol failures of one model call.
#[derive(Error, Debug)]
pub enum LlmError {
    /// API credential is not configured
    #[error("API key is not configured")]
    MissingCredential,

    /// Request or response timed out
    #[error("model call timed out")]
    Timeout,

    /// Connection-level failure (DNS, TCP, TLS)
    #[error("model connection failed: {0}")]
    Connect(String),

    /// Non-2xx HTTP status
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// 2xx body that is not valid JSON
    #[error("response body is not JSON (HTTP {status}): {body}")]
    InvalidBody { status: u16, body: String },

    /// Error object reported by the model API itself
    #[error("model error: {0}")]
    Api(String),
}

impl LlmError {
    /// Transport-class failures and throttling statuses are worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::Timeout | LlmError::Connect(_) => true,
            LlmError::Status { status, .. } => is_retryable_status(*status),
            _ => false,
        }
    }
}

pub fn is_retryable_status(status: u16) -> bool {
    status == 429 || (500..600).contains(&status)
}

/// One chat-completion request.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub system: String,
    pub user: String,
    pub temperature: f32,
}

/// Model client contract. The pipeline never talks HTTP directly.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Issue one chat call and return the model's message text.
    async fn chat(&self, request: &ChatRequest) -> Result<String, LlmError>;
}

/// Retry schedule for transient failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles per attempt
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::from_millis(0),
        }
    }

    pub fn standard() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

/// Backoff before retry number `attempt` (1-based), without jitter.
pub fn backoff_delay(policy: &RetryPolicy, attempt: u32) -> Duration {
    let shift = attempt.saturating_sub(1).min(6);
    let multiplier = 1u32 << shift;
    policy.base_delay.saturating_mul(multiplier).min(Duration::from_secs(8))
}

#[derive(Debug, Serialize)]
struct ApiMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    messages: Vec<ApiMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ApiChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Option<Vec<ApiChoice>>,
    output_text: Option<String>,
    error: Option<ApiError>,
}

/// Bearer-token `chat/completions` client over `reqwest`.
pub struct HttpLlmClient {
    http: reqwest::Client,
    url: String,
    api_key: Option<String>,
    model: String,
    retry: RetryPolicy,
}

impl HttpLlmClient {
    pub fn new(url: impl Into<String>, api_key: Option<String>, model: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_default();

        Self {
            http,
            url: url.into(),
            api_key,
            model: model.into(),
            retry: RetryPolicy::none(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn chat_once(&self, request: &ChatRequest) -> Result<String, LlmError> {
        let api_key = self.api_key.as_deref().ok_or(LlmError::MissingCredential)?;

        let body = ApiRequest {
            model: &self.model,
            messages: vec![
                ApiMessage {
                    role: "system",
                    content: &request.system,
                },
                ApiMessage {
                    role: "user",
                    content: &request.user,
                },
            ],
            temperature: request.temperature,
        };

        let response = self
            .http
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(classify_reqwest_error)?;

        let status = response.status().as_u16();
        let text = response.text().await.map_err(classify_reqwest_error)?;

        if !(200..300).contains(&status) {
            return Err(LlmError::Status {
                status,
                body: truncate_chars(&text, MAX_ERROR_BODY_CHARS),
            });
        }

        let parsed: ApiResponse = serde_json::from_str(&text).map_err(|_| LlmError::InvalidBody {
            status,
            body: truncate_chars(&text, MAX_ERROR_BODY_CHARS),
        })?;

        if let Some(error) = parsed.error {
            return Err(LlmError::Api(
                error.message.unwrap_or_else(|| "unknown error".to_string()),
            ));
        }

        if let Some(content) = parsed
            .choices
            .and_then(|choices| choices.into_iter().next())
            .and_then(|choice| choice.message.content)
        {
            return Ok(content);
        }

        if let Some(output) = parsed.output_text {
            return Ok(output);
        }

        Err(LlmError::Api("empty response".to_string()))
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn chat(&self, request: &ChatRequest) -> Result<String, LlmError> {
        let mut attempt = 1u32;
        loop {
            match self.chat_once(request).await {
                Ok(text) => return Ok(text),
                Err(error) => {
                    if !error.is_retryable() || attempt >= self.retry.max_attempts {
                        return Err(error);
                    }
                    let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..250));
                    let delay = backoff_delay(&self.retry, attempt) + jitter;
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Transient model call failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

fn classify_reqwest_error(error: reqwest::Error) -> LlmError {
    if error.is_timeout() {
        LlmError::Timeout
    } else {
        LlmError::Connect(error.to_string())
    }
}

/// Truncate on a char boundary; response bodies may be multi-byte Russian text.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_statuses() {
        assert!(is_retryable_status(429));
        assert!(is_retryable_status(500));
        assert!(is_retryable_status(503));
        assert!(!is_retryable_status(400));
        assert!(!is_retryable_status(401));
        assert!(!is_retryable_status(404));
    }

    #[test]
    fn test_retryable_errors() {
        assert!(LlmError::Timeout.is_retryable());
        assert!(LlmError::Connect("reset".to_string()).is_retryable());
        assert!(LlmError::Status {
            status: 502,
            body: String::new()
        }
        .is_retryable());
        assert!(!LlmError::MissingCredential.is_retryable());
        assert!(!LlmError::Api("bad".to_string()).is_retryable());
        assert!(!LlmError::Status {
            status: 403,
            body: String::new()
        }
        .is_retryable());
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy::standard();
        assert_eq!(backoff_delay(&policy, 1), Duration::from_millis(500));
        assert_eq!(backoff_delay(&policy, 2), Duration::from_millis(1000));
        assert_eq!(backoff_delay(&policy, 3), Duration::from_millis(2000));
        // Deep attempts stay bounded.
        assert_eq!(backoff_delay(&policy, 30), Duration::from_secs(8));
    }

    #[test]
    fn test_truncate_multibyte() {
        let text = "Ошибка".repeat(300);
        let truncated = truncate_chars(&text, 1500);
        assert_eq!(truncated.chars().count(), 1500);
    }
}
