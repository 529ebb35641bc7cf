use std::time::Duration;

use reqwest::{Client, StatusCode};
use tracing::{debug, warn};

use super::types::{ApiError, GenerateContentRequest, GenerateContentResponse};
use crate::config::Secret;
use crate::keywords::KeywordModel;

const ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta/models";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);
const TEMPERATURE: f32 = 0.2;
const ATTEMPTS: u32 = 3;
const FIRST_BACKOFF_MS: u64 = 1000;

#[derive(Debug, thiserror::Error)]
pub enum GeminiError {
    #[error("GEMINI_API_KEY is not set; keyword extraction needs a Gemini API key")]
    ApiKeyNotSet,

    #[error("Gemini rate limit hit")]
    RateLimited,

    #[error("Gemini quota exhausted: {0}")]
    QuotaExhausted(String),

    #[error("Gemini API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("Gemini returned no text (finish reason: {0})")]
    EmptyResponse(String),

    #[error("Gemini network error: {0}")]
    Network(#[from] reqwest::Error),
}

impl GeminiError {
    fn is_retriable(&self) -> bool {
        match self {
            GeminiError::RateLimited => true,
            GeminiError::Api { code, .. } => (500..=599).contains(code),
            GeminiError::Network(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }
}

impl From<&ApiError> for GeminiError {
    fn from(err: &ApiError) -> Self {
        let message = err.message.clone().unwrap_or_else(|| "no message".to_string());
        match err.code {
            Some(429) => GeminiError::RateLimited,
            Some(403) => GeminiError::QuotaExhausted(message),
            Some(code) => GeminiError::Api { code, message },
            None => GeminiError::Api { code: 0, message },
        }
    }
}

/// Gemini `generateContent` client for JSON keyword answers.
#[derive(Clone)]
pub struct GeminiClient {
    http: Client,
    api_key: Secret,
    model: String,
    endpoint: String,
    call_timeout: Duration,
}

impl GeminiClient {
    pub fn new(http: Client, api_key: Secret, model: &str) -> Result<Self, GeminiError> {
        if api_key.expose().trim().is_empty() {
            return Err(GeminiError::ApiKeyNotSet);
        }
        Ok(Self {
            http,
            api_key,
            model: model.to_string(),
            endpoint: ENDPOINT.to_string(),
            call_timeout: DEFAULT_CALL_TIMEOUT,
        })
    }

    /// Timeout for each single request; retries get a fresh one.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    #[cfg(test)]
    pub(crate) fn with_base_url(http: Client, base_url: &str) -> Self {
        Self {
            http,
            api_key: Secret::new("test-key"),
            model: DEFAULT_MODEL.to_string(),
            endpoint: base_url.to_string(),
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    /// One `generateContent` round trip, no retry.
    async fn call(&self, prompt: &str) -> Result<GenerateContentResponse, GeminiError> {
        let url = format!("{}/{}:generateContent", self.endpoint, self.model);
        debug_assert!(
            url.starts_with("https://") || cfg!(test),
            "API key must only travel over HTTPS"
        );

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", self.api_key.expose())
            .header("User-Agent", crate::USER_AGENT)
            .timeout(self.call_timeout)
            .json(&GenerateContentRequest::json_prompt(prompt, TEMPERATURE))
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(GeminiError::RateLimited);
        }
        if status.is_success() {
            let body: GenerateContentResponse = response.json().await?;
            return match &body.error {
                Some(err) => Err(err.into()),
                None => Ok(body),
            };
        }

        let raw = response.text().await.unwrap_or_default();
        let structured = serde_json::from_str::<GenerateContentResponse>(&raw)
            .ok()
            .and_then(|body| body.error);
        Err(match structured {
            Some(err) => (&err).into(),
            None => GeminiError::Api {
                code: status.as_u16(),
                message: raw[..raw.floor_char_boundary(200)].to_string(),
            },
        })
    }
}

impl KeywordModel for GeminiClient {
    /// Retries rate limits, 5xx and connection failures with jittered backoff.
    async fn generate(&self, prompt: &str) -> Result<String, GeminiError> {
        let mut attempt = 0;
        loop {
            let err = match self.call(prompt).await {
                Ok(response) => {
                    debug!(model = %self.model, attempt, "keyword generation complete");
                    return response.text().ok_or_else(|| {
                        let reason = response.finish_reason().unwrap_or("none").to_string();
                        warn!(%reason, "Gemini answered without text");
                        GeminiError::EmptyResponse(reason)
                    });
                }
                Err(e) => e,
            };

            attempt += 1;
            if !err.is_retriable() || attempt >= ATTEMPTS {
                warn!(error = %err, attempt, "Gemini call failed");
                return Err(err);
            }
            let delay_ms = crate::backoff::jittered(FIRST_BACKOFF_MS, attempt - 1);
            debug!(error = %err, attempt, delay_ms, "retrying Gemini call");
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api_error(code: u16, message: &str) -> ApiError {
        ApiError {
            code: Some(code),
            message: Some(message.into()),
        }
    }

    #[test]
    fn structured_errors_map_by_code() {
        assert!(matches!(
            GeminiError::from(&api_error(429, "slow down")),
            GeminiError::RateLimited
        ));
        assert!(matches!(
            GeminiError::from(&api_error(403, "billing")),
            GeminiError::QuotaExhausted(m) if m == "billing"
        ));
        assert!(matches!(
            GeminiError::from(&api_error(400, "bad")),
            GeminiError::Api { code: 400, .. }
        ));
    }

    #[test]
    fn only_transient_failures_retry() {
        assert!(GeminiError::RateLimited.is_retriable());
        assert!(
            GeminiError::Api {
                code: 503,
                message: "unavailable".into()
            }
            .is_retriable()
        );
        assert!(
            !GeminiError::Api {
                code: 400,
                message: "bad".into()
            }
            .is_retriable()
        );
        assert!(!GeminiError::QuotaExhausted("x".into()).is_retriable());
        assert!(!GeminiError::EmptyResponse("SAFETY".into()).is_retriable());
    }

    #[test]
    fn blank_key_rejected() {
        let result = GeminiClient::new(Client::new(), Secret::new("  "), DEFAULT_MODEL);
        assert!(matches!(result, Err(GeminiError::ApiKeyNotSet)));
    }
}
