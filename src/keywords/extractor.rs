use std::time::Duration;

use tracing::{debug, warn};

use super::KeywordSet;
use super::parse::{ParseError, parse_keyword_response};
use super::prompt::keyword_prompt;
use crate::gemini::GeminiError;

const DEFAULT_MAX_ATTEMPTS: u32 = 2;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(90);

/// Text generation backend for keyword extraction.
/// Implemented by `GeminiClient` for production; scripted models in tests.
pub trait KeywordModel {
    async fn generate(&self, prompt: &str) -> Result<String, GeminiError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("question is empty")]
    EmptyQuestion,

    #[error("keyword model call failed: {0}")]
    Model(#[from] GeminiError),

    #[error("keyword model timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("could not parse keywords after {attempts} attempt(s): {source}")]
    Unparseable {
        attempts: u32,
        #[source]
        source: ParseError,
    },
}

pub struct KeywordExtractor<M> {
    model: M,
    max_keywords: usize,
    max_attempts: u32,
    timeout: Duration,
}

impl<M: KeywordModel> KeywordExtractor<M> {
    pub fn new(model: M, max_keywords: usize) -> Self {
        Self {
            model,
            max_keywords,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[cfg(test)]
    pub(crate) fn model(&self) -> &M {
        &self.model
    }

    /// Asks the model for bilingual keywords. Unparseable answers are retried;
    /// model errors are not (the model client retries its own transient failures).
    pub async fn extract(&self, question: &str) -> Result<KeywordSet, ExtractionError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(ExtractionError::EmptyQuestion);
        }

        let prompt = keyword_prompt(question, self.max_keywords);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let text = tokio::time::timeout(self.timeout, self.model.generate(&prompt))
                .await
                .map_err(|_| ExtractionError::Timeout(self.timeout))??;

            match parse_keyword_response(&text, self.max_keywords) {
                Ok(keywords) => {
                    if keywords.is_empty() {
                        warn!("keyword model returned empty lists");
                    }
                    debug!(
                        korean = keywords.korean.len(),
                        english = keywords.english.len(),
                        attempt,
                        "keywords extracted"
                    );
                    return Ok(keywords);
                }
                Err(source) if attempt >= self.max_attempts => {
                    return Err(ExtractionError::Unparseable {
                        attempts: attempt,
                        source,
                    });
                }
                Err(e) => warn!(error = %e, attempt, "unparseable keyword response, retrying"),
            }
        }
    }
}
