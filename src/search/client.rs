use std::time::Duration;

use super::types::{RawDocument, SearchTerm};

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("search API rate limit exceeded")]
    RateLimited,

    #[error("search call timed out after {}s", .0.as_secs_f32())]
    Timeout(Duration),

    #[error("search API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("search API authentication failed: {0}")]
    Unauthorized(String),

    #[error("search API rejected the request ({code}): {message}")]
    Rejected { code: String, message: String },

    #[error("malformed search response: {0}")]
    Malformed(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

impl SearchError {
    /// Transient errors are retried with backoff; everything else aborts the question.
    pub fn is_transient(&self) -> bool {
        match self {
            SearchError::RateLimited | SearchError::Timeout(_) => true,
            SearchError::Api { code, .. } => matches!(code, 408 | 500..=599),
            SearchError::Network(e) => !(e.is_builder() || e.is_decode()),
            SearchError::Unauthorized(_)
            | SearchError::Rejected { .. }
            | SearchError::Malformed(_) => false,
        }
    }
}

/// One page of documents for one term from an external bibliographic index.
/// Implemented by `ScienceOnClient` for production; scripted stubs in tests.
///
/// Implementations are stateless and never retry; the engine owns retry policy.
pub trait SearchClient {
    /// Waits until the next request may be sent, e.g. for a shared rate limit.
    /// Not covered by the per-call timeout.
    async fn ready(&self) {}

    async fn fetch_page(
        &self,
        term: &SearchTerm,
        page: u32,
    ) -> Result<Vec<RawDocument>, SearchError>;
}
