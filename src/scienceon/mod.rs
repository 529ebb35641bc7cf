//! KISTI ScienceON article search.

mod credentials;
mod throttle;
mod token;
mod xml;

pub use credentials::Credentials;
pub use throttle::Throttle;
pub use token::TokenIssuer;

use std::sync::Arc;

use reqwest::Client;
use tracing::debug;

use crate::search::{RawDocument, SearchClient, SearchError, SearchTerm};

const API_URL: &str = "https://apigateway.kisti.re.kr/openapicall.do";
const API_VERSION: &str = "1.0";
const TARGET_ARTICLES: &str = "ARTI";

/// `SearchClient` over the ScienceON OpenAPI gateway.
///
/// Stateless apart from the shared throttle, which gates `ready`. Credentials
/// are fixed for the client's lifetime and no call is retried here.
#[derive(Clone)]
pub struct ScienceOnClient {
    http: Client,
    credentials: Arc<Credentials>,
    throttle: Arc<Throttle>,
    page_size: u32,
    base_url: String,
}

impl ScienceOnClient {
    pub fn new(
        http: Client,
        credentials: Arc<Credentials>,
        throttle: Arc<Throttle>,
        page_size: u32,
    ) -> Self {
        Self {
            http,
            credentials,
            throttle,
            page_size,
            base_url: API_URL.to_string(),
        }
    }

    #[cfg(test)]
    fn with_base_url(http: Client, base_url: &str) -> Self {
        Self {
            http,
            credentials: Arc::new(Credentials {
                client_id: "test-client".into(),
                access_token: crate::config::Secret::new("test-token"),
                expires_at: chrono::NaiveDateTime::MAX,
            }),
            throttle: Arc::new(Throttle::per_second(1000)),
            page_size: 20,
            base_url: base_url.to_string(),
        }
    }

    #[cfg(test)]
    fn with_throttle(mut self, throttle: Arc<Throttle>) -> Self {
        self.throttle = throttle;
        self
    }
}

impl SearchClient for ScienceOnClient {
    async fn ready(&self) {
        self.throttle.acquire().await;
    }

    /// Sends immediately; callers wait on `ready` first.
    async fn fetch_page(
        &self,
        term: &SearchTerm,
        page: u32,
    ) -> Result<Vec<RawDocument>, SearchError> {
        let search_query = serde_json::json!({ "BI": term.text }).to_string();
        let page = page.to_string();
        let row_count = self.page_size.to_string();
        let response = self
            .http
            .get(&self.base_url)
            .header("User-Agent", crate::USER_AGENT)
            .query(&[
                ("client_id", self.credentials.client_id.as_str()),
                ("token", self.credentials.access_token.expose()),
                ("version", API_VERSION),
                ("action", "search"),
                ("target", TARGET_ARTICLES),
                ("searchQuery", search_query.as_str()),
                ("curPage", page.as_str()),
                ("rowCount", row_count.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        match status.as_u16() {
            200..=299 => {
                let body = response.text().await?;
                let docs = xml::parse_search_response(&body)?;
                debug!(term = %term.text, page, returned = docs.len(), "scienceon page");
                Ok(docs)
            }
            429 => Err(SearchError::RateLimited),
            401 | 403 => {
                let body = response.text().await.unwrap_or_default();
                Err(SearchError::Unauthorized(error_snippet(&body, status)))
            }
            code => {
                let body = response.text().await.unwrap_or_default();
                Err(SearchError::Api {
                    code,
                    message: error_snippet(&body, status),
                })
            }
        }
    }
}

fn error_snippet(body: &str, status: reqwest::StatusCode) -> String {
    let body = body.trim();
    if body.is_empty() {
        return format!("HTTP {status}");
    }
    let end = body.floor_char_boundary(200);
    body[..end].to_string()
}
