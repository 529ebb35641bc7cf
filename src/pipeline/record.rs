use std::fmt::Write as _;
use std::time::Duration;

use chrono::{Local, SecondsFormat};
use serde::{Deserialize, Serialize};

use crate::keywords::KeywordSet;
use crate::search::{Document, SearchStats, SearchTerm};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryStatus {
    /// Quota reached.
    Success,
    /// Search space exhausted below quota.
    Partial,
    Failed,
}

impl QueryStatus {
    pub fn is_failed(self) -> bool {
        self == QueryStatus::Failed
    }
}

/// Everything recorded about one question's run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub question: String,
    pub status: QueryStatus,
    #[serde(default)]
    pub keywords: KeywordSet,
    #[serde(default)]
    pub search_queries: Vec<String>,
    #[serde(default)]
    pub documents: Vec<Document>,
    #[serde(default)]
    pub total_documents_found: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default)]
    pub elapsed_seconds: f64,
    #[serde(default)]
    pub search_stats: SearchStats,
    #[serde(default)]
    pub search_timestamp: String,
}

/// Assembles the record for one question. Pure: no I/O, cannot fail.
pub fn build(
    question: &str,
    keywords: KeywordSet,
    terms: &[SearchTerm],
    documents: Vec<Document>,
    status: QueryStatus,
    elapsed: Duration,
) -> QueryResult {
    QueryResult {
        question: question.to_string(),
        status,
        keywords,
        search_queries: terms.iter().map(|t| t.text.clone()).collect(),
        total_documents_found: documents.len(),
        documents,
        error_message: None,
        elapsed_seconds: elapsed.as_secs_f64(),
        search_stats: SearchStats::default(),
        search_timestamp: now_timestamp(),
    }
}

impl QueryResult {
    pub fn failed(question: &str, reason: impl Into<String>, elapsed: Duration) -> Self {
        build(
            question,
            KeywordSet::default(),
            &[],
            Vec::new(),
            QueryStatus::Failed,
            elapsed,
        )
        .with_error(reason)
    }

    pub fn with_error(mut self, reason: impl Into<String>) -> Self {
        self.error_message = Some(reason.into());
        self
    }

    pub fn with_stats(mut self, stats: SearchStats) -> Self {
        self.search_stats = stats;
        self
    }

    /// Multi-line human summary for terminal output.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Question: {}", self.question);
        let _ = write!(out, "Status:   {:?}", self.status);
        if let Some(reason) = &self.error_message {
            let _ = write!(out, " ({reason})");
        }
        out.push('\n');
        if !self.keywords.is_empty() {
            let _ = writeln!(out, "Korean keywords:  {}", self.keywords.korean.join(", "));
            let _ = writeln!(out, "English keywords: {}", self.keywords.english.join(", "));
        }
        let _ = writeln!(
            out,
            "Search terms: {} | API calls: {} | Documents: {} | {:.1}s",
            self.search_queries.len(),
            self.search_stats.api_calls,
            self.total_documents_found,
            self.elapsed_seconds
        );
        for (i, doc) in self.documents.iter().take(5).enumerate() {
            let _ = writeln!(out, "  {}. {}", i + 1, doc.title);
        }
        if self.documents.len() > 5 {
            let _ = writeln!(out, "  ... and {} more", self.documents.len() - 5);
        }
        out
    }
}

pub(crate) fn now_timestamp() -> String {
    Local::now().to_rfc3339_opts(SecondsFormat::Secs, false)
}
