use std::time::{Duration, Instant};

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, info, info_span, warn};

use super::record::{QueryResult, QueryStatus, now_timestamp};
use super::{QueryProcessor, Question};
use crate::keywords::KeywordModel;
use crate::search::SearchClient;

/// Aggregate counts over one batch. Keyword and term totals cover non-failed questions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchStatistics {
    pub total_queries: usize,
    /// Success plus partial.
    pub successful_queries: usize,
    #[serde(default)]
    pub partial_queries: usize,
    pub failed_queries: usize,
    /// Percentage, 0 to 100.
    pub success_rate: f64,
    pub total_documents_found: usize,
    pub avg_documents_per_query: f64,
    #[serde(default)]
    pub total_korean_keywords: usize,
    #[serde(default)]
    pub total_english_keywords: usize,
    #[serde(default)]
    pub avg_korean_keywords_per_query: f64,
    #[serde(default)]
    pub avg_english_keywords_per_query: f64,
    #[serde(default)]
    pub total_search_queries_generated: usize,
    #[serde(default)]
    pub avg_search_queries_per_query: f64,
    #[serde(default)]
    pub processing_time_seconds: f64,
    #[serde(default)]
    pub processing_timestamp: String,
}

impl BatchStatistics {
    pub fn from_results(results: &[QueryResult], elapsed: Duration) -> Self {
        let mut stats = BatchStatistics {
            total_queries: results.len(),
            processing_time_seconds: elapsed.as_secs_f64(),
            processing_timestamp: now_timestamp(),
            ..BatchStatistics::default()
        };

        for result in results {
            match result.status {
                QueryStatus::Failed => {
                    stats.failed_queries += 1;
                    continue;
                }
                QueryStatus::Partial => stats.partial_queries += 1,
                QueryStatus::Success => {}
            }
            stats.successful_queries += 1;
            stats.total_documents_found += result.total_documents_found;
            stats.total_korean_keywords += result.keywords.korean.len();
            stats.total_english_keywords += result.keywords.english.len();
            stats.total_search_queries_generated += result.search_queries.len();
        }

        if stats.total_queries > 0 {
            stats.success_rate =
                stats.successful_queries as f64 / stats.total_queries as f64 * 100.0;
        }
        if stats.successful_queries > 0 {
            let n = stats.successful_queries as f64;
            stats.avg_documents_per_query = stats.total_documents_found as f64 / n;
            stats.avg_korean_keywords_per_query = stats.total_korean_keywords as f64 / n;
            stats.avg_english_keywords_per_query = stats.total_english_keywords as f64 / n;
            stats.avg_search_queries_per_query = stats.total_search_queries_generated as f64 / n;
        }
        stats
    }

    pub fn summary(&self) -> String {
        format!(
            "Questions: {} | succeeded: {} (partial: {}) | failed: {} | success rate: {:.1}%\n\
             Documents: {} total, {:.1} per answered question | {:.1}s",
            self.total_queries,
            self.successful_queries,
            self.partial_queries,
            self.failed_queries,
            self.success_rate,
            self.total_documents_found,
            self.avg_documents_per_query,
            self.processing_time_seconds,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResult {
    pub batch_statistics: BatchStatistics,
    pub results: Vec<QueryResult>,
    pub execution_mode: String,
    pub batch_timestamp: String,
}

impl BatchResult {
    pub fn new(results: Vec<QueryResult>, execution_mode: &str, elapsed: Duration) -> Self {
        Self {
            batch_statistics: BatchStatistics::from_results(&results, elapsed),
            results,
            execution_mode: execution_mode.to_string(),
            batch_timestamp: now_timestamp(),
        }
    }
}

/// Runs questions through one processor, up to `workers` at a time.
/// Results keep input order whatever the completion order.
pub struct BatchDriver<'a, M, C> {
    processor: &'a QueryProcessor<M, C>,
    workers: usize,
}

impl<'a, M: KeywordModel, C: SearchClient> BatchDriver<'a, M, C> {
    pub fn new(processor: &'a QueryProcessor<M, C>, workers: usize) -> Self {
        Self {
            processor,
            workers: workers.max(1),
        }
    }

    /// Every input question gets a record. After cancellation, questions not yet
    /// started are recorded as failed without any external call.
    pub async fn run(
        &self,
        questions: Vec<Question>,
        target: usize,
        cancel: &CancellationToken,
    ) -> BatchResult {
        let started = Instant::now();
        let total = questions.len();
        let mode = if self.workers > 1 { "concurrent" } else { "sequential" };
        info!(total, workers = self.workers, target, mode, "batch started");

        let processor = self.processor;
        let results: Vec<QueryResult> = futures::stream::iter(questions)
            .map(|question| {
                let span = info_span!("question", id = question.id + 1, total);
                async move {
                    info!(text = %question.text, "processing");
                    processor.process(&question.text, target, cancel).await
                }
                .instrument(span)
            })
            .buffered(self.workers)
            .collect()
            .await;

        if cancel.is_cancelled() {
            warn!("batch cancelled; unfinished questions recorded as failed");
        }

        let batch = BatchResult::new(results, "batch", started.elapsed());
        info!(
            succeeded = batch.batch_statistics.successful_queries,
            failed = batch.batch_statistics.failed_queries,
            documents = batch.batch_statistics.total_documents_found,
            "batch finished"
        );
        batch
    }
}
