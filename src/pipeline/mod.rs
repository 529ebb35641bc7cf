//! Per-question flow (extract, plan, search, assemble) and the batch driver.

pub mod batch;
pub mod record;

pub use batch::{BatchDriver, BatchResult};
pub use record::{QueryResult, QueryStatus};

use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::Settings;
use crate::keywords::{KeywordExtractor, KeywordModel};
use crate::search::planner::{self, PlannerConfig};
use crate::search::{
    EngineConfig, LanguagePriority, QualityFilter, QuotaSearchEngine, SearchClient, Termination,
};

/// One input question; `id` is its position in the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    pub id: usize,
    pub text: String,
}

impl Question {
    pub fn numbered(texts: impl IntoIterator<Item = String>) -> Vec<Question> {
        texts
            .into_iter()
            .enumerate()
            .map(|(id, text)| Question { id, text })
            .collect()
    }
}

/// Runs one question end to end. Never returns an error: every failure
/// becomes a `failed` record so batches keep going.
pub struct QueryProcessor<M, C> {
    extractor: KeywordExtractor<M>,
    client: C,
    planner: PlannerConfig,
    engine: EngineConfig,
    quality: QualityFilter,
    language: LanguagePriority,
}

impl<M: KeywordModel, C: SearchClient> QueryProcessor<M, C> {
    pub fn new(extractor: KeywordExtractor<M>, client: C, settings: &Settings) -> Self {
        Self {
            extractor,
            client,
            planner: settings.planner_config(),
            engine: settings.engine_config(),
            quality: settings.quality_filter(),
            language: settings.language_priority,
        }
    }

    pub async fn process(
        &self,
        question: &str,
        target: usize,
        cancel: &CancellationToken,
    ) -> QueryResult {
        let started = Instant::now();
        let question = question.trim();

        if question.is_empty() {
            warn!("skipping empty question");
            return QueryResult::failed(question, "question is empty", started.elapsed());
        }
        if cancel.is_cancelled() {
            return QueryResult::failed(question, "cancelled", started.elapsed());
        }

        let extracted = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return QueryResult::failed(question, "cancelled", started.elapsed());
            }
            extracted = self.extractor.extract(question) => extracted,
        };
        let keywords = match extracted {
            Ok(keywords) => keywords,
            Err(e) => {
                error!(error = %e, "keyword extraction failed");
                return QueryResult::failed(
                    question,
                    format!("keyword extraction failed: {e}"),
                    started.elapsed(),
                );
            }
        };

        let primary = self.language.resolve(question);
        let terms = planner::plan(&keywords, primary, &self.planner);
        info!(
            keywords = keywords.len(),
            terms = terms.len(),
            primary = ?primary,
            "search terms planned"
        );

        let outcome = QuotaSearchEngine::new(&self.client, &self.engine, &self.quality)
            .search(&terms, target, cancel)
            .await;
        let found = outcome.documents.len();

        let (status, reason) = match outcome.termination {
            Termination::QuotaReached => (QueryStatus::Success, None),
            Termination::Exhausted => (
                QueryStatus::Partial,
                Some(format!("search space exhausted with {found} of {target} documents")),
            ),
            Termination::NoTerms => (QueryStatus::Failed, Some("no search terms".to_string())),
            Termination::Aborted(e) => (QueryStatus::Failed, Some(format!("search failed: {e}"))),
            Termination::Cancelled => (QueryStatus::Failed, Some("cancelled".to_string())),
        };

        let result = record::build(
            question,
            keywords,
            &terms,
            outcome.documents,
            status,
            started.elapsed(),
        )
        .with_stats(outcome.stats);

        match reason {
            Some(reason) if status.is_failed() => {
                error!(%reason, documents = found, "question failed");
                result.with_error(reason)
            }
            Some(reason) => {
                info!(%reason, documents = found, "question finished below quota");
                result.with_error(reason)
            }
            None => {
                info!(documents = found, "question reached quota");
                result
            }
        }
    }
}
