use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::client::{SearchClient, SearchError};
use super::filter::QualityFilter;
use super::types::{Document, RawDocument, SearchTerm};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub max_pages_per_term: u32,
    /// Attempts per (term, page) call, first try included.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub call_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_pages_per_term: 5,
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1000),
            call_timeout: Duration::from_secs(30),
        }
    }
}

/// Why the search loop stopped.
#[derive(Debug)]
pub enum Termination {
    QuotaReached,
    /// Every term was tried to an empty page, its page ceiling, or retry exhaustion.
    Exhausted,
    NoTerms,
    Aborted(SearchError),
    Cancelled,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchStats {
    pub terms_tried: usize,
    pub pages_tried: usize,
    pub api_calls: usize,
    pub transient_failures: usize,
}

#[derive(Debug)]
pub struct SearchOutcome {
    /// Discovery order, at most `target` long.
    pub documents: Vec<Document>,
    pub termination: Termination,
    pub stats: SearchStats,
}

/// Documents keyed by dedup key, in first-seen order.
#[derive(Default)]
struct DocumentIndex {
    keys: HashSet<String>,
    documents: Vec<Document>,
}

impl DocumentIndex {
    /// Returns false when the key is already taken; the earlier document stays.
    fn insert_if_absent(&mut self, doc: Document) -> bool {
        if !self.keys.insert(doc.dedup_key.clone()) {
            return false;
        }
        self.documents.push(doc);
        true
    }

    fn len(&self) -> usize {
        self.documents.len()
    }

    fn into_documents(self, target: usize) -> Vec<Document> {
        let mut documents = self.documents;
        documents.truncate(target);
        documents
    }
}

enum FetchFailure {
    RetriesExhausted(SearchError),
    Fatal(SearchError),
    Cancelled,
}

/// Term-major, page-minor retrieval loop that stops once `target` distinct,
/// quality-passing documents are collected or the term list runs dry.
///
/// Strictly sequential within one question: the order of page fetches decides
/// which document wins a dedup key.
pub struct QuotaSearchEngine<'a, C> {
    client: &'a C,
    config: &'a EngineConfig,
    quality: &'a QualityFilter,
}

impl<'a, C: SearchClient> QuotaSearchEngine<'a, C> {
    pub fn new(client: &'a C, config: &'a EngineConfig, quality: &'a QualityFilter) -> Self {
        Self {
            client,
            config,
            quality,
        }
    }

    pub async fn search(
        &self,
        terms: &[SearchTerm],
        target: usize,
        cancel: &CancellationToken,
    ) -> SearchOutcome {
        let mut stats = SearchStats::default();
        if terms.is_empty() {
            return SearchOutcome {
                documents: Vec::new(),
                termination: Termination::NoTerms,
                stats,
            };
        }

        let mut index = DocumentIndex::default();
        let mut termination = None;

        'terms: for term in terms {
            if index.len() >= target {
                break;
            }
            stats.terms_tried += 1;

            for page in 1..=self.config.max_pages_per_term {
                if cancel.is_cancelled() {
                    termination = Some(Termination::Cancelled);
                    break 'terms;
                }

                let raw = match self.fetch_with_retry(term, page, cancel, &mut stats).await {
                    Ok(raw) => raw,
                    Err(FetchFailure::RetriesExhausted(e)) => {
                        warn!(term = %term.text, page, error = %e, "retries exhausted, skipping term");
                        break;
                    }
                    Err(FetchFailure::Fatal(e)) => {
                        warn!(term = %term.text, page, error = %e, "fatal search error, aborting");
                        termination = Some(Termination::Aborted(e));
                        break 'terms;
                    }
                    Err(FetchFailure::Cancelled) => {
                        termination = Some(Termination::Cancelled);
                        break 'terms;
                    }
                };
                stats.pages_tried += 1;

                if raw.is_empty() {
                    debug!(term = %term.text, page, "empty page, term exhausted");
                    break;
                }

                let returned = raw.len();
                let mut added = 0;
                for doc in raw {
                    if index.len() >= target {
                        break;
                    }
                    if self.quality.passes(&doc) && index.insert_if_absent(Document::from(doc)) {
                        added += 1;
                    }
                }
                debug!(term = %term.text, page, returned, added, total = index.len(), "page merged");

                if index.len() >= target {
                    break 'terms;
                }
            }
        }

        let termination = termination.unwrap_or(if index.len() >= target {
            Termination::QuotaReached
        } else {
            Termination::Exhausted
        });

        info!(
            documents = index.len().min(target),
            target,
            terms_tried = stats.terms_tried,
            api_calls = stats.api_calls,
            termination = ?termination,
            "search finished"
        );

        SearchOutcome {
            documents: index.into_documents(target),
            termination,
            stats,
        }
    }

    async fn fetch_with_retry(
        &self,
        term: &SearchTerm,
        page: u32,
        cancel: &CancellationToken,
        stats: &mut SearchStats,
    ) -> Result<Vec<RawDocument>, FetchFailure> {
        let attempts = self.config.max_attempts.max(1);
        let mut last_err = None;

        for attempt in 0..attempts {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(FetchFailure::Cancelled),
                _ = self.client.ready() => {}
            }

            stats.api_calls += 1;
            let call = tokio::time::timeout(
                self.config.call_timeout,
                self.client.fetch_page(term, page),
            );
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(FetchFailure::Cancelled),
                result = call => result,
            };

            let err = match result {
                Ok(Ok(docs)) => return Ok(docs),
                Ok(Err(e)) if !e.is_transient() => return Err(FetchFailure::Fatal(e)),
                Ok(Err(e)) => e,
                Err(_) => SearchError::Timeout(self.config.call_timeout),
            };
            stats.transient_failures += 1;

            if attempt + 1 < attempts {
                let delay_ms = crate::backoff::jittered(
                    self.config.initial_backoff.as_millis() as u64,
                    attempt,
                );
                debug!(term = %term.text, page, attempt = attempt + 1, delay_ms, error = %err, "retrying after transient error");
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(FetchFailure::Cancelled),
                    _ = tokio::time::sleep(Duration::from_millis(delay_ms)) => {}
                }
            }
            last_err = Some(err);
        }

        Err(FetchFailure::RetriesExhausted(
            last_err.unwrap_or(SearchError::RateLimited),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::types::TermLanguage;
    use std::collections::{HashMap, HashSet, VecDeque};
    use std::sync::Mutex;

    type Script = HashMap<(String, u32), VecDeque<Result<Vec<RawDocument>, SearchError>>>;

    /// Scripted responses per (term, page); unscripted calls return an empty page.
    #[derive(Default)]
    struct StubSearch {
        script: Mutex<Script>,
        calls: Mutex<Vec<(String, u32)>>,
    }

    impl StubSearch {
        fn page(self, term: &str, page: u32, docs: Vec<RawDocument>) -> Self {
            self.respond(term, page, Ok(docs))
        }

        fn respond(
            self,
            term: &str,
            page: u32,
            response: Result<Vec<RawDocument>, SearchError>,
        ) -> Self {
            self.script
                .lock()
                .unwrap()
                .entry((term.to_string(), page))
                .or_default()
                .push_back(response);
            self
        }

        fn calls(&self) -> Vec<(String, u32)> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl SearchClient for StubSearch {
        async fn fetch_page(
            &self,
            term: &SearchTerm,
            page: u32,
        ) -> Result<Vec<RawDocument>, SearchError> {
            self.calls.lock().unwrap().push((term.text.clone(), page));
            self.script
                .lock()
                .unwrap()
                .get_mut(&(term.text.clone(), page))
                .and_then(VecDeque::pop_front)
                .unwrap_or(Ok(Vec::new()))
        }
    }

    struct HangingSearch;

    impl SearchClient for HangingSearch {
        async fn fetch_page(
            &self,
            _term: &SearchTerm,
            _page: u32,
        ) -> Result<Vec<RawDocument>, SearchError> {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(Vec::new())
        }
    }

    /// Instant pages behind a slow local gate.
    struct GatedSearch {
        gate: Duration,
        inner: StubSearch,
    }

    impl SearchClient for GatedSearch {
        async fn ready(&self) {
            tokio::time::sleep(self.gate).await;
        }

        async fn fetch_page(
            &self,
            term: &SearchTerm,
            page: u32,
        ) -> Result<Vec<RawDocument>, SearchError> {
            self.inner.fetch_page(term, page).await
        }
    }

    fn doc(title: &str) -> RawDocument {
        doc_from(title, "CN")
    }

    fn doc_from(title: &str, cn: &str) -> RawDocument {
        RawDocument {
            title: title.into(),
            abstract_text: Some("An abstract long enough.".into()),
            identifier: Some(cn.into()),
            ..RawDocument::default()
        }
    }

    fn terms(texts: &[&str]) -> Vec<SearchTerm> {
        texts
            .iter()
            .enumerate()
            .map(|(priority, t)| SearchTerm {
                text: t.to_string(),
                priority,
                language: TermLanguage::English,
            })
            .collect()
    }

    fn fast_config() -> EngineConfig {
        EngineConfig {
            initial_backoff: Duration::ZERO,
            call_timeout: Duration::from_secs(2),
            ..EngineConfig::default()
        }
    }

    fn titles(outcome: &SearchOutcome) -> Vec<&str> {
        outcome.documents.iter().map(|d| d.title.as_str()).collect()
    }

    async fn run(stub: &StubSearch, terms: &[SearchTerm], target: usize) -> SearchOutcome {
        let config = fast_config();
        let quality = QualityFilter::default();
        QuotaSearchEngine::new(stub, &config, &quality)
            .search(terms, target, &CancellationToken::new())
            .await
    }

    #[tokio::test]
    async fn quota_met_on_first_term_skips_rest() {
        let stub = StubSearch::default().page(
            "t1",
            1,
            vec![doc("Alpha paper"), doc("Beta paper"), doc("Gamma paper")],
        );

        let outcome = run(&stub, &terms(&["t1", "t2"]), 3).await;

        assert!(matches!(outcome.termination, Termination::QuotaReached));
        assert_eq!(titles(&outcome), vec!["Alpha paper", "Beta paper", "Gamma paper"]);
        assert_eq!(stub.calls(), vec![("t1".to_string(), 1)]);
    }

    #[tokio::test]
    async fn first_seen_wins_across_terms() {
        let stub = StubSearch::default()
            .page("t1", 1, vec![doc_from("Neural Nets", "CN-T1")])
            .page("t2", 1, vec![doc_from("neural  nets", "CN-T2"), doc("Other paper")]);

        let outcome = run(&stub, &terms(&["t1", "t2"]), 2).await;

        assert_eq!(titles(&outcome), vec!["Neural Nets", "Other paper"]);
        assert_eq!(outcome.documents[0].identifier.as_deref(), Some("CN-T1"));
    }

    #[tokio::test]
    async fn filtered_document_does_not_claim_dedup_slot() {
        let no_source = RawDocument {
            identifier: None,
            ..doc("Shared title")
        };
        let stub = StubSearch::default()
            .page("t1", 1, vec![no_source])
            .page("t2", 1, vec![doc_from("Shared title", "CN-GOOD")]);

        let outcome = run(&stub, &terms(&["t1", "t2"]), 5).await;

        assert_eq!(titles(&outcome), vec!["Shared title"]);
        assert_eq!(outcome.documents[0].identifier.as_deref(), Some("CN-GOOD"));
    }

    #[tokio::test]
    async fn short_titles_never_returned() {
        let stub = StubSearch::default()
            .page("t1", 1, vec![doc("AI"), doc("Long enough title"), doc("ML")])
            .page("t1", 2, vec![doc("abc"), doc("Another good title")]);

        let outcome = run(&stub, &terms(&["t1"]), 10).await;

        assert_eq!(titles(&outcome), vec!["Long enough title", "Another good title"]);
        assert!(outcome.documents.iter().all(|d| d.title.chars().count() >= 5));
    }

    #[tokio::test]
    async fn exhaustion_respects_page_ceiling() {
        let mut stub = StubSearch::default();
        for page in 1..=10 {
            stub = stub.page("t1", page, vec![doc(&format!("Paper number {page}"))]);
        }

        let outcome = run(&stub, &terms(&["t1"]), 50).await;

        assert!(matches!(outcome.termination, Termination::Exhausted));
        assert_eq!(outcome.documents.len(), 5);
        assert_eq!(stub.calls().len(), 5);
        assert_eq!(outcome.stats.pages_tried, 5);
    }

    #[tokio::test]
    async fn empty_page_moves_to_next_term() {
        let stub = StubSearch::default()
            .page("t1", 1, vec![doc("First paper")])
            .page("t2", 1, vec![doc("Second paper")]);

        let outcome = run(&stub, &terms(&["t1", "t2"]), 10).await;

        assert!(matches!(outcome.termination, Termination::Exhausted));
        assert_eq!(
            stub.calls(),
            vec![
                ("t1".to_string(), 1),
                ("t1".to_string(), 2),
                ("t2".to_string(), 1),
                ("t2".to_string(), 2),
            ]
        );
        assert_eq!(titles(&outcome), vec!["First paper", "Second paper"]);
    }

    #[tokio::test]
    async fn never_revisits_term_page_pair() {
        let stub = StubSearch::default()
            .page("t1", 1, vec![doc("Paper one")])
            .page("t1", 2, vec![doc("Paper two")])
            .page("t2", 1, vec![doc("Paper three")]);

        run(&stub, &terms(&["t1", "t2", "t3"]), 100).await;

        let calls = stub.calls();
        let unique: HashSet<_> = calls.iter().cloned().collect();
        assert_eq!(unique.len(), calls.len());
    }

    #[tokio::test]
    async fn output_truncated_to_target() {
        let stub = StubSearch::default().page(
            "t1",
            1,
            (0..20).map(|i| doc(&format!("Paper number {i}"))).collect(),
        );

        let outcome = run(&stub, &terms(&["t1"]), 7).await;

        assert_eq!(outcome.documents.len(), 7);
        assert_eq!(outcome.documents[6].title, "Paper number 6");
        assert!(matches!(outcome.termination, Termination::QuotaReached));
    }

    #[tokio::test]
    async fn fatal_error_keeps_partial_documents() {
        let stub = StubSearch::default()
            .page("t1", 1, vec![doc("Collected paper")])
            .respond("t1", 2, Err(SearchError::Unauthorized("token expired".into())));

        let outcome = run(&stub, &terms(&["t1", "t2"]), 5).await;

        assert!(matches!(
            outcome.termination,
            Termination::Aborted(SearchError::Unauthorized(_))
        ));
        assert_eq!(titles(&outcome), vec!["Collected paper"]);
        assert!(!stub.calls().iter().any(|(t, _)| t == "t2"));
    }

    #[tokio::test]
    async fn transient_error_retried_then_succeeds() {
        let stub = StubSearch::default()
            .respond("t1", 1, Err(SearchError::RateLimited))
            .page("t1", 1, vec![doc("Recovered paper")]);

        let outcome = run(&stub, &terms(&["t1"]), 1).await;

        assert_eq!(titles(&outcome), vec!["Recovered paper"]);
        assert_eq!(outcome.stats.api_calls, 2);
        assert_eq!(outcome.stats.transient_failures, 1);
    }

    #[tokio::test]
    async fn retry_exhaustion_skips_term_not_question() {
        let stub = StubSearch::default()
            .respond("t1", 1, Err(SearchError::RateLimited))
            .respond("t1", 1, Err(SearchError::Api { code: 503, message: "busy".into() }))
            .respond("t1", 1, Err(SearchError::RateLimited))
            .page("t2", 1, vec![doc("From second term")]);

        let outcome = run(&stub, &terms(&["t1", "t2"]), 1).await;

        assert!(matches!(outcome.termination, Termination::QuotaReached));
        assert_eq!(titles(&outcome), vec!["From second term"]);
        let t1_calls = stub.calls().iter().filter(|(t, _)| t == "t1").count();
        assert_eq!(t1_calls, 3);
    }

    #[tokio::test]
    async fn empty_terms_make_no_calls() {
        let stub = StubSearch::default();

        let outcome = run(&stub, &[], 5).await;

        assert!(matches!(outcome.termination, Termination::NoTerms));
        assert!(outcome.documents.is_empty());
        assert!(stub.calls().is_empty());
    }

    #[tokio::test]
    async fn identical_stub_gives_identical_output() {
        let build = || {
            StubSearch::default()
                .page("t1", 1, vec![doc("Paper A"), doc("Paper B")])
                .page("t2", 1, vec![doc("Paper B"), doc("Paper C")])
                .page("t2", 2, vec![doc("Paper D")])
        };
        let term_list = terms(&["t1", "t2"]);

        let first = run(&build(), &term_list, 10).await;
        let second = run(&build(), &term_list, 10).await;

        assert_eq!(first.documents, second.documents);
        assert_eq!(titles(&first), vec!["Paper A", "Paper B", "Paper C", "Paper D"]);
    }

    #[tokio::test]
    async fn dedup_keys_are_pairwise_distinct() {
        let stub = StubSearch::default()
            .page("t1", 1, vec![doc("Same Title"), doc("SAME title"), doc("Different one")])
            .page("t2", 1, vec![doc("same   title"), doc("Different One")]);

        let outcome = run(&stub, &terms(&["t1", "t2"]), 10).await;

        let keys: HashSet<_> = outcome.documents.iter().map(|d| &d.dedup_key).collect();
        assert_eq!(keys.len(), outcome.documents.len());
        assert_eq!(outcome.documents.len(), 2);
    }

    #[tokio::test]
    async fn cancelled_before_start_makes_no_calls() {
        let stub = StubSearch::default().page("t1", 1, vec![doc("Paper one")]);
        let config = fast_config();
        let quality = QualityFilter::default();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = QuotaSearchEngine::new(&stub, &config, &quality)
            .search(&terms(&["t1"]), 5, &cancel)
            .await;

        assert!(matches!(outcome.termination, Termination::Cancelled));
        assert!(stub.calls().is_empty());
    }

    #[tokio::test]
    async fn cancel_interrupts_in_flight_call() {
        let config = fast_config();
        let quality = QualityFilter::default();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let outcome = QuotaSearchEngine::new(&HangingSearch, &config, &quality)
            .search(&terms(&["t1"]), 5, &cancel)
            .await;

        assert!(matches!(outcome.termination, Termination::Cancelled));
    }

    #[tokio::test]
    async fn slow_call_times_out_as_transient() {
        let config = EngineConfig {
            call_timeout: Duration::from_millis(10),
            max_attempts: 2,
            initial_backoff: Duration::ZERO,
            ..EngineConfig::default()
        };
        let quality = QualityFilter::default();

        let outcome = QuotaSearchEngine::new(&HangingSearch, &config, &quality)
            .search(&terms(&["t1"]), 5, &CancellationToken::new())
            .await;

        assert!(matches!(outcome.termination, Termination::Exhausted));
        assert_eq!(outcome.stats.api_calls, 2);
        assert_eq!(outcome.stats.transient_failures, 2);
    }

    #[tokio::test]
    async fn waiting_for_ready_is_not_timed() {
        let client = GatedSearch {
            gate: Duration::from_millis(100),
            inner: StubSearch::default().page("t1", 1, vec![doc("Gated paper")]),
        };
        let config = EngineConfig {
            call_timeout: Duration::from_millis(30),
            ..fast_config()
        };
        let quality = QualityFilter::default();

        let outcome = QuotaSearchEngine::new(&client, &config, &quality)
            .search(&terms(&["t1"]), 1, &CancellationToken::new())
            .await;

        assert!(matches!(outcome.termination, Termination::QuotaReached));
        assert_eq!(outcome.stats.transient_failures, 0);
    }

    #[tokio::test]
    async fn cancel_interrupts_wait_for_ready() {
        let client = GatedSearch {
            gate: Duration::from_secs(10),
            inner: StubSearch::default(),
        };
        let config = fast_config();
        let quality = QualityFilter::default();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let outcome = QuotaSearchEngine::new(&client, &config, &quality)
            .search(&terms(&["t1"]), 5, &cancel)
            .await;

        assert!(matches!(outcome.termination, Termination::Cancelled));
        assert!(client.inner.calls().is_empty());
    }
}
