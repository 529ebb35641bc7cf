use std::collections::HashSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use tracing::info;

use crate::pipeline::{BatchResult, QueryResult};
use crate::search::Document;

const JSON_PREFIX: &str = "search_meta_results_";
const CSV_PREFIX: &str = "search_results_";
const JSONL_PREFIX: &str = "search_documents_";

#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("no search_meta_results_*.json file in {}", .0.display())]
    NoSavedResults(PathBuf),
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> OutputError + '_ {
    move |source| OutputError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFiles {
    pub json: PathBuf,
    pub csv: PathBuf,
    pub jsonl: PathBuf,
}

/// Writes batch results under one directory with a shared `YYYYmmdd_HHMMSS` stamp.
pub struct OutputWriter {
    dir: PathBuf,
    /// Minimum number of prediction columns in the CSV.
    columns: usize,
}

impl OutputWriter {
    pub fn new(dir: impl Into<PathBuf>, columns: usize) -> Self {
        Self {
            dir: dir.into(),
            columns,
        }
    }

    /// Saves the full JSON record plus its CSV and JSONL conversions.
    pub fn write_all(&self, batch: &BatchResult) -> Result<OutputFiles, OutputError> {
        let stamp = file_stamp();
        self.ensure_dir()?;
        let json = self.path(JSON_PREFIX, &stamp, "json");
        let file = File::create(&json).map_err(io_err(&json))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, batch)?;
        writer.flush().map_err(io_err(&json))?;
        info!(path = %json.display(), "saved batch results");

        let (csv, jsonl) = self.write_conversions(batch, &stamp)?;
        Ok(OutputFiles { json, csv, jsonl })
    }

    /// Re-derives CSV and JSONL from an already saved batch.
    pub fn convert(&self, batch: &BatchResult) -> Result<(PathBuf, PathBuf), OutputError> {
        self.ensure_dir()?;
        self.write_conversions(batch, &file_stamp())
    }

    /// The saved batch JSON with the greatest file name, which is the newest stamp.
    pub fn latest_json(&self) -> Result<PathBuf, OutputError> {
        let entries = std::fs::read_dir(&self.dir).map_err(io_err(&self.dir))?;
        entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(JSON_PREFIX) && n.ends_with(".json"))
            })
            .max_by(|a, b| a.file_name().cmp(&b.file_name()))
            .ok_or_else(|| OutputError::NoSavedResults(self.dir.clone()))
    }

    fn write_conversions(
        &self,
        batch: &BatchResult,
        stamp: &str,
    ) -> Result<(PathBuf, PathBuf), OutputError> {
        let csv = self.path(CSV_PREFIX, stamp, "csv");
        write_csv(&csv, &batch.results, self.columns)?;
        info!(path = %csv.display(), "saved CSV");

        let jsonl = self.path(JSONL_PREFIX, stamp, "jsonl");
        let unique = write_jsonl(&jsonl, &batch.results)?;
        info!(path = %jsonl.display(), documents = unique, "saved JSONL");
        Ok((csv, jsonl))
    }

    fn ensure_dir(&self) -> Result<(), OutputError> {
        std::fs::create_dir_all(&self.dir).map_err(io_err(&self.dir))
    }

    fn path(&self, prefix: &str, stamp: &str, ext: &str) -> PathBuf {
        self.dir.join(format!("{prefix}{stamp}.{ext}"))
    }
}

pub fn load_batch(path: &Path) -> Result<BatchResult, OutputError> {
    let text = std::fs::read_to_string(path).map_err(io_err(path))?;
    Ok(serde_json::from_str(&text)?)
}

fn file_stamp() -> String {
    Local::now().format("%Y%m%d_%H%M%S").to_string()
}

/// One row per answered question: the question, then one cell per document.
fn write_csv(path: &Path, results: &[QueryResult], min_columns: usize) -> Result<(), OutputError> {
    let answered: Vec<&QueryResult> = results.iter().filter(|r| !r.status.is_failed()).collect();
    let columns = answered
        .iter()
        .map(|r| r.documents.len())
        .max()
        .unwrap_or(0)
        .max(min_columns);

    let file = File::create(path).map_err(io_err(path))?;
    let mut writer = csv::Writer::from_writer(file);

    let mut header = Vec::with_capacity(columns + 1);
    header.push("Question".to_string());
    header.extend((1..=columns).map(|i| format!("Prediction_retrieved_article_name_{i}")));
    writer.write_record(&header)?;

    for result in answered {
        let mut row = Vec::with_capacity(columns + 1);
        row.push(result.question.clone());
        row.extend(result.documents.iter().map(csv_cell));
        row.resize(columns + 1, String::new());
        writer.write_record(&row)?;
    }
    writer.flush().map_err(io_err(path))?;
    Ok(())
}

fn csv_cell(doc: &Document) -> String {
    format!(
        "Title: {}, Abstract: {}, Source: {}",
        doc.title,
        doc.abstract_text.as_deref().unwrap_or_default(),
        doc.source_url.as_deref().unwrap_or_default()
    )
}

/// Documents across answered questions, first occurrence of each title only.
fn write_jsonl(path: &Path, results: &[QueryResult]) -> Result<usize, OutputError> {
    let file = File::create(path).map_err(io_err(path))?;
    let mut writer = BufWriter::new(file);
    let mut seen = HashSet::new();

    for doc in results
        .iter()
        .filter(|r| !r.status.is_failed())
        .flat_map(|r| &r.documents)
    {
        let title = doc.title.trim();
        if title.is_empty() || !seen.insert(title.to_string()) {
            continue;
        }
        serde_json::to_writer(&mut writer, doc)?;
        writer.write_all(b"\n").map_err(io_err(path))?;
    }
    writer.flush().map_err(io_err(path))?;
    Ok(seen.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keywords::KeywordSet;
    use crate::pipeline::QueryStatus;
    use crate::pipeline::record::build;
    use crate::search::RawDocument;
    use std::time::Duration;

    fn doc(title: &str) -> Document {
        Document::from(RawDocument {
            title: title.into(),
            abstract_text: Some(format!("About {title}")),
            identifier: Some("CN1".into()),
            source_url: Some(format!("http://example.org/{}", title.len())),
            ..RawDocument::default()
        })
    }

    fn result(question: &str, status: QueryStatus, titles: &[&str]) -> QueryResult {
        build(
            question,
            KeywordSet::default(),
            &[],
            titles.iter().map(|t| doc(t)).collect(),
            status,
            Duration::ZERO,
        )
    }

    fn sample_batch() -> BatchResult {
        BatchResult::new(
            vec![
                result("first question", QueryStatus::Success, &["Paper A", "Paper B"]),
                result("second question", QueryStatus::Failed, &["Paper F"]),
                result("third question", QueryStatus::Partial, &["Paper B", "Paper C"]),
            ],
            "batch",
            Duration::from_secs(1),
        )
    }

    #[test]
    fn writes_all_three_files() {
        let dir = tempfile::tempdir().unwrap();
        let writer = OutputWriter::new(dir.path().join("out"), 3);

        let files = writer.write_all(&sample_batch()).unwrap();

        for path in [&files.json, &files.csv, &files.jsonl] {
            assert!(path.exists(), "{} missing", path.display());
        }
        let name = files.json.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("search_meta_results_"));
    }

    #[test]
    fn saved_json_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let writer = OutputWriter::new(dir.path(), 3);
        let batch = sample_batch();

        let files = writer.write_all(&batch).unwrap();
        let loaded = load_batch(&files.json).unwrap();

        assert_eq!(loaded.batch_statistics, batch.batch_statistics);
        assert_eq!(loaded.results.len(), 3);
        assert_eq!(loaded.results[0].documents[0].title, "Paper A");
    }

    #[test]
    fn csv_has_fixed_columns_and_skips_failed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("r.csv");

        write_csv(&path, &sample_batch().results, 3).unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let header = reader.headers().unwrap().clone();
        assert_eq!(header.len(), 4);
        assert_eq!(&header[0], "Question");
        assert_eq!(&header[3], "Prediction_retrieved_article_name_3");

        let rows: Vec<csv::StringRecord> = reader.records().map(Result::unwrap).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(&rows[0][0], "first question");
        assert_eq!(
            &rows[0][1],
            "Title: Paper A, Abstract: About Paper A, Source: http://example.org/7"
        );
        assert_eq!(&rows[0][3], "");
        assert_eq!(&rows[1][0], "third question");
    }

    #[test]
    fn csv_grows_to_longest_document_list() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("r.csv");
        let results = vec![result("q", QueryStatus::Success, &["P1 long", "P2 long", "P3 long"])];

        write_csv(&path, &results, 1).unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        assert_eq!(reader.headers().unwrap().len(), 4);
    }

    #[test]
    fn jsonl_is_unique_by_title_and_skips_failed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("d.jsonl");

        let count = write_jsonl(&path, &sample_batch().results).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let titles: Vec<String> = text
            .lines()
            .map(|line| {
                let value: serde_json::Value = serde_json::from_str(line).unwrap();
                value["title"].as_str().unwrap().to_string()
            })
            .collect();
        assert_eq!(titles, vec!["Paper A", "Paper B", "Paper C"]);
        assert_eq!(count, 3);
    }

    #[test]
    fn latest_json_picks_newest_stamp() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "search_meta_results_20250101_120000.json",
            "search_meta_results_20250301_090000.json",
            "search_results_20991231_000000.csv",
        ] {
            std::fs::write(dir.path().join(name), "{}").unwrap();
        }

        let latest = OutputWriter::new(dir.path(), 1).latest_json().unwrap();
        assert!(latest.ends_with("search_meta_results_20250301_090000.json"));
    }

    #[test]
    fn latest_json_reports_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        let err = OutputWriter::new(dir.path(), 1).latest_json().unwrap_err();
        assert!(matches!(err, OutputError::NoSavedResults(_)));
    }
}
