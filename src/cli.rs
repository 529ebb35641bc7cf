use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Args, Parser, Subcommand};
use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::Settings;
use crate::gemini::{GeminiClient, GeminiError};
use crate::input;
use crate::keywords::KeywordExtractor;
use crate::output::{self, OutputWriter};
use crate::pipeline::{BatchDriver, BatchResult, QueryProcessor, Question};
use crate::scienceon::{Credentials, ScienceOnClient, Throttle, TokenIssuer};
use crate::search::LanguagePriority;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const HTTP_TIMEOUT: Duration = Duration::from_secs(60);

type BoxError = Box<dyn std::error::Error>;

/// Collects a fixed quota of ScienceON papers per question using
/// Gemini-extracted Korean and English keywords.
#[derive(Debug, Parser)]
#[command(name = "docquota", version)]
pub struct Cli {
    #[command(flatten)]
    pub overrides: Overrides,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Search for one question and print a summary
    Single {
        /// The question text
        question: String,
    },
    /// Search for every question in the first column of a CSV file
    Batch {
        /// CSV file with a header row
        csv: PathBuf,

        /// Process only the first N questions
        #[arg(long, value_parser = positive::<usize>)]
        max_queries: Option<usize>,
    },
    /// Regenerate CSV and JSONL from a saved batch JSON (default: the latest)
    Convert { json: Option<PathBuf> },
    /// Print the effective settings
    Info,
}

/// Flags that take precedence over environment settings.
#[derive(Debug, Default, Args)]
pub struct Overrides {
    /// Documents to collect per question
    #[arg(long, global = true, value_parser = positive::<usize>)]
    pub target: Option<usize>,

    /// Page ceiling per search term
    #[arg(long, global = true, value_parser = positive::<u32>)]
    pub max_pages: Option<u32>,

    /// Questions processed concurrently
    #[arg(long, global = true, value_parser = positive::<usize>)]
    pub workers: Option<usize>,

    #[arg(long, global = true)]
    pub output_dir: Option<PathBuf>,

    /// Which keyword language is searched first
    #[arg(long, global = true, value_enum)]
    pub language: Option<LanguagePriority>,
}

impl Overrides {
    pub fn apply(&self, settings: &mut Settings) {
        if let Some(target) = self.target {
            settings.target_documents = target;
        }
        if let Some(pages) = self.max_pages {
            settings.max_search_pages = pages;
        }
        if let Some(workers) = self.workers {
            settings.workers = workers;
        }
        if let Some(dir) = &self.output_dir {
            settings.output_directory = dir.clone();
        }
        if let Some(language) = self.language {
            settings.language_priority = language;
        }
    }
}

fn positive<T>(s: &str) -> Result<T, String>
where
    T: FromStr + PartialOrd + Default,
    T::Err: std::fmt::Display,
{
    let value: T = s.parse().map_err(|e: T::Err| e.to_string())?;
    if value > T::default() {
        Ok(value)
    } else {
        Err("must be greater than zero".to_string())
    }
}

pub async fn run(command: Command, settings: Settings) -> Result<(), BoxError> {
    match command {
        Command::Info => {
            println!("{settings}");
            Ok(())
        }
        Command::Convert { json } => convert(json, &settings),
        Command::Single { question } => {
            let cancel = cancel_on_ctrl_c();
            let processor = build_processor(&settings).await?;
            let started = Instant::now();
            let result = processor
                .process(&question, settings.target_documents, &cancel)
                .await;
            print!("{}", result.summary());
            let batch = BatchResult::new(vec![result], "single", started.elapsed());
            save(&batch, &settings)
        }
        Command::Batch { csv, max_queries } => {
            let questions = input::load_questions(&csv, max_queries)?;
            info!(path = %csv.display(), count = questions.len(), "questions loaded");
            let cancel = cancel_on_ctrl_c();
            let processor = build_processor(&settings).await?;
            let batch = BatchDriver::new(&processor, settings.workers)
                .run(
                    Question::numbered(questions),
                    settings.target_documents,
                    &cancel,
                )
                .await;
            println!("{}", batch.batch_statistics.summary());
            save(&batch, &settings)
        }
    }
}

/// Loads (and if needed renews) credentials and builds both external clients.
/// Any failure here stops the run before a question is touched.
async fn build_processor(
    settings: &Settings,
) -> Result<QueryProcessor<GeminiClient, ScienceOnClient>, BoxError> {
    let http = Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(HTTP_TIMEOUT)
        .build()?;

    let issuer = TokenIssuer::new(http.clone());
    let credentials = Credentials::load(&settings.credentials_path, &issuer).await?;
    info!(expires_at = %credentials.expires_at, "ScienceON credentials loaded");

    let api_key = settings
        .gemini_api_key
        .clone()
        .ok_or(GeminiError::ApiKeyNotSet)?;
    let gemini = GeminiClient::new(http.clone(), api_key, &settings.gemini_model)?
        .with_call_timeout(settings.call_timeout);
    // Covers the client's own retries, which each carry their own call timeout.
    let extractor = KeywordExtractor::new(gemini, settings.max_keywords)
        .with_timeout(settings.call_timeout * 3);

    let throttle = Arc::new(Throttle::per_second(settings.requests_per_second));
    let search = ScienceOnClient::new(
        http,
        Arc::new(credentials),
        throttle,
        settings.page_size,
    );

    Ok(QueryProcessor::new(extractor, search, settings))
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; finishing with results collected so far");
            trigger.cancel();
        }
    });
    cancel
}

fn save(batch: &BatchResult, settings: &Settings) -> Result<(), BoxError> {
    let files = OutputWriter::new(&settings.output_directory, settings.target_documents)
        .write_all(batch)?;
    println!("Results: {}", files.json.display());
    println!("CSV:     {}", files.csv.display());
    println!("JSONL:   {}", files.jsonl.display());
    Ok(())
}

fn convert(json: Option<PathBuf>, settings: &Settings) -> Result<(), BoxError> {
    let writer = OutputWriter::new(&settings.output_directory, settings.target_documents);
    let path = match json {
        Some(path) => path,
        None => writer.latest_json()?,
    };
    let batch = output::load_batch(&path)?;
    let (csv, jsonl) = writer.convert(&batch)?;
    println!("Converted {}", path.display());
    println!("CSV:   {}", csv.display());
    println!("JSONL: {}", jsonl.display());
    Ok(())
}
