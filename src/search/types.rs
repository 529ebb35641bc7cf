use serde::{Deserialize, Serialize};

use super::filter::dedup_key;
use super::lang::Language;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TermLanguage {
    Korean,
    English,
    Mixed,
}

impl From<Language> for TermLanguage {
    fn from(lang: Language) -> Self {
        match lang {
            Language::Korean => TermLanguage::Korean,
            Language::English => TermLanguage::English,
        }
    }
}

/// One query string sent to the search API. Lower `priority` is tried first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchTerm {
    pub text: String,
    pub priority: usize,
    pub language: TermLanguage,
}

/// A record exactly as one search page returned it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawDocument {
    pub title: String,
    pub abstract_text: Option<String>,
    pub identifier: Option<String>,
    pub source_url: Option<String>,
    pub author: Option<String>,
    pub journal: Option<String>,
    pub publisher: Option<String>,
    pub year: Option<String>,
}

/// A record that passed the quality filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub title: String,
    #[serde(rename = "abstract", default)]
    pub abstract_text: Option<String>,
    #[serde(default)]
    pub identifier: Option<String>,
    #[serde(rename = "source", default)]
    pub source_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub journal: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<String>,
    #[serde(skip)]
    pub dedup_key: String,
}

impl From<RawDocument> for Document {
    fn from(raw: RawDocument) -> Self {
        let title = raw.title.trim().to_string();
        Self {
            dedup_key: dedup_key(&title),
            title,
            abstract_text: raw.abstract_text,
            identifier: raw.identifier,
            source_url: raw.source_url,
            author: raw.author,
            journal: raw.journal,
            publisher: raw.publisher,
            year: raw.year,
        }
    }
}
