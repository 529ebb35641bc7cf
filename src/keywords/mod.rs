//! Bilingual keyword extraction through a language model.

mod extractor;
mod parse;
mod prompt;

pub use extractor::{ExtractionError, KeywordExtractor, KeywordModel};

use serde::{Deserialize, Serialize};

/// Korean and English keyword candidates for one question.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordSet {
    #[serde(default)]
    pub korean: Vec<String>,
    #[serde(default)]
    pub english: Vec<String>,
}

impl KeywordSet {
    pub fn is_empty(&self) -> bool {
        self.korean.is_empty() && self.english.is_empty()
    }

    pub fn len(&self) -> usize {
        self.korean.len() + self.english.len()
    }
}
