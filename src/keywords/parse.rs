use std::collections::HashSet;

use serde::Deserialize;

use super::KeywordSet;
use crate::search::lang::contains_hangul;

const MIN_KEYWORD_CHARS: usize = 2;
const KOREAN_LABELS: &[&str] = &["한국어", "korean"];
const ENGLISH_LABELS: &[&str] = &["영어", "english"];

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("model returned empty content")]
    Empty,

    #[error("no keyword lists found in model output: {0}")]
    Unrecognized(String),
}

/// JSON answer shape. At least one of the two lists must be present.
#[derive(Deserialize)]
struct KeywordJson {
    #[serde(alias = "ko", alias = "korean_keywords")]
    korean: Option<Vec<String>>,
    #[serde(alias = "en", alias = "english_keywords")]
    english: Option<Vec<String>>,
}

struct KeywordResponse {
    korean: Vec<String>,
    english: Vec<String>,
}

/// Parses model output into a cleaned `KeywordSet`.
///
/// Accepts, in order: a JSON object (optionally inside a Markdown code fence),
/// labelled lines (`한국어: a, b` / `English: c, d`), or a bare comma list split
/// by script. A JSON object without either list is unrecognized rather than
/// empty. One empty list is fine; the caller decides what to do with two.
pub fn parse_keyword_response(text: &str, max_keywords: usize) -> Result<KeywordSet, ParseError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ParseError::Empty);
    }

    let raw = if strip_code_fence(trimmed).trim_start().starts_with('{') {
        parse_json(trimmed)
    } else {
        parse_json(trimmed)
            .or_else(|| parse_labelled_lines(trimmed))
            .or_else(|| parse_bare_list(trimmed))
    }
    .ok_or_else(|| ParseError::Unrecognized(snippet(trimmed)))?;

    Ok(KeywordSet {
        korean: clean(raw.korean, max_keywords),
        english: clean(raw.english, max_keywords),
    })
}

fn parse_json(text: &str) -> Option<KeywordResponse> {
    let body = strip_code_fence(text);
    let start = body.find('{')?;
    let end = body.rfind('}')?;
    if end < start {
        return None;
    }
    let json: KeywordJson = serde_json::from_str(&body[start..=end]).ok()?;
    if json.korean.is_none() && json.english.is_none() {
        return None;
    }
    Some(KeywordResponse {
        korean: json.korean.unwrap_or_default(),
        english: json.english.unwrap_or_default(),
    })
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = rest.split_once('\n').map_or("", |(_, body)| body);
    rest.rsplit_once("```").map_or(rest, |(body, _)| body)
}

fn parse_labelled_lines(text: &str) -> Option<KeywordResponse> {
    let mut korean = None;
    let mut english = None;

    for line in text.lines() {
        let line = line.trim().trim_start_matches(['-', '*', ' ']);
        let Some((label, values)) = line.split_once([':', '：']) else {
            continue;
        };
        let label = label.trim().to_lowercase();
        if KOREAN_LABELS.iter().any(|l| label.contains(l)) {
            korean = Some(split_list(values));
        } else if ENGLISH_LABELS.iter().any(|l| label.contains(l)) {
            english = Some(split_list(values));
        }
    }

    if korean.is_none() && english.is_none() {
        return None;
    }
    Some(KeywordResponse {
        korean: korean.unwrap_or_default(),
        english: english.unwrap_or_default(),
    })
}

fn parse_bare_list(text: &str) -> Option<KeywordResponse> {
    if text.lines().count() > 1 || !text.contains(',') {
        return None;
    }
    let (korean, english) = split_list(text)
        .into_iter()
        .partition(|kw| contains_hangul(kw));
    Some(KeywordResponse { korean, english })
}

fn split_list(values: &str) -> Vec<String> {
    values.split([',', '，']).map(str::to_string).collect()
}

fn clean(keywords: Vec<String>, max_keywords: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    keywords
        .into_iter()
        .map(|kw| kw.trim().trim_matches(['"', '\'', '`']).trim().to_string())
        .filter(|kw| kw.chars().count() >= MIN_KEYWORD_CHARS)
        .filter(|kw| seen.insert(kw.to_lowercase()))
        .take(max_keywords)
        .collect()
}

fn snippet(text: &str) -> String {
    const MAX: usize = 120;
    if text.len() > MAX {
        format!("{}...", &text[..text.floor_char_boundary(MAX)])
    } else {
        text.to_string()
    }
}
