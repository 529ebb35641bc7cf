use std::collections::HashSet;

use super::lang::Language;
use super::types::{SearchTerm, TermLanguage};
use crate::keywords::KeywordSet;

/// ScienceON treats `|` inside a `BI` query as OR.
const COMBINATION_SEPARATOR: &str = "|";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannerConfig {
    pub max_search_terms: usize,
    pub max_combinations: usize,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            max_search_terms: 15,
            max_combinations: 10,
        }
    }
}

/// Expands keywords into an ordered, deduplicated, capped list of search terms.
///
/// Tier 1 interleaves single keywords, `primary` language first at each position.
/// Tier 2 joins keyword pairs: primary-language pairs, then the other language's
/// pairs, then cross-language pairs, up to `max_combinations`.
pub fn plan(keywords: &KeywordSet, primary: Language, config: &PlannerConfig) -> Vec<SearchTerm> {
    let first = (primary, keywords_for(keywords, primary));
    let second = (primary.other(), keywords_for(keywords, primary.other()));

    let mut candidates: Vec<(String, TermLanguage)> = Vec::new();

    let longest = first.1.len().max(second.1.len());
    for i in 0..longest {
        for (lang, list) in [&first, &second] {
            if let Some(kw) = list.get(i) {
                candidates.push((kw.clone(), (*lang).into()));
            }
        }
    }

    let combinations = same_language_pairs(first.1, first.0.into())
        .chain(same_language_pairs(second.1, second.0.into()))
        .chain(cross_language_pairs(first.1, second.1))
        .take(config.max_combinations);
    candidates.extend(combinations);

    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter_map(|(text, language)| {
            let text = text.trim().to_string();
            (!text.is_empty() && seen.insert(text.to_lowercase())).then_some((text, language))
        })
        .take(config.max_search_terms)
        .enumerate()
        .map(|(priority, (text, language))| SearchTerm {
            text,
            priority,
            language,
        })
        .collect()
}

fn keywords_for(keywords: &KeywordSet, lang: Language) -> &[String] {
    match lang {
        Language::Korean => &keywords.korean,
        Language::English => &keywords.english,
    }
}

fn same_language_pairs(
    list: &[String],
    language: TermLanguage,
) -> impl Iterator<Item = (String, TermLanguage)> + '_ {
    list.iter().enumerate().flat_map(move |(i, a)| {
        list[i + 1..]
            .iter()
            .map(move |b| (join(a, b), language))
    })
}

fn cross_language_pairs<'a>(
    first: &'a [String],
    second: &'a [String],
) -> impl Iterator<Item = (String, TermLanguage)> + 'a {
    first.iter().flat_map(move |a| {
        second
            .iter()
            .map(move |b| (join(a, b), TermLanguage::Mixed))
    })
}

fn join(a: &str, b: &str) -> String {
    format!("{}{COMBINATION_SEPARATOR}{}", a.trim(), b.trim())
}
