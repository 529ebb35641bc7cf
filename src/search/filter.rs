use super::types::RawDocument;

/// Pass/fail checks applied to every raw record before it may claim a dedup slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualityFilter {
    pub min_title_length: usize,
    pub min_abstract_length: usize,
    pub require_abstract: bool,
    pub require_source: bool,
}

impl Default for QualityFilter {
    fn default() -> Self {
        Self {
            min_title_length: 5,
            min_abstract_length: 10,
            require_abstract: false,
            require_source: true,
        }
    }
}

impl QualityFilter {
    pub fn passes(&self, doc: &RawDocument) -> bool {
        if char_len(&doc.title) < self.min_title_length {
            return false;
        }

        if self.require_abstract {
            let abstract_len = doc.abstract_text.as_deref().map_or(0, char_len);
            if abstract_len == 0 || abstract_len < self.min_abstract_length {
                return false;
            }
        }

        if self.require_source && !has_text(&doc.identifier) && !has_text(&doc.source_url) {
            return false;
        }

        true
    }
}

/// Case-folded, whitespace-collapsed title. The only identity signal across terms.
pub fn dedup_key(title: &str) -> String {
    title
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

fn char_len(s: &str) -> usize {
    s.trim().chars().count()
}

fn has_text(field: &Option<String>) -> bool {
    field.as_deref().is_some_and(|s| !s.trim().is_empty())
}
