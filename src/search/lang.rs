use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Korean,
    English,
}

impl Language {
    /// Picks the dominant script of `text`: Hangul syllables against ASCII letters.
    /// Ties go to English.
    pub fn detect(text: &str) -> Self {
        let hangul = text.chars().filter(|c| is_hangul(*c)).count();
        let ascii = text.chars().filter(|c| c.is_ascii_alphabetic()).count();
        if hangul > ascii {
            Language::Korean
        } else {
            Language::English
        }
    }

    pub fn other(self) -> Self {
        match self {
            Language::Korean => Language::English,
            Language::English => Language::Korean,
        }
    }
}

/// Which keyword list the planner tries first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LanguagePriority {
    /// Follow the question's dominant script.
    #[default]
    Auto,
    Korean,
    English,
}

impl LanguagePriority {
    pub fn resolve(self, question: &str) -> Language {
        match self {
            LanguagePriority::Auto => Language::detect(question),
            LanguagePriority::Korean => Language::Korean,
            LanguagePriority::English => Language::English,
        }
    }
}

impl FromStr for LanguagePriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(LanguagePriority::Auto),
            "korean" | "ko" => Ok(LanguagePriority::Korean),
            "english" | "en" => Ok(LanguagePriority::English),
            other => Err(format!("unknown language priority '{other}'")),
        }
    }
}

pub(crate) fn contains_hangul(text: &str) -> bool {
    text.chars().any(is_hangul)
}

fn is_hangul(c: char) -> bool {
    matches!(c,
        '\u{AC00}'..='\u{D7AF}' |
        '\u{1100}'..='\u{11FF}' |
        '\u{3130}'..='\u{318F}'
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn korean_question_detected() {
        assert_eq!(
            Language::detect("인공지능 교과서의 효과는 무엇인가?"),
            Language::Korean
        );
    }

    #[test]
    fn english_question_detected() {
        assert_eq!(
            Language::detect("What is the effect of AI textbooks?"),
            Language::English
        );
    }

    #[test]
    fn mixed_question_counts_characters() {
        assert_eq!(Language::detect("SVM 분류기 성능 비교"), Language::Korean);
        assert_eq!(Language::detect("Warehouse Management System 도입"), Language::English);
    }

    #[test]
    fn auto_priority_follows_question() {
        assert_eq!(LanguagePriority::Auto.resolve("딥러닝"), Language::Korean);
        assert_eq!(LanguagePriority::Auto.resolve("deep learning"), Language::English);
    }

    #[test]
    fn fixed_priority_ignores_question() {
        assert_eq!(LanguagePriority::English.resolve("딥러닝"), Language::English);
        assert_eq!(LanguagePriority::Korean.resolve("deep learning"), Language::Korean);
    }

    #[test]
    fn parses_priority_names() {
        assert_eq!("KO".parse::<LanguagePriority>(), Ok(LanguagePriority::Korean));
        assert_eq!("english".parse::<LanguagePriority>(), Ok(LanguagePriority::English));
        assert!("french".parse::<LanguagePriority>().is_err());
    }

    #[test]
    fn detects_hangul() {
        assert!(contains_hangul("전자교과서"));
        assert!(!contains_hangul("textbook"));
    }
}
