use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::gemini::client::DEFAULT_MODEL;
use crate::search::{EngineConfig, LanguagePriority, PlannerConfig, QualityFilter};

/// A credential string that never appears in logs or `Debug` output.
#[derive(Clone)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{key}={value:?} is invalid: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Effective run settings: defaults, then environment, then CLI flags.
#[derive(Debug, Clone)]
pub struct Settings {
    pub gemini_api_key: Option<Secret>,
    pub gemini_model: String,
    pub credentials_path: PathBuf,

    pub target_documents: usize,
    pub max_search_pages: u32,
    pub page_size: u32,
    pub max_search_terms: usize,
    pub max_keywords: usize,
    pub max_combinations: usize,
    pub language_priority: LanguagePriority,

    pub min_title_length: usize,
    pub min_abstract_length: usize,
    pub require_abstract: bool,
    pub require_source: bool,

    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub call_timeout: Duration,
    pub requests_per_second: u32,
    pub workers: usize,

    pub output_directory: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        let engine = EngineConfig::default();
        let planner = PlannerConfig::default();
        let quality = QualityFilter::default();
        Self {
            gemini_api_key: None,
            gemini_model: DEFAULT_MODEL.to_string(),
            credentials_path: PathBuf::from("./configs/scienceon_api_credentials.json"),
            target_documents: 50,
            max_search_pages: engine.max_pages_per_term,
            page_size: 20,
            max_search_terms: planner.max_search_terms,
            max_keywords: 5,
            max_combinations: planner.max_combinations,
            language_priority: LanguagePriority::default(),
            min_title_length: quality.min_title_length,
            min_abstract_length: quality.min_abstract_length,
            require_abstract: quality.require_abstract,
            require_source: quality.require_source,
            max_retries: engine.max_attempts,
            initial_backoff: engine.initial_backoff,
            call_timeout: engine.call_timeout,
            requests_per_second: 5,
            workers: 1,
            output_directory: PathBuf::from("./outputs"),
        }
    }
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Overlays recognized variables from `lookup` onto the defaults.
    /// Invalid values are logged and leave the default in place.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut s = Self::default();
        let env = Overlay { lookup: &lookup };

        if let Some(key) = env.raw("GEMINI_API_KEY").filter(|k| !k.trim().is_empty()) {
            s.gemini_api_key = Some(Secret::new(key));
        }
        if let Some(model) = env.raw("GEMINI_MODEL") {
            s.gemini_model = model;
        }
        if let Some(path) = env.raw("SCIENCEON_CREDENTIALS") {
            s.credentials_path = PathBuf::from(path);
        }
        if let Some(dir) = env.raw("OUTPUT_DIRECTORY") {
            s.output_directory = PathBuf::from(dir);
        }

        env.positive("TARGET_DOCUMENTS", &mut s.target_documents);
        env.positive("MAX_SEARCH_PAGES", &mut s.max_search_pages);
        env.positive("PAGE_SIZE", &mut s.page_size);
        env.positive("MAX_SEARCH_TERMS", &mut s.max_search_terms);
        env.positive("MAX_KEYWORDS", &mut s.max_keywords);
        env.positive("MIN_TITLE_LENGTH", &mut s.min_title_length);
        env.positive("MIN_ABSTRACT_LENGTH", &mut s.min_abstract_length);
        env.positive("WORKERS", &mut s.workers);
        env.positive("REQUESTS_PER_SECOND", &mut s.requests_per_second);
        env.positive("MAX_RETRIES", &mut s.max_retries);
        env.parsed("MAX_COMBINATIONS", &mut s.max_combinations);
        env.parsed("LANGUAGE_PRIORITY", &mut s.language_priority);
        env.flag("REQUIRE_ABSTRACT", &mut s.require_abstract);
        env.flag("REQUIRE_SOURCE", &mut s.require_source);

        let mut backoff_ms = s.initial_backoff.as_millis() as u64;
        env.parsed("INITIAL_BACKOFF_MS", &mut backoff_ms);
        s.initial_backoff = Duration::from_millis(backoff_ms);

        let mut timeout_secs = s.call_timeout.as_secs();
        env.positive("CALL_TIMEOUT_SECS", &mut timeout_secs);
        s.call_timeout = Duration::from_secs(timeout_secs);

        s
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            max_pages_per_term: self.max_search_pages,
            max_attempts: self.max_retries,
            initial_backoff: self.initial_backoff,
            call_timeout: self.call_timeout,
        }
    }

    pub fn planner_config(&self) -> PlannerConfig {
        PlannerConfig {
            max_search_terms: self.max_search_terms,
            max_combinations: self.max_combinations,
        }
    }

    pub fn quality_filter(&self) -> QualityFilter {
        QualityFilter {
            min_title_length: self.min_title_length,
            min_abstract_length: self.min_abstract_length,
            require_abstract: self.require_abstract,
            require_source: self.require_source,
        }
    }
}

impl fmt::Display for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let key_state = if self.gemini_api_key.is_some() { "set" } else { "unset" };
        writeln!(f, "GEMINI_API_KEY:         {key_state}")?;
        writeln!(f, "Gemini model:           {}", self.gemini_model)?;
        writeln!(f, "Credentials file:       {}", self.credentials_path.display())?;
        writeln!(f, "Target documents:       {}", self.target_documents)?;
        writeln!(f, "Max pages per term:     {}", self.max_search_pages)?;
        writeln!(f, "Page size:              {}", self.page_size)?;
        writeln!(f, "Max search terms:       {}", self.max_search_terms)?;
        writeln!(f, "Max keywords:           {}", self.max_keywords)?;
        writeln!(f, "Max combinations:       {}", self.max_combinations)?;
        writeln!(f, "Language priority:      {:?}", self.language_priority)?;
        writeln!(f, "Min title length:       {}", self.min_title_length)?;
        writeln!(f, "Min abstract length:    {}", self.min_abstract_length)?;
        writeln!(f, "Require abstract:       {}", self.require_abstract)?;
        writeln!(f, "Require source:         {}", self.require_source)?;
        writeln!(f, "Max attempts per call:  {}", self.max_retries)?;
        writeln!(f, "Initial backoff:        {}ms", self.initial_backoff.as_millis())?;
        writeln!(f, "Call timeout:           {}s", self.call_timeout.as_secs())?;
        writeln!(f, "Requests per second:    {}", self.requests_per_second)?;
        writeln!(f, "Workers:                {}", self.workers)?;
        write!(f, "Output directory:       {}", self.output_directory.display())
    }
}

struct Overlay<'a, F> {
    lookup: &'a F,
}

impl<F: Fn(&str) -> Option<String>> Overlay<'_, F> {
    fn raw(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parsed<T>(&self, key: &'static str, slot: &mut T)
    where
        T: FromStr + fmt::Debug,
        T::Err: fmt::Display,
    {
        if let Some(value) = self.raw(key) {
            match parse_var(key, &value) {
                Ok(v) => *slot = v,
                Err(e) => warn!(error = %e, default = ?slot, "using default"),
            }
        }
    }

    fn positive<T>(&self, key: &'static str, slot: &mut T)
    where
        T: FromStr + PartialOrd + Default + fmt::Debug,
        T::Err: fmt::Display,
    {
        if let Some(value) = self.raw(key) {
            let result = parse_var::<T>(key, &value).and_then(|v| {
                if v > T::default() {
                    Ok(v)
                } else {
                    Err(ConfigError::Invalid {
                        key,
                        value: value.clone(),
                        reason: "must be greater than zero".into(),
                    })
                }
            });
            match result {
                Ok(v) => *slot = v,
                Err(e) => warn!(error = %e, default = ?slot, "using default"),
            }
        }
    }

    fn flag(&self, key: &'static str, slot: &mut bool) {
        if let Some(value) = self.raw(key) {
            match parse_flag(key, &value) {
                Ok(v) => *slot = v,
                Err(e) => warn!(error = %e, default = *slot, "using default"),
            }
        }
    }
}

fn parse_var<T>(key: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    value.parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

fn parse_flag(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            key,
            value: value.to_string(),
            reason: "expected true or false".into(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings_with(vars: &[(&str, &str)]) -> Settings {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_match_documented_values() {
        let s = Settings::default();
        assert_eq!(s.target_documents, 50);
        assert_eq!(s.max_search_pages, 5);
        assert_eq!(s.page_size, 20);
        assert_eq!(s.max_search_terms, 15);
        assert_eq!(s.max_keywords, 5);
        assert_eq!(s.min_title_length, 5);
        assert_eq!(s.min_abstract_length, 10);
        assert!(!s.require_abstract);
        assert!(s.require_source);
        assert_eq!(s.workers, 1);
        assert_eq!(s.max_retries, 3);
        assert!(s.gemini_api_key.is_none());
    }

    #[test]
    fn environment_overrides_defaults() {
        let s = settings_with(&[
            ("TARGET_DOCUMENTS", "10"),
            ("PAGE_SIZE", "50"),
            ("REQUIRE_ABSTRACT", "true"),
            ("REQUIRE_SOURCE", "0"),
            ("LANGUAGE_PRIORITY", "en"),
            ("OUTPUT_DIRECTORY", "/tmp/out"),
            ("GEMINI_API_KEY", "abc"),
        ]);
        assert_eq!(s.target_documents, 10);
        assert_eq!(s.page_size, 50);
        assert!(s.require_abstract);
        assert!(!s.require_source);
        assert_eq!(s.language_priority, LanguagePriority::English);
        assert_eq!(s.output_directory, PathBuf::from("/tmp/out"));
        assert_eq!(s.gemini_api_key.unwrap().expose(), "abc");
    }

    #[test]
    fn invalid_values_fall_back_to_defaults() {
        let s = settings_with(&[
            ("TARGET_DOCUMENTS", "lots"),
            ("MAX_SEARCH_PAGES", "0"),
            ("WORKERS", "-2"),
            ("REQUIRE_SOURCE", "maybe"),
            ("LANGUAGE_PRIORITY", "french"),
        ]);
        assert_eq!(s.target_documents, 50);
        assert_eq!(s.max_search_pages, 5);
        assert_eq!(s.workers, 1);
        assert!(s.require_source);
        assert_eq!(s.language_priority, LanguagePriority::Auto);
    }

    #[test]
    fn blank_api_key_counts_as_unset() {
        let s = settings_with(&[("GEMINI_API_KEY", "   ")]);
        assert!(s.gemini_api_key.is_none());
    }

    #[test]
    fn zero_combinations_allowed() {
        let s = settings_with(&[("MAX_COMBINATIONS", "0")]);
        assert_eq!(s.planner_config().max_combinations, 0);
    }

    #[test]
    fn derived_configs_carry_settings() {
        let s = settings_with(&[
            ("MAX_SEARCH_PAGES", "2"),
            ("MAX_RETRIES", "4"),
            ("CALL_TIMEOUT_SECS", "7"),
            ("MIN_TITLE_LENGTH", "8"),
        ]);
        let engine = s.engine_config();
        assert_eq!(engine.max_pages_per_term, 2);
        assert_eq!(engine.max_attempts, 4);
        assert_eq!(engine.call_timeout, Duration::from_secs(7));
        assert_eq!(s.quality_filter().min_title_length, 8);
    }

    #[test]
    fn secret_is_redacted_everywhere() {
        let s = settings_with(&[("GEMINI_API_KEY", "super-secret")]);
        assert!(!format!("{s:?}").contains("super-secret"));
        let shown = s.to_string();
        assert!(!shown.contains("super-secret"));
        assert!(shown.contains("GEMINI_API_KEY:         set"));
    }
}
