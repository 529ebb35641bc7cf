//! Quota-driven document retrieval: term planning, quality filtering, and the
//! term-major / page-minor search loop.

pub mod client;
pub mod engine;
pub mod filter;
pub(crate) mod lang;
pub mod planner;
pub mod types;

pub use client::{SearchClient, SearchError};
pub use engine::{EngineConfig, QuotaSearchEngine, SearchStats, Termination};
pub use filter::QualityFilter;
pub use lang::LanguagePriority;
pub use planner::PlannerConfig;
pub use types::{Document, RawDocument, SearchTerm};
