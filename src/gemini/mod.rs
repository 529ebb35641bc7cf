//! Gemini `generateContent` client used for keyword extraction.

pub mod client;
pub mod types;

pub use client::{GeminiClient, GeminiError};
