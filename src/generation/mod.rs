//! Access to the external text-generation service.
//!
//! The pipeline only sees [`GenerationBackend`]; [`OpenAiClient`] is the
//! production implementation.

mod client;
pub mod retry;

pub use client::{
    ApiKey, DEFAULT_ENDPOINT, DEFAULT_MODEL, GenerationSettings, OpenAiClient,
};
pub use retry::{RateLimitBackoff, RetryConfig, RetryError, RetryPolicy, retry_async_with_policy};

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;

use crate::language::Language;

/// One call for one object in one language.
#[derive(Debug, Clone)]
pub struct GenerationRequest<'a> {
    pub object_id: &'a str,
    pub language: Language,
    pub prompt: String,
    pub images: &'a [PathBuf],
}

/// Failure text a caller can store as-is; `Display` is the marker string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationFailure {
    #[error("❌ API Error: {0}")]
    Api(String),
    #[error("❌ Failed after retries.")]
    RetriesExhausted,
}

impl GenerationFailure {
    pub fn status(&self) -> &'static str {
        match self {
            GenerationFailure::Api(_) => "api_error",
            GenerationFailure::RetriesExhausted => "retries_exhausted",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationOutcome {
    /// Raw response text, unmodified.
    Generated(String),
    Failed(GenerationFailure),
}

impl GenerationOutcome {
    pub fn is_generated(&self) -> bool {
        matches!(self, GenerationOutcome::Generated(_))
    }

    /// Response text, or the failure marker.
    pub fn into_text(self) -> String {
        match self {
            GenerationOutcome::Generated(text) => text,
            GenerationOutcome::Failed(failure) => failure.to_string(),
        }
    }
}

/// A service that turns a prompt plus images into catalog text.
///
/// Implementations never fail: every error path is folded into
/// [`GenerationOutcome::Failed`].
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    async fn generate(&self, request: &GenerationRequest<'_>) -> GenerationOutcome;
}
