//! Typed errors for the acquisition and extraction pipeline.
//!
//! Library code uses `thiserror` enums; the binary collapses them into
//! `anyhow` at the edge. Transient variants are retried locally and never
//! escape except as a logged, per-filing ledger entry.

use thiserror::Error;

/// Errors from the archive fetch layer.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Transient failure (timeout, connection reset, 429/5xx). Retried
    /// with backoff before being wrapped in `RetriesExhausted`.
    #[error("transient fetch failure: {0}")]
    Transient(#[source] reqwest::Error),

    /// The retry ceiling was exceeded; carries the last underlying cause.
    #[error("fetch failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: reqwest::Error,
    },

    /// The archive has no such resource. Not retryable.
    #[error("not found: {url}")]
    NotFound { url: String },

    /// The response did not have the expected shape. Not retryable.
    #[error("malformed response from {url}: {reason}")]
    MalformedResponse { url: String, reason: String },
}

impl FetchError {
    /// Whether the download orchestrator may re-queue the filing.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FetchError::Transient(_) | FetchError::RetriesExhausted { .. })
    }
}

/// Errors from the language-model service.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("parse error: {0}")]
    Parse(String),
}

/// Errors from the extraction stage of the pipeline.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The model identified no relevant section. Permanent: re-asking
    /// the same model about the same text will not grow a section.
    #[error("no relevant section found in filing")]
    SectionNotFound,

    /// Model output never conformed to the record schema, even after
    /// `attempts` tries with progressively stricter instructions.
    #[error("model output did not conform to schema after {attempts} attempts")]
    Schema { attempts: u32 },

    /// The model service itself failed; retryable at the orchestrator.
    #[error("model error: {0}")]
    Model(#[from] LlmError),

    /// Ledger or filesystem failure while persisting results.
    #[error("storage error: {0}")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ExtractError {
    /// Classify for the processing-status ledger: retryable failures may
    /// be attempted again on a later run, permanent ones are terminal.
    pub fn is_retryable(&self) -> bool {
        match self {
            ExtractError::SectionNotFound | ExtractError::Schema { .. } => false,
            ExtractError::Model(_) | ExtractError::Storage(_) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn section_not_found_is_permanent() {
        assert!(!ExtractError::SectionNotFound.is_retryable());
        assert!(!ExtractError::Schema { attempts: 3 }.is_retryable());
    }

    #[test]
    fn model_errors_are_retryable() {
        let err = ExtractError::Model(LlmError::Connection("refused".into()));
        assert!(err.is_retryable());
    }
}
