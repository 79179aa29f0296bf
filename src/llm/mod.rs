//! Language-model capability: the chat client and the two pipeline
//! stages that use it (section location, record extraction).

pub mod client;
pub mod extractor;
pub mod locator;

pub use client::{ChatClient, LlmConfig};
pub use extractor::{ExecutiveExtractor, ExtractorConfig};
pub use locator::{LocatedSection, SectionLocator, SectionTopic};

use std::time::Duration;

use async_trait::async_trait;

use crate::error::LlmError;

/// One chat exchange with the model service.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub system: String,
    pub user: String,
    pub temperature: f32,
}

/// Model reply plus the cost figures every invocation must log.
#[derive(Debug, Clone)]
pub struct ChatOutcome {
    pub content: String,
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub latency: Duration,
}

/// The model service as the pipeline sees it.
///
/// Latency and failure are non-deterministic; callers treat every reply
/// as untrusted text to be parsed and validated, never as ground truth.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, request: ChatRequest) -> Result<ChatOutcome, LlmError>;
}

/// Truncate text to `max_chars` on a valid UTF-8 boundary.
pub(crate) fn truncate_utf8(text: &str, max_chars: usize) -> &str {
    if text.len() <= max_chars {
        return text;
    }
    let mut end = max_chars;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Strip markdown code fences the model wraps JSON replies in.
pub(crate) fn strip_code_fences(content: &str) -> &str {
    let trimmed = content.trim();
    let trimmed = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    trimmed.strip_suffix("```").unwrap_or(trimmed).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_respects_char_boundaries() {
        let text = "ab\u{00e9}cd";
        let cut = truncate_utf8(text, 3);
        assert!(text.starts_with(cut));
        assert!(cut.len() <= 3);
    }

    #[test]
    fn strips_json_fences() {
        assert_eq!(strip_code_fences("```json\n[1, 2]\n```"), "[1, 2]");
        assert_eq!(strip_code_fences("```\n[]\n```"), "[]");
        assert_eq!(strip_code_fences("[\"plain\"]"), "[\"plain\"]");
    }
}
