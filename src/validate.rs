//! Downloaded-document validation.
//!
//! A filing is only trusted for storage and extraction after it passes
//! here. Rejection is a normal outcome with a reason string, never an
//! error: the archive routinely answers throttled clients with empty or
//! truncated bodies, and those must land as `rejected`, not as crashes.

use regex::Regex;
use scraper::Html;

/// Bodies below this size are the archive's blocked/throttled signature,
/// not filings.
const MIN_DOCUMENT_BYTES: usize = 2048;

/// Minimum extracted text for a parseable document to count as content.
const MIN_TEXT_CHARS: usize = 500;

/// Outcome of validating a downloaded document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    pub ok: bool,
    /// Human-readable reason when `ok` is false.
    pub reason: Option<String>,
}

impl ValidationResult {
    fn pass() -> Self {
        Self {
            ok: true,
            reason: None,
        }
    }

    fn fail(reason: impl Into<String>) -> Self {
        Self {
            ok: false,
            reason: Some(reason.into()),
        }
    }
}

/// Content markers expected in a filing of a given type.
struct MarkerSet {
    /// This marker must match.
    required: &'static str,
    /// At least `min_matches` of these (the required one included) must match.
    supporting: &'static [&'static str],
    min_matches: usize,
}

/// Markers for proxy statements, the filing type of interest: executive
/// pay and governance language that boilerplate or wrong documents lack.
const DEF14A_MARKERS: MarkerSet = MarkerSet {
    required: r"proxy\s+statement",
    supporting: &[
        r"proxy\s+statement",
        r"(executive\s+compensation|compensation\s+discussion)",
        r"(board\s+of\s+directors|corporate\s+governance)",
        r"(stock|share)\s+(ownership|holdings)",
    ],
    min_matches: 2,
};

/// Validator for downloaded filing documents.
pub struct FilingValidator {
    min_bytes: usize,
}

impl FilingValidator {
    pub fn new() -> Self {
        Self {
            min_bytes: MIN_DOCUMENT_BYTES,
        }
    }

    /// Lower the size floor (tests use small fixtures).
    pub fn with_min_bytes(mut self, min_bytes: usize) -> Self {
        self.min_bytes = min_bytes;
        self
    }

    /// Classify a downloaded document as usable or not.
    ///
    /// Checks in order: byte length, markup parse with non-trivial text,
    /// filing-type marker presence.
    pub fn validate(&self, raw: &[u8], filing_type: &str) -> ValidationResult {
        if raw.len() < self.min_bytes {
            return ValidationResult::fail(format!(
                "document too small ({} bytes): likely a blocked or truncated response",
                raw.len()
            ));
        }

        let content = String::from_utf8_lossy(raw);
        let text = Html::parse_document(&content)
            .root_element()
            .text()
            .collect::<String>()
            .to_lowercase();

        if text.trim().len() < MIN_TEXT_CHARS {
            return ValidationResult::fail("no meaningful text content after parsing markup");
        }

        let markers = match filing_type {
            "DEF 14A" => &DEF14A_MARKERS,
            // Unknown filing types get the structural checks only
            _ => return ValidationResult::pass(),
        };

        let required = Regex::new(markers.required).expect("valid marker regex");
        if !required.is_match(&text) {
            return ValidationResult::fail(format!(
                "missing required marker: {}",
                markers.required
            ));
        }

        let matches = markers
            .supporting
            .iter()
            .filter(|pattern| {
                Regex::new(pattern)
                    .expect("valid marker regex")
                    .is_match(&text)
            })
            .count();
        if matches < markers.min_matches {
            return ValidationResult::fail(format!(
                "only {} of {} content markers present (need {})",
                matches,
                markers.supporting.len(),
                markers.min_matches
            ));
        }

        ValidationResult::pass()
    }
}

impl Default for FilingValidator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A well-formed miniature proxy statement with the expected markers.
    fn sample_proxy_html() -> String {
        let body = r#"
            <h1>NOTICE OF ANNUAL MEETING AND PROXY STATEMENT</h1>
            <p>This proxy statement is furnished in connection with the
            solicitation of proxies by the Board of Directors.</p>
            <h2>EXECUTIVE COMPENSATION</h2>
            <table><tr><td>Name</td><td>Salary</td></tr>
            <tr><td>Jane Smith</td><td>$1,000,000</td></tr></table>
            <h2>STOCK OWNERSHIP</h2>
            <p>The following table sets forth information regarding the
            beneficial share ownership of our directors.</p>
        "#;
        // Pad past the size floor the way real filings carry style blocks
        format!(
            "<html><head><style>{}</style></head><body>{}</body></html>",
            "p { margin: 0; } ".repeat(200),
            body.repeat(10)
        )
    }

    #[test]
    fn accepts_well_formed_proxy_statement() {
        let result = FilingValidator::new().validate(sample_proxy_html().as_bytes(), "DEF 14A");
        assert!(result.ok, "reason: {:?}", result.reason);
    }

    #[test]
    fn rejects_empty_input() {
        let result = FilingValidator::new().validate(b"", "DEF 14A");
        assert!(!result.ok);
        assert!(result.reason.unwrap().contains("too small"));
    }

    #[test]
    fn rejects_near_empty_response() {
        let result = FilingValidator::new().validate(b"<html></html>", "DEF 14A");
        assert!(!result.ok);
    }

    #[test]
    fn rejects_missing_required_marker() {
        let html = format!(
            "<html><body>{}</body></html>",
            "<p>executive compensation and the board of directors</p>".repeat(200)
        );
        let result = FilingValidator::new().validate(html.as_bytes(), "DEF 14A");
        assert!(!result.ok);
        assert!(result.reason.unwrap().contains("required marker"));
    }

    #[test]
    fn rejects_insufficient_supporting_markers() {
        let html = format!(
            "<html><body>{}</body></html>",
            "<p>this proxy statement discusses the weather at length</p>".repeat(200)
        );
        let result = FilingValidator::new().validate(html.as_bytes(), "DEF 14A");
        assert!(!result.ok);
        assert!(result.reason.unwrap().contains("markers present"));
    }

    #[test]
    fn malformed_markup_is_rejected_not_an_error() {
        // Truncated mid-tag: html5 parsing still succeeds, text is thin
        let result = FilingValidator::new().validate(b"<html><body><tab", "DEF 14A");
        assert!(!result.ok);
    }
}
