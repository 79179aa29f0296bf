//! Executive record extraction from located sections.
//!
//! The model turns section text into JSON records; this stage owns the
//! schema prompt, the retry loop for malformed output, and the semantic
//! validation that every parsed record must survive. Well-formed but
//! implausible values pass through for human review -- extraction is
//! probabilistic data entry, not a pure function.

use std::sync::Arc;

use chrono::{Datelike, Utc};
use tracing::{info, warn};

use super::locator::LocatedSection;
use super::{strip_code_fences, truncate_utf8, ChatModel, ChatRequest};
use crate::error::ExtractError;
use crate::models::Executive;

const EXTRACT_SYSTEM_PROMPT: &str = "You are an expert at extracting executive compensation and biographical information from SEC filings.";

const EXTRACT_PROMPT: &str = r#"Extract detailed executive information from these proxy statement sections.

For each Named Executive Officer (NEO), extract:

1. Name and current position
2. Age (if mentioned)
3. Compensation for most recent fiscal year:
   - Base salary
   - Stock awards
   - Option awards
   - Non-equity incentive plan / bonus
   - All other compensation
   - Total compensation
4. Educational background (all degrees, universities, and fields)
5. When they joined the company (if mentioned)
6. Previous roles at the company
7. Board and committee memberships

Return as JSON array, with NO other details. Example:
[
    {
        "name": "John Smith",
        "current_role": "Chief Executive Officer",
        "age": 55,
        "compensation_salary": 1000000,
        "compensation_stock": 5000000,
        "compensation_options": 1500000,
        "compensation_bonus": 2000000,
        "compensation_other": 500000,
        "compensation_total": 10000000,
        "compensation_year": 2023,
        "education": [
            {
                "degree": "MBA",
                "field": "Business Administration",
                "university": "Harvard Business School",
                "year": 1990
            }
        ],
        "start_date": "2015",
        "past_roles": ["COO", "SVP Operations"],
        "board_member": true,
        "committee_memberships": ["Executive Committee"],
        "other_board_memberships": [],
        "notable_achievements": null
    }
]
"#;

const STRICT_RETRY_SUFFIX: &str = r#"

IMPORTANT: Your previous response did not parse as the requested JSON.
Respond with ONLY a JSON array matching the example exactly: no markdown,
no commentary, no trailing text. Every record MUST include "name" and
"current_role" as strings. Use null for unknown values, never omit a
field mentioned in the example."#;

/// Oldest plausible graduation year on record in a current filing.
const MIN_GRADUATION_YEAR: i32 = 1900;

/// Configuration for the extraction engine.
#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    /// Extra attempts after the first when output fails to parse.
    pub schema_retries: u32,
    /// Maximum characters of section text per request.
    pub max_content_chars: usize,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            schema_retries: 2,
            max_content_chars: 60_000,
        }
    }
}

/// Extracts executive records from located filing sections.
pub struct ExecutiveExtractor {
    model: Arc<dyn ChatModel>,
    config: ExtractorConfig,
}

impl ExecutiveExtractor {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self {
            model,
            config: ExtractorConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ExtractorConfig) -> Self {
        self.config = config;
        self
    }

    /// Extract executive records from the located sections of one filing.
    ///
    /// Retries malformed output with a stricter instruction up to the
    /// configured ceiling; model-service failures surface immediately so
    /// the orchestrator can classify them as retryable.
    pub async fn extract(
        &self,
        accession: &str,
        sections: &[LocatedSection],
    ) -> Result<Vec<Executive>, ExtractError> {
        let combined: String = sections
            .iter()
            .map(|s| format!("{}:\n{}", s.title, s.body))
            .collect::<Vec<_>>()
            .join("\n\n");
        let combined = truncate_utf8(&combined, self.config.max_content_chars);

        let max_attempts = self.config.schema_retries + 1;
        for attempt in 1..=max_attempts {
            let mut user = format!("{EXTRACT_PROMPT}\nHere's the content:\n\n{combined}");
            if attempt > 1 {
                user.push_str(STRICT_RETRY_SUFFIX);
            }

            let outcome = self
                .model
                .complete(ChatRequest {
                    system: EXTRACT_SYSTEM_PROMPT.to_string(),
                    user,
                    temperature: 0.1,
                })
                .await
                .map_err(ExtractError::Model)?;

            info!(
                accession,
                attempt,
                prompt_tokens = ?outcome.prompt_tokens,
                completion_tokens = ?outcome.completion_tokens,
                latency = ?outcome.latency,
                "extraction call completed"
            );

            let parsed: Vec<Executive> =
                match serde_json::from_str(strip_code_fences(&outcome.content)) {
                    Ok(records) => records,
                    Err(e) => {
                        warn!(accession, attempt, error = %e, "model output failed to parse");
                        continue;
                    }
                };

            let validated = validate_records(accession, parsed);
            if validated.is_empty() {
                // Parsed but every record was structurally unusable;
                // treat like malformed output and ask again, stricter.
                warn!(accession, attempt, "no record survived validation");
                continue;
            }
            return Ok(validated);
        }

        Err(ExtractError::Schema {
            attempts: max_attempts,
        })
    }
}

/// Semantic validation over parsed records.
///
/// Rejects records with no identifying name or negative monetary fields;
/// nulls implausible graduation years. Implausible-but-well-formed
/// amounts are deliberately left alone.
fn validate_records(accession: &str, records: Vec<Executive>) -> Vec<Executive> {
    let current_year = Utc::now().year();
    let mut validated = Vec::with_capacity(records.len());

    for mut record in records {
        if record.name.trim().is_empty() {
            warn!(accession, "rejecting record with no executive name");
            continue;
        }
        if record
            .compensation_components()
            .iter()
            .any(|c| c.is_some_and(|v| v < 0.0))
        {
            warn!(
                accession,
                name = %record.name,
                "rejecting record with negative compensation"
            );
            continue;
        }
        for education in &mut record.education {
            if let Some(year) = education.year {
                if !(MIN_GRADUATION_YEAR..=current_year + 1).contains(&year) {
                    warn!(
                        accession,
                        name = %record.name,
                        year,
                        "nulling implausible graduation year"
                    );
                    education.year = None;
                }
            }
        }
        validated.push(record);
    }

    validated
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmError;
    use crate::llm::locator::SectionTopic;
    use crate::llm::ChatOutcome;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    struct ScriptedModel {
        replies: Mutex<Vec<String>>,
        calls: AtomicU32,
    }

    impl ScriptedModel {
        fn new(replies: Vec<&str>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into_iter().map(String::from).collect()),
                calls: AtomicU32::new(0),
            })
        }

        fn call_count(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ChatModel for ScriptedModel {
        async fn complete(&self, _request: ChatRequest) -> Result<ChatOutcome, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut replies = self.replies.lock().unwrap();
            let content = if replies.is_empty() {
                "not json at all".to_string()
            } else {
                replies.remove(0)
            };
            Ok(ChatOutcome {
                content,
                prompt_tokens: Some(2000),
                completion_tokens: Some(200),
                latency: Duration::from_millis(15),
            })
        }
    }

    fn section() -> Vec<LocatedSection> {
        vec![LocatedSection {
            topic: SectionTopic::Compensation,
            title: "EXECUTIVE COMPENSATION".to_string(),
            body: "Jane Smith, CEO, salary $1,000,000".to_string(),
        }]
    }

    const GOOD_RECORD: &str = r#"[{
        "name": "Jane Smith",
        "current_role": "Chief Executive Officer",
        "compensation_salary": 1000000,
        "compensation_total": 8500000,
        "education": [{"degree": "MBA", "university": "Harvard Business School", "year": 1990}]
    }]"#;

    #[tokio::test]
    async fn extracts_well_formed_records() {
        let model = ScriptedModel::new(vec![GOOD_RECORD]);
        let extractor = ExecutiveExtractor::new(model.clone());

        let records = extractor.extract("0001-24-000001", &section()).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "Jane Smith");
        assert_eq!(records[0].compensation_salary, Some(1_000_000.0));
        assert_eq!(model.call_count(), 1);
    }

    #[tokio::test]
    async fn strips_markdown_fences() {
        let fenced = format!("```json\n{GOOD_RECORD}\n```");
        let model = ScriptedModel::new(vec![&fenced]);
        let extractor = ExecutiveExtractor::new(model);

        let records = extractor.extract("0001-24-000001", &section()).await.unwrap();
        assert_eq!(records.len(), 1);
    }

    #[tokio::test]
    async fn retries_then_fails_with_exact_attempt_count() {
        // Missing required "name" field on every attempt
        let bad = r#"[{"current_role": "CEO"}]"#;
        let model = ScriptedModel::new(vec![bad, bad, bad]);
        let extractor = ExecutiveExtractor::new(model.clone()).with_config(ExtractorConfig {
            schema_retries: 2,
            ..Default::default()
        });

        let err = extractor
            .extract("0001-24-000001", &section())
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::Schema { attempts: 3 }));
        assert_eq!(model.call_count(), 3, "one initial try plus two retries");
    }

    #[tokio::test]
    async fn recovers_on_retry() {
        let model = ScriptedModel::new(vec!["garbage output", GOOD_RECORD]);
        let extractor = ExecutiveExtractor::new(model.clone());

        let records = extractor.extract("0001-24-000001", &section()).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(model.call_count(), 2);
    }

    #[tokio::test]
    async fn model_failure_surfaces_without_schema_retries() {
        struct FailingModel;

        #[async_trait]
        impl ChatModel for FailingModel {
            async fn complete(&self, _request: ChatRequest) -> Result<ChatOutcome, LlmError> {
                Err(LlmError::Timeout(Duration::from_secs(120)))
            }
        }

        let extractor = ExecutiveExtractor::new(Arc::new(FailingModel));
        let err = extractor
            .extract("0001-24-000001", &section())
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::Model(LlmError::Timeout(_))));
        assert!(err.is_retryable());
    }

    #[test]
    fn rejects_nameless_and_negative_records() {
        let records: Vec<Executive> = serde_json::from_str(
            r#"[
                {"name": "", "current_role": "CEO", "compensation_salary": 100},
                {"name": "Bad Pay", "current_role": "CFO", "compensation_salary": -5},
                {"name": "Jane Smith", "current_role": "CEO", "compensation_salary": 100}
            ]"#,
        )
        .unwrap();

        let validated = validate_records("0001", records);
        assert_eq!(validated.len(), 1);
        assert_eq!(validated[0].name, "Jane Smith");
    }

    #[test]
    fn nulls_implausible_graduation_years() {
        let records: Vec<Executive> = serde_json::from_str(
            r#"[{
                "name": "Jane Smith",
                "current_role": "CEO",
                "education": [
                    {"degree": "BS", "university": "MIT", "year": 1750},
                    {"degree": "MBA", "university": "Harvard Business School", "year": 1990}
                ]
            }]"#,
        )
        .unwrap();

        let validated = validate_records("0001", records);
        assert_eq!(validated[0].education[0].year, None);
        assert_eq!(validated[0].education[1].year, Some(1990));
    }

    #[test]
    fn implausible_but_well_formed_amounts_pass_through() {
        let records: Vec<Executive> = serde_json::from_str(
            r#"[{"name": "Jane Smith", "current_role": "CEO", "compensation_salary": 999999999999}]"#,
        )
        .unwrap();

        let validated = validate_records("0001", records);
        assert_eq!(validated.len(), 1);
    }
}
