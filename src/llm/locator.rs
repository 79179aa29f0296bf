//! Section location within filing text.
//!
//! Proxy statements bury compensation tables and biographies under
//! hundreds of pages of markup with no consistent structure. This stage
//! segments the document by detected headings, asks the model which
//! sections matter, and recovers the model's answers with fuzzy title
//! matching -- the model rarely echoes a title byte-for-byte.

use std::collections::HashMap;
use std::sync::Arc;

use regex::Regex;
use scraper::{Html, Selector};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::{strip_code_fences, truncate_utf8, ChatModel, ChatRequest};
use crate::error::{ExtractError, LlmError};

/// Sections shorter than this are heading noise, not content.
const MIN_SECTION_CHARS: usize = 100;

/// Preview length sent to the model per section.
const PREVIEW_CHARS: usize = 200;

/// Keywords used when the model cannot be consulted.
const FALLBACK_KEYWORDS: &[&str] = &["EXECUTIVE", "COMPENSATION", "BIOGRAPHICAL", "BOARD", "MANAGEMENT"];

const FILTER_SYSTEM_PROMPT: &str =
    "You are an expert at identifying relevant sections in SEC filings.";

const FILTER_PROMPT: &str = r#"Review these section titles and previews from an SEC DEF 14A filing.
Identify sections likely to contain:
1. Executive compensation information
2. Executive biographical information
3. Management structure information

Return a JSON array of section titles that are most relevant. Return at most 3 sections.
Example: ["EXECUTIVE COMPENSATION", "BIOGRAPHICAL INFORMATION"]

Here are the sections to review:
"#;

/// What a located section is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionTopic {
    Compensation,
    Biography,
    Education,
}

impl SectionTopic {
    pub fn as_str(&self) -> &'static str {
        match self {
            SectionTopic::Compensation => "compensation",
            SectionTopic::Biography => "biography",
            SectionTopic::Education => "education",
        }
    }
}

/// A span of filing text identified as relevant, in document order.
#[derive(Debug, Clone)]
pub struct LocatedSection {
    pub topic: SectionTopic,
    pub title: String,
    pub body: String,
}

/// A candidate section carved out between two detected headings.
#[derive(Debug, Clone)]
struct Section {
    title: String,
    body: String,
    /// Position of the heading in the document's text flow.
    position: usize,
}

/// Locates compensation/biography/education sections in filing text.
pub struct SectionLocator {
    model: Arc<dyn ChatModel>,
    max_preview_sections: usize,
}

impl SectionLocator {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self {
            model,
            max_preview_sections: 60,
        }
    }

    /// Identify the sections of `html` relevant to executive pay,
    /// biography, and education.
    ///
    /// Fails with `ExtractError::SectionNotFound` when nothing matches;
    /// an empty answer here must mark the filing failed-for-review, not
    /// produce an empty false-positive record downstream.
    pub async fn locate_sections(&self, html: &str) -> Result<Vec<LocatedSection>, ExtractError> {
        let headings = identify_headings(html);
        let sections = extract_sections(html, &headings);
        if sections.is_empty() {
            return Err(ExtractError::SectionNotFound);
        }
        debug!(count = sections.len(), "segmented filing into sections");

        let titles = match self.filter_with_model(&sections).await {
            Ok(titles) => titles,
            Err(e) => {
                // Model unavailable: fall back to keyword matching so a
                // service outage degrades recall instead of halting runs.
                warn!(error = %e, "section filter failed, using keyword fallback");
                sections
                    .iter()
                    .filter(|s| {
                        let upper = s.title.to_uppercase();
                        FALLBACK_KEYWORDS.iter().any(|k| upper.contains(k))
                    })
                    .map(|s| s.title.clone())
                    .collect()
            }
        };

        let mut located: Vec<LocatedSection> = Vec::new();
        for section in &sections {
            let matched = titles.iter().any(|t| titles_match(t, &section.title));
            if !matched {
                continue;
            }
            let Some(topic) = classify_topic(&section.title, &section.body) else {
                continue;
            };
            // A compensation section with no dollar figures is a
            // cross-reference, not the table itself.
            if topic == SectionTopic::Compensation && !has_dollar_figures(&section.body) {
                debug!(title = %section.title, "skipping compensation section without figures");
                continue;
            }
            located.push(LocatedSection {
                topic,
                title: section.title.clone(),
                body: section.body.clone(),
            });
        }

        if located.is_empty() {
            return Err(ExtractError::SectionNotFound);
        }
        info!(
            sections = located.len(),
            titles = ?located.iter().map(|s| s.title.as_str()).collect::<Vec<_>>(),
            "located relevant sections"
        );
        Ok(located)
    }

    /// Ask the model which section titles are relevant.
    async fn filter_with_model(&self, sections: &[Section]) -> Result<Vec<String>, LlmError> {
        #[derive(Serialize)]
        struct Preview<'a> {
            title: &'a str,
            preview: &'a str,
        }

        let previews: Vec<Preview> = sections
            .iter()
            .take(self.max_preview_sections)
            .map(|s| Preview {
                title: &s.title,
                preview: truncate_utf8(&s.body, PREVIEW_CHARS),
            })
            .collect();
        let previews_json = serde_json::to_string_pretty(&previews)
            .map_err(|e| LlmError::Parse(e.to_string()))?;

        let outcome = self
            .model
            .complete(ChatRequest {
                system: FILTER_SYSTEM_PROMPT.to_string(),
                user: format!("{FILTER_PROMPT}{previews_json}"),
                temperature: 0.1,
            })
            .await?;

        debug!(
            prompt_tokens = ?outcome.prompt_tokens,
            completion_tokens = ?outcome.completion_tokens,
            latency = ?outcome.latency,
            "section filter call completed"
        );
        Ok(parse_title_list(&outcome.content))
    }
}

/// Parse the model's title list: JSON array first, quoted strings as a
/// fallback when the reply wraps the array in prose.
fn parse_title_list(content: &str) -> Vec<String> {
    let cleaned = strip_code_fences(content);
    if let Ok(titles) = serde_json::from_str::<Vec<String>>(cleaned) {
        return titles;
    }
    let quoted = Regex::new(r#""([^"]+)""#).expect("valid regex");
    quoted
        .captures_iter(cleaned)
        .map(|c| c[1].to_string())
        .collect()
}

/// Normalized containment in either direction counts as a match: the
/// model abbreviates long titles and expands short ones.
fn titles_match(a: &str, b: &str) -> bool {
    let na = normalize_title(a);
    let nb = normalize_title(b);
    if na.is_empty() || nb.is_empty() {
        return false;
    }
    na.contains(&nb) || nb.contains(&na)
}

fn normalize_title(title: &str) -> String {
    title
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Identify candidate headings with confidence scores.
///
/// Filings rarely use real heading tags consistently, so several
/// heuristics run in parallel: h1-h3, styled/classed elements, short
/// ALL-CAPS text runs.
fn identify_headings(html: &str) -> Vec<(String, f32)> {
    let doc = Html::parse_document(html);
    let mut headings: Vec<(String, f32)> = Vec::new();

    let tag_selectors = [("h1", 0.9f32), ("h2", 0.9), ("h3", 0.85)];
    for (tag, score) in tag_selectors {
        let selector = Selector::parse(tag).expect("valid selector");
        for element in doc.select(&selector) {
            let text = collapse_ws(&element.text().collect::<String>());
            if !text.is_empty() && text.len() < 200 {
                headings.push((text, score));
            }
        }
    }

    let class_selector = Selector::parse(
        r#"[class*="heading"], [class*="title"], [class*="header"], [class*="section"]"#,
    )
    .expect("valid selector");
    for element in doc.select(&class_selector) {
        let text = collapse_ws(&element.text().collect::<String>());
        if !text.is_empty() && text.len() < 100 {
            headings.push((text, 0.8));
        }
    }

    let style_selector = Selector::parse(r#"[style*="font-weight"]"#).expect("valid selector");
    for element in doc.select(&style_selector) {
        let style = element.value().attr("style").unwrap_or_default();
        if !style.to_lowercase().contains("bold") {
            continue;
        }
        let text = collapse_ws(&element.text().collect::<String>());
        if !text.is_empty() && text.len() < 100 {
            headings.push((text, 0.7));
        }
    }

    // ALL-CAPS short runs in the text flow
    for node in doc.root_element().text() {
        let text = collapse_ws(node);
        if text.len() > 10
            && text.len() < 100
            && text.chars().any(|c| c.is_alphabetic())
            && text == text.to_uppercase()
        {
            headings.push((text, 0.6));
        }
    }

    // Deduplicate, keeping the highest-confidence sighting
    let mut best: HashMap<String, f32> = HashMap::new();
    let mut order: Vec<String> = Vec::new();
    for (text, score) in headings {
        match best.get_mut(&text) {
            Some(existing) => {
                if score > *existing {
                    *existing = score;
                }
            }
            None => {
                best.insert(text.clone(), score);
                order.push(text);
            }
        }
    }
    order
        .into_iter()
        .map(|t| {
            let score = best[&t];
            (t, score)
        })
        .collect()
}

/// Carve the document's text flow into sections between headings.
fn extract_sections(html: &str, headings: &[(String, f32)]) -> Vec<Section> {
    let doc = Html::parse_document(html);
    let text_nodes: Vec<String> = doc
        .root_element()
        .text()
        .map(collapse_ws)
        .filter(|t| !t.is_empty())
        .collect();

    // Highest-confidence headings claim their span first
    let mut by_confidence: Vec<&(String, f32)> = headings.iter().collect();
    by_confidence.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    let positions: Vec<(usize, &str)> = headings
        .iter()
        .filter_map(|(title, _)| {
            text_nodes
                .iter()
                .position(|t| t.contains(title.as_str()))
                .map(|idx| (idx, title.as_str()))
        })
        .collect();

    let mut sections = Vec::new();
    for entry in &by_confidence {
        let title = &entry.0;
        let Some(start) = text_nodes.iter().position(|t| t.contains(title.as_str())) else {
            continue;
        };
        let end = positions
            .iter()
            .filter(|(idx, other)| *idx > start && *other != title.as_str())
            .map(|(idx, _)| *idx)
            .min()
            .unwrap_or(text_nodes.len());

        let body = text_nodes[start + 1..end].join("\n");
        if body.len() > MIN_SECTION_CHARS {
            sections.push(Section {
                title: title.clone(),
                body,
                position: start,
            });
        }
    }

    sections.sort_by_key(|s| s.position);
    sections.dedup_by(|a, b| a.title == b.title);
    sections
}

fn collapse_ws(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Tag a section by what it discusses; None means off-topic.
fn classify_topic(title: &str, body: &str) -> Option<SectionTopic> {
    let title_lower = title.to_lowercase();
    let body_lower = body.to_lowercase();
    let head = truncate_utf8(&body_lower, 1000);

    let education_keys = ["education", "degree", "university", "academic"];
    if education_keys.iter().any(|k| title_lower.contains(k)) {
        return Some(SectionTopic::Education);
    }

    let compensation_keys = [
        "summary compensation table",
        "executive compensation",
        "compensation discussion",
        "director compensation",
    ];
    if compensation_keys
        .iter()
        .any(|k| title_lower.contains(k) || head.contains(k))
    {
        return Some(SectionTopic::Compensation);
    }

    let biography_keys = [
        "executive officers",
        "board of directors",
        "biographical information",
        "director nominees",
        "management",
    ];
    if biography_keys
        .iter()
        .any(|k| title_lower.contains(k) || head.contains(k))
    {
        return Some(SectionTopic::Biography);
    }

    None
}

/// Text-level stand-in for "contains a compensation table": real tables
/// carry repeated dollar figures.
fn has_dollar_figures(body: &str) -> bool {
    let amount = Regex::new(r"\$\s?[\d,]+").expect("valid regex");
    amount.find_iter(body).take(2).count() >= 2
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmError;
    use crate::llm::ChatOutcome;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Scripted model: pops canned replies in order.
    struct ScriptedModel {
        replies: Mutex<Vec<Result<String, LlmError>>>,
    }

    impl ScriptedModel {
        fn new(replies: Vec<Result<String, LlmError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies),
            })
        }
    }

    #[async_trait]
    impl ChatModel for ScriptedModel {
        async fn complete(&self, _request: ChatRequest) -> Result<ChatOutcome, LlmError> {
            let mut replies = self.replies.lock().unwrap();
            let reply = replies.remove(0);
            reply.map(|content| ChatOutcome {
                content,
                prompt_tokens: Some(1000),
                completion_tokens: Some(50),
                latency: Duration::from_millis(10),
            })
        }
    }

    fn proxy_html() -> String {
        format!(
            r#"<html><body>
            <h1>PROXY STATEMENT</h1>
            <p>{intro}</p>
            <h2>EXECUTIVE COMPENSATION</h2>
            <p>The Summary Compensation Table below shows amounts paid. {comp}</p>
            <p>Jane Smith received $1,000,000 in salary and $2,500,000 in stock awards.</p>
            <h2>DIRECTORS AND EXECUTIVE OFFICERS</h2>
            <p>Jane Smith, 55, has served as Chief Executive Officer since 2015. {bio}
            She holds an MBA from Harvard Business School.</p>
            <h2>HOUSEHOLDING OF PROXY MATERIALS</h2>
            <p>{other}</p>
            </body></html>"#,
            intro = "We are furnishing this proxy statement to our shareholders. ".repeat(5),
            comp = "Compensation for the last completed fiscal year is reported. ".repeat(5),
            bio = "Prior to that she served as Chief Operating Officer. ".repeat(5),
            other = "A single copy of the notice is being delivered. ".repeat(5),
        )
    }

    #[tokio::test]
    async fn locates_sections_from_model_answer() {
        let model = ScriptedModel::new(vec![Ok(
            r#"["EXECUTIVE COMPENSATION", "DIRECTORS AND EXECUTIVE OFFICERS"]"#.to_string(),
        )]);
        let locator = SectionLocator::new(model);

        let sections = locator.locate_sections(&proxy_html()).await.unwrap();
        assert!(sections.len() >= 2);
        assert!(sections.iter().any(|s| s.topic == SectionTopic::Compensation));
        assert!(sections.iter().any(|s| s.topic == SectionTopic::Biography));
    }

    #[tokio::test]
    async fn fuzzy_matches_inexact_titles() {
        // Model echoes a lowercase abbreviation of the real heading
        let model = ScriptedModel::new(vec![Ok(r#"["executive compensation"]"#.to_string())]);
        let locator = SectionLocator::new(model);

        let sections = locator.locate_sections(&proxy_html()).await.unwrap();
        assert!(sections.iter().any(|s| s.topic == SectionTopic::Compensation));
    }

    #[tokio::test]
    async fn falls_back_to_keywords_when_model_fails() {
        let model = ScriptedModel::new(vec![Err(LlmError::Connection("refused".to_string()))]);
        let locator = SectionLocator::new(model);

        let sections = locator.locate_sections(&proxy_html()).await.unwrap();
        assert!(!sections.is_empty());
    }

    #[tokio::test]
    async fn no_relevant_section_is_an_error_not_empty() {
        let model = ScriptedModel::new(vec![Ok("[]".to_string())]);
        let locator = SectionLocator::new(model);

        let html = format!(
            "<html><body><h1>HOUSEHOLDING NOTICE</h1><p>{}</p></body></html>",
            "Nothing about officers or their pay appears in this document. ".repeat(20)
        );
        let err = locator.locate_sections(&html).await.unwrap_err();
        assert!(matches!(err, ExtractError::SectionNotFound));
    }

    #[test]
    fn title_list_parses_json_and_prose() {
        assert_eq!(
            parse_title_list(r#"["A", "B"]"#),
            vec!["A".to_string(), "B".to_string()]
        );
        assert_eq!(
            parse_title_list("The relevant sections are \"EXECUTIVE COMPENSATION\" only."),
            vec!["EXECUTIVE COMPENSATION".to_string()]
        );
        assert_eq!(
            parse_title_list("```json\n[\"X\"]\n```"),
            vec!["X".to_string()]
        );
    }

    #[test]
    fn compensation_sections_need_figures() {
        assert!(has_dollar_figures("salary of $1,000,000 and bonus of $250,000"));
        assert!(!has_dollar_figures("see the compensation discussion elsewhere"));
    }
}
