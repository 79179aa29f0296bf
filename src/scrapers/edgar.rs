//! EDGAR archive client.
//!
//! Resolves company identifiers to filing lists via the full-text browse
//! interface, then filing index pages to primary documents. All requests
//! go through the shared `HttpClient` (contact header, rate limiting,
//! retries).

use std::collections::HashMap;

use async_trait::async_trait;
use regex::Regex;
use scraper::{Html, Selector};
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use super::http_client::HttpClient;
use super::{FilingArchive, FilingRef};
use crate::error::FetchError;
use crate::models::normalize_cik;

const EDGAR_BASE: &str = "https://www.sec.gov";
const TICKER_FILE: &str = "https://www.sec.gov/files/company_tickers.json";

/// One entry of the archive's ticker registry file.
#[derive(Debug, Deserialize)]
struct TickerEntry {
    cik_str: u64,
    title: String,
}

/// EDGAR filing archive client.
#[derive(Clone)]
pub struct EdgarClient {
    http: HttpClient,
    base_url: String,
}

impl EdgarClient {
    pub fn new(http: HttpClient) -> Self {
        Self {
            http,
            base_url: EDGAR_BASE.to_string(),
        }
    }

    /// Point the client at a different host (tests use a stub instead,
    /// but mirrors keep the same path layout).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn browse_url(&self, cik: &str, filing_type: &str, limit: usize) -> String {
        format!(
            "{}/cgi-bin/browse-edgar?action=getcompany&CIK={}&type={}&dateb=&owner=exclude&count={}",
            self.base_url,
            cik,
            filing_type.replace(' ', "+"),
            limit
        )
    }

    /// Resolve the filing index page to the primary document URL.
    ///
    /// The index lists every file in the submission; the primary document
    /// is the one named `*def14a*.htm`, or failing that, any `.htm` link
    /// whose anchor text names the filing type.
    fn find_primary_document(
        &self,
        index_url: &str,
        index_html: &str,
        filing_type: &str,
    ) -> Option<String> {
        let doc = Html::parse_document(index_html);
        let anchors = Selector::parse("a").expect("valid selector");
        let type_lower = filing_type.to_lowercase();
        let type_compact = type_lower.replace(' ', "");

        let mut fallback: Option<String> = None;
        for link in doc.select(&anchors) {
            let Some(href) = link.value().attr("href") else {
                continue;
            };
            let href_lower = href.to_lowercase();
            if href_lower.contains(&format!("{type_compact}.htm")) {
                return self.join_href(index_url, href);
            }
            let text = link.text().collect::<String>().to_lowercase();
            if fallback.is_none() && href_lower.contains(".htm") && text.contains(&type_lower) {
                fallback = self.join_href(index_url, href);
            }
        }
        fallback
    }

    fn join_href(&self, page_url: &str, href: &str) -> Option<String> {
        Url::parse(page_url)
            .ok()?
            .join(href)
            .ok()
            .map(|u| u.to_string())
    }
}

#[async_trait]
impl FilingArchive for EdgarClient {
    async fn company_tickers(&self) -> Result<Vec<(String, String)>, FetchError> {
        let entries: HashMap<String, TickerEntry> = self.http.get_json(TICKER_FILE).await?;

        let mut companies: Vec<(String, String)> = entries
            .into_values()
            .map(|e| (format!("{:010}", e.cik_str), e.title))
            .collect();
        companies.sort();
        companies.dedup_by(|a, b| a.0 == b.0);
        Ok(companies)
    }

    async fn list_filings(
        &self,
        cik: &str,
        filing_type: &str,
        limit: usize,
    ) -> Result<Vec<FilingRef>, FetchError> {
        let cik = normalize_cik(cik);
        let url = self.browse_url(&cik, filing_type, limit);
        let html = self.http.get_text(&url).await?;

        let doc = Html::parse_document(&html);
        let rows = Selector::parse("table.tableFile2 tr").expect("valid selector");
        let cells = Selector::parse("td").expect("valid selector");
        let anchors = Selector::parse("a").expect("valid selector");
        // Dashed accession number embedded in every index-page href
        let accession_re = Regex::new(r"\d{10}-\d{2}-\d{6}").expect("valid regex");

        let mut filings = Vec::new();
        for row in doc.select(&rows) {
            let cols: Vec<_> = row.select(&cells).collect();
            if cols.len() < 4 {
                continue;
            }
            let row_type = cols[0].text().collect::<String>().trim().to_string();
            if !row_type.eq_ignore_ascii_case(filing_type) {
                continue;
            }
            let filing_date = cols[3].text().collect::<String>().trim().to_string();
            let Some(href) = row
                .select(&anchors)
                .find_map(|a| a.value().attr("href"))
            else {
                continue;
            };
            let Some(index_url) = self.join_href(&url, href) else {
                continue;
            };
            // Filings are keyed by accession number; an index row we
            // cannot key is skipped loudly, not guessed at.
            let Some(accession) = accession_re.find(&index_url).map(|m| m.as_str().to_string())
            else {
                warn!(cik = %cik, index_url = %index_url, "no accession number in index link, skipping");
                continue;
            };

            filings.push(FilingRef::new(
                accession,
                cik.clone(),
                row_type,
                filing_date,
                index_url,
            ));
        }

        debug!(cik = %cik, count = filings.len(), "listed filings");
        Ok(filings)
    }

    async fn fetch_document(&self, filing: &FilingRef) -> Result<Vec<u8>, FetchError> {
        let index_html = self.http.get_text(&filing.url).await?;

        let Some(doc_url) =
            self.find_primary_document(&filing.url, &index_html, &filing.filing_type)
        else {
            return Err(FetchError::MalformedResponse {
                url: filing.url.clone(),
                reason: format!("no {} document link on index page", filing.filing_type),
            });
        };

        self.http.get_bytes(&doc_url).await
    }
}
