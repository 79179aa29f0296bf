//! Archive access: rate limiting, HTTP plumbing, and the EDGAR client.

pub mod edgar;
pub mod http_client;
pub mod rate_limiter;

pub use edgar::EdgarClient;
pub use http_client::HttpClient;
pub use rate_limiter::{RateLimitConfig, RateLimiter};

use async_trait::async_trait;

use crate::error::FetchError;
use crate::models::normalize_cik;

/// A filing as listed by the archive, before download.
#[derive(Debug, Clone, PartialEq)]
pub struct FilingRef {
    /// The archive's unique identifier for this filed document.
    pub accession: String,
    pub cik: String,
    pub filing_type: String,
    pub filing_date: String,
    /// URL of the filing's index page.
    pub url: String,
}

impl FilingRef {
    pub fn new(
        accession: impl Into<String>,
        cik: impl Into<String>,
        filing_type: impl Into<String>,
        filing_date: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            accession: accession.into(),
            cik: normalize_cik(&cik.into()),
            filing_type: filing_type.into(),
            filing_date: filing_date.into(),
            url: url.into(),
        }
    }
}

/// The archive as the pipeline sees it: list filings, fetch documents.
///
/// `EdgarClient` is the production implementation; tests substitute a
/// stub so the pipeline can run against canned documents.
#[async_trait]
pub trait FilingArchive: Send + Sync {
    /// The archive's full (cik, company name) registry.
    async fn company_tickers(&self) -> Result<Vec<(String, String)>, FetchError>;

    /// List a company's filings of the given type, most recent first.
    async fn list_filings(
        &self,
        cik: &str,
        filing_type: &str,
        limit: usize,
    ) -> Result<Vec<FilingRef>, FetchError>;

    /// Fetch the primary document for a listed filing.
    async fn fetch_document(&self, filing: &FilingRef) -> Result<Vec<u8>, FetchError>;
}
