//! Download orchestration: discovery, claimed fetching, validation,
//! durable storage.
//!
//! A pool of workers processes distinct filings concurrently; the
//! ledger's claim step guarantees no filing is fetched twice. Failures
//! re-queue the filing while retries remain. One filing's outcome never
//! touches another's.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use sha2::{Digest, Sha256};
use tracing::{debug, error, info, warn};

use crate::error::FetchError;
use crate::models::{Company, DownloadStatus, Filing};
use crate::repository::{DieselCompanyRepository, DieselFilingRepository};
use crate::scrapers::{FilingArchive, FilingRef};
use crate::validate::FilingValidator;

/// Configuration for a download run.
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    /// Filing type to acquire.
    pub filing_type: String,
    /// How many filings to list per company.
    pub filings_per_company: usize,
    /// Concurrent download workers.
    pub workers: usize,
    /// Download attempts per filing before terminal failure.
    pub max_retries: u32,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            filing_type: "DEF 14A".to_string(),
            filings_per_company: 5,
            workers: 4,
            max_retries: 3,
        }
    }
}

/// Counts per terminal state for one run.
#[derive(Debug, Default, Clone)]
pub struct DownloadSummary {
    pub companies: usize,
    pub discovered: usize,
    pub validated: usize,
    pub rejected: usize,
    pub failed: usize,
    /// Filings already known from an earlier run, left untouched.
    pub skipped: usize,
}

/// Orchestrates the fetch-and-validate loop across companies.
pub struct DownloadService {
    archive: Arc<dyn FilingArchive>,
    companies: DieselCompanyRepository,
    filings: DieselFilingRepository,
    validator: FilingValidator,
    documents_dir: PathBuf,
    config: DownloadConfig,
}

impl DownloadService {
    pub fn new(
        archive: Arc<dyn FilingArchive>,
        companies: DieselCompanyRepository,
        filings: DieselFilingRepository,
        validator: FilingValidator,
        documents_dir: PathBuf,
        config: DownloadConfig,
    ) -> Self {
        Self {
            archive,
            companies,
            filings,
            validator,
            documents_dir,
            config,
        }
    }

    /// Run discovery and download for the given companies.
    ///
    /// Safe to re-run: discovery never duplicates filings, terminal
    /// states are skipped, and filings left mid-download by an
    /// interrupted run are reclaimed first.
    pub async fn run(&self, ciks: &[String]) -> anyhow::Result<DownloadSummary> {
        let reclaimed = self.filings.reclaim_interrupted().await?;
        if reclaimed > 0 {
            info!(reclaimed, "re-queued filings interrupted mid-download");
        }

        let summary = Arc::new(Counters::default());
        summary.companies.store(ciks.len(), Ordering::SeqCst);

        // Phase 1: list filings per company and record discoveries.
        stream::iter(ciks)
            .for_each_concurrent(self.config.workers, |cik| {
                let summary = summary.clone();
                async move {
                    if let Err(e) = self.discover_company(cik, &summary).await {
                        error!(cik = %cik, error = %e, "discovery failed");
                    }
                }
            })
            .await;

        // Phase 2: drain claimable filings. Transient failures re-enter
        // `discovered`, so loop until a pass claims nothing.
        loop {
            let batch = self
                .filings
                .get_by_download_status(DownloadStatus::Discovered)
                .await?;
            if batch.is_empty() {
                break;
            }
            debug!(batch = batch.len(), "processing discovered filings");

            stream::iter(batch)
                .for_each_concurrent(self.config.workers, |filing| {
                    let summary = summary.clone();
                    async move {
                        self.process_filing(filing, &summary).await;
                    }
                })
                .await;
        }

        let summary = summary.snapshot();
        info!(
            companies = summary.companies,
            discovered = summary.discovered,
            validated = summary.validated,
            rejected = summary.rejected,
            failed = summary.failed,
            skipped = summary.skipped,
            "download run complete"
        );
        Ok(summary)
    }

    /// List one company's filings and record the new ones.
    async fn discover_company(&self, cik: &str, summary: &Counters) -> anyhow::Result<()> {
        self.companies.upsert(&Company::new(cik)).await?;

        let refs = self
            .archive
            .list_filings(cik, &self.config.filing_type, self.config.filings_per_company)
            .await?;

        for filing_ref in refs {
            let filing = filing_from_ref(&filing_ref);
            if self.filings.upsert_discovered(&filing).await? {
                summary.discovered.fetch_add(1, Ordering::SeqCst);
            } else {
                summary.skipped.fetch_add(1, Ordering::SeqCst);
            }
        }
        self.companies.touch_last_scraped(cik, Utc::now()).await?;
        Ok(())
    }

    /// Claim, fetch, validate, and store one filing.
    ///
    /// Errors land in the ledger against this filing; nothing propagates.
    async fn process_filing(&self, filing: Filing, summary: &Counters) {
        let accession = filing.accession.clone();

        match self.filings.claim_for_download(&accession).await {
            Ok(true) => {}
            Ok(false) => {
                // Another worker claimed it between listing and here
                return;
            }
            Err(e) => {
                error!(accession = %accession, error = %e, "claim failed");
                return;
            }
        }

        let attempt = filing.retry_count + 1;
        if let Err(e) = self.download_and_validate(&filing, summary).await {
            let retryable = e.is_retryable();
            warn!(
                cik = %filing.cik,
                accession = %accession,
                attempt,
                retryable,
                error = %e,
                "download attempt failed"
            );
            match self
                .filings
                .mark_failed(&accession, &e.to_string(), retryable, self.config.max_retries)
                .await
            {
                Ok(DownloadStatus::Failed) => {
                    summary.failed.fetch_add(1, Ordering::SeqCst);
                }
                Ok(_) => {}
                Err(db) => error!(accession = %accession, error = %db, "failed to record failure"),
            }
        }
    }

    async fn download_and_validate(
        &self,
        filing: &Filing,
        summary: &Counters,
    ) -> Result<(), FetchError> {
        let filing_ref = FilingRef::new(
            filing.accession.clone(),
            filing.cik.clone(),
            filing.filing_type.clone(),
            filing.filing_date.clone(),
            filing.source_url.clone(),
        );
        let bytes = self.archive.fetch_document(&filing_ref).await?;

        let result = self.validator.validate(&bytes, &filing.filing_type);
        if !result.ok {
            let reason = result.reason.unwrap_or_else(|| "unspecified".to_string());
            info!(
                cik = %filing.cik,
                accession = %filing.accession,
                reason = %reason,
                "filing rejected by validation"
            );
            if let Err(e) = self.filings.mark_rejected(&filing.accession, &reason).await {
                error!(accession = %filing.accession, error = %e, "failed to record rejection");
            } else {
                summary.rejected.fetch_add(1, Ordering::SeqCst);
            }
            return Ok(());
        }

        let path = document_path(&self.documents_dir, &filing.cik, &filing.accession);
        let hash = store_document(&path, &bytes).await.map_err(|e| {
            FetchError::MalformedResponse {
                url: filing.source_url.clone(),
                reason: format!("failed to store document: {e}"),
            }
        })?;

        self.filings
            .mark_validated(&filing.accession, &path.display().to_string(), &hash)
            .await
            .map_err(|e| FetchError::MalformedResponse {
                url: filing.source_url.clone(),
                reason: format!("failed to record validation: {e}"),
            })?;

        summary.validated.fetch_add(1, Ordering::SeqCst);
        info!(
            cik = %filing.cik,
            accession = %filing.accession,
            path = %path.display(),
            "filing validated and stored"
        );
        Ok(())
    }
}

/// Storage path convention shared with the extraction stage:
/// `<documents_dir>/<cik>/<accession>.htm`.
pub fn document_path(documents_dir: &Path, cik: &str, accession: &str) -> PathBuf {
    documents_dir.join(cik).join(format!("{accession}.htm"))
}

/// Write the document durably and return its content hash.
async fn store_document(path: &Path, bytes: &[u8]) -> std::io::Result<String> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, bytes).await?;

    let mut hasher = Sha256::new();
    hasher.update(bytes);
    Ok(hex::encode(hasher.finalize()))
}

fn filing_from_ref(filing_ref: &FilingRef) -> Filing {
    Filing::discovered(
        filing_ref.accession.clone(),
        filing_ref.cik.clone(),
        filing_ref.filing_type.clone(),
        filing_ref.filing_date.clone(),
        filing_ref.url.clone(),
    )
}

#[derive(Default)]
struct Counters {
    companies: AtomicUsize,
    discovered: AtomicUsize,
    validated: AtomicUsize,
    rejected: AtomicUsize,
    failed: AtomicUsize,
    skipped: AtomicUsize,
}

impl Counters {
    fn snapshot(&self) -> DownloadSummary {
        DownloadSummary {
            companies: self.companies.load(Ordering::SeqCst),
            discovered: self.discovered.load(Ordering::SeqCst),
            validated: self.validated.load(Ordering::SeqCst),
            rejected: self.rejected.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
            skipped: self.skipped.load(Ordering::SeqCst),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_path_is_keyed_by_company_and_accession() {
        let path = document_path(Path::new("/data/documents"), "0000320193", "0001-24-000001");
        assert_eq!(
            path,
            Path::new("/data/documents/0000320193/0001-24-000001.htm")
        );
    }

    #[tokio::test]
    async fn store_document_writes_and_hashes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("0000320193").join("acc.htm");

        let hash = store_document(&path, b"hello filing").await.unwrap();
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"hello filing");
        // SHA-256 is stable: same bytes, same hash
        assert_eq!(hash, store_document(&path, b"hello filing").await.unwrap());
        assert_eq!(hash.len(), 64);
    }
}
