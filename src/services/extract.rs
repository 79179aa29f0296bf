//! Extraction orchestration over validated filings.
//!
//! Reads stored documents (never re-fetching, never mutating them),
//! runs section location and record extraction, and persists outcomes.
//! Filings are processed independently: one permanent failure never
//! halts or skips siblings.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::{error, info, warn};

use crate::error::ExtractError;
use crate::llm::{ExecutiveExtractor, SectionLocator};
use crate::models::{Filing, ProcessingState};
use crate::repository::{DieselExtractionRepository, DieselFilingRepository};

/// Configuration for an extraction run.
#[derive(Debug, Clone)]
pub struct ExtractConfig {
    /// Concurrent extraction workers (bounded by model-service limits,
    /// typically lower than download concurrency).
    pub concurrency: usize,
    /// Extraction attempts per filing before permanent failure.
    pub max_attempts: u32,
    /// Process every validated filing instead of only the most recent
    /// one per company.
    pub all_filings: bool,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            concurrency: 2,
            max_attempts: 3,
            all_filings: false,
        }
    }
}

/// Counts per outcome for one run.
#[derive(Debug, Default, Clone)]
pub struct ExtractSummary {
    pub candidates: usize,
    pub succeeded: usize,
    pub failed_retryable: usize,
    pub failed_permanent: usize,
    /// Claims lost to state changes since candidate selection.
    pub skipped: usize,
    pub executives: usize,
}

/// Orchestrates section location and record extraction.
pub struct ExtractionService {
    filings: DieselFilingRepository,
    ledger: DieselExtractionRepository,
    locator: SectionLocator,
    extractor: ExecutiveExtractor,
    config: ExtractConfig,
}

impl ExtractionService {
    pub fn new(
        filings: DieselFilingRepository,
        ledger: DieselExtractionRepository,
        locator: SectionLocator,
        extractor: ExecutiveExtractor,
        config: ExtractConfig,
    ) -> Self {
        Self {
            filings,
            ledger,
            locator,
            extractor,
            config,
        }
    }

    /// Run extraction over every eligible validated filing.
    pub async fn run(&self) -> anyhow::Result<ExtractSummary> {
        let reclaimed = self.ledger.reclaim_interrupted().await?;
        if reclaimed > 0 {
            info!(reclaimed, "re-queued filings interrupted mid-extraction");
        }

        let candidates: Vec<Filing> = if self.config.all_filings {
            self.ledger.extraction_candidates().await?
        } else {
            // Latest validated filing per company; the claim step skips
            // any that already succeeded or failed permanently.
            self.filings.latest_validated_per_company().await?
        };

        let summary = Arc::new(Counters::default());
        summary.candidates.store(candidates.len(), Ordering::SeqCst);
        info!(candidates = candidates.len(), "starting extraction run");

        stream::iter(candidates)
            .for_each_concurrent(self.config.concurrency, |filing| {
                let summary = summary.clone();
                async move {
                    self.process_filing(filing, &summary).await;
                }
            })
            .await;

        let summary = summary.snapshot();
        info!(
            candidates = summary.candidates,
            succeeded = summary.succeeded,
            failed_retryable = summary.failed_retryable,
            failed_permanent = summary.failed_permanent,
            skipped = summary.skipped,
            executives = summary.executives,
            "extraction run complete"
        );
        Ok(summary)
    }

    /// Claim and process one filing; all outcomes land in the ledger.
    async fn process_filing(&self, filing: Filing, summary: &Counters) {
        let accession = filing.accession.clone();

        match self.ledger.claim_for_extraction(&accession).await {
            Ok(true) => {}
            Ok(false) => {
                summary.skipped.fetch_add(1, Ordering::SeqCst);
                return;
            }
            Err(e) => {
                error!(accession = %accession, error = %e, "extraction claim failed");
                return;
            }
        }

        match self.extract_one(&filing).await {
            Ok(records) => {
                match self.ledger.complete_extraction(&accession, &records).await {
                    Ok(()) => {
                        summary.succeeded.fetch_add(1, Ordering::SeqCst);
                        summary.executives.fetch_add(records.len(), Ordering::SeqCst);
                        info!(
                            cik = %filing.cik,
                            accession = %accession,
                            executives = records.len(),
                            "extraction succeeded"
                        );
                    }
                    Err(e) => {
                        error!(accession = %accession, error = %e, "failed to persist extraction");
                        self.record_failure(&accession, &e.to_string(), true, summary)
                            .await;
                    }
                }
            }
            Err(e) => {
                warn!(cik = %filing.cik, accession = %accession, error = %e, "extraction failed");
                self.record_failure(&accession, &e.to_string(), e.is_retryable(), summary)
                    .await;
            }
        }
    }

    async fn extract_one(&self, filing: &Filing) -> Result<Vec<crate::models::Executive>, ExtractError> {
        let path = filing.file_path.as_deref().ok_or_else(|| {
            ExtractError::Storage("validated filing has no stored path".into())
        })?;
        let html = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ExtractError::Storage(Box::new(e)))?;

        let sections = self.locator.locate_sections(&html).await?;
        self.extractor.extract(&filing.accession, &sections).await
    }

    async fn record_failure(
        &self,
        accession: &str,
        error_text: &str,
        retryable: bool,
        summary: &Counters,
    ) {
        match self
            .ledger
            .fail_extraction(accession, error_text, retryable, self.config.max_attempts)
            .await
        {
            Ok(ProcessingState::FailedRetryable) => {
                summary.failed_retryable.fetch_add(1, Ordering::SeqCst);
            }
            Ok(_) => {
                summary.failed_permanent.fetch_add(1, Ordering::SeqCst);
            }
            Err(e) => error!(accession = %accession, error = %e, "failed to record extraction failure"),
        }
    }
}

#[derive(Default)]
struct Counters {
    candidates: AtomicUsize,
    succeeded: AtomicUsize,
    failed_retryable: AtomicUsize,
    failed_permanent: AtomicUsize,
    skipped: AtomicUsize,
    executives: AtomicUsize,
}

impl Counters {
    fn snapshot(&self) -> ExtractSummary {
        ExtractSummary {
            candidates: self.candidates.load(Ordering::SeqCst),
            succeeded: self.succeeded.load(Ordering::SeqCst),
            failed_retryable: self.failed_retryable.load(Ordering::SeqCst),
            failed_permanent: self.failed_permanent.load(Ordering::SeqCst),
            skipped: self.skipped.load(Ordering::SeqCst),
            executives: self.executives.load(Ordering::SeqCst),
        }
    }
}
