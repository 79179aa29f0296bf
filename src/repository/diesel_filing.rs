//! Diesel-based filing repository for SQLite.
//!
//! Holds the fetch state machine. All transitions are single guarded
//! UPDATE statements, so concurrent workers coordinate purely through
//! row counts: a transition that matched zero rows was lost to another
//! worker (or the filing was already terminal) and the caller backs off.

use std::collections::HashMap;

use chrono::Utc;
use diesel::prelude::*;

use super::diesel_models::{FilingRecord, NewFiling};
use super::diesel_pool::{run_blocking, DieselError, SqlitePool};
use super::parse_datetime;
use crate::models::{DownloadStatus, Filing};
use crate::schema::filings;

impl From<FilingRecord> for Filing {
    fn from(record: FilingRecord) -> Self {
        Filing {
            accession: record.accession,
            cik: record.cik,
            filing_type: record.filing_type,
            filing_date: record.filing_date,
            source_url: record.source_url,
            file_path: record.file_path,
            download_status: DownloadStatus::from_str(&record.download_status)
                .unwrap_or(DownloadStatus::Failed),
            validation_reason: record.validation_reason,
            content_hash: record.content_hash,
            retry_count: record.retry_count.max(0) as u32,
            last_error: record.last_error,
            discovered_at: parse_datetime(&record.discovered_at),
            updated_at: parse_datetime(&record.updated_at),
        }
    }
}

/// Diesel-based filing repository with compile-time query checking.
#[derive(Clone)]
pub struct DieselFilingRepository {
    pool: SqlitePool,
}

impl DieselFilingRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get a filing by accession identifier.
    pub async fn get(&self, accession: &str) -> Result<Option<Filing>, DieselError> {
        let accession = accession.to_string();
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            filings::table
                .find(&accession)
                .first::<FilingRecord>(conn)
                .optional()
        })
        .await
        .map(|opt| opt.map(Filing::from))
    }

    /// Record a newly discovered filing. Idempotent: an existing row --
    /// whatever its state -- is left untouched, so re-running discovery
    /// never duplicates rows or resets terminal outcomes.
    ///
    /// Returns true if the filing was not previously known.
    pub async fn upsert_discovered(&self, filing: &Filing) -> Result<bool, DieselError> {
        let filing = filing.clone();
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            let now = Utc::now().to_rfc3339();
            let discovered_at = filing.discovered_at.to_rfc3339();
            let inserted = diesel::insert_or_ignore_into(filings::table)
                .values(NewFiling {
                    accession: &filing.accession,
                    cik: &filing.cik,
                    filing_type: &filing.filing_type,
                    filing_date: &filing.filing_date,
                    source_url: &filing.source_url,
                    file_path: None,
                    download_status: DownloadStatus::Discovered.as_str(),
                    validation_reason: None,
                    content_hash: None,
                    retry_count: 0,
                    last_error: None,
                    discovered_at: &discovered_at,
                    updated_at: &now,
                })
                .execute(conn)?;
            Ok(inserted > 0)
        })
        .await
    }

    /// Load filings in a given state, oldest first.
    pub async fn get_by_download_status(
        &self,
        status: DownloadStatus,
    ) -> Result<Vec<Filing>, DieselError> {
        let status = status.as_str();
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            filings::table
                .filter(filings::download_status.eq(status))
                .order(filings::discovered_at.asc())
                .load::<FilingRecord>(conn)
        })
        .await
        .map(|records| records.into_iter().map(Filing::from).collect())
    }

    /// Atomically claim a filing for download: `discovered -> downloading`.
    ///
    /// Returns true iff this caller won the claim; a concurrent worker or
    /// a terminal state makes the guarded UPDATE match zero rows.
    pub async fn claim_for_download(&self, accession: &str) -> Result<bool, DieselError> {
        let accession = accession.to_string();
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            let now = Utc::now().to_rfc3339();
            let rows = diesel::update(
                filings::table
                    .find(&accession)
                    .filter(filings::download_status.eq(DownloadStatus::Discovered.as_str())),
            )
            .set((
                filings::download_status.eq(DownloadStatus::Downloading.as_str()),
                filings::updated_at.eq(&now),
            ))
            .execute(conn)?;
            Ok(rows == 1)
        })
        .await
    }

    /// Mark a downloaded document as validated and durably stored.
    pub async fn mark_validated(
        &self,
        accession: &str,
        file_path: &str,
        content_hash: &str,
    ) -> Result<(), DieselError> {
        let accession = accession.to_string();
        let file_path = file_path.to_string();
        let content_hash = content_hash.to_string();
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            let now = Utc::now().to_rfc3339();
            diesel::update(filings::table.find(&accession))
                .set((
                    filings::download_status.eq(DownloadStatus::Validated.as_str()),
                    filings::file_path.eq(Some(&file_path)),
                    filings::content_hash.eq(Some(&content_hash)),
                    filings::last_error.eq(None::<String>),
                    filings::updated_at.eq(&now),
                ))
                .execute(conn)?;
            Ok(())
        })
        .await
    }

    /// Mark a filing as rejected by validation. Terminal: re-validating
    /// the same bytes cannot change the outcome without a code change.
    pub async fn mark_rejected(&self, accession: &str, reason: &str) -> Result<(), DieselError> {
        let accession = accession.to_string();
        let reason = reason.to_string();
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            let now = Utc::now().to_rfc3339();
            diesel::update(filings::table.find(&accession))
                .set((
                    filings::download_status.eq(DownloadStatus::Rejected.as_str()),
                    filings::validation_reason.eq(Some(&reason)),
                    filings::updated_at.eq(&now),
                ))
                .execute(conn)?;
            Ok(())
        })
        .await
    }

    /// Record a download failure. While retries remain the filing drops
    /// back to `discovered` for a later attempt; otherwise `failed` is
    /// terminal. Returns the resulting status.
    pub async fn mark_failed(
        &self,
        accession: &str,
        error: &str,
        retryable: bool,
        max_retries: u32,
    ) -> Result<DownloadStatus, DieselError> {
        let accession = accession.to_string();
        let error = error.to_string();
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            let now = Utc::now().to_rfc3339();
            let record: FilingRecord = filings::table.find(&accession).first(conn)?;
            let retries = record.retry_count.max(0) as u32 + 1;
            let next = if retryable && retries < max_retries {
                DownloadStatus::Discovered
            } else {
                DownloadStatus::Failed
            };

            diesel::update(filings::table.find(&accession))
                .set((
                    filings::download_status.eq(next.as_str()),
                    filings::retry_count.eq(retries as i32),
                    filings::last_error.eq(Some(&error)),
                    filings::updated_at.eq(&now),
                ))
                .execute(conn)?;
            Ok(next)
        })
        .await
    }

    /// Re-queue filings left `downloading` by an interrupted run.
    /// Returns the number of filings reclaimed.
    pub async fn reclaim_interrupted(&self) -> Result<usize, DieselError> {
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            let now = Utc::now().to_rfc3339();
            let rows = diesel::update(
                filings::table
                    .filter(filings::download_status.eq(DownloadStatus::Downloading.as_str())),
            )
            .set((
                filings::download_status.eq(DownloadStatus::Discovered.as_str()),
                filings::updated_at.eq(&now),
            ))
            .execute(conn)?;
            Ok(rows)
        })
        .await
    }

    /// Per-status filing counts for run summaries.
    pub async fn counts_by_status(&self) -> Result<HashMap<String, u64>, DieselError> {
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            use diesel::dsl::count_star;
            let rows: Vec<(String, i64)> = filings::table
                .group_by(filings::download_status)
                .select((filings::download_status, count_star()))
                .load(conn)?;
            Ok(rows.into_iter().map(|(s, n)| (s, n as u64)).collect())
        })
        .await
    }

    /// The most recent validated filing for each company, by filing date.
    pub async fn latest_validated_per_company(&self) -> Result<Vec<Filing>, DieselError> {
        let pool = self.pool.clone();

        let records = run_blocking(pool, move |conn| {
            filings::table
                .filter(filings::download_status.eq(DownloadStatus::Validated.as_str()))
                .order((filings::cik.asc(), filings::filing_date.desc()))
                .load::<FilingRecord>(conn)
        })
        .await?;

        // Rows arrive grouped by cik with the newest filing first.
        let mut latest: Vec<Filing> = Vec::new();
        for record in records {
            if latest.last().map(|f: &Filing| f.cik.as_str()) != Some(record.cik.as_str()) {
                latest.push(Filing::from(record));
            }
        }
        Ok(latest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::test_support::setup_test_db;
    use crate::repository::DieselCompanyRepository;
    use crate::models::Company;

    async fn seed_filing(repo: &DieselFilingRepository, pool: &SqlitePool, accession: &str) {
        DieselCompanyRepository::new(pool.clone())
            .upsert(&Company::new("320193"))
            .await
            .unwrap();
        let filing = Filing::discovered(
            accession,
            "320193",
            "DEF 14A",
            "2024-04-15",
            format!("https://www.sec.gov/Archives/{accession}-index.htm"),
        );
        repo.upsert_discovered(&filing).await.unwrap();
    }

    #[tokio::test]
    async fn discovery_is_idempotent() {
        let (pool, _dir) = setup_test_db().await;
        let repo = DieselFilingRepository::new(pool.clone());
        seed_filing(&repo, &pool, "0001-24-000001").await;

        let filing = repo.get("0001-24-000001").await.unwrap().unwrap();
        let again = repo.upsert_discovered(&filing).await.unwrap();
        assert!(!again, "second discovery must not insert");

        // A terminal outcome survives re-discovery
        repo.mark_rejected("0001-24-000001", "missing marker")
            .await
            .unwrap();
        repo.upsert_discovered(&filing).await.unwrap();
        let after = repo.get("0001-24-000001").await.unwrap().unwrap();
        assert_eq!(after.download_status, DownloadStatus::Rejected);
    }

    #[tokio::test]
    async fn claim_is_exclusive() {
        let (pool, _dir) = setup_test_db().await;
        let repo = DieselFilingRepository::new(pool.clone());
        seed_filing(&repo, &pool, "0001-24-000002").await;

        assert!(repo.claim_for_download("0001-24-000002").await.unwrap());
        // Second claim loses: the filing is no longer `discovered`
        assert!(!repo.claim_for_download("0001-24-000002").await.unwrap());
    }

    #[tokio::test]
    async fn failure_requeues_until_ceiling() {
        let (pool, _dir) = setup_test_db().await;
        let repo = DieselFilingRepository::new(pool.clone());
        seed_filing(&repo, &pool, "0001-24-000003").await;

        let status = repo
            .mark_failed("0001-24-000003", "timeout", true, 3)
            .await
            .unwrap();
        assert_eq!(status, DownloadStatus::Discovered);
        let status = repo
            .mark_failed("0001-24-000003", "timeout", true, 3)
            .await
            .unwrap();
        assert_eq!(status, DownloadStatus::Discovered);
        let status = repo
            .mark_failed("0001-24-000003", "timeout", true, 3)
            .await
            .unwrap();
        assert_eq!(status, DownloadStatus::Failed);

        let filing = repo.get("0001-24-000003").await.unwrap().unwrap();
        assert_eq!(filing.retry_count, 3);
        assert_eq!(filing.last_error.as_deref(), Some("timeout"));
    }

    #[tokio::test]
    async fn non_retryable_failure_is_terminal_immediately() {
        let (pool, _dir) = setup_test_db().await;
        let repo = DieselFilingRepository::new(pool.clone());
        seed_filing(&repo, &pool, "0001-24-000004").await;

        let status = repo
            .mark_failed("0001-24-000004", "not found", false, 3)
            .await
            .unwrap();
        assert_eq!(status, DownloadStatus::Failed);
    }

    #[tokio::test]
    async fn interrupted_downloads_are_reclaimed() {
        let (pool, _dir) = setup_test_db().await;
        let repo = DieselFilingRepository::new(pool.clone());
        seed_filing(&repo, &pool, "0001-24-000005").await;

        repo.claim_for_download("0001-24-000005").await.unwrap();
        let reclaimed = repo.reclaim_interrupted().await.unwrap();
        assert_eq!(reclaimed, 1);

        let filing = repo.get("0001-24-000005").await.unwrap().unwrap();
        assert_eq!(filing.download_status, DownloadStatus::Discovered);
    }

    #[tokio::test]
    async fn latest_validated_picks_newest_per_company() {
        let (pool, _dir) = setup_test_db().await;
        let repo = DieselFilingRepository::new(pool.clone());
        seed_filing(&repo, &pool, "0001-23-000001").await;
        seed_filing(&repo, &pool, "0001-24-000001").await;

        // Make the 2023 filing's date older than the 2024 one
        repo.mark_validated("0001-23-000001", "/tmp/a.htm", "aa")
            .await
            .unwrap();
        repo.mark_validated("0001-24-000001", "/tmp/b.htm", "bb")
            .await
            .unwrap();

        let latest = repo.latest_validated_per_company().await.unwrap();
        assert_eq!(latest.len(), 1);
    }
}
