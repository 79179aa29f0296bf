//! Diesel-based extraction ledger for SQLite.
//!
//! Tracks per-filing extraction state and stores the extracted executive
//! records. Status transitions and their associated data writes commit in
//! one transaction, so a crash can never leave records without a
//! `succeeded` status or vice versa.

use std::collections::HashMap;

use chrono::Utc;
use diesel::prelude::*;

use super::diesel_models::{
    CompanyRecord, ExecutiveRecord, FilingRecord, NewExecutive, NewProcessingStatus,
    ProcessingStatusRecord,
};
use super::diesel_pool::{run_blocking, DieselError, SqlitePool};
use super::parse_datetime;
use crate::models::{DownloadStatus, Executive, Filing, ProcessingState, ProcessingStatus};
use crate::schema::{companies, executives, filings, processing_status};

impl From<ProcessingStatusRecord> for ProcessingStatus {
    fn from(record: ProcessingStatusRecord) -> Self {
        ProcessingStatus {
            accession: record.accession,
            state: ProcessingState::from_str(&record.status)
                .unwrap_or(ProcessingState::FailedPermanent),
            attempts: record.attempts.max(0) as u32,
            last_error: record.last_error,
            created_at: parse_datetime(&record.created_at),
            updated_at: parse_datetime(&record.updated_at),
        }
    }
}

impl From<ExecutiveRecord> for Executive {
    fn from(record: ExecutiveRecord) -> Self {
        Executive {
            name: record.name,
            current_role: record.current_role,
            age: record.age,
            compensation_salary: record.compensation_salary,
            compensation_bonus: record.compensation_bonus,
            compensation_stock: record.compensation_stock,
            compensation_options: record.compensation_options,
            compensation_other: record.compensation_other,
            compensation_total: record.compensation_total,
            compensation_year: record.compensation_year,
            start_date: record.start_date,
            past_roles: serde_json::from_str(&record.past_roles).unwrap_or_default(),
            education: serde_json::from_str(&record.education).unwrap_or_default(),
            board_member: record.board_member != 0,
            committee_memberships: serde_json::from_str(&record.committee_memberships)
                .unwrap_or_default(),
            other_board_memberships: serde_json::from_str(&record.other_board_memberships)
                .unwrap_or_default(),
            notable_achievements: record.notable_achievements,
        }
    }
}

/// One exported row: an executive with its filing and company context.
#[derive(Debug, Clone)]
pub struct ExecutiveRow {
    pub executive: Executive,
    pub accession: String,
    pub cik: String,
    pub company_name: Option<String>,
    pub filing_date: String,
}

/// Diesel-based extraction ledger with compile-time query checking.
#[derive(Clone)]
pub struct DieselExtractionRepository {
    pool: SqlitePool,
}

impl DieselExtractionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get the processing status for a filing, if any attempt was made.
    pub async fn get_status(
        &self,
        accession: &str,
    ) -> Result<Option<ProcessingStatus>, DieselError> {
        let accession = accession.to_string();
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            processing_status::table
                .find(&accession)
                .first::<ProcessingStatusRecord>(conn)
                .optional()
        })
        .await
        .map(|opt| opt.map(ProcessingStatus::from))
    }

    /// Validated filings whose extraction has not yet succeeded or failed
    /// permanently: no status row yet, `pending`, or `failed_retryable`.
    pub async fn extraction_candidates(&self) -> Result<Vec<Filing>, DieselError> {
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            filings::table
                .left_outer_join(processing_status::table)
                .filter(filings::download_status.eq(DownloadStatus::Validated.as_str()))
                .filter(
                    processing_status::status
                        .is_null()
                        .or(processing_status::status.eq_any([
                            ProcessingState::Pending.as_str(),
                            ProcessingState::FailedRetryable.as_str(),
                        ])),
                )
                .order(filings::filing_date.desc())
                .select(FilingRecord::as_select())
                .load::<FilingRecord>(conn)
        })
        .await
        .map(|records| records.into_iter().map(Filing::from).collect())
    }

    /// Atomically claim a filing for extraction.
    ///
    /// Creates the status row lazily -- only for a `validated` filing, so
    /// the one-row-per-validated-filing invariant holds -- then moves
    /// `pending`/`failed_retryable` to `in_progress`. Returns true iff
    /// this caller won the claim.
    pub async fn claim_for_extraction(&self, accession: &str) -> Result<bool, DieselError> {
        let accession = accession.to_string();
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            conn.transaction::<_, DieselError, _>(|conn| {
                let now = Utc::now().to_rfc3339();

                let validated: i64 = filings::table
                    .filter(filings::accession.eq(&accession))
                    .filter(filings::download_status.eq(DownloadStatus::Validated.as_str()))
                    .count()
                    .first(conn)?;
                if validated == 0 {
                    return Ok(false);
                }

                diesel::insert_or_ignore_into(processing_status::table)
                    .values(NewProcessingStatus {
                        accession: &accession,
                        status: ProcessingState::Pending.as_str(),
                        attempts: 0,
                        last_error: None,
                        created_at: &now,
                        updated_at: &now,
                    })
                    .execute(conn)?;

                let rows = diesel::update(
                    processing_status::table.find(&accession).filter(
                        processing_status::status.eq_any([
                            ProcessingState::Pending.as_str(),
                            ProcessingState::FailedRetryable.as_str(),
                        ]),
                    ),
                )
                .set((
                    processing_status::status.eq(ProcessingState::InProgress.as_str()),
                    processing_status::updated_at.eq(&now),
                ))
                .execute(conn)?;

                Ok(rows == 1)
            })
        })
        .await
    }

    /// Persist extracted executives and mark the filing `succeeded`, in
    /// one transaction. Replaces any records from an earlier attempt.
    pub async fn complete_extraction(
        &self,
        accession: &str,
        records: &[Executive],
    ) -> Result<(), DieselError> {
        let accession = accession.to_string();
        let records = records.to_vec();
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            conn.transaction::<_, DieselError, _>(|conn| {
                let now = Utc::now().to_rfc3339();

                diesel::delete(executives::table.filter(executives::accession.eq(&accession)))
                    .execute(conn)?;

                for exec in &records {
                    let past_roles = serde_json::to_string(&exec.past_roles)
                        .unwrap_or_else(|_| "[]".to_string());
                    let education = serde_json::to_string(&exec.education)
                        .unwrap_or_else(|_| "[]".to_string());
                    let committees = serde_json::to_string(&exec.committee_memberships)
                        .unwrap_or_else(|_| "[]".to_string());
                    let other_boards = serde_json::to_string(&exec.other_board_memberships)
                        .unwrap_or_else(|_| "[]".to_string());

                    diesel::insert_into(executives::table)
                        .values(NewExecutive {
                            accession: &accession,
                            name: &exec.name,
                            current_role: &exec.current_role,
                            age: exec.age,
                            compensation_salary: exec.compensation_salary,
                            compensation_bonus: exec.compensation_bonus,
                            compensation_stock: exec.compensation_stock,
                            compensation_options: exec.compensation_options,
                            compensation_other: exec.compensation_other,
                            compensation_total: exec.compensation_total,
                            compensation_year: exec.compensation_year,
                            start_date: exec.start_date.as_deref(),
                            past_roles: &past_roles,
                            education: &education,
                            board_member: exec.board_member as i32,
                            committee_memberships: &committees,
                            other_board_memberships: &other_boards,
                            notable_achievements: exec.notable_achievements.as_deref(),
                            extracted_at: &now,
                        })
                        .execute(conn)?;
                }

                diesel::update(processing_status::table.find(&accession))
                    .set((
                        processing_status::status.eq(ProcessingState::Succeeded.as_str()),
                        processing_status::attempts.eq(processing_status::attempts + 1),
                        processing_status::last_error.eq(None::<String>),
                        processing_status::updated_at.eq(&now),
                    ))
                    .execute(conn)?;

                Ok(())
            })
        })
        .await
    }

    /// Record an extraction failure. Retryable failures stay retryable
    /// until the attempt ceiling; everything else is permanent. Returns
    /// the resulting state.
    pub async fn fail_extraction(
        &self,
        accession: &str,
        error: &str,
        retryable: bool,
        max_attempts: u32,
    ) -> Result<ProcessingState, DieselError> {
        let accession = accession.to_string();
        let error = error.to_string();
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            let now = Utc::now().to_rfc3339();
            let record: ProcessingStatusRecord =
                processing_status::table.find(&accession).first(conn)?;
            let attempts = record.attempts.max(0) as u32 + 1;
            let next = if retryable && attempts < max_attempts {
                ProcessingState::FailedRetryable
            } else {
                ProcessingState::FailedPermanent
            };

            diesel::update(processing_status::table.find(&accession))
                .set((
                    processing_status::status.eq(next.as_str()),
                    processing_status::attempts.eq(attempts as i32),
                    processing_status::last_error.eq(Some(&error)),
                    processing_status::updated_at.eq(&now),
                ))
                .execute(conn)?;
            Ok(next)
        })
        .await
    }

    /// Re-queue status rows left `in_progress` by an interrupted run.
    pub async fn reclaim_interrupted(&self) -> Result<usize, DieselError> {
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            let now = Utc::now().to_rfc3339();
            let rows = diesel::update(
                processing_status::table
                    .filter(processing_status::status.eq(ProcessingState::InProgress.as_str())),
            )
            .set((
                processing_status::status.eq(ProcessingState::FailedRetryable.as_str()),
                processing_status::last_error.eq(Some("interrupted")),
                processing_status::updated_at.eq(&now),
            ))
            .execute(conn)?;
            Ok(rows)
        })
        .await
    }

    /// Executives stored for one filing.
    pub async fn executives_for(&self, accession: &str) -> Result<Vec<Executive>, DieselError> {
        let accession = accession.to_string();
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            executives::table
                .filter(executives::accession.eq(&accession))
                .order(executives::id.asc())
                .load::<ExecutiveRecord>(conn)
        })
        .await
        .map(|records| records.into_iter().map(Executive::from).collect())
    }

    /// All stored executives joined with filing and company context.
    pub async fn export_rows(&self) -> Result<Vec<ExecutiveRow>, DieselError> {
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            let rows: Vec<(ExecutiveRecord, (FilingRecord, CompanyRecord))> = executives::table
                .inner_join(filings::table.inner_join(companies::table))
                .order((filings::cik.asc(), filings::filing_date.desc()))
                .select((
                    ExecutiveRecord::as_select(),
                    (FilingRecord::as_select(), CompanyRecord::as_select()),
                ))
                .load(conn)?;
            Ok(rows)
        })
        .await
        .map(|rows| {
            rows.into_iter()
                .map(|(exec, (filing, company))| ExecutiveRow {
                    executive: Executive::from(exec),
                    accession: filing.accession,
                    cik: filing.cik,
                    company_name: company.name,
                    filing_date: filing.filing_date,
                })
                .collect()
        })
    }

    /// Per-state counts for run summaries.
    pub async fn counts_by_state(&self) -> Result<HashMap<String, u64>, DieselError> {
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            use diesel::dsl::count_star;
            let rows: Vec<(String, i64)> = processing_status::table
                .group_by(processing_status::status)
                .select((processing_status::status, count_star()))
                .load(conn)?;
            Ok(rows.into_iter().map(|(s, n)| (s, n as u64)).collect())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Company, Education, Filing};
    use crate::repository::test_support::setup_test_db;
    use crate::repository::{DieselCompanyRepository, DieselFilingRepository};

    async fn seed_validated(pool: &SqlitePool, accession: &str) {
        DieselCompanyRepository::new(pool.clone())
            .upsert(&Company::new("320193").with_name("Apple Inc."))
            .await
            .unwrap();
        let filings = DieselFilingRepository::new(pool.clone());
        filings
            .upsert_discovered(&Filing::discovered(
                accession,
                "320193",
                "DEF 14A",
                "2024-04-15",
                "https://www.sec.gov/Archives/x",
            ))
            .await
            .unwrap();
        filings
            .mark_validated(accession, "/tmp/f.htm", "deadbeef")
            .await
            .unwrap();
    }

    fn sample_executive() -> Executive {
        Executive {
            name: "Jane Smith".to_string(),
            current_role: "Chief Executive Officer".to_string(),
            age: Some(55),
            compensation_salary: Some(1_000_000.0),
            compensation_bonus: Some(2_000_000.0),
            compensation_stock: Some(5_000_000.0),
            compensation_options: None,
            compensation_other: Some(500_000.0),
            compensation_total: Some(8_500_000.0),
            compensation_year: Some(2023),
            start_date: Some("2015".to_string()),
            past_roles: vec!["COO".to_string()],
            education: vec![Education {
                degree: "MBA".to_string(),
                field: Some("Business Administration".to_string()),
                institution: "Harvard Business School".to_string(),
                year: Some(1990),
            }],
            board_member: true,
            committee_memberships: vec!["Executive Committee".to_string()],
            other_board_memberships: vec![],
            notable_achievements: None,
        }
    }

    #[tokio::test]
    async fn claim_requires_validated_filing() {
        let (pool, _dir) = setup_test_db().await;
        let repo = DieselExtractionRepository::new(pool.clone());

        // Filing exists but is only discovered
        DieselCompanyRepository::new(pool.clone())
            .upsert(&Company::new("1"))
            .await
            .unwrap();
        DieselFilingRepository::new(pool.clone())
            .upsert_discovered(&Filing::discovered(
                "0001-24-000010",
                "1",
                "DEF 14A",
                "2024-01-01",
                "https://example.invalid/a",
            ))
            .await
            .unwrap();

        assert!(!repo.claim_for_extraction("0001-24-000010").await.unwrap());
        // No status row was created for the unvalidated filing
        assert!(repo.get_status("0001-24-000010").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn claim_is_exclusive_and_resumable() {
        let (pool, _dir) = setup_test_db().await;
        seed_validated(&pool, "0001-24-000011").await;
        let repo = DieselExtractionRepository::new(pool.clone());

        assert!(repo.claim_for_extraction("0001-24-000011").await.unwrap());
        assert!(!repo.claim_for_extraction("0001-24-000011").await.unwrap());

        // Interruption makes it claimable again
        assert_eq!(repo.reclaim_interrupted().await.unwrap(), 1);
        assert!(repo.claim_for_extraction("0001-24-000011").await.unwrap());
    }

    #[tokio::test]
    async fn complete_persists_records_and_status_atomically() {
        let (pool, _dir) = setup_test_db().await;
        seed_validated(&pool, "0001-24-000012").await;
        let repo = DieselExtractionRepository::new(pool.clone());

        repo.claim_for_extraction("0001-24-000012").await.unwrap();
        repo.complete_extraction("0001-24-000012", &[sample_executive()])
            .await
            .unwrap();

        let status = repo.get_status("0001-24-000012").await.unwrap().unwrap();
        assert_eq!(status.state, ProcessingState::Succeeded);
        assert_eq!(status.attempts, 1);

        let execs = repo.executives_for("0001-24-000012").await.unwrap();
        assert_eq!(execs.len(), 1);
        assert_eq!(execs[0].name, "Jane Smith");
        assert_eq!(execs[0].education[0].institution, "Harvard Business School");

        // Succeeded filings are no longer candidates
        assert!(repo.extraction_candidates().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failure_classification_and_ceiling() {
        let (pool, _dir) = setup_test_db().await;
        seed_validated(&pool, "0001-24-000013").await;
        let repo = DieselExtractionRepository::new(pool.clone());

        repo.claim_for_extraction("0001-24-000013").await.unwrap();
        let state = repo
            .fail_extraction("0001-24-000013", "model timeout", true, 3)
            .await
            .unwrap();
        assert_eq!(state, ProcessingState::FailedRetryable);

        repo.claim_for_extraction("0001-24-000013").await.unwrap();
        let state = repo
            .fail_extraction("0001-24-000013", "no relevant section", false, 3)
            .await
            .unwrap();
        assert_eq!(state, ProcessingState::FailedPermanent);

        // Permanent failures are not candidates
        assert!(repo.extraction_candidates().await.unwrap().is_empty());
        assert!(!repo.claim_for_extraction("0001-24-000013").await.unwrap());
    }

    #[tokio::test]
    async fn export_rows_join_company_context() {
        let (pool, _dir) = setup_test_db().await;
        seed_validated(&pool, "0001-24-000014").await;
        let repo = DieselExtractionRepository::new(pool.clone());

        repo.claim_for_extraction("0001-24-000014").await.unwrap();
        repo.complete_extraction("0001-24-000014", &[sample_executive()])
            .await
            .unwrap();

        let rows = repo.export_rows().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].cik, "0000320193");
        assert_eq!(rows[0].company_name.as_deref(), Some("Apple Inc."));
        assert_eq!(rows[0].executive.name, "Jane Smith");
    }
}
