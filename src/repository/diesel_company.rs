//! Diesel-based company repository for SQLite.

use chrono::{DateTime, Utc};
use diesel::prelude::*;

use super::diesel_models::{CompanyRecord, NewCompany};
use super::diesel_pool::{run_blocking, DieselError, SqlitePool};
use super::parse_datetime_opt;
use crate::models::{normalize_cik, Company};
use crate::schema::companies;

impl From<CompanyRecord> for Company {
    fn from(record: CompanyRecord) -> Self {
        Company {
            cik: record.cik,
            name: record.name,
            last_scraped: parse_datetime_opt(record.last_scraped),
        }
    }
}

/// Diesel-based company repository with compile-time query checking.
#[derive(Clone)]
pub struct DieselCompanyRepository {
    pool: SqlitePool,
}

impl DieselCompanyRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get a company by CIK.
    pub async fn get(&self, cik: &str) -> Result<Option<Company>, DieselError> {
        let cik = normalize_cik(cik);
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            companies::table
                .find(&cik)
                .first::<CompanyRecord>(conn)
                .optional()
        })
        .await
        .map(|opt| opt.map(Company::from))
    }

    /// Get all known companies ordered by CIK.
    pub async fn get_all(&self) -> Result<Vec<Company>, DieselError> {
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            companies::table
                .order(companies::cik.asc())
                .load::<CompanyRecord>(conn)
        })
        .await
        .map(|records| records.into_iter().map(Company::from).collect())
    }

    /// Insert a company or backfill its name. The row is created on first
    /// reference and never deleted; the name is the only mutable field.
    pub async fn upsert(&self, company: &Company) -> Result<(), DieselError> {
        let cik = normalize_cik(&company.cik);
        let name = company.name.clone();
        let last_scraped = company.last_scraped.map(|dt| dt.to_rfc3339());
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            let inserted = diesel::insert_or_ignore_into(companies::table)
                .values(NewCompany {
                    cik: &cik,
                    name: name.as_deref(),
                    last_scraped: last_scraped.as_deref(),
                })
                .execute(conn)?;

            // Row already existed: backfill the name if we have one now.
            if inserted == 0 {
                if let Some(ref name) = name {
                    diesel::update(
                        companies::table
                            .find(&cik)
                            .filter(companies::name.is_null()),
                    )
                    .set(companies::name.eq(name))
                    .execute(conn)?;
                }
            }
            Ok(())
        })
        .await
    }

    /// Bulk-load the ticker file: every (cik, name) pair upserted.
    pub async fn upsert_names(&self, entries: Vec<(String, String)>) -> Result<usize, DieselError> {
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            conn.transaction::<_, DieselError, _>(|conn| {
                let mut count = 0;
                for (cik, name) in &entries {
                    let cik = normalize_cik(cik);
                    let inserted = diesel::insert_or_ignore_into(companies::table)
                        .values(NewCompany {
                            cik: &cik,
                            name: Some(name),
                            last_scraped: None,
                        })
                        .execute(conn)?;
                    if inserted == 0 {
                        diesel::update(companies::table.find(&cik))
                            .set(companies::name.eq(name))
                            .execute(conn)?;
                    }
                    count += 1;
                }
                Ok(count)
            })
        })
        .await
    }

    /// Update the last-scraped timestamp after a listing pass.
    pub async fn touch_last_scraped(
        &self,
        cik: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<(), DieselError> {
        let cik = normalize_cik(cik);
        let ts = timestamp.to_rfc3339();
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            diesel::update(companies::table.find(&cik))
                .set(companies::last_scraped.eq(Some(&ts)))
                .execute(conn)?;
            Ok(())
        })
        .await
    }

    /// Count all companies.
    pub async fn count(&self) -> Result<u64, DieselError> {
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            use diesel::dsl::count_star;
            let count: i64 = companies::table.select(count_star()).first(conn)?;
            Ok(count as u64)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::test_support::setup_test_db;

    #[tokio::test]
    async fn upsert_creates_then_backfills_name() {
        let (pool, _dir) = setup_test_db().await;
        let repo = DieselCompanyRepository::new(pool);

        // First reference has no name yet
        repo.upsert(&Company::new("320193")).await.unwrap();
        let company = repo.get("320193").await.unwrap().unwrap();
        assert_eq!(company.cik, "0000320193");
        assert!(company.name.is_none());

        // Backfill from the ticker file
        repo.upsert(&Company::new("320193").with_name("Apple Inc."))
            .await
            .unwrap();
        let company = repo.get("320193").await.unwrap().unwrap();
        assert_eq!(company.name.as_deref(), Some("Apple Inc."));

        // Re-running the same upsert changes nothing
        repo.upsert(&Company::new("320193").with_name("Apple Inc."))
            .await
            .unwrap();
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn upsert_names_loads_ticker_entries() {
        let (pool, _dir) = setup_test_db().await;
        let repo = DieselCompanyRepository::new(pool);

        let loaded = repo
            .upsert_names(vec![
                ("320193".to_string(), "Apple Inc.".to_string()),
                ("789019".to_string(), "Microsoft Corp".to_string()),
            ])
            .await
            .unwrap();
        assert_eq!(loaded, 2);
        assert_eq!(repo.count().await.unwrap(), 2);

        let all = repo.get_all().await.unwrap();
        assert_eq!(all[0].cik, "0000320193");
    }
}
