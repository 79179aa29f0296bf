//! Persistent progress ledger backed by SQLite through Diesel.
//!
//! Every stage of the pipeline reads and writes its state here; the
//! atomic claim operations are the only cross-worker coordination in the
//! system.

pub mod diesel_company;
pub mod diesel_extraction;
pub mod diesel_filing;
pub mod diesel_models;
pub mod diesel_pool;
pub mod migrations;

pub use diesel_company::DieselCompanyRepository;
pub use diesel_extraction::DieselExtractionRepository;
pub use diesel_filing::DieselFilingRepository;
pub use diesel_pool::{create_pool, create_pool_from_url, SqlitePool};

use chrono::{DateTime, Utc};

/// Parse an RFC 3339 timestamp stored as TEXT, falling back to the epoch
/// for rows written by hand or by older versions.
pub(crate) fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| DateTime::<Utc>::UNIX_EPOCH)
}

pub(crate) fn parse_datetime_opt(s: Option<String>) -> Option<DateTime<Utc>> {
    s.as_deref().map(parse_datetime)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Create a temporary SQLite database with the schema applied.
    pub async fn setup_test_db() -> (SqlitePool, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let db_path = dir.path().join("test.db");

        let pool = create_pool(&db_path).expect("Failed to create pool");
        migrations::run_migrations(pool.clone())
            .await
            .expect("Failed to run migrations");

        (pool, dir)
    }
}
