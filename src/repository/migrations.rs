//! Embedded schema migrations.
//!
//! The schema is small enough to ship as a single idempotent DDL batch,
//! applied through Diesel on startup. `CREATE TABLE IF NOT EXISTS` keeps
//! re-runs safe against an existing ledger.

use diesel::prelude::*;

use super::diesel_pool::{run_blocking, DieselError, SqlitePool};

const SCHEMA_DDL: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS companies (
        cik TEXT PRIMARY KEY NOT NULL,
        name TEXT,
        last_scraped TEXT
    )"#,
    r#"CREATE TABLE IF NOT EXISTS filings (
        accession TEXT PRIMARY KEY NOT NULL,
        cik TEXT NOT NULL REFERENCES companies(cik),
        filing_type TEXT NOT NULL,
        filing_date TEXT NOT NULL,
        source_url TEXT NOT NULL,
        file_path TEXT,
        download_status TEXT NOT NULL DEFAULT 'discovered',
        validation_reason TEXT,
        content_hash TEXT,
        retry_count INTEGER NOT NULL DEFAULT 0,
        last_error TEXT,
        discovered_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )"#,
    r#"CREATE INDEX IF NOT EXISTS idx_filings_status ON filings(download_status)"#,
    r#"CREATE INDEX IF NOT EXISTS idx_filings_cik ON filings(cik)"#,
    r#"CREATE TABLE IF NOT EXISTS processing_status (
        accession TEXT PRIMARY KEY NOT NULL REFERENCES filings(accession),
        status TEXT NOT NULL DEFAULT 'pending',
        attempts INTEGER NOT NULL DEFAULT 0,
        last_error TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS executives (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        accession TEXT NOT NULL REFERENCES filings(accession),
        name TEXT NOT NULL,
        current_role TEXT NOT NULL,
        age INTEGER,
        compensation_salary DOUBLE,
        compensation_bonus DOUBLE,
        compensation_stock DOUBLE,
        compensation_options DOUBLE,
        compensation_other DOUBLE,
        compensation_total DOUBLE,
        compensation_year INTEGER,
        start_date TEXT,
        past_roles TEXT NOT NULL DEFAULT '[]',
        education TEXT NOT NULL DEFAULT '[]',
        board_member INTEGER NOT NULL DEFAULT 0,
        committee_memberships TEXT NOT NULL DEFAULT '[]',
        other_board_memberships TEXT NOT NULL DEFAULT '[]',
        notable_achievements TEXT,
        extracted_at TEXT NOT NULL
    )"#,
    r#"CREATE INDEX IF NOT EXISTS idx_executives_accession ON executives(accession)"#,
];

/// Apply the schema to the given pool. Connection pragmas are handled
/// by the pool itself on acquisition.
pub async fn run_migrations(pool: SqlitePool) -> Result<(), DieselError> {
    run_blocking(pool, |conn| {
        for ddl in SCHEMA_DDL {
            diesel::sql_query(*ddl).execute(conn)?;
        }
        Ok(())
    })
    .await
}
