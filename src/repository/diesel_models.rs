//! Diesel ORM models for database tables.
//!
//! These models provide compile-time type checking for database operations.
//! For SQLite, operations are wrapped in spawn_blocking since diesel-async
//! only supports Postgres/MySQL.

use diesel::prelude::*;

use crate::schema;

/// Company record from the database.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::companies)]
#[diesel(primary_key(cik))]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct CompanyRecord {
    pub cik: String,
    pub name: Option<String>,
    pub last_scraped: Option<String>,
}

/// New company for insertion.
#[derive(Insertable, Debug)]
#[diesel(table_name = schema::companies)]
pub struct NewCompany<'a> {
    pub cik: &'a str,
    pub name: Option<&'a str>,
    pub last_scraped: Option<&'a str>,
}

/// Filing record from the database.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::filings)]
#[diesel(primary_key(accession))]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct FilingRecord {
    pub accession: String,
    pub cik: String,
    pub filing_type: String,
    pub filing_date: String,
    pub source_url: String,
    pub file_path: Option<String>,
    pub download_status: String,
    pub validation_reason: Option<String>,
    pub content_hash: Option<String>,
    pub retry_count: i32,
    pub last_error: Option<String>,
    pub discovered_at: String,
    pub updated_at: String,
}

/// New filing for insertion.
#[derive(Insertable, Debug)]
#[diesel(table_name = schema::filings)]
pub struct NewFiling<'a> {
    pub accession: &'a str,
    pub cik: &'a str,
    pub filing_type: &'a str,
    pub filing_date: &'a str,
    pub source_url: &'a str,
    pub file_path: Option<&'a str>,
    pub download_status: &'a str,
    pub validation_reason: Option<&'a str>,
    pub content_hash: Option<&'a str>,
    pub retry_count: i32,
    pub last_error: Option<&'a str>,
    pub discovered_at: &'a str,
    pub updated_at: &'a str,
}

/// Processing status record from the database.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::processing_status)]
#[diesel(primary_key(accession))]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ProcessingStatusRecord {
    pub accession: String,
    pub status: String,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// New processing status for insertion.
#[derive(Insertable, Debug)]
#[diesel(table_name = schema::processing_status)]
pub struct NewProcessingStatus<'a> {
    pub accession: &'a str,
    pub status: &'a str,
    pub attempts: i32,
    pub last_error: Option<&'a str>,
    pub created_at: &'a str,
    pub updated_at: &'a str,
}

/// Executive record from the database.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::executives)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ExecutiveRecord {
    pub id: i32,
    pub accession: String,
    pub name: String,
    pub current_role: String,
    pub age: Option<i32>,
    pub compensation_salary: Option<f64>,
    pub compensation_bonus: Option<f64>,
    pub compensation_stock: Option<f64>,
    pub compensation_options: Option<f64>,
    pub compensation_other: Option<f64>,
    pub compensation_total: Option<f64>,
    pub compensation_year: Option<i32>,
    pub start_date: Option<String>,
    pub past_roles: String,
    pub education: String,
    pub board_member: i32,
    pub committee_memberships: String,
    pub other_board_memberships: String,
    pub notable_achievements: Option<String>,
    pub extracted_at: String,
}

/// New executive for insertion.
#[derive(Insertable, Debug)]
#[diesel(table_name = schema::executives)]
pub struct NewExecutive<'a> {
    pub accession: &'a str,
    pub name: &'a str,
    pub current_role: &'a str,
    pub age: Option<i32>,
    pub compensation_salary: Option<f64>,
    pub compensation_bonus: Option<f64>,
    pub compensation_stock: Option<f64>,
    pub compensation_options: Option<f64>,
    pub compensation_other: Option<f64>,
    pub compensation_total: Option<f64>,
    pub compensation_year: Option<i32>,
    pub start_date: Option<&'a str>,
    pub past_roles: &'a str,
    pub education: &'a str,
    pub board_member: i32,
    pub committee_memberships: &'a str,
    pub other_board_memberships: &'a str,
    pub notable_achievements: Option<&'a str>,
    pub extracted_at: &'a str,
}
