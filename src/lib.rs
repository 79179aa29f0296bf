//! Acquisition and extraction of executive-compensation data from SEC
//! EDGAR proxy statements.
//!
//! The pipeline runs in two decoupled stages sharing one SQLite ledger:
//! rate-limited download-and-validate, then model-assisted extraction of
//! structured executive records from stored filings. Either stage can be
//! interrupted and resumed; the ledger's atomic claims make re-runs
//! idempotent.

pub mod config;
pub mod error;
pub mod export;
pub mod llm;
pub mod models;
pub mod repository;
pub mod schema;
pub mod scrapers;
pub mod services;
pub mod validate;

pub use config::{Config, Settings};
pub use error::{ExtractError, FetchError, LlmError};
