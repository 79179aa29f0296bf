//! Service layer: the download and extraction orchestrators.
//!
//! Services hold domain logic separated from CLI concerns; all
//! cross-worker coordination goes through the ledger's atomic claims.

pub mod download;
pub mod extract;

pub use download::{DownloadConfig, DownloadService, DownloadSummary};
pub use extract::{ExtractConfig, ExtractSummary, ExtractionService};
