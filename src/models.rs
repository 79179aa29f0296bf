//! Domain models for companies, filings, and extracted executives.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A company known to the archive, keyed by its zero-padded CIK.
#[derive(Debug, Clone)]
pub struct Company {
    /// Zero-padded 10-digit central index key.
    pub cik: String,
    /// Display name; backfilled from the ticker file, may lag discovery.
    pub name: Option<String>,
    pub last_scraped: Option<DateTime<Utc>>,
}

impl Company {
    pub fn new(cik: impl Into<String>) -> Self {
        Self {
            cik: normalize_cik(&cik.into()),
            name: None,
            last_scraped: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Zero-pad a CIK to the archive's fixed 10-digit form.
pub fn normalize_cik(cik: &str) -> String {
    let digits: String = cik.chars().filter(|c| c.is_ascii_digit()).collect();
    format!("{:0>10}", digits)
}

/// Fetch state machine for a filing.
///
/// `discovered -> downloading -> {validated, rejected, failed}`; a failed
/// filing re-enters `discovered` while retries remain. `rejected` and
/// retry-exhausted `failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadStatus {
    Discovered,
    Downloading,
    Validated,
    Rejected,
    Failed,
}

impl DownloadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DownloadStatus::Discovered => "discovered",
            DownloadStatus::Downloading => "downloading",
            DownloadStatus::Validated => "validated",
            DownloadStatus::Rejected => "rejected",
            DownloadStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "discovered" => Some(DownloadStatus::Discovered),
            "downloading" => Some(DownloadStatus::Downloading),
            "validated" => Some(DownloadStatus::Validated),
            "rejected" => Some(DownloadStatus::Rejected),
            "failed" => Some(DownloadStatus::Failed),
            _ => None,
        }
    }

    /// Terminal states are never re-attempted by a later run.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DownloadStatus::Validated | DownloadStatus::Rejected | DownloadStatus::Failed
        )
    }
}

/// One regulatory filing, keyed by the archive's accession identifier.
#[derive(Debug, Clone)]
pub struct Filing {
    pub accession: String,
    pub cik: String,
    pub filing_type: String,
    pub filing_date: String,
    pub source_url: String,
    /// Local path once the document is stored; None until validated.
    pub file_path: Option<String>,
    pub download_status: DownloadStatus,
    /// Human-readable reason when status is `rejected`.
    pub validation_reason: Option<String>,
    /// SHA-256 of the stored bytes, hex encoded.
    pub content_hash: Option<String>,
    pub retry_count: u32,
    pub last_error: Option<String>,
    pub discovered_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Filing {
    pub fn discovered(
        accession: impl Into<String>,
        cik: impl Into<String>,
        filing_type: impl Into<String>,
        filing_date: impl Into<String>,
        source_url: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            accession: accession.into(),
            cik: normalize_cik(&cik.into()),
            filing_type: filing_type.into(),
            filing_date: filing_date.into(),
            source_url: source_url.into(),
            file_path: None,
            download_status: DownloadStatus::Discovered,
            validation_reason: None,
            content_hash: None,
            retry_count: 0,
            last_error: None,
            discovered_at: now,
            updated_at: now,
        }
    }
}

/// Extraction state for a validated filing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingState {
    Pending,
    InProgress,
    Succeeded,
    FailedRetryable,
    FailedPermanent,
}

impl ProcessingState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingState::Pending => "pending",
            ProcessingState::InProgress => "in_progress",
            ProcessingState::Succeeded => "succeeded",
            ProcessingState::FailedRetryable => "failed_retryable",
            ProcessingState::FailedPermanent => "failed_permanent",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ProcessingState::Pending),
            "in_progress" => Some(ProcessingState::InProgress),
            "succeeded" => Some(ProcessingState::Succeeded),
            "failed_retryable" => Some(ProcessingState::FailedRetryable),
            "failed_permanent" => Some(ProcessingState::FailedPermanent),
            _ => None,
        }
    }
}

/// One row per filing tracking the extraction stage.
#[derive(Debug, Clone)]
pub struct ProcessingStatus {
    pub accession: String,
    pub state: ProcessingState,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An education entry disclosed for an executive. Embedded in the
/// executive record; no independent identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Education {
    pub degree: String,
    #[serde(default)]
    pub field: Option<String>,
    #[serde(alias = "university", alias = "school")]
    pub institution: String,
    /// Graduation year; often undisclosed.
    #[serde(default)]
    pub year: Option<i32>,
}

/// A named executive officer extracted from one filing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Executive {
    pub name: String,
    pub current_role: String,
    #[serde(default)]
    pub age: Option<i32>,
    #[serde(default)]
    pub compensation_salary: Option<f64>,
    #[serde(default)]
    pub compensation_bonus: Option<f64>,
    #[serde(default)]
    pub compensation_stock: Option<f64>,
    #[serde(default)]
    pub compensation_options: Option<f64>,
    #[serde(default)]
    pub compensation_other: Option<f64>,
    #[serde(default)]
    pub compensation_total: Option<f64>,
    #[serde(default)]
    pub compensation_year: Option<i32>,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub past_roles: Vec<String>,
    #[serde(default)]
    pub education: Vec<Education>,
    #[serde(default)]
    pub board_member: bool,
    #[serde(default)]
    pub committee_memberships: Vec<String>,
    #[serde(default)]
    pub other_board_memberships: Vec<String>,
    #[serde(default)]
    pub notable_achievements: Option<String>,
}

impl Executive {
    /// Monetary components in a fixed order, for validation and export.
    pub fn compensation_components(&self) -> [Option<f64>; 6] {
        [
            self.compensation_salary,
            self.compensation_bonus,
            self.compensation_stock,
            self.compensation_options,
            self.compensation_other,
            self.compensation_total,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_cik_pads_to_ten_digits() {
        assert_eq!(normalize_cik("320193"), "0000320193");
        assert_eq!(normalize_cik("0000320193"), "0000320193");
    }

    #[test]
    fn download_status_round_trips() {
        for status in [
            DownloadStatus::Discovered,
            DownloadStatus::Downloading,
            DownloadStatus::Validated,
            DownloadStatus::Rejected,
            DownloadStatus::Failed,
        ] {
            assert_eq!(DownloadStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(DownloadStatus::from_str("bogus"), None);
    }

    #[test]
    fn terminal_states() {
        assert!(DownloadStatus::Validated.is_terminal());
        assert!(DownloadStatus::Rejected.is_terminal());
        assert!(!DownloadStatus::Discovered.is_terminal());
        assert!(!DownloadStatus::Downloading.is_terminal());
    }
}
