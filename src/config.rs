//! Configuration management.
//!
//! `Settings` is the resolved runtime configuration; `Config` is the
//! optional TOML file layered on top of defaults. Secrets (the archive
//! contact email, the model API key) come from the environment, loaded
//! via dotenvy by the binary.

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::llm::LlmConfig;

/// Application settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Base data directory.
    pub data_dir: PathBuf,
    /// Database filename.
    pub database_filename: String,
    /// Directory for storing filing documents.
    pub documents_dir: PathBuf,
    /// Contact email the archive's access policy requires.
    pub contact_email: String,
    /// Request timeout in seconds.
    pub request_timeout: u64,
    /// Minimum delay between archive requests in milliseconds.
    pub request_delay_ms: u64,
    /// Download attempts per request before giving up.
    pub max_retries: u32,
    /// Model service configuration.
    pub llm: LlmConfig,
}

impl Default for Settings {
    fn default() -> Self {
        // Default to ~/Documents/edgar/ for user data
        let data_dir = dirs::document_dir()
            .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
            .join("edgar");

        Self {
            documents_dir: data_dir.join("filings"),
            data_dir,
            database_filename: "edgaracquire.db".to_string(),
            contact_email: String::new(),
            request_timeout: 30,
            request_delay_ms: 100,
            max_retries: 3,
            llm: LlmConfig::default(),
        }
    }
}

impl Settings {
    /// Create settings with a custom data directory.
    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        Self {
            documents_dir: data_dir.join("filings"),
            data_dir,
            ..Default::default()
        }
    }

    /// Get the full path to the database.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.database_filename)
    }

    /// Ensure all directories exist.
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.data_dir)?;
        fs::create_dir_all(&self.documents_dir)?;
        Ok(())
    }

    /// Pull secrets from the environment: SEC_CONTACT_EMAIL is required
    /// by the archive, LLM_API_KEY by the model service.
    pub fn load_env(mut self) -> Self {
        if let Ok(email) = std::env::var("SEC_CONTACT_EMAIL") {
            self.contact_email = email;
        }
        if let Ok(key) = std::env::var("LLM_API_KEY") {
            self.llm.api_key = Some(key);
        }
        self
    }

    /// Layer a config file over these settings.
    pub fn apply(mut self, config: Config) -> Self {
        if let Some(target) = config.target {
            self.data_dir = PathBuf::from(&target);
            self.documents_dir = self.data_dir.join("filings");
        }
        if let Some(database) = config.database {
            self.database_filename = database;
        }
        if let Some(email) = config.contact_email {
            self.contact_email = email;
        }
        if let Some(timeout) = config.request_timeout {
            self.request_timeout = timeout;
        }
        if let Some(delay) = config.request_delay_ms {
            self.request_delay_ms = delay;
        }
        if let Some(retries) = config.max_retries {
            self.max_retries = retries;
        }
        if let Some(llm) = config.llm {
            let api_key = self.llm.api_key.take();
            self.llm = llm;
            // The key never lives in the config file
            if self.llm.api_key.is_none() {
                self.llm.api_key = api_key;
            }
        }
        self
    }
}

/// Configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Target directory for data.
    #[serde(default)]
    pub target: Option<String>,
    /// Database filename.
    #[serde(default)]
    pub database: Option<String>,
    /// Contact email for the archive's access policy.
    #[serde(default)]
    pub contact_email: Option<String>,
    /// Request timeout in seconds.
    #[serde(default)]
    pub request_timeout: Option<u64>,
    /// Minimum delay between requests in milliseconds.
    #[serde(default)]
    pub request_delay_ms: Option<u64>,
    /// Download retry ceiling.
    #[serde(default)]
    pub max_retries: Option<u32>,
    /// Model service configuration.
    #[serde(default)]
    pub llm: Option<LlmConfig>,
}

impl Config {
    /// Load a config file if it exists.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_respect_archive_policy() {
        let settings = Settings::default();
        assert_eq!(settings.request_delay_ms, 100);
        assert_eq!(settings.max_retries, 3);
    }

    #[test]
    fn config_file_overrides_defaults() {
        let config: Config = toml::from_str(
            r#"
            target = "/tmp/edgar-test"
            contact_email = "research@example.edu"
            request_delay_ms = 250

            [llm]
            model = "deepseek-chat"
            "#,
        )
        .unwrap();

        let settings = Settings::default().apply(config);
        assert_eq!(settings.data_dir, PathBuf::from("/tmp/edgar-test"));
        assert_eq!(settings.documents_dir, PathBuf::from("/tmp/edgar-test/filings"));
        assert_eq!(settings.contact_email, "research@example.edu");
        assert_eq!(settings.request_delay_ms, 250);
        assert_eq!(settings.request_timeout, 30);
    }

    #[test]
    fn api_key_survives_config_file_llm_section() {
        let mut settings = Settings::default();
        settings.llm.api_key = Some("from-env".to_string());

        let config: Config = toml::from_str("[llm]\nmodel = \"other-model\"\n").unwrap();
        let settings = settings.apply(config);
        assert_eq!(settings.llm.model, "other-model");
        assert_eq!(settings.llm.api_key.as_deref(), Some("from-env"));
    }
}
