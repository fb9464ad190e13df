use crate::error::Result;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Pipeline configuration, loaded from an optional TOML file.
///
/// Every field has a default so the binary runs with no config present.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Users listing endpoint queried during ingestion
    pub api_url: String,
    /// Directory holding raw ingested batches
    pub raw_dir: PathBuf,
    /// Directory holding cleaned tabular output
    pub processed_dir: PathBuf,
    /// Directory for rotating log files
    pub log_dir: PathBuf,
    /// Per-request network timeout in seconds
    pub request_timeout_secs: u64,
    /// Maximum ingestion attempts before giving up
    pub max_retries: u32,
    /// Backoff before the second attempt; doubles per attempt after that
    pub initial_backoff_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            api_url: "https://jsonplaceholder.typicode.com/users".to_string(),
            raw_dir: PathBuf::from("data/raw"),
            processed_dir: PathBuf::from("data/processed"),
            log_dir: PathBuf::from("logs"),
            request_timeout_secs: 5,
            max_retries: 5,
            initial_backoff_secs: 1,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from `path`, falling back to defaults when the
    /// file does not exist. A present-but-malformed file is an error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        let config: PipelineConfig = toml::from_str(&content)?;
        Ok(config)
    }
}
