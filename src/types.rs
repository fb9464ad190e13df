use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// A single user record as returned from the remote API: the three required
/// fields plus arbitrary extra fields passed through unmodified.
pub type UserRecord = serde_json::Map<String, serde_json::Value>;

/// Fields every record must carry to survive validation.
pub const REQUIRED_FIELDS: [&str; 3] = ["user_id", "email", "phone"];

/// A raw ingested snapshot: the records as captured plus where they came from.
#[derive(Debug, Clone)]
pub struct RawBatch {
    pub records: Vec<UserRecord>,
    pub filename: String,
    pub captured_at: DateTime<Utc>,
}

/// Output format for the cleaned batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Csv,
    Parquet,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Csv => "csv",
            OutputFormat::Parquet => "parquet",
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

/// Per-run cleaning counters. Derived during transform and reported to the
/// operator; never persisted.
///
/// Records dropped for an empty cleaned phone are intentionally not counted
/// separately; they only show up in the difference between the other counters
/// and `final_count`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunMetrics {
    pub total_ingested: usize,
    pub removed_missing: usize,
    pub removed_bad_emails: usize,
    pub removed_duplicates: usize,
    pub final_count: usize,
}
