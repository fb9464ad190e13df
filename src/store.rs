use crate::error::{PipelineError, Result};
use crate::types::{RawBatch, UserRecord};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info, warn};

const RAW_PREFIX: &str = "users_";
const RAW_SUFFIX: &str = ".json";
const MANIFEST_FILE: &str = "manifest.json";
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Persistence boundary for raw ingested batches.
pub trait RawStore: Send + Sync {
    /// Write a batch as a new timestamp-named document; refuses empty batches.
    fn save(&self, records: &[UserRecord]) -> Result<PathBuf>;

    /// Load the most recently captured batch, or `NoRawData` if none exists.
    fn load_most_recent(&self) -> Result<RawBatch>;
}

/// One entry per saved batch. The manifest carries explicit capture
/// timestamps so recency does not depend on filename sort order.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ManifestEntry {
    filename: String,
    captured_at: DateTime<Utc>,
}

/// Filesystem raw store: pretty-printed JSON arrays under a fixed directory,
/// `users_<YYYYMMDD_HHMMSS>.json`, with a manifest recording capture times.
pub struct FsRawStore {
    root: PathBuf,
}

impl FsRawStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn manifest_path(&self) -> PathBuf {
        self.root.join(MANIFEST_FILE)
    }

    fn read_manifest(&self) -> Vec<ManifestEntry> {
        let path = self.manifest_path();
        let Ok(content) = fs::read_to_string(&path) else {
            return Vec::new();
        };
        match serde_json::from_str(&content) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Ignoring unreadable raw manifest {}: {}", path.display(), e);
                Vec::new()
            }
        }
    }

    fn append_manifest_entry(&self, entry: ManifestEntry) -> Result<()> {
        let mut entries = self.read_manifest();
        entries.push(entry);
        fs::write(self.manifest_path(), serde_json::to_string_pretty(&entries)?)?;
        Ok(())
    }

    /// Legacy selection: descending lexical sort of `users_*.json` filenames,
    /// which orders by timestamp only because the format is zero-padded.
    fn most_recent_by_filename(&self) -> Result<Option<String>> {
        let mut names = Vec::new();
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        for entry in entries {
            let name = entry?.file_name().to_string_lossy().into_owned();
            if name.starts_with(RAW_PREFIX) && name.ends_with(RAW_SUFFIX) {
                names.push(name);
            }
        }
        names.sort_by(|a, b| b.cmp(a));
        Ok(names.into_iter().next())
    }

    fn pick_most_recent(&self) -> Result<(String, DateTime<Utc>)> {
        // Prefer explicit manifest timestamps; fall back to filename order
        // for directories written before the manifest existed.
        let mut entries = self.read_manifest();
        entries.retain(|e| self.root.join(&e.filename).is_file());
        if let Some(entry) = entries.into_iter().max_by_key(|e| e.captured_at) {
            return Ok((entry.filename, entry.captured_at));
        }

        let Some(filename) = self.most_recent_by_filename()? else {
            return Err(PipelineError::NoRawData(self.root.display().to_string()));
        };
        let captured_at = parse_batch_timestamp(&filename).unwrap_or_else(Utc::now);
        Ok((filename, captured_at))
    }
}

fn parse_batch_timestamp(filename: &str) -> Option<DateTime<Utc>> {
    let stamp = filename
        .strip_prefix(RAW_PREFIX)?
        .strip_suffix(RAW_SUFFIX)?;
    let naive = NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT).ok()?;
    Some(Utc.from_utc_datetime(&naive))
}

impl RawStore for FsRawStore {
    fn save(&self, records: &[UserRecord]) -> Result<PathBuf> {
        if records.is_empty() {
            return Err(PipelineError::NoRawData("empty batch".to_string()));
        }

        fs::create_dir_all(&self.root)?;
        let captured_at = Utc::now();
        let filename = format!(
            "{RAW_PREFIX}{}{RAW_SUFFIX}",
            captured_at.format(TIMESTAMP_FORMAT)
        );
        let path = self.root.join(&filename);

        let json_content = serde_json::to_string_pretty(records)?;
        fs::write(&path, json_content)?;
        self.append_manifest_entry(ManifestEntry {
            filename,
            captured_at,
        })?;

        info!("{} users ingested, saved to {}", records.len(), path.display());
        Ok(path)
    }

    fn load_most_recent(&self) -> Result<RawBatch> {
        let (filename, captured_at) = self.pick_most_recent()?;
        let path = self.root.join(&filename);
        debug!("Loading raw batch {}", path.display());

        let content = fs::read_to_string(&path)?;
        let records: Vec<UserRecord> = serde_json::from_str(&content)?;
        Ok(RawBatch {
            records,
            filename,
            captured_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(id: u64) -> UserRecord {
        json!({"user_id": id, "email": "a@b.co", "phone": "555"})
            .as_object()
            .unwrap()
            .clone()
    }

    #[test]
    fn save_then_load_round_trips_records() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsRawStore::new(dir.path());

        let path = store.save(&[record(1), record(2)]).unwrap();
        assert!(path.exists());

        let batch = store.load_most_recent().unwrap();
        assert_eq!(batch.records.len(), 2);
        assert_eq!(batch.records[0]["user_id"], json!(1));
        assert!(batch.filename.starts_with("users_"));
    }

    #[test]
    fn manifest_timestamps_decide_recency() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsRawStore::new(dir.path());

        // Two batches with deliberately reversed filename order: the newest
        // capture gets the lexically smaller name.
        fs::write(
            dir.path().join("users_20250101_000000.json"),
            serde_json::to_string(&[record(1)]).unwrap(),
        )
        .unwrap();
        fs::write(
            dir.path().join("users_20240101_000000.json"),
            serde_json::to_string(&[record(2)]).unwrap(),
        )
        .unwrap();
        let entries = vec![
            ManifestEntry {
                filename: "users_20250101_000000.json".to_string(),
                captured_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            },
            ManifestEntry {
                filename: "users_20240101_000000.json".to_string(),
                captured_at: Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap(),
            },
        ];
        fs::write(
            dir.path().join(MANIFEST_FILE),
            serde_json::to_string(&entries).unwrap(),
        )
        .unwrap();

        let batch = store.load_most_recent().unwrap();
        assert_eq!(batch.filename, "users_20240101_000000.json");
        assert_eq!(batch.records[0]["user_id"], json!(2));
    }

    #[test]
    fn falls_back_to_lexical_filename_order_without_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsRawStore::new(dir.path());

        for (stamp, id) in [("20240101_120000", 1), ("20240101_120500", 2)] {
            fs::write(
                dir.path().join(format!("users_{stamp}.json")),
                serde_json::to_string(&[record(id)]).unwrap(),
            )
            .unwrap();
        }

        let batch = store.load_most_recent().unwrap();
        assert_eq!(batch.filename, "users_20240101_120500.json");
    }

    #[test]
    fn empty_directory_is_no_raw_data() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsRawStore::new(dir.path());
        assert!(matches!(
            store.load_most_recent(),
            Err(PipelineError::NoRawData(_))
        ));
    }

    #[test]
    fn missing_directory_is_no_raw_data() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsRawStore::new(dir.path().join("never-created"));
        assert!(matches!(
            store.load_most_recent(),
            Err(PipelineError::NoRawData(_))
        ));
    }

    #[test]
    fn refuses_to_save_an_empty_batch() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsRawStore::new(dir.path());
        assert!(store.save(&[]).is_err());
    }
}
