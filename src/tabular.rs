use crate::error::Result;
use crate::store::TIMESTAMP_FORMAT;
use crate::types::{OutputFormat, UserRecord};
use arrow::array::{ArrayRef, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use chrono::Utc;
use parquet::arrow::ArrowWriter;
use serde_json::Value;
use std::fs::{self, File};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Output boundary for cleaned batches.
pub trait TabularWriter: Send + Sync {
    /// Write one row per record to a new timestamped file, returning its path.
    fn write(&self, records: &[UserRecord], format: OutputFormat) -> Result<PathBuf>;
}

/// Arrow-backed writer producing CSV or Parquet under a fixed directory.
///
/// Column set is the union of all fields seen across records, in first-seen
/// order; every column is nullable text. String values are written verbatim,
/// absent or null fields as nulls, and any other JSON value as compact JSON.
pub struct ArrowTabularWriter {
    root: PathBuf,
}

impl ArrowTabularWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

fn column_names(records: &[UserRecord]) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for record in records {
        for key in record.keys() {
            if !names.iter().any(|n| n == key) {
                names.push(key.clone());
            }
        }
    }
    names
}

fn cell_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn build_batch(records: &[UserRecord]) -> Result<RecordBatch> {
    let names = column_names(records);
    let fields: Vec<Field> = names
        .iter()
        .map(|name| Field::new(name, DataType::Utf8, true))
        .collect();
    let columns: Vec<ArrayRef> = names
        .iter()
        .map(|name| {
            let values: Vec<Option<String>> = records
                .iter()
                .map(|record| record.get(name).and_then(cell_text))
                .collect();
            Arc::new(StringArray::from(values)) as ArrayRef
        })
        .collect();

    Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?)
}

impl TabularWriter for ArrowTabularWriter {
    fn write(&self, records: &[UserRecord], format: OutputFormat) -> Result<PathBuf> {
        fs::create_dir_all(&self.root)?;
        let timestamp = Utc::now().format(TIMESTAMP_FORMAT);
        let path = self
            .root
            .join(format!("users_clean_{timestamp}.{}", format.extension()));

        if records.is_empty() {
            // Nothing survived; leave an empty marker file for the run.
            File::create(&path)?;
            info!("No surviving records, wrote empty {}", path.display());
            return Ok(path);
        }

        let batch = build_batch(records)?;
        match format {
            OutputFormat::Csv => {
                // Serialize into memory first: the csv writer buffers
                // internally and only flushes on drop, where errors vanish.
                // Flushing into a Vec cannot fail, and fs::write surfaces
                // every disk error.
                let mut buf = Vec::new();
                {
                    let mut writer = arrow::csv::WriterBuilder::new()
                        .with_header(true)
                        .build(&mut buf);
                    writer.write(&batch)?;
                }
                fs::write(&path, buf)?;
            }
            OutputFormat::Parquet => {
                let file = File::create(&path)?;
                let mut writer = ArrowWriter::try_new(file, batch.schema(), None)?;
                writer.write(&batch)?;
                writer.close()?;
            }
        }

        info!("Cleaned data saved to {}", path.display());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> UserRecord {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn columns_are_the_union_of_fields_in_first_seen_order() {
        let records = vec![
            record(json!({"user_id": 1, "email": "a@b.co"})),
            record(json!({"user_id": 2, "phone": "555", "email": "c@d.co"})),
        ];
        assert_eq!(column_names(&records), vec!["user_id", "email", "phone"]);
    }

    #[test]
    fn cells_render_strings_nulls_and_json() {
        assert_eq!(cell_text(&json!("hi")), Some("hi".to_string()));
        assert_eq!(cell_text(&Value::Null), None);
        assert_eq!(cell_text(&json!(7)), Some("7".to_string()));
        assert_eq!(
            cell_text(&json!({"city": "Gwenborough"})),
            Some(r#"{"city":"Gwenborough"}"#.to_string())
        );
    }

    #[test]
    fn csv_output_has_header_plus_one_line_per_record() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ArrowTabularWriter::new(dir.path());

        let records = vec![
            record(json!({"user_id": 1, "email": "a@b.co", "phone": "555"})),
            record(json!({"user_id": 2, "email": "c@d.co", "phone": "556"})),
        ];
        let path = writer.write(&records, OutputFormat::Csv).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "user_id,email,phone");
        assert!(lines[1].contains("a@b.co"));
    }

    #[test]
    fn missing_fields_become_empty_csv_cells() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ArrowTabularWriter::new(dir.path());

        let records = vec![
            record(json!({"user_id": 1, "email": "a@b.co", "phone": "555", "name": "Ada"})),
            record(json!({"user_id": 2, "email": "c@d.co", "phone": "556"})),
        ];
        let path = writer.write(&records, OutputFormat::Csv).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let second_row = content.lines().nth(2).unwrap();
        assert!(second_row.ends_with(','));
    }

    #[test]
    fn large_csv_batch_is_fully_on_disk_when_write_returns() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ArrowTabularWriter::new(dir.path());

        // Well past any internal writer buffering
        let records: Vec<UserRecord> = (0..2000)
            .map(|i| {
                record(json!({
                    "user_id": i,
                    "email": format!("user{i}@example.com"),
                    "phone": "5550100"
                }))
            })
            .collect();
        let path = writer.write(&records, OutputFormat::Csv).unwrap();

        // Read back immediately; nothing may be pending in a writer buffer.
        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2001);
        assert!(content.contains("user1999@example.com"));
    }

    #[test]
    fn empty_batch_writes_an_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ArrowTabularWriter::new(dir.path());
        let path = writer.write(&[], OutputFormat::Parquet).unwrap();
        assert!(path.exists());
        assert_eq!(fs::metadata(&path).unwrap().len(), 0);
    }

    #[test]
    fn parquet_output_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ArrowTabularWriter::new(dir.path());
        let records = vec![record(json!({"user_id": 1, "email": "a@b.co", "phone": "555"}))];
        let path = writer.write(&records, OutputFormat::Parquet).unwrap();
        assert!(path.extension().is_some_and(|e| e == "parquet"));
        assert!(fs::metadata(&path).unwrap().len() > 0);
    }
}
