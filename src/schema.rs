use crate::error::{PipelineError, Result};
use crate::types::UserRecord;

/// Check that every record carries every required field.
///
/// Strict key-presence check used to gate ingestion. The transform stage
/// deliberately uses a looser drop-missing-values policy instead of calling
/// this again.
pub fn validate_user_schema(records: &[UserRecord], required_fields: &[&str]) -> Result<()> {
    for (index, record) in records.iter().enumerate() {
        for field in required_fields {
            if !record.contains_key(*field) {
                return Err(PipelineError::Schema {
                    index,
                    field: (*field).to_string(),
                });
            }
        }
    }
    Ok(())
}
