use crate::error::Result;
use crate::normalize::{clean_phone, is_valid_email};
use crate::store::RawStore;
use crate::tabular::TabularWriter;
use crate::types::{OutputFormat, RunMetrics, UserRecord, REQUIRED_FIELDS};
use metrics::counter;
use serde_json::Value;
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::{info, warn};

/// What one transform run produced.
#[derive(Debug)]
pub struct TransformOutcome {
    pub output_path: PathBuf,
    pub metrics: RunMetrics,
}

/// Drop records where any required field is absent or JSON null.
///
/// Looser than the ingestion schema gate on purpose: ingestion rejects the
/// whole batch on a missing key, transform just drops the offending rows.
fn drop_missing_required(records: Vec<UserRecord>) -> (Vec<UserRecord>, usize) {
    let before = records.len();
    let kept: Vec<UserRecord> = records
        .into_iter()
        .filter(|record| {
            REQUIRED_FIELDS
                .iter()
                .all(|field| record.get(*field).is_some_and(|v| !v.is_null()))
        })
        .collect();
    let removed = before - kept.len();
    (kept, removed)
}

/// Clean every phone to digits only and lowercase every string email,
/// in place. Non-string emails are left for the validity filter to drop.
fn normalize_fields(records: &mut [UserRecord]) {
    for record in records.iter_mut() {
        if let Some(phone) = record.get("phone") {
            let cleaned = clean_phone(phone);
            record.insert("phone".to_string(), Value::String(cleaned));
        }
        if let Some(Value::String(email)) = record.get("email") {
            let lowered = email.to_lowercase();
            record.insert("email".to_string(), Value::String(lowered));
        }
    }
}

fn drop_invalid_emails(records: Vec<UserRecord>) -> (Vec<UserRecord>, usize) {
    let before = records.len();
    let kept: Vec<UserRecord> = records
        .into_iter()
        .filter(|record| {
            record
                .get("email")
                .is_some_and(is_valid_email)
        })
        .collect();
    let removed = before - kept.len();
    (kept, removed)
}

/// Records whose cleaned phone is empty are dropped without a dedicated
/// counter; the omission matches the reported metrics contract.
fn drop_empty_phones(records: Vec<UserRecord>) -> Vec<UserRecord> {
    records
        .into_iter()
        .filter(|record| {
            record
                .get("phone")
                .and_then(Value::as_str)
                .is_some_and(|p| !p.is_empty())
        })
        .collect()
}

/// Keep the first occurrence of each `user_id`, dropping later repeats.
fn dedup_by_user_id(records: Vec<UserRecord>) -> (Vec<UserRecord>, usize) {
    let before = records.len();
    let mut seen: HashSet<String> = HashSet::new();
    let mut duplicates: Vec<String> = Vec::new();
    let mut kept: Vec<UserRecord> = Vec::new();

    for record in records {
        // JSON text keys the id so numeric 1 and string "1" stay distinct.
        let key = record
            .get("user_id")
            .map(|v| v.to_string())
            .unwrap_or_default();
        if seen.insert(key.clone()) {
            kept.push(record);
        } else {
            duplicates.push(key);
        }
    }

    if !duplicates.is_empty() {
        warn!("Duplicate user IDs found and removed: {:?}", duplicates);
    }
    let removed = before - kept.len();
    (kept, removed)
}

/// Clean, validate and deduplicate the most recent raw batch, then write the
/// survivors in the requested format.
///
/// Metrics are logged before the write so a writer failure still leaves the
/// cleaning counters observable.
pub fn transform_and_validate(
    store: &dyn RawStore,
    writer: &dyn TabularWriter,
    format: OutputFormat,
) -> Result<TransformOutcome> {
    let batch = store.load_most_recent()?;
    info!("Transforming raw batch {}", batch.filename);

    let total_ingested = batch.records.len();
    let (records, removed_missing) = drop_missing_required(batch.records);

    let mut records = records;
    normalize_fields(&mut records);

    let (records, removed_bad_emails) = drop_invalid_emails(records);
    let records = drop_empty_phones(records);
    let (records, removed_duplicates) = dedup_by_user_id(records);

    let metrics = RunMetrics {
        total_ingested,
        removed_missing,
        removed_bad_emails,
        removed_duplicates,
        final_count: records.len(),
    };
    report_metrics(&metrics);

    let output_path = writer.write(&records, format)?;

    Ok(TransformOutcome {
        output_path,
        metrics,
    })
}

fn report_metrics(m: &RunMetrics) {
    info!(
        total_ingested = m.total_ingested,
        removed_missing = m.removed_missing,
        removed_bad_emails = m.removed_bad_emails,
        removed_duplicates = m.removed_duplicates,
        final_count = m.final_count,
        "Transform metrics"
    );
    println!("   Total users ingested            : {}", m.total_ingested);
    println!("   Users removed (missing fields)  : {}", m.removed_missing);
    println!("   Users removed (invalid emails)  : {}", m.removed_bad_emails);
    println!("   Users removed (duplicates)      : {}", m.removed_duplicates);
    println!("   Final users saved               : {}", m.final_count);

    counter!("etl_records_dropped_total", "reason" => "missing_fields")
        .increment(m.removed_missing as u64);
    counter!("etl_records_dropped_total", "reason" => "invalid_email")
        .increment(m.removed_bad_emails as u64);
    counter!("etl_records_dropped_total", "reason" => "duplicate_id")
        .increment(m.removed_duplicates as u64);
    counter!("etl_records_cleaned_total").increment(m.final_count as u64);
}
