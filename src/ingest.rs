use crate::config::PipelineConfig;
use crate::error::Result;
use crate::retry::{run_with_backoff, RetryPolicy};
use crate::schema::validate_user_schema;
use crate::types::{UserRecord, REQUIRED_FIELDS};
use async_trait::async_trait;
use metrics::counter;
use std::time::Duration;
use tracing::info;

/// A remote source of user records.
#[async_trait]
pub trait UserSource: Send + Sync {
    /// Fetch one batch of raw records, as returned by the source.
    async fn fetch_batch(&self) -> Result<Vec<UserRecord>>;
}

/// Production source: a users-listing endpoint returning a JSON array.
pub struct HttpUserSource {
    client: reqwest::Client,
    url: String,
}

impl HttpUserSource {
    pub fn new(config: &PipelineConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            url: config.api_url.clone(),
        })
    }
}

#[async_trait]
impl UserSource for HttpUserSource {
    async fn fetch_batch(&self) -> Result<Vec<UserRecord>> {
        info!("HTTP GET request to: {}", self.url);
        let records = self
            .client
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .json::<Vec<UserRecord>>()
            .await?;
        Ok(records)
    }
}

/// Rename the source's `id` key to `user_id`, leaving the rest of each
/// mapping untouched. Records without an `id` key pass through as-is.
fn rename_id_key(records: &mut [UserRecord]) {
    for record in records.iter_mut() {
        if let Some(id) = record.remove("id") {
            record.insert("user_id".to_string(), id);
        }
    }
}

/// Fetch, rename and schema-validate one batch of users, retrying the whole
/// attempt on any request or validation failure.
///
/// Exhausted retries surface the last error as a value; nothing panics.
pub async fn fetch_users(source: &dyn UserSource, policy: &RetryPolicy) -> Result<Vec<UserRecord>> {
    let records = run_with_backoff(policy, || async {
        counter!("etl_ingest_attempts_total").increment(1);
        let mut records = source.fetch_batch().await?;
        rename_id_key(&mut records);
        validate_user_schema(&records, &REQUIRED_FIELDS)?;
        Ok::<_, crate::error::PipelineError>(records)
    })
    .await?;

    counter!("etl_records_ingested_total").increment(records.len() as u64);
    info!("Fetched {} user records", records.len());
    Ok(records)
}
