use crate::config::PipelineConfig;
use crate::error::Result;
use crate::ingest::{fetch_users, HttpUserSource, UserSource};
use crate::retry::RetryPolicy;
use crate::store::{FsRawStore, RawStore};
use crate::tabular::{ArrowTabularWriter, TabularWriter};
use crate::transform::transform_and_validate;
use crate::types::OutputFormat;
use metrics::{counter, histogram};
use serde::Serialize;
use std::time::Instant;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Successful,
    Failed,
    Skipped,
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StepStatus::Successful => "successful",
            StepStatus::Failed => "failed",
            StepStatus::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

/// Outcome of a single pipeline step, for the end-of-run report.
#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub name: &'static str,
    pub status: StepStatus,
    pub duration_secs: Option<f64>,
    pub output_file: Option<String>,
    pub rows: Option<usize>,
}

impl StepReport {
    fn skipped(name: &'static str) -> Self {
        Self {
            name,
            status: StepStatus::Skipped,
            duration_secs: Some(0.0),
            output_file: None,
            rows: None,
        }
    }

    fn failed(name: &'static str, duration_secs: f64) -> Self {
        Self {
            name,
            status: StepStatus::Failed,
            duration_secs: Some(duration_secs),
            output_file: None,
            rows: None,
        }
    }
}

/// Per-run execution report across all steps.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub steps: Vec<StepReport>,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        self.steps.iter().all(|s| s.status != StepStatus::Failed)
    }

    pub fn print(&self) {
        println!("\n=== Pipeline Execution Report ===");
        for step in &self.steps {
            println!("\nStep: {}", step.name);
            println!("  Status     : {}", step.status);
            if let Some(duration) = step.duration_secs {
                println!("  Duration   : {duration:.2} seconds");
            }
            if let Some(output_file) = &step.output_file {
                println!("  Output file: {output_file}");
            }
            if let Some(rows) = step.rows {
                println!("  Rows       : {rows}");
            }
        }
        println!("=================================");
    }
}

/// Run ingestion then transform against production collaborators. The HTTP
/// source is only built when ingestion actually runs.
pub async fn run_pipeline(
    config: &PipelineConfig,
    skip_ingest: bool,
    format: OutputFormat,
) -> RunReport {
    let store = FsRawStore::new(&config.raw_dir);
    let writer = ArrowTabularWriter::new(&config.processed_dir);
    let source = if skip_ingest {
        None
    } else {
        match HttpUserSource::new(config) {
            Ok(source) => Some(source),
            Err(e) => {
                error!("Failed to build HTTP client: {}", e);
                return RunReport {
                    steps: vec![StepReport::failed("ingest", 0.0)],
                };
            }
        }
    };
    run_pipeline_with(
        source.as_ref().map(|s| s as &dyn UserSource),
        &store,
        &writer,
        config,
        skip_ingest,
        format,
    )
    .await
}

/// Step sequencing with injected collaborators. `source` is unused (and may
/// be `None`) when ingestion is skipped. Ingestion failure halts the run
/// before transform; the report always covers every step reached.
pub async fn run_pipeline_with(
    source: Option<&dyn UserSource>,
    store: &dyn RawStore,
    writer: &dyn TabularWriter,
    config: &PipelineConfig,
    skip_ingest: bool,
    format: OutputFormat,
) -> RunReport {
    info!("Starting ETL pipeline");
    counter!("etl_pipeline_runs_total").increment(1);
    let mut report = RunReport::default();

    if skip_ingest {
        info!("Skipping ingestion step");
        report.steps.push(StepReport::skipped("ingest"));
    } else {
        println!("📡 Fetching users from {}...", config.api_url);
        let started = Instant::now();
        let policy = RetryPolicy {
            max_attempts: config.max_retries,
            initial_backoff: std::time::Duration::from_secs(config.initial_backoff_secs),
        };
        let outcome = match source {
            Some(source) => run_ingest_step(source, store, &policy).await,
            None => {
                // run_pipeline never gets here; guard for direct callers
                Err(crate::error::PipelineError::NoRawData(
                    "no user source configured for ingestion".to_string(),
                ))
            }
        };
        match outcome {
            Ok((path, rows)) => {
                let duration = started.elapsed().as_secs_f64();
                histogram!("etl_ingest_duration_seconds").record(duration);
                info!("Ingestion completed in {:.2}s, saved {} rows to {}", duration, rows, path);
                report.steps.push(StepReport {
                    name: "ingest",
                    status: StepStatus::Successful,
                    duration_secs: Some(duration),
                    output_file: Some(path),
                    rows: Some(rows),
                });
            }
            Err(e) => {
                error!("Ingestion failed: {}", e);
                report
                    .steps
                    .push(StepReport::failed("ingest", started.elapsed().as_secs_f64()));
                return report;
            }
        }
    }

    println!("🔧 Transforming most recent raw batch...");
    let started = Instant::now();
    match transform_and_validate(store, writer, format) {
        Ok(outcome) => {
            let duration = started.elapsed().as_secs_f64();
            histogram!("etl_transform_duration_seconds").record(duration);
            info!("Transformation completed in {:.2}s", duration);
            report.steps.push(StepReport {
                name: "transform",
                status: StepStatus::Successful,
                duration_secs: Some(duration),
                output_file: Some(outcome.output_path.display().to_string()),
                rows: Some(outcome.metrics.final_count),
            });
        }
        Err(e) => {
            error!("Transformation failed: {}", e);
            report
                .steps
                .push(StepReport::failed("transform", started.elapsed().as_secs_f64()));
        }
    }

    if report.succeeded() {
        info!("ETL pipeline finished successfully");
    }
    report
}

async fn run_ingest_step(
    source: &dyn UserSource,
    store: &dyn RawStore,
    policy: &RetryPolicy,
) -> Result<(String, usize)> {
    let users = fetch_users(source, policy).await?;
    let path = store.save(&users)?;
    Ok((path.display().to_string(), users.len()))
}
