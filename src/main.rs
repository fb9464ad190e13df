use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

use user_etl::config::PipelineConfig;
use user_etl::logging;
use user_etl::pipeline::run_pipeline;
use user_etl::types::OutputFormat;

#[derive(Parser)]
#[command(name = "user-etl")]
#[command(about = "Run the ETL pipeline for users data")]
#[command(version = "0.1.0")]
struct Cli {
    /// Skip the ingestion step and transform the most recent raw batch
    #[arg(long)]
    skip_ingest: bool,

    /// Output format for transformed data
    #[arg(long, value_enum, default_value_t = OutputFormat::Csv)]
    format: OutputFormat,

    /// Path to an optional TOML config file
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Config decides where logs go, so it loads first
    let config = match PipelineConfig::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Failed to load config {}: {}", cli.config.display(), e);
            return ExitCode::from(1);
        }
    };
    logging::init_logging(&config.log_dir);

    let report = run_pipeline(&config, cli.skip_ingest, cli.format).await;
    report.print();

    if report.succeeded() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    }
}
