//! CLI entry point for the diagnosis-key statistics tool.
//!
//! `run` downloads the published entry list and every bundle it names, then
//! writes the per-batch statistics report. `inspect` decodes a single bundle.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use cocoa_diagnosis_keys::{
    bundle::read_archive,
    fetch::{BasicClient, BundleSource, DiskCache, RemoteSource},
    output::{ReportOrder, print_bundle},
    pipeline::{RunOptions, load_entries, run_to_path},
    stats::fold,
};
use tracing::info;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "cocoa_diagnosis_keys")]
#[command(about = "Statistics over published exposure notification diagnosis keys", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download every listed bundle and write the statistics report
    Run {
        /// URL of the server providing the diagnosis keys list
        #[arg(long, env = "COCOA_DIAGNOSIS_KEYS_LIST_URL")]
        diagnosis_keys_list_url: String,

        /// Directory for downloaded bundles
        #[arg(long, default_value = "/tmp/cocoa_diagnosis_keys")]
        tmp_path: PathBuf,

        /// CSV report to write
        #[arg(long, default_value = "./v1/cocoa_diagnosis_keys/latest.csv")]
        output_path: PathBuf,

        /// Log every decoded bundle
        #[arg(long, default_value_t = true, action = ArgAction::Set)]
        verbose: bool,

        /// Sort rows newest first instead of keeping list order
        #[arg(long, default_value_t = false)]
        sort_descending: bool,
    },
    /// Decode a single bundle archive from a file or URL and print it
    Inspect {
        /// Path to file or URL to fetch
        #[arg(value_name = "FILE_OR_URL")]
        source: String,

        /// Publication time to attribute the keys to
        #[arg(long, default_value_t = 0)]
        created: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path = std::env::var("LOG_FILE_PATH")
        .unwrap_or_else(|_| "logs/cocoa_diagnosis_keys.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("cocoa_diagnosis_keys.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            diagnosis_keys_list_url,
            tmp_path,
            output_path,
            verbose,
            sort_descending,
        } => {
            info!("Start");

            let source = DiskCache::new(RemoteSource::new(BasicClient::new()?), &tmp_path);
            let entries = load_entries(source.inner(), &diagnosis_keys_list_url).await?;

            let options = RunOptions {
                verbose,
                order: if sort_descending {
                    ReportOrder::Descending
                } else {
                    ReportOrder::Traversal
                },
            };
            run_to_path(&source, &entries, &output_path, options).await?;

            info!(output_path = %output_path.display(), "Done");
        }
        Commands::Inspect { source, created } => {
            let client = RemoteSource::new(BasicClient::new()?);
            let bytes = client.fetch(&source).await?;
            let bundle =
                read_archive(&bytes).with_context(|| format!("malformed bundle {source}"))?;

            print_bundle(&source, &bundle);

            for bucket in fold(&[(created, bundle)]) {
                info!(
                    rolling_start_interval_number = bucket.rolling_start_interval_number,
                    key_count = bucket.key_count,
                    valid_key_count = bucket.valid_key_count,
                    invalid_key_data_count = bucket.invalid_key_data_count,
                    comment = %bucket.comment,
                    "Bucket"
                );
            }
        }
    }

    Ok(())
}
