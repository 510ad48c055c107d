use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::str::FromStr;

use chrono::Local;
use clap::{Parser, ValueEnum};
use log::LevelFilter;
use tenderharvest::density::{DEFAULT_THRESHOLD, filter_store};
use tenderharvest::sink::{DEFAULT_CREDENTIALS_FILE, GoogleSheetsSink, UploadSink};
use tenderharvest::{
    HarvestConfig, Harvester, RecordStore, RunContext, SchemaPolicy, WebPortal,
};

const DEFAULT_SHEET_ID: &str = "1VHFlj5pxuw5EwSxiGUIcdPA57-ujeykcIvENsmytLvw";

#[derive(Parser)]
#[command(name = "tenderharvest")]
#[command(
    about = "Harvest tender details from the Coal India eProcurement portal into CSV",
    long_about = None
)]
struct Cli {
    #[arg(
        short = 'l',
        long = "log-level",
        value_enum,
        default_value = "info",
        help = "Set the logging level"
    )]
    log_level: LogLevel,

    #[arg(long, help = "Skip the Google Sheets upload")]
    no_upload: bool,

    #[arg(
        long,
        value_name = "DIR",
        default_value = ".",
        help = "Directory for the raw and filtered CSV files"
    )]
    output_dir: PathBuf,

    #[arg(long, default_value = DEFAULT_SHEET_ID, help = "Google Sheet to upload to")]
    sheet_id: String,

    #[arg(
        long,
        value_name = "FILE",
        default_value = DEFAULT_CREDENTIALS_FILE,
        help = "Service account JSON key used for the upload"
    )]
    credentials: PathBuf,

    #[arg(
        long,
        value_name = "RATIO",
        default_value_t = DEFAULT_THRESHOLD,
        value_parser = parse_ratio,
        help = "Keep columns filled in more than this share of rows"
    )]
    min_fill: f64,

    #[arg(
        long,
        default_value = "keep-header",
        value_parser = parse_schema_policy,
        help = "On new fields: keep the first header (keep-header) or rewrite the file (rewrite)"
    )]
    schema_policy: SchemaPolicy,
}

#[derive(Debug, Clone, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => LevelFilter::Off,
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

fn parse_ratio(s: &str) -> Result<f64, String> {
    let ratio: f64 = s.parse().map_err(|e| format!("{e}"))?;
    if (0.0..1.0).contains(&ratio) {
        Ok(ratio)
    } else {
        Err(format!("{ratio} is not in the range [0, 1)"))
    }
}

fn parse_schema_policy(s: &str) -> Result<SchemaPolicy, String> {
    SchemaPolicy::from_str(s).map_err(|e| e.to_string())
}

/// Build the filtered view next to the raw file. Failures are logged, never fatal.
fn write_filtered_view(ctx: &RunContext, threshold: f64) -> bool {
    if !ctx.raw_path.is_file() {
        log::info!("No data found to filter.");
        return false;
    }

    match filter_store(&ctx.raw_path, threshold) {
        Ok(Some(view)) => match view.write(&ctx.filtered_path) {
            Ok(()) => {
                log::info!("Successfully created {}", ctx.filtered_path.display());
                true
            }
            Err(e) => {
                log::error!("Error writing filtered CSV: {}", e);
                false
            }
        },
        Ok(None) => false,
        Err(e) => {
            log::error!("Error during density filtering: {}", e);
            false
        }
    }
}

async fn upload(ctx: &RunContext, sheet_id: &str, credentials: &Path) {
    let sink = match GoogleSheetsSink::new(credentials) {
        Ok(sink) => sink,
        Err(e) => {
            log::error!("Error creating Google Sheets client: {}", e);
            return;
        }
    };

    match sink
        .push(&ctx.filtered_path, sheet_id, &ctx.partition_label)
        .await
    {
        Ok(rows) => log::info!(
            "Uploaded {} rows to worksheet '{}'",
            rows,
            ctx.partition_label
        ),
        Err(e) => log::error!("An error occurred during Google Sheets upload: {}", e),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(cli.log_level.clone().into())
        .init();

    if let Err(e) = fs::create_dir_all(&cli.output_dir) {
        log::error!(
            "Error creating output directory {}: {}",
            cli.output_dir.display(),
            e
        );
        process::exit(1);
    }

    let ctx = RunContext::new(&cli.output_dir, &Local::now());

    let mut store = RecordStore::open(&ctx.raw_path, cli.schema_policy).unwrap_or_else(|e| {
        log::error!("Error opening {}: {}", ctx.raw_path.display(), e);
        process::exit(1);
    });

    let harvester = Harvester::new(WebPortal::new(), HarvestConfig::default());

    log::info!("Writing tender details to {}", ctx.raw_path.display());
    let summary = harvester.run(&mut store).await.unwrap_or_else(|e| {
        log::error!("{}", e);
        process::exit(1);
    });
    print!("{}", summary);

    log::info!("Scraping complete! Now generating filtered CSV...");
    let filtered = write_filtered_view(&ctx, cli.min_fill);

    if cli.no_upload {
        log::info!("Skipping Google Sheets upload (--no-upload flag detected).");
        return;
    }
    if !filtered {
        log::info!("Filtered CSV not found, skipping upload.");
        return;
    }

    log::info!("Starting Google Sheets upload...");
    upload(&ctx, &cli.sheet_id, &cli.credentials).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn run_context(dir: &Path) -> RunContext {
        RunContext::new(dir, &Local::now())
    }

    #[test]
    fn test_parse_ratio() {
        assert_eq!(parse_ratio("0.5"), Ok(0.5));
        assert_eq!(parse_ratio("0"), Ok(0.0));
        assert!(parse_ratio("1").is_err());
        assert!(parse_ratio("-0.1").is_err());
        assert!(parse_ratio("half").is_err());
    }

    #[test]
    fn test_defaults_match_original_run() {
        let cli = Cli::parse_from(["tenderharvest"]);
        assert!(!cli.no_upload);
        assert_eq!(cli.min_fill, DEFAULT_THRESHOLD);
        assert_eq!(cli.schema_policy, SchemaPolicy::KeepHeader);
        assert_eq!(cli.credentials, PathBuf::from(DEFAULT_CREDENTIALS_FILE));
        assert_eq!(cli.sheet_id, DEFAULT_SHEET_ID);
    }

    #[test]
    fn test_no_upload_flag() {
        let cli = Cli::parse_from(["tenderharvest", "--no-upload", "--schema-policy", "rewrite"]);
        assert!(cli.no_upload);
        assert_eq!(cli.schema_policy, SchemaPolicy::Rewrite);
    }

    #[test]
    fn test_filtered_view_skipped_without_raw_file() {
        let dir = tempdir().unwrap();
        let ctx = run_context(dir.path());

        assert!(!write_filtered_view(&ctx, DEFAULT_THRESHOLD));
        assert!(!ctx.filtered_path.exists());
    }

    #[test]
    fn test_filtered_view_skipped_for_header_only_store() {
        let dir = tempdir().unwrap();
        let ctx = run_context(dir.path());
        fs::write(&ctx.raw_path, "Organization Name,Tender ID\n").unwrap();

        assert!(!write_filtered_view(&ctx, DEFAULT_THRESHOLD));
        assert!(!ctx.filtered_path.exists());
    }

    #[test]
    fn test_filtered_view_written_for_populated_store() {
        let dir = tempdir().unwrap();
        let ctx = run_context(dir.path());
        fs::write(
            &ctx.raw_path,
            "Organization Name,Remarks,Tender ID\nCIL,,T1\nCIL,,T2\n",
        )
        .unwrap();

        assert!(write_filtered_view(&ctx, DEFAULT_THRESHOLD));
        let filtered = fs::read_to_string(&ctx.filtered_path).unwrap();
        assert_eq!(filtered.lines().next(), Some("Organization Name,Tender ID"));
        assert_eq!(filtered.lines().count(), 3);
    }
}
