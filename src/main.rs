// src/main.rs
mod config;
mod dart;
mod extractors;
mod pipeline;
mod storage;
mod targets;
mod utils;

use std::path::PathBuf;
use std::time::Duration;

use chrono::NaiveDate;
use clap::Parser;

use config::{CollectConfig, DartConfig, DEFAULT_API_BASE, DEFAULT_VIEWER_BASE};
use dart::DartClient;
use pipeline::Collector;
use targets::TargetFilter;
use utils::retry::RetryPolicy;
use utils::AppError;

const MAX_BACKOFF_SECS: f64 = 600.0;

/// Collects the business-content chapter of DART annual reports for every listed company
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// OpenDART API key
    #[arg(long, env = "DART_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// KIND listed-company export (HTML table saved as .xls)
    #[arg(long, default_value = "상장법인목록.xls")]
    listing: PathBuf,

    /// Output directory for artifacts and the checkpoint file
    #[arg(short, long, default_value = "data")]
    data_dir: PathBuf,

    /// Business year of the annual report to collect
    #[arg(short, long, default_value_t = 2024)]
    year: i32,

    /// List disclosures filed on or after this date (default: Jan 1 of --year)
    #[arg(long)]
    since: Option<NaiveDate>,

    /// Business year of the financial snapshot (default: --year minus one)
    #[arg(long)]
    financial_year: Option<i32>,

    /// DART disclosure kind code
    #[arg(long, default_value = "A")]
    kind: String,

    /// Report code for the financial snapshot (11011 = annual)
    #[arg(long, default_value = "11011")]
    report_code: String,

    /// Attempts per remote call
    #[arg(long, default_value_t = 3)]
    max_attempts: u32,

    /// Linear backoff base between attempts, in seconds (at most 600)
    #[arg(long, default_value_t = 1.5)]
    backoff_secs: f64,

    /// Per-request timeout, in seconds
    #[arg(long, default_value_t = 20)]
    timeout_secs: u64,

    /// Minimum spacing between processed entities, in milliseconds
    #[arg(long, default_value_t = 300)]
    interval_ms: u64,

    /// Market segments to keep, comma separated; pass an empty value to keep every segment
    #[arg(long, value_delimiter = ',', default_values_t = [String::from("유가증권"), String::from("코스닥")])]
    markets: Vec<String>,

    /// Keep only companies listed before this date (default: Jan 1 of the year after --year)
    #[arg(long)]
    listed_before: Option<NaiveDate>,

    /// Re-download the cached corp code registry once it is older than this many hours
    #[arg(long, default_value_t = 24)]
    corp_code_max_age_hours: u64,

    /// Industry label excluded from collection
    #[arg(long, default_value = "금융 지원 서비스업")]
    excluded_industry: String,

    /// Process at most this many pending entities
    #[arg(long)]
    limit: Option<usize>,

    /// Retry entities whose business content previously failed from scratch
    #[arg(long)]
    reset_failed: bool,

    #[arg(long, default_value = DEFAULT_API_BASE)]
    api_base: String,

    #[arg(long, default_value = DEFAULT_VIEWER_BASE)]
    viewer_base: String,

    /// Log level used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // 1. Parse CLI Arguments and setup logging (RUST_LOG wins over --log-level)
    let args = Args::parse();
    utils::logging::setup_logging(&args.log_level);

    // 2. Credentials are required before any work starts
    let api_key = args
        .api_key
        .clone()
        .filter(|key| !key.trim().is_empty())
        .ok_or_else(|| AppError::Config("DART_API_KEY is not set (use --api-key or the environment)".to_string()))?;

    // 3. Build configuration
    if !(0.0..=MAX_BACKOFF_SECS).contains(&args.backoff_secs) {
        return Err(AppError::Config(format!(
            "--backoff-secs must be between 0 and {}, got {}",
            MAX_BACKOFF_SECS, args.backoff_secs
        )));
    }
    let backoff = Duration::try_from_secs_f64(args.backoff_secs)
        .map_err(|e| AppError::Config(format!("invalid --backoff-secs {}: {}", args.backoff_secs, e)))?;
    if args.max_attempts == 0 {
        return Err(AppError::Config("--max-attempts must be at least 1".to_string()));
    }

    let mut dart_config = DartConfig::new(api_key, &args.data_dir);
    dart_config.api_base = args.api_base.trim_end_matches('/').to_string();
    dart_config.viewer_base = args.viewer_base.trim_end_matches('/').to_string();
    dart_config.request_timeout = Duration::from_secs(args.timeout_secs);
    dart_config.corp_code_max_age = Duration::from_secs(args.corp_code_max_age_hours.saturating_mul(3600));

    let mut collect_config = CollectConfig::new(&args.data_dir, args.year);
    if let Some(since) = args.since {
        collect_config.disclosures_since = since;
    }
    if let Some(year) = args.financial_year {
        collect_config.financial_year = year;
    }
    collect_config.disclosure_kind = args.kind.clone();
    collect_config.financial_report_code = args.report_code.clone();
    collect_config.retry = RetryPolicy::new(args.max_attempts, backoff);
    collect_config.entity_interval = Duration::from_millis(args.interval_ms);
    collect_config.limit = args.limit;
    collect_config.reset_failed = args.reset_failed;
    tracing::debug!("Collection settings: {:?}", collect_config);

    // 4. Initialize the client and collector, then drop leftovers of the old master-table workflow
    let client = DartClient::new(dart_config)?;
    let collector = Collector::new(&client, collect_config)?;
    collector.storage().remove_legacy_files()?;

    // 5. Load targets
    let filter = TargetFilter {
        markets: args.markets.iter().map(|m| m.trim().to_string()).filter(|m| !m.is_empty()).collect(),
        listed_before: args.listed_before.or_else(|| NaiveDate::from_ymd_opt(args.year + 1, 1, 1)),
        excluded_industry: Some(args.excluded_industry.clone()).filter(|i| !i.trim().is_empty()),
    };
    let targets = targets::load_targets(&args.listing, &filter)?;
    tracing::info!(
        "Filters: markets {:?}, listed before {:?}, excluded industry {:?}",
        filter.markets,
        filter.listed_before,
        filter.excluded_industry
    );

    // 6. Run the collection
    let summary = collector.run(&targets).await?;

    println!("\n[Done] Collection run finished");
    println!("  - total_targets: {}", summary.total_targets);
    println!("  - saved_json: {}", summary.saved);
    println!("  - skipped_no_report: {}", summary.no_report);
    println!("  - skipped_business_content_fail: {}", summary.business_content_failed);
    println!("  - skipped_lookup_error: {}", summary.lookup_error);
    println!("  - already_processed: {}", summary.already_processed);

    Ok(())
}
