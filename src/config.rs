// src/config.rs
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::NaiveDate;

use crate::utils::retry::RetryPolicy;

pub const DEFAULT_API_BASE: &str = "https://opendart.fss.or.kr/api";
pub const DEFAULT_VIEWER_BASE: &str = "https://dart.fss.or.kr";
const USER_AGENT: &str = concat!("dart_collector/", env!("CARGO_PKG_VERSION"));

/// Connection settings for the DART services. Built once in `main` and handed to the client.
#[derive(Debug, Clone)]
pub struct DartConfig {
    pub api_key: String,
    pub api_base: String,
    pub viewer_base: String,
    pub request_timeout: Duration,
    /// Where the unpacked CORPCODE.xml registry is cached between runs.
    pub corp_code_cache: PathBuf,
    /// A cache older than this is downloaded again.
    pub corp_code_max_age: Duration,
    pub user_agent: String,
}

impl DartConfig {
    pub fn new(api_key: impl Into<String>, data_dir: &Path) -> Self {
        Self {
            api_key: api_key.into(),
            api_base: DEFAULT_API_BASE.to_string(),
            viewer_base: DEFAULT_VIEWER_BASE.to_string(),
            request_timeout: Duration::from_secs(20),
            corp_code_cache: data_dir.join("CORPCODE.xml"),
            corp_code_max_age: Duration::from_secs(24 * 60 * 60),
            user_agent: USER_AGENT.to_string(),
        }
    }
}

/// Everything the pipeline driver needs for one collection run.
#[derive(Debug, Clone)]
pub struct CollectConfig {
    pub data_dir: PathBuf,
    pub checkpoint_path: PathBuf,
    pub missing_report_log: PathBuf,
    pub business_fail_log: PathBuf,
    /// Business year of the report to collect (사업보고서 for this year).
    pub target_year: i32,
    /// Disclosures filed before this date are not listed.
    pub disclosures_since: NaiveDate,
    /// DART disclosure kind code; "A" is periodic reports.
    pub disclosure_kind: String,
    pub financial_year: i32,
    /// 11011 = annual business report.
    pub financial_report_code: String,
    pub retry: RetryPolicy,
    /// Minimum spacing between entities that hit the network.
    pub entity_interval: Duration,
    /// Stop after this many entities were attempted in this run.
    pub limit: Option<usize>,
    /// Clear `failed_business_content` before starting.
    pub reset_failed: bool,
}

impl CollectConfig {
    /// Defaults mirroring a collection of `target_year` business reports into `data_dir`.
    pub fn new(data_dir: impl Into<PathBuf>, target_year: i32) -> Self {
        let data_dir = data_dir.into();
        let disclosures_since = NaiveDate::from_ymd_opt(target_year, 1, 1).unwrap_or_default();
        Self {
            checkpoint_path: data_dir.join("collection_status.json"),
            missing_report_log: PathBuf::from(format!("missing_{}_reports.log", target_year)),
            business_fail_log: PathBuf::from("business_content_extraction_failures.log"),
            data_dir,
            target_year,
            disclosures_since,
            disclosure_kind: "A".to_string(),
            financial_year: target_year - 1,
            financial_report_code: "11011".to_string(),
            retry: RetryPolicy::default(),
            entity_interval: Duration::from_millis(300),
            limit: None,
            reset_failed: false,
        }
    }
}
