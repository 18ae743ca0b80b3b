// src/storage/mod.rs
pub mod checkpoint;

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::targets::Target;
use crate::utils::error::StorageError;

pub use checkpoint::{CheckpointRecord, CheckpointState, CheckpointStore};

/// Key under which the industry label is stored in the artifact.
pub const INDUSTRY_KEY: &str = "소분류";
const UNKNOWN_INDUSTRY: &str = "UNKNOWN_INDUSTRY";
const LEGACY_FILES: &[&str] = &["stock_master_list.csv"];

static UNSAFE_PATH_CHARS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[/\\?%*:|"<>]"#).expect("Failed to compile UNSAFE_PATH_CHARS_RE"));

/// One collected entity, written as `raw_<code>.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusinessRecord {
    pub company_name: String,
    pub stock_code: String,
    pub bsns_year: String,
    pub industry_classification: BTreeMap<String, String>,
    pub business_description: String,
    pub financials: BTreeMap<String, String>,
}

impl BusinessRecord {
    pub fn new(target: &Target, year: i32, business_description: String, financials: BTreeMap<String, String>) -> Self {
        let mut industry_classification = BTreeMap::new();
        industry_classification.insert(INDUSTRY_KEY.to_string(), target.industry.clone());
        Self {
            company_name: target.company_name.clone(),
            stock_code: target.stock_code.clone(),
            bsns_year: year.to_string(),
            industry_classification,
            business_description,
            financials,
        }
    }

    pub fn industry(&self) -> &str {
        self.industry_classification
            .get(INDUSTRY_KEY)
            .map(String::as_str)
            .unwrap_or_default()
    }
}

/// Which diagnostic log a skip is written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogKind {
    MissingReport,
    BusinessContentFailure,
}

pub struct StorageManager {
    base_dir: PathBuf,
    missing_report_log: PathBuf,
    business_fail_log: PathBuf,
}

impl StorageManager {
    /// Creates a new StorageManager rooted at `base_dir`, creating it if needed.
    pub fn new<P: AsRef<Path>>(
        base_dir: P,
        missing_report_log: impl Into<PathBuf>,
        business_fail_log: impl Into<PathBuf>,
    ) -> Result<Self, StorageError> {
        let base_path = base_dir.as_ref().to_path_buf();

        if !base_path.exists() {
            fs::create_dir_all(&base_path).map_err(StorageError::IoError)?;
        }

        Ok(Self {
            base_dir: base_path,
            missing_report_log: missing_report_log.into(),
            business_fail_log: business_fail_log.into(),
        })
    }

    /// Path an entity's artifact is written to: `<base>/<sanitized industry>/raw_<code>.json`.
    pub fn record_path(&self, record: &BusinessRecord) -> PathBuf {
        self.base_dir
            .join(clean_dir_name(record.industry()))
            .join(format!("raw_{}.json", record.stock_code))
    }

    /// Writes the artifact, replacing any previous one for the same entity.
    pub fn save_record(&self, record: &BusinessRecord) -> Result<PathBuf, StorageError> {
        let file_path = self.record_path(record);
        if let Some(target_dir) = file_path.parent() {
            fs::create_dir_all(target_dir).map_err(StorageError::IoError)?;
        }

        let json = serde_json::to_string_pretty(record)
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;
        fs::write(&file_path, json).map_err(StorageError::IoError)?;

        tracing::debug!("Saved record to {}", file_path.display());
        Ok(file_path)
    }

    /// Appends `timestamp\tcode\tname\treason\tdetail` to the chosen log.
    pub fn append_log(
        &self,
        kind: LogKind,
        code: &str,
        company: &str,
        reason: &str,
        detail: &str,
    ) -> Result<(), StorageError> {
        let path = match kind {
            LogKind::MissingReport => &self.missing_report_log,
            LogKind::BusinessContentFailure => &self.business_fail_log,
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let ts = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{}\t{}\t{}\t{}\t{}", ts, code, company, reason, detail)?;
        Ok(())
    }

    /// Removes files left behind by the old master-table workflow.
    pub fn remove_legacy_files(&self) -> Result<(), StorageError> {
        for name in LEGACY_FILES {
            let legacy = self.base_dir.join(name);
            if legacy.exists() {
                fs::remove_file(&legacy)?;
                tracing::info!("Removed legacy file: {}", legacy.display());
            }
        }
        Ok(())
    }
}

/// Industry label made safe for use as a directory name.
pub fn clean_dir_name(name: &str) -> String {
    let name = name.trim();
    if name.is_empty() {
        return UNKNOWN_INDUSTRY.to_string();
    }
    UNSAFE_PATH_CHARS_RE.replace_all(name, "_").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> Target {
        Target {
            company_name: "삼성전자".into(),
            market: "유가증권".into(),
            stock_code: "005930".into(),
            industry: "통신 및 방송 장비 제조업".into(),
        }
    }

    #[test]
    fn directory_names_are_sanitized() {
        assert_eq!(clean_dir_name("전자부품/컴퓨터"), "전자부품_컴퓨터");
        assert_eq!(clean_dir_name(r#"a\b?c%d*e:f|g"h<i>j"#), "a_b_c_d_e_f_g_h_i_j");
        assert_eq!(clean_dir_name("  "), "UNKNOWN_INDUSTRY");
    }

    #[test]
    fn saves_record_under_industry_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = StorageManager::new(tmp.path(), tmp.path().join("m.log"), tmp.path().join("b.log")).unwrap();
        let mut financials = BTreeMap::new();
        financials.insert("매출액".to_string(), "258,935,494,000,000".to_string());
        let record = BusinessRecord::new(&target(), 2024, "반도체 사업".into(), financials);

        let path = storage.save_record(&record).unwrap();
        assert_eq!(path, tmp.path().join("통신 및 방송 장비 제조업").join("raw_005930.json"));

        let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["bsns_year"], "2024");
        assert_eq!(json["industry_classification"]["소분류"], "통신 및 방송 장비 제조업");
        assert_eq!(json["business_description"], "반도체 사업");
        assert_eq!(json["financials"]["매출액"], "258,935,494,000,000");
    }

    #[test]
    fn log_lines_are_tab_separated_and_appended() {
        let tmp = tempfile::tempdir().unwrap();
        let missing = tmp.path().join("logs").join("missing.log");
        let storage = StorageManager::new(tmp.path(), &missing, tmp.path().join("b.log")).unwrap();

        storage
            .append_log(LogKind::MissingReport, "000001", "가나다", "no_2024_business_report", "")
            .unwrap();
        storage
            .append_log(LogKind::MissingReport, "000002", "라마바", "lookup_error:corp_code_not_found", "cannot_query_dart")
            .unwrap();

        let content = fs::read_to_string(&missing).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let fields: Vec<&str> = lines[1].split('\t').collect();
        assert_eq!(fields.len(), 5);
        assert_eq!(&fields[1..], &["000002", "라마바", "lookup_error:corp_code_not_found", "cannot_query_dart"]);
        assert!(!tmp.path().join("b.log").exists());
    }

    #[test]
    fn legacy_master_table_removed() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("stock_master_list.csv"), "code\n").unwrap();
        let storage = StorageManager::new(tmp.path(), "m.log", "b.log").unwrap();
        storage.remove_legacy_files().unwrap();
        assert!(!tmp.path().join("stock_master_list.csv").exists());
    }
}
