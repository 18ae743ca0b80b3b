// src/dart/models.rs
use serde::{Deserialize, Serialize};

/// Status code OpenDART uses for a successful response.
pub const STATUS_OK: &str = "000";
/// Status code OpenDART uses when the query matched nothing.
pub const STATUS_NO_DATA: &str = "013";

/// Response envelope of `list.json` (disclosure search).
/// Example: https://opendart.fss.or.kr/api/list.json?corp_code=00126380&bgn_de=20240101&pblntf_ty=A
#[derive(Debug, Deserialize)]
pub struct ListResponse {
    pub status: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub total_page: u32,
    #[serde(default)]
    pub list: Vec<Disclosure>,
}

/// One disclosure row. `rcept_dt` is `YYYYMMDD`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Disclosure {
    #[serde(default)]
    pub corp_code: String,
    #[serde(default)]
    pub corp_name: String,
    #[serde(default)]
    pub stock_code: String,
    pub report_nm: String,
    pub rcept_no: String,
    #[serde(default)]
    pub flr_nm: String,
    #[serde(default)]
    pub rcept_dt: String,
    #[serde(default)]
    pub rm: String,
}

/// One titled entry of a filing's table of contents, in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubDocument {
    pub index: usize,
    pub title: String,
    pub url: String,
}

/// Response envelope of `fnlttSinglAcnt.json` (single-company key accounts).
#[derive(Debug, Deserialize)]
pub struct FinancialResponse {
    pub status: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub list: Vec<FinancialRow>,
}

/// `fs_div` is "CFS" (consolidated) or "OFS" (standalone).
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct FinancialRow {
    #[serde(default)]
    pub fs_div: String,
    #[serde(default)]
    pub account_nm: String,
    #[serde(default)]
    pub thstrm_amount: String,
}

/// Entry of the CORPCODE.xml registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorpCodeEntry {
    pub corp_code: String,
    pub corp_name: String,
    pub stock_code: Option<String>,
    pub modify_date: String,
}
