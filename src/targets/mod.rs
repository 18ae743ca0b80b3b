// src/targets/mod.rs
//! Target universe loaded from the KIND listed-company export (상장법인목록.xls).
//! Despite the extension the export is an HTML table, usually EUC-KR encoded.
use std::collections::HashSet;
use std::path::Path;

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};

use crate::utils::error::AppError;
use crate::utils::html::collapse_whitespace;

const STOCK_CODE_WIDTH: usize = 6;

// Column positions in the export
const COL_COMPANY: usize = 0;
const COL_MARKET: usize = 1;
const COL_CODE: usize = 2;
const COL_INDUSTRY: usize = 3;
const COL_LISTED_ON: usize = 5;
const MIN_COLUMNS: usize = 4;

static ROW_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("tr").expect("Failed to compile ROW_SELECTOR"));
static DATA_CELL_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("td").expect("Failed to compile DATA_CELL_SELECTOR"));
static HEADER_CELL_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("th").expect("Failed to compile HEADER_CELL_SELECTOR"));

/// A listed entity to collect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub company_name: String,
    pub market: String,
    pub stock_code: String,
    pub industry: String,
}

#[derive(Debug, Clone, Default)]
pub struct TargetFilter {
    /// Market segments to keep (e.g. "유가증권", "코스닥"). A label matches its short
    /// form ("유가" for "유가증권"). Empty keeps all.
    pub markets: Vec<String>,
    /// Keep only entities listed strictly before this date.
    pub listed_before: Option<NaiveDate>,
    /// Industry label dropped entirely.
    pub excluded_industry: Option<String>,
}

/// Normalizes a raw stock code cell: strips quotes and whitespace, upper-cases,
/// and left-pads short numeric codes with zeros. Returns "" for blank or "nan" cells.
pub fn normalize_stock_code(raw: &str) -> String {
    let code = raw.trim().replace('\'', "").to_uppercase();
    if code.is_empty() || code.eq_ignore_ascii_case("nan") {
        return String::new();
    }
    let len = code.chars().count();
    if len < STOCK_CODE_WIDTH {
        format!("{}{}", "0".repeat(STOCK_CODE_WIDTH - len), code)
    } else {
        code
    }
}

fn is_valid_stock_code(code: &str) -> bool {
    code.len() == STOCK_CODE_WIDTH && code.chars().all(|c| c.is_ascii_alphanumeric())
}

fn market_matches(cell: &str, wanted: &str) -> bool {
    let (cell, wanted) = (cell.trim(), wanted.trim());
    !cell.is_empty() && !wanted.is_empty() && (cell.starts_with(wanted) || wanted.starts_with(cell))
}

/// Reads the export from disk. UTF-8 is taken as-is; anything else is decoded as EUC-KR.
pub fn load_targets(path: &Path, filter: &TargetFilter) -> Result<Vec<Target>, AppError> {
    if !path.exists() {
        return Err(AppError::Listing(format!("{} not found.", path.display())));
    }
    let bytes = std::fs::read(path)?;
    let html = decode_listing(&bytes);
    let targets = parse_listing(&html, filter)?;
    tracing::info!("Loaded {} targets from {}", targets.len(), path.display());
    Ok(targets)
}

pub fn decode_listing(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => {
            let (text, _, had_errors) = encoding_rs::EUC_KR.decode(bytes);
            if had_errors {
                tracing::warn!("Listing contains bytes that are neither UTF-8 nor EUC-KR; they were replaced");
            }
            text.into_owned()
        }
    }
}

/// Parses the listing table and applies `filter`. Duplicate codes keep their first row.
pub fn parse_listing(html: &str, filter: &TargetFilter) -> Result<Vec<Target>, AppError> {
    let document = Html::parse_document(html);

    let mut data_rows = 0usize;
    let mut seen = HashSet::new();
    let mut targets = Vec::new();

    for row in document.select(&ROW_SELECTOR) {
        if row.select(&HEADER_CELL_SELECTOR).next().is_some() {
            continue;
        }
        let cells: Vec<String> = row
            .select(&DATA_CELL_SELECTOR)
            .map(|cell| collapse_whitespace(&cell.text().collect::<String>()))
            .collect();
        if cells.len() < MIN_COLUMNS {
            continue;
        }
        data_rows += 1;

        let stock_code = normalize_stock_code(&cells[COL_CODE]);
        if !is_valid_stock_code(&stock_code) {
            tracing::debug!("Skipping row with unusable stock code '{}'", cells[COL_CODE]);
            continue;
        }

        let market = cells[COL_MARKET].clone();
        if !filter.markets.is_empty() && !filter.markets.iter().any(|m| market_matches(&market, m)) {
            continue;
        }

        let industry = cells[COL_INDUSTRY].clone();
        if filter.excluded_industry.as_deref() == Some(industry.as_str()) {
            continue;
        }

        if let (Some(cutoff), Some(listed_on)) = (filter.listed_before, cells.get(COL_LISTED_ON)) {
            match NaiveDate::parse_from_str(listed_on, "%Y-%m-%d") {
                Ok(date) if date >= cutoff => continue,
                Ok(_) => {}
                Err(_) => tracing::debug!("Unparseable listing date '{}' for {}, keeping", listed_on, stock_code),
            }
        }

        if !seen.insert(stock_code.clone()) {
            continue;
        }
        targets.push(Target {
            company_name: cells[COL_COMPANY].clone(),
            market,
            stock_code,
            industry,
        });
    }

    if data_rows == 0 {
        return Err(AppError::Listing(format!(
            "no table rows with at least {} columns found",
            MIN_COLUMNS
        )));
    }
    Ok(targets)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"<html><head><meta http-equiv="Content-Type" content="text/html; charset=euc-kr"></head>
<body><table>
<tr><th>회사명</th><th>시장구분</th><th>종목코드</th><th>업종</th><th>주요제품</th><th>상장일</th><th>결산월</th></tr>
<tr><td>삼성전자</td><td>유가증권</td><td style="mso-number-format:'\@'">5930</td><td>통신 및 방송 장비 제조업</td><td>반도체</td><td>1975-06-11</td><td>12월</td></tr>
<tr><td>메리츠금융지주</td><td>유가증권</td><td>138040</td><td>금융 지원 서비스업</td><td>지주회사</td><td>2011-05-31</td><td>12월</td></tr>
<tr><td>에이피알</td><td>유가증권</td><td>278470</td><td>기타 화학제품 제조업</td><td>화장품</td><td>2024-02-27</td><td>12월</td></tr>
<tr><td>알테오젠</td><td>코스닥</td><td>196170</td><td>자연과학 및 공학 연구개발업</td><td>바이오</td><td>2014-12-12</td><td>12월</td></tr>
<tr><td>코넥스사</td><td>코넥스</td><td>'0008Z0</td><td>소프트웨어 개발 및 공급업</td><td>SW</td><td>2016-01-01</td><td>12월</td></tr>
<tr><td>중복삼성</td><td>유가증권</td><td>005930</td><td>중복</td><td>-</td><td>1975-06-11</td><td>12월</td></tr>
<tr><td>빈코드</td><td>유가증권</td><td>nan</td><td>업종</td><td>-</td><td>2000-01-01</td><td>12월</td></tr>
</table></body></html>"#;

    #[test]
    fn normalizes_stock_codes() {
        assert_eq!(normalize_stock_code("5930"), "005930");
        assert_eq!(normalize_stock_code(" '005930' "), "005930");
        assert_eq!(normalize_stock_code("0008z0"), "0008Z0");
        assert_eq!(normalize_stock_code(""), "");
        assert_eq!(normalize_stock_code("nan"), "");
        assert_eq!(normalize_stock_code("NaN"), "");
    }

    #[test]
    fn parses_listing_without_filters() {
        let targets = parse_listing(LISTING, &TargetFilter::default()).unwrap();
        let codes: Vec<&str> = targets.iter().map(|t| t.stock_code.as_str()).collect();
        assert_eq!(codes, vec!["005930", "138040", "278470", "196170", "0008Z0"]);
        assert_eq!(targets[0].company_name, "삼성전자");
        assert_eq!(targets[0].industry, "통신 및 방송 장비 제조업");
        assert_eq!(targets[3].market, "코스닥");
    }

    #[test]
    fn applies_market_cutoff_and_industry_filters() {
        let filter = TargetFilter {
            markets: vec!["유가증권".to_string(), "코스닥".to_string()],
            listed_before: NaiveDate::from_ymd_opt(2024, 1, 1),
            excluded_industry: Some("금융 지원 서비스업".to_string()),
        };
        let targets = parse_listing(LISTING, &filter).unwrap();
        let codes: Vec<&str> = targets.iter().map(|t| t.stock_code.as_str()).collect();
        assert_eq!(codes, vec!["005930", "196170"]);
    }

    #[test]
    fn short_market_labels_match() {
        let html = LISTING.replace("<td>유가증권</td>", "<td>유가</td>");
        let filter = TargetFilter {
            markets: vec!["유가증권".to_string(), "코스닥".to_string()],
            ..TargetFilter::default()
        };
        let targets = parse_listing(&html, &filter).unwrap();
        let codes: Vec<&str> = targets.iter().map(|t| t.stock_code.as_str()).collect();
        assert_eq!(codes, vec!["005930", "138040", "278470", "196170"]);
        assert!(!market_matches("코넥스", "코스닥"));
    }

    #[test]
    fn rejects_unexpected_shape() {
        let html = "<table><tr><td>only</td><td>two</td></tr></table>";
        assert!(matches!(
            parse_listing(html, &TargetFilter::default()),
            Err(AppError::Listing(_))
        ));
    }

    #[test]
    fn decodes_euc_kr_export() {
        let (encoded, _, _) = encoding_rs::EUC_KR.encode(LISTING);
        assert!(std::str::from_utf8(&encoded).is_err());
        assert_eq!(decode_listing(&encoded), LISTING);
    }

    #[test]
    fn load_reports_missing_file() {
        let tmp = tempfile::tempdir().unwrap();
        let err = load_targets(&tmp.path().join("상장법인목록.xls"), &TargetFilter::default()).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }
}
