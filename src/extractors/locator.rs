// src/extractors/locator.rs
use std::fmt;

use chrono::{Datelike, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::dart::models::Disclosure;
use crate::dart::FilingService;
use crate::utils::error::ErrorCategory;
use crate::utils::retry::{CallFailure, RetryPolicy};

const BUSINESS_REPORT_TITLE: &str = "사업보고서";

static YEAR_TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\d{4}\b").expect("Failed to compile YEAR_TOKEN_RE"));

/// The business report picked for an entity, plus the identifier that found it.
/// Later calls (financials) must reuse `query_identifier`, not the original stock code.
#[derive(Debug, Clone, PartialEq)]
pub struct LocatedReport {
    pub receipt_no: String,
    pub report_name: String,
    pub receipt_date: String,
    pub query_identifier: String,
}

/// Why the corp code fallback failed.
#[derive(Debug, Clone, PartialEq)]
pub enum LookupFailure {
    NotFound,
    Query(CallFailure),
}

impl fmt::Display for LookupFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LookupFailure::NotFound => f.write_str("corp_code_not_found"),
            LookupFailure::Query(failure) => write!(f, "{}", failure),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LocateFailure {
    /// The disclosure list could not be queried at all.
    ListQuery(CallFailure),
    /// The entity could not be resolved to a DART corp code.
    Lookup(LookupFailure),
    NoDisclosure { since: NaiveDate },
    NoBusinessReport { year: i32 },
}

impl LocateFailure {
    /// Failures that mean "couldn't check" rather than "checked, nothing there".
    pub fn is_lookup_error(&self) -> bool {
        matches!(self, LocateFailure::ListQuery(_) | LocateFailure::Lookup(_))
    }
}

impl fmt::Display for LocateFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocateFailure::ListQuery(failure) => write!(f, "{}", failure),
            LocateFailure::Lookup(detail) => write!(f, "lookup_error:{}", detail),
            LocateFailure::NoDisclosure { since } => write!(f, "no_disclosure_from_{}", since.year()),
            LocateFailure::NoBusinessReport { year } => write!(f, "no_{}_business_report", year),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocateError {
    pub reason: LocateFailure,
    pub query_identifier: String,
}

impl fmt::Display for LocateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.reason.fmt(f)
    }
}

pub struct ReportLocator<'a> {
    service: &'a dyn FilingService,
    retry: RetryPolicy,
    since: NaiveDate,
    kind: String,
    target_year: i32,
}

impl<'a> ReportLocator<'a> {
    pub fn new(
        service: &'a dyn FilingService,
        retry: RetryPolicy,
        since: NaiveDate,
        kind: impl Into<String>,
        target_year: i32,
    ) -> Self {
        Self {
            service,
            retry,
            since,
            kind: kind.into(),
            target_year,
        }
    }

    /// Finds the entity's business report for the target year.
    ///
    /// Queries by stock code first. When DART rejects the stock code, or the query fails
    /// and the code is not purely numeric, the corp code is resolved by company name and
    /// the query is repeated with it.
    pub async fn locate(&self, stock_code: &str, company_name: &str) -> Result<LocatedReport, LocateError> {
        let mut query_identifier = stock_code.to_string();
        let mut listing = self.list(stock_code).await;

        let fall_back = match &listing {
            Err(failure) if needs_corp_code_fallback(stock_code, failure) => {
                tracing::info!(
                    "Listing by stock code {} failed ({}), resolving corp code for '{}'",
                    stock_code, failure, company_name
                );
                true
            }
            _ => false,
        };
        if fall_back {
            match self.resolve_corp_code(company_name).await {
                Ok(corp_code) => {
                    query_identifier = corp_code;
                    listing = self.list(&query_identifier).await;
                }
                Err(detail) => {
                    return Err(LocateError {
                        reason: LocateFailure::Lookup(detail),
                        query_identifier,
                    })
                }
            }
        }

        let fail = |reason: LocateFailure| LocateError {
            reason,
            query_identifier: query_identifier.clone(),
        };

        let rows = listing.map_err(|failure| fail(LocateFailure::ListQuery(failure)))?;
        if rows.is_empty() {
            return Err(fail(LocateFailure::NoDisclosure { since: self.since }));
        }

        let report = select_business_report(&rows, self.target_year)
            .ok_or_else(|| fail(LocateFailure::NoBusinessReport { year: self.target_year }))?;

        tracing::debug!("Selected '{}' ({}) via {}", report.report_nm, report.rcept_no, query_identifier);
        Ok(LocatedReport {
            receipt_no: report.rcept_no.trim().to_string(),
            report_name: report.report_nm.clone(),
            receipt_date: report.rcept_dt.clone(),
            query_identifier: query_identifier.clone(),
        })
    }

    async fn list(&self, identifier: &str) -> Result<Vec<Disclosure>, CallFailure> {
        self.retry
            .run("dart_list", || self.service.list_filings(identifier, self.since, &self.kind))
            .await
    }

    async fn resolve_corp_code(&self, company_name: &str) -> Result<String, LookupFailure> {
        let found = self
            .retry
            .run("find_corp_code", || self.service.find_corp_code(company_name))
            .await
            .map_err(LookupFailure::Query)?;
        match found.map(|code| code.trim().to_string()) {
            Some(code) if !code.is_empty() => Ok(code),
            _ => Err(LookupFailure::NotFound),
        }
    }
}

fn needs_corp_code_fallback(stock_code: &str, failure: &CallFailure) -> bool {
    failure.category == ErrorCategory::InvalidIdentifier
        || stock_code.chars().any(|c| !c.is_ascii_digit())
}

/// True for titles like "사업보고서 (2024.12)" or "[기재정정]사업보고서 (2024.12)".
pub fn is_business_report_for(title: &str, year: i32) -> bool {
    let Some(pos) = title.find(BUSINESS_REPORT_TITLE) else {
        return false;
    };
    let wanted = year.to_string();
    YEAR_TOKEN_RE
        .find_iter(&title[pos..])
        .any(|m| m.as_str() == wanted)
}

/// Earliest matching report by receipt date, then receipt number.
pub fn select_business_report(rows: &[Disclosure], year: i32) -> Option<&Disclosure> {
    rows.iter()
        .filter(|row| is_business_report_for(&row.report_nm, year))
        .min_by_key(|&row| (filing_date(row), row.rcept_no.trim()))
}

/// `rcept_dt`, or the date prefix of the receipt number when the row carries none.
fn filing_date(row: &Disclosure) -> &str {
    let date = row.rcept_dt.trim();
    if !date.is_empty() {
        return date;
    }
    let receipt = row.rcept_no.trim();
    receipt.get(..8).unwrap_or(receipt)
}
