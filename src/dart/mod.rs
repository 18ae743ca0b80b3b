// src/dart/mod.rs
pub mod client;
pub mod corp_codes;
pub mod models;

#[cfg(test)]
pub mod fake;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::dart::models::{Disclosure, FinancialRow, SubDocument};
use crate::utils::error::DartError;

pub use client::DartClient;

/// The remote calls the collector makes. Each call is a single attempt;
/// retrying is the caller's business (see `utils::retry`).
#[async_trait]
pub trait FilingService: Send + Sync {
    /// Loads whatever every later call depends on. Runs once before the first
    /// entity; an error here aborts the run.
    async fn prepare(&self) -> Result<(), DartError> {
        Ok(())
    }

    /// Disclosures for a stock code or an 8-digit corp code filed on or after `since`.
    async fn list_filings(
        &self,
        identifier: &str,
        since: NaiveDate,
        kind: &str,
    ) -> Result<Vec<Disclosure>, DartError>;

    /// Corp code registered under exactly this company name, if any.
    async fn find_corp_code(&self, company_name: &str) -> Result<Option<String>, DartError>;

    /// Table of contents of a filing, in document order.
    async fn sub_documents(&self, receipt_no: &str) -> Result<Vec<SubDocument>, DartError>;

    /// Raw markup behind a sub-document URL.
    async fn fetch_document(&self, url: &str) -> Result<String, DartError>;

    async fn financial_statements(
        &self,
        identifier: &str,
        business_year: i32,
        report_code: &str,
    ) -> Result<Vec<FinancialRow>, DartError>;
}
