// src/extractors/financials.rs
use std::collections::BTreeMap;

use crate::dart::models::FinancialRow;
use crate::dart::FilingService;
use crate::utils::retry::RetryPolicy;

const CONSOLIDATED: &str = "CFS";
const STANDALONE: &str = "OFS";

/// Best-effort key-account snapshot (account name -> current-term amount).
/// Never fails: any error yields an empty map.
pub struct FinancialFetcher<'a> {
    service: &'a dyn FilingService,
    retry: RetryPolicy,
    business_year: i32,
    report_code: String,
}

impl<'a> FinancialFetcher<'a> {
    pub fn new(service: &'a dyn FilingService, retry: RetryPolicy, business_year: i32, report_code: impl Into<String>) -> Self {
        Self {
            service,
            retry,
            business_year,
            report_code: report_code.into(),
        }
    }

    pub async fn fetch(&self, identifier: &str) -> BTreeMap<String, String> {
        let rows = self
            .retry
            .run("finstate", || {
                self.service
                    .financial_statements(identifier, self.business_year, &self.report_code)
            })
            .await;
        match rows {
            Ok(rows) => select_statement(&rows),
            Err(failure) => {
                tracing::debug!(
                    "No {} financials for {} ({}): {}",
                    self.business_year, identifier, failure, failure.message
                );
                BTreeMap::new()
            }
        }
    }
}

/// Consolidated rows if there are any, standalone rows otherwise.
/// Rows without an account name or amount are dropped.
pub fn select_statement(rows: &[FinancialRow]) -> BTreeMap<String, String> {
    let consolidated: Vec<&FinancialRow> = rows.iter().filter(|r| r.fs_div == CONSOLIDATED).collect();
    let chosen = if consolidated.is_empty() {
        rows.iter().filter(|r| r.fs_div == STANDALONE).collect()
    } else {
        consolidated
    };

    chosen
        .into_iter()
        .filter(|r| !r.account_nm.trim().is_empty() && !r.thstrm_amount.trim().is_empty())
        .map(|r| (r.account_nm.trim().to_string(), r.thstrm_amount.trim().to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dart::fake::{FakeDart, Reply};
    use std::time::Duration;

    fn row(div: &str, name: &str, amount: &str) -> FinancialRow {
        FinancialRow {
            fs_div: div.into(),
            account_nm: name.into(),
            thstrm_amount: amount.into(),
        }
    }

    #[test]
    fn consolidated_preferred() {
        let rows = vec![
            row("OFS", "매출액", "100"),
            row("CFS", "매출액", "250"),
            row("CFS", "영업이익", "30"),
            row("CFS", "", "1"),
            row("CFS", "당기순이익", ""),
        ];
        let picked = select_statement(&rows);
        assert_eq!(picked.len(), 2);
        assert_eq!(picked["매출액"], "250");
        assert_eq!(picked["영업이익"], "30");
    }

    #[test]
    fn standalone_fallback() {
        let rows = vec![row("OFS", "자산총계", "1,000")];
        assert_eq!(select_statement(&rows)["자산총계"], "1,000");
        assert!(select_statement(&[]).is_empty());
    }

    #[tokio::test]
    async fn errors_are_swallowed() {
        let mut fake = FakeDart::new();
        fake.financials.insert("005930".into(), Reply::Timeout);
        let fetcher = FinancialFetcher::new(&fake, RetryPolicy::new(2, Duration::ZERO), 2023, "11011");
        assert!(fetcher.fetch("005930").await.is_empty());
        assert_eq!(fake.calls_mentioning("financial_statements:005930"), 2);
    }
}
