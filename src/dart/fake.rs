// src/dart/fake.rs
//! Scripted in-memory [`FilingService`] for unit tests. Records every call.
use std::collections::HashMap;
use std::io::ErrorKind;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::dart::models::{Disclosure, FinancialRow, SubDocument};
use crate::dart::FilingService;
use crate::utils::error::DartError;

/// Canned answer for a call. Errors are rebuilt on every call since `DartError` is not `Clone`.
#[derive(Debug, Clone)]
pub enum Reply<T> {
    Ok(T),
    Timeout,
    Invalid,
    NotFound,
}

impl<T: Clone> Reply<T> {
    fn produce(&self, what: &str) -> Result<T, DartError> {
        match self {
            Reply::Ok(value) => Ok(value.clone()),
            Reply::Timeout => Err(DartError::Io(std::io::Error::new(
                ErrorKind::TimedOut,
                format!("{} timed out", what),
            ))),
            Reply::Invalid => Err(DartError::InvalidIdentifier(what.to_string())),
            Reply::NotFound => Err(DartError::Http(reqwest::StatusCode::NOT_FOUND)),
        }
    }
}

#[derive(Default)]
pub struct FakeDart {
    pub filings: HashMap<String, Reply<Vec<Disclosure>>>,
    pub corp_codes: HashMap<String, Reply<Option<String>>>,
    pub sub_docs: HashMap<String, Reply<Vec<SubDocument>>>,
    pub documents: HashMap<String, Reply<String>>,
    pub financials: HashMap<String, Reply<Vec<FinancialRow>>>,
    calls: Mutex<Vec<String>>,
}

impl FakeDart {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Calls whose argument mentions `needle` (stock code, corp code, receipt or URL).
    pub fn calls_mentioning(&self, needle: &str) -> usize {
        self.calls().iter().filter(|c| c.contains(needle)).count()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    /// Registers a filing with a sub-document tree where every entry has a document.
    pub fn with_filing(mut self, stock_code: &str, report_nm: &str, rcept_no: &str, titles: &[(&str, &str)]) -> Self {
        let rows = vec![disclosure(report_nm, rcept_no)];
        self.filings.insert(stock_code.to_string(), Reply::Ok(rows));
        let docs = titles
            .iter()
            .enumerate()
            .map(|(index, (title, body))| {
                let url = format!("https://viewer.test/{}/{}", rcept_no, index);
                self.documents.insert(url.clone(), Reply::Ok(body.to_string()));
                SubDocument {
                    index,
                    title: title.to_string(),
                    url,
                }
            })
            .collect();
        self.sub_docs.insert(rcept_no.to_string(), Reply::Ok(docs));
        self
    }
}

pub fn disclosure(report_nm: &str, rcept_no: &str) -> Disclosure {
    Disclosure {
        corp_code: String::new(),
        corp_name: String::new(),
        stock_code: String::new(),
        report_nm: report_nm.to_string(),
        rcept_no: rcept_no.to_string(),
        flr_nm: String::new(),
        rcept_dt: rcept_no.chars().take(8).collect(),
        rm: String::new(),
    }
}

pub fn sub_doc(index: usize, title: &str, url: &str) -> SubDocument {
    SubDocument {
        index,
        title: title.to_string(),
        url: url.to_string(),
    }
}

#[async_trait]
impl FilingService for FakeDart {
    async fn list_filings(&self, identifier: &str, _since: NaiveDate, _kind: &str) -> Result<Vec<Disclosure>, DartError> {
        self.record(format!("list_filings:{}", identifier));
        match self.filings.get(identifier) {
            Some(reply) => reply.produce(identifier),
            None => Ok(Vec::new()),
        }
    }

    async fn find_corp_code(&self, company_name: &str) -> Result<Option<String>, DartError> {
        self.record(format!("find_corp_code:{}", company_name));
        match self.corp_codes.get(company_name) {
            Some(reply) => reply.produce(company_name),
            None => Ok(None),
        }
    }

    async fn sub_documents(&self, receipt_no: &str) -> Result<Vec<SubDocument>, DartError> {
        self.record(format!("sub_documents:{}", receipt_no));
        match self.sub_docs.get(receipt_no) {
            Some(reply) => reply.produce(receipt_no),
            None => Ok(Vec::new()),
        }
    }

    async fn fetch_document(&self, url: &str) -> Result<String, DartError> {
        self.record(format!("fetch_document:{}", url));
        match self.documents.get(url) {
            Some(reply) => reply.produce(url),
            None => Reply::<String>::NotFound.produce(url),
        }
    }

    async fn financial_statements(&self, identifier: &str, _business_year: i32, _report_code: &str) -> Result<Vec<FinancialRow>, DartError> {
        self.record(format!("financial_statements:{}", identifier));
        match self.financials.get(identifier) {
            Some(reply) => reply.produce(identifier),
            None => Ok(Vec::new()),
        }
    }
}
