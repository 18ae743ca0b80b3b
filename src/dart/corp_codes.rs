// src/dart/corp_codes.rs
use std::collections::HashMap;
use std::io::{Cursor, Read};

use crate::dart::models::CorpCodeEntry;
use crate::utils::error::DartError;

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

/// In-memory view of OpenDART's CORPCODE.xml: every filer with its 8-digit corp code
/// and, for listed companies, its 6-character stock code.
#[derive(Debug, Clone, Default)]
pub struct CorpRegistry {
    entries: Vec<CorpCodeEntry>,
    by_stock_code: HashMap<String, usize>,
}

impl CorpRegistry {
    pub fn from_entries(entries: Vec<CorpCodeEntry>) -> Self {
        let mut by_stock_code = HashMap::new();
        for (idx, entry) in entries.iter().enumerate() {
            if let Some(stock) = &entry.stock_code {
                by_stock_code.entry(stock.clone()).or_insert(idx);
            }
        }
        Self { entries, by_stock_code }
    }

    /// Parses the `<result><list>...</list></result>` document.
    pub fn from_xml(xml: &str) -> Result<Self, DartError> {
        let doc = roxmltree::Document::parse(xml)
            .map_err(|e| DartError::Parse(format!("CORPCODE.xml: {}", e)))?;

        let mut entries = Vec::new();
        for list in doc.descendants().filter(|n| n.has_tag_name("list")) {
            let field = |name: &str| {
                list.children()
                    .find(|c| c.has_tag_name(name))
                    .and_then(|c| c.text())
                    .map(|t| t.trim().to_string())
                    .unwrap_or_default()
            };
            let corp_code = field("corp_code");
            if corp_code.is_empty() {
                continue;
            }
            let stock_code = field("stock_code");
            entries.push(CorpCodeEntry {
                corp_code,
                corp_name: field("corp_name"),
                stock_code: (!stock_code.is_empty()).then_some(stock_code),
                modify_date: field("modify_date"),
            });
        }

        if entries.is_empty() {
            return Err(DartError::Parse("CORPCODE.xml contained no entries".to_string()));
        }
        tracing::debug!("Loaded {} corp code entries", entries.len());
        Ok(Self::from_entries(entries))
    }

    /// Pulls the XML document out of the zip archive served by `corpCode.xml`.
    pub fn unpack_zip(bytes: &[u8]) -> Result<String, DartError> {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
            .map_err(|e| DartError::Archive(e.to_string()))?;

        for i in 0..archive.len() {
            let mut file = archive
                .by_index(i)
                .map_err(|e| DartError::Archive(e.to_string()))?;
            if !file.name().to_ascii_lowercase().ends_with(".xml") {
                continue;
            }
            let mut xml = String::new();
            file.read_to_string(&mut xml)?;
            return Ok(xml);
        }
        Err(DartError::Archive("no XML document in corp code archive".to_string()))
    }

    /// OpenDART answers a rejected `corpCode.xml` request (bad key, quota) with a status
    /// document instead of the archive. Returns that status as an API error, or `None`
    /// when `bytes` look like a zip archive.
    pub fn rejection(bytes: &[u8]) -> Option<DartError> {
        if bytes.starts_with(ZIP_MAGIC) {
            return None;
        }
        let body = String::from_utf8_lossy(bytes);
        let body = body.trim();

        let from_json = serde_json::from_str::<serde_json::Value>(body).ok().map(|v| {
            let text = |key: &str| v.get(key).and_then(|x| x.as_str()).unwrap_or_default().to_string();
            (text("status"), text("message"))
        });
        let from_xml = || {
            let doc = roxmltree::Document::parse(body).ok()?;
            let text = |name: &str| {
                doc.descendants()
                    .find(|n| n.has_tag_name(name))
                    .and_then(|n| n.text())
                    .map(|t| t.trim().to_string())
                    .unwrap_or_default()
            };
            Some((text("status"), text("message")))
        };

        let (status, message) = from_json.or_else(from_xml).unwrap_or_default();
        Some(DartError::Api {
            status: if status.is_empty() { "unknown".to_string() } else { status },
            message: if message.is_empty() {
                "corp code download did not return an archive".to_string()
            } else {
                message
            },
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn corp_code_for_stock(&self, stock_code: &str) -> Option<&str> {
        self.by_stock_code
            .get(stock_code)
            .map(|&idx| self.entries[idx].corp_code.as_str())
    }

    /// Exact name match. Listed entries win over unlisted filers that share the name.
    pub fn find_by_name(&self, corp_name: &str) -> Option<&str> {
        let name = corp_name.trim();
        if name.is_empty() {
            return None;
        }
        let mut candidates = self.entries.iter().filter(|e| e.corp_name == name);
        let first = candidates.next()?;
        if first.stock_code.is_some() {
            return Some(first.corp_code.as_str());
        }
        candidates
            .find(|e| e.stock_code.is_some())
            .or(Some(first))
            .map(|e| e.corp_code.as_str())
    }
}
