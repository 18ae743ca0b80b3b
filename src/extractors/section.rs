// src/extractors/section.rs

// --- Imports ---
use std::fmt;
use std::ops::Range;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::dart::FilingService;
use crate::utils::html::html_to_text;
use crate::utils::retry::{CallFailure, RetryPolicy};

// --- Regex Patterns for Title Matching (Lazy Static) ---
// Start of the business-content chapter: "II. 사업의 내용", or "사업 현황" in older layouts.
static BUSINESS_START_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"사업의\s*내용|사업\s*현황").expect("Failed to compile BUSINESS_START_RE")
});

// The financial chapter ("III. 재무에 관한 사항") closes the business section.
static BUSINESS_END_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"재무에\s*관한\s*사항").expect("Failed to compile BUSINESS_END_RE")
});

// Any later top-level chapter also closes it, for filings whose financial heading is worded differently.
static CHAPTER_MARKER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:III|IV|V|VI|VII)\.").expect("Failed to compile CHAPTER_MARKER_RE")
});

const FRAGMENT_SEPARATOR: &str = "\n\n";

// --- Data Structures ---
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractFailure {
    /// The sub-document tree could not be fetched.
    SubDocs(CallFailure),
    SubDocsEmpty,
    SectionNotFound,
    /// Nothing usable was collected and at least one document fetch failed.
    DocsFetchFailedOrEmpty { fetch_errors: usize },
    DocsEmpty,
    /// Documents came back with markup but no text.
    EmptyAfterCleaning,
}

impl fmt::Display for ExtractFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtractFailure::SubDocs(failure) => write!(f, "{}", failure),
            ExtractFailure::SubDocsEmpty => f.write_str("sub_docs_empty"),
            ExtractFailure::SectionNotFound => f.write_str("business_section_not_found"),
            ExtractFailure::DocsFetchFailedOrEmpty { .. } => f.write_str("business_docs_fetch_failed_or_empty"),
            ExtractFailure::DocsEmpty => f.write_str("business_docs_empty"),
            ExtractFailure::EmptyAfterCleaning => f.write_str("business_description_empty_after_cleaning"),
        }
    }
}

/// Locates the business section among a filing's sub-document titles.
///
/// The start is the first title matching the business-content pattern. The end is the first
/// later title naming the financial chapter or opening with a III–VII chapter numeral;
/// without one the section runs to the end of the list. Returns `None` if no title starts it.
pub fn find_section_bounds<T: AsRef<str>>(titles: &[T]) -> Option<Range<usize>> {
    let start = titles
        .iter()
        .position(|title| BUSINESS_START_RE.is_match(title.as_ref().trim()))?;

    let end = titles[start + 1..]
        .iter()
        .position(|title| {
            let title = title.as_ref().trim();
            BUSINESS_END_RE.is_match(title) || CHAPTER_MARKER_RE.is_match(title)
        })
        .map(|offset| start + 1 + offset)
        .unwrap_or(titles.len());

    Some(start..end)
}

// --- Main Extractor Structure ---
pub struct SectionExtractor<'a> {
    service: &'a dyn FilingService,
    retry: RetryPolicy,
}

impl<'a> SectionExtractor<'a> {
    pub fn new(service: &'a dyn FilingService, retry: RetryPolicy) -> Self {
        Self { service, retry }
    }

    /// Extracts the plain-text business description of the filing `receipt_no`.
    pub async fn extract(&self, receipt_no: &str) -> Result<String, ExtractFailure> {
        // 1. Fetch the filing's table of contents
        let sub_docs = self
            .retry
            .run("sub_docs", || self.service.sub_documents(receipt_no))
            .await
            .map_err(ExtractFailure::SubDocs)?;
        if sub_docs.is_empty() {
            return Err(ExtractFailure::SubDocsEmpty);
        }

        // 2. Find the section boundaries by title
        let titles: Vec<&str> = sub_docs.iter().map(|doc| doc.title.as_str()).collect();
        let bounds = find_section_bounds(&titles).ok_or(ExtractFailure::SectionNotFound)?;
        tracing::debug!(
            "Business section for {} spans sub-documents {}..{} ('{}' .. {})",
            receipt_no,
            bounds.start,
            bounds.end,
            titles[bounds.start],
            titles.get(bounds.end).copied().unwrap_or("<end>")
        );

        // 3. Fetch and clean every document in the section; one bad page doesn't sink the rest
        let mut fragments = Vec::new();
        let mut fetch_errors = 0usize;
        let mut markup_only = 0usize;
        for doc in &sub_docs[bounds] {
            let url = doc.url.trim();
            if url.is_empty() {
                tracing::debug!("Sub-document '{}' has no URL, skipping", doc.title);
                continue;
            }
            match self.retry.run("document", || self.service.fetch_document(url)).await {
                Ok(html) => {
                    let cleaned = html_to_text(&html);
                    if !cleaned.is_empty() {
                        fragments.push(cleaned);
                    } else if !html.trim().is_empty() {
                        markup_only += 1;
                    }
                }
                Err(failure) => {
                    tracing::warn!(
                        "Failed to fetch '{}' ({}) after {} attempt(s): {}",
                        doc.title, url, failure.attempts, failure.message
                    );
                    fetch_errors += 1;
                }
            }
        }

        // 4. Join, or explain why there is nothing to join
        if fragments.is_empty() {
            return Err(if fetch_errors > 0 {
                ExtractFailure::DocsFetchFailedOrEmpty { fetch_errors }
            } else if markup_only > 0 {
                ExtractFailure::EmptyAfterCleaning
            } else {
                ExtractFailure::DocsEmpty
            });
        }

        let description = fragments.join(FRAGMENT_SEPARATOR).trim().to_string();
        if description.is_empty() {
            return Err(ExtractFailure::EmptyAfterCleaning);
        }
        tracing::info!(
            "Extracted business description for {}: {} chars from {} document(s), {} fetch error(s)",
            receipt_no,
            description.chars().count(),
            fragments.len(),
            fetch_errors
        );
        Ok(description)
    }
}

// --- Tests ---
#[cfg(test)]
mod tests {
    use super::*;
    use crate::dart::fake::{sub_doc, FakeDart, Reply};
    use std::time::Duration;

    fn extractor(service: &FakeDart) -> SectionExtractor<'_> {
        SectionExtractor::new(service, RetryPolicy::new(3, Duration::ZERO))
    }

    #[test]
    fn bounds_stop_at_financial_chapter() {
        let titles = ["표지", "사업의 내용", "이사회 관련", "재무에 관한 사항"];
        assert_eq!(find_section_bounds(&titles), Some(1..3));
    }

    #[test]
    fn bounds_stop_at_roman_numeral_chapter() {
        let titles = [
            "I. 회사의 개요",
            "II. 사업의 내용",
            "1. 사업의 개요",
            "2. 주요 제품 및 서비스",
            "IV. 이사의 경영진단 및 분석의견",
            "V. 회계감사인의 감사의견 등",
        ];
        assert_eq!(find_section_bounds(&titles), Some(1..4));
    }

    #[test]
    fn bounds_run_to_end_without_boundary() {
        let titles = ["표지", "II. 사업의 내용", "1. 사업의 개요", "2. 원재료 및 생산설비"];
        assert_eq!(find_section_bounds(&titles), Some(1..4));
    }

    #[test]
    fn bounds_missing_start() {
        let titles = ["표지", "I. 회사의 개요", "III. 재무에 관한 사항"];
        assert_eq!(find_section_bounds(&titles), None);
        assert_eq!(find_section_bounds::<&str>(&[]), None);
    }

    #[test]
    fn start_title_itself_is_not_an_end() {
        // "사업 현황" start followed directly by the end of the list
        let titles = ["가. 사업 현황"];
        assert_eq!(find_section_bounds(&titles), Some(0..1));
    }

    #[tokio::test]
    async fn extracts_and_joins_section_text() {
        let fake = FakeDart::new().with_filing(
            "005930",
            "사업보고서 (2024.12)",
            "20250311001085",
            &[
                ("표지", "<p>표지</p>"),
                ("II. 사업의 내용", "<h2>II. 사업의 내용</h2>"),
                ("1. 사업의 개요", "<p>당사는   반도체를</p><p>제조합니다.</p>"),
                ("III. 재무에 관한 사항", "<p>재무</p>"),
            ],
        );
        let text = extractor(&fake).extract("20250311001085").await.unwrap();
        assert_eq!(text, "II. 사업의 내용\n\n당사는 반도체를 제조합니다.");
        assert_eq!(fake.calls_mentioning("/20250311001085/3"), 0);
        assert_eq!(fake.calls_mentioning("/20250311001085/0"), 0);
    }

    #[tokio::test]
    async fn no_start_match_fetches_nothing() {
        let fake = FakeDart::new().with_filing(
            "000001",
            "사업보고서 (2024.12)",
            "R1",
            &[("표지", "<p>x</p>"), ("I. 회사의 개요", "<p>y</p>")],
        );
        let err = extractor(&fake).extract("R1").await.unwrap_err();
        assert_eq!(err.to_string(), "business_section_not_found");
        assert_eq!(fake.calls(), vec!["sub_documents:R1"]);
    }

    #[tokio::test]
    async fn sub_docs_failures() {
        let mut fake = FakeDart::new();
        fake.sub_docs.insert("R1".into(), Reply::Timeout);
        fake.sub_docs.insert("R2".into(), Reply::Ok(Vec::new()));

        let err = extractor(&fake).extract("R1").await.unwrap_err();
        assert_eq!(err.to_string(), "sub_docs_error:Timeout");
        assert_eq!(fake.calls_mentioning("sub_documents:R1"), 3);

        let err = extractor(&fake).extract("R2").await.unwrap_err();
        assert_eq!(err, ExtractFailure::SubDocsEmpty);
    }

    #[tokio::test]
    async fn partial_fetch_failure_keeps_other_fragments() {
        let mut fake = FakeDart::new();
        fake.sub_docs.insert(
            "R1".into(),
            Reply::Ok(vec![
                sub_doc(0, "II. 사업의 내용", "u0"),
                sub_doc(1, "1. 사업의 개요", "u1"),
                sub_doc(2, "2. 주요 제품", ""),
            ]),
        );
        fake.documents.insert("u0".into(), Reply::Timeout);
        fake.documents.insert("u1".into(), Reply::Ok("<p>개요</p>".into()));

        let text = extractor(&fake).extract("R1").await.unwrap();
        assert_eq!(text, "개요");
        assert_eq!(fake.calls_mentioning("fetch_document:u0"), 3);
    }

    #[tokio::test]
    async fn empty_outcomes_are_distinguished() {
        let mut fake = FakeDart::new();
        fake.sub_docs.insert("FAILED".into(), Reply::Ok(vec![sub_doc(0, "사업의 내용", "missing")]));
        fake.sub_docs.insert("BLANK".into(), Reply::Ok(vec![sub_doc(0, "사업의 내용", "blank")]));
        fake.sub_docs.insert("MARKUP".into(), Reply::Ok(vec![sub_doc(0, "사업의 내용", "markup")]));
        fake.documents.insert("blank".into(), Reply::Ok("   ".into()));
        fake.documents.insert("markup".into(), Reply::Ok("<div><br/></div>".into()));

        let ex = extractor(&fake);
        assert_eq!(
            ex.extract("FAILED").await.unwrap_err(),
            ExtractFailure::DocsFetchFailedOrEmpty { fetch_errors: 1 }
        );
        assert_eq!(ex.extract("BLANK").await.unwrap_err(), ExtractFailure::DocsEmpty);
        assert_eq!(
            ex.extract("MARKUP").await.unwrap_err().to_string(),
            "business_description_empty_after_cleaning"
        );
    }
}
