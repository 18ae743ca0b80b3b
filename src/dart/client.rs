// src/dart/client.rs
use std::path::Path;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;
use tokio::sync::OnceCell;

use crate::config::DartConfig;
use crate::dart::corp_codes::CorpRegistry;
use crate::dart::models::{
    Disclosure, FinancialResponse, FinancialRow, ListResponse, SubDocument, STATUS_NO_DATA, STATUS_OK,
};
use crate::dart::FilingService;
use crate::utils::error::DartError;
use crate::utils::html::collapse_whitespace;

const LIST_PAGE_COUNT: &str = "100";

// The viewer page builds its table of contents with blocks of script assignments:
//   node1['text'] = "II. 사업의 내용"; node1['id'] = "7"; node1['rcpNo'] = "..."; ...
static TOC_NODE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r#"node\d+\['text'\]\s*=\s*"(?P<text>.*?)";\s*"#,
        r#"node\d+\['id'\]\s*=\s*"\d*";\s*"#,
        r#"node\d+\['rcpNo'\]\s*=\s*"(?P<rcp>\d+)";\s*"#,
        r#"node\d+\['dcmNo'\]\s*=\s*"(?P<dcm>\d+)";\s*"#,
        r#"node\d+\['eleId'\]\s*=\s*"(?P<ele>\d+)";\s*"#,
        r#"node\d+\['offset'\]\s*=\s*"(?P<offset>\d+)";\s*"#,
        r#"node\d+\['length'\]\s*=\s*"(?P<length>\d+)";\s*"#,
        r#"node\d+\['dtd'\]\s*=\s*"(?P<dtd>[^"]*)";"#,
    ))
    .expect("Failed to compile TOC_NODE_RE")
});

// Single-document filings have no tree, only the initial viewDoc(...) call.
static VIEW_DOC_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"viewDoc\('(?P<rcp>\d+)',\s*'(?P<dcm>\d+)',\s*(?P<ele>[^,]*),\s*(?P<offset>[^,]*),\s*(?P<length>[^,]*),\s*'(?P<dtd>[^']*)'"#)
        .expect("Failed to compile VIEW_DOC_RE")
});

static PAGE_TITLE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<title>(?P<title>.*?)</title>").expect("Failed to compile PAGE_TITLE_RE")
});

/// HTTP implementation of [`FilingService`] against OpenDART and the DART web viewer.
pub struct DartClient {
    config: DartConfig,
    http: reqwest::Client,
    registry: OnceCell<CorpRegistry>,
}

impl DartClient {
    pub fn new(config: DartConfig) -> Result<Self, DartError> {
        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            config,
            http,
            registry: OnceCell::new(),
        })
    }

    /// Client with the corp code registry already in memory (no download, no cache file).
    #[cfg(test)]
    pub fn with_registry(config: DartConfig, registry: CorpRegistry) -> Result<Self, DartError> {
        let mut client = Self::new(config)?;
        client.registry = OnceCell::new_with(Some(registry));
        Ok(client)
    }

    /// Loads the corp code registry once per process. A failed load leaves the cell
    /// empty so the next call tries again.
    async fn registry(&self) -> Result<&CorpRegistry, DartError> {
        self.registry.get_or_try_init(|| self.load_registry()).await
    }

    async fn load_registry(&self) -> Result<CorpRegistry, DartError> {
        let cache = &self.config.corp_code_cache;
        match cache_age(cache).await {
            Some(age) if age <= self.config.corp_code_max_age => match tokio::fs::read_to_string(cache).await {
                Ok(xml) => match CorpRegistry::from_xml(&xml) {
                    Ok(registry) => {
                        tracing::info!("Loaded {} corp codes from {}", registry.len(), cache.display());
                        return Ok(registry);
                    }
                    Err(e) => tracing::warn!("Ignoring unreadable corp code cache {}: {}", cache.display(), e),
                },
                Err(e) => tracing::warn!("Could not read corp code cache {}: {}", cache.display(), e),
            },
            Some(age) => tracing::info!(
                "Corp code cache {} is {}h old, refreshing",
                cache.display(),
                age.as_secs() / 3600
            ),
            None => {}
        }

        let url = format!("{}/corpCode.xml", self.config.api_base);
        tracing::info!("Downloading corp code registry from: {}", url);
        let response = self
            .http
            .get(&url)
            .query(&[("crtfc_key", self.config.api_key.as_str())])
            .send()
            .await?;
        check_status(response.status(), &url)?;
        let bytes = response.bytes().await?;
        if let Some(rejection) = CorpRegistry::rejection(&bytes) {
            tracing::error!("Corp code download rejected: {}", rejection);
            return Err(rejection);
        }

        let xml = CorpRegistry::unpack_zip(&bytes)?;
        let registry = CorpRegistry::from_xml(&xml)?;
        if let Err(e) = write_cache(cache, &xml).await {
            tracing::warn!("Failed to cache corp codes at {}: {}", cache.display(), e);
        }
        tracing::info!("Loaded {} corp codes from DART", registry.len());
        Ok(registry)
    }

    /// OpenDART endpoints take the 8-digit corp code. Stock codes are translated
    /// through the registry; anything it does not know is rejected.
    async fn resolve_corp_code(&self, identifier: &str) -> Result<String, DartError> {
        let identifier = identifier.trim();
        if identifier.len() == 8 && identifier.chars().all(|c| c.is_ascii_digit()) {
            return Ok(identifier.to_string());
        }
        let registry = self.registry().await?;
        registry
            .corp_code_for_stock(&identifier.to_uppercase())
            .map(str::to_string)
            .ok_or_else(|| DartError::InvalidIdentifier(identifier.to_string()))
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, &str)],
    ) -> Result<T, DartError> {
        let url = format!("{}/{}", self.config.api_base, endpoint);
        tracing::debug!("GET {} {:?}", url, params);
        let response = self
            .http
            .get(&url)
            .query(&[("crtfc_key", self.config.api_key.as_str())])
            .query(params)
            .send()
            .await?;
        check_status(response.status(), &url)?;
        Ok(response.json::<T>().await?)
    }

    async fn get_text(&self, url: &str) -> Result<String, DartError> {
        let response = self
            .http
            .get(url)
            .header(reqwest::header::ACCEPT, "text/html,application/xhtml+xml,*/*")
            .send()
            .await?;
        check_status(response.status(), url)?;
        let body = response.text().await?;
        tracing::debug!("Downloaded {} bytes from {}", body.len(), url);
        Ok(body)
    }
}

#[async_trait]
impl FilingService for DartClient {
    async fn prepare(&self) -> Result<(), DartError> {
        let registry = self.registry().await?;
        tracing::info!("Corp code registry ready: {} entries", registry.len());
        Ok(())
    }

    async fn list_filings(
        &self,
        identifier: &str,
        since: NaiveDate,
        kind: &str,
    ) -> Result<Vec<Disclosure>, DartError> {
        let corp_code = self.resolve_corp_code(identifier).await?;
        let bgn_de = since.format("%Y%m%d").to_string();

        let mut disclosures = Vec::new();
        let mut page_no: u32 = 1;
        loop {
            let page_param = page_no.to_string();
            let page: ListResponse = self
                .get_json(
                    "list.json",
                    &[
                        ("corp_code", corp_code.as_str()),
                        ("bgn_de", bgn_de.as_str()),
                        ("pblntf_ty", kind),
                        ("page_no", page_param.as_str()),
                        ("page_count", LIST_PAGE_COUNT),
                    ],
                )
                .await?;

            match page.status.as_str() {
                STATUS_OK => {}
                STATUS_NO_DATA => break,
                _ => {
                    return Err(DartError::Api {
                        status: page.status,
                        message: page.message,
                    })
                }
            }
            disclosures.extend(page.list);
            if page.total_page <= page_no {
                break;
            }
            page_no += 1;
        }

        tracing::debug!("{} disclosures for {} since {}", disclosures.len(), identifier, since);
        Ok(disclosures)
    }

    async fn find_corp_code(&self, company_name: &str) -> Result<Option<String>, DartError> {
        let registry = self.registry().await?;
        Ok(registry.find_by_name(company_name).map(str::to_string))
    }

    async fn sub_documents(&self, receipt_no: &str) -> Result<Vec<SubDocument>, DartError> {
        let url = format!("{}/dsaf001/main.do?rcpNo={}", self.config.viewer_base, receipt_no);
        let page = self.get_text(&url).await?;
        Ok(parse_sub_documents(&page, &self.config.viewer_base))
    }

    async fn fetch_document(&self, url: &str) -> Result<String, DartError> {
        self.get_text(url).await
    }

    async fn financial_statements(
        &self,
        identifier: &str,
        business_year: i32,
        report_code: &str,
    ) -> Result<Vec<FinancialRow>, DartError> {
        let corp_code = self.resolve_corp_code(identifier).await?;
        let year = business_year.to_string();
        let response: FinancialResponse = self
            .get_json(
                "fnlttSinglAcnt.json",
                &[
                    ("corp_code", corp_code.as_str()),
                    ("bsns_year", year.as_str()),
                    ("reprt_code", report_code),
                ],
            )
            .await?;

        match response.status.as_str() {
            STATUS_OK => Ok(response.list),
            STATUS_NO_DATA => Ok(Vec::new()),
            _ => Err(DartError::Api {
                status: response.status,
                message: response.message,
            }),
        }
    }
}

/// Extracts the table of contents from a `dsaf001/main.do` viewer page.
pub fn parse_sub_documents(page: &str, viewer_base: &str) -> Vec<SubDocument> {
    let viewer_url = |rcp: &str, dcm: &str, ele: &str, offset: &str, length: &str, dtd: &str| {
        format!(
            "{}/report/viewer.do?rcpNo={}&dcmNo={}&eleId={}&offset={}&length={}&dtd={}",
            viewer_base, rcp, dcm, ele, offset, length, dtd
        )
    };

    let docs: Vec<SubDocument> = TOC_NODE_RE
        .captures_iter(page)
        .enumerate()
        .map(|(index, caps)| SubDocument {
            index,
            title: clean_title(&caps["text"]),
            url: viewer_url(&caps["rcp"], &caps["dcm"], &caps["ele"], &caps["offset"], &caps["length"], &caps["dtd"]),
        })
        .collect();
    if !docs.is_empty() {
        return docs;
    }

    let Some(caps) = VIEW_DOC_RE.captures(page) else {
        tracing::debug!("Viewer page has neither a table of contents nor a viewDoc call");
        return Vec::new();
    };
    let arg = |name: &str| {
        let raw = caps[name].trim().trim_matches('\'');
        if raw == "null" { String::new() } else { raw.to_string() }
    };
    let title = PAGE_TITLE_RE
        .captures(page)
        .map(|c| clean_title(&c["title"]))
        .unwrap_or_default();
    vec![SubDocument {
        index: 0,
        title,
        url: viewer_url(&caps["rcp"], &caps["dcm"], &arg("ele"), &arg("offset"), &arg("length"), &caps["dtd"]),
    }]
}

fn clean_title(raw: &str) -> String {
    collapse_whitespace(&raw.replace("&nbsp;", " ").replace("&#160;", " "))
}

fn check_status(status: reqwest::StatusCode, url: &str) -> Result<(), DartError> {
    if status.is_success() {
        return Ok(());
    }
    tracing::warn!("HTTP error status: {} for URL: {}", status, url);
    Err(DartError::Http(status))
}

/// Time since the cache file was last written, or `None` if there is no usable file.
async fn cache_age(path: &Path) -> Option<Duration> {
    let modified = tokio::fs::metadata(path).await.ok()?.modified().ok()?;
    Some(SystemTime::now().duration_since(modified).unwrap_or_default())
}

async fn write_cache(path: &Path, xml: &str) -> Result<(), std::io::Error> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    tokio::fs::write(path, xml).await
}
