use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// The `/documents.json` list endpoint response.
#[derive(Debug, Clone, Deserialize)]
pub struct ListResponse {
    pub metadata: ListMetadata,
    #[serde(default)]
    pub results: Vec<FilingListing>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListMetadata {
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
    pub resultset: Option<Resultset>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Resultset {
    pub count: u32,
}

/// One filing as listed by the EDINET API. Fields other than the document id
/// can be null for withdrawn or amended filings, so they stay optional here
/// and registration filters them out.
#[derive(Debug, Clone, Deserialize)]
pub struct FilingListing {
    #[serde(rename = "docID")]
    pub doc_id: String,
    #[serde(rename = "edinetCode")]
    pub edinet_code: Option<String>,
    #[serde(rename = "docTypeCode")]
    pub doc_type_code: Option<String>,
    #[serde(rename = "periodEnd")]
    pub period_end: Option<NaiveDate>,
    #[serde(rename = "submitDateTime")]
    pub submit_date_time: Option<String>,
}

/// Remote side of the pipeline: listing filings, pulling archives, and
/// resolving the extracted folder for a filing.
#[async_trait]
pub trait FilingGateway: Send + Sync {
    async fn list_filings(&self, date: NaiveDate) -> Result<Vec<FilingListing>>;

    /// Download the filing archive to local storage.
    async fn fetch(&self, document_id: &str) -> Result<()>;

    /// Resolve the folder holding the filing's extracted HTML fragments.
    /// Fails (retryably) until the archive has been extracted there.
    async fn decode(&self, document_id: &str) -> Result<PathBuf>;
}

pub struct EdinetClient {
    http: reqwest::Client,
    base_url: Url,
    data_dir: PathBuf,
}

impl EdinetClient {
    pub fn new(base_url: Url, data_dir: PathBuf, user_agent: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .gzip(true)
            .build()?;
        Ok(Self {
            http,
            base_url,
            data_dir,
        })
    }

    fn archive_path(&self, document_id: &str) -> PathBuf {
        self.data_dir.join("archives").join(format!("{}.zip", document_id))
    }

    fn decoded_path(&self, document_id: &str) -> PathBuf {
        self.data_dir.join("decoded").join(document_id)
    }
}

#[async_trait]
impl FilingGateway for EdinetClient {
    async fn list_filings(&self, date: NaiveDate) -> Result<Vec<FilingListing>> {
        let mut url = self.base_url.join("api/v1/documents.json")?;
        url.query_pairs_mut()
            .append_pair("date", &date.format("%Y-%m-%d").to_string())
            .append_pair("type", "2");

        log::debug!("listing filings for {}", date);
        let response: ListResponse = self
            .http
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .with_context(|| format!("malformed list response for {}", date))?;

        if response.metadata.status != "200" {
            return Err(anyhow!(
                "list request for {} refused: status {} ({})",
                date,
                response.metadata.status,
                response.metadata.message.unwrap_or_default()
            ));
        }

        log::info!("{}: {} filings listed", date, response.results.len());
        Ok(response.results)
    }

    async fn fetch(&self, document_id: &str) -> Result<()> {
        let mut url = self
            .base_url
            .join(&format!("api/v1/documents/{}", document_id))?;
        url.query_pairs_mut().append_pair("type", "1");

        let body = self
            .http
            .get(url)
            .send()
            .await?
            .error_for_status()
            .with_context(|| format!("fetch failed for {}", document_id))?
            .bytes()
            .await?;

        let path = self.archive_path(document_id);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &body)
            .await
            .with_context(|| format!("writing {}", path.display()))?;
        log::debug!("stored {} bytes at {}", body.len(), path.display());
        Ok(())
    }

    async fn decode(&self, document_id: &str) -> Result<PathBuf> {
        let folder = self.decoded_path(document_id);
        let meta = tokio::fs::metadata(&folder)
            .await
            .with_context(|| format!("no extracted folder for {}", document_id))?;
        if !meta.is_dir() {
            return Err(anyhow!("{} is not a directory", folder.display()));
        }
        if !has_body_fragments(&folder) {
            return Err(anyhow!(
                "extracted folder for {} has no body fragments yet",
                document_id
            ));
        }
        Ok(folder)
    }
}

/// Returns true when the folder contains at least one body fragment, used to
/// sanity-check an extracted filing before scraping starts.
pub fn has_body_fragments(folder: &Path) -> bool {
    std::fs::read_dir(folder)
        .map(|entries| {
            entries.flatten().any(|e| {
                e.file_name()
                    .to_string_lossy()
                    .contains(crate::scrape::locator::BODY_FILE_TOKEN)
            })
        })
        .unwrap_or(false)
}
