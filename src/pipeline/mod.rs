//! The ingestion side: registering the day's filings and driving each one
//! through fetch, decode and the three scrape subtasks.

use crate::document::{Document, Subtask};
use crate::edinet::FilingGateway;
use crate::scrape::{self, ScrapeError};
use crate::storage::{DocumentStore, FinancialValue, FinancialValueStore, Store};
use crate::subjects::{scrape_keywords, StatementType, NUMBER_OF_SHARES_SUBJECT_ID};
use crate::tracker::RetryTracker;
use anyhow::Result;
use chrono::NaiveDate;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

/// EDINET document type code for annual securities reports, the only filing
/// kind this system processes.
pub const ANNUAL_SECURITIES_REPORT: &str = "120";

/// What happened to one document during a batch pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentOutcome {
    /// Every subtask is done.
    Completed,
    /// At least one subtask failed this pass; it stays queued for retry
    /// unless its counter exhausted.
    Partial(Vec<Subtask>),
    /// Removed after exhausting a retry budget; silently dropped.
    Excluded,
    /// Alive, but no subtask was eligible to run.
    Skipped,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub processed: usize,
    pub completed: usize,
    pub partial: usize,
    pub excluded: usize,
    pub skipped: usize,
}

#[derive(Clone)]
pub struct IngestionPipeline {
    gateway: Arc<dyn FilingGateway>,
    store: Arc<dyn Store>,
    tracker: RetryTracker,
    workers: usize,
    fetch_timeout: Duration,
}

impl IngestionPipeline {
    pub fn new(
        gateway: Arc<dyn FilingGateway>,
        store: Arc<dyn Store>,
        tracker: RetryTracker,
        workers: usize,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            gateway,
            store,
            tracker,
            workers,
            fetch_timeout,
        }
    }

    /// List the day's filings and register the annual securities reports.
    /// Listings without an entity code or period end cannot be analyzed and
    /// are dropped here. Re-registering a known document keeps its statuses.
    pub async fn register_targets(&self, date: NaiveDate) -> Result<usize> {
        let listings = self.gateway.list_filings(date).await?;
        let mut registered = 0;
        for listing in listings {
            if listing.doc_type_code.as_deref() != Some(ANNUAL_SECURITIES_REPORT) {
                continue;
            }
            let (edinet_code, period) = match (&listing.edinet_code, listing.period_end) {
                (Some(code), Some(period)) => (code.clone(), period),
                _ => {
                    log::info!("{}: missing entity code or period, skipping", listing.doc_id);
                    continue;
                }
            };
            let document = Document::new(
                listing.doc_id.clone(),
                edinet_code,
                ANNUAL_SECURITIES_REPORT,
                date,
                period,
            );
            self.store.register_document(&document).await?;
            registered += 1;
        }
        log::info!("{}: {} annual reports registered", date, registered);
        Ok(registered)
    }

    /// Run every pending subtask of every live document submitted on the
    /// given date, `workers` documents at a time.
    pub async fn run_batch(&self, date: NaiveDate) -> Result<BatchSummary> {
        let documents = self.store.documents_by_submit_date(date).await?;
        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut handles = Vec::with_capacity(documents.len());

        for document in documents {
            let pipeline = self.clone();
            let semaphore = semaphore.clone();
            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await?;
                pipeline.process_document(document).await
            }));
        }

        let mut summary = BatchSummary::default();
        for joined in futures::future::join_all(handles).await {
            summary.processed += 1;
            match joined? {
                Ok(DocumentOutcome::Completed) => summary.completed += 1,
                Ok(DocumentOutcome::Partial(_)) => summary.partial += 1,
                Ok(DocumentOutcome::Excluded) => summary.excluded += 1,
                Ok(DocumentOutcome::Skipped) => summary.skipped += 1,
                Err(e) => {
                    log::error!("document task failed: {:#}", e);
                    summary.partial += 1;
                }
            }
        }
        log::info!(
            "{}: batch done, {} completed / {} partial / {} excluded / {} skipped of {}",
            date,
            summary.completed,
            summary.partial,
            summary.excluded,
            summary.skipped,
            summary.processed
        );
        Ok(summary)
    }

    /// One pass over one document. Subtasks run in dependency order; a
    /// subtask already done or exhausted is not attempted again.
    pub async fn process_document(&self, mut document: Document) -> Result<DocumentOutcome> {
        if document.removed {
            return Ok(DocumentOutcome::Excluded);
        }
        let id = document.document_id.clone();
        let mut failed = Vec::new();
        let mut attempted = false;

        if self.tracker.should_run(&document, Subtask::Downloaded) {
            attempted = true;
            let fetch = tokio::time::timeout(self.fetch_timeout, self.gateway.fetch(&id)).await;
            match fetch {
                Ok(Ok(())) => self.succeed(&mut document, Subtask::Downloaded).await?,
                Ok(Err(e)) => {
                    log::warn!("{}: fetch failed: {:#}", id, e);
                    self.fail(&mut document, Subtask::Downloaded, &mut failed).await?;
                }
                Err(_) => {
                    log::warn!("{}: fetch timed out after {:?}", id, self.fetch_timeout);
                    self.fail(&mut document, Subtask::Downloaded, &mut failed).await?;
                }
            }
        }

        if !document.removed
            && document.downloaded.is_done()
            && self.tracker.should_run(&document, Subtask::Decoded)
        {
            attempted = true;
            match self.gateway.decode(&id).await {
                Ok(_) => self.succeed(&mut document, Subtask::Decoded).await?,
                Err(e) => {
                    log::warn!("{}: decode failed: {:#}", id, e);
                    self.fail(&mut document, Subtask::Decoded, &mut failed).await?;
                }
            }
        }

        let scrape_plan = [
            (Subtask::ScrapedBs, StatementType::BalanceSheet),
            (Subtask::ScrapedPl, StatementType::ProfitAndLoss),
            (Subtask::ScrapedNumberOfShares, StatementType::NumberOfShares),
        ];
        let needs_scrape = scrape_plan
            .iter()
            .any(|(subtask, _)| self.tracker.should_run(&document, *subtask));

        if needs_scrape && document.decoded.is_done() && !document.removed {
            match self.gateway.decode(&id).await {
                Ok(folder) => {
                    for (subtask, statement) in scrape_plan {
                        if document.removed || !self.tracker.should_run(&document, subtask) {
                            continue;
                        }
                        attempted = true;
                        match scrape_task(&folder, statement, &document) {
                            Ok(values) => {
                                for value in &values {
                                    self.store.upsert_value(value).await?;
                                }
                                log::debug!("{}: {} values from {}", id, values.len(), subtask);
                                self.succeed(&mut document, subtask).await?;
                            }
                            Err(e) => {
                                log::warn!("{}: {} failed: {}", id, subtask, e);
                                self.fail(&mut document, subtask, &mut failed).await?;
                            }
                        }
                    }
                }
                Err(e) => {
                    // The extracted folder went away after the decode step
                    // completed. Re-fail decode so the next pass redoes it
                    // and the counter still moves toward exhaustion.
                    log::warn!("{}: extracted folder unavailable: {:#}", id, e);
                    attempted = true;
                    self.fail(&mut document, Subtask::Decoded, &mut failed).await?;
                }
            }
        }

        if !failed.is_empty() {
            return Ok(DocumentOutcome::Partial(failed));
        }
        if !attempted {
            return Ok(DocumentOutcome::Skipped);
        }
        Ok(DocumentOutcome::Completed)
    }

    async fn succeed(&self, document: &mut Document, subtask: Subtask) -> Result<()> {
        self.tracker
            .record_success(&document.document_id, subtask)
            .await?;
        document.set_status(subtask, crate::document::SubtaskStatus::DONE);
        Ok(())
    }

    async fn fail(
        &self,
        document: &mut Document,
        subtask: Subtask,
        failed: &mut Vec<Subtask>,
    ) -> Result<()> {
        let next = self
            .tracker
            .record_failure(&document.document_id, subtask)
            .await?;
        document.set_status(subtask, next);
        if next.is_exhausted(self.tracker.budget()) {
            document.removed = true;
        }
        failed.push(subtask);
        Ok(())
    }
}

/// Scrape one statement out of the extracted folder. Synchronous on purpose:
/// parsed markup is not `Send`, so it must not be held across an await.
fn scrape_task(
    folder: &Path,
    statement: StatementType,
    document: &Document,
) -> Result<Vec<FinancialValue>, ScrapeError> {
    for entry in scrape_keywords(statement) {
        let path = match scrape::find_fragment(folder, entry.keyword)? {
            Some(path) => path,
            None => continue,
        };
        let html = scrape::read_fragment(&path)?;
        log::debug!(
            "{}: {} fragment at {}",
            document.document_id,
            entry.remarks,
            path.display()
        );

        let values = match statement {
            StatementType::NumberOfShares => {
                let raw = scrape::extract_share_count(&html, entry.keyword)?;
                vec![FinancialValue {
                    edinet_code: document.edinet_code.clone(),
                    statement,
                    subject_id: NUMBER_OF_SHARES_SUBJECT_ID.to_string(),
                    period_year: document.period_year(),
                    value: scrape::parse_number(&raw),
                }]
            }
            _ => scrape::scrape_statement(&html, entry.keyword, statement)?
                .into_iter()
                .map(|scraped| FinancialValue {
                    edinet_code: document.edinet_code.clone(),
                    statement,
                    subject_id: scraped.subject.id.to_string(),
                    period_year: document.period_year(),
                    value: scraped.value,
                })
                .collect(),
        };
        return Ok(values);
    }
    Err(ScrapeError::KeywordNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edinet::FilingListing;
    use async_trait::async_trait;
    use std::path::PathBuf;

    struct StubGateway {
        listings: Vec<FilingListing>,
    }

    #[async_trait]
    impl FilingGateway for StubGateway {
        async fn list_filings(&self, _date: NaiveDate) -> Result<Vec<FilingListing>> {
            Ok(self.listings.clone())
        }

        async fn fetch(&self, _document_id: &str) -> Result<()> {
            Ok(())
        }

        async fn decode(&self, _document_id: &str) -> Result<PathBuf> {
            Ok(PathBuf::from("/nonexistent"))
        }
    }

    fn listing(
        doc_id: &str,
        edinet_code: Option<&str>,
        doc_type_code: Option<&str>,
    ) -> FilingListing {
        FilingListing {
            doc_id: doc_id.to_string(),
            edinet_code: edinet_code.map(String::from),
            doc_type_code: doc_type_code.map(String::from),
            period_end: NaiveDate::from_ymd_opt(2021, 3, 31),
            submit_date_time: None,
        }
    }

    #[tokio::test]
    async fn register_keeps_only_complete_annual_reports() {
        let gateway = Arc::new(StubGateway {
            listings: vec![
                listing("S100AAAA", Some("E00001"), Some("120")),
                listing("S100BBBB", Some("E00002"), Some("140")),
                listing("S100CCCC", None, Some("120")),
            ],
        });
        let store = Arc::new(crate::storage::MemoryStore::new());
        let tracker = RetryTracker::new(store.clone(), crate::document::DEFAULT_RETRY_BUDGET);
        let pipeline = IngestionPipeline::new(
            gateway,
            store.clone(),
            tracker,
            2,
            Duration::from_secs(5),
        );

        let date = NaiveDate::from_ymd_opt(2021, 6, 25).unwrap();
        let registered = pipeline.register_targets(date).await.unwrap();
        assert_eq!(registered, 1);

        let documents = store.documents_by_submit_date(date).await.unwrap();
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].document_id, "S100AAAA");
        assert_eq!(documents[0].doc_type_code, ANNUAL_SECURITIES_REPORT);
    }
}
