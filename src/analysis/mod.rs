//! The analysis side: resolving valuation inputs out of the value store and
//! computing the per-company corporate value.

use crate::document::{Document, Subtask};
use crate::storage::{
    AnalysisResult, AnalysisStore, CorporateView, DocumentStore, FinancialValueStore, Store,
};
use crate::subjects::{
    subjects_of_outline, BsCategory, PlCategory, StatementType, NUMBER_OF_SHARES_SUBJECT_ID,
};
use crate::tracker::RetryTracker;
use anyhow::Result;
use chrono::{NaiveDate, Utc};
use std::sync::Arc;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnalysisSummary {
    pub analyzed: usize,
    pub missing_inputs: usize,
    pub skipped: usize,
}

pub struct ValuationEngine {
    store: Arc<dyn Store>,
    tracker: RetryTracker,
}

impl ValuationEngine {
    pub fn new(store: Arc<dyn Store>, tracker: RetryTracker) -> Self {
        Self { store, tracker }
    }

    /// Compute the corporate value for one filing.
    ///
    /// Inputs resolve in formula order; the first one that cannot be resolved
    /// pushes a failed attempt onto the owning scrape subtask and the engine
    /// returns no result. One missing line item degrades only this filing.
    pub async fn calculate(&self, document: &Document) -> Result<Option<f64>> {
        let inputs = [
            Input::Pl(PlCategory::OperatingProfit),
            Input::Bs(BsCategory::TotalCurrentAssets),
            Input::Bs(BsCategory::TotalCurrentLiabilities),
            Input::Bs(BsCategory::TotalInvestmentsAndOtherAssets),
            Input::Bs(BsCategory::TotalFixedLiabilities),
            Input::Shares,
        ];

        let mut resolved = Vec::with_capacity(inputs.len());
        for input in inputs {
            match self.resolve(document, input).await? {
                Some(value) => resolved.push(value as f64),
                None => {
                    self.blame_missing_input(document, input).await?;
                    return Ok(None);
                }
            }
        }

        let [op, tca, tcl, tioa, tfl, shares] = resolved[..] else {
            unreachable!("six inputs resolved above");
        };
        Ok(Some((op * 10.0 + tca - tcl * 1.2 + tioa - tfl) / shares))
    }

    /// Value every analyzable filing submitted on the given date and refresh
    /// the corporate view for the companies touched.
    pub async fn analyze_submit_date(&self, date: NaiveDate) -> Result<AnalysisSummary> {
        let documents = self.store.documents_by_submit_date(date).await?;
        let mut summary = AnalysisSummary::default();
        let mut touched = Vec::new();

        for document in &documents {
            if !document.is_analyzable() {
                summary.skipped += 1;
                continue;
            }
            match self.calculate(document).await? {
                Some(value) => {
                    self.store
                        .insert_result(&AnalysisResult {
                            edinet_code: document.edinet_code.clone(),
                            period: document.period,
                            corporate_value: value,
                            analyzed_at: Utc::now(),
                        })
                        .await?;
                    touched.push(document.edinet_code.clone());
                    summary.analyzed += 1;
                }
                None => summary.missing_inputs += 1,
            }
        }

        touched.sort();
        touched.dedup();
        for edinet_code in &touched {
            self.refresh_view(edinet_code).await?;
        }

        log::info!(
            "{}: {} valued / {} missing inputs / {} not ready",
            date,
            summary.analyzed,
            summary.missing_inputs,
            summary.skipped
        );
        Ok(summary)
    }

    /// Re-derive the company's view row from its stored results.
    pub async fn refresh_view(&self, edinet_code: &str) -> Result<()> {
        let latest = self
            .store
            .all_results()
            .await?
            .into_iter()
            .filter(|r| r.edinet_code == edinet_code)
            .max_by_key(|r| r.period);
        if let Some(result) = latest {
            self.store
                .upsert_view(&CorporateView {
                    edinet_code: result.edinet_code,
                    latest_period: result.period,
                    latest_corporate_value: result.corporate_value,
                    updated_at: Utc::now(),
                })
                .await?;
        }
        Ok(())
    }

    /// Push a failed attempt onto the scrape subtask that owns the missing
    /// input. The target is looked up as the stored filing covering the
    /// (entity, document type, fiscal year), so blame lands on the row the
    /// pipeline retries even when the caller holds a stale copy.
    async fn blame_missing_input(&self, document: &Document, input: Input) -> Result<()> {
        let subtask = input.owning_subtask();
        let target = self
            .store
            .find_document(
                &document.edinet_code,
                &document.doc_type_code,
                document.period_year(),
            )
            .await?
            .map(|d| d.document_id)
            .unwrap_or_else(|| document.document_id.clone());
        log::warn!(
            "{}: no {} for {} {}, blaming {}",
            target,
            input.describe(),
            document.edinet_code,
            document.period_year(),
            subtask
        );
        self.tracker.record_failure(&target, subtask).await?;
        Ok(())
    }

    async fn resolve(&self, document: &Document, input: Input) -> Result<Option<i64>> {
        let year = document.period_year();
        let code = &document.edinet_code;
        match input {
            Input::Shares => {
                let stored = self
                    .store
                    .value(
                        code,
                        StatementType::NumberOfShares,
                        NUMBER_OF_SHARES_SUBJECT_ID,
                        year,
                    )
                    .await?;
                Ok(stored.and_then(|v| v.value))
            }
            Input::Bs(category) => {
                self.resolve_outline(code, StatementType::BalanceSheet, category.outline_id(), year)
                    .await
            }
            Input::Pl(category) => {
                self.resolve_outline(code, StatementType::ProfitAndLoss, category.outline_id(), year)
                    .await
            }
        }
    }

    /// First non-null value among the category's detail subjects, in the
    /// fixed ascending detail-id order.
    async fn resolve_outline(
        &self,
        edinet_code: &str,
        statement: StatementType,
        outline_id: &str,
        period_year: i32,
    ) -> Result<Option<i64>> {
        for subject in subjects_of_outline(statement, outline_id) {
            let stored = self
                .store
                .value(edinet_code, statement, subject.id, period_year)
                .await?;
            if let Some(value) = stored.and_then(|v| v.value) {
                return Ok(Some(value));
            }
        }
        Ok(None)
    }
}

#[derive(Debug, Clone, Copy)]
enum Input {
    Bs(BsCategory),
    Pl(PlCategory),
    Shares,
}

impl Input {
    fn owning_subtask(self) -> Subtask {
        match self {
            Input::Bs(_) => Subtask::ScrapedBs,
            Input::Pl(_) => Subtask::ScrapedPl,
            Input::Shares => Subtask::ScrapedNumberOfShares,
        }
    }

    fn describe(self) -> &'static str {
        match self {
            Input::Bs(category) => category.subject_name(),
            Input::Pl(category) => category.subject_name(),
            Input::Shares => "発行済株式総数",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{SubtaskStatus, DEFAULT_RETRY_BUDGET};
    use crate::storage::{DocumentStore, FinancialValue, FinancialValueStore, MemoryStore};

    fn document() -> Document {
        let mut doc = Document::new(
            "S100TEST",
            "E00001",
            "120",
            NaiveDate::from_ymd_opt(2021, 6, 25).unwrap(),
            NaiveDate::from_ymd_opt(2021, 3, 31).unwrap(),
        );
        doc.scraped_bs = SubtaskStatus::DONE;
        doc.scraped_pl = SubtaskStatus::DONE;
        doc.scraped_number_of_shares = SubtaskStatus::DONE;
        doc
    }

    async fn put(store: &MemoryStore, statement: StatementType, subject_id: &str, value: Option<i64>) {
        store
            .upsert_value(&FinancialValue {
                edinet_code: "E00001".to_string(),
                statement,
                subject_id: subject_id.to_string(),
                period_year: 2021,
                value,
            })
            .await
            .unwrap();
    }

    async fn engine_with_document() -> (ValuationEngine, Arc<MemoryStore>, Document) {
        let store = Arc::new(MemoryStore::new());
        let doc = document();
        store.register_document(&doc).await.unwrap();
        let tracker = RetryTracker::new(store.clone(), DEFAULT_RETRY_BUDGET);
        (ValuationEngine::new(store.clone(), tracker), store, doc)
    }

    async fn put_complete_inputs(store: &MemoryStore) {
        put(store, StatementType::ProfitAndLoss, "1", Some(100)).await;
        put(store, StatementType::BalanceSheet, "1", Some(500)).await;
        put(store, StatementType::BalanceSheet, "6", Some(200)).await;
        put(store, StatementType::BalanceSheet, "3", Some(50)).await;
        put(store, StatementType::BalanceSheet, "8", Some(80)).await;
        put(store, StatementType::NumberOfShares, "0", Some(1000)).await;
    }

    #[tokio::test]
    async fn computes_the_formula() {
        let (engine, store, doc) = engine_with_document().await;
        put_complete_inputs(&store).await;

        let value = engine.calculate(&doc).await.unwrap().unwrap();
        // (100*10 + 500 - 200*1.2 + 50 - 80) / 1000
        assert!((value - 1.23).abs() < 1e-9);
    }

    #[tokio::test]
    async fn missing_shares_blames_only_the_shares_subtask() {
        let (engine, store, doc) = engine_with_document().await;
        put_complete_inputs(&store).await;
        put(&store, StatementType::NumberOfShares, "0", None).await;

        assert_eq!(engine.calculate(&doc).await.unwrap(), None);

        let stored = store.document("S100TEST").await.unwrap().unwrap();
        assert_eq!(stored.scraped_number_of_shares.code(), 2);
        assert!(stored.scraped_bs.is_done());
        assert!(stored.scraped_pl.is_done());
    }

    #[tokio::test]
    async fn blame_targets_the_stored_filing_for_the_period() {
        let (engine, store, doc) = engine_with_document().await;
        put_complete_inputs(&store).await;
        put(&store, StatementType::NumberOfShares, "0", None).await;

        // A caller holding an out-of-date copy still pushes the failure onto
        // the row the pipeline retries.
        let mut stale = doc.clone();
        stale.document_id = "S100STALE".to_string();
        assert_eq!(engine.calculate(&stale).await.unwrap(), None);

        let stored = store.document("S100TEST").await.unwrap().unwrap();
        assert_eq!(stored.scraped_number_of_shares.code(), 2);
    }

    #[tokio::test]
    async fn detail_subjects_tie_break_by_ascending_id() {
        let (engine, store, doc) = engine_with_document().await;
        put_complete_inputs(&store).await;
        // Current assets: detail 1 recorded as null, alias detail 2 carries
        // the amount. The alias must win over "absent".
        put(&store, StatementType::BalanceSheet, "1", None).await;
        put(&store, StatementType::BalanceSheet, "2", Some(500)).await;

        let value = engine.calculate(&doc).await.unwrap().unwrap();
        assert!((value - 1.23).abs() < 1e-9);
    }

    #[tokio::test]
    async fn first_missing_input_wins_the_blame() {
        let (engine, store, doc) = engine_with_document().await;
        // No inputs at all: operating profit is checked first.
        assert_eq!(engine.calculate(&doc).await.unwrap(), None);

        let stored = store.document("S100TEST").await.unwrap().unwrap();
        assert_eq!(stored.scraped_pl.code(), 2);
        assert!(stored.scraped_bs.is_done());
        assert!(stored.scraped_number_of_shares.is_done());
    }

    #[tokio::test]
    async fn analyze_writes_result_and_view() {
        let (engine, store, doc) = engine_with_document().await;
        put_complete_inputs(&store).await;

        let summary = engine.analyze_submit_date(doc.submit_date).await.unwrap();
        assert_eq!(summary.analyzed, 1);
        assert_eq!(summary.missing_inputs, 0);

        let result = store
            .result("E00001", doc.period)
            .await
            .unwrap()
            .unwrap();
        assert!((result.corporate_value - 1.23).abs() < 1e-9);

        let views = store.views().await.unwrap();
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].latest_period, doc.period);
    }

    #[tokio::test]
    async fn analyze_skips_documents_that_are_not_ready() {
        let (engine, store, _doc) = engine_with_document().await;
        put_complete_inputs(&store).await;

        let mut pending = Document::new(
            "S100PEND",
            "E00002",
            "120",
            NaiveDate::from_ymd_opt(2021, 6, 25).unwrap(),
            NaiveDate::from_ymd_opt(2021, 3, 31).unwrap(),
        );
        pending.scraped_bs = SubtaskStatus::DONE;
        store.register_document(&pending).await.unwrap();

        let summary = engine
            .analyze_submit_date(NaiveDate::from_ymd_opt(2021, 6, 25).unwrap())
            .await
            .unwrap();
        assert_eq!(summary.analyzed, 1);
        assert_eq!(summary.skipped, 1);
    }
}
