use super::{
    AnalysisResult, AnalysisStore, CorporateView, DocumentStore, FinancialValue,
    FinancialValueStore,
};
use crate::document::{Document, Subtask, SubtaskStatus};
use crate::subjects::StatementType;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::RwLock;

type ValueKey = (String, StatementType, String, i32);

/// Map-backed store for tests and dry runs.
#[derive(Default)]
pub struct MemoryStore {
    documents: RwLock<HashMap<String, Document>>,
    values: RwLock<HashMap<ValueKey, FinancialValue>>,
    results: RwLock<HashMap<(String, NaiveDate), AnalysisResult>>,
    views: RwLock<HashMap<String, CorporateView>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn register_document(&self, document: &Document) -> Result<()> {
        let mut documents = self.documents.write().unwrap();
        documents
            .entry(document.document_id.clone())
            .or_insert_with(|| document.clone());
        Ok(())
    }

    async fn document(&self, document_id: &str) -> Result<Option<Document>> {
        Ok(self.documents.read().unwrap().get(document_id).cloned())
    }

    async fn documents_by_submit_date(&self, submit_date: NaiveDate) -> Result<Vec<Document>> {
        let mut documents: Vec<Document> = self
            .documents
            .read()
            .unwrap()
            .values()
            .filter(|d| d.submit_date == submit_date)
            .cloned()
            .collect();
        documents.sort_by(|a, b| a.document_id.cmp(&b.document_id));
        Ok(documents)
    }

    async fn find_document(
        &self,
        edinet_code: &str,
        doc_type_code: &str,
        period_year: i32,
    ) -> Result<Option<Document>> {
        Ok(self
            .documents
            .read()
            .unwrap()
            .values()
            .find(|d| {
                d.edinet_code == edinet_code
                    && d.doc_type_code == doc_type_code
                    && d.period_year() == period_year
            })
            .cloned())
    }

    async fn update_status(
        &self,
        document_id: &str,
        subtask: Subtask,
        status: SubtaskStatus,
    ) -> Result<()> {
        let mut documents = self.documents.write().unwrap();
        let document = documents
            .get_mut(document_id)
            .ok_or_else(|| anyhow!("unknown document: {}", document_id))?;
        document.set_status(subtask, status);
        Ok(())
    }

    async fn set_removed(&self, document_id: &str, removed: bool) -> Result<()> {
        let mut documents = self.documents.write().unwrap();
        let document = documents
            .get_mut(document_id)
            .ok_or_else(|| anyhow!("unknown document: {}", document_id))?;
        document.removed = removed;
        Ok(())
    }
}

#[async_trait]
impl FinancialValueStore for MemoryStore {
    async fn upsert_value(&self, value: &FinancialValue) -> Result<()> {
        let key = (
            value.edinet_code.clone(),
            value.statement,
            value.subject_id.clone(),
            value.period_year,
        );
        self.values.write().unwrap().insert(key, value.clone());
        Ok(())
    }

    async fn value(
        &self,
        edinet_code: &str,
        statement: StatementType,
        subject_id: &str,
        period_year: i32,
    ) -> Result<Option<FinancialValue>> {
        let key = (
            edinet_code.to_string(),
            statement,
            subject_id.to_string(),
            period_year,
        );
        Ok(self.values.read().unwrap().get(&key).cloned())
    }
}

#[async_trait]
impl AnalysisStore for MemoryStore {
    async fn insert_result(&self, result: &AnalysisResult) -> Result<()> {
        self.results
            .write()
            .unwrap()
            .entry((result.edinet_code.clone(), result.period))
            .or_insert_with(|| result.clone());
        Ok(())
    }

    async fn result(&self, edinet_code: &str, period: NaiveDate) -> Result<Option<AnalysisResult>> {
        Ok(self
            .results
            .read()
            .unwrap()
            .get(&(edinet_code.to_string(), period))
            .cloned())
    }

    async fn all_results(&self) -> Result<Vec<AnalysisResult>> {
        let mut results: Vec<AnalysisResult> =
            self.results.read().unwrap().values().cloned().collect();
        results.sort_by(|a, b| (&a.edinet_code, a.period).cmp(&(&b.edinet_code, b.period)));
        Ok(results)
    }

    async fn upsert_view(&self, view: &CorporateView) -> Result<()> {
        self.views
            .write()
            .unwrap()
            .insert(view.edinet_code.clone(), view.clone());
        Ok(())
    }

    async fn views(&self) -> Result<Vec<CorporateView>> {
        let mut views: Vec<CorporateView> = self.views.read().unwrap().values().cloned().collect();
        views.sort_by(|a, b| a.edinet_code.cmp(&b.edinet_code));
        Ok(views)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn null_value_round_trip_is_distinct_from_absent_key() {
        let store = MemoryStore::new();
        let value = FinancialValue {
            edinet_code: "E00001".to_string(),
            statement: StatementType::BalanceSheet,
            subject_id: "1".to_string(),
            period_year: 2020,
            value: None,
        };
        store.upsert_value(&value).await.unwrap();

        let stored = store
            .value("E00001", StatementType::BalanceSheet, "1", 2020)
            .await
            .unwrap();
        assert_eq!(stored, Some(value));

        let absent = store
            .value("E00001", StatementType::BalanceSheet, "2", 2020)
            .await
            .unwrap();
        assert_eq!(absent, None);
    }

    #[tokio::test]
    async fn register_does_not_clobber_existing_statuses() {
        let store = MemoryStore::new();
        let date = NaiveDate::from_ymd_opt(2020, 9, 19).unwrap();
        let mut doc = Document::new("S100", "E00001", "120", date, date);
        store.register_document(&doc).await.unwrap();

        store
            .update_status("S100", Subtask::Downloaded, SubtaskStatus::DONE)
            .await
            .unwrap();

        // A later discovery pass re-registers the same filing.
        doc.downloaded = SubtaskStatus::PENDING;
        store.register_document(&doc).await.unwrap();

        let stored = store.document("S100").await.unwrap().unwrap();
        assert_eq!(stored.downloaded, SubtaskStatus::DONE);
    }
}
