use crate::document::{Document, Subtask, SubtaskStatus};
use crate::subjects::StatementType;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub mod memory;
pub mod sqlite;

pub use self::memory::MemoryStore;
pub use self::sqlite::SqliteStore;

/// One extracted statement amount. At most one row exists per
/// (entity, statement, subject, period year); a `None` value is a recorded
/// outcome ("looked for, not found") and is distinct from an absent row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialValue {
    pub edinet_code: String,
    pub statement: StatementType,
    pub subject_id: String,
    pub period_year: i32,
    pub value: Option<i64>,
}

/// Computed corporate value for one company and fiscal period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub edinet_code: String,
    pub period: NaiveDate,
    pub corporate_value: f64,
    pub analyzed_at: DateTime<Utc>,
}

/// Display-ready projection: the latest valuation per company.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorporateView {
    pub edinet_code: String,
    pub latest_period: NaiveDate,
    pub latest_corporate_value: f64,
    pub updated_at: DateTime<Utc>,
}

/// Read/write contract for document rows and their subtask statuses.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert the document if unknown; an existing row keeps its statuses.
    async fn register_document(&self, document: &Document) -> Result<()>;

    async fn document(&self, document_id: &str) -> Result<Option<Document>>;

    async fn documents_by_submit_date(&self, submit_date: NaiveDate) -> Result<Vec<Document>>;

    /// The filing covering (entity, fiscal year) of the given document type,
    /// used to attribute missing-valuation-input blame.
    async fn find_document(
        &self,
        edinet_code: &str,
        doc_type_code: &str,
        period_year: i32,
    ) -> Result<Option<Document>>;

    async fn update_status(
        &self,
        document_id: &str,
        subtask: Subtask,
        status: SubtaskStatus,
    ) -> Result<()>;

    async fn set_removed(&self, document_id: &str, removed: bool) -> Result<()>;
}

/// Read/write contract for extracted subject values.
#[async_trait]
pub trait FinancialValueStore: Send + Sync {
    async fn upsert_value(&self, value: &FinancialValue) -> Result<()>;

    async fn value(
        &self,
        edinet_code: &str,
        statement: StatementType,
        subject_id: &str,
        period_year: i32,
    ) -> Result<Option<FinancialValue>>;
}

/// Read/write contract for valuation results and the corporate view.
#[async_trait]
pub trait AnalysisStore: Send + Sync {
    async fn insert_result(&self, result: &AnalysisResult) -> Result<()>;

    async fn result(&self, edinet_code: &str, period: NaiveDate) -> Result<Option<AnalysisResult>>;

    async fn all_results(&self) -> Result<Vec<AnalysisResult>>;

    async fn upsert_view(&self, view: &CorporateView) -> Result<()>;

    async fn views(&self) -> Result<Vec<CorporateView>>;
}

/// Everything the pipeline and the valuation engine need from persistence.
pub trait Store: DocumentStore + FinancialValueStore + AnalysisStore {}

impl<T: DocumentStore + FinancialValueStore + AnalysisStore> Store for T {}
