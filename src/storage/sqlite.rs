use super::{
    AnalysisResult, AnalysisStore, CorporateView, DocumentStore, FinancialValue,
    FinancialValueStore,
};
use crate::document::{Document, Subtask, SubtaskStatus};
use crate::subjects::StatementType;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::str::FromStr;

/// SQLite-backed store. Queries use the runtime API, so no live database is
/// needed at compile time.
pub struct SqliteStore {
    pool: SqlitePool,
    retry_budget: u8,
}

impl SqliteStore {
    pub async fn connect(database_url: &str, retry_budget: u8) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(16)
            .connect_with(options)
            .await?;

        let store = Self { pool, retry_budget };
        store.migrate().await?;
        log::info!("sqlite store ready at {}", database_url);
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS documents (
                document_id TEXT PRIMARY KEY,
                edinet_code TEXT NOT NULL,
                doc_type_code TEXT NOT NULL,
                submit_date TEXT NOT NULL,
                period TEXT NOT NULL,
                downloaded INTEGER NOT NULL DEFAULT 0,
                decoded INTEGER NOT NULL DEFAULT 0,
                scraped_bs INTEGER NOT NULL DEFAULT 0,
                scraped_pl INTEGER NOT NULL DEFAULT 0,
                scraped_number_of_shares INTEGER NOT NULL DEFAULT 0,
                removed INTEGER NOT NULL DEFAULT 0
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS financial_values (
                id INTEGER PRIMARY KEY,
                edinet_code TEXT NOT NULL,
                statement TEXT NOT NULL,
                subject_id TEXT NOT NULL,
                period_year INTEGER NOT NULL,
                value INTEGER,
                UNIQUE(edinet_code, statement, subject_id, period_year)
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS analysis_results (
                id INTEGER PRIMARY KEY,
                edinet_code TEXT NOT NULL,
                period TEXT NOT NULL,
                corporate_value REAL NOT NULL,
                analyzed_at TEXT NOT NULL,
                UNIQUE(edinet_code, period)
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS corporate_view (
                edinet_code TEXT PRIMARY KEY,
                latest_period TEXT NOT NULL,
                latest_corporate_value REAL NOT NULL,
                updated_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_documents_submit_date ON documents(submit_date)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    fn document_from_row(&self, row: &SqliteRow) -> Result<Document> {
        let status = |column: &str| -> Result<SubtaskStatus> {
            let code: i64 = row.try_get(column)?;
            SubtaskStatus::from_code(code as u8, self.retry_budget)
        };
        Ok(Document {
            document_id: row.try_get("document_id")?,
            edinet_code: row.try_get("edinet_code")?,
            doc_type_code: row.try_get("doc_type_code")?,
            submit_date: row.try_get("submit_date")?,
            period: row.try_get("period")?,
            downloaded: status("downloaded")?,
            decoded: status("decoded")?,
            scraped_bs: status("scraped_bs")?,
            scraped_pl: status("scraped_pl")?,
            scraped_number_of_shares: status("scraped_number_of_shares")?,
            removed: row.try_get::<i64, _>("removed")? != 0,
        })
    }
}

fn value_from_row(row: &SqliteRow) -> Result<FinancialValue> {
    let statement: String = row.try_get("statement")?;
    Ok(FinancialValue {
        edinet_code: row.try_get("edinet_code")?,
        statement: StatementType::from_str(&statement).map_err(|e| anyhow!(e))?,
        subject_id: row.try_get("subject_id")?,
        period_year: row.try_get::<i64, _>("period_year")? as i32,
        value: row.try_get("value")?,
    })
}

fn result_from_row(row: &SqliteRow) -> Result<AnalysisResult> {
    Ok(AnalysisResult {
        edinet_code: row.try_get("edinet_code")?,
        period: row.try_get("period")?,
        corporate_value: row.try_get("corporate_value")?,
        analyzed_at: row.try_get::<DateTime<Utc>, _>("analyzed_at")?,
    })
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn register_document(&self, document: &Document) -> Result<()> {
        sqlx::query(
            "INSERT OR IGNORE INTO documents (
                document_id, edinet_code, doc_type_code, submit_date, period,
                downloaded, decoded, scraped_bs, scraped_pl,
                scraped_number_of_shares, removed
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&document.document_id)
        .bind(&document.edinet_code)
        .bind(&document.doc_type_code)
        .bind(document.submit_date)
        .bind(document.period)
        .bind(document.downloaded.code() as i64)
        .bind(document.decoded.code() as i64)
        .bind(document.scraped_bs.code() as i64)
        .bind(document.scraped_pl.code() as i64)
        .bind(document.scraped_number_of_shares.code() as i64)
        .bind(document.removed as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn document(&self, document_id: &str) -> Result<Option<Document>> {
        let row = sqlx::query("SELECT * FROM documents WHERE document_id = ?")
            .bind(document_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| self.document_from_row(&r)).transpose()
    }

    async fn documents_by_submit_date(&self, submit_date: NaiveDate) -> Result<Vec<Document>> {
        let rows = sqlx::query("SELECT * FROM documents WHERE submit_date = ? ORDER BY document_id")
            .bind(submit_date)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(|r| self.document_from_row(r)).collect()
    }

    async fn find_document(
        &self,
        edinet_code: &str,
        doc_type_code: &str,
        period_year: i32,
    ) -> Result<Option<Document>> {
        let row = sqlx::query(
            "SELECT * FROM documents
             WHERE edinet_code = ? AND doc_type_code = ?
               AND CAST(strftime('%Y', period) AS INTEGER) = ?
             LIMIT 1",
        )
        .bind(edinet_code)
        .bind(doc_type_code)
        .bind(period_year as i64)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| self.document_from_row(&r)).transpose()
    }

    async fn update_status(
        &self,
        document_id: &str,
        subtask: Subtask,
        status: SubtaskStatus,
    ) -> Result<()> {
        // Column names come from a fixed enum, not user input.
        let query = format!(
            "UPDATE documents SET {} = ? WHERE document_id = ?",
            subtask.column()
        );
        let updated = sqlx::query(&query)
            .bind(status.code() as i64)
            .bind(document_id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        if updated == 0 {
            return Err(anyhow!("unknown document: {}", document_id));
        }
        Ok(())
    }

    async fn set_removed(&self, document_id: &str, removed: bool) -> Result<()> {
        let updated = sqlx::query("UPDATE documents SET removed = ? WHERE document_id = ?")
            .bind(removed as i64)
            .bind(document_id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        if updated == 0 {
            return Err(anyhow!("unknown document: {}", document_id));
        }
        Ok(())
    }
}

#[async_trait]
impl FinancialValueStore for SqliteStore {
    async fn upsert_value(&self, value: &FinancialValue) -> Result<()> {
        sqlx::query(
            "INSERT INTO financial_values (edinet_code, statement, subject_id, period_year, value)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(edinet_code, statement, subject_id, period_year)
             DO UPDATE SET value = excluded.value",
        )
        .bind(&value.edinet_code)
        .bind(value.statement.code())
        .bind(&value.subject_id)
        .bind(value.period_year as i64)
        .bind(value.value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn value(
        &self,
        edinet_code: &str,
        statement: StatementType,
        subject_id: &str,
        period_year: i32,
    ) -> Result<Option<FinancialValue>> {
        let row = sqlx::query(
            "SELECT * FROM financial_values
             WHERE edinet_code = ? AND statement = ? AND subject_id = ? AND period_year = ?",
        )
        .bind(edinet_code)
        .bind(statement.code())
        .bind(subject_id)
        .bind(period_year as i64)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(value_from_row).transpose()
    }
}

#[async_trait]
impl AnalysisStore for SqliteStore {
    async fn insert_result(&self, result: &AnalysisResult) -> Result<()> {
        sqlx::query(
            "INSERT INTO analysis_results (edinet_code, period, corporate_value, analyzed_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(edinet_code, period) DO NOTHING",
        )
        .bind(&result.edinet_code)
        .bind(result.period)
        .bind(result.corporate_value)
        .bind(result.analyzed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn result(&self, edinet_code: &str, period: NaiveDate) -> Result<Option<AnalysisResult>> {
        let row = sqlx::query(
            "SELECT * FROM analysis_results WHERE edinet_code = ? AND period = ?",
        )
        .bind(edinet_code)
        .bind(period)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(result_from_row).transpose()
    }

    async fn all_results(&self) -> Result<Vec<AnalysisResult>> {
        let rows = sqlx::query("SELECT * FROM analysis_results ORDER BY edinet_code, period")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(result_from_row).collect()
    }

    async fn upsert_view(&self, view: &CorporateView) -> Result<()> {
        sqlx::query(
            "INSERT INTO corporate_view (edinet_code, latest_period, latest_corporate_value, updated_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(edinet_code) DO UPDATE SET
                latest_period = excluded.latest_period,
                latest_corporate_value = excluded.latest_corporate_value,
                updated_at = excluded.updated_at",
        )
        .bind(&view.edinet_code)
        .bind(view.latest_period)
        .bind(view.latest_corporate_value)
        .bind(view.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn views(&self) -> Result<Vec<CorporateView>> {
        let rows = sqlx::query("SELECT * FROM corporate_view ORDER BY edinet_code")
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| {
                Ok(CorporateView {
                    edinet_code: row.try_get("edinet_code")?,
                    latest_period: row.try_get("latest_period")?,
                    latest_corporate_value: row.try_get("latest_corporate_value")?,
                    updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
                })
            })
            .collect()
    }
}
