use anyhow::Result;
use chrono::NaiveDate;
use fundval::analysis::ValuationEngine;
use fundval::config::Config;
use fundval::edinet::EdinetClient;
use fundval::pipeline::IngestionPipeline;
use fundval::storage::{DocumentStore, SqliteStore};
use fundval::tracker::RetryTracker;
use std::sync::Arc;
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(name = "fundval", about = "Scrape annual securities reports and value the filers")]
enum Command {
    /// Register the day's annual reports and run fetch/decode/scrape for them
    Process {
        /// Submission date, YYYY-MM-DD
        date: NaiveDate,
    },
    /// Compute corporate values for filings submitted on the given date
    Analyze {
        date: NaiveDate,
    },
    /// Rewind failed subtask counters so the next pass retries them
    ResetRetries {
        date: NaiveDate,
        /// Also revive documents removed after exhausting their retries
        #[structopt(long)]
        include_exhausted: bool,
    },
    /// Show per-document subtask status for the given date
    Status {
        date: NaiveDate,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    env_logger::init();

    let command = Command::from_args();
    let config = Config::from_env()?;

    let store = Arc::new(SqliteStore::connect(&config.database_url, config.retry_budget).await?);
    let tracker = RetryTracker::new(store.clone(), config.retry_budget);

    match command {
        Command::Process { date } => {
            let gateway = Arc::new(EdinetClient::new(
                config.edinet_base_url.clone(),
                config.data_dir.clone(),
                &config.user_agent,
                config.fetch_timeout,
            )?);
            let pipeline = IngestionPipeline::new(
                gateway,
                store,
                tracker,
                config.workers,
                config.fetch_timeout,
            );
            let registered = pipeline.register_targets(date).await?;
            let summary = pipeline.run_batch(date).await?;
            println!(
                "{}: {} registered, {} completed, {} partial, {} excluded, {} skipped",
                date,
                registered,
                summary.completed,
                summary.partial,
                summary.excluded,
                summary.skipped
            );
        }
        Command::Analyze { date } => {
            let engine = ValuationEngine::new(store, tracker);
            let summary = engine.analyze_submit_date(date).await?;
            println!(
                "{}: {} valued, {} missing inputs, {} not ready",
                date, summary.analyzed, summary.missing_inputs, summary.skipped
            );
        }
        Command::ResetRetries {
            date,
            include_exhausted,
        } => {
            let rewound = tracker.reset_for_retry(date).await?;
            println!("{}: {} subtasks reset", date, rewound);
            if include_exhausted {
                let revived = tracker.revive_exhausted(date).await?;
                println!("{}: {} removed documents revived", date, revived);
            }
        }
        Command::Status { date } => {
            let documents = store.documents_by_submit_date(date).await?;
            if documents.is_empty() {
                println!("{}: no documents", date);
            }
            for doc in documents {
                println!(
                    "{} {} dl:{} dec:{} bs:{} pl:{} sh:{}{}",
                    doc.document_id,
                    doc.edinet_code,
                    doc.downloaded.code(),
                    doc.decoded.code(),
                    doc.scraped_bs.code(),
                    doc.scraped_pl.code(),
                    doc.scraped_number_of_shares.code(),
                    if doc.removed { " [removed]" } else { "" }
                );
            }
        }
    }

    Ok(())
}
