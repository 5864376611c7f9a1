//! Ingestion and valuation of Japanese annual securities reports.
//!
//! Filings listed by the EDINET disclosure API are fetched, their extracted
//! HTML fragments scraped for balance-sheet, profit-and-loss and share-count
//! figures, and a per-company corporate value computed from the results.
//! Every per-document subtask carries a bounded retry counter, so a failing
//! filing degrades only itself and stays retryable across batch passes.

pub mod analysis;
pub mod config;
pub mod document;
pub mod edinet;
pub mod pipeline;
pub mod scrape;
pub mod storage;
pub mod subjects;
pub mod tracker;
