use anyhow::{anyhow, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use strum::EnumIter;

/// Default number of attempts a subtask gets before the owning document is
/// permanently excluded from processing. Overridable via `FUNDVAL_RETRY_BUDGET`.
pub const DEFAULT_RETRY_BUDGET: u8 = 9;

/// Per-document processing steps, each with its own retry counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, Serialize, Deserialize)]
pub enum Subtask {
    Downloaded,
    Decoded,
    ScrapedBs,
    ScrapedPl,
    ScrapedNumberOfShares,
}

impl Subtask {
    pub fn column(&self) -> &'static str {
        match self {
            Subtask::Downloaded => "downloaded",
            Subtask::Decoded => "decoded",
            Subtask::ScrapedBs => "scraped_bs",
            Subtask::ScrapedPl => "scraped_pl",
            Subtask::ScrapedNumberOfShares => "scraped_number_of_shares",
        }
    }
}

impl fmt::Display for Subtask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.column())
    }
}

/// Status-as-retry-counter for one subtask of one document.
///
/// The raw code has three zones:
/// - `0`: not yet attempted
/// - `1`: completed (terminal)
/// - `2..budget-1`: failed attempt count, eligible for retry
/// - `budget`: retries exhausted (terminal)
///
/// Transitions are pure so the state machine is testable without any I/O.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubtaskStatus(u8);

impl SubtaskStatus {
    pub const PENDING: SubtaskStatus = SubtaskStatus(0);
    pub const DONE: SubtaskStatus = SubtaskStatus(1);

    pub fn from_code(code: u8, budget: u8) -> Result<Self> {
        if code > budget {
            return Err(anyhow!(
                "subtask status {} outside valid range [0, {}]",
                code,
                budget
            ));
        }
        Ok(SubtaskStatus(code))
    }

    pub fn code(self) -> u8 {
        self.0
    }

    pub fn is_done(self) -> bool {
        self == Self::DONE
    }

    pub fn is_exhausted(self, budget: u8) -> bool {
        self.0 >= budget
    }

    /// A failed attempt count below the budget, i.e. eligible for retry.
    pub fn is_failed(self, budget: u8) -> bool {
        self.0 >= 2 && self.0 < budget
    }

    pub fn should_run(self, budget: u8) -> bool {
        !self.is_done() && !self.is_exhausted(budget)
    }

    pub fn success(self) -> Self {
        Self::DONE
    }

    /// Record a failed attempt. The first failure skips over the `1` (done)
    /// code straight into the failed zone; at the budget the counter saturates.
    pub fn failure(self, budget: u8) -> Self {
        match self.0 {
            c if c >= budget => SubtaskStatus(budget),
            0 | 1 => SubtaskStatus(2),
            c => SubtaskStatus((c + 1).min(budget)),
        }
    }

    /// Rewind a retryable failure back to pending. Done and exhausted codes
    /// are left untouched; reviving exhausted documents is a separate,
    /// deliberate operation.
    pub fn reset(self, budget: u8) -> Self {
        if self.is_failed(budget) {
            Self::PENDING
        } else {
            self
        }
    }
}

impl Default for SubtaskStatus {
    fn default() -> Self {
        Self::PENDING
    }
}

/// One regulatory filing and its processing state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub document_id: String,
    pub edinet_code: String,
    pub doc_type_code: String,
    pub submit_date: NaiveDate,
    /// Fiscal period the filing covers (period end date).
    pub period: NaiveDate,
    pub downloaded: SubtaskStatus,
    pub decoded: SubtaskStatus,
    pub scraped_bs: SubtaskStatus,
    pub scraped_pl: SubtaskStatus,
    pub scraped_number_of_shares: SubtaskStatus,
    /// Set once any subtask exhausts its retry budget; the document is then
    /// skipped by every later pass.
    pub removed: bool,
}

impl Document {
    pub fn new(
        document_id: impl Into<String>,
        edinet_code: impl Into<String>,
        doc_type_code: impl Into<String>,
        submit_date: NaiveDate,
        period: NaiveDate,
    ) -> Self {
        Self {
            document_id: document_id.into(),
            edinet_code: edinet_code.into(),
            doc_type_code: doc_type_code.into(),
            submit_date,
            period,
            downloaded: SubtaskStatus::PENDING,
            decoded: SubtaskStatus::PENDING,
            scraped_bs: SubtaskStatus::PENDING,
            scraped_pl: SubtaskStatus::PENDING,
            scraped_number_of_shares: SubtaskStatus::PENDING,
            removed: false,
        }
    }

    pub fn status(&self, subtask: Subtask) -> SubtaskStatus {
        match subtask {
            Subtask::Downloaded => self.downloaded,
            Subtask::Decoded => self.decoded,
            Subtask::ScrapedBs => self.scraped_bs,
            Subtask::ScrapedPl => self.scraped_pl,
            Subtask::ScrapedNumberOfShares => self.scraped_number_of_shares,
        }
    }

    pub fn set_status(&mut self, subtask: Subtask, status: SubtaskStatus) {
        match subtask {
            Subtask::Downloaded => self.downloaded = status,
            Subtask::Decoded => self.decoded = status,
            Subtask::ScrapedBs => self.scraped_bs = status,
            Subtask::ScrapedPl => self.scraped_pl = status,
            Subtask::ScrapedNumberOfShares => self.scraped_number_of_shares = status,
        }
    }

    /// All three scrape subtasks completed, so the valuation inputs for this
    /// filing have been extracted.
    pub fn is_analyzable(&self) -> bool {
        !self.removed
            && self.scraped_bs.is_done()
            && self.scraped_pl.is_done()
            && self.scraped_number_of_shares.is_done()
    }

    pub fn period_year(&self) -> i32 {
        use chrono::Datelike;
        self.period.year()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    const BUDGET: u8 = DEFAULT_RETRY_BUDGET;

    #[test]
    fn should_run_is_false_exactly_for_terminal_codes() {
        for code in 0..=BUDGET {
            let status = SubtaskStatus::from_code(code, BUDGET).unwrap();
            let terminal = code == 1 || code == BUDGET;
            assert_eq!(status.should_run(BUDGET), !terminal, "code {}", code);
        }
    }

    #[test]
    fn from_code_rejects_out_of_range() {
        assert!(SubtaskStatus::from_code(BUDGET + 1, BUDGET).is_err());
        assert!(SubtaskStatus::from_code(BUDGET, BUDGET).is_ok());
    }

    #[test]
    fn budget_minus_one_failures_exhaust_from_pending() {
        let mut status = SubtaskStatus::PENDING;
        for _ in 0..(BUDGET - 1) {
            status = status.failure(BUDGET);
        }
        assert_eq!(status.code(), BUDGET);
        assert!(status.is_exhausted(BUDGET));

        // One more failure is a no-op.
        assert_eq!(status.failure(BUDGET).code(), BUDGET);
    }

    #[test]
    fn failure_from_done_enters_the_failed_zone() {
        let status = SubtaskStatus::DONE.failure(BUDGET);
        assert_eq!(status.code(), 2);
        assert!(status.should_run(BUDGET));
    }

    #[test]
    fn reset_only_touches_the_failed_zone() {
        assert_eq!(SubtaskStatus::DONE.reset(BUDGET), SubtaskStatus::DONE);
        assert_eq!(SubtaskStatus::PENDING.reset(BUDGET), SubtaskStatus::PENDING);

        let exhausted = SubtaskStatus::from_code(BUDGET, BUDGET).unwrap();
        assert_eq!(exhausted.reset(BUDGET), exhausted);

        let failed = SubtaskStatus::from_code(4, BUDGET).unwrap();
        assert_eq!(failed.reset(BUDGET), SubtaskStatus::PENDING);
    }

    #[test]
    fn document_status_round_trip() {
        let mut doc = Document::new(
            "S100TEST",
            "E00001",
            "120",
            NaiveDate::from_ymd_opt(2020, 9, 19).unwrap(),
            NaiveDate::from_ymd_opt(2020, 3, 31).unwrap(),
        );
        for subtask in Subtask::iter() {
            assert_eq!(doc.status(subtask), SubtaskStatus::PENDING);
            doc.set_status(subtask, SubtaskStatus::DONE);
            assert_eq!(doc.status(subtask), SubtaskStatus::DONE);
        }
        assert!(doc.is_analyzable());
    }
}
