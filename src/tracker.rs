use crate::document::{Document, Subtask, SubtaskStatus};
use crate::storage::DocumentStore;
use anyhow::{anyhow, Result};
use chrono::NaiveDate;
use std::sync::Arc;
use strum::IntoEnumIterator;

/// Drives the per-document subtask counters through their transitions and
/// keeps the `removed` flag in step with them.
///
/// Every mutation goes through the store, so two trackers sharing a store
/// observe each other's updates.
#[derive(Clone)]
pub struct RetryTracker {
    store: Arc<dyn DocumentStore>,
    budget: u8,
}

impl RetryTracker {
    pub fn new(store: Arc<dyn DocumentStore>, budget: u8) -> Self {
        Self { store, budget }
    }

    pub fn budget(&self) -> u8 {
        self.budget
    }

    /// Whether a pass should attempt this subtask now.
    pub fn should_run(&self, document: &Document, subtask: Subtask) -> bool {
        !document.removed && document.status(subtask).should_run(self.budget)
    }

    pub async fn record_success(&self, document_id: &str, subtask: Subtask) -> Result<()> {
        self.store
            .update_status(document_id, subtask, SubtaskStatus::DONE)
            .await
    }

    /// Count a failed attempt. When the counter reaches the budget the
    /// document is flagged removed and drops out of every later pass.
    pub async fn record_failure(&self, document_id: &str, subtask: Subtask) -> Result<SubtaskStatus> {
        let document = self
            .store
            .document(document_id)
            .await?
            .ok_or_else(|| anyhow!("unknown document: {}", document_id))?;
        let next = document.status(subtask).failure(self.budget);
        self.store.update_status(document_id, subtask, next).await?;
        if next.is_exhausted(self.budget) {
            log::warn!(
                "document {} exhausted retries for {}, removing from processing",
                document_id,
                subtask
            );
            self.store.set_removed(document_id, true).await?;
        }
        Ok(next)
    }

    /// Rewind retryable failures back to pending for every live document
    /// submitted on the given date. Returns how many counters were rewound.
    pub async fn reset_for_retry(&self, submit_date: NaiveDate) -> Result<usize> {
        let mut rewound = 0;
        for document in self.store.documents_by_submit_date(submit_date).await? {
            if document.removed {
                continue;
            }
            for subtask in Subtask::iter() {
                let status = document.status(subtask);
                let reset = status.reset(self.budget);
                if reset != status {
                    self.store
                        .update_status(&document.document_id, subtask, reset)
                        .await?;
                    rewound += 1;
                }
            }
        }
        log::info!("reset {} failed subtasks for {}", rewound, submit_date);
        Ok(rewound)
    }

    /// Bring removed documents back: exhausted counters return to pending and
    /// the removed flag is cleared. This is the only path out of exhaustion.
    pub async fn revive_exhausted(&self, submit_date: NaiveDate) -> Result<usize> {
        let mut revived = 0;
        for document in self.store.documents_by_submit_date(submit_date).await? {
            if !document.removed {
                continue;
            }
            for subtask in Subtask::iter() {
                if document.status(subtask).is_exhausted(self.budget) {
                    self.store
                        .update_status(&document.document_id, subtask, SubtaskStatus::PENDING)
                        .await?;
                }
            }
            self.store.set_removed(&document.document_id, false).await?;
            revived += 1;
        }
        log::info!("revived {} removed documents for {}", revived, submit_date);
        Ok(revived)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DEFAULT_RETRY_BUDGET;
    use crate::storage::MemoryStore;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2021, 6, 25).unwrap()
    }

    async fn tracker_with_document() -> (RetryTracker, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let document = Document::new(
            "S100TEST",
            "E00001",
            "120",
            date(),
            NaiveDate::from_ymd_opt(2021, 3, 31).unwrap(),
        );
        store.register_document(&document).await.unwrap();
        (
            RetryTracker::new(store.clone(), DEFAULT_RETRY_BUDGET),
            store,
        )
    }

    #[tokio::test]
    async fn exhaustion_removes_the_document() {
        let (tracker, store) = tracker_with_document().await;

        for _ in 0..(DEFAULT_RETRY_BUDGET - 1) {
            tracker
                .record_failure("S100TEST", Subtask::Downloaded)
                .await
                .unwrap();
        }

        let document = store.document("S100TEST").await.unwrap().unwrap();
        assert!(document.removed);
        assert!(document.downloaded.is_exhausted(DEFAULT_RETRY_BUDGET));
        assert!(!tracker.should_run(&document, Subtask::Decoded));
    }

    #[tokio::test]
    async fn reset_rewinds_failures_but_not_done_or_exhausted() {
        let (tracker, store) = tracker_with_document().await;

        tracker
            .record_success("S100TEST", Subtask::Downloaded)
            .await
            .unwrap();
        tracker
            .record_failure("S100TEST", Subtask::ScrapedBs)
            .await
            .unwrap();

        let rewound = tracker.reset_for_retry(date()).await.unwrap();
        assert_eq!(rewound, 1);

        let document = store.document("S100TEST").await.unwrap().unwrap();
        assert!(document.downloaded.is_done());
        assert_eq!(document.scraped_bs, SubtaskStatus::PENDING);
    }

    #[tokio::test]
    async fn reset_skips_removed_documents() {
        let (tracker, store) = tracker_with_document().await;

        for _ in 0..(DEFAULT_RETRY_BUDGET - 1) {
            tracker
                .record_failure("S100TEST", Subtask::Downloaded)
                .await
                .unwrap();
        }

        assert_eq!(tracker.reset_for_retry(date()).await.unwrap(), 0);
        let document = store.document("S100TEST").await.unwrap().unwrap();
        assert!(document.removed);
    }

    #[tokio::test]
    async fn revive_clears_removal_and_exhausted_counters() {
        let (tracker, store) = tracker_with_document().await;

        for _ in 0..(DEFAULT_RETRY_BUDGET - 1) {
            tracker
                .record_failure("S100TEST", Subtask::Downloaded)
                .await
                .unwrap();
        }

        assert_eq!(tracker.revive_exhausted(date()).await.unwrap(), 1);
        let document = store.document("S100TEST").await.unwrap().unwrap();
        assert!(!document.removed);
        assert_eq!(document.downloaded, SubtaskStatus::PENDING);
        assert!(tracker.should_run(&document, Subtask::Downloaded));
    }

    #[tokio::test]
    async fn failure_after_done_reenters_the_failed_zone() {
        let (tracker, store) = tracker_with_document().await;

        tracker
            .record_success("S100TEST", Subtask::ScrapedPl)
            .await
            .unwrap();
        let next = tracker
            .record_failure("S100TEST", Subtask::ScrapedPl)
            .await
            .unwrap();

        assert_eq!(next.code(), 2);
        let document = store.document("S100TEST").await.unwrap().unwrap();
        assert!(tracker.should_run(&document, Subtask::ScrapedPl));
    }
}
