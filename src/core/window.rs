//! Working set of transactions: a live window of the current and previous
//! month, plus older months backfilled on request.

use crate::core::error::FinanceError;
use crate::core::model::{StoredTransaction, Transaction};
use crate::core::month::Month;
use crate::core::ports::{Cursor, RemoteCollection, SnapshotStream};
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, instrument};

/// First month covered by the live window for `today`.
pub fn live_window_start(today: NaiveDate) -> Month {
    Month::from_date(today).prev()
}

pub struct TransactionWindow {
    collection: Arc<dyn RemoteCollection>,
    page_size: usize,
    transactions: Vec<Transaction>,
    /// Position of each held id in `transactions`.
    index: HashMap<String, usize>,
    oldest_loaded_month: Option<Month>,
    has_more: bool,
    cursor: Option<Cursor>,
}

impl TransactionWindow {
    pub fn new(collection: Arc<dyn RemoteCollection>, page_size: usize) -> Self {
        Self {
            collection,
            page_size: page_size.max(1),
            transactions: Vec::new(),
            index: HashMap::new(),
            oldest_loaded_month: None,
            has_more: false,
            cursor: None,
        }
    }

    /// Held transactions, newest first.
    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn oldest_loaded_month(&self) -> Option<Month> {
        self.oldest_loaded_month
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    /// Live subscription covering this window's synced range.
    pub fn subscribe(&self, today: NaiveDate) -> SnapshotStream {
        self.collection.subscribe(live_window_start(today).first_day())
    }

    /// Loads the live window from scratch. Returns the number of records held.
    #[instrument(name = "WindowFetchInitial", skip(self))]
    pub async fn fetch_initial(&mut self, today: NaiveDate) -> Result<usize, FinanceError> {
        let boundary = live_window_start(today);
        self.transactions.clear();
        self.index.clear();
        self.cursor = None;
        self.has_more = false;

        loop {
            let page = self
                .collection
                .fetch_page(self.cursor.as_ref(), self.page_size)
                .await?;
            let short = page.docs.len() < self.page_size;
            let mut crossed = false;

            for doc in page.docs {
                if Month::from_date(doc.calendar_date()) < boundary {
                    crossed = true;
                    break;
                }
                self.keep(doc);
            }

            if crossed {
                self.has_more = true;
                break;
            }
            if short {
                break;
            }
        }

        self.oldest_loaded_month = Some(boundary);
        self.sort();
        debug!(
            count = self.transactions.len(),
            has_more = self.has_more,
            "Loaded live window from {}", boundary
        );
        Ok(self.transactions.len())
    }

    /// Extends the window by the calendar month preceding the oldest loaded one.
    /// Returns how many records were added.
    #[instrument(name = "WindowFetchMonth", skip(self))]
    pub async fn fetch_one_more_month(&mut self) -> Result<usize, FinanceError> {
        let Some(oldest) = self.oldest_loaded_month else {
            return Ok(0);
        };
        if !self.has_more {
            return Ok(0);
        }
        let target = oldest.prev();
        let mut added = 0;

        loop {
            let page = self
                .collection
                .fetch_page(self.cursor.as_ref(), self.page_size)
                .await?;
            let short = page.docs.len() < self.page_size;
            let mut reached_older = false;

            for doc in page.docs {
                let month = Month::from_date(doc.calendar_date());
                if month < target {
                    reached_older = true;
                    break;
                }
                if month == target {
                    added += 1;
                    self.keep(doc);
                } else {
                    self.cursor = Some(Cursor::after(&doc));
                }
            }

            if reached_older {
                self.has_more = true;
                break;
            }
            if short {
                self.has_more = false;
                break;
            }
        }

        self.oldest_loaded_month = Some(target);
        self.sort();
        debug!(added, has_more = self.has_more, "Backfilled {}", target);
        Ok(added)
    }

    /// Loads every remaining record. Returns how many were added.
    #[instrument(name = "WindowFetchAll", skip(self))]
    pub async fn fetch_all(&mut self) -> Result<usize, FinanceError> {
        let mut added = 0;
        loop {
            let page = self
                .collection
                .fetch_page(self.cursor.as_ref(), self.page_size)
                .await?;
            let short = page.docs.len() < self.page_size;
            added += page.docs.len();
            for doc in page.docs {
                self.keep(doc);
            }
            if short {
                break;
            }
        }
        self.has_more = false;
        if let Some(oldest) = self.transactions.iter().map(Transaction::month).min() {
            self.oldest_loaded_month = Some(
                self.oldest_loaded_month
                    .map_or(oldest, |current| current.min(oldest)),
            );
        }
        self.sort();
        debug!(added, "Loaded full history");
        Ok(added)
    }

    /// Replaces every held record inside the live window with `snapshot`.
    /// Older backfilled months are left as they are, so applying the same or a
    /// superseded snapshot again is harmless.
    pub fn apply_live_snapshot(&mut self, snapshot: Vec<StoredTransaction>, today: NaiveDate) {
        let start = live_window_start(today);
        self.transactions.retain(|tx| tx.month() < start);
        self.reindex();
        for tx in snapshot
            .into_iter()
            .map(StoredTransaction::normalize)
            .filter(|tx| tx.month() >= start)
        {
            self.upsert(tx);
        }
        if self.oldest_loaded_month.is_none_or(|m| m > start) {
            self.oldest_loaded_month = Some(start);
        }
        self.sort();
        debug!(count = self.transactions.len(), "Applied live snapshot");
    }

    fn keep(&mut self, doc: StoredTransaction) {
        self.cursor = Some(Cursor::after(&doc));
        self.upsert(doc.normalize());
    }

    fn upsert(&mut self, tx: Transaction) {
        match self.index.get(&tx.id) {
            Some(&pos) => self.transactions[pos] = tx,
            None => {
                self.index.insert(tx.id.clone(), self.transactions.len());
                self.transactions.push(tx);
            }
        }
    }

    fn reindex(&mut self) {
        self.index = self
            .transactions
            .iter()
            .enumerate()
            .map(|(pos, tx)| (tx.id.clone(), pos))
            .collect();
    }

    fn sort(&mut self) {
        self.transactions.sort_by(|a, b| {
            b.transaction_date
                .cmp(&a.transaction_date)
                .then_with(|| a.id.cmp(&b.id))
        });
        self.reindex();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::{StoredDate, TransactionRecord, TransactionType};
    use crate::store::memory::MemoryCollection;
    use chrono::Utc;

    fn doc(id: &str, date: &str) -> StoredTransaction {
        StoredTransaction {
            id: id.to_string(),
            kind: TransactionType::Expense,
            category: "Groceries".into(),
            original_amount: 10.0,
            original_currency: "EUR".into(),
            transaction_date: StoredDate::Calendar(date.parse().unwrap()),
            description: None,
            base_currency: "EUR".into(),
            exchange_rate_to_base: 1.0,
            amount_in_base_currency: 10.0,
            created_at: Utc::now(),
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 15).unwrap()
    }

    async fn seeded(docs: Vec<StoredTransaction>) -> Arc<MemoryCollection> {
        let collection = Arc::new(MemoryCollection::new());
        collection.seed(docs).await;
        collection
    }

    fn months(window: &TransactionWindow) -> Vec<String> {
        let mut out: Vec<String> = window
            .transactions()
            .iter()
            .map(|t| t.month().to_string())
            .collect();
        out.dedup();
        out
    }

    #[tokio::test]
    async fn test_fetch_initial_stops_at_live_window() {
        let collection = seeded(vec![
            doc("a", "2024-04-20"),
            doc("b", "2024-05-02"),
            doc("c", "2024-06-01"),
            doc("d", "2024-06-10"),
        ])
        .await;
        let mut window = TransactionWindow::new(collection, 25);

        let count = window.fetch_initial(today()).await.unwrap();
        assert_eq!(count, 3);
        assert_eq!(months(&window), vec!["2024-06", "2024-05"]);
        assert!(window.has_more());
        assert_eq!(window.oldest_loaded_month().unwrap().to_string(), "2024-05");
    }

    #[tokio::test]
    async fn test_fetch_initial_exhausts_small_collection() {
        let collection = seeded(vec![doc("a", "2024-06-01"), doc("b", "2024-05-31")]).await;
        let mut window = TransactionWindow::new(collection, 25);

        window.fetch_initial(today()).await.unwrap();
        assert_eq!(window.transactions().len(), 2);
        assert!(!window.has_more());
    }

    #[tokio::test]
    async fn test_fetch_initial_pages_across_multiple_requests() {
        let docs = (1..=9)
            .map(|d| doc(&format!("t{d}"), &format!("2024-06-{d:02}")))
            .chain([doc("old", "2024-03-01")])
            .collect();
        let collection = seeded(docs).await;
        let mut window = TransactionWindow::new(collection, 4);

        window.fetch_initial(today()).await.unwrap();
        assert_eq!(window.transactions().len(), 9);
        assert!(window.has_more());
        assert_eq!(window.transactions()[0].id, "t9");
    }

    #[tokio::test]
    async fn test_backfill_one_month_at_a_time() {
        let collection = seeded(vec![
            doc("feb", "2024-02-11"),
            doc("apr1", "2024-04-03"),
            doc("apr2", "2024-04-28"),
            doc("may", "2024-05-02"),
            doc("jun", "2024-06-01"),
        ])
        .await;
        let mut window = TransactionWindow::new(collection, 2);
        window.fetch_initial(today()).await.unwrap();
        assert_eq!(window.transactions().len(), 2);

        // April was seen (and discarded) during the initial load; it must not be skipped.
        let added = window.fetch_one_more_month().await.unwrap();
        assert_eq!(added, 2);
        assert_eq!(window.oldest_loaded_month().unwrap().to_string(), "2024-04");
        assert!(window.has_more());

        // March is empty: nothing added, the window still moves back.
        let added = window.fetch_one_more_month().await.unwrap();
        assert_eq!(added, 0);
        assert_eq!(window.oldest_loaded_month().unwrap().to_string(), "2024-03");
        assert!(window.has_more());

        let added = window.fetch_one_more_month().await.unwrap();
        assert_eq!(added, 1);
        assert!(!window.has_more());
        assert_eq!(window.fetch_one_more_month().await.unwrap(), 0);
        assert_eq!(window.transactions().len(), 5);
    }

    #[tokio::test]
    async fn test_fetch_all_loads_remaining_history() {
        let collection = seeded(vec![
            doc("old1", "2023-01-05"),
            doc("old2", "2023-11-05"),
            doc("may", "2024-05-02"),
            doc("jun", "2024-06-01"),
        ])
        .await;
        let mut window = TransactionWindow::new(collection, 3);
        window.fetch_initial(today()).await.unwrap();

        let added = window.fetch_all().await.unwrap();
        assert_eq!(added, 2);
        assert_eq!(window.transactions().len(), 4);
        assert!(!window.has_more());
        assert_eq!(window.oldest_loaded_month().unwrap().to_string(), "2023-01");
    }

    #[tokio::test]
    async fn test_live_snapshot_keeps_backfilled_months() {
        let collection = seeded(vec![
            doc("apr", "2024-04-03"),
            doc("may", "2024-05-02"),
            doc("jun", "2024-06-01"),
        ])
        .await;
        let mut window = TransactionWindow::new(collection.clone(), 25);
        window.fetch_initial(today()).await.unwrap();
        window.fetch_one_more_month().await.unwrap();
        assert_eq!(window.transactions().len(), 3);

        // Snapshot reflects a deletion of "may" and a new June record.
        let snapshot = vec![doc("jun", "2024-06-01"), doc("jun2", "2024-06-14")];
        window.apply_live_snapshot(snapshot.clone(), today());
        window.apply_live_snapshot(snapshot, today());

        let ids: Vec<&str> = window.transactions().iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["jun2", "jun", "apr"]);
        assert_eq!(window.oldest_loaded_month().unwrap().to_string(), "2024-04");
    }

    #[tokio::test]
    async fn test_live_snapshot_replaces_records_by_id() {
        let collection = seeded(vec![doc("jun", "2024-06-01"), doc("may", "2024-05-02")]).await;
        let mut window = TransactionWindow::new(collection, 25);
        window.fetch_initial(today()).await.unwrap();

        let mut edited = doc("jun", "2024-06-01");
        edited.original_amount = 99.0;
        let mut repeated = doc("may", "2024-05-02");
        repeated.original_amount = 7.0;
        let snapshot = vec![doc("jun", "2024-06-01"), edited, doc("may", "2024-05-02"), repeated];
        window.apply_live_snapshot(snapshot, today());

        let held: Vec<(&str, f64)> = window
            .transactions()
            .iter()
            .map(|t| (t.id.as_str(), t.original_amount))
            .collect();
        assert_eq!(held, vec![("jun", 99.0), ("may", 7.0)]);
    }

    #[tokio::test]
    async fn test_instant_dates_are_normalized_on_load() {
        let mut legacy = doc("legacy", "2024-06-01");
        legacy.transaction_date = StoredDate::Instant(
            chrono::DateTime::parse_from_rfc3339("2024-06-01T00:15:00+03:00").unwrap(),
        );
        let collection = seeded(vec![legacy]).await;
        let mut window = TransactionWindow::new(collection, 25);
        window.fetch_initial(today()).await.unwrap();

        assert_eq!(
            window.transactions()[0].transaction_date,
            NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
        );
    }

    #[tokio::test]
    async fn test_subscription_feeds_window() {
        use futures::StreamExt;

        let collection = Arc::new(MemoryCollection::new());
        let mut window = TransactionWindow::new(collection.clone(), 25);
        let mut feed = window.subscribe(today());
        window.apply_live_snapshot(feed.next().await.unwrap().unwrap(), today());
        assert!(window.transactions().is_empty());

        collection
            .create(TransactionRecord {
                kind: TransactionType::Income,
                category: "Salary".into(),
                original_amount: 3000.0,
                original_currency: "EUR".into(),
                transaction_date: "2024-06-01".parse().unwrap(),
                description: Some("June".into()),
                base_currency: "EUR".into(),
                exchange_rate_to_base: 1.0,
                amount_in_base_currency: 3000.0,
            })
            .await
            .unwrap();
        window.apply_live_snapshot(feed.next().await.unwrap().unwrap(), today());
        assert_eq!(window.transactions().len(), 1);
    }
}
