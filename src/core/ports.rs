//! Seams to the external collaborators: local key-value persistence, the
//! remote document collection and the rate lookup service.

use crate::core::error::FinanceError;
use crate::core::model::{StoredDate, StoredTransaction, Transaction, TransactionRecord};
use async_trait::async_trait;
use chrono::NaiveDate;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

/// Device-local string persistence. Survives across sessions; may be wiped at any time.
#[async_trait]
pub trait LocalStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, FinanceError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), FinanceError>;
}

#[async_trait]
pub trait RateProvider: Send + Sync {
    /// Returns currency code -> amount of that currency per one unit of `base`.
    async fn latest(&self, base: &str) -> Result<HashMap<String, f64>, FinanceError>;
}

/// Position of the last document read. Opaque to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    date: NaiveDate,
    id: String,
}

impl Cursor {
    pub fn after(doc: &StoredTransaction) -> Self {
        Cursor {
            date: doc.calendar_date(),
            id: doc.id.clone(),
        }
    }

    /// True if `doc` sorts strictly after this cursor in collection order.
    pub fn precedes(&self, doc: &StoredTransaction) -> bool {
        collection_order(&self.date, &self.id, &doc.calendar_date(), &doc.id) == Ordering::Less
    }
}

/// Collection order: transaction date descending, then id ascending.
pub fn collection_order(
    a_date: &NaiveDate,
    a_id: &str,
    b_date: &NaiveDate,
    b_id: &str,
) -> Ordering {
    b_date.cmp(a_date).then_with(|| a_id.cmp(b_id))
}

#[derive(Debug, Clone, Default)]
pub struct Page {
    pub docs: Vec<StoredTransaction>,
    pub cursor: Option<Cursor>,
}

/// Stream of full result-set snapshots for a live query.
pub type SnapshotStream = BoxStream<'static, Result<Vec<StoredTransaction>, FinanceError>>;

/// The remote transaction collection. Durability, ordering and sync belong to the store.
#[async_trait]
pub trait RemoteCollection: Send + Sync {
    async fn create(&self, record: TransactionRecord) -> Result<Transaction, FinanceError>;
    async fn update(&self, id: &str, record: TransactionRecord) -> Result<(), FinanceError>;
    async fn delete(&self, id: &str) -> Result<(), FinanceError>;
    /// Removes every document; returns how many were removed.
    async fn clear(&self) -> Result<usize, FinanceError>;
    /// Rewrites only the stored date representation of one document.
    async fn replace_date(&self, id: &str, date: StoredDate) -> Result<(), FinanceError>;
    async fn fetch_page(&self, after: Option<&Cursor>, limit: usize) -> Result<Page, FinanceError>;
    /// Pushes the current set of documents dated on or after `since`, then a new
    /// snapshot after every write.
    fn subscribe(&self, since: NaiveDate) -> SnapshotStream;
}
