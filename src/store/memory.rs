use super::{live_snapshot, page_of, sort_docs};
use crate::core::error::FinanceError;
use crate::core::model::{StoredDate, StoredTransaction, Transaction, TransactionRecord};
use crate::core::ports::{Cursor, LocalStore, Page, RemoteCollection, SnapshotStream};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, watch};
use tracing::debug;

/// In-memory key-value store
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LocalStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, FinanceError> {
        let store = self.inner.lock().await;
        let value = store.get(key).cloned();
        if value.is_some() {
            debug!("Store HIT for key: {}", key);
        } else {
            debug!("Store MISS for key: {}", key);
        }
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), FinanceError> {
        let mut store = self.inner.lock().await;
        debug!("Store SET for key: {}", key);
        store.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// In-memory document collection with live snapshots.
pub struct MemoryCollection {
    docs: Arc<Mutex<Vec<StoredTransaction>>>,
    version: watch::Sender<u64>,
    next_id: AtomicU64,
}

impl MemoryCollection {
    pub fn new() -> Self {
        let (version, _) = watch::channel(0);
        Self {
            docs: Arc::new(Mutex::new(Vec::new())),
            version,
            next_id: AtomicU64::new(1),
        }
    }

    /// Inserts documents as-is, including legacy date representations.
    pub async fn seed(&self, seeded: impl IntoIterator<Item = StoredTransaction>) {
        let mut docs = self.docs.lock().await;
        docs.extend(seeded);
        sort_docs(&mut docs);
        drop(docs);
        self.notify();
    }

    pub async fn len(&self) -> usize {
        self.docs.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.docs.lock().await.is_empty()
    }

    fn notify(&self) {
        self.version.send_modify(|v| *v += 1);
    }
}

impl Default for MemoryCollection {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteCollection for MemoryCollection {
    async fn create(&self, record: TransactionRecord) -> Result<Transaction, FinanceError> {
        let id = format!("tx-{:06}", self.next_id.fetch_add(1, Ordering::SeqCst));
        let doc = StoredTransaction::from_record(id, record, Utc::now());
        let mut docs = self.docs.lock().await;
        docs.push(doc.clone());
        sort_docs(&mut docs);
        drop(docs);
        self.notify();
        Ok(doc.normalize())
    }

    async fn update(&self, id: &str, record: TransactionRecord) -> Result<(), FinanceError> {
        let mut docs = self.docs.lock().await;
        let doc = docs
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or_else(|| FinanceError::Api(format!("No transaction with id {id}")))?;
        doc.apply_record(record);
        sort_docs(&mut docs);
        drop(docs);
        self.notify();
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), FinanceError> {
        let mut docs = self.docs.lock().await;
        let before = docs.len();
        docs.retain(|d| d.id != id);
        if docs.len() == before {
            return Err(FinanceError::Api(format!("No transaction with id {id}")));
        }
        drop(docs);
        self.notify();
        Ok(())
    }

    async fn clear(&self) -> Result<usize, FinanceError> {
        let mut docs = self.docs.lock().await;
        let removed = docs.len();
        docs.clear();
        drop(docs);
        self.notify();
        Ok(removed)
    }

    async fn replace_date(&self, id: &str, date: StoredDate) -> Result<(), FinanceError> {
        let mut docs = self.docs.lock().await;
        let doc = docs
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or_else(|| FinanceError::Api(format!("No transaction with id {id}")))?;
        doc.transaction_date = date;
        sort_docs(&mut docs);
        drop(docs);
        self.notify();
        Ok(())
    }

    async fn fetch_page(&self, after: Option<&Cursor>, limit: usize) -> Result<Page, FinanceError> {
        let docs = self.docs.lock().await;
        let page = page_of(&docs, after, limit);
        debug!("Fetched page of {} documents", page.docs.len());
        Ok(page)
    }

    fn subscribe(&self, since: NaiveDate) -> SnapshotStream {
        let docs = Arc::clone(&self.docs);
        let rx = self.version.subscribe();
        futures::stream::unfold((rx, docs, true), move |(mut rx, docs, first)| async move {
            if !first && rx.changed().await.is_err() {
                return None;
            }
            let snapshot = live_snapshot(&docs.lock().await, since);
            Some((Ok(snapshot), (rx, docs, false)))
        })
        .boxed()
    }
}
