use super::{live_snapshot, page_of, sort_docs};
use crate::core::error::FinanceError;
use crate::core::model::{StoredDate, StoredTransaction, Transaction, TransactionRecord};
use crate::core::ports::{Cursor, LocalStore, Page, RemoteCollection, SnapshotStream};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use fjall::{Keyspace, PartitionCreateOptions, PartitionHandle, PersistMode};
use fs2::FileExt;
use futures::StreamExt;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::debug;

const KEYSPACE_DIR: &str = "keyspace";
const LOCK_FILE: &str = "famfin.lock";
const CHANGES_FILE: &str = "changes";
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// A fjall keyspace shared between processes.
///
/// fjall keeps the tree state of a keyspace in the process that opened it, so
/// a long-lived handle never sees writes made by another `famfin` process.
/// Every operation opens the keyspace under an exclusive file lock and drops
/// it before the lock is released.
#[derive(Debug, Clone)]
struct SharedKeyspace {
    path: PathBuf,
    partition: &'static str,
}

impl SharedKeyspace {
    fn new(path: &Path, partition: &'static str) -> Result<Self, FinanceError> {
        fs::create_dir_all(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            partition,
        })
    }

    fn with_partition<T>(
        &self,
        op: impl FnOnce(&Keyspace, &PartitionHandle) -> Result<T, FinanceError>,
    ) -> Result<T, FinanceError> {
        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.path.join(LOCK_FILE))?;
        FileExt::lock_exclusive(&lock)?;

        let result = fjall::Config::new(self.path.join(KEYSPACE_DIR))
            .open()
            .map_err(FinanceError::from)
            .and_then(|keyspace| {
                let partition =
                    keyspace.open_partition(self.partition, PartitionCreateOptions::default())?;
                op(&keyspace, &partition)
            });

        FileExt::unlock(&lock)?;
        result
    }

    /// Counter bumped after every persisted write, readable without the lock.
    fn changes(&self) -> u64 {
        fs::read_to_string(self.path.join(CHANGES_FILE))
            .ok()
            .and_then(|raw| raw.trim().parse().ok())
            .unwrap_or(0)
    }

    /// Must be called with the lock held.
    fn bump_changes(&self) -> Result<(), FinanceError> {
        let next = self.changes().wrapping_add(1);
        fs::write(self.path.join(CHANGES_FILE), next.to_string())?;
        Ok(())
    }
}

/// Device-local key-value store persisted in a fjall partition.
pub struct DiskStore {
    shared: SharedKeyspace,
}

impl DiskStore {
    pub fn open(path: &Path) -> Result<Self, FinanceError> {
        Ok(Self {
            shared: SharedKeyspace::new(path, "local")?,
        })
    }
}

#[async_trait]
impl LocalStore for DiskStore {
    async fn get(&self, key: &str) -> Result<Option<String>, FinanceError> {
        let value = self
            .shared
            .with_partition(|_, partition| Ok(partition.get(key)?))?;
        match value {
            Some(value) => {
                debug!("Store HIT for key: {}", key);
                String::from_utf8(value.to_vec())
                    .map(Some)
                    .map_err(|e| FinanceError::Storage(e.to_string()))
            }
            None => {
                debug!("Store MISS for key: {}", key);
                Ok(None)
            }
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), FinanceError> {
        self.shared.with_partition(|keyspace, partition| {
            partition.insert(key, value)?;
            keyspace.persist(PersistMode::SyncAll)?;
            Ok(())
        })?;
        debug!("Store SET for key: {}", key);
        Ok(())
    }
}

/// Local stand-in for the hosted transaction collection. Documents are keyed
/// by id and ordered on read. Subscriptions poll for writes from any process.
pub struct DiskCollection {
    shared: SharedKeyspace,
    next_id: AtomicU64,
}

impl DiskCollection {
    pub fn open(path: &Path) -> Result<Self, FinanceError> {
        Ok(Self {
            shared: SharedKeyspace::new(path, "documents")?,
            next_id: AtomicU64::new(0),
        })
    }

    fn load_sorted(partition: &PartitionHandle) -> Result<Vec<StoredTransaction>, FinanceError> {
        let mut docs = Vec::new();
        for item in partition.iter() {
            let (_, value) = item?;
            docs.push(serde_json::from_slice::<StoredTransaction>(&value)?);
        }
        sort_docs(&mut docs);
        Ok(docs)
    }

    fn read(partition: &PartitionHandle, id: &str) -> Result<StoredTransaction, FinanceError> {
        let value = partition
            .get(id)?
            .ok_or_else(|| FinanceError::Api(format!("No transaction with id {id}")))?;
        Ok(serde_json::from_slice(&value)?)
    }

    fn write(
        &self,
        keyspace: &Keyspace,
        partition: &PartitionHandle,
        doc: &StoredTransaction,
    ) -> Result<(), FinanceError> {
        partition.insert(doc.id.as_str(), serde_json::to_vec(doc)?)?;
        keyspace.persist(PersistMode::SyncAll)?;
        self.shared.bump_changes()
    }

    fn new_id(&self) -> String {
        let now = Utc::now().timestamp_micros();
        let seq = self.next_id.fetch_add(1, Ordering::SeqCst);
        format!("{now:x}-{:x}-{seq:04x}", std::process::id())
    }
}

struct Watch {
    shared: SharedKeyspace,
    since: NaiveDate,
    ticker: Option<Interval>,
    seen_changes: Option<u64>,
    sent: Option<Vec<StoredTransaction>>,
}

impl Watch {
    /// Waits for the next live result that differs from the last one sent.
    async fn next_snapshot(&mut self) -> Result<Vec<StoredTransaction>, FinanceError> {
        loop {
            if self.seen_changes.is_some() {
                let ticker = self.ticker.get_or_insert_with(|| {
                    let mut ticker = tokio::time::interval(POLL_INTERVAL);
                    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                    ticker
                });
                ticker.tick().await;
                if self.seen_changes == Some(self.shared.changes()) {
                    continue;
                }
            }
            self.seen_changes = Some(self.shared.changes());

            let docs = self
                .shared
                .with_partition(|_, partition| DiskCollection::load_sorted(partition))?;
            let snapshot = live_snapshot(&docs, self.since);
            if self.sent.as_ref() == Some(&snapshot) {
                continue;
            }
            debug!("Live query changed, {} documents", snapshot.len());
            self.sent = Some(snapshot.clone());
            return Ok(snapshot);
        }
    }
}

#[async_trait]
impl RemoteCollection for DiskCollection {
    async fn create(&self, record: TransactionRecord) -> Result<Transaction, FinanceError> {
        let doc = StoredTransaction::from_record(self.new_id(), record, Utc::now());
        self.shared
            .with_partition(|keyspace, partition| self.write(keyspace, partition, &doc))?;
        debug!("Created document {}", doc.id);
        Ok(doc.normalize())
    }

    async fn update(&self, id: &str, record: TransactionRecord) -> Result<(), FinanceError> {
        self.shared.with_partition(|keyspace, partition| {
            let mut doc = Self::read(partition, id)?;
            doc.apply_record(record);
            self.write(keyspace, partition, &doc)
        })
    }

    async fn delete(&self, id: &str) -> Result<(), FinanceError> {
        self.shared.with_partition(|keyspace, partition| {
            if !partition.contains_key(id)? {
                return Err(FinanceError::Api(format!("No transaction with id {id}")));
            }
            partition.remove(id)?;
            keyspace.persist(PersistMode::SyncAll)?;
            self.shared.bump_changes()
        })
    }

    async fn clear(&self) -> Result<usize, FinanceError> {
        self.shared.with_partition(|keyspace, partition| {
            let mut keys = Vec::new();
            for item in partition.iter() {
                let (key, _) = item?;
                keys.push(key);
            }
            for key in &keys {
                partition.remove(key.to_vec())?;
            }
            keyspace.persist(PersistMode::SyncAll)?;
            self.shared.bump_changes()?;
            Ok(keys.len())
        })
    }

    async fn replace_date(&self, id: &str, date: StoredDate) -> Result<(), FinanceError> {
        self.shared.with_partition(|keyspace, partition| {
            let mut doc = Self::read(partition, id)?;
            doc.transaction_date = date;
            self.write(keyspace, partition, &doc)
        })
    }

    async fn fetch_page(&self, after: Option<&Cursor>, limit: usize) -> Result<Page, FinanceError> {
        let docs = self.shared.with_partition(|_, partition| Self::load_sorted(partition))?;
        Ok(page_of(&docs, after, limit))
    }

    fn subscribe(&self, since: NaiveDate) -> SnapshotStream {
        let watch = Watch {
            shared: self.shared.clone(),
            since,
            ticker: None,
            seen_changes: None,
            sent: None,
        };
        futures::stream::unfold(watch, |mut watch| async move {
            let snapshot = watch.next_snapshot().await;
            Some((snapshot, watch))
        })
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::TransactionType;
    use tempfile::tempdir;

    fn record(date: &str) -> TransactionRecord {
        TransactionRecord {
            kind: TransactionType::Income,
            category: "Salary".into(),
            original_amount: 100.0,
            original_currency: "USD".into(),
            transaction_date: date.parse().unwrap(),
            description: Some("June pay".into()),
            base_currency: "EUR".into(),
            exchange_rate_to_base: 1.25,
            amount_in_base_currency: 80.0,
        }
    }

    #[tokio::test]
    async fn test_disk_store_get_set() {
        let dir = tempdir().unwrap();
        let store = DiskStore::open(dir.path()).unwrap();

        assert!(store.get("key1").await.unwrap().is_none());
        store.set("key1", "value").await.unwrap();
        assert_eq!(store.get("key1").await.unwrap().as_deref(), Some("value"));
    }

    #[tokio::test]
    async fn test_disk_store_shared_between_handles() {
        let dir = tempdir().unwrap();
        let reader = DiskStore::open(dir.path()).unwrap();
        let writer = DiskStore::open(dir.path()).unwrap();

        assert!(reader.get("rates_cache").await.unwrap().is_none());
        writer.set("rates_cache", "{}").await.unwrap();
        assert_eq!(reader.get("rates_cache").await.unwrap().as_deref(), Some("{}"));
    }

    #[tokio::test]
    async fn test_disk_collection_survives_reopen() {
        let dir = tempdir().unwrap();
        let id = {
            let collection = DiskCollection::open(dir.path()).unwrap();
            collection.create(record("2024-06-01")).await.unwrap().id
        };

        let collection = DiskCollection::open(dir.path()).unwrap();
        let page = collection.fetch_page(None, 10).await.unwrap();
        assert_eq!(page.docs.len(), 1);
        assert_eq!(page.docs[0].id, id);
        assert_eq!(page.docs[0].description.as_deref(), Some("June pay"));
    }

    #[tokio::test]
    async fn test_disk_collection_replace_date_and_clear() {
        let dir = tempdir().unwrap();
        let collection = DiskCollection::open(dir.path()).unwrap();
        let created = collection.create(record("2024-06-01")).await.unwrap();
        collection.create(record("2024-05-01")).await.unwrap();

        let instant = chrono::DateTime::parse_from_rfc3339("2024-06-01T00:00:00+02:00").unwrap();
        collection
            .replace_date(&created.id, StoredDate::Instant(instant))
            .await
            .unwrap();
        let page = collection.fetch_page(None, 10).await.unwrap();
        assert!(page.docs[0].transaction_date.is_instant());

        assert_eq!(collection.clear().await.unwrap(), 2);
        assert!(collection.fetch_page(None, 10).await.unwrap().docs.is_empty());
    }

    #[tokio::test]
    async fn test_subscription_sees_writes_from_another_handle() {
        let dir = tempdir().unwrap();
        let watcher = DiskCollection::open(dir.path()).unwrap();
        let mut feed = watcher.subscribe("2024-05-01".parse().unwrap());

        let initial = feed.next().await.unwrap().unwrap();
        assert!(initial.is_empty());

        let writer = DiskCollection::open(dir.path()).unwrap();
        writer.create(record("2024-06-02")).await.unwrap();

        let updated = tokio::time::timeout(Duration::from_secs(5), feed.next())
            .await
            .expect("no snapshot after a write from another handle")
            .unwrap()
            .unwrap();
        assert_eq!(updated.len(), 1);
        assert_eq!(updated[0].calendar_date().to_string(), "2024-06-02");
    }

    #[tokio::test]
    async fn test_subscription_skips_writes_outside_live_range() {
        let dir = tempdir().unwrap();
        let collection = DiskCollection::open(dir.path()).unwrap();
        let mut feed = collection.subscribe("2024-05-01".parse().unwrap());
        assert!(feed.next().await.unwrap().unwrap().is_empty());

        collection.create(record("2024-01-15")).await.unwrap();
        collection.create(record("2024-05-20")).await.unwrap();

        let updated = tokio::time::timeout(Duration::from_secs(5), feed.next())
            .await
            .expect("no snapshot after a live-range write")
            .unwrap()
            .unwrap();
        assert_eq!(updated.len(), 1);
        assert_eq!(updated[0].calendar_date().to_string(), "2024-05-20");
    }
}
