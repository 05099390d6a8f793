//! Adapters for the persistence ports: in-memory for tests and embedding,
//! fjall-backed for the CLI.

pub mod disk;
pub mod memory;

use crate::core::model::StoredTransaction;
use crate::core::ports::{Cursor, Page, collection_order};
use chrono::NaiveDate;

pub(crate) fn sort_docs(docs: &mut [StoredTransaction]) {
    docs.sort_by(|a, b| collection_order(&a.calendar_date(), &a.id, &b.calendar_date(), &b.id));
}

/// Slices one page out of an already sorted document list.
pub(crate) fn page_of(
    sorted: &[StoredTransaction],
    after: Option<&Cursor>,
    limit: usize,
) -> Page {
    let docs: Vec<StoredTransaction> = sorted
        .iter()
        .filter(|doc| after.is_none_or(|c| c.precedes(doc)))
        .take(limit)
        .cloned()
        .collect();
    let cursor = docs.last().map(Cursor::after).or_else(|| after.cloned());
    Page { docs, cursor }
}

pub(crate) fn live_snapshot(
    sorted: &[StoredTransaction],
    since: NaiveDate,
) -> Vec<StoredTransaction> {
    sorted
        .iter()
        .filter(|doc| doc.calendar_date() >= since)
        .cloned()
        .collect()
}
