//! Per-category usage counts, used to put frequently used categories first.

use crate::core::error::FinanceError;
use crate::core::model::{Transaction, TransactionType};
use crate::core::ports::LocalStore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

pub const CATEGORY_USAGE_KEY: &str = "category_usage";
const TOP_CATEGORIES: usize = 5;

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
struct UsageCounts {
    #[serde(default)]
    expense: HashMap<String, u32>,
    #[serde(default)]
    income: HashMap<String, u32>,
}

impl UsageCounts {
    fn for_kind(&self, kind: TransactionType) -> &HashMap<String, u32> {
        match kind {
            TransactionType::Expense => &self.expense,
            TransactionType::Income => &self.income,
        }
    }

    fn for_kind_mut(&mut self, kind: TransactionType) -> &mut HashMap<String, u32> {
        match kind {
            TransactionType::Expense => &mut self.expense,
            TransactionType::Income => &mut self.income,
        }
    }
}

pub struct CategoryUsage {
    store: Arc<dyn LocalStore>,
    counts: UsageCounts,
}

impl CategoryUsage {
    /// Loads persisted counts. Unreadable data starts from zero; it is only a cache.
    pub async fn load(store: Arc<dyn LocalStore>) -> Self {
        let counts = match store.get(CATEGORY_USAGE_KEY).await {
            Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!("Discarding unreadable category usage: {}", e);
                UsageCounts::default()
            }),
            Ok(None) => UsageCounts::default(),
            Err(e) => {
                warn!("Failed to read category usage: {}", e);
                UsageCounts::default()
            }
        };
        Self { store, counts }
    }

    pub fn count(&self, kind: TransactionType, category: &str) -> u32 {
        self.counts
            .for_kind(kind)
            .get(category)
            .copied()
            .unwrap_or(0)
    }

    pub async fn record(
        &mut self,
        kind: TransactionType,
        category: &str,
    ) -> Result<(), FinanceError> {
        *self
            .counts
            .for_kind_mut(kind)
            .entry(category.to_string())
            .or_insert(0) += 1;
        debug!("Recorded use of {} category {}", kind, category);
        self.persist().await
    }

    /// Recomputes every count from `transactions`, discarding previous counts.
    pub async fn rebuild(&mut self, transactions: &[Transaction]) -> Result<(), FinanceError> {
        let mut counts = UsageCounts::default();
        for tx in transactions {
            *counts
                .for_kind_mut(tx.kind)
                .entry(tx.category.clone())
                .or_insert(0) += 1;
        }
        self.counts = counts;
        debug!("Rebuilt category usage from {} transactions", transactions.len());
        self.persist().await
    }

    /// The type's fixed categories: up to five most used first (ties in list
    /// order), then the rest alphabetically.
    pub fn ordered(&self, kind: TransactionType) -> Vec<&'static str> {
        let list = kind.categories();
        let counts = self.counts.for_kind(kind);

        let mut used: Vec<(usize, &'static str, u32)> = list
            .iter()
            .enumerate()
            .filter_map(|(i, c)| counts.get(*c).filter(|n| **n > 0).map(|n| (i, *c, *n)))
            .collect();
        used.sort_by(|a, b| b.2.cmp(&a.2).then(a.0.cmp(&b.0)));
        used.truncate(TOP_CATEGORIES);

        let mut ordered: Vec<&'static str> = used.iter().map(|(_, c, _)| *c).collect();
        let mut rest: Vec<&'static str> = list
            .iter()
            .copied()
            .filter(|c| !ordered.contains(c))
            .collect();
        rest.sort_unstable();
        ordered.extend(rest);
        ordered
    }

    async fn persist(&self) -> Result<(), FinanceError> {
        let raw = serde_json::to_string(&self.counts)?;
        self.store.set(CATEGORY_USAGE_KEY, &raw).await
    }
}
