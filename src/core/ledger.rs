//! Write path: validation, rate freezing and the user-initiated mutations.

use crate::core::error::FinanceError;
use crate::core::model::{
    RecurringItem, Transaction, TransactionRecord, TransactionType, validate_category,
};
use crate::core::month::Month;
use crate::core::ports::RemoteCollection;
use crate::core::ranking::CategoryUsage;
use crate::core::rates::RateTable;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

/// Form input for a transaction. Every field is checked by [`Ledger::prepare`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionDraft {
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub category: String,
    pub amount: Option<f64>,
    pub currency: String,
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PostSummary {
    pub added: usize,
    pub skipped: usize,
}

pub struct Ledger {
    collection: Arc<dyn RemoteCollection>,
    base_currency: String,
    currencies: Vec<String>,
}

impl Ledger {
    pub fn new(
        collection: Arc<dyn RemoteCollection>,
        base_currency: &str,
        currencies: Vec<String>,
    ) -> Self {
        Self {
            collection,
            base_currency: base_currency.to_uppercase(),
            currencies: currencies.into_iter().map(|c| c.to_uppercase()).collect(),
        }
    }

    /// Validates a draft and freezes today's rate into the record.
    pub fn prepare(
        &self,
        draft: &TransactionDraft,
        rates: Option<&RateTable>,
    ) -> Result<TransactionRecord, FinanceError> {
        let amount = draft
            .amount
            .ok_or_else(|| FinanceError::validation("amount", "is required"))?;
        if !amount.is_finite() || amount <= 0.0 {
            return Err(FinanceError::validation("amount", "must be a positive number"));
        }
        let category = validate_category(draft.kind, &draft.category)?;
        let currency = match draft.currency.trim() {
            "" => self.base_currency.clone(),
            code => code.to_uppercase(),
        };
        if !self.currencies.contains(&currency) {
            return Err(FinanceError::validation(
                "currency",
                format!("{currency} is not one of {}", self.currencies.join(", ")),
            ));
        }
        let date = draft
            .date
            .ok_or_else(|| FinanceError::validation("date", "is required"))?;

        let rates = rates.ok_or(FinanceError::RatesUnavailable)?;
        let rate = rates.require_rate(&currency)?;

        Ok(TransactionRecord {
            kind: draft.kind,
            category: category.to_string(),
            original_amount: amount,
            original_currency: currency,
            transaction_date: date,
            description: draft
                .description
                .as_deref()
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(str::to_string),
            base_currency: self.base_currency.clone(),
            exchange_rate_to_base: rate,
            amount_in_base_currency: amount / rate,
        })
    }

    pub async fn add(
        &self,
        usage: &mut CategoryUsage,
        draft: &TransactionDraft,
        rates: Option<&RateTable>,
    ) -> Result<Transaction, FinanceError> {
        let record = self.prepare(draft, rates)?;
        let created = self.collection.create(record).await?;
        info!(id = %created.id, "Added {} transaction", created.kind);
        record_usage(usage, created.kind, &created.category).await;
        Ok(created)
    }

    /// Replaces a transaction. Rate and base amount are recomputed from `rates`,
    /// not carried over from the original record.
    pub async fn edit(
        &self,
        usage: &mut CategoryUsage,
        id: &str,
        draft: &TransactionDraft,
        rates: Option<&RateTable>,
    ) -> Result<TransactionRecord, FinanceError> {
        let record = self.prepare(draft, rates)?;
        self.collection.update(id, record.clone()).await?;
        info!(%id, "Edited transaction");
        record_usage(usage, record.kind, &record.category).await;
        Ok(record)
    }

    pub async fn delete(&self, id: &str) -> Result<(), FinanceError> {
        self.collection.delete(id).await?;
        info!(%id, "Deleted transaction");
        Ok(())
    }

    /// Writes all drafts, or none if any of them is invalid.
    pub async fn import(
        &self,
        usage: &mut CategoryUsage,
        drafts: &[TransactionDraft],
        rates: Option<&RateTable>,
    ) -> Result<usize, FinanceError> {
        let records = drafts
            .iter()
            .enumerate()
            .map(|(i, draft)| {
                self.prepare(draft, rates).map_err(|e| match e {
                    FinanceError::Validation { field, message } => FinanceError::Validation {
                        field: format!("entry {} {field}", i + 1),
                        message,
                    },
                    other => other,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        for record in records {
            let created = self.collection.create(record).await?;
            record_usage(usage, created.kind, &created.category).await;
        }
        info!("Imported {} transactions", drafts.len());
        Ok(drafts.len())
    }

    pub async fn wipe(&self) -> Result<usize, FinanceError> {
        let removed = self.collection.clear().await?;
        info!("Wiped {} transactions", removed);
        Ok(removed)
    }

    /// Posts each recurring item into `month` unless a transaction with the same
    /// description already exists there.
    pub async fn post_recurring(
        &self,
        usage: &mut CategoryUsage,
        items: &[RecurringItem],
        month: Month,
        existing: &[Transaction],
        rates: Option<&RateTable>,
    ) -> Result<PostSummary, FinanceError> {
        let mut posted: HashSet<String> = existing
            .iter()
            .filter(|tx| tx.month() == month)
            .map(|tx| tx.description_text().trim().to_string())
            .filter(|d| !d.is_empty())
            .collect();

        let mut ordered: Vec<&RecurringItem> = items.iter().collect();
        ordered.sort_by_key(|item| item.created_at);

        let mut summary = PostSummary::default();
        for item in ordered {
            let description = item.description.trim().to_string();
            if posted.contains(&description) {
                summary.skipped += 1;
                continue;
            }
            let draft = TransactionDraft {
                kind: item.kind,
                category: item.category.clone(),
                amount: Some(item.original_amount),
                currency: item.original_currency.clone(),
                date: Some(month.first_day()),
                description: Some(description.clone()),
            };
            self.add(usage, &draft, rates).await?;
            posted.insert(description);
            summary.added += 1;
        }
        info!(
            added = summary.added,
            skipped = summary.skipped,
            "Posted recurring items for {}", month
        );
        Ok(summary)
    }
}

async fn record_usage(usage: &mut CategoryUsage, kind: TransactionType, category: &str) {
    if let Err(e) = usage.record(kind, category).await {
        warn!("Failed to update category usage: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ports::LocalStore;
    use crate::store::memory::{MemoryCollection, MemoryStore};
    use chrono::Utc;
    use std::collections::HashMap;

    fn rates() -> RateTable {
        RateTable {
            date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            base: "EUR".into(),
            rates: HashMap::from([("EUR".to_string(), 1.0), ("USD".to_string(), 1.25)]),
        }
    }

    fn draft(amount: Option<f64>, currency: &str) -> TransactionDraft {
        TransactionDraft {
            kind: TransactionType::Expense,
            category: "groceries".into(),
            amount,
            currency: currency.into(),
            date: Some(NaiveDate::from_ymd_opt(2024, 6, 3).unwrap()),
            description: Some("  Weekly shop ".into()),
        }
    }

    async fn setup() -> (Arc<MemoryCollection>, Ledger, CategoryUsage) {
        let collection = Arc::new(MemoryCollection::new());
        let ledger = Ledger::new(collection.clone(), "eur", vec!["EUR".into(), "usd".into()]);
        let store: Arc<dyn LocalStore> = Arc::new(MemoryStore::new());
        let usage = CategoryUsage::load(store).await;
        (collection, ledger, usage)
    }

    #[tokio::test]
    async fn test_prepare_freezes_rate() {
        let (_, ledger, _) = setup().await;
        let record = ledger.prepare(&draft(Some(50.0), "usd"), Some(&rates())).unwrap();
        assert_eq!(record.original_currency, "USD");
        assert_eq!(record.category, "Groceries");
        assert_eq!(record.exchange_rate_to_base, 1.25);
        assert!(
            (record.amount_in_base_currency - record.original_amount / record.exchange_rate_to_base)
                .abs()
                < 1e-12
        );
        assert_eq!(record.description.as_deref(), Some("Weekly shop"));
    }

    #[tokio::test]
    async fn test_validation_happens_before_rates() {
        let (_, ledger, _) = setup().await;
        assert_eq!(
            ledger.prepare(&draft(None, "EUR"), None).unwrap_err(),
            FinanceError::validation("amount", "is required")
        );
        assert!(matches!(
            ledger.prepare(&draft(Some(-1.0), "EUR"), None),
            Err(FinanceError::Validation { .. })
        ));
        assert!(matches!(
            ledger.prepare(&draft(Some(1.0), "JPY"), Some(&rates())),
            Err(FinanceError::Validation { field, .. }) if field == "currency"
        ));
        assert_eq!(
            ledger.prepare(&draft(Some(1.0), "EUR"), None).unwrap_err(),
            FinanceError::RatesUnavailable
        );
    }

    #[tokio::test]
    async fn test_add_writes_and_counts_usage() {
        let (collection, ledger, mut usage) = setup().await;
        ledger
            .add(&mut usage, &draft(Some(10.0), "EUR"), Some(&rates()))
            .await
            .unwrap();
        assert_eq!(collection.len().await, 1);
        assert_eq!(usage.count(TransactionType::Expense, "Groceries"), 1);
    }

    #[tokio::test]
    async fn test_edit_recomputes_from_current_rate() {
        let (collection, ledger, mut usage) = setup().await;
        let created = ledger
            .add(&mut usage, &draft(Some(50.0), "USD"), Some(&rates()))
            .await
            .unwrap();
        assert_eq!(created.amount_in_base_currency, 40.0);

        let mut today = rates();
        today.rates.insert("USD".into(), 1.0);
        ledger
            .edit(&mut usage, &created.id, &draft(Some(50.0), "USD"), Some(&today))
            .await
            .unwrap();

        let page = collection.fetch_page(None, 10).await.unwrap();
        assert_eq!(page.docs[0].exchange_rate_to_base, 1.0);
        assert_eq!(page.docs[0].amount_in_base_currency, 50.0);
        assert_eq!(usage.count(TransactionType::Expense, "Groceries"), 2);
    }

    #[tokio::test]
    async fn test_import_is_all_or_nothing() {
        let (collection, ledger, mut usage) = setup().await;
        let drafts = vec![draft(Some(1.0), "EUR"), draft(None, "EUR")];
        let err = ledger.import(&mut usage, &drafts, Some(&rates())).await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid entry 2 amount: is required");
        assert!(collection.is_empty().await);

        let drafts = vec![draft(Some(1.0), "EUR"), draft(Some(2.0), "USD")];
        assert_eq!(ledger.import(&mut usage, &drafts, Some(&rates())).await.unwrap(), 2);
        assert_eq!(ledger.wipe().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_post_recurring_skips_already_posted() {
        let (collection, ledger, mut usage) = setup().await;
        let month: Month = "2024-06".parse().unwrap();
        let rent = ledger
            .add(
                &mut usage,
                &TransactionDraft {
                    kind: TransactionType::Expense,
                    category: "Housing".into(),
                    amount: Some(1200.0),
                    currency: "EUR".into(),
                    date: Some(NaiveDate::from_ymd_opt(2024, 6, 2).unwrap()),
                    description: Some("Rent".into()),
                },
                Some(&rates()),
            )
            .await
            .unwrap();

        let item = |description: &str, kind, category: &str| RecurringItem {
            description: description.into(),
            kind,
            category: category.into(),
            original_amount: 10.0,
            original_currency: "EUR".into(),
            created_at: Utc::now(),
        };
        let items = vec![
            item("Rent", TransactionType::Expense, "Housing"),
            item("Salary", TransactionType::Income, "Salary"),
            item("Internet", TransactionType::Expense, "Utilities"),
        ];

        let summary = ledger
            .post_recurring(&mut usage, &items, month, &[rent], Some(&rates()))
            .await
            .unwrap();
        assert_eq!(summary, PostSummary { added: 2, skipped: 1 });
        assert_eq!(collection.len().await, 3);

        let page = collection.fetch_page(None, 10).await.unwrap();
        assert!(
            page.docs
                .iter()
                .filter(|d| d.description.as_deref() != Some("Rent"))
                .all(|d| d.calendar_date() == month.first_day())
        );
    }
}
