use super::ui;
use crate::Session;
use crate::core::ledger::TransactionDraft;
use crate::core::ranking::CategoryUsage;
use crate::core::{FinanceError, Transaction, TransactionType};
use anyhow::{Context, Result};
use comfy_table::{Cell, CellAlignment};
use std::path::Path;
use tracing::debug;

fn describe(tx: &Transaction) -> String {
    format!(
        "{} {} {:.2} {} ({}) on {}",
        tx.kind,
        tx.category,
        tx.original_amount,
        tx.original_currency,
        tx.description_text(),
        tx.transaction_date
    )
}

pub async fn add(session: &Session, draft: &TransactionDraft) -> Result<()> {
    let rates = session.load_rates().await;
    let mut usage = session.usage().await;
    let created = session
        .ledger()
        .add(&mut usage, draft, rates.as_ref())
        .await?;
    println!(
        "{} {} [{}]",
        ui::style_text("Added", ui::StyleType::TotalLabel),
        describe(&created),
        ui::style_text(&created.id, ui::StyleType::Subtle)
    );
    Ok(())
}

pub async fn edit(session: &Session, id: &str, draft: &TransactionDraft) -> Result<()> {
    let rates = session.load_rates().await;
    let mut usage = session.usage().await;
    let record = session
        .ledger()
        .edit(&mut usage, id, draft, rates.as_ref())
        .await?;
    println!(
        "{} {id}: {} {:.2} {} = {:.2} {}",
        ui::style_text("Updated", ui::StyleType::TotalLabel),
        record.category,
        record.original_amount,
        record.original_currency,
        record.amount_in_base_currency,
        record.base_currency
    );
    Ok(())
}

pub async fn delete(session: &Session, id: &str) -> Result<()> {
    session.ledger().delete(id).await?;
    println!(
        "{} {id}",
        ui::style_text("Deleted", ui::StyleType::TotalLabel)
    );
    Ok(())
}

/// Reads a JSON array of drafts from `path`.
pub fn read_drafts(path: &Path) -> Result<Vec<TransactionDraft>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read import file {}", path.display()))?;
    let drafts: Vec<TransactionDraft> =
        serde_json::from_str(&content).map_err(FinanceError::from)?;
    debug!("Read {} drafts from {}", drafts.len(), path.display());
    Ok(drafts)
}

pub async fn import(session: &Session, path: &Path) -> Result<()> {
    let drafts = read_drafts(path)?;
    let rates = session.load_rates().await;
    let mut usage = session.usage().await;
    let count = session
        .ledger()
        .import(&mut usage, &drafts, rates.as_ref())
        .await?;
    println!(
        "{} {count} transactions",
        ui::style_text("Imported", ui::StyleType::TotalLabel)
    );
    Ok(())
}

pub async fn wipe(session: &Session) -> Result<()> {
    let removed = session.ledger().wipe().await?;
    println!(
        "{}",
        ui::style_text(
            &format!("Removed {removed} transactions"),
            ui::StyleType::Warning
        )
    );
    Ok(())
}

/// Category picker order for `kind`, most used first.
pub fn categories_table(usage: &CategoryUsage, kind: TransactionType) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![ui::header_cell("Category"), ui::header_cell("Used")]);
    for category in usage.ordered(kind) {
        table.add_row(vec![
            Cell::new(category),
            Cell::new(usage.count(kind, category)).set_alignment(CellAlignment::Right),
        ]);
    }
    table.to_string()
}

pub async fn categories(session: &Session, kind: TransactionType) -> Result<()> {
    let usage = session.usage().await;
    println!(
        "{}\n{}",
        ui::style_text(&format!("{kind} categories"), ui::StyleType::Title),
        categories_table(&usage, kind)
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::LocalStore;
    use crate::store::memory::MemoryStore;
    use chrono::NaiveDate;
    use std::sync::Arc;
    use tempfile::tempdir;

    #[test]
    fn test_read_drafts() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("import.json");
        std::fs::write(
            &path,
            r#"[
                {"type": "expense", "category": "Groceries", "amount": 42.5,
                 "currency": "EUR", "date": "2024-06-03", "description": "Market"},
                {"type": "income", "category": "Salary", "amount": 3000,
                 "currency": "USD", "date": "2024-06-01"}
            ]"#,
        )
        .unwrap();

        let drafts = read_drafts(&path).unwrap();
        assert_eq!(drafts.len(), 2);
        assert_eq!(drafts[0].kind, TransactionType::Expense);
        assert_eq!(drafts[0].description.as_deref(), Some("Market"));
        assert_eq!(drafts[1].date, NaiveDate::from_ymd_opt(2024, 6, 1));
        assert_eq!(drafts[1].description, None);
    }

    #[test]
    fn test_read_drafts_rejects_malformed_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("import.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(read_drafts(&path).is_err());
        assert!(read_drafts(&dir.path().join("missing.json")).is_err());
    }

    #[tokio::test]
    async fn test_categories_table_puts_used_first() {
        let store: Arc<dyn LocalStore> = Arc::new(MemoryStore::default());
        let mut usage = CategoryUsage::load(store).await;
        usage.record(TransactionType::Income, "Freelance").await.unwrap();

        let table = categories_table(&usage, TransactionType::Income);
        let freelance = table.find("Freelance").unwrap();
        let salary = table.find("Salary").unwrap();
        assert!(freelance < salary);
    }
}
