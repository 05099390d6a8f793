use super::ui;
use crate::Session;
use crate::core::model::StoredDate;
use crate::core::{FinanceError, RemoteCollection};
use anyhow::Result;
use indicatif::ProgressBar;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MigrationSummary {
    pub scanned: usize,
    pub migrated: usize,
}

/// Rewrites every instant-typed stored date as a plain calendar date.
///
/// The calendar date of a document does not change, so its position in
/// collection order is stable and paging can continue from the same cursor.
pub async fn migrate_dates(
    collection: &dyn RemoteCollection,
    page_size: usize,
    progress: &ProgressBar,
) -> Result<MigrationSummary, FinanceError> {
    let page_size = page_size.max(1);
    let mut summary = MigrationSummary::default();
    let mut cursor = None;

    loop {
        let page = collection.fetch_page(cursor.as_ref(), page_size).await?;
        let short = page.docs.len() < page_size;
        progress.inc_length(page.docs.len() as u64);

        for doc in &page.docs {
            summary.scanned += 1;
            if doc.transaction_date.is_instant() {
                let date = doc.calendar_date();
                debug!(id = %doc.id, %date, "Rewriting stored date");
                collection
                    .replace_date(&doc.id, StoredDate::Calendar(date))
                    .await?;
                summary.migrated += 1;
            }
            progress.inc(1);
        }
        progress.set_message(format!("{} migrated", summary.migrated));

        cursor = page.cursor;
        if short {
            break;
        }
    }

    info!(
        scanned = summary.scanned,
        migrated = summary.migrated,
        "Date migration finished"
    );
    Ok(summary)
}

pub async fn run(session: &Session) -> Result<()> {
    let progress = ui::new_progress_bar(0, true);
    progress.set_message("Migrating stored dates");
    let summary = migrate_dates(
        session.collection.as_ref(),
        session.config.store.page_size,
        &progress,
    )
    .await?;
    progress.finish_and_clear();

    println!(
        "{} {} scanned, {} migrated",
        ui::style_text("Date migration:", ui::StyleType::TotalLabel),
        summary.scanned,
        summary.migrated
    );
    Ok(())
}
