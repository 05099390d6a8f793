use super::ui;
use crate::Session;
use crate::core::Month;
use crate::core::window::TransactionWindow;
use anyhow::Result;
use chrono::NaiveDate;
use tracing::debug;

/// Loads history until `month` is fully held by `window`.
pub async fn load_through(
    window: &mut TransactionWindow,
    today: NaiveDate,
    month: Month,
) -> Result<()> {
    window.fetch_initial(today).await?;
    while window.has_more() && window.oldest_loaded_month().is_some_and(|oldest| oldest > month) {
        let added = window.fetch_one_more_month().await?;
        debug!("Backfilled {} transactions while looking for {}", added, month);
    }
    Ok(())
}

pub async fn run(session: &Session, month: Option<Month>) -> Result<()> {
    let month = month.unwrap_or_else(|| Month::from_date(session.today));
    let items = &session.config.recurring;
    if items.is_empty() {
        println!(
            "{}",
            ui::style_text("No recurring items configured", ui::StyleType::Warning)
        );
        return Ok(());
    }

    let rates = session.load_rates().await;
    let mut window = session.window();
    let spinner = ui::new_spinner(&format!("Checking transactions for {month}..."));
    load_through(&mut window, session.today, month).await?;
    spinner.finish_and_clear();

    let mut usage = session.usage().await;
    let summary = session
        .ledger()
        .post_recurring(&mut usage, items, month, window.transactions(), rates.as_ref())
        .await?;

    println!(
        "{} {}: {} added, {} already present",
        ui::style_text("Recurring items for", ui::StyleType::TotalLabel),
        month,
        summary.added,
        summary.skipped
    );
    Ok(())
}
