use super::ui;
use crate::Session;
use crate::core::aggregate::{
    DEFAULT_REPORT_PAGE_SIZE, ReportData, ReportFilter, ReportView, SortKey, aggregate,
};
use crate::core::window::TransactionWindow;
use crate::core::{FinanceError, Month, RateTable, TransactionType};
use anyhow::Result;
use comfy_table::Cell;
use futures::StreamExt;
use tracing::{debug, warn};

#[derive(Debug, Clone, Default)]
pub struct ReportOptions {
    pub months: Vec<Month>,
    pub categories: Vec<String>,
    pub search: Option<String>,
    pub currency: Option<String>,
    pub sort: Option<SortKey>,
    pub descending: bool,
    pub page: usize,
    pub backfill_months: usize,
    pub all: bool,
    pub watch: bool,
}

impl ReportOptions {
    fn view(&self) -> ReportView {
        let mut view = ReportView::new(DEFAULT_REPORT_PAGE_SIZE);
        view.set_filter(ReportFilter {
            months: self.months.iter().copied().collect(),
            categories: self.categories.iter().cloned().collect(),
            description: self
                .search
                .as_deref()
                .map(str::trim)
                .unwrap_or_default()
                .to_string(),
        });
        if let Some(key) = self.sort {
            view.select_sort(key);
            if self.descending {
                view.select_sort(key);
            }
        }
        view.set_page(self.page);
        view
    }
}

impl ReportData {
    pub fn display_as_table(&self, view: &ReportView) -> String {
        let currency = &self.display_currency;
        let mut output = String::new();

        let mut totals = ui::new_styled_table();
        totals.set_header(vec![
            ui::header_cell(&format!("Income ({currency})")),
            ui::header_cell(&format!("Expense ({currency})")),
            ui::header_cell(&format!("Net ({currency})")),
        ]);
        totals.add_row(vec![
            ui::amount_cell(self.total_income),
            ui::amount_cell(self.total_expense),
            ui::balance_cell(self.net_balance),
        ]);
        output.push_str(&format!(
            "{}\n{totals}\n",
            ui::style_text("Summary", ui::StyleType::Title)
        ));

        if !self.expense_by_category.is_empty() {
            let mut categories = ui::new_styled_table();
            categories.set_header(vec![
                ui::header_cell("Category"),
                ui::header_cell(&format!("Expense ({currency})")),
                ui::header_cell("Share (%)"),
            ]);
            for (category, amount) in &self.expense_by_category {
                let share = (self.total_expense > 0.0).then(|| amount / self.total_expense * 100.0);
                categories.add_row(vec![
                    Cell::new(category),
                    ui::amount_cell(*amount),
                    ui::format_optional_cell(share, |s| format!("{s:.1}%")),
                ]);
            }
            output.push_str(&format!(
                "\n{}\n{categories}\n",
                ui::style_text("Expenses by category", ui::StyleType::Title)
            ));
        }

        if !self.monthly_trend.is_empty() {
            let mut trend = ui::new_styled_table();
            trend.set_header(vec![
                ui::header_cell("Month"),
                ui::header_cell("Income"),
                ui::header_cell("Expense"),
                ui::header_cell("Net"),
            ]);
            for month in &self.monthly_trend {
                trend.add_row(vec![
                    Cell::new(month.month.to_string()),
                    ui::amount_cell(month.income),
                    ui::amount_cell(month.expense),
                    ui::balance_cell(month.income - month.expense),
                ]);
            }
            output.push_str(&format!(
                "\n{}\n{trend}\n",
                ui::style_text("Monthly trend", ui::StyleType::Title)
            ));
        }

        let mut rows = self.rows.clone();
        let page_count = view.page_count(rows.len());
        let page = view.page().min(page_count);
        let mut table = ui::new_styled_table();
        table.set_header(vec![
            ui::header_cell("Date"),
            ui::header_cell("Type"),
            ui::header_cell("Category"),
            ui::header_cell("Description"),
            ui::header_cell("Original"),
            ui::header_cell(&format!("Amount ({currency})")),
            ui::header_cell("Id"),
        ]);
        for row in view.page_rows(&mut rows) {
            let tx = &row.transaction;
            let kind = match tx.kind {
                TransactionType::Expense => ui::style_text("expense", ui::StyleType::Error),
                TransactionType::Income => ui::style_text("income", ui::StyleType::TotalValue),
            };
            table.add_row(vec![
                Cell::new(tx.transaction_date.to_string()),
                Cell::new(kind),
                Cell::new(&tx.category),
                ui::format_optional_cell(tx.description.as_deref(), str::to_string),
                Cell::new(format!("{:.2} {}", tx.original_amount, tx.original_currency)),
                ui::amount_cell(row.display_amount),
                Cell::new(ui::style_text(&tx.id, ui::StyleType::Subtle)),
            ]);
        }
        output.push_str(&format!(
            "\n{}\n{table}\nPage {page} of {page_count} ({} transactions)",
            ui::style_text("Transactions", ui::StyleType::Title),
            self.rows.len()
        ));

        output
    }
}

fn window_note(window: &TransactionWindow) -> String {
    let from = window
        .oldest_loaded_month()
        .map_or("N/A".to_string(), |m| m.to_string());
    if window.has_more() {
        ui::style_text(
            &format!("Showing data from {from}. Older months available with --backfill or --all."),
            ui::StyleType::Subtle,
        )
    } else {
        ui::style_text(
            &format!("Showing full history from {from}."),
            ui::StyleType::Subtle,
        )
    }
}

fn render(
    window: &TransactionWindow,
    view: &ReportView,
    display_currency: &str,
    rates: &RateTable,
) -> Result<()> {
    let report = aggregate(window.transactions(), view.filter(), display_currency, rates)?;
    println!("{}", report.display_as_table(view));
    println!("{}", window_note(window));
    Ok(())
}

pub async fn run(session: &Session, options: &ReportOptions) -> Result<()> {
    let rates = session
        .load_rates()
        .await
        .ok_or(FinanceError::RatesUnavailable)?;
    let display_currency = options
        .currency
        .as_deref()
        .map(str::to_uppercase)
        .unwrap_or_else(|| session.config.display_currency());

    let mut window = session.window();
    let spinner = ui::new_spinner("Loading transactions...");
    window.fetch_initial(session.today).await?;
    if options.all {
        window.fetch_all().await?;
    } else {
        for _ in 0..options.backfill_months {
            if !window.has_more() {
                break;
            }
            window.fetch_one_more_month().await?;
        }
    }
    spinner.finish_and_clear();

    if options.all || options.backfill_months > 0 {
        let mut usage = session.usage().await;
        if let Err(e) = usage.rebuild(window.transactions()).await {
            warn!("Failed to rebuild category usage: {}", e);
        }
    }

    let mut feed = window.subscribe(session.today);
    if let Some(snapshot) = feed.next().await {
        window.apply_live_snapshot(snapshot?, session.today);
    }

    let view = options.view();
    render(&window, &view, &display_currency, &rates)?;

    if options.watch {
        debug!("Watching live window for changes");
        loop {
            tokio::select! {
                snapshot = feed.next() => match snapshot {
                    Some(snapshot) => {
                        window.apply_live_snapshot(snapshot?, session.today);
                        ui::print_separator();
                        render(&window, &view, &display_currency, &rates)?;
                    }
                    None => break,
                },
                _ = tokio::signal::ctrl_c() => break,
            }
        }
    }

    Ok(())
}
