//! Report computation over the working set: filtering, currency-aware
//! conversion, totals, category breakdown, monthly trend, sorting and paging.
//!
//! Everything here is a pure function of its inputs. Callers recompute after
//! each mutation of the working set.
use crate::core::error::FinanceError;
use crate::core::model::{Transaction, TransactionType};
use crate::core::month::Month;
use crate::core::rates::RateTable;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;
use tracing::debug;

pub const DEFAULT_REPORT_PAGE_SIZE: usize = 20;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReportFilter {
    pub months: BTreeSet<Month>,
    pub categories: BTreeSet<String>,
    pub description: String,
}

impl ReportFilter {
    pub fn matches(&self, tx: &Transaction) -> bool {
        let month_ok = self.months.is_empty() || self.months.contains(&tx.month());
        let category_ok = self.categories.is_empty() || self.categories.contains(&tx.category);
        let needle = self.description.to_lowercase();
        let description_ok =
            needle.is_empty() || tx.description_text().to_lowercase().contains(&needle);
        month_ok && category_ok && description_ok
    }
}

/// Amount of `tx` in `display_currency`. A record already in the display
/// currency is used as entered, without a round trip through the base.
pub fn convert(tx: &Transaction, display_currency: &str, display_rate: f64) -> f64 {
    if tx.original_currency.eq_ignore_ascii_case(display_currency) {
        tx.original_amount
    } else {
        tx.amount_in_base_currency * display_rate
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportRow {
    pub transaction: Transaction,
    pub display_amount: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MonthlyTotals {
    pub month: Month,
    pub expense: f64,
    pub income: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportData {
    pub display_currency: String,
    pub total_expense: f64,
    pub total_income: f64,
    pub net_balance: f64,
    /// Sorted by amount, largest first.
    pub expense_by_category: Vec<(String, f64)>,
    /// Sorted by month, oldest first.
    pub monthly_trend: Vec<MonthlyTotals>,
    /// Filtered rows in working-set order.
    pub rows: Vec<ReportRow>,
}

pub fn aggregate(
    transactions: &[Transaction],
    filter: &ReportFilter,
    display_currency: &str,
    rates: &RateTable,
) -> Result<ReportData, FinanceError> {
    let display_currency = display_currency.to_uppercase();
    let display_rate = rates.require_rate(&display_currency)?;

    let mut total_expense = 0.0;
    let mut total_income = 0.0;
    let mut by_category: Vec<(String, f64)> = Vec::new();
    let mut trend: BTreeMap<Month, MonthlyTotals> = BTreeMap::new();
    let mut rows = Vec::new();

    for tx in transactions.iter().filter(|tx| filter.matches(tx)) {
        let amount = convert(tx, &display_currency, display_rate);
        let bucket = trend.entry(tx.month()).or_insert(MonthlyTotals {
            month: tx.month(),
            expense: 0.0,
            income: 0.0,
        });

        match tx.kind {
            TransactionType::Expense => {
                total_expense += amount;
                bucket.expense += amount;
                match by_category.iter_mut().find(|(c, _)| *c == tx.category) {
                    Some((_, sum)) => *sum += amount,
                    None => by_category.push((tx.category.clone(), amount)),
                }
            }
            TransactionType::Income => {
                total_income += amount;
                bucket.income += amount;
            }
        }

        rows.push(ReportRow {
            transaction: tx.clone(),
            display_amount: amount,
        });
    }

    // stable: equal amounts keep first-seen order
    by_category.sort_by(|a, b| b.1.total_cmp(&a.1));

    debug!(
        rows = rows.len(),
        total_expense, total_income, "Aggregated report in {}", display_currency
    );

    Ok(ReportData {
        display_currency,
        total_expense,
        total_income,
        net_balance: total_income - total_expense,
        expense_by_category: by_category,
        monthly_trend: trend.into_values().collect(),
        rows,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    Date,
    Amount,
    Category,
}

impl FromStr for SortKey {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "date" => Ok(SortKey::Date),
            "amount" => Ok(SortKey::Amount),
            "category" => Ok(SortKey::Category),
            _ => Err(anyhow::anyhow!("Invalid sort key: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortState {
    pub key: SortKey,
    pub direction: SortDirection,
}

impl Default for SortState {
    fn default() -> Self {
        SortState {
            key: SortKey::Date,
            direction: SortDirection::Descending,
        }
    }
}

impl SortState {
    /// Selecting a new key sorts ascending; selecting the current key again flips direction.
    pub fn select(&mut self, key: SortKey) {
        if self.key == key {
            self.direction = match self.direction {
                SortDirection::Ascending => SortDirection::Descending,
                SortDirection::Descending => SortDirection::Ascending,
            };
        } else {
            self.key = key;
            self.direction = SortDirection::Ascending;
        }
    }
}

/// Sorts rows by `state`. Amount uses the converted display amount. Descending
/// is the exact reverse of ascending, ties included.
pub fn sort_rows(rows: &mut [ReportRow], state: SortState) {
    match state.key {
        SortKey::Date => rows.sort_by(|a, b| {
            a.transaction
                .transaction_date
                .cmp(&b.transaction.transaction_date)
        }),
        SortKey::Amount => rows.sort_by(|a, b| a.display_amount.total_cmp(&b.display_amount)),
        SortKey::Category => rows.sort_by(|a, b| {
            a.transaction
                .category
                .to_lowercase()
                .cmp(&b.transaction.category.to_lowercase())
        }),
    }
    if state.direction == SortDirection::Descending {
        rows.reverse();
    }
}

/// Filter, sort and page state for the transaction table.
#[derive(Debug, Clone)]
pub struct ReportView {
    filter: ReportFilter,
    sort: SortState,
    page: usize,
    page_size: usize,
}

impl ReportView {
    pub fn new(page_size: usize) -> Self {
        Self {
            filter: ReportFilter::default(),
            sort: SortState::default(),
            page: 1,
            page_size: page_size.max(1),
        }
    }

    pub fn filter(&self) -> &ReportFilter {
        &self.filter
    }

    pub fn sort(&self) -> SortState {
        self.sort
    }

    pub fn page(&self) -> usize {
        self.page
    }

    /// Any filter change sends the table back to the first page.
    pub fn set_filter(&mut self, filter: ReportFilter) {
        if filter != self.filter {
            self.page = 1;
        }
        self.filter = filter;
    }

    pub fn select_sort(&mut self, key: SortKey) {
        self.sort.select(key);
    }

    pub fn set_page(&mut self, page: usize) {
        self.page = page.max(1);
    }

    pub fn page_count(&self, total_rows: usize) -> usize {
        total_rows.div_ceil(self.page_size).max(1)
    }

    /// Sorts `rows` and returns the current page, clamped to the last page.
    pub fn page_rows<'a>(&self, rows: &'a mut [ReportRow]) -> &'a [ReportRow] {
        sort_rows(rows, self.sort);
        let page = self.page.min(self.page_count(rows.len()));
        let start = (page - 1) * self.page_size;
        let end = (start + self.page_size).min(rows.len());
        &rows[start.min(end)..end]
    }
}
