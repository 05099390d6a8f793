use super::ui;
use crate::Session;
use crate::core::{FinanceError, RateTable};
use anyhow::Result;
use comfy_table::Cell;

/// Rate table limited to `currencies`. Currencies the provider did not quote show as N/A.
pub fn rates_table(table: &RateTable, currencies: &[String]) -> String {
    let mut output = ui::new_styled_table();
    output.set_header(vec![
        ui::header_cell("Currency"),
        ui::header_cell(&format!("Per 1 {}", table.base)),
        ui::header_cell(&format!("{} per unit", table.base)),
    ]);
    for currency in currencies {
        let rate = table.rate(currency);
        output.add_row(vec![
            Cell::new(currency),
            ui::format_optional_cell(rate, |r| format!("{r:.4}")),
            ui::format_optional_cell(rate.filter(|r| *r > 0.0), |r| format!("{:.4}", 1.0 / r)),
        ]);
    }
    output.to_string()
}

pub async fn run(session: &Session) -> Result<()> {
    let table = session
        .load_rates()
        .await
        .ok_or(FinanceError::RatesUnavailable)?;
    println!(
        "{}\n{}",
        ui::style_text(
            &format!("Exchange rates for {}", table.date),
            ui::StyleType::Title
        ),
        rates_table(&table, &session.config.supported_currencies())
    );
    Ok(())
}
