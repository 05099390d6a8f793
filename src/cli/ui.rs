use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

/// Defines different styles for text elements.
pub enum StyleType {
    Title,
    TotalLabel,
    TotalValue,
    Warning,
    Error,
    Subtle,
}

/// Applies a consistent style to a string.
pub fn style_text(text: &str, style_type: StyleType) -> String {
    let styled = match style_type {
        StyleType::Title => style(text).bold().underlined(),
        StyleType::TotalLabel => style(text).bold(),
        StyleType::TotalValue => style(text).green().bold(),
        StyleType::Warning => style(text).yellow(),
        StyleType::Error => style(text).red(),
        StyleType::Subtle => style(text).dim(),
    };
    styled.to_string()
}

/// Creates a new `comfy_table::Table` with standard styling.
pub fn new_styled_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

/// Creates a styled header cell for a table.
pub fn header_cell(text: &str) -> Cell {
    Cell::new(text)
        .fg(Color::Cyan)
        .add_attribute(Attribute::Bold)
}

/// Right-aligned amount with two decimals.
pub fn amount_cell(value: f64) -> Cell {
    Cell::new(format!("{value:.2}")).set_alignment(CellAlignment::Right)
}

/// Amount colored by sign: green for a surplus, red for a deficit.
pub fn balance_cell(value: f64) -> Cell {
    let color = if value >= 0.0 { Color::Green } else { Color::Red };
    Cell::new(format!("{value:.2}"))
        .fg(color)
        .add_attribute(Attribute::Bold)
        .set_alignment(CellAlignment::Right)
}

/// Formats an `Option<T>` into a `Cell`. `None` is displayed as "N/A".
pub fn format_optional_cell<T>(value: Option<T>, format_fn: impl Fn(T) -> String) -> Cell {
    value.map_or(
        Cell::new("N/A")
            .fg(Color::DarkGrey)
            .set_alignment(CellAlignment::Left),
        |v| Cell::new(format_fn(v)),
    )
}

/// Creates a new `indicatif::ProgressBar` with standard styling.
pub fn new_progress_bar(len: u64, with_message: bool) -> ProgressBar {
    let template = if with_message {
        "{spinner:.green} {msg} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len}"
    } else {
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len}"
    };

    let pb = ProgressBar::new(len);
    if let Ok(progress_style) = ProgressStyle::default_bar().template(template) {
        pb.set_style(progress_style.progress_chars("#>-"));
    }
    pb
}

/// Spinner for work of unknown length, such as paging a remote collection.
pub fn new_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// Prints a separator line matching the terminal width.
pub fn print_separator() {
    let term_width = console::Term::stdout()
        .size_checked()
        .map(|(_, w)| w as usize)
        .unwrap_or(80);
    println!("\n{}", "─".repeat(term_width));
}
