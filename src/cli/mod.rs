pub mod entry;
pub mod migrate;
pub mod rates;
pub mod recurring;
pub mod report;
pub mod setup;
pub mod ui;
