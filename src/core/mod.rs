//! Core business logic abstractions

pub mod aggregate;
pub mod config;
pub mod error;
pub mod ledger;
pub mod log;
pub mod model;
pub mod month;
pub mod ports;
pub mod ranking;
pub mod rates;
pub mod window;

// Re-export main types for cleaner imports
pub use error::FinanceError;
pub use model::{RecurringItem, StoredTransaction, Transaction, TransactionRecord, TransactionType};
pub use month::Month;
pub use ports::{LocalStore, RateProvider, RemoteCollection};
pub use rates::{RateCache, RateLookup, RateTable};
