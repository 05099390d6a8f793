//! Error taxonomy shared by the domain modules.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum FinanceError {
    /// Required external configuration is absent. Fatal at startup.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("API error: {0}")]
    Api(String),

    /// A required form field is missing or invalid. Raised before any remote call.
    #[error("Invalid {field}: {message}")]
    Validation { field: String, message: String },

    /// No rate table has been loaded yet, so currency-dependent writes are blocked.
    #[error("Exchange rates are not available yet")]
    RatesUnavailable,

    #[error("No exchange rate known for currency: {0}")]
    UnknownCurrency(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl FinanceError {
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        FinanceError::Validation {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for FinanceError {
    fn from(e: serde_json::Error) -> Self {
        FinanceError::Storage(e.to_string())
    }
}

impl From<fjall::Error> for FinanceError {
    fn from(e: fjall::Error) -> Self {
        FinanceError::Storage(e.to_string())
    }
}

impl From<std::io::Error> for FinanceError {
    fn from(e: std::io::Error) -> Self {
        FinanceError::Storage(e.to_string())
    }
}
