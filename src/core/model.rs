//! Transaction records, recurring templates and the fixed category lists.

use crate::core::error::FinanceError;
use crate::core::month::Month;
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::Display;
use std::str::FromStr;

pub const EXPENSE_CATEGORIES: &[&str] = &[
    "Groceries",
    "Dining",
    "Housing",
    "Utilities",
    "Transport",
    "Healthcare",
    "Education",
    "Childcare",
    "Entertainment",
    "Shopping",
    "Travel",
    "Insurance",
    "Gifts",
    "Other",
];

pub const INCOME_CATEGORIES: &[&str] = &[
    "Salary",
    "Bonus",
    "Freelance",
    "Investment",
    "Rental",
    "Gift",
    "Refund",
    "Other",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Expense,
    Income,
}

impl TransactionType {
    pub fn categories(&self) -> &'static [&'static str] {
        match self {
            TransactionType::Expense => EXPENSE_CATEGORIES,
            TransactionType::Income => INCOME_CATEGORIES,
        }
    }

    /// Returns the canonical spelling of `category` if it belongs to this type.
    pub fn canonical_category(&self, category: &str) -> Option<&'static str> {
        self.categories()
            .iter()
            .copied()
            .find(|c| c.eq_ignore_ascii_case(category.trim()))
    }
}

impl Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionType::Expense => write!(f, "expense"),
            TransactionType::Income => write!(f, "income"),
        }
    }
}

impl FromStr for TransactionType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "expense" => Ok(TransactionType::Expense),
            "income" => Ok(TransactionType::Income),
            _ => Err(anyhow::anyhow!("Invalid transaction type: {}", s)),
        }
    }
}

/// The fields a client writes. Identity and creation time are assigned by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub category: String,
    pub original_amount: f64,
    pub original_currency: String,
    pub transaction_date: NaiveDate,
    #[serde(default)]
    pub description: Option<String>,
    pub base_currency: String,
    pub exchange_rate_to_base: f64,
    pub amount_in_base_currency: f64,
}

/// A transaction held in memory, with its date already normalized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub category: String,
    pub original_amount: f64,
    pub original_currency: String,
    pub transaction_date: NaiveDate,
    #[serde(default)]
    pub description: Option<String>,
    pub base_currency: String,
    pub exchange_rate_to_base: f64,
    pub amount_in_base_currency: f64,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    pub fn month(&self) -> Month {
        Month::from_date(self.transaction_date)
    }

    pub fn description_text(&self) -> &str {
        self.description.as_deref().unwrap_or("")
    }
}

/// Date field as it may sit in the remote collection: either a plain calendar
/// date or a legacy instant written with a timezone offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoredDate {
    Calendar(NaiveDate),
    Instant(DateTime<FixedOffset>),
}

impl StoredDate {
    /// The calendar date as the writer saw it, i.e. in the instant's own offset.
    pub fn calendar_date(&self) -> NaiveDate {
        match self {
            StoredDate::Calendar(d) => *d,
            StoredDate::Instant(dt) => dt.date_naive(),
        }
    }

    pub fn is_instant(&self) -> bool {
        matches!(self, StoredDate::Instant(_))
    }
}

impl Serialize for StoredDate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            StoredDate::Calendar(d) => serializer.serialize_str(&d.format("%Y-%m-%d").to_string()),
            StoredDate::Instant(dt) => serializer.serialize_str(&dt.to_rfc3339()),
        }
    }
}

impl<'de> Deserialize<'de> for StoredDate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        if let Ok(d) = NaiveDate::parse_from_str(&s, "%Y-%m-%d") {
            return Ok(StoredDate::Calendar(d));
        }
        DateTime::parse_from_rfc3339(&s)
            .map(StoredDate::Instant)
            .map_err(|e| serde::de::Error::custom(format!("Invalid transaction date {s}: {e}")))
    }
}

/// A document exactly as stored in the remote collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredTransaction {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub category: String,
    pub original_amount: f64,
    pub original_currency: String,
    pub transaction_date: StoredDate,
    #[serde(default)]
    pub description: Option<String>,
    pub base_currency: String,
    pub exchange_rate_to_base: f64,
    pub amount_in_base_currency: f64,
    pub created_at: DateTime<Utc>,
}

impl StoredTransaction {
    pub fn from_record(id: String, record: TransactionRecord, created_at: DateTime<Utc>) -> Self {
        StoredTransaction {
            id,
            kind: record.kind,
            category: record.category,
            original_amount: record.original_amount,
            original_currency: record.original_currency,
            transaction_date: StoredDate::Calendar(record.transaction_date),
            description: record.description,
            base_currency: record.base_currency,
            exchange_rate_to_base: record.exchange_rate_to_base,
            amount_in_base_currency: record.amount_in_base_currency,
            created_at,
        }
    }

    pub fn calendar_date(&self) -> NaiveDate {
        self.transaction_date.calendar_date()
    }

    pub fn normalize(self) -> Transaction {
        Transaction {
            transaction_date: self.transaction_date.calendar_date(),
            id: self.id,
            kind: self.kind,
            category: self.category,
            original_amount: self.original_amount,
            original_currency: self.original_currency,
            description: self.description,
            base_currency: self.base_currency,
            exchange_rate_to_base: self.exchange_rate_to_base,
            amount_in_base_currency: self.amount_in_base_currency,
            created_at: self.created_at,
        }
    }

    pub fn apply_record(&mut self, record: TransactionRecord) {
        self.kind = record.kind;
        self.category = record.category;
        self.original_amount = record.original_amount;
        self.original_currency = record.original_currency;
        self.transaction_date = StoredDate::Calendar(record.transaction_date);
        self.description = record.description;
        self.base_currency = record.base_currency;
        self.exchange_rate_to_base = record.exchange_rate_to_base;
        self.amount_in_base_currency = record.amount_in_base_currency;
    }
}

/// Monthly template. Never aggregated itself; only posted into a month on request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecurringItem {
    pub description: String,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub category: String,
    pub original_amount: f64,
    pub original_currency: String,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

/// Checks that `category` belongs to `kind`'s fixed list and returns its canonical form.
pub fn validate_category(
    kind: TransactionType,
    category: &str,
) -> Result<&'static str, FinanceError> {
    kind.canonical_category(category).ok_or_else(|| {
        FinanceError::validation(
            "category",
            format!("{category} is not a known {kind} category"),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stored(date: &str) -> StoredTransaction {
        let json = format!(
            r#"{{
                "id": "t1",
                "type": "expense",
                "category": "Groceries",
                "original_amount": 12.5,
                "original_currency": "EUR",
                "transaction_date": "{date}",
                "base_currency": "EUR",
                "exchange_rate_to_base": 1.0,
                "amount_in_base_currency": 12.5,
                "created_at": "2024-06-01T08:00:00Z"
            }}"#
        );
        serde_json::from_str(&json).unwrap()
    }

    #[test]
    fn test_calendar_date_round_trips_as_plain_string() {
        let doc = stored("2024-06-03");
        assert_eq!(
            doc.transaction_date,
            StoredDate::Calendar(NaiveDate::from_ymd_opt(2024, 6, 3).unwrap())
        );
        let json = serde_json::to_string(&doc).unwrap();
        assert!(json.contains(r#""transaction_date":"2024-06-03""#));
    }

    #[test]
    fn test_instant_normalizes_to_writer_local_date() {
        // Midnight in UTC+2 is still the previous day in UTC.
        let doc = stored("2024-06-01T00:30:00+02:00");
        assert!(doc.transaction_date.is_instant());
        let tx = doc.normalize();
        assert_eq!(tx.transaction_date, NaiveDate::from_ymd_opt(2024, 6, 1).unwrap());
        assert_eq!(tx.month().to_string(), "2024-06");
    }

    #[test]
    fn test_invalid_date_is_rejected() {
        let json = r#"{"id":"t","type":"income","category":"Salary","original_amount":1,
            "original_currency":"EUR","transaction_date":"yesterday","base_currency":"EUR",
            "exchange_rate_to_base":1,"amount_in_base_currency":1,
            "created_at":"2024-06-01T08:00:00Z"}"#;
        assert!(serde_json::from_str::<StoredTransaction>(json).is_err());
    }

    #[test]
    fn test_category_validation_is_case_insensitive() {
        assert_eq!(validate_category(TransactionType::Expense, "groceries").unwrap(), "Groceries");
        assert!(validate_category(TransactionType::Income, "Groceries").is_err());
    }
}
