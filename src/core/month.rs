//! Calendar month arithmetic used for bucketing and window boundaries.

use anyhow::anyhow;
use chrono::{Datelike, Months, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::Display;
use std::str::FromStr;

/// A calendar month, ordered chronologically. Displays as `YYYY-MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Month {
    start: NaiveDate,
}

impl Month {
    /// `None` for a month number outside 1..=12 or a year chrono cannot represent.
    pub fn new(year: i32, month: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, 1).map(|start| Month { start })
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Month {
            start: date.with_day(1).unwrap_or(date),
        }
    }

    /// Saturates at the earliest representable month.
    pub fn prev(&self) -> Self {
        Month {
            start: self
                .start
                .checked_sub_months(Months::new(1))
                .unwrap_or(self.start),
        }
    }

    /// Saturates at the latest representable month.
    pub fn next(&self) -> Self {
        Month {
            start: self
                .start
                .checked_add_months(Months::new(1))
                .unwrap_or(self.start),
        }
    }

    pub fn first_day(&self) -> NaiveDate {
        self.start
    }
}

impl Display for Month {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}-{:02}", self.start.year(), self.start.month())
    }
}

impl FromStr for Month {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (year, month) = s
            .trim()
            .split_once('-')
            .ok_or_else(|| anyhow!("Invalid month: {s}, expected YYYY-MM"))?;
        let year: i32 = year
            .parse()
            .map_err(|_| anyhow!("Invalid year in month: {s}"))?;
        let month: u32 = month
            .parse()
            .map_err(|_| anyhow!("Invalid month number in month: {s}"))?;
        Month::new(year, month).ok_or_else(|| anyhow!("Month out of range: {s}"))
    }
}

impl Serialize for Month {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Month {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prev_and_next_wrap_year() {
        let jan = Month::new(2024, 1).unwrap();
        assert_eq!(jan.prev(), Month::new(2023, 12).unwrap());
        assert_eq!(jan.prev().next(), jan);
    }

    #[test]
    fn test_parse_and_display() {
        let m: Month = "2024-06".parse().unwrap();
        assert_eq!(m.to_string(), "2024-06");
        assert_eq!(m.first_day(), NaiveDate::from_ymd_opt(2024, 6, 1).unwrap());
        assert!("2024-13".parse::<Month>().is_err());
        assert!("202406".parse::<Month>().is_err());
    }

    #[test]
    fn test_ordering_is_chronological() {
        let a: Month = "2023-12".parse().unwrap();
        let b: Month = "2024-01".parse().unwrap();
        assert!(a < b);
        assert_eq!(
            Month::from_date(NaiveDate::from_ymd_opt(2024, 1, 31).unwrap()),
            b
        );
    }

    #[test]
    fn test_rejects_unrepresentable_years() {
        assert!(Month::new(999_999, 1).is_none());
        assert!("999999-01".parse::<Month>().is_err());
        assert!(Month::new(2024, 0).is_none());
    }
}
