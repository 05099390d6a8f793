//! Daily exchange-rate table with a local, day-scoped cache.

use crate::core::error::FinanceError;
use crate::core::ports::{LocalStore, RateProvider};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

pub const RATES_CACHE_KEY: &str = "rates_cache";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateTable {
    pub date: NaiveDate,
    pub base: String,
    pub rates: HashMap<String, f64>,
}

impl RateTable {
    /// Amount of `currency` per one unit of base currency.
    pub fn rate(&self, currency: &str) -> Option<f64> {
        let code = currency.to_uppercase();
        match self.rates.get(&code) {
            Some(rate) => Some(*rate),
            None if code == self.base => Some(1.0),
            None => None,
        }
    }

    pub fn require_rate(&self, currency: &str) -> Result<f64, FinanceError> {
        self.rate(currency)
            .filter(|r| r.is_finite() && *r > 0.0)
            .ok_or_else(|| FinanceError::UnknownCurrency(currency.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RateLookup {
    pub table: RateTable,
    /// Set when the fetch failed and an older cached table was returned instead.
    pub stale: bool,
}

pub struct RateCache {
    provider: Arc<dyn RateProvider>,
    store: Arc<dyn LocalStore>,
    base_currency: String,
}

impl RateCache {
    pub fn new(
        provider: Arc<dyn RateProvider>,
        store: Arc<dyn LocalStore>,
        base_currency: &str,
    ) -> Self {
        Self {
            provider,
            store,
            base_currency: base_currency.to_uppercase(),
        }
    }

    async fn cached(&self) -> Option<RateTable> {
        match self.store.get(RATES_CACHE_KEY).await {
            Ok(Some(raw)) => match serde_json::from_str::<RateTable>(&raw) {
                Ok(table) if table.base == self.base_currency => Some(table),
                Ok(table) => {
                    debug!("Ignoring cached rates for base {}", table.base);
                    None
                }
                Err(e) => {
                    debug!("Discarding unreadable rate cache: {}", e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                debug!("Rate cache read failed: {}", e);
                None
            }
        }
    }

    /// Returns today's table, fetching at most once per calendar day. A failed
    /// fetch falls back to a stale table when one exists.
    #[instrument(name = "RateCacheGet", skip(self), fields(base = %self.base_currency))]
    pub async fn get_rates(&self, today: NaiveDate) -> Result<RateLookup, FinanceError> {
        let cached = self.cached().await;
        if let Some(table) = &cached {
            if table.date == today {
                debug!("Cache HIT for rates on {}", today);
                return Ok(RateLookup {
                    table: table.clone(),
                    stale: false,
                });
            }
        }
        debug!("Cache MISS for rates on {}", today);

        match self.provider.latest(&self.base_currency).await {
            Ok(rates) => {
                let table = RateTable {
                    date: today,
                    base: self.base_currency.clone(),
                    rates,
                };
                let raw = serde_json::to_string(&table)?;
                if let Err(e) = self.store.set(RATES_CACHE_KEY, &raw).await {
                    warn!("Failed to persist rate cache: {}", e);
                }
                Ok(RateLookup {
                    table,
                    stale: false,
                })
            }
            Err(e) => match cached {
                Some(table) => {
                    warn!(
                        cached_date = %table.date,
                        "Rate lookup failed, using stale rates: {}", e
                    );
                    Ok(RateLookup { table, stale: true })
                }
                None => Err(e),
            },
        }
    }
}
