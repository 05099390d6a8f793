use crate::core::error::FinanceError;
use crate::core::model::RecurringItem;
use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf};
use tracing::debug;

pub const DEFAULT_PAGE_SIZE: usize = 25;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StoreConfig {
    /// Path segment scoping the collection to one household.
    pub family: String,
    #[serde(default = "default_collection")]
    pub collection: String,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

fn default_collection() -> String {
    "transactions".to_string()
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RatesConfig {
    #[serde(default = "default_rates_url")]
    pub base_url: String,
    pub api_key: Option<String>,
}

fn default_rates_url() -> String {
    "https://v6.exchangerate-api.com".to_string()
}

impl Default for RatesConfig {
    fn default() -> Self {
        RatesConfig {
            base_url: default_rates_url(),
            api_key: None,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    pub base_currency: String,
    #[serde(default)]
    pub currencies: Vec<String>,
    pub display_currency: Option<String>,
    pub store: StoreConfig,
    #[serde(default)]
    pub rates: RatesConfig,
    pub data_path: Option<String>,
    #[serde(default)]
    pub recurring: Vec<RecurringItem>,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        Self::load_from_path(&config_path)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("app", "famfin", "famfin")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn default_data_path(&self) -> Result<PathBuf> {
        if let Some(custom_path) = &self.data_path {
            return Ok(PathBuf::from(custom_path));
        }
        let proj_dirs = ProjectDirs::from("app", "famfin", "famfin")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.data_dir().to_path_buf())
    }

    /// Directory holding the transaction collection for the configured household.
    pub fn collection_path(&self) -> Result<PathBuf> {
        Ok(self
            .default_data_path()?
            .join(&self.store.family)
            .join(&self.store.collection))
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        config.validate()?;
        debug!("Successfully loaded config");
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), FinanceError> {
        if self.base_currency.trim().is_empty() {
            return Err(FinanceError::Configuration(
                "base_currency must be set".to_string(),
            ));
        }
        if self.store.family.trim().is_empty() || self.store.collection.trim().is_empty() {
            return Err(FinanceError::Configuration(
                "store.family and store.collection must be non-empty".to_string(),
            ));
        }
        if self.store.page_size == 0 {
            return Err(FinanceError::Configuration(
                "store.page_size must be greater than zero".to_string(),
            ));
        }
        if self.api_key().is_none() {
            return Err(FinanceError::Configuration(
                "rates.api_key must be set".to_string(),
            ));
        }
        Ok(())
    }

    pub fn api_key(&self) -> Option<&str> {
        self.rates
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }

    /// The fixed set of currencies a transaction may be entered in. Always includes the base.
    pub fn supported_currencies(&self) -> Vec<String> {
        let base = self.base_currency.to_uppercase();
        let mut out = vec![base.clone()];
        for c in &self.currencies {
            let c = c.to_uppercase();
            if !out.contains(&c) {
                out.push(c);
            }
        }
        out
    }

    pub fn display_currency(&self) -> String {
        self.display_currency
            .as_deref()
            .unwrap_or(&self.base_currency)
            .to_uppercase()
    }
}
