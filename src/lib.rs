pub mod cli;
pub mod core;
pub mod providers;
pub mod store;

use crate::core::config::AppConfig;
use crate::core::ledger::{Ledger, TransactionDraft};
use crate::core::ranking::CategoryUsage;
use crate::core::window::TransactionWindow;
use crate::core::{
    FinanceError, LocalStore, Month, RateCache, RateTable, RemoteCollection, TransactionType,
};
use anyhow::Result;
use chrono::NaiveDate;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub enum AppCommand {
    Rates,
    Report(cli::report::ReportOptions),
    Add(TransactionDraft),
    Edit { id: String, draft: TransactionDraft },
    Delete { id: String },
    Import { path: PathBuf },
    Wipe,
    PostRecurring { month: Option<Month> },
    Categories { kind: TransactionType },
    MigrateDates,
}

/// Everything a command needs: configuration plus the wired-up ports.
pub struct Session {
    pub config: AppConfig,
    pub collection: Arc<dyn RemoteCollection>,
    pub local: Arc<dyn LocalStore>,
    pub rate_cache: RateCache,
    pub today: NaiveDate,
}

impl Session {
    pub fn open(config: AppConfig, today: NaiveDate) -> Result<Self> {
        let api_key = config
            .api_key()
            .ok_or_else(|| FinanceError::Configuration("rates.api_key must be set".to_string()))?;
        let provider = Arc::new(providers::exchange_rate::ExchangeRateApiProvider::new(
            &config.rates.base_url,
            api_key,
        ));

        let data_path = config.default_data_path()?;
        let local: Arc<dyn LocalStore> =
            Arc::new(store::disk::DiskStore::open(&data_path.join("local"))?);
        let collection: Arc<dyn RemoteCollection> =
            Arc::new(store::disk::DiskCollection::open(&config.collection_path()?)?);
        debug!("Opened data stores under {}", data_path.display());

        let rate_cache = RateCache::new(provider, Arc::clone(&local), &config.base_currency);

        Ok(Self {
            config,
            collection,
            local,
            rate_cache,
            today,
        })
    }

    pub fn ledger(&self) -> Ledger {
        Ledger::new(
            Arc::clone(&self.collection),
            &self.config.base_currency,
            self.config.supported_currencies(),
        )
    }

    pub fn window(&self) -> TransactionWindow {
        TransactionWindow::new(Arc::clone(&self.collection), self.config.store.page_size)
    }

    pub async fn usage(&self) -> CategoryUsage {
        CategoryUsage::load(Arc::clone(&self.local)).await
    }

    /// Today's rates. `None` means currency-dependent operations must be refused.
    pub async fn load_rates(&self) -> Option<RateTable> {
        match self.rate_cache.get_rates(self.today).await {
            Ok(lookup) => {
                if lookup.stale {
                    eprintln!(
                        "{}",
                        cli::ui::style_text(
                            &format!(
                                "Warning: could not refresh exchange rates, using rates from {}",
                                lookup.table.date
                            ),
                            cli::ui::StyleType::Warning,
                        )
                    );
                }
                Some(lookup.table)
            }
            Err(e) => {
                warn!("Exchange rates unavailable: {}", e);
                eprintln!(
                    "{}",
                    cli::ui::style_text(
                        &format!("Exchange rates unavailable: {e}"),
                        cli::ui::StyleType::Error,
                    )
                );
                None
            }
        }
    }
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    info!("famfin starting...");

    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");

    let today = chrono::Local::now().date_naive();
    let session = Session::open(config, today)?;

    match command {
        AppCommand::Rates => cli::rates::run(&session).await,
        AppCommand::Report(options) => cli::report::run(&session, &options).await,
        AppCommand::Add(draft) => cli::entry::add(&session, &draft).await,
        AppCommand::Edit { id, draft } => cli::entry::edit(&session, &id, &draft).await,
        AppCommand::Delete { id } => cli::entry::delete(&session, &id).await,
        AppCommand::Import { path } => cli::entry::import(&session, &path).await,
        AppCommand::Wipe => cli::entry::wipe(&session).await,
        AppCommand::PostRecurring { month } => cli::recurring::run(&session, month).await,
        AppCommand::Categories { kind } => cli::entry::categories(&session, kind).await,
        AppCommand::MigrateDates => cli::migrate::run(&session).await,
    }
}
